#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Error, ErrorKind, Read, Write};
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

use osdp_cp::frame::{self, FrameDraft};
use osdp_cp::{Address, SequenceNumber};

/// Scripted serial port. Each read returns the next queued chunk; once the
/// script runs out reads time out.
pub struct SerialInterface {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<u8>,
    eof: bool,
    do_read_error: bool,
    do_write_error: bool,
}

pub struct SerialIOPlane(Rc<RefCell<SerialInterface>>);

impl SerialIOPlane {
    pub fn new(serial_if: &Rc<RefCell<SerialInterface>>) -> SerialIOPlane {
        SerialIOPlane(serial_if.clone())
    }
}

impl SerialInterface {
    pub fn new(rx: &[&[u8]]) -> Rc<RefCell<SerialInterface>> {
        Rc::new(RefCell::new(SerialInterface {
            rx: rx.iter().map(|chunk| chunk.to_vec()).collect(),
            tx: Vec::new(),
            eof: false,
            do_read_error: false,
            do_write_error: false,
        }))
    }

    pub fn push_rx(&mut self, chunk: &[u8]) {
        self.rx.push_back(chunk.to_vec());
    }

    /// Everything written so far, clearing the record.
    pub fn take_tx(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }

    pub fn close(&mut self) {
        self.eof = true;
    }

    pub fn trigger_write_error(&mut self) {
        self.do_write_error = true;
    }

    pub fn trigger_read_error(&mut self) {
        self.do_read_error = true;
    }
}

impl Read for SerialIOPlane {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.do_read_error {
            inner.do_read_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "IO read error"));
        }
        match inner.rx.pop_front() {
            Some(mut chunk) => {
                let len = chunk.len().min(buf.len());
                buf[..len].copy_from_slice(&chunk[..len]);
                if len < chunk.len() {
                    inner.rx.push_front(chunk.split_off(len));
                }
                Ok(len)
            }
            None if inner.eof => Ok(0),
            None => Err(Error::new(ErrorKind::TimedOut, "IO read timeout")),
        }
    }
}

impl Write for SerialIOPlane {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.do_write_error {
            inner.do_write_error = false;
            Err(Error::new(ErrorKind::PermissionDenied, "IO write error"))
        } else {
            inner.tx.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A reply frame as a peripheral would send it.
pub fn reply_frame(address: Address, sequence: u8, code: u8, payload: &[u8]) -> Vec<u8> {
    FrameDraft::reply(address, code, payload)
        .sequence(SequenceNumber::new(sequence).unwrap())
        .to_frame()
        .unwrap()
        .to_vec()
}

type BusT = Arc<Mutex<VecDeque<u8>>>;

/// Half duplex RS-485 line with one CP side and any number of peripherals.
#[derive(Default)]
pub struct RS485Bus {
    cps: Mutex<Vec<Weak<BusInterfaceLink>>>,
    pds: Mutex<Vec<Weak<BusInterfaceLink>>>,
    cp_data_available: Arc<Condvar>,
    pd_data_available: Arc<Condvar>,
    eof: AtomicBool,
}

impl RS485Bus {
    pub fn new() -> Arc<RS485Bus> {
        Default::default()
    }

    pub fn disconnect(&self) {
        self.eof.store(true, SeqCst);
        self.pd_data_available.notify_all();
        self.cp_data_available.notify_all();
    }

    pub fn new_cp_interface(self: &Arc<Self>) -> BusInterface {
        let link = Arc::new(BusInterfaceLink {
            is_cp: true,
            rx: Default::default(),
            rx_condvar: Arc::clone(&self.cp_data_available),
        });
        self.cps.lock().unwrap().push(Arc::downgrade(&link));
        BusInterface::new(Arc::clone(self), link)
    }

    pub fn new_pd_interface(self: &Arc<Self>) -> BusInterface {
        let link = Arc::new(BusInterfaceLink {
            is_cp: false,
            rx: Default::default(),
            rx_condvar: Arc::clone(&self.pd_data_available),
        });
        self.pds.lock().unwrap().push(Arc::downgrade(&link));
        BusInterface::new(Arc::clone(self), link)
    }

    fn send(links: &Mutex<Vec<Weak<BusInterfaceLink>>>, condvar: &Condvar, data: &[u8]) {
        let links = links.lock().unwrap();
        for weak in links.iter() {
            if let Some(link) = weak.upgrade() {
                link.rx.lock().unwrap().extend(data.iter().copied());
            }
        }
        condvar.notify_all();
    }
}

pub struct BusInterface {
    bus: Arc<RS485Bus>,
    link: Arc<BusInterfaceLink>,
    pub timeout: Duration,
}

struct BusInterfaceLink {
    is_cp: bool,
    rx: BusT,
    rx_condvar: Arc<Condvar>,
}

impl BusInterface {
    fn new(bus: Arc<RS485Bus>, link: Arc<BusInterfaceLink>) -> BusInterface {
        BusInterface {
            bus,
            link,
            timeout: Duration::from_millis(100),
        }
    }
}

impl Read for BusInterface {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            panic!("Testsuite called read with zero length buffer.")
        }
        let rx = self.link.rx.lock().expect("Read mutex is poisoned");
        let mut rx = if rx.is_empty() && !self.bus.eof.load(SeqCst) {
            self.link
                .rx_condvar
                .wait_timeout(rx, self.timeout)
                .expect("Mutex lock failed")
                .0
        } else {
            rx
        };
        if rx.is_empty() {
            return if self.bus.eof.load(SeqCst) {
                Ok(0)
            } else {
                Err(Error::new(ErrorKind::TimedOut, "IO read timeout"))
            };
        }
        let len = rx.len().min(buf.len());
        for (dst, src) in buf.iter_mut().zip(rx.drain(..len)) {
            *dst = src;
        }
        Ok(len)
    }
}

impl Write for BusInterface {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.link.is_cp {
            RS485Bus::send(&self.bus.pds, &self.bus.pd_data_available, buf);
        } else {
            RS485Bus::send(&self.bus.cps, &self.bus.cp_data_available, buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Peripheral side of a bus test.
///
/// Splits the received byte stream into frames, hands every valid command
/// addressed to `address` to `respond`, and transmits the returned
/// `(code, payload)` as a reply with the command's sequence number.
/// Returning `None` leaves the command unanswered. Runs until the bus is
/// disconnected.
pub fn pd_main_loop<F>(mut io: BusInterface, address: Address, mut respond: F)
where
    F: FnMut(u8, &[u8]) -> Option<(u8, Vec<u8>)>,
{
    let mut rx: Vec<u8> = Vec::new();
    let mut data = [0; 64];
    loop {
        match io.read(&mut data) {
            Ok(0) => return,
            Ok(len) => rx.extend_from_slice(&data[..len]),
            Err(err) if err.kind() == ErrorKind::TimedOut => continue,
            Err(err) => panic!("PD read failed: {}", err),
        }

        loop {
            let (consumed, received) = frame::split(&rx);
            let received = received.map(<[u8]>::to_vec);
            rx.drain(..consumed);
            let received = match received {
                Some(received) => received,
                None => break,
            };
            let command = match frame::decode_command(&received, address) {
                Ok(command) => command,
                Err(_) => continue,
            };
            if let Some((code, payload)) = respond(command.code, command.payload) {
                let reply = FrameDraft::reply(address, code, &payload)
                    .sequence(command.sequence)
                    .trailer(command.trailer)
                    .to_frame()
                    .unwrap();
                io.write_all(&reply).unwrap();
            }
        }
    }
}
