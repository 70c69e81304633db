//! State the CP keeps for each peripheral.

use log::{debug, info};

use crate::command::Command;
use crate::config::PeripheralConfig;
use crate::queue::{self, CommandQueue, QueueEntry};
use crate::reply::{Capabilities, IdentityRecord, LocalStatus, PayloadBytes, Reply};
use crate::types::{Address, SequenceNumber, TrailerMode};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct InFlight {
    sequence: SequenceNumber,
    from_queue: bool,
}

/// One peripheral on the bus: its command queue, sequence state and the
/// records decoded from its replies.
#[derive(Debug, Clone)]
pub struct Peripheral {
    address: Address,
    baud_rate: u32,
    trailer: TrailerMode,
    queue: CommandQueue,
    next_sequence: SequenceNumber,
    in_flight: Option<InFlight>,
    identity: Option<IdentityRecord>,
    capabilities: Capabilities,
    local_status: Option<LocalStatus>,
    input_status: Option<PayloadBytes>,
    output_status: Option<PayloadBytes>,
    reader_status: Option<PayloadBytes>,
}

impl Peripheral {
    pub fn new(config: PeripheralConfig) -> Self {
        Self {
            address: config.address,
            baud_rate: config.baud_rate,
            trailer: config.trailer,
            queue: CommandQueue::with_capacity(config.queue_capacity),
            next_sequence: SequenceNumber::ZERO,
            in_flight: None,
            identity: None,
            capabilities: Capabilities::new(),
            local_status: None,
            input_status: None,
            output_status: None,
            reader_status: None,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn trailer(&self) -> TrailerMode {
        self.trailer
    }

    pub fn set_trailer(&mut self, trailer: TrailerMode) {
        self.trailer = trailer;
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub(crate) fn queue_mut(&mut self) -> &mut CommandQueue {
        &mut self.queue
    }

    /// Queue a command behind the pending ones.
    /// # Errors
    /// The queue error if the command can't be queued.
    pub fn enqueue(&mut self, command: Command) -> Result<(), queue::Error> {
        self.queue.enqueue(command)
    }

    /// Drop the head command without waiting for its reply.
    ///
    /// If it was transmitted and left unanswered, the next frame gets a fresh
    /// sequence number so the peripheral can't take it for a repeat.
    pub fn drop_head(&mut self) -> Option<QueueEntry> {
        let entry = self.queue.dequeue()?;
        self.forget_queued_in_flight();
        Some(entry)
    }

    /// Drop every pending command, renumbering as [`drop_head`](Self::drop_head) does.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.forget_queued_in_flight();
    }

    fn forget_queued_in_flight(&mut self) {
        if matches!(self.in_flight, Some(last) if last.from_queue) {
            debug!("pd {}: in-flight command withdrawn", *self.address);
            self.confirm();
        }
    }

    /// The last identification report, if one was received.
    pub fn identity(&self) -> Option<&IdentityRecord> {
        self.identity.as_ref()
    }

    pub fn capabilities(&self) -> &[crate::reply::Capability] {
        &self.capabilities
    }

    pub fn local_status(&self) -> Option<LocalStatus> {
        self.local_status
    }

    pub fn input_status(&self) -> Option<&[u8]> {
        self.input_status.as_deref()
    }

    pub fn output_status(&self) -> Option<&[u8]> {
        self.output_status.as_deref()
    }

    pub fn reader_status(&self) -> Option<&[u8]> {
        self.reader_status.as_deref()
    }

    /// True while a transmitted frame is still waiting for its reply.
    pub fn awaiting_reply(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Sequence number for the next transmission, and whether it repeats
    /// the unanswered previous one.
    ///
    /// An unanswered frame of the same kind (queued command or idle poll)
    /// is resent with its old number; anything else gets a fresh one.
    pub(crate) fn transmit_sequence(&mut self, from_queue: bool) -> (SequenceNumber, bool) {
        let (sequence, retransmit) = match self.in_flight {
            Some(last) if last.from_queue == from_queue => (last.sequence, true),
            Some(last) => (last.sequence.next(), false),
            None => (self.next_sequence, false),
        };
        self.in_flight = Some(InFlight {
            sequence,
            from_queue,
        });
        (sequence, retransmit)
    }

    /// The in-flight frame was answered, or is no longer worth resending.
    /// Either way its sequence number is used up.
    pub(crate) fn confirm(&mut self) {
        if let Some(last) = self.in_flight.take() {
            self.next_sequence = last.sequence.next();
        }
    }

    /// Restart sequence numbering at zero.
    pub fn reset_sequence(&mut self) {
        self.in_flight = None;
        self.next_sequence = SequenceNumber::ZERO;
    }

    /// Store the records carried by `reply`.
    ///
    /// Records are replaced as a whole, never merged.
    pub fn apply_reply(&mut self, reply: &Reply) {
        match reply {
            Reply::Id(id) => {
                info!(
                    "pd {}: vendor {:06x} model {} serial {:08x} firmware {}.{}.{}",
                    *self.address,
                    id.vendor_code,
                    id.model,
                    id.serial_number,
                    id.firmware_major(),
                    id.firmware_minor(),
                    id.firmware_build()
                );
                self.identity = Some(*id);
            }
            Reply::Capabilities(caps) => self.capabilities = caps.clone(),
            Reply::LocalStatus(status) => self.local_status = Some(*status),
            Reply::InputStatus(inputs) => self.input_status = Some(inputs.clone()),
            Reply::OutputStatus(outputs) => self.output_status = Some(outputs.clone()),
            Reply::ReaderStatus(readers) => self.reader_status = Some(readers.clone()),
            Reply::Com(com) => match Address::new(com.address) {
                Ok(address) => {
                    info!(
                        "pd {}: now at address {}, {} baud",
                        *self.address, *address, com.baud_rate
                    );
                    self.address = address;
                    self.baud_rate = com.baud_rate;
                }
                Err(_) => debug!("pd {}: ignoring COM reply {:?}", *self.address, com),
            },
            _ => (),
        }
    }

    /// Forget everything learned from the peripheral and drop pending commands.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.reset_sequence();
        self.identity = None;
        self.capabilities.clear();
        self.local_status = None;
        self.input_status = None;
        self.output_status = None;
        self.reader_status = None;
    }
}
