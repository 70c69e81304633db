use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::iter::Peekable;
use std::str::{FromStr, SplitWhitespace};
use std::sync::mpsc;

use osdp_cp::command::{BuzzerControl, BuzzerTone};
use osdp_cp::cp::io::ControlPanel;
use osdp_cp::{Command, PdIndex, PeripheralConfig, TrailerMode};

fn cmd_add<IO: Read + Write>(args: &mut CmdScanner, cp: &mut ControlPanel<IO>) -> Result<()> {
    let mut config = PeripheralConfig::new(args.parse_next::<u8>()?)?;
    if args.peek() == Some("checksum") {
        config = config.trailer(TrailerMode::Checksum);
    }
    let pd = cp.add(config);
    println!("pd {} at address {}", pd.index(), *config.address);
    Ok(())
}

fn pd_arg<IO: Read + Write>(args: &mut CmdScanner, cp: &ControlPanel<IO>) -> Result<PdIndex> {
    let index: usize = args.parse_next()?;
    cp.inner()
        .pds()
        .nth(index)
        .context("No such peripheral, use add first")
}

fn cmd_poll<IO: Read + Write>(args: &mut CmdScanner, cp: &mut ControlPanel<IO>) -> Result<()> {
    let pd = pd_arg(args, cp)?;
    let delay = std::time::Duration::from_secs_f32(args.parse_next().unwrap_or(0.2));

    println!("Press enter to stop polling.");
    // check that the first poll is ok before starting the poll stop thread
    println!("{:?}", cp.poll(pd)?);
    let (io_tx, io_rx) = mpsc::channel::<()>();
    std::thread::spawn(move || {
        let _ch = io_tx;
        let mut buf = String::new();
        let _ = std::io::stdin().read_line(&mut buf);
    });
    loop {
        if io_rx.recv_timeout(delay) == Err(mpsc::RecvTimeoutError::Disconnected) {
            break;
        }
        println!("{:?}", cp.poll(pd)?);
    }
    Ok(())
}

fn cmd_send<IO: Read + Write>(
    args: &mut CmdScanner,
    cp: &mut ControlPanel<IO>,
    command: Command,
) -> Result<()> {
    let pd = pd_arg(args, cp)?;
    println!("{:?}", cp.send_command(pd, command)?);
    Ok(())
}

fn cmd_buzz<IO: Read + Write>(args: &mut CmdScanner, cp: &mut ControlPanel<IO>) -> Result<()> {
    let pd = pd_arg(args, cp)?;
    let repeat = args.parse_next().unwrap_or(1);
    let command = Command::Buzzer(BuzzerControl {
        reader: 0,
        tone: BuzzerTone::Default,
        on_count: 2,
        off_count: 2,
        repeat,
    });
    println!("{:?}", cp.send_command(pd, command)?);
    Ok(())
}

fn cmd_info<IO: Read + Write>(args: &mut CmdScanner, cp: &mut ControlPanel<IO>) -> Result<()> {
    let pd = pd_arg(args, cp)?;
    let peripheral = cp.inner().peripheral(pd)?;
    println!("address:      {}", *peripheral.address());
    println!("identity:     {:?}", peripheral.identity());
    println!("capabilities: {:?}", peripheral.capabilities());
    println!("local status: {:?}", peripheral.local_status());
    println!("queued:       {}", peripheral.queue().len());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let baud_rate = match args.next() {
        Some(baud) => baud.parse().context("Invalid baud rate")?,
        None => 9600,
    };

    let serial = serialport::new(&port, baud_rate)
        .timeout(std::time::Duration::from_millis(200))
        .open()
        .with_context(|| format!("Failed to open serial port {}", port))?;

    let mut stdout = std::io::stdout();

    let mut cp = ControlPanel::new(serial);
    loop {
        print!(">> ");
        stdout.flush()?;
        let mut cmd = String::new();
        let mut scan = CmdScanner::read_stdin(&mut cmd)?;
        if let Err(err) = match scan.next() {
            Err(_) => continue,
            Ok("add") => cmd_add(&mut scan, &mut cp),
            Ok("poll") | Ok("p") => cmd_poll(&mut scan, &mut cp),
            Ok("id") => cmd_send(&mut scan, &mut cp, Command::Id),
            Ok("cap") => cmd_send(&mut scan, &mut cp, Command::Capabilities),
            Ok("lstat") => cmd_send(&mut scan, &mut cp, Command::LocalStatus),
            Ok("buzz") => cmd_buzz(&mut scan, &mut cp),
            Ok("info") => cmd_info(&mut scan, &mut cp),
            Ok("quit") | Ok("q") => return Ok(()),
            Ok(cmd) => {
                println!("Unknown command {}", cmd);
                continue;
            }
        } {
            println!("{:?}", err)
        }
    }
}

struct CmdScanner<'a> {
    splt: Peekable<SplitWhitespace<'a>>,
}

impl<'a> CmdScanner<'a> {
    fn read_stdin(buf: &'a mut String) -> Result<Self> {
        buf.clear();
        std::io::stdin().read_line(buf)?;
        let splt = buf.split_whitespace().peekable();
        Ok(Self { splt })
    }
    fn next(&mut self) -> Result<&str> {
        self.splt.next().context("End of stream")
    }
    fn peek(&mut self) -> Option<&str> {
        self.splt.peek().copied()
    }
    fn parse_next<T: FromStr>(&mut self) -> Result<T> {
        self.next()?.parse::<T>().ok().context("Parse error")
    }
}
