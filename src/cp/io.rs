//! Blocking control panel on top of a [`Read`] + [`Write`] serial port.
//!
//! The port should be opened with a read timeout. A read that times out
//! counts as a failed attempt and the frame is sent again, up to
//! [`ControlPanelConfig::attempts`] times.

use std::io::{ErrorKind, Read, Write};

use log::{debug, warn};
use snafu::{ensure, ResultExt, Snafu};

use crate::command::Command;
use crate::config::{ControlPanelConfig, PeripheralConfig};
use crate::cp::{self, PdIndex, Received};
use crate::reply::Reply;

/// Error type for this module
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(context(false), display("{}", source))]
    Protocol { source: cp::Error },
    #[snafu(display("I/O error: {}", source))]
    Io { source: std::io::Error },
    /// The port returned end of file.
    #[snafu(display("Serial port closed"))]
    Eof,
    /// No usable reply within the configured number of attempts.
    #[snafu(display("Peripheral did not answer after {} attempts", attempts))]
    RetriesExhausted { attempts: u8 },
}

impl Error {
    fn is_retriable(&self) -> bool {
        match self {
            Error::Protocol { source } => source.is_transmission_error(),
            Error::Io { source } => {
                matches!(source.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
            }
            _ => false,
        }
    }
}

pub struct ControlPanel<IO> {
    cp: cp::ControlPanel,
    config: ControlPanelConfig,
    io: IO,
}

impl<IO> ControlPanel<IO>
where
    IO: Read + Write,
{
    pub fn new(io: IO) -> Self {
        Self::with_config(io, ControlPanelConfig::default())
    }

    pub fn with_config(io: IO, config: ControlPanelConfig) -> Self {
        Self {
            cp: cp::ControlPanel::new(),
            config,
            io,
        }
    }

    pub fn add(&mut self, config: PeripheralConfig) -> PdIndex {
        self.cp.add(config)
    }

    pub fn inner(&self) -> &cp::ControlPanel {
        &self.cp
    }

    pub fn inner_mut(&mut self) -> &mut cp::ControlPanel {
        &mut self.cp
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    /// Transmit one frame to `pd` and wait for its reply.
    ///
    /// Sends the head of the peripheral's queue, or a poll if it is empty.
    /// No retries.
    /// # Errors
    /// Any protocol or I/O error. A read timeout shows up as
    /// [`Error::Io`] with [`ErrorKind::TimedOut`].
    pub fn exchange(&mut self, pd: PdIndex) -> Result<Reply, Error> {
        let mut exchange = self.cp.begin(pd)?;
        self.io.write_all(exchange.frame()).context(IoSnafu)?;
        self.io.flush().context(IoSnafu)?;

        let mut data = [0; 64];
        loop {
            let len = self.io.read(&mut data).context(IoSnafu)?;
            ensure!(len > 0, EofSnafu);
            match exchange.receive_data(&data[..len])? {
                Received::NeedData(next) => exchange = next,
                Received::Done(reply) => return Ok(reply),
            }
        }
    }

    /// Like [`exchange`](Self::exchange), resending after timeouts and
    /// corrupted replies.
    /// # Errors
    /// [`Error::RetriesExhausted`] if every attempt failed, or the first
    /// error that resending can't fix.
    pub fn poll(&mut self, pd: PdIndex) -> Result<Reply, Error> {
        let attempts = self.config.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.exchange(pd) {
                Err(err) if err.is_retriable() => {
                    warn!("pd {}: attempt {} failed: {}", pd.index(), attempt, err);
                    ensure!(attempt < attempts, RetriesExhaustedSnafu { attempts });
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Queue `command` for `pd` and run exchanges until the queue has drained.
    ///
    /// Commands queued earlier are sent first. Returns the final reply to
    /// `command`. A peripheral that keeps answering BUSY is given up on after
    /// the configured number of attempts, leaving the command queued.
    /// # Errors
    /// The queue error if `command` can't be queued, otherwise as
    /// [`poll`](Self::poll).
    pub fn send_command(&mut self, pd: PdIndex, command: Command) -> Result<Reply, Error> {
        self.cp.enqueue(pd, command)?;
        let attempts = self.config.attempts.max(1);
        let mut busy = 0;
        loop {
            let reply = self.poll(pd)?;
            if reply == Reply::Busy {
                busy += 1;
                ensure!(busy < attempts, RetriesExhaustedSnafu { attempts });
                continue;
            }
            busy = 0;
            if self.cp.peripheral(pd)?.queue().is_empty() {
                debug!("pd {}: queue drained", pd.index());
                return Ok(reply);
            }
        }
    }
}
