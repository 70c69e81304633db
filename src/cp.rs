//! Control panel: drives command/reply exchanges with the peripherals.
//!
//! This is the sans-io core. [`ControlPanel::begin`] picks what to send to a
//! peripheral (the head of its queue, or an idle poll) and builds the frame.
//! The caller transmits [`Exchange::frame`] and feeds the bytes received
//! back into [`Exchange::receive_data`] until a reply has been decoded.
//!
//! A queued command is removed only once the peripheral has answered it
//! with a final reply. If the exchange is dropped instead (timeout, line
//! noise), the command stays at the head of the queue and the next exchange
//! resends it unchanged, sequence number included.
//!
//! # Example
//!
//! ```
//! use osdp_cp::cp::{ControlPanel, Received};
//! use osdp_cp::{PeripheralConfig, Reply};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cp = ControlPanel::new();
//! let pd = cp.add(PeripheralConfig::new(101)?);
//!
//! let exchange = cp.begin(pd)?;
//! assert_eq!(exchange.frame(), &[0xff, 0x53, 0x65, 0x08, 0x00, 0x04, 0x60, 0x60, 0x90]);
//! // ... transmit the frame, then feed the reply bytes back:
//! match exchange.receive_data(&[0xff, 0x53, 0xe5, 0x08, 0x00, 0x04, 0x40, 0xd2, 0x96])? {
//!     Received::Done(reply) => assert_eq!(reply, Reply::Ack),
//!     Received::NeedData(_) => unreachable!(),
//! }
//! # Ok(()) }
//! ```

#[cfg(feature = "std")]
pub mod io;

use log::{debug, warn};
use snafu::{OptionExt, Snafu};

use crate::buffer::Buffer;
use crate::command::{self, Command, CommandBytes};
use crate::config::PeripheralConfig;
use crate::frame::{self, FrameBytes, FrameDraft};
use crate::nom_parser::{parse_frame, FrameToken};
use crate::peripheral::Peripheral;
use crate::queue;
use crate::reply::{self, NakCode, Reply};
use crate::types::SequenceNumber;

/// Error type for this module
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// No peripheral with this index.
    #[snafu(display("No peripheral at index {}", index))]
    UnknownPeripheral { index: usize },
    /// The reply answers a different transmission.
    #[snafu(display("Reply carries seq {}, request was seq {}", found, expected))]
    SequenceMismatch { expected: u8, found: u8 },
    #[snafu(context(false), display("Frame error: {}", source))]
    Frame { source: frame::Error },
    #[snafu(context(false), display("Reply error: {}", source))]
    Reply { source: reply::Error },
    #[snafu(context(false), display("Queue error: {}", source))]
    Queue { source: queue::Error },
    #[snafu(context(false), display("Command error: {}", source))]
    Command { source: command::Error },
}

impl Error {
    /// True for errors caused by what was received. Resending the same
    /// frame may succeed.
    pub fn is_transmission_error(&self) -> bool {
        matches!(
            self,
            Error::Frame { .. } | Error::Reply { .. } | Error::SequenceMismatch { .. }
        )
    }
}

/// Handle to one peripheral of a [`ControlPanel`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PdIndex(usize);

impl PdIndex {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// The roster of peripherals driven by this CP.
#[derive(Debug, Default)]
pub struct ControlPanel {
    peripherals: Vec<Peripheral>,
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peripheral to the roster.
    pub fn add(&mut self, config: PeripheralConfig) -> PdIndex {
        self.peripherals.push(Peripheral::new(config));
        PdIndex(self.peripherals.len() - 1)
    }

    /// Handles of all peripherals, in the order they were added.
    pub fn pds(&self) -> impl Iterator<Item = PdIndex> {
        (0..self.peripherals.len()).map(PdIndex)
    }

    /// # Errors
    /// [`Error::UnknownPeripheral`] if `pd` isn't part of this roster.
    pub fn peripheral(&self, pd: PdIndex) -> Result<&Peripheral, Error> {
        self.peripherals
            .get(pd.0)
            .context(UnknownPeripheralSnafu { index: pd.0 })
    }

    /// # Errors
    /// [`Error::UnknownPeripheral`] if `pd` isn't part of this roster.
    pub fn peripheral_mut(&mut self, pd: PdIndex) -> Result<&mut Peripheral, Error> {
        self.peripherals
            .get_mut(pd.0)
            .context(UnknownPeripheralSnafu { index: pd.0 })
    }

    /// Queue a command for `pd`.
    /// # Errors
    /// The queue error if the command can't be queued.
    pub fn enqueue(&mut self, pd: PdIndex, command: Command) -> Result<(), Error> {
        self.peripheral_mut(pd)?.enqueue(command)?;
        Ok(())
    }

    /// Start an exchange with `pd`, building the frame to transmit.
    /// # Errors
    /// [`Error::UnknownPeripheral`], or a frame error if the head command
    /// can't be framed.
    pub fn begin(&mut self, pd: PdIndex) -> Result<Exchange<'_>, Error> {
        let pd = self.peripheral_mut(pd)?;
        Exchange::new(pd)
    }
}

/// Outcome of feeding data into an [`Exchange`].
#[derive(Debug)]
pub enum Received<'a> {
    /// No complete frame yet.
    NeedData(Exchange<'a>),
    /// The reply to the transmitted frame.
    Done(Reply),
}

/// One frame sent to a peripheral, waiting for its reply.
#[derive(Debug)]
pub struct Exchange<'a> {
    pd: &'a mut Peripheral,
    frame: FrameBytes,
    from_queue: bool,
    sequence: SequenceNumber,
    retransmit: bool,
    buffer: Buffer,
}

impl<'a> Exchange<'a> {
    fn new(pd: &'a mut Peripheral) -> Result<Self, Error> {
        let (command, from_queue): (CommandBytes, bool) = match pd.queue().peek() {
            Some(entry) => (entry.bytes().iter().copied().collect(), true),
            None => (Command::Poll.encode()?, false),
        };
        let (sequence, retransmit) = pd.transmit_sequence(from_queue);
        let (code, body) = command.split_first().ok_or(frame::Error::EmptyCommand)?;
        let frame = FrameDraft::command(pd.address(), *code, body)
            .sequence(sequence)
            .trailer(pd.trailer())
            .to_frame()?;
        if retransmit {
            debug!("pd {}: resending seq {}", *pd.address(), *sequence);
        }
        if from_queue {
            pd.queue_mut().note_attempt();
        }
        Ok(Self {
            pd,
            frame,
            from_queue,
            sequence,
            retransmit,
            buffer: Buffer::new(),
        })
    }

    /// The frame to transmit.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// True if this frame repeats an unanswered one.
    pub fn is_retransmission(&self) -> bool {
        self.retransmit
    }

    /// True if the frame carries a queued command rather than an idle poll.
    pub fn is_command(&self) -> bool {
        self.from_queue
    }

    /// Give up on the reply. The next exchange with this peripheral resends
    /// the same frame.
    pub fn abandon(self) {
        debug!("pd {}: no reply to seq {}", *self.pd.address(), *self.sequence);
    }

    /// Feed received bytes, parsing the buffer afterwards.
    ///
    /// Bytes ahead of a frame are discarded. The first complete frame
    /// ends the exchange, successfully or not.
    /// # Errors
    /// A frame or reply error if the received frame is invalid, or
    /// [`Error::SequenceMismatch`] if it answers another transmission. The
    /// queued command is kept for retransmission.
    pub fn receive_data(mut self, data: &[u8]) -> Result<Received<'a>, Error> {
        self.buffer.write(data);
        loop {
            let result = match parse_frame(self.buffer.as_ref()) {
                (consumed, FrameToken::NeedData) => {
                    self.buffer.consume(consumed);
                    return Ok(Received::NeedData(self));
                }
                (consumed, FrameToken::Garbage) => {
                    warn!("pd {}: skipping line noise", *self.pd.address());
                    self.buffer.consume(consumed);
                    continue;
                }
                (_, FrameToken::Frame(frame)) => self.decode(frame),
            };
            let reply = result?;
            return Ok(Received::Done(self.complete(reply)));
        }
    }

    fn decode(&self, frame: &[u8]) -> Result<Reply, Error> {
        let decoded = frame::decode_reply(frame, self.pd.address())?;
        if decoded.sequence != self.sequence {
            warn!(
                "pd {}: dropping reply seq {} for request seq {}",
                *decoded.address, *decoded.sequence, *self.sequence
            );
            return SequenceMismatchSnafu {
                expected: *self.sequence,
                found: *decoded.sequence,
            }
            .fail();
        }
        Ok(Reply::parse(decoded.code, decoded.payload)?)
    }

    // Called once per decoded reply, not on errors.
    fn complete(self, reply: Reply) -> Reply {
        match &reply {
            Reply::Busy => {
                debug!("pd {}: busy", *self.pd.address());
                // resend unchanged
            }
            Reply::Nak(code) => {
                warn!("pd {}: NAK {:?}", *self.pd.address(), code);
                if self.from_queue {
                    self.pd.queue_mut().dequeue();
                }
                if *code == NakCode::SequenceNumber {
                    self.pd.reset_sequence();
                } else {
                    self.pd.confirm();
                }
            }
            reply => {
                self.pd.apply_reply(reply);
                if self.from_queue {
                    self.pd.queue_mut().dequeue();
                }
                self.pd.confirm();
            }
        }
        reply
    }
}
