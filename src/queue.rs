//! Per-peripheral queue of outbound commands.
//!
//! Only the head entry is ever transmitted. [`CommandQueue::peek`] hands out
//! the head for (re)transmission without removing it, so a retry resends the
//! exact same bytes. [`CommandQueue::dequeue`] is the only way to remove an
//! entry, and is called once the peripheral has acknowledged it.

use std::collections::VecDeque;

use log::{debug, trace};
use snafu::{ensure, Snafu};

use crate::command::{self, Command, CommandBytes};

/// Number of queue slots used when nothing else is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// All slots are taken.
    #[snafu(display("Command queue full ({} entries)", capacity))]
    QueueFull { capacity: usize },
    /// The command couldn't be encoded.
    #[snafu(context(false), display("{}", source))]
    Encode { source: command::Error },
}

/// A queued command together with its encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    command: Command,
    bytes: CommandBytes,
    attempts: u8,
}

impl QueueEntry {
    /// Encode `command` into a new entry.
    /// # Errors
    /// Returns the encoding error if the command doesn't fit in a frame.
    pub fn new(command: Command) -> Result<Self, command::Error> {
        let bytes = command.encode()?;
        Ok(Self {
            command,
            bytes,
            attempts: 0,
        })
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Encoded `code + body`, as handed to the frame codec.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// How many times this entry has been transmitted.
    pub fn attempts(&self) -> u8 {
        self.attempts
    }
}

/// Bounded FIFO of pending commands for one peripheral.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// A queue holding at most `capacity` commands. The capacity is at least one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a command at the tail.
    /// # Errors
    /// [`Error::QueueFull`] when all slots are taken, [`Error::Encode`] if the
    /// command doesn't fit in a frame. The queue is unchanged on error.
    pub fn enqueue(&mut self, command: Command) -> Result<(), Error> {
        ensure!(
            self.entries.len() < self.capacity,
            QueueFullSnafu {
                capacity: self.capacity
            }
        );
        let entry = QueueEntry::new(command)?;
        trace!("enqueue {:02x?}", entry.bytes());
        self.entries.push_back(entry);
        Ok(())
    }

    /// The head entry, left in place.
    pub fn peek(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    /// Remove and return the head entry.
    pub fn dequeue(&mut self) -> Option<QueueEntry> {
        let entry = self.entries.pop_front()?;
        debug!(
            "dequeue command 0x{:02x} after {} attempt(s)",
            entry.command.code(),
            entry.attempts
        );
        Some(entry)
    }

    /// Count one transmission of the head entry, returning the new total.
    pub fn note_attempt(&mut self) -> Option<u8> {
        let head = self.entries.front_mut()?;
        head.attempts = head.attempts.saturating_add(1);
        Some(head.attempts)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every pending command.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
