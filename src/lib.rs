//! Control panel (CP) side of the OSDP access control protocol.
//!
//! The core is sans-io: [`cp::ControlPanel`] builds the frames to send and
//! interprets the bytes received, leaving timing and transport to the
//! caller. [`cp::io::ControlPanel`] drives it over any blocking
//! `Read + Write` serial port.
//!
//! Lower layers are usable on their own: [`frame`] encodes and validates
//! wire frames, [`command`] and [`reply`] map codes and payloads to typed
//! values, and [`queue`] holds the outbound commands of one peripheral.

mod buffer;
pub mod command;
pub mod config;
pub mod cp;
pub mod frame;
mod nom_parser;
pub mod peripheral;
pub mod queue;
pub mod reply;
mod types;

pub use command::Command;
pub use config::{ControlPanelConfig, PeripheralConfig};
pub use cp::{ControlPanel, Exchange, PdIndex, Received};
pub use peripheral::Peripheral;
pub use queue::{CommandQueue, QueueEntry};
pub use reply::{IdentityRecord, Reply};
pub use types::{
    addr, Address, Direction, Error as TypeError, IntoAddress, SequenceNumber, TrailerMode,
};
