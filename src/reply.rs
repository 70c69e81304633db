//! Typed interpretation of reply payloads.

use arrayvec::ArrayVec;
use core::convert::TryFrom;
use snafu::{ensure, Snafu};

use crate::command::MAX_COMMAND_LEN;
use crate::nom_parser::reply as parser;

/// Reply codes.
pub mod code {
    pub const ACK: u8 = 0x40;
    pub const NAK: u8 = 0x41;
    pub const PDID: u8 = 0x45;
    pub const PDCAP: u8 = 0x46;
    pub const LSTATR: u8 = 0x48;
    pub const ISTATR: u8 = 0x49;
    pub const OSTATR: u8 = 0x4a;
    pub const RSTATR: u8 = 0x4b;
    pub const RAW: u8 = 0x50;
    pub const KEYPAD: u8 = 0x53;
    pub const COM: u8 = 0x54;
    pub const BUSY: u8 = 0x79;
}

const PDID_LEN: usize = 12;
const COM_LEN: usize = 5;
const LSTATR_LEN: usize = 2;
const RAW_HEADER_LEN: usize = 4;
const KEYPAD_HEADER_LEN: usize = 2;

/// Largest payload a reply can carry: everything but the code byte.
pub const MAX_PAYLOAD_LEN: usize = MAX_COMMAND_LEN - 1;

/// Owned copy of a reply payload.
pub type PayloadBytes = ArrayVec<u8, MAX_PAYLOAD_LEN>;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The payload is shorter than the layout of its reply code requires.
    #[snafu(display(
        "Reply 0x{:02x} needs {} payload bytes, got {}",
        code,
        expected,
        actual
    ))]
    ShortPayload {
        code: u8,
        expected: usize,
        actual: usize,
    },
    /// The payload doesn't match the layout of its reply code.
    #[snafu(display("Malformed payload in reply 0x{:02x}", code))]
    Malformed { code: u8 },
}

/// Peripheral self-identification.
///
/// `firmware_version` packs the three firmware bytes as
/// `major << 16 | minor << 8 | build`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
pub struct IdentityRecord {
    /// IEEE assigned OUI, 24 bits.
    pub vendor_code: u32,
    pub model: u8,
    pub version: u8,
    pub serial_number: u32,
    pub firmware_version: u32,
}

impl IdentityRecord {
    pub const fn firmware_major(&self) -> u8 {
        (self.firmware_version >> 16) as u8
    }

    pub const fn firmware_minor(&self) -> u8 {
        (self.firmware_version >> 8) as u8
    }

    pub const fn firmware_build(&self) -> u8 {
        self.firmware_version as u8
    }
}

/// One entry of the capabilities report.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Capability {
    pub function: u8,
    pub compliance: u8,
    pub items: u8,
}

/// Capability list, three payload bytes per entry.
pub type Capabilities = ArrayVec<Capability, { MAX_PAYLOAD_LEN / 3 }>;

/// Local status report.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
pub struct LocalStatus {
    pub tamper: bool,
    pub power_failure: bool,
}

/// Communication settings confirmed by the peripheral after a COMSET.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ComSettings {
    /// Raw address byte as reported by the peripheral.
    pub address: u8,
    pub baud_rate: u32,
}

/// Card data in raw bit format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardData {
    pub reader: u8,
    pub format: u8,
    pub bit_count: u16,
    pub data: PayloadBytes,
}

/// Keypad digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeypadData {
    pub reader: u8,
    pub digits: PayloadBytes,
}

/// Error codes carried in a NAK reply.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NakCode {
    None,
    /// The peripheral saw a bad checksum or CRC.
    BadTrailer,
    CommandLength,
    UnknownCommand,
    /// Unexpected sequence number; the CP should restart at zero.
    SequenceNumber,
    SecureBlockUnsupported,
    EncryptionRequired,
    BioTypeUnsupported,
    BioFormatUnsupported,
    RecordUnprocessable,
    Other(u8),
}

impl From<u8> for NakCode {
    fn from(value: u8) -> Self {
        match value {
            0 => NakCode::None,
            1 => NakCode::BadTrailer,
            2 => NakCode::CommandLength,
            3 => NakCode::UnknownCommand,
            4 => NakCode::SequenceNumber,
            5 => NakCode::SecureBlockUnsupported,
            6 => NakCode::EncryptionRequired,
            7 => NakCode::BioTypeUnsupported,
            8 => NakCode::BioFormatUnsupported,
            9 => NakCode::RecordUnprocessable,
            other => NakCode::Other(other),
        }
    }
}

/// A decoded reply from a peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Nak(NakCode),
    Id(IdentityRecord),
    Capabilities(Capabilities),
    LocalStatus(LocalStatus),
    /// One byte per input, nonzero when active.
    InputStatus(PayloadBytes),
    /// One byte per output, nonzero when active.
    OutputStatus(PayloadBytes),
    /// One byte per reader, nonzero on tamper.
    ReaderStatus(PayloadBytes),
    Com(ComSettings),
    RawCard(CardData),
    Keypad(KeypadData),
    /// The peripheral is busy; the command should be resent unchanged.
    Busy,
    /// A reply code without a typed layout.
    Unknown { code: u8, payload: PayloadBytes },
}

fn need(code: u8, payload: &[u8], expected: usize) -> Result<(), Error> {
    ensure!(
        payload.len() >= expected,
        ShortPayloadSnafu {
            code,
            expected,
            actual: payload.len()
        }
    );
    Ok(())
}

fn copy(code: u8, bytes: &[u8]) -> Result<PayloadBytes, Error> {
    PayloadBytes::try_from(bytes).map_err(|_| Error::Malformed { code })
}

impl Reply {
    /// Interpret the payload of a reply with the given code.
    /// # Errors
    /// [`Error::ShortPayload`] if the payload is too short for a fixed
    /// layout, [`Error::Malformed`] if it doesn't fit a variable one.
    pub fn parse(code: u8, payload: &[u8]) -> Result<Self, Error> {
        let reply = match code {
            code::ACK => Reply::Ack,
            code::BUSY => Reply::Busy,
            code::NAK => {
                need(code, payload, 1)?;
                Reply::Nak(payload[0].into())
            }
            code::PDID => {
                need(code, payload, PDID_LEN)?;
                let (_, id) = parser::pd_id(payload).map_err(|_| Error::Malformed { code })?;
                Reply::Id(id)
            }
            code::PDCAP => {
                ensure!(payload.len() % 3 == 0, MalformedSnafu { code });
                let mut caps = Capabilities::new();
                for triple in payload.chunks_exact(3) {
                    caps.try_push(Capability {
                        function: triple[0],
                        compliance: triple[1],
                        items: triple[2],
                    })
                    .map_err(|_| Error::Malformed { code })?;
                }
                Reply::Capabilities(caps)
            }
            code::LSTATR => {
                need(code, payload, LSTATR_LEN)?;
                let (_, (tamper, power)) =
                    parser::local_status(payload).map_err(|_| Error::Malformed { code })?;
                Reply::LocalStatus(LocalStatus {
                    tamper: tamper != 0,
                    power_failure: power != 0,
                })
            }
            code::ISTATR => Reply::InputStatus(copy(code, payload)?),
            code::OSTATR => Reply::OutputStatus(copy(code, payload)?),
            code::RSTATR => Reply::ReaderStatus(copy(code, payload)?),
            code::COM => {
                need(code, payload, COM_LEN)?;
                let (_, (address, baud_rate)) =
                    parser::com(payload).map_err(|_| Error::Malformed { code })?;
                Reply::Com(ComSettings { address, baud_rate })
            }
            code::RAW => {
                need(code, payload, RAW_HEADER_LEN)?;
                let (_, (reader, format, bit_count, data)) =
                    parser::raw_card(payload).map_err(|_| Error::Malformed { code })?;
                ensure!(
                    data.len() == (usize::from(bit_count) + 7) / 8,
                    MalformedSnafu { code }
                );
                Reply::RawCard(CardData {
                    reader,
                    format,
                    bit_count,
                    data: copy(code, data)?,
                })
            }
            code::KEYPAD => {
                need(code, payload, KEYPAD_HEADER_LEN)?;
                let (_, (reader, digits)) =
                    parser::keypad(payload).map_err(|_| Error::Malformed { code })?;
                Reply::Keypad(KeypadData {
                    reader,
                    digits: copy(code, digits)?,
                })
            }
            code => Reply::Unknown {
                code,
                payload: copy(code, payload)?,
            },
        };
        Ok(reply)
    }

    /// Interpret `code + payload` bytes.
    /// # Errors
    /// See [`Reply::parse`]; empty input is a [`Error::ShortPayload`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        match bytes.split_first() {
            Some((code, payload)) => Self::parse(*code, payload),
            None => ShortPayloadSnafu {
                code: 0_u8,
                expected: 1_usize,
                actual: 0_usize,
            }
            .fail(),
        }
    }

    /// The reply code this variant was decoded from.
    pub fn code(&self) -> u8 {
        match self {
            Reply::Ack => code::ACK,
            Reply::Nak(_) => code::NAK,
            Reply::Id(_) => code::PDID,
            Reply::Capabilities(_) => code::PDCAP,
            Reply::LocalStatus(_) => code::LSTATR,
            Reply::InputStatus(_) => code::ISTATR,
            Reply::OutputStatus(_) => code::OSTATR,
            Reply::ReaderStatus(_) => code::RSTATR,
            Reply::Com(_) => code::COM,
            Reply::RawCard(_) => code::RAW,
            Reply::Keypad(_) => code::KEYPAD,
            Reply::Busy => code::BUSY,
            Reply::Unknown { code, .. } => *code,
        }
    }
}
