//! Frame codec: builds outbound frames and validates inbound ones.
//!
//! On-wire layout:
//! ```text
//! offset  0     1     2      3..4        5      6      7..       last 1 or 2
//!        MARK  SOM   ADDR   LEN (LE)    CTRL   CODE   PAYLOAD   TRAILER
//!        0xff  0x53
//! ```
//! `LEN` counts the bytes from `SOM` through the trailer. `CTRL` carries the
//! sequence number in bits 0..1 and selects the trailer kind in bit 2.
//! Both trailers cover `SOM` through the end of the payload.

use arrayvec::ArrayVec;
use crc::{Crc, CRC_16_SPI_FUJITSU};
use log::{debug, trace, warn};
use snafu::{ensure, Snafu};

use crate::command::MAX_COMMAND_LEN;
use crate::nom_parser::{parse_frame, FrameToken};
use crate::types::{Address, Direction, SequenceNumber, TrailerMode};

pub(crate) const MARK: u8 = 0xff;
pub(crate) const SOM: u8 = 0x53;

/// Bytes from `MARK` through `CTRL`.
pub const HEADER_LEN: usize = 6;
/// Smallest possible frame: header, code and a checksum byte.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 1 + 1;
/// Largest frame this codec builds or accepts.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_COMMAND_LEN + 2;

const OFFSET_ADDR: usize = 2;
const OFFSET_LEN: usize = 3;
const OFFSET_CTRL: usize = 5;
const OFFSET_CODE: usize = 6;

const CTRL_SEQUENCE: u8 = 0x03;
const CTRL_CRC: u8 = 0x04;
const CTRL_SECURE: u8 = 0x08;

// Polynomial 0x1021, initial value 0x1d0f, unreflected (AUG-CCITT).
static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_SPI_FUJITSU);

/// Fixed size storage for one frame.
pub type FrameBytes = ArrayVec<u8, MAX_FRAME_LEN>;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The output buffer can't hold the frame.
    #[snafu(display("Frame needs {} bytes, buffer holds {}", needed, capacity))]
    CapacityExceeded { needed: usize, capacity: usize },
    /// Code and payload exceed the protocol maximum.
    #[snafu(display("Payload of {} bytes exceeds the maximum of {}", len, max))]
    PayloadTooLarge { len: usize, max: usize },
    /// No command code was given.
    #[snafu(display("Empty command"))]
    EmptyCommand,
    /// The frame doesn't start with the start-of-message marker.
    #[snafu(display("Bad start of frame"))]
    BadSyncByte,
    /// Too few bytes to hold a header and a trailer.
    #[snafu(display("Frame of {} bytes is too short", len))]
    TooShort { len: usize },
    /// More bytes than the largest valid frame.
    #[snafu(display("Frame of {} bytes is too long", len))]
    TooLong { len: usize },
    /// The length field doesn't match the received byte count.
    #[snafu(display("Frame length field is {}, received {}", declared, actual))]
    LengthMismatch { declared: usize, actual: usize },
    /// The checksum or CRC doesn't match.
    #[snafu(display("Frame integrity check failed"))]
    IntegrityError,
    /// The frame carries a secure channel block.
    #[snafu(display("Secure channel frames are not supported"))]
    SecureChannelUnsupported,
    /// The frame isn't addressed the way we expect.
    #[snafu(display("Unexpected address byte 0x{:02x}", found))]
    AddressMismatch { found: u8 },
}

/// Two's complement of the byte sum, so that data plus checksum sums to zero.
pub(crate) fn checksum(data: &[u8]) -> u8 {
    data.iter()
        .fold(0_u8, |sum, byte| sum.wrapping_add(*byte))
        .wrapping_neg()
}

pub(crate) fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// A frame to be serialised, staged field by field.
///
/// The encoded length is known before any byte is written, so a draft is
/// serialised in a single pass once it is complete.
///
/// ```
/// use osdp_cp::frame::FrameDraft;
/// use osdp_cp::{addr, SequenceNumber, TrailerMode};
///
/// let frame = FrameDraft::command(addr(101), 0x60, &[])
///     .sequence(SequenceNumber::ZERO)
///     .trailer(TrailerMode::Crc16)
///     .to_frame()
///     .unwrap();
/// assert_eq!(frame.as_slice(), &[0xff, 0x53, 0x65, 0x08, 0x00, 0x04, 0x60, 0x60, 0x90]);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameDraft<'a> {
    address: Address,
    direction: Direction,
    sequence: SequenceNumber,
    trailer: TrailerMode,
    code: u8,
    payload: &'a [u8],
}

impl<'a> FrameDraft<'a> {
    /// Start a CP to peripheral frame.
    pub fn command(address: Address, code: u8, payload: &'a [u8]) -> Self {
        Self::new(address, Direction::Command, code, payload)
    }

    /// Start a peripheral to CP frame.
    pub fn reply(address: Address, code: u8, payload: &'a [u8]) -> Self {
        Self::new(address, Direction::Reply, code, payload)
    }

    fn new(address: Address, direction: Direction, code: u8, payload: &'a [u8]) -> Self {
        Self {
            address,
            direction,
            sequence: SequenceNumber::ZERO,
            trailer: TrailerMode::default(),
            code,
            payload,
        }
    }

    #[must_use]
    pub fn sequence(mut self, sequence: SequenceNumber) -> Self {
        self.sequence = sequence;
        self
    }

    #[must_use]
    pub fn trailer(mut self, trailer: TrailerMode) -> Self {
        self.trailer = trailer;
        self
    }

    /// Total number of bytes the frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + 1 + self.payload.len() + self.trailer.len()
    }

    fn control(&self) -> u8 {
        let crc = match self.trailer {
            TrailerMode::Checksum => 0,
            TrailerMode::Crc16 => CTRL_CRC,
        };
        *self.sequence | crc
    }

    /// Serialise into `out`, returning the number of bytes written.
    /// # Errors
    /// [`Error::PayloadTooLarge`] if code and payload exceed the protocol
    /// maximum, [`Error::CapacityExceeded`] if `out` is too small.
    pub fn write_into(&self, out: &mut [u8]) -> Result<usize, Error> {
        let command_len = 1 + self.payload.len();
        ensure!(
            command_len <= MAX_COMMAND_LEN,
            PayloadTooLargeSnafu {
                len: command_len,
                max: MAX_COMMAND_LEN
            }
        );
        let len = self.encoded_len();
        ensure!(
            out.len() >= len,
            CapacityExceededSnafu {
                needed: len,
                capacity: out.len()
            }
        );

        let [len_lsb, len_msb] = ((len - 1) as u16).to_le_bytes();
        out[..=OFFSET_CODE].copy_from_slice(&[
            MARK,
            SOM,
            self.address.to_byte(self.direction),
            len_lsb,
            len_msb,
            self.control(),
            self.code,
        ]);
        let body_end = OFFSET_CODE + command_len;
        out[OFFSET_CODE + 1..body_end].copy_from_slice(self.payload);

        match self.trailer {
            TrailerMode::Checksum => {
                let sum = checksum(&out[1..body_end]);
                out[body_end] = sum;
            }
            TrailerMode::Crc16 => {
                let crc = crc16(&out[1..body_end]).to_le_bytes();
                out[body_end..len].copy_from_slice(&crc);
            }
        }

        debug!(
            "built frame addr={} seq={} code=0x{:02x} len={}",
            *self.address, *self.sequence, self.code, len
        );
        trace!("frame bytes {:02x?}", &out[..len]);
        Ok(len)
    }

    /// Serialise into a new fixed size buffer.
    /// # Errors
    /// [`Error::PayloadTooLarge`] if code and payload exceed the protocol maximum.
    pub fn to_frame(&self) -> Result<FrameBytes, Error> {
        let mut buf = [0; MAX_FRAME_LEN];
        let len = self.write_into(&mut buf)?;
        let mut frame = FrameBytes::from(buf);
        frame.truncate(len);
        Ok(frame)
    }
}

/// Build a CP to peripheral frame from encoded `code + body` bytes.
///
/// Returns the number of bytes written to `out`.
/// # Errors
/// See [`FrameDraft::write_into`]; an empty `command` gives [`Error::EmptyCommand`].
pub fn build(
    address: Address,
    command: &[u8],
    sequence: SequenceNumber,
    trailer: TrailerMode,
    out: &mut [u8],
) -> Result<usize, Error> {
    let (code, body) = command.split_first().ok_or(Error::EmptyCommand)?;
    FrameDraft::command(address, *code, body)
        .sequence(sequence)
        .trailer(trailer)
        .write_into(out)
}

/// A validated frame, borrowing its payload from the input buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    pub address: Address,
    pub direction: Direction,
    pub sequence: SequenceNumber,
    pub trailer: TrailerMode,
    /// Command or reply code.
    pub code: u8,
    pub payload: &'a [u8],
}

/// Validate a complete frame and split it into its fields.
///
/// Checks, in order: the start marker, the length field against the
/// received byte count, the trailer, and finally the address byte against
/// `direction` and `expected`. A broadcast or `None` expectation accepts
/// any address.
/// # Errors
/// The first failed check, as an [`Error`] variant.
pub fn decode(
    frame: &[u8],
    direction: Direction,
    expected: Option<Address>,
) -> Result<DecodedFrame<'_>, Error> {
    ensure!(frame.len() >= 2 && frame[..2] == [MARK, SOM], BadSyncByteSnafu);
    ensure!(
        frame.len() >= MIN_FRAME_LEN,
        TooShortSnafu { len: frame.len() }
    );

    ensure!(
        frame.len() <= MAX_FRAME_LEN,
        TooLongSnafu { len: frame.len() }
    );

    let declared = u16::from_le_bytes([frame[OFFSET_LEN], frame[OFFSET_LEN + 1]]) as usize;
    let actual = frame.len() - 1;
    ensure!(declared == actual, LengthMismatchSnafu { declared, actual });

    let control = frame[OFFSET_CTRL];
    let trailer = if control & CTRL_CRC == 0 {
        TrailerMode::Checksum
    } else {
        TrailerMode::Crc16
    };
    ensure!(
        frame.len() >= HEADER_LEN + 1 + trailer.len(),
        TooShortSnafu { len: frame.len() }
    );
    let body_end = frame.len() - trailer.len();
    let valid = match trailer {
        TrailerMode::Checksum => checksum(&frame[1..body_end]) == frame[body_end],
        TrailerMode::Crc16 => {
            crc16(&frame[1..body_end]).to_le_bytes() == [frame[body_end], frame[body_end + 1]]
        }
    };
    if !valid {
        warn!("dropping frame with bad {:?} trailer", trailer);
        return IntegritySnafu.fail();
    }
    ensure!(control & CTRL_SECURE == 0, SecureChannelUnsupportedSnafu);

    let found = frame[OFFSET_ADDR];
    let (address, frame_direction) = Address::from_byte(found);
    let address_ok = match expected {
        Some(expected) => expected.is_broadcast() || expected == address,
        None => true,
    };
    ensure!(
        frame_direction == direction && address_ok,
        AddressMismatchSnafu { found }
    );

    let decoded = DecodedFrame {
        address,
        direction,
        sequence: SequenceNumber::from_bits(control & CTRL_SEQUENCE),
        trailer,
        code: frame[OFFSET_CODE],
        payload: &frame[OFFSET_CODE + 1..body_end],
    };
    debug!(
        "decoded frame addr={} seq={} code=0x{:02x} payload={}",
        *decoded.address,
        *decoded.sequence,
        decoded.code,
        decoded.payload.len()
    );
    Ok(decoded)
}

/// [`decode`] for frames received by the CP.
/// # Errors
/// See [`decode`].
pub fn decode_reply(frame: &[u8], expected: Address) -> Result<DecodedFrame<'_>, Error> {
    decode(frame, Direction::Reply, Some(expected))
}

/// [`decode`] for frames received by a peripheral.
/// # Errors
/// See [`decode`].
pub fn decode_command(frame: &[u8], expected: Address) -> Result<DecodedFrame<'_>, Error> {
    decode(frame, Direction::Command, Some(expected))
}

/// Find the first complete frame in a stream of received bytes.
///
/// Returns the number of bytes to drop from the front of `buf`, and the
/// frame if one is complete. Line noise ahead of the frame is counted in the
/// bytes to drop, and so is the frame itself. The frame is not validated;
/// pass it to [`decode`].
pub fn split(buf: &[u8]) -> (usize, Option<&[u8]>) {
    let mut consumed = 0;
    loop {
        match parse_frame(&buf[consumed..]) {
            (len, FrameToken::Frame(frame)) => return (consumed + len, Some(frame)),
            (len, FrameToken::Garbage) => consumed += len,
            (len, FrameToken::NeedData) => return (consumed + len, None),
        }
    }
}
