//! This module defines range-checked types for OSDP addresses, sequence
//! numbers and frame options, meant to simplify correct usage of the API.

use snafu::{ensure, OptionExt, Snafu};

use core::convert::{TryFrom, TryInto};
use core::ops::Deref;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The value isn't a valid peripheral address.
    #[snafu(display("Invalid address"))]
    InvalidAddress,
    /// The value isn't a valid sequence number.
    #[snafu(display("Invalid sequence number"))]
    InvalidSequence,
}

const fn invalid_address() -> InvalidAddressSnafu {
    InvalidAddressSnafu
}

/// Highest address value, reserved for broadcast.
const ADDRESS_MAX: u8 = 0x7f;

/// Bit set in the address byte of frames sent from a peripheral to the CP.
pub(crate) const REPLY_FLAG: u8 = 0x80;

/// Address is a range-checked [0, 0x7f] integer, representing a peripheral
/// address on the bus. 0x7f is the broadcast address.
///
/// ## Example
/// ```
/// use osdp_cp::Address;
/// use std::convert::TryInto;
/// let addr = Address::new(101).unwrap();
/// let addr: Address = 101.try_into().unwrap();
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct Address(u8);

/// Create a new [`Address`], panics if it is out of range.
pub const fn addr(a: u8) -> Address {
    if a <= ADDRESS_MAX {
        return Address(a);
    }
    panic!("Invalid address.")
}

impl Address {
    /// The broadcast address. Every peripheral accepts commands sent to it.
    pub const BROADCAST: Address = Address(ADDRESS_MAX);

    /// Create a new address, checking that the address is in \[0, 0x7f\].
    /// # Errors
    /// Returns [`Error::InvalidAddress`] if `address` is out of range.
    pub fn new(address: impl TryInto<u8>) -> Result<Self, Error> {
        let address = address.try_into().ok().with_context(invalid_address)?;
        ensure!(address <= ADDRESS_MAX, invalid_address());
        Ok(Self(address))
    }

    /// Returns true for the broadcast address.
    pub const fn is_broadcast(self) -> bool {
        self.0 == ADDRESS_MAX
    }

    /// The on-wire address byte for the given traffic direction.
    pub(crate) const fn to_byte(self, direction: Direction) -> u8 {
        match direction {
            Direction::Command => self.0,
            Direction::Reply => self.0 | REPLY_FLAG,
        }
    }

    /// Splits an on-wire address byte into address and direction.
    pub(crate) const fn from_byte(byte: u8) -> (Self, Direction) {
        let direction = if byte & REPLY_FLAG == 0 {
            Direction::Command
        } else {
            Direction::Reply
        };
        (Self(byte & ADDRESS_MAX), direction)
    }
}

impl Deref for Address {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Trait to convert `T: TryInto<u8>` into an [`Address`].
pub trait IntoAddress {
    /// Convert self to an Address.
    /// # Errors
    /// Returns `Error:InvalidAddress` if self isn't a valid address.
    fn into_address(self) -> Result<Address, Error>;
}

impl IntoAddress for Address {
    fn into_address(self) -> Result<Address, Error> {
        Ok(self)
    }
}

impl<T> IntoAddress for T
where
    T: TryInto<u8>,
{
    fn into_address(self) -> Result<Address, Error> {
        Address::new(self)
    }
}

impl TryFrom<usize> for Address {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}


/// Direction of a frame on the bus.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
    /// CP to peripheral.
    Command,
    /// Peripheral to CP.
    Reply,
}

/// The 2-bit rolling sequence number carried in the control byte.
///
/// Zero is only used after a (re)start of the link; afterwards the
/// number cycles 1, 2, 3, 1, ...
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash, Default)]
#[repr(transparent)]
pub struct SequenceNumber(u8);

impl SequenceNumber {
    /// Sequence number used on the first frame after a link reset.
    pub const ZERO: SequenceNumber = SequenceNumber(0);

    /// Create a new sequence number, checking that it is in \[0, 3\].
    /// # Errors
    /// Returns [`Error::InvalidSequence`] if `sequence` is out of range.
    pub fn new(sequence: u8) -> Result<Self, Error> {
        ensure!(sequence <= 3, InvalidSequenceSnafu);
        Ok(Self(sequence))
    }

    /// The number following this one. Zero is never returned.
    #[must_use]
    pub const fn next(self) -> Self {
        match self.0 {
            3 => Self(1),
            n => Self(n + 1),
        }
    }

    pub(crate) const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x03)
    }
}

impl Deref for SequenceNumber {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod sequence_tests {
    use super::SequenceNumber;

    #[test]
    fn test_sequence_cycle() {
        let mut seq = SequenceNumber::ZERO;
        let mut seen = Vec::new();
        for _ in 0..7 {
            seq = seq.next();
            seen.push(*seq);
        }
        assert_eq!(seen, [1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn test_sequence_range() {
        assert!(SequenceNumber::new(3).is_ok());
        assert!(SequenceNumber::new(4).is_err());
        assert_eq!(SequenceNumber::from_bits(0x07), SequenceNumber::new(3).unwrap());
    }
}

/// `TrailerMode` selects the integrity field appended to a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TrailerMode {
    /// One byte, two's complement of the byte sum.
    Checksum,
    /// Two bytes, CRC-16/AUG-CCITT, little-endian.
    Crc16,
}

impl TrailerMode {
    /// Number of trailer bytes on the wire.
    pub const fn len(self) -> usize {
        match self {
            TrailerMode::Checksum => 1,
            TrailerMode::Crc16 => 2,
        }
    }
}

impl Default for TrailerMode {
    fn default() -> Self {
        TrailerMode::Crc16
    }
}
