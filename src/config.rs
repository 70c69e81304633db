//! Configuration for peripherals and the control panel.

use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::types::{Address, Error, IntoAddress, TrailerMode};

/// Per-peripheral settings supplied by the session layer.
///
/// ```
/// use osdp_cp::{PeripheralConfig, TrailerMode};
/// let config = PeripheralConfig::new(101)
///     .unwrap()
///     .baud_rate(115_200)
///     .trailer(TrailerMode::Checksum);
/// assert_eq!(*config.address, 101);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PeripheralConfig {
    pub address: Address,
    pub baud_rate: u32,
    pub trailer: TrailerMode,
    pub queue_capacity: usize,
}

impl PeripheralConfig {
    /// Settings for the peripheral at `address`, 9600 baud, CRC trailers.
    /// # Errors
    /// Returns [`Error::InvalidAddress`] if `address` is out of range.
    pub fn new(address: impl IntoAddress) -> Result<Self, Error> {
        Ok(Self {
            address: address.into_address()?,
            baud_rate: 9600,
            trailer: TrailerMode::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        })
    }

    #[must_use]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    #[must_use]
    pub fn trailer(mut self, trailer: TrailerMode) -> Self {
        self.trailer = trailer;
        self
    }

    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// Retransmission policy for the blocking I/O adapter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ControlPanelConfig {
    /// Transmissions of one frame before giving up, the first included.
    pub attempts: u8,
}

impl Default for ControlPanelConfig {
    fn default() -> Self {
        Self { attempts: 3 }
    }
}
