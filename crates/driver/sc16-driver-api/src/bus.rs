//! Register bus contract.
//!
//! The SC16IS7x2 exposes 16 byte-wide registers per channel behind a single
//! bus address. Every transaction starts with a sub-address byte that
//! selects the register and channel:
//!
//! ```text
//!   bit   7     6..3      2..1     0
//!       [R/W] [register] [channel] [0]
//! ```
//!
//! I2C/SMBus transports carry direction in the bus protocol and leave bit 7
//! clear; SPI transports set it for reads. [`SubAddress`] encodes the common
//! part and [`SubAddress::with_direction`] adds the bit for SPI.

use core::fmt;

use crate::error::BusError;

/// Largest payload of a single SMBus block transfer.
pub const SMBUS_BLOCK_MAX: usize = 32;

/// Number of UART channels on a dual-channel bridge.
pub const CHANNEL_COUNT: usize = 2;

/// One of the chip's UART channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    /// Channel A.
    pub const A: Self = Self(0);
    /// Channel B.
    pub const B: Self = Self(1);

    /// Both channels, in order.
    pub const ALL: [Self; CHANNEL_COUNT] = [Self::A, Self::B];

    /// Returns the channel with the given number, if it exists.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < CHANNEL_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Returns the channel number as an array index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the channel number.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Transfer direction, for transports that encode it in the sub-address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host reads from the chip.
    Read,
    /// Host writes to the chip.
    Write,
}

/// Encoded register/channel selector.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubAddress(u8);

impl SubAddress {
    /// Read flag used by SPI transports.
    pub const READ_FLAG: u8 = 0x80;

    /// Encodes `(register << 3) | (channel << 1)`. Only the low four
    /// register bits are significant.
    #[must_use]
    pub const fn new(register: u8, channel: ChannelIndex) -> Self {
        Self(((register & 0x0F) << 3) | ((channel.0 & 0x03) << 1))
    }

    /// Rebuilds a sub-address from its wire byte, ignoring the read flag.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & !Self::READ_FLAG & !0x01)
    }

    /// Returns the wire byte without direction.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns the wire byte with the direction bit applied.
    #[must_use]
    pub const fn with_direction(self, dir: Direction) -> u8 {
        match dir {
            Direction::Read => self.0 | Self::READ_FLAG,
            Direction::Write => self.0,
        }
    }

    /// Returns the register number.
    #[must_use]
    pub const fn register(self) -> u8 {
        (self.0 >> 3) & 0x0F
    }

    /// Returns the channel.
    #[must_use]
    pub const fn channel(self) -> ChannelIndex {
        ChannelIndex((self.0 >> 1) & 0x03)
    }
}

impl fmt::Debug for SubAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubAddress({:#04x}: reg {:#x} {})", self.0, self.register(), self.channel())
    }
}

/// Byte and block access to chip registers.
///
/// Transactions are blocking and the implementation serializes them: two
/// channels may call in concurrently, but only one transaction is on the
/// wire at a time. Methods take `&self` for that reason.
pub trait RegisterBus: Send + Sync {
    /// Largest block the transport moves in one transaction.
    fn max_block_len(&self) -> usize {
        SMBUS_BLOCK_MAX
    }

    /// Reads one register.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the transaction fails.
    fn read_byte(&self, addr: SubAddress) -> Result<u8, BusError>;

    /// Writes one register.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the transaction fails.
    fn write_byte(&self, addr: SubAddress, value: u8) -> Result<(), BusError>;

    /// Reads up to `buf.len()` bytes from one register (the chip does not
    /// auto-increment, so this drains a FIFO). Returns the number of bytes
    /// actually delivered, which may be less than requested.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the transaction fails.
    fn read_block(&self, addr: SubAddress, buf: &mut [u8]) -> Result<usize, BusError>;

    /// Writes `data` to one register in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the transaction fails.
    fn write_block(&self, addr: SubAddress, data: &[u8]) -> Result<(), BusError>;
}
