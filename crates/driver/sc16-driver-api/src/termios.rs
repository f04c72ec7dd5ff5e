//! Line settings requested for a channel.
//!
//! These mirror the subset of POSIX termios that a UART can act on. The
//! driver translates a [`LineConfig`] into register values; nothing here
//! knows about registers.

use bitflags::bitflags;

/// Data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CharSize {
    /// 5 data bits.
    Five,
    /// 6 data bits.
    Six,
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

impl CharSize {
    /// Returns the number of data bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

/// Stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StopBits {
    /// One stop bit.
    #[default]
    One,
    /// Two stop bits (1.5 with five data bits).
    Two,
}

/// Parity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
    /// Parity bit always 1.
    Mark,
    /// Parity bit always 0.
    Space,
}

/// Hardware flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FlowControl {
    /// No hardware flow control.
    #[default]
    None,
    /// Automatic RTS/CTS handshaking.
    RtsCts,
}

bitflags! {
    /// Input processing flags relevant to line-status handling.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InputFlags: u8 {
        /// Check parity and framing on input.
        const INPCK  = 1 << 0;
        /// Report breaks to the line discipline.
        const BRKINT = 1 << 1;
        /// Mark parity and framing errors in the stream.
        const PARMRK = 1 << 2;
        /// Ignore characters with parity or framing errors.
        const IGNPAR = 1 << 3;
        /// Ignore break conditions.
        const IGNBRK = 1 << 4;
    }
}

/// Requested line configuration of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    /// Requested baud rate. Zero selects 9600.
    pub baud: u32,
    /// Data bits.
    pub char_size: CharSize,
    /// Stop bits.
    pub stop_bits: StopBits,
    /// Parity mode.
    pub parity: Parity,
    /// Hardware flow control.
    pub flow: FlowControl,
    /// Input processing flags.
    pub input: InputFlags,
    /// Receiver enabled (`CREAD`).
    pub receiver_enabled: bool,
    /// Ignore modem status lines (`CLOCAL`).
    pub local: bool,
}

impl LineConfig {
    /// 8 data bits, no parity, 1 stop bit at `baud`, receiver on, local line.
    #[must_use]
    pub const fn new_8n1(baud: u32) -> Self {
        Self {
            baud,
            char_size: CharSize::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow: FlowControl::None,
            input: InputFlags::empty(),
            receiver_enabled: true,
            local: true,
        }
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self::new_8n1(9600)
    }
}
