//! Driver error types.

use core::fmt;

/// Failure of a single bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The device did not acknowledge its address or a data byte.
    Nack,
    /// Another bus master won arbitration.
    ArbitrationLost,
    /// The transaction did not complete in time.
    Timeout,
    /// A block transfer moved fewer bytes than the protocol requires.
    ShortTransfer,
    /// Any other adapter-level failure.
    Io,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nack => f.write_str("no acknowledge from device"),
            Self::ArbitrationLost => f.write_str("bus arbitration lost"),
            Self::Timeout => f.write_str("bus transaction timed out"),
            Self::ShortTransfer => f.write_str("short block transfer"),
            Self::Io => f.write_str("bus adapter I/O error"),
        }
    }
}

impl core::error::Error for BusError {}

/// Errors that can occur during driver operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The hardware device was not found or did not respond.
    DeviceNotFound,
    /// Driver initialization failed.
    InitFailed,
    /// A hardware operation timed out.
    Timeout,
    /// The requested operation is not supported by this driver.
    Unsupported,
    /// An I/O error occurred during a hardware operation.
    IoError,
    /// The driver is not in a valid state for this operation.
    InvalidState,
    /// A caller-supplied value is out of range.
    InvalidArgument,
    /// A resource (interrupt line, work queue) is already taken.
    Busy,
    /// A register bus transaction failed.
    Bus(BusError),
}

impl From<BusError> for DriverError {
    fn from(err: BusError) -> Self {
        Self::Bus(err)
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceNotFound => f.write_str("device not found"),
            Self::InitFailed => f.write_str("driver initialization failed"),
            Self::Timeout => f.write_str("hardware operation timed out"),
            Self::Unsupported => f.write_str("operation not supported"),
            Self::IoError => f.write_str("I/O error"),
            Self::InvalidState => f.write_str("invalid driver state"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::Busy => f.write_str("resource busy"),
            Self::Bus(err) => write!(f, "bus error: {err}"),
        }
    }
}

impl core::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Bus(err) => Some(err),
            _ => None,
        }
    }
}
