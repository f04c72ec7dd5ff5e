//! Environment services for the driver.
//!
//! Drivers use [`DriverServices`] to register interrupt handlers and to run
//! their bottom halves on a worker, without depending on any particular
//! kernel or runtime.

use crate::bus::ChannelIndex;
use crate::error::DriverError;

/// A platform interrupt line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IrqLine(u32);

impl IrqLine {
    /// Creates a new IRQ line descriptor.
    #[must_use]
    pub const fn new(line: u32) -> Self {
        Self(line)
    }

    /// Returns the line number.
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0
    }
}

/// Services the environment provides to one chip instance.
///
/// The interrupt line is shared: each active channel requests it with
/// itself as the cookie, and the environment calls the chip's interrupt
/// entry point while at least one registration is live.
///
/// Work items are per channel. `queue_work` hands the channel to a worker,
/// which must call back into the chip's `run_channel`. The driver only
/// queues when its own scheduling state says a new entry is needed, so the
/// environment does not need to coalesce.
pub trait DriverServices: Send + Sync {
    /// Registers the channel's handler on the shared interrupt line.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Busy`] if the line cannot be shared.
    fn request_irq(&self, irq: IrqLine, channel: ChannelIndex) -> Result<(), DriverError>;

    /// Removes the channel's registration from the interrupt line.
    fn free_irq(&self, irq: IrqLine, channel: ChannelIndex);

    /// Creates the channel's work item.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] if no worker resources are available.
    fn create_work(&self, channel: ChannelIndex) -> Result<(), DriverError>;

    /// Queues the channel's work item for execution.
    fn queue_work(&self, channel: ChannelIndex);

    /// Waits until any queued execution of the channel's work has finished.
    fn flush_work(&self, channel: ChannelIndex);

    /// Destroys the channel's work item.
    fn destroy_work(&self, channel: ChannelIndex);

    /// Monotonic nanosecond clock, used for latency diagnostics.
    fn now_nanos(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_line_number() {
        assert_eq!(IrqLine::new(42).number(), 42);
    }
}
