//! Driver lifecycle management trait.

use crate::error::DriverError;

/// Lifecycle hooks for power management and orderly shutdown.
///
/// State machine: `Attached → Suspended ↔ Attached → Shutdown`.
///
/// Suspend and resume return `Unsupported` by default, so drivers need only
/// override what they support.
pub trait ManagedDriver: Send + Sync {
    /// Suspends the device.
    ///
    /// # Errors
    ///
    /// Returns `Err(DriverError::Unsupported)` by default.
    fn suspend(&self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported)
    }

    /// Resumes the device from a suspended state.
    ///
    /// # Errors
    ///
    /// Returns `Err(DriverError::Unsupported)` by default.
    fn resume(&self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported)
    }

    /// Quiesces the device: no interrupt, no deferred work, no bus traffic
    /// after return.
    fn shutdown(&self) {}
}
