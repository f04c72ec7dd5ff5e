//! Synchronization primitives.
//!
//! [`SpinLock`] guards state touched only from task context (the deferred
//! worker and API callers). [`IrqSpinLock`] guards state that the interrupt
//! handler also touches; it masks local interrupts through the hooks
//! registered with [`set_irq_ops`].

mod irq_spinlock;
mod spinlock;

pub(crate) mod loom_compat;

pub use irq_spinlock::{IrqOps, IrqSpinLock, IrqSpinLockGuard, set_irq_ops};
pub use spinlock::{SpinLock, SpinLockGuard};
