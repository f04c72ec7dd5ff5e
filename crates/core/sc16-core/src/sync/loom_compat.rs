//! Loom / shuttle compatibility shim.
//!
//! Under `cfg(loom)` the atomics come from loom's model checker, under
//! `cfg(shuttle)` from shuttle's randomized scheduler, and otherwise from
//! `core::sync::atomic`. Code written against this module runs unchanged
//! in all three.

// ---------------------------------------------------------------------------
// Loom mode
// ---------------------------------------------------------------------------

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicU8, Ordering};

#[cfg(loom)]
#[inline]
pub(crate) fn spin_hint() {
    loom::thread::yield_now();
}

// ---------------------------------------------------------------------------
// Shuttle mode
// ---------------------------------------------------------------------------

#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::sync::atomic::{AtomicU8, Ordering};

#[cfg(all(shuttle, not(loom)))]
#[inline]
pub(crate) fn spin_hint() {
    shuttle::thread::yield_now();
}

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

#[cfg(not(any(loom, shuttle)))]
pub(crate) use core::sync::atomic::{AtomicU8, Ordering};

#[cfg(not(any(loom, shuttle)))]
#[inline]
pub(crate) fn spin_hint() {
    core::hint::spin_loop();
}
