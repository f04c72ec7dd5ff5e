//! Core primitives for the SC16IS7x2 driver stack.
//!
//! This crate holds the pieces that do not depend on any particular bus or
//! chip: spin locks (plain and interrupt-masking), the [`work::DeferredWork`]
//! scheduling state machine that backs each channel's bottom half, and the
//! leveled logging facade used throughout the driver.
//!
//! Everything here is host-testable with `cargo test`, and the deferred-work
//! state machine can additionally be model-checked with loom
//! (`RUSTFLAGS="--cfg loom"`) or randomly scheduled with shuttle
//! (`RUSTFLAGS="--cfg shuttle"`).

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod log;
pub mod sync;
pub mod work;
