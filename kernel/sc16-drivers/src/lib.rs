//! Drivers for the NXP SC16IS7x2 family of dual UART bridges.
//!
//! The chip sits on a slow shared bus (I2C/SMBus or SPI) and exposes two
//! 16550-style UART channels plus an 8-pin GPIO bank. Every register access
//! is a blocking bus transaction, so all hardware work happens on a
//! per-channel deferred worker; the interrupt handler only schedules it.
//!
//! - [`serial::sc16is7x2`] -- the driver proper: register model, per-channel
//!   engine, line-configuration translation, chip lifecycle and GPIO.
//! - [`sim`] -- a behavioral model of the chip and a manual work queue, for
//!   host testing and the `sc16-sim` tool (feature `sim`, on by default).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// ── Subsystem modules ───────────────────────────────────────────────────

pub mod serial;
#[cfg(feature = "sim")]
pub mod sim;

// ── Re-exports ──────────────────────────────────────────────────────────

pub use self::serial::sc16is7x2;
pub use self::serial::sc16is7x2::{Chip, ChannelStats, GpioBank, PORT_TYPE_NAME, RunOutcome};
