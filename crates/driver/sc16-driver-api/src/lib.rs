//! Contracts between the SC16IS7x2 driver and its environment.
//!
//! The driver never touches a real bus, interrupt controller or tty layer
//! directly. Everything it needs from outside is expressed here:
//!
//! - **Bus** -- [`RegisterBus`] moves bytes to and from one chip register,
//!   addressed by [`SubAddress`].
//! - **Port** -- [`UartPort`] is the character sink and source of one
//!   channel (the line discipline side).
//! - **Services** -- [`DriverServices`] provides interrupt registration,
//!   deferred work queues and a clock.
//! - **Configuration** -- [`ChipConfig`] for the device, [`LineConfig`] for
//!   each channel's line settings.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bus;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod serial;
pub mod services;
pub mod termios;

// Re-export all public types at the crate root for ergonomic imports.
pub use bus::{CHANNEL_COUNT, ChannelIndex, Direction, RegisterBus, SMBUS_BLOCK_MAX, SubAddress};
pub use config::{ChipConfig, FIFO_SIZE};
pub use error::{BusError, DriverError};
pub use lifecycle::ManagedDriver;
pub use serial::{ICount, ModemLines, RxFlag, UartPort};
pub use services::{DriverServices, IrqLine};
pub use termios::{CharSize, FlowControl, InputFlags, LineConfig, Parity, StopBits};
