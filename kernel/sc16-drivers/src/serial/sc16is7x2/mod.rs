//! NXP SC16IS7x2 dual UART with I2C/SPI host interface.
//!
//! The interrupt handler ([`Chip::handle_irq`]) never touches the bus. It
//! stamps and schedules each active channel, and the environment's worker
//! later calls [`Chip::run_channel`], which reconciles the register cache
//! with the hardware and moves data until IIR goes quiet.

pub mod cache;
mod channel;
mod chip;
pub mod gpio;
pub mod regs;
mod rx;
pub mod termios;
mod tx;

pub use self::cache::RegisterCache;
pub use self::channel::{ChannelStats, RunOutcome};
pub use self::chip::{Chip, PortType, PORT_TYPE_NAME};
pub use self::gpio::{GpioBank, GpioPins, GPIO_COUNT};
pub use self::termios::{translate, FrameFormat, LineSettings};
