//! Per-device configuration.
//!
//! With the `serde` feature, [`ChipConfig`] deserializes from any serde
//! format; every field is optional and falls back to [`ChipConfig::default`].

use alloc::string::String;

use crate::error::DriverError;

/// Depth of each hardware FIFO, in bytes.
pub const FIFO_SIZE: usize = 64;

/// Configuration of one bridge chip.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct ChipConfig {
    /// Crystal or clock input frequency in Hz.
    pub uartclk: u32,
    /// Line number of channel A; channel B is `uart_base + 1`. Must be even.
    pub uart_base: u32,
    /// Number of the first GPIO pin.
    pub gpio_base: u32,
    /// Interrupt line shared by both channels.
    pub irq: u32,
    /// Label reported for the GPIO bank.
    pub gpio_label: String,
    /// Upper bound on the free transmit level used per drain.
    pub tx_fifo_ceiling: usize,
    /// Pending transmit bytes below which the port is woken for more.
    pub wakeup_chars: usize,
    /// Hard cap on engine loop iterations per run.
    pub max_loop_iterations: u32,
    /// Consecutive failing iterations after which a run is abandoned.
    pub max_bus_errors: u32,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            uartclk: 14_745_600,
            uart_base: 0,
            gpio_base: 0,
            irq: 0,
            gpio_label: String::from("sc16is7x2"),
            tx_fifo_ceiling: 30,
            wakeup_chars: 256,
            max_loop_iterations: 256,
            max_bus_errors: 3,
        }
    }
}

impl ChipConfig {
    /// Checks the configuration for values the driver cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidArgument`] for a zero or too-slow clock,
    /// an odd `uart_base`, a transmit ceiling outside `1..=64`, or zero loop
    /// or error limits.
    pub fn validate(&self) -> Result<(), DriverError> {
        let ok = self.uartclk >= 16
            && self.uart_base % 2 == 0
            && (1..=FIFO_SIZE).contains(&self.tx_fifo_ceiling)
            && self.max_loop_iterations > 0
            && self.max_bus_errors > 0;
        if ok { Ok(()) } else { Err(DriverError::InvalidArgument) }
    }

    /// Lowest baud rate the clock can produce (divisor 0xFFFF).
    #[must_use]
    pub const fn min_baud(&self) -> u32 {
        let min = self.uartclk / 16 / 0xFFFF;
        if min == 0 { 1 } else { min }
    }

    /// Highest baud rate the clock can produce (divisor 1).
    #[must_use]
    pub const fn max_baud(&self) -> u32 {
        self.uartclk / 16
    }
}
