//! Host-side simulation of the chip and its environment.
//!
//! [`SimBus`] models the device registers and FIFOs and [`SimServices`]
//! stands in for the interrupt and workqueue services. [`pump`] plays the
//! workqueue: it runs queued channels until nothing is left.
//! [`run_until_idle`] additionally plays the level-triggered interrupt
//! line, re-raising it for as long as the model reports a pending source.

mod bus;
mod services;

pub use self::bus::{SimBus, Transaction};
pub use self::services::{ServiceEvent, SimServices};

use sc16_core::kwarn;
use sc16_driver_api::{DriverError, UartPort};

use crate::serial::sc16is7x2::{Chip, RunOutcome};

/// A chip attached to the simulator.
pub type SimChip<P> = Chip<SimBus, P, SimServices>;

/// Upper bound on queue entries one [`pump`] call processes.
const PUMP_LIMIT: usize = 1024;

/// Upper bound on interrupt re-raises in [`run_until_idle`].
const IRQ_ROUNDS: usize = 256;

/// Summary of one [`pump`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Queue entries processed.
    pub runs: usize,
    /// Entries skipped because the channel was shut down.
    pub skipped: usize,
    /// Runs that hit the iteration cap.
    pub capped: usize,
}

/// Runs queued work until the queue is empty.
///
/// # Errors
///
/// The first error a run returned. Entries queued behind it stay queued.
pub fn pump<P: UartPort>(chip: &SimChip<P>) -> Result<PumpReport, DriverError> {
    let mut report = PumpReport::default();
    while let Some(ch) = chip.services().next_queued() {
        report.runs += 1;
        match chip.run_channel(ch)? {
            RunOutcome::Skipped => report.skipped += 1,
            RunOutcome::LoopCapReached => report.capped += 1,
            RunOutcome::Idle => {}
        }
        if report.runs >= PUMP_LIMIT {
            kwarn!("sim: pump stopped after {} runs", report.runs);
            break;
        }
    }
    Ok(report)
}

/// Pumps the queue, then keeps raising the interrupt while the simulated
/// line is asserted and any channel is active.
///
/// # Errors
///
/// The first error a run returned.
pub fn run_until_idle<P: UartPort>(chip: &SimChip<P>) -> Result<PumpReport, DriverError> {
    let mut total = pump(chip)?;
    for _ in 0..IRQ_ROUNDS {
        if !chip.bus().irq_asserted() || !chip.handle_irq() {
            return Ok(total);
        }
        let round = pump(chip)?;
        total.runs += round.runs;
        total.skipped += round.skipped;
        total.capped += round.capped;
    }
    kwarn!("sim: interrupt line still asserted after {} rounds", IRQ_ROUNDS);
    Ok(total)
}
