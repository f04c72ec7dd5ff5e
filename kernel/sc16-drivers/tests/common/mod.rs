//! Shared fixtures for the driver integration tests.

#![allow(dead_code)]

use sc16_driver_api::{ChannelIndex, ChipConfig};
use sc16_drivers::Chip;
use sc16_drivers::sim::{SimBus, SimChip, SimServices, pump};
use sc16_tty::TtyPort;

pub const A: ChannelIndex = ChannelIndex::A;
pub const B: ChannelIndex = ChannelIndex::B;

/// Attaches a chip to a fresh simulator.
pub fn attach_with(config: ChipConfig) -> (SimBus, SimChip<TtyPort>) {
    let bus = SimBus::new();
    let ports = [TtyPort::new("ttyNSC0"), TtyPort::new("ttyNSC1")];
    let chip = Chip::attach(bus.clone(), SimServices::new(), config, ports).expect("attach");
    (bus, chip)
}

pub fn attach() -> (SimBus, SimChip<TtyPort>) {
    attach_with(ChipConfig::default())
}

/// Attaches and starts channel A, runs the initial sync and clears the
/// transaction log.
pub fn started() -> (SimBus, SimChip<TtyPort>) {
    started_with(ChipConfig::default())
}

pub fn started_with(config: ChipConfig) -> (SimBus, SimChip<TtyPort>) {
    let (bus, chip) = attach_with(config);
    chip.startup(A).expect("startup");
    pump(&chip).expect("initial run");
    bus.clear_log();
    (bus, chip)
}

/// Raises the interrupt and runs the queue.
pub fn irq_and_pump(chip: &SimChip<TtyPort>) {
    assert!(chip.handle_irq());
    pump(chip).expect("pump");
}
