//! Attach, startup, shutdown and detach, including resource cleanup on
//! failure, plus the GPIO bank.

mod common;

use common::{A, B, attach, attach_with, started};
use sc16_driver_api::{BusError, ChipConfig, DriverError, ManagedDriver};
use sc16_drivers::sc16is7x2::regs::reg;
use sc16_drivers::sc16is7x2::PortType;
use sc16_drivers::sim::{ServiceEvent, SimBus, SimServices, pump};
use sc16_drivers::{Chip, PORT_TYPE_NAME};
use sc16_tty::TtyPort;

fn ports() -> [TtyPort; 2] {
    [TtyPort::new("ttyNSC0"), TtyPort::new("ttyNSC1")]
}

// ---------------------------------------------------------------------------
// Attach / detach
// ---------------------------------------------------------------------------

#[test]
fn attach_resets_and_initializes_gpio() {
    let (bus, chip) = attach();
    assert_eq!(bus.resets(), 1);
    assert_eq!(bus.gpio_regs(), (0, 0, 0, 0));
    assert!(!chip.is_active(A));
    assert!(!chip.is_active(B));
    assert_eq!(chip.services().queue_len(), 0);
}

#[test]
fn attach_rejects_bad_config() {
    let config = ChipConfig {
        uart_base: 1,
        ..ChipConfig::default()
    };
    let result = Chip::attach(SimBus::new(), SimServices::new(), config, ports());
    assert_eq!(result.err(), Some(DriverError::InvalidArgument));
}

#[test]
fn attach_tolerates_nack_on_reset() {
    let bus = SimBus::new();
    bus.fail_next(1, BusError::Nack);
    assert!(Chip::attach(bus, SimServices::new(), ChipConfig::default(), ports()).is_ok());
}

#[test]
fn attach_fails_on_reset_timeout() {
    let bus = SimBus::new();
    bus.fail_next(1, BusError::Timeout);
    let result = Chip::attach(bus, SimServices::new(), ChipConfig::default(), ports());
    assert_eq!(result.err(), Some(DriverError::Bus(BusError::Timeout)));
}

#[test]
fn port_info() {
    let config = ChipConfig {
        uart_base: 4,
        ..ChipConfig::default()
    };
    let (_bus, chip) = attach_with(config);
    assert_eq!(chip.line(A), 4);
    assert_eq!(chip.line(B), 5);
    assert_eq!(chip.port_type(), PORT_TYPE_NAME);
    assert_eq!(chip.verify_port(PortType::Unknown), Ok(()));
    assert_eq!(chip.verify_port(PortType::Sc16is7x2), Ok(()));
    assert_eq!(chip.verify_port(PortType::Other(4)), Err(DriverError::InvalidArgument));
}

#[test]
fn detach_refuses_while_started() {
    let (_bus, chip) = started();
    let Err((chip, err)) = chip.detach() else {
        panic!("detach succeeded with an active channel");
    };
    assert_eq!(err, DriverError::Busy);
    chip.shutdown_channel(A).unwrap();
    assert!(chip.detach().is_ok());
}

// ---------------------------------------------------------------------------
// Startup / shutdown
// ---------------------------------------------------------------------------

#[test]
fn startup_acquires_work_then_irq() {
    let (_bus, chip) = attach();
    chip.startup(A).unwrap();
    let services = chip.services();
    assert!(services.irq_held(A));
    assert!(services.work_live(A));
    let events = services.events();
    assert_eq!(
        &events[..3],
        &[
            ServiceEvent::WorkCreated(A),
            ServiceEvent::IrqRequested(A),
            ServiceEvent::WorkQueued(A),
        ]
    );
}

#[test]
fn startup_twice_is_invalid() {
    let (_bus, chip) = started();
    assert_eq!(chip.startup(A), Err(DriverError::InvalidState));
}

#[test]
fn irq_request_failure_releases_work() {
    let (_bus, chip) = attach();
    chip.services().fail_next_irq_request(DriverError::Busy);
    assert_eq!(chip.startup(A), Err(DriverError::Busy));

    let services = chip.services();
    assert!(!services.work_live(A));
    assert!(!services.irq_held(A));
    assert_eq!(
        services.events(),
        vec![ServiceEvent::WorkCreated(A), ServiceEvent::WorkDestroyed(A)]
    );
    assert!(!chip.is_active(A));
    assert!(!chip.handle_irq());

    // The channel is usable once the resource comes back.
    chip.startup(A).unwrap();
    assert!(chip.is_active(A));
}

#[test]
fn work_creation_failure_holds_nothing() {
    let (_bus, chip) = attach();
    chip.services().fail_next_work_creation(DriverError::InitFailed);
    assert_eq!(chip.startup(A), Err(DriverError::InitFailed));
    assert!(chip.services().events().is_empty());
}

#[test]
fn bus_failure_during_startup_releases_everything() {
    let (bus, chip) = attach();
    bus.fail_register(A, reg::MCR, BusError::Io);
    assert_eq!(chip.startup(A), Err(DriverError::Bus(BusError::Io)));

    let services = chip.services();
    assert!(!services.irq_held(A));
    assert!(!services.work_live(A));
    assert!(!chip.is_active(A));
}

#[test]
fn shutdown_order_and_sleep() {
    let (bus, chip) = started();
    chip.shutdown_channel(A).unwrap();

    let events = chip.services().events();
    let tail = &events[events.len() - 3..];
    assert_eq!(
        tail,
        &[
            ServiceEvent::IrqFreed(A),
            ServiceEvent::WorkFlushed(A),
            ServiceEvent::WorkDestroyed(A),
        ]
    );
    assert_eq!(bus.writes_to(A, reg::IER).last(), Some(&0x10));
    assert!(!chip.is_active(A));
    assert_eq!(chip.shutdown_channel(A), Err(DriverError::InvalidState));
}

#[test]
fn shutdown_drops_pending_work() {
    let (_bus, chip) = started();
    chip.handle_irq();
    chip.shutdown_channel(A).unwrap();
    assert_eq!(chip.services().queue_len(), 0);
    // A stale entry that escaped the queue is skipped.
    assert_eq!(chip.run_channel(A), Ok(sc16_drivers::RunOutcome::Skipped));
}

#[test]
fn restart_after_shutdown() {
    let (_bus, chip) = started();
    chip.shutdown_channel(A).unwrap();
    chip.startup(A).unwrap();
    pump(&chip).unwrap();
    assert!(chip.is_active(A));
    assert_eq!(chip.sync_pending(A), (false, false));
}

#[test]
fn managed_shutdown_quiesces_both_channels() {
    let (_bus, chip) = started();
    chip.startup(B).unwrap();
    pump(&chip).unwrap();
    ManagedDriver::shutdown(&chip);
    assert!(!chip.is_active(A));
    assert!(!chip.is_active(B));
    assert_eq!(chip.suspend(), Ok(()));
    assert_eq!(chip.resume(), Ok(()));
}

#[test]
fn channels_are_independent() {
    let (bus, chip) = started();
    chip.startup(B).unwrap();
    pump(&chip).unwrap();
    bus.inject_rx(B, b"bee");
    common::irq_and_pump(&chip);
    assert_eq!(chip.port(B).read_all(), b"bee");
    assert_eq!(chip.port(A).readable(), 0);
    assert_eq!(chip.icount(A).rx, 0);
}

// ---------------------------------------------------------------------------
// GPIO
// ---------------------------------------------------------------------------

#[test]
fn gpio_block_switching() {
    let (bus, chip) = attach();
    let gpio = chip.gpio();

    gpio.request(2).unwrap();
    assert_eq!(bus.gpio_regs().3, 0x00);
    gpio.free(2).unwrap();
    // Last pin of 0-3 released: block goes back to modem function.
    assert_eq!(bus.gpio_regs().3, 0x04);

    gpio.request(6).unwrap();
    gpio.request(7).unwrap();
    gpio.free(6).unwrap();
    assert_eq!(bus.gpio_regs().3, 0x04);
    gpio.free(7).unwrap();
    assert_eq!(bus.gpio_regs().3, 0x06);

    gpio.request(1).unwrap();
    assert_eq!(bus.gpio_regs().3, 0x02);
    assert_eq!(chip.gpio_bank().requested(), 0x02);
}

#[test]
fn gpio_block_switch_failure_leaves_cache_matching_chip() {
    let (bus, chip) = attach();
    let gpio = chip.gpio();
    gpio.request(2).unwrap();

    bus.fail_register(A, reg::IOCONTROL, BusError::Nack);
    assert_eq!(gpio.free(2), Err(DriverError::Bus(BusError::Nack)));
    assert_eq!(chip.gpio_bank().requested(), 0x04);
    assert_eq!(chip.gpio_bank().io_control().bits(), bus.gpio_regs().3);

    bus.clear_faults();
    gpio.free(2).unwrap();
    assert_eq!(bus.gpio_regs().3, 0x04);

    bus.fail_register(A, reg::IOCONTROL, BusError::Nack);
    assert_eq!(gpio.request(3), Err(DriverError::Bus(BusError::Nack)));
    assert_eq!(chip.gpio_bank().requested(), 0x00);
    assert_eq!(chip.gpio_bank().io_control().bits(), 0x04);

    bus.clear_faults();
    gpio.request(3).unwrap();
    assert_eq!(bus.gpio_regs().3, 0x00);
    assert_eq!(chip.gpio_bank().requested(), 0x08);
}

#[test]
fn gpio_directions_and_levels() {
    let (bus, chip) = attach();
    let gpio = chip.gpio();

    gpio.direction_output(5, true).unwrap();
    assert_eq!(bus.gpio_regs().0, 0x20);
    assert_eq!(bus.gpio_regs().1, 0x20);
    assert!(gpio.get(5).unwrap());

    gpio.set(5, false).unwrap();
    assert_eq!(bus.gpio_regs().1, 0x00);
    assert!(!gpio.get(5).unwrap());

    bus.set_gpio_inputs(0x01);
    gpio.direction_input(0).unwrap();
    assert!(gpio.get(0).unwrap());
    bus.set_gpio_inputs(0x00);
    assert!(!gpio.get(0).unwrap());
}

#[test]
fn gpio_rejects_out_of_range_offsets() {
    let (bus, chip) = attach();
    bus.clear_log();
    let gpio = chip.gpio();
    assert_eq!(gpio.request(8), Err(DriverError::InvalidArgument));
    assert_eq!(gpio.set(9, true), Err(DriverError::InvalidArgument));
    assert_eq!(gpio.get(200), Err(DriverError::InvalidArgument));
    assert!(bus.transactions().is_empty());
}

#[test]
fn gpio_bank_metadata() {
    let config = ChipConfig {
        gpio_base: 200,
        gpio_label: "bridge0".into(),
        ..ChipConfig::default()
    };
    let (_bus, chip) = attach_with(config);
    assert_eq!(chip.gpio_bank().base(), 200);
    assert_eq!(chip.gpio_bank().label(), "bridge0");
}
