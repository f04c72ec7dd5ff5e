//! Engine behavior against the simulated chip: register sync ordering,
//! transmit and receive drains, interrupt dispatch and loop bounds.

mod common;

use common::{A, B, irq_and_pump, started, started_with};
use sc16_driver_api::{BusError, ChipConfig, DriverError, InputFlags, LineConfig, ModemLines, RxFlag};
use sc16_drivers::sc16is7x2::regs::{reg, Lsr, LCR_EFR_BANK};
use sc16_drivers::sim::{Transaction, pump, run_until_idle};
use sc16_drivers::RunOutcome;
use sc16_driver_api::{SubAddress, UartPort};

// ---------------------------------------------------------------------------
// Register sync
// ---------------------------------------------------------------------------

#[test]
fn startup_programs_divisor_then_config() {
    let (bus, chip) = common::attach();
    chip.startup(A).unwrap();
    pump(&chip).unwrap();

    assert_eq!(bus.divisor(A), 96);
    let (ier, lcr, _, _, efr, _) = bus.channel_regs(A);
    assert_eq!(ier, 0x07);
    assert_eq!(lcr, 0x03);
    assert_eq!(efr, 0x10);
    assert_eq!(chip.sync_pending(A), (false, false));
}

#[test]
fn baud_sync_write_order() {
    let (bus, chip) = started();
    chip.set_line_config(A, &LineConfig::new_8n1(115_200)).unwrap();
    pump(&chip).unwrap();

    let writes: Vec<(u8, u8)> = bus
        .transactions()
        .iter()
        .filter_map(|t| match t {
            Transaction::Write { addr, value } if addr.channel() == A => Some((addr.register(), *value)),
            _ => None,
        })
        .collect();
    assert_eq!(
        &writes[..11],
        &[
            (reg::IER, 0x00),
            (reg::LCR, 0x80),
            (reg::DLL, 8),
            (reg::DLM, 0),
            (reg::LCR, 0x03),
            (reg::LCR, LCR_EFR_BANK),
            (reg::EFR, 0x10),
            (reg::LCR, 0x03),
            (reg::FCR, 0x61),
            (reg::MCR, 0x00),
            (reg::IER, 0x07),
        ]
    );
    assert_eq!(bus.divisor(A), 8);
}

#[test]
fn identical_line_configs_coalesce() {
    let (bus, chip) = started();
    let line = LineConfig::new_8n1(57_600);
    let first = chip.set_line_config(A, &line).unwrap();
    let second = chip.set_line_config(A, &line).unwrap();
    assert_eq!(first, second);
    assert_eq!(chip.services().queue_len(), 1);

    pump(&chip).unwrap();
    assert_eq!(bus.writes_to(A, reg::LCR).iter().filter(|&&v| v == 0x80).count(), 1);
    assert_eq!(
        bus.writes_to(A, reg::LCR).iter().filter(|&&v| v == LCR_EFR_BANK).count(),
        1
    );
    assert_eq!(bus.divisor(A), 16);
}

#[test]
fn line_config_reaches_lcr() {
    let (bus, chip) = started();
    let line = LineConfig {
        char_size: sc16_driver_api::CharSize::Seven,
        stop_bits: sc16_driver_api::StopBits::Two,
        parity: sc16_driver_api::Parity::Even,
        ..LineConfig::default()
    };
    assert_eq!(chip.set_line_config(A, &line).unwrap(), 9600);
    pump(&chip).unwrap();
    assert_eq!(bus.channel_regs(A).1, 0x1E);
    assert_eq!(chip.baud(A), 9600);
}

#[test]
fn failed_write_keeps_dirty_flag() {
    let (bus, chip) = started();
    bus.fail_register(A, reg::DLM, BusError::Nack);
    chip.set_line_config(A, &LineConfig::new_8n1(38_400)).unwrap();

    let err = pump(&chip).unwrap_err();
    assert_eq!(err, DriverError::Bus(BusError::Nack));
    assert_eq!(chip.sync_pending(A), (true, true));
    assert_eq!(chip.stats(A).bus_errors, 3);

    bus.clear_faults();
    chip.start_tx(A);
    pump(&chip).unwrap();
    assert_eq!(chip.sync_pending(A), (false, false));
    assert_eq!(bus.divisor(A), 24);
}

#[test]
fn transient_bus_error_is_retried_within_the_run() {
    let (bus, chip) = started();
    bus.fail_next(1, BusError::Timeout);
    irq_and_pump(&chip);
    let stats = chip.stats(A);
    assert_eq!(stats.bus_errors, 1);
    assert!(bus.transactions().iter().any(|t| matches!(t, Transaction::Failed { .. })));
}

// ---------------------------------------------------------------------------
// Control operations
// ---------------------------------------------------------------------------

#[test]
fn stop_rx_drops_line_status_interrupt() {
    let (bus, chip) = started();
    chip.stop_rx(A);
    pump(&chip).unwrap();
    assert_eq!(bus.channel_regs(A).0 & 0x04, 0);
}

#[test]
fn enable_ms_sets_modem_interrupt() {
    let (bus, chip) = started();
    chip.enable_ms(A);
    pump(&chip).unwrap();
    assert_eq!(bus.channel_regs(A).0 & 0x08, 0x08);
}

#[test]
fn modem_lines_round_trip() {
    let (bus, chip) = started();
    // DCD | DSR | CTS
    bus.set_msr(A, 0xB0);
    chip.set_mctrl(A, ModemLines::DTR | ModemLines::RTS);
    pump(&chip).unwrap();

    assert_eq!(bus.channel_regs(A).3, 0x03);
    let lines = chip.get_mctrl(A);
    assert!(lines.contains(ModemLines::CAR | ModemLines::DSR | ModemLines::CTS));
    assert!(lines.contains(ModemLines::DTR | ModemLines::RTS));
    assert!(!lines.contains(ModemLines::RNG));
}

#[test]
fn break_ctl_and_stop_tx_touch_nothing() {
    let (bus, chip) = started();
    chip.break_ctl(A, true);
    chip.stop_tx(A);
    assert!(bus.transactions().is_empty());
    assert_eq!(chip.services().queue_len(), 0);
}

#[test]
fn tx_empty_follows_lsr() {
    let (_bus, chip) = started();
    assert!(chip.tx_empty(A));
}

// ---------------------------------------------------------------------------
// Transmit
// ---------------------------------------------------------------------------

#[test]
fn tx_drain_writes_one_block_of_free_level() {
    let (bus, chip) = started();
    bus.script_txlvl(A, &[30]);
    bus.pin_txlvl(A, Some(0));
    let data: Vec<u8> = (0..40).collect();
    assert_eq!(chip.port(A).write(&data), 40);
    chip.start_tx(A);
    pump(&chip).unwrap();

    assert_eq!(bus.tx_blocks(A), vec![30]);
    assert_eq!(bus.take_transmitted(A), &data[..30]);
    assert_eq!(chip.port(A).tx_pending(), 10);
    assert_eq!(chip.icount(A).tx, 30);
    assert!(chip.port(A).wakeups() >= 1);
}

#[test]
fn tx_ceiling_caps_block() {
    let (bus, chip) = started();
    chip.port(A).write(&[0x55; 100]);
    chip.start_tx(A);
    run_until_idle(&chip).unwrap();

    let blocks = bus.tx_blocks(A);
    assert!(blocks.iter().all(|&n| n <= 30));
    assert_eq!(blocks.iter().sum::<usize>(), 100);
    assert_eq!(bus.take_transmitted(A).len(), 100);
}

#[test]
fn tx_respects_bus_block_limit() {
    let config = ChipConfig {
        tx_fifo_ceiling: 64,
        ..ChipConfig::default()
    };
    let (bus, chip) = started_with(config);
    bus.set_max_block_len(16);
    chip.port(A).write(&[1; 40]);
    chip.start_tx(A);
    run_until_idle(&chip).unwrap();
    assert_eq!(bus.tx_blocks(A), vec![16, 16, 8]);
}

#[test]
fn x_char_goes_first_and_alone() {
    let (bus, chip) = started();
    chip.port(A).write(b"data");
    chip.port(A).send_x_char(0x13);
    chip.start_tx(A);
    run_until_idle(&chip).unwrap();

    assert_eq!(bus.writes_to(A, reg::THR), vec![0x13]);
    assert_eq!(bus.take_transmitted(A), b"\x13data");
    assert_eq!(chip.port(A).x_char(), None);
    assert_eq!(chip.icount(A).tx, 5);
}

#[test]
fn stopped_port_is_not_drained() {
    let (bus, chip) = started();
    chip.port(A).write(b"held");
    chip.port(A).set_stopped(true);
    chip.start_tx(A);
    pump(&chip).unwrap();
    assert!(bus.tx_blocks(A).is_empty());
    assert!(
        !bus.transactions()
            .iter()
            .any(|t| matches!(t, Transaction::Read { addr, .. } if *addr == SubAddress::new(reg::TXLVL, A)))
    );
}

#[test]
fn failed_block_write_is_resent_in_order() {
    let (bus, chip) = started();
    chip.port(A).write(b"0123456789");
    bus.fail_nth(A, reg::THR, 1, BusError::Nack);
    chip.start_tx(A);
    pump(&chip).unwrap();

    assert_eq!(bus.take_transmitted(A), b"0123456789");
    assert_eq!(bus.tx_blocks(A), vec![10]);
    assert_eq!(chip.icount(A).tx, 10);
    assert_eq!(chip.stats(A).bus_errors, 1);
}

#[test]
fn held_block_outlives_an_abandoned_run() {
    let (bus, chip) = started();
    chip.port(A).write(b"first");
    bus.fail_register(A, reg::THR, BusError::Timeout);
    chip.start_tx(A);
    assert_eq!(pump(&chip).unwrap_err(), DriverError::Bus(BusError::Timeout));
    assert_eq!(chip.icount(A).tx, 0);
    assert!(bus.take_transmitted(A).is_empty());

    bus.clear_faults();
    chip.port(A).write(b"second");
    chip.start_tx(A);
    run_until_idle(&chip).unwrap();
    assert_eq!(bus.take_transmitted(A), b"firstsecond");
    assert_eq!(chip.icount(A).tx, 11);
}

// ---------------------------------------------------------------------------
// Receive
// ---------------------------------------------------------------------------

#[test]
fn rx_five_bytes_in_one_pass() {
    let (bus, chip) = started();
    bus.inject_rx(A, b"hello");
    irq_and_pump(&chip);

    assert_eq!(bus.rx_blocks(A), vec![5]);
    assert_eq!(chip.port(A).read_all(), b"hello");
    assert_eq!(chip.icount(A).rx, 5);
    assert_eq!(bus.rx_fifo_len(A), 0);
}

#[test]
fn rx_two_passes_preserve_order() {
    let (bus, chip) = started();
    let data: Vec<u8> = (0..64).collect();
    bus.inject_rx(A, &data);
    irq_and_pump(&chip);

    assert_eq!(bus.rx_blocks(A), vec![32, 32]);
    let chunk = chip.port(A).read_chunk().unwrap();
    assert_eq!(chunk.data, data);
    assert_eq!(chip.icount(A).rx, 64);
}

#[test]
fn rx_level_above_fifo_depth_is_clamped() {
    let (bus, chip) = started();
    bus.inject_rx(A, b"abc");
    bus.script_rxlvl(A, &[200]);
    irq_and_pump(&chip);

    assert_eq!(chip.stats(A).fifo_clamps, 1);
    assert_eq!(chip.port(A).read_all(), b"abc");
}

#[test]
fn rx_bytes_survive_failed_level_reread() {
    let (bus, chip) = started();
    bus.inject_rx(A, b"hello");
    bus.fail_nth(A, reg::RXLVL, 2, BusError::Timeout);
    irq_and_pump(&chip);

    assert_eq!(chip.port(A).read_all(), b"hello");
    assert_eq!(chip.icount(A).rx, 5);
    assert_eq!(chip.stats(A).bus_errors, 1);
    assert_eq!(bus.rx_fifo_len(A), 0);
}

#[test]
fn rx_second_pass_failure_keeps_order() {
    let (bus, chip) = started();
    let data: Vec<u8> = (0..64).collect();
    bus.inject_rx(A, &data);
    bus.fail_nth(A, reg::RHR, 2, BusError::Nack);
    irq_and_pump(&chip);

    assert_eq!(chip.port(A).read_all(), data);
    assert_eq!(chip.icount(A).rx, 64);
    assert_eq!(chip.stats(A).bus_errors, 1);
}

#[test]
fn break_counts_once_and_masks_parity_and_frame() {
    let (bus, chip) = started();
    let line = LineConfig {
        input: InputFlags::INPCK | InputFlags::BRKINT,
        ..LineConfig::default()
    };
    chip.set_line_config(A, &line).unwrap();
    pump(&chip).unwrap();

    bus.inject_rx(A, &[0, 0, 0]);
    bus.inject_line_status(A, Lsr::BI | Lsr::PE | Lsr::FE);
    irq_and_pump(&chip);

    let icount = chip.icount(A);
    assert_eq!(icount.brk, 1);
    assert_eq!(icount.parity, 0);
    assert_eq!(icount.frame, 0);
    assert_eq!(chip.port(A).breaks(), 1);
    let chunk = chip.port(A).read_chunk().unwrap();
    assert_eq!(chunk.flag, RxFlag::Break);
    assert_eq!(chunk.data.len(), 3);
}

#[test]
fn break_hook_can_discard_chunk() {
    let (bus, chip) = started();
    chip.port(A).set_discard_breaks(true);
    bus.inject_rx(A, &[0]);
    bus.inject_line_status(A, Lsr::BI);
    irq_and_pump(&chip);

    assert_eq!(chip.icount(A).brk, 1);
    assert_eq!(chip.port(A).readable(), 0);
    assert_eq!(chip.stats(A).rx_dropped, 1);
}

#[test]
fn parity_error_flags_chunk_when_checked() {
    let (bus, chip) = started();
    let line = LineConfig {
        input: InputFlags::INPCK,
        ..LineConfig::default()
    };
    chip.set_line_config(A, &line).unwrap();
    pump(&chip).unwrap();

    bus.inject_rx(A, b"p");
    bus.inject_line_status(A, Lsr::PE);
    irq_and_pump(&chip);

    assert_eq!(chip.icount(A).parity, 1);
    assert_eq!(chip.port(A).read_chunk().unwrap().flag, RxFlag::Parity);
}

#[test]
fn ignored_parity_drops_chunk() {
    let (bus, chip) = started();
    let line = LineConfig {
        input: InputFlags::IGNPAR,
        ..LineConfig::default()
    };
    chip.set_line_config(A, &line).unwrap();
    pump(&chip).unwrap();

    bus.inject_rx(A, b"bad");
    bus.inject_line_status(A, Lsr::PE);
    irq_and_pump(&chip);

    assert_eq!(chip.port(A).readable(), 0);
    assert_eq!(chip.icount(A).parity, 1);
    assert_eq!(chip.icount(A).rx, 3);
}

#[test]
fn overrun_delivers_marker() {
    let (bus, chip) = started();
    bus.inject_rx(A, b"o");
    bus.inject_line_status(A, Lsr::OE);
    irq_and_pump(&chip);

    assert_eq!(chip.icount(A).overrun, 1);
    assert_eq!(chip.port(A).overruns(), 1);
    assert_eq!(chip.port(A).read_all(), b"o");
}

#[test]
fn disabled_receiver_drops_everything() {
    let (bus, chip) = started();
    let line = LineConfig {
        receiver_enabled: false,
        ..LineConfig::default()
    };
    chip.set_line_config(A, &line).unwrap();
    pump(&chip).unwrap();

    bus.inject_rx(A, b"nope");
    irq_and_pump(&chip);
    assert_eq!(chip.port(A).readable(), 0);
    assert_eq!(bus.rx_fifo_len(A), 0);
}

// ---------------------------------------------------------------------------
// Interrupt dispatch and loop bounds
// ---------------------------------------------------------------------------

#[test]
fn irq_handler_does_no_bus_io() {
    let (bus, chip) = started();
    assert!(chip.handle_irq());
    assert!(bus.transactions().is_empty());
    assert_eq!(chip.services().queue_len(), 1);
}

#[test]
fn repeated_irqs_coalesce() {
    let (_bus, chip) = started();
    for _ in 0..5 {
        chip.handle_irq();
    }
    assert_eq!(chip.services().queue_len(), 1);
    let report = pump(&chip).unwrap();
    assert_eq!(report.runs, 1);
}

#[test]
fn irq_latency_is_recorded() {
    let (_bus, chip) = started();
    chip.handle_irq();
    chip.services().advance(7_000);
    pump(&chip).unwrap();
    assert_eq!(chip.stats(A).max_irq_latency_ns, 7_000);
}

#[test]
fn inactive_channel_ignores_irq() {
    let (_bus, chip) = started();
    chip.handle_irq();
    assert_eq!(chip.services().queued_count(B), 0);
}

#[test]
fn always_pending_interrupt_hits_the_cap() {
    let config = ChipConfig {
        max_loop_iterations: 8,
        ..ChipConfig::default()
    };
    let (bus, chip) = started_with(config);
    bus.pin_iir(A, Some(0x04));
    let before = chip.stats(A).iterations;
    chip.handle_irq();
    let report = pump(&chip).unwrap();

    assert_eq!(report.capped, 1);
    let stats = chip.stats(A);
    assert_eq!(stats.loop_cap_hits, 1);
    assert_eq!(stats.iterations - before, 8);
}

#[test]
fn scripted_interrupts_terminate() {
    let (bus, chip) = started();
    bus.script_iir(A, &[0x04, 0x0C, 0x06, 0x02, 0x00]);
    chip.handle_irq();
    let before = chip.stats(A).iterations;
    let report = pump(&chip).unwrap();
    assert_eq!(report.capped, 0);
    assert_eq!(chip.stats(A).iterations - before, 6);
}

#[test]
fn persistent_bus_failure_abandons_run() {
    let (bus, chip) = started();
    bus.fail_register(A, reg::IIR, BusError::Timeout);
    chip.handle_irq();
    assert_eq!(chip.run_channel(A), Err(DriverError::Bus(BusError::Timeout)));
    assert_eq!(chip.stats(A).bus_errors, 3);

    bus.clear_faults();
    irq_and_pump(&chip);
    assert_eq!(chip.services().next_queued(), None);
}

#[test]
fn run_on_unqueued_channel_is_skipped() {
    let (_bus, chip) = started();
    assert_eq!(chip.run_channel(B), Ok(RunOutcome::Skipped));
}
