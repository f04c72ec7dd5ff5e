//! Host-side exerciser for the SC16IS7x2 driver.
//!
//! Runs the real driver against the behavioral chip model: `loopback`
//! pushes a payload from channel A to channel B over a crosslinked model
//! and reports counters, `translate` shows the register values a line
//! configuration produces.

mod cli;
mod config;
mod logging;
mod loopback;

use anyhow::{Result, bail};
use clap::Parser;
use sc16_driver_api::ICount;
use sc16_drivers::ChannelStats;
use sc16_drivers::sc16is7x2::termios::{DEFAULT_BAUD, translate};

use config::SimConfig;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    logging::init(cli.log_level);
    let config = SimConfig::load(cli.config.as_deref())?;

    match cli.command {
        cli::Command::Loopback(ref args) => cmd_loopback(&config, args),
        cli::Command::Translate(ref args) => cmd_translate(&config, args),
    }
}

fn cmd_loopback(config: &SimConfig, args: &cli::LoopbackArgs) -> Result<()> {
    let line = config.line.to_line_config()?;
    let payload = args.payload.as_bytes().repeat(args.repeat);
    let opts = loopback::Options {
        chunk: usize::from(args.chunk),
        max_block: usize::from(args.max_block),
        record_bus: args.dump_bus,
    };
    let report = loopback::run(config, &line, &payload, opts)?;

    if args.dump_bus {
        for txn in &report.transactions {
            println!("{txn:?}");
        }
    }
    println!("baud      {}", report.achieved_baud);
    println!("sent      {} bytes", report.sent.len());
    println!("received  {} bytes", report.received.len());
    for (name, icount, stats) in [
        ("A", &report.icount[0], &report.stats[0]),
        ("B", &report.icount[1], &report.stats[1]),
    ] {
        print_channel(name, icount, stats);
    }

    if !report.matches() {
        bail!(
            "loopback mismatch: sent {} bytes, received {}",
            report.sent.len(),
            report.received.len()
        );
    }
    println!("ok");
    Ok(())
}

fn print_channel(name: &str, icount: &ICount, stats: &ChannelStats) {
    println!(
        "channel {name}: rx={} tx={} brk={} parity={} frame={} overrun={}",
        icount.rx, icount.tx, icount.brk, icount.parity, icount.frame, icount.overrun
    );
    println!(
        "  runs={} iterations={} cap_hits={} bus_errors={} clamps={} dropped={}",
        stats.runs,
        stats.iterations,
        stats.loop_cap_hits,
        stats.bus_errors,
        stats.fifo_clamps,
        stats.rx_dropped
    );
}

fn cmd_translate(config: &SimConfig, args: &cli::TranslateArgs) -> Result<()> {
    let mut line = config.line.to_line_config()?;
    if let Some(baud) = args.baud {
        line.baud = baud;
    }
    let uartclk = config.chip.uartclk;
    let settings = translate(&line, uartclk);

    let requested = if line.baud == 0 { DEFAULT_BAUD } else { line.baud };
    let error = (f64::from(settings.achieved_baud) - f64::from(requested)) / f64::from(requested) * 100.0;

    println!("uartclk   {uartclk} Hz");
    println!("baud      {} (requested {requested}, {error:+.2}%)", settings.achieved_baud);
    println!("divisor   {:#06x}", settings.divisor);
    println!("LCR       {:#04x}  {:?}", settings.lcr.bits(), settings.lcr);
    println!("FCR       {:#04x}  {:?}", settings.fcr.bits(), settings.fcr);
    println!("EFR       {:#04x}  {:?}", settings.efr.bits(), settings.efr);
    println!("read mask {:?}", settings.read_status_mask);
    println!("ignore    {:?}", settings.ignore_status_mask);
    println!("modem irq {}", settings.modem_status_irq);
    Ok(())
}
