//! Crosslinked loopback: channel A transmits, channel B receives.

use anyhow::{Context, Result, bail};
use sc16_driver_api::{ChannelIndex, ICount, LineConfig};
use sc16_drivers::sim::{SimBus, SimChip, SimServices, Transaction, run_until_idle};
use sc16_drivers::{ChannelStats, Chip};
use sc16_tty::TtyPort;

use crate::config::SimConfig;

const TX: ChannelIndex = ChannelIndex::A;
const RX: ChannelIndex = ChannelIndex::B;

/// Bus and chunking options for one run.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Bytes queued per write.
    pub chunk: usize,
    /// Largest block transfer the model accepts.
    pub max_block: usize,
    /// Keep the transaction log.
    pub record_bus: bool,
}

/// What a loopback run observed.
#[derive(Debug)]
pub struct Report {
    /// Baud rate each channel ended up at.
    pub achieved_baud: u32,
    /// Bytes handed to channel A.
    pub sent: Vec<u8>,
    /// Bytes read back from channel B.
    pub received: Vec<u8>,
    /// Per-channel interrupt counters, A then B.
    pub icount: [ICount; 2],
    /// Per-channel engine diagnostics, A then B.
    pub stats: [ChannelStats; 2],
    /// Register transactions, when recorded.
    pub transactions: Vec<Transaction>,
}

impl Report {
    /// Whether everything sent came back unchanged.
    pub fn matches(&self) -> bool {
        self.sent == self.received
    }
}

/// Attaches a chip to a crosslinked model, starts both channels with `line`
/// and pushes `payload` through, one chunk at a time.
pub fn run(config: &SimConfig, line: &LineConfig, payload: &[u8], opts: Options) -> Result<Report> {
    let bus = SimBus::new();
    bus.set_crosslink(true);
    bus.set_max_block_len(opts.max_block);
    bus.set_logging(opts.record_bus);

    let chip: SimChip<TtyPort> = Chip::attach(
        bus.clone(),
        SimServices::new(),
        config.chip.clone(),
        [TtyPort::new("ttyNSC0"), TtyPort::new("ttyNSC1")],
    )
    .context("attaching chip")?;

    let mut achieved_baud = 0;
    for ch in ChannelIndex::ALL {
        chip.startup(ch).with_context(|| format!("starting channel {ch}"))?;
        achieved_baud = chip
            .set_line_config(ch, line)
            .with_context(|| format!("configuring channel {ch}"))?;
    }
    run_until_idle(&chip).context("initial sync")?;

    let mut received = Vec::with_capacity(payload.len());
    for chunk in payload.chunks(opts.chunk.max(1)) {
        let queued = chip.port(TX).write(chunk);
        if queued != chunk.len() {
            bail!("transmit buffer full after {} of {} bytes", received.len(), payload.len());
        }
        chip.start_tx(TX);
        run_until_idle(&chip).context("transferring chunk")?;
        received.extend(chip.port(RX).read_all());
    }

    let icount = [chip.icount(TX), chip.icount(RX)];
    let stats = [chip.stats(TX), chip.stats(RX)];
    for ch in ChannelIndex::ALL {
        chip.shutdown_channel(ch).with_context(|| format!("stopping channel {ch}"))?;
    }
    if chip.detach().is_err() {
        bail!("chip still busy after shutdown");
    }

    Ok(Report {
        achieved_baud,
        sent: payload.to_vec(),
        received,
        icount,
        stats,
        transactions: bus.transactions(),
    })
}
