//! Per-channel state and the deferred-processing engine.
//!
//! A [`Channel`] owns its register cache, dirty flags, status masks and
//! counters behind one [`IrqSpinLock`], plus scratch buffers that only the
//! worker touches. The state lock is held for in-memory updates only; every
//! bus transaction happens with it released. The scratch lock may span bus
//! I/O, since nothing outside the worker and lifecycle paths takes it.
//!
//! One engine run repeats, until IIR reports nothing pending:
//!
//! 1. divisor-latch sync, if `baud_dirty`;
//! 2. configuration sync, if `config_dirty`;
//! 3. status refresh (IIR, MSR, LSR, EFCR);
//! 4. transmit drain;
//! 5. receive drain.
//!
//! The loop is capped at `max_loop_iterations`, and a run is abandoned
//! after `max_bus_errors` consecutive failing iterations.

use core::sync::atomic::{AtomicBool, Ordering};

use sc16_core::sync::{IrqSpinLock, SpinLock};
use sc16_core::work::DeferredWork;
use sc16_core::{kerr, kinfo, ktrace, kwarn};
use sc16_driver_api::{
    BusError, ChannelIndex, ChipConfig, DriverError, DriverServices, FIFO_SIZE, ICount, IrqLine,
    ModemLines, RegisterBus, UartPort,
};

use super::cache::{BaudSync, ConfigSync, DirtyFlag, RegisterCache};
use super::regs::{reg, ChannelRegs, Efcr, Fcr, Ier, Lcr, Lsr, Mcr, Msr, LCR_EFR_BANK};
use super::termios::LineSettings;

/// Receive scratch: one full FIFO per pass, two passes.
pub(crate) const RX_SCRATCH_LEN: usize = 2 * FIFO_SIZE;

/// Worker-owned buffers.
pub(crate) struct Scratch {
    pub(crate) rx: [u8; RX_SCRATCH_LEN],
    /// Block taken from the port but not yet accepted by the bus.
    pub(crate) tx: [u8; FIFO_SIZE],
    pub(crate) tx_held: usize,
}

impl Scratch {
    const fn new() -> Self {
        Self {
            rx: [0; RX_SCRATCH_LEN],
            tx: [0; FIFO_SIZE],
            tx_held: 0,
        }
    }
}

/// Engine diagnostics for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStats {
    /// Engine runs started.
    pub runs: u64,
    /// Loop iterations across all runs.
    pub iterations: u64,
    /// Runs that stopped at the iteration cap.
    pub loop_cap_hits: u64,
    /// Iterations that failed on the bus.
    pub bus_errors: u64,
    /// RX level reads above the FIFO depth.
    pub fifo_clamps: u64,
    /// Receive chunks dropped by the ignore mask or the break hook.
    pub rx_dropped: u64,
    /// Worst observed interrupt-to-run latency in nanoseconds.
    pub max_irq_latency_ns: u64,
}

/// How an engine run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The work item had been disabled; nothing ran.
    Skipped,
    /// IIR reported no pending interrupt.
    Idle,
    /// The iteration cap was reached with interrupts still pending.
    LoopCapReached,
}

/// Lock-protected channel state.
pub(crate) struct ChannelState {
    pub(crate) cache: RegisterCache,
    pub(crate) baud_dirty: DirtyFlag,
    pub(crate) config_dirty: DirtyFlag,
    pub(crate) read_status_mask: Lsr,
    pub(crate) ignore_status_mask: Lsr,
    pub(crate) icount: ICount,
    pub(crate) achieved_baud: u32,
    pub(crate) irq_stamp: Option<u64>,
    pub(crate) stats: ChannelStats,
}

impl ChannelState {
    fn new(settings: &LineSettings) -> Self {
        let mut cache = RegisterCache::RESET;
        cache.lcr = settings.lcr;
        cache.fcr = settings.fcr;
        cache.efr = settings.efr;
        cache.divisor = settings.divisor;
        Self {
            cache,
            baud_dirty: DirtyFlag::default(),
            config_dirty: DirtyFlag::default(),
            read_status_mask: settings.read_status_mask,
            ignore_status_mask: settings.ignore_status_mask,
            icount: ICount::default(),
            achieved_baud: settings.achieved_baud,
            irq_stamp: None,
            stats: ChannelStats::default(),
        }
    }

    fn apply(&mut self, settings: &LineSettings) {
        self.cache.divisor = settings.divisor;
        self.cache.lcr = settings.lcr;
        self.cache.fcr = settings.fcr;
        self.cache.efr = settings.efr;
        self.cache.ier.set(Ier::MSI, settings.modem_status_irq);
        self.read_status_mask = settings.read_status_mask;
        self.ignore_status_mask = settings.ignore_status_mask;
        self.achieved_baud = settings.achieved_baud;
        self.baud_dirty.mark();
        self.config_dirty.mark();
    }
}

/// One UART channel of the bridge.
pub(crate) struct Channel<P> {
    pub(crate) index: ChannelIndex,
    pub(crate) port: P,
    pub(crate) state: IrqSpinLock<ChannelState>,
    pub(crate) work: DeferredWork,
    pub(crate) scratch: SpinLock<Scratch>,
    active: AtomicBool,
}

impl<P: UartPort> Channel<P> {
    pub(crate) fn new(index: ChannelIndex, port: P, settings: &LineSettings) -> Self {
        Self {
            index,
            port,
            state: IrqSpinLock::named("sc16is7x2.channel", ChannelState::new(settings)),
            work: DeferredWork::new(),
            scratch: SpinLock::named("sc16is7x2.scratch", Scratch::new()),
            active: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Hands the channel to a worker unless a run is already pending.
    pub(crate) fn trigger<S: DriverServices>(&self, services: &S) {
        if self.work.schedule() {
            services.queue_work(self.index);
        }
    }

    /// Interrupt-side entry: record the assertion time and schedule.
    pub(crate) fn on_irq<S: DriverServices>(&self, services: &S) -> bool {
        if !self.is_active() {
            return false;
        }
        let now = services.now_nanos();
        {
            let mut st = self.state.lock();
            st.irq_stamp.get_or_insert(now);
        }
        self.trigger(services);
        true
    }

    // -----------------------------------------------------------------------
    // Engine
    // -----------------------------------------------------------------------

    /// Runs the engine loop once to completion.
    pub(crate) fn run_pass<B: RegisterBus>(
        &self,
        bus: &B,
        cfg: &ChipConfig,
        now: u64,
    ) -> Result<RunOutcome, DriverError> {
        {
            let mut st = self.state.lock();
            st.stats.runs += 1;
            if let Some(stamp) = st.irq_stamp.take() {
                let latency = now.saturating_sub(stamp);
                st.stats.max_irq_latency_ns = st.stats.max_irq_latency_ns.max(latency);
            }
        }

        let regs = ChannelRegs::new(bus, self.index);
        let mut failures = 0;
        for _ in 0..cfg.max_loop_iterations {
            self.state.lock().stats.iterations += 1;
            match self.iterate(&regs, cfg) {
                Ok(true) => return Ok(RunOutcome::Idle),
                Ok(false) => failures = 0,
                Err(err) => {
                    failures += 1;
                    self.state.lock().stats.bus_errors += 1;
                    kwarn!(
                        "sc16is7x2 {}: bus error in engine loop ({}/{}): {}",
                        self.index,
                        failures,
                        cfg.max_bus_errors,
                        err
                    );
                    if failures >= cfg.max_bus_errors {
                        kerr!("sc16is7x2 {}: abandoning run after {} bus errors", self.index, failures);
                        return Err(err.into());
                    }
                }
            }
        }

        self.state.lock().stats.loop_cap_hits += 1;
        kwarn!(
            "sc16is7x2 {}: interrupt still pending after {} iterations",
            self.index,
            cfg.max_loop_iterations
        );
        Ok(RunOutcome::LoopCapReached)
    }

    /// One loop iteration. Returns `true` when IIR shows nothing pending.
    fn iterate<B: RegisterBus>(&self, regs: &ChannelRegs<'_, B>, cfg: &ChipConfig) -> Result<bool, BusError> {
        self.sync_baud(regs)?;
        self.sync_config(regs)?;
        self.refresh_status(regs)?;
        self.drain_tx(regs, cfg)?;
        self.drain_rx(regs)?;
        Ok(self.state.lock().cache.no_interrupt_pending())
    }

    /// Programs the divisor latch if the baud rate changed.
    pub(crate) fn sync_baud<B: RegisterBus>(&self, regs: &ChannelRegs<'_, B>) -> Result<(), BusError> {
        let snapshot = {
            let st = self.state.lock();
            st.baud_dirty.ticket().map(|ticket| BaudSync {
                ticket,
                divisor: st.cache.divisor,
                lcr: st.cache.lcr,
            })
        };
        let Some(sync) = snapshot else {
            return Ok(());
        };

        let [dll, dlm] = sync.divisor.to_le_bytes();
        regs.write(reg::IER, 0)?;
        regs.write(reg::LCR, Lcr::DLAB.bits())?;
        regs.write(reg::DLL, dll)?;
        regs.write(reg::DLM, dlm)?;
        regs.write(reg::LCR, sync.lcr.bits())?;

        let mut st = self.state.lock();
        st.baud_dirty.acknowledge(sync.ticket);
        // IER was zeroed for the latch write.
        st.config_dirty.mark();
        ktrace!("sc16is7x2 {}: divisor {:#06x} programmed", self.index, sync.divisor);
        Ok(())
    }

    /// Pushes EFR, LCR, FCR, MCR and IER if any of them changed.
    pub(crate) fn sync_config<B: RegisterBus>(&self, regs: &ChannelRegs<'_, B>) -> Result<(), BusError> {
        let snapshot = {
            let st = self.state.lock();
            st.config_dirty.ticket().map(|ticket| ConfigSync {
                ticket,
                efr: st.cache.efr,
                lcr: st.cache.lcr,
                fcr: st.cache.fcr,
                mcr: st.cache.mcr,
                ier: st.cache.ier,
            })
        };
        let Some(sync) = snapshot else {
            return Ok(());
        };

        regs.write(reg::LCR, LCR_EFR_BANK)?;
        regs.write(reg::EFR, sync.efr.bits())?;
        regs.write(reg::LCR, sync.lcr.bits())?;
        regs.write(reg::FCR, sync.fcr.bits())?;
        regs.write(reg::MCR, sync.mcr.bits())?;
        regs.write(reg::IER, sync.ier.bits())?;

        self.state.lock().config_dirty.acknowledge(sync.ticket);
        ktrace!(
            "sc16is7x2 {}: config lcr={:#04x} fcr={:#04x} ier={:#04x}",
            self.index,
            sync.lcr.bits(),
            sync.fcr.bits(),
            sync.ier.bits()
        );
        Ok(())
    }

    /// Re-reads the status registers into the cache.
    pub(crate) fn refresh_status<B: RegisterBus>(&self, regs: &ChannelRegs<'_, B>) -> Result<(), BusError> {
        let iir = regs.read(reg::IIR)?;
        let msr = regs.read(reg::MSR)?;
        let lsr = regs.read(reg::LSR)?;
        let efcr = regs.read(reg::EFCR)?;

        let mut st = self.state.lock();
        st.cache.iir = iir;
        st.cache.msr = Msr::from_bits_retain(msr);
        st.cache.lsr = Lsr::from_bits_retain(lsr);
        st.cache.efcr = Efcr::from_bits_retain(efcr);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Brings the channel up: quiet the hardware, acquire the work item and
    /// interrupt, program the reset configuration and schedule a full sync.
    pub(crate) fn startup<B: RegisterBus, S: DriverServices>(
        &self,
        bus: &B,
        services: &S,
        irq: IrqLine,
    ) -> Result<(), DriverError> {
        if self.is_active() {
            return Err(DriverError::InvalidState);
        }
        let regs = ChannelRegs::new(bus, self.index);

        regs.write(reg::LCR, Lcr::WLEN8.bits())?;
        regs.write(reg::IER, 0)?;
        self.refresh_status(&regs)?;

        services.create_work(self.index)?;
        if let Err(err) = services.request_irq(irq, self.index) {
            kerr!("sc16is7x2 {}: IRQ {} request failed: {}", self.index, irq.number(), err);
            services.destroy_work(self.index);
            return Err(err);
        }

        let (fcr, lcr, mcr, ier, efcr) = {
            let mut st = self.state.lock();
            st.cache.lcr = Lcr::WLEN8;
            st.cache.mcr = Mcr::empty();
            st.cache.fcr = Fcr::empty();
            st.cache.ier = Ier::RLSI | Ier::RDI | Ier::THRI;
            (st.cache.fcr, st.cache.lcr, st.cache.mcr, st.cache.ier, st.cache.efcr)
        };

        self.scratch.lock().tx_held = 0;

        let init = || -> Result<(), BusError> {
            regs.write(reg::FCR, (Fcr::ENABLE | Fcr::CLEAR_RX | Fcr::CLEAR_TX).bits())?;
            regs.write(reg::FCR, fcr.bits())?;
            regs.write(reg::LCR, lcr.bits())?;
            regs.write(reg::MCR, mcr.bits())?;
            regs.write(reg::IER, ier.bits())?;
            regs.write(reg::EFCR, efcr.bits())
        };
        if let Err(err) = init() {
            services.free_irq(irq, self.index);
            services.destroy_work(self.index);
            return Err(err.into());
        }

        {
            let mut st = self.state.lock();
            st.baud_dirty.mark();
            st.config_dirty.mark();
        }
        self.work.enable();
        self.active.store(true, Ordering::Release);
        kinfo!("sc16is7x2 {}: started", self.index);
        self.trigger(services);
        Ok(())
    }

    /// Quiesces the channel: release the interrupt, drain and destroy the
    /// work item, then put the UART to sleep.
    pub(crate) fn shutdown<B: RegisterBus, S: DriverServices>(
        &self,
        bus: &B,
        services: &S,
        irq: IrqLine,
    ) -> Result<(), DriverError> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Err(DriverError::InvalidState);
        }

        services.free_irq(irq, self.index);
        self.work.disable();
        services.flush_work(self.index);
        services.destroy_work(self.index);

        let ier = {
            let mut st = self.state.lock();
            st.cache.ier = Ier::SLEEP;
            st.irq_stamp = None;
            st.cache.ier
        };
        ChannelRegs::new(bus, self.index).write(reg::IER, ier.bits())?;
        kinfo!("sc16is7x2 {}: shut down", self.index);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Control operations
    // -----------------------------------------------------------------------

    /// Stores translated line settings and schedules their sync.
    pub(crate) fn set_line_settings<S: DriverServices>(&self, services: &S, settings: &LineSettings) {
        self.state.lock().apply(settings);
        self.trigger(services);
    }

    /// Disables the line-status interrupt and stops reporting data-ready.
    pub(crate) fn stop_rx<S: DriverServices>(&self, services: &S) {
        {
            let mut st = self.state.lock();
            st.cache.ier.remove(Ier::RLSI);
            st.read_status_mask.remove(Lsr::DR);
            st.config_dirty.mark();
        }
        self.trigger(services);
    }

    /// Enables the modem status interrupt.
    pub(crate) fn enable_ms<S: DriverServices>(&self, services: &S) {
        {
            let mut st = self.state.lock();
            st.cache.ier.insert(Ier::MSI);
            st.config_dirty.mark();
        }
        self.trigger(services);
    }

    /// Drives DTR and RTS through the MCR cache.
    pub(crate) fn set_mctrl<S: DriverServices>(&self, services: &S, lines: ModemLines) {
        {
            let mut st = self.state.lock();
            let mut mcr = st.cache.mcr;
            mcr.set(Mcr::DTR, lines.contains(ModemLines::DTR));
            mcr.set(Mcr::RTS, lines.contains(ModemLines::RTS));
            if mcr == st.cache.mcr {
                return;
            }
            st.cache.mcr = mcr;
            st.config_dirty.mark();
        }
        self.trigger(services);
    }

    // -----------------------------------------------------------------------
    // Status queries
    // -----------------------------------------------------------------------

    pub(crate) fn tx_empty(&self) -> bool {
        self.state.lock().cache.lsr.contains(Lsr::TEMT)
    }

    pub(crate) fn modem_lines(&self) -> ModemLines {
        let st = self.state.lock();
        let msr = st.cache.msr;
        let mut lines = ModemLines::empty();
        lines.set(ModemLines::CAR, msr.contains(Msr::DCD));
        lines.set(ModemLines::RNG, msr.contains(Msr::RI));
        lines.set(ModemLines::DSR, msr.contains(Msr::DSR));
        lines.set(ModemLines::CTS, msr.contains(Msr::CTS));
        lines.set(ModemLines::DTR, st.cache.mcr.contains(Mcr::DTR));
        lines.set(ModemLines::RTS, st.cache.mcr.contains(Mcr::RTS));
        lines
    }

    pub(crate) fn icount(&self) -> ICount {
        self.state.lock().icount
    }

    pub(crate) fn stats(&self) -> ChannelStats {
        self.state.lock().stats
    }

    pub(crate) fn achieved_baud(&self) -> u32 {
        self.state.lock().achieved_baud
    }

    pub(crate) fn cache(&self) -> RegisterCache {
        self.state.lock().cache
    }

    pub(crate) fn is_dirty(&self) -> (bool, bool) {
        let st = self.state.lock();
        (st.baud_dirty.is_dirty(), st.config_dirty.is_dirty())
    }
}
