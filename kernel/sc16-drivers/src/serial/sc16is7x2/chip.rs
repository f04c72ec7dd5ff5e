//! Chip-level lifecycle and the per-channel driver surface.
//!
//! A [`Chip`] owns the bus handle, the environment services, both
//! channels and the GPIO bank. Channels never point back at the chip;
//! every operation that needs the bus or services passes them in.

use sc16_core::{kdebug, kerr, kinfo, kwarn};
use sc16_driver_api::{
    BusError, ChannelIndex, ChipConfig, DriverError, DriverServices, ICount, IrqLine, LineConfig,
    ManagedDriver, ModemLines, RegisterBus, UartPort,
};

use super::cache::RegisterCache;
use super::channel::{Channel, ChannelStats, RunOutcome};
use super::gpio::{GpioBank, GpioPins};
use super::regs::{reg, ChannelRegs, IoControl};
use super::termios::{translate, LineSettings};

/// Port type name reported for both channels.
pub const PORT_TYPE_NAME: &str = "SC16IS7X2-I2C";

/// Port type as recorded by the serial core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    /// Not yet configured.
    Unknown,
    /// This driver's port type.
    Sc16is7x2,
    /// Some other UART.
    Other(u32),
}

/// One attached SC16IS7x2.
pub struct Chip<B, P, S> {
    bus: B,
    services: S,
    config: ChipConfig,
    irq: IrqLine,
    channels: [Channel<P>; 2],
    gpio: GpioBank,
}

impl<B: RegisterBus, P: UartPort, S: DriverServices> Chip<B, P, S> {
    /// Probes and initializes the chip: validate `config`, soft-reset the
    /// device, load default line settings into both channels and put all
    /// GPIO pins in input mode. No channel is started.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad config; bus failures during the reset or
    /// GPIO initialization.
    pub fn attach(bus: B, services: S, config: ChipConfig, ports: [P; 2]) -> Result<Self, DriverError> {
        config.validate()?;

        // The reset bit self-clears before the chip acknowledges the write.
        match ChannelRegs::new(&bus, ChannelIndex::A).write(reg::IOCONTROL, IoControl::SRESET.bits()) {
            Ok(()) | Err(BusError::Nack) => {}
            Err(err) => {
                kerr!("sc16is7x2: reset failed: {}", err);
                return Err(err.into());
            }
        }

        let defaults = translate(&LineConfig::default(), config.uartclk);
        let [port_a, port_b] = ports;
        let chip = Self {
            irq: IrqLine::new(config.irq),
            gpio: GpioBank::new(config.gpio_base, &config.gpio_label),
            channels: [
                Channel::new(ChannelIndex::A, port_a, &defaults),
                Channel::new(ChannelIndex::B, port_b, &defaults),
            ],
            bus,
            services,
            config,
        };

        chip.gpio.init(&chip.bus)?;

        kinfo!(
            "sc16is7x2 (irq {}), 2 UARTs, 8 GPIOs: ttyNSC{}, ttyNSC{}, gpio {} ({})",
            chip.config.irq,
            chip.config.uart_base,
            chip.config.uart_base + 1,
            chip.config.gpio_base,
            chip.config.gpio_label
        );
        Ok(chip)
    }

    /// Releases the chip and hands back the bus.
    ///
    /// # Errors
    ///
    /// `Busy` while any channel is started. The chip comes back with the
    /// error so the caller can shut the channels down and retry.
    pub fn detach(self) -> Result<B, (Self, DriverError)> {
        if self.channels.iter().any(Channel::is_active) {
            return Err((self, DriverError::Busy));
        }
        kinfo!("sc16is7x2: detached");
        Ok(self.bus)
    }

    fn channel(&self, ch: ChannelIndex) -> &Channel<P> {
        &self.channels[ch.index()]
    }

    // -----------------------------------------------------------------------
    // Interrupt and worker entry points
    // -----------------------------------------------------------------------

    /// Shared interrupt handler. Timestamps and schedules every active
    /// channel without touching the bus. Returns `true` if any channel was
    /// active.
    pub fn handle_irq(&self) -> bool {
        let mut handled = false;
        for channel in &self.channels {
            handled |= channel.on_irq(&self.services);
        }
        handled
    }

    /// Worker entry point for a queued channel.
    ///
    /// Runs engine passes until no retrigger is outstanding. A retrigger that
    /// arrives while a pass is running makes this call loop again rather
    /// than letting a second worker in.
    ///
    /// # Errors
    ///
    /// The bus error that made a pass give up. The channel stays enabled
    /// and a pending retrigger is re-queued.
    pub fn run_channel(&self, ch: ChannelIndex) -> Result<RunOutcome, DriverError> {
        let channel = self.channel(ch);
        if !channel.work.begin() {
            return Ok(RunOutcome::Skipped);
        }
        loop {
            let now = self.services.now_nanos();
            match channel.run_pass(&self.bus, &self.config, now) {
                Ok(outcome) => {
                    if channel.work.complete() {
                        return Ok(outcome);
                    }
                }
                Err(err) => {
                    // Finish the state machine here; a retrigger that landed
                    // during the failed pass gets a fresh queue entry.
                    let mut retriggered = false;
                    while !channel.work.complete() {
                        retriggered = true;
                    }
                    if retriggered {
                        channel.trigger(&self.services);
                    }
                    return Err(err);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Control interface
    // -----------------------------------------------------------------------

    /// Opens a channel.
    ///
    /// # Errors
    ///
    /// `InvalidState` if already started; resource or bus failures, after
    /// which nothing acquired stays held.
    pub fn startup(&self, ch: ChannelIndex) -> Result<(), DriverError> {
        self.channel(ch).startup(&self.bus, &self.services, self.irq)
    }

    /// Closes a channel and puts its UART to sleep.
    ///
    /// # Errors
    ///
    /// `InvalidState` if not started; a bus failure writing the sleep IER.
    pub fn shutdown_channel(&self, ch: ChannelIndex) -> Result<(), DriverError> {
        self.channel(ch).shutdown(&self.bus, &self.services, self.irq)
    }

    /// Schedules a transmit drain.
    pub fn start_tx(&self, ch: ChannelIndex) {
        self.channel(ch).trigger(&self.services);
    }

    /// Transmission stops on its own once the port buffer runs dry, so
    /// there is nothing to do here.
    pub fn stop_tx(&self, _ch: ChannelIndex) {}

    /// Stops receive-side status reporting.
    pub fn stop_rx(&self, ch: ChannelIndex) {
        self.channel(ch).stop_rx(&self.services);
    }

    /// Enables modem status interrupts.
    pub fn enable_ms(&self, ch: ChannelIndex) {
        self.channel(ch).enable_ms(&self.services);
    }

    /// Break generation is not implemented; the request is logged and
    /// otherwise ignored.
    pub fn break_ctl(&self, ch: ChannelIndex, on: bool) {
        kdebug!("sc16is7x2 {}: break_ctl({}) ignored", ch, on);
    }

    /// Drives DTR and RTS.
    pub fn set_mctrl(&self, ch: ChannelIndex, lines: ModemLines) {
        self.channel(ch).set_mctrl(&self.services, lines);
    }

    /// Applies a line configuration and returns the baud rate actually
    /// achieved.
    ///
    /// # Errors
    ///
    /// Out-of-range baud rates are clamped rather than rejected, so this
    /// only fails if the configuration cannot be represented at all.
    pub fn set_line_config(&self, ch: ChannelIndex, line: &LineConfig) -> Result<u32, DriverError> {
        let settings = translate(line, self.config.uartclk);
        if settings.achieved_baud.abs_diff(line.baud) > line.baud / 50 && line.baud != 0 {
            kwarn!(
                "sc16is7x2 {}: requested {} baud, got {}",
                ch,
                line.baud,
                settings.achieved_baud
            );
        }
        self.channel(ch).set_line_settings(&self.services, &settings);
        Ok(settings.achieved_baud)
    }

    /// Computes the settings `line` would produce without applying them.
    pub fn preview_line_config(&self, line: &LineConfig) -> LineSettings {
        translate(line, self.config.uartclk)
    }

    // -----------------------------------------------------------------------
    // Status queries
    // -----------------------------------------------------------------------

    /// Returns `true` when the transmitter is idle, from the last LSR read.
    pub fn tx_empty(&self, ch: ChannelIndex) -> bool {
        self.channel(ch).tx_empty()
    }

    /// Modem status lines from the last MSR read plus the driven outputs.
    pub fn get_mctrl(&self, ch: ChannelIndex) -> ModemLines {
        self.channel(ch).modem_lines()
    }

    /// Transfer and error counters.
    pub fn icount(&self, ch: ChannelIndex) -> ICount {
        self.channel(ch).icount()
    }

    /// Engine diagnostics.
    pub fn stats(&self, ch: ChannelIndex) -> ChannelStats {
        self.channel(ch).stats()
    }

    /// Baud rate in effect after the last configuration change.
    pub fn baud(&self, ch: ChannelIndex) -> u32 {
        self.channel(ch).achieved_baud()
    }

    /// Snapshot of the channel's register cache.
    pub fn register_cache(&self, ch: ChannelIndex) -> RegisterCache {
        self.channel(ch).cache()
    }

    /// Whether the divisor and configuration syncs are outstanding.
    pub fn sync_pending(&self, ch: ChannelIndex) -> (bool, bool) {
        self.channel(ch).is_dirty()
    }

    /// Returns `true` if the channel is started.
    pub fn is_active(&self, ch: ChannelIndex) -> bool {
        self.channel(ch).is_active()
    }

    /// Line number of a channel.
    pub fn line(&self, ch: ChannelIndex) -> u32 {
        self.config.uart_base + u32::from(ch.raw())
    }

    /// Port type name.
    pub fn port_type(&self) -> &'static str {
        PORT_TYPE_NAME
    }

    /// Checks a port type requested by the serial core.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a foreign port type.
    pub fn verify_port(&self, ty: PortType) -> Result<(), DriverError> {
        match ty {
            PortType::Unknown | PortType::Sc16is7x2 => Ok(()),
            PortType::Other(_) => Err(DriverError::InvalidArgument),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The port attached to a channel.
    pub fn port(&self, ch: ChannelIndex) -> &P {
        &self.channel(ch).port
    }

    /// The bus handle.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// The environment services.
    pub fn services(&self) -> &S {
        &self.services
    }

    /// The configuration the chip was attached with.
    pub fn config(&self) -> &ChipConfig {
        &self.config
    }

    /// The GPIO pins, bound to this chip's bus.
    pub fn gpio(&self) -> GpioPins<'_, B> {
        GpioPins::new(&self.gpio, &self.bus)
    }

    /// The GPIO bank state.
    pub fn gpio_bank(&self) -> &GpioBank {
        &self.gpio
    }
}

impl<B: RegisterBus, P: UartPort, S: DriverServices> ManagedDriver for Chip<B, P, S> {
    fn suspend(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn resume(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn shutdown(&self) {
        for ch in ChannelIndex::ALL {
            if !self.is_active(ch) {
                continue;
            }
            if let Err(err) = self.shutdown_channel(ch) {
                kwarn!("sc16is7x2 {}: shutdown: {}", ch, err);
            }
        }
    }
}
