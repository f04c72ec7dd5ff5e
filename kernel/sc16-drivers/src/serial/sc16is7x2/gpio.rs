//! The bridge's eight general-purpose pins.
//!
//! The pin registers live on channel A's page. Pins 0-3 double as channel
//! A's modem lines and pins 4-7 as channel B's; each group of four switches
//! between GPIO and modem function as a whole through IOControl.

use sc16_core::sync::SpinLock;
use sc16_core::{kdebug, kinfo};
use sc16_driver_api::{BusError, ChannelIndex, DriverError, RegisterBus};

use super::regs::{reg, ChannelRegs, IoControl};

/// Number of pins on the chip.
pub const GPIO_COUNT: u8 = 8;

#[derive(Debug, Clone, Copy, Default)]
struct GpioCache {
    dir: u8,
    state: u8,
    requested: u8,
    control: IoControl,
}

/// Cached pin state of one chip.
pub struct GpioBank {
    base: u32,
    label: alloc::string::String,
    cache: SpinLock<GpioCache>,
}

fn pin_bit(offset: u8) -> Result<u8, DriverError> {
    if offset < GPIO_COUNT {
        Ok(1 << offset)
    } else {
        Err(DriverError::InvalidArgument)
    }
}

/// Modem-function bit and pin mask of the block containing `offset`.
fn block_of(offset: u8) -> (IoControl, u8, &'static str) {
    if offset < 4 {
        (IoControl::GPIO30_MODEM, 0x0F, "0-3")
    } else {
        (IoControl::GPIO74_MODEM, 0xF0, "4-7")
    }
}

impl GpioBank {
    pub(crate) fn new(base: u32, label: &str) -> Self {
        Self {
            base,
            label: label.into(),
            cache: SpinLock::named("sc16is7x2.gpio", GpioCache::default()),
        }
    }

    /// Number of the first pin.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Label of the pin bank.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Puts every pin in GPIO mode, as an input, with interrupts off.
    pub(crate) fn init<B: RegisterBus>(&self, bus: &B) -> Result<(), BusError> {
        let cache = {
            let mut cache = self.cache.lock();
            *cache = GpioCache::default();
            *cache
        };
        let regs = ChannelRegs::new(bus, ChannelIndex::A);
        regs.write(reg::IOINTENA, 0)?;
        regs.write(reg::IOCONTROL, cache.control.bits())?;
        regs.write(reg::IOSTATE, cache.state)?;
        regs.write(reg::IODIR, cache.dir)
    }

    /// Claims a pin, switching its block out of modem function.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an offset of 8 or more; bus failures.
    pub fn request<B: RegisterBus>(&self, bus: &B, offset: u8) -> Result<(), DriverError> {
        let bit = pin_bit(offset)?;
        let (modem, _, name) = block_of(offset);
        // The cache lock spans the IOCONTROL write so the cached value only
        // changes once the chip has it.
        let mut cache = self.cache.lock();
        if cache.control.contains(modem) {
            let control = cache.control - modem;
            kinfo!("sc16is7x2: activate GPIOs {}", name);
            ChannelRegs::new(bus, ChannelIndex::A).write(reg::IOCONTROL, control.bits())?;
            cache.control = control;
        }
        cache.requested |= bit;
        Ok(())
    }

    /// Releases a pin. Freeing the last claimed pin of a block hands the
    /// block back to the modem function.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an offset of 8 or more; bus failures.
    pub fn free<B: RegisterBus>(&self, bus: &B, offset: u8) -> Result<(), DriverError> {
        let bit = pin_bit(offset)?;
        let (modem, mask, name) = block_of(offset);
        let mut cache = self.cache.lock();
        let requested = cache.requested & !bit;
        if !cache.control.contains(modem) && requested & mask == 0 {
            let control = cache.control | modem;
            kinfo!("sc16is7x2: deactivate GPIOs {}", name);
            ChannelRegs::new(bus, ChannelIndex::A).write(reg::IOCONTROL, control.bits())?;
            cache.control = control;
        }
        cache.requested = requested;
        Ok(())
    }

    /// Makes a pin an input.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an offset of 8 or more; bus failures.
    pub fn direction_input<B: RegisterBus>(&self, bus: &B, offset: u8) -> Result<(), DriverError> {
        let bit = pin_bit(offset)?;
        let dir = {
            let mut cache = self.cache.lock();
            cache.dir &= !bit;
            cache.dir
        };
        ChannelRegs::new(bus, ChannelIndex::A).write(reg::IODIR, dir)?;
        Ok(())
    }

    /// Makes a pin an output driving `value`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an offset of 8 or more; bus failures.
    pub fn direction_output<B: RegisterBus>(
        &self,
        bus: &B,
        offset: u8,
        value: bool,
    ) -> Result<(), DriverError> {
        let bit = pin_bit(offset)?;
        let (state, dir) = {
            let mut cache = self.cache.lock();
            if value {
                cache.state |= bit;
            } else {
                cache.state &= !bit;
            }
            cache.dir |= bit;
            (cache.state, cache.dir)
        };
        let regs = ChannelRegs::new(bus, ChannelIndex::A);
        regs.write(reg::IOSTATE, state)?;
        regs.write(reg::IODIR, dir)?;
        Ok(())
    }

    /// Reads a pin. Outputs report the cached level; inputs are sampled.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an offset of 8 or more; bus failures.
    pub fn get<B: RegisterBus>(&self, bus: &B, offset: u8) -> Result<bool, DriverError> {
        let bit = pin_bit(offset)?;
        {
            let cache = self.cache.lock();
            if cache.dir & bit != 0 {
                return Ok(cache.state & bit != 0);
            }
        }
        let sampled = ChannelRegs::new(bus, ChannelIndex::A).read(reg::IOSTATE)?;
        let mut cache = self.cache.lock();
        // Keep cached output levels; only input pins take the sampled value.
        cache.state = (cache.state & cache.dir) | (sampled & !cache.dir);
        kdebug!("sc16is7x2: gpio {} reads {}", offset, sampled & bit != 0);
        Ok(sampled & bit != 0)
    }

    /// Drives an output pin.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an offset of 8 or more; bus failures.
    pub fn set<B: RegisterBus>(&self, bus: &B, offset: u8, value: bool) -> Result<(), DriverError> {
        let bit = pin_bit(offset)?;
        let state = {
            let mut cache = self.cache.lock();
            if value {
                cache.state |= bit;
            } else {
                cache.state &= !bit;
            }
            cache.state
        };
        ChannelRegs::new(bus, ChannelIndex::A).write(reg::IOSTATE, state)?;
        Ok(())
    }

    /// Cached IOControl value.
    pub fn io_control(&self) -> IoControl {
        self.cache.lock().control
    }

    /// Bitmask of claimed pins.
    pub fn requested(&self) -> u8 {
        self.cache.lock().requested
    }
}

/// A [`GpioBank`] bound to the bus it is reached through.
pub struct GpioPins<'a, B> {
    bank: &'a GpioBank,
    bus: &'a B,
}

impl<'a, B: RegisterBus> GpioPins<'a, B> {
    pub(crate) fn new(bank: &'a GpioBank, bus: &'a B) -> Self {
        Self { bank, bus }
    }

    /// See [`GpioBank::request`].
    ///
    /// # Errors
    ///
    /// As [`GpioBank::request`].
    pub fn request(&self, offset: u8) -> Result<(), DriverError> {
        self.bank.request(self.bus, offset)
    }

    /// See [`GpioBank::free`].
    ///
    /// # Errors
    ///
    /// As [`GpioBank::free`].
    pub fn free(&self, offset: u8) -> Result<(), DriverError> {
        self.bank.free(self.bus, offset)
    }

    /// See [`GpioBank::direction_input`].
    ///
    /// # Errors
    ///
    /// As [`GpioBank::direction_input`].
    pub fn direction_input(&self, offset: u8) -> Result<(), DriverError> {
        self.bank.direction_input(self.bus, offset)
    }

    /// See [`GpioBank::direction_output`].
    ///
    /// # Errors
    ///
    /// As [`GpioBank::direction_output`].
    pub fn direction_output(&self, offset: u8, value: bool) -> Result<(), DriverError> {
        self.bank.direction_output(self.bus, offset, value)
    }

    /// See [`GpioBank::get`].
    ///
    /// # Errors
    ///
    /// As [`GpioBank::get`].
    pub fn get(&self, offset: u8) -> Result<bool, DriverError> {
        self.bank.get(self.bus, offset)
    }

    /// See [`GpioBank::set`].
    ///
    /// # Errors
    ///
    /// As [`GpioBank::set`].
    pub fn set(&self, offset: u8, value: bool) -> Result<(), DriverError> {
        self.bank.set(self.bus, offset, value)
    }

    /// The underlying bank.
    pub fn bank(&self) -> &'a GpioBank {
        self.bank
    }
}
