//! SC16IS7x2 register map.
//!
//! Registers 0-7 follow the 16550 layout. Which register an address
//! selects depends on LCR: with DLAB set, 0/1 are the divisor latches; with
//! LCR = 0xBF, 2 is the Enhanced Features Register. 8-15 are bridge
//! extensions (FIFO levels, GPIO, extra features) and only exist in the
//! general bank.

use bitflags::bitflags;
use sc16_driver_api::{BusError, ChannelIndex, RegisterBus, SubAddress};

// ---------------------------------------------------------------------------
// Register numbers
// ---------------------------------------------------------------------------

/// Register numbers within a channel's page.
pub mod reg {
    /// Receive Holding Register (read).
    pub const RHR: u8 = 0x00;
    /// Transmit Holding Register (write).
    pub const THR: u8 = 0x00;
    /// Interrupt Enable Register.
    pub const IER: u8 = 0x01;
    /// Interrupt Identification Register (read).
    pub const IIR: u8 = 0x02;
    /// FIFO Control Register (write).
    pub const FCR: u8 = 0x02;
    /// Line Control Register.
    pub const LCR: u8 = 0x03;
    /// Modem Control Register.
    pub const MCR: u8 = 0x04;
    /// Line Status Register.
    pub const LSR: u8 = 0x05;
    /// Modem Status Register.
    pub const MSR: u8 = 0x06;
    /// Scratch Pad Register.
    pub const SPR: u8 = 0x07;
    /// Transmit FIFO free space.
    pub const TXLVL: u8 = 0x08;
    /// Receive FIFO fill level.
    pub const RXLVL: u8 = 0x09;
    /// GPIO direction (channel A page only).
    pub const IODIR: u8 = 0x0A;
    /// GPIO pin state (channel A page only).
    pub const IOSTATE: u8 = 0x0B;
    /// GPIO interrupt enable (channel A page only).
    pub const IOINTENA: u8 = 0x0C;
    /// GPIO control and software reset (channel A page only).
    pub const IOCONTROL: u8 = 0x0E;
    /// Extra Features Control Register.
    pub const EFCR: u8 = 0x0F;

    /// Divisor Latch Low (LCR.DLAB = 1).
    pub const DLL: u8 = 0x00;
    /// Divisor Latch High (LCR.DLAB = 1).
    pub const DLM: u8 = 0x01;
    /// Enhanced Features Register (LCR = 0xBF).
    pub const EFR: u8 = 0x02;
}

/// LCR value that opens the enhanced register bank.
pub const LCR_EFR_BANK: u8 = 0xBF;

// ---------------------------------------------------------------------------
// Bitflag types
// ---------------------------------------------------------------------------

bitflags! {
    /// Interrupt Enable Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ier: u8 {
        /// Receive data available / RX timeout.
        const RDI   = 1 << 0;
        /// Transmit holding register empty.
        const THRI  = 1 << 1;
        /// Receiver line status.
        const RLSI  = 1 << 2;
        /// Modem status.
        const MSI   = 1 << 3;
        /// Sleep mode (needs EFR.ENHANCED).
        const SLEEP = 1 << 4;
    }
}

bitflags! {
    /// FIFO Control Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Fcr: u8 {
        /// Enable FIFOs.
        const ENABLE        = 1 << 0;
        /// Clear receive FIFO (self-clearing).
        const CLEAR_RX      = 1 << 1;
        /// Clear transmit FIFO (self-clearing).
        const CLEAR_TX      = 1 << 2;
        /// TX trigger level bits (needs EFR.ENHANCED).
        const TX_TRIG_MASK  = 0b11 << 4;
        /// RX trigger level bits.
        const RX_TRIG_MASK  = 0b11 << 6;

        /// RX trigger `01` (16 characters).
        const RX_TRIG_01    = 0b01 << 6;
        /// TX trigger `10` (32 spaces).
        const TX_TRIG_10    = 0b10 << 4;
    }
}

bitflags! {
    /// Line Control Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Lcr: u8 {
        /// Word length bit 0.
        const WLEN_0        = 1 << 0;
        /// Word length bit 1.
        const WLEN_1        = 1 << 1;
        /// Extra stop bit.
        const STOP          = 1 << 2;
        /// Parity enable.
        const PARITY_ENABLE = 1 << 3;
        /// Even parity.
        const EVEN_PARITY   = 1 << 4;
        /// Stick (forced) parity.
        const STICK_PARITY  = 1 << 5;
        /// Transmit break.
        const BREAK         = 1 << 6;
        /// Divisor Latch Access Bit.
        const DLAB          = 1 << 7;

        /// 8 data bits.
        const WLEN8 = Self::WLEN_0.bits() | Self::WLEN_1.bits();
    }
}

bitflags! {
    /// Modem Control Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Mcr: u8 {
        /// Data Terminal Ready (asserted low on the pin).
        const DTR       = 1 << 0;
        /// Request To Send (asserted low on the pin).
        const RTS       = 1 << 1;
        /// Enable TCR/TLR registers.
        const TCR_TLR   = 1 << 2;
        /// Internal loopback.
        const LOOPBACK  = 1 << 4;
        /// IrDA mode.
        const IRDA      = 1 << 6;
        /// Clock divide-by-4 prescaler.
        const CLOCK_DIV = 1 << 7;
    }
}

bitflags! {
    /// Line Status Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Lsr: u8 {
        /// Data ready.
        const DR    = 1 << 0;
        /// Overrun error.
        const OE    = 1 << 1;
        /// Parity error.
        const PE    = 1 << 2;
        /// Framing error.
        const FE    = 1 << 3;
        /// Break interrupt.
        const BI    = 1 << 4;
        /// Transmit holding register empty.
        const THRE  = 1 << 5;
        /// Transmitter empty (THR and shift register).
        const TEMT  = 1 << 6;
        /// At least one error in the RX FIFO.
        const FIFOE = 1 << 7;

        /// Bits that describe a receive error or break.
        const BRK_ERROR_BITS = Self::BI.bits() | Self::FE.bits() | Self::PE.bits() | Self::OE.bits();
    }
}

bitflags! {
    /// Modem Status Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Msr: u8 {
        /// CTS changed.
        const DCTS = 1 << 0;
        /// DSR changed.
        const DDSR = 1 << 1;
        /// RI trailing edge.
        const TERI = 1 << 2;
        /// CD changed.
        const DDCD = 1 << 3;
        /// Clear To Send.
        const CTS  = 1 << 4;
        /// Data Set Ready.
        const DSR  = 1 << 5;
        /// Ring Indicator.
        const RI   = 1 << 6;
        /// Carrier Detect.
        const DCD  = 1 << 7;
    }
}

bitflags! {
    /// Enhanced Features Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Efr: u8 {
        /// Enable enhanced functions (IER[7:4], FCR[5:4], MCR[7:5]).
        const ENHANCED  = 1 << 4;
        /// Special character detect.
        const SPECIAL   = 1 << 5;
        /// Automatic RTS.
        const AUTO_RTS  = 1 << 6;
        /// Automatic CTS.
        const AUTO_CTS  = 1 << 7;
    }
}

bitflags! {
    /// Extra Features Control Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Efcr: u8 {
        /// 9-bit (multidrop) mode.
        const MULTIDROP = 1 << 0;
        /// Receiver disable.
        const RX_DISABLE = 1 << 1;
        /// Transmitter disable.
        const TX_DISABLE = 1 << 2;
        /// Transmitter drives RTS (auto RS-485 direction).
        const RTSCON    = 1 << 4;
        /// Invert RTS in RS-485 mode.
        const RTSINVER  = 1 << 5;
        /// IrDA fast mode.
        const IRDA_FAST = 1 << 7;
    }
}

bitflags! {
    /// I/O Control Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IoControl: u8 {
        /// Latch input pin state.
        const IOLATCH = 1 << 0;
        /// GPIO[7:4] act as channel B modem pins.
        const GPIO74_MODEM = 1 << 1;
        /// GPIO[3:0] act as channel A modem pins.
        const GPIO30_MODEM = 1 << 2;
        /// Software reset (self-clearing).
        const SRESET  = 1 << 3;
    }
}

// ---------------------------------------------------------------------------
// Interrupt identification
// ---------------------------------------------------------------------------

/// IIR bit 0: set when no interrupt is pending.
pub const IIR_NO_INT: u8 = 0x01;

/// Decoded IIR interrupt source, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IirReason {
    /// Nothing pending.
    None,
    /// Receiver line status error.
    LineStatus,
    /// Receiver timeout (stale data in the RX FIFO).
    RxTimeout,
    /// RX FIFO reached its trigger level.
    RxData,
    /// TX FIFO below its trigger level.
    TxEmpty,
    /// Modem status change.
    ModemStatus,
    /// GPIO input change.
    InputPins,
    /// Xoff or special character received.
    Xoff,
    /// CTS or RTS changed state.
    FlowControl,
    /// Unknown source code.
    Other(u8),
}

impl IirReason {
    /// Decodes an IIR value.
    #[must_use]
    pub const fn from_iir(iir: u8) -> Self {
        if iir & IIR_NO_INT != 0 {
            return Self::None;
        }
        match iir & 0x3E {
            0x06 => Self::LineStatus,
            0x0C => Self::RxTimeout,
            0x04 => Self::RxData,
            0x02 => Self::TxEmpty,
            0x00 => Self::ModemStatus,
            0x30 => Self::InputPins,
            0x10 => Self::Xoff,
            0x20 => Self::FlowControl,
            other => Self::Other(other),
        }
    }

    /// Returns `true` for the receive-side sources.
    #[must_use]
    pub const fn is_receive(self) -> bool {
        matches!(self, Self::LineStatus | Self::RxTimeout | Self::RxData)
    }
}

// ---------------------------------------------------------------------------
// Register access
// ---------------------------------------------------------------------------

/// Register accessor bound to one channel's page.
pub struct ChannelRegs<'a, B: RegisterBus> {
    bus: &'a B,
    ch: ChannelIndex,
}

impl<'a, B: RegisterBus> ChannelRegs<'a, B> {
    /// Binds `bus` to channel `ch`.
    pub const fn new(bus: &'a B, ch: ChannelIndex) -> Self {
        Self { bus, ch }
    }

    /// Returns the channel this accessor is bound to.
    pub const fn channel(&self) -> ChannelIndex {
        self.ch
    }

    /// Largest block the underlying transport moves at once.
    pub fn max_block_len(&self) -> usize {
        self.bus.max_block_len()
    }

    /// Reads register `reg`.
    ///
    /// # Errors
    ///
    /// Propagates the bus failure.
    #[inline]
    pub fn read(&self, reg: u8) -> Result<u8, BusError> {
        self.bus.read_byte(SubAddress::new(reg, self.ch))
    }

    /// Writes `value` to register `reg`.
    ///
    /// # Errors
    ///
    /// Propagates the bus failure.
    #[inline]
    pub fn write(&self, reg: u8, value: u8) -> Result<(), BusError> {
        self.bus.write_byte(SubAddress::new(reg, self.ch), value)
    }

    /// Reads a FIFO level register, clamped to `max`.
    ///
    /// # Errors
    ///
    /// Propagates the bus failure.
    pub fn read_level(&self, reg: u8, max: usize) -> Result<usize, BusError> {
        Ok(usize::from(self.read(reg)?).min(max))
    }

    /// Drains up to `buf.len()` bytes from RHR.
    ///
    /// # Errors
    ///
    /// Propagates the bus failure.
    pub fn read_fifo(&self, buf: &mut [u8]) -> Result<usize, BusError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.bus.read_block(SubAddress::new(reg::RHR, self.ch), buf)?;
        Ok(n.min(buf.len()))
    }

    /// Writes `data` to THR in one block.
    ///
    /// # Errors
    ///
    /// Propagates the bus failure.
    pub fn write_fifo(&self, data: &[u8]) -> Result<(), BusError> {
        if data.is_empty() {
            return Ok(());
        }
        self.bus.write_block(SubAddress::new(reg::THR, self.ch), data)
    }
}
