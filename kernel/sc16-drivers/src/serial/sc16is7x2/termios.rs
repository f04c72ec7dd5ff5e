//! Line configuration to register translation.
//!
//! [`translate`] is a pure function: it computes every register value and
//! status mask a [`LineConfig`] implies, and the channel then stores the
//! result under its lock and schedules the hardware sync.

use sc16_driver_api::{CharSize, FlowControl, InputFlags, LineConfig, Parity, StopBits};

use super::regs::{Efr, Fcr, Lcr, Lsr};

/// Baud rate used when the caller asks for 0.
pub const DEFAULT_BAUD: u32 = 9600;

/// Below this rate the RX FIFO interrupts on every character.
const LOW_TRIGGER_BELOW: u32 = 2400;

/// Register values and masks derived from a [`LineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    /// Line control.
    pub lcr: Lcr,
    /// FIFO control.
    pub fcr: Fcr,
    /// Enhanced features.
    pub efr: Efr,
    /// Baud divisor.
    pub divisor: u16,
    /// Baud rate the divisor actually produces.
    pub achieved_baud: u32,
    /// LSR bits reported to the line discipline.
    pub read_status_mask: Lsr,
    /// LSR bits whose chunks are dropped.
    pub ignore_status_mask: Lsr,
    /// Whether the modem status interrupt is wanted.
    pub modem_status_irq: bool,
}

/// Character framing encoded in LCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Data bits.
    pub char_size: CharSize,
    /// Stop bits.
    pub stop_bits: StopBits,
    /// Parity mode.
    pub parity: Parity,
}

impl FrameFormat {
    /// Encodes the framing as an LCR value (DLAB and break clear).
    #[must_use]
    pub fn to_lcr(self) -> Lcr {
        let mut lcr = Lcr::from_bits_retain(match self.char_size {
            CharSize::Five => 0b00,
            CharSize::Six => 0b01,
            CharSize::Seven => 0b10,
            CharSize::Eight => 0b11,
        });
        if self.stop_bits == StopBits::Two {
            lcr |= Lcr::STOP;
        }
        lcr |= match self.parity {
            Parity::None => Lcr::empty(),
            Parity::Odd => Lcr::PARITY_ENABLE,
            Parity::Even => Lcr::PARITY_ENABLE | Lcr::EVEN_PARITY,
            Parity::Mark => Lcr::PARITY_ENABLE | Lcr::STICK_PARITY,
            Parity::Space => Lcr::PARITY_ENABLE | Lcr::EVEN_PARITY | Lcr::STICK_PARITY,
        };
        lcr
    }

    /// Decodes the framing part of an LCR value.
    #[must_use]
    pub fn from_lcr(lcr: Lcr) -> Self {
        let char_size = match lcr.bits() & 0b11 {
            0b00 => CharSize::Five,
            0b01 => CharSize::Six,
            0b10 => CharSize::Seven,
            _ => CharSize::Eight,
        };
        let stop_bits = if lcr.contains(Lcr::STOP) {
            StopBits::Two
        } else {
            StopBits::One
        };
        let parity = if lcr.contains(Lcr::PARITY_ENABLE) {
            match (lcr.contains(Lcr::EVEN_PARITY), lcr.contains(Lcr::STICK_PARITY)) {
                (false, false) => Parity::Odd,
                (true, false) => Parity::Even,
                (false, true) => Parity::Mark,
                (true, true) => Parity::Space,
            }
        } else {
            Parity::None
        };
        Self {
            char_size,
            stop_bits,
            parity,
        }
    }
}

/// Clamps `requested` into the range `uartclk` can produce. Zero selects
/// [`DEFAULT_BAUD`].
#[must_use]
pub fn clamp_baud(requested: u32, uartclk: u32) -> u32 {
    let max = (uartclk / 16).max(1);
    let min = (uartclk / 16 / 0xFFFF).clamp(1, max);
    let baud = if requested == 0 { DEFAULT_BAUD } else { requested };
    baud.clamp(min, max)
}

/// Divisor closest to `uartclk / (16 * baud)`, within `1..=0xFFFF`.
#[must_use]
pub fn divisor_for(uartclk: u32, baud: u32) -> u16 {
    let den = 16 * u64::from(baud.max(1));
    let div = (u64::from(uartclk) + den / 2) / den;
    u16::try_from(div.clamp(1, 0xFFFF)).unwrap_or(u16::MAX)
}

/// Baud rate produced by `divisor`, rounded to the nearest integer.
#[must_use]
pub fn baud_for(uartclk: u32, divisor: u16) -> u32 {
    let den = 16 * u64::from(divisor.max(1));
    let baud = (u64::from(uartclk) + den / 2) / den;
    u32::try_from(baud).unwrap_or(u32::MAX)
}

/// Translates a line configuration for a chip clocked at `uartclk`.
#[must_use]
pub fn translate(cfg: &LineConfig, uartclk: u32) -> LineSettings {
    let baud = clamp_baud(cfg.baud, uartclk);
    let divisor = divisor_for(uartclk, baud);

    let lcr = FrameFormat {
        char_size: cfg.char_size,
        stop_bits: cfg.stop_bits,
        parity: cfg.parity,
    }
    .to_lcr();

    let fcr = if baud < LOW_TRIGGER_BELOW {
        Fcr::ENABLE
    } else {
        Fcr::ENABLE | Fcr::RX_TRIG_01 | Fcr::TX_TRIG_10
    };

    let mut efr = Efr::ENHANCED;
    if cfg.flow == FlowControl::RtsCts {
        efr |= Efr::AUTO_RTS | Efr::AUTO_CTS;
    }

    let mut read_status_mask = Lsr::OE | Lsr::THRE | Lsr::DR;
    if cfg.input.contains(InputFlags::INPCK) {
        read_status_mask |= Lsr::FE | Lsr::PE;
    }
    if cfg.input.intersects(InputFlags::BRKINT | InputFlags::PARMRK) {
        read_status_mask |= Lsr::BI;
    }

    let mut ignore_status_mask = Lsr::empty();
    if cfg.input.contains(InputFlags::IGNPAR) {
        ignore_status_mask |= Lsr::PE | Lsr::FE;
    }
    if cfg.input.contains(InputFlags::IGNBRK) {
        ignore_status_mask |= Lsr::BI;
        // Ignoring both parity and breaks means raw mode: drop overruns too.
        if cfg.input.contains(InputFlags::IGNPAR) {
            ignore_status_mask |= Lsr::OE;
        }
    }
    if !cfg.receiver_enabled {
        ignore_status_mask |= Lsr::DR;
    }

    LineSettings {
        lcr,
        fcr,
        efr,
        divisor,
        achieved_baud: baud_for(uartclk, divisor),
        read_status_mask,
        ignore_status_mask,
        modem_status_irq: cfg.flow == FlowControl::RtsCts || !cfg.local,
    }
}
