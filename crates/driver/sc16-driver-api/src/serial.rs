//! Character stream interface between a UART channel and its line discipline.

use bitflags::bitflags;

/// Classification attached to a delivered receive chunk.
///
/// The bridge reports line status per FIFO read, not per byte, so a flag
/// applies to every byte of the chunk it accompanies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RxFlag {
    /// No error.
    #[default]
    Normal,
    /// A break condition was detected.
    Break,
    /// Parity error.
    Parity,
    /// Framing error.
    Frame,
}

bitflags! {
    /// Modem control and status lines.
    ///
    /// Inputs (`CAR`, `RNG`, `DSR`, `CTS`) are reported by status queries;
    /// outputs (`DTR`, `RTS`) are driven by `set_mctrl`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModemLines: u16 {
        /// Data Terminal Ready (output).
        const DTR = 1 << 0;
        /// Request To Send (output).
        const RTS = 1 << 1;
        /// Clear To Send (input).
        const CTS = 1 << 4;
        /// Data Carrier Detect (input).
        const CAR = 1 << 5;
        /// Ring Indicator (input).
        const RNG = 1 << 6;
        /// Data Set Ready (input).
        const DSR = 1 << 7;
    }
}

/// Interrupt-driven transfer and error counters of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ICount {
    /// Bytes received.
    pub rx: u32,
    /// Bytes transmitted.
    pub tx: u32,
    /// Break conditions.
    pub brk: u32,
    /// Chunks received with a parity error.
    pub parity: u32,
    /// Chunks received with a framing error.
    pub frame: u32,
    /// Receive FIFO overruns.
    pub overrun: u32,
}

/// The line-discipline side of one UART channel.
///
/// The driver calls these from its deferred worker, sometimes while holding
/// the channel lock, so implementations must not call back into the driver
/// and must keep their own locking short.
pub trait UartPort: Send + Sync {
    /// Returns the pending out-of-band control byte (XON/XOFF), if any.
    fn x_char(&self) -> Option<u8>;

    /// Clears the out-of-band control byte after it was sent.
    fn clear_x_char(&self);

    /// Returns `true` when output is flow-stopped by the line discipline.
    fn tx_stopped(&self) -> bool;

    /// Number of bytes waiting to be transmitted.
    fn tx_pending(&self) -> usize;

    /// Moves up to `buf.len()` pending bytes into `buf`, in order, and
    /// returns how many were moved.
    fn pop_tx(&self, buf: &mut [u8]) -> usize;

    /// Signals that the transmit buffer has drained below the wakeup mark.
    fn write_wakeup(&self);

    /// Delivers one received chunk with its classification.
    fn receive_chars(&self, bytes: &[u8], flag: RxFlag);

    /// Records that the receive FIFO overran before the chunk was read.
    fn receive_overrun(&self);

    /// Makes delivered data visible to readers.
    fn push(&self);

    /// Break hook. Returns `true` if the chunk that carried the break must
    /// be discarded.
    fn handle_break(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_flag_defaults_to_normal() {
        assert_eq!(RxFlag::default(), RxFlag::Normal);
    }

    #[test]
    fn modem_lines_split_inputs_and_outputs() {
        let outputs = ModemLines::DTR | ModemLines::RTS;
        let inputs = ModemLines::CTS | ModemLines::CAR | ModemLines::RNG | ModemLines::DSR;
        assert!(outputs.intersection(inputs).is_empty());
        assert_eq!(outputs | inputs, ModemLines::all());
    }

    #[test]
    fn icount_starts_zeroed() {
        let c = ICount::default();
        assert_eq!(c.rx + c.tx + c.brk + c.parity + c.frame + c.overrun, 0);
    }
}
