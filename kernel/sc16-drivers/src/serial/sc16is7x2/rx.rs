//! Receive drain.
//!
//! The bridge reports line status per FIFO read rather than per byte, so
//! all bytes taken in one drain share the LSR snapshot from the preceding
//! status refresh and are delivered as a single chunk.

use sc16_core::{ktrace, kwarn};
use sc16_driver_api::{BusError, FIFO_SIZE, RegisterBus, RxFlag, UartPort};

use super::channel::{Channel, RX_SCRATCH_LEN};
use super::regs::{reg, ChannelRegs, IirReason, Lsr};

/// Maximum number of FIFO reads per drain.
const MAX_PASSES: usize = 2;

impl<P: UartPort> Channel<P> {
    /// Empties the RX FIFO into the port. Returns the FIFO level read back
    /// after the last transfer.
    ///
    /// Bytes already read when a later transfer fails are delivered before
    /// the error is returned.
    pub(crate) fn drain_rx<B: RegisterBus>(&self, regs: &ChannelRegs<'_, B>) -> Result<usize, BusError> {
        let iir = self.state.lock().cache.iir;
        let reason = IirReason::from_iir(iir);
        if reason.is_receive() {
            ktrace!("sc16is7x2 {}: rx on {:?}", self.index, reason);
        }

        let mut level = self.read_rx_level(regs)?;
        if level == 0 {
            return Ok(0);
        }

        let mut guard = self.scratch.lock();
        let scratch = &mut guard.rx;
        let mut total = 0;
        let mut failure = None;
        for _ in 0..MAX_PASSES {
            let want = level.min(RX_SCRATCH_LEN - total);
            if want == 0 {
                break;
            }
            match regs.read_fifo(&mut scratch[total..total + want]) {
                Ok(n) => total += n,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
            match self.read_rx_level(regs) {
                Ok(0) => {
                    level = 0;
                    break;
                }
                Ok(n) => level = n,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        if total == 0 {
            return failure.map_or(Ok(level), Err);
        }

        let delivered = {
            let mut st = self.state.lock();
            let mut status = st.cache.lsr | Lsr::DR;
            let mut discard = false;

            if status.intersects(Lsr::BRK_ERROR_BITS) {
                if status.contains(Lsr::BI) {
                    status.remove(Lsr::PE | Lsr::FE);
                    st.icount.brk += 1;
                    discard = self.port.handle_break();
                } else if status.contains(Lsr::PE) {
                    st.icount.parity += 1;
                } else if status.contains(Lsr::FE) {
                    st.icount.frame += 1;
                }
                if status.contains(Lsr::OE) {
                    st.icount.overrun += 1;
                }
            }

            st.icount.rx = st.icount.rx.wrapping_add(u32::try_from(total).unwrap_or(u32::MAX));

            let ignored = status & st.ignore_status_mask & !Lsr::OE;
            if discard || !ignored.is_empty() {
                st.stats.rx_dropped += 1;
                false
            } else {
                let reported = status & st.read_status_mask;
                let flag = if reported.contains(Lsr::BI) {
                    RxFlag::Break
                } else if reported.contains(Lsr::PE) {
                    RxFlag::Parity
                } else if reported.contains(Lsr::FE) {
                    RxFlag::Frame
                } else {
                    RxFlag::Normal
                };
                self.port.receive_chars(&scratch[..total], flag);
                if reported.contains(Lsr::OE) && !st.ignore_status_mask.contains(Lsr::OE) {
                    self.port.receive_overrun();
                }
                true
            }
        };
        drop(guard);

        if delivered {
            self.port.push();
        }
        if let Some(err) = failure {
            kwarn!("sc16is7x2 {}: rx stopped after {} bytes: {}", self.index, total, err);
            return Err(err);
        }
        ktrace!("sc16is7x2 {}: rx {} bytes, {} left", self.index, total, level);
        Ok(level)
    }

    fn read_rx_level<B: RegisterBus>(&self, regs: &ChannelRegs<'_, B>) -> Result<usize, BusError> {
        let raw = usize::from(regs.read(reg::RXLVL)?);
        if raw > FIFO_SIZE {
            self.state.lock().stats.fifo_clamps += 1;
            kwarn!("sc16is7x2 {}: RXLVL {} exceeds FIFO depth", self.index, raw);
            return Ok(FIFO_SIZE);
        }
        Ok(raw)
    }
}
