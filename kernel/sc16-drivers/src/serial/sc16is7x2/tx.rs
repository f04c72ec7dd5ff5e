//! Transmit drain.

use sc16_core::{ktrace, kwarn};
use sc16_driver_api::{BusError, ChipConfig, FIFO_SIZE, RegisterBus, UartPort};

use super::channel::Channel;
use super::regs::{reg, ChannelRegs, Lsr};

impl<P: UartPort> Channel<P> {
    /// Moves as many pending bytes as the TX FIFO has room for, in a single
    /// block write. Returns the number of bytes written.
    ///
    /// A block whose write fails stays in the scratch buffer and is sent
    /// again, ahead of newer data, on the next drain. `icount.tx` counts
    /// only bytes the bus accepted.
    pub(crate) fn drain_tx<B: RegisterBus>(
        &self,
        regs: &ChannelRegs<'_, B>,
        cfg: &ChipConfig,
    ) -> Result<usize, BusError> {
        if let Some(ch) = self.port.x_char() {
            let thre = self.state.lock().cache.lsr.contains(Lsr::THRE);
            if thre {
                regs.write(reg::THR, ch)?;
                self.port.clear_x_char();
                self.state.lock().icount.tx += 1;
                return Ok(1);
            }
        }

        let mut guard = self.scratch.lock();
        let scratch = &mut *guard;
        if self.port.tx_stopped() || (scratch.tx_held == 0 && self.port.tx_pending() == 0) {
            return Ok(0);
        }

        let level = regs.read_level(reg::TXLVL, FIFO_SIZE)?;
        let room = level
            .min(cfg.tx_fifo_ceiling)
            .min(regs.max_block_len())
            .min(FIFO_SIZE);
        if room == 0 {
            return Ok(0);
        }

        let len = if scratch.tx_held > 0 {
            // A previous write failed; resend that block before anything newer.
            if scratch.tx_held > room {
                return Ok(0);
            }
            scratch.tx_held
        } else {
            let len = self.port.pop_tx(&mut scratch.tx[..room]);
            if len == 0 {
                return Ok(0);
            }
            scratch.tx_held = len;
            len
        };
        if let Err(err) = regs.write_fifo(&scratch.tx[..len]) {
            kwarn!("sc16is7x2 {}: tx block of {} held: {}", self.index, len, err);
            return Err(err);
        }
        scratch.tx_held = 0;
        drop(guard);

        {
            let mut st = self.state.lock();
            st.icount.tx = st.icount.tx.wrapping_add(u32::try_from(len).unwrap_or(u32::MAX));
        }
        ktrace!("sc16is7x2 {}: tx {} of {} free", self.index, len, level);

        if self.port.tx_pending() < cfg.wakeup_chars {
            self.port.write_wakeup();
        }
        Ok(len)
    }
}
