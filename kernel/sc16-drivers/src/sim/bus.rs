//! Behavioral model of the chip behind a [`RegisterBus`].
//!
//! The model keeps per-channel register files and FIFOs, follows the LCR
//! bank switching for the divisor latch and EFR, and transmits instantly:
//! every byte written to THR lands in the channel's `transmitted` buffer
//! (and, with crosslink on, in the other channel's RX FIFO).
//!
//! Tests steer it through scripts and overrides:
//!
//! - IIR, TXLVL and RXLVL can be scripted (one value per read) or pinned;
//! - line status bits can be injected for the next LSR read;
//! - bus faults can be injected for the next N transactions or pinned to a
//!   register.
//!
//! Every transaction is appended to a log.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use sc16_core::sync::SpinLock;
use sc16_driver_api::{BusError, ChannelIndex, FIFO_SIZE, RegisterBus, SMBUS_BLOCK_MAX, SubAddress};

use crate::serial::sc16is7x2::regs::{reg, Ier, IoControl, Lcr, Lsr, LCR_EFR_BANK};

/// One logged bus transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    /// Single-byte read.
    Read {
        /// Target.
        addr: SubAddress,
        /// Value returned.
        value: u8,
    },
    /// Single-byte write.
    Write {
        /// Target.
        addr: SubAddress,
        /// Value written.
        value: u8,
    },
    /// Block read.
    BlockRead {
        /// Target.
        addr: SubAddress,
        /// Bytes requested.
        requested: usize,
        /// Bytes delivered.
        delivered: usize,
    },
    /// Block write.
    BlockWrite {
        /// Target.
        addr: SubAddress,
        /// Bytes written.
        data: Vec<u8>,
    },
    /// Transaction that failed by injection.
    Failed {
        /// Target.
        addr: SubAddress,
        /// Injected error.
        error: BusError,
    },
}

impl Transaction {
    /// Target sub-address.
    pub fn addr(&self) -> SubAddress {
        match self {
            Self::Read { addr, .. }
            | Self::Write { addr, .. }
            | Self::BlockRead { addr, .. }
            | Self::BlockWrite { addr, .. }
            | Self::Failed { addr, .. } => *addr,
        }
    }
}

#[derive(Default)]
struct SimChannel {
    ier: u8,
    lcr: u8,
    fcr: u8,
    mcr: u8,
    spr: u8,
    efcr: u8,
    efr: u8,
    dll: u8,
    dlm: u8,
    msr: u8,
    rx_fifo: VecDeque<u8>,
    transmitted: Vec<u8>,
    thre_pending: bool,
    lsr_inject: u8,
    iir_script: VecDeque<u8>,
    iir_pinned: Option<u8>,
    txlvl_script: VecDeque<u8>,
    txlvl_pinned: Option<u8>,
    rxlvl_script: VecDeque<u8>,
}

impl SimChannel {
    fn reset() -> Self {
        Self {
            lcr: 0x1D,
            dll: 1,
            ..Self::default()
        }
    }

    fn iir(&mut self) -> u8 {
        if let Some(v) = self.iir_script.pop_front() {
            return v;
        }
        if let Some(v) = self.iir_pinned {
            return v;
        }
        let ier = Ier::from_bits_retain(self.ier);
        if self.lsr_inject != 0 && ier.contains(Ier::RLSI) {
            0x06
        } else if !self.rx_fifo.is_empty() && ier.contains(Ier::RDI) {
            0x04
        } else if self.thre_pending && ier.contains(Ier::THRI) {
            self.thre_pending = false;
            0x02
        } else {
            0x01
        }
    }

    /// Whether the channel would drive the interrupt line, without
    /// consuming scripts or clearing the THR-empty condition.
    fn interrupt_asserted(&self) -> bool {
        if let Some(&v) = self.iir_script.front() {
            return v & 0x01 == 0;
        }
        if let Some(v) = self.iir_pinned {
            return v & 0x01 == 0;
        }
        let ier = Ier::from_bits_retain(self.ier);
        (self.lsr_inject != 0 && ier.contains(Ier::RLSI))
            || (!self.rx_fifo.is_empty() && ier.contains(Ier::RDI))
            || (self.thre_pending && ier.contains(Ier::THRI))
    }

    fn lsr(&mut self) -> u8 {
        let mut lsr = Lsr::THRE | Lsr::TEMT;
        if !self.rx_fifo.is_empty() {
            lsr |= Lsr::DR;
        }
        let injected = Lsr::from_bits_retain(core::mem::take(&mut self.lsr_inject));
        (lsr | injected).bits()
    }

    fn txlvl(&mut self) -> u8 {
        self.txlvl_script
            .pop_front()
            .or(self.txlvl_pinned)
            .unwrap_or(FIFO_SIZE as u8)
    }

    fn rxlvl(&mut self) -> u8 {
        self.rxlvl_script
            .pop_front()
            .unwrap_or_else(|| u8::try_from(self.rx_fifo.len()).unwrap_or(u8::MAX))
    }

    fn in_efr_bank(&self) -> bool {
        self.lcr == LCR_EFR_BANK
    }

    fn in_divisor_bank(&self) -> bool {
        !self.in_efr_bank() && self.lcr & Lcr::DLAB.bits() != 0
    }
}

struct Fault {
    remaining: u32,
    error: BusError,
}

/// Fails one access to a register after letting `skip` through.
struct CountedFault {
    channel: ChannelIndex,
    register: u8,
    skip: u32,
    error: BusError,
}

struct SimState {
    channels: [SimChannel; 2],
    io_dir: u8,
    io_state: u8,
    io_inputs: u8,
    io_int_ena: u8,
    io_control: u8,
    resets: u32,
    crosslink: bool,
    max_block_len: usize,
    log: Vec<Transaction>,
    logging: bool,
    fault: Option<Fault>,
    pinned_faults: Vec<(ChannelIndex, u8, BusError)>,
    counted_faults: Vec<CountedFault>,
}

impl SimState {
    fn new() -> Self {
        Self {
            channels: [SimChannel::reset(), SimChannel::reset()],
            io_dir: 0,
            io_state: 0,
            io_inputs: 0,
            io_int_ena: 0,
            io_control: 0,
            resets: 0,
            crosslink: false,
            max_block_len: SMBUS_BLOCK_MAX,
            log: Vec::new(),
            logging: true,
            fault: None,
            pinned_faults: Vec::new(),
            counted_faults: Vec::new(),
        }
    }

    fn record(&mut self, t: Transaction) {
        if self.logging {
            self.log.push(t);
        }
    }

    fn check_fault(&mut self, addr: SubAddress) -> Result<(), BusError> {
        let pinned = self
            .pinned_faults
            .iter()
            .find(|(ch, r, _)| *ch == addr.channel() && *r == addr.register())
            .map(|&(_, _, e)| e);
        let error = match pinned.or_else(|| self.take_counted_fault(addr)) {
            Some(e) => Some(e),
            None => match &mut self.fault {
                Some(f) if f.remaining > 0 => {
                    f.remaining -= 1;
                    Some(f.error)
                }
                _ => None,
            },
        };
        match error {
            Some(error) => {
                self.record(Transaction::Failed { addr, error });
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn take_counted_fault(&mut self, addr: SubAddress) -> Option<BusError> {
        let pos = self
            .counted_faults
            .iter_mut()
            .position(|f| {
                if f.channel != addr.channel() || f.register != addr.register() {
                    return false;
                }
                if f.skip == 0 {
                    return true;
                }
                f.skip -= 1;
                false
            })?;
        Some(self.counted_faults.remove(pos).error)
    }

    fn read(&mut self, addr: SubAddress) -> u8 {
        let r = addr.register();
        if (reg::IODIR..=reg::IOCONTROL).contains(&r) {
            return match r {
                reg::IODIR => self.io_dir,
                reg::IOSTATE => (self.io_state & self.io_dir) | (self.io_inputs & !self.io_dir),
                reg::IOINTENA => self.io_int_ena,
                reg::IOCONTROL => self.io_control,
                _ => 0,
            };
        }
        let ch = &mut self.channels[addr.channel().index()];
        if ch.in_efr_bank() && r == reg::EFR {
            return ch.efr;
        }
        if ch.in_divisor_bank() && r <= reg::DLM {
            return if r == reg::DLL { ch.dll } else { ch.dlm };
        }
        match r {
            reg::RHR => ch.rx_fifo.pop_front().unwrap_or(0),
            reg::IER => ch.ier,
            reg::IIR => ch.iir(),
            reg::LCR => ch.lcr,
            reg::MCR => ch.mcr,
            reg::LSR => ch.lsr(),
            reg::MSR => ch.msr,
            reg::SPR => ch.spr,
            reg::TXLVL => ch.txlvl(),
            reg::RXLVL => ch.rxlvl(),
            reg::EFCR => ch.efcr,
            _ => 0,
        }
    }

    fn write(&mut self, addr: SubAddress, value: u8) {
        let r = addr.register();
        let index = addr.channel().index();
        match r {
            reg::IODIR => self.io_dir = value,
            reg::IOSTATE => self.io_state = value,
            reg::IOINTENA => self.io_int_ena = value,
            reg::IOCONTROL => {
                if value & IoControl::SRESET.bits() != 0 {
                    self.soft_reset();
                }
                self.io_control = value & !IoControl::SRESET.bits();
            }
            _ => self.write_channel(index, r, value),
        }
    }

    fn write_channel(&mut self, index: usize, r: u8, value: u8) {
        let banked = {
            let ch = &self.channels[index];
            (ch.in_efr_bank() && r == reg::EFR) || (ch.in_divisor_bank() && r <= reg::DLM)
        };
        if r == reg::THR && !banked {
            self.transmit(index, &[value]);
            return;
        }
        let ch = &mut self.channels[index];
        if ch.in_efr_bank() && r == reg::EFR {
            ch.efr = value;
            return;
        }
        if ch.in_divisor_bank() && r <= reg::DLM {
            if r == reg::DLL {
                ch.dll = value;
            } else {
                ch.dlm = value;
            }
            return;
        }
        match r {
            reg::IER => ch.ier = value,
            reg::FCR => {
                ch.fcr = value;
                if value & 0x02 != 0 {
                    ch.rx_fifo.clear();
                }
            }
            reg::LCR => ch.lcr = value,
            reg::MCR => ch.mcr = value,
            reg::SPR => ch.spr = value,
            reg::EFCR => ch.efcr = value,
            _ => {}
        }
    }

    fn transmit(&mut self, index: usize, data: &[u8]) {
        self.channels[index].transmitted.extend_from_slice(data);
        self.channels[index].thre_pending = true;
        if self.crosslink {
            let peer = &mut self.channels[index ^ 1];
            for &b in data {
                if peer.rx_fifo.len() < FIFO_SIZE {
                    peer.rx_fifo.push_back(b);
                }
            }
        }
    }

    fn soft_reset(&mut self) {
        for ch in &mut self.channels {
            *ch = SimChannel::reset();
        }
        self.io_dir = 0;
        self.io_state = 0;
        self.io_int_ena = 0;
        self.resets += 1;
    }
}

/// Simulated chip. Clones share the same device.
#[derive(Clone)]
pub struct SimBus {
    state: Arc<SpinLock<SimState>>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// A freshly reset chip with an SMBus-sized block limit.
    pub fn new() -> Self {
        Self {
            state: Arc::new(SpinLock::named("sim.bus", SimState::new())),
        }
    }

    /// Sets the largest block transfer the transport accepts.
    pub fn set_max_block_len(&self, len: usize) {
        self.state.lock().max_block_len = len.max(1);
    }

    /// Routes each channel's transmitted bytes into the other's RX FIFO.
    pub fn set_crosslink(&self, on: bool) {
        self.state.lock().crosslink = on;
    }

    /// Turns the transaction log on or off.
    pub fn set_logging(&self, on: bool) {
        self.state.lock().logging = on;
    }

    // -- Line side ---------------------------------------------------------

    /// Bytes arriving on a channel's RX pin. Bytes beyond the FIFO depth
    /// are lost, as on the real part.
    pub fn inject_rx(&self, ch: ChannelIndex, data: &[u8]) {
        let mut st = self.state.lock();
        let fifo = &mut st.channels[ch.index()].rx_fifo;
        for &b in data {
            if fifo.len() < FIFO_SIZE {
                fifo.push_back(b);
            }
        }
    }

    /// Line status bits reported by the next LSR read (and raising a
    /// line-status interrupt until then).
    pub fn inject_line_status(&self, ch: ChannelIndex, bits: Lsr) {
        self.state.lock().channels[ch.index()].lsr_inject |= bits.bits();
    }

    /// Sets the modem status register.
    pub fn set_msr(&self, ch: ChannelIndex, msr: u8) {
        self.state.lock().channels[ch.index()].msr = msr;
    }

    /// Sets the levels seen on input GPIO pins.
    pub fn set_gpio_inputs(&self, levels: u8) {
        self.state.lock().io_inputs = levels;
    }

    /// Takes everything the channel has transmitted so far.
    pub fn take_transmitted(&self, ch: ChannelIndex) -> Vec<u8> {
        core::mem::take(&mut self.state.lock().channels[ch.index()].transmitted)
    }

    /// Bytes still in a channel's RX FIFO.
    pub fn rx_fifo_len(&self, ch: ChannelIndex) -> usize {
        self.state.lock().channels[ch.index()].rx_fifo.len()
    }

    // -- Scripts -----------------------------------------------------------

    /// Queues IIR values returned by the next reads, ahead of any pin.
    pub fn script_iir(&self, ch: ChannelIndex, values: &[u8]) {
        self.state.lock().channels[ch.index()].iir_script.extend(values);
    }

    /// Pins IIR to one value once the script runs out. `None` restores the
    /// modelled behavior.
    pub fn pin_iir(&self, ch: ChannelIndex, value: Option<u8>) {
        self.state.lock().channels[ch.index()].iir_pinned = value;
    }

    /// Queues TXLVL values returned by the next reads.
    pub fn script_txlvl(&self, ch: ChannelIndex, values: &[u8]) {
        self.state.lock().channels[ch.index()].txlvl_script.extend(values);
    }

    /// Pins TXLVL once the script runs out. `None` reports an empty FIFO.
    pub fn pin_txlvl(&self, ch: ChannelIndex, value: Option<u8>) {
        self.state.lock().channels[ch.index()].txlvl_pinned = value;
    }

    /// Queues RXLVL values returned by the next reads, ahead of the real
    /// FIFO level.
    pub fn script_rxlvl(&self, ch: ChannelIndex, values: &[u8]) {
        self.state.lock().channels[ch.index()].rxlvl_script.extend(values);
    }

    // -- Faults ------------------------------------------------------------

    /// Fails the next `count` transactions with `error`.
    pub fn fail_next(&self, count: u32, error: BusError) {
        self.state.lock().fault = Some(Fault {
            remaining: count,
            error,
        });
    }

    /// Fails every access to one register until cleared.
    pub fn fail_register(&self, ch: ChannelIndex, register: u8, error: BusError) {
        self.state.lock().pinned_faults.push((ch, register, error));
    }

    /// Fails the `nth` upcoming access (1-based) to one register, once.
    /// Accesses to other registers pass.
    pub fn fail_nth(&self, ch: ChannelIndex, register: u8, nth: u32, error: BusError) {
        self.state.lock().counted_faults.push(CountedFault {
            channel: ch,
            register,
            skip: nth.saturating_sub(1),
            error,
        });
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        let mut st = self.state.lock();
        st.fault = None;
        st.pinned_faults.clear();
        st.counted_faults.clear();
    }

    // -- Inspection --------------------------------------------------------

    /// Copy of the transaction log.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().log.clone()
    }

    /// Empties the transaction log.
    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// Values written to `register` on `ch`, oldest first. Bank-switched
    /// registers are reported under their raw register number.
    pub fn writes_to(&self, ch: ChannelIndex, register: u8) -> Vec<u8> {
        let target = SubAddress::new(register, ch);
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|t| match t {
                Transaction::Write { addr, value } if *addr == target => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Lengths of the block writes to THR on `ch`.
    pub fn tx_blocks(&self, ch: ChannelIndex) -> Vec<usize> {
        let target = SubAddress::new(reg::THR, ch);
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|t| match t {
                Transaction::BlockWrite { addr, data } if *addr == target => Some(data.len()),
                _ => None,
            })
            .collect()
    }

    /// Delivered lengths of the block reads from RHR on `ch`.
    pub fn rx_blocks(&self, ch: ChannelIndex) -> Vec<usize> {
        let target = SubAddress::new(reg::RHR, ch);
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|t| match t {
                Transaction::BlockRead { addr, delivered, .. } if *addr == target => Some(*delivered),
                _ => None,
            })
            .collect()
    }

    /// Current divisor latch of a channel.
    pub fn divisor(&self, ch: ChannelIndex) -> u16 {
        let st = self.state.lock();
        let c = &st.channels[ch.index()];
        u16::from_le_bytes([c.dll, c.dlm])
    }

    /// Current register values of a channel as `(ier, lcr, fcr, mcr, efr, efcr)`.
    pub fn channel_regs(&self, ch: ChannelIndex) -> (u8, u8, u8, u8, u8, u8) {
        let st = self.state.lock();
        let c = &st.channels[ch.index()];
        (c.ier, c.lcr, c.fcr, c.mcr, c.efr, c.efcr)
    }

    /// GPIO registers as `(iodir, iostate, iointena, iocontrol)`.
    pub fn gpio_regs(&self) -> (u8, u8, u8, u8) {
        let st = self.state.lock();
        (st.io_dir, st.io_state, st.io_int_ena, st.io_control)
    }

    /// Level of the shared interrupt line.
    pub fn irq_asserted(&self) -> bool {
        self.state.lock().channels.iter().any(SimChannel::interrupt_asserted)
    }

    /// Number of software resets seen.
    pub fn resets(&self) -> u32 {
        self.state.lock().resets
    }
}

impl RegisterBus for SimBus {
    fn max_block_len(&self) -> usize {
        self.state.lock().max_block_len
    }

    fn read_byte(&self, addr: SubAddress) -> Result<u8, BusError> {
        let mut st = self.state.lock();
        st.check_fault(addr)?;
        let value = st.read(addr);
        st.record(Transaction::Read { addr, value });
        Ok(value)
    }

    fn write_byte(&self, addr: SubAddress, value: u8) -> Result<(), BusError> {
        let mut st = self.state.lock();
        st.check_fault(addr)?;
        st.write(addr, value);
        st.record(Transaction::Write { addr, value });
        Ok(())
    }

    fn read_block(&self, addr: SubAddress, buf: &mut [u8]) -> Result<usize, BusError> {
        let mut st = self.state.lock();
        st.check_fault(addr)?;
        let want = buf.len().min(st.max_block_len);
        let fifo = &mut st.channels[addr.channel().index()].rx_fifo;
        let mut delivered = 0;
        for slot in &mut buf[..want] {
            match fifo.pop_front() {
                Some(b) => {
                    *slot = b;
                    delivered += 1;
                }
                None => break,
            }
        }
        st.record(Transaction::BlockRead {
            addr,
            requested: buf.len(),
            delivered,
        });
        Ok(delivered)
    }

    fn write_block(&self, addr: SubAddress, data: &[u8]) -> Result<(), BusError> {
        let mut st = self.state.lock();
        st.check_fault(addr)?;
        if data.len() > st.max_block_len {
            st.record(Transaction::Failed {
                addr,
                error: BusError::ShortTransfer,
            });
            return Err(BusError::ShortTransfer);
        }
        st.transmit(addr.channel().index(), data);
        st.record(Transaction::BlockWrite {
            addr,
            data: data.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisor_latch_is_bank_switched() {
        let bus = SimBus::new();
        let a = ChannelIndex::A;
        bus.write_byte(SubAddress::new(reg::LCR, a), Lcr::DLAB.bits()).unwrap();
        bus.write_byte(SubAddress::new(reg::DLL, a), 0x60).unwrap();
        bus.write_byte(SubAddress::new(reg::DLM, a), 0x00).unwrap();
        bus.write_byte(SubAddress::new(reg::LCR, a), 0x03).unwrap();
        bus.write_byte(SubAddress::new(reg::IER, a), 0x05).unwrap();
        assert_eq!(bus.divisor(a), 96);
        assert_eq!(bus.channel_regs(a).0, 0x05);
    }

    #[test]
    fn efr_needs_bf_bank() {
        let bus = SimBus::new();
        let b = ChannelIndex::B;
        bus.write_byte(SubAddress::new(reg::LCR, b), LCR_EFR_BANK).unwrap();
        bus.write_byte(SubAddress::new(reg::EFR, b), 0xD0).unwrap();
        bus.write_byte(SubAddress::new(reg::LCR, b), 0x03).unwrap();
        bus.write_byte(SubAddress::new(reg::FCR, b), 0x61).unwrap();
        let (_, lcr, fcr, _, efr, _) = bus.channel_regs(b);
        assert_eq!((lcr, fcr, efr), (0x03, 0x61, 0xD0));
    }

    #[test]
    fn block_read_under_delivers() {
        let bus = SimBus::new();
        bus.inject_rx(ChannelIndex::A, b"abc");
        let mut buf = [0u8; 8];
        let n = bus.read_block(SubAddress::new(reg::RHR, ChannelIndex::A), &mut buf).unwrap();
        assert_eq!(&buf[..n], b"abc");
    }

    #[test]
    fn injected_faults_are_consumed() {
        let bus = SimBus::new();
        let addr = SubAddress::new(reg::LSR, ChannelIndex::A);
        bus.fail_next(2, BusError::Nack);
        assert_eq!(bus.read_byte(addr), Err(BusError::Nack));
        assert_eq!(bus.read_byte(addr), Err(BusError::Nack));
        assert!(bus.read_byte(addr).is_ok());
    }

    #[test]
    fn counted_fault_hits_only_the_nth_access() {
        let bus = SimBus::new();
        let rxlvl = SubAddress::new(reg::RXLVL, ChannelIndex::A);
        let lsr = SubAddress::new(reg::LSR, ChannelIndex::A);
        bus.fail_nth(ChannelIndex::A, reg::RXLVL, 2, BusError::Timeout);
        assert!(bus.read_byte(rxlvl).is_ok());
        assert!(bus.read_byte(lsr).is_ok());
        assert_eq!(bus.read_byte(rxlvl), Err(BusError::Timeout));
        assert!(bus.read_byte(rxlvl).is_ok());
    }

    #[test]
    fn crosslink_moves_bytes() {
        let bus = SimBus::new();
        bus.set_crosslink(true);
        bus.write_block(SubAddress::new(reg::THR, ChannelIndex::A), b"hi").unwrap();
        assert_eq!(bus.take_transmitted(ChannelIndex::A), b"hi");
        assert_eq!(bus.rx_fifo_len(ChannelIndex::B), 2);
    }

    #[test]
    fn thr_empty_interrupt_clears_on_iir_read() {
        let bus = SimBus::new();
        let a = ChannelIndex::A;
        bus.write_byte(SubAddress::new(reg::IER, a), Ier::THRI.bits()).unwrap();
        bus.write_block(SubAddress::new(reg::THR, a), b"x").unwrap();
        assert_eq!(bus.read_byte(SubAddress::new(reg::IIR, a)).unwrap(), 0x02);
        assert_eq!(bus.read_byte(SubAddress::new(reg::IIR, a)).unwrap(), 0x01);
    }

    #[test]
    fn soft_reset_restores_defaults() {
        let bus = SimBus::new();
        let a = ChannelIndex::A;
        bus.write_byte(SubAddress::new(reg::IER, a), 0x0F).unwrap();
        bus.write_byte(SubAddress::new(reg::IOCONTROL, a), IoControl::SRESET.bits()).unwrap();
        assert_eq!(bus.channel_regs(a).0, 0);
        assert_eq!(bus.resets(), 1);
        assert_eq!(bus.gpio_regs().3, 0);
    }
}
