//! Shadow copies of channel registers and their dirty tracking.
//!
//! Most configuration registers are write-only or live in a bank that
//! needs an LCR switch to reach, so the driver keeps the authoritative copy
//! in memory and pushes it out from the deferred worker. The status
//! registers are mirrored the other way: the worker reads them once per
//! loop iteration and everything else consults the snapshot.

use super::regs::{Efcr, Efr, Fcr, Ier, Lcr, Lsr, Mcr, Msr, IIR_NO_INT};

/// In-memory register image of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterCache {
    /// Line control (never has DLAB set).
    pub lcr: Lcr,
    /// FIFO control.
    pub fcr: Fcr,
    /// Interrupt enable.
    pub ier: Ier,
    /// Modem control.
    pub mcr: Mcr,
    /// Enhanced features.
    pub efr: Efr,
    /// Extra features control.
    pub efcr: Efcr,
    /// Baud divisor.
    pub divisor: u16,
    /// Last IIR read.
    pub iir: u8,
    /// Last LSR read.
    pub lsr: Lsr,
    /// Last MSR read.
    pub msr: Msr,
}

impl RegisterCache {
    /// Register values after a hardware reset.
    pub const RESET: Self = Self {
        lcr: Lcr::from_bits_retain(0x1D),
        fcr: Fcr::empty(),
        ier: Ier::empty(),
        mcr: Mcr::empty(),
        efr: Efr::empty(),
        efcr: Efcr::empty(),
        divisor: 1,
        iir: IIR_NO_INT,
        lsr: Lsr::THRE.union(Lsr::TEMT),
        msr: Msr::empty(),
    };

    /// Returns `true` when the last IIR read showed no pending interrupt.
    #[must_use]
    pub const fn no_interrupt_pending(&self) -> bool {
        self.iir & IIR_NO_INT != 0
    }
}

impl Default for RegisterCache {
    fn default() -> Self {
        Self::RESET
    }
}

/// Change ticket for a group of cached registers.
///
/// Setting the flag bumps a request sequence; the worker snapshots the
/// sequence together with the values it is about to write and, once the
/// write succeeded, acknowledges exactly that sequence. A request that
/// lands while the write is in flight bumps the sequence again and so keeps
/// the flag set for the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyFlag {
    requested: u32,
    applied: u32,
}

impl DirtyFlag {
    /// Requests a hardware sync.
    pub fn mark(&mut self) {
        self.requested = self.requested.wrapping_add(1);
    }

    /// Returns `true` if a sync is outstanding.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.requested != self.applied
    }

    /// Returns the sequence to acknowledge after syncing, if dirty.
    #[must_use]
    pub const fn ticket(&self) -> Option<u32> {
        if self.is_dirty() { Some(self.requested) } else { None }
    }

    /// Acknowledges a completed sync of `ticket`.
    pub fn acknowledge(&mut self, ticket: u32) {
        self.applied = ticket;
    }
}

/// Divisor-latch write set, captured under the channel lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudSync {
    /// Ticket to acknowledge.
    pub ticket: u32,
    /// Divisor to program.
    pub divisor: u16,
    /// LCR to restore after the latch write.
    pub lcr: Lcr,
}

/// Configuration write set, captured under the channel lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSync {
    /// Ticket to acknowledge.
    pub ticket: u32,
    /// Enhanced features.
    pub efr: Efr,
    /// Line control.
    pub lcr: Lcr,
    /// FIFO control.
    pub fcr: Fcr,
    /// Modem control.
    pub mcr: Mcr,
    /// Interrupt enable.
    pub ier: Ier,
}
