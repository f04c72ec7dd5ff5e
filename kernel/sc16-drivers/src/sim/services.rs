//! Manual work queue and bookkeeping implementation of [`DriverServices`].

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use sc16_core::sync::SpinLock;
use sc16_driver_api::{ChannelIndex, DriverError, DriverServices, IrqLine, CHANNEL_COUNT};

/// Environment call recorded by [`SimServices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEvent {
    /// `request_irq` succeeded.
    IrqRequested(ChannelIndex),
    /// `free_irq`.
    IrqFreed(ChannelIndex),
    /// `create_work` succeeded.
    WorkCreated(ChannelIndex),
    /// `queue_work`.
    WorkQueued(ChannelIndex),
    /// `flush_work`.
    WorkFlushed(ChannelIndex),
    /// `destroy_work`.
    WorkDestroyed(ChannelIndex),
}

#[derive(Default)]
struct ServicesState {
    queue: VecDeque<ChannelIndex>,
    irq_held: [bool; CHANNEL_COUNT],
    work_live: [bool; CHANNEL_COUNT],
    queued: [u64; CHANNEL_COUNT],
    fail_request_irq: Option<DriverError>,
    fail_create_work: Option<DriverError>,
    events: Vec<ServiceEvent>,
}

/// Host-side stand-in for the kernel's IRQ and workqueue services.
///
/// Queued work is not run automatically; the test or tool pops entries
/// with [`next_queued`](Self::next_queued) (or [`pump`](super::pump)) and
/// runs them on whatever thread it likes. Clones share state.
#[derive(Clone, Default)]
pub struct SimServices {
    state: Arc<SpinLock<ServicesState>>,
    clock: Arc<AtomicU64>,
}

impl SimServices {
    /// Empty queue, no resources held, clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pops the oldest queued channel.
    pub fn next_queued(&self) -> Option<ChannelIndex> {
        self.state.lock().queue.pop_front()
    }

    /// Number of entries waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Times `queue_work` was called for a channel.
    pub fn queued_count(&self, ch: ChannelIndex) -> u64 {
        self.state.lock().queued[ch.index()]
    }

    /// Whether the channel currently holds the interrupt.
    pub fn irq_held(&self, ch: ChannelIndex) -> bool {
        self.state.lock().irq_held[ch.index()]
    }

    /// Whether the channel's work item exists.
    pub fn work_live(&self, ch: ChannelIndex) -> bool {
        self.state.lock().work_live[ch.index()]
    }

    /// Makes the next `request_irq` fail with `err`.
    pub fn fail_next_irq_request(&self, err: DriverError) {
        self.state.lock().fail_request_irq = Some(err);
    }

    /// Makes the next `create_work` fail with `err`.
    pub fn fail_next_work_creation(&self, err: DriverError) {
        self.state.lock().fail_create_work = Some(err);
    }

    /// Copy of the recorded service calls.
    pub fn events(&self) -> Vec<ServiceEvent> {
        self.state.lock().events.clone()
    }

    /// Moves the clock forward.
    pub fn advance(&self, nanos: u64) {
        self.clock.fetch_add(nanos, Ordering::Relaxed);
    }
}

impl DriverServices for SimServices {
    fn request_irq(&self, _irq: IrqLine, channel: ChannelIndex) -> Result<(), DriverError> {
        let mut st = self.state.lock();
        if let Some(err) = st.fail_request_irq.take() {
            return Err(err);
        }
        if st.irq_held[channel.index()] {
            return Err(DriverError::Busy);
        }
        st.irq_held[channel.index()] = true;
        st.events.push(ServiceEvent::IrqRequested(channel));
        Ok(())
    }

    fn free_irq(&self, _irq: IrqLine, channel: ChannelIndex) {
        let mut st = self.state.lock();
        st.irq_held[channel.index()] = false;
        st.events.push(ServiceEvent::IrqFreed(channel));
    }

    fn create_work(&self, channel: ChannelIndex) -> Result<(), DriverError> {
        let mut st = self.state.lock();
        if let Some(err) = st.fail_create_work.take() {
            return Err(err);
        }
        st.work_live[channel.index()] = true;
        st.events.push(ServiceEvent::WorkCreated(channel));
        Ok(())
    }

    fn queue_work(&self, channel: ChannelIndex) {
        let mut st = self.state.lock();
        st.queued[channel.index()] += 1;
        st.queue.push_back(channel);
        st.events.push(ServiceEvent::WorkQueued(channel));
    }

    fn flush_work(&self, channel: ChannelIndex) {
        self.state.lock().events.push(ServiceEvent::WorkFlushed(channel));
    }

    fn destroy_work(&self, channel: ChannelIndex) {
        let mut st = self.state.lock();
        st.queue.retain(|&c| c != channel);
        st.work_live[channel.index()] = false;
        st.events.push(ServiceEvent::WorkDestroyed(channel));
    }

    fn now_nanos(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_fifo() {
        let s = SimServices::new();
        s.queue_work(ChannelIndex::B);
        s.queue_work(ChannelIndex::A);
        assert_eq!(s.next_queued(), Some(ChannelIndex::B));
        assert_eq!(s.next_queued(), Some(ChannelIndex::A));
        assert_eq!(s.next_queued(), None);
    }

    #[test]
    fn injected_irq_failure_is_one_shot() {
        let s = SimServices::new();
        s.fail_next_irq_request(DriverError::Busy);
        assert_eq!(s.request_irq(IrqLine::new(5), ChannelIndex::A), Err(DriverError::Busy));
        assert_eq!(s.request_irq(IrqLine::new(5), ChannelIndex::A), Ok(()));
        assert!(s.irq_held(ChannelIndex::A));
    }

    #[test]
    fn destroy_drops_pending_entries() {
        let s = SimServices::new();
        s.create_work(ChannelIndex::A).unwrap();
        s.queue_work(ChannelIndex::A);
        s.queue_work(ChannelIndex::B);
        s.destroy_work(ChannelIndex::A);
        assert_eq!(s.queue_len(), 1);
        assert!(!s.work_live(ChannelIndex::A));
    }

    #[test]
    fn clock_advances() {
        let s = SimServices::new();
        s.advance(1_500);
        assert_eq!(s.now_nanos(), 1_500);
    }
}
