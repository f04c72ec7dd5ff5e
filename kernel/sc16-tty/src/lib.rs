//! Buffered serial port endpoint.
//!
//! [`TtyPort`] is the line-discipline side of one UART channel: writers fill
//! its transmit ring, the driver drains it, and received chunks collect in a
//! queue that readers consume after the driver pushes. Each received chunk
//! keeps the [`RxFlag`] it was delivered with.
//!
//! All state sits behind one [`IrqSpinLock`] so the port can be called from
//! the driver's worker while the driver holds its own channel lock.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use sc16_core::sync::IrqSpinLock;
use sc16_driver_api::{RxFlag, UartPort};

/// Default transmit ring capacity.
pub const XMIT_SIZE: usize = 4096;

/// Default receive queue capacity in bytes.
pub const RX_SIZE: usize = 4096;

/// One received chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxChunk {
    /// Classification reported by the driver.
    pub flag: RxFlag,
    /// Data bytes.
    pub data: Vec<u8>,
}

struct PortInner {
    xmit: VecDeque<u8>,
    xmit_cap: usize,
    x_char: Option<u8>,
    stopped: bool,
    /// Delivered but not yet pushed.
    staged: Vec<RxChunk>,
    /// Pushed and readable.
    ready: VecDeque<RxChunk>,
    ready_bytes: usize,
    rx_cap: usize,
    overruns: u32,
    dropped: usize,
    discard_breaks: bool,
}

/// Buffered [`UartPort`] implementation.
pub struct TtyPort {
    name: &'static str,
    inner: IrqSpinLock<PortInner>,
    wakeups: AtomicU64,
    pushes: AtomicU64,
    breaks: AtomicU64,
}

impl TtyPort {
    /// Creates a port with the default buffer sizes.
    pub fn new(name: &'static str) -> Self {
        Self::with_capacity(name, XMIT_SIZE, RX_SIZE)
    }

    /// Creates a port with explicit transmit and receive capacities.
    pub fn with_capacity(name: &'static str, xmit: usize, rx: usize) -> Self {
        Self {
            name,
            inner: IrqSpinLock::named(
                "tty.port",
                PortInner {
                    xmit: VecDeque::with_capacity(xmit),
                    xmit_cap: xmit,
                    x_char: None,
                    stopped: false,
                    staged: Vec::new(),
                    ready: VecDeque::new(),
                    ready_bytes: 0,
                    rx_cap: rx,
                    overruns: 0,
                    dropped: 0,
                    discard_breaks: false,
                },
            ),
            wakeups: AtomicU64::new(0),
            pushes: AtomicU64::new(0),
            breaks: AtomicU64::new(0),
        }
    }

    /// Port name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    // -- Writer side ---------------------------------------------------------

    /// Queues bytes for transmission. Returns how many fit.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        let room = inner.xmit_cap - inner.xmit.len();
        let n = room.min(data.len());
        inner.xmit.extend(&data[..n]);
        n
    }

    /// Free space in the transmit ring.
    pub fn write_room(&self) -> usize {
        let inner = self.inner.lock();
        inner.xmit_cap - inner.xmit.len()
    }

    /// Queues an out-of-band control byte (XON/XOFF).
    pub fn send_x_char(&self, ch: u8) {
        self.inner.lock().x_char = Some(ch);
    }

    /// Flow-stops or restarts output.
    pub fn set_stopped(&self, stopped: bool) {
        self.inner.lock().stopped = stopped;
    }

    /// Discards pending output.
    pub fn flush_output(&self) {
        self.inner.lock().xmit.clear();
    }

    // -- Reader side ---------------------------------------------------------

    /// Takes the next pushed chunk.
    pub fn read_chunk(&self) -> Option<RxChunk> {
        let mut inner = self.inner.lock();
        let chunk = inner.ready.pop_front()?;
        inner.ready_bytes -= chunk.data.len();
        Some(chunk)
    }

    /// Takes all pushed bytes, dropping the chunk flags.
    pub fn read_all(&self) -> Vec<u8> {
        let mut inner = self.inner.lock();
        inner.ready_bytes = 0;
        inner.ready.drain(..).flat_map(|c| c.data).collect()
    }

    /// Bytes readable right now.
    pub fn readable(&self) -> usize {
        self.inner.lock().ready_bytes
    }

    /// Makes the break hook ask the driver to discard break chunks.
    pub fn set_discard_breaks(&self, discard: bool) {
        self.inner.lock().discard_breaks = discard;
    }

    // -- Counters ------------------------------------------------------------

    /// Overrun markers received.
    pub fn overruns(&self) -> u32 {
        self.inner.lock().overruns
    }

    /// Bytes dropped because the receive queue was full.
    pub fn dropped(&self) -> usize {
        self.inner.lock().dropped
    }

    /// Write wakeups signalled by the driver.
    pub fn wakeups(&self) -> u64 {
        self.wakeups.load(Ordering::Relaxed)
    }

    /// Pushes signalled by the driver.
    pub fn pushes(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }

    /// Break hook invocations.
    pub fn breaks(&self) -> u64 {
        self.breaks.load(Ordering::Relaxed)
    }
}

impl UartPort for TtyPort {
    fn x_char(&self) -> Option<u8> {
        self.inner.lock().x_char
    }

    fn clear_x_char(&self) {
        self.inner.lock().x_char = None;
    }

    fn tx_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    fn tx_pending(&self) -> usize {
        self.inner.lock().xmit.len()
    }

    fn pop_tx(&self, buf: &mut [u8]) -> usize {
        let mut inner = self.inner.lock();
        let n = buf.len().min(inner.xmit.len());
        for (slot, b) in buf.iter_mut().zip(inner.xmit.drain(..n)) {
            *slot = b;
        }
        n
    }

    fn write_wakeup(&self) {
        self.wakeups.fetch_add(1, Ordering::Relaxed);
    }

    fn receive_chars(&self, bytes: &[u8], flag: RxFlag) {
        let mut inner = self.inner.lock();
        let queued = inner.ready_bytes + inner.staged.iter().map(|c| c.data.len()).sum::<usize>();
        let room = inner.rx_cap.saturating_sub(queued);
        let n = room.min(bytes.len());
        inner.dropped += bytes.len() - n;
        if n > 0 {
            inner.staged.push(RxChunk {
                flag,
                data: bytes[..n].to_vec(),
            });
        }
    }

    fn receive_overrun(&self) {
        self.inner.lock().overruns += 1;
    }

    fn push(&self) {
        let mut inner = self.inner.lock();
        let staged = core::mem::take(&mut inner.staged);
        for chunk in staged {
            inner.ready_bytes += chunk.data.len();
            inner.ready.push_back(chunk);
        }
        drop(inner);
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    fn handle_break(&self) -> bool {
        self.breaks.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().discard_breaks
    }
}
