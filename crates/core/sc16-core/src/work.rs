//! Deferred-work scheduling state machine.
//!
//! A [`DeferredWork`] tracks whether a bottom-half task is idle, queued on a
//! worker, or running. It does not own a thread or a queue; the embedding
//! environment does the actual queueing and only asks this type whether a
//! new queue entry is needed. The guarantees it gives:
//!
//! - at most one execution of the task is in flight at any time;
//! - a trigger that arrives while the task runs is never lost, but instead
//!   of a second concurrent execution it makes the running one go around
//!   again;
//! - once [`disable`](DeferredWork::disable) returns, no execution is in
//!   flight and none can start until [`enable`](DeferredWork::enable).
//!
//! ```text
//!            enable            schedule               begin
//! Disabled ─────────▶ Idle ─────────────▶ Scheduled ─────────▶ Running
//!                      ▲                                        │   ▲
//!                      │           complete (no retrigger)      │   │ complete
//!                      └────────────────────────────────────────┘   │ (rerun)
//!                                         schedule while running    │
//!                                 Running ─────────────────▶ Requeued
//! ```

use crate::sync::loom_compat::{AtomicU8, Ordering, spin_hint};

const DISABLED: u8 = 0;
const IDLE: u8 = 1;
const SCHEDULED: u8 = 2;
const RUNNING: u8 = 3;
const REQUEUED: u8 = 4;

/// Observable state of a [`DeferredWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    /// Not accepting triggers.
    Disabled,
    /// Nothing pending.
    Idle,
    /// Queued, waiting for a worker to pick it up.
    Scheduled,
    /// A worker is executing the task.
    Running,
    /// Running, and triggered again since the pass started.
    Requeued,
}

impl WorkState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            IDLE => Self::Idle,
            SCHEDULED => Self::Scheduled,
            RUNNING => Self::Running,
            REQUEUED => Self::Requeued,
            _ => Self::Disabled,
        }
    }
}

/// Coalescing scheduler state for one deferred task.
pub struct DeferredWork {
    state: AtomicU8,
}

impl DeferredWork {
    /// Creates a disabled work item.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(DISABLED),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> WorkState {
        WorkState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Starts accepting triggers. Returns `false` if already enabled.
    pub fn enable(&self) -> bool {
        self.state
            .compare_exchange(DISABLED, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Records a trigger.
    ///
    /// Returns `true` when the caller must hand the task to a worker. A
    /// trigger that lands while the task is already queued or running is
    /// folded into that execution and returns `false`.
    pub fn schedule(&self) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            let next = match cur {
                IDLE => SCHEDULED,
                RUNNING => REQUEUED,
                _ => return false,
            };
            match self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next == SCHEDULED,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Called by the worker before executing the task.
    ///
    /// Returns `false` if the work was disabled after being queued, in which
    /// case the worker must skip it.
    pub fn begin(&self) -> bool {
        self.state
            .compare_exchange(SCHEDULED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Called by the worker after a pass.
    ///
    /// Returns `true` when the task is done. Returns `false` when it was
    /// triggered during the pass; the worker must run it again before
    /// calling `complete` once more.
    pub fn complete(&self) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            let next = match cur {
                RUNNING => IDLE,
                REQUEUED => RUNNING,
                _ => return true,
            };
            match self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next == IDLE,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Stops accepting triggers, waiting out any in-flight execution.
    ///
    /// A queue entry that is still pending becomes a no-op for the worker.
    pub fn disable(&self) {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            match cur {
                DISABLED => return,
                RUNNING | REQUEUED => {
                    spin_hint();
                    cur = self.state.load(Ordering::Acquire);
                }
                _ => match self.state.compare_exchange_weak(
                    cur,
                    DISABLED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return,
                    Err(actual) => cur = actual,
                },
            }
        }
    }
}

impl Default for DeferredWork {
    fn default() -> Self {
        Self::new()
    }
}
