//! Interrupt-safe spin lock.
//!
//! Masks local interrupts before acquiring the inner spinlock and restores
//! the previous mask on release, so a lock shared between an interrupt
//! handler and the deferred worker can never deadlock against itself on one
//! CPU. The masking itself is platform code: the embedding kernel registers
//! it once with [`set_irq_ops`]. Until then masking is a no-op, which is the
//! correct behavior on a hosted target where "interrupts" are threads.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

// ---------------------------------------------------------------------------
// Platform interrupt masking hooks
// ---------------------------------------------------------------------------

/// Platform hooks for masking and restoring local interrupts.
#[derive(Clone, Copy)]
pub struct IrqOps {
    /// Masks interrupts and returns the previous state.
    pub save_and_mask: fn() -> usize,
    /// Restores a state previously returned by `save_and_mask`.
    pub restore: fn(usize),
}

fn null_save() -> usize {
    0
}

fn null_restore(_state: usize) {}

static SAVE_FN: AtomicPtr<()> = AtomicPtr::new(null_save as *mut ());
static RESTORE_FN: AtomicPtr<()> = AtomicPtr::new(null_restore as *mut ());

/// Registers the platform's interrupt masking hooks.
///
/// # Safety
///
/// Both functions must be callable from any context, including interrupt
/// handlers, and `restore` must accept every value `save_and_mask` returns.
/// Must be called before any `IrqSpinLock` is contended across contexts.
pub unsafe fn set_irq_ops(ops: IrqOps) {
    SAVE_FN.store(ops.save_and_mask as *mut (), Ordering::Release);
    RESTORE_FN.store(ops.restore as *mut (), Ordering::Release);
}

#[inline]
fn save_and_mask() -> usize {
    let ptr = SAVE_FN.load(Ordering::Acquire);
    // SAFETY: Only valid `fn() -> usize` pointers are stored into SAVE_FN.
    let f: fn() -> usize = unsafe { core::mem::transmute(ptr) };
    f()
}

#[inline]
fn restore(state: usize) {
    let ptr = RESTORE_FN.load(Ordering::Acquire);
    // SAFETY: Only valid `fn(usize)` pointers are stored into RESTORE_FN.
    let f: fn(usize) = unsafe { core::mem::transmute(ptr) };
    f(state);
}

// ---------------------------------------------------------------------------
// IrqSpinLock
// ---------------------------------------------------------------------------

/// A spin lock that masks interrupts while held.
pub struct IrqSpinLock<T> {
    locked: AtomicBool,
    name: &'static str,
    data: UnsafeCell<T>,
}

// SAFETY: Same reasoning as SpinLock: atomic ops ensure exclusive access.
unsafe impl<T: Send> Send for IrqSpinLock<T> {}
unsafe impl<T: Send> Sync for IrqSpinLock<T> {}

impl<T> IrqSpinLock<T> {
    /// Creates a new unlocked `IrqSpinLock`.
    pub const fn new(value: T) -> Self {
        Self::named("<unnamed>", value)
    }

    /// Creates a new unlocked `IrqSpinLock` carrying a diagnostic name.
    pub const fn named(name: &'static str, value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name,
            data: UnsafeCell::new(value),
        }
    }

    /// Returns the diagnostic name given at construction.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Acquires the lock, masking interrupts first.
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let saved = save_and_mask();
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return IrqSpinLockGuard {
                    lock: self,
                    saved,
                    _not_send: PhantomData,
                };
            }
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<IrqSpinLockGuard<'_, T>> {
        let saved = save_and_mask();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(IrqSpinLockGuard {
                lock: self,
                saved,
                _not_send: PhantomData,
            })
        } else {
            restore(saved);
            None
        }
    }

    /// Returns a mutable reference to the data; `&mut self` proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// RAII guard that restores the interrupt mask on drop.
///
/// Not `Send`: the saved mask belongs to the CPU that took the lock.
pub struct IrqSpinLockGuard<'a, T> {
    lock: &'a IrqSpinLock<T>,
    saved: usize,
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: The lock is held, so we have exclusive access to the data.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The lock is held, so we have exclusive access to the data.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for IrqSpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        restore(self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_unlock() {
        let lock = IrqSpinLock::new(7u8);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 8);
    }

    #[test]
    fn try_lock_fails_when_held() {
        let lock = IrqSpinLock::new(());
        let _guard = lock.lock();
        assert!(lock.try_lock().is_none());
    }

    #[test]
    fn failed_try_lock_leaves_lock_usable() {
        let lock = IrqSpinLock::named("ch1.state", 0u32);
        {
            let _held = lock.lock();
            assert!(lock.try_lock().is_none());
        }
        assert!(lock.try_lock().is_some());
        assert_eq!(lock.name(), "ch1.state");
    }

    #[test]
    fn default_hooks_are_inert() {
        let state = save_and_mask();
        assert_eq!(state, 0);
        restore(state);
    }
}
