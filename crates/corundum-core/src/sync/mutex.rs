//! Sleep-capable mutual-exclusion lock.
//!
//! Unlike [`super::BinarySemaphore`], a `Mutex` never disables interrupts
//! and is not safe to take from interrupt context: a contending thread is
//! expected to block on the scheduler's wait queue rather than spin. It is,
//! however, exactly as unsound to take from inside an ISR or while already
//! holding a `BinarySemaphore` as any other sleeping operation, so doing so
//! is a bug caught eagerly in debug builds.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use super::binary_semaphore::held_depth;
use super::waitqueue::WaitQueue;

/// A mutex that parks contending threads on an internal wait queue instead
/// of spinning.
///
/// The park/wake mechanism is pluggable: the kernel binary installs a
/// [`WaitQueue`] backed by the real scheduler; host tests use the default
/// spin-based fallback, which is correct but not performant (acceptable
/// since host tests never contend this lock across real threads).
pub struct Mutex<T> {
    locked: AtomicBool,
    waiters: WaitQueue,
    data: UnsafeCell<T>,
}

// SAFETY: access to the inner data is only granted through `lock`, which
// establishes mutual exclusion via `locked`.
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new, unlocked mutex wrapping `value`.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            waiters: WaitQueue::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Blocks the calling thread until the lock is acquired.
    ///
    /// # Panics
    ///
    /// Panics if the calling CPU currently holds any
    /// [`super::BinarySemaphore`]. Sleeping with interrupts disabled (or
    /// inside an ISR, which always runs with a semaphore-equivalent
    /// invariant) would stall the CPU forever, since nothing could ever
    /// wake it.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        assert_eq!(
            held_depth(),
            0,
            "attempted to sleep on a Mutex while holding a BinarySemaphore"
        );
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return MutexGuard { lock: self };
            }
            self.waiters.wait_while(|| self.locked.load(Ordering::Relaxed));
        }
    }

    /// Attempts to acquire without blocking. Returns `None` if already held.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|()| MutexGuard { lock: self })
    }
}

/// RAII guard returned by [`Mutex::lock`]. Releases the lock and wakes one
/// waiter on drop.
pub struct MutexGuard<'a, T> {
    lock: &'a Mutex<T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding the guard proves exclusive access.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard proves exclusive access.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        self.lock.waiters.wake_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_grants_exclusive_access() {
        let mutex = Mutex::new(0u32);
        {
            let mut guard = mutex.lock();
            *guard += 1;
        }
        assert_eq!(*mutex.lock(), 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let mutex = Mutex::new(0u32);
        let _guard = mutex.lock();
        assert!(mutex.try_lock().is_none());
    }

    #[test]
    #[should_panic(expected = "attempted to sleep on a Mutex")]
    fn lock_panics_while_holding_semaphore() {
        use super::super::BinarySemaphore;
        let sem = BinarySemaphore::new(());
        let _sem_guard = sem.seize();
        let mutex = Mutex::new(0u32);
        let _ = mutex.lock();
    }
}
