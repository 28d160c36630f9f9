//! Thread-blocking wait queue.
//!
//! Parks by thread identity (`Tid`) rather than by `Waker`, matching a
//! scheduler built around preemptible kernel threads instead of `Future`
//! polling. The actual park/unpark mechanism is supplied by the scheduler
//! crate at boot via [`set_hooks`]; before that (and in host tests) this
//! degrades to a spin loop, which is correct but not restful.

use core::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

/// Blocks the calling thread. Implemented by the scheduler once a real
/// thread table exists.
pub type ParkFn = fn();

/// Wakes one thread previously parked on any wait queue. Implemented by the
/// scheduler; the queue does not track which specific thread to wake — the
/// woken thread re-checks its own condition and re-parks if it lost the
/// race, as with any spurious-wakeup-tolerant design.
pub type WakeOneFn = fn();

/// Wakes every thread parked on any wait queue.
pub type WakeAllFn = fn();

static PARK_FN: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());
static WAKE_ONE_FN: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());
static WAKE_ALL_FN: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Installs the scheduler's park/wake hooks. Called once during boot after
/// the thread table is initialized.
pub fn set_hooks(park: ParkFn, wake_one: WakeOneFn, wake_all: WakeAllFn) {
    PARK_FN.store(park as *mut (), Ordering::Release);
    WAKE_ONE_FN.store(wake_one as *mut (), Ordering::Release);
    WAKE_ALL_FN.store(wake_all as *mut (), Ordering::Release);
}

/// A queue of threads blocked waiting for some condition to change.
///
/// Carries a generation counter bumped on every wake so that a thread
/// re-checking its condition after being woken can tell whether it raced
/// with another waiter, the same shape as a classic futex.
pub struct WaitQueue {
    generation: AtomicU32,
}

impl WaitQueue {
    /// Creates an empty wait queue.
    pub const fn new() -> Self {
        Self {
            generation: AtomicU32::new(0),
        }
    }

    /// Blocks the calling thread until `condition` returns `false`,
    /// re-checking after every wake.
    pub fn wait_while(&self, mut condition: impl FnMut() -> bool) {
        while condition() {
            self.park();
        }
    }

    /// Parks the calling thread once, regardless of any condition. Returns
    /// once woken (spuriously or genuinely).
    pub fn park(&self) {
        let before = self.generation.load(Ordering::Acquire);
        let ptr = PARK_FN.load(Ordering::Acquire);
        if ptr.is_null() {
            core::hint::spin_loop();
            return;
        }
        // SAFETY: only non-null pointers stored by `set_hooks`, which takes
        // a `ParkFn`, are ever placed here.
        let f: ParkFn = unsafe { core::mem::transmute(ptr) };
        if self.generation.load(Ordering::Acquire) == before {
            f();
        }
    }

    /// Wakes a single waiting thread, if any.
    pub fn wake_one(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let ptr = WAKE_ONE_FN.load(Ordering::Acquire);
        if ptr.is_null() {
            return;
        }
        // SAFETY: only non-null pointers stored by `set_hooks` are placed
        // here.
        let f: WakeOneFn = unsafe { core::mem::transmute(ptr) };
        f();
    }

    /// Wakes every waiting thread.
    pub fn wake_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let ptr = WAKE_ALL_FN.load(Ordering::Acquire);
        if ptr.is_null() {
            return;
        }
        // SAFETY: only non-null pointers stored by `set_hooks` are placed
        // here.
        let f: WakeAllFn = unsafe { core::mem::transmute(ptr) };
        f();
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    #[test]
    fn wait_while_returns_once_condition_clears() {
        let queue = WaitQueue::new();
        let mut remaining = 3;
        queue.wait_while(|| {
            if remaining == 0 {
                false
            } else {
                remaining -= 1;
                true
            }
        });
        assert_eq!(remaining, 0);
    }

    #[test]
    fn wake_one_bumps_generation() {
        let queue = WaitQueue::new();
        let before = queue.generation.load(Ordering::Acquire);
        queue.wake_one();
        assert_eq!(queue.generation.load(Ordering::Acquire), before + 1);
    }

    #[test]
    fn set_hooks_invokes_installed_wake_fn() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn park() {}
        fn wake_one() {
            CALLS.fetch_add(1, Ordering::SeqCst);
        }
        fn wake_all() {}
        set_hooks(park, wake_one, wake_all);
        let queue = WaitQueue::new();
        let before = CALLS.load(Ordering::SeqCst);
        queue.wake_one();
        assert_eq!(CALLS.load(Ordering::SeqCst), before + 1);
    }
}
