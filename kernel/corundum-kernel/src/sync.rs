//! A `no_std` lazily-initialized static, in the shape of `std::sync::LazyLock`.
//!
//! The teacher sources this from its own `sync` module; the retrieval pack
//! did not carry that file's body, so this is a from-scratch equivalent
//! sized for the one job it does here: building the GDT/IDT/TSS exactly
//! once, on the boot core, before any other core can observe them.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const INIT: u8 = 2;

/// A value computed once, on first access, from a `const fn () -> T`.
pub struct LazyLock<T, F = fn() -> T> {
    state: AtomicU8,
    init: UnsafeCell<Option<F>>,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: `force` serializes the one writer that ever touches `value`
// and `init` via `state`; after `INIT` is published with `Ordering::Release`
// every reader only ever reads.
unsafe impl<T: Sync, F> Sync for LazyLock<T, F> {}

impl<T, F: FnOnce() -> T> LazyLock<T, F> {
    /// Creates a `LazyLock` that will call `init` on first [`force`](Self::force).
    pub const fn new(init: F) -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            init: UnsafeCell::new(Some(init)),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Computes and caches the value if this is the first call, otherwise
    /// returns the cached value.
    ///
    /// Bring-up on this kernel only ever forces these locks from the boot
    /// core before releasing application processors, so a spin-wait on
    /// `INITIALIZING` (rather than true mutual exclusion) is sufficient.
    pub fn force(&self) -> &T {
        loop {
            match self.state.compare_exchange(
                UNINIT,
                INITIALIZING,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // SAFETY: we are the unique thread that won the CAS out
                    // of UNINIT, so we exclusively own `init` and `value`.
                    let f = unsafe { (*self.init.get()).take().unwrap() };
                    let value = f();
                    unsafe {
                        (*self.value.get()).write(value);
                    }
                    self.state.store(INIT, Ordering::Release);
                    break;
                }
                Err(INIT) => break,
                Err(_) => core::hint::spin_loop(),
            }
        }
        // SAFETY: state == INIT, so `value` was written above and is never
        // mutated again.
        unsafe { (*self.value.get()).assume_init_ref() }
    }
}

impl<T, F: FnOnce() -> T> core::ops::Deref for LazyLock<T, F> {
    type Target = T;

    fn deref(&self) -> &T {
        self.force()
    }
}
