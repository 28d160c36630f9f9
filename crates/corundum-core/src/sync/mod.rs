//! Concurrency primitives matching the two-tier locking model used
//! throughout the kernel: an interrupt-disabling spin lock for code that
//! may run in interrupt context, and a sleep-capable lock for code that
//! never does.

mod binary_semaphore;
mod mutex;
mod waitqueue;

pub use binary_semaphore::{BinarySemaphore, BinarySemaphoreGuard};
pub use mutex::{Mutex, MutexGuard};
pub use waitqueue::WaitQueue;
