//! Compile-time kernel configuration.
//!
//! The teacher sources these from an external codegen crate driven by a
//! build-system config file; that tool is out of scope here (§1 excludes
//! build infrastructure), so the values are plain `const` items instead.

use corundum_core::log::LogLevel;

/// Maximum number of CPU cores this build supports. Must match
/// [`corundum_core::cpu_local::MAX_CPUS`].
pub const MAX_CPUS: usize = corundum_core::cpu_local::MAX_CPUS;

/// Minimum log level that reaches a sink by default.
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

/// Size in bytes of the early-boot kernel heap.
pub const KERNEL_HEAP_SIZE: usize = 4 * 1024 * 1024;

/// Busy-wait budget for one ~10 ms tick during SMP bring-up, expressed in
/// spin iterations rather than wall-clock time since no calibrated timer
/// exists yet at that point in boot.
pub const SMP_SPIN_TICK: u64 = 10_000_000;

/// Number of [`SMP_SPIN_TICK`]s to wait for an AP's `Booted_Flag` before
/// giving up on that core.
pub const SMP_BOOT_TIMEOUT_TICKS: u32 = 100;

/// Exit code used when the MAC `Kill` enforcement action terminates a
/// process.
pub const MAC_KILL_EXIT_CODE: i32 = corundum_syscall::mac::MAC_KILL_EXIT_CODE;

/// Kernel name reported by `uname`.
pub const SYSNAME: &str = "corundum";

/// Kernel release string reported by `uname`.
pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

/// Base of the higher-half direct map: physical address `p` is always
/// accessible at virtual address `HHDM_BASE + p`. Coincides with the start
/// of the kernel half so the direct map and the kernel's own image share
/// one contiguous region of the address space.
pub const HHDM_BASE: u64 = corundum_mm::address_space::KERNEL_HALF_START;
