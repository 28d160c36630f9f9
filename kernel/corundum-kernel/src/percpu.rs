//! Per-core data reachable via a dedicated segment/register.
//!
//! `corundum_core::cpu_local::current_cpu_id` reads `gs:[8]` on x86_64 and
//! `tp`-pointed memory on riscv64; [`CoreLocal`] is the struct those reads
//! index into, and this module is the only place that actually publishes
//! one (by writing `GS_BASE`/`tp`).

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use corundum_core::id::CpuId;

/// Per-core state. `#[repr(C)]` so `core_number`'s offset (8, right after
/// the 8-byte self-pointer) matches what
/// `corundum_core::cpu_local::current_cpu_id` hard-codes. `kernel_rsp`/
/// `user_rsp`'s offsets are not load-bearing outside this module —
/// `syscall.rs` computes them with [`core::mem::offset_of`] instead of
/// hard-coding a number.
#[repr(C)]
pub struct CoreLocal {
    /// Self-pointer, so `current()` can hand back `&'static CoreLocal`
    /// after reading only the segment base.
    self_ptr: u64,
    /// This core's logical id.
    core_number: AtomicU32,
    /// LAPIC id (x86_64) / hart id (riscv64) of this core.
    hw_id: AtomicU32,
    /// Set once this core has loaded its descriptor tables and activated
    /// the kernel page table; read by the bring-up loop as `Booted_Flag`.
    booted: AtomicBool,
    /// Top of this core's kernel stack, loaded into `rsp` by the `syscall`
    /// entry trampoline before anything is pushed.
    pub(crate) kernel_rsp: AtomicU64,
    /// Caller's `rsp` at the moment of `syscall`, stashed by the entry
    /// trampoline and restored before `sysretq`.
    pub(crate) user_rsp: AtomicU64,
}

impl CoreLocal {
    /// A zeroed, unpublished instance.
    pub const fn new() -> Self {
        Self {
            self_ptr: 0,
            core_number: AtomicU32::new(0),
            hw_id: AtomicU32::new(0),
            booted: AtomicBool::new(false),
            kernel_rsp: AtomicU64::new(0),
            user_rsp: AtomicU64::new(0),
        }
    }

    /// Sets this core's kernel stack top, used by the `syscall`/interrupt
    /// entry trampolines. Must be called before this core ever takes a
    /// syscall or a ring3 interrupt.
    pub fn set_kernel_rsp(&self, rsp: u64) {
        self.kernel_rsp.store(rsp, Ordering::Relaxed);
    }

    /// This core's logical id.
    pub fn core_id(&self) -> CpuId {
        CpuId::new(self.core_number.load(Ordering::Relaxed))
    }

    /// Marks this core booted, the flag SMP bring-up polls.
    pub fn mark_booted(&self) {
        self.booted.store(true, Ordering::Release);
    }

    /// Whether [`mark_booted`](Self::mark_booted) has run on this instance.
    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }
}

impl Default for CoreLocal {
    fn default() -> Self {
        Self::new()
    }
}

/// Every core's `CoreLocal`, preallocated statically rather than on a heap
/// this kernel does not have — the same `ArrayVec`/fixed-array discipline
/// `corundum_sched`/`corundum_mm` use for their own tables.
static CORES: [CoreLocal; corundum_core::cpu_local::MAX_CPUS] =
    [const { CoreLocal::new() }; corundum_core::cpu_local::MAX_CPUS];

/// Publishes this core's slot in [`CORES`] as the current core's
/// `CoreLocal` block by writing the architecture's per-core base register,
/// and sets its `core_number` and hardware id.
///
/// # Safety
///
/// Must run once per core, after that core's descriptor tables are loaded,
/// and `core_number` must be unique among cores calling this concurrently
/// (each core claims a distinct, never-shared array slot).
pub unsafe fn publish(core_number: u32, hw_id: u32) {
    // SAFETY: `core_number` is unique per calling core by contract, so no
    // two cores alias the same slot; `CORES` outlives every core.
    let core = unsafe { &*core::ptr::addr_of!(CORES[core_number as usize]) };
    // SAFETY: this slot is touched by exactly one core (itself), which is
    // the only writer for the remainder of its lifetime.
    let core = unsafe { &mut *(core as *const CoreLocal as *mut CoreLocal) };
    core.self_ptr = core as *const CoreLocal as u64;
    core.core_number.store(core_number, Ordering::Relaxed);
    core.hw_id.store(hw_id, Ordering::Relaxed);

    #[cfg(target_arch = "x86_64")]
    // SAFETY: writing IA32_GS_BASE/IA32_KERNEL_GS_BASE to a live, owned
    // CoreLocal is exactly this function's documented contract.
    unsafe {
        crate::arch::x86_64::msr::write(crate::arch::x86_64::msr::IA32_GS_BASE, core.self_ptr);
        crate::arch::x86_64::msr::write(
            crate::arch::x86_64::msr::IA32_KERNEL_GS_BASE,
            core.self_ptr,
        );
    }

    #[cfg(target_arch = "riscv64")]
    // SAFETY: tp is this hart's scratch register; nothing else reads it
    // before this call on a freshly-booted hart.
    unsafe {
        core::arch::asm!("mv tp, {}", in(reg) core.self_ptr, options(nomem, nostack));
    }
}

/// Number of cores that have published themselves via [`publish`] so far.
pub fn online_count() -> u32 {
    CORES.iter().filter(|c| c.is_booted()).count() as u32
}

/// Returns core 0's static slot, for use by host-target code paths that
/// never actually publish a `CoreLocal` (single-threaded test assumption,
/// same as [`corundum_core::cpu_local`]'s host fallback).
fn bsp_core_local() -> &'static CoreLocal {
    &CORES[0]
}

/// Returns the calling core's published `CoreLocal` by reading back the
/// self-pointer [`publish`] wrote into the per-core base register.
///
/// # Panics
///
/// Panics if called before [`publish`] on this core.
pub fn current() -> &'static CoreLocal {
    assert!(
        corundum_core::cpu_local::cpu_is_initialized(),
        "percpu::current called before publish on this core"
    );

    #[cfg(target_arch = "x86_64")]
    {
        let ptr: u64;
        // SAFETY: cpu_is_initialized() just confirmed GS:[0] holds a valid
        // kernel-half self-pointer.
        unsafe {
            core::arch::asm!("mov {}, gs:[0]", out(reg) ptr, options(readonly, nostack));
            &*(ptr as *const CoreLocal)
        }
    }
    #[cfg(target_arch = "riscv64")]
    {
        let ptr: u64;
        // SAFETY: cpu_is_initialized() just confirmed tp holds a valid
        // self-pointer.
        unsafe {
            core::arch::asm!("mv {}, tp", out(reg) ptr, options(nomem, nostack));
            &*(ptr as *const CoreLocal)
        }
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "riscv64")))]
    {
        bsp_core_local()
    }
}
