//! Bootloader-agnostic boot information and the kernel entry point.
//!
//! A bootloader stub (Limine-style on x86_64, SBI/OpenSBI-style on riscv64 —
//! neither is part of this crate set) builds a concrete [`BootInfo`] from
//! its native handoff structure and calls [`kernel_init`] exactly once, on
//! the boot core, with interrupts disabled.

use corundum_core::id::Cid;
use corundum_mm::addr::PhysAddr;
use corundum_mm::PhysMemoryRegion;

/// Boot-time information a bootloader stub hands the kernel.
pub trait BootInfo {
    /// Physical memory map, sorted by start address.
    fn memory_map(&self) -> &[PhysMemoryRegion];

    /// HHDM offset: `virtual = physical + hhdm_offset()`.
    fn hhdm_offset(&self) -> u64;

    /// Physical address of the bootloader-provided root page table, which
    /// already maps the kernel image and the HHDM.
    fn kernel_page_table_root(&self) -> PhysAddr;

    /// This core's LAPIC id (x86_64) or hart id (riscv64).
    fn bsp_hw_id(&self) -> u32;

    /// Raw MADT bytes, for x86_64 SMP bring-up. `None` disables bring-up of
    /// any core beyond the boot core.
    fn madt(&self) -> Option<&[u8]> {
        None
    }

    /// Hart ids to bring up via SBI HSM, excluding the boot hart, for
    /// riscv64 SMP bring-up.
    fn secondary_harts(&self) -> &[u64] {
        &[]
    }
}

/// Scheduling cluster every user thread in this kernel joins. A richer
/// policy would expose more than one; this kernel's process model has no
/// notion of cluster assignment yet, so one is enough.
const DEFAULT_CLUSTER: Cid = Cid::new(0);

/// Kernel entry point. Called once by the bootloader stub, on the boot
/// core, with interrupts disabled.
pub fn kernel_init(boot_info: &impl BootInfo) -> ! {
    crate::log::init_early();
    corundum_core::kinfo!("corundum kernel starting");

    arch_bsp_init(boot_info);

    // SAFETY: core 0 is the boot core by convention, and this is the only
    // place that publishes it.
    unsafe { crate::percpu::publish(0, boot_info.bsp_hw_id()) };
    crate::percpu::current().mark_booted();

    corundum_mm::pmm::init(boot_info.memory_map(), boot_info.hhdm_offset(), false);
    corundum_mm::pmm::with(|pmm| {
        corundum_core::kinfo!(
            "pmm: {} MiB free / {} MiB total",
            pmm.free_frames() * 4 / 1024,
            pmm.total_frames() * 4 / 1024,
        );
    });

    corundum_sched::dispatch::init();
    corundum_sched::dispatch::with(|d| {
        d.create_cluster(DEFAULT_CLUSTER, corundum_sched::cluster::ClusterPolicy::RoundRobin, 4, true, 0)
            .expect("default cluster create");
    });

    crate::proc::init();
    crate::proc::set_kernel_root(boot_info.kernel_page_table_root());
    crate::ipc::init();

    corundum_fs::mount::init();
    corundum_fs::mount::with(|mounts| {
        mounts
            .mount(0, corundum_fs::FsKind::Dev, "/dev", 0)
            .expect("mounting devfs");
    });

    crate::entropy::reseed();

    let booted = bring_up_secondary_cores(boot_info);
    corundum_core::kinfo!("smp: {booted} core(s) online");

    crate::ktest::run_all();

    crate::idle_core()
}

#[cfg(target_arch = "x86_64")]
fn arch_bsp_init(boot_info: &impl BootInfo) {
    // SAFETY: first thing run on the boot core; nothing has touched the
    // GDT/IDT/SYSCALL MSRs yet.
    unsafe {
        crate::arch::x86_64::gdt::init();
        crate::arch::x86_64::idt::init();
        crate::arch::x86_64::syscall::init();
        map_lapic(boot_info.kernel_page_table_root());
    }
}

#[cfg(target_arch = "riscv64")]
fn arch_bsp_init(_boot_info: &impl BootInfo) {
    // SAFETY: first thing run on the boot hart.
    unsafe { crate::arch::riscv64::trap::init() };
}

/// Physical address of the local APIC's MMIO page. Referenced directly
/// (not through the HHDM) by [`crate::arch::x86_64::smp`] and
/// [`crate::arch::x86_64::idt`], so it must stay in sync with both.
#[cfg(target_arch = "x86_64")]
const LAPIC_BASE: u64 = 0xFEE0_0000;

/// Marks the LAPIC's MMIO page uncacheable. A Limine-style loader identity
/// maps low physical memory, so the page is already present; this only
/// tightens its flags.
#[cfg(target_arch = "x86_64")]
unsafe fn map_lapic(kernel_root: PhysAddr) {
    use corundum_mm::addr::VirtAddr;
    use corundum_mm::mapper::{MapFlags, PageMapper};
    use corundum_mm::paging::{Page, Size4KiB};

    let page = Page::<Size4KiB>::containing_address(VirtAddr::new_canonical(LAPIC_BASE));
    let flags = MapFlags::WRITABLE | MapFlags::CACHE_DISABLE;
    // SAFETY: `kernel_root` is the live root table; the page is already
    // present, so this only updates its flags, never creates a mapping.
    if let Ok(flush) = unsafe { crate::arch::x86_64::paging::FourLevelPaging.update_flags(kernel_root, page, flags) } {
        flush.flush();
    }
}

#[cfg(target_arch = "x86_64")]
fn bring_up_secondary_cores(boot_info: &impl BootInfo) -> usize {
    let Some(madt) = boot_info.madt() else {
        return 1;
    };
    // SAFETY: the BSP's own GDT/IDT/paging are live (done in
    // `arch_bsp_init`), and every AP maps the same kernel half the BSP does.
    unsafe {
        crate::arch::x86_64::smp::bring_up_all(madt, boot_info.kernel_page_table_root(), boot_info.bsp_hw_id() as u8)
    }
}

#[cfg(target_arch = "riscv64")]
fn bring_up_secondary_cores(boot_info: &impl BootInfo) -> usize {
    let mut booted = 1usize;
    for (i, &hart) in boot_info.secondary_harts().iter().enumerate() {
        let core_number = i as u32 + 1;
        if core_number as usize >= riscv_ap::MAX_AP_HARTS {
            corundum_core::kwarn!("hart {hart} exceeds the {} supported secondary harts, omitting", riscv_ap::MAX_AP_HARTS);
            continue;
        }
        // SAFETY: `riscv_ap::trampoline` is this module's own entry point,
        // matching the SBI HSM `HART_START` calling convention.
        let result = unsafe {
            crate::arch::riscv64::sbi::hart_start(hart, riscv_ap::trampoline as u64, core_number as u64)
        };
        match result {
            Ok(()) => booted += 1,
            Err(e) => corundum_core::kwarn!("hart {hart} failed to start: {e}"),
        }
    }
    booted
}

/// Secondary-hart bring-up on riscv64.
///
/// The SBI HSM spec leaves `sp` undefined on hart start, unlike x86_64's
/// SIPI (which starts the AP in real mode with no stack at all, but this
/// kernel's own trampoline patches one in before jumping to Rust code). This
/// module plays the same role: [`trampoline`] sets `sp` from a fixed,
/// per-hart-slot stack before calling into [`hart_entry`].
#[cfg(target_arch = "riscv64")]
mod riscv_ap {
    /// Upper bound on secondary harts this kernel brings up; bounded well
    /// below [`corundum_core::cpu_local::MAX_CPUS`] to keep the stack
    /// region's static footprint small.
    pub const MAX_AP_HARTS: usize = 31;
    const STACK_SIZE: u64 = 64 * 1024;

    #[repr(align(16))]
    struct ApStacks([u8; MAX_AP_HARTS * STACK_SIZE as usize]);

    static AP_STACKS: ApStacks = ApStacks([0; MAX_AP_HARTS * STACK_SIZE as usize]);

    /// Entry point patched into the SBI `HART_START` call. `a0` = hart id,
    /// `a1` = this hart's 1-based core number (passed through as `opaque`).
    #[unsafe(naked)]
    pub unsafe extern "C" fn trampoline() {
        core::arch::naked_asm!(
            "addi t0, a1, -1",
            "li t1, {stack_size}",
            "mul t0, t0, t1",
            "la t1, {stacks}",
            "add sp, t0, t1",
            "addi sp, sp, {stack_size}",
            "j {entry}",
            stack_size = const STACK_SIZE,
            stacks = sym AP_STACKS,
            entry = sym hart_entry,
        );
    }

    extern "C" fn hart_entry(hart_id: u64, core_number: u64) -> ! {
        let _ = hart_id;
        // SAFETY: called exactly once per hart, with `sp` already valid
        // (set by `trampoline` above) and before this core is published
        // anywhere else.
        unsafe {
            crate::arch::riscv64::trap::init();
            crate::percpu::publish(core_number as u32, hart_id as u32);
        }
        crate::percpu::current().mark_booted();
        corundum_core::kdebug!("hart {hart_id} (core {core_number}) online");
        crate::idle_core()
    }
}
