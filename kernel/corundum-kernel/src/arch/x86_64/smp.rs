//! Raw INIT/SIPI application-processor bring-up.
//!
//! Unlike the teacher's bootloader-assisted two-phase park/release scheme,
//! this kernel owns the whole sequence itself: enumerate the MADT, patch a
//! trampoline blob into a fixed sub-1 MiB page per AP, and bit-bang the
//! INIT/startup IPIs through the local APIC.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use corundum_core::id::CpuId;
use corundum_core::{kdebug, kinfo, kwarn};
use corundum_mm::addr::PhysAddr;

use super::acpi::local_apics;
use super::idt::vectors;

const LAPIC_BASE: u64 = 0xFEE0_0000;
const ICR_LOW: u64 = LAPIC_BASE + 0x300;
const ICR_HIGH: u64 = LAPIC_BASE + 0x310;

/// Physical page the trampoline blob is copied into. Must be below 1 MiB
/// and 4 KiB aligned so the startup IPI's vector (`page >> 12`) round-trips.
const TRAMPOLINE_PAGE: u64 = 0x8000;

/// Offsets of the fields the BSP patches into the trampoline blob before
/// starting each AP, matching the layout `trampoline.S` (assembled
/// separately, linked in as a byte blob) expects.
mod patch {
    pub const CR3: usize = 0x00;
    pub const STACK_TOP: usize = 0x08;
    pub const CORE_NUMBER: usize = 0x10;
    pub const LAPIC_ID: usize = 0x14;
    pub const ENTRY_POINT: usize = 0x18;
    pub const BOOTED_FLAG: usize = 0x20;
}

// SAFETY: the binary is produced by the kernel's own build (not shipped
// here — the assembly source lives alongside the linker script) and is
// guaranteed to be smaller than one page.
unsafe extern "C" {
    #[link_name = "__ap_trampoline_start"]
    static AP_TRAMPOLINE_BLOB: u8;
    #[link_name = "__ap_trampoline_size"]
    static AP_TRAMPOLINE_SIZE: u8;
}

unsafe fn write_icr(high: u32, low: u32) {
    // SAFETY: caller guarantees the LAPIC is identity/HHDM-mapped
    // uncached MMIO at this fixed address, as it is for every x86_64
    // target this kernel boots on.
    unsafe {
        core::ptr::write_volatile(ICR_HIGH as *mut u32, high);
        core::ptr::write_volatile(ICR_LOW as *mut u32, low);
        while core::ptr::read_volatile(ICR_LOW as *const u32) & (1 << 12) != 0 {
            core::hint::spin_loop();
        }
    }
}

fn spin_ticks(ticks: u64) {
    for _ in 0..ticks {
        core::hint::spin_loop();
    }
}

/// Broadcasts the panic IPI to every other core, so a `Hard_Panic` on one
/// core halts the whole system.
pub fn broadcast_panic_ipi() {
    // SAFETY: "all excluding self" shorthand destination, standard INIT/IPI
    // delivery; safe to issue from a panicking core with interrupts off.
    unsafe {
        write_icr(0, 0x000C_0000 | vectors::PANIC_IPI as u32);
    }
}

/// Enumerates the MADT, brings up every usable non-BSP core via INIT/SIPI,
/// and returns the number of cores that set their `Booted_Flag` in time
/// (including the BSP itself).
///
/// # Safety
///
/// Must run once, after the BSP's own GDT/IDT/paging are live, with the
/// kernel half of every core's future address space already mapped.
pub unsafe fn bring_up_all(madt: &[u8], kernel_cr3: PhysAddr, bsp_apic_id: u8) -> usize {
    let mut booted = 1usize; // the BSP

    // SAFETY: this blob is produced and linked by the kernel's own build.
    let blob_start = unsafe { core::ptr::addr_of!(AP_TRAMPOLINE_BLOB) };
    let blob_size = unsafe { core::ptr::addr_of!(AP_TRAMPOLINE_SIZE) as usize };

    for (core_number, ap) in local_apics(madt)
        .filter(|e| e.is_usable() && e.apic_id != bsp_apic_id)
        .enumerate()
    {
        let core_number = core_number as u32 + 1; // BSP is core 0

        // SAFETY: TRAMPOLINE_PAGE is a fixed, owned sub-1 MiB scratch page
        // reserved by the linker script for exactly this purpose.
        unsafe {
            core::ptr::copy_nonoverlapping(blob_start, TRAMPOLINE_PAGE as *mut u8, blob_size);
            let page = TRAMPOLINE_PAGE as *mut u8;
            page.add(patch::CR3).cast::<u64>().write_volatile(kernel_cr3.as_u64());
            page.add(patch::STACK_TOP)
                .cast::<u64>()
                .write_volatile(ap_stack_top(core_number));
            page.add(patch::CORE_NUMBER)
                .cast::<u32>()
                .write_volatile(core_number);
            page.add(patch::LAPIC_ID).cast::<u8>().write_volatile(ap.apic_id);
            page.add(patch::ENTRY_POINT)
                .cast::<u64>()
                .write_volatile(ap_entry as u64);
            page.add(patch::BOOTED_FLAG).cast::<u32>().write_volatile(0);
        }

        let vector = (TRAMPOLINE_PAGE >> 12) as u32;

        // SAFETY: standard INIT-then-SIPI sequence targeting a single
        // APIC id, matching the spec's bring-up recipe.
        unsafe {
            write_icr((ap.apic_id as u32) << 24, 0x0004_0500);
            spin_ticks(crate::config::SMP_SPIN_TICK);
            write_icr((ap.apic_id as u32) << 24, 0x0004_0600 | vector);
        }

        let flag_ptr = (TRAMPOLINE_PAGE as usize + patch::BOOTED_FLAG) as *const u32;
        let mut waited = 0u32;
        // SAFETY: flag_ptr targets the just-patched trampoline page.
        let arrived = loop {
            if unsafe { core::ptr::read_volatile(flag_ptr) } != 0 {
                break true;
            }
            spin_ticks(crate::config::SMP_SPIN_TICK);
            waited += 1;
            if waited >= crate::config::SMP_BOOT_TIMEOUT_TICKS {
                break false;
            }
        };

        if arrived {
            booted += 1;
            kinfo!("core {core_number} (LAPIC {}) booted", ap.apic_id);
        } else {
            kwarn!(
                "core {core_number} (LAPIC {}) did not boot within {} ticks, omitting",
                ap.apic_id,
                crate::config::SMP_BOOT_TIMEOUT_TICKS
            );
        }
    }

    booted
}

static NEXT_STACK: AtomicU64 = AtomicU64::new(0xFFFF_8080_0000_0000);
const AP_STACK_SIZE: u64 = 64 * 1024;

fn ap_stack_top(_core_number: u32) -> u64 {
    NEXT_STACK.fetch_add(AP_STACK_SIZE, Ordering::Relaxed) + AP_STACK_SIZE
}

static READY_COUNT: AtomicU32 = AtomicU32::new(1);

/// Entry point the trampoline jumps to once an AP has switched to long
/// mode and the kernel's page tables. Completes per-core bring-up: GDT,
/// IDT, GS-base, TSS, LAPIC timer, then idles.
extern "C" fn ap_entry(core_number: u32, apic_id: u32) -> ! {
    // SAFETY: called exactly once per AP, before this core is published
    // anywhere else, and `core_number` is this core's unique trampoline-
    // assigned index.
    unsafe {
        super::gdt::init();
        super::idt::init();
        crate::percpu::publish(core_number, apic_id);
    }
    crate::percpu::current().mark_booted();

    READY_COUNT.fetch_add(1, Ordering::Release);
    kdebug!("core {core_number} online");

    crate::idle_core()
}
