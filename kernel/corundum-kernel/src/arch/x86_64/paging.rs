//! 4-level (PML4/PDPT/PD/PT) page table walker.
//!
//! Implements `corundum_mm::mapper`'s architecture-independent traits. Every
//! intermediate table is accessed through the higher-half direct map
//! ([`crate::config::HHDM_BASE`]) rather than being individually mapped.

use corundum_mm::addr::{PhysAddr, VirtAddr};
use corundum_mm::mapper::{MapFlags, MapFlush, PageMapper, PageTranslator, RootTableOps, Translation, UnmapError};
use corundum_mm::paging::{FrameAllocator, Page, PhysFrame, Size4KiB};

const PRESENT: u64 = 1 << 0;
const WRITABLE: u64 = 1 << 1;
const USER: u64 = 1 << 2;
const CACHE_DISABLE: u64 = 1 << 4;
const GLOBAL: u64 = 1 << 8;
const NO_EXECUTE: u64 = 1 << 63;
const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

fn phys_to_virt(phys: PhysAddr) -> *mut u64 {
    (crate::config::HHDM_BASE + phys.as_u64()) as *mut u64
}

fn table(phys: PhysAddr) -> &'static mut [u64; 512] {
    // SAFETY: every intermediate table this module creates is a single,
    // HHDM-reachable 4 KiB frame; callers of `map`/`unmap`/etc. guarantee
    // `root` (and therefore everything reachable from it) is valid.
    unsafe { &mut *(phys_to_virt(phys) as *mut [u64; 512]) }
}

fn entry_flags(flags: MapFlags) -> u64 {
    let mut bits = PRESENT;
    if flags.contains(MapFlags::WRITABLE) {
        bits |= WRITABLE;
    }
    if flags.contains(MapFlags::USER) {
        bits |= USER;
    }
    if flags.contains(MapFlags::GLOBAL) {
        bits |= GLOBAL;
    }
    if flags.contains(MapFlags::CACHE_DISABLE) {
        bits |= CACHE_DISABLE;
    }
    if !flags.contains(MapFlags::EXECUTABLE) {
        bits |= NO_EXECUTE;
    }
    bits
}

/// Walks PML4 -> PDPT -> PD, creating any missing intermediate table via
/// `alloc`, and returns the PT entry slot for `page`.
///
/// # Safety
///
/// `root` must be a valid PML4 physical frame.
unsafe fn pt_entry<'a>(
    root: PhysAddr,
    page: Page<Size4KiB>,
    alloc: Option<&mut dyn FnMut() -> PhysFrame<Size4KiB>>,
) -> Result<&'a mut u64, UnmapError> {
    let va = page.start_address();
    let mut alloc = alloc;
    let mut next = |parent: &mut [u64; 512], index: usize| -> Result<PhysAddr, UnmapError> {
        let raw = parent[index];
        if raw & PRESENT != 0 {
            return Ok(PhysAddr::new(raw & ADDR_MASK));
        }
        let Some(alloc) = alloc.as_mut() else {
            return Err(UnmapError::NotMapped);
        };
        let frame = alloc();
        let phys = frame.start_address();
        // SAFETY: `alloc` returns zeroed, unaliased frames per its contract.
        unsafe { table(phys).fill(0) };
        parent[index] = phys.as_u64() | PRESENT | WRITABLE | USER;
        Ok(phys)
    };

    let pml4 = table(root);
    let pdpt_phys = next(pml4, va.p4_index())?;
    let pdpt = table(pdpt_phys);
    let pd_phys = next(pdpt, va.p3_index())?;
    let pd = table(pd_phys);
    let pt_phys = next(pd, va.p2_index())?;
    let pt = table(pt_phys);
    Ok(&mut pt[va.p1_index()])
}

/// Implements [`PageMapper`]/[`PageTranslator`]/[`RootTableOps`] for 4 KiB
/// pages over the standard 4-level table format.
#[derive(Clone, Copy)]
pub struct FourLevelPaging;

// SAFETY: `map`/`unmap`/`update_flags` only ever construct entries through
// `pt_entry`, which never leaves a half-built intermediate table reachable
// (each level is fully populated, zeroed, and linked before use).
unsafe impl PageMapper<Size4KiB> for FourLevelPaging {
    unsafe fn map(
        &self,
        root: PhysAddr,
        page: Page<Size4KiB>,
        frame: PhysFrame<Size4KiB>,
        flags: MapFlags,
        alloc: &mut dyn FnMut() -> PhysFrame<Size4KiB>,
    ) -> Result<MapFlush, UnmapError> {
        // SAFETY: forwarding caller's contract on `root`.
        let entry = unsafe { pt_entry(root, page, Some(alloc))? };
        if *entry & PRESENT != 0 {
            return Err(UnmapError::NotMapped);
        }
        *entry = frame.start_address().as_u64() | entry_flags(flags);
        Ok(MapFlush::new(page.start_address()))
    }

    unsafe fn unmap(
        &self,
        root: PhysAddr,
        page: Page<Size4KiB>,
    ) -> Result<(PhysFrame<Size4KiB>, MapFlush), UnmapError> {
        // SAFETY: forwarding caller's contract on `root`.
        let entry = unsafe { pt_entry(root, page, None)? };
        if *entry & PRESENT == 0 {
            return Err(UnmapError::NotMapped);
        }
        let frame = PhysFrame::containing_address(PhysAddr::new(*entry & ADDR_MASK));
        *entry = 0;
        Ok((frame, MapFlush::new(page.start_address())))
    }

    unsafe fn update_flags(
        &self,
        root: PhysAddr,
        page: Page<Size4KiB>,
        flags: MapFlags,
    ) -> Result<MapFlush, UnmapError> {
        // SAFETY: forwarding caller's contract on `root`.
        let entry = unsafe { pt_entry(root, page, None)? };
        if *entry & PRESENT == 0 {
            return Err(UnmapError::NotMapped);
        }
        let phys = *entry & ADDR_MASK;
        *entry = phys | entry_flags(flags);
        Ok(MapFlush::new(page.start_address()))
    }
}

// SAFETY: walks the same table format `PageMapper` builds.
unsafe impl PageTranslator for FourLevelPaging {
    unsafe fn translate_addr(&self, root: PhysAddr, virt: VirtAddr) -> Option<Translation> {
        let page = Page::containing_address(virt);
        // SAFETY: forwarding caller's contract on `root`; read-only walk.
        let entry = unsafe { pt_entry(root, page, None).ok()? };
        if *entry & PRESENT == 0 {
            return None;
        }
        let offset = virt.as_u64() & (Size4KiB::SIZE - 1);
        Some(Translation {
            phys: PhysAddr::new((*entry & ADDR_MASK) + offset),
            user: *entry & USER != 0,
            writable: *entry & WRITABLE != 0,
            executable: *entry & NO_EXECUTE == 0,
        })
    }
}

use corundum_mm::paging::PageSize;

// SAFETY: `clone_kernel_half` only copies top-half PML4 slots (shared,
// immutable from the callee's point of view); `clone_user_half` allocates
// a fresh frame per user page, never aliasing the source.
unsafe impl RootTableOps for FourLevelPaging {
    unsafe fn clone_kernel_half(&self, src: PhysAddr, dst: PhysAddr) {
        // SAFETY: forwarding caller's contract on `src`/`dst`.
        let (src_t, dst_t) = unsafe { (table(src), table(dst)) };
        for i in 0..512 {
            dst_t[i] = if i >= 256 { src_t[i] } else { 0 };
        }
    }

    unsafe fn clone_user_half(
        &self,
        src: PhysAddr,
        dst: PhysAddr,
        alloc: &mut dyn FrameAllocator<Size4KiB>,
    ) -> Result<(), UnmapError> {
        for p4 in 0..256usize {
            let base = (p4 as u64) << 39;
            for p3 in 0..512usize {
                for p2 in 0..512usize {
                    for p1 in 0..512usize {
                        let va = base
                            | ((p3 as u64) << 30)
                            | ((p2 as u64) << 21)
                            | ((p1 as u64) << 12);
                        let page = Page::<Size4KiB>::containing_address(VirtAddr::new_canonical(va));
                        // SAFETY: forwarding caller's contract on `src`.
                        let Ok(entry) = (unsafe { pt_entry(src, page, None) }) else {
                            continue;
                        };
                        if *entry & PRESENT == 0 {
                            continue;
                        }
                        let flags = *entry & !ADDR_MASK;
                        let src_phys = PhysAddr::new(*entry & ADDR_MASK);
                        let dst_frame = alloc.allocate_frame().ok_or(UnmapError::NotMapped)?;
                        // SAFETY: `dst_frame` is freshly allocated and not
                        // aliased; copying 4 KiB between two HHDM-mapped
                        // frames.
                        unsafe {
                            core::ptr::copy_nonoverlapping(
                                phys_to_virt(src_phys) as *const u8,
                                phys_to_virt(dst_frame.start_address()) as *mut u8,
                                Size4KiB::SIZE as usize,
                            );
                        }
                        let mut noop = || dst_frame;
                        // SAFETY: forwarding caller's contract on `dst`.
                        let dst_entry = unsafe { pt_entry(dst, page, Some(&mut noop))? };
                        *dst_entry = dst_frame.start_address().as_u64() | flags;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Invalidates a single TLB entry. Registered via
/// [`corundum_mm::mapper::register_tlb_flush`] during boot.
pub fn flush_tlb(virt: VirtAddr) {
    // SAFETY: `invlpg` takes a memory operand purely for its address;
    // nothing is read or written through it.
    unsafe { core::arch::asm!("invlpg [{}]", in(reg) virt.as_u64(), options(nostack)) };
}
