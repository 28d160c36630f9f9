//! Sv39 (3-level) page table walker.
//!
//! `p3_index`/`p2_index`/`p1_index` on [`corundum_mm::addr::VirtAddr`] line
//! up exactly with Sv39's VPN[2]/VPN[1]/VPN[0] fields, so the same index
//! helpers the x86_64 walker uses apply here unchanged; only the PTE bit
//! layout and leaf/non-leaf distinction differ.

use corundum_mm::addr::{PhysAddr, VirtAddr};
use corundum_mm::mapper::{MapFlags, MapFlush, PageMapper, PageTranslator, RootTableOps, Translation, UnmapError};
use corundum_mm::paging::{FrameAllocator, Page, PageSize, PhysFrame, Size4KiB};

const V: u64 = 1 << 0;
const R: u64 = 1 << 1;
const W: u64 = 1 << 2;
const X: u64 = 1 << 3;
const U: u64 = 1 << 4;
const G: u64 = 1 << 5;
const A: u64 = 1 << 6;
const D: u64 = 1 << 7;
const PPN_SHIFT: u32 = 10;

fn phys_to_virt(phys: PhysAddr) -> *mut u64 {
    (crate::config::HHDM_BASE + phys.as_u64()) as *mut u64
}

fn table(phys: PhysAddr) -> &'static mut [u64; 512] {
    // SAFETY: every intermediate table this module creates is a single,
    // HHDM-reachable 4 KiB frame; callers guarantee `root`'s subtree is
    // valid.
    unsafe { &mut *(phys_to_virt(phys) as *mut [u64; 512]) }
}

fn pte_phys(pte: u64) -> PhysAddr {
    PhysAddr::new((pte >> PPN_SHIFT) << 12)
}

fn is_leaf(pte: u64) -> bool {
    pte & V != 0 && pte & (R | W | X) != 0
}

fn entry_flags(flags: MapFlags) -> u64 {
    let mut bits = V | A | D;
    bits |= R;
    if flags.contains(MapFlags::WRITABLE) {
        bits |= W;
    }
    if flags.contains(MapFlags::EXECUTABLE) {
        bits |= X;
    }
    if flags.contains(MapFlags::USER) {
        bits |= U;
    }
    if flags.contains(MapFlags::GLOBAL) {
        bits |= G;
    }
    bits
}

unsafe fn pt_entry<'a>(
    root: PhysAddr,
    page: Page<Size4KiB>,
    alloc: Option<&mut dyn FnMut() -> PhysFrame<Size4KiB>>,
) -> Result<&'a mut u64, UnmapError> {
    let va = page.start_address();
    let mut alloc = alloc;
    let mut next = |parent: &mut [u64; 512], index: usize| -> Result<PhysAddr, UnmapError> {
        let raw = parent[index];
        if raw & V != 0 {
            if is_leaf(raw) {
                return Err(UnmapError::SizeMismatch);
            }
            return Ok(pte_phys(raw));
        }
        let Some(alloc) = alloc.as_mut() else {
            return Err(UnmapError::NotMapped);
        };
        let frame = alloc();
        let phys = frame.start_address();
        // SAFETY: `alloc` returns zeroed, unaliased frames per its contract.
        unsafe { table(phys).fill(0) };
        parent[index] = ((phys.as_u64() >> 12) << PPN_SHIFT) | V;
        Ok(phys)
    };

    let l2 = table(root);
    let l1_phys = next(l2, va.p3_index())?;
    let l1 = table(l1_phys);
    let l0_phys = next(l1, va.p2_index())?;
    let l0 = table(l0_phys);
    Ok(&mut l0[va.p1_index()])
}

/// Implements [`PageMapper`]/[`PageTranslator`]/[`RootTableOps`] for 4 KiB
/// pages over Sv39.
#[derive(Clone, Copy)]
pub struct Sv39Paging;

// SAFETY: entries are only ever written fully formed by `pt_entry`/
// `entry_flags`, mirroring the x86_64 walker's invariant.
unsafe impl PageMapper<Size4KiB> for Sv39Paging {
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
        if *entry & V != 0 {
            return Err(UnmapError::NotMapped);
        }
        *entry = ((frame.start_address().as_u64() >> 12) << PPN_SHIFT) | entry_flags(flags);
        Ok(MapFlush::new(page.start_address()))
    }

    unsafe fn unmap(
        &self,
        root: PhysAddr,
        page: Page<Size4KiB>,
    ) -> Result<(PhysFrame<Size4KiB>, MapFlush), UnmapError> {
        // SAFETY: forwarding caller's contract on `root`.
        let entry = unsafe { pt_entry(root, page, None)? };
        if *entry & V == 0 {
            return Err(UnmapError::NotMapped);
        }
        let frame = PhysFrame::containing_address(pte_phys(*entry));
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
        if *entry & V == 0 {
            return Err(UnmapError::NotMapped);
        }
        let ppn = *entry >> PPN_SHIFT;
        *entry = (ppn << PPN_SHIFT) | entry_flags(flags);
        Ok(MapFlush::new(page.start_address()))
    }
}

// SAFETY: walks the same table format `PageMapper` builds.
unsafe impl PageTranslator for Sv39Paging {
    unsafe fn translate_addr(&self, root: PhysAddr, virt: VirtAddr) -> Option<Translation> {
        let page = Page::containing_address(virt);
        // SAFETY: forwarding caller's contract on `root`; read-only walk.
        let entry = unsafe { pt_entry(root, page, None).ok()? };
        if *entry & V == 0 {
            return None;
        }
        let offset = virt.as_u64() & (Size4KiB::SIZE - 1);
        Some(Translation {
            phys: PhysAddr::new(pte_phys(*entry).as_u64() + offset),
            user: *entry & U != 0,
            writable: *entry & W != 0,
            executable: *entry & X != 0,
        })
    }
}

// SAFETY: same reasoning as the x86_64 `RootTableOps` impl, one level
// shallower (Sv39's top level stands in for PML4).
unsafe impl RootTableOps for Sv39Paging {
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
        for l2 in 0..256usize {
            let base = (l2 as u64) << 30;
            for l1 in 0..512usize {
                for l0 in 0..512usize {
                    let va = base | ((l1 as u64) << 21) | ((l0 as u64) << 12);
                    let page = Page::<Size4KiB>::containing_address(VirtAddr::new_canonical(va));
                    // SAFETY: forwarding caller's contract on `src`.
                    let Ok(entry) = (unsafe { pt_entry(src, page, None) }) else {
                        continue;
                    };
                    if *entry & V == 0 {
                        continue;
                    }
                    let flags = *entry & ((1 << PPN_SHIFT) - 1);
                    let src_phys = pte_phys(*entry);
                    let dst_frame = alloc.allocate_frame().ok_or(UnmapError::NotMapped)?;
                    // SAFETY: `dst_frame` is freshly allocated and unaliased.
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
                    *dst_entry = ((dst_frame.start_address().as_u64() >> 12) << PPN_SHIFT) | flags;
                }
            }
        }
        Ok(())
    }
}

/// Invalidates a single TLB entry. Registered via
/// [`corundum_mm::mapper::register_tlb_flush`] during boot.
pub fn flush_tlb(virt: VirtAddr) {
    // SAFETY: `sfence.vma` with a single address operand invalidates just
    // that page's translation.
    unsafe { core::arch::asm!("sfence.vma {}, zero", in(reg) virt.as_u64(), options(nostack)) };
}
