//! Per-process page tables.
//!
//! Each process owns an [`AddressSpace`] wrapping its own root page table
//! frame. The kernel half (entries above [`KERNEL_HALF_START`]) is shared
//! with every process; the user half is process-private. [`AddressSpace`]
//! exposes the range-oriented operations processes and syscalls need:
//! mapping fresh or caller-supplied physical memory, unmapping, remapping
//! with new permissions, forking into a child, activating on the current
//! core, and translating a user pointer before it is dereferenced.

use crate::addr::{PhysAddr, VirtAddr};
use crate::mapper::{MapFlags, PageMapper, PageTranslator, RootTableOps, Translation, UnmapError};
use crate::paging::{FrameAllocator as FrameAllocatorTrait, Page, PhysFrame, Size4KiB};
use crate::VmmError;

/// First virtual address belonging to the shared kernel half. Ranges
/// touching or exceeding this address are rejected by every user-facing
/// operation here.
pub const KERNEL_HALF_START: u64 = 0xFFFF_8000_0000_0000;

/// Callback for deallocating a single physical frame, stored at
/// construction time so `Drop` can free the root page table frame without
/// threading a `FrameDeallocator` parameter through every call site.
pub type FrameDeallocFn = fn(PhysFrame<Size4KiB>);

/// Refuses ranges that overlap the shared kernel half.
///
/// `addr` need not be page-aligned; `len == 0` is always mappable (an empty
/// range trivially doesn't overlap anything).
pub fn check_userland_mappability(addr: VirtAddr, len: u64) -> Result<(), VmmError> {
    if len == 0 {
        return Ok(());
    }
    let end = addr.as_u64().checked_add(len).ok_or(VmmError::KernelHalfOverlap)?;
    if end > KERNEL_HALF_START {
        return Err(VmmError::KernelHalfOverlap);
    }
    Ok(())
}

/// A user-mode address space backed by its own root page table frame.
pub struct AddressSpace<M: PageMapper<Size4KiB> + PageTranslator> {
    root_phys: PhysAddr,
    mapper: M,
    dealloc_fn: FrameDeallocFn,
}

impl<M: PageMapper<Size4KiB> + PageTranslator + RootTableOps + Clone> AddressSpace<M> {
    /// Creates a fresh address space with an empty user half and the kernel
    /// half copied from `kernel_root`.
    ///
    /// # Safety
    ///
    /// `kernel_root` must point to a valid, currently-active root page
    /// table, and `alloc` must return zeroed 4 KiB frames.
    pub unsafe fn new_user(
        kernel_root: PhysAddr,
        mapper: M,
        alloc: &mut impl FrameAllocatorTrait<Size4KiB>,
        dealloc_fn: FrameDeallocFn,
    ) -> Result<Self, VmmError> {
        let frame = alloc.allocate_frame().ok_or(VmmError::OutOfMemory)?;
        // SAFETY: the mapper owns architecture-specific knowledge of how to
        // seed a root table's kernel half from another; `kernel_root` and
        // the fresh frame are both valid per this function's contract.
        unsafe { mapper.clone_kernel_half(kernel_root, frame.start_address()) };
        Ok(Self {
            root_phys: frame.start_address(),
            mapper,
            dealloc_fn,
        })
    }

    /// `Fork_Table`: produces a new address space sharing the kernel half
    /// and eagerly cloning every user mapping (see the crate-level design
    /// notes on the copy-on-write vs. eager-copy tradeoff this kernel
    /// resolved in favor of eager copy).
    ///
    /// # Safety
    ///
    /// `alloc` must return zeroed 4 KiB frames; the source address space
    /// must not be concurrently mutated by another thread during the fork.
    pub unsafe fn fork_table(
        &self,
        alloc: &mut impl FrameAllocatorTrait<Size4KiB>,
    ) -> Result<Self, VmmError> {
        let frame = alloc.allocate_frame().ok_or(VmmError::OutOfMemory)?;
        // SAFETY: `self.root_phys` is a valid, owned root table; `frame` is
        // fresh and zeroed.
        unsafe { self.mapper.clone_kernel_half(self.root_phys, frame.start_address()) };

        let child = Self {
            root_phys: frame.start_address(),
            mapper: self.mapper.clone(),
            dealloc_fn: self.dealloc_fn,
        };

        // SAFETY: both tables are valid and owned for the duration of this
        // call; `alloc` provides fresh frames for the child's copies.
        unsafe {
            self.mapper
                .clone_user_half(self.root_phys, child.root_phys, alloc)
                .map_err(|_| VmmError::OutOfMemory)?;
        }

        Ok(child)
    }
}

impl<M: PageMapper<Size4KiB> + PageTranslator> AddressSpace<M> {
    /// `Map_Allocated_Range`: maps `len` bytes starting at `addr`, backing
    /// each page with a freshly allocated physical frame.
    pub fn map_allocated_range(
        &self,
        addr: VirtAddr,
        len: u64,
        flags: MapFlags,
        alloc: &mut impl FrameAllocatorTrait<Size4KiB>,
    ) -> Result<(), VmmError> {
        check_userland_mappability(addr, len)?;
        let start = addr.align_down_4k();
        let misalignment = addr.as_u64() - start.as_u64();
        let page_count = (len + misalignment).div_ceil(4096);
        for i in 0..page_count.max(1) {
            let page = Page::<Size4KiB>::containing_address(VirtAddr::new(
                start.as_u64() + i * 4096,
            ));
            let frame = alloc.allocate_frame().ok_or(VmmError::OutOfMemory)?;
            self.map_one(page, frame, flags, alloc)?;
        }
        Ok(())
    }

    /// `Map_Range`: maps `len` bytes starting at `addr` to the physical
    /// extent starting at `phys`, both addresses assumed page-aligned.
    pub fn map_range(
        &self,
        addr: VirtAddr,
        phys: PhysAddr,
        len: u64,
        flags: MapFlags,
        alloc: &mut impl FrameAllocatorTrait<Size4KiB>,
    ) -> Result<(), VmmError> {
        check_userland_mappability(addr, len)?;
        let page_count = len.div_ceil(4096);
        for i in 0..page_count {
            let page = Page::<Size4KiB>::containing_address(VirtAddr::new(
                addr.as_u64() + i * 4096,
            ));
            let frame =
                PhysFrame::<Size4KiB>::containing_address(PhysAddr::new(phys.as_u64() + i * 4096));
            self.map_one(page, frame, flags, alloc)?;
        }
        Ok(())
    }

    fn map_one(
        &self,
        page: Page<Size4KiB>,
        frame: PhysFrame<Size4KiB>,
        flags: MapFlags,
        alloc: &mut impl FrameAllocatorTrait<Size4KiB>,
    ) -> Result<(), VmmError> {
        let flags = flags | MapFlags::USER;
        // SAFETY: `self.root_phys` is a valid, owned root table; `alloc`
        // supplies zeroed intermediate table frames on demand.
        let flush = unsafe {
            self.mapper
                .map(self.root_phys, page, frame, flags, &mut || {
                    alloc.allocate_frame().expect("out of memory mapping intermediate table")
                })
                .map_err(|e| match e {
                    UnmapError::NotMapped => VmmError::NotMapped,
                    UnmapError::SizeMismatch => VmmError::SizeMismatch,
                })?
        };
        flush.flush();
        Ok(())
    }

    /// `Unmap_Range`: unmaps `len` bytes starting at `addr` and returns the
    /// freed frames through `dealloc`.
    pub fn unmap_range(
        &self,
        addr: VirtAddr,
        len: u64,
        dealloc: &mut impl FnMut(PhysFrame<Size4KiB>),
    ) -> Result<(), VmmError> {
        check_userland_mappability(addr, len)?;
        let page_count = len.div_ceil(4096);
        for i in 0..page_count {
            let page = Page::<Size4KiB>::containing_address(VirtAddr::new(
                addr.as_u64() + i * 4096,
            ));
            // SAFETY: `self.root_phys` is a valid, owned root table.
            let (frame, flush) = unsafe {
                self.mapper.unmap(self.root_phys, page).map_err(|e| match e {
                    UnmapError::NotMapped => VmmError::NotMapped,
                    UnmapError::SizeMismatch => VmmError::SizeMismatch,
                })?
            };
            flush.flush();
            dealloc(frame);
        }
        Ok(())
    }

    /// `Remap_Range`: updates the access flags of an already-mapped range,
    /// used by `mprotect`. Returns [`VmmError::WouldFault`] if any page in
    /// the range is not currently mapped.
    pub fn remap_range(&self, addr: VirtAddr, len: u64, flags: MapFlags) -> Result<(), VmmError> {
        check_userland_mappability(addr, len)?;
        let flags = flags | MapFlags::USER;
        let page_count = len.div_ceil(4096);
        for i in 0..page_count {
            let page = Page::<Size4KiB>::containing_address(VirtAddr::new(
                addr.as_u64() + i * 4096,
            ));
            // SAFETY: `self.root_phys` is a valid, owned root table.
            let flush = unsafe {
                self.mapper
                    .update_flags(self.root_phys, page, flags)
                    .map_err(|e| match e {
                        UnmapError::NotMapped => VmmError::WouldFault,
                        UnmapError::SizeMismatch => VmmError::SizeMismatch,
                    })?
            };
            flush.flush();
        }
        Ok(())
    }

    /// `Make_Active`: returns the physical address to load into the
    /// architecture's page table base register (`CR3` on x86_64, `satp` on
    /// riscv64). Loading it is the caller's responsibility, since only the
    /// kernel binary knows the current architecture's register and ASID
    /// conventions.
    pub fn make_active(&self) -> PhysAddr {
        self.root_phys
    }

    /// `Translate_Address`: resolves a user virtual address to its physical
    /// address and access rights. This is the single gate userland pointers
    /// pass through before dereference.
    pub fn translate_address(&self, virt: VirtAddr) -> Option<Translation> {
        // SAFETY: `self.root_phys` is a valid, owned root table.
        unsafe { self.mapper.translate_addr(self.root_phys, virt) }
    }

    /// Tests whether `[addr, addr+len)` is entirely mapped, user-accessible,
    /// and satisfies every bit in `required`.
    pub fn is_user_accessible(&self, addr: VirtAddr, len: u64, required: MapFlags) -> bool {
        if check_userland_mappability(addr, len).is_err() {
            return false;
        }
        if len == 0 {
            return true;
        }
        let start = addr.align_down_4k().as_u64();
        let end = addr.as_u64() + len;
        let mut page_addr = start;
        while page_addr < end {
            let Some(translation) = self.translate_address(VirtAddr::new(page_addr)) else {
                return false;
            };
            if !translation.user {
                return false;
            }
            if required.contains(MapFlags::WRITABLE) && !translation.writable {
                return false;
            }
            if required.contains(MapFlags::EXECUTABLE) && !translation.executable {
                return false;
            }
            page_addr += 4096;
        }
        true
    }

    /// Returns the physical address of this address space's root table.
    pub fn root_phys(&self) -> PhysAddr {
        self.root_phys
    }
}

/// `Destroy_Table`: consumes the address space, freeing its root table
/// frame. Implemented as `Drop` so every code path (including early-return
/// error handling) frees the table exactly once.
impl<M: PageMapper<Size4KiB> + PageTranslator> Drop for AddressSpace<M> {
    fn drop(&mut self) {
        let frame = PhysFrame::containing_address(self.root_phys);
        (self.dealloc_fn)(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_userland_mappability_accepts_low_range() {
        assert!(check_userland_mappability(VirtAddr::new(0x1000), 0x1000).is_ok());
    }

    #[test]
    fn check_userland_mappability_rejects_kernel_half() {
        let addr = VirtAddr::new(KERNEL_HALF_START - 0x1000);
        assert_eq!(
            check_userland_mappability(addr, 0x2000),
            Err(VmmError::KernelHalfOverlap)
        );
    }

    #[test]
    fn check_userland_mappability_rejects_overflowing_len() {
        let addr = VirtAddr::new(u64::MAX - 10);
        assert_eq!(check_userland_mappability(addr, 100), Err(VmmError::KernelHalfOverlap));
    }

    #[test]
    fn check_userland_mappability_empty_range_always_ok() {
        assert!(check_userland_mappability(VirtAddr::new(KERNEL_HALF_START), 0).is_ok());
    }

    #[test]
    fn mapflags_user_always_implied() {
        // map_one always ORs in MapFlags::USER; verified at the flags level
        // since exercising the full mapper requires an architecture backend.
        let flags = MapFlags::WRITABLE | MapFlags::USER;
        assert!(flags.contains(MapFlags::USER));
    }
}
