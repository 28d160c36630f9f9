//! Architecture-independent page mapping interface.
//!
//! Provides [`MapFlags`], [`MapFlush`], [`PageMapper`], and [`PageTranslator`]
//! so that higher-level code (the per-process [`crate::address_space`]) can
//! manipulate page tables without knowing the underlying architecture. The
//! kernel binary supplies one implementation per architecture (x86_64 4-level
//! paging, riscv64 Sv39/Sv48).
//!
//! # TLB flush decoupling
//!
//! Architecture-specific TLB invalidation is registered at boot via
//! [`register_tlb_flush`]. Before registration, flushes are no-ops (safe for
//! early boot, before any stale TLB entry could exist). Host tests use the
//! no-op default throughout.

use core::sync::atomic::{AtomicPtr, Ordering};

use crate::addr::{PhysAddr, VirtAddr};
use crate::paging::{FrameAllocator, Page, PageSize, PhysFrame, Size4KiB};

bitflags::bitflags! {
    /// Architecture-independent page mapping flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u64 {
        /// Page is writable.
        const WRITABLE      = 1 << 0;
        /// Page is executable (if unset, no-execute is implied).
        const EXECUTABLE    = 1 << 1;
        /// Page is accessible from user mode.
        const USER          = 1 << 2;
        /// Global page (not flushed on address-space switch).
        const GLOBAL        = 1 << 3;
        /// Caching disabled for this page.
        const CACHE_DISABLE = 1 << 4;
    }
}

/// Error from unmap / update_flags / translate operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmapError {
    /// The page is not mapped.
    NotMapped,
    /// The entry maps a different page size than requested.
    SizeMismatch,
}

static TLB_FLUSH_FN: AtomicPtr<()> = AtomicPtr::new(nop_flush as fn(VirtAddr) as *mut ());

fn nop_flush(_virt: VirtAddr) {}

/// Registers the architecture-specific TLB flush function.
///
/// Must be called during early boot before any page table modification that
/// needs TLB invalidation. On x86_64 this is `invlpg`; on riscv64, `sfence.vma`.
pub fn register_tlb_flush(f: fn(VirtAddr)) {
    TLB_FLUSH_FN.store(f as *mut (), Ordering::Release);
}

#[inline]
fn arch_flush_page(virt: VirtAddr) {
    let ptr = TLB_FLUSH_FN.load(Ordering::Acquire);
    // SAFETY: the pointer was stored via `register_tlb_flush`, which takes
    // a valid `fn(VirtAddr)`, or is the initial `nop_flush`.
    let f: fn(VirtAddr) = unsafe { core::mem::transmute(ptr) };
    f(virt);
}

/// A pending TLB flush for a single page.
///
/// Created by page table modification operations. Flushes the TLB entry on
/// drop unless [`.flush()`](Self::flush) or [`.ignore()`](Self::ignore) is
/// called first.
#[must_use = "TLB flush is pending; call .flush() or .ignore()"]
pub struct MapFlush {
    virt: VirtAddr,
    needs_flush: bool,
}

impl MapFlush {
    /// Creates a new pending flush for the given virtual address.
    pub fn new(virt: VirtAddr) -> Self {
        Self {
            virt,
            needs_flush: true,
        }
    }

    /// Flushes the TLB entry immediately.
    pub fn flush(mut self) {
        self.needs_flush = false;
        arch_flush_page(self.virt);
    }

    /// Opts out of flushing (e.g. a fresh mapping not yet resident in the
    /// TLB, or a caller batching flushes itself).
    pub fn ignore(mut self) {
        self.needs_flush = false;
    }
}

impl Drop for MapFlush {
    fn drop(&mut self) {
        if self.needs_flush {
            arch_flush_page(self.virt);
        }
    }
}

/// Architecture-independent page table mapping interface, generic over page
/// size.
///
/// # Safety
///
/// Implementations must correctly manipulate hardware page tables for the
/// given page size and must never leave a partially-constructed entry
/// observable to translation.
pub unsafe trait PageMapper<S: PageSize> {
    /// Maps a virtual page to a physical frame with the given flags.
    ///
    /// Allocates intermediate page table frames (always 4 KiB) as needed via
    /// `alloc`.
    ///
    /// # Safety
    ///
    /// `root` must point to a valid root page table and `alloc` must return
    /// zeroed 4 KiB frames not aliased by any other live mapping.
    unsafe fn map(
        &self,
        root: PhysAddr,
        page: Page<S>,
        frame: PhysFrame<S>,
        flags: MapFlags,
        alloc: &mut dyn FnMut() -> PhysFrame<Size4KiB>,
    ) -> Result<MapFlush, UnmapError>;

    /// Unmaps a page, returning the physical frame that was mapped and a
    /// pending TLB flush.
    ///
    /// # Safety
    ///
    /// `root` must point to a valid root page table.
    unsafe fn unmap(
        &self,
        root: PhysAddr,
        page: Page<S>,
    ) -> Result<(PhysFrame<S>, MapFlush), UnmapError>;

    /// Updates the flags of an already-mapped page.
    ///
    /// # Safety
    ///
    /// `root` must point to a valid root page table.
    unsafe fn update_flags(
        &self,
        root: PhysAddr,
        page: Page<S>,
        flags: MapFlags,
    ) -> Result<MapFlush, UnmapError>;
}

/// Architecture-independent virtual address translation.
///
/// Kept separate from [`PageMapper`] because translation is page-size
/// agnostic: the implementation walks the table and reports whatever size
/// it finds mapped.
///
/// # Safety
///
/// Implementations must correctly walk hardware page tables.
pub unsafe trait PageTranslator {
    /// Translates a virtual address, reporting the physical address and the
    /// mapping's access rights.
    ///
    /// Returns `None` if the address is not mapped.
    ///
    /// # Safety
    ///
    /// `root` must point to a valid root page table.
    unsafe fn translate_addr(&self, root: PhysAddr, virt: VirtAddr) -> Option<Translation>;
}

/// Whole-table operations needed to seed a fresh root page table and to
/// fork one, kept separate from [`PageMapper`] because they operate on the
/// root frame itself rather than on a single page.
///
/// # Safety
///
/// Implementations must correctly copy page table entries at the
/// architecture's root table granularity (PML4 on x86_64, the top-level
/// Sv48 table on riscv64) without aliasing live frames.
pub unsafe trait RootTableOps {
    /// Copies the shared kernel half of `src` into `dst`, leaving `dst`'s
    /// user half zeroed. Used when seeding a fresh root table.
    ///
    /// # Safety
    ///
    /// `src` must be a valid, currently-valid root table; `dst` must be a
    /// fresh, zeroed frame not referenced by any other table.
    unsafe fn clone_kernel_half(&self, src: PhysAddr, dst: PhysAddr);

    /// Clones every user-half mapping from `src` into `dst`, allocating
    /// fresh physical frames via `alloc` for each user page's backing
    /// store (an eager copy, not copy-on-write).
    ///
    /// # Safety
    ///
    /// `src` and `dst` must both be valid root tables; `dst`'s kernel half
    /// must already have been seeded via [`clone_kernel_half`].
    unsafe fn clone_user_half(
        &self,
        src: PhysAddr,
        dst: PhysAddr,
        alloc: &mut dyn FrameAllocator<Size4KiB>,
    ) -> Result<(), UnmapError>;
}

/// Result of [`PageTranslator::translate_addr`]: matches the `(phys,
/// mapped?, user?, R, W, X)` tuple userland pointer validation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    /// Physical address the virtual address maps to.
    pub phys: PhysAddr,
    /// Whether the mapping is accessible from user mode.
    pub user: bool,
    /// Whether the mapping is writable.
    pub writable: bool,
    /// Whether the mapping is executable.
    pub executable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapflags_default_empty() {
        let flags = MapFlags::empty();
        assert!(flags.is_empty());
        assert_eq!(flags.bits(), 0);
    }

    #[test]
    fn mapflags_combination() {
        let flags = MapFlags::WRITABLE | MapFlags::USER;
        assert!(flags.contains(MapFlags::WRITABLE));
        assert!(flags.contains(MapFlags::USER));
        assert!(!flags.contains(MapFlags::EXECUTABLE));
    }

    #[test]
    fn unmap_error_variants_distinct() {
        assert_ne!(UnmapError::NotMapped, UnmapError::SizeMismatch);
    }

    #[test]
    fn map_flush_ignore_suppresses_flush() {
        let flush = MapFlush::new(VirtAddr::new(0x1000));
        flush.ignore();
    }
}
