//! Bitmap-based physical frame allocator.
//!
//! Each bit represents one 4 KiB frame; 1 means allocated or reserved, 0
//! means free. Word-level scanning with `trailing_zeros()` (TZCNT/BSF on
//! x86_64, equivalent on riscv64) keeps allocation close to O(1) amortized.

use corundum_core::sync::BinarySemaphore;

use crate::addr::PhysAddr;
use crate::paging::{FrameAllocator, FrameDeallocator, PhysFrame, Size4KiB};
use crate::{PhysMemoryRegion, PmmError};

const FRAME_SIZE: u64 = 4096;
const BITS_PER_WORD: usize = 64;

/// Poison pattern written to freed pages: `0xDEAD_DEAD` repeated.
const PAGE_POISON_PATTERN: u32 = 0xDEAD_DEAD;

/// Writes the poison pattern across a 4 KiB page via the direct map.
fn poison_page(phys_addr: u64, direct_map_offset: u64) {
    let virt = (direct_map_offset + phys_addr) as *mut u32;
    for i in 0..(FRAME_SIZE as usize / 4) {
        // SAFETY: the virtual address is within the direct map and the page
        // has just been freed, so nothing else is reading or writing it.
        unsafe { virt.add(i).write_volatile(PAGE_POISON_PATTERN) };
    }
}

/// Checks whether a previously poisoned page is still intact.
///
/// Returns `true` if the page was never poisoned (first word doesn't match,
/// e.g. first allocation after boot) or if the full poison pattern is
/// intact. Returns `false` only when partial corruption is detected,
/// indicating a use-after-free between the free and this allocation.
fn check_page_poison(phys_addr: u64, direct_map_offset: u64) -> bool {
    let virt = (direct_map_offset + phys_addr) as *const u32;
    // SAFETY: the virtual address is within the direct map.
    if unsafe { virt.read_volatile() } != PAGE_POISON_PATTERN {
        return true;
    }
    for i in 1..(FRAME_SIZE as usize / 4) {
        // SAFETY: the virtual address is within the direct map.
        if unsafe { virt.add(i).read_volatile() } != PAGE_POISON_PATTERN {
            return false;
        }
    }
    true
}

/// A bitmap-based physical frame allocator.
pub struct BitmapAllocator {
    bitmap: &'static mut [u64],
    total_frames: usize,
    free_count: usize,
    search_hint: usize,
    direct_map_offset: u64,
    poison_on_free: bool,
}

impl BitmapAllocator {
    /// Creates a new bitmap allocator from a slice of physical memory
    /// regions.
    ///
    /// `poison_on_free` enables the use-after-free check; it costs a full
    /// page write on every free plus a full page read on every allocation,
    /// so production boots may want it off and debug boots on.
    ///
    /// # Safety
    ///
    /// - `direct_map_offset` must be the correct direct-map offset.
    /// - `regions` must accurately describe physical memory, with no
    ///   overlapping usable ranges.
    /// - This must be called exactly once during boot, before any other
    ///   code touches the memory it describes as usable.
    pub unsafe fn new(
        regions: &[PhysMemoryRegion],
        direct_map_offset: u64,
        poison_on_free: bool,
    ) -> Result<Self, PmmError> {
        let max_phys = regions
            .iter()
            .filter(|r| r.usable)
            .map(|r| r.start.as_u64() + r.size)
            .max()
            .unwrap_or(0);

        if max_phys == 0 {
            return Err(PmmError::OutOfMemory);
        }

        let total_frames = (max_phys / FRAME_SIZE) as usize;
        let bitmap_words = total_frames.div_ceil(BITS_PER_WORD);
        let bitmap_bytes = bitmap_words * 8;
        let bitmap_frame_count = (bitmap_bytes as u64).div_ceil(FRAME_SIZE);

        let bitmap_phys_start = regions
            .iter()
            .filter(|r| r.usable && r.size >= bitmap_bytes as u64)
            .map(|r| r.start)
            .next()
            .ok_or(PmmError::NoBitmapRegion)?;

        // SAFETY: direct_map_offset is valid, bitmap_phys_start points to a
        // usable region large enough for bitmap_words * 8 bytes, and we are
        // the sole consumer of this memory during boot.
        let bitmap = unsafe {
            let ptr = (direct_map_offset + bitmap_phys_start.as_u64()) as *mut u64;
            core::slice::from_raw_parts_mut(ptr, bitmap_words)
        };

        bitmap.fill(u64::MAX);

        let mut free_count = 0usize;
        for region in regions.iter().filter(|r| r.usable) {
            let region_start_frame = (region.start.as_u64() / FRAME_SIZE) as usize;
            let region_frame_count = (region.size / FRAME_SIZE) as usize;
            for i in 0..region_frame_count {
                let frame_idx = region_start_frame + i;
                if frame_idx < total_frames {
                    let word_idx = frame_idx / BITS_PER_WORD;
                    let bit_idx = frame_idx % BITS_PER_WORD;
                    bitmap[word_idx] &= !(1u64 << bit_idx);
                    free_count += 1;
                }
            }
        }

        let bitmap_start_frame = (bitmap_phys_start.as_u64() / FRAME_SIZE) as usize;
        for i in 0..bitmap_frame_count as usize {
            let frame_idx = bitmap_start_frame + i;
            if frame_idx < total_frames {
                let word_idx = frame_idx / BITS_PER_WORD;
                let bit_idx = frame_idx % BITS_PER_WORD;
                if bitmap[word_idx] & (1u64 << bit_idx) == 0 {
                    bitmap[word_idx] |= 1u64 << bit_idx;
                    free_count -= 1;
                }
            }
        }

        Ok(Self {
            bitmap,
            total_frames,
            free_count,
            search_hint: 0,
            direct_map_offset,
            poison_on_free,
        })
    }

    /// Allocates a single 4 KiB physical frame.
    pub fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        if self.free_count == 0 {
            return None;
        }

        let start = self.search_hint;
        let words = self.bitmap.len();

        for offset in 0..words {
            let word_idx = (start + offset) % words;
            let word = self.bitmap[word_idx];
            if word == u64::MAX {
                continue;
            }

            let bit_idx = (!word).trailing_zeros() as usize;
            let frame_idx = word_idx * BITS_PER_WORD + bit_idx;
            if frame_idx >= self.total_frames {
                continue;
            }

            self.bitmap[word_idx] |= 1u64 << bit_idx;
            self.free_count -= 1;
            self.search_hint = word_idx;

            let phys_addr = frame_idx as u64 * FRAME_SIZE;

            if self.poison_on_free && !check_page_poison(phys_addr, self.direct_map_offset) {
                panic!("pmm: page at {phys_addr:#x} modified after free (use-after-free)");
            }

            return Some(PhysFrame::containing_address(PhysAddr::new(phys_addr)));
        }

        None
    }

    /// Allocates `count` contiguous 4 KiB physical frames, returning the
    /// first frame of the run.
    pub fn allocate_frames(&mut self, count: usize) -> Option<PhysFrame<Size4KiB>> {
        if count == 0 {
            return None;
        }
        if count == 1 {
            return self.allocate_frame();
        }
        if self.free_count < count {
            return None;
        }

        let mut run_start = 0usize;
        let mut run_len = 0usize;
        let mut frame_idx = 0usize;

        while frame_idx < self.total_frames {
            let word_idx = frame_idx / BITS_PER_WORD;
            let word = self.bitmap[word_idx];

            if word == u64::MAX {
                run_len = 0;
                frame_idx = (word_idx + 1) * BITS_PER_WORD;
                run_start = frame_idx;
                continue;
            }

            if word == 0 {
                let extend =
                    core::cmp::min(BITS_PER_WORD, self.total_frames - word_idx * BITS_PER_WORD);
                if run_len == 0 {
                    run_start = word_idx * BITS_PER_WORD;
                }
                run_len += extend;
                if run_len >= count {
                    break;
                }
                frame_idx = (word_idx + 1) * BITS_PER_WORD;
                continue;
            }

            let bit_start = frame_idx % BITS_PER_WORD;
            for bit in bit_start..BITS_PER_WORD {
                let fi = word_idx * BITS_PER_WORD + bit;
                if fi >= self.total_frames {
                    break;
                }
                if word & (1u64 << bit) != 0 {
                    run_len = 0;
                    run_start = fi + 1;
                } else {
                    if run_len == 0 {
                        run_start = fi;
                    }
                    run_len += 1;
                    if run_len >= count {
                        break;
                    }
                }
            }

            if run_len >= count {
                break;
            }
            frame_idx = (word_idx + 1) * BITS_PER_WORD;
        }

        if run_len < count {
            return None;
        }

        for i in 0..count {
            let fi = run_start + i;
            let word_idx = fi / BITS_PER_WORD;
            let bit_idx = fi % BITS_PER_WORD;
            self.bitmap[word_idx] |= 1u64 << bit_idx;

            if self.poison_on_free {
                let phys_addr = (fi as u64) * FRAME_SIZE;
                if !check_page_poison(phys_addr, self.direct_map_offset) {
                    panic!("pmm: page at {phys_addr:#x} modified after free (use-after-free)");
                }
            }
        }
        self.free_count -= count;
        self.search_hint = (run_start + count) / BITS_PER_WORD;

        let phys = PhysAddr::new(run_start as u64 * FRAME_SIZE);
        Some(PhysFrame::containing_address(phys))
    }

    /// Deallocates a single 4 KiB physical frame.
    ///
    /// # Safety
    ///
    /// The frame must have been allocated by this allocator and must not
    /// currently be referenced by any mapping.
    pub unsafe fn deallocate_frame(&mut self, frame: PhysFrame<Size4KiB>) -> Result<(), PmmError> {
        let frame_idx = (frame.start_address().as_u64() / FRAME_SIZE) as usize;
        if frame_idx >= self.total_frames {
            return Err(PmmError::InvalidFrame);
        }

        let word_idx = frame_idx / BITS_PER_WORD;
        let bit_idx = frame_idx % BITS_PER_WORD;

        debug_assert!(
            self.bitmap[word_idx] & (1u64 << bit_idx) != 0,
            "double free of frame {:#x}",
            frame.start_address().as_u64()
        );
        self.bitmap[word_idx] &= !(1u64 << bit_idx);
        self.free_count += 1;

        if self.poison_on_free {
            poison_page(frame.start_address().as_u64(), self.direct_map_offset);
        }

        if word_idx < self.search_hint {
            self.search_hint = word_idx;
        }

        Ok(())
    }

    /// Returns the number of free frames.
    pub fn free_frames(&self) -> usize {
        self.free_count
    }

    /// Returns the total number of tracked frames.
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }
}

/// Wrapper that implements [`FrameAllocator`]/[`FrameDeallocator`] by
/// forwarding to a borrowed `BitmapAllocator`.
pub struct BitmapFrameAllocRef<'a>(pub &'a mut BitmapAllocator);

// SAFETY: forwards to `BitmapAllocator`, which never returns an aliased
// frame.
unsafe impl FrameAllocator<Size4KiB> for BitmapFrameAllocRef<'_> {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        self.0.allocate_frame()
    }
}

// SAFETY: forwards to `BitmapAllocator::deallocate_frame`, whose safety
// contract matches this trait's.
unsafe impl FrameDeallocator<Size4KiB> for BitmapFrameAllocRef<'_> {
    unsafe fn deallocate_frame(&mut self, frame: PhysFrame<Size4KiB>) {
        let _ = unsafe { self.0.deallocate_frame(frame) };
    }
}

/// Global physical memory manager, initialized once during boot.
static PMM: BinarySemaphore<Option<BitmapAllocator>> = BinarySemaphore::new(None);

/// Initializes the global PMM from a slice of physical memory regions.
///
/// # Panics
///
/// Panics if the PMM was already initialized, or if `regions` contains no
/// usable memory.
pub fn init(regions: &[PhysMemoryRegion], direct_map_offset: u64, poison_on_free: bool) {
    // SAFETY: called once during boot per this function's documented
    // contract, before any other code can observe the described memory.
    let allocator = unsafe {
        BitmapAllocator::new(regions, direct_map_offset, poison_on_free)
            .expect("failed to initialize PMM")
    };

    let mut pmm = PMM.seize();
    assert!(pmm.is_none(), "PMM already initialized");
    *pmm = Some(allocator);
}

/// Executes a closure with exclusive access to the global PMM.
///
/// # Panics
///
/// Panics if the PMM has not been initialized.
pub fn with<R>(f: impl FnOnce(&mut BitmapAllocator) -> R) -> R {
    let mut pmm = PMM.seize();
    f(pmm.as_mut().expect("PMM not initialized"))
}

/// Frees a single frame back to the global PMM. Matches
/// [`crate::address_space::FrameDeallocFn`]'s signature, so it plugs
/// directly into [`crate::address_space::AddressSpace::new_user`] as the
/// function a root table's `Drop` calls to release its frame.
///
/// # Panics
///
/// Panics if the PMM has not been initialized, or if `frame` was never
/// allocated from it.
pub fn free_frame(frame: PhysFrame<Size4KiB>) {
    with(|pmm| unsafe { pmm.deallocate_frame(frame) }).expect("freeing an unallocated frame");
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::alloc::Layout;

    const PAGE_SIZE: usize = FRAME_SIZE as usize;

    fn alloc_page() -> *mut u8 {
        let layout = Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).unwrap();
        // SAFETY: layout is valid and non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        ptr
    }

    unsafe fn free_page(ptr: *mut u8) {
        let layout = Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).unwrap();
        unsafe { std::alloc::dealloc(ptr, layout) };
    }

    #[test]
    fn poison_page_writes_pattern() {
        let buf = alloc_page();
        poison_page(0, buf as u64);
        let words = unsafe { core::slice::from_raw_parts(buf as *const u32, PAGE_SIZE / 4) };
        assert!(words.iter().all(|&w| w == PAGE_POISON_PATTERN));
        unsafe { free_page(buf) };
    }

    #[test]
    fn check_page_poison_intact() {
        let buf = alloc_page();
        poison_page(0, buf as u64);
        assert!(check_page_poison(0, buf as u64));
        unsafe { free_page(buf) };
    }

    #[test]
    fn check_page_poison_never_poisoned() {
        let buf = alloc_page();
        assert!(check_page_poison(0, buf as u64));
        unsafe { free_page(buf) };
    }

    #[test]
    fn check_page_poison_partial_corruption() {
        let buf = alloc_page();
        poison_page(0, buf as u64);
        let words = buf as *mut u32;
        unsafe { words.add(512).write_volatile(0x0) };
        assert!(!check_page_poison(0, buf as u64));
        unsafe { free_page(buf) };
    }

    fn single_region(size: u64) -> [PhysMemoryRegion; 1] {
        [PhysMemoryRegion {
            start: PhysAddr::new(0),
            size,
            usable: true,
        }]
    }

    #[test]
    fn allocate_and_deallocate_frame_roundtrip() {
        let region = single_region(16 * 1024 * 1024);
        let direct_map = alloc_page() as u64;
        // SAFETY: test-local region, single-threaded.
        let mut allocator = unsafe { BitmapAllocator::new(&region, direct_map, false).unwrap() };
        let before = allocator.free_frames();
        let frame = allocator.allocate_frame().expect("frame available");
        assert_eq!(allocator.free_frames(), before - 1);
        // SAFETY: frame was just allocated by this allocator and is unused.
        unsafe { allocator.deallocate_frame(frame).unwrap() };
        assert_eq!(allocator.free_frames(), before);
        unsafe { free_page(direct_map as *mut u8) };
    }

    #[test]
    fn allocate_frames_returns_contiguous_run() {
        let region = single_region(16 * 1024 * 1024);
        let direct_map = alloc_page() as u64;
        // SAFETY: test-local region, single-threaded.
        let mut allocator = unsafe { BitmapAllocator::new(&region, direct_map, false).unwrap() };
        let first = allocator.allocate_frames(4).expect("4 contiguous frames");
        let individually = allocator.allocate_frame().expect("another frame");
        assert_eq!(
            individually.start_address().as_u64(),
            first.start_address().as_u64() + 4 * FRAME_SIZE
        );
        unsafe { free_page(direct_map as *mut u8) };
    }

    #[test]
    fn out_of_memory_when_regions_empty() {
        let regions: [PhysMemoryRegion; 0] = [];
        // SAFETY: no memory is ever touched on this error path.
        let result = unsafe { BitmapAllocator::new(&regions, 0, false) };
        assert_eq!(result.unwrap_err(), PmmError::OutOfMemory);
    }
}
