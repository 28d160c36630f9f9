//! Address space management: `mmap`, `munmap`, `mprotect`.

use corundum_mm::addr::VirtAddr;
use corundum_mm::mapper::MapFlags as ArchMapFlags;
use corundum_mm::pmm::BitmapFrameAllocRef;
use corundum_mm::VmmError;
use corundum_syscall::flags::{MapFlags, Prot};
use corundum_syscall::numbers::memory as nr;
use corundum_syscall::Errno;

/// Maps a failed `address_space` call to an errno, preserving the
/// distinction between "bad argument" and "range not (fully) mapped" that
/// `mprotect` callers rely on.
fn vmm_err_to_errno(e: VmmError) -> Errno {
    match e {
        VmmError::OutOfMemory => Errno::NoMemory,
        VmmError::WouldFault => Errno::WouldFault,
        VmmError::NotMapped | VmmError::AlreadyMapped | VmmError::SizeMismatch | VmmError::KernelHalfOverlap => {
            Errno::InvalidValue
        }
    }
}

pub(super) fn dispatch(op: u32, a0: u64, a1: u64, a2: u64, a3: u64, _a4: u64) -> Result<u64, Errno> {
    match op {
        nr::MMAP => mmap(a0, a1, a2 as u32, a3 as u32),
        nr::MUNMAP => munmap(a0, a1),
        nr::MPROTECT => mprotect(a0, a1, a2 as u32),
        _ => Err(Errno::NotImplemented),
    }
}

fn prot_to_arch(prot: Prot) -> ArchMapFlags {
    let mut flags = ArchMapFlags::empty();
    if prot.contains(Prot::WRITE) {
        flags |= ArchMapFlags::WRITABLE;
    }
    if prot.contains(Prot::EXEC) {
        flags |= ArchMapFlags::EXECUTABLE;
    }
    flags
}

fn mmap(addr_hint: u64, length: u64, raw_prot: u32, raw_flags: u32) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    if length == 0 {
        return Err(Errno::InvalidValue);
    }
    let prot = Prot::from_bits_truncate(raw_prot);
    let flags = MapFlags::from_bits_truncate(raw_flags);
    if !flags.contains(MapFlags::ANONYMOUS) {
        // File-backed mappings would need a page-cache layer this kernel
        // doesn't have yet.
        return Err(Errno::NotImplemented);
    }

    let addr = VirtAddr::new(addr_hint);
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            corundum_mm::pmm::with(|pmm| {
                let mut alloc = BitmapFrameAllocRef(pmm);
                p.address_space()
                    .map_allocated_range(addr, length, prot_to_arch(prot), &mut alloc)
            })
            .map_err(vmm_err_to_errno)
        })
    })
    .map_err(Errno::from)??;

    Ok(addr_hint)
}

fn munmap(addr: u64, length: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            corundum_mm::pmm::with(|pmm| {
                p.address_space().unmap_range(VirtAddr::new(addr), length, &mut |frame| {
                    // SAFETY: `frame` was just unmapped by this same call and
                    // is not referenced anywhere else.
                    let _ = unsafe { pmm.deallocate_frame(frame) };
                })
            })
            .map_err(|_| Errno::InvalidValue)
        })
    })
    .map_err(Errno::from)??;
    Ok(0)
}

fn mprotect(addr: u64, length: u64, raw_prot: u32) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let prot = Prot::from_bits_truncate(raw_prot);
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            p.address_space()
                .remap_range(VirtAddr::new(addr), length, prot_to_arch(prot))
                .map_err(vmm_err_to_errno)
        })
    })
    .map_err(Errno::from)??;
    Ok(0)
}
