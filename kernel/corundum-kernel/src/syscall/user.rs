//! Validates and copies across the user/kernel boundary.
//!
//! A syscall never switches page tables to reach userland: the caller's
//! address space is already active, so once [`AddressSpace::is_user_accessible`]
//! confirms a range is mapped, user-accessible, and has the rights the
//! operation needs, a plain pointer dereference is safe.

use corundum_mm::addr::VirtAddr;
use corundum_mm::mapper::MapFlags;
use corundum_syscall::Errno;

use crate::proc::ArchMapper;

/// Copies `buf.len()` bytes from the user address `ptr` into `buf`.
pub(crate) fn read_user_bytes(
    space: &corundum_mm::address_space::AddressSpace<ArchMapper>,
    ptr: u64,
    buf: &mut [u8],
) -> Result<(), Errno> {
    if buf.is_empty() {
        return Ok(());
    }
    if !space.is_user_accessible(VirtAddr::new(ptr), buf.len() as u64, MapFlags::empty()) {
        return Err(Errno::WouldFault);
    }
    // SAFETY: `is_user_accessible` just confirmed every page in this range
    // is mapped into the currently active (this process's own) page table.
    unsafe { core::ptr::copy_nonoverlapping(ptr as *const u8, buf.as_mut_ptr(), buf.len()) };
    Ok(())
}

/// Copies `buf` to the user address `ptr`.
pub(crate) fn write_user_bytes(
    space: &corundum_mm::address_space::AddressSpace<ArchMapper>,
    ptr: u64,
    buf: &[u8],
) -> Result<(), Errno> {
    if buf.is_empty() {
        return Ok(());
    }
    if !space.is_user_accessible(VirtAddr::new(ptr), buf.len() as u64, MapFlags::WRITABLE) {
        return Err(Errno::WouldFault);
    }
    // SAFETY: `is_user_accessible` confirmed this range is mapped writable
    // in the currently active page table.
    unsafe { core::ptr::copy_nonoverlapping(buf.as_ptr(), ptr as *mut u8, buf.len()) };
    Ok(())
}

/// Reads a NUL-terminated string from user memory into `scratch`, one byte
/// at a time (each byte independently validated — a string may straddle a
/// page boundary where only part of the range is mapped).
pub(crate) fn read_user_cstr<'a>(
    space: &corundum_mm::address_space::AddressSpace<ArchMapper>,
    ptr: u64,
    scratch: &'a mut [u8],
) -> Result<&'a str, Errno> {
    for i in 0..scratch.len() {
        read_user_bytes(space, ptr + i as u64, core::slice::from_mut(&mut scratch[i]))?;
        if scratch[i] == 0 {
            return core::str::from_utf8(&scratch[..i]).map_err(|_| Errno::InvalidValue);
        }
    }
    Err(Errno::StringTooLong)
}
