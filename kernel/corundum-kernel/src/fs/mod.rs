//! Kernel-owned VFS glue.
//!
//! `corundum_fs` only owns the mount table and the driver contract; path
//! compounding against a process's CWD, and dispatch to the one concrete
//! driver this kernel ships (`DevFs`), live here.

use corundum_core::id::FsHandle;
use corundum_fs::devfs::DevFs;
use corundum_fs::driver::FileSystemDriver;
use corundum_fs::mount::{self, MountError};
use corundum_fs::{path, FsKind};
use corundum_syscall::Errno;

pub(crate) fn map_mount_err(e: MountError) -> Errno {
    match e {
        MountError::TableFull => Errno::NoMemory,
        MountError::DeviceBusy => Errno::Busy,
        MountError::BadPath => Errno::InvalidValue,
        MountError::NoSuchMount => Errno::NoEntity,
    }
}

/// Joins a process's CWD with a syscall path argument that may be relative,
/// writing the normalized absolute path into `out`.
pub fn absolute_path<'a>(cwd: &str, raw: &str, out: &'a mut [u8; path::MAX_PATH]) -> Result<&'a str, Errno> {
    let len = path::compound_path(cwd, raw, out).ok_or(Errno::StringTooLong)?;
    core::str::from_utf8(&out[..len]).map_err(|_| Errno::InvalidValue)
}

/// Resolves an already-absolute `path` to its mount handle and the
/// mount-relative remainder the driver sees.
pub fn resolve(path: &str) -> Result<(FsHandle, &str), Errno> {
    let (handle, matched) = mount::with(|m| m.get_mount(path)).ok_or(Errno::NoEntity)?;
    Ok((handle, &path[matched.min(path.len())..]))
}

/// Runs `f` against the driver mounted at `handle`.
///
/// Only [`FsKind::Dev`] has a concrete driver in this kernel; every other
/// kind reports [`Errno::NotImplemented`] until a block-backed filesystem
/// is wired in. `DevFs` holds no state, so a fresh instance per call is
/// equivalent to a shared one.
pub fn with_driver<R>(handle: FsHandle, f: impl FnOnce(&mut dyn FileSystemDriver) -> R) -> Result<R, Errno> {
    let kind = mount::with(|m| m.kind(handle)).map_err(map_mount_err)?;
    match kind {
        FsKind::Dev => {
            let mut driver = DevFs;
            Ok(f(&mut driver))
        }
        _ => Err(Errno::NotImplemented),
    }
}
