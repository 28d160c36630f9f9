//! Path-addressed filesystem operations, plus `chdir`/`getcwd` and
//! `mount`/`umount`.

use corundum_fs::path::MAX_PATH;
use corundum_fs::FsKind as DriverFsKind;
use corundum_fs::{driver, mount};
use corundum_syscall::abi::{IFBLK, IFCHR, IFDIR, IFIFO, IFLNK, IFREG, PERMISSION_MASK};
use corundum_syscall::mac::Capabilities;
use corundum_syscall::numbers::vfs as nr;
use corundum_syscall::Errno;

fn wire_stat(s: driver::Stat) -> corundum_syscall::abi::Stat {
    let type_bits = match s.kind {
        driver::NodeKind::Regular => IFREG,
        driver::NodeKind::Directory => IFDIR,
        driver::NodeKind::Symlink => IFLNK,
        driver::NodeKind::CharDevice => IFCHR,
        driver::NodeKind::BlockDevice => IFBLK,
        driver::NodeKind::Fifo => IFIFO,
    };
    corundum_syscall::abi::Stat {
        dev: 0,
        ino: s.inode,
        mode: type_bits | (s.mode.bits() & PERMISSION_MASK),
        nlink: 1,
        uid: s.uid,
        gid: s.gid,
        rdev: 0,
        size: s.size,
        atime: corundum_syscall::abi::Timespec { sec: 0, nsec: 0 },
        mtime: corundum_syscall::abi::Timespec { sec: 0, nsec: 0 },
        ctime: corundum_syscall::abi::Timespec { sec: 0, nsec: 0 },
        blksize: 4096,
        blocks: s.size.div_ceil(512),
    }
}

fn with_absolute<R>(pid: corundum_core::id::Pid, path_ptr: u64, f: impl FnOnce(&str) -> Result<R, Errno>) -> Result<R, Errno> {
    let mut scratch = [0u8; MAX_PATH];
    let mut abs_buf = [0u8; MAX_PATH];
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let raw = super::read_user_cstr(p.address_space(), path_ptr, &mut scratch)?;
            let abs = crate::fs::absolute_path(p.cwd(), raw, &mut abs_buf)?;
            f(abs)
        })
    })
    .map_err(Errno::from)?
}

pub(super) fn dispatch(op: u32, a0: u64, a1: u64, a2: u64, a3: u64, _a4: u64) -> Result<u64, Errno> {
    match op {
        nr::STAT => stat(a0, a1),
        nr::TRUNCATE => truncate(a0, a1),
        nr::UNLINK => unlink(a0),
        nr::RENAME => rename(a0, a1),
        nr::LINK => link(a0, a1),
        nr::SYMLINK => symlink(a0, a1),
        nr::READLINK => readlink(a0, a1, a2),
        nr::MKNOD => mknod(a0, a1 as u32, a2),
        nr::CHDIR => chdir(a0),
        nr::GETCWD => getcwd(a0, a1),
        nr::MOUNT => mount_syscall(a0, a1, a2 as u32, a3 as u32),
        nr::UMOUNT => umount(a0),
        _ => Err(Errno::NotImplemented),
    }
}

fn stat(path_ptr: u64, out_ptr: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let wire = with_absolute(pid, path_ptr, |abs| {
        let (handle, rest) = crate::fs::resolve(abs)?;
        let inode = crate::fs::with_driver(handle, |d| d.open(rest))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::NoEntity)?;
        let st = crate::fs::with_driver(handle, |d| d.stat(inode))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::Io)?;
        Ok(wire_stat(st))
    })?;

    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            // SAFETY: `wire` is `#[repr(C)]`, plain-old-data.
            let bytes = unsafe {
                core::slice::from_raw_parts(
                    (&wire as *const corundum_syscall::abi::Stat).cast::<u8>(),
                    core::mem::size_of::<corundum_syscall::abi::Stat>(),
                )
            };
            super::write_user_bytes(p.address_space(), out_ptr, bytes)
        })
    })
    .map_err(Errno::from)??;
    Ok(0)
}

fn truncate(path_ptr: u64, len: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    with_absolute(pid, path_ptr, |abs| {
        let (handle, rest) = crate::fs::resolve(abs)?;
        let inode = crate::fs::with_driver(handle, |d| d.open(rest))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::NoEntity)?;
        match crate::fs::with_driver(handle, |d| d.truncate(inode, len)).map_err(|_| Errno::NotImplemented)? {
            driver::FsStatus::Success => Ok(0),
            driver::FsStatus::RoFailure => Err(Errno::ReadOnlyFs),
            _ => Err(Errno::Io),
        }
    })
}

fn unlink(path_ptr: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    with_absolute(pid, path_ptr, |abs| {
        let (parent, name) = split_parent(abs)?;
        let (handle, rest) = crate::fs::resolve(parent)?;
        let parent_inode = crate::fs::with_driver(handle, |d| d.open(rest))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::NoEntity)?;
        match crate::fs::with_driver(handle, |d| d.unlink(parent_inode, name)).map_err(|_| Errno::NotImplemented)? {
            driver::FsStatus::Success => Ok(0),
            driver::FsStatus::RoFailure => Err(Errno::ReadOnlyFs),
            _ => Err(Errno::NoEntity),
        }
    })
}

fn rename(old_ptr: u64, new_ptr: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let mut scratch_new = [0u8; MAX_PATH];
    let mut abs_new_buf = [0u8; MAX_PATH];
    let new_abs = crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let raw = super::read_user_cstr(p.address_space(), new_ptr, &mut scratch_new)?;
            crate::fs::absolute_path(p.cwd(), raw, &mut abs_new_buf).map(str::len)
        })
    })
    .map_err(Errno::from)??;
    let new_path_len = new_abs;

    with_absolute(pid, old_ptr, |old_abs| {
        let new_abs_str = core::str::from_utf8(&abs_new_buf[..new_path_len]).map_err(|_| Errno::InvalidValue)?;
        let (old_parent, old_name) = split_parent(old_abs)?;
        let (new_parent, new_name) = split_parent(new_abs_str)?;
        let (handle, old_rest) = crate::fs::resolve(old_parent)?;
        let (new_handle, new_rest) = crate::fs::resolve(new_parent)?;
        if handle != new_handle {
            // Cross-mount rename would require copying data between
            // drivers; unsupported in this kernel.
            return Err(Errno::NotImplemented);
        }
        let old_parent_inode = crate::fs::with_driver(handle, |d| d.open(old_rest))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::NoEntity)?;
        let new_parent_inode = crate::fs::with_driver(handle, |d| d.open(new_rest))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::NoEntity)?;
        match crate::fs::with_driver(handle, |d| d.rename(old_parent_inode, old_name, new_parent_inode, new_name))
            .map_err(|_| Errno::NotImplemented)?
        {
            driver::FsStatus::Success => Ok(0),
            driver::FsStatus::RoFailure => Err(Errno::ReadOnlyFs),
            _ => Err(Errno::NoEntity),
        }
    })
}

fn link(target_ptr: u64, link_ptr: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let mut scratch_link = [0u8; MAX_PATH];
    let mut abs_link_buf = [0u8; MAX_PATH];
    let link_len = crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let raw = super::read_user_cstr(p.address_space(), link_ptr, &mut scratch_link)?;
            crate::fs::absolute_path(p.cwd(), raw, &mut abs_link_buf).map(str::len)
        })
    })
    .map_err(Errno::from)??;

    with_absolute(pid, target_ptr, |target_abs| {
        let link_abs = core::str::from_utf8(&abs_link_buf[..link_len]).map_err(|_| Errno::InvalidValue)?;
        let (target_handle, target_rest) = crate::fs::resolve(target_abs)?;
        let target_inode = crate::fs::with_driver(target_handle, |d| d.open(target_rest))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::NoEntity)?;
        let (link_parent, link_name) = split_parent(link_abs)?;
        let (link_handle, link_rest) = crate::fs::resolve(link_parent)?;
        if link_handle != target_handle {
            return Err(Errno::NotImplemented);
        }
        let link_parent_inode = crate::fs::with_driver(link_handle, |d| d.open(link_rest))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::NoEntity)?;
        match crate::fs::with_driver(link_handle, |d| d.create_hard_link(link_parent_inode, link_name, target_inode))
            .map_err(|_| Errno::NotImplemented)?
        {
            driver::FsStatus::Success => Ok(0),
            driver::FsStatus::RoFailure => Err(Errno::ReadOnlyFs),
            _ => Err(Errno::NoEntity),
        }
    })
}

fn symlink(target_ptr: u64, link_ptr: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let mut scratch_target = [0u8; MAX_PATH];
    let target = crate::proc::with(|table| {
        table.with_process(pid, |p| super::read_user_cstr(p.address_space(), target_ptr, &mut scratch_target).map(str::len))
    })
    .map_err(Errno::from)??;
    let target_len = target;

    with_absolute(pid, link_ptr, |link_abs| {
        let target_str = core::str::from_utf8(&scratch_target[..target_len]).map_err(|_| Errno::InvalidValue)?;
        let (parent, name) = split_parent(link_abs)?;
        let (handle, rest) = crate::fs::resolve(parent)?;
        let parent_inode = crate::fs::with_driver(handle, |d| d.open(rest))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::NoEntity)?;
        crate::fs::with_driver(handle, |d| d.create_symbolic_link(parent_inode, name, target_str))
            .map_err(|_| Errno::NotImplemented)?
            .map(|_| 0u64)
            .map_err(|_| Errno::ReadOnlyFs)
    })
}

fn readlink(path_ptr: u64, buf_ptr: u64, len: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let mut out = [0u8; MAX_PATH];
    let cap = (len as usize).min(out.len());
    let n = with_absolute(pid, path_ptr, |abs| {
        let (handle, rest) = crate::fs::resolve(abs)?;
        let inode = crate::fs::with_driver(handle, |d| d.open(rest))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::NoEntity)?;
        crate::fs::with_driver(handle, |d| d.read_symbolic_link(inode, &mut out[..cap]))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::InvalidValue)
    })?;

    crate::proc::with(|table| table.with_process(pid, |p| super::write_user_bytes(p.address_space(), buf_ptr, &out[..n])))
        .map_err(Errno::from)??;
    Ok(n as u64)
}

fn mknod(path_ptr: u64, mode_bits: u32, _dev: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let mode = driver::Mode::from_bits_truncate(mode_bits);
    with_absolute(pid, path_ptr, |abs| {
        let (parent, name) = split_parent(abs)?;
        let (handle, rest) = crate::fs::resolve(parent)?;
        let parent_inode = crate::fs::with_driver(handle, |d| d.open(rest))
            .map_err(|_| Errno::NotImplemented)?
            .map_err(|_| Errno::NoEntity)?;
        crate::fs::with_driver(handle, |d| d.create_node(parent_inode, name, driver::NodeKind::Regular, mode))
            .map_err(|_| Errno::NotImplemented)?
            .map(|inode| inode)
            .map_err(|_| Errno::ReadOnlyFs)
    })
}

fn chdir(path_ptr: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let mut scratch = [0u8; MAX_PATH];
    let mut abs_buf = [0u8; MAX_PATH];
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let raw = super::read_user_cstr(p.address_space(), path_ptr, &mut scratch)?;
            let len = crate::fs::absolute_path(p.cwd(), raw, &mut abs_buf).map(str::len)?;
            let abs = core::str::from_utf8(&abs_buf[..len]).map_err(|_| Errno::InvalidValue)?;
            let (handle, rest) = crate::fs::resolve(abs)?;
            let inode = crate::fs::with_driver(handle, |d| d.open(rest))
                .map_err(|_| Errno::NotImplemented)?
                .map_err(|_| Errno::NoEntity)?;
            let st = crate::fs::with_driver(handle, |d| d.stat(inode))
                .map_err(|_| Errno::NotImplemented)?
                .map_err(|_| Errno::Io)?;
            if st.kind != driver::NodeKind::Directory {
                return Err(Errno::InvalidValue);
            }
            p.set_cwd(abs);
            Ok::<_, Errno>(0)
        })
    })
    .map_err(Errno::from)?
}

fn getcwd(buf_ptr: u64, len: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let cwd = p.cwd();
            if cwd.len() as u64 + 1 > len {
                return Err(Errno::NotBigEnough);
            }
            let mut with_nul = [0u8; MAX_PATH + 1];
            with_nul[..cwd.len()].copy_from_slice(cwd.as_bytes());
            super::write_user_bytes(p.address_space(), buf_ptr, &with_nul[..=cwd.len()])?;
            Ok(cwd.len() as u64)
        })
    })
    .map_err(Errno::from)?
}

fn mount_syscall(source_ptr: u64, target_ptr: u64, raw_kind: u32, _raw_flags: u32) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let kind = match raw_kind {
        corundum_syscall::flags::MNT_EXT => DriverFsKind::Ext,
        corundum_syscall::flags::MNT_FAT => DriverFsKind::Fat,
        corundum_syscall::flags::MNT_QNX => DriverFsKind::Qnx,
        _ => return Err(Errno::InvalidValue),
    };

    let has_cap = crate::proc::with(|table| table.with_process(pid, |p| p.capabilities().contains(Capabilities::SYS_MNT)))
        .map_err(Errno::from)?;
    if !has_cap {
        let mode = crate::proc::with(|table| table.with_process(pid, |p| p.enforcement())).map_err(Errno::from)?;
        return Err(super::enforce(pid, "mount", mode));
    }

    let mut source_scratch = [0u8; MAX_PATH];
    let device = crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let raw = super::read_user_cstr(p.address_space(), source_ptr, &mut source_scratch)?;
            Ok::<_, Errno>(super::hash_resource(raw))
        })
    })
    .map_err(Errno::from)??;

    with_absolute(pid, target_ptr, |abs| {
        mount::with(|m| m.mount(device, kind, abs, 0)).map(|h| h.as_u8() as u64).map_err(crate::fs::map_mount_err)
    })
}

fn umount(target_ptr: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let has_cap = crate::proc::with(|table| table.with_process(pid, |p| p.capabilities().contains(Capabilities::SYS_MNT)))
        .map_err(Errno::from)?;
    if !has_cap {
        let mode = crate::proc::with(|table| table.with_process(pid, |p| p.enforcement())).map_err(Errno::from)?;
        return Err(super::enforce(pid, "umount", mode));
    }

    with_absolute(pid, target_ptr, |abs| {
        let (handle, rest) = crate::fs::resolve(abs)?;
        if !rest.is_empty() {
            return Err(Errno::NoEntity);
        }
        mount::with(|m| m.unmount(handle)).map(|_| 0).map_err(crate::fs::map_mount_err)
    })
}

fn split_parent(abs: &str) -> Result<(&str, &str), Errno> {
    let trimmed = abs.trim_end_matches('/');
    let idx = trimmed.rfind('/').ok_or(Errno::InvalidValue)?;
    let parent = if idx == 0 { "/" } else { &trimmed[..idx] };
    let name = &trimmed[idx + 1..];
    if name.is_empty() {
        return Err(Errno::InvalidValue);
    }
    Ok((parent, name))
}
