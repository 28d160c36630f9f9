//! `pipe`, `socket`, `bind`, `connect`, `listen`, `accept`.

use corundum_core::id::Fd;
use corundum_fs::path::MAX_PATH;
use corundum_ipc::socket::MAX_SOCK_PATH;
use corundum_ipc::SocketStatus;
use corundum_syscall::flags::{OpenFlags, AF_UNIX, SOCK_CLOEXEC, SOCK_DGRAM, SOCK_NONBLOCK, SOCK_STREAM, SOCK_TYPE_MASK};
use corundum_syscall::numbers::ipc as nr;
use corundum_syscall::Errno;

use crate::proc::{FdEntry, FdTarget};

pub(super) fn dispatch(op: u32, a0: u64, a1: u64, a2: u64, _a3: u64, _a4: u64) -> Result<u64, Errno> {
    match op {
        nr::PIPE => pipe(a0),
        nr::SOCKET => socket(a0 as u32, a1 as u32, a2 as u32),
        nr::BIND => bind(a0 as u32, a1),
        nr::CONNECT => connect(a0 as u32, a1),
        nr::LISTEN => listen(a0 as u32, a1 as usize),
        nr::ACCEPT => accept(a0 as u32, a2 != 0),
        _ => Err(Errno::NotImplemented),
    }
}

fn pipe(fds_ptr: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let idx = crate::ipc::with(|pools| pools.create_fifo())?;

    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let read_fd = p
                .install_fd(FdEntry {
                    target: FdTarget::FifoRead(idx),
                    offset: 0,
                    flags: corundum_syscall::flags::OpenFlags::empty(),
                })
                .map_err(Errno::from)?;
            let write_fd = p
                .install_fd(FdEntry {
                    target: FdTarget::FifoWrite(idx),
                    offset: 0,
                    flags: corundum_syscall::flags::OpenFlags::WRONLY,
                })
                .map_err(Errno::from)?;

            let pair = [read_fd.as_u32(), write_fd.as_u32()];
            // SAFETY: `pair` is two plain `u32`s, exactly the layout a
            // `pipe(2)`-style caller expects at `fds_ptr`.
            let bytes = unsafe { core::slice::from_raw_parts(pair.as_ptr().cast::<u8>(), 8) };
            super::write_user_bytes(p.address_space(), fds_ptr, bytes)
        })
    })
    .map_err(Errno::from)??;

    Ok(0)
}

fn socket(domain: u32, raw_type: u32, proto: u32) -> Result<u64, Errno> {
    if domain != AF_UNIX {
        return Err(Errno::InvalidValue);
    }
    let kind = raw_type & SOCK_TYPE_MASK;
    if kind != SOCK_STREAM && kind != SOCK_DGRAM {
        return Err(Errno::InvalidValue);
    }
    if proto != 0 {
        return Err(Errno::InvalidValue);
    }

    let pid = super::current_pid()?;
    let idx = crate::ipc::with(|pools| pools.create_socket())?;

    let mut flags = OpenFlags::empty();
    if raw_type & SOCK_NONBLOCK != 0 {
        flags |= OpenFlags::NONBLOCK;
    }
    if raw_type & SOCK_CLOEXEC != 0 {
        flags |= OpenFlags::CLOEXEC;
    }

    let fd = crate::proc::with(|table| {
        table.with_process(pid, |p| {
            p.install_fd(FdEntry { target: FdTarget::Socket(idx), offset: 0, flags }).map_err(Errno::from)
        })
    })
    .map_err(Errno::from)??;

    Ok(fd.as_u32() as u64)
}

fn socket_index(pid: corundum_core::id::Pid, fd: u32) -> Result<u16, Errno> {
    crate::proc::with(|table| {
        table.with_process(pid, |p| match p.fd(Fd::new(fd)).map_err(Errno::from)?.target {
            FdTarget::Socket(idx) => Ok(idx),
            _ => Err(Errno::BadFile),
        })
    })
    .map_err(Errno::from)?
}

fn read_abs_path(pid: corundum_core::id::Pid, path_ptr: u64, out: &mut [u8; MAX_PATH]) -> Result<usize, Errno> {
    let mut scratch = [0u8; MAX_PATH];
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let raw = super::read_user_cstr(p.address_space(), path_ptr, &mut scratch)?;
            crate::fs::absolute_path(p.cwd(), raw, out).map(str::len)
        })
    })
    .map_err(Errno::from)?
}

fn bind(fd: u32, path_ptr: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let idx = socket_index(pid, fd)?;

    let mut abs_buf = [0u8; MAX_PATH];
    let len = read_abs_path(pid, path_ptr, &mut abs_buf)?;
    if len > MAX_SOCK_PATH {
        return Err(Errno::StringTooLong);
    }
    let path = core::str::from_utf8(&abs_buf[..len]).map_err(|_| Errno::InvalidValue)?;

    crate::ipc::with(|pools| {
        pools.socket(idx)?.bind(path).map_err(status_to_errno)?;
        pools.record_bind(idx, path)
    })?;
    Ok(0)
}

fn listen(fd: u32, backlog: usize) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let idx = socket_index(pid, fd)?;
    crate::ipc::with(|pools| pools.socket(idx)?.listen(backlog).map_err(status_to_errno))?;
    Ok(0)
}

fn connect(fd: u32, path_ptr: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let idx = socket_index(pid, fd)?;

    let mut abs_buf = [0u8; MAX_PATH];
    let len = read_abs_path(pid, path_ptr, &mut abs_buf)?;
    let path = core::str::from_utf8(&abs_buf[..len]).map_err(|_| Errno::InvalidValue)?;

    crate::ipc::with(|pools| {
        let peer_idx = pools.find_by_path(path).ok_or(Errno::NoEntity)?;
        if peer_idx == idx {
            return Err(Errno::InvalidValue);
        }
        let peer = pools.socket(peer_idx)?;
        let this = pools.socket(idx)?;
        this.connect(peer).map_err(status_to_errno)
    })?;
    Ok(0)
}

fn accept(fd: u32, blocking: bool) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let idx = socket_index(pid, fd)?;

    let accepted = crate::ipc::with(|pools| pools.socket(idx)?.accept(blocking).map_err(status_to_errno))?;
    let new_idx = crate::ipc::with(|pools| pools.adopt_socket(accepted))?;

    let new_fd = crate::proc::with(|table| {
        table.with_process(pid, |p| {
            p.install_fd(FdEntry {
                target: FdTarget::Socket(new_idx),
                offset: 0,
                flags: corundum_syscall::flags::OpenFlags::empty(),
            })
            .map_err(Errno::from)
        })
    })
    .map_err(Errno::from)??;

    Ok(new_fd.as_u32() as u64)
}

fn status_to_errno(s: SocketStatus) -> Errno {
    match s {
        SocketStatus::PlainSuccess => Errno::NoError,
        SocketStatus::IsBadType => Errno::InvalidValue,
        SocketStatus::WouldBlock => Errno::WouldBlock,
    }
}
