//! Descriptor I/O: `open`, `close`, `read`/`write` and their `p`-variants,
//! `seek`, `ioctl`, `getdents`, `poll`.

use corundum_core::id::Fd;
use corundum_fs::path::MAX_PATH;
use corundum_syscall::abi::{DType, DirEntry as WireDirEntry, PollFd};
use corundum_syscall::flags::{OpenFlags, PollEvents, Whence};
use corundum_syscall::mac::Permissions;
use corundum_syscall::numbers::fd as nr;
use corundum_syscall::Errno;

use crate::proc::{FdEntry, FdTarget};

pub(super) fn dispatch(op: u32, a0: u64, a1: u64, a2: u64, a3: u64, _a4: u64) -> Result<u64, Errno> {
    match op {
        nr::OPEN => open(a1, a2 as u32),
        nr::CLOSE => close(a0 as u32),
        nr::READ => read(a0 as u32, a1, a2),
        nr::WRITE => write(a0 as u32, a1, a2),
        nr::PREAD => pread(a0 as u32, a1, a2, a3),
        nr::PWRITE => pwrite(a0 as u32, a1, a2, a3),
        nr::SEEK => seek(a0 as u32, a1 as i64, a2 as u32),
        nr::IOCTL => ioctl(a0 as u32, a1, a2),
        nr::GETDENTS => getdents(a0 as u32, a1, a2),
        nr::POLL => poll(a0, a1 as u32, a2 as i64),
        _ => Err(Errno::NotImplemented),
    }
}

fn open(path_ptr: u64, raw_flags: u32) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let flags = OpenFlags::from_bits_truncate(raw_flags);

    let mut scratch = [0u8; MAX_PATH];
    let mut abs_buf = [0u8; MAX_PATH];
    let fd = crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let raw = super::read_user_cstr(p.address_space(), path_ptr, &mut scratch)?;
            let abs = crate::fs::absolute_path(p.cwd(), raw, &mut abs_buf)?;

            let needed = if flags.contains(OpenFlags::WRONLY) {
                Permissions::WRITE
            } else {
                Permissions::READ
            };
            let resource = super::hash_resource(abs);
            if !p.permissions_for(resource).contains(needed) {
                return Err(super::enforce(pid, "open", p.enforcement()));
            }

            let (handle, rest) = crate::fs::resolve(abs)?;
            let inode = crate::fs::with_driver(handle, |d| d.open(rest))
                .map_err(|_| Errno::NotImplemented)?
                .map_err(|_| Errno::NoEntity)?;

            let entry = FdEntry {
                target: FdTarget::Vfs { fs: handle, inode },
                offset: 0,
                flags,
            };
            p.install_fd(entry).map_err(Errno::from)
        })
    })
    .map_err(Errno::from)??;

    Ok(fd.as_u32() as u64)
}

fn close(fd: u32) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let entry = crate::proc::with(|table| table.with_process(pid, |p| p.take_fd(Fd::new(fd))))
        .map_err(Errno::from)?
        .map_err(Errno::from)?;

    match entry.target {
        FdTarget::Vfs { fs, inode } => {
            let _ = crate::fs::with_driver(fs, |d| d.close(inode));
        }
        FdTarget::FifoRead(idx) => {
            crate::ipc::with(|pools| pools.fifo(idx).map(|f| f.close_reader())).ok();
        }
        FdTarget::FifoWrite(idx) => {
            crate::ipc::with(|pools| pools.fifo(idx).map(|f| f.close_writer())).ok();
        }
        FdTarget::Socket(_) | FdTarget::Console => {}
    }
    Ok(0)
}

fn read(fd: u32, buf_ptr: u64, len: u64) -> Result<u64, Errno> {
    rw(fd, buf_ptr, len, None, Direction::Read)
}

fn write(fd: u32, buf_ptr: u64, len: u64) -> Result<u64, Errno> {
    rw(fd, buf_ptr, len, None, Direction::Write)
}

fn pread(fd: u32, buf_ptr: u64, len: u64, off: u64) -> Result<u64, Errno> {
    rw(fd, buf_ptr, len, Some(off), Direction::Read)
}

fn pwrite(fd: u32, buf_ptr: u64, len: u64, off: u64) -> Result<u64, Errno> {
    rw(fd, buf_ptr, len, Some(off), Direction::Write)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

const IO_CHUNK: usize = 512;

fn rw(fd: u32, buf_ptr: u64, len: u64, explicit_off: Option<u64>, dir: Direction) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let mut chunk = [0u8; IO_CHUNK];
    let mut total = 0u64;

    while total < len {
        let want = ((len - total) as usize).min(IO_CHUNK);
        let n = crate::proc::with(|table| {
            table.with_process(pid, |p| {
                let fdn = Fd::new(fd);
                let entry = *p.fd(fdn).map_err(Errno::from)?;
                let offset = explicit_off.unwrap_or(entry.offset);

                let n = match (dir, entry.target) {
                    (Direction::Read, FdTarget::Vfs { fs, inode }) => {
                        let n = crate::fs::with_driver(fs, |d| d.read(inode, offset, &mut chunk[..want]))
                            .map_err(|_| Errno::NotImplemented)?
                            .map_err(|_| Errno::Io)?;
                        super::write_user_bytes(p.address_space(), buf_ptr + total, &chunk[..n])?;
                        n
                    }
                    (Direction::Write, FdTarget::Vfs { fs, inode }) => {
                        super::read_user_bytes(p.address_space(), buf_ptr + total, &mut chunk[..want])?;
                        crate::fs::with_driver(fs, |d| d.write(inode, offset, &chunk[..want]))
                            .map_err(|_| Errno::NotImplemented)?
                            .map_err(|_| Errno::Io)?
                    }
                    (Direction::Read, FdTarget::FifoRead(idx)) => {
                        let n = crate::ipc::with(|pools| {
                            pools.fifo(idx)?.read(&mut chunk[..want], true).map_err(|_| Errno::Io)
                        })?;
                        super::write_user_bytes(p.address_space(), buf_ptr + total, &chunk[..n])?;
                        n
                    }
                    (Direction::Write, FdTarget::FifoWrite(idx)) => {
                        super::read_user_bytes(p.address_space(), buf_ptr + total, &mut chunk[..want])?;
                        crate::ipc::with(|pools| {
                            pools.fifo(idx)?.write(&chunk[..want], true).map_err(|_| Errno::Io)
                        })?
                    }
                    (Direction::Read, FdTarget::Socket(idx)) => {
                        let n = crate::ipc::with(|pools| {
                            pools.socket(idx)?.recv(&mut chunk[..want], true).map_err(|_| Errno::Io)
                        })?;
                        super::write_user_bytes(p.address_space(), buf_ptr + total, &chunk[..n])?;
                        n
                    }
                    (Direction::Write, FdTarget::Socket(idx)) => {
                        super::read_user_bytes(p.address_space(), buf_ptr + total, &mut chunk[..want])?;
                        crate::ipc::with(|pools| {
                            pools.socket(idx)?.send(&chunk[..want], true).map_err(|_| Errno::Io)
                        })?
                    }
                    (Direction::Read, FdTarget::Console) => 0,
                    (Direction::Write, FdTarget::Console) => {
                        super::read_user_bytes(p.address_space(), buf_ptr + total, &mut chunk[..want])?;
                        if let Ok(s) = core::str::from_utf8(&chunk[..want]) {
                            corundum_core::kprint!("{s}");
                        }
                        want
                    }
                    _ => return Err(Errno::BadFile),
                };

                if explicit_off.is_none() {
                    if let Ok(slot) = p.fd_mut(fdn) {
                        slot.offset += n as u64;
                    }
                }
                Ok::<_, Errno>(n)
            })
        })
        .map_err(Errno::from)??;

        total += n as u64;
        if n == 0 {
            break;
        }
    }

    Ok(total)
}

fn seek(fd: u32, off: i64, whence: u32) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let whence = match whence {
        0 => Whence::Set,
        1 => Whence::Current,
        2 => Whence::End,
        _ => return Err(Errno::InvalidValue),
    };

    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let fdn = Fd::new(fd);
            let entry = *p.fd(fdn).map_err(Errno::from)?;
            let FdTarget::Vfs { fs, inode } = entry.target else {
                return Err(Errno::InvalidSeek);
            };
            let size = crate::fs::with_driver(fs, |d| d.stat(inode))
                .map_err(|_| Errno::NotImplemented)?
                .map_err(|_| Errno::Io)?
                .size;

            let base = match whence {
                Whence::Set => 0i64,
                Whence::Current => entry.offset as i64,
                Whence::End => size as i64,
            };
            let new_off = base.checked_add(off).filter(|&o| o >= 0).ok_or(Errno::InvalidValue)?;
            p.fd_mut(fdn).map_err(Errno::from)?.offset = new_off as u64;
            Ok(new_off as u64)
        })
    })
    .map_err(Errno::from)?
}

fn ioctl(fd: u32, request: u64, arg: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let entry = *p.fd(Fd::new(fd)).map_err(Errno::from)?;
            let FdTarget::Vfs { fs, inode } = entry.target else {
                return Err(Errno::InvalidValue);
            };
            crate::fs::with_driver(fs, |d| d.io_control(inode, request, arg))
                .map_err(|_| Errno::NotImplemented)?
                .map_err(|_| Errno::InvalidValue)
        })
    })
    .map_err(Errno::from)?
}

fn getdents(fd: u32, buf_ptr: u64, len: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    const MAX_ENTRIES: usize = 32;
    let mut raw = [corundum_fs::DirEntry::new(0, corundum_fs::NodeKind::Regular, ""); MAX_ENTRIES];

    let count = crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let fdn = Fd::new(fd);
            let entry = *p.fd(fdn).map_err(Errno::from)?;
            let FdTarget::Vfs { fs, inode } = entry.target else {
                return Err(Errno::InvalidValue);
            };
            let n = crate::fs::with_driver(fs, |d| d.read_entries(inode, entry.offset as usize, &mut raw))
                .map_err(|_| Errno::NotImplemented)?
                .map_err(|_| Errno::Io)?;
            if let Ok(slot) = p.fd_mut(fdn) {
                slot.offset += n as u64;
            }
            Ok::<_, Errno>(n)
        })
    })
    .map_err(Errno::from)??;

    let entry_size = core::mem::size_of::<WireDirEntry>() as u64;
    let fit = ((len / entry_size) as usize).min(count);

    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            for (i, src) in raw.iter().take(fit).enumerate() {
                let kind = match src.kind {
                    corundum_fs::NodeKind::Regular => DType::Reg,
                    corundum_fs::NodeKind::Directory => DType::Dir,
                    corundum_fs::NodeKind::Symlink => DType::Lnk,
                    corundum_fs::NodeKind::CharDevice => DType::Chr,
                    corundum_fs::NodeKind::BlockDevice => DType::Blk,
                    corundum_fs::NodeKind::Fifo => DType::Chr,
                };
                let wire = WireDirEntry::new(src.inode, (i as u64 + 1) * entry_size, kind, src.name());
                // SAFETY: `WireDirEntry` is `#[repr(C)]` and plain-old-data.
                let bytes = unsafe {
                    core::slice::from_raw_parts(
                        (&wire as *const WireDirEntry).cast::<u8>(),
                        core::mem::size_of::<WireDirEntry>(),
                    )
                };
                super::write_user_bytes(p.address_space(), buf_ptr + i as u64 * entry_size, bytes)?;
            }
            Ok::<_, Errno>(())
        })
    })
    .map_err(Errno::from)??;

    Ok((fit as u64) * entry_size)
}

fn poll(fds_ptr: u64, n: u32, _timeout_ms: i64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    const MAX_POLL: usize = 64;
    if n as usize > MAX_POLL {
        return Err(Errno::InvalidValue);
    }
    let entry_size = core::mem::size_of::<PollFd>() as u64;

    // `timeout_ms` is unused: no monotonic clock exists yet, so this spins
    // on `Yield` until some descriptor is ready rather than honoring a
    // deadline.
    loop {
        let mut ready = 0u64;
        crate::proc::with(|table| {
            table.with_process(pid, |p| {
                for i in 0..n as u64 {
                    let mut raw = [0u8; core::mem::size_of::<PollFd>()];
                    super::read_user_bytes(p.address_space(), fds_ptr + i * entry_size, &mut raw)?;
                    // SAFETY: `PollFd` is `#[repr(C)]`, plain-old-data, and
                    // `raw` was sized to match it exactly.
                    let mut slot: PollFd = unsafe { core::ptr::read(raw.as_ptr().cast()) };
                    let requested = PollEvents::from_bits_truncate(slot.events);

                    let entry = p.fd(Fd::new(slot.fd));
                    let revents = match entry {
                        Err(_) => PollEvents::POLLNVAL,
                        Ok(e) => readiness(*e, requested),
                    };
                    if !revents.is_empty() {
                        ready += 1;
                    }
                    slot.revents = revents.bits();

                    let out = unsafe {
                        core::slice::from_raw_parts((&slot as *const PollFd).cast::<u8>(), core::mem::size_of::<PollFd>())
                    };
                    super::write_user_bytes(p.address_space(), fds_ptr + i * entry_size, out)?;
                }
                Ok::<_, Errno>(())
            })
        })
        .map_err(Errno::from)??;

        if ready > 0 || n == 0 {
            return Ok(ready);
        }

        let core = crate::percpu::current().core_id();
        corundum_sched::dispatch::with(|d| d.yield_now(corundum_core::id::Cid::new(0), core));
    }
}

fn readiness(entry: FdEntry, requested: PollEvents) -> PollEvents {
    match entry.target {
        FdTarget::Console | FdTarget::Vfs { .. } => requested & (PollEvents::POLLIN | PollEvents::POLLOUT),
        FdTarget::FifoRead(idx) => {
            if requested.contains(PollEvents::POLLIN) && crate::ipc::with(|p| p.fifo(idx).is_ok_and(|f| !f.is_empty())) {
                PollEvents::POLLIN
            } else {
                PollEvents::empty()
            }
        }
        FdTarget::FifoWrite(_) => requested & PollEvents::POLLOUT,
        FdTarget::Socket(_) => requested & (PollEvents::POLLIN | PollEvents::POLLOUT),
    }
}
