//! Syscall numbers, grouped into fixed ranges by subsystem.
//!
//! Each group owns a contiguous `0x..` range so a new syscall can be added
//! to a group without renumbering its neighbors.

/// Process lifecycle: exit, clone, exec, wait.
pub mod process {
    /// Terminate the calling thread/process.
    pub const EXIT: u32 = 0x00;
    /// `clone(flags)` — fork a process or spawn a thread.
    pub const CLONE: u32 = 0x01;
    /// `exec(path, argv, envp)` — replace the process image.
    pub const EXEC: u32 = 0x02;
    /// `wait(pid, *status, options)` — reap a child.
    pub const WAIT: u32 = 0x03;

    /// Start of this group's number range.
    pub const RANGE_START: u32 = 0x00;
    /// End (exclusive) of this group's number range.
    pub const RANGE_END: u32 = 0x10;
}

/// Descriptor I/O: open/close/read/write and friends.
pub mod fd {
    /// `open(dirfd, path, flags)`.
    pub const OPEN: u32 = 0x00;
    /// `close(fd)`.
    pub const CLOSE: u32 = 0x01;
    /// `read(fd, buf, n)`.
    pub const READ: u32 = 0x02;
    /// `write(fd, buf, n)`.
    pub const WRITE: u32 = 0x03;
    /// `pread(fd, buf, n, off)`.
    pub const PREAD: u32 = 0x04;
    /// `pwrite(fd, buf, n, off)`.
    pub const PWRITE: u32 = 0x05;
    /// `seek(fd, off, whence)`.
    pub const SEEK: u32 = 0x06;
    /// `ioctl(fd, req, arg)`.
    pub const IOCTL: u32 = 0x07;
    /// `getdents(fd, buf, len)`.
    pub const GETDENTS: u32 = 0x08;
    /// `poll(fds, n, timeout)`.
    pub const POLL: u32 = 0x09;

    /// Start of this group's number range.
    pub const RANGE_START: u32 = 0x10;
    /// End (exclusive) of this group's number range.
    pub const RANGE_END: u32 = 0x20;
}

/// Address space management.
pub mod memory {
    /// `mmap(addr_hint, length, prot, flags)`.
    pub const MMAP: u32 = 0x00;
    /// `munmap(addr, length)`.
    pub const MUNMAP: u32 = 0x01;
    /// `mprotect(addr, length, prot)`.
    pub const MPROTECT: u32 = 0x02;

    /// Start of this group's number range.
    pub const RANGE_START: u32 = 0x20;
    /// End (exclusive) of this group's number range.
    pub const RANGE_END: u32 = 0x30;
}

/// VFS-routed filesystem operations.
pub mod vfs {
    /// `stat(path, buf)` / `fstat(fd, buf)`.
    pub const STAT: u32 = 0x00;
    /// `truncate(fd, length)`.
    pub const TRUNCATE: u32 = 0x01;
    /// `unlink(path)`.
    pub const UNLINK: u32 = 0x02;
    /// `rename(old_path, new_path)`.
    pub const RENAME: u32 = 0x03;
    /// `link(old_path, new_path)`.
    pub const LINK: u32 = 0x04;
    /// `symlink(target, link_path)`.
    pub const SYMLINK: u32 = 0x05;
    /// `readlink(path, buf, len)`.
    pub const READLINK: u32 = 0x06;
    /// `mknod(path, mode, dev)`.
    pub const MKNOD: u32 = 0x07;
    /// `chdir(path)`.
    pub const CHDIR: u32 = 0x08;
    /// `getcwd(buf, len)`.
    pub const GETCWD: u32 = 0x09;
    /// `mount(source, target, kind, flags)`.
    pub const MOUNT: u32 = 0x0a;
    /// `umount(target, flags)`.
    pub const UMOUNT: u32 = 0x0b;

    /// Start of this group's number range.
    pub const RANGE_START: u32 = 0x30;
    /// End (exclusive) of this group's number range.
    pub const RANGE_END: u32 = 0x40;
}

/// IPC endpoint creation and UNIX-socket operations.
pub mod ipc {
    /// `pipe(*fds, flags)`.
    pub const PIPE: u32 = 0x00;
    /// `socket(domain, type, proto)`.
    pub const SOCKET: u32 = 0x01;
    /// `bind(fd, path)`.
    pub const BIND: u32 = 0x02;
    /// `connect(fd, path)`.
    pub const CONNECT: u32 = 0x03;
    /// `listen(fd, backlog)`.
    pub const LISTEN: u32 = 0x04;
    /// `accept(fd)`.
    pub const ACCEPT: u32 = 0x05;

    /// Start of this group's number range.
    pub const RANGE_START: u32 = 0x40;
    /// End (exclusive) of this group's number range.
    pub const RANGE_END: u32 = 0x50;
}

/// System-wide queries and privileged control.
pub mod system {
    /// `sysconf(req, addr, len)`.
    pub const SYSCONF: u32 = 0x00;
    /// `prctl(code, arg)`.
    pub const PRCTL: u32 = 0x01;
    /// `reboot(cmd, flags)`.
    pub const REBOOT: u32 = 0x02;
    /// `Set_MAC_Capabilities(mask)` — may only clear bits.
    pub const SET_MAC_CAPABILITIES: u32 = 0x03;
    /// `Add_MAC_Permissions(entry)`.
    pub const ADD_MAC_PERMISSIONS: u32 = 0x04;
    /// `Set_MAC_Enforcement(mode)`.
    pub const SET_MAC_ENFORCEMENT: u32 = 0x05;

    /// Start of this group's number range.
    pub const RANGE_START: u32 = 0xf0;
    /// End (exclusive) of this group's number range.
    pub const RANGE_END: u32 = 0x100;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_ranges_are_disjoint() {
        let ranges = [
            (process::RANGE_START, process::RANGE_END),
            (fd::RANGE_START, fd::RANGE_END),
            (memory::RANGE_START, memory::RANGE_END),
            (vfs::RANGE_START, vfs::RANGE_END),
            (ipc::RANGE_START, ipc::RANGE_END),
            (system::RANGE_START, system::RANGE_END),
        ];
        for i in 0..ranges.len() {
            for j in (i + 1)..ranges.len() {
                let (a0, a1) = ranges[i];
                let (b0, b1) = ranges[j];
                assert!(a1 <= b0 || b1 <= a0, "ranges {i} and {j} overlap");
            }
        }
    }

    #[test]
    fn every_number_falls_within_its_own_group_range() {
        assert!((process::RANGE_START..process::RANGE_END).contains(&process::CLONE));
        assert!((fd::RANGE_START..fd::RANGE_END).contains(&fd::GETDENTS));
        assert!((memory::RANGE_START..memory::RANGE_END).contains(&memory::MPROTECT));
        assert!((vfs::RANGE_START..vfs::RANGE_END).contains(&vfs::UMOUNT));
        assert!((ipc::RANGE_START..ipc::RANGE_END).contains(&ipc::ACCEPT));
        assert!((system::RANGE_START..system::RANGE_END).contains(&system::SET_MAC_ENFORCEMENT));
    }
}
