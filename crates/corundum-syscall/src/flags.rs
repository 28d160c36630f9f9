//! Flag and enum arguments carried by the key syscalls.

bitflags::bitflags! {
    /// `open` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Close this descriptor across `exec`.
        const CLOEXEC  = 1 << 0;
        /// Open read-only.
        const RDONLY   = 1 << 1;
        /// Open write-only.
        const WRONLY   = 1 << 2;
        /// Fail rather than follow a trailing symlink.
        const NOFOLLOW = 1 << 3;
        /// Writes always land at the current end of file.
        const APPEND   = 1 << 4;
        /// Non-blocking I/O.
        const NONBLOCK = 1 << 5;
    }
}

/// `socket` domain. Numbered to match the wire-level `AF_*` constants below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SocketDomain {
    /// UNIX-domain, path-addressed.
    Unix = AF_UNIX,
}

/// Numeric `socket` domain: UNIX-domain.
pub const AF_UNIX: u32 = 1;

/// `socket` type, as carried in the low 16 bits of the `type` argument.
/// `SOCK_NONBLOCK`/`SOCK_CLOEXEC` may be OR'd into the high bits of the same
/// argument, Linux-style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SocketType {
    /// Connection-oriented, reliable, ordered byte stream.
    Stream = SOCK_STREAM,
    /// Connectionless datagram.
    Datagram = SOCK_DGRAM,
}

/// Numeric `socket` type: stream.
pub const SOCK_STREAM: u32 = 1;
/// Numeric `socket` type: datagram.
pub const SOCK_DGRAM: u32 = 2;
/// Mask isolating the type from the `SOCK_NONBLOCK`/`SOCK_CLOEXEC` bits
/// OR'd into the same argument.
pub const SOCK_TYPE_MASK: u32 = 0xFFFF;
/// Open the new socket's descriptor non-blocking.
pub const SOCK_NONBLOCK: u32 = 1 << 16;
/// Open the new socket's descriptor close-on-exec.
pub const SOCK_CLOEXEC: u32 = 1 << 17;

bitflags::bitflags! {
    /// `clone` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CloneFlags: u32 {
        /// Create a thread sharing the caller's page table instead of a
        /// new process with a forked one.
        const THREAD = 1 << 0;
        /// Attribute the new child to the caller's parent instead of the
        /// caller itself.
        const PARENT = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Memory protection bits, shared by `mmap` and `mprotect`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Prot: u32 {
        /// Page is readable.
        const READ  = 1 << 0;
        /// Page is writable.
        const WRITE = 1 << 1;
        /// Page is executable.
        const EXEC  = 1 << 2;
    }
}

bitflags::bitflags! {
    /// `mmap` mapping flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        /// Anonymous mapping (not file- or device-backed).
        const ANONYMOUS = 1 << 0;
    }
}

/// `seek` origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Offset is absolute.
    Set,
    /// Offset is relative to the current position.
    Current,
    /// Offset is relative to the end of the file.
    End,
}

bitflags::bitflags! {
    /// `poll` request/result bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollEvents: u16 {
        /// Ready for reading.
        const POLLIN   = 1 << 0;
        /// Ready for writing.
        const POLLOUT  = 1 << 1;
        /// An error condition occurred.
        const POLLERR  = 1 << 2;
        /// The requested descriptor is invalid.
        const POLLNVAL = 1 << 3;
        /// The opposite endpoint hung up.
        const POLLHUP  = 1 << 4;
    }
}

/// `mount` filesystem kind, numbered to match the wire-level `MNT_*`
/// constants below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MountKind {
    /// ext-family filesystem.
    Ext = MNT_EXT,
    /// FAT filesystem.
    Fat = MNT_FAT,
    /// QNX filesystem.
    Qnx = MNT_QNX,
}

/// Numeric `mount` kind: ext-family.
pub const MNT_EXT: u32 = 0;
/// Numeric `mount` kind: FAT.
pub const MNT_FAT: u32 = 1;
/// Numeric `mount` kind: QNX.
pub const MNT_QNX: u32 = 2;

bitflags::bitflags! {
    /// `wait` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitFlags: u32 {
        /// Return `0` immediately instead of blocking when no child has
        /// exited yet.
        const WNOHANG = 1 << 0;
    }
}

/// `reboot` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootCommand {
    /// Stop the CPU without powering off.
    Halt,
    /// Power the machine off.
    PowerOff,
    /// Restart the machine.
    Restart,
}

bitflags::bitflags! {
    /// `reboot` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RebootFlags: u32 {
        /// On failure, return the underlying reason instead of panicking.
        const ERROR_RET = 1 << 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_flags_compose() {
        let f = OpenFlags::RDONLY | OpenFlags::CLOEXEC;
        assert!(f.contains(OpenFlags::RDONLY));
        assert!(!f.contains(OpenFlags::APPEND));
    }

    #[test]
    fn poll_events_round_trip_bits() {
        let ev = PollEvents::POLLIN | PollEvents::POLLHUP;
        assert_eq!(ev.bits(), 0b10001);
    }

    #[test]
    fn whence_variants_are_distinct() {
        assert_ne!(Whence::Set, Whence::End);
    }
}
