//! Fixed-layout structs and constants shared verbatim with userland:
//! directory entries, `stat`, `uname`, `poll`, and `sysconf` topics.

/// One `poll` request/result slot, laid out exactly as handed to and from
/// userland: the caller fills `fd`/`events`, the kernel fills `revents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct PollFd {
    /// Descriptor to poll.
    pub fd: u32,
    /// Requested [`crate::flags::PollEvents`] bits.
    pub events: u16,
    /// Observed [`crate::flags::PollEvents`] bits, filled by the kernel.
    pub revents: u16,
}

/// Monotonic boot-relative timestamp. Only non-negative offsets are
/// representable since this kernel has no wall-clock concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Timespec {
    /// Seconds since boot.
    pub sec: u64,
    /// Nanoseconds within the current second, `0..=999_999_999`.
    pub nsec: u64,
}

/// Directory entry type tag, as placed in [`DirEntry::d_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DType {
    /// Regular file.
    Reg = 0,
    /// Directory.
    Dir = 1,
    /// Symbolic link.
    Lnk = 2,
    /// Character device.
    Chr = 3,
    /// Block device.
    Blk = 4,
}

/// Maximum length of a [`DirEntry::d_name`] entry, NUL-padding included.
pub const D_NAME_MAX: usize = 60;

/// One `getdents` directory record, laid out exactly as handed to
/// userland.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DirEntry {
    /// Inode number.
    pub d_ino: u64,
    /// Offset of the *next* entry, for resuming a `getdents` call.
    pub d_off: u64,
    /// Total length of this record in bytes.
    pub d_reclen: u64,
    /// Entry type; see [`DType`].
    pub d_type: u8,
    /// NUL-padded name bytes.
    pub d_name: [u8; D_NAME_MAX],
}

impl DirEntry {
    /// Builds a record, truncating `name` to fit and NUL-padding the rest.
    #[must_use]
    pub fn new(d_ino: u64, d_off: u64, d_type: DType, name: &str) -> Self {
        let mut d_name = [0u8; D_NAME_MAX];
        let bytes = name.as_bytes();
        let n = bytes.len().min(D_NAME_MAX);
        d_name[..n].copy_from_slice(&bytes[..n]);
        Self {
            d_ino,
            d_off,
            d_reclen: core::mem::size_of::<Self>() as u64,
            d_type: d_type as u8,
            d_name,
        }
    }
}

/// Mode bit marking a regular file (OR-ed into [`Stat::mode`]'s high bits).
pub const IFREG: u32 = 0o100_000;
/// Mode bit marking a directory.
pub const IFDIR: u32 = 0o040_000;
/// Mode bit marking a symbolic link.
pub const IFLNK: u32 = 0o120_000;
/// Mode bit marking a character device.
pub const IFCHR: u32 = 0o020_000;
/// Mode bit marking a block device.
pub const IFBLK: u32 = 0o060_000;
/// Mode bit marking a FIFO.
pub const IFIFO: u32 = 0o010_000;
/// Mode bit marking a UNIX-domain socket.
pub const ISOCK: u32 = 0o140_000;
/// Mask isolating the permission bits of [`Stat::mode`].
pub const PERMISSION_MASK: u32 = 0o7777;

/// `stat`/`fstat` result, laid out exactly as handed to userland.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Stat {
    /// Device number of the containing filesystem.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// Low 12 bits permission, high bits one of `IF*`/`ISOCK`.
    pub mode: u32,
    /// Hard link count.
    pub nlink: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Device number, if this node is itself a device.
    pub rdev: u64,
    /// Size in bytes.
    pub size: u64,
    /// Last access time.
    pub atime: Timespec,
    /// Last modification time.
    pub mtime: Timespec,
    /// Last status-change time.
    pub ctime: Timespec,
    /// Preferred I/O block size.
    pub blksize: u32,
    /// Number of 512-byte blocks allocated.
    pub blocks: u64,
}

/// Maximum length of each [`Utsname`] field, NUL-padding included.
pub const UTS_FIELD_LEN: usize = 65;

/// `uname` result. Each field is NUL-terminated within its fixed buffer.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Utsname {
    /// Kernel name.
    pub sysname: [u8; UTS_FIELD_LEN],
    /// Network node hostname.
    pub nodename: [u8; UTS_FIELD_LEN],
    /// Kernel release string.
    pub release: [u8; UTS_FIELD_LEN],
    /// Kernel build/version string.
    pub version: [u8; UTS_FIELD_LEN],
    /// Hardware architecture name.
    pub machine: [u8; UTS_FIELD_LEN],
}

impl Utsname {
    fn field(s: &str) -> [u8; UTS_FIELD_LEN] {
        let mut buf = [0u8; UTS_FIELD_LEN];
        let bytes = s.as_bytes();
        let n = bytes.len().min(UTS_FIELD_LEN - 1);
        buf[..n].copy_from_slice(&bytes[..n]);
        buf
    }

    /// Builds a uname response from its five fields, truncating as needed.
    #[must_use]
    pub fn new(sysname: &str, nodename: &str, release: &str, version: &str, machine: &str) -> Self {
        Self {
            sysname: Self::field(sysname),
            nodename: Self::field(nodename),
            release: Self::field(release),
            version: Self::field(version),
            machine: Self::field(machine),
        }
    }
}

/// One `ListProcs` record, laid out exactly as handed to userland.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ProcRecord {
    /// This process's id.
    pub pid: u32,
    /// Its parent's id.
    pub ppid: u32,
    /// Lifecycle state; see the kernel's own `ProcessState` for the
    /// meaning of each value.
    pub state: u8,
    /// Exit code, meaningful only once `state` marks a zombie.
    pub exit_code: i32,
}

/// Maximum length of a [`MountRecord::path`] entry, NUL-padding included.
pub const MOUNT_RECORD_PATH_MAX: usize = 64;

/// One `ListMounts` record, laid out exactly as handed to userland.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct MountRecord {
    /// The mount's `FsHandle`.
    pub handle: u8,
    /// Filesystem kind; see the kernel's own `FsKind` for the meaning of
    /// each value.
    pub kind: u8,
    /// Length of the valid prefix of `path`.
    pub path_len: u16,
    /// NUL-padded mount path.
    pub path: [u8; MOUNT_RECORD_PATH_MAX],
}

impl MountRecord {
    /// Builds a record, truncating `path` to fit.
    #[must_use]
    pub fn new(handle: u8, kind: u8, path: &str) -> Self {
        let mut buf = [0u8; MOUNT_RECORD_PATH_MAX];
        let n = path.len().min(MOUNT_RECORD_PATH_MAX);
        buf[..n].copy_from_slice(&path.as_bytes()[..n]);
        Self {
            handle,
            kind,
            path_len: n as u16,
            path: buf,
        }
    }
}

/// `sysconf` request topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysconfRequest {
    /// Page size in bytes (scalar).
    PageSize,
    /// Maximum open file descriptors per process (scalar).
    OpenMax,
    /// Maximum hostname length (scalar).
    HostNameMax,
    /// Total physical pages (scalar).
    PhysPages,
    /// Online logical CPUs (scalar).
    NprocOnline,
    /// Fills the caller's buffer with one [`Stat`]-adjacent process record
    /// per live process.
    ListProcs,
    /// Fills the caller's buffer with one mount-table row per mount.
    ListMounts,
    /// Fills the caller's buffer with a [`Utsname`].
    Uname,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_entry_truncates_long_names() {
        let long = "x".repeat(200);
        let entry = DirEntry::new(1, 0, DType::Reg, &long);
        assert_eq!(entry.d_name.len(), D_NAME_MAX);
    }

    #[test]
    fn dir_entry_reclen_matches_struct_size() {
        let entry = DirEntry::new(1, 0, DType::Dir, "etc");
        assert_eq!(entry.d_reclen as usize, core::mem::size_of::<DirEntry>());
    }

    #[test]
    fn mode_type_bits_are_distinct() {
        let modes = [IFREG, IFDIR, IFLNK, IFCHR, IFBLK, IFIFO, ISOCK];
        for i in 0..modes.len() {
            for j in (i + 1)..modes.len() {
                assert_ne!(modes[i], modes[j]);
            }
        }
    }

    #[test]
    fn permission_mask_isolates_low_bits() {
        let mode = IFREG | 0o644;
        assert_eq!(mode & PERMISSION_MASK, 0o644);
        assert_eq!(mode & !PERMISSION_MASK, IFREG);
    }

    #[test]
    fn utsname_nul_terminates_short_fields() {
        let uts = Utsname::new("corundum", "host", "0.1.0", "dev", "x86_64");
        assert_eq!(uts.sysname[8], 0);
        assert_eq!(&uts.sysname[..8], b"corundum");
    }

    #[test]
    fn utsname_truncates_overlong_fields() {
        let long = "y".repeat(100);
        let uts = Utsname::new(&long, "", "", "", "");
        assert_eq!(uts.sysname.len(), UTS_FIELD_LEN);
        assert_eq!(uts.sysname[UTS_FIELD_LEN - 1], 0);
    }
}
