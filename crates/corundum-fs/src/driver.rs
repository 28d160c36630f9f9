//! The per-filesystem driver contract.
//!
//! Every mounted filesystem (ext2, FAT, QNX, or the in-kernel devfs)
//! implements [`FileSystemDriver`] against inode numbers and an `FsHandle`
//! rather than owning its own path resolution — the VFS mount table owns
//! path-to-handle dispatch.

use corundum_core::id::FsHandle;

/// Kind of filesystem backing a mount row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    /// ext2/3/4-family filesystem.
    Ext,
    /// FAT12/16/32.
    Fat,
    /// QNX filesystem.
    Qnx,
    /// In-kernel device filesystem (`/dev`), not backed by a block device.
    Dev,
}

/// Status returned by every [`FileSystemDriver`] operation.
///
/// The syscall layer is responsible for translating this into an errno;
/// `NotSupported` specifically means "this driver never implements this
/// operation," distinct from `NotAllowed` (permission denied on a concrete
/// call).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsStatus {
    /// Operation completed successfully.
    Success,
    /// Argument out of range or otherwise malformed.
    InvalidValue,
    /// Attempted a mutation on a read-only mount.
    RoFailure,
    /// Underlying storage I/O failed.
    IoFailure,
    /// Permission check failed for this caller.
    NotAllowed,
    /// This driver does not implement the operation at all.
    NotSupported,
}

bitflags::bitflags! {
    /// POSIX-style permission bits, as stored in an inode and checked
    /// against a process's effective UID/umask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode: u32 {
        /// Owner read.
        const OWNER_READ  = 0o400;
        /// Owner write.
        const OWNER_WRITE = 0o200;
        /// Owner execute.
        const OWNER_EXEC  = 0o100;
        /// Group read.
        const GROUP_READ  = 0o040;
        /// Group write.
        const GROUP_WRITE = 0o020;
        /// Group execute.
        const GROUP_EXEC  = 0o010;
        /// Other read.
        const OTHER_READ  = 0o004;
        /// Other write.
        const OTHER_WRITE = 0o002;
        /// Other execute.
        const OTHER_EXEC  = 0o001;
    }
}

/// Kind of directory entry or inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Regular file.
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Character device special file.
    CharDevice,
    /// Block device special file.
    BlockDevice,
    /// Named pipe (FIFO) special file.
    Fifo,
}

/// Metadata returned by `Stat`/`Fstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Inode number within the owning mount.
    pub inode: u64,
    /// Node kind.
    pub kind: NodeKind,
    /// Size in bytes (0 for directories and most special files).
    pub size: u64,
    /// Permission bits.
    pub mode: Mode,
    /// Owning UID.
    pub uid: u32,
    /// Owning GID.
    pub gid: u32,
}

/// A single entry yielded by `Read_Entries`.
#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    /// Inode number of the entry.
    pub inode: u64,
    /// Entry kind.
    pub kind: NodeKind,
    /// Name, stored inline (no heap).
    pub name: [u8; Self::MAX_NAME],
    /// Length of the valid prefix of `name`.
    pub name_len: u8,
}

impl DirEntry {
    /// Maximum inline name length.
    pub const MAX_NAME: usize = 64;

    /// Builds a directory entry from a name slice, truncating if it exceeds
    /// [`Self::MAX_NAME`].
    pub fn new(inode: u64, kind: NodeKind, name: &str) -> Self {
        let mut buf = [0u8; Self::MAX_NAME];
        let len = name.len().min(Self::MAX_NAME);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            inode,
            kind,
            name: buf,
            name_len: len as u8,
        }
    }

    /// The entry's name as a `&str`.
    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }
}

/// The operation contract every mounted filesystem implements.
///
/// All methods default to returning [`FsStatus::NotSupported`] so a driver
/// (devfs being the prime example) only needs to implement the subset of
/// operations that make sense for it.
pub trait FileSystemDriver {
    /// Probes whether `self` recognizes the filesystem found on the backing
    /// device handle it was constructed with. Called during auto-probe
    /// mount (`mount` without an explicit kind).
    fn probe(&self) -> bool {
        false
    }

    /// Flushes and detaches this filesystem. `force` allows the unmount to
    /// proceed even if the driver still holds unflushed data.
    fn unmount(&mut self, _force: bool) -> FsStatus {
        FsStatus::Success
    }

    /// Opens (or looks up) the inode at `path`, relative to this driver's
    /// root.
    fn open(&self, _path: &str) -> Result<u64, FsStatus> {
        Err(FsStatus::NotSupported)
    }

    /// Creates a new node of the given kind.
    fn create_node(&mut self, _parent: u64, _name: &str, _kind: NodeKind, _mode: Mode) -> Result<u64, FsStatus> {
        Err(FsStatus::NotSupported)
    }

    /// Creates a symbolic link.
    fn create_symbolic_link(&mut self, _parent: u64, _name: &str, _target: &str) -> Result<u64, FsStatus> {
        Err(FsStatus::NotSupported)
    }

    /// Creates a hard link to an existing inode.
    fn create_hard_link(&mut self, _parent: u64, _name: &str, _target_inode: u64) -> FsStatus {
        FsStatus::NotSupported
    }

    /// Renames/moves an entry.
    fn rename(&mut self, _old_parent: u64, _old_name: &str, _new_parent: u64, _new_name: &str) -> FsStatus {
        FsStatus::NotSupported
    }

    /// Removes a directory entry.
    fn unlink(&mut self, _parent: u64, _name: &str) -> FsStatus {
        FsStatus::NotSupported
    }

    /// Releases any per-open-file-descriptor state associated with `inode`.
    fn close(&mut self, _inode: u64) -> FsStatus {
        FsStatus::Success
    }

    /// Reads directory entries starting at `offset`, filling as many of
    /// `out` as fit. Returns the number filled.
    fn read_entries(&self, _inode: u64, _offset: usize, _out: &mut [DirEntry]) -> Result<usize, FsStatus> {
        Err(FsStatus::NotSupported)
    }

    /// Reads a symlink's target into `out`, returning the byte count.
    fn read_symbolic_link(&self, _inode: u64, _out: &mut [u8]) -> Result<usize, FsStatus> {
        Err(FsStatus::NotSupported)
    }

    /// Reads up to `buf.len()` bytes starting at `offset`.
    fn read(&self, _inode: u64, _offset: u64, _buf: &mut [u8]) -> Result<usize, FsStatus> {
        Err(FsStatus::NotSupported)
    }

    /// Writes `buf` starting at `offset`.
    fn write(&mut self, _inode: u64, _offset: u64, _buf: &[u8]) -> Result<usize, FsStatus> {
        Err(FsStatus::NotSupported)
    }

    /// Returns metadata for `inode`.
    fn stat(&self, _inode: u64) -> Result<Stat, FsStatus> {
        Err(FsStatus::NotSupported)
    }

    /// Truncates (or extends with zeros) `inode` to `len` bytes.
    fn truncate(&mut self, _inode: u64, _len: u64) -> FsStatus {
        FsStatus::NotSupported
    }

    /// Driver-specific `ioctl`.
    fn io_control(&mut self, _inode: u64, _request: u64, _arg: u64) -> Result<u64, FsStatus> {
        Err(FsStatus::NotSupported)
    }

    /// Flushes the whole filesystem's dirty state to the backing device.
    fn synchronize_fs(&mut self) -> FsStatus {
        FsStatus::Success
    }

    /// Flushes a single inode's dirty state.
    fn synchronize_inode(&mut self, _inode: u64) -> FsStatus {
        FsStatus::Success
    }

    /// Changes an inode's permission bits.
    fn change_mode(&mut self, _inode: u64, _mode: Mode) -> FsStatus {
        FsStatus::NotSupported
    }

    /// Changes an inode's owning UID/GID.
    fn change_owner(&mut self, _inode: u64, _uid: u32, _gid: u32) -> FsStatus {
        FsStatus::NotSupported
    }

    /// Applies a umask to a proposed mode for a new node.
    fn apply_umask(&self, mode: Mode, umask: Mode) -> Mode {
        mode & !umask
    }
}

/// Marker so mount rows can be addressed without naming the concrete driver
/// type; the driver itself still lives behind `&mut dyn FileSystemDriver`
/// wherever the kernel binary stores it.
pub type DriverHandle = FsHandle;

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub;
    impl FileSystemDriver for Stub {}

    #[test]
    fn default_methods_report_not_supported() {
        let stub = Stub;
        assert_eq!(stub.open("/x"), Err(FsStatus::NotSupported));
        assert_eq!(stub.stat(0), Err(FsStatus::NotSupported));
    }

    #[test]
    fn default_unmount_and_sync_succeed() {
        let mut stub = Stub;
        assert_eq!(stub.unmount(false), FsStatus::Success);
        assert_eq!(stub.synchronize_fs(), FsStatus::Success);
    }

    #[test]
    fn apply_umask_clears_bits() {
        let stub = Stub;
        let mode = Mode::OWNER_READ | Mode::OWNER_WRITE | Mode::OTHER_WRITE;
        let umask = Mode::OTHER_WRITE;
        assert_eq!(stub.apply_umask(mode, umask), Mode::OWNER_READ | Mode::OWNER_WRITE);
    }

    #[test]
    fn dir_entry_truncates_long_names() {
        let long_name = "a".repeat(DirEntry::MAX_NAME + 10);
        let entry = DirEntry::new(1, NodeKind::Regular, &long_name);
        assert_eq!(entry.name_len as usize, DirEntry::MAX_NAME);
    }
}
