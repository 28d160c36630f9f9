//! The in-kernel device filesystem mounted at `/dev`.
//!
//! Individual hardware device drivers (PS/2, framebuffer, serial, …) are out
//! of scope here; this module only provides the always-present virtual
//! nodes (`null`, `zero`) and the routing check the syscall layer uses to
//! recognize a `/dev/...` path before it ever reaches the mount table.

use crate::driver::{FileSystemDriver, FsStatus, Mode, NodeKind, Stat};

/// Inode number of the `/dev` directory itself.
const ROOT_INODE: u64 = 0;
/// Inode number of `/dev/null`.
const NULL_INODE: u64 = 1;
/// Inode number of `/dev/zero`.
const ZERO_INODE: u64 = 2;

/// Returns the path remainder after `/dev/` if `path` names a device node,
/// e.g. `is_dev_path("/dev/null") == Some("null")`.
pub fn is_dev_path(path: &str) -> Option<&str> {
    path.strip_prefix("/dev/").filter(|rest| !rest.is_empty())
}

/// The device filesystem: `/dev/null` discards writes and reads as EOF,
/// `/dev/zero` reads as an infinite stream of zero bytes.
pub struct DevFs;

impl FileSystemDriver for DevFs {
    fn probe(&self) -> bool {
        // devfs is never auto-probed onto a backing device; it is mounted
        // explicitly by the kernel binary at boot.
        false
    }

    fn open(&self, path: &str) -> Result<u64, FsStatus> {
        match path.trim_start_matches('/') {
            "" => Ok(ROOT_INODE),
            "null" => Ok(NULL_INODE),
            "zero" => Ok(ZERO_INODE),
            _ => Err(FsStatus::InvalidValue),
        }
    }

    fn read(&self, inode: u64, _offset: u64, buf: &mut [u8]) -> Result<usize, FsStatus> {
        match inode {
            NULL_INODE => Ok(0),
            ZERO_INODE => {
                buf.fill(0);
                Ok(buf.len())
            }
            ROOT_INODE => Err(FsStatus::InvalidValue),
            _ => Err(FsStatus::InvalidValue),
        }
    }

    fn write(&mut self, inode: u64, _offset: u64, buf: &[u8]) -> Result<usize, FsStatus> {
        match inode {
            NULL_INODE | ZERO_INODE => Ok(buf.len()),
            _ => Err(FsStatus::InvalidValue),
        }
    }

    fn stat(&self, inode: u64) -> Result<Stat, FsStatus> {
        let kind = match inode {
            ROOT_INODE => NodeKind::Directory,
            NULL_INODE | ZERO_INODE => NodeKind::CharDevice,
            _ => return Err(FsStatus::InvalidValue),
        };
        Ok(Stat {
            inode,
            kind,
            size: 0,
            mode: Mode::OWNER_READ | Mode::OWNER_WRITE | Mode::GROUP_READ | Mode::OTHER_READ,
            uid: 0,
            gid: 0,
        })
    }

    fn read_entries(&self, inode: u64, offset: usize, out: &mut [crate::driver::DirEntry]) -> Result<usize, FsStatus> {
        if inode != ROOT_INODE {
            return Err(FsStatus::InvalidValue);
        }
        let entries = [
            crate::driver::DirEntry::new(NULL_INODE, NodeKind::CharDevice, "null"),
            crate::driver::DirEntry::new(ZERO_INODE, NodeKind::CharDevice, "zero"),
        ];
        let mut n = 0;
        for entry in entries.iter().skip(offset) {
            if n >= out.len() {
                break;
            }
            out[n] = *entry;
            n += 1;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_dev_path_recognizes_dev_prefix() {
        assert_eq!(is_dev_path("/dev/null"), Some("null"));
        assert_eq!(is_dev_path("/etc/passwd"), None);
        assert_eq!(is_dev_path("/dev/"), None);
    }

    #[test]
    fn null_read_is_always_eof() {
        let fs = DevFs;
        let mut buf = [0xFFu8; 8];
        let n = fs.read(NULL_INODE, 0, &mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn zero_read_fills_buffer() {
        let fs = DevFs;
        let mut buf = [0xFFu8; 8];
        let n = fs.read(ZERO_INODE, 0, &mut buf).unwrap();
        assert_eq!(n, 8);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn writes_to_null_and_zero_are_discarded_but_report_full_length() {
        let mut fs = DevFs;
        assert_eq!(fs.write(NULL_INODE, 0, b"hello"), Ok(5));
        assert_eq!(fs.write(ZERO_INODE, 0, b"hello"), Ok(5));
    }

    #[test]
    fn root_lists_both_nodes() {
        let fs = DevFs;
        let mut out = [crate::driver::DirEntry::new(0, NodeKind::Regular, ""); 4];
        let n = fs.read_entries(ROOT_INODE, 0, &mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(out[0].name(), "null");
        assert_eq!(out[1].name(), "zero");
    }
}
