//! VFS mount table, path compounding, and the per-filesystem driver
//! contract shared by ext2/FAT/QNX drivers and the in-kernel devfs.
//!
//! Individual filesystem drivers beyond the uniform operations they must
//! implement, and individual hardware device drivers, live in the kernel
//! binary or further out-of-tree crates; this crate only owns the
//! architecture-independent dispatch surface.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod devfs;
pub mod driver;
pub mod mount;
pub mod path;

pub use driver::{DirEntry, FileSystemDriver, FsKind, FsStatus, Mode, NodeKind, Stat};
pub use mount::{MountError, MountTable, MAX_MOUNTS};
