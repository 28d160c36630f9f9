//! Kernel-owned pools of FIFO and UNIX-socket endpoints.
//!
//! `corundum_ipc`'s [`Fifo`] and [`Socket`] are self-contained,
//! non-allocating structs with no reference count of their own; this
//! module is the fixed-size arena the process FD table's
//! [`crate::proc::FdTarget`] variants index into. Slots are not recycled on
//! close — only the endpoint's open flag flips — matching the bounded,
//! never-compacted style the rest of this kernel's tables use.

use corundum_core::sync::BinarySemaphore;
use corundum_ipc::socket::MAX_SOCK_PATH;
use corundum_ipc::{Fifo, Socket};
use corundum_syscall::Errno;

/// Upper bound on simultaneously live FIFOs.
pub const MAX_FIFOS: usize = 32;
/// Upper bound on simultaneously live sockets.
pub const MAX_SOCKETS: usize = 32;

struct BoundPath {
    buf: [u8; MAX_SOCK_PATH],
    len: u8,
}

impl BoundPath {
    const EMPTY: Self = Self { buf: [0; MAX_SOCK_PATH], len: 0 };

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len as usize]).unwrap_or("")
    }
}

/// The global FIFO/socket arena.
pub struct IpcPools {
    fifos: [Option<Fifo>; MAX_FIFOS],
    sockets: [Option<Socket>; MAX_SOCKETS],
    bound_paths: [Option<BoundPath>; MAX_SOCKETS],
}

impl IpcPools {
    fn new() -> Self {
        Self {
            fifos: core::array::from_fn(|_| None),
            sockets: core::array::from_fn(|_| None),
            bound_paths: core::array::from_fn(|_| None),
        }
    }

    /// `Pipe`: allocates a fresh FIFO and returns its pool index.
    pub fn create_fifo(&mut self) -> Result<u16, Errno> {
        let idx = self.fifos.iter().position(Option::is_none).ok_or(Errno::NoMemory)?;
        self.fifos[idx] = Some(Fifo::new());
        Ok(idx as u16)
    }

    /// Borrows the FIFO at `idx`.
    pub fn fifo(&self, idx: u16) -> Result<&Fifo, Errno> {
        self.fifos.get(idx as usize).and_then(Option::as_ref).ok_or(Errno::BadFile)
    }

    /// `Socket`: allocates a fresh, unbound socket and returns its pool
    /// index.
    pub fn create_socket(&mut self) -> Result<u16, Errno> {
        let idx = self.sockets.iter().position(Option::is_none).ok_or(Errno::NoMemory)?;
        self.sockets[idx] = Some(Socket::new());
        self.bound_paths[idx] = None;
        Ok(idx as u16)
    }

    /// Installs a socket that already exists (e.g. one returned by
    /// `Socket::accept`) into a fresh pool slot.
    pub fn adopt_socket(&mut self, socket: Socket) -> Result<u16, Errno> {
        let idx = self.sockets.iter().position(Option::is_none).ok_or(Errno::NoMemory)?;
        self.sockets[idx] = Some(socket);
        self.bound_paths[idx] = None;
        Ok(idx as u16)
    }

    /// Borrows the socket at `idx`.
    pub fn socket(&self, idx: u16) -> Result<&Socket, Errno> {
        self.sockets.get(idx as usize).and_then(Option::as_ref).ok_or(Errno::BadFile)
    }

    /// Records `path` as bound to the socket at `idx`, so a later `connect`
    /// can resolve the path back to a socket reference (`Socket`'s own
    /// bound path is private with no accessor, hence this parallel table).
    pub fn record_bind(&mut self, idx: u16, path: &str) -> Result<(), Errno> {
        if path.len() > MAX_SOCK_PATH {
            return Err(Errno::StringTooLong);
        }
        if self.bound_paths.iter().flatten().any(|p| p.as_str() == path) {
            return Err(Errno::Busy);
        }
        let mut entry = BoundPath::EMPTY;
        entry.buf[..path.len()].copy_from_slice(path.as_bytes());
        entry.len = path.len() as u8;
        *self.bound_paths.get_mut(idx as usize).ok_or(Errno::BadFile)? = Some(entry);
        Ok(())
    }

    /// Finds the socket pool index bound to `path`, if any.
    pub fn find_by_path(&self, path: &str) -> Option<u16> {
        self.bound_paths
            .iter()
            .position(|p| p.as_ref().is_some_and(|p| p.as_str() == path))
            .map(|i| i as u16)
    }
}

static POOLS: BinarySemaphore<Option<IpcPools>> = BinarySemaphore::new(None);

/// Initializes the global IPC pools. Called once during boot.
///
/// # Panics
///
/// Panics if called more than once.
pub fn init() {
    let mut pools = POOLS.seize();
    assert!(pools.is_none(), "ipc pools already initialized");
    *pools = Some(IpcPools::new());
}

/// Executes a closure with exclusive access to the global IPC pools.
///
/// # Panics
///
/// Panics if called before [`init`].
pub fn with<R>(f: impl FnOnce(&mut IpcPools) -> R) -> R {
    let mut pools = POOLS.seize();
    f(pools.as_mut().expect("ipc pools not initialized"))
}
