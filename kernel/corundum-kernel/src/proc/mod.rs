//! The process table: PID allocation, per-process file descriptors, CWD,
//! resource limits, and MAC capabilities/permissions/enforcement mode.
//!
//! Mirrors `corundum_sched::dispatch`'s global-registry pattern (a single
//! lock-protected static), but processes are addressed by a fixed slot
//! index rather than appended to an `ArrayVec`: a process's PID must stay
//! valid (for `wait`) after the process itself becomes a zombie, so slots
//! are reused in place rather than compacted on exit.

use core::sync::atomic::{AtomicU64, Ordering};

use corundum_core::id::{Fd, FsHandle, Pid};
use corundum_core::limits::ResourceLimits;
use corundum_core::sync::BinarySemaphore;
use corundum_fs::path::MAX_PATH;
use corundum_mm::addr::PhysAddr;
use corundum_mm::address_space::AddressSpace;
use corundum_syscall::flags::OpenFlags;
use corundum_syscall::mac::{Capabilities, EnforcementMode, PermissionEntry, Permissions};
use corundum_syscall::Errno;

#[cfg(target_arch = "x86_64")]
pub use crate::arch::x86_64::paging::FourLevelPaging as ArchMapper;
#[cfg(target_arch = "riscv64")]
pub use crate::arch::riscv64::paging::Sv39Paging as ArchMapper;

/// Upper bound on simultaneously live processes (including unreaped
/// zombies).
pub const MAX_PROCESSES: usize = 64;
/// Upper bound on a single process's open file descriptors.
pub const MAX_FDS: usize = 256;
/// Upper bound on a process's MAC permission-list entries.
pub const MAX_PERMISSIONS: usize = 32;

/// What a file descriptor slot refers to.
#[derive(Clone, Copy)]
pub enum FdTarget {
    /// An open VFS node: mount handle plus the driver's own inode number.
    Vfs {
        /// Mount row the node belongs to.
        fs: FsHandle,
        /// Driver-assigned inode number.
        inode: u64,
    },
    /// The read end of the FIFO at this pool index.
    FifoRead(u16),
    /// The write end of the FIFO at this pool index.
    FifoWrite(u16),
    /// The socket at this pool index.
    Socket(u16),
    /// The boot console (stdin/stdout/stderr before any real TTY exists).
    Console,
}

/// One open file descriptor.
#[derive(Clone, Copy)]
pub struct FdEntry {
    /// What this descriptor refers to.
    pub target: FdTarget,
    /// Current byte offset, meaningful only for [`FdTarget::Vfs`].
    pub offset: u64,
    /// Flags this descriptor was opened with.
    pub flags: OpenFlags,
}

/// Coarse process lifecycle state. Thread-level scheduling state lives in
/// `corundum_sched`; this only tracks whether a PID is still reapable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// At least one thread of this process may still run.
    Alive,
    /// Every thread has exited; `exit_code` is valid and `wait` may reap it.
    Zombie,
}

/// Error from a process table operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    /// The table already holds [`MAX_PROCESSES`] rows.
    TableFull,
    /// No row exists for the given PID.
    NoSuchProcess,
    /// The process's FD table is already at [`ResourceLimits::open_file_limit`].
    TooManyFiles,
    /// No open descriptor at the given slot.
    BadFile,
}

impl From<ProcError> for Errno {
    fn from(e: ProcError) -> Self {
        match e {
            ProcError::TableFull => Errno::NoMemory,
            ProcError::NoSuchProcess => Errno::NoEntity,
            ProcError::TooManyFiles => Errno::TooManyFiles,
            ProcError::BadFile => Errno::BadFile,
        }
    }
}

/// One process table row.
pub struct Process {
    pid: Pid,
    ppid: Pid,
    state: ProcessState,
    exit_code: i32,
    cwd: [u8; MAX_PATH],
    cwd_len: u16,
    fds: [Option<FdEntry>; MAX_FDS],
    address_space: AddressSpace<ArchMapper>,
    limits: ResourceLimits,
    capabilities: Capabilities,
    permissions: [Option<PermissionEntry>; MAX_PERMISSIONS],
    enforcement: EnforcementMode,
}

impl Process {
    fn new(pid: Pid, ppid: Pid, address_space: AddressSpace<ArchMapper>, capabilities: Capabilities) -> Self {
        let mut cwd = [0u8; MAX_PATH];
        cwd[0] = b'/';
        let mut fds = [None; MAX_FDS];
        let console = FdEntry {
            target: FdTarget::Console,
            offset: 0,
            flags: OpenFlags::empty(),
        };
        fds[Fd::STDIN.as_usize()] = Some(console);
        fds[Fd::STDOUT.as_usize()] = Some(console);
        fds[Fd::STDERR.as_usize()] = Some(console);
        Self {
            pid,
            ppid,
            state: ProcessState::Alive,
            exit_code: 0,
            cwd,
            cwd_len: 1,
            fds,
            address_space,
            limits: ResourceLimits::DEFAULT,
            capabilities,
            permissions: [None; MAX_PERMISSIONS],
            enforcement: EnforcementMode::Deny,
        }
    }

    /// This process's PID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The PID of the process that created this one.
    pub fn ppid(&self) -> Pid {
        self.ppid
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Exit code recorded at the most recent thread-group exit. Only
    /// meaningful once [`Process::state`] is [`ProcessState::Zombie`].
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Current working directory.
    pub fn cwd(&self) -> &str {
        core::str::from_utf8(&self.cwd[..self.cwd_len as usize]).unwrap_or("/")
    }

    /// Sets the current working directory, truncating if it exceeds
    /// [`MAX_PATH`].
    pub fn set_cwd(&mut self, path: &str) {
        let len = path.len().min(MAX_PATH);
        self.cwd[..len].copy_from_slice(&path.as_bytes()[..len]);
        self.cwd_len = len as u16;
    }

    /// The process's own address space, for mapping/unmapping and user
    /// pointer validation.
    pub fn address_space(&self) -> &AddressSpace<ArchMapper> {
        &self.address_space
    }

    /// Resource limits currently in effect.
    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    /// Replaces this process's resource limits.
    pub fn set_limits(&mut self, limits: ResourceLimits) {
        self.limits = limits;
    }

    /// MAC capability bits currently held.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// `Set_MAC_Capabilities`: narrows (never widens) the held capability
    /// set. Callers are responsible for rejecting an attempt to set bits
    /// outside the current set before calling this.
    pub fn intersect_capabilities(&mut self, mask: Capabilities) {
        self.capabilities &= mask;
    }

    /// Current enforcement mode.
    pub fn enforcement(&self) -> EnforcementMode {
        self.enforcement
    }

    /// Sets the enforcement mode.
    pub fn set_enforcement(&mut self, mode: EnforcementMode) {
        self.enforcement = mode;
    }

    /// `Add_MAC_Permissions`: appends a permission-list entry, merging its
    /// bits into an existing entry for the same resource if one exists.
    pub fn add_permission(&mut self, entry: PermissionEntry) -> Result<(), ProcError> {
        for slot in self.permissions.iter_mut().flatten() {
            if slot.resource == entry.resource {
                slot.bits |= entry.bits;
                return Ok(());
            }
        }
        let slot = self.permissions.iter_mut().find(|s| s.is_none()).ok_or(ProcError::TableFull)?;
        *slot = Some(entry);
        Ok(())
    }

    /// Looks up the permission bits granted for `resource`, or
    /// [`Permissions::empty`] if no entry exists.
    pub fn permissions_for(&self, resource: u64) -> Permissions {
        self.permissions
            .iter()
            .flatten()
            .find(|e| e.resource == resource)
            .map_or(Permissions::empty(), |e| e.bits)
    }

    /// Finds the lowest-numbered unused descriptor and installs `entry`
    /// there.
    pub fn install_fd(&mut self, entry: FdEntry) -> Result<Fd, ProcError> {
        let cap = (self.limits.open_file_limit as usize).min(MAX_FDS);
        let idx = self.fds[..cap].iter().position(Option::is_none).ok_or(ProcError::TooManyFiles)?;
        self.fds[idx] = Some(entry);
        Ok(Fd::new(idx as u32))
    }

    /// Installs `entry` at a caller-chosen descriptor number, replacing
    /// (and implicitly closing) whatever was there before. Used by `dup2`-
    /// style clone paths.
    pub fn install_fd_at(&mut self, fd: Fd, entry: FdEntry) -> Result<(), ProcError> {
        let slot = self.fds.get_mut(fd.as_usize()).ok_or(ProcError::BadFile)?;
        *slot = Some(entry);
        Ok(())
    }

    /// Returns the descriptor at `fd`, if open.
    pub fn fd(&self, fd: Fd) -> Result<&FdEntry, ProcError> {
        self.fds.get(fd.as_usize()).and_then(Option::as_ref).ok_or(ProcError::BadFile)
    }

    /// Returns a mutable reference to the descriptor at `fd`, if open.
    pub fn fd_mut(&mut self, fd: Fd) -> Result<&mut FdEntry, ProcError> {
        self.fds.get_mut(fd.as_usize()).and_then(Option::as_mut).ok_or(ProcError::BadFile)
    }

    /// Closes and returns the descriptor at `fd`.
    pub fn take_fd(&mut self, fd: Fd) -> Result<FdEntry, ProcError> {
        self.fds.get_mut(fd.as_usize()).and_then(Option::take).ok_or(ProcError::BadFile)
    }

    /// Closes every close-on-exec descriptor; others are left untouched.
    /// Called by `exec` after a successful image load.
    pub fn close_on_exec(&mut self) {
        for slot in self.fds.iter_mut() {
            let closes = matches!(slot, Some(e) if e.flags.contains(OpenFlags::CLOEXEC));
            if closes {
                *slot = None;
            }
        }
    }

    /// Replaces this process's address space wholesale, returning the old
    /// one. Used by `exec`, which only calls this once the new image has
    /// loaded successfully; the returned space is simply dropped, freeing
    /// its root table frame.
    pub fn replace_address_space(&mut self, space: AddressSpace<ArchMapper>) -> AddressSpace<ArchMapper> {
        core::mem::replace(&mut self.address_space, space)
    }
}

/// The global process table.
pub struct ProcessTable {
    rows: [Option<Process>; MAX_PROCESSES],
    next_pid: u32,
}

impl ProcessTable {
    fn new() -> Self {
        Self {
            rows: core::array::from_fn(|_| None),
            next_pid: Pid::INIT.as_u32(),
        }
    }

    fn find_idx(&self, pid: Pid) -> Option<usize> {
        self.rows.iter().position(|r| r.as_ref().is_some_and(|p| p.pid == pid))
    }

    /// Allocates a PID and installs a new process row owning
    /// `address_space`.
    pub fn create_process(
        &mut self,
        ppid: Pid,
        address_space: AddressSpace<ArchMapper>,
        capabilities: Capabilities,
    ) -> Result<Pid, ProcError> {
        let idx = self.rows.iter().position(Option::is_none).ok_or(ProcError::TableFull)?;
        let pid = Pid::new(self.next_pid);
        self.next_pid += 1;
        self.rows[idx] = Some(Process::new(pid, ppid, address_space, capabilities));
        Ok(pid)
    }

    /// Marks `pid` a zombie with the given exit code. The row itself stays
    /// until `reap` removes it, so `wait` can observe the exit code.
    pub fn mark_zombie(&mut self, pid: Pid, exit_code: i32) -> Result<(), ProcError> {
        let idx = self.find_idx(pid).ok_or(ProcError::NoSuchProcess)?;
        let proc = self.rows[idx].as_mut().expect("checked above");
        proc.state = ProcessState::Zombie;
        proc.exit_code = exit_code;
        Ok(())
    }

    /// Removes a zombie row entirely, freeing its slot for reuse. Called
    /// once a parent has collected its exit status via `wait`.
    pub fn reap(&mut self, pid: Pid) -> Result<(), ProcError> {
        let idx = self.find_idx(pid).ok_or(ProcError::NoSuchProcess)?;
        if self.rows[idx].as_ref().expect("checked above").state != ProcessState::Zombie {
            return Err(ProcError::NoSuchProcess);
        }
        self.rows[idx] = None;
        Ok(())
    }

    /// Finds the first zombie child of `ppid`, if any.
    pub fn first_zombie_child(&self, ppid: Pid) -> Option<Pid> {
        self.rows
            .iter()
            .flatten()
            .find(|p| p.ppid == ppid && p.state == ProcessState::Zombie)
            .map(|p| p.pid)
    }

    /// Whether `ppid` has any living or zombie child at all (used to decide
    /// between "no children" and "children exist, none exited yet").
    pub fn has_child(&self, ppid: Pid) -> bool {
        self.rows.iter().flatten().any(|p| p.ppid == ppid)
    }

    /// Executes `f` with mutable access to the row for `pid`.
    pub fn with_process<R>(&mut self, pid: Pid, f: impl FnOnce(&mut Process) -> R) -> Result<R, ProcError> {
        let idx = self.find_idx(pid).ok_or(ProcError::NoSuchProcess)?;
        Ok(f(self.rows[idx].as_mut().expect("checked above")))
    }

    /// Number of live table rows (alive or zombie).
    pub fn len(&self) -> usize {
        self.rows.iter().filter(|r| r.is_some()).count()
    }

    /// Whether the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates every live row, for `sysconf(ListProcs)`.
    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.rows.iter().flatten()
    }
}

static PROCESSES: BinarySemaphore<Option<ProcessTable>> = BinarySemaphore::new(None);

/// Initializes the global process table. Called once during boot.
///
/// # Panics
///
/// Panics if called more than once.
pub fn init() {
    let mut table = PROCESSES.seize();
    assert!(table.is_none(), "process table already initialized");
    *table = Some(ProcessTable::new());
}

/// Executes a closure with exclusive access to the global process table.
///
/// # Panics
///
/// Panics if called before [`init`].
pub fn with<R>(f: impl FnOnce(&mut ProcessTable) -> R) -> R {
    let mut table = PROCESSES.seize();
    f(table.as_mut().expect("process table not initialized"))
}

static KERNEL_ROOT: AtomicU64 = AtomicU64::new(0);

/// Records the physical address of the kernel-half root page table, so
/// `exec` can fork a fresh address space that shares it. Called once during
/// boot, after the bootloader's own root table is known.
pub fn set_kernel_root(root: PhysAddr) {
    KERNEL_ROOT.store(root.as_u64(), Ordering::Relaxed);
}

/// The kernel-half root page table physical address recorded by
/// [`set_kernel_root`].
///
/// # Panics
///
/// Panics if called before [`set_kernel_root`].
pub fn kernel_root() -> PhysAddr {
    let raw = KERNEL_ROOT.load(Ordering::Relaxed);
    assert_ne!(raw, 0, "kernel root page table not recorded yet");
    PhysAddr::new(raw)
}

/// Outcome of a [`ProgramLoader::load`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The image doesn't parse as anything this loader recognizes.
    BadImage,
    /// Mapping the image's segments into the target address space failed.
    NoMemory,
    /// No loader is registered.
    NotSupported,
}

/// Collaborator that turns an opened program image into a runnable address
/// space. ELF parsing and shebang interpretation are out of scope for this
/// crate set; `exec` itself only owns forking a fresh kernel-rooted address
/// space, re-rolling ASLR, and replacing the calling process's threads.
/// Everything about the image format is delegated here, following the same
/// contract shape as `corundum_fs::driver::FileSystemDriver`.
pub trait ProgramLoader: Sync {
    /// Loads `path` (already resolved against the caller's CWD) into
    /// `target`, mapping its segments through `alloc`. `argv_ptr`/`envp_ptr`
    /// are user pointers in the *caller's* still-live address space — the
    /// loader is responsible for copying what it needs out of them before
    /// `target` is swapped in. Returns the entry point the new thread
    /// should start at.
    fn load(
        &self,
        path: &str,
        argv_ptr: u64,
        envp_ptr: u64,
        target: &mut AddressSpace<ArchMapper>,
        alloc: &mut corundum_mm::pmm::BitmapFrameAllocRef<'_>,
    ) -> Result<u64, LoadError> {
        let _ = (path, argv_ptr, envp_ptr, target, alloc);
        Err(LoadError::NotSupported)
    }
}

static LOADER: BinarySemaphore<Option<&'static dyn ProgramLoader>> = BinarySemaphore::new(None);

/// Registers the loader `exec` delegates image loading to. Called at most
/// once during boot, before any process calls `exec`.
pub fn set_loader(loader: &'static dyn ProgramLoader) {
    *LOADER.seize() = Some(loader);
}

/// Executes `f` with the registered loader, or returns `None` if no loader
/// has been registered.
pub fn with_loader<R>(f: impl FnOnce(&dyn ProgramLoader) -> R) -> Option<R> {
    let loader = *LOADER.seize();
    loader.map(f)
}
