//! Syscall dispatch: routes a raw `(nr, a0..a4)` tuple from either arch
//! trampoline to the handler group `corundum_syscall::numbers` assigns it
//! to, and enforces MAC permissions/capabilities before the handler runs.

mod io;
mod ipc;
mod memory;
mod process;
mod query;
mod user;
mod vfs;

use corundum_core::id::Pid;
use corundum_syscall::mac::EnforcementMode;
use corundum_syscall::numbers::{fd, ipc as ipc_nr, memory as mem_nr, process as proc_nr, system, vfs as vfs_nr};
use corundum_syscall::{Errno, RawResult};

pub(crate) use user::{read_user_bytes, read_user_cstr, write_user_bytes};

/// The currently-running process, resolved from the calling thread's TID
/// via the scheduler.
pub(crate) fn current_pid() -> Result<Pid, Errno> {
    let core = crate::percpu::current().core_id();
    let tid = corundum_sched::dispatch::with(|d| d.current(core)).ok_or(Errno::NoEntity)?;
    corundum_sched::dispatch::with(|d| d.thread_pid(tid)).map_err(|_| Errno::NoEntity)
}

/// FNV-1a over a path (or other resource name), used as the opaque
/// `resource` key in a process's MAC permission list.
pub(crate) fn hash_resource(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    s.bytes().fold(OFFSET, |h, b| (h ^ b as u64).wrapping_mul(PRIME))
}

/// Applies a process's [`EnforcementMode`] to a MAC check failure: logs (for
/// `DenyAndScream`), kills the process (for `Kill`), or simply reports the
/// denial back to the caller (for `Deny`).
pub(crate) fn enforce(pid: Pid, name: &str, mode: EnforcementMode) -> Errno {
    match mode {
        EnforcementMode::Deny => {}
        EnforcementMode::DenyAndScream => {
            crate::log::mac_scream(pid, name);
        }
        EnforcementMode::Kill => {
            crate::log::mac_scream(pid, name);
            let _ = process::terminate(pid, crate::config::MAC_KILL_EXIT_CODE);
        }
    }
    Errno::BadAccess
}

/// Dispatches one syscall and returns its `(value, errno)` pair as a
/// [`RawResult`]. Both arch trampolines funnel through this; only the
/// register-to-argument convention differs between them.
pub fn dispatch(nr: u64, a0: u64, a1: u64, a2: u64, a3: u64, a4: u64) -> RawResult {
    let group = nr as u32;
    let result = if proc_nr::RANGE_START <= group && group < proc_nr::RANGE_END {
        process::dispatch(group - proc_nr::RANGE_START, a0, a1, a2, a3, a4)
    } else if fd::RANGE_START <= group && group < fd::RANGE_END {
        io::dispatch(group - fd::RANGE_START, a0, a1, a2, a3, a4)
    } else if mem_nr::RANGE_START <= group && group < mem_nr::RANGE_END {
        memory::dispatch(group - mem_nr::RANGE_START, a0, a1, a2, a3, a4)
    } else if vfs_nr::RANGE_START <= group && group < vfs_nr::RANGE_END {
        vfs::dispatch(group - vfs_nr::RANGE_START, a0, a1, a2, a3, a4)
    } else if ipc_nr::RANGE_START <= group && group < ipc_nr::RANGE_END {
        ipc::dispatch(group - ipc_nr::RANGE_START, a0, a1, a2, a3, a4)
    } else if system::RANGE_START <= group && group < system::RANGE_END {
        query::dispatch(group - system::RANGE_START, a0, a1, a2, a3, a4)
    } else {
        Err(Errno::NotImplemented)
    };
    RawResult::from_result(result)
}

/// Entry point called directly by the riscv64 trap handler, which has
/// `a0`/`a1` return registers free to carry the full `(value, errno)` pair.
pub fn raw_dispatch(nr: u64, a0: u64, a1: u64, a2: u64, a3: u64, a4: u64) -> RawResult {
    dispatch(nr, a0, a1, a2, a3, a4)
}

/// The `extern "C"` symbol the x86_64 `SYSCALL` trampoline calls by name
/// (`sym corundum_syscall_dispatch` in its naked assembly).
///
/// # Safety
///
/// Must only be reached from the trampoline, with arguments already
/// remapped from the Linux-style `rdi,rsi,rdx,r10,r8` syscall ABI into this
/// function's plain SysV `a0..a4` order.
#[unsafe(no_mangle)]
pub extern "C" fn corundum_syscall_dispatch(nr: u64, a0: u64, a1: u64, a2: u64, a3: u64, a4: u64) -> u64 {
    raw_dispatch(nr, a0, a1, a2, a3, a4).value
}
