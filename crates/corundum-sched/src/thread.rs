//! Thread control blocks.

use corundum_core::id::{Cid, CpuId, Pid, Tid};
use corundum_mm::addr::PhysAddr;

use crate::deadline::Deadline;

/// Size in bytes of the saved general-purpose register context.
///
/// Large enough for the widest of the supported architectures' GP context
/// (x86_64: 16 GPRs + flags + segment selectors; riscv64: 31 GPRs), rounded
/// up. The kernel binary's arch layer owns the exact field layout; this
/// crate only needs a stable size to embed in the TCB.
pub const GP_CONTEXT_SIZE: usize = 256;

/// Size in bytes of the saved FP/SIMD register context (x86_64 `xsave` area
/// / riscv64 `F`/`D` extension registers).
pub const FP_CONTEXT_SIZE: usize = 512;

/// A thread's run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Sitting in its cluster's ready queue, eligible to be picked.
    Ready,
    /// Currently executing on some core.
    Running,
    /// Parked on a [`corundum_core::sync::WaitQueue`] or blocking I/O; not in
    /// any ready queue.
    Blocked,
    /// Terminated but not yet reaped (kept only long enough for `Delete_Thread`
    /// bookkeeping or parent notification; threads have no Unix-style exit
    /// status collection of their own — that lives at the process level).
    Zombie,
}

/// A thread control block.
///
/// Owns the saved register contexts, a reference to its process's root page
/// table, its cluster membership, and optional core affinity / deadline
/// scheduling parameters. The actual context switch (storing/restoring these
/// bytes into CPU registers) is architecture-specific and lives in the
/// kernel binary; this struct only holds the bytes and the bookkeeping.
pub struct Thread {
    tid: Tid,
    pid: Pid,
    cluster: Cid,
    state: ThreadState,
    page_table_root: PhysAddr,
    tcb_base: u64,
    gp_context: [u8; GP_CONTEXT_SIZE],
    fp_context: [u8; FP_CONTEXT_SIZE],
    mono_thread: bool,
    affinity: Option<CpuId>,
    deadline: Option<Deadline>,
}

impl Thread {
    /// Creates a new thread in the `Ready` state with zeroed register
    /// contexts (populated by the kernel binary before first dispatch).
    pub fn new(tid: Tid, pid: Pid, cluster: Cid, page_table_root: PhysAddr, tcb_base: u64) -> Self {
        Self {
            tid,
            pid,
            cluster,
            state: ThreadState::Ready,
            page_table_root,
            tcb_base,
            gp_context: [0; GP_CONTEXT_SIZE],
            fp_context: [0; FP_CONTEXT_SIZE],
            mono_thread: false,
            affinity: None,
            deadline: None,
        }
    }

    /// This thread's identifier.
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// The owning process.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The cluster this thread belongs to.
    pub fn cluster(&self) -> Cid {
        self.cluster
    }

    /// Reassigns this thread to a different cluster (the caller is
    /// responsible for moving it between the old and new cluster's ready
    /// queues).
    pub fn set_cluster(&mut self, cluster: Cid) {
        self.cluster = cluster;
    }

    /// Current run state.
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Updates the run state.
    pub fn set_state(&mut self, state: ThreadState) {
        self.state = state;
    }

    /// Physical address of this thread's process's root page table.
    pub fn page_table_root(&self) -> PhysAddr {
        self.page_table_root
    }

    /// Userland TLS base (the TCB pointer), loaded into the arch-specific
    /// thread-pointer register on dispatch.
    pub fn tcb_base(&self) -> u64 {
        self.tcb_base
    }

    /// Saved general-purpose register context.
    pub fn gp_context(&self) -> &[u8; GP_CONTEXT_SIZE] {
        &self.gp_context
    }

    /// Mutable access to the saved GP context, for the arch layer to fill in
    /// on context switch.
    pub fn gp_context_mut(&mut self) -> &mut [u8; GP_CONTEXT_SIZE] {
        &mut self.gp_context
    }

    /// Saved FP/SIMD register context.
    pub fn fp_context(&self) -> &[u8; FP_CONTEXT_SIZE] {
        &self.fp_context
    }

    /// Mutable access to the saved FP context.
    pub fn fp_context_mut(&mut self) -> &mut [u8; FP_CONTEXT_SIZE] {
        &mut self.fp_context
    }

    /// Whether this thread is restricted to a single designated core.
    pub fn is_mono_thread(&self) -> bool {
        self.mono_thread
    }

    /// Sets the mono-thread flag and its pinned core.
    ///
    /// Clearing the flag (`b = false`) leaves the last affinity recorded but
    /// inert; a later `Set_Mono_Thread(tid, true)` reuses it unless the
    /// caller supplies a new one.
    pub fn set_mono_thread(&mut self, b: bool, affinity: CpuId) {
        self.mono_thread = b;
        if b {
            self.affinity = Some(affinity);
        }
    }

    /// The core this thread is pinned to, if mono-threaded.
    pub fn affinity(&self) -> Option<CpuId> {
        if self.mono_thread {
            self.affinity
        } else {
            None
        }
    }

    /// Returns whether this thread may run on the given core: either it has
    /// no affinity, or the core matches.
    pub fn may_run_on(&self, core: CpuId) -> bool {
        match self.affinity() {
            Some(pinned) => pinned == core,
            None => true,
        }
    }

    /// This thread's deadline parameters, if any.
    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    /// Installs deadline parameters (`Set_Deadlines`). Callers must check
    /// admission via [`crate::deadline::admits`] first.
    pub fn set_deadline(&mut self, deadline: Deadline) {
        self.deadline = Some(deadline);
    }

    /// Clears any deadline parameters, returning the thread to plain
    /// best-effort scheduling within its cluster.
    pub fn clear_deadline(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread() -> Thread {
        Thread::new(Tid::new(1), Pid::new(1), Cid::new(0), PhysAddr::new(0x1000), 0)
    }

    #[test]
    fn new_thread_starts_ready_with_no_affinity() {
        let t = thread();
        assert_eq!(t.state(), ThreadState::Ready);
        assert!(!t.is_mono_thread());
        assert_eq!(t.affinity(), None);
    }

    #[test]
    fn set_mono_thread_pins_affinity() {
        let mut t = thread();
        t.set_mono_thread(true, CpuId::new(2));
        assert!(t.is_mono_thread());
        assert_eq!(t.affinity(), Some(CpuId::new(2)));
        assert!(t.may_run_on(CpuId::new(2)));
        assert!(!t.may_run_on(CpuId::new(0)));
    }

    #[test]
    fn clearing_mono_thread_lifts_affinity_restriction() {
        let mut t = thread();
        t.set_mono_thread(true, CpuId::new(1));
        t.set_mono_thread(false, CpuId::new(1));
        assert_eq!(t.affinity(), None);
        assert!(t.may_run_on(CpuId::new(0)));
    }

    #[test]
    fn deadline_starts_unset() {
        let t = thread();
        assert_eq!(t.deadline(), None);
    }

    #[test]
    fn gp_context_is_mutable() {
        let mut t = thread();
        t.gp_context_mut()[0] = 0xAB;
        assert_eq!(t.gp_context()[0], 0xAB);
    }
}
