//! Global thread/cluster table and the dispatch operations the timer ISR and
//! syscall handlers call into.
//!
//! Mirrors the physical memory manager's pattern of a single
//! [`BinarySemaphore`]-protected global, since scheduler state is touched
//! from both the timer ISR (which runs with interrupts disabled and must
//! never block) and syscall handlers.

use corundum_core::id::{Cid, CpuId, Pid, Tid};
use corundum_core::sync::BinarySemaphore;
use corundum_mm::addr::PhysAddr;
use planck_noalloc::vec::ArrayVec;

use crate::cluster::{Cluster, ClusterPolicy};
use crate::deadline::{self, Deadline};
use crate::thread::{Thread, ThreadState};
use crate::{SchedError, MAX_CLUSTERS, MAX_THREADS};

/// Per-core bookkeeping the dispatch loop needs: which thread and process is
/// currently resident on this core.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreState {
    current_thread: Option<Tid>,
}

impl CoreState {
    /// The thread currently running on this core, if any.
    pub fn current_thread(&self) -> Option<Tid> {
        self.current_thread
    }
}

/// The global scheduler table: every thread, every cluster, and each core's
/// current resident thread.
pub struct Dispatcher {
    threads: ArrayVec<Thread, MAX_THREADS>,
    clusters: ArrayVec<Cluster, MAX_CLUSTERS>,
    cores: [CoreState; corundum_core::cpu_local::MAX_CPUS],
    next_tid: u32,
}

impl Dispatcher {
    fn new() -> Self {
        Self {
            threads: ArrayVec::new(),
            clusters: ArrayVec::new(),
            cores: [CoreState { current_thread: None }; corundum_core::cpu_local::MAX_CPUS],
            next_tid: 1,
        }
    }

    fn find_thread_idx(&self, tid: Tid) -> Option<usize> {
        self.threads.iter().position(|t| t.tid() == tid)
    }

    fn find_cluster_idx(&self, cid: Cid) -> Option<usize> {
        self.clusters.iter().position(|c| c.id() == cid)
    }

    /// Registers a new scheduling cluster. Called during boot before any
    /// thread is created.
    pub fn create_cluster(
        &mut self,
        id: Cid,
        policy: ClusterPolicy,
        quantum_ticks: u32,
        interruptible: bool,
        period_ticks: u32,
    ) -> Result<(), SchedError> {
        self.clusters
            .try_push(Cluster::new(id, policy, quantum_ticks, interruptible, period_ticks))
            .map_err(|_| SchedError::TableFull)
    }

    /// `Create_User_Thread`: allocates a TID, builds a TCB, and enqueues it
    /// in the named cluster's ready queue. Returns `Tid::new(0)` (the spec's
    /// sentinel invalid TID) if the thread table is full or the cluster does
    /// not exist — callers map that back to whatever failure convention the
    /// syscall layer uses.
    pub fn create_user_thread(
        &mut self,
        pid: Pid,
        cluster: Cid,
        page_table_root: PhysAddr,
        tcb_base: u64,
    ) -> Tid {
        if self.find_cluster_idx(cluster).is_none() {
            return Tid::new(0);
        }
        if self.threads.is_full() {
            return Tid::new(0);
        }

        let tid = Tid::new(self.next_tid);
        self.next_tid += 1;

        let thread = Thread::new(tid, pid, cluster, page_table_root, tcb_base);
        if self.threads.try_push(thread).is_err() {
            return Tid::new(0);
        }

        let idx = self.find_cluster_idx(cluster).expect("checked above");
        if !self.clusters.as_mut_slice()[idx].enqueue(tid) {
            self.threads.pop();
            return Tid::new(0);
        }

        tid
    }

    /// Deletes every thread belonging to `pid`. Used by `exec`'s
    /// thread-replacement step, which tears down the calling process's
    /// entire thread group before installing a single new thread.
    pub fn delete_threads_for_pid(&mut self, pid: Pid) -> usize {
        let mut victims: ArrayVec<Tid, MAX_THREADS> = ArrayVec::new();
        for t in self.threads.iter().filter(|t| t.pid() == pid) {
            let _ = victims.try_push(t.tid());
        }
        let mut removed = 0;
        for tid in victims.as_slice() {
            if self.delete_thread(*tid).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// `Delete_Thread`: removes a TID regardless of its current state.
    pub fn delete_thread(&mut self, tid: Tid) -> Result<(), SchedError> {
        let idx = self.find_thread_idx(tid).ok_or(SchedError::NoSuchThread)?;
        let cluster_id = self.threads.as_slice()[idx].cluster();
        if let Some(cidx) = self.find_cluster_idx(cluster_id) {
            self.clusters.as_mut_slice()[cidx].remove(tid);
        }
        self.threads.swap_remove(idx);

        for core in self.cores.iter_mut() {
            if core.current_thread == Some(tid) {
                core.current_thread = None;
            }
        }

        Ok(())
    }

    /// `Set_Mono_Thread(tid, b)`.
    pub fn set_mono_thread(&mut self, tid: Tid, b: bool, affinity: CpuId) -> Result<(), SchedError> {
        let idx = self.find_thread_idx(tid).ok_or(SchedError::NoSuchThread)?;
        self.threads.as_mut_slice()[idx].set_mono_thread(b, affinity);
        Ok(())
    }

    /// `Is_Mono_Thread(tid)`.
    pub fn is_mono_thread(&self, tid: Tid) -> Result<bool, SchedError> {
        let idx = self.find_thread_idx(tid).ok_or(SchedError::NoSuchThread)?;
        Ok(self.threads.as_slice()[idx].is_mono_thread())
    }

    /// `Set_Deadlines(tid, runtime, period)`. Admission is checked against
    /// every other deadline thread currently in the same cluster; rejects
    /// with [`SchedError::UtilizationExceeded`] if admitting would push
    /// total cluster utilization above 1.
    pub fn set_deadlines(&mut self, tid: Tid, runtime_ticks: u32, period_ticks: u32) -> Result<(), SchedError> {
        let idx = self.find_thread_idx(tid).ok_or(SchedError::NoSuchThread)?;
        let cluster_id = self.threads.as_slice()[idx].cluster();
        let candidate = Deadline::new(runtime_ticks, period_ticks);

        let mut existing: ArrayVec<Deadline, MAX_THREADS> = ArrayVec::new();
        for (i, t) in self.threads.iter().enumerate() {
            if i != idx && t.cluster() == cluster_id {
                if let Some(d) = t.deadline() {
                    let _ = existing.try_push(d);
                }
            }
        }

        if !deadline::admits(existing.as_slice(), candidate) {
            return Err(SchedError::UtilizationExceeded);
        }

        self.threads.as_mut_slice()[idx].set_deadline(candidate);
        Ok(())
    }

    /// `Yield`: forces the calling thread's cluster to rotate immediately,
    /// returning the TID that should be dispatched next on `core`.
    ///
    /// Skips any candidate whose mono-thread affinity excludes `core`, per
    /// the spec's dispatch-loop rule; if every ready thread in the cluster is
    /// pinned elsewhere, the caller keeps running.
    pub fn yield_now(&mut self, calling_cluster: Cid, core: CpuId) -> Option<Tid> {
        self.pick_next(calling_cluster, core, true)
    }

    /// The timer IPI entry point: advances every cluster's tick counter (for
    /// `RR` clusters) and returns the TID that should run next on `core`, if
    /// a rotation picked a new head.
    pub fn timer_tick(&mut self, cluster: Cid, core: CpuId) -> Option<Tid> {
        self.pick_next(cluster, core, false)
    }

    fn pick_next(&mut self, cluster: Cid, core: CpuId, force: bool) -> Option<Tid> {
        let cidx = self.find_cluster_idx(cluster)?;

        // Deadline threads with runtime remaining in the current period
        // preempt best-effort work; a full accounting of "current period"
        // ticks elapsed lives in the kernel binary's timer bookkeeping, so
        // this crate exposes the ready-queue head after rotation and lets
        // the caller cross-check deadline state via `thread_deadline`.
        let candidate = self.clusters.as_mut_slice()[cidx].tick(force);

        match candidate {
            Some(tid) => {
                if let Some(idx) = self.find_thread_idx(tid) {
                    if self.threads.as_slice()[idx].may_run_on(core) {
                        return Some(tid);
                    }
                }
                self.first_runnable_on_core(cidx, core)
            }
            None => None,
        }
    }

    fn first_runnable_on_core(&self, cidx: usize, core: CpuId) -> Option<Tid> {
        let cluster = &self.clusters.as_slice()[cidx];
        for _ in 0..cluster.len() {
            let tid = cluster.peek()?;
            if let Some(idx) = self.find_thread_idx(tid) {
                if self.threads.as_slice()[idx].may_run_on(core) {
                    return Some(tid);
                }
            }
        }
        None
    }

    /// Records that `tid` is now the resident thread on `core`.
    pub fn set_current(&mut self, core: CpuId, tid: Option<Tid>) {
        self.cores[core.as_usize()].current_thread = tid;
        if let Some(tid) = tid {
            if let Some(idx) = self.find_thread_idx(tid) {
                self.threads.as_mut_slice()[idx].set_state(ThreadState::Running);
            }
        }
    }

    /// The thread currently resident on `core`, if any.
    pub fn current(&self, core: CpuId) -> Option<Tid> {
        self.cores[core.as_usize()].current_thread
    }

    /// Looks up an existing thread's saved page table root.
    pub fn thread_page_table_root(&self, tid: Tid) -> Result<PhysAddr, SchedError> {
        let idx = self.find_thread_idx(tid).ok_or(SchedError::NoSuchThread)?;
        Ok(self.threads.as_slice()[idx].page_table_root())
    }

    /// Looks up the cluster an existing thread belongs to, so the timer ISR
    /// can tick the right cluster for whatever thread is currently resident
    /// on a core.
    pub fn thread_cluster(&self, tid: Tid) -> Result<Cid, SchedError> {
        let idx = self.find_thread_idx(tid).ok_or(SchedError::NoSuchThread)?;
        Ok(self.threads.as_slice()[idx].cluster())
    }

    /// Looks up the process an existing thread belongs to, so the syscall
    /// layer can resolve the calling process from its currently-running
    /// thread.
    pub fn thread_pid(&self, tid: Tid) -> Result<Pid, SchedError> {
        let idx = self.find_thread_idx(tid).ok_or(SchedError::NoSuchThread)?;
        Ok(self.threads.as_slice()[idx].pid())
    }

    /// Number of threads currently tracked, across all clusters.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Mutable access to an existing thread's saved GP register context, for
    /// the kernel binary's arch layer to seed a fresh entry point into
    /// (`exec`) or populate on context switch.
    pub fn thread_gp_context_mut(&mut self, tid: Tid) -> Result<&mut [u8; crate::thread::GP_CONTEXT_SIZE], SchedError> {
        let idx = self.find_thread_idx(tid).ok_or(SchedError::NoSuchThread)?;
        Ok(self.threads.as_mut_slice()[idx].gp_context_mut())
    }
}

static DISPATCHER: BinarySemaphore<Option<Dispatcher>> = BinarySemaphore::new(None);

/// Initializes the global dispatcher. Called once during boot.
///
/// # Panics
///
/// Panics if called more than once.
pub fn init() {
    let mut d = DISPATCHER.seize();
    assert!(d.is_none(), "dispatcher already initialized");
    *d = Some(Dispatcher::new());
}

/// Executes a closure with exclusive access to the global dispatcher.
///
/// # Panics
///
/// Panics if called before [`init`].
pub fn with<R>(f: impl FnOnce(&mut Dispatcher) -> R) -> R {
    let mut d = DISPATCHER.seize();
    f(d.as_mut().expect("dispatcher not initialized"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_dispatcher() -> Dispatcher {
        Dispatcher::new()
    }

    #[test]
    fn create_user_thread_enqueues_in_cluster() {
        let mut d = new_dispatcher();
        d.create_cluster(Cid::new(0), ClusterPolicy::RoundRobin, 4, true, 0)
            .unwrap();
        let tid = d.create_user_thread(Pid::new(1), Cid::new(0), PhysAddr::new(0x1000), 0);
        assert_ne!(tid, Tid::new(0));
        assert_eq!(d.thread_count(), 1);
    }

    #[test]
    fn create_user_thread_fails_for_unknown_cluster() {
        let mut d = new_dispatcher();
        let tid = d.create_user_thread(Pid::new(1), Cid::new(99), PhysAddr::new(0x1000), 0);
        assert_eq!(tid, Tid::new(0));
    }

    #[test]
    fn delete_thread_removes_regardless_of_state() {
        let mut d = new_dispatcher();
        d.create_cluster(Cid::new(0), ClusterPolicy::Cooperative, 1, true, 0)
            .unwrap();
        let tid = d.create_user_thread(Pid::new(1), Cid::new(0), PhysAddr::new(0x1000), 0);
        assert!(d.delete_thread(tid).is_ok());
        assert_eq!(d.thread_count(), 0);
        assert_eq!(d.delete_thread(tid), Err(SchedError::NoSuchThread));
    }

    #[test]
    fn yield_rotates_cooperative_cluster() {
        let mut d = new_dispatcher();
        d.create_cluster(Cid::new(0), ClusterPolicy::Cooperative, 1, true, 0)
            .unwrap();
        let t1 = d.create_user_thread(Pid::new(1), Cid::new(0), PhysAddr::new(0x1000), 0);
        let t2 = d.create_user_thread(Pid::new(1), Cid::new(0), PhysAddr::new(0x2000), 0);
        let _ = t1;
        let next = d.yield_now(Cid::new(0), CpuId::new(0));
        assert_eq!(next, Some(t2));
    }

    #[test]
    fn mono_thread_skipped_on_other_core() {
        let mut d = new_dispatcher();
        d.create_cluster(Cid::new(0), ClusterPolicy::Cooperative, 1, true, 0)
            .unwrap();
        let t1 = d.create_user_thread(Pid::new(1), Cid::new(0), PhysAddr::new(0x1000), 0);
        let t2 = d.create_user_thread(Pid::new(1), Cid::new(0), PhysAddr::new(0x2000), 0);
        d.set_mono_thread(t2, true, CpuId::new(1)).unwrap();

        // Rotating away from t1 would normally land on t2, but t2 is pinned
        // to core 1; dispatch on core 0 should skip it and stay on t1.
        let next = d.yield_now(Cid::new(0), CpuId::new(0));
        assert_eq!(next, Some(t1));
    }

    #[test]
    fn set_deadlines_rejects_over_utilization() {
        let mut d = new_dispatcher();
        d.create_cluster(Cid::new(0), ClusterPolicy::RoundRobin, 4, true, 0)
            .unwrap();
        let t1 = d.create_user_thread(Pid::new(1), Cid::new(0), PhysAddr::new(0x1000), 0);
        let t2 = d.create_user_thread(Pid::new(1), Cid::new(0), PhysAddr::new(0x2000), 0);
        assert!(d.set_deadlines(t1, 8, 10).is_ok());
        assert_eq!(d.set_deadlines(t2, 8, 10), Err(SchedError::UtilizationExceeded));
    }

    #[test]
    fn is_mono_thread_reports_flag() {
        let mut d = new_dispatcher();
        d.create_cluster(Cid::new(0), ClusterPolicy::Cooperative, 1, true, 0)
            .unwrap();
        let tid = d.create_user_thread(Pid::new(1), Cid::new(0), PhysAddr::new(0x1000), 0);
        assert_eq!(d.is_mono_thread(tid), Ok(false));
        d.set_mono_thread(tid, true, CpuId::new(0)).unwrap();
        assert_eq!(d.is_mono_thread(tid), Ok(true));
    }

    #[test]
    fn thread_cluster_reports_owning_cluster() {
        let mut d = new_dispatcher();
        d.create_cluster(Cid::new(0), ClusterPolicy::Cooperative, 1, true, 0)
            .unwrap();
        let tid = d.create_user_thread(Pid::new(1), Cid::new(0), PhysAddr::new(0x1000), 0);
        assert_eq!(d.thread_cluster(tid), Ok(Cid::new(0)));
    }

    #[test]
    fn thread_pid_reports_owning_process() {
        let mut d = new_dispatcher();
        d.create_cluster(Cid::new(0), ClusterPolicy::Cooperative, 1, true, 0)
            .unwrap();
        let tid = d.create_user_thread(Pid::new(7), Cid::new(0), PhysAddr::new(0x1000), 0);
        assert_eq!(d.thread_pid(tid), Ok(Pid::new(7)));
    }

    #[test]
    fn set_current_updates_core_and_thread_state() {
        let mut d = new_dispatcher();
        d.create_cluster(Cid::new(0), ClusterPolicy::Cooperative, 1, true, 0)
            .unwrap();
        let tid = d.create_user_thread(Pid::new(1), Cid::new(0), PhysAddr::new(0x1000), 0);
        d.set_current(CpuId::new(0), Some(tid));
        assert_eq!(d.current(CpuId::new(0)), Some(tid));
    }
}
