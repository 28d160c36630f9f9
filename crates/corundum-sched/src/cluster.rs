//! Scheduling domains.
//!
//! Every runnable thread belongs to exactly one cluster. A cluster's policy
//! governs when a timer tick rotates its ready queue; `Cooperative`
//! clusters only rotate on a voluntary `Yield`.

use corundum_core::id::{Cid, Tid};
use planck_noalloc::vec::ArrayVec;

/// Maximum threads a single cluster's ready queue can hold.
pub const MAX_READY: usize = 256;

/// A cluster's rotation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPolicy {
    /// Rotates the ready queue on every timer tick once the current
    /// thread's quantum is exhausted.
    RoundRobin,
    /// Rotates only when the running thread calls `Yield`.
    Cooperative,
}

/// A scheduling domain: a ready queue plus the policy governing it.
pub struct Cluster {
    id: Cid,
    policy: ClusterPolicy,
    quantum_ticks: u32,
    interruptible: bool,
    period_ticks: u32,
    ready: ArrayVec<Tid, MAX_READY>,
    ticks_since_rotation: u32,
}

impl Cluster {
    /// Creates a new, empty cluster.
    ///
    /// `period_ticks` bounds how often the cluster's whole ready queue is
    /// expected to complete one full rotation; it is informational (used by
    /// `Deadline` utilization accounting for threads in this cluster) and
    /// does not itself drive rotation — `quantum_ticks` does that.
    pub fn new(
        id: Cid,
        policy: ClusterPolicy,
        quantum_ticks: u32,
        interruptible: bool,
        period_ticks: u32,
    ) -> Self {
        Self {
            id,
            policy,
            quantum_ticks: quantum_ticks.max(1),
            interruptible,
            period_ticks,
            ready: ArrayVec::new(),
            ticks_since_rotation: 0,
        }
    }

    /// This cluster's identifier.
    pub fn id(&self) -> Cid {
        self.id
    }

    /// Whether ISRs may preempt a thread running in this cluster mid-quantum.
    pub fn is_interruptible(&self) -> bool {
        self.interruptible
    }

    /// The cluster's time-slice period in ticks.
    pub fn period_ticks(&self) -> u32 {
        self.period_ticks
    }

    /// Appends a thread to the tail of the ready queue.
    ///
    /// Returns `false` if the cluster's ready queue is already full.
    pub fn enqueue(&mut self, tid: Tid) -> bool {
        self.ready.try_push(tid).is_ok()
    }

    /// Removes a specific thread from the ready queue, wherever it sits
    /// (used by `Delete_Thread`, which may target a non-head thread).
    pub fn remove(&mut self, tid: Tid) -> bool {
        if let Some(pos) = self.ready.iter().position(|&t| t == tid) {
            self.ready.remove(pos);
            true
        } else {
            false
        }
    }

    /// Returns the thread at the head of the ready queue without removing it.
    pub fn peek(&self) -> Option<Tid> {
        self.ready.as_slice().first().copied()
    }

    /// Rotates the head thread to the tail and returns the new head, if any.
    ///
    /// A `RoundRobin` cluster rotates every tick once `quantum_ticks` have
    /// elapsed since the last rotation; a `Cooperative` cluster only rotates
    /// when `force` is set (i.e. on an explicit `Yield`).
    pub fn tick(&mut self, force: bool) -> Option<Tid> {
        match self.policy {
            ClusterPolicy::Cooperative => {
                if force {
                    self.rotate();
                }
            }
            ClusterPolicy::RoundRobin => {
                self.ticks_since_rotation += 1;
                if force || self.ticks_since_rotation >= self.quantum_ticks {
                    self.ticks_since_rotation = 0;
                    self.rotate();
                }
            }
        }
        self.peek()
    }

    fn rotate(&mut self) {
        if self.ready.len() > 1 {
            let front = self.ready.remove(0);
            let _ = self.ready.try_push(front);
        }
    }

    /// Number of threads currently in the ready queue.
    pub fn len(&self) -> usize {
        self.ready.len()
    }

    /// Whether the ready queue is empty.
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u32) -> Cid {
        Cid::new(n)
    }
    fn tid(n: u32) -> Tid {
        Tid::new(n)
    }

    #[test]
    fn cooperative_cluster_does_not_rotate_on_plain_tick() {
        let mut cluster = Cluster::new(cid(0), ClusterPolicy::Cooperative, 10, true, 0);
        cluster.enqueue(tid(1));
        cluster.enqueue(tid(2));
        assert_eq!(cluster.tick(false), Some(tid(1)));
        assert_eq!(cluster.tick(false), Some(tid(1)));
    }

    #[test]
    fn cooperative_cluster_rotates_on_yield() {
        let mut cluster = Cluster::new(cid(0), ClusterPolicy::Cooperative, 10, true, 0);
        cluster.enqueue(tid(1));
        cluster.enqueue(tid(2));
        assert_eq!(cluster.tick(true), Some(tid(2)));
    }

    #[test]
    fn round_robin_rotates_after_quantum() {
        let mut cluster = Cluster::new(cid(0), ClusterPolicy::RoundRobin, 3, true, 0);
        cluster.enqueue(tid(1));
        cluster.enqueue(tid(2));
        assert_eq!(cluster.tick(false), Some(tid(1)));
        assert_eq!(cluster.tick(false), Some(tid(1)));
        assert_eq!(cluster.tick(false), Some(tid(2)));
    }

    #[test]
    fn remove_non_head_thread() {
        let mut cluster = Cluster::new(cid(0), ClusterPolicy::RoundRobin, 3, true, 0);
        cluster.enqueue(tid(1));
        cluster.enqueue(tid(2));
        cluster.enqueue(tid(3));
        assert!(cluster.remove(tid(2)));
        assert_eq!(cluster.len(), 2);
        assert!(!cluster.remove(tid(2)));
    }

    #[test]
    fn single_thread_never_rotates_away() {
        let mut cluster = Cluster::new(cid(0), ClusterPolicy::RoundRobin, 1, true, 0);
        cluster.enqueue(tid(1));
        assert_eq!(cluster.tick(false), Some(tid(1)));
        assert_eq!(cluster.tick(true), Some(tid(1)));
    }
}
