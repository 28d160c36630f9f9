//! Mandatory access control: process capabilities, per-resource permissions,
//! and the enforcement action taken on a violation.

bitflags::bitflags! {
    /// Coarse-grained privileges a process either holds or doesn't.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        /// May change its own scheduling cluster/policy/deadline.
        const SCHED    = 1 << 0;
        /// May `clone`/`exec` new processes.
        const SPAWN    = 1 << 1;
        /// May read the entropy device.
        const ENTROPY  = 1 << 2;
        /// May map memory beyond its default quota.
        const SYS_MEM  = 1 << 3;
        /// May open client network endpoints.
        const USE_NET  = 1 << 4;
        /// May administer network configuration.
        const SYS_NET  = 1 << 5;
        /// May `mount`/`umount`.
        const SYS_MNT  = 1 << 6;
        /// May `reboot`.
        const SYS_PWR  = 1 << 7;
        /// May trace another process's syscalls.
        const PTRACE   = 1 << 8;
        /// May change its effective UID.
        const SETUID   = 1 << 9;
        /// May modify its own MAC capabilities/permissions/enforcement mode.
        const SYS_MAC  = 1 << 10;
    }
}

bitflags::bitflags! {
    /// Per-resource-entry permission bits, paired with a path or device in a
    /// process's permission list.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        /// May view directory contents / enumerate entries.
        const CONTENTS = 1 << 0;
        /// May read.
        const READ     = 1 << 1;
        /// May write.
        const WRITE    = 1 << 2;
        /// May execute.
        const EXEC     = 1 << 3;
        /// May append (without rewriting existing bytes).
        const APPEND   = 1 << 4;
        /// May take advisory locks.
        const FLOCK    = 1 << 5;
        /// May open as a device (bypassing regular-file-only checks).
        const DEV      = 1 << 6;
    }
}

/// What happens when a process attempts an operation its MAC state forbids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementMode {
    /// Fail the syscall with [`crate::errno::Errno::BadAccess`]; no logging.
    Deny,
    /// Like [`EnforcementMode::Deny`], additionally logging
    /// `"PID N MAC failure NAME"`.
    DenyAndScream,
    /// Terminate the offending process immediately with exit code 42.
    Kill,
}

/// Exit code used when [`EnforcementMode::Kill`] terminates a process.
pub const MAC_KILL_EXIT_CODE: i32 = 42;

/// A single permission-list entry: a resource identifier paired with the
/// bits granted against it. The resource identifier (path hash, device
/// number, …) is left to the kernel binary; this crate only fixes the
/// shape of the entry's permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionEntry {
    /// Opaque resource key (kernel binary decides what it indexes).
    pub resource: u64,
    /// Bits granted for this resource.
    pub bits: Permissions,
}

impl PermissionEntry {
    /// Builds a new entry.
    #[must_use]
    pub const fn new(resource: u64, bits: Permissions) -> Self {
        Self { resource, bits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_compose_with_bitor() {
        let caps = Capabilities::SCHED | Capabilities::SPAWN;
        assert!(caps.contains(Capabilities::SCHED));
        assert!(caps.contains(Capabilities::SPAWN));
        assert!(!caps.contains(Capabilities::SYS_PWR));
    }

    #[test]
    fn permission_entry_carries_its_bits() {
        let entry = PermissionEntry::new(7, Permissions::READ | Permissions::WRITE);
        assert!(entry.bits.contains(Permissions::READ));
        assert!(!entry.bits.contains(Permissions::EXEC));
    }

    #[test]
    fn enforcement_modes_are_distinct() {
        assert_ne!(EnforcementMode::Deny, EnforcementMode::Kill);
    }
}
