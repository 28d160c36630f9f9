//! Per-process resource limits.

/// Sentinel meaning "no limit" for any `u64` limit field.
pub const UNLIMITED: u64 = u64::MAX;

/// Resource limits attached to a process, inherited across `clone`/`exec`
/// and adjustable by the owning process (or a process holding the
/// appropriate MAC capability over it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum size in bytes of any file the process may grow via write or
    /// truncate. [`UNLIMITED`] disables the check.
    pub file_size_limit: u64,
    /// Maximum number of simultaneously open file descriptors.
    pub open_file_limit: u32,
    /// Maximum size in bytes of the process's virtual address space
    /// (sum of mapped region lengths).
    pub address_space_limit: u64,
    /// Maximum number of threads the process's clusters may hold in total.
    pub thread_limit: u32,
}

impl ResourceLimits {
    /// Default limits assigned to a freshly created process.
    pub const DEFAULT: Self = Self {
        file_size_limit: UNLIMITED,
        open_file_limit: 256,
        address_space_limit: UNLIMITED,
        thread_limit: 64,
    };
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_allow_unlimited_file_size() {
        assert_eq!(ResourceLimits::default().file_size_limit, UNLIMITED);
    }

    #[test]
    fn default_open_file_limit_is_256() {
        assert_eq!(ResourceLimits::default().open_file_limit, 256);
    }
}
