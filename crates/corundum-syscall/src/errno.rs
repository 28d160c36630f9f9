//! Errno taxonomy and the `(value, errno)` syscall return convention.

use core::fmt;

/// Sentinel returned in the value slot of a failed syscall.
///
/// Every syscall conceptually returns `(value, errno)`; on failure `value`
/// is all-ones and `errno` carries the reason.
pub const FAILURE_SENTINEL: u64 = u64::MAX;

/// Stable errno names. Numeric values are this kernel's own; they have no
/// relationship to any other kernel's errno numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Errno {
    /// No error; present so a `Result<T, Errno>` success path never needs
    /// to smuggle this variant, but callers comparing raw codes have a
    /// zero to compare against.
    NoError = 0,
    /// Bad file descriptor.
    BadFile = 1,
    /// Permission denied.
    BadAccess = 2,
    /// No child processes.
    Child = 3,
    /// I/O error.
    Io = 4,
    /// Invalid seek for this descriptor kind.
    InvalidSeek = 5,
    /// Invalid argument value.
    InvalidValue = 6,
    /// Not a TTY.
    NotATty = 7,
    /// Too many open files.
    TooManyFiles = 8,
    /// A string argument exceeded the kernel's scan cap.
    StringTooLong = 9,
    /// A userland pointer failed validation.
    WouldFault = 10,
    /// A non-blocking operation would otherwise have blocked.
    WouldBlock = 11,
    /// No such file, directory, process, or mount.
    NoEntity = 12,
    /// Allocation failure.
    NoMemory = 13,
    /// Recognized but unimplemented syscall or operation.
    NotImplemented = 14,
    /// Write attempted against a read-only filesystem.
    ReadOnlyFs = 15,
    /// Operation not permitted by the file's mode bits.
    BadPermissions = 16,
    /// Write would exceed the file size limit.
    FileTooBig = 17,
    /// Resource (device, mount point) already in use.
    Busy = 18,
    /// Caller-provided buffer too small to hold the result.
    NotBigEnough = 19,
}

impl Errno {
    /// Returns the raw numeric code.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Errno::NoError => "no error",
            Errno::BadFile => "bad file descriptor",
            Errno::BadAccess => "permission denied",
            Errno::Child => "no child processes",
            Errno::Io => "I/O error",
            Errno::InvalidSeek => "invalid seek",
            Errno::InvalidValue => "invalid value",
            Errno::NotATty => "not a tty",
            Errno::TooManyFiles => "too many open files",
            Errno::StringTooLong => "string too long",
            Errno::WouldFault => "bad userland pointer",
            Errno::WouldBlock => "would block",
            Errno::NoEntity => "no such entity",
            Errno::NoMemory => "out of memory",
            Errno::NotImplemented => "not implemented",
            Errno::ReadOnlyFs => "read-only filesystem",
            Errno::BadPermissions => "bad permissions",
            Errno::FileTooBig => "file too big",
            Errno::Busy => "busy",
            Errno::NotBigEnough => "buffer not big enough",
        };
        f.write_str(name)
    }
}

/// The raw `(value, errno)` pair every syscall handler produces before the
/// entry thunk splits it across return registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawResult {
    /// Successful return value, or [`FAILURE_SENTINEL`] on failure.
    pub value: u64,
    /// Failure reason; [`Errno::NoError`] when `value != FAILURE_SENTINEL`.
    pub errno: Errno,
}

impl RawResult {
    /// Builds a success result.
    #[must_use]
    pub const fn ok(value: u64) -> Self {
        Self { value, errno: Errno::NoError }
    }

    /// Builds a failure result.
    #[must_use]
    pub const fn err(errno: Errno) -> Self {
        Self { value: FAILURE_SENTINEL, errno }
    }

    /// Converts a `Result<u64, Errno>` into the wire pair.
    #[must_use]
    pub const fn from_result(result: Result<u64, Errno>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(errno) => Self::err(errno),
        }
    }

    /// True if `value` is the failure sentinel.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        self.value == FAILURE_SENTINEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_carries_no_error() {
        let r = RawResult::ok(42);
        assert_eq!(r.value, 42);
        assert_eq!(r.errno, Errno::NoError);
        assert!(!r.is_failure());
    }

    #[test]
    fn err_carries_sentinel() {
        let r = RawResult::err(Errno::BadFile);
        assert_eq!(r.value, FAILURE_SENTINEL);
        assert!(r.is_failure());
    }

    #[test]
    fn from_result_round_trips_both_arms() {
        assert_eq!(RawResult::from_result(Ok(7)), RawResult::ok(7));
        assert_eq!(RawResult::from_result(Err(Errno::Io)), RawResult::err(Errno::Io));
    }

    #[test]
    fn errno_display_is_human_readable() {
        assert_eq!(format!("{}", Errno::WouldFault), "bad userland pointer");
    }
}
