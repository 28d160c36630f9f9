//! Pseudo-terminal primary/secondary pairs.

use corundum_core::sync::Mutex;

use crate::fifo::Fifo;

bitflags::bitflags! {
    /// `c_lflag`-style local mode bits (the subset this kernel cares about).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LocalFlags: u32 {
        /// Canonical (line-buffered) input mode.
        const ICANON = 1 << 0;
        /// Echo input characters back to the secondary side's writer.
        const ECHO   = 1 << 1;
        /// Generate signals on INTR/QUIT/SUSP characters.
        const ISIG   = 1 << 2;
    }
}

/// Terminal I/O settings, as read/written by `TCGETS`/`TCSETS*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermIos {
    /// Local mode flags.
    pub lflag: LocalFlags,
    /// End-of-line character.
    pub eol: u8,
    /// Interrupt character (typically `^C`).
    pub intr: u8,
}

impl Default for TermIos {
    fn default() -> Self {
        Self {
            lflag: LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ISIG,
            eol: b'\n',
            intr: 0x03,
        }
    }
}

/// Terminal window size, as read/written by `TIOCGWINSZ`/`TIOCSWINSZ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WinSize {
    /// Rows, in character cells.
    pub rows: u16,
    /// Columns, in character cells.
    pub cols: u16,
}

/// `ioctl` request numbers this PTY understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtyIoctl {
    /// Read the current `TermIos`.
    TcGets,
    /// Write `TermIos` immediately.
    TcSets,
    /// Write `TermIos` after draining pending output.
    TcSetsw,
    /// Write `TermIos` after draining output and discarding pending input.
    TcSetsf,
    /// Read the current window size.
    TiocGwinsz,
    /// Write the window size.
    TiocSwinsz,
}

/// A primary/secondary pseudo-terminal pair.
///
/// Primary-to-secondary and secondary-to-primary bytes travel over two
/// independent [`Fifo`]s; `TermIos`/`WinSize` are shared mutable state
/// reachable from either side via `ioctl`.
pub struct Pty {
    to_secondary: Fifo,
    to_primary: Fifo,
    termios: Mutex<TermIos>,
    winsize: Mutex<WinSize>,
}

impl Pty {
    /// Creates a new PTY pair with default terminal settings.
    pub fn new() -> Self {
        Self {
            to_secondary: Fifo::new(),
            to_primary: Fifo::new(),
            termios: Mutex::new(TermIos::default()),
            winsize: Mutex::new(WinSize::default()),
        }
    }

    /// Writes from the primary side (keyboard input, typically).
    pub fn primary_write(&self, buf: &[u8], blocking: bool) -> Result<usize, crate::fifo::PipeStatus> {
        self.to_secondary.write(buf, blocking)
    }

    /// Reads on the primary side (program output, typically).
    pub fn primary_read(&self, buf: &mut [u8], blocking: bool) -> Result<usize, crate::fifo::PipeStatus> {
        self.to_primary.read(buf, blocking)
    }

    /// Writes from the secondary side (program output).
    pub fn secondary_write(&self, buf: &[u8], blocking: bool) -> Result<usize, crate::fifo::PipeStatus> {
        self.to_primary.write(buf, blocking)
    }

    /// Reads on the secondary side (keyboard input as seen by the program).
    pub fn secondary_read(&self, buf: &mut [u8], blocking: bool) -> Result<usize, crate::fifo::PipeStatus> {
        self.to_secondary.read(buf, blocking)
    }

    /// Dispatches a terminal `ioctl`. `arg_in` carries the argument for a
    /// `set` request; the return value carries the result for a `get`
    /// request, encoded into the caller-visible type by whoever calls this
    /// (the syscall layer owns the user-pointer marshalling).
    pub fn ioctl_termios(&self, req: PtyIoctl, arg_in: Option<TermIos>) -> Option<TermIos> {
        match req {
            PtyIoctl::TcGets => Some(*self.termios.lock()),
            PtyIoctl::TcSets | PtyIoctl::TcSetsw | PtyIoctl::TcSetsf => {
                if let Some(new) = arg_in {
                    *self.termios.lock() = new;
                }
                None
            }
            _ => None,
        }
    }

    /// Dispatches a window-size `ioctl`.
    pub fn ioctl_winsize(&self, req: PtyIoctl, arg_in: Option<WinSize>) -> Option<WinSize> {
        match req {
            PtyIoctl::TiocGwinsz => Some(*self.winsize.lock()),
            PtyIoctl::TiocSwinsz => {
                if let Some(new) = arg_in {
                    *self.winsize.lock() = new;
                }
                None
            }
            _ => None,
        }
    }
}

impl Default for Pty {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_write_reaches_secondary_read() {
        let pty = Pty::new();
        pty.primary_write(b"ls\n", true).unwrap();
        let mut buf = [0u8; 8];
        let n = pty.secondary_read(&mut buf, true).unwrap();
        assert_eq!(&buf[..n], b"ls\n");
    }

    #[test]
    fn secondary_write_reaches_primary_read() {
        let pty = Pty::new();
        pty.secondary_write(b"hi", true).unwrap();
        let mut buf = [0u8; 8];
        let n = pty.primary_read(&mut buf, true).unwrap();
        assert_eq!(&buf[..n], b"hi");
    }

    #[test]
    fn tcgets_reports_defaults() {
        let pty = Pty::new();
        let got = pty.ioctl_termios(PtyIoctl::TcGets, None).unwrap();
        assert_eq!(got, TermIos::default());
    }

    #[test]
    fn tcsets_then_tcgets_roundtrips() {
        let pty = Pty::new();
        let mut custom = TermIos::default();
        custom.lflag.remove(LocalFlags::ECHO);
        pty.ioctl_termios(PtyIoctl::TcSets, Some(custom));
        let got = pty.ioctl_termios(PtyIoctl::TcGets, None).unwrap();
        assert_eq!(got, custom);
    }

    #[test]
    fn winsize_roundtrips() {
        let pty = Pty::new();
        let size = WinSize { rows: 24, cols: 80 };
        pty.ioctl_winsize(PtyIoctl::TiocSwinsz, Some(size));
        assert_eq!(pty.ioctl_winsize(PtyIoctl::TiocGwinsz, None), Some(size));
    }
}
