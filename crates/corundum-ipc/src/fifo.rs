//! Byte-oriented FIFO (anonymous pipe).
//!
//! A fixed-capacity circular buffer shared between one reader and one writer
//! endpoint. Either endpoint may be opened non-blocking, in which case a
//! would-be-blocking operation returns [`PipeStatus::WouldBlockFailure`]
//! instead of parking.

use core::sync::atomic::{AtomicBool, Ordering};

use corundum_core::sync::{Mutex, WaitQueue};
use planck_noalloc::ringbuf::RingBuf;

/// Backing array size for a FIFO's ring buffer; usable capacity is one less.
pub const FIFO_BUF_SIZE: usize = 4096;

/// Status returned by a FIFO read/write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeStatus {
    /// The opposite endpoint is closed and no more data will ever arrive
    /// (read) or be consumed (write).
    BrokenFailure,
    /// A non-blocking endpoint would otherwise have had to wait.
    WouldBlockFailure,
}

struct FifoInner {
    buffer: Mutex<RingBuf<u8, FIFO_BUF_SIZE>>,
    read_wq: WaitQueue,
    write_wq: WaitQueue,
    reader_open: AtomicBool,
    writer_open: AtomicBool,
}

/// A FIFO and its two endpoints.
///
/// Callers hold a `&Fifo` from each side (the process table / FD table owns
/// the actual lifetime and arbitrates access); [`Fifo::close_reader`] and
/// [`Fifo::close_writer`] model the "last handle of this kind closed" event
/// since this crate has no reference-counted handle of its own.
pub struct Fifo {
    inner: FifoInner,
}

impl Fifo {
    /// Creates a new FIFO with both endpoints open.
    pub fn new() -> Self {
        Self {
            inner: FifoInner {
                buffer: Mutex::new(RingBuf::new()),
                read_wq: WaitQueue::new(),
                write_wq: WaitQueue::new(),
                reader_open: AtomicBool::new(true),
                writer_open: AtomicBool::new(true),
            },
        }
    }

    /// Reads up to `buf.len()` bytes.
    ///
    /// If `blocking`, parks until data arrives or the writer closes (at
    /// which point it returns `Ok(0)`, matching EOF-on-empty-buffer). If
    /// not blocking and no data is immediately available, returns
    /// [`PipeStatus::WouldBlockFailure`] unless the writer is already gone,
    /// in which case it still reports EOF.
    pub fn read(&self, buf: &mut [u8], blocking: bool) -> Result<usize, PipeStatus> {
        loop {
            {
                let mut ring = self.inner.buffer.lock();
                if !ring.is_empty() {
                    let mut n = 0;
                    while n < buf.len() {
                        match ring.pop() {
                            Some(byte) => {
                                buf[n] = byte;
                                n += 1;
                            }
                            None => break,
                        }
                    }
                    drop(ring);
                    self.inner.write_wq.wake_one();
                    return Ok(n);
                }
                if !self.inner.writer_open.load(Ordering::Acquire) {
                    return Ok(0);
                }
            }
            if !blocking {
                return Err(PipeStatus::WouldBlockFailure);
            }
            self.inner
                .read_wq
                .wait_while(|| self.inner.buffer.lock().is_empty() && self.writer_is_open());
        }
    }

    /// Writes `buf`, blocking (if `blocking`) until all of it fits.
    ///
    /// Returns [`PipeStatus::BrokenFailure`] if the reader has already
    /// closed; [`PipeStatus::WouldBlockFailure`] if `blocking` is false and
    /// the buffer has no room for even one byte.
    pub fn write(&self, buf: &[u8], blocking: bool) -> Result<usize, PipeStatus> {
        if !self.inner.reader_open.load(Ordering::Acquire) {
            return Err(PipeStatus::BrokenFailure);
        }

        let mut written = 0;
        while written < buf.len() {
            {
                let mut ring = self.inner.buffer.lock();
                if !self.inner.reader_open.load(Ordering::Acquire) {
                    return Err(PipeStatus::BrokenFailure);
                }
                while written < buf.len() && !ring.is_full() {
                    ring.push(buf[written]);
                    written += 1;
                }
                if written > 0 {
                    drop(ring);
                    self.inner.read_wq.wake_one();
                    if written == buf.len() {
                        return Ok(written);
                    }
                    continue;
                }
            }
            if !blocking {
                return Err(PipeStatus::WouldBlockFailure);
            }
            self.inner
                .write_wq
                .wait_while(|| self.inner.buffer.lock().is_full() && self.reader_is_open());
        }

        Ok(written)
    }

    /// Marks the reader endpoint closed, waking any blocked writer so it can
    /// observe [`PipeStatus::BrokenFailure`].
    pub fn close_reader(&self) {
        self.inner.reader_open.store(false, Ordering::Release);
        self.inner.write_wq.wake_all();
    }

    /// Marks the writer endpoint closed, waking any blocked reader so it can
    /// observe EOF.
    pub fn close_writer(&self) {
        self.inner.writer_open.store(false, Ordering::Release);
        self.inner.read_wq.wake_all();
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Whether the buffer holds no data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reader_is_open(&self) -> bool {
        self.inner.reader_open.load(Ordering::Acquire)
    }

    fn writer_is_open(&self) -> bool {
        self.inner.writer_open.load(Ordering::Acquire)
    }
}

impl Default for Fifo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let fifo = Fifo::new();
        assert_eq!(fifo.write(b"hello", true), Ok(5));
        let mut buf = [0u8; 5];
        assert_eq!(fifo.read(&mut buf, true), Ok(5));
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_reports_eof_after_writer_closes_on_empty_buffer() {
        let fifo = Fifo::new();
        fifo.close_writer();
        let mut buf = [0u8; 4];
        assert_eq!(fifo.read(&mut buf, true), Ok(0));
    }

    #[test]
    fn write_after_reader_closed_is_broken() {
        let fifo = Fifo::new();
        fifo.close_reader();
        assert_eq!(fifo.write(b"x", true), Err(PipeStatus::BrokenFailure));
    }

    #[test]
    fn non_blocking_read_on_empty_open_fifo_would_block() {
        let fifo = Fifo::new();
        let mut buf = [0u8; 4];
        assert_eq!(fifo.read(&mut buf, false), Err(PipeStatus::WouldBlockFailure));
    }

    #[test]
    fn non_blocking_write_to_full_buffer_would_block() {
        let fifo = Fifo::new();
        let filler = [0u8; FIFO_BUF_SIZE - 1];
        assert_eq!(fifo.write(&filler, true), Ok(FIFO_BUF_SIZE - 1));
        assert_eq!(fifo.write(&[1], false), Err(PipeStatus::WouldBlockFailure));
    }

    #[test]
    fn len_tracks_buffered_bytes() {
        let fifo = Fifo::new();
        assert!(fifo.is_empty());
        fifo.write(b"abc", true).unwrap();
        assert_eq!(fifo.len(), 3);
    }
}
