//! 16550 UART driver for COM1, used as the early-boot log sink.

use core::fmt::{self, Arguments, Write};
use core::sync::atomic::{AtomicBool, Ordering};

use corundum_core::sync::Mutex;

const COM1: u16 = 0x3F8;

unsafe fn out8(port: u16, value: u8) {
    // SAFETY: caller guarantees `port` is a valid I/O port for this write.
    unsafe { core::arch::asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack)) };
}

unsafe fn in8(port: u16) -> u8 {
    let value: u8;
    // SAFETY: caller guarantees `port` is a valid I/O port for this read.
    unsafe { core::arch::asm!("in al, dx", in("dx") port, out("al") value, options(nomem, nostack)) };
    value
}

static READY: AtomicBool = AtomicBool::new(false);

/// Programs COM1 for 38400 8N1 with FIFOs enabled. Idempotent.
pub fn init() {
    // SAFETY: COM1's fixed port range, standard 16550 init sequence.
    unsafe {
        out8(COM1 + 1, 0x00); // disable interrupts
        out8(COM1 + 3, 0x80); // enable DLAB
        out8(COM1, 0x03); // divisor low: 38400 baud
        out8(COM1 + 1, 0x00); // divisor high
        out8(COM1 + 3, 0x03); // 8N1, DLAB off
        out8(COM1 + 2, 0xC7); // enable + clear FIFOs, 14-byte threshold
        out8(COM1 + 4, 0x0B); // RTS/DSR set, IRQs out via OUT2
    }
    READY.store(true, Ordering::Release);
}

fn write_byte(b: u8) {
    if !READY.load(Ordering::Acquire) {
        return;
    }
    // SAFETY: COM1 is programmed by `init` before this runs.
    unsafe {
        while in8(COM1 + 5) & 0x20 == 0 {
            core::hint::spin_loop();
        }
        out8(COM1, b);
    }
}

struct SerialWriter;

impl Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if b == b'\n' {
                write_byte(b'\r');
            }
            write_byte(b);
        }
        Ok(())
    }
}

static LOCK: Mutex<()> = Mutex::new(());

/// Formats `args` to COM1, holding a lock so concurrent log lines don't
/// interleave.
pub fn print(args: Arguments<'_>) {
    let _guard = LOCK.lock();
    let _ = SerialWriter.write_fmt(args);
}
