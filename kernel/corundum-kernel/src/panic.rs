//! `Hard_Panic`: the kernel's unrecoverable-failure path.
//!
//! Prints the panic message and a minimal backtrace to the serial sink,
//! beeps the PC speaker (x86_64 only — a cheap, allocation-free way to
//! signal "the kernel is dead" even if the serial sink itself is wedged),
//! broadcasts a panic IPI to every other core so they halt too, then spins
//! forever with interrupts disabled.

use core::panic::PanicInfo;

/// Walks return addresses off the frame-pointer chain, printing each to the
/// serial sink. Stops at a null or obviously-invalid frame pointer, or after
/// `MAX_FRAMES` entries, whichever comes first.
fn print_backtrace() {
    const MAX_FRAMES: usize = 32;

    corundum_core::kprintln!("backtrace:");

    #[cfg(target_arch = "x86_64")]
    {
        let mut rbp: u64;
        // SAFETY: reading the current frame pointer for diagnostic purposes
        // only; never dereferenced without a null/alignment check below.
        unsafe { core::arch::asm!("mov {}, rbp", out(reg) rbp, options(nomem, nostack)) };

        for depth in 0..MAX_FRAMES {
            if rbp == 0 || rbp % 8 != 0 {
                break;
            }
            // SAFETY: rbp is checked non-null and 8-byte aligned; a corrupt
            // frame chain can still fault here, which is acceptable since
            // we are already on the panic path.
            let (next_rbp, return_addr) = unsafe {
                let frame = rbp as *const u64;
                (frame.read_volatile(), frame.add(1).read_volatile())
            };
            corundum_core::kprintln!("  #{depth} {return_addr:#x}");
            rbp = next_rbp;
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        corundum_core::kprintln!("  (backtrace unavailable on this architecture)");
    }
}

#[cfg(target_arch = "x86_64")]
fn panic_beep() {
    // SAFETY: programs the legacy PC speaker via port I/O; harmless on any
    // x86_64 target this kernel boots on, and we are already crashing.
    unsafe {
        let mut port: u8;
        core::arch::asm!("in al, 0x61", out("al") port, options(nomem, nostack));
        core::arch::asm!("out 0x61, al", in("al") port | 0x03, options(nomem, nostack));
    }
}

/// The kernel's panic handler. Referenced from `#[panic_handler]` in
/// `lib.rs`; split out so it can be unit-exercised (the formatting logic,
/// not the actual halt) without `#[panic_handler]`'s one-per-binary
/// restriction getting in the way.
pub fn hard_panic(info: &PanicInfo<'_>) -> ! {
    corundum_core::kprintln!("\n*** Hard_Panic ***");
    corundum_core::kprintln!("{info}");
    print_backtrace();

    #[cfg(target_arch = "x86_64")]
    panic_beep();

    #[cfg(target_arch = "x86_64")]
    crate::arch::x86_64::smp::broadcast_panic_ipi();

    loop {
        #[cfg(target_arch = "x86_64")]
        // SAFETY: the kernel is terminating; disabling interrupts on this
        // core and halting is the intended final state.
        unsafe {
            core::arch::asm!("cli; hlt", options(nomem, nostack));
        }
        #[cfg(target_arch = "riscv64")]
        // SAFETY: same rationale as above, riscv64 equivalent.
        unsafe {
            core::arch::asm!("csrci sstatus, 2; wfi", options(nomem, nostack));
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "riscv64")))]
        core::hint::spin_loop();
    }
}
