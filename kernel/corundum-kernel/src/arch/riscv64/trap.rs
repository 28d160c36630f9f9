//! Trap vector: one entry point for both the timer interrupt and `ecall`
//! from user mode (the riscv64 syscall mechanism — no separate `syscall`
//! instruction exists).

const SSTATUS_SIE: u64 = 1 << 1;
const SIE_STIE: u64 = 1 << 5;
const SCAUSE_INTERRUPT: u64 = 1 << 63;
const SCAUSE_TIMER: u64 = 5;
const SCAUSE_ECALL_U: u64 = 8;

/// Installs the trap vector and enables the supervisor timer interrupt.
///
/// # Safety
///
/// Must run once per hart, after that hart's `CoreLocal` has been
/// published to `tp`.
pub unsafe fn init() {
    // SAFETY: `trap_entry` is 4-byte aligned (required for direct mode)
    // and never returns to its caller except via `sret`.
    unsafe {
        core::arch::asm!("csrw stvec, {}", in(reg) trap_entry as u64, options(nostack));
        core::arch::asm!("csrs sie, {}", in(reg) SIE_STIE, options(nostack));
        core::arch::asm!("csrs sstatus, {}", in(reg) SSTATUS_SIE, options(nostack));
    }
    corundum_core::kdebug!("trap vector installed");
}

/// 31 general-purpose registers (`x1`..`x31`, `x0` is hardwired zero) saved
/// across a trap.
#[repr(C)]
#[derive(Default, Clone, Copy)]
pub struct TrapFrame {
    /// `x1`..`x31`, in register-number order.
    pub gpr: [u64; 31],
}

#[unsafe(naked)]
unsafe extern "C" fn trap_entry() {
    core::arch::naked_asm!(
        // `tp` is reserved for this hart's `CoreLocal` pointer in both user
        // and supervisor mode on this kernel, so unlike x86_64's swapgs
        // there is nothing to swap here.
        "addi sp, sp, -248",
        "sd x1, 0(sp)",
        "sd x5, 8(sp)",
        "sd x6, 16(sp)",
        "sd x7, 24(sp)",
        "sd x8, 32(sp)",
        "sd x9, 40(sp)",
        "sd x10, 48(sp)",
        "sd x11, 56(sp)",
        "sd x12, 64(sp)",
        "sd x13, 72(sp)",
        "sd x14, 80(sp)",
        "sd x15, 88(sp)",
        "sd x16, 96(sp)",
        "sd x17, 104(sp)",
        "sd x18, 112(sp)",
        "sd x19, 120(sp)",
        "sd x20, 128(sp)",
        "sd x21, 136(sp)",
        "sd x22, 144(sp)",
        "sd x23, 152(sp)",
        "sd x24, 160(sp)",
        "sd x25, 168(sp)",
        "sd x26, 176(sp)",
        "sd x27, 184(sp)",
        "sd x28, 192(sp)",
        "sd x29, 200(sp)",
        "sd x30, 208(sp)",
        "sd x31, 216(sp)",
        "mv a0, sp",
        "call {dispatch}",
        "ld x1, 0(sp)",
        "ld x5, 8(sp)",
        "ld x6, 16(sp)",
        "ld x7, 24(sp)",
        "ld x8, 32(sp)",
        "ld x9, 40(sp)",
        "ld x10, 48(sp)",
        "ld x11, 56(sp)",
        "ld x12, 64(sp)",
        "ld x13, 72(sp)",
        "ld x14, 80(sp)",
        "ld x15, 88(sp)",
        "ld x16, 96(sp)",
        "ld x17, 104(sp)",
        "ld x18, 112(sp)",
        "ld x19, 120(sp)",
        "ld x20, 128(sp)",
        "ld x21, 136(sp)",
        "ld x22, 144(sp)",
        "ld x23, 152(sp)",
        "ld x24, 160(sp)",
        "ld x25, 168(sp)",
        "ld x26, 176(sp)",
        "ld x27, 184(sp)",
        "ld x28, 192(sp)",
        "ld x29, 200(sp)",
        "ld x30, 208(sp)",
        "ld x31, 216(sp)",
        "addi sp, sp, 248",
        "sret",
        dispatch = sym trap_dispatch,
    );
}

extern "C" fn trap_dispatch(frame: *mut TrapFrame) {
    let scause: u64;
    // SAFETY: reading the cause of the trap this handler was invoked for.
    unsafe { core::arch::asm!("csrr {}, scause", out(reg) scause, options(nomem, nostack)) };

    if scause == (SCAUSE_INTERRUPT | SCAUSE_TIMER) {
        handle_timer();
    } else if scause == SCAUSE_ECALL_U {
        handle_ecall(frame);
        // SAFETY: advance sepc past the 4-byte `ecall` instruction so
        // `sret` resumes at the following instruction, not the trap again.
        unsafe {
            let mut sepc: u64;
            core::arch::asm!("csrr {}, sepc", out(reg) sepc, options(nomem, nostack));
            core::arch::asm!("csrw sepc, {}", in(reg) sepc + 4, options(nostack));
        }
    } else {
        panic!("unhandled trap, scause={scause:#x}");
    }
}

fn handle_timer() {
    // SAFETY: rearm the next timer interrupt via SBI TIME extension in a
    // full implementation; the scheduling decision itself lives in
    // `corundum_sched`, mirrored from the x86_64 LAPIC timer path.
    let core = crate::percpu::current().core_id();
    corundum_sched::dispatch::with(|d| {
        if let Some(running) = d.current(core) {
            if let Ok(cluster) = d.thread_cluster(running) {
                if let Some(next) = d.timer_tick(cluster, core) {
                    d.set_current(core, Some(next));
                }
            }
        }
    });
}

fn handle_ecall(frame: *mut TrapFrame) {
    // SAFETY: `frame` points at the just-saved `TrapFrame` on this trap's
    // own kernel stack; valid for the duration of this call.
    let regs = unsafe { &mut *frame };
    // a7=nr, a0..a5 are gpr indices 9,10..14 (x10..x15 => gpr[9..14], since
    // gpr[0] is x1).
    let nr = regs.gpr[16]; // x17 = a7
    let a0 = regs.gpr[9]; // x10 = a0
    let a1 = regs.gpr[10];
    let a2 = regs.gpr[11];
    let a3 = regs.gpr[12];
    let a4 = regs.gpr[13];
    let result = crate::syscall::raw_dispatch(nr, a0, a1, a2, a3, a4);
    regs.gpr[9] = result.value; // a0
    regs.gpr[10] = result.errno.as_u32() as u64; // a1
}
