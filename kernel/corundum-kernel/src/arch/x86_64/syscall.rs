//! `SYSCALL`/`SYSRET` mechanism: MSR programming and the entry trampoline.

use core::mem::offset_of;

use super::msr::{self, IA32_EFER, IA32_FMASK, IA32_LSTAR, IA32_STAR};
use crate::percpu::CoreLocal;

const EFER_SCE: u64 = 1 << 0;
/// Mask IF (bit 9) and DF (bit 10) in RFLAGS on `syscall` entry.
const FMASK_VALUE: u64 = 0x600;

/// Programs `STAR`/`LSTAR`/`FMASK` and sets `EFER.SCE`.
///
/// # Safety
///
/// Must run once per core, after [`super::gdt::init`] (the segment
/// selectors `STAR` packs must already be loaded in the GDT).
pub unsafe fn init() {
    let sel = super::gdt::selectors();
    // SAFETY: STAR[47:32] = syscall CS/SS base, STAR[63:48] = sysret
    // CS/SS base (SS = base+8, CS = base+16, both already include RPL=3
    // for the user pair per `gdt::init`'s selector layout).
    unsafe {
        let efer = msr::read(IA32_EFER);
        msr::write(IA32_EFER, efer | EFER_SCE);

        let star = ((sel.kernel_code as u64) << 32) | (((sel.user_data as u64) - 3) << 48);
        msr::write(IA32_STAR, star);
        msr::write(IA32_LSTAR, syscall_entry as u64);
        msr::write(IA32_FMASK, FMASK_VALUE);
    }

    corundum_core::kdebug!("SYSCALL/SYSRET initialized");
}

const KERNEL_RSP_OFF: usize = offset_of!(CoreLocal, kernel_rsp);
const USER_RSP_OFF: usize = offset_of!(CoreLocal, user_rsp);

unsafe extern "C" {
    /// Implemented in `syscall/mod.rs`; takes the remapped SysV argument
    /// registers and returns the syscall's raw `(value, errno)` pair packed
    /// into a single `u64` the asm trampoline splits back out, matching
    /// `corundum_syscall::errno::RawResult`'s wire convention.
    fn corundum_syscall_dispatch(nr: u64, a0: u64, a1: u64, a2: u64, a3: u64, a4: u64) -> u64;
}

/// `syscall` entry point.
///
/// Incoming (Linux-style syscall ABI): RAX = nr, RDI..R9 = a0..a5, RCX =
/// return RIP, R11 = return RFLAGS (both clobbered by the CPU). Remapped to
/// SysV before calling into `corundum_syscall_dispatch`.
#[unsafe(naked)]
unsafe extern "C" fn syscall_entry() {
    core::arch::naked_asm!(
        "swapgs",
        "mov gs:[{user_rsp}], rsp",
        "mov rsp, gs:[{kernel_rsp}]",
        "push rcx",
        "push r11",
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov r9, r8",
        "mov r8, r10",
        "mov rcx, rdx",
        "mov rdx, rsi",
        "mov rsi, rdi",
        "mov rdi, rax",
        "call {dispatch}",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "pop r11",
        "pop rcx",
        "mov rsp, gs:[{user_rsp}]",
        "swapgs",
        "sysretq",
        user_rsp = const USER_RSP_OFF,
        kernel_rsp = const KERNEL_RSP_OFF,
        dispatch = sym corundum_syscall_dispatch,
    );
}
