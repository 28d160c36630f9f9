//! Architecture-specific bring-up, descriptor tables, and paging.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "riscv64")]
pub mod riscv64;

/// Halts this core forever. Never returns.
#[cfg(target_arch = "x86_64")]
pub fn halt_loop() -> ! {
    x86_64::power::halt_loop()
}
#[cfg(target_arch = "riscv64")]
pub fn halt_loop() -> ! {
    riscv64::sbi::halt_loop()
}

/// Powers the machine off. Never returns.
#[cfg(target_arch = "x86_64")]
pub fn power_off() -> ! {
    x86_64::power::power_off()
}
#[cfg(target_arch = "riscv64")]
pub fn power_off() -> ! {
    riscv64::sbi::power_off()
}

/// Restarts the machine. Never returns.
#[cfg(target_arch = "x86_64")]
pub fn restart() -> ! {
    x86_64::power::restart()
}
#[cfg(target_arch = "riscv64")]
pub fn restart() -> ! {
    riscv64::sbi::restart()
}

/// Seeds a thread's saved GP context so its first dispatch starts at
/// `entry`.
#[cfg(target_arch = "x86_64")]
pub fn seed_entry_point(gp_context: &mut [u8; corundum_sched::thread::GP_CONTEXT_SIZE], entry: u64) {
    x86_64::context::seed_entry_point(gp_context, entry)
}
#[cfg(target_arch = "riscv64")]
pub fn seed_entry_point(gp_context: &mut [u8; corundum_sched::thread::GP_CONTEXT_SIZE], entry: u64) {
    riscv64::context::seed_entry_point(gp_context, entry)
}
