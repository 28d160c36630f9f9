//! Kernel log sinks.
//!
//! `corundum_core::log` owns the function-pointer registry and the
//! `kprint!`/`klog!` family of macros; this module supplies the concrete
//! sink those pointers are set to, one per boot stage.

use core::fmt::Arguments;

use corundum_core::log::LogLevel;

/// Installs the serial sink as both the print and structured-log function,
/// and sets the minimum level from [`crate::config::DEFAULT_LOG_LEVEL`].
///
/// Called once, as early in boot as the serial port can be programmed —
/// before the heap, the PMM, or any subsystem that itself wants to log
/// exists.
pub fn init_early() {
    corundum_core::log::set_print_fn(serial_print);
    corundum_core::log::set_log_fn(serial_log);
    corundum_core::log::set_min_level(crate::config::DEFAULT_LOG_LEVEL);
}

fn serial_print(args: Arguments<'_>) {
    #[cfg(target_arch = "x86_64")]
    crate::arch::x86_64::serial::print(args);
    #[cfg(target_arch = "riscv64")]
    crate::arch::riscv64::sbi::console_print(args);
    #[cfg(not(any(target_arch = "x86_64", target_arch = "riscv64")))]
    let _ = args;
}

fn serial_log(level: LogLevel, target: &str, args: Arguments<'_>) {
    let tag = match level {
        LogLevel::Trace => "TRACE",
        LogLevel::Debug => "DEBUG",
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
        LogLevel::Fatal => "FATAL",
    };
    serial_print(format_args!("[{tag}] {target}: "));
    serial_print(args);
    serial_print(format_args!("\n"));
}

/// Logs a `Deny_And_Scream` MAC violation in the fixed wording §4.4 names.
pub fn mac_scream(pid: corundum_core::id::Pid, capability_name: &str) {
    corundum_core::kwarn!("PID {} MAC failure {}", pid, capability_name);
}
