//! System-wide queries and privileged control: `sysconf`, `prctl`,
//! `reboot`, and the three MAC self-modification syscalls.

use corundum_syscall::abi::{MountRecord, ProcRecord, SysconfRequest, Utsname, UTS_FIELD_LEN};
use corundum_syscall::flags::{RebootCommand, RebootFlags};
use corundum_syscall::mac::{Capabilities, EnforcementMode, PermissionEntry, Permissions};
use corundum_syscall::numbers::system as nr;
use corundum_syscall::Errno;

const TOPICS: [SysconfRequest; 8] = [
    SysconfRequest::PageSize,
    SysconfRequest::OpenMax,
    SysconfRequest::HostNameMax,
    SysconfRequest::PhysPages,
    SysconfRequest::NprocOnline,
    SysconfRequest::ListProcs,
    SysconfRequest::ListMounts,
    SysconfRequest::Uname,
];

pub(super) fn dispatch(op: u32, a0: u64, a1: u64, a2: u64, _a3: u64, _a4: u64) -> Result<u64, Errno> {
    match op {
        nr::SYSCONF => sysconf(a0 as u32, a1, a2),
        nr::PRCTL => prctl(a0 as u32, a1),
        nr::REBOOT => reboot(a0 as u32, a1 as u32),
        nr::SET_MAC_CAPABILITIES => set_mac_capabilities(a0 as u32),
        nr::ADD_MAC_PERMISSIONS => add_mac_permissions(a0, a1 as u32),
        nr::SET_MAC_ENFORCEMENT => set_mac_enforcement(a0 as u32),
        _ => Err(Errno::NotImplemented),
    }
}

fn sysconf(topic: u32, buf_ptr: u64, len: u64) -> Result<u64, Errno> {
    let topic = *TOPICS.get(topic as usize).ok_or(Errno::InvalidValue)?;
    let pid = super::current_pid()?;

    match topic {
        SysconfRequest::PageSize => Ok(4096),
        SysconfRequest::OpenMax => Ok(crate::proc::MAX_FDS as u64),
        SysconfRequest::HostNameMax => Ok((UTS_FIELD_LEN - 1) as u64),
        SysconfRequest::PhysPages => Ok(corundum_mm::pmm::with(|p| p.total_frames() as u64)),
        SysconfRequest::NprocOnline => Ok(crate::percpu::online_count() as u64),
        SysconfRequest::Uname => {
            let uts = Utsname::new(
                crate::config::SYSNAME,
                crate::config::SYSNAME,
                crate::config::RELEASE,
                crate::config::RELEASE,
                arch_name(),
            );
            write_record_into(pid, buf_ptr, &uts)?;
            Ok(1)
        }
        SysconfRequest::ListProcs => {
            let cap = (len as usize) / core::mem::size_of::<ProcRecord>();
            let mut count = 0u64;
            crate::proc::with(|table| {
                table
                    .iter()
                    .take(cap)
                    .try_for_each(|p| {
                        let record = ProcRecord {
                            pid: p.pid().as_u32(),
                            ppid: p.ppid().as_u32(),
                            state: p.state() as u8,
                            exit_code: p.exit_code(),
                        };
                        write_record_into(pid, buf_ptr + count * core::mem::size_of::<ProcRecord>() as u64, &record)?;
                        count += 1;
                        Ok::<_, Errno>(())
                    })
            })?;
            Ok(count)
        }
        SysconfRequest::ListMounts => {
            let cap = (len as usize) / core::mem::size_of::<MountRecord>();
            let mut count = 0u64;
            corundum_fs::mount::with(|mounts| {
                mounts
                    .iter()
                    .take(cap)
                    .try_for_each(|(handle, kind, path)| {
                        let record = MountRecord::new(handle.as_u8(), kind as u8, path);
                        write_record_into(pid, buf_ptr + count * core::mem::size_of::<MountRecord>() as u64, &record)?;
                        count += 1;
                        Ok::<_, Errno>(())
                    })
            })?;
            Ok(count)
        }
        _ => Err(Errno::NotImplemented),
    }
}

fn write_record_into<T: Copy>(pid: corundum_core::id::Pid, ptr: u64, value: &T) -> Result<(), Errno> {
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            // SAFETY: `T` is always one of this module's own `#[repr(C)]`,
            // plain-old-data wire structs.
            let bytes = unsafe {
                core::slice::from_raw_parts((value as *const T).cast::<u8>(), core::mem::size_of::<T>())
            };
            super::write_user_bytes(p.address_space(), ptr, bytes)
        })
    })
    .map_err(Errno::from)?
}

#[cfg(target_arch = "x86_64")]
fn arch_name() -> &'static str {
    "x86_64"
}

#[cfg(target_arch = "riscv64")]
fn arch_name() -> &'static str {
    "riscv64"
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "riscv64")))]
fn arch_name() -> &'static str {
    "unknown"
}

fn prctl(code: u32, arg: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    match code {
        // PR_SET_NAME-equivalent and friends are not modeled; this kernel
        // only exposes the enforcement-mode query a debugger would want.
        0 => crate::proc::with(|table| table.with_process(pid, |p| p.enforcement() as u64)).map_err(Errno::from),
        _ => {
            let _ = arg;
            Err(Errno::NotImplemented)
        }
    }
}

fn reboot(raw_cmd: u32, raw_flags: u32) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let has_cap = crate::proc::with(|table| table.with_process(pid, |p| p.capabilities().contains(Capabilities::SYS_PWR)))
        .map_err(Errno::from)?;
    if !has_cap {
        let mode = crate::proc::with(|table| table.with_process(pid, |p| p.enforcement())).map_err(Errno::from)?;
        return Err(super::enforce(pid, "reboot", mode));
    }

    let cmd = match raw_cmd {
        0 => RebootCommand::Halt,
        1 => RebootCommand::PowerOff,
        2 => RebootCommand::Restart,
        _ => return Err(Errno::InvalidValue),
    };
    // None of this kernel's reset paths can fail partway through, so
    // `ERROR_RET` has nothing to report; it is accepted for ABI
    // compatibility and otherwise ignored.
    let _ = RebootFlags::from_bits_truncate(raw_flags);

    match cmd {
        RebootCommand::Halt => crate::arch::halt_loop(),
        RebootCommand::PowerOff => crate::arch::power_off(),
        RebootCommand::Restart => crate::arch::restart(),
    }
}

fn set_mac_capabilities(mask: u32) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let mask = Capabilities::from_bits_truncate(mask);
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            if !p.capabilities().contains(Capabilities::SYS_MAC) {
                return Err(super::enforce(pid, "set_mac_capabilities", p.enforcement()));
            }
            p.intersect_capabilities(mask);
            Ok(0)
        })
    })
    .map_err(Errno::from)?
}

fn add_mac_permissions(resource: u64, raw_bits: u32) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let bits = Permissions::from_bits_truncate(raw_bits);
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            if !p.capabilities().contains(Capabilities::SYS_MAC) {
                return Err(super::enforce(pid, "add_mac_permissions", p.enforcement()));
            }
            p.add_permission(PermissionEntry::new(resource, bits)).map_err(Errno::from)?;
            Ok(0)
        })
    })
    .map_err(Errno::from)?
}

fn set_mac_enforcement(raw_mode: u32) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let mode = match raw_mode {
        0 => EnforcementMode::Deny,
        1 => EnforcementMode::DenyAndScream,
        2 => EnforcementMode::Kill,
        _ => return Err(Errno::InvalidValue),
    };
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            if !p.capabilities().contains(Capabilities::SYS_MAC) {
                return Err(super::enforce(pid, "set_mac_enforcement", p.enforcement()));
            }
            p.set_enforcement(mode);
            Ok(0)
        })
    })
    .map_err(Errno::from)?
}
