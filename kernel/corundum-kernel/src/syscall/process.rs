//! Process lifecycle: `exit`, `clone`, `exec`, `wait`.

use corundum_core::id::{Cid, Pid};
use corundum_mm::pmm::BitmapFrameAllocRef;
use corundum_syscall::flags::{CloneFlags, WaitFlags};
use corundum_syscall::numbers::process as nr;
use corundum_syscall::Errno;

/// `pid = -1`: wait for any child, per the `wait` wire convention.
const ANY_CHILD: u32 = u32::MAX;

pub(super) fn dispatch(op: u32, a0: u64, a1: u64, a2: u64, _a3: u64, _a4: u64) -> Result<u64, Errno> {
    match op {
        nr::EXIT => exit(a0 as i32),
        nr::CLONE => clone(CloneFlags::from_bits_truncate(a0 as u32)),
        nr::EXEC => exec(a0, a1, a2),
        nr::WAIT => wait(Pid::new(a0 as u32), a1, a2 as u32),
        _ => Err(Errno::NotImplemented),
    }
}

fn exit(code: i32) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    terminate(pid, code)?;
    Ok(0)
}

/// Ends `pid`: tears down its threads and marks it a zombie so its parent
/// can reap it with `wait`. Used both by a normal `exit` and by
/// [`super::enforce`]'s `Kill` action.
pub(super) fn terminate(pid: Pid, code: i32) -> Result<(), Errno> {
    let core = crate::percpu::current().core_id();
    corundum_sched::dispatch::with(|d| {
        if let Some(running) = d.current(core) {
            if d.thread_pid(running) == Ok(pid) {
                let _ = d.delete_thread(running);
                d.set_current(core, None);
            }
        }
    });
    crate::proc::with(|table| table.mark_zombie(pid, code)).map_err(Errno::from)
}

fn clone(flags: CloneFlags) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    if flags.contains(CloneFlags::THREAD) {
        return clone_thread(pid);
    }

    let (space, caps) = crate::proc::with(|table| {
        table.with_process(pid, |parent| {
            corundum_mm::pmm::with(|pmm| {
                let mut alloc = BitmapFrameAllocRef(pmm);
                // SAFETY: `parent`'s address space is valid and not
                // concurrently mutated (the calling thread owns it for the
                // duration of this syscall), and `alloc` hands out zeroed
                // frames.
                unsafe { parent.address_space().fork_table(&mut alloc) }
            })
            .map(|space| (space, parent.capabilities()))
            .map_err(|_| Errno::NoMemory)
        })
    })
    .map_err(Errno::from)??;

    let root = space.root_phys();
    let new_pid = crate::proc::with(|table| table.create_process(pid, space, caps)).map_err(Errno::from)?;

    let cluster = Cid::new(0);
    let tid = corundum_sched::dispatch::with(|d| d.create_user_thread(new_pid, cluster, root, 0));
    if tid.as_u32() == 0 {
        let _ = crate::proc::with(|table| table.reap(new_pid));
        return Err(Errno::NoMemory);
    }

    Ok(new_pid.as_u32() as u64)
}

fn clone_thread(pid: Pid) -> Result<u64, Errno> {
    let root = crate::proc::with(|table| table.with_process(pid, |p| p.address_space().root_phys())).map_err(Errno::from)?;
    let cluster = Cid::new(0);
    let tid = corundum_sched::dispatch::with(|d| d.create_user_thread(pid, cluster, root, 0));
    if tid.as_u32() == 0 {
        return Err(Errno::NoMemory);
    }
    Ok(tid.as_u32() as u64)
}

/// `exec`: forks a fresh kernel-rooted address space, delegates image
/// loading to the registered [`crate::proc::ProgramLoader`], re-rolls ASLR,
/// and replaces the calling process's entire thread group with a single
/// thread at the new entry point. The previous address space stays active
/// (and the scratch one is simply dropped) on any failure path.
fn exec(path_ptr: u64, argv_ptr: u64, envp_ptr: u64) -> Result<u64, Errno> {
    let pid = super::current_pid()?;
    let mut path_buf = [0u8; corundum_fs::path::MAX_PATH];
    let path_len = crate::proc::with(|table| {
        table.with_process(pid, |p| {
            let space = p.address_space();
            super::read_user_cstr(space, path_ptr, &mut path_buf).map(str::len)
        })
    }).map_err(Errno::from)??;
    let path = core::str::from_utf8(&path_buf[..path_len]).map_err(|_| Errno::InvalidValue)?;

    let kernel_root = crate::proc::kernel_root();
    let mut new_space = corundum_mm::pmm::with(|pmm| {
        let mut alloc = BitmapFrameAllocRef(pmm);
        // SAFETY: `kernel_root` was recorded at boot from the live root
        // table, and `alloc` hands out zeroed frames.
        unsafe {
            corundum_mm::address_space::AddressSpace::new_user(kernel_root, crate::proc::ArchMapper, &mut alloc, corundum_mm::pmm::free_frame)
        }
    })
    .map_err(|_| Errno::NoMemory)?;

    let loaded = corundum_mm::pmm::with(|pmm| {
        let mut alloc = BitmapFrameAllocRef(pmm);
        crate::proc::with_loader(|loader| loader.load(path, argv_ptr, envp_ptr, &mut new_space, &mut alloc))
    });
    let entry = match loaded {
        None | Some(Err(crate::proc::LoadError::NotSupported)) => return Err(Errno::NotImplemented),
        Some(Err(crate::proc::LoadError::BadImage)) => return Err(Errno::InvalidValue),
        Some(Err(crate::proc::LoadError::NoMemory)) => return Err(Errno::NoMemory),
        Some(Ok(entry)) => entry,
    };
    // `new_space` is only dropped (freeing its frames) past this point if
    // something below fails; nothing has touched the process table yet, so
    // the old address space is still the live one on every earlier return.

    crate::entropy::reseed();

    let root = new_space.root_phys();
    crate::proc::with(|table| {
        table.with_process(pid, |p| {
            p.close_on_exec();
            p.replace_address_space(new_space)
        })
    })
    .map_err(Errno::from)?;

    corundum_sched::dispatch::with(|d| d.delete_threads_for_pid(pid));

    let cluster = Cid::new(0);
    let tid = corundum_sched::dispatch::with(|d| d.create_user_thread(pid, cluster, root, 0));
    if tid.as_u32() == 0 {
        return Err(Errno::NoMemory);
    }
    corundum_sched::dispatch::with(|d| {
        if let Ok(gp) = d.thread_gp_context_mut(tid) {
            crate::arch::seed_entry_point(gp, entry);
        }
    });

    Ok(0)
}

fn wait(pid: Pid, status_ptr: u64, options: u32) -> Result<u64, Errno> {
    if pid.as_u32() == 0 {
        return Err(Errno::InvalidValue);
    }
    let flags = WaitFlags::from_bits_truncate(options);
    let caller = super::current_pid()?;
    let target = crate::proc::with(|table| {
        if pid.as_u32() == ANY_CHILD {
            return table.first_zombie_child(caller);
        }
        if table.with_process(pid, |_| ()).is_ok() { Some(pid) } else { None }
    });

    let Some(target) = target else {
        let has_children = crate::proc::with(|table| table.has_child(caller));
        if !has_children {
            return Err(Errno::Child);
        }
        return if flags.contains(WaitFlags::WNOHANG) { Ok(0) } else { Err(Errno::WouldBlock) };
    };

    let code = crate::proc::with(|table| {
        table.with_process(target, |p| {
            if p.state() == crate::proc::ProcessState::Zombie {
                Some(p.exit_code())
            } else {
                None
            }
        })
    }).map_err(Errno::from)?;

    let Some(code) = code else {
        return if flags.contains(WaitFlags::WNOHANG) { Ok(0) } else { Err(Errno::WouldBlock) };
    };

    if status_ptr != 0 {
        let bytes = (code as u32).to_ne_bytes();
        crate::proc::with(|table| table.with_process(caller, |p| super::write_user_bytes(p.address_space(), status_ptr, &bytes)))
            .map_err(Errno::from)??;
    }

    crate::proc::with(|table| table.reap(target)).map_err(Errno::from)?;
    Ok(target.as_u32() as u64)
}
