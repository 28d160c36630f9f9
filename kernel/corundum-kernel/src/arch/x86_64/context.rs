//! Saved register context layout for `corundum_sched::thread::Thread`'s
//! `gp_context`/`fp_context` buffers, which that crate documents as owned by
//! this arch layer.

use corundum_sched::thread::GP_CONTEXT_SIZE;

/// Offset of the saved instruction pointer within `gp_context`. No context
/// switch reads this yet; the offset only has to stay internally
/// consistent with whatever eventually dispatches from it.
const RIP_OFFSET: usize = 0;

/// Seeds a thread's zeroed GP context so its first dispatch starts at
/// `entry`. Used by `exec` to retarget the single thread it leaves running.
pub fn seed_entry_point(gp_context: &mut [u8; GP_CONTEXT_SIZE], entry: u64) {
    gp_context[RIP_OFFSET..RIP_OFFSET + 8].copy_from_slice(&entry.to_ne_bytes());
}
