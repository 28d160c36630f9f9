//! In-kernel test registry.
//!
//! `corundum-kernel` cannot use `cargo test` (it is unconditionally
//! `#![no_std]`, with no host target to link the harness against), so
//! invariants that need the booted kernel — real physical memory, a live
//! scheduler, mapped page tables — are written here instead as plain
//! `fn()` entries, run synchronously from a boot checkpoint via
//! [`run_all`]. Everything that does not need the booted kernel lives as
//! an ordinary `#[test]` in the relevant leaf crate instead.

/// One named in-kernel test.
pub struct KernelTest {
    /// Test name, printed on failure.
    pub name: &'static str,
    /// The test body. Panics (caught by the normal panic path) count as
    /// failure; this module does not attempt to continue past one.
    pub run: fn(),
}

/// Every registered in-kernel test, run in order by [`run_all`].
pub static REGISTRY: &[KernelTest] = &[
    KernelTest {
        name: "pmm_round_trips_a_frame",
        run: pmm_round_trips_a_frame,
    },
    KernelTest {
        name: "scheduler_creates_and_deletes_a_thread",
        run: scheduler_creates_and_deletes_a_thread,
    },
    KernelTest {
        name: "address_space_maps_and_translates_a_page",
        run: address_space_maps_and_translates_a_page,
    },
];

/// Runs every registered test in order, logging a line per test and a
/// summary at the end. Called once from a boot checkpoint after the PMM,
/// scheduler, and VFS are all initialized.
pub fn run_all() {
    corundum_core::kinfo!("ktest: running {} in-kernel tests", REGISTRY.len());
    for test in REGISTRY {
        corundum_core::kdebug!("ktest: {} ...", test.name);
        (test.run)();
        corundum_core::kdebug!("ktest: {} ok", test.name);
    }
    corundum_core::kinfo!("ktest: {} passed", REGISTRY.len());
}

fn pmm_round_trips_a_frame() {
    let frame = corundum_mm::pmm::with(|pmm| pmm.allocate_frame()).expect("pmm exhausted");
    // SAFETY: `frame` was just allocated above and has not been handed to
    // anyone else.
    corundum_mm::pmm::with(|pmm| unsafe { pmm.deallocate_frame(frame) }).expect("double free");
}

fn scheduler_creates_and_deletes_a_thread() {
    use corundum_core::id::{Cid, Pid};
    use corundum_mm::addr::PhysAddr;
    use corundum_sched::cluster::ClusterPolicy;

    let cid = Cid::new(9_000);
    corundum_sched::dispatch::with(|d| {
        d.create_cluster(cid, ClusterPolicy::RoundRobin, 4, true, 0)
            .expect("cluster create");
        let tid = d.create_user_thread(Pid::new(9_000), cid, PhysAddr::new(0x1000), 0);
        assert_ne!(tid.as_u32(), 0, "thread creation failed");
        d.delete_thread(tid).expect("thread delete");
    });
}

fn address_space_maps_and_translates_a_page() {
    use corundum_mm::addr::VirtAddr;
    use corundum_mm::mapper::MapFlags;
    use corundum_mm::paging::{Page, Size4KiB};

    let root = corundum_mm::pmm::with(|pmm| pmm.allocate_frame()).expect("pmm exhausted");
    let page = Page::<Size4KiB>::containing_address(VirtAddr::new(0x4000_0000));
    let backing = corundum_mm::pmm::with(|pmm| pmm.allocate_frame()).expect("pmm exhausted");

    #[cfg(target_arch = "x86_64")]
    let mapper = crate::arch::x86_64::paging::FourLevelPaging;
    #[cfg(target_arch = "riscv64")]
    let mapper = crate::arch::riscv64::paging::Sv39Paging;

    use corundum_mm::mapper::PageMapper;
    // SAFETY: `root` was just allocated and zeroed by the PMM; `alloc`
    // hands out fresh frames from the same allocator.
    let flush = unsafe {
        mapper
            .map(root.start_address(), page, backing, MapFlags::WRITABLE, &mut || {
                corundum_mm::pmm::with(|pmm| pmm.allocate_frame()).expect("pmm exhausted")
            })
            .expect("map")
    };
    flush.ignore();

    use corundum_mm::mapper::PageTranslator;
    // SAFETY: `root` is the table just mapped into above.
    let translation = unsafe { mapper.translate_addr(root.start_address(), page.start_address()) };
    assert_eq!(translation.map(|t| t.phys), Some(backing.start_address()));
}
