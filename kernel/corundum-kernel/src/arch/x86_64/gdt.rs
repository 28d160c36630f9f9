//! GDT, TSS, and segment selectors.

use core::cell::UnsafeCell;

use crate::sync::LazyLock;

const DOUBLE_FAULT_STACK_SIZE: usize = 16 * 1024;

/// IST index used for the double-fault handler (IST1, 1-indexed).
pub const DOUBLE_FAULT_IST_INDEX: u8 = 1;

#[repr(align(16))]
struct AlignedStack([u8; DOUBLE_FAULT_STACK_SIZE]);

static DOUBLE_FAULT_STACK: AlignedStack = AlignedStack([0; DOUBLE_FAULT_STACK_SIZE]);

/// A 104-byte 64-bit Task State Segment (only `rsp0` and `ist1..7` matter
/// to us; `iomap_base` points past the structure so no I/O bitmap exists).
#[repr(C, packed)]
struct TaskStateSegment {
    _reserved0: u32,
    rsp: [u64; 3],
    _reserved1: u64,
    ist: [u64; 7],
    _reserved2: u64,
    _reserved3: u16,
    iomap_base: u16,
}

impl TaskStateSegment {
    const fn new() -> Self {
        Self {
            _reserved0: 0,
            rsp: [0; 3],
            _reserved1: 0,
            ist: [0; 7],
            _reserved2: 0,
            _reserved3: 0,
            iomap_base: size_of::<Self>() as u16,
        }
    }
}

#[repr(transparent)]
struct SyncUnsafeCell<T>(UnsafeCell<T>);

// SAFETY: the only writer is `set_tss_rsp0`, called with interrupts
// disabled during a context switch; the CPU's own reads of the TSS never
// race with that write in practice (entry/exit straddle it, not overlap).
unsafe impl<T> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    const fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }

    fn get(&self) -> *mut T {
        self.0.get()
    }
}

static TSS: LazyLock<SyncUnsafeCell<TaskStateSegment>> = LazyLock::new(|| {
    let mut tss = TaskStateSegment::new();
    tss.ist[(DOUBLE_FAULT_IST_INDEX - 1) as usize] = {
        let start = core::ptr::addr_of!(DOUBLE_FAULT_STACK) as u64;
        start + DOUBLE_FAULT_STACK_SIZE as u64
    };
    SyncUnsafeCell::new(tss)
});

/// A flat descriptor. Segmentation in long mode ignores base/limit for
/// code/data; only the type/DPL/present/long-mode bits matter.
#[derive(Clone, Copy)]
struct Descriptor(u64);

const KERNEL_CODE: Descriptor = Descriptor(0x00AF_9A00_0000_FFFF);
const KERNEL_DATA: Descriptor = Descriptor(0x00AF_9200_0000_FFFF);
const USER_DATA: Descriptor = Descriptor(0x00AF_F200_0000_FFFF);
const USER_CODE: Descriptor = Descriptor(0x00AF_FA00_0000_FFFF);

/// Cached segment selectors from GDT initialization.
pub struct Selectors {
    /// Kernel code segment selector.
    pub kernel_code: u16,
    /// Kernel data segment selector.
    pub kernel_data: u16,
    /// User code segment selector (RPL 3).
    pub user_code: u16,
    /// User data segment selector (RPL 3).
    pub user_data: u16,
    /// TSS selector.
    pub tss: u16,
}

/// 8 descriptors: null, kernel code/data, user data/code (data-before-code
/// for `sysret`'s `STAR` layout), TSS (2 slots, it is 16 bytes in long mode).
#[repr(C, align(16))]
struct Table([u64; 8]);

struct GdtAndSelectors {
    table: Table,
    selectors: Selectors,
}

static GDT: LazyLock<GdtAndSelectors> = LazyLock::new(|| {
    let tss_base = TSS.get() as u64;
    let tss_limit = (size_of::<TaskStateSegment>() - 1) as u64;
    let tss_low = 0x0000_8900_0000_0000u64
        | (tss_limit & 0xFFFF)
        | ((tss_limit & 0xF_0000) << 32)
        | ((tss_base & 0xFF_FFFF) << 16)
        | (((tss_base >> 24) & 0xFF) << 56);
    let tss_high = tss_base >> 32;

    GdtAndSelectors {
        table: Table([0, KERNEL_CODE.0, KERNEL_DATA.0, USER_DATA.0, USER_CODE.0, tss_low, tss_high, 0]),
        selectors: Selectors {
            kernel_code: 1 << 3,
            kernel_data: 2 << 3,
            user_data: (3 << 3) | 3,
            user_code: (4 << 3) | 3,
            tss: 5 << 3,
        },
    }
});

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u64,
}

/// Loads the GDT, reloads every segment register, and loads the TSS.
///
/// # Safety
///
/// Must be called exactly once per core, during early bring-up.
pub unsafe fn init() {
    let gdt = &*GDT;
    let ptr = DescriptorTablePointer {
        limit: (size_of::<Table>() - 1) as u16,
        base: core::ptr::addr_of!(gdt.table) as u64,
    };
    let Selectors {
        kernel_code,
        kernel_data,
        tss,
        ..
    } = gdt.selectors;

    // SAFETY: `ptr` describes the just-built table; the reloads below name
    // selectors present in that same table.
    unsafe {
        core::arch::asm!("lgdt [{}]", in(reg) &ptr, options(readonly, nostack));
        core::arch::asm!(
            "push {code}",
            "lea {tmp}, [2f + rip]",
            "push {tmp}",
            "retfq",
            "2:",
            code = in(reg) kernel_code as u64,
            tmp = lateout(reg) _,
        );
        core::arch::asm!("mov ds, {0:x}", "mov es, {0:x}", "mov ss, {0:x}", in(reg) kernel_data);
        core::arch::asm!("xor eax, eax", "mov fs, ax", "mov gs, ax", out("eax") _);
        core::arch::asm!("ltr {0:x}", in(reg) tss);
    }

    corundum_core::kdebug!("GDT initialized");
}

/// Updates RSP0 in the TSS (the stack the CPU switches to on ring3 -> ring0).
///
/// # Safety
///
/// `rsp` must point to the top of a valid, mapped kernel stack.
pub unsafe fn set_tss_rsp0(rsp: u64) {
    // SAFETY: documented contract of this function matches the one write
    // `TaskStateSegment::rsp[0]` is meant for.
    unsafe {
        (*TSS.get()).rsp[0] = rsp;
    }
}

/// Returns the cached segment selectors.
pub fn selectors() -> &'static Selectors {
    &GDT.selectors
}
