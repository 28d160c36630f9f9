//! IDT setup: CPU exception handlers and the timer interrupt stub.

use crate::sync::LazyLock;

use super::gdt::DOUBLE_FAULT_IST_INDEX;

/// The stack frame the CPU pushes before calling an interrupt handler.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct InterruptStackFrame {
    /// `RIP` at the point of interruption.
    pub instruction_pointer: u64,
    /// Code segment selector at the point of interruption.
    pub code_segment: u64,
    /// `RFLAGS` at the point of interruption.
    pub cpu_flags: u64,
    /// `RSP` at the point of interruption.
    pub stack_pointer: u64,
    /// Stack segment selector at the point of interruption.
    pub stack_segment: u64,
}

type HandlerFunc = extern "x86-interrupt" fn(InterruptStackFrame);
type HandlerFuncErr = extern "x86-interrupt" fn(InterruptStackFrame, u64);
type DivergingHandlerFunc = extern "x86-interrupt" fn(InterruptStackFrame) -> !;
type DivergingHandlerFuncErr = extern "x86-interrupt" fn(InterruptStackFrame, u64) -> !;

#[derive(Clone, Copy)]
#[repr(C)]
struct Entry {
    offset_low: u16,
    selector: u16,
    options: u16,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

impl Entry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            options: 0x0E00,
            offset_mid: 0,
            offset_high: 0,
            reserved: 0,
        }
    }

    fn set(&mut self, addr: u64, ist: u8) {
        self.offset_low = addr as u16;
        self.selector = super::gdt::selectors().kernel_code;
        self.offset_mid = (addr >> 16) as u16;
        self.offset_high = (addr >> 32) as u32;
        self.options = 0x8E00 | (ist as u16 & 0x07);
    }
}

/// 256-entry Interrupt Descriptor Table.
#[repr(C, align(16))]
struct Table([Entry; 256]);

/// Fixed vectors used outside the CPU-exception range.
pub mod vectors {
    /// LAPIC timer (preemption tick), picked well clear of the PIC/IOAPIC
    /// legacy range.
    pub const TIMER: u8 = 48;
    /// Inter-processor interrupt used to halt every other core after a
    /// `Hard_Panic`.
    pub const PANIC_IPI: u8 = 49;
}

static IDT: LazyLock<Table> = LazyLock::new(|| {
    let mut table = Table([Entry::missing(); 256]);

    macro_rules! plain {
        ($vec:expr, $handler:expr) => {
            table.0[$vec].set($handler as u64, 0)
        };
    }
    macro_rules! err {
        ($vec:expr, $handler:expr) => {
            table.0[$vec].set($handler as u64, 0)
        };
    }

    plain!(0, handlers::divide_error);
    plain!(3, handlers::breakpoint);
    plain!(6, handlers::invalid_opcode);
    table.0[8].set(handlers::double_fault as u64, DOUBLE_FAULT_IST_INDEX);
    err!(13, handlers::general_protection);
    err!(14, handlers::page_fault);
    plain!(vectors::TIMER as usize, handlers::timer_tick);
    plain!(vectors::PANIC_IPI as usize, handlers::panic_ipi);

    table
});

mod handlers {
    use super::InterruptStackFrame;

    pub extern "x86-interrupt" fn divide_error(frame: InterruptStackFrame) {
        panic!("divide error at {:#x}", frame.instruction_pointer);
    }

    pub extern "x86-interrupt" fn breakpoint(frame: InterruptStackFrame) {
        corundum_core::kdebug!("breakpoint at {:#x}", frame.instruction_pointer);
    }

    pub extern "x86-interrupt" fn invalid_opcode(frame: InterruptStackFrame) {
        panic!("invalid opcode at {:#x}", frame.instruction_pointer);
    }

    pub extern "x86-interrupt" fn double_fault(frame: InterruptStackFrame, _err: u64) -> ! {
        corundum_core::kprintln!(
            "\n*** Hard_Panic *** double fault at {:#x}",
            frame.instruction_pointer
        );
        loop {
            // SAFETY: a double fault on this kernel is always unrecoverable;
            // halting with interrupts disabled is the intended final state.
            unsafe { core::arch::asm!("cli; hlt", options(nomem, nostack)) };
        }
    }

    pub extern "x86-interrupt" fn general_protection(frame: InterruptStackFrame, err: u64) {
        panic!(
            "general protection fault (err={err:#x}) at {:#x}",
            frame.instruction_pointer
        );
    }

    pub extern "x86-interrupt" fn page_fault(frame: InterruptStackFrame, err: u64) {
        let fault_addr: u64;
        // SAFETY: CR2 holds the faulting address for the page fault that
        // is currently being handled; reading it here cannot race.
        unsafe { core::arch::asm!("mov {}, cr2", out(reg) fault_addr, options(nomem, nostack)) };
        panic!(
            "page fault at {fault_addr:#x} (err={err:#x}, rip={:#x})",
            frame.instruction_pointer
        );
    }

    pub extern "x86-interrupt" fn timer_tick(_frame: InterruptStackFrame) {
        let core = crate::percpu::current().core_id();
        corundum_sched::dispatch::with(|d| {
            if let Some(running) = d.current(core) {
                if let Ok(cluster) = d.thread_cluster(running) {
                    if let Some(next) = d.timer_tick(cluster, core) {
                        d.set_current(core, Some(next));
                        // The actual register-state swap happens in the
                        // naked return-path trampoline (out of scope here);
                        // this records the scheduling decision the next
                        // return to userland acts on.
                    }
                }
            }
        });
        super::eoi();
    }

    pub extern "x86-interrupt" fn panic_ipi(_frame: InterruptStackFrame) {
        loop {
            // SAFETY: this core is unconditionally halting, matching every
            // other core's response to a `Hard_Panic` broadcast.
            unsafe { core::arch::asm!("cli; hlt", options(nomem, nostack)) };
        }
    }
}

/// Signals end-of-interrupt to the local APIC.
fn eoi() {
    const LAPIC_EOI: u64 = 0xFEE0_00B0;
    // SAFETY: writing 0 to the LAPIC EOI register is the documented
    // end-of-interrupt sequence; the LAPIC is memory-mapped at a fixed
    // address by `boot::map_lapic`.
    unsafe { core::ptr::write_volatile(LAPIC_EOI as *mut u32, 0) };
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u64,
}

/// Loads the IDT into the CPU.
///
/// # Safety
///
/// Must be called after [`super::gdt::init`] (CS must already be valid).
pub unsafe fn init() {
    let idt = &*IDT;
    let ptr = DescriptorTablePointer {
        limit: (size_of::<Table>() - 1) as u16,
        base: core::ptr::addr_of!(*idt) as u64,
    };
    // SAFETY: `ptr` names the just-built, 'static IDT.
    unsafe { core::arch::asm!("lidt [{}]", in(reg) &ptr, options(readonly, nostack)) };
    corundum_core::kdebug!("IDT initialized");
}
