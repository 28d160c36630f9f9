//! Just enough MADT parsing to enumerate usable LAPICs for SMP bring-up.
//!
//! The teacher sources this from its own `hadron-acpi` crate, which parses
//! the full ACPI table set; this kernel only ever needs one table's worth
//! of one record type, so that machinery is not worth carrying over.

/// One processor-local APIC entry from the MADT (ACPI MADT entry type 0).
#[derive(Debug, Clone, Copy)]
pub struct LapicEntry {
    /// ACPI processor id (not the same namespace as [`Self::apic_id`]).
    pub processor_id: u8,
    /// The LAPIC id this core answers INIT/SIPI IPIs on.
    pub apic_id: u8,
    /// Raw MADT entry flags; bit 0 is "enabled", bit 1 is "online capable".
    pub flags: u32,
}

impl LapicEntry {
    /// Whether bring-up should attempt to start this core, per §4.1's
    /// "enabled XOR online-capable" admission rule.
    pub fn is_usable(&self) -> bool {
        let enabled = self.flags & 0x1 != 0;
        let online_capable = self.flags & 0x2 != 0;
        enabled ^ online_capable
    }
}

const ENTRY_TYPE_LOCAL_APIC: u8 = 0;
const MADT_HEADER_LEN: usize = 44;

/// Walks a mapped MADT's variable-length entry list, yielding every
/// processor-local APIC entry regardless of usability (callers filter with
/// [`LapicEntry::is_usable`]).
///
/// `madt` must start at the MADT's own ACPI table header (`"APIC"` signature)
/// and run for at least the table's declared length.
pub fn local_apics(madt: &[u8]) -> impl Iterator<Item = LapicEntry> + '_ {
    let mut offset = MADT_HEADER_LEN.min(madt.len());
    core::iter::from_fn(move || loop {
        if offset + 2 > madt.len() {
            return None;
        }
        let entry_type = madt[offset];
        let entry_len = madt[offset + 1] as usize;
        if entry_len == 0 || offset + entry_len > madt.len() {
            return None;
        }
        let entry = &madt[offset..offset + entry_len];
        offset += entry_len;

        if entry_type == ENTRY_TYPE_LOCAL_APIC && entry.len() >= 8 {
            let processor_id = entry[2];
            let apic_id = entry[3];
            let flags = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]);
            return Some(LapicEntry {
                processor_id,
                apic_id,
                flags,
            });
        }
    })
}
