//! ASLR seed plumbing.
//!
//! §9 DESIGN NOTES names "the RNG seed" as one of the process-wide
//! singletons. This module owns just enough of it to seed per-`exec` ASLR
//! offsets; the cryptographic conditioning of that seed is out of scope
//! (§1 excludes crypto RNG internals).

use corundum_core::sync::Mutex;

static SEED: Mutex<u64> = Mutex::new(0);

/// Reseeds the global entropy pool from the architecture's hardware RNG
/// primitive, if present. Falls back to a fixed non-random seed (making
/// ASLR a no-op) when no hardware source is available, which is acceptable
/// for a test boot but never for a production one.
pub fn reseed() {
    let sample = read_hw_rng().unwrap_or(0xC0FF_EE15_BAD5_EED0);
    *SEED.lock() = sample;
}

#[cfg(target_arch = "x86_64")]
fn read_hw_rng() -> Option<u64> {
    let mut value: u64;
    let mut ok: u8;
    // SAFETY: RDRAND is unconditionally encodable on x86_64; the carry flag
    // in `ok` tells us whether the hardware actually produced a value.
    unsafe {
        core::arch::asm!(
            "rdrand {val}",
            "setc {ok}",
            val = out(reg) value,
            ok = out(reg_byte) ok,
            options(nomem, nostack),
        );
    }
    (ok != 0).then_some(value)
}

#[cfg(not(target_arch = "x86_64"))]
fn read_hw_rng() -> Option<u64> {
    None
}

/// Draws the next ASLR offset: a page-aligned value in `0..range_pages`
/// page units, derived from a simple xorshift of the stored seed so
/// successive draws within one boot differ.
pub fn next_aslr_offset_pages(range_pages: u64) -> u64 {
    if range_pages == 0 {
        return 0;
    }
    let mut seed = SEED.lock();
    let mut x = *seed;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    *seed = x;
    x % range_pages
}
