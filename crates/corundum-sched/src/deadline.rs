//! Deadline admission control.
//!
//! A deadline thread declares `(runtime, period)`: it must receive at least
//! `runtime` ticks of CPU time within every `period`-tick window. A cluster
//! only admits a new deadline thread if doing so keeps the sum of
//! `runtime / period` across all its deadline threads at or below 1 — beyond
//! that, no schedule can satisfy every thread's declared rate.
//!
//! The check is done with cross-multiplication rather than floating point,
//! since this crate is `no_std` and runs before any FPU context is set up.

/// A thread's declared `(runtime, period)` deadline parameters, in scheduler
/// ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// Minimum ticks of CPU time guaranteed per period.
    pub runtime_ticks: u32,
    /// Length of the recurring window, in ticks.
    pub period_ticks: u32,
}

impl Deadline {
    /// Creates a new deadline. `period_ticks` of zero is rejected by
    /// [`admits`] rather than here, so construction alone never panics.
    pub const fn new(runtime_ticks: u32, period_ticks: u32) -> Self {
        Self {
            runtime_ticks,
            period_ticks,
        }
    }

    /// Ticks of CPU time owed once `runtime_ticks` of the current period have
    /// been consumed.
    pub const fn remaining(self, consumed_ticks: u32) -> u32 {
        self.runtime_ticks.saturating_sub(consumed_ticks)
    }
}

/// Checks whether `candidate` can be admitted alongside `existing`'s deadline
/// threads without pushing total cluster utilization above 1.
///
/// Returns `false` if `candidate.period_ticks` is zero (an unsatisfiable
/// declaration) or if admission would exceed full utilization.
///
/// Utilization is `sum(runtime_i / period_i) <= 1`, checked without division
/// by comparing `sum(runtime_i * lcm_factor) <= lcm_factor` is avoidable:
/// instead each candidate is checked pairwise against the running sum kept as
/// a `(numerator, denominator)` pair, cross-multiplied term by term.
pub fn admits(existing: &[Deadline], candidate: Deadline) -> bool {
    if candidate.period_ticks == 0 {
        return false;
    }
    if candidate.runtime_ticks > candidate.period_ticks {
        return false;
    }

    // Accumulate sum(runtime_i / period_i) + candidate as a single fraction
    // comparison against 1, using u64 cross-multiplication to stay exact
    // without floating point. total_num / total_den <= 1 iff
    // total_num <= total_den, where total_den is the product of all periods
    // seen so far (fine for the small thread counts a single cluster holds).
    let mut total_num: u64 = candidate.runtime_ticks as u64;
    let mut total_den: u64 = candidate.period_ticks as u64;

    for d in existing {
        if d.period_ticks == 0 {
            continue;
        }
        // total_num/total_den + d.runtime/d.period <= 1
        // => total_num*d.period + d.runtime*total_den <= total_den*d.period
        let new_den = match total_den.checked_mul(d.period_ticks as u64) {
            Some(v) => v,
            None => return false,
        };
        let lhs_a = match total_num.checked_mul(d.period_ticks as u64) {
            Some(v) => v,
            None => return false,
        };
        let lhs_b = match (d.runtime_ticks as u64).checked_mul(total_den) {
            Some(v) => v,
            None => return false,
        };
        let lhs = match lhs_a.checked_add(lhs_b) {
            Some(v) => v,
            None => return false,
        };
        if lhs > new_den {
            return false;
        }
        total_num = lhs;
        total_den = new_den;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_half_utilization_thread_admits() {
        let d = Deadline::new(5, 10);
        assert!(admits(&[], d));
    }

    #[test]
    fn two_half_utilization_threads_admit_exactly() {
        let existing = [Deadline::new(5, 10)];
        assert!(admits(&existing, Deadline::new(5, 10)));
    }

    #[test]
    fn third_half_utilization_thread_is_rejected() {
        let existing = [Deadline::new(5, 10), Deadline::new(5, 10)];
        assert!(!admits(&existing, Deadline::new(1, 10)));
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(!admits(&[], Deadline::new(1, 0)));
    }

    #[test]
    fn runtime_exceeding_period_is_rejected() {
        assert!(!admits(&[], Deadline::new(20, 10)));
    }

    #[test]
    fn full_utilization_boundary_admits() {
        let existing = [Deadline::new(7, 10)];
        assert!(admits(&existing, Deadline::new(3, 10)));
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let d = Deadline::new(5, 10);
        assert_eq!(d.remaining(3), 2);
        assert_eq!(d.remaining(10), 0);
    }
}
