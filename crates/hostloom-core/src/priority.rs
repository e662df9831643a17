//! Priority translation between the abstract scale and the host scale.
//!
//! The abstraction exposes a fixed integer scale where a numerically smaller
//! value means a stronger priority. The supported hosts schedule regular
//! threads by nice value, so the translation maps the abstract range onto
//! `-20..=19` linearly and clamps anything the other side cannot express.
//! Pure functions only; unit-tested without a live thread.

use crate::error::{Error, Result};

/// Strongest abstract priority (numerically smallest).
pub const HIGHEST_THREAD_PRIORITY: i32 = 0;
/// Weakest abstract priority (numerically largest).
pub const LOWEST_THREAD_PRIORITY: i32 = 31;
/// Priority assigned when the caller has no preference.
pub const DEFAULT_THREAD_PRIORITY: i32 = 16;

/// Strongest host nice value.
const NATIVE_HIGHEST: i32 = -20;
/// Weakest host nice value.
const NATIVE_LOWEST: i32 = 19;

const ABSTRACT_SPAN: i32 = LOWEST_THREAD_PRIORITY - HIGHEST_THREAD_PRIORITY;
const NATIVE_SPAN: i32 = NATIVE_LOWEST - NATIVE_HIGHEST;

/// Returns true if `priority` is within the abstract range.
#[must_use]
pub const fn valid_priority(priority: i32) -> bool {
    priority >= HIGHEST_THREAD_PRIORITY && priority <= LOWEST_THREAD_PRIORITY
}

/// Range-check an abstract priority supplied by the caller.
pub const fn validate_priority(priority: i32) -> Result<i32> {
    if valid_priority(priority) {
        Ok(priority)
    } else {
        Err(Error::InvalidPriority(priority))
    }
}

/// Map an abstract priority to the nearest host nice value.
///
/// Out-of-range input is clamped first, so the result is always a valid
/// nice value. Monotonic: a stronger abstract priority never maps to a
/// weaker nice value.
#[must_use]
pub const fn abstract_to_native(priority: i32) -> i32 {
    let p = clamp(priority, HIGHEST_THREAD_PRIORITY, LOWEST_THREAD_PRIORITY);
    NATIVE_HIGHEST + ((p - HIGHEST_THREAD_PRIORITY) * NATIVE_SPAN) / ABSTRACT_SPAN
}

/// Map a host nice value back to the abstract scale for reporting.
///
/// Host-specific levels unreachable from the abstract scale clamp to the
/// nearest abstract extreme rather than failing.
#[must_use]
pub const fn native_to_abstract(native: i32) -> i32 {
    let n = clamp(native, NATIVE_HIGHEST, NATIVE_LOWEST);
    HIGHEST_THREAD_PRIORITY + ((n - NATIVE_HIGHEST) * ABSTRACT_SPAN) / NATIVE_SPAN
}

const fn clamp(value: i32, lo: i32, hi: i32) -> i32 {
    if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_endpoints() {
        assert_eq!(abstract_to_native(HIGHEST_THREAD_PRIORITY), -20);
        assert_eq!(abstract_to_native(LOWEST_THREAD_PRIORITY), 19);
        assert_eq!(native_to_abstract(-20), HIGHEST_THREAD_PRIORITY);
        assert_eq!(native_to_abstract(19), LOWEST_THREAD_PRIORITY);
    }

    #[test]
    fn default_priority_is_in_range() {
        assert!(valid_priority(DEFAULT_THREAD_PRIORITY));
    }

    #[test]
    fn abstract_to_native_is_monotonic() {
        let mut prev = abstract_to_native(HIGHEST_THREAD_PRIORITY);
        for p in HIGHEST_THREAD_PRIORITY + 1..=LOWEST_THREAD_PRIORITY {
            let native = abstract_to_native(p);
            assert!(native >= prev, "priority {p} mapped below its predecessor");
            prev = native;
        }
    }

    #[test]
    fn native_to_abstract_is_monotonic() {
        let mut prev = native_to_abstract(-20);
        for n in -19..=19 {
            let abstract_p = native_to_abstract(n);
            assert!(abstract_p >= prev, "nice {n} mapped below its predecessor");
            prev = abstract_p;
        }
    }

    #[test]
    fn out_of_range_native_clamps_to_extremes() {
        assert_eq!(native_to_abstract(-99), HIGHEST_THREAD_PRIORITY);
        assert_eq!(native_to_abstract(99), LOWEST_THREAD_PRIORITY);
        assert_eq!(native_to_abstract(i32::MIN), HIGHEST_THREAD_PRIORITY);
        assert_eq!(native_to_abstract(i32::MAX), LOWEST_THREAD_PRIORITY);
    }

    #[test]
    fn out_of_range_abstract_clamps_to_extremes() {
        assert_eq!(abstract_to_native(-1), -20);
        assert_eq!(abstract_to_native(LOWEST_THREAD_PRIORITY + 1), 19);
    }

    #[test]
    fn round_trip_stays_within_mapping_granularity() {
        for p in HIGHEST_THREAD_PRIORITY..=LOWEST_THREAD_PRIORITY {
            let back = native_to_abstract(abstract_to_native(p));
            assert!(
                (back - p).abs() <= 1,
                "priority {p} round-tripped to {back}"
            );
        }
    }

    #[test]
    fn validate_priority_rejects_out_of_range() {
        assert_eq!(validate_priority(DEFAULT_THREAD_PRIORITY), Ok(16));
        assert_eq!(
            validate_priority(LOWEST_THREAD_PRIORITY + 1),
            Err(Error::InvalidPriority(32))
        );
        assert_eq!(validate_priority(-1), Err(Error::InvalidPriority(-1)));
    }
}
