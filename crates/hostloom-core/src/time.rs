//! Timeout arithmetic for sleeps and timed waits.
//!
//! Timeouts are signed 64-bit nanosecond counts. The host APIs want
//! `timespec` values, relative for `nanosleep` and absolute for
//! `pthread_cond_timedwait`, so the conversions live here where they can be
//! tested without a clock. A non-positive timeout is a valid immediate
//! poll, not an error.

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A seconds + nanoseconds pair, always normalized so that
/// `0 <= nsec < NANOS_PER_SEC`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timespec {
    /// Whole seconds.
    pub sec: i64,
    /// Nanosecond remainder.
    pub nsec: i64,
}

/// Split a nanosecond count into a normalized [`Timespec`].
///
/// Non-positive counts clamp to zero.
#[must_use]
pub const fn split_nanos(nanoseconds: i64) -> Timespec {
    if nanoseconds <= 0 {
        return Timespec { sec: 0, nsec: 0 };
    }
    Timespec {
        sec: nanoseconds / NANOS_PER_SEC,
        nsec: nanoseconds % NANOS_PER_SEC,
    }
}

/// Absolute deadline `timeout_ns` after `now`, saturating at the far end of
/// the i64 second range.
#[must_use]
pub const fn deadline_after(now: Timespec, timeout_ns: i64) -> Timespec {
    let delta = split_nanos(timeout_ns);
    let mut sec = now.sec.saturating_add(delta.sec);
    let mut nsec = now.nsec + delta.nsec;
    if nsec >= NANOS_PER_SEC {
        sec = sec.saturating_add(1);
        nsec -= NANOS_PER_SEC;
    }
    Timespec { sec, nsec }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_whole_and_fractional_seconds() {
        assert_eq!(split_nanos(0), Timespec { sec: 0, nsec: 0 });
        assert_eq!(split_nanos(1), Timespec { sec: 0, nsec: 1 });
        assert_eq!(
            split_nanos(NANOS_PER_SEC),
            Timespec { sec: 1, nsec: 0 }
        );
        assert_eq!(
            split_nanos(2 * NANOS_PER_SEC + 500),
            Timespec { sec: 2, nsec: 500 }
        );
    }

    #[test]
    fn negative_counts_clamp_to_zero() {
        assert_eq!(split_nanos(-1), Timespec { sec: 0, nsec: 0 });
        assert_eq!(split_nanos(i64::MIN), Timespec { sec: 0, nsec: 0 });
    }

    #[test]
    fn zero_timeout_deadline_is_now() {
        let now = Timespec { sec: 100, nsec: 42 };
        assert_eq!(deadline_after(now, 0), now);
        assert_eq!(deadline_after(now, -5), now);
    }

    #[test]
    fn nanosecond_carry_is_normalized() {
        let now = Timespec {
            sec: 7,
            nsec: NANOS_PER_SEC - 1,
        };
        let deadline = deadline_after(now, 2);
        assert_eq!(deadline, Timespec { sec: 8, nsec: 1 });
    }

    #[test]
    fn deadlines_saturate_instead_of_overflowing() {
        let now = Timespec {
            sec: i64::MAX,
            nsec: 999_999_999,
        };
        let deadline = deadline_after(now, i64::MAX);
        assert_eq!(deadline.sec, i64::MAX);
        assert!(deadline.nsec < NANOS_PER_SEC);
    }
}
