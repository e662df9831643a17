//! Recursive-lock level accounting.
//!
//! A recursive mutex carries a lock level: the nesting depth currently held
//! by its owning thread. The level starts at 0, is mutated only while the
//! native lock is held, and must return to 0 before the lock is free. These
//! transitions are the pure half of that bookkeeping; the OS-backed mutex
//! applies them around its native lock and unlock calls.

use crate::error::{Error, Result};

/// Validate the recursion configuration at mutex creation.
///
/// `max_lock_level` is only meaningful for a recursive mutex; a
/// non-recursive mutex is fixed at level 1 regardless of the argument.
pub const fn validate_recursion_limit(recursive: bool, max_lock_level: i32) -> Result<i32> {
    if !recursive {
        Ok(1)
    } else if max_lock_level < 1 {
        Err(Error::Usage("recursive mutex requires a maximum lock level of at least 1"))
    } else {
        Ok(max_lock_level)
    }
}

/// Level after one more acquisition by the owning thread.
///
/// Fails when the acquisition would push the level past `max`; the caller
/// must then undo the native acquisition it just performed.
pub const fn relock_level(current: i32, max: i32) -> Result<i32> {
    if current >= max {
        Err(Error::LockLevelExceeded { max })
    } else {
        Ok(current + 1)
    }
}

/// Level after one release by the owning thread.
///
/// A release at level 0 means the mutex was not held by the caller.
pub const fn release_level(current: i32) -> Result<i32> {
    if current <= 0 {
        Err(Error::Usage("unlock of a mutex not held by the calling thread"))
    } else {
        Ok(current - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_recursive_limit_is_fixed_at_one() {
        assert_eq!(validate_recursion_limit(false, 0), Ok(1));
        assert_eq!(validate_recursion_limit(false, 17), Ok(1));
    }

    #[test]
    fn recursive_limit_must_be_positive() {
        assert_eq!(validate_recursion_limit(true, 4), Ok(4));
        assert!(validate_recursion_limit(true, 0).is_err());
        assert!(validate_recursion_limit(true, -3).is_err());
    }

    #[test]
    fn relock_counts_up_to_the_maximum() {
        let max = 3;
        let mut level = 0;
        for expected in 1..=max {
            level = relock_level(level, max).unwrap();
            assert_eq!(level, expected);
        }
        assert_eq!(
            relock_level(level, max),
            Err(Error::LockLevelExceeded { max })
        );
    }

    #[test]
    fn release_counts_back_down_to_zero() {
        assert_eq!(release_level(2), Ok(1));
        assert_eq!(release_level(1), Ok(0));
        assert!(release_level(0).is_err());
        assert!(release_level(-1).is_err());
    }

    #[test]
    fn full_nest_and_unnest_cycle() {
        let max = 5;
        let mut level = 0;
        for _ in 0..max {
            level = relock_level(level, max).unwrap();
        }
        for _ in 0..max {
            level = release_level(level).unwrap();
        }
        assert_eq!(level, 0);
    }
}
