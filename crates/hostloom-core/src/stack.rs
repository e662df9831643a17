//! Thread stack validation.
//!
//! Stack memory handed to a thread must be page-aligned and at least the
//! host minimum; pthread rejects anything less at `pthread_attr_setstack`
//! time, so the checks run up front where the error can name the caller's
//! mistake.

use crate::error::{Error, Result};

/// Required alignment for thread stack memory, in bytes.
pub const THREAD_STACK_ALIGN: usize = 4096;

/// Minimum usable stack size, in bytes (matches `PTHREAD_STACK_MIN` on the
/// supported hosts).
pub const THREAD_STACK_MIN: usize = 16 * 1024;

/// Validate a stack region before it is bound to a thread.
pub const fn validate_stack(base: usize, size: usize) -> Result<()> {
    if base % THREAD_STACK_ALIGN != 0 {
        return Err(Error::StackMisaligned {
            base,
            align: THREAD_STACK_ALIGN,
        });
    }
    if size < THREAD_STACK_MIN {
        return Err(Error::StackTooSmall {
            size,
            min: THREAD_STACK_MIN,
        });
    }
    if size % THREAD_STACK_ALIGN != 0 {
        return Err(Error::Usage(
            "stack size must be a multiple of THREAD_STACK_ALIGN",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_minimum_stack_is_accepted() {
        assert_eq!(validate_stack(0x10000, THREAD_STACK_MIN), Ok(()));
        assert_eq!(validate_stack(0, 64 * 1024), Ok(()));
    }

    #[test]
    fn misaligned_base_is_rejected() {
        assert_eq!(
            validate_stack(0x10001, THREAD_STACK_MIN),
            Err(Error::StackMisaligned {
                base: 0x10001,
                align: THREAD_STACK_ALIGN,
            })
        );
    }

    #[test]
    fn undersized_stack_is_rejected() {
        assert_eq!(
            validate_stack(0x10000, THREAD_STACK_MIN - 1),
            Err(Error::StackTooSmall {
                size: THREAD_STACK_MIN - 1,
                min: THREAD_STACK_MIN,
            })
        );
        assert!(validate_stack(0x10000, 0).is_err());
    }

    #[test]
    fn size_must_be_a_multiple_of_the_alignment() {
        assert!(validate_stack(0x10000, THREAD_STACK_MIN + 1).is_err());
        assert_eq!(
            validate_stack(0x10000, THREAD_STACK_MIN + THREAD_STACK_ALIGN),
            Ok(())
        );
    }
}
