//! Error taxonomy for the threading abstraction.
//!
//! Every failure in hostloom is one of three classes: the caller violated a
//! precondition, the host refused a native primitive, or the host has no
//! native equivalent for the requested query. Fine-grained variants carry
//! the detail; [`Error::class`] collapses them for callers that only need
//! the class (e.g. feature detection of unsupported queries).

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller violated a documented precondition. Loud, immediate, never
    /// retried — it indicates a caller bug, not a transient condition.
    Usage,
    /// The host refused to create or operate a native primitive.
    Resource,
    /// The host has no native equivalent for the requested operation.
    Unsupported,
}

/// Errors reported by the threading abstraction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Generic precondition violation at the call site.
    #[error("usage error: {0}")]
    Usage(&'static str),

    /// Priority outside the abstract priority range.
    #[error("priority {0} outside the abstract priority range")]
    InvalidPriority(i32),

    /// Stack base not aligned to the required boundary.
    #[error("stack base {base:#x} not aligned to {align} bytes")]
    StackMisaligned { base: usize, align: usize },

    /// Stack smaller than the host minimum.
    #[error("stack size {size} below the host minimum of {min} bytes")]
    StackTooSmall { size: usize, min: usize },

    /// A recursive acquisition would exceed the configured maximum.
    #[error("recursive lock level would exceed the maximum of {max}")]
    LockLevelExceeded { max: i32 },

    /// A thread attempted to join itself.
    #[error("thread attempted to join itself")]
    JoinSelf,

    /// Thread name contained an interior NUL byte.
    #[error("thread name contains an interior NUL byte")]
    InvalidName,

    /// A host call failed; carries the operation name and errno.
    #[error("{op} failed with errno {errno}")]
    Os { op: &'static str, errno: i32 },

    /// The host has no native equivalent for this operation.
    #[error("operation not supported on this host: {0}")]
    Unsupported(&'static str),
}

impl Error {
    /// Collapse the fine-grained variant into its taxonomy class.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Error::Os { .. } => ErrorClass::Resource,
            Error::Unsupported(_) => ErrorClass::Unsupported,
            _ => ErrorClass::Usage,
        }
    }
}
