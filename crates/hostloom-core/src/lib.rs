//! # hostloom-core
//!
//! Pure contract logic for the hostloom threading abstraction.
//!
//! Everything that can be decided without touching a native primitive lives
//! here: the priority translation between the abstract scale and the host
//! scale, the recursive-lock level accounting, stack memory validation,
//! timeout arithmetic, and the error taxonomy. No `unsafe` code is permitted
//! at the crate level, and nothing in this crate blocks or spawns.
//!
//! The OS-backed types in the `hostloom` crate drive these functions at the
//! points where the corresponding native call happens.

#![deny(unsafe_code)]

pub mod error;
pub mod lock;
pub mod priority;
pub mod stack;
pub mod time;

pub use error::{Error, ErrorClass, Result};
pub use lock::{release_level, relock_level, validate_recursion_limit};
pub use priority::{
    DEFAULT_THREAD_PRIORITY, HIGHEST_THREAD_PRIORITY, LOWEST_THREAD_PRIORITY, abstract_to_native,
    native_to_abstract, valid_priority, validate_priority,
};
pub use stack::{THREAD_STACK_ALIGN, THREAD_STACK_MIN, validate_stack};
pub use time::{NANOS_PER_SEC, Timespec, deadline_after, split_nanos};
