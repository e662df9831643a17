//! # hostloom
//!
//! A uniform thread, mutex, and condition-variable API on top of the host
//! operating system's native synchronization primitives. Application code
//! written against this crate never touches an OS-specific call.
//!
//! The entry point is [`ThreadManager`]: an explicit, process-wide context
//! object that creates and destroys every [`Thread`], [`Mutex`], and
//! [`ConditionVariable`], and that resolves "the currently running thread"
//! back to its wrapper via an internal registry. None of the wrapper types
//! can be constructed directly — copying or default-constructing a live OS
//! handle is never valid, so those forms simply do not exist.
//!
//! ```no_run
//! use hostloom::{DEFAULT_THREAD_PRIORITY, StackMemory, ThreadManager};
//!
//! fn work(arg: usize) {
//!     let _ = arg;
//! }
//!
//! # fn main() -> hostloom::Result<()> {
//! let manager = ThreadManager::new();
//! let stack = StackMemory::allocate(64 * 1024)?;
//! let thread = manager.create_thread(work, 0, stack, DEFAULT_THREAD_PRIORITY)?;
//! thread.start()?;
//! thread.join()?;
//! manager.destroy_thread(thread)?;
//! # Ok(())
//! # }
//! ```
//!
//! Pure contract logic (priority translation, lock-level accounting, stack
//! validation, timeout arithmetic, the error taxonomy) lives in
//! `hostloom-core` and is re-exported here.

pub mod cond;
pub mod manager;
pub mod mutex;
pub mod stack;
pub mod thread;

pub use cond::{CondWaitStatus, ConditionVariable};
pub use manager::ThreadManager;
pub use mutex::Mutex;
pub use stack::StackMemory;
pub use thread::{Thread, ThreadFunction, ThreadName};

pub use hostloom_core::{
    DEFAULT_THREAD_PRIORITY, Error, ErrorClass, HIGHEST_THREAD_PRIORITY, LOWEST_THREAD_PRIORITY,
    Result, THREAD_STACK_ALIGN, THREAD_STACK_MIN,
};
