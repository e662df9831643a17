//! Process-wide thread manager and registry.
//!
//! The manager is the factory and destructor for every [`Thread`],
//! [`Mutex`], and [`ConditionVariable`], and owns the registry that maps
//! native thread identifiers back to their wrapper objects. It is an
//! explicit context object: create one with [`ThreadManager::new`], keep
//! the `Arc` alive for as long as anything it created is in use, and pass
//! it to whatever needs to create threads or locks.
//!
//! The registry is the only implicitly shared mutable structure in the
//! crate and sits behind its own internal lock, distinct from any mutex an
//! application creates. A thread's entry is inserted before its function
//! becomes observable and removed only through [`ThreadManager::destroy_thread`],
//! after the thread has finished.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use hostloom_core::priority::validate_priority;
use hostloom_core::time::split_nanos;
use hostloom_core::{Error, Result};

use crate::cond::ConditionVariable;
use crate::mutex::{Mutex, current_thread_key};
use crate::stack::{StackMemory, os_error};
use crate::thread::{Thread, ThreadFunction};

/// Factory, destructor, and registry for the threading abstraction.
///
/// One instance exists per process in the intended usage; it must outlive
/// every object it created. The registry holds non-owning back-references,
/// so outliving is about usefulness (`get_current_thread` resolving), not
/// memory safety.
pub struct ThreadManager {
    registry: parking_lot::Mutex<HashMap<u64, Weak<Thread>>>,
}

impl ThreadManager {
    /// Create a manager with an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Create a thread in the "not started" state.
    ///
    /// `argument` is handed to `function` verbatim when the thread starts
    /// and must stay valid for the thread's whole execution. The stack has
    /// already been validated by [`StackMemory`] construction; the priority
    /// must be within the abstract range.
    pub fn create_thread(
        self: &Arc<Self>,
        function: ThreadFunction,
        argument: usize,
        stack: StackMemory,
        priority: i32,
    ) -> Result<Arc<Thread>> {
        validate_priority(priority)?;
        Ok(Arc::new(Thread::new(
            function,
            argument,
            stack,
            priority,
            Arc::downgrade(self),
        )))
    }

    /// Remove a thread from the registry and release it.
    ///
    /// Usage errors: the thread was created by a different manager, or it
    /// is still running (join it first). A finished thread that was never
    /// joined is reaped here.
    pub fn destroy_thread(self: &Arc<Self>, thread: Arc<Thread>) -> Result<()> {
        if !thread.created_by(self) {
            return Err(Error::Usage(
                "destroy of a thread created by a different manager",
            ));
        }
        if thread.is_running() {
            return Err(Error::Usage(
                "destroy of a running thread; join it first",
            ));
        }
        if thread.was_started() {
            // Reap the native thread if nobody joined it; finished, so this
            // does not block meaningfully.
            thread.join()?;
            let key = thread.registry_key();
            if key != 0 {
                // The native identifier can be reused once the thread is
                // joined; only remove the entry if it is still ours.
                let mut registry = self.registry.lock();
                if registry
                    .get(&key)
                    .is_some_and(|entry| entry.as_ptr() == Arc::as_ptr(&thread))
                {
                    registry.remove(&key);
                }
            }
        }
        drop(thread);
        Ok(())
    }

    /// Resolve the calling thread back to its wrapper.
    ///
    /// Returns `None` — not an error — when the calling thread was not
    /// created through this manager (for example the process's initial
    /// thread).
    #[must_use]
    pub fn get_current_thread(&self) -> Option<Arc<Thread>> {
        let key = current_thread_key();
        self.registry.lock().get(&key).and_then(Weak::upgrade)
    }

    /// Cede the rest of the calling thread's timeslice.
    pub fn yield_thread(&self) {
        // SAFETY: sched_yield has no preconditions.
        unsafe { libc::sched_yield() };
    }

    /// Pause the calling thread for `nanoseconds`.
    ///
    /// Restarted on signal interruption with the remaining time, so the
    /// full duration elapses. Non-positive values return immediately.
    pub fn sleep_thread(&self, nanoseconds: i64) {
        let duration = split_nanos(nanoseconds);
        let mut request = libc::timespec {
            tv_sec: duration.sec as libc::time_t,
            tv_nsec: duration.nsec as libc::c_long,
        };
        loop {
            let mut remaining = libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            };
            // SAFETY: request and remaining are valid timespec values.
            let rc = unsafe { libc::nanosleep(&request, &mut remaining) };
            if rc == 0 {
                return;
            }
            if std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                request = remaining;
                continue;
            }
            // Only EINTR is possible for a normalized request.
            return;
        }
    }

    /// Processor number the calling thread is currently running on.
    pub fn current_processor_number(&self) -> Result<i32> {
        // SAFETY: sched_getcpu has no preconditions.
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu < 0 {
            return Err(os_error("sched_getcpu"));
        }
        Ok(cpu)
    }

    /// Create a mutex. `max_lock_level` bounds recursive ownership and is
    /// ignored (fixed at 1) for a non-recursive mutex.
    pub fn initialize_mutex(
        self: &Arc<Self>,
        recursive: bool,
        max_lock_level: i32,
    ) -> Result<Arc<Mutex>> {
        Mutex::new(recursive, max_lock_level, Arc::downgrade(self))
    }

    /// Destroy a mutex created by this manager. Finalizing a held mutex,
    /// or one from a different manager, is a usage error.
    pub fn finalize_mutex(self: &Arc<Self>, mutex: Arc<Mutex>) -> Result<()> {
        if !mutex.created_by(self) {
            return Err(Error::Usage(
                "finalize of a mutex created by a different manager",
            ));
        }
        if mutex.current_lock_level() > 0 {
            return Err(Error::Usage("finalize of a mutex that is still held"));
        }
        drop(mutex);
        Ok(())
    }

    /// Create a condition variable.
    pub fn initialize_condition_variable(self: &Arc<Self>) -> Result<Arc<ConditionVariable>> {
        ConditionVariable::new(Arc::downgrade(self))
    }

    /// Destroy a condition variable created by this manager.
    pub fn finalize_condition_variable(
        self: &Arc<Self>,
        condition_variable: Arc<ConditionVariable>,
    ) -> Result<()> {
        if !condition_variable.created_by(self) {
            return Err(Error::Usage(
                "finalize of a condition variable created by a different manager",
            ));
        }
        drop(condition_variable);
        Ok(())
    }

    /// Insert a registry entry for a thread that is about to run its
    /// function. Called from the new thread itself, before the function
    /// becomes observable.
    pub(crate) fn register(&self, key: u64, thread: Weak<Thread>) {
        self.registry.lock().insert(key, thread);
    }
}

impl std::fmt::Debug for ThreadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadManager")
            .field("registered_threads", &self.registry.lock().len())
            .finish()
    }
}
