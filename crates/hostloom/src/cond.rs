//! Condition variable over the native primitive.
//!
//! Wraps one `pthread_cond_t` configured for `CLOCK_MONOTONIC` timed
//! waits, so wall-clock adjustments never shorten or stretch a timeout.
//!
//! A wait must be issued with the associated mutex already held; on return
//! the mutex is re-held, whether the wakeup came from a signal, a
//! broadcast, a timeout, or a native spurious wakeup. The primitive only
//! guarantees "woke up with the mutex re-held" — callers re-check their
//! predicate in a loop.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::{Arc, Weak};

use hostloom_core::time::{Timespec, deadline_after};
use hostloom_core::{Error, Result};

use crate::manager::ThreadManager;
use crate::mutex::Mutex;

/// Outcome of a timed wait. The mutex is re-held in both cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondWaitStatus {
    /// Woken by a signal, a broadcast, or a spurious wakeup.
    Woken,
    /// The timeout elapsed first.
    TimedOut,
}

/// A condition variable usable with any [`Mutex`] from the same manager.
///
/// Created through [`ThreadManager::initialize_condition_variable`] and
/// destroyed through [`ThreadManager::finalize_condition_variable`].
pub struct ConditionVariable {
    native: UnsafeCell<libc::pthread_cond_t>,
    manager: Weak<ThreadManager>,
}

// SAFETY: pthread condition variables are made for concurrent use from any
// thread; there is no other state.
unsafe impl Send for ConditionVariable {}
unsafe impl Sync for ConditionVariable {}

impl ConditionVariable {
    pub(crate) fn new(manager: Weak<ThreadManager>) -> Result<Arc<Self>> {
        // Placed in the Arc before init so the native object never moves;
        // zeroed pthread_cond_t matches the static initializer, keeping the
        // Drop-time destroy defined on the failed-init path.
        let cond = Arc::new(Self {
            native: UnsafeCell::new(unsafe { std::mem::zeroed() }),
            manager,
        });

        let mut attr = MaybeUninit::<libc::pthread_condattr_t>::uninit();
        // SAFETY: attr is initialized, configured, consumed by init, and
        // destroyed, in that order; the cond storage outlives this call.
        let rc = unsafe {
            libc::pthread_condattr_init(attr.as_mut_ptr());
            libc::pthread_condattr_setclock(attr.as_mut_ptr(), libc::CLOCK_MONOTONIC);
            let rc = libc::pthread_cond_init(cond.native.get(), attr.as_ptr());
            libc::pthread_condattr_destroy(attr.as_mut_ptr());
            rc
        };
        if rc != 0 {
            return Err(Error::Os {
                op: "pthread_cond_init",
                errno: rc,
            });
        }
        Ok(cond)
    }

    /// Wake at most one waiter, if any. Non-blocking; a no-op when nobody
    /// is waiting.
    pub fn signal(&self) -> Result<()> {
        // SAFETY: native points to a cond initialized in `new`.
        let rc = unsafe { libc::pthread_cond_signal(self.native.get()) };
        if rc != 0 {
            return Err(Error::Os {
                op: "pthread_cond_signal",
                errno: rc,
            });
        }
        Ok(())
    }

    /// Wake all current waiters. Non-blocking.
    pub fn broadcast(&self) -> Result<()> {
        // SAFETY: native points to a cond initialized in `new`.
        let rc = unsafe { libc::pthread_cond_broadcast(self.native.get()) };
        if rc != 0 {
            return Err(Error::Os {
                op: "pthread_cond_broadcast",
                errno: rc,
            });
        }
        Ok(())
    }

    /// Atomically release `mutex` and block until woken, re-acquiring
    /// `mutex` before returning.
    ///
    /// The caller must hold `mutex`; for a recursive mutex the lock level
    /// must be exactly 1, because the native wait releases a single level.
    pub fn wait(&self, mutex: &Mutex) -> Result<()> {
        mutex.prepare_wait()?;
        // SAFETY: both natives are initialized; the caller holds the mutex.
        let rc = unsafe { libc::pthread_cond_wait(self.native.get(), mutex.native()) };
        match rc {
            0 => {
                mutex.resume_after_wait();
                Ok(())
            }
            errno => {
                // The wait refused or failed after `prepare_wait` passed;
                // the mutex is still held by the caller.
                mutex.resume_after_wait();
                Err(match errno {
                    libc::EPERM => Error::Usage(
                        "condition wait without holding the associated mutex",
                    ),
                    _ => Error::Os {
                        op: "pthread_cond_wait",
                        errno,
                    },
                })
            }
        }
    }

    /// [`ConditionVariable::wait`] with a bound on blocking time.
    ///
    /// `timeout_ns` is in nanoseconds; a value of zero (or below) is a
    /// valid non-blocking poll. Returns whether the wakeup beat the
    /// timeout, with the mutex re-held in both outcomes.
    pub fn timed_wait(&self, mutex: &Mutex, timeout_ns: i64) -> Result<CondWaitStatus> {
        let mut now = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: now is a valid timespec out-parameter.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut now) };
        if rc != 0 {
            return Err(crate::stack::os_error("clock_gettime"));
        }
        let deadline = deadline_after(
            Timespec {
                sec: now.tv_sec,
                nsec: now.tv_nsec,
            },
            timeout_ns,
        );
        let abs = libc::timespec {
            tv_sec: deadline.sec as libc::time_t,
            tv_nsec: deadline.nsec as libc::c_long,
        };

        mutex.prepare_wait()?;
        // SAFETY: both natives are initialized; the caller holds the mutex;
        // abs is a normalized absolute CLOCK_MONOTONIC deadline.
        let rc =
            unsafe { libc::pthread_cond_timedwait(self.native.get(), mutex.native(), &abs) };
        match rc {
            0 => {
                mutex.resume_after_wait();
                Ok(CondWaitStatus::Woken)
            }
            libc::ETIMEDOUT => {
                mutex.resume_after_wait();
                Ok(CondWaitStatus::TimedOut)
            }
            errno => {
                // The mutex is still held by the caller.
                mutex.resume_after_wait();
                Err(match errno {
                    libc::EPERM => Error::Usage(
                        "condition wait without holding the associated mutex",
                    ),
                    _ => Error::Os {
                        op: "pthread_cond_timedwait",
                        errno,
                    },
                })
            }
        }
    }

    pub(crate) fn created_by(&self, manager: &ThreadManager) -> bool {
        std::ptr::eq(self.manager.as_ptr(), manager)
    }
}

impl Drop for ConditionVariable {
    fn drop(&mut self) {
        // SAFETY: native was initialized in `new` (or left in the
        // static-initializer state) and has no waiters once the last Arc
        // is gone.
        unsafe { libc::pthread_cond_destroy(self.native.get()) };
    }
}

impl std::fmt::Debug for ConditionVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionVariable").finish_non_exhaustive()
    }
}
