//! Intra-process mutex over the native lock.
//!
//! Wraps one `pthread_mutex_t`. A non-recursive mutex uses the
//! error-checking native type, so the two misuses the contract forbids —
//! re-lock by the owner and unlock while unheld — are reported as usage
//! errors instead of deadlocking or corrupting state. A recursive mutex
//! uses the recursive native type with a configurable level bound. Both
//! modes keep owner/level accounting, written only while the native lock
//! is held; the level is what lets a held mutex be refused at finalize.
//!
//! This is an intra-process lock only; nothing here is shareable across
//! processes.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use hostloom_core::lock::{release_level, relock_level, validate_recursion_limit};
use hostloom_core::{Error, Result};

use crate::manager::ThreadManager;

/// Owner value meaning "held by no thread". `pthread_self` is never zero on
/// the supported hosts.
const NO_OWNER: u64 = 0;

/// An intra-process mutex with optional bounded recursive locking.
///
/// Created through [`ThreadManager::initialize_mutex`] and destroyed
/// through [`ThreadManager::finalize_mutex`]; there is no other way to
/// construct one.
pub struct Mutex {
    native: UnsafeCell<libc::pthread_mutex_t>,
    recursive: bool,
    max_lock_level: i32,
    /// Nesting depth held by `owner` (at most 1 for a non-recursive
    /// mutex); written only while the native lock is held.
    lock_level: AtomicI32,
    /// `pthread_self` of the holding thread, or [`NO_OWNER`].
    owner: AtomicU64,
    manager: Weak<ThreadManager>,
}

// SAFETY: pthread mutexes are made for concurrent use from any thread; the
// accounting fields are atomics whose writes are serialized by the native
// lock itself.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    pub(crate) fn new(
        recursive: bool,
        max_lock_level: i32,
        manager: Weak<ThreadManager>,
    ) -> Result<Arc<Self>> {
        let max_lock_level = validate_recursion_limit(recursive, max_lock_level)?;

        // The native mutex must never move once initialized, so it is
        // placed in the Arc first and initialized in place. Zeroed
        // pthread_mutex_t matches the static initializer, which keeps the
        // Drop-time destroy defined even if init below fails.
        let mutex = Arc::new(Self {
            native: UnsafeCell::new(unsafe { std::mem::zeroed() }),
            recursive,
            max_lock_level,
            lock_level: AtomicI32::new(0),
            owner: AtomicU64::new(NO_OWNER),
            manager,
        });

        let kind = if recursive {
            libc::PTHREAD_MUTEX_RECURSIVE
        } else {
            libc::PTHREAD_MUTEX_ERRORCHECK
        };

        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        // SAFETY: attr is initialized, configured, consumed by init, and
        // destroyed, in that order; the mutex storage outlives this call.
        let rc = unsafe {
            libc::pthread_mutexattr_init(attr.as_mut_ptr());
            libc::pthread_mutexattr_settype(attr.as_mut_ptr(), kind);
            let rc = libc::pthread_mutex_init(mutex.native.get(), attr.as_ptr());
            libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
            rc
        };
        if rc != 0 {
            return Err(Error::Os {
                op: "pthread_mutex_init",
                errno: rc,
            });
        }
        Ok(mutex)
    }

    /// Block until the calling thread owns the mutex.
    ///
    /// For a recursive mutex already held by the caller this increments the
    /// lock level, failing with [`Error::LockLevelExceeded`] (and leaving
    /// the previous level intact) when the bound would be passed. Re-locking
    /// a non-recursive mutex the caller already holds is a usage error.
    pub fn lock(&self) -> Result<()> {
        // SAFETY: native points to a mutex initialized in `new`.
        let rc = unsafe { libc::pthread_mutex_lock(self.native.get()) };
        match rc {
            0 => self.note_acquired(),
            libc::EDEADLK => Err(Error::Usage(
                "re-lock of a non-recursive mutex by its owning thread",
            )),
            errno => Err(Error::Os {
                op: "pthread_mutex_lock",
                errno,
            }),
        }
    }

    /// Attempt to own the mutex without blocking.
    ///
    /// Returns `Ok(false)` when another thread holds it (or when the caller
    /// holds a non-recursive instance). Recursion accounting is identical
    /// to [`Mutex::lock`], including the level-bound failure.
    pub fn try_lock(&self) -> Result<bool> {
        // SAFETY: native points to a mutex initialized in `new`.
        let rc = unsafe { libc::pthread_mutex_trylock(self.native.get()) };
        match rc {
            0 => {
                self.note_acquired()?;
                Ok(true)
            }
            libc::EBUSY | libc::EDEADLK => Ok(false),
            errno => Err(Error::Os {
                op: "pthread_mutex_trylock",
                errno,
            }),
        }
    }

    /// Release one level of ownership, freeing the native lock when the
    /// level returns to zero. Unlocking a mutex the caller does not hold is
    /// a usage error.
    pub fn unlock(&self) -> Result<()> {
        if self.owner.load(Ordering::Relaxed) != current_thread_key() {
            return Err(Error::Usage(
                "unlock of a mutex not held by the calling thread",
            ));
        }
        // We own the lock, so the accounting writes below are protected.
        // The final release must clear the accounting before the native
        // unlock hands the lock to the next owner.
        let previous = self.lock_level.load(Ordering::Relaxed);
        let next = release_level(previous)?;
        if next == 0 {
            self.owner.store(NO_OWNER, Ordering::Relaxed);
        }
        self.lock_level.store(next, Ordering::Relaxed);
        // SAFETY: native points to a mutex initialized in `new`.
        let rc = unsafe { libc::pthread_mutex_unlock(self.native.get()) };
        if rc != 0 {
            // The native lock is still ours; put the accounting back so it
            // keeps agreeing with the native state.
            self.owner.store(current_thread_key(), Ordering::Relaxed);
            self.lock_level.store(previous, Ordering::Relaxed);
            return Err(Error::Os {
                op: "pthread_mutex_unlock",
                errno: rc,
            });
        }
        Ok(())
    }

    /// Best-effort query: does the calling thread hold this mutex?
    ///
    /// Answered from the owner/level accounting for recursive mutexes.
    /// The query is not part of the non-recursive contract and is reported
    /// as unsupported there.
    pub fn is_locked_by_current_thread(&self) -> Result<bool> {
        if !self.recursive {
            return Err(Error::Unsupported(
                "lock ownership query on a non-recursive mutex",
            ));
        }
        // Only the calling thread can ever have stored its own key, so a
        // match is exact and a mismatch means "not held by us".
        let held = self.owner.load(Ordering::Relaxed) == current_thread_key()
            && self.lock_level.load(Ordering::Relaxed) > 0;
        Ok(held)
    }

    /// Record one acquisition that the native lock just granted.
    fn note_acquired(&self) -> Result<()> {
        let level = self.lock_level.load(Ordering::Relaxed);
        match relock_level(level, self.max_lock_level) {
            Ok(next) => {
                self.owner.store(current_thread_key(), Ordering::Relaxed);
                self.lock_level.store(next, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                // Undo the native level that took us past the bound.
                // SAFETY: the calling thread holds the lock it is releasing.
                unsafe { libc::pthread_mutex_unlock(self.native.get()) };
                Err(err)
            }
        }
    }

    /// Hand the native lock to a condition-variable wait.
    ///
    /// The native wait releases exactly one level, so the mutex must be
    /// held by the caller at level 1; the accounting is cleared here
    /// (still under the lock) and restored in
    /// [`Mutex::resume_after_wait`].
    pub(crate) fn prepare_wait(&self) -> Result<()> {
        let me = current_thread_key();
        if self.owner.load(Ordering::Relaxed) != me
            || self.lock_level.load(Ordering::Relaxed) != 1
        {
            return Err(Error::Usage(if self.recursive {
                "condition wait requires the mutex held at lock level 1"
            } else {
                "condition wait without holding the associated mutex"
            }));
        }
        self.owner.store(NO_OWNER, Ordering::Relaxed);
        self.lock_level.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Re-establish accounting after a condition-variable wait returned
    /// with the native lock re-held.
    pub(crate) fn resume_after_wait(&self) {
        self.owner.store(current_thread_key(), Ordering::Relaxed);
        self.lock_level.store(1, Ordering::Relaxed);
    }

    pub(crate) fn native(&self) -> *mut libc::pthread_mutex_t {
        self.native.get()
    }

    pub(crate) fn current_lock_level(&self) -> i32 {
        self.lock_level.load(Ordering::Relaxed)
    }

    pub(crate) fn created_by(&self, manager: &ThreadManager) -> bool {
        std::ptr::eq(self.manager.as_ptr(), manager)
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        // SAFETY: native was initialized in `new` (or left in the
        // static-initializer state on the failed-init path) and no thread
        // can still hold it once the last Arc is gone.
        unsafe { libc::pthread_mutex_destroy(self.native.get()) };
    }
}

/// Registry-comparable identity of the calling thread.
pub(crate) fn current_thread_key() -> u64 {
    // SAFETY: pthread_self has no preconditions.
    unsafe { libc::pthread_self() as u64 }
}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("recursive", &self.recursive)
            .field("max_lock_level", &self.max_lock_level)
            .field("lock_level", &self.lock_level.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
