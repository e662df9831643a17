//! Thread wrapper over the native OS thread.
//!
//! A [`Thread`] carries a user function and argument, the stack it will run
//! on, its priority, and a debug name. It is created in the "not started"
//! state by [`ThreadManager::create_thread`] and moves strictly forward:
//! `NotStarted → Running → Finished`. The native thread is created by
//! [`Thread::start`] on the caller-supplied stack; the spawned thread
//! registers itself with the owning manager before the user function runs,
//! so `get_current_thread` from inside the function always succeeds.

use std::ffi::{CStr, CString, c_void};
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use hostloom_core::priority::{abstract_to_native, validate_priority};
use hostloom_core::{Error, Result};

use crate::manager::ThreadManager;
use crate::mutex::current_thread_key;
use crate::stack::StackMemory;

/// The function a thread executes. The argument is an opaque word the
/// caller chooses at creation; it must stay valid for the thread's whole
/// execution.
pub type ThreadFunction = fn(usize);

/// Name reported when no name has been set.
const UNNAMED: &CStr = c"unnamed";

/// Host limit for native thread names: 15 bytes plus the terminator.
const NATIVE_NAME_CAP: usize = 15;

const STATE_NOT_STARTED: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_RUNNING: u8 = 2;
const STATE_FINISHED: u8 = 3;

/// Debug name slot with two mutually exclusive ownership modes.
#[derive(Debug)]
pub enum ThreadName {
    /// No name set; reads report the `"unnamed"` sentinel.
    Unnamed,
    /// The thread owns a copy of the name.
    Owned(CString),
    /// The caller retains ownership; the `'static` bound is the contract
    /// that the storage outlives the thread.
    Borrowed(&'static CStr),
}

impl ThreadName {
    fn as_cstr(&self) -> &CStr {
        match self {
            ThreadName::Unnamed => UNNAMED,
            ThreadName::Owned(name) => name.as_c_str(),
            ThreadName::Borrowed(name) => name,
        }
    }
}

struct NativeHandle {
    handle: Option<libc::pthread_t>,
    joined: bool,
}

/// A wrapper around one native OS thread.
///
/// Created through [`ThreadManager::create_thread`] and destroyed through
/// [`ThreadManager::destroy_thread`]; there is no other way to construct
/// one, and the type is neither clonable nor default-constructible.
pub struct Thread {
    function: ThreadFunction,
    argument: usize,
    stack: StackMemory,
    original_priority: i32,
    current_priority: AtomicI32,
    state: AtomicU8,
    /// Kernel thread id once running; priority changes target it.
    tid: AtomicI32,
    /// Registry key (`pthread_self` of the running thread), zero until
    /// started.
    registry_key: AtomicU64,
    name: parking_lot::Mutex<ThreadName>,
    native: parking_lot::Mutex<NativeHandle>,
    manager: Weak<ThreadManager>,
}

struct StartPack {
    thread: Arc<Thread>,
}

impl Thread {
    pub(crate) fn new(
        function: ThreadFunction,
        argument: usize,
        stack: StackMemory,
        priority: i32,
        manager: Weak<ThreadManager>,
    ) -> Self {
        Self {
            function,
            argument,
            stack,
            original_priority: priority,
            current_priority: AtomicI32::new(priority),
            state: AtomicU8::new(STATE_NOT_STARTED),
            tid: AtomicI32::new(0),
            registry_key: AtomicU64::new(0),
            name: parking_lot::Mutex::new(ThreadName::Unnamed),
            native: parking_lot::Mutex::new(NativeHandle {
                handle: None,
                joined: false,
            }),
            manager,
        }
    }

    /// Begin execution of the thread's function on its stack.
    ///
    /// Transitions "not started" to "running". Calling `start` twice is a
    /// usage error.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut native = self.native.lock();
        if self
            .state
            .compare_exchange(
                STATE_NOT_STARTED,
                STATE_STARTING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(Error::Usage("start of a thread that was already started"));
        }

        let pack = Box::new(StartPack {
            thread: Arc::clone(self),
        });

        let mut attr = MaybeUninit::<libc::pthread_attr_t>::uninit();
        // SAFETY: attr is initialized, pointed at the validated stack
        // region, consumed by pthread_create, and destroyed, in that order.
        let rc = unsafe {
            libc::pthread_attr_init(attr.as_mut_ptr());
            libc::pthread_attr_setstack(attr.as_mut_ptr(), self.stack.base(), self.stack.size());
            let mut handle: libc::pthread_t = 0;
            let raw = Box::into_raw(pack);
            let rc = libc::pthread_create(
                &mut handle,
                attr.as_ptr(),
                thread_trampoline,
                raw.cast::<c_void>(),
            );
            libc::pthread_attr_destroy(attr.as_mut_ptr());
            if rc != 0 {
                // The new thread never existed; reclaim the pack.
                drop(Box::from_raw(raw));
            } else {
                native.handle = Some(handle);
            }
            rc
        };
        if rc != 0 {
            self.state.store(STATE_NOT_STARTED, Ordering::Release);
            return Err(Error::Os {
                op: "pthread_create",
                errno: rc,
            });
        }
        Ok(())
    }

    /// Block until the thread has finished.
    ///
    /// Idempotent once the thread has been joined; a thread joining itself
    /// fails with [`Error::JoinSelf`].
    pub fn join(&self) -> Result<()> {
        let mut native = self.native.lock();
        let Some(handle) = native.handle else {
            if native.joined {
                return Ok(());
            }
            return Err(Error::Usage("join of a thread that was never started"));
        };

        // SAFETY: comparing two live pthread identifiers.
        if unsafe { libc::pthread_equal(handle, libc::pthread_self()) } != 0 {
            return Err(Error::JoinSelf);
        }

        // Blocks with the handle lock held; a concurrent joiner queues
        // behind us and then sees the joined flag.
        // SAFETY: handle came from pthread_create and has not been joined
        // or detached.
        let rc = unsafe { libc::pthread_join(handle, ptr::null_mut()) };
        if rc != 0 {
            return Err(Error::Os {
                op: "pthread_join",
                errno: rc,
            });
        }
        native.handle = None;
        native.joined = true;
        Ok(())
    }

    /// Swap the current priority, returning the previous value.
    ///
    /// Applied to the native thread while it is running; has no observable
    /// effect on a thread that has already finished.
    pub fn change_priority(&self, priority: i32) -> Result<i32> {
        validate_priority(priority)?;
        let previous = self.current_priority.swap(priority, Ordering::AcqRel);
        if self.state.load(Ordering::Acquire) == STATE_RUNNING {
            apply_native_priority(self.tid.load(Ordering::Acquire), priority);
        }
        Ok(previous)
    }

    /// Priority assigned at creation; never changes.
    #[must_use]
    pub fn original_priority(&self) -> i32 {
        self.original_priority
    }

    /// Priority as set by the last [`Thread::change_priority`], or the
    /// creation value.
    #[must_use]
    pub fn current_priority(&self) -> i32 {
        self.current_priority.load(Ordering::Acquire)
    }

    /// Set the debug name from a copied string. Any previous owned or
    /// borrowed name is released first.
    pub fn set_name(&self, name: &str) -> Result<()> {
        let owned = CString::new(name).map_err(|_| Error::InvalidName)?;
        let mut slot = self.name.lock();
        *slot = ThreadName::Owned(owned);
        self.apply_name(slot.as_cstr());
        Ok(())
    }

    /// Set the debug name from caller-owned storage. The `'static` bound
    /// guarantees the storage outlives the thread.
    pub fn set_name_ptr(&self, name: &'static CStr) {
        let mut slot = self.name.lock();
        *slot = ThreadName::Borrowed(name);
        self.apply_name(slot.as_cstr());
    }

    /// The active debug name, or `"unnamed"` if none was set.
    #[must_use]
    pub fn name(&self) -> CString {
        self.name.lock().as_cstr().to_owned()
    }

    /// Push the active name onto the native thread, truncated to the host
    /// cap. Best-effort: a thread that is not running yet picks the name up
    /// when it enters. Deliberately lock-free — `join` holds the handle
    /// lock while it blocks, and a thread may rename itself while being
    /// joined.
    fn apply_name(&self, name: &CStr) {
        if self.state.load(Ordering::Acquire) == STATE_RUNNING {
            let key = self.registry_key.load(Ordering::Acquire);
            if key != 0 {
                set_native_name(key as libc::pthread_t, name);
            }
        }
    }

    /// Runs first on the new native thread: publish identity, register
    /// with the manager, then apply priority and name.
    fn enter(self: &Arc<Self>) {
        // SAFETY: gettid has no preconditions.
        let tid = unsafe { libc::gettid() };
        self.tid.store(tid, Ordering::Release);

        let key = current_thread_key();
        self.registry_key.store(key, Ordering::Release);
        if let Some(manager) = self.manager.upgrade() {
            manager.register(key, Arc::downgrade(self));
        }

        // Publish the running state first: a concurrent priority change or
        // rename from here on applies itself natively, and the re-reads
        // below pick up anything that landed earlier.
        self.state.store(STATE_RUNNING, Ordering::Release);

        apply_native_priority(tid, self.current_priority.load(Ordering::Acquire));
        {
            let name = self.name.lock();
            if !matches!(*name, ThreadName::Unnamed) {
                // SAFETY: pthread_self names the calling thread's own handle.
                set_native_name(unsafe { libc::pthread_self() }, name.as_cstr());
            }
        }
    }

    fn leave(&self) {
        self.state.store(STATE_FINISHED, Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(
            self.state.load(Ordering::Acquire),
            STATE_STARTING | STATE_RUNNING
        )
    }

    pub(crate) fn was_started(&self) -> bool {
        self.state.load(Ordering::Acquire) != STATE_NOT_STARTED
    }

    pub(crate) fn registry_key(&self) -> u64 {
        self.registry_key.load(Ordering::Acquire)
    }

    pub(crate) fn created_by(&self, manager: &ThreadManager) -> bool {
        std::ptr::eq(self.manager.as_ptr(), manager)
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        // A running thread's trampoline holds its own Arc, so reaching Drop
        // with a live handle means the function has returned; the join only
        // waits out native termination.
        let native = self.native.get_mut();
        if let Some(handle) = native.handle.take() {
            // SAFETY: handle came from pthread_create and was never joined
            // or detached.
            unsafe { libc::pthread_join(handle, ptr::null_mut()) };
        }
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name())
            .field("original_priority", &self.original_priority)
            .field("current_priority", &self.current_priority())
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Entry point for the new native thread.
extern "C" fn thread_trampoline(raw: *mut c_void) -> *mut c_void {
    // SAFETY: raw is the Box<StartPack> leaked by `start` for exactly this
    // thread.
    let pack = unsafe { Box::from_raw(raw.cast::<StartPack>()) };
    pack.thread.enter();
    (pack.thread.function)(pack.thread.argument);
    pack.thread.leave();
    ptr::null_mut()
}

/// Apply an abstract priority to a native thread.
///
/// Best-effort: an unprivileged process cannot strengthen a nice value, and
/// the target may already have exited; neither is an abstraction-level
/// failure.
fn apply_native_priority(tid: i32, priority: i32) {
    if tid == 0 {
        return;
    }
    let nice = abstract_to_native(priority);
    // SAFETY: plain syscall on a kernel tid; failure is tolerated.
    // PRIO_PROCESS is cast because glibc and musl headers disagree on the
    // `which` parameter's type.
    unsafe { libc::setpriority(libc::PRIO_PROCESS as _, tid as libc::id_t, nice) };
}

/// Apply a debug name to a native thread, truncated to the host cap.
fn set_native_name(handle: libc::pthread_t, name: &CStr) {
    let bytes = name.to_bytes();
    let len = bytes.len().min(NATIVE_NAME_CAP);
    let mut buf = [0u8; NATIVE_NAME_CAP + 1];
    buf[..len].copy_from_slice(&bytes[..len]);
    // SAFETY: buf is NUL-terminated and within the host length cap.
    unsafe { libc::pthread_setname_np(handle, buf.as_ptr().cast::<libc::c_char>()) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unnamed_reads_as_the_sentinel() {
        assert_eq!(ThreadName::Unnamed.as_cstr(), c"unnamed");
    }

    #[test]
    fn owned_and_borrowed_names_read_back() {
        let owned = ThreadName::Owned(CString::new("worker").unwrap());
        assert_eq!(owned.as_cstr(), c"worker");
        let borrowed = ThreadName::Borrowed(c"loader");
        assert_eq!(borrowed.as_cstr(), c"loader");
    }
}
