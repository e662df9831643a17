//! Stack memory for a thread.
//!
//! A thread runs on memory the caller controls: either a region this crate
//! allocates on request ([`StackMemory::allocate`], mmap'd with a
//! `PROT_NONE` guard page below the usable range), or caller-provided
//! memory adopted with [`StackMemory::from_raw`]. Both forms are validated
//! against [`THREAD_STACK_ALIGN`] and [`THREAD_STACK_MIN`] up front.

use std::io;
use std::ptr;

use hostloom_core::stack::{THREAD_STACK_ALIGN, THREAD_STACK_MIN, validate_stack};
use hostloom_core::{Error, Result};

/// One guard page below the usable stack range of an owned allocation.
const GUARD_PAGE_SIZE: usize = THREAD_STACK_ALIGN;

/// Stack memory bound to exactly one thread for its whole lifetime.
#[derive(Debug)]
pub struct StackMemory {
    /// Usable base (above the guard page for owned regions).
    base: usize,
    /// Usable size.
    size: usize,
    /// Full mapped region, guard page included. Zero for adopted memory.
    map_base: usize,
    map_size: usize,
}

impl StackMemory {
    /// Allocate an owned stack region of `size` usable bytes.
    ///
    /// The region is mapped anonymously with a guard page at the bottom so
    /// that an overflow faults instead of corrupting adjacent memory. The
    /// mapping is released when the `StackMemory` is dropped, which happens
    /// only after the owning thread has been joined or was never started.
    pub fn allocate(size: usize) -> Result<Self> {
        validate_stack(0, size)?;
        let total = GUARD_PAGE_SIZE + size;

        // SAFETY: anonymous mapping with no fd and in-range arguments.
        let mapped = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if mapped == libc::MAP_FAILED {
            return Err(os_error("mmap"));
        }

        // SAFETY: `mapped` is a page-aligned region of at least one page.
        let rc = unsafe { libc::mprotect(mapped, GUARD_PAGE_SIZE, libc::PROT_NONE) };
        if rc != 0 {
            let err = os_error("mprotect");
            // SAFETY: unmapping the region mapped above.
            unsafe { libc::munmap(mapped, total) };
            return Err(err);
        }

        Ok(Self {
            base: mapped as usize + GUARD_PAGE_SIZE,
            size,
            map_base: mapped as usize,
            map_size: total,
        })
    }

    /// Adopt caller-provided stack memory.
    ///
    /// The caller retains ownership of the allocation's release; this type
    /// only records the region and will not free it.
    ///
    /// # Safety
    ///
    /// `base..base + size` must be valid, writable, unused by anything
    /// else, and must outlive the thread that runs on it.
    pub unsafe fn from_raw(base: *mut u8, size: usize) -> Result<Self> {
        validate_stack(base as usize, size)?;
        Ok(Self {
            base: base as usize,
            size,
            map_base: 0,
            map_size: 0,
        })
    }

    /// Usable base address handed to `pthread_attr_setstack`.
    pub(crate) fn base(&self) -> *mut libc::c_void {
        self.base as *mut libc::c_void
    }

    /// Usable size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for StackMemory {
    fn drop(&mut self) {
        if self.map_size != 0 {
            // SAFETY: `map_base..map_base + map_size` is the region this
            // StackMemory mapped in `allocate`.
            unsafe { libc::munmap(self.map_base as *mut libc::c_void, self.map_size) };
        }
    }
}

/// Build a resource-class error from the thread-local errno.
pub(crate) fn os_error(op: &'static str) -> Error {
    Error::Os {
        op,
        errno: io::Error::last_os_error().raw_os_error().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_produces_an_aligned_usable_region() {
        let stack = StackMemory::allocate(THREAD_STACK_MIN).unwrap();
        assert_eq!(stack.base % THREAD_STACK_ALIGN, 0);
        assert_eq!(stack.size(), THREAD_STACK_MIN);
        // The usable range is writable.
        // SAFETY: base..base+size was just mapped read/write.
        unsafe {
            (stack.base() as *mut u8).write(0xAB);
        }
    }

    #[test]
    fn allocate_rejects_undersized_requests() {
        let err = StackMemory::allocate(1024).unwrap_err();
        assert!(matches!(err, Error::StackTooSmall { .. }));
    }

    #[test]
    fn from_raw_rejects_misaligned_memory() {
        let mut backing = vec![0u8; 3 * THREAD_STACK_MIN];
        let base = backing.as_mut_ptr() as usize;
        let aligned_up = base.next_multiple_of(THREAD_STACK_ALIGN);
        let misaligned = (aligned_up + 1) as *mut u8;
        // SAFETY: pointer lies inside `backing`; validation fails before use.
        let err = unsafe { StackMemory::from_raw(misaligned, THREAD_STACK_MIN) };
        assert!(matches!(err, Err(Error::StackMisaligned { .. })));
    }
}
