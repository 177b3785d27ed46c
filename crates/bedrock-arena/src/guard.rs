//! Guarded allocations: one allocation, one adjacent inaccessible page.
//!
//! A guarded allocation maps `page_round(size) + page` bytes and revokes
//! access to exactly one page of that mapping:
//!
//! ```text
//! Overflow:   [ slack | usable (size) ][ guard page ]
//! Underflow:  [ guard page ][ usable (size) | slack ]
//! ```
//!
//! Touching one byte past the end (overflow) or one byte before the start
//! (underflow) faults immediately. The fault is the diagnostic; nothing in
//! this crate tries to catch it.
//!
//! The mapping base is never stored. It is reconstructed from the pointer,
//! the size, and the mode, which is why [`free_guarded`] needs all three.

#![allow(unsafe_code)]

use std::fmt;
use std::ptr::NonNull;

use crate::error::ArenaError;
use crate::page::{align_down, is_valid_alignment, page_round, page_size};
use crate::raw;

/// Which side of the usable region the guard page sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GuardMode {
    /// Guard page after the region; catches writes past the end.
    Overflow,
    /// Guard page before the region; catches writes before the start.
    Underflow,
}

/// Total mapping size for a guarded allocation of `size` bytes.
fn mapping_size(size: usize) -> usize {
    page_round(size) + page_size()
}

/// Recover the mapping base from a pointer handed out by [`allocate_guarded`].
fn mapping_base(ptr: NonNull<u8>, mode: GuardMode) -> usize {
    let addr = ptr.as_ptr() as usize;
    match mode {
        // The usable pointer sits less than one page above the base.
        GuardMode::Overflow => align_down(addr, page_size()),
        GuardMode::Underflow => addr - page_size(),
    }
}

/// Allocate `size` bytes next to a guard page.
///
/// `align` must be a power of two no larger than a page. In overflow mode
/// the pointer is rounded *down* to `align`, so up to `align - 1` bytes of
/// slack may sit between the end of the request and the guard page.
pub fn allocate_guarded(
    size: usize,
    align: usize,
    mode: GuardMode,
) -> Result<NonNull<u8>, ArenaError> {
    if size == 0 || size > isize::MAX as usize / 2 {
        return Err(ArenaError::InvalidSize { size });
    }
    if !is_valid_alignment(align) {
        return Err(ArenaError::InvalidAlignment { align });
    }

    let page = page_size();
    let total = mapping_size(size);
    let base = raw::map_read_write(total).map_err(|source| ArenaError::Os { op: "mmap", source })?;

    let (guard_offset, data_offset) = match mode {
        GuardMode::Overflow => (total - page, align_down(total - page - size, align)),
        GuardMode::Underflow => (0, page),
    };

    // SAFETY: both offsets are inside the `total`-byte mapping just created,
    // and nothing references the guard page yet.
    let protected = unsafe {
        let guard = NonNull::new_unchecked(base.as_ptr().add(guard_offset));
        raw::protect_none(guard, page)
    };
    if let Err(source) = protected {
        // SAFETY: the mapping is ours and unreferenced.
        let _ = unsafe { raw::unmap(base, total) };
        return Err(ArenaError::Os {
            op: "mprotect",
            source,
        });
    }

    // SAFETY: data_offset < total, so the pointer stays inside the mapping.
    Ok(unsafe { NonNull::new_unchecked(base.as_ptr().add(data_offset)) })
}

/// Free an allocation made by [`allocate_guarded`].
///
/// # Safety
///
/// `ptr`, `size`, and `mode` must be exactly the pointer returned by
/// [`allocate_guarded`] and the size and mode passed to it. The memory
/// must not be referenced afterwards.
pub unsafe fn free_guarded(ptr: NonNull<u8>, size: usize, mode: GuardMode) {
    let base = mapping_base(ptr, mode);
    let total = mapping_size(size);
    // SAFETY: base/total reconstruct the mapping made by `allocate_guarded`
    // per the caller's contract.
    let result = unsafe { raw::unmap(NonNull::new_unchecked(base as *mut u8), total) };
    if let Err(err) = result {
        tracing::error!(size, %err, "unmapping guarded allocation failed");
    }
}

/// An owned guarded allocation, unmapped on drop.
pub struct GuardedAllocation {
    ptr: NonNull<u8>,
    size: usize,
    mode: GuardMode,
}

// SAFETY: the allocation is an exclusively owned private mapping; nothing
// about it is tied to the creating thread.
unsafe impl Send for GuardedAllocation {}

impl GuardedAllocation {
    /// Allocate `size` zeroed bytes next to a guard page.
    pub fn new(size: usize, align: usize, mode: GuardMode) -> Result<Self, ArenaError> {
        let ptr = allocate_guarded(size, align, mode)?;
        Ok(Self { ptr, size, mode })
    }

    /// Rebuild an owner from the parts returned by [`into_raw`](Self::into_raw).
    ///
    /// # Safety
    ///
    /// The triple must come from [`into_raw`](Self::into_raw) or describe
    /// a live [`allocate_guarded`] allocation, and must not be owned twice.
    pub unsafe fn from_raw(ptr: NonNull<u8>, size: usize, mode: GuardMode) -> Self {
        Self { ptr, size, mode }
    }

    /// Give up ownership without unmapping. Free later with
    /// [`free_guarded`] or [`from_raw`](Self::from_raw).
    pub fn into_raw(self) -> (NonNull<u8>, usize, GuardMode) {
        let parts = (self.ptr, self.size, self.mode);
        std::mem::forget(self);
        parts
    }

    /// Start of the usable region.
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Requested size in bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Always `false`; zero-byte guarded allocations are rejected.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Guard placement.
    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    /// Address of the first byte of the guard page.
    pub fn guard_page(&self) -> usize {
        let base = mapping_base(self.ptr, self.mode);
        match self.mode {
            GuardMode::Overflow => base + page_round(self.size),
            GuardMode::Underflow => base,
        }
    }

    /// The usable bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `size` bytes from `ptr` are mapped read/write and
        // initialised (anonymous mappings are zero-filled).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// The usable bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_slice`; `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }
}

impl Drop for GuardedAllocation {
    fn drop(&mut self) {
        // SAFETY: we own the allocation and it is going away.
        unsafe { free_guarded(self.ptr, self.size, self.mode) }
    }
}

impl fmt::Debug for GuardedAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedAllocation")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::protection_at;

    #[test]
    fn overflow_guard_touches_end_of_request() {
        let mut alloc = GuardedAllocation::new(16, 8, GuardMode::Overflow).unwrap();
        let start = alloc.as_ptr().as_ptr() as usize;
        assert_eq!(start % 8, 0);

        // [0, 16) is writable.
        alloc.as_mut_slice().copy_from_slice(&[0x5A; 16]);
        assert!(alloc.as_slice().iter().all(|&b| b == 0x5A));
        assert!(protection_at(start).unwrap().starts_with("rw"));
        assert!(protection_at(start + 15).unwrap().starts_with("rw"));

        // Offset 16 is the first byte of the guard page.
        assert_eq!(alloc.guard_page(), start + 16);
        assert!(protection_at(start + 16).unwrap().starts_with("---"));
    }

    #[test]
    fn underflow_guard_precedes_start() {
        let alloc = GuardedAllocation::new(100, 16, GuardMode::Underflow).unwrap();
        let start = alloc.as_ptr().as_ptr() as usize;
        assert_eq!(start % page_size(), 0);
        assert_eq!(alloc.guard_page(), start - page_size());
        assert!(protection_at(start - 1).unwrap().starts_with("---"));
        assert!(protection_at(start).unwrap().starts_with("rw"));
    }

    #[test]
    fn whole_page_request_keeps_guard_adjacent() {
        let size = page_size() * 2;
        let alloc = GuardedAllocation::new(size, 64, GuardMode::Overflow).unwrap();
        let start = alloc.as_ptr().as_ptr() as usize;
        assert_eq!(alloc.guard_page(), start + size);
        assert!(protection_at(start + size).unwrap().starts_with("---"));
        assert!(protection_at(start + size - 1).unwrap().starts_with("rw"));
    }

    #[test]
    fn unaligned_size_leaves_slack_below_alignment() {
        let alloc = GuardedAllocation::new(13, 8, GuardMode::Overflow).unwrap();
        let start = alloc.as_ptr().as_ptr() as usize;
        assert_eq!(start % 8, 0);
        let slack = alloc.guard_page() - (start + 13);
        assert!(slack < 8);
    }

    #[test]
    fn raw_round_trip_frees_mapping() {
        let alloc = GuardedAllocation::new(64, 8, GuardMode::Overflow).unwrap();
        let (ptr, size, mode) = alloc.into_raw();
        assert_eq!((size, mode), (64, GuardMode::Overflow));
        let mut alloc = unsafe { GuardedAllocation::from_raw(ptr, size, mode) };
        alloc.as_mut_slice()[63] = 1;
        assert!(protection_at(alloc.guard_page()).unwrap().starts_with("---"));
        drop(alloc);

        let ptr = allocate_guarded(32, 16, GuardMode::Underflow).unwrap();
        unsafe { free_guarded(ptr, 32, GuardMode::Underflow) };
    }

    #[test]
    fn invalid_requests_rejected() {
        assert_eq!(
            GuardedAllocation::new(0, 8, GuardMode::Overflow).unwrap_err(),
            ArenaError::InvalidSize { size: 0 }
        );
        assert_eq!(
            GuardedAllocation::new(16, 3, GuardMode::Overflow).unwrap_err(),
            ArenaError::InvalidAlignment { align: 3 }
        );
        let too_big = page_size() * 2;
        assert_eq!(
            GuardedAllocation::new(16, too_big, GuardMode::Underflow).unwrap_err(),
            ArenaError::InvalidAlignment { align: too_big }
        );
    }
}
