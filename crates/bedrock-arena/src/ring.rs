//! A circular buffer mapped twice back to back.
//!
//! One memory file of `size` bytes is mapped at `base` and again at
//! `base + size`. Byte `k` and byte `k + size` are the same physical byte,
//! so any read or write of up to `size` bytes starting anywhere in
//! `[0, size)` is contiguous in virtual memory, with no wrap handling.

#![allow(unsafe_code)]

use std::fmt;
use std::ptr::NonNull;

use rustix::fd::OwnedFd;

use crate::error::ArenaError;
use crate::page::{checked_align_up, page_size};
use crate::raw;

/// A double-mapped circular buffer.
pub struct CircularBuffer {
    base: NonNull<u8>,
    size: usize,
    _file: OwnedFd,
}

// SAFETY: the mappings are exclusively owned and `&mut` access goes
// through `window_mut`.
unsafe impl Send for CircularBuffer {}

impl CircularBuffer {
    /// Create a buffer of at least `minimum_size` bytes (rounded up to
    /// whole pages, at least one page).
    pub fn new(minimum_size: usize) -> Result<Self, ArenaError> {
        let size = checked_align_up(minimum_size.max(1), page_size())
            .ok_or(ArenaError::InvalidSize { size: minimum_size })?;
        if size > isize::MAX as usize / 4 {
            return Err(ArenaError::InvalidSize { size });
        }
        let file = raw::create_memfd(c"bedrock-ring", size).map_err(|source| ArenaError::Os {
            op: "memfd_create",
            source,
        })?;
        let base = raw::reserve(2 * size).map_err(|_| ArenaError::ReserveFailed { size: 2 * size })?;

        for offset in [0, size] {
            // SAFETY: both halves lie inside the fresh reservation, which
            // nothing references yet.
            let mapped = unsafe {
                let view = NonNull::new_unchecked(base.as_ptr().add(offset));
                raw::map_shared_fixed(view, size, &file)
            };
            if let Err(source) = mapped {
                // SAFETY: unmapping our own unreferenced reservation.
                let _ = unsafe { raw::unmap(base, 2 * size) };
                return Err(ArenaError::Os { op: "mmap", source });
            }
        }
        tracing::debug!(size, "circular buffer mapped");
        Ok(Self {
            base,
            size,
            _file: file,
        })
    }

    /// Size of one view in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Start of the first view. The mapping spans `2 * size()` bytes.
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.base
    }

    fn check_window(&self, offset: usize, len: usize) {
        assert!(
            len <= self.size && offset.checked_add(len).is_some_and(|end| end <= 2 * self.size),
            "window {offset}+{len} out of bounds for circular buffer of {} bytes",
            self.size
        );
    }

    /// `len` bytes starting at `offset` in the doubled mapping.
    ///
    /// # Panics
    ///
    /// If `len > size()` or `offset + len > 2 * size()`.
    pub fn window(&self, offset: usize, len: usize) -> &[u8] {
        self.check_window(offset, len);
        // SAFETY: the range is inside the mapping, the memory file is
        // zero-filled on creation, and `len <= size` means no byte is
        // covered twice.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(offset), len) }
    }

    /// Mutable variant of [`window`](Self::window).
    ///
    /// # Panics
    ///
    /// If `len > size()` or `offset + len > 2 * size()`.
    pub fn window_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        self.check_window(offset, len);
        // SAFETY: as in `window`; `len <= size` keeps both aliases of a
        // byte out of the same slice and `&mut self` excludes other views.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr().add(offset), len) }
    }
}

impl Drop for CircularBuffer {
    fn drop(&mut self) {
        // SAFETY: both views are ours and no borrow outlives `self`.
        if let Err(err) = unsafe { raw::unmap(self.base, 2 * self.size) } {
            tracing::error!(size = self.size, %err, "unmapping circular buffer failed");
        }
    }
}

impl fmt::Debug for CircularBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircularBuffer")
            .field("base", &self.base)
            .field("size", &self.size)
            .finish()
    }
}
