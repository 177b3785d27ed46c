//! Growth strategies behind a [`MemoryArena`](crate::MemoryArena).
//!
//! An arena only knows its base pointer, position, commit position, and
//! capacity. How the committed range grows and how the memory is finally
//! returned is delegated to an [`ArenaBacking`]:
//!
//! - [`VirtualBacking`]: a subsystem reservation committed in page steps.
//! - [`FixedBacking`]: a block committed up front that can never grow.

#![allow(unsafe_code)]

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::ArenaError;
use crate::page::page_round;
use crate::subsystem::MemorySubsystem;

/// Grow and release strategy for an arena's memory.
pub(crate) trait ArenaBacking: Send + fmt::Debug {
    /// Extend the committed range so that it covers at least `end` bytes.
    ///
    /// Returns the new commit position. On error nothing was committed.
    fn grow(
        &mut self,
        memory: NonNull<u8>,
        commit_pos: usize,
        end: usize,
    ) -> Result<usize, ArenaError>;

    /// Give the memory back.
    ///
    /// # Safety
    ///
    /// `memory` must be the arena base this backing was created for, it must
    /// not be referenced afterwards, and this must be called at most once.
    unsafe fn release(&mut self, memory: NonNull<u8>);
}

/// A subsystem reservation committed lazily.
///
/// `reserved` is one page larger than `capacity`: the trailing page is never
/// committed, so running off the end of the arena faults instead of landing
/// in a neighbouring mapping.
pub(crate) struct VirtualBacking {
    subsystem: Arc<dyn MemorySubsystem>,
    reserved: usize,
    capacity: usize,
    commit_step: usize,
}

impl VirtualBacking {
    pub(crate) fn new(
        subsystem: Arc<dyn MemorySubsystem>,
        reserved: usize,
        capacity: usize,
        commit_step: usize,
    ) -> Self {
        Self {
            subsystem,
            reserved,
            capacity,
            commit_step: page_round(commit_step),
        }
    }
}

impl ArenaBacking for VirtualBacking {
    fn grow(
        &mut self,
        memory: NonNull<u8>,
        commit_pos: usize,
        end: usize,
    ) -> Result<usize, ArenaError> {
        if end > self.capacity {
            return Err(ArenaError::CapacityExceeded {
                requested: end,
                capacity: self.capacity,
            });
        }
        let step = page_round((end - commit_pos).max(self.commit_step));
        let new_commit = commit_pos.saturating_add(step).min(self.capacity);

        // SAFETY: commit_pos < new_commit <= capacity < reserved, so the
        // range lies inside our reservation.
        unsafe {
            let start = NonNull::new_unchecked(memory.as_ptr().add(commit_pos));
            self.subsystem.commit(start, new_commit - commit_pos)?;
        }
        tracing::trace!(from = commit_pos, to = new_commit, "arena committed");
        Ok(new_commit)
    }

    unsafe fn release(&mut self, memory: NonNull<u8>) {
        // SAFETY: forwarded from the caller; `reserved` is the exact size
        // passed to `reserve`.
        unsafe { self.subsystem.release(memory, self.reserved) }
    }
}

impl fmt::Debug for VirtualBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualBacking")
            .field("subsystem", &self.subsystem)
            .field("reserved", &self.reserved)
            .field("commit_step", &self.commit_step)
            .finish()
    }
}

/// A block that is fully committed at creation.
///
/// `owner` is set when the block came from a subsystem and must be released
/// to it; caller-provided storage has no owner and is left alone.
#[derive(Debug)]
pub(crate) struct FixedBacking {
    owner: Option<(Arc<dyn MemorySubsystem>, usize)>,
    capacity: usize,
}

impl FixedBacking {
    pub(crate) fn owned(subsystem: Arc<dyn MemorySubsystem>, capacity: usize) -> Self {
        Self {
            owner: Some((subsystem, capacity)),
            capacity,
        }
    }

    pub(crate) fn borrowed(capacity: usize) -> Self {
        Self {
            owner: None,
            capacity,
        }
    }
}

impl ArenaBacking for FixedBacking {
    fn grow(
        &mut self,
        _memory: NonNull<u8>,
        _commit_pos: usize,
        end: usize,
    ) -> Result<usize, ArenaError> {
        Err(ArenaError::CapacityExceeded {
            requested: end,
            capacity: self.capacity,
        })
    }

    unsafe fn release(&mut self, memory: NonNull<u8>) {
        if let Some((subsystem, size)) = self.owner.take() {
            // SAFETY: forwarded from the caller; `size` is what was reserved.
            unsafe { subsystem.release(memory, size) }
        }
    }
}
