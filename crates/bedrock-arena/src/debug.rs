//! Arena debug aids: guarded blocks and the allocation log.
//!
//! In overflow/underflow detect mode the arena stops handing out
//! contiguous memory. Each push becomes its own [`GuardedAllocation`] and
//! is recorded against the logical position it occupies, so temp memory
//! and markers still rewind by position: every block starting at or after
//! the rewind point is unmapped.
//!
//! The allocation log records each push with its call site and reports,
//! through `tracing`, which pushes a rewind frees or shrinks.

use std::panic::Location;
use std::ptr::NonNull;

use bedrock_core::ArenaId;
use smallvec::SmallVec;

use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::guard::{GuardMode, GuardedAllocation};

#[derive(Debug)]
struct GuardedBlock {
    start: usize,
    alloc: GuardedAllocation,
}

/// Stack of guarded blocks, ordered by logical start position.
#[derive(Debug)]
pub(crate) struct GuardedBlocks {
    mode: GuardMode,
    blocks: SmallVec<[GuardedBlock; 8]>,
}

impl GuardedBlocks {
    pub(crate) fn new(mode: GuardMode) -> Self {
        Self {
            mode,
            blocks: SmallVec::new(),
        }
    }

    pub(crate) fn mode(&self) -> GuardMode {
        self.mode
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Allocate a block at logical position `pos`.
    ///
    /// Zero-byte requests still take one byte so that every block has a
    /// distinct start. Returns the pointer and the new logical position.
    pub(crate) fn push(
        &mut self,
        pos: usize,
        size: usize,
        align: usize,
        capacity: usize,
        scribble: bool,
    ) -> Result<(NonNull<u8>, usize), ArenaError> {
        let len = size.max(1);
        let end = pos.checked_add(len).unwrap_or(usize::MAX);
        if end > capacity {
            return Err(ArenaError::CapacityExceeded {
                requested: end,
                capacity,
            });
        }
        let mut alloc = GuardedAllocation::new(len, align, self.mode)?;
        if scribble {
            alloc.as_mut_slice().fill(ArenaConfig::SCRIBBLE_BYTE);
        }
        let ptr = alloc.as_ptr();
        self.blocks.push(GuardedBlock { start: pos, alloc });
        Ok((ptr, end))
    }

    /// Unmap every block starting at or after `pos`.
    pub(crate) fn pop_to(&mut self, pos: usize) {
        while self.blocks.last().is_some_and(|b| b.start >= pos) {
            self.blocks.pop();
        }
    }

    /// The block that starts exactly at `start`.
    pub(crate) fn find(&self, start: usize) -> Option<&GuardedAllocation> {
        self.blocks
            .binary_search_by_key(&start, |b| b.start)
            .ok()
            .map(|i| &self.blocks[i].alloc)
    }

    pub(crate) fn clear(&mut self) {
        self.blocks.clear();
    }
}

// ── Allocation log ─────────────────────────────────────────────────

/// Target of every allocation-log event.
pub(crate) const ALLOC_LOG_TARGET: &str = "bedrock_arena::alloc";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LoggedPush {
    offset: usize,
    size: usize,
    location: &'static Location<'static>,
}

/// Live pushes of a logging arena, oldest first.
#[derive(Debug, Default)]
pub(crate) struct AllocationLog {
    entries: SmallVec<[LoggedPush; 8]>,
}

impl AllocationLog {
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn record(
        &mut self,
        arena: ArenaId,
        offset: usize,
        size: usize,
        location: &'static Location<'static>,
    ) {
        tracing::debug!(
            target: ALLOC_LOG_TARGET,
            arena = %arena,
            file = location.file(),
            line = location.line(),
            offset,
            size,
            "arena push"
        );
        self.entries.push(LoggedPush {
            offset,
            size,
            location,
        });
    }

    /// Report the pushes a rewind to `pos` discards.
    ///
    /// Pushes starting at or after `pos` are freed. A push that `pos` cuts
    /// through is shrunk and stays live.
    pub(crate) fn pop_to(&mut self, arena: ArenaId, pos: usize) {
        while let Some(last) = self.entries.last_mut() {
            if pos <= last.offset {
                tracing::debug!(
                    target: ALLOC_LOG_TARGET,
                    arena = %arena,
                    file = last.location.file(),
                    line = last.location.line(),
                    size = last.size,
                    "arena free"
                );
                self.entries.pop();
                continue;
            }
            if pos < last.offset + last.size {
                last.size = pos - last.offset;
                tracing::debug!(
                    target: ALLOC_LOG_TARGET,
                    arena = %arena,
                    file = last.location.file(),
                    line = last.location.line(),
                    size = last.size,
                    "arena resize"
                );
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_pop_by_position() {
        let mut blocks = GuardedBlocks::new(GuardMode::Overflow);
        let (_, p1) = blocks.push(0, 8, 8, 1 << 20, false).unwrap();
        let (_, p2) = blocks.push(p1, 0, 1, 1 << 20, false).unwrap();
        let (_, p3) = blocks.push(p2, 32, 16, 1 << 20, false).unwrap();
        assert_eq!((p1, p2, p3), (8, 9, 41));
        assert_eq!(blocks.len(), 3);

        blocks.pop_to(9);
        assert_eq!(blocks.len(), 2);
        assert!(blocks.find(8).is_some());
        assert!(blocks.find(9).is_none());

        blocks.pop_to(0);
        assert_eq!(blocks.len(), 0);
    }

    #[test]
    fn logical_capacity_is_enforced() {
        let mut blocks = GuardedBlocks::new(GuardMode::Underflow);
        let err = blocks.push(60, 8, 8, 64, false).unwrap_err();
        assert_eq!(
            err,
            ArenaError::CapacityExceeded {
                requested: 68,
                capacity: 64
            }
        );
        assert_eq!(blocks.len(), 0);
    }

    #[test]
    fn scribble_fills_new_blocks() {
        let mut blocks = GuardedBlocks::new(GuardMode::Overflow);
        blocks.push(0, 24, 8, 1 << 20, true).unwrap();
        let alloc = blocks.find(0).unwrap();
        assert!(alloc.as_slice().iter().all(|&b| b == ArenaConfig::SCRIBBLE_BYTE));
    }

    #[test]
    fn log_frees_and_shrinks_on_rewind() {
        let arena = ArenaId::next();
        let here = Location::caller();
        let mut log = AllocationLog::default();
        log.record(arena, 0, 16, here);
        log.record(arena, 16, 16, here);
        log.record(arena, 40, 8, here);

        log.pop_to(arena, 24);
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries[1].size, 8);

        // A rewind to the end of a push leaves it untouched.
        log.pop_to(arena, 16);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries[0].size, 16);

        log.pop_to(arena, 0);
        assert_eq!(log.len(), 0);
    }
}
