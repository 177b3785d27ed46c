//! Checkpoints into an arena: stack-disciplined temp memory and free-form
//! markers.

use bedrock_core::ArenaId;

/// A checkpoint returned by [`MemoryArena::begin_temp`](crate::MemoryArena::begin_temp).
///
/// Must be handed back to [`end_temp`](crate::MemoryArena::end_temp) on the
/// same arena, innermost first. Ending out of order is a usage violation
/// caught by a debug assertion.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "temp memory must be ended with `end_temp`"]
pub struct TempMemory {
    pub(crate) arena: ArenaId,
    pub(crate) pos: usize,
    pub(crate) depth: u32,
}

impl TempMemory {
    /// Arena this checkpoint belongs to.
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    /// Position the arena rewinds to.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Nesting depth at which this checkpoint was taken (outermost is 0).
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MarkerKind {
    Pos { arena: ArenaId, pos: usize },
    Release,
}

/// A saved arena position with no ordering rules.
///
/// [`ArenaMarker::release`] is the distinguished form meaning "give the
/// whole reservation back".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaMarker(MarkerKind);

impl ArenaMarker {
    pub(crate) fn at(arena: ArenaId, pos: usize) -> Self {
        Self(MarkerKind::Pos { arena, pos })
    }

    /// The marker that releases the arena when reset to.
    pub const fn release() -> Self {
        Self(MarkerKind::Release)
    }

    /// Whether this is the release marker.
    pub fn is_release(&self) -> bool {
        self.0 == MarkerKind::Release
    }

    /// Arena the marker was taken on; `None` for the release marker.
    pub fn arena(&self) -> Option<ArenaId> {
        match self.0 {
            MarkerKind::Pos { arena, .. } => Some(arena),
            MarkerKind::Release => None,
        }
    }

    /// Saved position; `None` for the release marker.
    pub fn pos(&self) -> Option<usize> {
        match self.0 {
            MarkerKind::Pos { pos, .. } => Some(pos),
            MarkerKind::Release => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_marker_has_no_position() {
        let m = ArenaMarker::release();
        assert!(m.is_release());
        assert_eq!(m.arena(), None);
        assert_eq!(m.pos(), None);
    }

    #[test]
    fn position_marker_round_trips() {
        let id = ArenaId::next();
        let m = ArenaMarker::at(id, 96);
        assert!(!m.is_release());
        assert_eq!(m.arena(), Some(id));
        assert_eq!(m.pos(), Some(96));
    }
}
