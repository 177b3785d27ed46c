//! The growing linear allocator.

#![allow(unsafe_code)]

use std::fmt;
use std::mem::{align_of, size_of};
use std::panic::Location;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use bedrock_core::ArenaId;

use crate::backing::{ArenaBacking, FixedBacking, VirtualBacking};
use crate::config::ArenaConfig;
use crate::debug::{AllocationLog, GuardedBlocks};
use crate::error::ArenaError;
use crate::guard::GuardMode;
use crate::page::{checked_align_up, is_valid_alignment, page_round, page_size};
use crate::subsystem::MemorySubsystem;
use crate::temp::{ArenaMarker, TempMemory};

/// What to write over freshly pushed bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Fill {
    /// Leave as is, or scribble if the arena scribbles.
    Uncleared,
    Zero,
    /// Caller overwrites immediately.
    Nothing,
}

/// A byte range inside an arena, addressed by logical offset.
///
/// Returned by [`MemoryArena::push_copy_span`] and read back with
/// [`MemoryArena::span_bytes`], which bounds-checks against the arena's
/// current position so a span invalidated by a rewind reads as `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArenaSpan {
    offset: usize,
    len: usize,
}

impl ArenaSpan {
    /// Logical offset of the first byte.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the span covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A linear allocator over one contiguous region.
///
/// Pushes bump `pos`; memory is committed in page steps as `pos` passes
/// `commit_pos`, and stays committed until the arena is destroyed. Rewinds
/// (temp memory, markers) only move `pos`.
///
/// Invariant: `0 <= pos <= commit_pos <= capacity`.
///
/// Pointers returned by pushes are valid until the arena is rewound past
/// them or released. The arena never runs destructors for values pushed
/// into it.
pub struct MemoryArena {
    id: ArenaId,
    /// `None` once released.
    memory: Option<NonNull<u8>>,
    pos: usize,
    commit_pos: usize,
    capacity: usize,
    backing: Box<dyn ArenaBacking>,
    guarded: Option<GuardedBlocks>,
    allocations: Option<AllocationLog>,
    temp_depth: u32,
    scribble: bool,
}

// SAFETY: the arena exclusively owns its region (or, for caller-provided
// storage, has been granted exclusive use of it). No thread affinity exists
// in any backing.
unsafe impl Send for MemoryArena {}

impl MemoryArena {
    /// Reserve `max_size` bytes (rounded up to pages) from `subsystem`.
    ///
    /// Nothing is committed unless the subsystem cannot commit separately,
    /// in which case the whole reservation is committed now.
    pub fn create(
        subsystem: Arc<dyn MemorySubsystem>,
        max_size: usize,
    ) -> Result<Self, ArenaError> {
        Self::with_config(subsystem, &ArenaConfig::new(max_size))
    }

    /// Like [`create`](Self::create), with an explicit configuration.
    pub fn with_config(
        subsystem: Arc<dyn MemorySubsystem>,
        config: &ArenaConfig,
    ) -> Result<Self, ArenaError> {
        config.validate()?;
        let capacity = page_round(config.max_size);
        let reserved = capacity + page_size();
        let memory = subsystem
            .reserve(reserved)
            .ok_or(ArenaError::ReserveFailed { size: reserved })?;
        let eager = !subsystem.allows_separate_commit();

        let mut arena = Self {
            id: ArenaId::next(),
            memory: Some(memory),
            pos: 0,
            commit_pos: 0,
            capacity,
            backing: Box::new(VirtualBacking::new(
                subsystem,
                reserved,
                capacity,
                config.commit_step,
            )),
            guarded: config.guard.map(GuardedBlocks::new),
            allocations: config.log_allocations.then(AllocationLog::default),
            temp_depth: 0,
            scribble: config.scribble,
        };
        if eager {
            // On failure the arena drops and releases the reservation.
            arena.commit_pos = arena.backing.grow(memory, 0, capacity)?;
        }
        tracing::debug!(id = %arena.id, capacity, eager, "arena created");
        Ok(arena)
    }

    /// A fixed-size arena over a block from `subsystem`, committed up front.
    ///
    /// Pushes beyond `page_round(size)` fail with
    /// [`ArenaError::CapacityExceeded`]. The block goes back to the
    /// subsystem when the arena is destroyed.
    pub fn fixed(subsystem: Arc<dyn MemorySubsystem>, size: usize) -> Result<Self, ArenaError> {
        if size == 0 {
            return Err(ArenaError::InvalidSize { size });
        }
        let capacity = checked_align_up(size, page_size()).ok_or(ArenaError::InvalidSize { size })?;
        let memory = subsystem
            .reserve(capacity)
            .ok_or(ArenaError::ReserveFailed { size: capacity })?;
        // SAFETY: the range is exactly the reservation just made.
        if let Err(err) = unsafe { subsystem.commit(memory, capacity) } {
            // SAFETY: nothing references the fresh reservation.
            unsafe { subsystem.release(memory, capacity) };
            return Err(err);
        }
        Ok(Self::from_fixed(
            memory,
            capacity,
            Box::new(FixedBacking::owned(subsystem, capacity)),
        ))
    }

    /// A fixed-size arena over caller-owned memory.
    ///
    /// The arena never frees the block.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `size` initialised
    /// bytes for the whole life of the arena, nothing else may access the
    /// block while the arena exists, and the block must be usable from
    /// whichever thread the arena is sent to.
    pub unsafe fn fixed_in_block(ptr: NonNull<u8>, size: usize) -> Self {
        Self::from_fixed(ptr, size, Box::new(FixedBacking::borrowed(size)))
    }

    /// A fixed-size arena over a `'static` buffer.
    pub fn fixed_in_static(buffer: &'static mut [u8]) -> Self {
        let size = buffer.len();
        let ptr = NonNull::from(buffer).cast::<u8>();
        // SAFETY: the exclusive `'static` borrow is moved into the arena,
        // so the block is initialised, outlives it, and is not aliased.
        unsafe { Self::fixed_in_block(ptr, size) }
    }

    fn from_fixed(memory: NonNull<u8>, capacity: usize, backing: Box<dyn ArenaBacking>) -> Self {
        Self {
            id: ArenaId::next(),
            memory: Some(memory),
            pos: 0,
            commit_pos: capacity,
            capacity,
            backing,
            guarded: None,
            allocations: None,
            temp_depth: 0,
            scribble: false,
        }
    }

    // ── Introspection ──────────────────────────────────────────────

    /// Identity token, unique for the life of the process.
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// Current logical position (bytes in use).
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes committed so far. In guard mode, the logical high-water mark.
    pub fn commit_pos(&self) -> usize {
        self.commit_pos
    }

    /// Total capacity in bytes; zero once released.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the arena's memory has been given back.
    pub fn is_released(&self) -> bool {
        self.memory.is_none()
    }

    /// Number of open [`TempMemory`] checkpoints.
    pub fn temp_depth(&self) -> u32 {
        self.temp_depth
    }

    /// Active debug guard mode, if any.
    pub fn guard_mode(&self) -> Option<GuardMode> {
        self.guarded.as_ref().map(GuardedBlocks::mode)
    }

    // ── Debug guard modes ──────────────────────────────────────────

    /// Make every later push a guarded allocation ending at a guard page.
    ///
    /// Only allowed while the arena is empty.
    pub fn enable_overflow_detect(&mut self) -> Result<(), ArenaError> {
        self.enable_guard(GuardMode::Overflow)
    }

    /// Make every later push a guarded allocation starting after a guard
    /// page.
    ///
    /// Only allowed while the arena is empty.
    pub fn enable_underflow_detect(&mut self) -> Result<(), ArenaError> {
        self.enable_guard(GuardMode::Underflow)
    }

    fn enable_guard(&mut self, mode: GuardMode) -> Result<(), ArenaError> {
        if self.memory.is_none() {
            return Err(ArenaError::Released);
        }
        if self.pos != 0 {
            return Err(ArenaError::InvalidConfig {
                reason: format!("guard mode needs an empty arena, pos is {}", self.pos),
            });
        }
        self.guarded = Some(GuardedBlocks::new(mode));
        Ok(())
    }

    /// Log every later push and the rewinds that free or shrink it.
    ///
    /// Events carry the pushing call site and go to the
    /// `bedrock_arena::alloc` target at `debug` level. Works alongside the
    /// guard modes.
    pub fn enable_allocation_logging(&mut self) {
        if self.allocations.is_none() {
            self.allocations = Some(AllocationLog::default());
        }
    }

    /// Whether pushes are being logged.
    pub fn logs_allocations(&self) -> bool {
        self.allocations.is_some()
    }

    // ── Push family ────────────────────────────────────────────────

    /// Push `size` bytes aligned to `align`.
    ///
    /// `align` must be a power of two no larger than a page. On error the
    /// arena is unchanged. The bytes are whatever the memory held before
    /// (zero on first use) unless the arena scribbles.
    #[track_caller]
    pub fn push(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, ArenaError> {
        self.push_inner(size, align, Fill::Uncleared).map(|(ptr, _)| ptr)
    }

    /// Push `size` zeroed bytes aligned to `align`.
    #[track_caller]
    pub fn push_zeroed(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, ArenaError> {
        self.push_inner(size, align, Fill::Zero).map(|(ptr, _)| ptr)
    }

    /// Push a copy of `bytes`.
    #[track_caller]
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<NonNull<u8>, ArenaError> {
        self.push_copy(bytes, 0).map(|(ptr, _)| ptr)
    }

    /// Push a copy of `s` followed by a NUL byte.
    #[track_caller]
    pub fn push_str(&mut self, s: &str) -> Result<NonNull<u8>, ArenaError> {
        self.push_copy(s.as_bytes(), 1).map(|(ptr, _)| ptr)
    }

    /// Push a copy of `bytes` and return its span for safe reads.
    #[track_caller]
    pub fn push_copy_span(&mut self, bytes: &[u8]) -> Result<ArenaSpan, ArenaError> {
        let (_, offset) = self.push_copy(bytes, 0)?;
        Ok(ArenaSpan {
            offset,
            len: bytes.len(),
        })
    }

    /// Push a copy of `s` plus a NUL byte and return the span of the text
    /// (without the NUL) for safe reads.
    #[track_caller]
    pub fn push_str_span(&mut self, s: &str) -> Result<ArenaSpan, ArenaError> {
        let (_, offset) = self.push_copy(s.as_bytes(), 1)?;
        Ok(ArenaSpan {
            offset,
            len: s.len(),
        })
    }

    /// Move `value` into the arena. Its destructor never runs.
    #[track_caller]
    pub fn push_value<T>(&mut self, value: T) -> Result<NonNull<T>, ArenaError> {
        let (ptr, _) = self.push_inner(size_of::<T>(), align_of::<T>(), Fill::Nothing)?;
        let ptr = ptr.cast::<T>();
        // SAFETY: `ptr` is aligned for `T` and points at `size_of::<T>()`
        // freshly pushed bytes.
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Push zeroed storage for `count` values of `T`.
    ///
    /// The caller must initialise the elements before reading them unless
    /// all-zero bytes are a valid `T`.
    #[track_caller]
    pub fn push_array<T>(&mut self, count: usize) -> Result<NonNull<T>, ArenaError> {
        let size = size_of::<T>()
            .checked_mul(count)
            .ok_or(ArenaError::InvalidSize { size: usize::MAX })?;
        let (ptr, _) = self.push_inner(size, align_of::<T>(), Fill::Zero)?;
        Ok(ptr.cast::<T>())
    }

    #[track_caller]
    fn push_copy(&mut self, bytes: &[u8], nul: usize) -> Result<(NonNull<u8>, usize), ArenaError> {
        let size = bytes.len() + nul;
        let (ptr, offset) = self.push_inner(size, 1, Fill::Nothing)?;
        // SAFETY: `ptr` points at `size` freshly pushed bytes that cannot
        // overlap `bytes`, which the caller borrows from elsewhere.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
            if nul == 1 {
                ptr.as_ptr().add(bytes.len()).write(0);
            }
        }
        Ok((ptr, offset))
    }

    /// Returns the pointer and the logical offset of the allocation.
    #[track_caller]
    fn push_inner(
        &mut self,
        size: usize,
        align: usize,
        fill: Fill,
    ) -> Result<(NonNull<u8>, usize), ArenaError> {
        if !is_valid_alignment(align) {
            return Err(ArenaError::InvalidAlignment { align });
        }
        let memory = self.memory.ok_or(ArenaError::Released)?;

        if let Some(guarded) = self.guarded.as_mut() {
            let start = self.pos;
            let scribble = self.scribble && fill == Fill::Uncleared;
            let (ptr, end) = guarded.push(start, size, align, self.capacity, scribble)?;
            self.pos = end;
            self.commit_pos = self.commit_pos.max(end);
            self.log_push(start, end - start);
            return Ok((ptr, start));
        }

        // Align the absolute address: caller-provided blocks need not be
        // page aligned.
        let base = memory.as_ptr() as usize;
        let exceeded = ArenaError::CapacityExceeded {
            requested: usize::MAX,
            capacity: self.capacity,
        };
        let offset = checked_align_up(base + self.pos, align).ok_or(exceeded.clone())? - base;
        let end = offset.checked_add(size).ok_or(exceeded)?;
        if end > self.capacity {
            return Err(ArenaError::CapacityExceeded {
                requested: end,
                capacity: self.capacity,
            });
        }
        if end > self.commit_pos {
            self.commit_pos = self.backing.grow(memory, self.commit_pos, end)?;
        }
        self.pos = end;

        // SAFETY: offset <= end <= commit_pos, so the pointer and the `size`
        // bytes after it are committed memory owned by this arena.
        let ptr = unsafe { NonNull::new_unchecked(memory.as_ptr().add(offset)) };
        match fill {
            Fill::Zero => unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) },
            Fill::Uncleared if self.scribble => unsafe {
                ptr::write_bytes(ptr.as_ptr(), ArenaConfig::SCRIBBLE_BYTE, size)
            },
            _ => {}
        }
        self.log_push(offset, size);
        Ok((ptr, offset))
    }

    #[track_caller]
    fn log_push(&mut self, offset: usize, size: usize) {
        if let Some(log) = self.allocations.as_mut() {
            log.record(self.id, offset, size, Location::caller());
        }
    }

    /// Read back a span pushed by [`push_copy_span`](Self::push_copy_span).
    ///
    /// Returns `None` if the span lies beyond the current position (it was
    /// rewound over) or the arena was released.
    pub fn span_bytes(&self, span: ArenaSpan) -> Option<&[u8]> {
        let memory = self.memory?;
        if let Some(guarded) = &self.guarded {
            let alloc = guarded.find(span.offset)?;
            return alloc.as_slice().get(..span.len);
        }
        if span.offset.checked_add(span.len)? > self.pos {
            return None;
        }
        // SAFETY: the range is below `pos`, hence committed and initialised
        // (fresh pages are zero-filled), and `&self` keeps it from being
        // rewound or released while the slice lives.
        Some(unsafe { std::slice::from_raw_parts(memory.as_ptr().add(span.offset), span.len) })
    }

    // ── Rewinding ──────────────────────────────────────────────────

    /// Open a checkpoint at the current position.
    pub fn begin_temp(&mut self) -> TempMemory {
        let temp = TempMemory {
            arena: self.id,
            pos: self.pos,
            depth: self.temp_depth,
        };
        self.temp_depth += 1;
        temp
    }

    /// Rewind to `temp`. Committed memory stays committed.
    ///
    /// # Panics
    ///
    /// In debug builds, if `temp` belongs to another arena or is not the
    /// innermost open checkpoint.
    pub fn end_temp(&mut self, temp: TempMemory) {
        debug_assert_eq!(temp.arena, self.id, "temp memory ended on a different arena");
        debug_assert_eq!(
            temp.depth + 1,
            self.temp_depth,
            "temp memory ended out of order"
        );
        self.temp_depth = temp.depth;
        if self.memory.is_some() && temp.pos <= self.pos {
            self.pop_to(temp.pos);
        }
    }

    /// Capture the current position.
    pub fn create_marker(&self) -> ArenaMarker {
        ArenaMarker::at(self.id, self.pos)
    }

    /// Rewind to `marker`, or release the arena for
    /// [`ArenaMarker::release`].
    ///
    /// # Panics
    ///
    /// In debug builds, if `marker` belongs to another arena or lies ahead
    /// of the current position.
    pub fn reset_to_marker(&mut self, marker: ArenaMarker) {
        let (Some(arena), Some(pos)) = (marker.arena(), marker.pos()) else {
            self.release();
            return;
        };
        debug_assert_eq!(arena, self.id, "marker reset on a different arena");
        debug_assert!(pos <= self.pos, "marker is ahead of the arena position");
        if self.memory.is_some() && pos <= self.pos {
            self.pop_to(pos);
        }
    }

    fn pop_to(&mut self, pos: usize) {
        if let Some(log) = self.allocations.as_mut() {
            log.pop_to(self.id, pos);
        }
        if let Some(guarded) = self.guarded.as_mut() {
            guarded.pop_to(pos);
        } else if self.scribble && pos < self.pos {
            if let Some(memory) = self.memory {
                // SAFETY: [pos, self.pos) is committed arena memory.
                unsafe {
                    ptr::write_bytes(
                        memory.as_ptr().add(pos),
                        ArenaConfig::SCRIBBLE_BYTE,
                        self.pos - pos,
                    )
                };
            }
        }
        self.pos = pos;
    }

    /// Give the memory back. Idempotent; later pushes fail with
    /// [`ArenaError::Released`].
    pub fn release(&mut self) {
        let Some(memory) = self.memory.take() else {
            return;
        };
        if let Some(guarded) = self.guarded.as_mut() {
            guarded.clear();
        }
        if let Some(log) = self.allocations.as_mut() {
            log.pop_to(self.id, 0);
        }
        // SAFETY: `memory` was the base handed to the backing, it was just
        // taken so this runs once, and pointers into it are invalid from
        // here on per the arena's contract.
        unsafe { self.backing.release(memory) };
        tracing::debug!(id = %self.id, "arena released");
        self.pos = 0;
        self.commit_pos = 0;
        self.capacity = 0;
    }
}

impl Drop for MemoryArena {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for MemoryArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryArena")
            .field("id", &self.id)
            .field("pos", &self.pos)
            .field("commit_pos", &self.commit_pos)
            .field("capacity", &self.capacity)
            .field("backing", &self.backing)
            .field("guard", &self.guard_mode())
            .field("log_allocations", &self.logs_allocations())
            .field("temp_depth", &self.temp_depth)
            .finish()
    }
}
