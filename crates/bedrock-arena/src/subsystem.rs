//! The memory subsystem capability: reserve, commit, decommit, release.
//!
//! A [`MemorySubsystem`] abstracts one OS memory model. Arenas are built on
//! top of a subsystem and never call the OS themselves, so the same arena
//! code runs over lazily committed virtual memory ([`VirtualMemory`]) and
//! over commit-only memory from the global allocator ([`HeapMemory`]).

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

use crate::error::ArenaError;
use crate::page::page_size;
use crate::raw;

/// Raw virtual-memory operations for one OS memory model.
///
/// Implementations are stateless beyond their own configuration and are
/// shared between threads behind an `Arc`.
pub trait MemorySubsystem: Send + Sync + fmt::Debug {
    /// Reserve `size` bytes of address space.
    ///
    /// Returns `None` when the OS refuses. Whether the range is accessible
    /// before [`commit`](Self::commit) depends on
    /// [`allows_separate_commit`](Self::allows_separate_commit).
    fn reserve(&self, size: usize) -> Option<NonNull<u8>>;

    /// Back `[addr, addr + size)` with memory and make it read/write.
    ///
    /// # Safety
    ///
    /// The range must lie inside a live reservation made by this subsystem.
    unsafe fn commit(&self, addr: NonNull<u8>, size: usize) -> Result<(), ArenaError>;

    /// Return the physical memory behind `[addr, addr + size)` to the OS.
    /// The address range stays reserved; its contents are lost.
    ///
    /// # Safety
    ///
    /// The range must lie inside a live reservation made by this subsystem
    /// and must not be referenced afterwards.
    unsafe fn decommit(&self, addr: NonNull<u8>, size: usize);

    /// Release a whole reservation.
    ///
    /// # Safety
    ///
    /// `addr` and `size` must be exactly what was passed to and returned by
    /// [`reserve`](Self::reserve), and the range must not be referenced
    /// afterwards.
    unsafe fn release(&self, addr: NonNull<u8>, size: usize);

    /// Whether sub-ranges of a reservation can be committed independently.
    ///
    /// When `false`, arenas commit their whole reservation up front.
    fn allows_separate_commit(&self) -> bool;
}

/// Reserve/commit virtual memory: `mmap(PROT_NONE)` to reserve,
/// `mprotect` to commit, `madvise(DONTNEED)` to decommit, `munmap` to
/// release.
#[derive(Clone, Copy, Debug, Default)]
pub struct VirtualMemory;

impl MemorySubsystem for VirtualMemory {
    fn reserve(&self, size: usize) -> Option<NonNull<u8>> {
        match raw::reserve(size) {
            Ok(addr) => Some(addr),
            Err(err) => {
                tracing::debug!(size, %err, "virtual memory reservation refused");
                None
            }
        }
    }

    unsafe fn commit(&self, addr: NonNull<u8>, size: usize) -> Result<(), ArenaError> {
        // SAFETY: the range is inside our reservation per the caller's contract.
        unsafe { raw::protect_read_write(addr, size) }
            .map_err(|source| ArenaError::CommitFailed { size, source })
    }

    unsafe fn decommit(&self, addr: NonNull<u8>, size: usize) {
        // SAFETY: the range is inside our reservation and unreferenced.
        let result = unsafe { raw::discard(addr, size).and_then(|()| raw::protect_none(addr, size)) };
        if let Err(err) = result {
            tracing::warn!(size, %err, "decommit failed");
        }
    }

    unsafe fn release(&self, addr: NonNull<u8>, size: usize) {
        // SAFETY: addr/size describe a whole reservation made by `reserve`.
        if let Err(err) = unsafe { raw::unmap(addr, size) } {
            tracing::error!(size, %err, "releasing reservation failed");
        }
    }

    fn allows_separate_commit(&self) -> bool {
        true
    }
}

/// Commit-only memory from the global allocator.
///
/// `reserve` hands out a zeroed, page-aligned block that is immediately
/// usable; commit and decommit are no-ops. Arenas on this subsystem commit
/// their whole reservation at creation.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapMemory;

impl HeapMemory {
    fn layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size, page_size()).ok()
    }
}

impl MemorySubsystem for HeapMemory {
    fn reserve(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let layout = Self::layout(size)?;
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
    }

    unsafe fn commit(&self, _addr: NonNull<u8>, _size: usize) -> Result<(), ArenaError> {
        Ok(())
    }

    unsafe fn decommit(&self, _addr: NonNull<u8>, _size: usize) {}

    unsafe fn release(&self, addr: NonNull<u8>, size: usize) {
        let Some(layout) = Self::layout(size) else {
            return;
        };
        // SAFETY: addr came from `reserve(size)`, which used the same layout.
        unsafe { alloc::dealloc(addr.as_ptr(), layout) }
    }

    fn allows_separate_commit(&self) -> bool {
        false
    }
}

/// The process-wide reserve/commit subsystem.
///
/// Initialised lazily on first use and shared afterwards.
pub fn os_memory_subsystem() -> Arc<dyn MemorySubsystem> {
    static OS: OnceLock<Arc<VirtualMemory>> = OnceLock::new();
    let os = OS.get_or_init(|| Arc::new(VirtualMemory));
    Arc::clone(os) as Arc<dyn MemorySubsystem>
}

/// The process-wide commit-only subsystem.
pub fn heap_memory_subsystem() -> Arc<dyn MemorySubsystem> {
    static HEAP: OnceLock<Arc<HeapMemory>> = OnceLock::new();
    let heap = HEAP.get_or_init(|| Arc::new(HeapMemory));
    Arc::clone(heap) as Arc<dyn MemorySubsystem>
}
