//! Virtual-memory arenas, guard pages, and double-mapped ring buffers.
//!
//! Everything here sits directly on the OS address space. The arena
//! reserves a large range once and commits pages only as pushes reach
//! them, so its pointers never move. Debug aids use page protection
//! faults as the detection mechanism.
//!
//! # Architecture
//!
//! ```text
//! MemorySubsystem (reserve / commit / decommit / release)
//! ├── VirtualMemory (mmap PROT_NONE + mprotect, lazy commit)
//! └── HeapMemory    (global allocator, commit-only)
//!
//! MemoryArena
//! ├── ArenaBacking: VirtualBacking (page-step growth) | FixedBacking
//! ├── TempMemory (LIFO checkpoints) / ArenaMarker (free-form, or release)
//! ├── GuardedBlocks (overflow/underflow detect mode)
//! └── AllocationLog (push/free/resize events on `bedrock_arena::alloc`)
//!
//! GuardedAllocation (one allocation + one PROT_NONE page)
//! CircularBuffer (memfd mapped twice) → RingQueue (byte FIFO)
//! ```
//!
//! # Failure classes
//!
//! - **Allocation failure:** [`ArenaError`] values, never panics.
//! - **Usage violation** (temp memory ended out of order, markers from
//!   another arena): debug assertions.
//! - **Guard fault:** a `SIGSEGV` at the offending access. Not caught.
//!
//! All `unsafe` is confined to the modules that touch raw memory; each
//! block states its invariant.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod arena;
mod backing;
pub mod config;
mod debug;
pub mod error;
pub mod guard;
pub mod page;
pub mod queue;
mod raw;
pub mod ring;
pub mod subsystem;
pub mod temp;
#[cfg(test)]
mod testing;

// Public re-exports for the primary API surface.
pub use arena::{ArenaSpan, MemoryArena};
pub use config::ArenaConfig;
pub use error::ArenaError;
pub use guard::{allocate_guarded, free_guarded, GuardMode, GuardedAllocation};
pub use page::page_size;
pub use queue::RingQueue;
pub use ring::CircularBuffer;
pub use subsystem::{
    heap_memory_subsystem, os_memory_subsystem, HeapMemory, MemorySubsystem, VirtualMemory,
};
pub use temp::{ArenaMarker, TempMemory};
