//! Bedrock: a low-level platform runtime for Linux.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Bedrock sub-crates. For most users, adding `bedrock` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use bedrock::prelude::*;
//!
//! // Scratch arenas reserve address space only; pages commit on use.
//! let ctx = ThreadContext::init_default(tracing_sink()).unwrap();
//!
//! let text = ctx.with_scratch(None, |arena| {
//!     let span = arena.push_copy_span(b"hello").unwrap();
//!     arena.span_bytes(span).unwrap().to_vec()
//! });
//! assert_eq!(text, b"hello");
//!
//! // Errors wait in a single slot until popped or flushed.
//! bedrock::push_error!(ctx, "missing asset {}", 7);
//! let mut dest = MemoryArena::create(os_memory_subsystem(), 1 << 20).unwrap();
//! let error = ctx.pop_error(&mut dest).unwrap().unwrap();
//! assert_eq!(error.text, "missing asset 7");
//!
//! ctx.teardown();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `bedrock-core` | Identity tokens, log levels, log records, log sinks |
//! | [`arena`] | `bedrock-arena` | Memory subsystems, arenas, guarded allocation, ring buffers |
//! | [`thread`] | `bedrock-thread` | Thread context, error channel, worker threads |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Identity tokens and logging types (`bedrock-core`).
///
/// [`types::ArenaId`] and [`types::ContextId`] tell arenas and contexts
/// apart; [`types::LogFn`] is the sink type a thread context logs through.
pub use bedrock_core as types;

/// Memory subsystems, arenas, guard pages, and ring buffers
/// (`bedrock-arena`).
///
/// Start from [`arena::MemoryArena`]; use [`arena::GuardedAllocation`] to
/// trap out-of-bounds writes and [`arena::RingQueue`] for a byte FIFO.
pub use bedrock_arena as arena;

/// Per-thread contexts and workers (`bedrock-thread`).
///
/// [`thread::ThreadContext`] owns the scratch arenas and the error channel;
/// [`thread::Worker`] runs a procedure on its own thread.
pub use bedrock_thread as thread;

pub use bedrock_thread::{context_log, push_error};

/// Common imports for typical Bedrock usage.
///
/// ```rust
/// use bedrock::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use bedrock_core::{tracing_sink, ArenaId, LogFn, LogLevel, LogRecord};

    // Memory
    pub use bedrock_arena::{
        heap_memory_subsystem, os_memory_subsystem, ArenaConfig, ArenaMarker, ArenaSpan,
        CircularBuffer, GuardMode, GuardedAllocation, MemoryArena, MemorySubsystem, RingQueue,
    };

    // Errors
    pub use bedrock_arena::ArenaError;
    pub use bedrock_thread::{ContextError, ThreadError};

    // Threads
    pub use bedrock_thread::{ContextConfig, ErrorHandler, ThreadContext, Worker, WorkerControl};
}
