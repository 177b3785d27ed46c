//! Per-thread scratch memory, a deferred error channel, and worker
//! threads.
//!
//! # Architecture
//!
//! ```text
//! thread-local registry (one slot per OS thread)
//! └── ThreadContext (Rc handle, !Send)
//!     ├── scratch arenas × 2 (picked by conflict id)
//!     ├── error arena (fixed, default 4 KiB) + base marker
//!     ├── pending error slot {text span, file, line}
//!     ├── LogFn
//!     └── unhandled-error handler
//!
//! Worker (JoinHandle + Arc<AtomicBool> stop flag + completion channel)
//! ```
//!
//! Contexts never share state across threads. The only cross-thread
//! signal is a worker's stop flag, written with `Release` and read with
//! `Acquire`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod error;
pub mod worker;

pub use config::ContextConfig;
pub use context::{default_error_handler, ErrorHandler, ThreadContext, ThreadError};
pub use error::ContextError;
pub use worker::{dispatch, Worker, WorkerControl};

/// Push an error on a [`ThreadContext`] with `format!` syntax, recording
/// the calling file and line.
///
/// ```ignore
/// push_error!(ctx, "cannot open {}: {}", path, reason);
/// ```
#[macro_export]
macro_rules! push_error {
    ($ctx:expr, $($arg:tt)+) => {
        $ctx.push_error_fmt(
            ::std::format_args!($($arg)+),
            ::std::file!(),
            ::std::line!(),
        )
    };
}

/// Log through a [`ThreadContext`]'s log function with `format!` syntax,
/// recording the calling file and line.
///
/// ```ignore
/// context_log!(ctx, LogLevel::Warning, "retrying in {} ms", delay);
/// ```
#[macro_export]
macro_rules! context_log {
    ($ctx:expr, $level:expr, $($arg:tt)+) => {
        $ctx.log_fmt(
            $level,
            ::std::format_args!($($arg)+),
            ::std::file!(),
            ::std::line!(),
        )
    };
}
