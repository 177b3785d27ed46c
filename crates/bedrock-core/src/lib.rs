//! Core types shared across the Bedrock runtime.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! identity tokens used to tell arenas and thread contexts apart, and the
//! log record / log sink types that the thread context routes messages
//! through.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod id;
pub mod log;

pub use id::{ArenaId, ContextId};
pub use log::{tracing_sink, LogFn, LogLevel, LogRecord};
