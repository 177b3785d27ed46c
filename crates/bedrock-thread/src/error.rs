//! Thread-context error types.

use std::error::Error;
use std::fmt;

use bedrock_arena::ArenaError;

/// Errors from setting up a thread context or a worker thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextError {
    /// The calling thread already has a context.
    AlreadyInitialized,
    /// The calling thread has no context.
    NotInitialized,
    /// A [`ContextConfig`](crate::ContextConfig) failed validation.
    InvalidConfig {
        /// Description of which invariant was violated.
        reason: String,
    },
    /// Creating one of the context's arenas failed.
    Arena(ArenaError),
    /// The OS refused to start a thread.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => {
                write!(f, "thread context already initialised on this thread")
            }
            Self::NotInitialized => write!(f, "no thread context on this thread"),
            Self::InvalidConfig { reason } => write!(f, "invalid context config: {reason}"),
            Self::Arena(e) => write!(f, "arena: {e}"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for ContextError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}
