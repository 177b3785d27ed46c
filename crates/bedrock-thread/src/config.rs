//! Thread-context configuration.

use crate::error::ContextError;

/// Sizes used when a thread context creates its own arenas.
///
/// Validated by [`ThreadContext::init_with_config`](crate::ThreadContext::init_with_config)
/// and [`Worker::spawn_with_context`](crate::Worker::spawn_with_context).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextConfig {
    /// Reservation for each scratch arena created by
    /// [`ThreadContext::init_default`](crate::ThreadContext::init_default).
    ///
    /// Default: 64 MiB. Only address space; pages commit on use.
    pub scratch_reserve: usize,

    /// Size of the fixed arena holding the pending error text. Longer
    /// messages are truncated. Rounded up to whole pages.
    ///
    /// Default: 4096.
    pub error_arena_size: usize,
}

impl ContextConfig {
    /// Default scratch reservation: 64 MiB.
    pub const DEFAULT_SCRATCH_RESERVE: usize = 64 << 20;

    /// Default error arena size.
    pub const DEFAULT_ERROR_ARENA_SIZE: usize = 4096;

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.scratch_reserve == 0 {
            return Err(ContextError::InvalidConfig {
                reason: "scratch_reserve must be greater than zero".into(),
            });
        }
        if self.error_arena_size == 0 {
            return Err(ContextError::InvalidConfig {
                reason: "error_arena_size must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            scratch_reserve: Self::DEFAULT_SCRATCH_RESERVE,
            error_arena_size: Self::DEFAULT_ERROR_ARENA_SIZE,
        }
    }
}
