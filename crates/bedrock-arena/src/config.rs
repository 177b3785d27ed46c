//! Arena configuration parameters.

use crate::error::ArenaError;
use crate::guard::GuardMode;
use crate::page::page_size;

/// Configuration for a virtual-memory-backed [`MemoryArena`](crate::MemoryArena).
///
/// Validated at construction; all values are immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Reservation ceiling in bytes. Rounded up to whole pages.
    ///
    /// Default: 1 GiB. Only address space is reserved; memory is committed
    /// as pushes reach it.
    pub max_size: usize,

    /// Minimum number of bytes committed per growth step.
    ///
    /// Default: one page. Larger steps trade memory for fewer commit calls.
    /// Rounded up to whole pages.
    pub commit_step: usize,

    /// Debug guard mode.
    ///
    /// When set, every push becomes its own guarded allocation whose end
    /// (`Overflow`) or start (`Underflow`) touches an inaccessible page.
    /// Default: `None`.
    pub guard: Option<GuardMode>,

    /// Fill pushed-but-not-cleared memory and rewound memory with
    /// [`SCRIBBLE_BYTE`](Self::SCRIBBLE_BYTE). Default: `false`.
    pub scribble: bool,

    /// Log every push and every rewind that frees or shrinks one, with
    /// the pushing call site, as `debug` events on the
    /// `bedrock_arena::alloc` target. Default: `false`.
    pub log_allocations: bool,
}

impl ArenaConfig {
    /// Default reservation ceiling: 1 GiB.
    pub const DEFAULT_MAX_SIZE: usize = 1 << 30;

    /// Byte written over memory by the scribble debug aid.
    pub const SCRIBBLE_BYTE: u8 = 27;

    /// Create a config with the given reservation ceiling and defaults for
    /// everything else.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            commit_step: page_size(),
            guard: None,
            scribble: false,
            log_allocations: false,
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.max_size == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "max_size must be greater than zero".into(),
            });
        }
        if self.max_size > isize::MAX as usize / 2 {
            return Err(ArenaError::InvalidConfig {
                reason: format!("max_size {} exceeds the addressable range", self.max_size),
            });
        }
        if self.commit_step == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "commit_step must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_SIZE)
    }
}
