//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use rustix::io::Errno;

/// Errors that can occur while reserving, committing, or pushing memory.
///
/// All of these are allocation failures surfaced as values. Usage
/// violations (temp memory ended out of order, foreign markers) are
/// debug assertions instead, and guard-page faults are never caught.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The memory subsystem refused to reserve address space.
    ReserveFailed {
        /// Number of bytes requested.
        size: usize,
    },
    /// The memory subsystem refused to commit a reserved range.
    CommitFailed {
        /// Number of bytes that were to be committed.
        size: usize,
        /// Underlying OS error.
        source: Errno,
    },
    /// A push does not fit in the arena's reservation.
    CapacityExceeded {
        /// Logical end position the push would have required.
        requested: usize,
        /// Total capacity of the arena in bytes.
        capacity: usize,
    },
    /// Alignment is zero, not a power of two, or larger than a page.
    InvalidAlignment {
        /// The rejected alignment.
        align: usize,
    },
    /// A size that cannot be satisfied (e.g. a zero-byte guarded allocation).
    InvalidSize {
        /// The rejected size.
        size: usize,
    },
    /// The arena has already released its memory.
    Released,
    /// An OS primitive failed.
    Os {
        /// Name of the failing operation.
        op: &'static str,
        /// Underlying OS error.
        source: Errno,
    },
    /// An [`ArenaConfig`](crate::ArenaConfig) failed validation.
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReserveFailed { size } => {
                write!(f, "failed to reserve {size} bytes of address space")
            }
            Self::CommitFailed { size, source } => {
                write!(f, "failed to commit {size} bytes: {source}")
            }
            Self::CapacityExceeded {
                requested,
                capacity,
            } => {
                write!(
                    f,
                    "arena capacity exceeded: requested {requested} bytes, capacity {capacity} bytes"
                )
            }
            Self::InvalidAlignment { align } => {
                write!(f, "invalid alignment {align}: must be a power of two no larger than a page")
            }
            Self::InvalidSize { size } => write!(f, "invalid allocation size {size}"),
            Self::Released => write!(f, "arena memory has been released"),
            Self::Os { op, source } => write!(f, "{op} failed: {source}"),
            Self::InvalidConfig { reason } => write!(f, "invalid arena config: {reason}"),
        }
    }
}

impl Error for ArenaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CommitFailed { source, .. } | Self::Os { source, .. } => Some(source),
            _ => None,
        }
    }
}
