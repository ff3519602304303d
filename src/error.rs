//! Central error type for the universe model loader
//!
//! Every fallible operation in the crate returns [`ModelResult`]; failures
//! propagate upward with a human-readable diagnostic and no automatic retry.

use thiserror::Error;

use crate::gpu::MemoryDomain;

/// Crate-wide result type
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    /// Missing, unreadable, or malformed model descriptor
    #[error("invalid model descriptor {path}: {reason}")]
    InvalidDescriptor { path: String, reason: String },

    /// The descriptor's source range does not cover at least one body
    #[error("invalid source range [{start}, {end}): end must be greater than start")]
    InvalidSourceRange { start: u32, end: u32 },

    /// Host-side allocation failure for the admission buffer
    #[error("failed to allocate {size} byte host buffer: {reason}")]
    AllocationFailed { size: u64, reason: String },

    /// Record fetch failure; aborts the entire load
    #[error("failed reading source for body {id} half {half}: {reason}")]
    RecordFetch { id: u32, half: u8, reason: String },

    /// No device memory type satisfies the requested property flags
    #[error("no memory type matches {domain:?}")]
    NoMatchingMemoryType { domain: MemoryDomain },

    /// Graphics device call failure
    #[error("device error during {operation}: {reason}")]
    Device { operation: String, reason: String },

    /// The upload completion fence did not signal within the timeout
    #[error("timed out after {timeout_ms} ms waiting for the upload fence")]
    FenceTimeout { timeout_ms: u64 },

    /// A shared resource lock was poisoned by a panicking holder
    #[error("lock poisoned: {resource}")]
    LockPoisoned { resource: String },
}
