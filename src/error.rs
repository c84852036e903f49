// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! Error kinds surfaced by the scheduler core.

use thiserror::Error;

/// Errors the core can report. Submission errors never enqueue anything;
/// they are handed to the embedder's `report_failure` callback on the
/// submitting thread (see [`crate::pool::Pool::submit_op`]).
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The operation kind has no entry in the classification table.
    #[error("unrecognized operation kind: {0}")]
    InvalidKind(&'static str),

    /// Allocating the deferred operation failed before it could be queued.
    /// Mirrors the original's `GF_CALLOC`-returns-`NULL` path for
    /// errno-mapping parity; stable safe Rust has no equivalent fallible
    /// allocation here (`Box::new` aborts the process instead), so this
    /// variant is never constructed by this crate. See SPEC_FULL.md §7.
    #[error("out of memory constructing deferred operation")]
    OutOfMemory,

    /// A synchronization primitive or worker thread failed to initialize.
    /// Fatal to [`crate::pool::Pool::new`]; the stage refuses to come up.
    #[error("initialization failed: {0}")]
    InitFailure(String),

    /// The scheduler mutex was poisoned by a panicking holder. Not expected
    /// in normal operation, but surfaced rather than silently recovered
    /// from, since the shared state may be inconsistent.
    #[error("scheduler lock poisoned")]
    PoisonedLock,
}

impl Error {
    /// Negated-errno mapping used by `report_failure(kind, err)`.
    pub fn errno(&self) -> i32 {
        match self {
            Error::InvalidKind(_) => libc::EINVAL,
            Error::OutOfMemory => libc::ENOMEM,
            Error::InitFailure(_) => libc::EIO,
            Error::PoisonedLock => libc::EIO,
        }
    }
}
