//! Error types for the persona subsystem.
//!
//! The taxonomy mirrors the propagation policy: [`CacheError`] never escapes
//! this crate (cache tiers log and degrade), while [`StoreError`] is fatal
//! during resolution and surfaces through [`PersonaError`].

use thiserror::Error;

/// Errors from the key-value cache backend. Always non-fatal: callers log at
/// warning level and treat the operation as a miss or no-op.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or refused the operation.
    #[error("cache backend error: {message}")]
    Backend { message: String },

    /// A backend call exceeded the per-operation network timeout.
    #[error("cache operation timed out")]
    Timeout,
}

/// Errors from the durable persona store. Fatal during `effective_persona`:
/// without canonical dimensions there is no safe default to rank with.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("persona store connection error: {message}")]
    Connection { message: String },

    /// A query against the store failed.
    #[error("persona store query error: {message}")]
    Query { message: String },
}

/// Public error type for persona resolution.
#[derive(Debug, Error)]
pub enum PersonaError {
    /// The durable store read failed; resolution cannot continue.
    #[error(transparent)]
    Store(#[from] StoreError),
}
