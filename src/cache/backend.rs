//! The cache backend trait and the shared timeout wrapper.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::CACHE_OP_TIMEOUT;
use crate::error::CacheError;

/// Storage contract for the cache tiers.
///
/// Entries are flat string→string field maps under a single key. Implementors
/// must provide per-key atomicity for each individual operation; callers
/// accept last-write-wins semantics across concurrent read-modify-write
/// sequences.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read all fields of a hash. A missing key reads as an empty map.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError>;

    /// Write the given fields, creating the hash if absent and leaving
    /// unmentioned fields untouched. Does not change the key's expiry.
    async fn hash_set(&self, key: &str, fields: HashMap<String, String>)
        -> Result<(), CacheError>;

    /// Atomically add `by` to an integer field, creating the field (and the
    /// hash) at zero if absent. Returns the new value.
    async fn hash_increment(&self, key: &str, field: &str, by: i64) -> Result<i64, CacheError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Arm a relative (sliding-style) expiry: the key dies `ttl` from now.
    async fn expire_in(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Arm an absolute wall-clock expiry, deterministic across restarts.
    async fn expire_at(&self, key: &str, deadline: DateTime<Utc>) -> Result<(), CacheError>;
}

/// Wrap a backend call with the standard per-operation network timeout.
/// A timeout folds into [`CacheError::Timeout`] and degrades like any other
/// cache error.
pub async fn with_timeout<T, F>(fut: F) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    match tokio::time::timeout(CACHE_OP_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout),
    }
}
