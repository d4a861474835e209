//! In-process cache backend.
//!
//! DashMap-backed implementation of [`CacheBackend`] with wall-clock expiry,
//! purged lazily on access. This is the backend used in tests and local
//! development; networked implementations live outside this crate. The
//! `set_unavailable` switch turns every operation into a backend error so
//! degradation paths can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::cache::backend::CacheBackend;
use crate::error::CacheError;

#[derive(Debug, Clone, Default)]
struct CacheEntry {
    fields: HashMap<String, String>,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Thread-safe in-memory hash store with per-key expiry.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<String, CacheEntry>,
    unavailable: AtomicBool,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage: while set, every operation fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current expiry deadline for a key, if the key is live and has one.
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.purge_if_expired(key);
        self.entries.get(key).and_then(|entry| entry.expires_at)
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Backend {
                message: "backend marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn purge_if_expired(&self, key: &str) {
        let now = Utc::now();
        self.entries
            .remove_if(key, |_, entry| entry.is_expired(now));
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        self.check_available()?;
        self.purge_if_expired(key);
        Ok(self
            .entries
            .get(key)
            .map(|entry| entry.fields.clone())
            .unwrap_or_default())
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: HashMap<String, String>,
    ) -> Result<(), CacheError> {
        self.check_available()?;
        self.purge_if_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_default();
        entry.fields.extend(fields);
        Ok(())
    }

    async fn hash_increment(&self, key: &str, field: &str, by: i64) -> Result<i64, CacheError> {
        self.check_available()?;
        self.purge_if_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_default();
        let current = match entry.fields.get(field) {
            Some(raw) => raw.parse::<i64>().map_err(|_| CacheError::Backend {
                message: format!("field {field} is not an integer"),
            })?,
            None => 0,
        };
        let next = current + by;
        entry.fields.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check_available()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn expire_in(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check_available()?;
        self.purge_if_expired(key);
        let deadline = Utc::now()
            + chrono::Duration::from_std(ttl).map_err(|e| CacheError::Backend {
                message: format!("invalid ttl: {e}"),
            })?;
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(deadline);
        }
        Ok(())
    }

    async fn expire_at(&self, key: &str, deadline: DateTime<Utc>) -> Result<(), CacheError> {
        self.check_available()?;
        self.purge_if_expired(key);
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(deadline);
        }
        Ok(())
    }
}
