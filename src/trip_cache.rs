//! Trip persona cache (L2).
//!
//! Durable-within-trip cache of full dimension strengths, keyed by
//! `(user_id, trip_id)`. Entries are seeded from the durable store by the
//! resolver, mutated only by session-delta merges, and die at the trip's
//! `end_date + 48h` (absolute wall-clock expiry) or on invalidation by the
//! store's batch updater.
//!
//! Every operation degrades to a cache-miss/no-op on backend error; nothing
//! here ever raises.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::cache::{with_timeout, CacheBackend};
use crate::config::{clamp_dimension, round4, DIMENSION_DEFAULT, TRIP_CACHE_GRACE_HOURS, TRIP_PERSONA_PREFIX};
use crate::error::CacheError;
use crate::model::{SessionDeltaRecord, TripCacheRecord};

/// L2 cache handle. Cheap to clone; all state lives in the backend.
#[derive(Clone)]
pub struct TripPersonaCache {
    backend: Arc<dyn CacheBackend>,
}

impl TripPersonaCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    fn key(user_id: &str, trip_id: &str) -> String {
        format!("{TRIP_PERSONA_PREFIX}:{user_id}:{trip_id}")
    }

    /// Read the cached persona for a trip. Miss, malformed payload, and
    /// backend error all read as `None`.
    pub async fn get_cached_persona(
        &self,
        user_id: &str,
        trip_id: &str,
    ) -> Option<TripCacheRecord> {
        let key = Self::key(user_id, trip_id);
        let fields = match with_timeout(self.backend.hash_get_all(&key)).await {
            Ok(fields) => fields,
            Err(e) => {
                log::warn!("trip cache read failed for {key}: {e}");
                return None;
            }
        };
        if fields.is_empty() {
            return None;
        }
        let record = TripCacheRecord::from_fields(&fields);
        if record.is_none() {
            log::warn!("trip cache payload malformed for {key}; treating as miss");
        }
        record
    }

    /// Overwrite the full cached persona for a trip.
    ///
    /// Replaces every dimension field (clamping strengths on write), resets
    /// `signal_count_since_nightly`, stamps the sync version, and arms the
    /// absolute expiry at `trip_end_date + 48h` so the entry's death time
    /// survives restarts.
    pub async fn set_cached_persona(
        &self,
        user_id: &str,
        trip_id: &str,
        dimensions: &HashMap<String, f64>,
        version: i64,
        trip_end_date: DateTime<Utc>,
    ) {
        let key = Self::key(user_id, trip_id);
        let record = TripCacheRecord {
            dimensions: dimensions
                .iter()
                .map(|(name, strength)| (name.clone(), round4(clamp_dimension(*strength))))
                .collect(),
            nightly_sync_version: version,
            signal_count_since_nightly: 0,
            last_updated: Utc::now(),
        };
        let deadline = trip_end_date + Duration::hours(TRIP_CACHE_GRACE_HOURS);
        if let Err(e) = self.write_record(&key, record, deadline).await {
            log::warn!("trip cache write failed for {key}: {e}");
        }
    }

    async fn write_record(
        &self,
        key: &str,
        record: TripCacheRecord,
        deadline: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        // Delete first so stale dimension fields cannot survive a reseed.
        with_timeout(self.backend.delete(key)).await?;
        with_timeout(self.backend.hash_set(key, record.to_fields())).await?;
        with_timeout(self.backend.expire_at(key, deadline)).await?;
        Ok(())
    }

    /// Merge an L1 session delta into the cached persona.
    ///
    /// Read-modify-write per dimension: missing dimensions start at the
    /// neutral default, results clamp to the valid range. The signal count
    /// is added via the backend's atomic increment. When no cache entry
    /// exists for the key this is a silent no-op and the delta is dropped;
    /// the next durable-store read reseeds the cache.
    pub async fn merge_session_delta(
        &self,
        user_id: &str,
        trip_id: &str,
        delta: &SessionDeltaRecord,
    ) {
        let key = Self::key(user_id, trip_id);
        if let Err(e) = self.merge_inner(&key, delta).await {
            log::warn!("trip cache merge failed for {key}: {e}");
        }
    }

    async fn merge_inner(&self, key: &str, delta: &SessionDeltaRecord) -> Result<(), CacheError> {
        let fields = with_timeout(self.backend.hash_get_all(key)).await?;
        if fields.is_empty() {
            log::debug!("no trip cache entry at {key}; session delta dropped");
            return Ok(());
        }

        let mut updates = HashMap::new();
        for (dimension, adjustment) in &delta.adjustments {
            let current = fields
                .get(dimension)
                .and_then(|raw| raw.parse::<f64>().ok())
                .unwrap_or(DIMENSION_DEFAULT);
            let merged = clamp_dimension(current + adjustment);
            updates.insert(dimension.clone(), round4(merged).to_string());
        }
        updates.insert("last_updated".to_string(), Utc::now().to_rfc3339());
        with_timeout(self.backend.hash_set(key, updates)).await?;
        with_timeout(self.backend.hash_increment(
            key,
            "signal_count_since_nightly",
            delta.signal_count,
        ))
        .await?;
        Ok(())
    }

    /// True iff the cached entry's `nightly_sync_version` equals
    /// `db_version`. Miss, malformed payload, and backend error all read as
    /// stale (conservative default).
    pub async fn check_version(&self, user_id: &str, trip_id: &str, db_version: i64) -> bool {
        match self.get_cached_persona(user_id, trip_id).await {
            Some(record) => record.nightly_sync_version == db_version,
            None => false,
        }
    }

    /// Drop the cached persona for a trip. Called by the durable store's
    /// batch updater after it writes fresh canonical dimensions.
    pub async fn invalidate(&self, user_id: &str, trip_id: &str) {
        let key = Self::key(user_id, trip_id);
        if let Err(e) = with_timeout(self.backend.delete(&key)).await {
            log::warn!("trip cache invalidate failed for {key}: {e}");
        }
    }
}
