//! Session persona delta (L1).
//!
//! Ephemeral per-(user, session) accumulator of behavioral-signal
//! adjustments. Lives behind a 30-minute sliding TTL: every write re-arms
//! it, so idle sessions expire while active ones persist. Losing this tier
//! is an accepted degradation; every operation swallows backend errors.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::cache::{with_timeout, CacheBackend};
use crate::config::{
    round4, ADJUSTMENT_SUFFIX, CATEGORY_DIMENSION_WEIGHTS, SESSION_DELTA_PREFIX,
    SESSION_DELTA_TTL, SIGNAL_STEP,
};
use crate::error::CacheError;
use crate::model::{SessionDeltaRecord, SignalDirection, TripPhase};
use crate::trip_cache::TripPersonaCache;

/// L1 accumulator handle. Cheap to clone; all state lives in the backend.
#[derive(Clone)]
pub struct SessionPersonaDelta {
    backend: Arc<dyn CacheBackend>,
}

impl SessionPersonaDelta {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    fn key(user_id: &str, session_id: &str) -> String {
        format!("{SESSION_DELTA_PREFIX}:{user_id}:{session_id}")
    }

    /// Record one behavioral event.
    ///
    /// Directional signals whose activity category maps to tracked
    /// dimensions accumulate `direction × weight × phase_weight × step`
    /// per mapped dimension, via read-modify-write. Every signal, including
    /// neutral ones, bumps `signal_count` and re-arms the sliding TTL.
    pub async fn apply_signal(
        &self,
        user_id: &str,
        session_id: &str,
        signal_type: &str,
        activity_category: Option<&str>,
        trip_phase: TripPhase,
    ) {
        let key = Self::key(user_id, session_id);
        let direction = SignalDirection::classify(signal_type);
        if let Err(e) = self
            .apply_signal_inner(&key, direction, activity_category, trip_phase)
            .await
        {
            log::warn!("session delta write failed for {key}: {e}");
        }
    }

    async fn apply_signal_inner(
        &self,
        key: &str,
        direction: SignalDirection,
        activity_category: Option<&str>,
        trip_phase: TripPhase,
    ) -> Result<(), CacheError> {
        let mappings = activity_category
            .filter(|_| direction != SignalDirection::Neutral)
            .and_then(|category| CATEGORY_DIMENSION_WEIGHTS.get(category));

        let mut updates = HashMap::new();
        if let Some(mappings) = mappings {
            let current = with_timeout(self.backend.hash_get_all(key)).await?;
            for (dimension, weight) in mappings {
                let field = format!("{dimension}{ADJUSTMENT_SUFFIX}");
                let existing = current
                    .get(&field)
                    .and_then(|raw| raw.parse::<f64>().ok())
                    .unwrap_or(0.0);
                let adjustment = direction.factor() * weight * trip_phase.weight() * SIGNAL_STEP;
                updates.insert(field, round4(existing + adjustment).to_string());
            }
        }
        updates.insert("last_updated".to_string(), Utc::now().to_rfc3339());
        with_timeout(self.backend.hash_set(key, updates)).await?;
        with_timeout(self.backend.hash_increment(key, "signal_count", 1)).await?;
        with_timeout(self.backend.expire_in(key, SESSION_DELTA_TTL)).await?;
        Ok(())
    }

    /// Read the accumulated delta for a session. Absent key and backend
    /// error both read as `None`.
    pub async fn get_delta(&self, user_id: &str, session_id: &str) -> Option<SessionDeltaRecord> {
        let key = Self::key(user_id, session_id);
        match with_timeout(self.backend.hash_get_all(&key)).await {
            Ok(fields) => SessionDeltaRecord::from_fields(&fields),
            Err(e) => {
                log::warn!("session delta read failed for {key}: {e}");
                None
            }
        }
    }

    /// Merge this session's delta into the trip cache, then drop the L1 key.
    ///
    /// Called on session end (app close or idle timeout). No-op when the
    /// delta is empty or the backend is unavailable; the merge itself
    /// degrades inside [`TripPersonaCache::merge_session_delta`].
    pub async fn flush_to_trip_cache(
        &self,
        user_id: &str,
        session_id: &str,
        trip_id: &str,
        trip_cache: &TripPersonaCache,
    ) {
        let key = Self::key(user_id, session_id);
        let Some(delta) = self.get_delta(user_id, session_id).await else {
            log::debug!("no session delta at {key}; nothing to flush");
            return;
        };
        if delta.is_empty() {
            log::debug!("session delta at {key} is empty; nothing to flush");
            return;
        }

        trip_cache.merge_session_delta(user_id, trip_id, &delta).await;

        if let Err(e) = with_timeout(self.backend.delete(&key)).await {
            log::warn!("session delta cleanup failed for {key}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheBackend;
    use std::collections::HashMap;

    fn delta_with_backend() -> (SessionPersonaDelta, Arc<MemoryCacheBackend>) {
        let backend = Arc::new(MemoryCacheBackend::new());
        (SessionPersonaDelta::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_opposing_signals_cancel_and_both_count() {
        let (l1, _backend) = delta_with_backend();
        l1.apply_signal("u1", "s1", "slot_confirm", Some("restaurant"), TripPhase::Active)
            .await;

        let delta = l1.get_delta("u1", "s1").await.unwrap();
        assert_eq!(delta.adjustments["food_priority"], 0.1);
        assert_eq!(delta.signal_count, 1);

        l1.apply_signal("u1", "s1", "slot_skip", Some("restaurant"), TripPhase::Active)
            .await;

        let delta = l1.get_delta("u1", "s1").await.unwrap();
        assert_eq!(delta.adjustments["food_priority"], 0.0);
        assert_eq!(delta.signal_count, 2);
    }

    #[tokio::test]
    async fn test_phase_and_category_weights_scale_adjustment() {
        let (l1, _backend) = delta_with_backend();
        // cafe carries weight 0.6; pre-trip phase weight is 0.7.
        l1.apply_signal("u1", "s1", "slot_confirm", Some("cafe"), TripPhase::PreTrip)
            .await;

        let delta = l1.get_delta("u1", "s1").await.unwrap();
        assert_eq!(delta.adjustments["food_priority"], 0.042);
    }

    #[tokio::test]
    async fn test_category_fanout_moves_multiple_dimensions() {
        let (l1, _backend) = delta_with_backend();
        l1.apply_signal("u1", "s1", "slot_confirm", Some("hike"), TripPhase::Active)
            .await;

        let delta = l1.get_delta("u1", "s1").await.unwrap();
        assert_eq!(delta.adjustments["outdoor_priority"], 0.1);
        assert_eq!(delta.adjustments["pace_preference"], 0.03);
    }

    #[tokio::test]
    async fn test_neutral_signal_is_count_only() {
        let (l1, _backend) = delta_with_backend();
        l1.apply_signal("u1", "s1", "slot_view", Some("restaurant"), TripPhase::Active)
            .await;

        let delta = l1.get_delta("u1", "s1").await.unwrap();
        assert!(delta.adjustments.is_empty());
        assert_eq!(delta.signal_count, 1);
    }

    #[tokio::test]
    async fn test_unmapped_category_is_count_only() {
        let (l1, _backend) = delta_with_backend();
        l1.apply_signal("u1", "s1", "slot_confirm", Some("space_elevator"), TripPhase::Active)
            .await;
        l1.apply_signal("u1", "s1", "slot_confirm", None, TripPhase::Active)
            .await;

        let delta = l1.get_delta("u1", "s1").await.unwrap();
        assert!(delta.adjustments.is_empty());
        assert_eq!(delta.signal_count, 2);
    }

    #[tokio::test]
    async fn test_every_write_rearms_sliding_ttl() {
        let (l1, backend) = delta_with_backend();
        l1.apply_signal("u1", "s1", "slot_view", None, TripPhase::Active)
            .await;

        let first_deadline = backend.expires_at("session_delta:u1:s1").unwrap();
        assert!(first_deadline > Utc::now() + chrono::Duration::minutes(29));

        l1.apply_signal("u1", "s1", "slot_view", None, TripPhase::Active)
            .await;
        let second_deadline = backend.expires_at("session_delta:u1:s1").unwrap();
        assert!(second_deadline >= first_deadline);
    }

    #[tokio::test]
    async fn test_backend_outage_swallowed() {
        let (l1, backend) = delta_with_backend();
        backend.set_unavailable(true);

        l1.apply_signal("u1", "s1", "slot_confirm", Some("restaurant"), TripPhase::Active)
            .await;
        assert!(l1.get_delta("u1", "s1").await.is_none());

        backend.set_unavailable(false);
        assert!(l1.get_delta("u1", "s1").await.is_none());
    }

    #[tokio::test]
    async fn test_flush_merges_and_deletes_key() {
        let (l1, backend) = delta_with_backend();
        let trip_cache = TripPersonaCache::new(backend.clone());
        trip_cache
            .set_cached_persona(
                "u1",
                "t1",
                &HashMap::from([("food_priority".to_string(), 0.6)]),
                1,
                Utc::now() + chrono::Duration::days(3),
            )
            .await;

        l1.apply_signal("u1", "s1", "slot_confirm", Some("restaurant"), TripPhase::Active)
            .await;
        l1.flush_to_trip_cache("u1", "s1", "t1", &trip_cache).await;

        let record = trip_cache.get_cached_persona("u1", "t1").await.unwrap();
        assert_eq!(record.dimensions["food_priority"], 0.7);
        assert_eq!(record.signal_count_since_nightly, 1);
        assert!(l1.get_delta("u1", "s1").await.is_none());
    }

    #[tokio::test]
    async fn test_flush_without_delta_is_noop() {
        let (l1, backend) = delta_with_backend();
        let trip_cache = TripPersonaCache::new(backend.clone());
        l1.flush_to_trip_cache("u1", "s1", "t1", &trip_cache).await;
        assert!(trip_cache.get_cached_persona("u1", "t1").await.is_none());
    }

    #[tokio::test]
    async fn test_flush_without_trip_entry_drops_delta() {
        let (l1, backend) = delta_with_backend();
        let trip_cache = TripPersonaCache::new(backend.clone());

        l1.apply_signal("u1", "s1", "slot_confirm", Some("restaurant"), TripPhase::Active)
            .await;
        l1.flush_to_trip_cache("u1", "s1", "t1", &trip_cache).await;

        // Delta gone, and nothing materialized on the trip side.
        assert!(l1.get_delta("u1", "s1").await.is_none());
        assert!(trip_cache.get_cached_persona("u1", "t1").await.is_none());
    }
}
