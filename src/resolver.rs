//! Effective persona resolution.
//!
//! Reconciles four tiers of increasingly stale or generic data into one
//! snapshot: the L2 trip cache, the durable store, the collaborative-filter
//! blend seam, and the destination prior. The cache tier accelerates, never
//! gates: any cache failure falls through to the durable store, while a
//! durable-store dimension read failure is fatal (no persona means nothing
//! can be ranked safely).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::{DIMENSION_DEFAULT, TRACKED_DIMENSIONS};
use crate::error::PersonaError;
use crate::model::{
    direction_for_label, label_for_direction, DimensionSignal, DimensionValue, PersonaSnapshot,
    PersonaSource, TripCacheRecord,
};
use crate::prior::apply_destination_prior;
use crate::store::{PersonaDimensionRow, PersonaStore};
use crate::trip_cache::TripPersonaCache;

/// Collaborative-filtering blend seam.
///
/// A deliberate extension point: today's implementation is the identity,
/// and a future CF blend substitutes here without touching resolver control
/// flow. Implementations may append or strengthen signals but must never
/// reduce or override a dimension whose confidence already meets the
/// confidence gate.
#[async_trait]
pub trait CollaborativeBlend: Send + Sync {
    async fn blend(&self, user_id: &str, signals: Vec<DimensionSignal>) -> Vec<DimensionSignal>;
}

/// The no-op blend in use today.
pub struct IdentityBlend;

#[async_trait]
impl CollaborativeBlend for IdentityBlend {
    async fn blend(&self, _user_id: &str, signals: Vec<DimensionSignal>) -> Vec<DimensionSignal> {
        signals
    }
}

/// Resolves the effective persona for a user, optionally scoped to a trip.
///
/// Handles are injected once at construction; there is no process-wide
/// mutable state behind this type.
#[derive(Clone)]
pub struct EffectivePersonaResolver {
    store: Arc<dyn PersonaStore>,
    trip_cache: TripPersonaCache,
    blend: Arc<dyn CollaborativeBlend>,
}

impl EffectivePersonaResolver {
    /// Build a resolver with the identity CF blend.
    pub fn new(store: Arc<dyn PersonaStore>, trip_cache: TripPersonaCache) -> Self {
        Self::with_blend(store, trip_cache, Arc::new(IdentityBlend))
    }

    /// Build a resolver with a custom CF blend implementation.
    pub fn with_blend(
        store: Arc<dyn PersonaStore>,
        trip_cache: TripPersonaCache,
        blend: Arc<dyn CollaborativeBlend>,
    ) -> Self {
        Self {
            store,
            trip_cache,
            blend,
        }
    }

    /// Resolve the current effective persona.
    ///
    /// With a `trip_id`, the L2 cache is consulted first, validated against
    /// a cheap version pre-fetch from the durable store. A valid hit
    /// returns immediately without reading the store's dimension rows (a
    /// hard performance contract). Otherwise dimensions come from the
    /// durable store (or the cold-start default table), pass through the CF
    /// blend seam and, when a `city_slug` is given, destination-prior
    /// injection.
    ///
    /// If the version pre-fetch fails, version gating is skipped entirely
    /// and any cached payload is accepted as fresh. Availability over
    /// consistency: tightening this would make persona reads degrade
    /// whenever the store does.
    pub async fn effective_persona(
        &self,
        user_id: &str,
        trip_id: Option<&str>,
        city_slug: Option<&str>,
    ) -> Result<PersonaSnapshot, PersonaError> {
        if let Some(trip) = trip_id {
            let db_version = match self.store.current_version(user_id).await {
                Ok(version) => version,
                Err(e) => {
                    log::warn!("version oracle unavailable for {user_id}: {e}; skipping version gate");
                    None
                }
            };

            if let Some(record) = self.trip_cache.get_cached_persona(user_id, trip).await {
                let fresh = match db_version {
                    Some(version) => record.nightly_sync_version == version,
                    None => true,
                };
                if fresh {
                    return Ok(self.snapshot_from_cache(user_id, trip, &record));
                }
                log::debug!(
                    "trip cache for {user_id}:{trip} at version {} behind store version {:?}; falling through",
                    record.nightly_sync_version,
                    db_version
                );
            }
        }

        // Fatal on failure: there is no safe persona to rank with.
        let rows = self.store.load_dimensions(user_id).await?;

        let negative_tag_affinities = merge_negative_tags(&rows);
        let signals = if rows.is_empty() {
            log::debug!("cold start for {user_id}: serving onboarding defaults");
            cold_start_signals()
        } else {
            rows.iter().map(signal_from_row).collect()
        };

        let signals = self.blend.blend(user_id, signals).await;
        let signals = match city_slug {
            Some(city) => apply_destination_prior(&signals, city),
            None => signals,
        };

        let dimensions = fold_signals(signals);
        let confidence = PersonaSnapshot::mean_confidence(&dimensions);
        let source_breakdown = dimensions
            .iter()
            .map(|(name, value)| (name.clone(), value.source))
            .collect();

        Ok(PersonaSnapshot {
            user_id: user_id.to_string(),
            trip_id: trip_id.map(str::to_string),
            dimensions,
            negative_tag_affinities,
            source_breakdown,
            confidence,
            cache_hit: false,
            resolved_at: Utc::now(),
        })
    }

    fn snapshot_from_cache(
        &self,
        user_id: &str,
        trip_id: &str,
        record: &TripCacheRecord,
    ) -> PersonaSnapshot {
        let dimensions: HashMap<String, DimensionValue> = record
            .dimensions
            .iter()
            .map(|(name, strength)| (name.clone(), DimensionValue::from_cached_strength(*strength)))
            .collect();
        let confidence = PersonaSnapshot::mean_confidence(&dimensions);
        let source_breakdown = dimensions
            .keys()
            .map(|name| (name.clone(), PersonaSource::TripCache))
            .collect();

        PersonaSnapshot {
            user_id: user_id.to_string(),
            trip_id: Some(trip_id.to_string()),
            dimensions,
            // The L2 record carries no tag channel; re-reading the store
            // here would break the cache-hit contract.
            negative_tag_affinities: HashMap::new(),
            source_breakdown,
            confidence,
            cache_hit: true,
            resolved_at: Utc::now(),
        }
    }
}

fn signal_from_row(row: &PersonaDimensionRow) -> DimensionSignal {
    DimensionSignal::new(
        row.dimension.clone(),
        direction_for_label(&row.value),
        row.confidence.clamp(0.0, 1.0),
        PersonaSource::parse(&row.source),
    )
}

fn cold_start_signals() -> Vec<DimensionSignal> {
    TRACKED_DIMENSIONS
        .iter()
        .map(|dimension| {
            DimensionSignal::new(*dimension, 0.0, DIMENSION_DEFAULT, PersonaSource::Onboarding)
        })
        .collect()
}

/// Union of the denormalized tag maps across rows. Overlapping tags keep
/// the strongest (most negative) affinity.
fn merge_negative_tags(rows: &[PersonaDimensionRow]) -> HashMap<String, f64> {
    let mut tags: HashMap<String, f64> = HashMap::new();
    for row in rows {
        for (tag, affinity) in &row.negative_tag_affinities {
            let clamped = affinity.clamp(-1.0, 0.0);
            tags.entry(tag.clone())
                .and_modify(|existing| *existing = existing.min(clamped))
                .or_insert(clamped);
        }
    }
    tags
}

/// Choose the winning signal per dimension (highest confidence; earlier
/// entries win ties, so user evidence beats an equal-confidence injection).
fn fold_signals(signals: Vec<DimensionSignal>) -> HashMap<String, DimensionValue> {
    let mut winners: HashMap<String, DimensionSignal> = HashMap::new();
    for signal in signals {
        match winners.get(&signal.dimension) {
            Some(current) if current.confidence >= signal.confidence => {}
            _ => {
                winners.insert(signal.dimension.clone(), signal);
            }
        }
    }
    winners
        .into_iter()
        .map(|(dimension, signal)| {
            let value = DimensionValue::new(
                label_for_direction(signal.direction),
                signal.confidence,
                signal.source,
            );
            (dimension, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheBackend;
    use crate::config::CONFIDENCE_GATE;
    use crate::store::MemoryPersonaStore;
    use chrono::Duration;

    struct Fixture {
        resolver: EffectivePersonaResolver,
        store: Arc<MemoryPersonaStore>,
        trip_cache: TripPersonaCache,
        backend: Arc<MemoryCacheBackend>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryCacheBackend::new());
        let store = Arc::new(MemoryPersonaStore::new());
        let trip_cache = TripPersonaCache::new(backend.clone());
        let resolver = EffectivePersonaResolver::new(store.clone(), trip_cache.clone());
        Fixture {
            resolver,
            store,
            trip_cache,
            backend,
        }
    }

    fn row(dimension: &str, value: &str, confidence: f64, version: i64) -> PersonaDimensionRow {
        PersonaDimensionRow {
            dimension: dimension.to_string(),
            value: value.to_string(),
            confidence,
            source: "behavioral_ema".to_string(),
            negative_tag_affinities: HashMap::new(),
            version,
        }
    }

    #[tokio::test]
    async fn test_cold_start_serves_onboarding_defaults() {
        let f = fixture();
        let snapshot = f
            .resolver
            .effective_persona("u1", None, None)
            .await
            .unwrap();

        assert_eq!(snapshot.dimensions.len(), TRACKED_DIMENSIONS.len());
        for name in TRACKED_DIMENSIONS {
            let value = &snapshot.dimensions[name];
            assert_eq!(value.value, "balanced");
            assert_eq!(value.confidence, 0.5);
            assert_eq!(value.source, PersonaSource::Onboarding);
        }
        assert_eq!(snapshot.confidence, 0.5);
        assert!(!snapshot.cache_hit);
        assert!(snapshot.negative_tag_affinities.is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store_dimension_read() {
        let f = fixture();
        f.store.seed("u1", vec![row("food_priority", "high", 0.8, 3)], 3);
        f.trip_cache
            .set_cached_persona(
                "u1",
                "t1",
                &HashMap::from([("food_priority".to_string(), 0.8)]),
                3,
                Utc::now() + Duration::days(2),
            )
            .await;

        let snapshot = f
            .resolver
            .effective_persona("u1", Some("t1"), None)
            .await
            .unwrap();

        assert!(snapshot.cache_hit);
        assert_eq!(snapshot.dimensions["food_priority"].value, "high");
        assert_eq!(snapshot.dimensions["food_priority"].confidence, 0.8);
        assert_eq!(
            snapshot.dimensions["food_priority"].source,
            PersonaSource::TripCache
        );
        // Only the cheap version oracle ran; no full dimension read.
        assert_eq!(f.store.dimension_reads(), 0);
    }

    #[tokio::test]
    async fn test_version_mismatch_falls_through_to_store() {
        let f = fixture();
        f.store.seed("u1", vec![row("food_priority", "high", 0.8, 4)], 4);
        f.trip_cache
            .set_cached_persona(
                "u1",
                "t1",
                &HashMap::from([("food_priority".to_string(), 0.2)]),
                3,
                Utc::now() + Duration::days(2),
            )
            .await;

        let snapshot = f
            .resolver
            .effective_persona("u1", Some("t1"), None)
            .await
            .unwrap();

        assert!(!snapshot.cache_hit);
        assert_eq!(snapshot.dimensions["food_priority"].value, "high");
        assert_eq!(f.store.dimension_reads(), 1);
    }

    #[tokio::test]
    async fn test_oracle_failure_admits_stale_cache() {
        let f = fixture();
        f.store.seed("u1", vec![row("food_priority", "high", 0.8, 4)], 4);
        f.trip_cache
            .set_cached_persona(
                "u1",
                "t1",
                &HashMap::from([("food_priority".to_string(), 0.2)]),
                3,
                Utc::now() + Duration::days(2),
            )
            .await;
        f.store.set_version_reads_failing(true);

        let snapshot = f
            .resolver
            .effective_persona("u1", Some("t1"), None)
            .await
            .unwrap();

        // Version gating bypassed: the stale entry is accepted as fresh.
        assert!(snapshot.cache_hit);
        assert_eq!(snapshot.dimensions["food_priority"].value, "low");
        assert_eq!(f.store.dimension_reads(), 0);
    }

    #[tokio::test]
    async fn test_cache_tier_outage_resolves_from_store() {
        let f = fixture();
        f.store.seed("u1", vec![row("food_priority", "high", 0.8, 1)], 1);
        f.backend.set_unavailable(true);

        let snapshot = f
            .resolver
            .effective_persona("u1", Some("t1"), None)
            .await
            .unwrap();

        assert!(!snapshot.cache_hit);
        assert_eq!(snapshot.dimensions["food_priority"].value, "high");
    }

    #[tokio::test]
    async fn test_store_dimension_read_failure_is_fatal() {
        let f = fixture();
        f.store.set_dimension_reads_failing(true);

        let result = f.resolver.effective_persona("u1", None, None).await;
        assert!(matches!(result, Err(PersonaError::Store(_))));
    }

    #[tokio::test]
    async fn test_destination_prior_fills_weak_dimensions() {
        let f = fixture();
        f.store.seed(
            "u1",
            vec![
                row("food_priority", "high", 0.8, 1),
                row("culture_priority", "low", 0.1, 1),
            ],
            1,
        );

        let snapshot = f
            .resolver
            .effective_persona("u1", None, Some("paris"))
            .await
            .unwrap();

        // Strong user evidence wins outright.
        assert_eq!(snapshot.dimensions["food_priority"].value, "high");
        assert_eq!(
            snapshot.dimensions["food_priority"].source,
            PersonaSource::BehavioralEma
        );
        // Weak culture evidence (0.1) loses to the injected prior (0.1275).
        assert_eq!(
            snapshot.dimensions["culture_priority"].source,
            PersonaSource::DestinationPrior
        );
        assert_eq!(snapshot.dimensions["culture_priority"].value, "high");
        // Paris shopping prior fills the missing dimension.
        assert_eq!(
            snapshot.dimensions["shopping_priority"].source,
            PersonaSource::DestinationPrior
        );
        assert_eq!(
            snapshot.source_breakdown["shopping_priority"],
            PersonaSource::DestinationPrior
        );
    }

    #[tokio::test]
    async fn test_cold_start_blocks_priors_only_below_gate() {
        // Cold-start defaults sit at 0.5 confidence, above the gate, so a
        // city slug must not replace any onboarding value.
        let f = fixture();
        let snapshot = f
            .resolver
            .effective_persona("u1", None, Some("paris"))
            .await
            .unwrap();

        assert!(DIMENSION_DEFAULT >= CONFIDENCE_GATE);
        for name in TRACKED_DIMENSIONS {
            assert_eq!(snapshot.dimensions[name].source, PersonaSource::Onboarding);
        }
    }

    #[tokio::test]
    async fn test_negative_tags_merge_strongest() {
        let f = fixture();
        let mut first = row("food_priority", "high", 0.8, 1);
        first.negative_tag_affinities =
            HashMap::from([("crowded".to_string(), -0.3), ("touristy".to_string(), -0.5)]);
        let mut second = row("culture_priority", "balanced", 0.6, 1);
        second.negative_tag_affinities = HashMap::from([("crowded".to_string(), -0.7)]);
        f.store.seed("u1", vec![first, second], 1);

        let snapshot = f
            .resolver
            .effective_persona("u1", None, None)
            .await
            .unwrap();

        assert_eq!(snapshot.negative_tag_affinities["crowded"], -0.7);
        assert_eq!(snapshot.negative_tag_affinities["touristy"], -0.5);
    }

    #[tokio::test]
    async fn test_confidence_is_mean_of_dimensions() {
        let f = fixture();
        f.store.seed(
            "u1",
            vec![
                row("food_priority", "high", 0.9, 1),
                row("culture_priority", "low", 0.5, 1),
            ],
            1,
        );

        let snapshot = f
            .resolver
            .effective_persona("u1", None, None)
            .await
            .unwrap();

        assert!((snapshot.confidence - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_custom_blend_is_invoked() {
        struct PinningBlend;

        #[async_trait]
        impl CollaborativeBlend for PinningBlend {
            async fn blend(
                &self,
                _user_id: &str,
                mut signals: Vec<DimensionSignal>,
            ) -> Vec<DimensionSignal> {
                signals.push(DimensionSignal::new(
                    "nightlife_priority",
                    1.0,
                    0.99,
                    PersonaSource::CfBlend,
                ));
                signals
            }
        }

        let backend = Arc::new(MemoryCacheBackend::new());
        let store = Arc::new(MemoryPersonaStore::new());
        let resolver = EffectivePersonaResolver::with_blend(
            store.clone(),
            TripPersonaCache::new(backend),
            Arc::new(PinningBlend),
        );

        let snapshot = resolver.effective_persona("u1", None, None).await.unwrap();
        assert_eq!(
            snapshot.dimensions["nightlife_priority"].source,
            PersonaSource::CfBlend
        );
        assert_eq!(snapshot.dimensions["nightlife_priority"].value, "high");
    }

    #[tokio::test]
    async fn test_no_trip_id_never_queries_version_oracle() {
        let f = fixture();
        f.store.set_version_reads_failing(true);
        f.store.seed("u1", vec![row("food_priority", "high", 0.8, 1)], 1);

        // Would log (and in stricter designs fail) if the oracle ran.
        let snapshot = f
            .resolver
            .effective_persona("u1", None, None)
            .await
            .unwrap();
        assert!(!snapshot.cache_hit);
    }
}
