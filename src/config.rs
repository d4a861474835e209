//! Static configuration for the persona subsystem.
//!
//! Tuning constants and lookup tables shared by the L1 session accumulator,
//! the L2 trip cache, the destination prior, and the resolver. Everything
//! here is process-wide static configuration; there is no runtime mutable
//! global state in this crate.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use once_cell::sync::Lazy;

/// Base step applied per directional behavioral signal, before category and
/// phase weighting.
pub const SIGNAL_STEP: f64 = 0.1;

/// Sliding lifetime of a session delta (L1). Every write re-arms it.
pub const SESSION_DELTA_TTL: Duration = Duration::from_secs(30 * 60);

/// Grace period after a trip's end date before its cache entry (L2) expires.
pub const TRIP_CACHE_GRACE_HOURS: i64 = 48;

/// Lower clamp bound for cached dimension strengths.
pub const DIMENSION_MIN: f64 = 0.05;

/// Upper clamp bound for cached dimension strengths.
pub const DIMENSION_MAX: f64 = 0.98;

/// Neutral dimension strength, used when merging a delta into a dimension
/// the cache entry does not hold yet, and as the cold-start confidence.
pub const DIMENSION_DEFAULT: f64 = 0.5;

/// Confidence at or above which a user's own signal for a dimension blocks
/// destination-prior injection.
pub const CONFIDENCE_GATE: f64 = 0.3;

/// Weight applied to a city prior's confidence before injection.
pub const PRIOR_WEIGHT: f64 = 0.15;

/// Network timeout for a single cache backend call. A timeout degrades to a
/// miss/no-op exactly like any other cache error.
pub const CACHE_OP_TIMEOUT: Duration = Duration::from_millis(250);

/// Key prefix for session delta (L1) hashes.
pub const SESSION_DELTA_PREFIX: &str = "session_delta";

/// Key prefix for trip persona (L2) hashes.
pub const TRIP_PERSONA_PREFIX: &str = "trip_persona";

/// Suffix distinguishing adjustment fields in a session delta hash.
pub const ADJUSTMENT_SUFFIX: &str = "_adj";

/// The tracked preference dimensions. This is also the cold-start default
/// table: a user with no durable-store rows is served one neutral value per
/// entry.
pub const TRACKED_DIMENSIONS: [&str; 7] = [
    "food_priority",      // dining as a trip focus
    "culture_priority",   // museums, galleries, historic sites
    "nightlife_priority", // bars, clubs, late-night venues
    "outdoor_priority",   // parks, hikes, beaches
    "shopping_priority",  // markets and boutiques
    "pace_preference",    // slots per day tolerance
    "budget_sensitivity", // price-level aversion
];

/// Signal types that express positive intent toward a slot or activity.
pub static POSITIVE_SIGNALS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["slot_confirm", "slot_swap_in", "bookmark_add", "rating_up"]
        .into_iter()
        .collect()
});

/// Signal types that express rejection or avoidance.
pub static NEGATIVE_SIGNALS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["slot_skip", "slot_swap_out", "bookmark_remove", "rating_down"]
        .into_iter()
        .collect()
});

/// Maps an activity category to the dimensions it moves, with per-dimension
/// weights. A category may fan out to more than one dimension.
pub static CATEGORY_DIMENSION_WEIGHTS: Lazy<HashMap<&'static str, Vec<(&'static str, f64)>>> =
    Lazy::new(|| {
        let mut m: HashMap<&'static str, Vec<(&'static str, f64)>> = HashMap::new();
        m.insert("restaurant", vec![("food_priority", 1.0)]);
        m.insert("cafe", vec![("food_priority", 0.6)]);
        m.insert("street_food", vec![("food_priority", 0.8)]);
        m.insert("museum", vec![("culture_priority", 1.0)]);
        m.insert("gallery", vec![("culture_priority", 0.8)]);
        m.insert(
            "landmark",
            vec![("culture_priority", 0.5), ("outdoor_priority", 0.3)],
        );
        m.insert("bar", vec![("nightlife_priority", 1.0)]);
        m.insert("club", vec![("nightlife_priority", 1.0)]);
        m.insert("live_music", vec![("nightlife_priority", 0.7)]);
        m.insert("park", vec![("outdoor_priority", 1.0)]);
        m.insert(
            "hike",
            vec![("outdoor_priority", 1.0), ("pace_preference", 0.3)],
        );
        m.insert("beach", vec![("outdoor_priority", 0.8)]);
        m.insert(
            "market",
            vec![("shopping_priority", 0.8), ("food_priority", 0.4)],
        );
        m.insert("boutique", vec![("shopping_priority", 1.0)]);
        m
    });

/// Vibe tag surfaced to ranking consumers when a dimension reads "high".
pub static VIBE_FOR_DIMENSION: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("food_priority", "foodie");
    m.insert("culture_priority", "culture");
    m.insert("nightlife_priority", "nightlife");
    m.insert("outdoor_priority", "outdoors");
    m.insert("shopping_priority", "shopping");
    m
});

/// Clamp a dimension strength into the valid cached range.
pub fn clamp_dimension(value: f64) -> f64 {
    value.clamp(DIMENSION_MIN, DIMENSION_MAX)
}

/// Round to 4 decimal places, the precision used for injected prior
/// confidences and cache-encoded floats.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
