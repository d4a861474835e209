//! Shared value types for persona resolution.
//!
//! Every tier speaks these types: the L1 session accumulator produces
//! [`SessionDeltaRecord`]s, the L2 trip cache stores [`TripCacheRecord`]s,
//! the destination prior and CF seam exchange [`DimensionSignal`]s, and the
//! resolver assembles everything into a [`PersonaSnapshot`].
//!
//! The cache wire format is a flat string→string field map; encoding and
//! decoding happen here and nowhere else, and malformed or unknown fields
//! are ignored at decode rather than raised.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{
    self, ADJUSTMENT_SUFFIX, DIMENSION_DEFAULT, NEGATIVE_SIGNALS, POSITIVE_SIGNALS,
    TRACKED_DIMENSIONS, VIBE_FOR_DIMENSION,
};

/// Provenance of a dimension value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaSource {
    /// Cold-start default, no user data yet.
    Onboarding,
    /// Derived from behavioral signals by the nightly batch job.
    BehavioralEma,
    /// Injected city-level baseline.
    DestinationPrior,
    /// Produced by the collaborative-filtering blend seam.
    CfBlend,
    /// Served from the L2 trip cache.
    TripCache,
}

impl PersonaSource {
    /// Stable string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaSource::Onboarding => "onboarding",
            PersonaSource::BehavioralEma => "behavioral_ema",
            PersonaSource::DestinationPrior => "destination_prior",
            PersonaSource::CfBlend => "cf_blend",
            PersonaSource::TripCache => "trip_cache",
        }
    }

    /// Decode a provenance tag from the durable store. Store rows are
    /// produced by the nightly behavioral job, so unknown tags decode to
    /// [`PersonaSource::BehavioralEma`] rather than failing the read.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "onboarding" => PersonaSource::Onboarding,
            "destination_prior" => PersonaSource::DestinationPrior,
            "cf_blend" => PersonaSource::CfBlend,
            "trip_cache" => PersonaSource::TripCache,
            _ => PersonaSource::BehavioralEma,
        }
    }
}

/// Direction of a behavioral signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDirection {
    Positive,
    Negative,
    /// Counted but applies no dimension adjustment.
    Neutral,
}

impl SignalDirection {
    /// Classify a raw signal type string. Unknown types are neutral.
    pub fn classify(signal_type: &str) -> Self {
        if POSITIVE_SIGNALS.contains(signal_type) {
            SignalDirection::Positive
        } else if NEGATIVE_SIGNALS.contains(signal_type) {
            SignalDirection::Negative
        } else {
            SignalDirection::Neutral
        }
    }

    /// Multiplicative factor for adjustment math.
    pub fn factor(&self) -> f64 {
        match self {
            SignalDirection::Positive => 1.0,
            SignalDirection::Negative => -1.0,
            SignalDirection::Neutral => 0.0,
        }
    }
}

/// Phase of the trip a signal was observed in. In-trip signals carry the
/// most weight; post-trip reflection the least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripPhase {
    PreTrip,
    Active,
    PostTrip,
}

impl TripPhase {
    /// Weight applied to signal adjustments observed in this phase.
    pub fn weight(&self) -> f64 {
        match self {
            TripPhase::PreTrip => 0.7,
            TripPhase::Active => 1.0,
            TripPhase::PostTrip => 0.4,
        }
    }
}

/// Categorical label for a dimension strength.
///
/// Strengths live in [0.05, 0.98]; below 0.35 reads "low", above 0.65 reads
/// "high", the band between is "balanced".
pub fn label_for_strength(strength: f64) -> &'static str {
    if strength < 0.35 {
        "low"
    } else if strength < 0.65 {
        "balanced"
    } else {
        "high"
    }
}

/// Categorical label for a signed direction in [-1, 1].
pub fn label_for_direction(direction: f64) -> &'static str {
    if direction <= -0.2 {
        "low"
    } else if direction >= 0.2 {
        "high"
    } else {
        "balanced"
    }
}

/// Signed direction for a categorical label. Unknown labels read neutral.
pub fn direction_for_label(label: &str) -> f64 {
    match label {
        "low" => -1.0,
        "high" => 1.0,
        _ => 0.0,
    }
}

/// Nominal strength for a categorical label, used by the ranking projection.
pub fn strength_for_label(label: &str) -> f64 {
    match label {
        "low" => 0.2,
        "high" => 0.8,
        _ => DIMENSION_DEFAULT,
    }
}

/// One resolved preference dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionValue {
    /// Categorical label ("low" / "balanced" / "high").
    pub value: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Where this value came from.
    pub source: PersonaSource,
}

impl DimensionValue {
    pub fn new(value: impl Into<String>, confidence: f64, source: PersonaSource) -> Self {
        Self {
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }

    /// Build a dimension value from a cached strength. The strength doubles
    /// as the confidence; the L2 record carries no separate confidence
    /// channel.
    pub fn from_cached_strength(strength: f64) -> Self {
        Self::new(label_for_strength(strength), strength, PersonaSource::TripCache)
    }

    /// The cold-start default served when a user has no store rows.
    pub fn cold_start() -> Self {
        Self::new("balanced", DIMENSION_DEFAULT, PersonaSource::Onboarding)
    }
}

/// Working form of one dimension's evidence, exchanged between the resolver,
/// the CF blend seam, and the destination prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSignal {
    pub dimension: String,
    /// Signed preference direction in [-1, 1].
    pub direction: f64,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub source: PersonaSource,
    /// Set on destination-prior injections: the city the prior came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_slug: Option<String>,
    /// Set on destination-prior injections: the weight applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_weight: Option<f64>,
}

impl DimensionSignal {
    pub fn new(
        dimension: impl Into<String>,
        direction: f64,
        confidence: f64,
        source: PersonaSource,
    ) -> Self {
        Self {
            dimension: dimension.into(),
            direction,
            confidence,
            source,
            city_slug: None,
            prior_weight: None,
        }
    }
}

/// Accumulated behavioral adjustments for one (user, session) pair — the L1
/// tier. Ephemeral: a 30-minute idle window destroys it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDeltaRecord {
    /// Pending adjustment per dimension, keyed by dimension name.
    pub adjustments: HashMap<String, f64>,
    /// Number of signals observed this session, directional or not.
    pub signal_count: i64,
    /// Last write time.
    pub last_updated: DateTime<Utc>,
}

impl Default for SessionDeltaRecord {
    fn default() -> Self {
        Self {
            adjustments: HashMap::new(),
            signal_count: 0,
            last_updated: Utc::now(),
        }
    }
}

impl SessionDeltaRecord {
    /// True when there is nothing to flush.
    pub fn is_empty(&self) -> bool {
        self.adjustments.is_empty() && self.signal_count == 0
    }

    /// Decode from the backend's flat field map. Unknown and malformed
    /// fields are ignored; an empty map decodes to `None` (key absent).
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        let mut record = SessionDeltaRecord {
            last_updated: Utc::now(),
            ..Default::default()
        };
        for (field, raw) in fields {
            if let Some(dimension) = field.strip_suffix(ADJUSTMENT_SUFFIX) {
                if let Ok(adjustment) = raw.parse::<f64>() {
                    record.adjustments.insert(dimension.to_string(), adjustment);
                }
            } else if field == "signal_count" {
                record.signal_count = raw.parse().unwrap_or(0);
            } else if field == "last_updated" {
                if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
                    record.last_updated = ts.with_timezone(&Utc);
                }
            }
        }
        Some(record)
    }
}

/// Cached full persona for one (user, trip) pair — the L2 tier. Durable
/// within the trip: it lives until `end_date + 48h` or invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripCacheRecord {
    /// Current strength per dimension, clamped to [0.05, 0.98].
    pub dimensions: HashMap<String, f64>,
    /// Version stamped by the last durable-store sync.
    pub nightly_sync_version: i64,
    /// Signals merged in since that sync.
    pub signal_count_since_nightly: i64,
    /// Last write time.
    pub last_updated: DateTime<Utc>,
}

impl TripCacheRecord {
    /// Decode from the backend's flat field map. A payload without a
    /// parseable `nightly_sync_version` is malformed and decodes to `None`;
    /// unknown dimension fields are dropped.
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        let nightly_sync_version = fields.get("nightly_sync_version")?.parse().ok()?;
        let mut dimensions = HashMap::new();
        for name in TRACKED_DIMENSIONS {
            if let Some(raw) = fields.get(name) {
                if let Ok(strength) = raw.parse::<f64>() {
                    dimensions.insert(name.to_string(), strength);
                }
            }
        }
        let signal_count_since_nightly = fields
            .get("signal_count_since_nightly")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let last_updated = fields
            .get("last_updated")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Some(TripCacheRecord {
            dimensions,
            nightly_sync_version,
            signal_count_since_nightly,
            last_updated,
        })
    }

    /// Encode to the backend's flat field map.
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        for (dimension, strength) in &self.dimensions {
            fields.insert(dimension.clone(), config::round4(*strength).to_string());
        }
        fields.insert(
            "nightly_sync_version".to_string(),
            self.nightly_sync_version.to_string(),
        );
        fields.insert(
            "signal_count_since_nightly".to_string(),
            self.signal_count_since_nightly.to_string(),
        );
        fields.insert("last_updated".to_string(), self.last_updated.to_rfc3339());
        fields
    }
}

/// The resolved persona returned to ranking and generation consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSnapshot {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    /// Resolved value per dimension.
    pub dimensions: HashMap<String, DimensionValue>,
    /// Tags the user avoids, each in [-1, 0].
    pub negative_tag_affinities: HashMap<String, f64>,
    /// Provenance per dimension.
    pub source_breakdown: HashMap<String, PersonaSource>,
    /// Mean of dimension confidences; 0.5 when empty.
    pub confidence: f64,
    /// True when served from the L2 cache without a store dimension read.
    pub cache_hit: bool,
    pub resolved_at: DateTime<Utc>,
}

impl PersonaSnapshot {
    /// Mean dimension confidence, defaulting to 0.5 for an empty set.
    pub fn mean_confidence(dimensions: &HashMap<String, DimensionValue>) -> f64 {
        if dimensions.is_empty() {
            return DIMENSION_DEFAULT;
        }
        let total: f64 = dimensions.values().map(|d| d.confidence).sum();
        total / dimensions.len() as f64
    }

    /// Flattened ranking-oriented projection. Ranking consumers never read
    /// persona tables directly; they see either this or the full snapshot.
    pub fn ranking_view(&self) -> RankingPersona {
        let mut vibes: Vec<String> = self
            .dimensions
            .iter()
            .filter(|(_, value)| value.value == "high")
            .filter_map(|(name, _)| VIBE_FOR_DIMENSION.get(name.as_str()))
            .map(|vibe| vibe.to_string())
            .collect();
        vibes.sort();

        let label_of = |dimension: &str| -> String {
            self.dimensions
                .get(dimension)
                .map(|d| d.value.clone())
                .unwrap_or_else(|| "balanced".to_string())
        };
        let pace = match label_of("pace_preference").as_str() {
            "low" => "relaxed",
            "high" => "packed",
            _ => "moderate",
        };
        let budget = match label_of("budget_sensitivity").as_str() {
            "low" => "premium",
            "high" => "budget",
            _ => "mid_range",
        };

        RankingPersona {
            vibes,
            pace: pace.to_string(),
            budget: budget.to_string(),
            dimensions: self
                .dimensions
                .iter()
                .map(|(name, value)| (name.clone(), strength_for_label(&value.value)))
                .collect(),
            negative_tags: self.negative_tag_affinities.clone(),
        }
    }
}

/// Flattened persona projection consumed by the ranking pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingPersona {
    pub vibes: Vec<String>,
    pub pace: String,
    pub budget: String,
    pub dimensions: HashMap<String, f64>,
    pub negative_tags: HashMap<String, f64>,
}
