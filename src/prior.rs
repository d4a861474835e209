//! Destination priors.
//!
//! Static city-level baseline preferences, injected only where the user's
//! own evidence is weak. The blend is pure and append-only: existing
//! signals are never removed or overwritten here; per-dimension winners are
//! chosen later by the resolver.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::config::{round4, CONFIDENCE_GATE, PRIOR_WEIGHT};
use crate::model::{DimensionSignal, PersonaSource};

/// One city-level dimension baseline.
#[derive(Debug, Clone, Copy)]
pub struct CityPrior {
    /// Signed preference direction in [-1, 1].
    pub direction: f64,
    /// Confidence of the baseline before prior weighting.
    pub confidence: f64,
}

const fn prior(direction: f64, confidence: f64) -> CityPrior {
    CityPrior {
        direction,
        confidence,
    }
}

/// City slug → dimension baselines. Curated from destination research; a
/// slug absent here leaves the user's signals untouched.
pub static DESTINATION_PRIORS: Lazy<HashMap<&'static str, Vec<(&'static str, CityPrior)>>> =
    Lazy::new(|| {
        let mut m: HashMap<&'static str, Vec<(&'static str, CityPrior)>> = HashMap::new();
        m.insert(
            "paris",
            vec![
                ("food_priority", prior(1.0, 0.9)),
                ("culture_priority", prior(1.0, 0.85)),
                ("shopping_priority", prior(0.6, 0.6)),
            ],
        );
        m.insert(
            "tokyo",
            vec![
                ("food_priority", prior(1.0, 0.92)),
                ("culture_priority", prior(0.8, 0.7)),
                ("nightlife_priority", prior(0.6, 0.65)),
                ("shopping_priority", prior(0.7, 0.7)),
            ],
        );
        m.insert(
            "rome",
            vec![
                ("culture_priority", prior(1.0, 0.95)),
                ("food_priority", prior(0.9, 0.85)),
                ("pace_preference", prior(-0.4, 0.5)),
            ],
        );
        m.insert(
            "barcelona",
            vec![
                ("food_priority", prior(0.8, 0.8)),
                ("nightlife_priority", prior(0.9, 0.8)),
                ("outdoor_priority", prior(0.6, 0.6)),
            ],
        );
        m.insert(
            "lisbon",
            vec![
                ("food_priority", prior(0.7, 0.7)),
                ("outdoor_priority", prior(0.7, 0.65)),
                ("budget_sensitivity", prior(-0.5, 0.5)),
            ],
        );
        m.insert(
            "bangkok",
            vec![
                ("food_priority", prior(1.0, 0.9)),
                ("nightlife_priority", prior(0.8, 0.75)),
                ("budget_sensitivity", prior(-0.7, 0.6)),
            ],
        );
        m.insert(
            "reykjavik",
            vec![
                ("outdoor_priority", prior(1.0, 0.95)),
                ("nightlife_priority", prior(-0.3, 0.4)),
                ("budget_sensitivity", prior(0.8, 0.7)),
            ],
        );
        m.insert(
            "new-york",
            vec![
                ("culture_priority", prior(0.8, 0.8)),
                ("food_priority", prior(0.8, 0.8)),
                ("nightlife_priority", prior(0.7, 0.7)),
                ("pace_preference", prior(0.8, 0.7)),
            ],
        );
        m
    });

/// Blend city baselines into a user's signal list.
///
/// For each dimension in the city's prior table, the user's maximum
/// confidence across their own signals decides: at or above the confidence
/// gate the prior is skipped outright, below it a weighted prior signal is
/// appended. The input is never mutated; an unknown slug returns it
/// unchanged.
pub fn apply_destination_prior(
    user_signals: &[DimensionSignal],
    city_slug: &str,
) -> Vec<DimensionSignal> {
    let mut blended = user_signals.to_vec();

    let Some(priors) = DESTINATION_PRIORS.get(city_slug) else {
        log::warn!("no destination prior table for city {city_slug}");
        return blended;
    };

    for (dimension, city_prior) in priors {
        let max_confidence = user_signals
            .iter()
            .filter(|signal| signal.dimension == *dimension)
            .map(|signal| signal.confidence)
            .fold(0.0_f64, f64::max);
        if max_confidence >= CONFIDENCE_GATE {
            continue;
        }

        let mut injected = DimensionSignal::new(
            *dimension,
            city_prior.direction,
            round4(city_prior.confidence * PRIOR_WEIGHT),
            PersonaSource::DestinationPrior,
        );
        injected.city_slug = Some(city_slug.to_string());
        injected.prior_weight = Some(PRIOR_WEIGHT);
        blended.push(injected);
    }

    blended
}
