//! Durable persona store contract.
//!
//! The relational store is the canonical source of persona truth and lives
//! outside this crate; resolution only needs the two reads declared on
//! [`PersonaStore`]. The store's batch updater owns the write path and must
//! call [`crate::trip_cache::TripPersonaCache::invalidate`] for every active
//! trip of a user after rewriting that user's rows; that call is the only
//! write path into cache coherence.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use memory::MemoryPersonaStore;

/// One canonical persona dimension row as read from the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaDimensionRow {
    pub dimension: String,
    /// Categorical label for the dimension.
    pub value: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Provenance tag as stored; decoded via
    /// [`crate::model::PersonaSource::parse`].
    pub source: String,
    /// Tags the user avoids, each in [-1, 0]. Denormalized onto every row.
    pub negative_tag_affinities: HashMap<String, f64>,
    /// Nightly sync version this row was written under.
    pub version: i64,
}

/// Read contract the resolver expects from the durable store.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    /// Read all persona dimension rows for a user. An unknown user reads as
    /// an empty vector (cold start), not an error.
    async fn load_dimensions(&self, user_id: &str) -> Result<Vec<PersonaDimensionRow>, StoreError>;

    /// Read the user's current max nightly sync version. Cheap by contract;
    /// used as the freshness oracle for cache validation. `None` when the
    /// user has no rows yet.
    async fn current_version(&self, user_id: &str) -> Result<Option<i64>, StoreError>;
}
