//! # TripWeaver Persona
//!
//! Effective-persona resolution and multi-tier persona cache for the
//! TripWeaver itinerary engine.
//!
//! Given a user (optionally scoped to a trip), this crate decides their
//! current behavioral/preference profile by reconciling four layers of
//! increasingly stale or generic data: an ephemeral per-session accumulator
//! (L1), a trip-scoped cache (L2), a collaborative-filtering extension
//! point, and static city-level priors. The durable persona store stays
//! canonical and external; everything cached here is disposable and
//! eventually consistent, and cache failures never block resolution.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod prior;
pub mod resolver;
pub mod session;
pub mod store;
pub mod trip_cache;

pub use cache::{CacheBackend, MemoryCacheBackend};
pub use error::{CacheError, PersonaError, StoreError};
pub use model::{
    DimensionSignal, DimensionValue, PersonaSnapshot, PersonaSource, RankingPersona,
    SessionDeltaRecord, SignalDirection, TripCacheRecord, TripPhase,
};
pub use prior::{apply_destination_prior, CityPrior};
pub use resolver::{CollaborativeBlend, EffectivePersonaResolver, IdentityBlend};
pub use session::SessionPersonaDelta;
pub use store::{MemoryPersonaStore, PersonaDimensionRow, PersonaStore};
pub use trip_cache::TripPersonaCache;

/// Library version.
pub const VERSION: &str = "0.4.2";
