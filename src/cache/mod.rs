//! Key-value cache backend abstraction.
//!
//! Both cache tiers (session deltas and trip personas) store flat
//! string-hash entries behind the [`CacheBackend`] trait. The trait exposes
//! only per-key atomic operations; no cross-key transactions or server-side
//! scripting are assumed, so any plain hash store can implement it.

pub mod backend;
pub mod memory;

pub use backend::{with_timeout, CacheBackend};
pub use memory::MemoryCacheBackend;
