//! In-memory persona store for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{PersonaDimensionRow, PersonaStore};

#[derive(Debug, Clone, Default)]
struct StoredPersona {
    rows: Vec<PersonaDimensionRow>,
    version: i64,
}

/// RwLock-guarded map standing in for the relational store. Each read path
/// can be failed independently, mirroring the partial-failure modes the
/// resolver must survive.
#[derive(Debug, Default)]
pub struct MemoryPersonaStore {
    users: RwLock<HashMap<String, StoredPersona>>,
    fail_dimension_reads: AtomicBool,
    fail_version_reads: AtomicBool,
    dimension_reads: AtomicUsize,
}

impl MemoryPersonaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user's canonical rows and version, replacing any prior state.
    pub fn seed(&self, user_id: &str, rows: Vec<PersonaDimensionRow>, version: i64) {
        if let Ok(mut users) = self.users.write() {
            users.insert(user_id.to_string(), StoredPersona { rows, version });
        }
    }

    /// While set, `load_dimensions` fails with a query error.
    pub fn set_dimension_reads_failing(&self, failing: bool) {
        self.fail_dimension_reads.store(failing, Ordering::SeqCst);
    }

    /// While set, `current_version` fails with a query error.
    pub fn set_version_reads_failing(&self, failing: bool) {
        self.fail_version_reads.store(failing, Ordering::SeqCst);
    }

    /// Number of full dimension reads served. Used to assert the cache-hit
    /// performance contract.
    pub fn dimension_reads(&self) -> usize {
        self.dimension_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersonaStore for MemoryPersonaStore {
    async fn load_dimensions(
        &self,
        user_id: &str,
    ) -> Result<Vec<PersonaDimensionRow>, StoreError> {
        if self.fail_dimension_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Query {
                message: "dimension read failure injected".to_string(),
            });
        }
        self.dimension_reads.fetch_add(1, Ordering::SeqCst);
        let users = self.users.read().map_err(|_| StoreError::Query {
            message: "store lock poisoned".to_string(),
        })?;
        Ok(users
            .get(user_id)
            .map(|persona| persona.rows.clone())
            .unwrap_or_default())
    }

    async fn current_version(&self, user_id: &str) -> Result<Option<i64>, StoreError> {
        if self.fail_version_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Query {
                message: "version read failure injected".to_string(),
            });
        }
        let users = self.users.read().map_err(|_| StoreError::Query {
            message: "store lock poisoned".to_string(),
        })?;
        Ok(users.get(user_id).map(|persona| persona.version))
    }
}
