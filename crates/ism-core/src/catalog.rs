//! Local index catalog: the measured properties transition conditions are
//! evaluated against, plus the flags simulated actions flip.

use crate::error::{IsmError, Result};
use crate::paths::validate_index_name;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// IndexFacts / IndexStats
// ---------------------------------------------------------------------------

/// Measured properties of one index at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFacts {
    pub creation_date: DateTime<Utc>,
    pub doc_count: u64,
    pub size_bytes: u64,
}

impl IndexFacts {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.creation_date
    }
}

/// Source of measured index properties.
pub trait IndexStats: Send + Sync {
    fn facts(&self, index: &str) -> Option<IndexFacts>;
}

// ---------------------------------------------------------------------------
// IndexRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub name: String,
    pub uuid: String,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_replicas")]
    pub number_of_replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<u32>,
    /// Write alias a rollover swaps onto the new index. Rollover needs it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollover_alias: Option<String>,
    /// Actions that fail whenever they run against this index.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub fail_actions: BTreeSet<String>,
}

fn default_replicas() -> u32 {
    1
}

impl IndexRecord {
    pub fn new(name: impl Into<String>, creation_date: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4().to_string(),
            creation_date,
            doc_count: 0,
            size_bytes: 0,
            closed: false,
            read_only: false,
            number_of_replicas: default_replicas(),
            priority: None,
            segments: None,
            rollover_alias: None,
            fail_actions: BTreeSet::new(),
        }
    }

    pub fn facts(&self) -> IndexFacts {
        IndexFacts {
            creation_date: self.creation_date,
            doc_count: self.doc_count,
            size_bytes: self.size_bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// IndexCatalog
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct IndexCatalog {
    indices: RwLock<BTreeMap<String, IndexRecord>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    indices: BTreeMap<String, IndexRecord>,
}

impl IndexCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: IndexRecord) -> Result<IndexRecord> {
        validate_index_name(&record.name)?;
        let mut indices = self.indices.write();
        if indices.contains_key(&record.name) {
            return Err(IsmError::AlreadyExists {
                kind: "index",
                id: record.name,
            });
        }
        indices.insert(record.name.clone(), record.clone());
        Ok(record)
    }

    pub fn create(&self, name: &str, now: DateTime<Utc>) -> Result<IndexRecord> {
        self.insert(IndexRecord::new(name, now))
    }

    pub fn get(&self, name: &str) -> Result<IndexRecord> {
        self.indices
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| IsmError::index_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.read().contains_key(name)
    }

    pub fn update<T>(&self, name: &str, f: impl FnOnce(&mut IndexRecord) -> T) -> Result<T> {
        let mut indices = self.indices.write();
        let record = indices
            .get_mut(name)
            .ok_or_else(|| IsmError::index_not_found(name))?;
        Ok(f(record))
    }

    pub fn remove(&self, name: &str) -> Result<IndexRecord> {
        self.indices
            .write()
            .remove(name)
            .ok_or_else(|| IsmError::index_not_found(name))
    }

    pub fn list(&self) -> Vec<IndexRecord> {
        self.indices.read().values().cloned().collect()
    }

    /// Load a YAML snapshot. A missing file yields an empty catalog.
    pub fn load(path: &Path) -> Result<Self> {
        let indices = crate::io::load_yaml::<Snapshot>(path)?
            .map(|s| s.indices)
            .unwrap_or_default();
        Ok(Self {
            indices: RwLock::new(indices),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            indices: self.indices.read().clone(),
        };
        crate::io::save_yaml(path, &snapshot)
    }
}

impl IndexStats for IndexCatalog {
    fn facts(&self, index: &str) -> Option<IndexFacts> {
        self.indices.read().get(index).map(IndexRecord::facts)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
