//! Per-index runtime metadata.
//!
//! The map of entries sits behind a `RwLock`; each entry has its own
//! `Mutex`, so read-modify-write cycles on one index are serialized while
//! different indices never contend beyond the brief map lookup.

use crate::error::{IsmError, Result};
use crate::managed::{ManagedIndex, ManagedIndexItem, ManagedIndexMetaData};
use crate::store::{PolicyDocument, SortDirection};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Managed-index search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedIndexSortField {
    #[default]
    Index,
    PolicyId,
}

impl FromStr for ManagedIndexSortField {
    type Err = IsmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "index" => Ok(ManagedIndexSortField::Index),
            "policy_id" | "policyId" | "policy-id" => Ok(ManagedIndexSortField::PolicyId),
            _ => Err(IsmError::validation(format!("unknown sort field '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedIndexQuery {
    /// Whitespace-separated terms, each matched anywhere in the index name.
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub from: usize,
    #[serde(default = "default_page_size")]
    pub size: usize,
    #[serde(default)]
    pub sort_field: ManagedIndexSortField,
    #[serde(default = "ascending")]
    pub sort_direction: SortDirection,
}

fn default_page_size() -> usize {
    20
}

fn ascending() -> SortDirection {
    SortDirection::Asc
}

impl Default for ManagedIndexQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            from: 0,
            size: default_page_size(),
            sort_field: ManagedIndexSortField::default(),
            sort_direction: SortDirection::Asc,
        }
    }
}

impl ManagedIndexQuery {
    fn matches(&self, item: &ManagedIndexItem) -> bool {
        let name = item.index.to_lowercase();
        self.search
            .split_whitespace()
            .all(|term| name.contains(&term.to_lowercase()))
    }

    fn compare(&self, a: &ManagedIndexItem, b: &ManagedIndexItem) -> Ordering {
        let ord = match self.sort_field {
            ManagedIndexSortField::Index => a.index.cmp(&b.index),
            ManagedIndexSortField::PolicyId => a
                .policy_id
                .cmp(&b.policy_id)
                .then_with(|| a.index.cmp(&b.index)),
        };
        match self.sort_direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedIndexPage {
    pub total_managed_indices: usize,
    pub managed_indices: Vec<ManagedIndexItem>,
}

#[derive(Default)]
pub struct ManagedIndexRegistry {
    entries: RwLock<BTreeMap<String, Arc<Mutex<ManagedIndex>>>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    indices: BTreeMap<String, ManagedIndex>,
}

impl ManagedIndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Attach / detach
    // -----------------------------------------------------------------------

    /// Bind `doc` to `index` and place the index in the policy's default
    /// state with its first action current.
    pub fn attach(
        &self,
        index: &str,
        index_uuid: &str,
        doc: &PolicyDocument,
        now: DateTime<Utc>,
    ) -> Result<ManagedIndexMetaData> {
        doc.policy.validate()?;
        let default_state = doc.policy.state(&doc.policy.default_state).ok_or_else(|| {
            IsmError::validation(format!(
                "policy '{}' has no state named '{}'",
                doc.id, doc.policy.default_state
            ))
        })?;

        let mut metadata = ManagedIndexMetaData::new(index, index_uuid, &doc.id, doc.version);
        metadata.enter_state(default_state, now);

        let mut entries = self.entries.write();
        if entries.contains_key(index) {
            return Err(IsmError::AlreadyExists {
                kind: "managed index",
                id: index.to_string(),
            });
        }
        entries.insert(
            index.to_string(),
            Arc::new(Mutex::new(ManagedIndex {
                metadata: metadata.clone(),
                policy: doc.policy.clone(),
            })),
        );
        tracing::info!(index, policy = %doc.id, state = %doc.policy.default_state, "policy attached");
        Ok(metadata)
    }

    /// Remove an index's metadata. Returns whether anything was removed.
    pub fn detach(&self, index: &str) -> bool {
        let removed = self.entries.write().remove(index).is_some();
        if removed {
            tracing::info!(index, "policy detached");
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    fn handle(&self, index: &str) -> Option<Arc<Mutex<ManagedIndex>>> {
        self.entries.read().get(index).cloned()
    }

    pub fn contains(&self, index: &str) -> bool {
        self.entries.read().contains_key(index)
    }

    pub fn read(&self, index: &str) -> Option<ManagedIndexMetaData> {
        self.handle(index).map(|h| h.lock().metadata.clone())
    }

    pub fn entry(&self, index: &str) -> Option<ManagedIndex> {
        self.handle(index).map(|h| h.lock().clone())
    }

    pub fn item(&self, index: &str) -> Option<ManagedIndexItem> {
        self.handle(index).map(|h| ManagedIndexItem::from(&*h.lock()))
    }

    pub fn indices(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn list(&self) -> Vec<ManagedIndexItem> {
        let handles: Vec<_> = self.entries.read().values().cloned().collect();
        handles
            .iter()
            .map(|h| ManagedIndexItem::from(&*h.lock()))
            .collect()
    }

    /// Filter, sort, then paginate the fleet. `total_managed_indices`
    /// counts every match, not just the returned page.
    pub fn search(&self, query: &ManagedIndexQuery) -> ManagedIndexPage {
        let mut hits: Vec<ManagedIndexItem> =
            self.list().into_iter().filter(|i| query.matches(i)).collect();
        hits.sort_by(|a, b| query.compare(a, b));
        let total_managed_indices = hits.len();
        let managed_indices = hits
            .into_iter()
            .skip(query.from)
            .take(query.size)
            .collect();
        ManagedIndexPage {
            total_managed_indices,
            managed_indices,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    // -----------------------------------------------------------------------
    // Write
    // -----------------------------------------------------------------------

    /// Atomic read-modify-write of one index. The closure works on a copy;
    /// the copy replaces the entry only if the closure returns `Ok`.
    pub fn write<T, F>(&self, index: &str, mutation: F) -> Result<T>
    where
        F: FnOnce(&mut ManagedIndex) -> Result<T>,
    {
        let handle = self
            .handle(index)
            .ok_or_else(|| IsmError::NotManaged(index.to_string()))?;
        let mut guard = handle.lock();
        let mut draft = guard.clone();
        let out = mutation(&mut draft)?;
        *guard = draft;
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Snapshot persistence
    // -----------------------------------------------------------------------

    /// Load a YAML snapshot. A missing file yields an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let Some(snapshot) = crate::io::load_yaml::<Snapshot>(path)? else {
            return Ok(Self::new());
        };
        let entries = snapshot
            .indices
            .into_iter()
            .map(|(k, v)| (k, Arc::new(Mutex::new(v))))
            .collect();
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let handles: Vec<(String, Arc<Mutex<ManagedIndex>>)> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();
        let snapshot = Snapshot {
            indices: handles
                .into_iter()
                .map(|(k, h)| (k, h.lock().clone()))
                .collect(),
        };
        crate::io::save_yaml(path, &snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
