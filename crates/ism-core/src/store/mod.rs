//! Versioned policy storage.
//!
//! Every document carries a `(seq_no, primary_term)` pair. Updates must
//! present the pair they last read; a mismatch is a `VersionConflict` and is
//! never retried here, because the caller may need to show the newer content
//! before deciding what to write.

pub mod memory;
pub mod redb_store;

pub use self::memory::MemoryPolicyStore;
pub use self::redb_store::RedbPolicyStore;

use crate::error::{IsmError, Result};
use crate::policy::Policy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocVersion {
    pub seq_no: u64,
    pub primary_term: u64,
}

impl DocVersion {
    pub fn new(seq_no: u64, primary_term: u64) -> Self {
        Self {
            seq_no,
            primary_term,
        }
    }

    /// Combine the loosely-passed pair into an optional version. Both absent
    /// means "create"; exactly one present is malformed.
    pub fn from_parts(seq_no: Option<u64>, primary_term: Option<u64>) -> Result<Option<Self>> {
        match (seq_no, primary_term) {
            (None, None) => Ok(None),
            (Some(s), Some(t)) => Ok(Some(Self::new(s, t))),
            _ => Err(IsmError::validation(
                "seq_no and primary_term must be provided together",
            )),
        }
    }

    /// Whether `self` was produced by a later write than `other`.
    pub fn is_newer_than(&self, other: &DocVersion) -> bool {
        (self.primary_term, self.seq_no) > (other.primary_term, other.seq_no)
    }
}

impl fmt::Display for DocVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq_no={} primary_term={}", self.seq_no, self.primary_term)
    }
}

/// A stored policy as persisted and returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    pub id: String,
    #[serde(flatten)]
    pub version: DocVersion,
    pub last_updated_time: DateTime<Utc>,
    pub policy: Policy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutOutcome {
    pub id: String,
    #[serde(flatten)]
    pub version: DocVersion,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySortField {
    #[default]
    Id,
    Description,
    LastUpdatedTime,
}

impl FromStr for PolicySortField {
    type Err = IsmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "id" => Ok(PolicySortField::Id),
            "description" => Ok(PolicySortField::Description),
            "last_updated_time" | "last-updated-time" => Ok(PolicySortField::LastUpdatedTime),
            _ => Err(IsmError::validation(format!("unknown sort field '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub from: usize,
    #[serde(default = "default_page_size")]
    pub size: usize,
    #[serde(default)]
    pub sort_field: PolicySortField,
    #[serde(default)]
    pub sort_direction: SortDirection,
}

fn default_page_size() -> usize {
    20
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            from: 0,
            size: default_page_size(),
            sort_field: PolicySortField::default(),
            sort_direction: SortDirection::default(),
        }
    }
}

impl SearchQuery {
    /// Every whitespace-separated term must occur in the id or description
    /// (case-insensitive). An empty query matches everything.
    pub fn matches(&self, doc: &PolicyDocument) -> bool {
        let haystack = format!("{} {}", doc.id, doc.policy.description).to_lowercase();
        self.query
            .split_whitespace()
            .all(|term| haystack.contains(&term.to_lowercase()))
    }

    fn compare(&self, a: &PolicyDocument, b: &PolicyDocument) -> Ordering {
        let ord = match self.sort_field {
            PolicySortField::Id => a.id.cmp(&b.id),
            PolicySortField::Description => a
                .policy
                .description
                .cmp(&b.policy.description)
                .then_with(|| a.id.cmp(&b.id)),
            PolicySortField::LastUpdatedTime => a
                .last_updated_time
                .cmp(&b.last_updated_time)
                .then_with(|| a.id.cmp(&b.id)),
        };
        match self.sort_direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub total: usize,
    pub items: Vec<PolicyDocument>,
}

/// Filter, sort, then paginate.
pub fn paginate(docs: Vec<PolicyDocument>, query: &SearchQuery) -> Page {
    let mut hits: Vec<PolicyDocument> = docs.into_iter().filter(|d| query.matches(d)).collect();
    hits.sort_by(|a, b| query.compare(a, b));
    let total = hits.len();
    let items = hits.into_iter().skip(query.from).take(query.size).collect();
    Page { total, items }
}

// ---------------------------------------------------------------------------
// PolicyStore
// ---------------------------------------------------------------------------

pub trait PolicyStore: Send + Sync {
    fn get(&self, id: &str) -> Result<PolicyDocument>;

    /// Create (`if_version == None`) or compare-and-swap update a policy.
    fn put(&self, id: &str, policy: Policy, if_version: Option<DocVersion>) -> Result<PutOutcome>;

    fn delete(&self, id: &str) -> Result<()>;

    fn list(&self) -> Result<Vec<PolicyDocument>>;

    fn search(&self, query: &SearchQuery) -> Result<Page> {
        Ok(paginate(self.list()?, query))
    }

    /// `put` taking the version as two loose optional halves.
    fn put_with(
        &self,
        id: &str,
        policy: Policy,
        seq_no: Option<u64>,
        primary_term: Option<u64>,
    ) -> Result<PutOutcome> {
        let if_version = DocVersion::from_parts(seq_no, primary_term)?;
        self.put(id, policy, if_version)
    }
}

/// Shared write rule for every backend: validate, then check the stored
/// version against the presented one.
pub(crate) fn check_put(
    id: &str,
    policy: &Policy,
    existing: Option<&PolicyDocument>,
    if_version: Option<DocVersion>,
) -> Result<()> {
    if id.trim().is_empty() {
        return Err(IsmError::validation("policy id must not be empty"));
    }
    policy.validate()?;

    match (existing, if_version) {
        (Some(_), None) => Err(IsmError::AlreadyExists {
            kind: "policy",
            id: id.to_string(),
        }),
        (None, Some(_)) => Err(IsmError::policy_not_found(id)),
        (Some(doc), Some(expected)) if doc.version != expected => Err(IsmError::VersionConflict {
            id: id.to_string(),
            expected_seq_no: expected.seq_no,
            expected_primary_term: expected.primary_term,
            actual_seq_no: doc.version.seq_no,
            actual_primary_term: doc.version.primary_term,
        }),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
