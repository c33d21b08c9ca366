//! Aggregation of per-index outcomes for fleet-wide operations.
//!
//! A batch where every item failed is still a successful call; the failures
//! are carried in the result, never raised.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedIndex {
    pub index_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult {
    pub updated_indices: usize,
    pub failures: bool,
    pub failed_indices: Vec<FailedIndex>,
}

impl BulkResult {
    pub fn is_clean(&self) -> bool {
        !self.failures
    }
}

/// Outcome of one index within a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub index: String,
    pub outcome: std::result::Result<(), String>,
}

impl ItemResult {
    pub fn ok(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            outcome: Ok(()),
        }
    }

    pub fn failed(index: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            outcome: Err(reason.into()),
        }
    }
}

/// Fold item outcomes into a [`BulkResult`], keeping failure order.
pub fn collect(results: Vec<ItemResult>) -> BulkResult {
    let mut report = BulkResult::default();
    for item in results {
        match item.outcome {
            Ok(()) => report.updated_indices += 1,
            Err(reason) => report.failed_indices.push(FailedIndex {
                index_name: item.index,
                reason,
            }),
        }
    }
    report.failures = !report.failed_indices.is_empty();
    report
}
