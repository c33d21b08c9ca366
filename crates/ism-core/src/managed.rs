//! Runtime metadata of a managed index: where it sits in its policy, what it
//! is running, and how many attempts the current action has used.

use crate::policy::{Action, Policy, State};
use crate::store::DocVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ---------------------------------------------------------------------------
// ManagedIndexStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedIndexStatus {
    Initializing,
    Running,
    Failed,
    Completed,
}

impl ManagedIndexStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ManagedIndexStatus::Initializing => "initializing",
            ManagedIndexStatus::Running => "running",
            ManagedIndexStatus::Failed => "failed",
            ManagedIndexStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ManagedIndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Metadata parts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMetaData {
    pub name: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMetaData {
    pub name: String,
    pub start_time: DateTime<Utc>,
    /// Offset into the current state's `actions`.
    pub index: usize,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub consumed_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_retry_time: Option<DateTime<Utc>>,
}

impl ActionMetaData {
    pub fn start(action: &Action, index: usize, now: DateTime<Utc>) -> Self {
        Self {
            name: action.name().to_string(),
            start_time: now,
            index,
            failed: false,
            consumed_retries: 0,
            last_retry_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInfo {
    pub failed: bool,
    pub consumed_retries: u32,
}

// ---------------------------------------------------------------------------
// ManagedIndexMetaData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedIndexMetaData {
    pub index: String,
    pub index_uuid: String,
    pub policy_id: String,
    pub policy_seq_no: u64,
    pub policy_primary_term: u64,
    #[serde(default)]
    pub policy_completed: bool,
    #[serde(default)]
    pub rolled_over: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateMetaData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionMetaData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_info: Option<RetryInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Map<String, Value>>,
}

impl ManagedIndexMetaData {
    pub fn new(
        index: impl Into<String>,
        index_uuid: impl Into<String>,
        policy_id: impl Into<String>,
        version: DocVersion,
    ) -> Self {
        Self {
            index: index.into(),
            index_uuid: index_uuid.into(),
            policy_id: policy_id.into(),
            policy_seq_no: version.seq_no,
            policy_primary_term: version.primary_term,
            policy_completed: false,
            rolled_over: false,
            transition_to: None,
            state: None,
            action: None,
            retry_info: None,
            info: None,
        }
    }

    pub fn policy_version(&self) -> DocVersion {
        DocVersion::new(self.policy_seq_no, self.policy_primary_term)
    }

    pub fn state_name(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.name.as_str())
    }

    /// Parked after exhausting an action's retry budget.
    pub fn is_failed(&self) -> bool {
        self.retry_info.is_some_and(|r| r.failed)
            || self.action.as_ref().is_some_and(|a| a.failed)
    }

    pub fn status(&self) -> ManagedIndexStatus {
        if self.state.is_none() {
            ManagedIndexStatus::Initializing
        } else if self.is_failed() {
            ManagedIndexStatus::Failed
        } else if self.policy_completed {
            ManagedIndexStatus::Completed
        } else {
            ManagedIndexStatus::Running
        }
    }

    /// Move into `state`: fresh start time, first action (if any) current,
    /// retry bookkeeping cleared. A terminal state completes the policy.
    pub fn enter_state(&mut self, state: &State, now: DateTime<Utc>) {
        self.state = Some(StateMetaData {
            name: state.name.clone(),
            start_time: now,
        });
        self.transition_to = None;
        self.action = state
            .actions
            .first()
            .map(|a| ActionMetaData::start(a, 0, now));
        self.retry_info = None;
        self.policy_completed = state.is_terminal();
    }

    pub fn set_info_message(&mut self, message: impl Into<String>) {
        self.info
            .get_or_insert_with(Map::new)
            .insert("message".to_string(), Value::String(message.into()));
    }

    pub fn info_message(&self) -> Option<&str> {
        self.info.as_ref()?.get("message")?.as_str()
    }
}

// ---------------------------------------------------------------------------
// ManagedIndex / ManagedIndexItem
// ---------------------------------------------------------------------------

/// A registry entry: the metadata plus the policy snapshot it was bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedIndex {
    pub metadata: ManagedIndexMetaData,
    pub policy: Policy,
}

/// One row of a fleet listing. `policy` is `None` when it could not be
/// resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedIndexItem {
    pub index: String,
    pub index_uuid: String,
    pub policy_id: String,
    pub policy: Option<Policy>,
    pub metadata: Option<ManagedIndexMetaData>,
}

impl ManagedIndexItem {
    pub fn status(&self) -> ManagedIndexStatus {
        self.metadata
            .as_ref()
            .map_or(ManagedIndexStatus::Initializing, ManagedIndexMetaData::status)
    }
}

impl From<&ManagedIndex> for ManagedIndexItem {
    fn from(entry: &ManagedIndex) -> Self {
        Self {
            index: entry.metadata.index.clone(),
            index_uuid: entry.metadata.index_uuid.clone(),
            policy_id: entry.metadata.policy_id.clone(),
            policy: Some(entry.policy.clone()),
            metadata: Some(entry.metadata.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
