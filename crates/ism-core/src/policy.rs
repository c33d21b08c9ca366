//! Policy document model: states, ordered actions, conditional transitions.
//!
//! Actions are a closed sum type. The JSON shape follows the index state
//! management convention of a single object holding the action type key plus
//! the shared `timeout` / `retry` keys:
//!
//! ```json
//! { "timeout": "1h", "retry": { "count": 3 }, "rollover": { "min_doc_count": 100 } }
//! ```
//!
//! Anything that does not parse into one of the known action kinds is rejected
//! when the policy is parsed, never when it executes.

use crate::error::{IsmError, Result};
use crate::units::{ByteSize, TimeValue};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    #[serde(default)]
    pub description: String,
    pub default_state: String,
    pub states: Vec<State>,
}

impl Policy {
    /// Parse a policy from JSON. Accepts either the bare policy object or the
    /// `{ "policy": { ... } }` envelope used by the policy editor.
    pub fn from_json(data: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(data)?;
        let inner = match value {
            Value::Object(mut map) if map.len() == 1 && map.contains_key("policy") => map
                .remove("policy")
                .unwrap_or(Value::Null),
            other => other,
        };
        let policy: Policy = serde_json::from_value(inner)
            .map_err(|e| IsmError::validation(format!("malformed policy: {e}")))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.state(name).is_some()
    }

    pub fn state_names(&self) -> BTreeSet<String> {
        self.states.iter().map(|s| s.name.clone()).collect()
    }

    /// Check the structural invariants of the policy graph.
    pub fn validate(&self) -> Result<()> {
        if self.states.is_empty() {
            return Err(IsmError::validation("policy must declare at least one state"));
        }

        let mut seen = HashSet::new();
        for state in &self.states {
            if state.name.trim().is_empty() {
                return Err(IsmError::validation("state names must not be empty"));
            }
            if !seen.insert(state.name.as_str()) {
                return Err(IsmError::validation(format!(
                    "duplicate state name '{}'",
                    state.name
                )));
            }
        }

        if !self.has_state(&self.default_state) {
            return Err(IsmError::validation(format!(
                "default_state '{}' is not one of the policy's states",
                self.default_state
            )));
        }

        for state in &self.states {
            for action in &state.actions {
                action.validate().map_err(|e| {
                    IsmError::validation(format!("state '{}': {}", state.name, e.into_reason()))
                })?;
            }

            let last = state.transitions.len().saturating_sub(1);
            for (i, transition) in state.transitions.iter().enumerate() {
                if !seen.contains(transition.state_name.as_str()) {
                    return Err(IsmError::validation(format!(
                        "state '{}' transitions to unknown state '{}'",
                        state.name, transition.state_name
                    )));
                }
                if transition.is_unconditional() && i != last {
                    return Err(IsmError::validation(format!(
                        "state '{}': unconditional transition to '{}' must be the last transition",
                        state.name, transition.state_name
                    )));
                }
                if let Some(conditions) = &transition.conditions {
                    conditions.validate().map_err(|e| {
                        IsmError::validation(format!("state '{}': {}", state.name, e.into_reason()))
                    })?;
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// State / Transition / Conditions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct State {
    pub name: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl State {
    /// A state with nothing to run and nowhere to go.
    pub fn is_terminal(&self) -> bool {
        self.actions.is_empty() && self.transitions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transition {
    pub state_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,
}

impl Transition {
    pub fn is_unconditional(&self) -> bool {
        self.conditions.as_ref().map_or(true, Conditions::is_empty)
    }
}

/// Transition conditions. Every condition present must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_index_age: Option<TimeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_doc_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<ByteSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<CronCondition>,
}

impl Conditions {
    pub fn is_empty(&self) -> bool {
        self.min_index_age.is_none()
            && self.min_doc_count.is_none()
            && self.min_size.is_none()
            && self.cron.is_none()
    }

    fn validate(&self) -> Result<()> {
        if let Some(cron) = &self.cron {
            cron.cron.schedule()?;
            cron.cron.timezone()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CronCondition {
    pub cron: CronExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CronExpression {
    pub expression: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl CronExpression {
    /// Parse the expression. Classic five-field expressions get a leading
    /// seconds field.
    pub fn schedule(&self) -> Result<cron::Schedule> {
        let expr = self.expression.trim();
        let normalized = if expr.split_whitespace().count() == 5 {
            format!("0 {expr}")
        } else {
            expr.to_string()
        };
        cron::Schedule::from_str(&normalized).map_err(|e| {
            IsmError::validation(format!("invalid cron expression '{}': {e}", self.expression))
        })
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| IsmError::validation(format!("invalid timezone '{}'", self.timezone)))
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Constant,
    #[default]
    Linear,
    Exponential,
}

impl fmt::Display for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backoff::Constant => "constant",
            Backoff::Linear => "linear",
            Backoff::Exponential => "exponential",
        })
    }
}

/// Per-action retry override. Missing fields fall back to the engine config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionRetry {
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<Backoff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<TimeValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Action {
    pub timeout: Option<TimeValue>,
    pub retry: Option<ActionRetry>,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            timeout: None,
            retry: None,
            kind,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn validate(&self) -> Result<()> {
        match &self.kind {
            ActionKind::ForceMerge(p) if p.max_num_segments == 0 => Err(IsmError::validation(
                "force_merge.max_num_segments must be greater than 0",
            )),
            ActionKind::Snapshot(p) if p.repository.trim().is_empty() => Err(
                IsmError::validation("snapshot.repository must not be empty"),
            ),
            ActionKind::Snapshot(p) if p.snapshot.trim().is_empty() => {
                Err(IsmError::validation("snapshot.snapshot must not be empty"))
            }
            ActionKind::Notification(p) if p.destination.is_empty() => Err(
                IsmError::validation("notification.destination must not be empty"),
            ),
            _ => Ok(()),
        }
    }
}

impl TryFrom<Map<String, Value>> for Action {
    type Error = IsmError;

    fn try_from(mut map: Map<String, Value>) -> Result<Self> {
        let timeout = map
            .remove("timeout")
            .map(serde_json::from_value::<TimeValue>)
            .transpose()
            .map_err(|e| IsmError::validation(format!("invalid action timeout: {e}")))?;
        let retry = map
            .remove("retry")
            .map(serde_json::from_value::<ActionRetry>)
            .transpose()
            .map_err(|e| IsmError::validation(format!("invalid action retry: {e}")))?;

        match map.len() {
            0 => return Err(IsmError::validation("action has no type")),
            1 => {}
            _ => {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                return Err(IsmError::validation(format!(
                    "action declares more than one type: {}",
                    keys.join(", ")
                )));
            }
        }

        let kind: ActionKind = serde_json::from_value(Value::Object(map))
            .map_err(|e| IsmError::validation(format!("invalid action: {e}")))?;
        Ok(Self {
            timeout,
            retry,
            kind,
        })
    }
}

#[derive(Serialize)]
struct ActionRepr<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: &'a Option<TimeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry: &'a Option<ActionRetry>,
    #[serde(flatten)]
    kind: &'a ActionKind,
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        ActionRepr {
            timeout: &self.timeout,
            retry: &self.retry,
            kind: &self.kind,
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Rollover(RolloverParams),
    Delete(NoParams),
    Close(NoParams),
    Open(NoParams),
    ReadOnly(NoParams),
    ReadWrite(NoParams),
    ReplicaCount(ReplicaCountParams),
    ForceMerge(ForceMergeParams),
    IndexPriority(IndexPriorityParams),
    Snapshot(SnapshotParams),
    Notification(NotificationParams),
    Allocation(AllocationParams),
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Rollover(_) => "rollover",
            ActionKind::Delete(_) => "delete",
            ActionKind::Close(_) => "close",
            ActionKind::Open(_) => "open",
            ActionKind::ReadOnly(_) => "read_only",
            ActionKind::ReadWrite(_) => "read_write",
            ActionKind::ReplicaCount(_) => "replica_count",
            ActionKind::ForceMerge(_) => "force_merge",
            ActionKind::IndexPriority(_) => "index_priority",
            ActionKind::Snapshot(_) => "snapshot",
            ActionKind::Notification(_) => "notification",
            ActionKind::Allocation(_) => "allocation",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolloverParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<ByteSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_doc_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_index_age: Option<TimeValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicaCountParams {
    pub number_of_replicas: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForceMergeParams {
    pub max_num_segments: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexPriorityParams {
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotParams {
    pub repository: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationParams {
    pub destination: Map<String, Value>,
    pub message_template: MessageTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageTemplate {
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationParams {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub require: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub include: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exclude: BTreeMap<String, String>,
    #[serde(default)]
    pub wait_for: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
