//! Fixtures shared by unit tests across modules.

use crate::policy::Policy;
use crate::store::{DocVersion, PolicyDocument};
use chrono::{DateTime, TimeZone, Utc};

/// Ingest → Search → Delete lifecycle: rollover, then wait 30 days, then
/// delete.
pub const LIFECYCLE: &str = r#"{ "default_state": "Ingest", "states": [
    { "name": "Ingest", "actions": [{ "rollover": {} }], "transitions": [{ "state_name": "Search" }] },
    { "name": "Search", "actions": [],
      "transitions": [{ "state_name": "Delete", "conditions": { "min_index_age": "30d" } }] },
    { "name": "Delete", "actions": [{ "delete": {} }], "transitions": [] }
] }"#;

pub fn doc(id: &str, json: &str) -> PolicyDocument {
    PolicyDocument {
        id: id.to_string(),
        version: DocVersion::new(0, 1),
        last_updated_time: Utc::now(),
        policy: Policy::from_json(json).unwrap(),
    }
}

/// A policy with the given states, each with one `read_only` action and no
/// transitions.
pub fn states_policy(default_state: &str, names: &[&str]) -> Policy {
    let states: Vec<String> = names
        .iter()
        .map(|n| format!(r#"{{ "name": "{n}", "actions": [{{ "read_only": {{}} }}] }}"#))
        .collect();
    Policy::from_json(&format!(
        r#"{{ "default_state": "{default_state}", "states": [{}] }}"#,
        states.join(",")
    ))
    .unwrap()
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}
