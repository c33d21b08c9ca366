use super::{now_or, Workspace};
use crate::output::print_bulk;
use chrono::{DateTime, Utc};
use ism_core::change::{ChangePolicyCoordinator, StateFilter};
use std::path::Path;

pub fn run(
    root: &Path,
    indices: &[String],
    policy_id: &str,
    state: Option<&str>,
    include: &[String],
    at: Option<DateTime<Utc>>,
    json: bool,
) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    let include: Vec<StateFilter> = include
        .iter()
        .map(|s| StateFilter { state: s.clone() })
        .collect();
    let result = ChangePolicyCoordinator::new(&ws.store, &ws.registry, &ws.notifier)
        .change_policy(indices, policy_id, state, &include, now_or(at))?;
    ws.save()?;
    print_bulk("change policy", &result, json)
}
