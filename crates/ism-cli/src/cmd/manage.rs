use super::{now_or, Workspace};
use crate::output::print_bulk;
use chrono::{DateTime, Utc};
use ism_core::indices::IndexOperations;
use std::path::Path;

pub fn apply(
    root: &Path,
    policy_id: &str,
    indices: &[String],
    at: Option<DateTime<Utc>>,
    json: bool,
) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    let result = IndexOperations::new(&ws.store, &ws.registry, &ws.catalog, &ws.notifier)
        .apply_policy(indices, policy_id, now_or(at))?;
    ws.save()?;
    print_bulk("apply", &result, json)
}

pub fn remove(root: &Path, indices: &[String], json: bool) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    let result = IndexOperations::new(&ws.store, &ws.registry, &ws.catalog, &ws.notifier)
        .remove_policy(indices);
    ws.save()?;
    print_bulk("remove", &result, json)
}
