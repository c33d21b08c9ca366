use super::{now_or, Workspace};
use crate::output::{print_bulk, print_json};
use chrono::{DateTime, Utc};
use ism_core::retry::{compute_common_start_states, RetryCoordinator};
use std::path::Path;

pub fn run(
    root: &Path,
    indices: &[String],
    state: Option<&str>,
    at: Option<DateTime<Utc>>,
    json: bool,
) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    let result =
        RetryCoordinator::new(&ws.registry, &ws.notifier).retry(indices, state, now_or(at))?;
    ws.save()?;
    print_bulk("retry", &result, json)
}

/// States every selected index could be restarted from.
pub fn states(root: &Path, indices: &[String], json: bool) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    let items = RetryCoordinator::new(&ws.registry, &ws.notifier).items(indices);
    let common = compute_common_start_states(&items);
    if json {
        return print_json(&common);
    }
    if common.is_empty() {
        println!("No state is shared by every selected index.");
    }
    for state in common {
        println!("{state}");
    }
    Ok(())
}
