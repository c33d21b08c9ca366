use super::{now_or, Workspace};
use crate::output::{print_json, print_table};
use chrono::{DateTime, Utc};
use ism_core::{
    executor::{StateMachineExecutor, TickOutcome},
    runner::SimulatedRunner,
};
use std::path::Path;
use std::sync::Arc;

/// Advance the named managed indices (all of them when none are named) by
/// `rounds` ticks at the same instant. An index whose tick errors is
/// reported and skipped; the others still advance and are saved.
pub fn run(
    root: &Path,
    indices: &[String],
    at: Option<DateTime<Utc>>,
    rounds: u32,
    json: bool,
) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    let targets = if indices.is_empty() {
        ws.registry.indices()
    } else {
        indices.to_vec()
    };
    let now = now_or(at);

    let runner = SimulatedRunner::new(Arc::clone(&ws.catalog));
    let executor = StateMachineExecutor::new(&ws.registry, &runner, &*ws.catalog, &ws.config);

    let mut report: Vec<(u32, String, Result<TickOutcome, String>)> = Vec::new();
    for round in 1..=rounds.max(1) {
        for (index, outcome) in executor.tick_all(&targets, now) {
            if let Err(e) = &outcome {
                tracing::warn!(index = %index, error = %e, "tick failed");
            }
            report.push((round, index, outcome.map_err(|e| e.to_string())));
        }
    }
    ws.save()?;

    let failed = report.iter().filter(|(_, _, o)| o.is_err()).count();
    if json {
        let value: Vec<_> = report
            .iter()
            .map(|(round, index, outcome)| match outcome {
                Ok(result) => serde_json::json!({ "round": round, "index": index, "result": result }),
                Err(error) => serde_json::json!({ "round": round, "index": index, "error": error }),
            })
            .collect();
        print_json(&value)?;
    } else if report.is_empty() {
        println!("Nothing to tick.");
    } else {
        let rows = report
            .iter()
            .map(|(round, index, outcome)| {
                let text = match outcome {
                    Ok(o) => describe(o),
                    Err(e) => format!("error: {e}"),
                };
                vec![round.to_string(), index.clone(), text]
            })
            .collect();
        print_table(&["ROUND", "INDEX", "OUTCOME"], rows);
    }

    if failed > 0 {
        anyhow::bail!("{failed} tick(s) failed");
    }
    Ok(())
}

fn describe(outcome: &TickOutcome) -> String {
    match outcome {
        TickOutcome::Unmanaged => "not managed".into(),
        TickOutcome::AlreadyCompleted => "policy already completed".into(),
        TickOutcome::Parked => "failed, waiting for retry".into(),
        TickOutcome::BackingOff { until } => format!("backing off until {}", until.to_rfc3339()),
        TickOutcome::Initialized { state } => format!("initialized in {state}"),
        TickOutcome::InProgress { action } => format!("{action} in progress"),
        TickOutcome::ActionCompleted { action, next } => format!("{action} done, next {next}"),
        TickOutcome::ActionFailed {
            action,
            consumed_retries,
            exhausted,
        } => {
            if *exhausted {
                format!("{action} failed after {consumed_retries} retries")
            } else {
                format!("{action} failed (attempt {consumed_retries})")
            }
        }
        TickOutcome::Transitioned { from, to } => format!("{from} -> {to}"),
        TickOutcome::Waiting { state } => format!("waiting in {state}"),
        TickOutcome::PolicyCompleted { state } => format!("policy completed in {state}"),
    }
}
