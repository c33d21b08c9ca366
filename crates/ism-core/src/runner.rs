//! Action dispatch. The executor decides *when* an action runs; a runner
//! decides what running it means.

use crate::catalog::{IndexCatalog, IndexFacts, IndexStats};
use crate::policy::{Action, ActionKind, RolloverParams};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    /// Still running; the executor asks again next tick.
    InProgress,
    Failed(String),
}

pub trait ActionRunner: Send + Sync {
    fn run(&self, index: &str, action: &Action, now: DateTime<Utc>) -> ActionOutcome;
}

// ---------------------------------------------------------------------------
// SimulatedRunner
// ---------------------------------------------------------------------------

/// Applies each action's effect to an [`IndexCatalog`] record instead of a
/// real cluster. Rollover fails without a `rollover_alias` and otherwise
/// waits for its thresholds; every other action
/// completes on the first attempt unless the record lists it in
/// `fail_actions`.
pub struct SimulatedRunner {
    catalog: Arc<IndexCatalog>,
}

impl SimulatedRunner {
    pub fn new(catalog: Arc<IndexCatalog>) -> Self {
        Self { catalog }
    }
}

/// Whether a rollover's thresholds are reached. Any one threshold suffices;
/// none at all means roll over unconditionally.
fn rollover_due(params: &RolloverParams, facts: &IndexFacts, now: DateTime<Utc>) -> bool {
    let checks = [
        params.min_doc_count.map(|n| facts.doc_count >= n),
        params.min_size.as_ref().map(|s| facts.size_bytes >= s.bytes()),
        params
            .min_index_age
            .as_ref()
            .map(|a| facts.age(now) >= a.duration()),
    ];
    let configured: Vec<bool> = checks.into_iter().flatten().collect();
    configured.is_empty() || configured.contains(&true)
}

impl ActionRunner for SimulatedRunner {
    fn run(&self, index: &str, action: &Action, now: DateTime<Utc>) -> ActionOutcome {
        let name = action.name();
        let Some(facts) = self.catalog.facts(index) else {
            return ActionOutcome::Failed(format!("index '{index}' does not exist"));
        };

        let result = self.catalog.update(index, |rec| {
            if rec.fail_actions.contains(name) {
                return ActionOutcome::Failed(format!("{name} failed on '{index}'"));
            }
            match &action.kind {
                ActionKind::Rollover(params) => {
                    if rec.rollover_alias.is_none() {
                        return ActionOutcome::Failed(format!(
                            "missing rollover_alias setting on '{index}'"
                        ));
                    }
                    if !rollover_due(params, &facts, now) {
                        return ActionOutcome::InProgress;
                    }
                }
                ActionKind::Close(_) => rec.closed = true,
                ActionKind::Open(_) => rec.closed = false,
                ActionKind::ReadOnly(_) => rec.read_only = true,
                ActionKind::ReadWrite(_) => rec.read_only = false,
                ActionKind::ReplicaCount(p) => rec.number_of_replicas = p.number_of_replicas,
                ActionKind::ForceMerge(p) => rec.segments = Some(p.max_num_segments),
                ActionKind::IndexPriority(p) => rec.priority = Some(p.priority),
                ActionKind::Delete(_)
                | ActionKind::Snapshot(_)
                | ActionKind::Notification(_)
                | ActionKind::Allocation(_) => {}
            }
            ActionOutcome::Completed
        });

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => ActionOutcome::Failed(e.to_string()),
        };
        if outcome == ActionOutcome::Completed && matches!(action.kind, ActionKind::Delete(_)) {
            if let Err(e) = self.catalog.remove(index) {
                return ActionOutcome::Failed(e.to_string());
            }
        }
        tracing::debug!(index, action = name, ?outcome, "simulated action");
        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::t0;

    fn action(json: &str) -> Action {
        serde_json::from_str(json).unwrap()
    }

    fn runner() -> (Arc<IndexCatalog>, SimulatedRunner) {
        let catalog = Arc::new(IndexCatalog::new());
        catalog.create("idx", t0()).unwrap();
        catalog
            .update("idx", |r| r.rollover_alias = Some("logs".into()))
            .unwrap();
        (Arc::clone(&catalog), SimulatedRunner::new(catalog))
    }

    #[test]
    fn rollover_waits_for_threshold() {
        let (catalog, runner) = runner();
        let rollover = action(r#"{ "rollover": { "min_doc_count": 100 } }"#);
        assert_eq!(runner.run("idx", &rollover, t0()), ActionOutcome::InProgress);

        catalog.update("idx", |r| r.doc_count = 100).unwrap();
        assert_eq!(runner.run("idx", &rollover, t0()), ActionOutcome::Completed);
    }

    #[test]
    fn rollover_without_thresholds_completes() {
        let (_catalog, runner) = runner();
        let rollover = action(r#"{ "rollover": {} }"#);
        assert_eq!(runner.run("idx", &rollover, t0()), ActionOutcome::Completed);
    }

    #[test]
    fn rollover_needs_an_alias() {
        let (catalog, runner) = runner();
        catalog.update("idx", |r| r.rollover_alias = None).unwrap();
        let rollover = action(r#"{ "rollover": {} }"#);
        match runner.run("idx", &rollover, t0()) {
            ActionOutcome::Failed(msg) => assert!(msg.contains("rollover_alias")),
            other => panic!("expected failure, got {other:?}"),
        }

        catalog
            .update("idx", |r| r.rollover_alias = Some("logs".into()))
            .unwrap();
        assert_eq!(runner.run("idx", &rollover, t0()), ActionOutcome::Completed);
    }

    #[test]
    fn effects_are_applied() {
        let (catalog, runner) = runner();
        runner.run("idx", &action(r#"{ "read_only": {} }"#), t0());
        runner.run(
            "idx",
            &action(r#"{ "replica_count": { "number_of_replicas": 0 } }"#),
            t0(),
        );
        let rec = catalog.get("idx").unwrap();
        assert!(rec.read_only);
        assert_eq!(rec.number_of_replicas, 0);

        assert_eq!(
            runner.run("idx", &action(r#"{ "delete": {} }"#), t0()),
            ActionOutcome::Completed
        );
        assert!(!catalog.contains("idx"));
    }

    #[test]
    fn listed_failures_fail() {
        let (catalog, runner) = runner();
        catalog
            .update("idx", |r| r.fail_actions.insert("close".into()))
            .unwrap();
        assert!(matches!(
            runner.run("idx", &action(r#"{ "close": {} }"#), t0()),
            ActionOutcome::Failed(_)
        ));
        assert!(!catalog.get("idx").unwrap().closed);
    }

    #[test]
    fn missing_index_fails() {
        let (_catalog, runner) = runner();
        assert!(matches!(
            runner.run("ghost", &action(r#"{ "open": {} }"#), t0()),
            ActionOutcome::Failed(_)
        ));
    }
}
