//! Reassigning managed indices to a different policy.

use crate::error::{IsmError, Result};
use crate::notify::{Notice, NoticeLevel, Notifier};
use crate::registry::ManagedIndexRegistry;
use crate::report::{self, BulkResult, ItemResult};
use crate::store::{PolicyDocument, PolicyStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Restricts a change to indices currently in `state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFilter {
    pub state: String,
}

enum Change {
    Applied,
    Skipped,
}

pub struct ChangePolicyCoordinator<'a> {
    store: &'a dyn PolicyStore,
    registry: &'a ManagedIndexRegistry,
    notifier: &'a dyn Notifier,
}

impl<'a> ChangePolicyCoordinator<'a> {
    pub fn new(
        store: &'a dyn PolicyStore,
        registry: &'a ManagedIndexRegistry,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
        }
    }

    /// Move `indices` to `policy_id`. Without `start_state` each index keeps
    /// its current state name, which the new policy must also declare.
    /// Indices filtered out by `include` are skipped, not failed.
    pub fn change_policy(
        &self,
        indices: &[String],
        policy_id: &str,
        start_state: Option<&str>,
        include: &[StateFilter],
        now: DateTime<Utc>,
    ) -> Result<BulkResult> {
        let doc = self.store.get(policy_id).inspect_err(|e| self.reject(e))?;
        if let Some(state) = start_state {
            if !doc.policy.has_state(state) {
                let err = IsmError::validation(format!(
                    "state '{state}' is not present in policy '{policy_id}'"
                ));
                self.reject(&err);
                return Err(err);
            }
        }

        let mut results = Vec::new();
        let mut skipped = 0usize;
        for index in indices {
            match self.change_one(index, &doc, start_state, include, now) {
                Ok(Change::Applied) => results.push(ItemResult::ok(index.as_str())),
                Ok(Change::Skipped) => skipped += 1,
                Err(e) => results.push(ItemResult::failed(index.as_str(), e.into_reason())),
            }
        }
        let result = report::collect(results);

        tracing::info!(
            policy = policy_id,
            updated = result.updated_indices,
            failed = result.failed_indices.len(),
            skipped,
            "change policy finished"
        );
        self.notifier.notify(Notice::for_bulk("change policy", &result));
        Ok(result)
    }

    fn reject(&self, err: &IsmError) {
        self.notifier.notify(Notice {
            level: NoticeLevel::Danger,
            message: format!("change policy: {err}"),
        });
    }

    fn change_one(
        &self,
        index: &str,
        doc: &PolicyDocument,
        start_state: Option<&str>,
        include: &[StateFilter],
        now: DateTime<Utc>,
    ) -> Result<Change> {
        self.registry.write(index, |entry| {
            let current = entry
                .metadata
                .state_name()
                .ok_or_else(|| IsmError::validation("index is still initializing"))?
                .to_string();

            if !include.is_empty() && !include.iter().any(|f| f.state == current) {
                return Ok(Change::Skipped);
            }

            let target = start_state.unwrap_or(&current);
            let state = doc
                .policy
                .state(target)
                .ok_or_else(|| IsmError::validation("state not present in new policy"))?;

            let meta = &mut entry.metadata;
            meta.policy_id = doc.id.clone();
            meta.policy_seq_no = doc.version.seq_no;
            meta.policy_primary_term = doc.version.primary_term;
            meta.enter_state(state, now);
            meta.set_info_message(format!("Policy changed to {}", doc.id));
            entry.policy = doc.policy.clone();

            tracing::debug!(index, policy = %doc.id, state = target, "policy changed");
            Ok(Change::Applied)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::store::MemoryPolicyStore;
    use crate::testutil::{doc, states_policy, t0, LIFECYCLE};
    use chrono::Duration;

    struct Fixture {
        store: MemoryPolicyStore,
        registry: ManagedIndexRegistry,
        notifier: RecordingNotifier,
    }

    impl Fixture {
        fn new() -> Self {
            let fx = Fixture {
                store: MemoryPolicyStore::new(),
                registry: ManagedIndexRegistry::new(),
                notifier: RecordingNotifier::new(),
            };
            fx.store
                .put("policyB", states_policy("hot", &["hot", "Delete"]), None)
                .unwrap();
            fx
        }

        fn coordinator(&self) -> ChangePolicyCoordinator<'_> {
            ChangePolicyCoordinator::new(&self.store, &self.registry, &self.notifier)
        }

        fn attach_in(&self, index: &str, state: &str) {
            let d = doc("lifecycle", LIFECYCLE);
            self.registry.attach(index, "u", &d, t0()).unwrap();
            let target = d.policy.state(state).unwrap().clone();
            self.registry
                .write(index, |e| {
                    e.metadata.enter_state(&target, t0());
                    Ok(())
                })
                .unwrap();
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn current_state_missing_from_new_policy_fails_item() {
        let fx = Fixture::new();
        fx.attach_in("idx1", "Search");

        let result = fx
            .coordinator()
            .change_policy(&names(&["idx1"]), "policyB", None, &[], t0())
            .unwrap();
        assert_eq!(result.updated_indices, 0);
        assert!(result.failures);
        assert_eq!(result.failed_indices[0].index_name, "idx1");
        assert_eq!(result.failed_indices[0].reason, "state not present in new policy");
        assert_eq!(fx.registry.read("idx1").unwrap().policy_id, "lifecycle");
    }

    #[test]
    fn keeps_current_state_when_shared() {
        let fx = Fixture::new();
        fx.attach_in("idx1", "Delete");
        let later = t0() + Duration::hours(1);

        let result = fx
            .coordinator()
            .change_policy(&names(&["idx1"]), "policyB", None, &[], later)
            .unwrap();
        assert_eq!(result.updated_indices, 1);

        let entry = fx.registry.entry("idx1").unwrap();
        let stored = fx.store.get("policyB").unwrap();
        assert_eq!(entry.metadata.policy_id, "policyB");
        assert_eq!(entry.metadata.policy_version(), stored.version);
        assert_eq!(entry.policy, stored.policy);
        let state = entry.metadata.state.as_ref().unwrap();
        assert_eq!(state.name, "Delete");
        assert_eq!(state.start_time, later);
        assert_eq!(entry.metadata.action.as_ref().unwrap().name, "read_only");
        assert!(entry.metadata.retry_info.is_none());
    }

    #[test]
    fn explicit_start_state() {
        let fx = Fixture::new();
        fx.attach_in("idx1", "Search");
        let result = fx
            .coordinator()
            .change_policy(&names(&["idx1"]), "policyB", Some("hot"), &[], t0())
            .unwrap();
        assert_eq!(result.updated_indices, 1);
        assert_eq!(fx.registry.read("idx1").unwrap().state_name(), Some("hot"));
    }

    #[test]
    fn start_state_absent_rejects_batch() {
        let fx = Fixture::new();
        fx.attach_in("idx1", "Delete");
        let before = fx.registry.read("idx1").unwrap();

        let err = fx
            .coordinator()
            .change_policy(&names(&["idx1"]), "policyB", Some("warm"), &[], t0())
            .unwrap_err();
        assert!(matches!(err, IsmError::Validation(_)));
        assert_eq!(fx.registry.read("idx1").unwrap(), before);
    }

    #[test]
    fn unknown_policy_rejects_batch() {
        let fx = Fixture::new();
        fx.attach_in("idx1", "Delete");
        let err = fx
            .coordinator()
            .change_policy(&names(&["idx1"]), "nope", None, &[], t0())
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fx.notifier.notices()[0].level, NoticeLevel::Danger);
    }

    #[test]
    fn include_filter_skips_without_failing() {
        let fx = Fixture::new();
        fx.attach_in("a", "Delete");
        fx.attach_in("b", "Search");
        let include = vec![StateFilter {
            state: "Delete".into(),
        }];

        let result = fx
            .coordinator()
            .change_policy(&names(&["a", "b"]), "policyB", None, &include, t0())
            .unwrap();
        assert_eq!(result.updated_indices, 1);
        assert!(!result.failures);
        assert_eq!(fx.registry.read("b").unwrap().policy_id, "lifecycle");
    }

    #[test]
    fn unmanaged_and_initializing_indices_fail() {
        let fx = Fixture::new();
        fx.attach_in("init", "Delete");
        fx.registry
            .write("init", |e| {
                e.metadata.state = None;
                Ok(())
            })
            .unwrap();

        let result = fx
            .coordinator()
            .change_policy(&names(&["ghost", "init"]), "policyB", None, &[], t0())
            .unwrap();
        assert_eq!(result.updated_indices, 0);
        assert_eq!(result.failed_indices.len(), 2);
        assert!(result.failed_indices[1].reason.contains("initializing"));
    }
}
