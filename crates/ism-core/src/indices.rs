//! Bulk attach / detach of policies to catalog indices.

use crate::catalog::IndexCatalog;
use crate::error::{IsmError, Result};
use crate::notify::{Notice, NoticeLevel, Notifier};
use crate::registry::ManagedIndexRegistry;
use crate::report::{self, BulkResult, ItemResult};
use crate::store::{PolicyDocument, PolicyStore};
use chrono::{DateTime, Utc};

pub struct IndexOperations<'a> {
    store: &'a dyn PolicyStore,
    registry: &'a ManagedIndexRegistry,
    catalog: &'a IndexCatalog,
    notifier: &'a dyn Notifier,
}

impl<'a> IndexOperations<'a> {
    pub fn new(
        store: &'a dyn PolicyStore,
        registry: &'a ManagedIndexRegistry,
        catalog: &'a IndexCatalog,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            store,
            registry,
            catalog,
            notifier,
        }
    }

    /// Start managing `indices` under `policy_id`. An unknown policy rejects
    /// the whole batch; unknown or already managed indices fail individually.
    pub fn apply_policy(
        &self,
        indices: &[String],
        policy_id: &str,
        now: DateTime<Utc>,
    ) -> Result<BulkResult> {
        let doc = self.store.get(policy_id).inspect_err(|e| {
            self.notifier.notify(Notice {
                level: NoticeLevel::Danger,
                message: format!("apply policy: {e}"),
            });
        })?;

        let results = indices
            .iter()
            .map(|index| match self.apply_one(index, &doc, now) {
                Ok(()) => ItemResult::ok(index.as_str()),
                Err(e) => ItemResult::failed(index.as_str(), e.into_reason()),
            })
            .collect();
        let result = report::collect(results);

        tracing::info!(
            policy = policy_id,
            updated = result.updated_indices,
            failed = result.failed_indices.len(),
            "apply policy finished"
        );
        self.notifier.notify(Notice::for_bulk("apply policy", &result));
        Ok(result)
    }

    fn apply_one(&self, index: &str, doc: &PolicyDocument, now: DateTime<Utc>) -> Result<()> {
        let record = self.catalog.get(index)?;
        if self.registry.contains(index) {
            return Err(IsmError::validation("index is already being managed"));
        }
        self.registry.attach(index, &record.uuid, doc, now)?;
        Ok(())
    }

    /// Stop managing `indices`. The catalog records are left alone.
    pub fn remove_policy(&self, indices: &[String]) -> BulkResult {
        let results = indices
            .iter()
            .map(|index| {
                if self.registry.detach(index) {
                    ItemResult::ok(index.as_str())
                } else {
                    ItemResult::failed(index.as_str(), "index is not being managed")
                }
            })
            .collect();
        let result = report::collect(results);

        tracing::info!(
            updated = result.updated_indices,
            failed = result.failed_indices.len(),
            "remove policy finished"
        );
        self.notifier.notify(Notice::for_bulk("remove policy", &result));
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::policy::Policy;
    use crate::store::MemoryPolicyStore;
    use crate::testutil::{t0, LIFECYCLE};

    struct Fixture {
        store: MemoryPolicyStore,
        registry: ManagedIndexRegistry,
        catalog: IndexCatalog,
        notifier: RecordingNotifier,
    }

    impl Fixture {
        fn new() -> Self {
            let fx = Fixture {
                store: MemoryPolicyStore::new(),
                registry: ManagedIndexRegistry::new(),
                catalog: IndexCatalog::new(),
                notifier: RecordingNotifier::new(),
            };
            fx.store
                .put("lifecycle", Policy::from_json(LIFECYCLE).unwrap(), None)
                .unwrap();
            fx.catalog.create("logs-1", t0()).unwrap();
            fx.catalog.create("logs-2", t0()).unwrap();
            fx
        }

        fn ops(&self) -> IndexOperations<'_> {
            IndexOperations::new(&self.store, &self.registry, &self.catalog, &self.notifier)
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn apply_attaches_in_default_state() {
        let fx = Fixture::new();
        let result = fx
            .ops()
            .apply_policy(&names(&["logs-1", "logs-2"]), "lifecycle", t0())
            .unwrap();
        assert_eq!(result.updated_indices, 2);
        assert!(result.is_clean());

        let meta = fx.registry.read("logs-1").unwrap();
        assert_eq!(meta.policy_id, "lifecycle");
        assert_eq!(meta.state_name(), Some("Ingest"));
        assert_eq!(meta.index_uuid, fx.catalog.get("logs-1").unwrap().uuid);
        assert_eq!(
            meta.policy_version(),
            fx.store.get("lifecycle").unwrap().version
        );
    }

    #[test]
    fn apply_reports_unknown_and_managed_indices() {
        let fx = Fixture::new();
        fx.ops()
            .apply_policy(&names(&["logs-1"]), "lifecycle", t0())
            .unwrap();

        let result = fx
            .ops()
            .apply_policy(&names(&["logs-1", "ghost", "logs-2"]), "lifecycle", t0())
            .unwrap();
        assert_eq!(result.updated_indices, 1);
        let reasons: Vec<&str> = result
            .failed_indices
            .iter()
            .map(|f| f.reason.as_str())
            .collect();
        assert_eq!(reasons[0], "index is already being managed");
        assert!(reasons[1].contains("not found"));
    }

    #[test]
    fn apply_unknown_policy_rejects_batch() {
        let fx = Fixture::new();
        let err = fx
            .ops()
            .apply_policy(&names(&["logs-1"]), "nope", t0())
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!fx.registry.contains("logs-1"));
        assert_eq!(fx.notifier.notices()[0].level, NoticeLevel::Danger);
    }

    #[test]
    fn remove_detaches_managed_indices() {
        let fx = Fixture::new();
        fx.ops()
            .apply_policy(&names(&["logs-1"]), "lifecycle", t0())
            .unwrap();

        let result = fx.ops().remove_policy(&names(&["logs-1", "logs-2"]));
        assert_eq!(result.updated_indices, 1);
        assert_eq!(result.failed_indices[0].index_name, "logs-2");
        assert!(!fx.registry.contains("logs-1"));
        assert!(fx.catalog.contains("logs-1"));
    }
}
