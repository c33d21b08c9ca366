//! Bulk retry of parked indices, optionally restarting them from a state
//! every selected index's policy shares.

use crate::error::{IsmError, Result};
use crate::managed::ManagedIndexItem;
use crate::notify::{Notice, NoticeLevel, Notifier};
use crate::registry::ManagedIndexRegistry;
use crate::report::{self, BulkResult, ItemResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// State names present in every item's policy. Empty input, or any item
/// without a resolvable policy, yields the empty set. Stops as soon as the
/// running intersection is empty.
pub fn compute_common_start_states(items: &[ManagedIndexItem]) -> BTreeSet<String> {
    let Some((first, rest)) = items.split_first() else {
        return BTreeSet::new();
    };
    let Some(policy) = &first.policy else {
        return BTreeSet::new();
    };
    let mut common = policy.state_names();
    for item in rest {
        let Some(policy) = &item.policy else {
            return BTreeSet::new();
        };
        common.retain(|name| policy.has_state(name));
        if common.is_empty() {
            break;
        }
    }
    common
}

pub struct RetryCoordinator<'a> {
    registry: &'a ManagedIndexRegistry,
    notifier: &'a dyn Notifier,
}

impl<'a> RetryCoordinator<'a> {
    pub fn new(registry: &'a ManagedIndexRegistry, notifier: &'a dyn Notifier) -> Self {
        Self { registry, notifier }
    }

    /// Selection items for `indices`; unmanaged names get an item without a
    /// policy.
    pub fn items(&self, indices: &[String]) -> Vec<ManagedIndexItem> {
        indices
            .iter()
            .map(|name| {
                self.registry.item(name).unwrap_or_else(|| ManagedIndexItem {
                    index: name.clone(),
                    index_uuid: String::new(),
                    policy_id: String::new(),
                    policy: None,
                    metadata: None,
                })
            })
            .collect()
    }

    /// Retry failed indices. With `start_state == None` the parked action is
    /// attempted again; otherwise each index restarts at `start_state`, which
    /// must be common to the whole selection. A start state is refused
    /// outright when any selected index has no policy to restart in.
    pub fn retry(
        &self,
        indices: &[String],
        start_state: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BulkResult> {
        if let Some(state) = start_state {
            let items = self.items(indices);
            let rejection = if let Some(orphan) = items.iter().find(|i| i.policy.is_none()) {
                Some(IsmError::Unresolvable(orphan.index.clone()))
            } else if !compute_common_start_states(&items).contains(state) {
                Some(IsmError::validation(format!(
                    "start state '{state}' is not shared by every selected index's policy"
                )))
            } else {
                None
            };
            if let Some(err) = rejection {
                self.notifier.notify(Notice {
                    level: NoticeLevel::Danger,
                    message: format!("retry: {err}"),
                });
                return Err(err);
            }
        }

        let results = indices
            .iter()
            .map(|index| match self.retry_one(index, start_state, now) {
                Ok(()) => ItemResult::ok(index.as_str()),
                Err(e) => ItemResult::failed(index.as_str(), e.into_reason()),
            })
            .collect();
        let result = report::collect(results);

        tracing::info!(
            updated = result.updated_indices,
            failed = result.failed_indices.len(),
            start_state = start_state.unwrap_or("<current>"),
            "retry finished"
        );
        self.notifier.notify(Notice::for_bulk("retry", &result));
        Ok(result)
    }

    fn retry_one(&self, index: &str, start_state: Option<&str>, now: DateTime<Utc>) -> Result<()> {
        self.registry.write(index, |entry| {
            let meta = &mut entry.metadata;
            if !meta.is_failed() {
                return Err(IsmError::validation("index is not in a failed state"));
            }

            match start_state {
                None => {
                    meta.retry_info = None;
                    if let Some(action) = meta.action.as_mut() {
                        action.failed = false;
                        action.consumed_retries = 0;
                        action.last_retry_time = None;
                        action.start_time = now;
                    }
                    meta.set_info_message("Pending retry of failed managed index");
                }
                Some(name) => {
                    let state = entry.policy.state(name).ok_or_else(|| {
                        IsmError::validation(format!("state '{name}' is not in this index's policy"))
                    })?;
                    meta.enter_state(state, now);
                    meta.set_info_message(format!("Pending retry from state {name}"));
                }
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
