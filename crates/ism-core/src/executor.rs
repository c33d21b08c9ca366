//! Advances managed indices through their policies, one tick at a time.
//!
//! A tick runs entirely under the index's registry lock: at most one action
//! attempt, then (once the state's actions are done) at most one transition.
//! A parked index (retry budget exhausted) is left alone until a retry
//! clears it.

use crate::catalog::{IndexFacts, IndexStats};
use crate::config::Config;
use crate::error::{IsmError, Result};
use crate::managed::{ActionMetaData, ManagedIndex, RetryInfo};
use crate::policy::{ActionKind, Conditions, Policy, State};
use crate::registry::ManagedIndexRegistry;
use crate::runner::{ActionOutcome, ActionRunner};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

// ---------------------------------------------------------------------------
// TickOutcome
// ---------------------------------------------------------------------------

/// What a single tick did to an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    Unmanaged,
    /// The policy already ran to completion.
    AlreadyCompleted,
    /// Waiting for a retry after exhausting the action's budget.
    Parked,
    BackingOff { until: DateTime<Utc> },
    Initialized { state: String },
    InProgress { action: String },
    ActionCompleted { action: String, next: String },
    ActionFailed {
        action: String,
        consumed_retries: u32,
        exhausted: bool,
    },
    Transitioned { from: String, to: String },
    /// No transition condition holds yet.
    Waiting { state: String },
    PolicyCompleted { state: String },
}

// ---------------------------------------------------------------------------
// Condition evaluation
// ---------------------------------------------------------------------------

/// Whether every condition present holds. Absent or empty conditions always
/// hold. Conditions on measured properties fail when no facts are known.
pub fn conditions_met(
    conditions: Option<&Conditions>,
    facts: Option<&IndexFacts>,
    state_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let Some(c) = conditions else {
        return true;
    };
    if let Some(age) = &c.min_index_age {
        if !facts.is_some_and(|f| f.age(now) >= age.duration()) {
            return false;
        }
    }
    if let Some(count) = c.min_doc_count {
        if !facts.is_some_and(|f| f.doc_count >= count) {
            return false;
        }
    }
    if let Some(size) = &c.min_size {
        if !facts.is_some_and(|f| f.size_bytes >= size.bytes()) {
            return false;
        }
    }
    if let Some(cron) = &c.cron {
        if !cron_fired(&cron.cron, state_start, now) {
            return false;
        }
    }
    true
}

/// True when the schedule has an occurrence in `(since, now]`.
fn cron_fired(expr: &crate::policy::CronExpression, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let (Ok(schedule), Ok(tz)) = (expr.schedule(), expr.timezone()) else {
        return false;
    };
    schedule
        .after(&since.with_timezone(&tz))
        .next()
        .is_some_and(|t| t.with_timezone(&Utc) <= now)
}

// ---------------------------------------------------------------------------
// StateMachineExecutor
// ---------------------------------------------------------------------------

pub struct StateMachineExecutor<'a> {
    registry: &'a ManagedIndexRegistry,
    runner: &'a dyn ActionRunner,
    stats: &'a dyn IndexStats,
    config: &'a Config,
}

impl<'a> StateMachineExecutor<'a> {
    pub fn new(
        registry: &'a ManagedIndexRegistry,
        runner: &'a dyn ActionRunner,
        stats: &'a dyn IndexStats,
        config: &'a Config,
    ) -> Self {
        Self {
            registry,
            runner,
            stats,
            config,
        }
    }

    /// Run one tick for `index`.
    pub fn tick(&self, index: &str, now: DateTime<Utc>) -> Result<TickOutcome> {
        let outcome = match self.registry.write(index, |entry| self.step(entry, now)) {
            Err(IsmError::NotManaged(_)) => Ok(TickOutcome::Unmanaged),
            other => other,
        }?;
        tracing::debug!(index, ?outcome, "tick");
        Ok(outcome)
    }

    /// Tick every index on a pool of `config.workers` threads. Outcomes come
    /// back in input order.
    pub fn tick_all(
        &self,
        indices: &[String],
        now: DateTime<Utc>,
    ) -> Vec<(String, Result<TickOutcome>)> {
        let workers = self.config.workers.clamp(1, indices.len().max(1));
        let cursor = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<Result<TickOutcome>>>> =
            indices.iter().map(|_| Mutex::new(None)).collect();
        let (cursor_ref, slots_ref) = (&cursor, &slots);

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(move || loop {
                        let i = cursor_ref.fetch_add(1, Ordering::Relaxed);
                        let Some(index) = indices.get(i) else {
                            break;
                        };
                        *slots_ref[i].lock() = Some(self.tick(index, now));
                    })
                })
                .collect();
            for handle in handles {
                if let Err(panic) = handle.join() {
                    std::panic::resume_unwind(panic);
                }
            }
        });

        indices
            .iter()
            .cloned()
            .zip(slots.into_iter().map(|slot| {
                slot.into_inner()
                    .unwrap_or_else(|| Err(IsmError::Storage("tick did not run".into())))
            }))
            .collect()
    }

    fn step(&self, entry: &mut ManagedIndex, now: DateTime<Utc>) -> Result<TickOutcome> {
        let ManagedIndex {
            metadata: meta,
            policy,
        } = &mut *entry;

        if meta.policy_completed {
            return Ok(TickOutcome::AlreadyCompleted);
        }
        if meta.retry_info.is_some_and(|r| r.failed) {
            return Ok(TickOutcome::Parked);
        }

        let Some(current) = meta.state.as_ref() else {
            let default_state = lookup(policy, &policy.default_state)?;
            meta.enter_state(default_state, now);
            return Ok(TickOutcome::Initialized {
                state: default_state.name.clone(),
            });
        };
        let state = lookup(policy, &current.name)?;

        if let Some(action_meta) = meta.action.clone() {
            if action_meta.failed {
                return Ok(TickOutcome::Parked);
            }
            let action = state.actions.get(action_meta.index).ok_or_else(|| {
                IsmError::validation(format!(
                    "action index {} out of range for state '{}'",
                    action_meta.index, state.name
                ))
            })?;
            let retry = self.config.retry_policy_for(action);

            if let Some(last) = action_meta.last_retry_time {
                let until = retry
                    .next_attempt(last, action_meta.consumed_retries)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                if now < until {
                    return Ok(TickOutcome::BackingOff { until });
                }
            }

            let is_rollover = matches!(action.kind, ActionKind::Rollover(_));
            let mut outcome = if is_rollover && meta.rolled_over {
                ActionOutcome::Completed
            } else {
                self.runner.run(&meta.index, action, now)
            };

            if outcome == ActionOutcome::InProgress {
                let attempt_start = action_meta
                    .last_retry_time
                    .map_or(action_meta.start_time, |t| t.max(action_meta.start_time));
                if action
                    .timeout
                    .as_ref()
                    .is_some_and(|t| now - attempt_start >= t.duration())
                {
                    outcome = ActionOutcome::Failed("action timed out".to_string());
                }
            }

            match outcome {
                ActionOutcome::InProgress => {
                    return Ok(TickOutcome::InProgress {
                        action: action_meta.name,
                    });
                }
                ActionOutcome::Failed(reason) => {
                    let mut failed = action_meta;
                    failed.consumed_retries += 1;
                    failed.last_retry_time = Some(now);
                    let exhausted = failed.consumed_retries >= retry.count;
                    if exhausted {
                        failed.failed = true;
                        meta.retry_info = Some(RetryInfo {
                            failed: true,
                            consumed_retries: failed.consumed_retries,
                        });
                        tracing::warn!(
                            index = %meta.index,
                            action = %failed.name,
                            retries = failed.consumed_retries,
                            %reason,
                            "action failed, retries exhausted"
                        );
                    } else {
                        tracing::warn!(index = %meta.index, action = %failed.name, %reason, "action failed");
                    }
                    meta.set_info_message(reason);
                    let result = TickOutcome::ActionFailed {
                        action: failed.name.clone(),
                        consumed_retries: failed.consumed_retries,
                        exhausted,
                    };
                    meta.action = Some(failed);
                    return Ok(result);
                }
                ActionOutcome::Completed => {
                    if is_rollover {
                        meta.rolled_over = true;
                    }
                    meta.retry_info = None;
                    let next = action_meta.index + 1;
                    if let Some(next_action) = state.actions.get(next) {
                        meta.action = Some(ActionMetaData::start(next_action, next, now));
                        return Ok(TickOutcome::ActionCompleted {
                            action: action_meta.name,
                            next: next_action.name().to_string(),
                        });
                    }
                    meta.action = None;
                }
            }
        }

        self.transition(entry, now)
    }

    /// First satisfied transition wins. A state with no transitions left
    /// completes the policy.
    fn transition(&self, entry: &mut ManagedIndex, now: DateTime<Utc>) -> Result<TickOutcome> {
        let ManagedIndex {
            metadata: meta,
            policy,
        } = &mut *entry;
        let Some(current) = meta.state.clone() else {
            return Err(IsmError::validation("transition evaluated before initialization"));
        };
        let state = lookup(policy, &current.name)?;

        if state.transitions.is_empty() {
            meta.policy_completed = true;
            tracing::info!(index = %meta.index, state = %state.name, "policy completed");
            return Ok(TickOutcome::PolicyCompleted {
                state: state.name.clone(),
            });
        }

        let facts = self.stats.facts(&meta.index);
        let taken = state.transitions.iter().find(|t| {
            conditions_met(t.conditions.as_ref(), facts.as_ref(), current.start_time, now)
        });
        let Some(transition) = taken else {
            return Ok(TickOutcome::Waiting {
                state: state.name.clone(),
            });
        };

        let next = lookup(policy, &transition.state_name)?;
        meta.enter_state(next, now);
        tracing::info!(index = %meta.index, from = %state.name, to = %next.name, "transitioned");
        if meta.policy_completed {
            return Ok(TickOutcome::PolicyCompleted {
                state: next.name.clone(),
            });
        }
        Ok(TickOutcome::Transitioned {
            from: state.name.clone(),
            to: next.name.clone(),
        })
    }
}

fn lookup<'p>(policy: &'p Policy, name: &str) -> Result<&'p State> {
    policy
        .state(name)
        .ok_or_else(|| IsmError::validation(format!("state '{name}' is not in the bound policy")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
