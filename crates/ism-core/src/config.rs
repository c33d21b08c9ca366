use crate::error::{IsmError, Result};
use crate::paths;
use crate::policy::{Action, Backoff};
use crate::units::TimeValue;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// RetryDefaults
// ---------------------------------------------------------------------------

/// Retry budget and backoff applied to actions whose policy entry carries no
/// `retry` block, or only part of one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryDefaults {
    #[serde(default = "default_retry_count")]
    pub count: u32,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_retry_delay")]
    pub delay: TimeValue,
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay() -> TimeValue {
    TimeValue::from_secs(60)
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            count: default_retry_count(),
            backoff: Backoff::default(),
            delay: default_retry_delay(),
        }
    }
}

/// The retry rule in force for one action: policy override merged over the
/// engine defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub count: u32,
    pub backoff: Backoff,
    pub delay: Duration,
}

impl RetryPolicy {
    /// How long to wait after the latest failure before the next attempt,
    /// given the number of failures so far. `None` when the wait does not
    /// fit in a `Duration`.
    pub fn wait_after(&self, consumed_retries: u32) -> Option<Duration> {
        if consumed_retries == 0 {
            return Some(Duration::zero());
        }
        match self.backoff {
            Backoff::Constant => Some(self.delay),
            Backoff::Linear => self.delay.checked_mul(i32::try_from(consumed_retries).ok()?),
            Backoff::Exponential => {
                let exp = (consumed_retries - 1).min(30);
                self.delay.checked_mul(1i32 << exp)
            }
        }
    }

    /// Earliest instant the next attempt may run. `None` means never: the
    /// wait overflows the calendar.
    pub fn next_attempt(&self, last: DateTime<Utc>, consumed_retries: u32) -> Option<DateTime<Utc>> {
        last.checked_add_signed(self.wait_after(consumed_retries)?)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub retry: RetryDefaults,
}

fn default_version() -> u32 {
    1
}

fn default_workers() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            workers: default_workers(),
            retry: RetryDefaults::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        crate::io::load_yaml(&paths::config_path(root))?.ok_or(IsmError::NotInitialized)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        crate::io::save_yaml(&paths::config_path(root), self)
    }

    pub fn retry_policy_for(&self, action: &Action) -> RetryPolicy {
        let over = action.retry.as_ref();
        RetryPolicy {
            count: over.map_or(self.retry.count, |r| r.count),
            backoff: over
                .and_then(|r| r.backoff)
                .unwrap_or(self.retry.backoff),
            delay: over
                .and_then(|r| r.delay.as_ref())
                .unwrap_or(&self.retry.delay)
                .duration(),
        }
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.workers == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "workers must be at least 1".to_string(),
            });
        }
        if self.retry.count == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "retry.count is 0: the first failure of any action parks the index"
                    .to_string(),
            });
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
