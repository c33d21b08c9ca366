//! Operator notifications. Coordinators receive a `&dyn Notifier` instead of
//! reaching for shared global state.

use crate::report::BulkResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    /// Summarize a bulk outcome: success when nothing failed, warning on a
    /// partial failure, danger when nothing was updated.
    pub fn for_bulk(operation: &str, result: &BulkResult) -> Self {
        if !result.failures {
            return Self {
                level: NoticeLevel::Success,
                message: format!("{operation}: updated {} indices", result.updated_indices),
            };
        }
        let failed: Vec<String> = result
            .failed_indices
            .iter()
            .map(|f| format!("[{}, {}]", f.index_name, f.reason))
            .collect();
        let level = if result.updated_indices == 0 {
            NoticeLevel::Danger
        } else {
            NoticeLevel::Warning
        };
        Self {
            level,
            message: format!(
                "{operation}: updated {} indices, failed {}: {}",
                result.updated_indices,
                failed.len(),
                failed.join(", ")
            ),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Routes notices into the tracing pipeline.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => tracing::info!(message = %notice.message),
            NoticeLevel::Warning => tracing::warn!(message = %notice.message),
            NoticeLevel::Danger => tracing::error!(message = %notice.message),
        }
    }
}

/// Keeps every notice in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{collect, ItemResult};

    #[test]
    fn bulk_notice_levels() {
        let ok = collect(vec![ItemResult::ok("a")]);
        assert_eq!(Notice::for_bulk("retry", &ok).level, NoticeLevel::Success);

        let partial = collect(vec![ItemResult::ok("a"), ItemResult::failed("b", "boom")]);
        let notice = Notice::for_bulk("retry", &partial);
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert!(notice.message.contains("[b, boom]"), "{}", notice.message);

        let none = collect(vec![ItemResult::failed("b", "boom")]);
        assert_eq!(Notice::for_bulk("retry", &none).level, NoticeLevel::Danger);
    }

    #[test]
    fn recording_notifier_keeps_order() {
        let n = RecordingNotifier::new();
        n.notify(Notice {
            level: NoticeLevel::Success,
            message: "one".into(),
        });
        n.notify(Notice {
            level: NoticeLevel::Danger,
            message: "two".into(),
        });
        let got: Vec<String> = n.notices().into_iter().map(|n| n.message).collect();
        assert_eq!(got, vec!["one", "two"]);
    }
}
