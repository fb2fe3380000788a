//! Retry task model.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use forge_diagnostics::ClassifiedError;
use serde::{Deserialize, Serialize};

use crate::config::duration_ms;

/// Lifecycle state of a retry task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    /// Failed an attempt; backoff timer armed.
    Waiting,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Pending, running or waiting for a retry.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress | Self::Waiting)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Waiting => "waiting",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Result of the most recent attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Succeeded,
    /// The unit of work completed and reported failure.
    ReturnedFalse,
    /// The unit of work returned an error or panicked.
    Errored(String),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Snapshot of a scheduled task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryTask {
    pub id: String,
    pub error: ClassifiedError,
    pub status: TaskStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    /// Delay the next failure will back off by, before jitter.
    #[serde(with = "duration_ms", rename = "current_delay_ms")]
    pub current_delay: Duration,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_result: Option<AttemptOutcome>,
}

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub waiting: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub(crate) fn record(&mut self, status: TaskStatus) {
        self.total += 1;
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Waiting => self.waiting += 1,
            TaskStatus::Succeeded => self.succeeded += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Waiting.is_terminal());
        assert!(TaskStatus::Waiting.is_live());
        assert_eq!(TaskStatus::InProgress.to_string(), "in-progress");
    }

    #[test]
    fn test_outcome_serialization() {
        let errored = serde_json::to_value(AttemptOutcome::Errored("boom".into())).unwrap();
        assert_eq!(errored["outcome"], "errored");
        assert_eq!(errored["message"], "boom");
        let returned = serde_json::to_value(AttemptOutcome::ReturnedFalse).unwrap();
        assert_eq!(returned["outcome"], "returned-false");
    }

    #[test]
    fn test_stats_record() {
        let mut stats = QueueStats::default();
        stats.record(TaskStatus::Pending);
        stats.record(TaskStatus::Failed);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 1);
    }
}
