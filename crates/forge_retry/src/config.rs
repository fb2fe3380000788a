//! Scheduler configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use forge_diagnostics::ErrorKind;
use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};

/// Serde helper storing a [`Duration`] as whole milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Default priority of each diagnosis kind. Higher runs first.
pub fn default_priorities() -> BTreeMap<ErrorKind, i32> {
    BTreeMap::from([
        (ErrorKind::ImportMissing, 10),
        (ErrorKind::Syntax, 8),
        (ErrorKind::TypeError, 6),
        (ErrorKind::LifecycleViolation, 5),
        (ErrorKind::Runtime, 4),
        (ErrorKind::Style, 2),
        (ErrorKind::Unknown, 1),
    ])
}

/// Backoff, concurrency and priority settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(with = "duration_ms", rename = "base_delay_ms")]
    pub base_delay: Duration,
    #[serde(with = "duration_ms", rename = "max_delay_ms")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of the current delay added or removed at random.
    pub jitter_fraction: f64,
    pub max_attempts: u32,
    /// Maximum number of simultaneously running tasks.
    pub concurrency: usize,
    pub priorities: BTreeMap<ErrorKind, i32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_fraction: 0.2,
            max_attempts: 3,
            concurrency: 1,
            priorities: default_priorities(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_priority(mut self, kind: ErrorKind, priority: i32) -> Self {
        self.priorities.insert(kind, priority);
        self
    }

    /// Priority for a diagnosis kind; kinds missing from the table rank lowest.
    pub fn priority_for(&self, kind: ErrorKind) -> i32 {
        self.priorities.get(&kind).copied().unwrap_or(0)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if !(self.backoff_multiplier >= 1.0) {
            return Err(SchedulerError::InvalidConfig(format!(
                "backoff_multiplier must be >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(SchedulerError::InvalidConfig(format!(
                "jitter_fraction must be within [0, 1], got {}",
                self.jitter_fraction
            )));
        }
        if self.max_attempts == 0 {
            return Err(SchedulerError::InvalidConfig("max_attempts must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(SchedulerError::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.base_delay > self.max_delay {
            return Err(SchedulerError::InvalidConfig(format!(
                "base_delay ({:?}) exceeds max_delay ({:?})",
                self.base_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

/// Per-task overrides applied at enqueue time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOverrides {
    pub max_attempts: Option<u32>,
    pub priority: Option<i32>,
    pub base_delay: Option<Duration>,
}

impl TaskOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }
}
