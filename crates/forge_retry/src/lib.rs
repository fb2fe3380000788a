//! previewforge Retry Scheduler
//!
//! Drives repeated repair attempts to convergence. Each task owns an opaque
//! async unit of work; the scheduler decides when it runs:
//!
//! - highest priority first, FIFO within a priority
//! - at most `concurrency` tasks in flight
//! - exponential backoff with jitter between failed attempts
//! - `max_attempts` executions at most, then `failed` for good

pub mod backoff;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod task;

pub use config::{default_priorities, SchedulerConfig, TaskOverrides};
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{ExecuteFn, RetryScheduler};
pub use task::{AttemptOutcome, QueueStats, RetryTask, TaskStatus};
