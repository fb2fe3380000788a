//! Error types for the retry scheduler.

use thiserror::Error;

use crate::task::TaskStatus;

/// Result type alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {id} cannot be retried while {status}")]
    InvalidState { id: String, status: TaskStatus },

    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}
