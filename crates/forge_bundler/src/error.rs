//! Error types for the bundler.

use thiserror::Error;

/// Result type alias for compile backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// A single diagnostic reported by a compile backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendMessage {
    pub text: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl BackendMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Errors raised by a compile backend.
///
/// These never escape [`Bundler::bundle`](crate::Bundler::bundle); they are
/// translated into [`BundleError`](crate::BundleError) entries.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend already initialized")]
    AlreadyInitialized,

    #[error("Backend initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Build failed with {} error(s)", .0.len())]
    BuildFailed(Vec<BackendMessage>),

    #[error("Could not load {0}")]
    MissingModule(String),

    #[error("Backend error: {0}")]
    Other(String),
}
