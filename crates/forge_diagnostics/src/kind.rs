//! Error taxonomy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category of a diagnosed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Missing or unresolvable import, or an undefined identifier.
    ImportMissing,
    /// Component lifecycle rule broken (hook ordering and placement).
    LifecycleViolation,
    /// Type mismatch, null access, calling a non-function.
    TypeError,
    /// Unexpected token, unterminated literal, unbalanced input.
    Syntax,
    /// Stack overflow, reference errors and other execution failures.
    Runtime,
    /// Style or markup property problems.
    Style,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::ImportMissing,
        ErrorKind::LifecycleViolation,
        ErrorKind::TypeError,
        ErrorKind::Syntax,
        ErrorKind::Runtime,
        ErrorKind::Style,
        ErrorKind::Unknown,
    ];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::ImportMissing => "Missing Import",
            ErrorKind::LifecycleViolation => "Hook Rule Violation",
            ErrorKind::TypeError => "Type Error",
            ErrorKind::Syntax => "Syntax Error",
            ErrorKind::Runtime => "Runtime Error",
            ErrorKind::Style => "Style Issue",
            ErrorKind::Unknown => "Unknown Issue",
        }
    }

    /// Stable machine name, as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ImportMissing => "import-missing",
            ErrorKind::LifecycleViolation => "lifecycle-violation",
            ErrorKind::TypeError => "type-error",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Runtime => "runtime",
            ErrorKind::Style => "style",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown error kind: {s}"))
    }
}

/// Free-function form of [`ErrorKind::label`].
pub fn label(kind: ErrorKind) -> &'static str {
    kind.label()
}
