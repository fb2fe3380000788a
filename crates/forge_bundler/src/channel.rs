//! Cross-boundary preview error channel.
//!
//! The synthetic wrapper's error boundary posts
//! `{type: "preview-error", error: {message, stack}}` to the hosting frame.
//! The host feeds these messages back into classification.

use serde::{Deserialize, Serialize};

/// Default message type used by the wrapper's error boundary.
pub const PREVIEW_ERROR_TYPE: &str = "preview-error";

/// Error payload carried by a preview message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewErrorPayload {
    pub message: String,
    #[serde(default)]
    pub stack: String,
}

impl PreviewErrorPayload {
    /// Render as raw error text suitable for classification.
    pub fn to_raw(&self) -> String {
        let stack = self.stack.trim();
        if stack.is_empty() {
            return self.message.clone();
        }
        // Browsers usually repeat the message on the first stack line.
        if stack.contains(self.message.trim()) {
            stack.to_string()
        } else {
            format!("{}\n{}", self.message, stack)
        }
    }
}

/// A message posted by the preview surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: PreviewErrorPayload,
}

impl PreviewMessage {
    pub fn new(message: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            kind: PREVIEW_ERROR_TYPE.to_string(),
            error: PreviewErrorPayload {
                message: message.into(),
                stack: stack.into(),
            },
        }
    }

    /// Parse a posted message, keeping it only if it is on `channel`.
    pub fn parse(json: &str, channel: &str) -> Option<Self> {
        let message: Self = serde_json::from_str(json).ok()?;
        (message.kind == channel).then_some(message)
    }
}
