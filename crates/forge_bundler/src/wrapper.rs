//! Synthetic entry wrapper generation.
//!
//! When the detected entry is a root component rather than a self-mounting
//! bootstrap file, the bundler builds from a generated module that imports
//! the component, wraps it in an error boundary and mounts it.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Named exports tried, in order, when the entry has no default export.
pub const DEFAULT_EXPORT_CANDIDATES: [&str; 5] = ["App", "Main", "Root", "Page", "Home"];

static SLOT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([a-zA-Z_][a-zA-Z0-9_]*)\}\}").unwrap());

const WRAPPER_TEMPLATE: &str = r#"import * as EntryModule from {{entry_specifier}};
import React from "react";
import { createRoot } from "react-dom/client";

const EXPORT_CANDIDATES = {{export_candidates}};

function resolveComponent(mod) {
  if (mod && typeof mod.default === "function") {
    return mod.default;
  }
  for (const name of EXPORT_CANDIDATES) {
    if (mod && typeof mod[name] === "function") {
      return mod[name];
    }
  }
  for (const key of Object.keys(mod || {})) {
    if (typeof mod[key] === "function") {
      return mod[key];
    }
  }
  return null;
}

function notifyHost(error) {
  const payload = {
    type: {{error_channel}},
    error: {
      message: String((error && error.message) || error),
      stack: String((error && error.stack) || ""),
    },
  };
  if (typeof window !== "undefined" && window.parent) {
    window.parent.postMessage(payload, "*");
  }
}

class PreviewErrorBoundary extends React.Component {
  constructor(props) {
    super(props);
    this.state = { error: null };
  }

  static getDerivedStateFromError(error) {
    return { error };
  }

  componentDidCatch(error) {
    notifyHost(error);
  }

  render() {
    if (this.state.error) {
      return null;
    }
    return this.props.children;
  }
}

const Root = resolveComponent(EntryModule);
const container = document.getElementById({{mount_element_id}});

if (!Root) {
  notifyHost(new Error("No component export found in " + {{entry_specifier}}));
} else if (container) {
  createRoot(container).render(
    React.createElement(PreviewErrorBoundary, null, React.createElement(Root))
  );
}
"#;

/// Values for the named slots of the wrapper template.
#[derive(Debug, Clone)]
pub struct WrapperSlots {
    /// Normalized path of the wrapped root component.
    pub entry_path: String,
    /// Named exports to try after `default`.
    pub export_candidates: Vec<String>,
    /// Message type posted to the hosting frame on render failure.
    pub error_channel: String,
    /// DOM id of the mount container.
    pub mount_element_id: String,
}

impl WrapperSlots {
    pub fn new(entry_path: impl Into<String>) -> Self {
        Self {
            entry_path: entry_path.into(),
            export_candidates: DEFAULT_EXPORT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            error_channel: crate::channel::PREVIEW_ERROR_TYPE.to_string(),
            mount_element_id: "root".to_string(),
        }
    }

    pub fn with_error_channel(mut self, channel: impl Into<String>) -> Self {
        self.error_channel = channel.into();
        self
    }

    pub fn with_mount_element(mut self, id: impl Into<String>) -> Self {
        self.mount_element_id = id.into();
        self
    }

    pub fn with_export_candidates(mut self, candidates: Vec<String>) -> Self {
        self.export_candidates = candidates;
        self
    }

    /// Slot values as JavaScript literals.
    fn to_literals(&self) -> HashMap<&'static str, String> {
        let quote = |s: &str| serde_json::Value::String(s.to_string()).to_string();
        let candidates = serde_json::Value::Array(
            self.export_candidates
                .iter()
                .map(|c| serde_json::Value::String(c.clone()))
                .collect(),
        );

        let mut slots = HashMap::new();
        slots.insert("entry_specifier", quote(&format!("./{}", self.entry_path)));
        slots.insert("export_candidates", candidates.to_string());
        slots.insert("error_channel", quote(&self.error_channel));
        slots.insert("mount_element_id", quote(&self.mount_element_id));
        slots
    }
}

/// Render the wrapper module source.
///
/// Unknown slots are left untouched.
pub fn render_wrapper(slots: &WrapperSlots) -> String {
    let literals = slots.to_literals();
    SLOT_PATTERN
        .replace_all(WRAPPER_TEMPLATE, |caps: &Captures| {
            literals
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
