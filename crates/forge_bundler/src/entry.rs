//! Entry point detection.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filter::{file_kind, looks_like_source, FileKind};
use crate::path::extension;
use crate::SourceMap;

/// Bootstrap files that may mount the application themselves, by priority.
pub const BOOTSTRAP_FILES: [&str; 8] = [
    "main.tsx",
    "main.jsx",
    "main.ts",
    "main.js",
    "index.tsx",
    "index.jsx",
    "index.ts",
    "index.js",
];

/// Conventional root component files, by priority.
pub const ROOT_COMPONENT_FILES: [&str; 6] = [
    "App.tsx",
    "App.jsx",
    "App.ts",
    "App.js",
    "app.tsx",
    "app.jsx",
];

/// Substrings that demonstrate a file attaches itself to the page.
pub const MOUNT_MARKERS: [&str; 4] = ["createRoot(", "hydrateRoot(", "ReactDOM.render(", ".mount("];

/// Script extensions in fallback priority order.
const FALLBACK_EXTENSIONS: [&str; 6] = ["tsx", "jsx", "ts", "js", "mjs", "cjs"];

/// The detected entry of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    /// Normalized path of the entry module.
    pub file: String,
    /// Whether the entry performs its own mount call.
    pub is_self_mounting: bool,
}

/// Whether `content` contains a recognizable mount call.
pub fn has_mount_call(content: &str) -> bool {
    MOUNT_MARKERS.iter().any(|marker| content.contains(marker))
}

fn is_valid_script(path: &str, content: &str) -> bool {
    file_kind(path) == Some(FileKind::Script) && looks_like_source(content, FileKind::Script)
}

/// Detect the entry point of a normalized source map.
///
/// Bootstrap files win only when they mount; otherwise a root component is
/// chosen, and as a last resort the first script by extension priority.
pub fn detect_entry(files: &SourceMap) -> Option<EntryInfo> {
    for name in BOOTSTRAP_FILES {
        if let Some(content) = files.get(name) {
            if is_valid_script(name, content) && has_mount_call(content) {
                debug!("Entry detected (bootstrap): {}", name);
                return Some(EntryInfo {
                    file: name.to_string(),
                    is_self_mounting: true,
                });
            }
        }
    }

    for name in ROOT_COMPONENT_FILES {
        if let Some(content) = files.get(name) {
            if is_valid_script(name, content) {
                debug!("Entry detected (root component): {}", name);
                return Some(EntryInfo {
                    file: name.to_string(),
                    is_self_mounting: false,
                });
            }
        }
    }

    for ext in FALLBACK_EXTENSIONS {
        let fallback = files.iter().find(|(path, content)| {
            extension(path).as_deref() == Some(ext) && is_valid_script(path, content)
        });
        if let Some((path, content)) = fallback {
            debug!("Entry detected (fallback): {}", path);
            return Some(EntryInfo {
                file: path.clone(),
                is_self_mounting: has_mount_call(content),
            });
        }
    }

    None
}
