//! Candidate filtering and content sniffing.
//!
//! AI-generated projects routinely contain files that must never reach the
//! compile backend: config files, shell-command artifacts captured as file
//! names, and truncated or prose-only "source" files. This module decides
//! which entries of a source map are bundling candidates.

use tracing::debug;

use crate::path::{basename, extension, strip_prefix};
use crate::SourceMap;

/// Tokens that only appear in keys produced from raw shell commands.
pub const RESERVED_MARKERS: [&str; 9] = [
    "&&", "||", " | ", "npm ", "npx ", "yarn ", "pnpm ", "bun ", "$ ",
];

/// Build and tooling files that are never part of the module graph.
pub const CONFIG_FILENAMES: [&str; 16] = [
    "package.json",
    "package-lock.json",
    "tsconfig.json",
    "tsconfig.node.json",
    "tsconfig.app.json",
    "jsconfig.json",
    "components.json",
    "vite.config.ts",
    "vite.config.js",
    "tailwind.config.ts",
    "tailwind.config.js",
    "postcss.config.js",
    "postcss.config.cjs",
    "eslint.config.js",
    ".eslintrc.json",
    "next.config.js",
];

/// Broad category of a bundleable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Script,
    Style,
    Data,
}

/// Classify a path by its extension.
pub fn file_kind(path: &str) -> Option<FileKind> {
    match extension(path)?.as_str() {
        "tsx" | "ts" | "jsx" | "js" | "mjs" | "cjs" => Some(FileKind::Script),
        "css" => Some(FileKind::Style),
        "json" => Some(FileKind::Data),
        _ => None,
    }
}

/// Whether a raw source-map key may take part in bundling at all.
pub fn is_bundle_candidate(path: &str) -> bool {
    if file_kind(path).is_none() {
        return false;
    }
    if RESERVED_MARKERS.iter().any(|marker| path.contains(marker)) {
        return false;
    }
    let name = basename(path);
    !CONFIG_FILENAMES.contains(&name)
}

/// Cheap "does this look like source code" heuristic.
///
/// Only the first non-whitespace character is inspected (plus a check for a
/// leading markdown fence). Prose that happens to start with a letter passes
/// (false positive); a script starting with an unusual but legal character
/// such as `.` is rejected (false negative). Both are accepted trade-offs:
/// the goal is to keep clearly corrupt generated files from cascading into
/// parse failures, not to validate syntax.
pub fn looks_like_source(content: &str, kind: FileKind) -> bool {
    let trimmed = content.trim_start();
    if trimmed.starts_with("```") {
        return false;
    }
    let Some(first) = trimmed.chars().next() else {
        return false;
    };

    match kind {
        FileKind::Script => {
            first.is_alphanumeric()
                || matches!(
                    first,
                    '_' | '$' | '/' | '\'' | '"' | '`' | '(' | '[' | '{' | '<' | '@' | '#' | '!' | ';'
                )
        }
        FileKind::Style => {
            first.is_alphanumeric()
                || matches!(first, '@' | '.' | '#' | ':' | '*' | '/' | '[' | '-' | '_')
        }
        FileKind::Data => matches!(first, '{' | '['),
    }
}

/// Result of preparing a raw source map for bundling.
#[derive(Debug, Default)]
pub struct PreparedFiles {
    /// Candidate files keyed by normalized path.
    pub files: SourceMap,
    /// Normalized paths dropped because their content failed the sniff test.
    pub skipped_invalid: Vec<String>,
}

/// Filter, normalize and sniff a raw source map.
///
/// Keys colliding after normalization resolve last-write-wins in key order.
pub fn prepare(files: &SourceMap, skip_invalid_content: bool) -> PreparedFiles {
    let mut prepared = PreparedFiles::default();

    for (raw_path, content) in files {
        if !is_bundle_candidate(raw_path) {
            debug!("Ignoring non-candidate file: {}", raw_path);
            continue;
        }

        let path = strip_prefix(raw_path).to_string();
        let Some(kind) = file_kind(&path) else {
            continue;
        };

        if skip_invalid_content && !looks_like_source(content, kind) {
            debug!("Skipping {}: content does not look like source", path);
            prepared.skipped_invalid.push(path);
            continue;
        }

        prepared.files.insert(path, content.clone());
    }

    prepared
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind() {
        assert_eq!(file_kind("App.tsx"), Some(FileKind::Script));
        assert_eq!(file_kind("index.css"), Some(FileKind::Style));
        assert_eq!(file_kind("data/items.json"), Some(FileKind::Data));
        assert_eq!(file_kind("logo.png"), None);
        assert_eq!(file_kind("README.md"), None);
    }

    #[test]
    fn test_candidate_rejects_config_and_shell_artifacts() {
        assert!(is_bundle_candidate("src/App.tsx"));
        assert!(!is_bundle_candidate("vite.config.ts"));
        assert!(!is_bundle_candidate("package.json"));
        assert!(!is_bundle_candidate("npm install && npm run dev.js"));
        assert!(!is_bundle_candidate("index.html"));
    }

    #[test]
    fn test_looks_like_source_boundaries() {
        assert!(!looks_like_source("", FileKind::Script));
        assert!(!looks_like_source("   \n\t", FileKind::Script));
        assert!(!looks_like_source("}", FileKind::Script));
        assert!(!looks_like_source(",", FileKind::Script));
        assert!(!looks_like_source("```tsx\nexport default 1\n```", FileKind::Script));
        assert!(looks_like_source("import React from 'react';", FileKind::Script));
        assert!(looks_like_source("  // comment\nconst a = 1;", FileKind::Script));
        assert!(looks_like_source("'use client';", FileKind::Script));
        assert!(looks_like_source("<div/>", FileKind::Script));
    }

    #[test]
    fn test_looks_like_source_style_and_data() {
        assert!(looks_like_source("@tailwind base;", FileKind::Style));
        assert!(looks_like_source(".card { color: red; }", FileKind::Style));
        assert!(!looks_like_source("}", FileKind::Style));
        assert!(looks_like_source("{\"a\": 1}", FileKind::Data));
        assert!(!looks_like_source("a: 1", FileKind::Data));
    }

    #[test]
    fn test_prepare_normalizes_and_skips() {
        let mut files = SourceMap::new();
        files.insert("src/App.tsx".into(), "export default function App() {}".into());
        files.insert("./src/broken.tsx".into(), "} oops".into());
        files.insert("tsconfig.json".into(), "{}".into());

        let prepared = prepare(&files, true);
        assert_eq!(prepared.files.len(), 1);
        assert!(prepared.files.contains_key("App.tsx"));
        assert_eq!(prepared.skipped_invalid, vec!["broken.tsx".to_string()]);

        let lenient = prepare(&files, false);
        assert_eq!(lenient.files.len(), 2);
    }
}
