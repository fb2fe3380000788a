//! Path algebra over logical (virtual) file paths.
//!
//! Every path in a [`SourceMap`](crate::SourceMap) is a forward-slash
//! separated logical path without a leading `./`, `/`, source-root alias or
//! source directory. The helpers here never touch the real filesystem.

use std::collections::BTreeMap;

/// Alias token that points at the source root (`@/components/Button`).
pub const SOURCE_ALIAS: &str = "@/";

/// Conventional source directory that logical paths are relative to.
pub const SOURCE_DIR: &str = "src/";

/// Extensions tried, in priority order, when resolving an import.
pub const RESOLVE_EXTENSIONS: [&str; 6] = ["", ".tsx", ".ts", ".jsx", ".js", ".json"];

/// Remove leading `./`, `/`, the source alias and the source directory.
///
/// The four removals run in that fixed order and the pass repeats until
/// nothing changes, so `strip_prefix(strip_prefix(p)) == strip_prefix(p)`.
pub fn strip_prefix(path: &str) -> &str {
    let mut current = path;
    loop {
        let before = current;
        current = current.strip_prefix("./").unwrap_or(current);
        current = current.strip_prefix('/').unwrap_or(current);
        current = current.strip_prefix(SOURCE_ALIAS).unwrap_or(current);
        current = current.strip_prefix(SOURCE_DIR).unwrap_or(current);
        if current == before {
            return current;
        }
    }
}

/// Join a relative specifier onto a base directory.
///
/// `..` pops one accumulated segment (popping an empty path yields an empty
/// path), `.` and empty segments are ignored.
pub fn join_paths(base: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(relative.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Directory part of a logical path (`""` for top-level files).
pub fn dirname(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Final path segment.
pub fn basename(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Lower-cased extension of the final segment, without the dot.
pub fn extension(path: &str) -> Option<String> {
    let name = basename(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

/// Whether a specifier is relative to the importing file.
pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".."
}

/// Look `name` up in `files`, trying extension and `/index` fallbacks.
///
/// Returns the first key present in `files`.
pub fn resolve_in_map(name: &str, files: &BTreeMap<String, String>) -> Option<String> {
    let name = name.trim_end_matches('/');
    if name.is_empty() {
        return None;
    }

    for ext in RESOLVE_EXTENSIONS {
        let candidate = format!("{name}{ext}");
        if files.contains_key(&candidate) {
            return Some(candidate);
        }
    }

    for ext in RESOLVE_EXTENSIONS {
        let candidate = format!("{name}/index{ext}");
        if files.contains_key(&candidate) {
            return Some(candidate);
        }
    }

    None
}
