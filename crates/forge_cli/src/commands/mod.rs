//! CLI command definitions.
//!
//! This module defines the command structure for the previewforge CLI.
//! Each subcommand drives one stage of the preview pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use forge_bundler::SourceMap;
use forge_heal::{ForgeConfig, HealError, HealResult, CONFIG_FILE};
use thiserror::Error;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

pub mod bundle;
pub mod classify;
pub mod config;
pub mod heal;

/// Directories never loaded into a source map.
const SKIPPED_DIRS: [&str; 3] = ["node_modules", ".git", "dist"];

/// previewforge - live-preview build and self-healing core
#[derive(Parser)]
#[command(name = "forge")]
#[command(version, about = "previewforge - live-preview build and self-healing core")]
#[command(long_about = r#"
previewforge bundles AI-generated front-end projects from memory, classifies
what goes wrong and repairs it.

COMMANDS:
  bundle    → Bundle a project directory into bundle.js / bundle.css
  classify  → Classify raw compiler or runtime error text
  heal      → Bundle, diagnose and patch until the project builds
  config    → Print or write the default configuration

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Build failure
  4 - Configuration error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bundle a project directory
    Bundle(bundle::BundleArgs),

    /// Classify raw error text
    Classify(classify::ClassifyArgs),

    /// Repair a project until it bundles
    Heal(heal::HealArgs),

    /// Print or write the default configuration
    Config(config::ConfigArgs),
}

/// Failures that map to dedicated exit codes.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Build failed with {0} error(s)")]
    BuildFailed(usize),

    #[error("Healing incomplete: {0} diagnosis(es) remain")]
    HealIncomplete(usize),
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// Logical key of `path` below `root`, with `/` separators.
fn logical_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// Read every UTF-8 file below `root` into a source map.
pub fn load_sources(root: &Path) -> Result<SourceMap, CommandError> {
    if !root.is_dir() {
        return Err(CommandError::InvalidArgs(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut files = SourceMap::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let Some(key) = logical_key(root, entry.path()) else {
            continue;
        };
        match fs::read_to_string(entry.path()) {
            Ok(content) => {
                files.insert(key, content);
            }
            Err(e) => debug!("Skipping unreadable file {}: {}", key, e),
        }
    }

    debug!("Loaded {} file(s) from {}", files.len(), root.display());
    Ok(files)
}

/// Load the configuration named on the command line, or `<dir>/forge.toml`.
pub fn load_config(dir: &Path, explicit: Option<&PathBuf>) -> HealResult<ForgeConfig> {
    match explicit {
        Some(path) if !path.exists() => Err(HealError::InvalidConfig(format!(
            "config file not found: {}",
            path.display()
        ))),
        Some(path) => ForgeConfig::load(path),
        None => ForgeConfig::load_or_default(dir.join(CONFIG_FILE)),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, relative: &str, content: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_sources_skips_vendor_dirs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/App.tsx", b"export default function App() {}");
        write(dir.path(), "src/components/Button.tsx", b"export const Button = 1;");
        write(dir.path(), "node_modules/react/index.js", b"module.exports = {}");
        write(dir.path(), "dist/bundle.js", b"old");
        write(dir.path(), ".git/HEAD", b"ref: refs/heads/main");
        write(dir.path(), "public/logo.png", &[0x89, 0x50, 0x4e, 0x47, 0xff, 0xfe]);

        let files = load_sources(dir.path()).unwrap();
        let keys: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(keys, ["src/App.tsx", "src/components/Button.tsx"]);
    }

    #[test]
    fn test_load_sources_rejects_missing_dir() {
        let dir = TempDir::new().unwrap();
        let err = load_sources(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, CommandError::InvalidArgs(_)));
    }

    #[test]
    fn test_load_config_defaults_and_explicit() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_config(dir.path(), None).unwrap(), ForgeConfig::default());

        write(dir.path(), CONFIG_FILE, b"[heal]\nmax_rounds = 5\n");
        assert_eq!(load_config(dir.path(), None).unwrap().heal.max_rounds, 5);

        let missing = dir.path().join("other.toml");
        assert!(matches!(
            load_config(dir.path(), Some(&missing)),
            Err(HealError::InvalidConfig(_))
        ));
    }
}
