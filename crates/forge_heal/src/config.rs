//! Configuration file loading.
//!
//! A single `forge.toml` (or `.yaml`/`.yml`) carries the bundler, scheduler
//! and healing settings. Every section and key is optional.

use std::fs;
use std::path::Path;

use forge_bundler::BundlerOptions;
use forge_retry::SchedulerConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HealError, HealResult};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "forge.toml";

/// Healing loop limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealOptions {
    /// Bundle/repair rounds before giving up.
    pub max_rounds: u32,
    /// Only act on diagnoses that pass the auto-fix gate.
    pub auto_fixable_only: bool,
}

impl Default for HealOptions {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            auto_fixable_only: true,
        }
    }
}

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> HealResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => Err(HealError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub bundler: BundlerOptions,
    pub scheduler: SchedulerConfig,
    pub heal: HealOptions,
}

impl ForgeConfig {
    /// Parse configuration text in the given format.
    pub fn parse(content: &str, format: ConfigFormat) -> HealResult<Self> {
        let config: Self = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => {
                // An empty YAML document deserializes as null.
                if content.trim().is_empty() {
                    Self::default()
                } else {
                    serde_yaml::from_str(content)?
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`.
    pub fn load(path: impl AsRef<Path>) -> HealResult<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        debug!("Reading configuration from {:?}", path);
        let content = fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Load from `path`, falling back to defaults when it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> HealResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No configuration at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> HealResult<()> {
        self.scheduler.validate()?;
        if self.heal.max_rounds == 0 {
            return Err(HealError::InvalidConfig("heal.max_rounds must be at least 1".into()));
        }
        if self.bundler.wrapper_key.trim().is_empty() {
            return Err(HealError::InvalidConfig("bundler.wrapper_key must not be empty".into()));
        }
        Ok(())
    }

    /// Render in the given format.
    pub fn render(&self, format: ConfigFormat) -> HealResult<String> {
        Ok(match format {
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
        })
    }

    /// Write to `path` in the format its extension names.
    pub fn save(&self, path: impl AsRef<Path>) -> HealResult<()> {
        let path = path.as_ref();
        let rendered = self.render(ConfigFormat::from_path(path)?)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, rendered)?;
        info!("Configuration written to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ForgeConfig::load_or_default(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, ForgeConfig::default());
        assert_eq!(config.heal.max_rounds, 3);
    }

    #[test]
    fn test_partial_toml() {
        let config = ForgeConfig::parse(
            r#"
[bundler]
mount_element_id = "app"

[scheduler]
max_attempts = 5
base_delay_ms = 200

[heal]
max_rounds = 1
"#,
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.bundler.mount_element_id, "app");
        assert_eq!(config.bundler.error_channel, "preview-error");
        assert_eq!(config.scheduler.max_attempts, 5);
        assert_eq!(config.scheduler.base_delay, Duration::from_millis(200));
        assert_eq!(config.heal.max_rounds, 1);
        assert!(config.heal.auto_fixable_only);
    }

    #[test]
    fn test_yaml() {
        let config = ForgeConfig::parse(
            "scheduler:\n  concurrency: 2\n  jitter_fraction: 0.0\nheal:\n  auto_fixable_only: false\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert_eq!(config.scheduler.concurrency, 2);
        assert_eq!(config.scheduler.jitter_fraction, 0.0);
        assert!(!config.heal.auto_fixable_only);

        assert_eq!(ForgeConfig::parse("", ConfigFormat::Yaml).unwrap(), ForgeConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_rounds = ForgeConfig::parse("[heal]\nmax_rounds = 0\n", ConfigFormat::Toml);
        assert!(matches!(zero_rounds, Err(HealError::InvalidConfig(_))));

        let bad_jitter = ForgeConfig::parse("[scheduler]\njitter_fraction = 2.0\n", ConfigFormat::Toml);
        assert!(matches!(bad_jitter, Err(HealError::Scheduler(_))));

        let garbage = ForgeConfig::parse("[heal\n", ConfigFormat::Toml);
        assert!(matches!(garbage, Err(HealError::Toml(_))));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("forge.toml")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a/forge.yml")).unwrap(), ConfigFormat::Yaml);
        assert!(ConfigFormat::from_path(Path::new("forge.json")).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut config = ForgeConfig::default();
        config.heal.max_rounds = 7;
        config.scheduler.max_delay = Duration::from_secs(10);

        for name in ["nested/forge.toml", "forge.yaml"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            assert_eq!(ForgeConfig::load(&path).unwrap(), config);
        }
    }
}
