//! YAML configuration file.
//!
//! ```yaml
//! source: { type: file, path: people.yaml }
//! sinks:
//!   - { name: directory, type: file, path: ./directory, skip: [svc-backup] }
//!   - { name: audit, type: "null" }
//! mode: additive
//! interactive: false
//! threshold: { common_ratio: 0.1, deleted_ratio: 0.05 }
//! cache: { path: cache.json }
//! ```
//!
//! # API pattern
//!
//! - `load_at(path)` — file only; used in tests.
//! - `load(path)` — `load_at` plus environment overrides (`FOLKSYNC_MODE`).
//!
//! Relative paths inside the file resolve against the file's directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{config_io_err, ConfigError};
use crate::types::ReplicationMode;

/// Environment variable overriding the configured mode.
pub const MODE_ENV: &str = "FOLKSYNC_MODE";

const DEFAULT_COMMON_RATIO: f64 = 0.1;

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
    #[serde(default)]
    pub mode: ReplicationMode,
    /// Prompt for the mode before applying each sink.
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub threshold: ThresholdConfig,
    /// Absent means a null cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Registry name of the source connector.
    #[serde(rename = "type")]
    pub connector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Unique sink name; also the sink's cache domain.
    pub name: String,
    /// Registry name of the sink connector.
    #[serde(rename = "type")]
    pub connector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Identifiers (source HRIDs or sink-native ids) the sink must never touch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
}

/// Per-action blast-radius ratios; unset ratios fall back to `common_ratio`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_common_ratio")]
    pub common_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_ratio: Option<f64>,
}

fn default_common_ratio() -> f64 {
    DEFAULT_COMMON_RATIO
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            common_ratio: DEFAULT_COMMON_RATIO,
            created_ratio: None,
            updated_ratio: None,
            skipped_ratio: None,
            deleted_ratio: None,
        }
    }
}

impl ThresholdConfig {
    pub fn created(&self) -> f64 {
        self.created_ratio.unwrap_or(self.common_ratio)
    }

    pub fn updated(&self) -> f64 {
        self.updated_ratio.unwrap_or(self.common_ratio)
    }

    pub fn skipped(&self) -> f64 {
        self.skipped_ratio.unwrap_or(self.common_ratio)
    }

    pub fn deleted(&self) -> f64 {
        self.deleted_ratio.unwrap_or(self.common_ratio)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load and validate the config file at `path`, ignoring the environment.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| config_io_err(path, e))?;
    let mut config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    config.validate()?;
    Ok(config)
}

/// `load_at` plus environment overrides.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let mut config = load_at(path)?;
    apply_mode_override(&mut config, std::env::var(MODE_ENV).ok().as_deref())?;
    Ok(config)
}

/// Replace the configured mode with `value` when set and non-empty.
pub fn apply_mode_override(config: &mut Config, value: Option<&str>) -> Result<(), ConfigError> {
    let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
        return Ok(());
    };
    config.mode = value.parse().map_err(|message| ConfigError::Invalid {
        field: MODE_ENV.to_string(),
        message,
    })?;
    Ok(())
}

impl Config {
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(p) = self.source.path.as_mut() {
            resolve(p);
        }
        for sink in &mut self.sinks {
            if let Some(p) = sink.path.as_mut() {
                resolve(p);
            }
        }
        if let Some(cache) = self.cache.as_mut() {
            resolve(&mut cache.path);
        }
    }

    /// Sink names must be unique and ratios finite and non-negative.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for sink in &self.sinks {
            if sink.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "sinks.name".into(),
                    message: "sink name must not be empty".into(),
                });
            }
            if !seen.insert(sink.name.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "sinks.name".into(),
                    message: format!("duplicate sink name '{}'", sink.name),
                });
            }
        }

        let t = &self.threshold;
        let ratios = [
            ("threshold.common_ratio", Some(t.common_ratio)),
            ("threshold.created_ratio", t.created_ratio),
            ("threshold.updated_ratio", t.updated_ratio),
            ("threshold.skipped_ratio", t.skipped_ratio),
            ("threshold.deleted_ratio", t.deleted_ratio),
        ];
        for (field, ratio) in ratios {
            if let Some(r) = ratio {
                if !r.is_finite() || r < 0.0 {
                    return Err(ConfigError::Invalid {
                        field: field.into(),
                        message: format!("ratio must be a non-negative number, got {r}"),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
