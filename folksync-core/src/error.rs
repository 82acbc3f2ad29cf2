//! Error types for folksync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file did not exist at the given path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// A value parsed but is not acceptable (bad mode token, ratio out of range...).
    #[error("invalid config value for `{field}`: {message}")]
    Invalid { field: String, message: String },
}

/// All errors that can arise from cache sessions.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A cached value does not have the shape the caller asked for.
    #[error("cache value error: {0}")]
    Value(#[from] serde_json::Error),

    /// `get`/`set` called outside an `open`/`commit` session.
    #[error("cache is not open")]
    NotOpen,
}

pub(crate) fn config_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn cache_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.into(),
        source,
    }
}
