//! Error types for folksync-sync.

use std::path::PathBuf;

use thiserror::Error;

use folksync_core::{CacheError, ObjectKind};

use crate::change::Action;

/// Failure reported by a source or sink connector.
///
/// Retries and backoff are the connector's business; the engine only ever
/// sees the final outcome.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The connector's backing data could not be decoded.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The connector is misconfigured (missing path, unknown option...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A call was made before `connect()`.
    #[error("not connected")]
    NotConnected,

    /// The remote system refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// All errors that can arise from a replication run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source failed to connect or fetch. Nothing can be replicated.
    #[error("source '{name}' failed: {source}")]
    Source {
        name: String,
        #[source]
        source: ConnectorError,
    },

    /// A sink failed to connect or fetch.
    #[error("sink '{name}' failed: {source}")]
    Sink {
        name: String,
        #[source]
        source: ConnectorError,
    },

    /// A sink batch call failed; the whole batch is considered failed.
    #[error("sink '{sink}' failed to apply {action} {kind} batch: {source}")]
    Apply {
        sink: String,
        kind: ObjectKind,
        action: Action,
        #[source]
        source: ConnectorError,
    },

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Reading the operator's answer failed.
    #[error("interaction failed: {0}")]
    Interaction(#[from] std::io::Error),

    /// A collaborator broke the engine's contract. Aborts the run.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl SyncError {
    /// Whether the error aborts the whole run rather than only the current sink.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::Sink { .. } | SyncError::Apply { .. })
    }
}

/// Convenience constructor for [`ConnectorError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConnectorError {
    ConnectorError::Io {
        path: path.into(),
        source,
    }
}
