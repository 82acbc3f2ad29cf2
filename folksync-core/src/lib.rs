//! folksync core library — identity records, keys, configuration, cache.
//!
//! - [`types`] — records, keys, object kinds, replication modes
//! - [`config`] — YAML config load / validate
//! - [`cache`] — domain-scoped cache (null + JSON file)
//! - [`error`] — [`ConfigError`], [`CacheError`]

pub mod cache;
pub mod config;
pub mod error;
pub mod types;

pub use cache::{Cache, CacheDomain, FileCache, NullCache, SharedCache};
pub use config::{CacheConfig, Config, SinkConfig, SourceConfig, ThresholdConfig};
pub use error::{CacheError, ConfigError};
pub use types::{
    Account, AccountType, AccountUids, Group, GroupUids, Key, ObjectKind, Record, RemoteRecord,
    ReplicationMode, Service, UidField,
};
