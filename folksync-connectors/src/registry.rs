//! Explicit name → constructor tables for sources, sinks and caches.

use std::cell::RefCell;
use std::rc::Rc;

use folksync_core::{
    CacheConfig, CacheDomain, FileCache, NullCache, SharedCache, SinkConfig, SourceConfig,
};
use folksync_sync::{ConnectorError, Sink, Source};

use crate::{file_sink, file_source, null_sink};

pub type SourceConstructor = fn(&SourceConfig) -> Result<Box<dyn Source>, ConnectorError>;
pub type SinkConstructor = fn(&SinkConfig, CacheDomain) -> Result<Box<dyn Sink>, ConnectorError>;

pub static SOURCES: &[(&str, SourceConstructor)] =
    &[("file", file_source::build as SourceConstructor)];

pub static SINKS: &[(&str, SinkConstructor)] = &[
    ("file", file_sink::build as SinkConstructor),
    ("null", null_sink::build as SinkConstructor),
];

fn lookup<T: Copy>(table: &[(&str, T)], what: &str, name: &str) -> Result<T, ConnectorError> {
    table
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, ctor)| *ctor)
        .ok_or_else(|| {
            let known: Vec<&str> = table.iter().map(|(n, _)| *n).collect();
            ConnectorError::Config(format!(
                "unknown {what} type '{name}'; known: {}",
                known.join(", ")
            ))
        })
}

pub fn build_source(config: &SourceConfig) -> Result<Box<dyn Source>, ConnectorError> {
    let ctor = lookup(SOURCES, "source", &config.connector)?;
    ctor(config)
}

/// Build one sink, handing it the cache domain named after the sink.
pub fn build_sink(config: &SinkConfig, cache: &SharedCache) -> Result<Box<dyn Sink>, ConnectorError> {
    let ctor = lookup(SINKS, "sink", &config.connector)?;
    ctor(config, CacheDomain::new(Rc::clone(cache), &config.name))
}

pub fn build_sinks(
    configs: &[SinkConfig],
    cache: &SharedCache,
) -> Result<Vec<Box<dyn Sink>>, ConnectorError> {
    configs.iter().map(|c| build_sink(c, cache)).collect()
}

/// A file cache when configured, a null cache otherwise.
pub fn build_cache(config: Option<&CacheConfig>) -> SharedCache {
    match config {
        Some(c) => Rc::new(RefCell::new(FileCache::new(&c.path))),
        None => Rc::new(RefCell::new(NullCache)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
