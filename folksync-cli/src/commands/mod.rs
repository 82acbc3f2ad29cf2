pub mod diff;
pub mod sync;

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};

use folksync_connectors::registry;
use folksync_core::{config, Config, SharedCache};
use folksync_sync::{Sink, Source};

/// Everything a run needs, built from the config file.
pub struct Setup {
    pub config: Config,
    pub source: Box<dyn Source>,
    pub sinks: Vec<Box<dyn Sink>>,
    pub cache: SharedCache,
}

impl Setup {
    pub fn load(path: &Path) -> Result<Self> {
        let config = config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        tracing::debug!(
            "config {}: {} sinks, mode {}",
            path.display(),
            config.sinks.len(),
            config.mode
        );
        let source = registry::build_source(&config.source)
            .with_context(|| format!("cannot build source '{}'", config.source.connector))?;
        let cache = registry::build_cache(config.cache.as_ref());
        let sinks = registry::build_sinks(&config.sinks, &cache).context("cannot build sinks")?;
        Ok(Self {
            config,
            source,
            sinks,
            cache,
        })
    }
}

pub fn only_keys(keys: Vec<String>) -> BTreeSet<String> {
    keys.into_iter().collect()
}
