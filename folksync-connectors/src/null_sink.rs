//! `null` sink: holds nothing, so every source record is a creation.
//!
//! Batches are only logged. Useful to preview a source export.

use folksync_core::{CacheDomain, ObjectKind, Record, RemoteRecord, SinkConfig};
use folksync_sync::{Action, ChangeSet, ConnectorError, Delta, RemoteRecords, Sink};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct NullSink {
    name: String,
}

impl NullSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log(&self, action: Action, kind: ObjectKind, changes: &ChangeSet) {
        tracing::info!(
            "sink {}: discarding {action} of {} {}",
            self.name,
            changes.len(),
            kind.plural()
        );
    }
}

/// Registry constructor.
pub fn build(config: &SinkConfig, _cache: CacheDomain) -> Result<Box<dyn Sink>, ConnectorError> {
    Ok(Box::new(NullSink::new(&config.name)))
}

impl Sink for NullSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<(), ConnectorError> {
        Ok(())
    }

    fn fetch(&mut self, _kind: ObjectKind) -> Result<RemoteRecords, ConnectorError> {
        Ok(RemoteRecords::new())
    }

    fn merge(&self, _remote: Option<&RemoteRecord>, local: &Record) -> Delta {
        Delta::Changed(json!({ "hrid": local.hrid() }))
    }

    fn create_batch(&mut self, kind: ObjectKind, changes: &ChangeSet) -> Result<(), ConnectorError> {
        self.log(Action::Created, kind, changes);
        Ok(())
    }

    fn update_batch(&mut self, kind: ObjectKind, changes: &ChangeSet) -> Result<(), ConnectorError> {
        self.log(Action::Updated, kind, changes);
        Ok(())
    }

    fn delete_batch(&mut self, kind: ObjectKind, changes: &ChangeSet) -> Result<(), ConnectorError> {
        self.log(Action::Deleted, kind, changes);
        Ok(())
    }
}
