//! The capability sets the engine expects from sources and sinks.

use std::collections::{BTreeMap, BTreeSet};

use folksync_core::{Key, ObjectKind, Record, RemoteRecord, UidField};

use crate::change::{ChangeSet, Delta};
use crate::error::ConnectorError;

/// Source records of one kind, keyed by [`Key::Local`].
pub type SourceRecords = BTreeMap<Key, Record>;

/// Sink records of one kind, keyed by sink-native identifier.
pub type RemoteRecords = BTreeMap<String, RemoteRecord>;

/// The single authoritative system identities are read from.
pub trait Source {
    fn name(&self) -> &str;

    /// Idempotent setup. Authentication or network failure is fatal for the run.
    fn connect(&mut self) -> Result<(), ConnectorError>;

    fn fetch(&mut self, kind: ObjectKind) -> Result<SourceRecords, ConnectorError>;
}

/// A target system identities are replicated into.
///
/// # Batch contract
///
/// `create_batch`, `update_batch` and `delete_batch` receive every change of
/// their action at once and are all-or-nothing from the engine's point of
/// view: `Ok(())` means every change was applied, `Err` means the step failed
/// as a whole and the engine reports it so. A sink that can apply part of a
/// batch must still report the failure; any retry or backoff happens inside
/// the call.
pub trait Sink {
    /// Unique name; also used as the sink's cache domain.
    fn name(&self) -> &str;

    fn connect(&mut self) -> Result<(), ConnectorError>;

    fn fetch(&mut self, kind: ObjectKind) -> Result<RemoteRecords, ConnectorError>;

    /// Identifier fields used to match this sink's records, highest priority first.
    fn uid_fields(&self, kind: ObjectKind) -> &'static [UidField] {
        kind.uid_fields()
    }

    /// Keys among `keys` the sink must never touch (service accounts...).
    fn skipped_keys(&self, _kind: ObjectKind, _keys: &BTreeSet<Key>) -> BTreeSet<Key> {
        BTreeSet::new()
    }

    /// Compute what would change on the sink to make `remote` reflect `local`.
    fn merge(&self, remote: Option<&RemoteRecord>, local: &Record) -> Delta;

    fn create_batch(&mut self, kind: ObjectKind, changes: &ChangeSet)
        -> Result<(), ConnectorError>;

    fn update_batch(&mut self, kind: ObjectKind, changes: &ChangeSet)
        -> Result<(), ConnectorError>;

    fn delete_batch(&mut self, kind: ObjectKind, changes: &ChangeSet)
        -> Result<(), ConnectorError>;
}
