//! # folksync-sync
//!
//! Replication engine: match sink records to source identities, classify
//! every key, decide the mode and apply batches sink by sink.
//!
//! Call [`sync_all`] for a complete run, or drive a single [`Replication`]
//! with [`drive`] and an [`Interactor`] of your choice.

pub mod change;
pub mod connector;
pub mod decider;
pub mod differ;
pub mod error;
pub mod interactor;
pub mod matcher;
pub mod pipeline;
pub mod replicator;

pub use change::{Action, Change, ChangeSet, Delta, ReplicationContext, StepState};
pub use connector::{RemoteRecords, Sink, Source, SourceRecords};
pub use decider::{Decider, DeciderChain, KeepMode, ShellDecider, ThresholdDecider};
pub use error::{io_err, ConnectorError, SyncError};
pub use interactor::{Interactor, LogInteractor, PromptInteractor};
pub use pipeline::{drive, fetch_source, sync_all, sync_sink, RunSummary, SinkOutcome, SyncOptions};
pub use replicator::{Replication, ReplicationEvent, ReplicationReport};
