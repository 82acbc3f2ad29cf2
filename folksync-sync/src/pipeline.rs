//! Drive replications across every sink and object kind.
//!
//! Sinks are processed sequentially in the given order, kinds in
//! [`ObjectKind::ALL`] order within a sink. A sink failure (connect, fetch or
//! batch) ends that sink's run and the next sink starts; source failures and
//! invariant violations abort the whole run.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use folksync_core::{ObjectKind, ReplicationMode, SharedCache};

use crate::connector::{Sink, Source, SourceRecords};
use crate::error::SyncError;
use crate::interactor::Interactor;
use crate::replicator::{Replication, ReplicationEvent, ReplicationReport};

/// Run-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub mode: ReplicationMode,
    /// Restrict the run to these key ids; empty means every key.
    pub only_keys: BTreeSet<String>,
}

/// Per-sink result of a run.
#[derive(Debug, Serialize)]
pub struct SinkOutcome {
    pub sink: String,
    /// Reports of every kind completed before a failure (all of them on success).
    pub reports: Vec<ReplicationReport>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<SyncError>,
}

impl SinkOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<SyncError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub sinks: Vec<SinkOutcome>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.sinks.iter().all(SinkOutcome::is_success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &SinkOutcome> {
        self.sinks.iter().filter(|o| !o.is_success())
    }
}

/// Feed every event of `replication` to `interactor` until it finishes.
pub fn drive(
    replication: &mut Replication,
    sink: &mut dyn Sink,
    interactor: &mut dyn Interactor,
) -> Result<(), SyncError> {
    let mut input = None;
    while let Some(event) = replication.advance(sink, input.take())? {
        match event {
            ReplicationEvent::Notify => interactor.notify_changes(replication.context())?,
            ReplicationEvent::ChooseMode { requested } => {
                input = Some(interactor.choose_mode(replication.context(), requested)?);
            }
            ReplicationEvent::Step { action, state } => {
                interactor.notify_step(replication.context(), action, state)?;
            }
        }
    }
    Ok(())
}

/// Fetch every kind from the source. Any failure is fatal.
pub fn fetch_source(
    source: &mut dyn Source,
) -> Result<BTreeMap<ObjectKind, SourceRecords>, SyncError> {
    let name = source.name().to_string();
    let wrap = |e| SyncError::Source {
        name: name.clone(),
        source: e,
    };
    source.connect().map_err(wrap)?;
    let mut data = BTreeMap::new();
    for kind in ObjectKind::ALL {
        let records = source.fetch(kind).map_err(wrap)?;
        tracing::info!("source {name}: {} {}", records.len(), kind.plural());
        data.insert(kind, records);
    }
    Ok(data)
}

/// Replicate every kind into one sink, pushing finished reports into `reports`.
///
/// Every kind starts from `options.mode`; a downgrade on one kind does not
/// carry over to the next.
pub fn sync_sink(
    data: &BTreeMap<ObjectKind, SourceRecords>,
    sink: &mut dyn Sink,
    interactor: &mut dyn Interactor,
    options: &SyncOptions,
    reports: &mut Vec<ReplicationReport>,
) -> Result<(), SyncError> {
    let name = sink.name().to_string();
    sink.connect()
        .map_err(|source| SyncError::Sink { name, source })?;

    let empty = SourceRecords::new();
    for kind in ObjectKind::ALL {
        let records = data.get(&kind).unwrap_or(&empty);
        let mut replication =
            Replication::prepare(sink, kind, records, &options.only_keys, options.mode)?;
        drive(&mut replication, sink, interactor)?;
        reports.push(replication.into_report());
    }
    Ok(())
}

/// Full run: source fetch, then every sink in order.
///
/// The cache, when given, is opened before the first sink and committed after
/// the last one, including when a sink failed. It is not committed when the
/// run aborts.
pub fn sync_all(
    source: &mut dyn Source,
    sinks: &mut [Box<dyn Sink>],
    interactor: &mut dyn Interactor,
    cache: Option<&SharedCache>,
    options: &SyncOptions,
) -> Result<RunSummary, SyncError> {
    let data = fetch_source(source)?;

    if let Some(cache) = cache {
        cache.borrow_mut().open()?;
    }

    let mut summary = RunSummary::default();
    for sink in sinks.iter_mut() {
        let mut outcome = SinkOutcome {
            sink: sink.name().to_string(),
            reports: Vec::new(),
            error: None,
        };
        match sync_sink(&data, sink.as_mut(), interactor, options, &mut outcome.reports) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!("{e}");
                outcome.error = Some(e);
            }
        }
        summary.sinks.push(outcome);
    }

    if let Some(cache) = cache {
        cache.borrow_mut().commit()?;
    }
    Ok(summary)
}
