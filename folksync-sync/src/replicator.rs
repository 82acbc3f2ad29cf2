//! Explicit state machine for one (sink, kind) replication pass.
//!
//! ```text
//! prepare:  FETCH → MATCH → DIFF
//! advance:  NOTIFY → CHOOSE_MODE ⇢ (mode) → for CREATED, UPDATED, DELETED:
//!             EMPTY | SKIPPED | EXEC → DONE
//! ```
//!
//! The driver calls [`Replication::advance`] until it returns `None`. The
//! only call that takes an input is the one right after a
//! [`ReplicationEvent::ChooseMode`]: it must carry the resolved mode. Batch
//! handlers run on the call following an `EXEC` event, so the driver always
//! renders the step before the sink is mutated.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use folksync_core::{ObjectKind, ReplicationMode};

use crate::change::{Action, ReplicationContext, StepState};
use crate::connector::{Sink, SourceRecords};
use crate::differ::{considered_keys, diff, DiffInput};
use crate::error::SyncError;
use crate::matcher::match_records;

/// What the driver must render or answer next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationEvent {
    /// The context is ready; observation only.
    Notify,
    /// The next `advance` call must carry the mode to use.
    ChooseMode { requested: ReplicationMode },
    Step { action: Action, state: StepState },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Notify,
    ChooseMode,
    AwaitMode,
    Step(usize),
    Apply(usize),
    Finished,
}

/// Outcome of one finished (sink, kind) pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationReport {
    pub sink: String,
    pub kind: ObjectKind,
    pub requested_mode: ReplicationMode,
    pub mode: ReplicationMode,
    pub stats: BTreeMap<Action, usize>,
    pub steps: BTreeMap<Action, StepState>,
}

#[derive(Debug)]
pub struct Replication {
    context: ReplicationContext,
    requested: ReplicationMode,
    mode: ReplicationMode,
    phase: Phase,
    steps: BTreeMap<Action, StepState>,
}

impl Replication {
    /// Start from an already computed context.
    pub fn new(context: ReplicationContext, mode: ReplicationMode) -> Self {
        Self {
            context,
            requested: mode,
            mode,
            phase: Phase::Notify,
            steps: BTreeMap::new(),
        }
    }

    /// Fetch the sink's records of `kind`, match them to `source` and diff.
    pub fn prepare(
        sink: &mut dyn Sink,
        kind: ObjectKind,
        source: &SourceRecords,
        only: &BTreeSet<String>,
        mode: ReplicationMode,
    ) -> Result<Self, SyncError> {
        let name = sink.name().to_string();
        let remote = sink.fetch(kind).map_err(|source| SyncError::Sink {
            name: name.clone(),
            source,
        })?;
        tracing::debug!(
            "sink {name}: fetched {} {}, source has {}",
            remote.len(),
            kind.plural(),
            source.len()
        );

        let matched = match_records(sink.uid_fields(kind), source, remote);
        let keys = considered_keys(source, &matched, only);
        let skipped = sink.skipped_keys(kind, &keys);

        let sink: &dyn Sink = sink;
        let context = diff(
            DiffInput {
                sink: &name,
                kind,
                keys: &keys,
                source,
                remote: &matched,
                skipped: &skipped,
            },
            |remote, local| sink.merge(remote, local),
        )?;
        Ok(Self::new(context, mode))
    }

    pub fn context(&self) -> &ReplicationContext {
        &self.context
    }

    /// The mode in effect: the requested one until a mode has been supplied.
    pub fn mode(&self) -> ReplicationMode {
        self.mode
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Move to the next event.
    ///
    /// `input` must be `Some` exactly when the previous event was
    /// [`ReplicationEvent::ChooseMode`]; anything else is an invariant
    /// violation. A failing batch finishes the pass with [`SyncError::Apply`].
    pub fn advance(
        &mut self,
        sink: &mut dyn Sink,
        input: Option<ReplicationMode>,
    ) -> Result<Option<ReplicationEvent>, SyncError> {
        if input.is_some() && self.phase != Phase::AwaitMode {
            return Err(SyncError::Invariant(format!(
                "sink '{}': a mode was supplied outside of mode selection",
                self.context.sink
            )));
        }

        match self.phase {
            Phase::Notify => {
                self.phase = Phase::ChooseMode;
                Ok(Some(ReplicationEvent::Notify))
            }
            Phase::ChooseMode => {
                self.phase = Phase::AwaitMode;
                Ok(Some(ReplicationEvent::ChooseMode {
                    requested: self.mode,
                }))
            }
            Phase::AwaitMode => {
                let Some(mode) = input else {
                    return Err(SyncError::Invariant(format!(
                        "sink '{}': mode selection resumed without a mode",
                        self.context.sink
                    )));
                };
                self.mode = mode;
                Ok(self.step(0))
            }
            Phase::Step(index) => Ok(self.step(index)),
            Phase::Apply(index) => self.apply(sink, index).map(Some),
            Phase::Finished => Ok(None),
        }
    }

    fn step(&mut self, index: usize) -> Option<ReplicationEvent> {
        let Some(&action) = Action::APPLIED.get(index) else {
            self.phase = Phase::Finished;
            return None;
        };

        let state = if self.context.count(action) == 0 {
            StepState::Empty
        } else if !action.allowed_modes().contains(&self.mode) {
            StepState::Skipped
        } else {
            StepState::Exec
        };
        self.steps.insert(action, state);
        self.phase = if state == StepState::Exec {
            Phase::Apply(index)
        } else {
            Phase::Step(index + 1)
        };
        Some(ReplicationEvent::Step { action, state })
    }

    fn apply(&mut self, sink: &mut dyn Sink, index: usize) -> Result<ReplicationEvent, SyncError> {
        let action = Action::APPLIED[index];
        let kind = self.context.kind;
        let changes = self.context.changes(action);

        let result = match action {
            Action::Created => sink.create_batch(kind, changes),
            Action::Updated => sink.update_batch(kind, changes),
            Action::Deleted => sink.delete_batch(kind, changes),
            other => {
                self.phase = Phase::Finished;
                return Err(SyncError::Invariant(format!(
                    "{other} changes are never applied"
                )));
            }
        };

        if let Err(source) = result {
            self.phase = Phase::Finished;
            return Err(SyncError::Apply {
                sink: self.context.sink.clone(),
                kind,
                action,
                source,
            });
        }

        self.steps.insert(action, StepState::Done);
        self.phase = Phase::Step(index + 1);
        Ok(ReplicationEvent::Step {
            action,
            state: StepState::Done,
        })
    }

    pub fn into_report(self) -> ReplicationReport {
        ReplicationReport {
            sink: self.context.sink.clone(),
            kind: self.context.kind,
            requested_mode: self.requested,
            mode: self.mode,
            stats: self.context.stats(),
            steps: self.steps,
        }
    }
}
