//! Consumers of replication events.
//!
//! Both interactors render the same lines; [`LogInteractor`] sends them to the
//! log at `info` level, [`PromptInteractor`] writes them to a terminal. Mode
//! requests are answered by the wrapped [`Decider`].

use std::io::{self, Write};

use folksync_core::ReplicationMode;

use crate::change::{Action, ReplicationContext, StepState};
use crate::decider::Decider;
use crate::error::SyncError;

pub trait Interactor {
    /// Aggregated changes of one (sink, kind) pass. Observation only.
    fn notify_changes(&mut self, context: &ReplicationContext) -> Result<(), SyncError>;

    /// Resolve the mode for the rest of the pass.
    fn choose_mode(
        &mut self,
        context: &ReplicationContext,
        requested: ReplicationMode,
    ) -> Result<ReplicationMode, SyncError>;

    fn notify_step(
        &mut self,
        context: &ReplicationContext,
        action: Action,
        state: StepState,
    ) -> Result<(), SyncError>;
}

// ---------------------------------------------------------------------------
// Line rendering
// ---------------------------------------------------------------------------

/// `None` when nothing was considered.
pub fn summary_line(context: &ReplicationContext) -> Option<String> {
    if context.total() == 0 {
        return None;
    }
    Some(format!(
        "Replicating {} {} to sink {}: created={}, updated={}, skipped={}, deleted={}",
        context.total(),
        context.kind.plural(),
        context.sink,
        context.count(Action::Created),
        context.count(Action::Updated),
        context.count(Action::Skipped),
        context.count(Action::Deleted),
    ))
}

pub fn mode_line(requested: ReplicationMode, chosen: ReplicationMode) -> String {
    if requested == chosen {
        format!("Replicating in {} mode", chosen.name())
    } else {
        format!("Switched mode from {} to {}", requested.name(), chosen.name())
    }
}

/// Step header, item count right-aligned to the width of the total key count.
pub fn step_line(context: &ReplicationContext, action: Action, state: StepState) -> String {
    let width = context.total().to_string().len();
    format!(
        "Sink {}: {} {:>width$} items: {}",
        context.sink,
        action,
        context.count(action),
        state.label(),
    )
}

/// One line per key, only before a batch runs.
pub fn change_lines(context: &ReplicationContext, action: Action) -> Vec<String> {
    context
        .changes(action)
        .values()
        .map(|change| {
            let delta = change
                .delta
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string);
            format!("Sink {}: {}: {} {}", change.sink, action, change.key, delta)
        })
        .collect()
}

fn step_lines(context: &ReplicationContext, action: Action, state: StepState) -> Vec<String> {
    let mut lines = vec![step_line(context, action, state)];
    if state == StepState::Exec {
        lines.extend(change_lines(context, action));
    }
    lines
}

// ---------------------------------------------------------------------------
// LogInteractor
// ---------------------------------------------------------------------------

/// Batch/automation interactor: everything goes to the log.
pub struct LogInteractor {
    decider: Box<dyn Decider>,
}

impl LogInteractor {
    pub fn new(decider: impl Decider + 'static) -> Self {
        Self {
            decider: Box::new(decider),
        }
    }
}

impl Interactor for LogInteractor {
    fn notify_changes(&mut self, context: &ReplicationContext) -> Result<(), SyncError> {
        if let Some(line) = summary_line(context) {
            tracing::info!("{line}");
        }
        Ok(())
    }

    fn choose_mode(
        &mut self,
        context: &ReplicationContext,
        requested: ReplicationMode,
    ) -> Result<ReplicationMode, SyncError> {
        let chosen = self.decider.choose_mode(context, requested)?;
        tracing::info!("{}", mode_line(requested, chosen));
        Ok(chosen)
    }

    fn notify_step(
        &mut self,
        context: &ReplicationContext,
        action: Action,
        state: StepState,
    ) -> Result<(), SyncError> {
        for line in step_lines(context, action, state) {
            tracing::info!("{line}");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PromptInteractor
// ---------------------------------------------------------------------------

/// Operator interactor: lines are written to `output` so they show up next to
/// the mode prompt, and are mirrored to the log at debug level.
pub struct PromptInteractor<W> {
    output: W,
    decider: Box<dyn Decider>,
}

impl<W: Write> PromptInteractor<W> {
    pub fn new(output: W, decider: impl Decider + 'static) -> Self {
        Self {
            output,
            decider: Box::new(decider),
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn display(&mut self, line: &str) -> io::Result<()> {
        tracing::debug!("{line}");
        writeln!(self.output, "{line}")
    }
}

impl PromptInteractor<io::Stderr> {
    pub fn stderr(decider: impl Decider + 'static) -> Self {
        Self::new(io::stderr(), decider)
    }
}

impl<W: Write> Interactor for PromptInteractor<W> {
    fn notify_changes(&mut self, context: &ReplicationContext) -> Result<(), SyncError> {
        if let Some(line) = summary_line(context) {
            self.display(&line)?;
        }
        Ok(())
    }

    fn choose_mode(
        &mut self,
        context: &ReplicationContext,
        requested: ReplicationMode,
    ) -> Result<ReplicationMode, SyncError> {
        self.output.flush()?;
        let chosen = self.decider.choose_mode(context, requested)?;
        self.display(&mode_line(requested, chosen))?;
        Ok(chosen)
    }

    fn notify_step(
        &mut self,
        context: &ReplicationContext,
        action: Action,
        state: StepState,
    ) -> Result<(), SyncError> {
        for line in step_lines(context, action, state) {
            self.display(&line)?;
        }
        self.output.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{Change, Delta};
    use crate::decider::{KeepMode, ThresholdDecider};
    use folksync_core::{Account, Key, ObjectKind, Record};
    use serde_json::json;

    fn context() -> ReplicationContext {
        let mut ctx = ReplicationContext::new("directory", ObjectKind::Account);
        for (key, action) in [
            ("alice", Action::Created),
            ("bob", Action::Unchanged),
            ("carol", Action::Unchanged),
        ] {
            ctx.record(Change {
                action,
                key: Key::local(key),
                previous: None,
                target: Some(Record::from(Account::new(key))),
                sink: "directory".into(),
                delta: Some(Delta::Changed(json!({ "new": key }))),
            });
        }
        ctx
    }

    #[test]
    fn summary_reports_every_monitored_count() {
        assert_eq!(
            summary_line(&context()).as_deref(),
            Some(
                "Replicating 3 accounts to sink directory: created=1, updated=0, skipped=0, deleted=0"
            )
        );
        let empty = ReplicationContext::new("directory", ObjectKind::Group);
        assert_eq!(summary_line(&empty), None);
    }

    #[test]
    fn mode_line_mentions_switches() {
        assert_eq!(
            mode_line(ReplicationMode::Full, ReplicationMode::Full),
            "Replicating in FULL mode"
        );
        assert_eq!(
            mode_line(ReplicationMode::Full, ReplicationMode::Additive),
            "Switched mode from FULL to ADDITIVE"
        );
    }

    #[test]
    fn exec_step_lists_each_change() {
        let mut interactor = PromptInteractor::new(Vec::new(), KeepMode);
        let ctx = context();
        interactor
            .notify_step(&ctx, Action::Created, StepState::Exec)
            .unwrap();
        interactor
            .notify_step(&ctx, Action::Deleted, StepState::Empty)
            .unwrap();
        let out = String::from_utf8(interactor.into_output()).unwrap();
        assert_eq!(
            out,
            "Sink directory: CREATED 1 items: Start\n\
             Sink directory: CREATED: alice {\"new\":\"alice\"}\n\
             Sink directory: DELETED 0 items: Nothing to do\n"
        );
    }

    #[test]
    fn choose_mode_delegates_to_decider() {
        let mut interactor = PromptInteractor::new(Vec::new(), ThresholdDecider::new(0.1));
        let chosen = interactor
            .choose_mode(&context(), ReplicationMode::Full)
            .unwrap();
        assert_eq!(chosen, ReplicationMode::Additive);
        let out = String::from_utf8(interactor.into_output()).unwrap();
        assert_eq!(out, "Switched mode from FULL to ADDITIVE\n");
    }

    #[test]
    fn log_interactor_keeps_mode_with_keep_decider() {
        let mut interactor = LogInteractor::new(KeepMode);
        let chosen = interactor
            .choose_mode(&context(), ReplicationMode::Additive)
            .unwrap();
        assert_eq!(chosen, ReplicationMode::Additive);
    }
}
