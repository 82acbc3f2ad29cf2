//! `folksync diff` — print every pending change without applying anything.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::{ColoredString, Colorize};

use folksync_core::ReplicationMode;
use folksync_sync::{
    sync_all, Action, Interactor, ReplicationContext, StepState, SyncError, SyncOptions,
};

use super::{only_keys, Setup};
use crate::logging;

/// Arguments for `folksync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Path to the YAML config file.
    pub config: PathBuf,

    /// Only show these identifiers (repeatable).
    #[arg(long = "only", value_name = "KEY")]
    pub only: Vec<String>,

    /// Append logs to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        logging::init(self.log_file.as_deref())?;

        let mut setup = Setup::load(&self.config)?;
        // Opened here and never committed: a diff leaves the cache file alone.
        setup
            .cache
            .borrow_mut()
            .open()
            .context("failed to open cache")?;

        let options = SyncOptions {
            mode: ReplicationMode::DryRun,
            only_keys: only_keys(self.only),
        };
        let mut printer = DiffPrinter::default();
        let summary = sync_all(
            setup.source.as_mut(),
            &mut setup.sinks,
            &mut printer,
            None,
            &options,
        )
        .context("diff aborted")?;

        if printer.printed == 0 {
            println!("No differences.");
        }
        for outcome in summary.failed() {
            if let Some(e) = &outcome.error {
                eprintln!("{} {}: {e}", "✗".red(), outcome.sink.bold());
            }
        }

        let failed = summary.failed().count();
        if failed > 0 {
            bail!("{failed} of {} sinks failed", summary.sinks.len());
        }
        Ok(())
    }
}

/// Prints the pending changes of each pass as soon as they are known.
#[derive(Default)]
struct DiffPrinter {
    printed: usize,
}

fn action_label(action: Action) -> ColoredString {
    match action {
        Action::Created => action.name().green(),
        Action::Updated => action.name().yellow(),
        Action::Deleted => action.name().red(),
        Action::Skipped | Action::Unchanged => action.name().dimmed(),
    }
}

impl Interactor for DiffPrinter {
    fn notify_changes(&mut self, context: &ReplicationContext) -> Result<(), SyncError> {
        for action in [Action::Created, Action::Updated, Action::Deleted, Action::Skipped] {
            for change in context.changes(action).values() {
                let delta = change
                    .delta
                    .as_ref()
                    .map_or_else(String::new, |d| format!(" {d}"));
                println!(
                    "{} {} {} {}{delta}",
                    context.sink,
                    context.kind,
                    action_label(action),
                    change.key
                );
                self.printed += 1;
            }
        }
        Ok(())
    }

    fn choose_mode(
        &mut self,
        _context: &ReplicationContext,
        _requested: ReplicationMode,
    ) -> Result<ReplicationMode, SyncError> {
        Ok(ReplicationMode::DryRun)
    }

    fn notify_step(
        &mut self,
        _context: &ReplicationContext,
        _action: Action,
        _state: StepState,
    ) -> Result<(), SyncError> {
        Ok(())
    }
}
