//! `folksync sync` — replicate the source into every configured sink.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use folksync_core::ReplicationMode;
use folksync_sync::{
    sync_all, Action, DeciderChain, Interactor, LogInteractor, PromptInteractor, RunSummary,
    ShellDecider, SyncOptions, ThresholdDecider,
};

use super::{only_keys, Setup};
use crate::logging;

/// Arguments for `folksync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Path to the YAML config file.
    pub config: PathBuf,

    /// Compute and report every change without applying any.
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Ask for the mode before applying each sink.
    #[arg(long)]
    pub interactive: bool,

    /// Only replicate these identifiers (repeatable).
    #[arg(long = "only", value_name = "KEY")]
    pub only: Vec<String>,

    /// Append logs to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Emit the run summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        logging::init(self.log_file.as_deref())?;

        let mut setup = Setup::load(&self.config)?;
        if self.dry_run {
            setup.config.mode = ReplicationMode::DryRun;
        }

        let threshold = ThresholdDecider::from_config(&setup.config.threshold);
        let mut interactor: Box<dyn Interactor> =
            if self.interactive || setup.config.interactive {
                let chain = DeciderChain::new()
                    .then(threshold)
                    .then(ShellDecider::stdio());
                Box::new(PromptInteractor::stderr(chain))
            } else {
                Box::new(LogInteractor::new(threshold))
            };

        let options = SyncOptions {
            mode: setup.config.mode,
            only_keys: only_keys(self.only),
        };
        tracing::info!("replicating in {} mode", options.mode);

        let summary = sync_all(
            setup.source.as_mut(),
            &mut setup.sinks,
            interactor.as_mut(),
            Some(&setup.cache),
            &options,
        )
        .context("replication aborted")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to serialize summary")?
            );
        } else {
            print_table(&summary);
        }

        let failed = summary.failed().count();
        if failed > 0 {
            bail!("{failed} of {} sinks failed", summary.sinks.len());
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "sink")]
    sink: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "mode")]
    mode: String,
    #[tabled(rename = "created")]
    created: usize,
    #[tabled(rename = "updated")]
    updated: usize,
    #[tabled(rename = "deleted")]
    deleted: usize,
    #[tabled(rename = "skipped")]
    skipped: usize,
    #[tabled(rename = "unchanged")]
    unchanged: usize,
}

fn print_table(summary: &RunSummary) {
    if summary.sinks.is_empty() {
        println!("No sinks configured.");
        return;
    }

    let mut rows = Vec::new();
    for outcome in &summary.sinks {
        for report in &outcome.reports {
            let mode = if report.mode == report.requested_mode {
                report.mode.to_string()
            } else {
                format!("{} → {}", report.requested_mode, report.mode)
            };
            rows.push(SummaryRow {
                sink: outcome.sink.clone(),
                kind: report.kind.plural().to_string(),
                mode,
                created: report.stats[&Action::Created],
                updated: report.stats[&Action::Updated],
                deleted: report.stats[&Action::Deleted],
                skipped: report.stats[&Action::Skipped],
                unchanged: report.stats[&Action::Unchanged],
            });
        }
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for outcome in &summary.sinks {
        match &outcome.error {
            Some(e) => println!("{} {}: {e}", "✗".red(), outcome.sink.bold()),
            None => println!("{} {}", "✓".green(), outcome.sink.bold()),
        }
    }
}
