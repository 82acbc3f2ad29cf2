//! Mode policy: decide whether the requested mode holds for one sink run.
//!
//! - [`KeepMode`] — returns the requested mode unchanged.
//! - [`ThresholdDecider`] — automatic circuit breaker on blast-radius ratios.
//! - [`ShellDecider`] — asks an operator on a line-oriented terminal.
//! - [`DeciderChain`] — consults several deciders in order, each seeing the
//!   previous one's answer.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use folksync_core::{ReplicationMode, ThresholdConfig};

use crate::change::{Action, ReplicationContext};
use crate::error::SyncError;

pub trait Decider {
    fn choose_mode(
        &mut self,
        context: &ReplicationContext,
        mode: ReplicationMode,
    ) -> Result<ReplicationMode, SyncError>;
}

impl<D: Decider + ?Sized> Decider for Box<D> {
    fn choose_mode(
        &mut self,
        context: &ReplicationContext,
        mode: ReplicationMode,
    ) -> Result<ReplicationMode, SyncError> {
        (**self).choose_mode(context, mode)
    }
}

// ---------------------------------------------------------------------------
// KeepMode
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct KeepMode;

impl Decider for KeepMode {
    fn choose_mode(
        &mut self,
        _context: &ReplicationContext,
        mode: ReplicationMode,
    ) -> Result<ReplicationMode, SyncError> {
        Ok(mode)
    }
}

// ---------------------------------------------------------------------------
// ThresholdDecider
// ---------------------------------------------------------------------------

/// Downgrades the mode by one step when any monitored action affects a
/// larger fraction of the keys than its configured ratio.
///
/// The comparison is strict: a ratio equal to the threshold passes. An empty
/// ratio base never downgrades.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdDecider {
    ratios: BTreeMap<Action, f64>,
}

impl ThresholdDecider {
    /// Same ratio for every monitored action.
    pub fn new(common_ratio: f64) -> Self {
        Self {
            ratios: Action::MONITORED
                .iter()
                .map(|a| (*a, common_ratio))
                .collect(),
        }
    }

    pub fn from_config(config: &ThresholdConfig) -> Self {
        Self {
            ratios: BTreeMap::from([
                (Action::Created, config.created()),
                (Action::Updated, config.updated()),
                (Action::Skipped, config.skipped()),
                (Action::Deleted, config.deleted()),
            ]),
        }
    }

    pub fn with_ratio(mut self, action: Action, ratio: f64) -> Self {
        self.ratios.insert(action, ratio);
        self
    }

    pub fn ratio(&self, action: Action) -> Option<f64> {
        self.ratios.get(&action).copied()
    }

    /// The first monitored action over its threshold, with its observed ratio.
    pub fn exceeded(&self, context: &ReplicationContext) -> Option<(Action, f64)> {
        Action::MONITORED.iter().find_map(|action| {
            let limit = self.ratio(*action)?;
            let observed = context.ratio(*action)?;
            (observed > limit).then_some((*action, observed))
        })
    }

    pub fn should_downgrade(&self, context: &ReplicationContext) -> bool {
        self.exceeded(context).is_some()
    }
}

impl Default for ThresholdDecider {
    fn default() -> Self {
        Self::from_config(&ThresholdConfig::default())
    }
}

impl Decider for ThresholdDecider {
    fn choose_mode(
        &mut self,
        context: &ReplicationContext,
        mode: ReplicationMode,
    ) -> Result<ReplicationMode, SyncError> {
        if mode == ReplicationMode::DryRun {
            return Ok(mode);
        }
        match self.exceeded(context) {
            Some((action, observed)) => {
                let downgraded = mode.downgrade();
                tracing::warn!(
                    "sink {}: {action} ratio {observed:.3} exceeds {:.3} on {} {}, downgrading {mode} to {downgraded}",
                    context.sink,
                    self.ratio(action).unwrap_or_default(),
                    context.ratio_base(),
                    context.kind.plural(),
                );
                Ok(downgraded)
            }
            None => Ok(mode),
        }
    }
}

// ---------------------------------------------------------------------------
// ShellDecider
// ---------------------------------------------------------------------------

/// Prompts on `output` and reads one line at a time from `input`.
///
/// Empty input (or end of input) keeps the current mode; a mode code or name
/// switches to it; anything else re-prompts. A pass with nothing to apply is
/// not prompted for.
pub struct ShellDecider<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ShellDecider<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn prompt_line(mode: ReplicationMode) -> String {
        let options = ReplicationMode::ALL
            .iter()
            .map(|m| {
                if *m == mode {
                    format!("[{}]/{}", m.code(), m.name())
                } else {
                    format!("{}/{}", m.code(), m.name())
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!("Choose mode: {options}; enter to keep active mode\n")
    }
}

impl ShellDecider<io::StdinLock<'static>, io::Stderr> {
    /// Prompt on stderr, read from stdin.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> Decider for ShellDecider<R, W> {
    fn choose_mode(
        &mut self,
        context: &ReplicationContext,
        mode: ReplicationMode,
    ) -> Result<ReplicationMode, SyncError> {
        if mode == ReplicationMode::DryRun || !context.has_pending() {
            return Ok(mode);
        }

        let prompt = Self::prompt_line(mode);
        loop {
            self.output.write_all(prompt.as_bytes())?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                tracing::warn!("no answer on input, keeping {mode}");
                return Ok(mode);
            }
            let choice = line.trim();
            if choice.is_empty() {
                return Ok(mode);
            }
            match choice.parse::<ReplicationMode>() {
                Ok(chosen) => return Ok(chosen),
                Err(_) => {
                    write!(self.output, "Choice {choice:?} is not a valid option.\n\n")?;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DeciderChain
// ---------------------------------------------------------------------------

/// Runs deciders in order; each receives the previous answer.
#[derive(Default)]
pub struct DeciderChain {
    deciders: Vec<Box<dyn Decider>>,
}

impl DeciderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, decider: impl Decider + 'static) -> Self {
        self.deciders.push(Box::new(decider));
        self
    }

    pub fn len(&self) -> usize {
        self.deciders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deciders.is_empty()
    }
}

impl Decider for DeciderChain {
    fn choose_mode(
        &mut self,
        context: &ReplicationContext,
        mode: ReplicationMode,
    ) -> Result<ReplicationMode, SyncError> {
        let mut mode = mode;
        for decider in &mut self.deciders {
            mode = decider.choose_mode(context, mode)?;
        }
        Ok(mode)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
