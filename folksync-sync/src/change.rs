//! Per-key dispositions and the aggregated context of one replication pass.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use folksync_core::{Key, ObjectKind, Record, RemoteRecord, ReplicationMode};

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// The disposition computed for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// New item to create on the sink.
    Created,
    /// Item to update on the sink.
    Updated,
    /// Explicitly ignored by the sink's skip list.
    Skipped,
    /// No change, no update.
    Unchanged,
    /// Item no longer exists on the source.
    Deleted,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Created,
        Action::Updated,
        Action::Skipped,
        Action::Unchanged,
        Action::Deleted,
    ];

    /// Actions applied to sinks, in apply order.
    pub const APPLIED: [Action; 3] = [Action::Created, Action::Updated, Action::Deleted];

    /// Actions the threshold decider watches.
    pub const MONITORED: [Action; 4] = [
        Action::Created,
        Action::Updated,
        Action::Skipped,
        Action::Deleted,
    ];

    /// Modes under which changes of this action are applied.
    pub fn allowed_modes(self) -> &'static [ReplicationMode] {
        match self {
            Action::Created | Action::Updated => {
                &[ReplicationMode::Additive, ReplicationMode::Full]
            }
            Action::Deleted => &[ReplicationMode::Full],
            Action::Skipped | Action::Unchanged => &[],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::Created => "CREATED",
            Action::Updated => "UPDATED",
            Action::Skipped => "SKIPPED",
            Action::Unchanged => "UNCHANGED",
            Action::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// StepState
// ---------------------------------------------------------------------------

/// State of one (sink, action) apply step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    /// No changes of that action.
    Empty,
    /// Changes exist but the resolved mode does not allow applying them.
    Skipped,
    /// About to call the sink's batch handler.
    Exec,
    /// The batch handler returned successfully.
    Done,
}

impl StepState {
    pub fn label(self) -> &'static str {
        match self {
            StepState::Empty => "Nothing to do",
            StepState::Skipped => "Disabled",
            StepState::Exec => "Start",
            StepState::Done => "Done",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Delta / Change
// ---------------------------------------------------------------------------

/// What a sink's merge function reports for one record.
///
/// An empty-but-present payload is still [`Delta::Changed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "payload", rename_all = "lowercase")]
pub enum Delta {
    Unchanged,
    Changed(serde_json::Value),
}

impl Delta {
    pub fn is_changed(&self) -> bool {
        matches!(self, Delta::Changed(_))
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Delta::Changed(payload) => Some(payload),
            Delta::Unchanged => None,
        }
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delta::Unchanged => f.write_str("-"),
            Delta::Changed(payload) => payload.fmt(f),
        }
    }
}

/// One key's disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub action: Action,
    pub key: Key,
    /// Sink-side record; `None` for a creation or a skip.
    pub previous: Option<RemoteRecord>,
    /// Source-side record; `None` for a deletion.
    pub target: Option<Record>,
    /// Name of the sink owning the change.
    pub sink: String,
    /// `None` for deletions and skips.
    pub delta: Option<Delta>,
}

/// Changes of one action, keyed and ordered by key.
pub type ChangeSet = BTreeMap<Key, Change>;

// ---------------------------------------------------------------------------
// ReplicationContext
// ---------------------------------------------------------------------------

/// Aggregate result of diffing one (sink, kind) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationContext {
    pub sink: String,
    pub kind: ObjectKind,
    /// Every key considered during the pass.
    keys: BTreeSet<Key>,
    changes: BTreeMap<Action, ChangeSet>,
}

impl ReplicationContext {
    pub fn new(sink: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            sink: sink.into(),
            kind,
            keys: BTreeSet::new(),
            changes: Action::ALL.iter().map(|a| (*a, ChangeSet::new())).collect(),
        }
    }

    /// Fold a change into its action bucket.
    pub(crate) fn record(&mut self, change: Change) {
        self.keys.insert(change.key.clone());
        self.changes
            .entry(change.action)
            .or_default()
            .insert(change.key.clone(), change);
    }

    pub fn keys(&self) -> &BTreeSet<Key> {
        &self.keys
    }

    pub fn changes(&self, action: Action) -> &ChangeSet {
        static EMPTY: ChangeSet = ChangeSet::new();
        self.changes.get(&action).unwrap_or(&EMPTY)
    }

    pub fn count(&self, action: Action) -> usize {
        self.changes(action).len()
    }

    /// Per-action counts, every action present.
    pub fn stats(&self) -> BTreeMap<Action, usize> {
        Action::ALL.iter().map(|a| (*a, self.count(*a))).collect()
    }

    pub fn total(&self) -> usize {
        self.keys.len()
    }

    /// Denominator for blast-radius ratios: considered keys minus skip-list keys.
    pub fn ratio_base(&self) -> usize {
        self.total() - self.count(Action::Skipped)
    }

    /// Fraction of the keys affected by `action`; `None` when there is nothing
    /// to divide by.
    ///
    /// Skip-list keys are measured against every considered key, every other
    /// action against [`ratio_base`](Self::ratio_base).
    pub fn ratio(&self, action: Action) -> Option<f64> {
        let base = match action {
            Action::Skipped => self.total(),
            _ => self.ratio_base(),
        };
        match base {
            0 => None,
            base => Some(self.count(action) as f64 / base as f64),
        }
    }

    /// Whether any change would mutate the sink under a full run.
    pub fn has_pending(&self) -> bool {
        Action::APPLIED.iter().any(|a| self.count(*a) > 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use folksync_core::Account;

    fn change(action: Action, key: &str) -> Change {
        Change {
            action,
            key: Key::local(key),
            previous: None,
            target: Some(Record::from(Account::new(key))),
            sink: "s".into(),
            delta: None,
        }
    }

    #[test]
    fn only_created_and_updated_apply_in_additive() {
        assert!(Action::Created.allowed_modes().contains(&ReplicationMode::Additive));
        assert!(Action::Updated.allowed_modes().contains(&ReplicationMode::Additive));
        assert!(!Action::Deleted.allowed_modes().contains(&ReplicationMode::Additive));
        assert!(Action::Deleted.allowed_modes().contains(&ReplicationMode::Full));
        for action in Action::ALL {
            assert!(!action.allowed_modes().contains(&ReplicationMode::DryRun));
        }
    }

    #[test]
    fn stats_cover_every_action() {
        let mut ctx = ReplicationContext::new("s", ObjectKind::Account);
        ctx.record(change(Action::Created, "a"));
        ctx.record(change(Action::Unchanged, "b"));
        let stats = ctx.stats();
        assert_eq!(stats.len(), Action::ALL.len());
        assert_eq!(stats[&Action::Created], 1);
        assert_eq!(stats[&Action::Deleted], 0);
        assert_eq!(stats.values().sum::<usize>(), ctx.total());
    }

    #[test]
    fn skipped_keys_are_excluded_from_ratio_base() {
        let mut ctx = ReplicationContext::new("s", ObjectKind::Account);
        ctx.record(change(Action::Created, "a"));
        ctx.record(change(Action::Unchanged, "b"));
        ctx.record(change(Action::Skipped, "svc"));
        assert_eq!(ctx.total(), 3);
        assert_eq!(ctx.ratio_base(), 2);
        assert_eq!(ctx.ratio(Action::Created), Some(0.5));
        assert_eq!(ctx.ratio(Action::Skipped), Some(1.0 / 3.0));
    }

    #[test]
    fn empty_context_has_no_ratio() {
        let ctx = ReplicationContext::new("s", ObjectKind::Group);
        assert_eq!(ctx.ratio(Action::Deleted), None);
        assert!(!ctx.has_pending());
    }

    #[test]
    fn empty_changed_payload_is_still_a_change() {
        let delta = Delta::Changed(serde_json::json!({}));
        assert!(delta.is_changed());
        assert!(!Delta::Unchanged.is_changed());
    }
}
