//! Classify every considered key into an [`Action`].
//!
//! Rules, in priority order:
//! 1. key in the sink's skip list → `SKIPPED`
//! 2. no source record → `DELETED`
//! 3. otherwise `merge(remote, local)`: `CREATED` when the sink had no record,
//!    `UPDATED` when the delta is a change, `UNCHANGED` otherwise.

use std::collections::BTreeSet;

use folksync_core::{Key, ObjectKind, Record, RemoteRecord};

use crate::change::{Action, Change, Delta, ReplicationContext};
use crate::connector::SourceRecords;
use crate::error::SyncError;
use crate::matcher::MatchedRecords;

/// Everything the differ reads for one (sink, kind) pair.
#[derive(Debug, Clone, Copy)]
pub struct DiffInput<'a> {
    pub sink: &'a str,
    pub kind: ObjectKind,
    pub keys: &'a BTreeSet<Key>,
    pub source: &'a SourceRecords,
    pub remote: &'a MatchedRecords,
    pub skipped: &'a BTreeSet<Key>,
}

/// Union of source and matched sink keys, restricted to `only` when non-empty.
///
/// `only` holds bare identifiers and matches both local and remote keys.
pub fn considered_keys(
    source: &SourceRecords,
    remote: &MatchedRecords,
    only: &BTreeSet<String>,
) -> BTreeSet<Key> {
    source
        .keys()
        .chain(remote.keys())
        .filter(|key| only.is_empty() || only.contains(key.id()))
        .cloned()
        .collect()
}

/// Classify a single key.
///
/// A key with neither a source nor a sink record is a contract violation by
/// the caller and yields [`SyncError::Invariant`].
pub fn classify<F>(
    sink: &str,
    key: &Key,
    local: Option<&Record>,
    remote: Option<&RemoteRecord>,
    skipped: bool,
    merge: F,
) -> Result<Change, SyncError>
where
    F: FnOnce(Option<&RemoteRecord>, &Record) -> Delta,
{
    if local.is_none() && remote.is_none() {
        return Err(SyncError::Invariant(format!(
            "key {key} has neither a source nor a sink record on sink '{sink}'"
        )));
    }

    let mut change = Change {
        action: Action::Skipped,
        key: key.clone(),
        previous: None,
        target: local.cloned(),
        sink: sink.to_owned(),
        delta: None,
    };
    if skipped {
        return Ok(change);
    }

    let Some(local) = local else {
        change.action = Action::Deleted;
        change.previous = remote.cloned();
        return Ok(change);
    };

    let delta = merge(remote, local);
    change.action = match (remote, &delta) {
        (None, _) => Action::Created,
        (Some(_), Delta::Changed(_)) => Action::Updated,
        (Some(_), Delta::Unchanged) => Action::Unchanged,
    };
    change.previous = remote.cloned();
    change.delta = Some(delta);
    Ok(change)
}

/// Classify every key of `input.keys` and fold the changes into a context.
pub fn diff<F>(input: DiffInput<'_>, mut merge: F) -> Result<ReplicationContext, SyncError>
where
    F: FnMut(Option<&RemoteRecord>, &Record) -> Delta,
{
    let mut context = ReplicationContext::new(input.sink, input.kind);
    for key in input.keys {
        let change = classify(
            input.sink,
            key,
            input.source.get(key),
            input.remote.get(key),
            input.skipped.contains(key),
            &mut merge,
        )?;
        context.record(change);
    }
    Ok(context)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use folksync_core::{Account, UidField};
    use serde_json::json;

    fn local(hrid: &str, name: &str) -> Record {
        let mut a = Account::new(hrid);
        a.displayname = Some(name.into());
        Record::from(a)
    }

    fn remote(id: &str, name: &str) -> RemoteRecord {
        RemoteRecord::new(id)
            .with_uid(UidField::Hrid, id)
            .with_attrs(json!({ "displayname": name }))
    }

    /// Changed when the remote display name differs.
    fn merge(remote: Option<&RemoteRecord>, local: &Record) -> Delta {
        let Record::Account(a) = local else {
            return Delta::Unchanged;
        };
        let wanted = json!({ "displayname": a.displayname });
        match remote {
            Some(r) if r.attrs == wanted => Delta::Unchanged,
            _ => Delta::Changed(wanted),
        }
    }

    #[test]
    fn skip_list_wins_over_everything() {
        let change = classify("s", &Key::local("a"), Some(&local("a", "A")), None, true, merge)
            .expect("classify");
        assert_eq!(change.action, Action::Skipped);
        assert_eq!(change.delta, None);
        assert_eq!(change.previous, None);
    }

    #[test]
    fn missing_source_record_is_a_deletion() {
        let r = remote("c", "C");
        let change =
            classify("s", &Key::remote("c"), None, Some(&r), false, merge).expect("classify");
        assert_eq!(change.action, Action::Deleted);
        assert_eq!(change.previous, Some(r));
        assert_eq!(change.target, None);
        assert_eq!(change.delta, None);
    }

    #[test]
    fn missing_sink_record_is_a_creation_even_with_unchanged_delta() {
        let change = classify(
            "s",
            &Key::local("a"),
            Some(&local("a", "A")),
            None,
            false,
            |_, _| Delta::Unchanged,
        )
        .expect("classify");
        assert_eq!(change.action, Action::Created);
    }

    #[test]
    fn changed_delta_is_an_update_and_unchanged_is_unchanged() {
        let updated = classify(
            "s",
            &Key::local("a"),
            Some(&local("a", "New")),
            Some(&remote("a", "Old")),
            false,
            merge,
        )
        .expect("classify");
        assert_eq!(updated.action, Action::Updated);
        assert!(updated.delta.as_ref().is_some_and(Delta::is_changed));

        let same = classify(
            "s",
            &Key::local("a"),
            Some(&local("a", "Same")),
            Some(&remote("a", "Same")),
            false,
            merge,
        )
        .expect("classify");
        assert_eq!(same.action, Action::Unchanged);
    }

    #[test]
    fn key_without_any_record_is_an_invariant_violation() {
        let err = classify("s", &Key::local("ghost"), None, None, false, merge).unwrap_err();
        assert!(matches!(err, SyncError::Invariant(_)));
    }

    #[test]
    fn every_key_gets_exactly_one_change() {
        let source: SourceRecords = [
            (Key::local("a"), local("a", "A")),
            (Key::local("b"), local("b", "B")),
            (Key::local("svc"), local("svc", "Service")),
        ]
        .into_iter()
        .collect();
        let matched: MatchedRecords = [
            (Key::local("b"), remote("b", "Old B")),
            (Key::remote("c"), remote("c", "C")),
        ]
        .into_iter()
        .collect();
        let keys = considered_keys(&source, &matched, &BTreeSet::new());
        let skipped = BTreeSet::from([Key::local("svc")]);

        let ctx = diff(
            DiffInput {
                sink: "s",
                kind: ObjectKind::Account,
                keys: &keys,
                source: &source,
                remote: &matched,
                skipped: &skipped,
            },
            merge,
        )
        .expect("diff");

        assert_eq!(ctx.total(), 4);
        assert_eq!(ctx.stats().values().sum::<usize>(), keys.len());
        assert_eq!(ctx.count(Action::Created), 1);
        assert_eq!(ctx.count(Action::Updated), 1);
        assert_eq!(ctx.count(Action::Deleted), 1);
        assert_eq!(ctx.count(Action::Skipped), 1);
    }

    #[test]
    fn only_filter_restricts_considered_keys() {
        let source: SourceRecords = [
            (Key::local("a"), local("a", "A")),
            (Key::local("b"), local("b", "B")),
        ]
        .into_iter()
        .collect();
        let matched: MatchedRecords =
            [(Key::remote("c"), remote("c", "C"))].into_iter().collect();

        let only = BTreeSet::from(["b".to_string(), "c".to_string()]);
        let keys = considered_keys(&source, &matched, &only);
        assert_eq!(keys, BTreeSet::from([Key::local("b"), Key::remote("c")]));
    }
}
