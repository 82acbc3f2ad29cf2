//! Resolve sink-native records to source keys.
//!
//! Fields are tried in priority order. For each field a lookup
//! `value → source key` is built from the source records, and every still
//! unmatched sink record whose value for that field is in the lookup is bound
//! to the corresponding key. The first matching field wins; a later field
//! never overrides an earlier binding. Sink records left over are kept under
//! [`Key::Remote`] and end up as deletion candidates.
//!
//! Ties are resolved by key order: when two source records share a value the
//! smallest key owns it, and when two sink records claim the same source key
//! the smallest native id gets it (the other stays unmatched).

use std::collections::{BTreeMap, HashMap};

use folksync_core::{Key, RemoteRecord, UidField};

use crate::connector::{RemoteRecords, SourceRecords};

/// Sink records keyed in the source's keyspace.
pub type MatchedRecords = BTreeMap<Key, RemoteRecord>;

pub fn match_records(
    fields: &[UidField],
    source: &SourceRecords,
    remote: RemoteRecords,
) -> MatchedRecords {
    let mut unmatched = remote;
    let mut matched = MatchedRecords::new();

    for field in fields {
        if unmatched.is_empty() {
            break;
        }

        let mut lookup: HashMap<&str, &Key> = HashMap::new();
        for (key, record) in source {
            if let Some(value) = record.uid(*field) {
                lookup.entry(value).or_insert(key);
            }
        }

        let before = matched.len();
        for (id, record) in std::mem::take(&mut unmatched) {
            let target = record
                .uid(*field)
                .and_then(|value| lookup.get(value))
                .filter(|key| !matched.contains_key(**key))
                .map(|key| (*key).clone());
            match target {
                Some(key) => {
                    matched.insert(key, record);
                }
                None => {
                    unmatched.insert(id, record);
                }
            }
        }
        tracing::debug!("matched {} records on {field}", matched.len() - before);
    }

    if !unmatched.is_empty() {
        tracing::debug!("{} sink records left unmatched", unmatched.len());
    }
    for (id, record) in unmatched {
        matched.insert(Key::Remote(id), record);
    }
    matched
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use folksync_core::{Account, ObjectKind, Record};

    fn account(hrid: &str, uuid: &str, email: &str) -> Record {
        let mut a = Account::new(hrid);
        a.uids.uuid = Some(uuid.into());
        a.uids.email = Some(email.into());
        Record::from(a)
    }

    fn source() -> SourceRecords {
        [
            (Key::local("alice"), account("alice", "u-1", "alice@example.org")),
            (Key::local("bob"), account("bob", "u-2", "bob@example.org")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn binds_on_first_available_field() {
        let remote: RemoteRecords = [
            (
                "r1".to_string(),
                RemoteRecord::new("r1").with_uid(UidField::Uuid, "u-1"),
            ),
            (
                "r2".to_string(),
                RemoteRecord::new("r2").with_uid(UidField::Email, "bob@example.org"),
            ),
        ]
        .into_iter()
        .collect();

        let matched = match_records(ObjectKind::Account.uid_fields(), &source(), remote);
        assert_eq!(matched[&Key::local("alice")].id, "r1");
        assert_eq!(matched[&Key::local("bob")].id, "r2");
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn earlier_field_is_never_overridden() {
        // r1 matches alice by hrid, and would match bob by email.
        let remote: RemoteRecords = [(
            "r1".to_string(),
            RemoteRecord::new("r1")
                .with_uid(UidField::Hrid, "alice")
                .with_uid(UidField::Email, "bob@example.org"),
        )]
        .into_iter()
        .collect();

        let matched = match_records(ObjectKind::Account.uid_fields(), &source(), remote);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[&Key::local("alice")].id, "r1");
    }

    #[test]
    fn unmatched_records_keep_their_native_key() {
        let remote: RemoteRecords = [(
            "ghost".to_string(),
            RemoteRecord::new("ghost").with_uid(UidField::Username, "nobody"),
        )]
        .into_iter()
        .collect();

        let matched = match_records(ObjectKind::Account.uid_fields(), &source(), remote);
        assert_eq!(matched.len(), 1);
        assert!(matched.contains_key(&Key::remote("ghost")));
    }

    #[test]
    fn second_claimant_of_a_key_stays_unmatched() {
        let remote: RemoteRecords = [
            ("r1".to_string(), RemoteRecord::new("r1").with_uid(UidField::Hrid, "alice")),
            ("r2".to_string(), RemoteRecord::new("r2").with_uid(UidField::Hrid, "alice")),
        ]
        .into_iter()
        .collect();

        let matched = match_records(ObjectKind::Account.uid_fields(), &source(), remote);
        assert_eq!(matched.len(), 2, "every sink record is accounted for once");
        assert_eq!(matched[&Key::local("alice")].id, "r1");
        assert_eq!(matched[&Key::remote("r2")].id, "r2");
    }

    #[test]
    fn matching_is_deterministic() {
        let remote = || -> RemoteRecords {
            (0..20)
                .map(|i| {
                    let id = format!("r{i}");
                    let rec = RemoteRecord::new(&id).with_uid(
                        UidField::Email,
                        if i % 2 == 0 { "alice@example.org" } else { "bob@example.org" },
                    );
                    (id, rec)
                })
                .collect()
        };
        let first = match_records(ObjectKind::Account.uid_fields(), &source(), remote());
        let second = match_records(ObjectKind::Account.uid_fields(), &source(), remote());
        assert_eq!(first, second);
        assert_eq!(first.len(), 20);
    }

    #[test]
    fn empty_sink_matches_nothing() {
        let matched =
            match_records(ObjectKind::Account.uid_fields(), &source(), RemoteRecords::new());
        assert!(matched.is_empty());
    }
}
