//! In-memory source and sink doubles: accounts keyed by hrid, carrying a
//! single display value.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use folksync_core::{Account, CacheDomain, Key, ObjectKind, Record, RemoteRecord, UidField};
use folksync_sync::{
    Action, ChangeSet, ConnectorError, Delta, RemoteRecords, Sink, Source, SourceRecords,
};
use serde_json::json;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn values(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn display_value(record: &Record) -> Option<i64> {
    match record {
        Record::Account(a) => a.displayname.as_deref().and_then(|v| v.parse().ok()),
        Record::Group(_) => None,
    }
}

// ---------------------------------------------------------------------------
// DictSource
// ---------------------------------------------------------------------------

pub struct DictSource {
    pub data: BTreeMap<String, i64>,
    pub fail: bool,
}

impl DictSource {
    pub fn new(data: BTreeMap<String, i64>) -> Self {
        Self { data, fail: false }
    }

    pub fn records(&self) -> SourceRecords {
        self.data
            .iter()
            .map(|(k, v)| {
                let mut account = Account::new(k);
                account.displayname = Some(v.to_string());
                (Key::local(k), Record::from(account))
            })
            .collect()
    }
}

impl Source for DictSource {
    fn name(&self) -> &str {
        "dict"
    }

    fn connect(&mut self) -> Result<(), ConnectorError> {
        if self.fail {
            return Err(ConnectorError::Rejected("source offline".into()));
        }
        Ok(())
    }

    fn fetch(&mut self, kind: ObjectKind) -> Result<SourceRecords, ConnectorError> {
        match kind {
            ObjectKind::Account => Ok(self.records()),
            ObjectKind::Group => Ok(SourceRecords::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// DictSink
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SinkState {
    pub initial: BTreeMap<String, i64>,
    pub created: BTreeMap<String, i64>,
    pub updated: BTreeMap<String, i64>,
    pub deleted: Vec<String>,
    /// Batch calls in call order.
    pub calls: Vec<Action>,
}

pub struct DictSink {
    name: String,
    state: Rc<RefCell<SinkState>>,
    skip: BTreeSet<String>,
    fail_on: Option<Action>,
    cache: Option<CacheDomain>,
}

impl DictSink {
    pub fn new(name: &str, initial: BTreeMap<String, i64>) -> Self {
        Self {
            name: name.to_string(),
            state: Rc::new(RefCell::new(SinkState {
                initial,
                ..SinkState::default()
            })),
            skip: BTreeSet::new(),
            fail_on: None,
            cache: None,
        }
    }

    /// Record every created value under its key in `cache`.
    pub fn remembering(mut self, cache: CacheDomain) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn skipping(mut self, keys: &[&str]) -> Self {
        self.skip = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn failing_on(mut self, action: Action) -> Self {
        self.fail_on = Some(action);
        self
    }

    /// Shared view of the sink state, still readable after the sink is boxed.
    pub fn state(&self) -> Rc<RefCell<SinkState>> {
        Rc::clone(&self.state)
    }

    fn check_failure(&self, action: Action) -> Result<(), ConnectorError> {
        if self.fail_on == Some(action) {
            return Err(ConnectorError::Rejected(format!("{action} refused")));
        }
        Ok(())
    }
}

impl Sink for DictSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<(), ConnectorError> {
        Ok(())
    }

    fn fetch(&mut self, kind: ObjectKind) -> Result<RemoteRecords, ConnectorError> {
        if kind == ObjectKind::Group {
            return Ok(RemoteRecords::new());
        }
        Ok(self
            .state
            .borrow()
            .initial
            .iter()
            .map(|(k, v)| {
                let record = RemoteRecord::new(k)
                    .with_uid(UidField::Hrid, k)
                    .with_attrs(json!(v));
                (k.clone(), record)
            })
            .collect())
    }

    fn skipped_keys(&self, _kind: ObjectKind, keys: &BTreeSet<Key>) -> BTreeSet<Key> {
        keys.iter()
            .filter(|k| self.skip.contains(k.id()))
            .cloned()
            .collect()
    }

    fn merge(&self, remote: Option<&RemoteRecord>, local: &Record) -> Delta {
        let new = json!(display_value(local));
        match remote {
            Some(r) if r.attrs == new => Delta::Unchanged,
            Some(r) => Delta::Changed(json!({ "prev": r.attrs, "new": new })),
            None => Delta::Changed(json!({ "prev": null, "new": new })),
        }
    }

    fn create_batch(&mut self, _kind: ObjectKind, changes: &ChangeSet) -> Result<(), ConnectorError> {
        self.check_failure(Action::Created)?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Action::Created);
        for change in changes.values() {
            let id = change.key.id().to_string();
            assert!(!state.initial.contains_key(&id), "{id} already exists");
            let value = change.target.as_ref().and_then(display_value).unwrap_or_default();
            if let Some(cache) = &self.cache {
                cache.set(&id, json!(value))?;
            }
            state.created.insert(id, value);
        }
        Ok(())
    }

    fn update_batch(&mut self, _kind: ObjectKind, changes: &ChangeSet) -> Result<(), ConnectorError> {
        self.check_failure(Action::Updated)?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Action::Updated);
        for change in changes.values() {
            let id = change.key.id().to_string();
            let previous = change.previous.as_ref().map(|r| r.attrs.clone());
            assert_eq!(previous, state.initial.get(&id).map(|v| json!(v)));
            assert!(!state.created.contains_key(&id));
            let value = change.target.as_ref().and_then(display_value).unwrap_or_default();
            state.updated.insert(id, value);
        }
        Ok(())
    }

    fn delete_batch(&mut self, _kind: ObjectKind, changes: &ChangeSet) -> Result<(), ConnectorError> {
        self.check_failure(Action::Deleted)?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Action::Deleted);
        for change in changes.values() {
            let id = change.key.id().to_string();
            assert!(state.initial.contains_key(&id));
            assert!(!state.deleted.contains(&id));
            state.deleted.push(id);
        }
        Ok(())
    }
}
