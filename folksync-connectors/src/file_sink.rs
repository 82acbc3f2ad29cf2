//! `file` sink: a directory holding `accounts.yaml` and `groups.yaml`.
//!
//! Each file maps a sink-allocated id (`acct-0001`, `grp-0001`) to a
//! projection of the source record: usernames, emails and descriptive fields
//! only. HRIDs and UUIDs are not part of the projection; the full uids of
//! every record this sink writes are remembered in its cache domain under
//! `<kind>:<id>` and restored on fetch, so later runs can still match on them.
//!
//! Every batch is applied to a copy of the file and written with a
//! `.yaml.tmp` + rename; a failing change leaves the file untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::Utc;
use serde_json::{json, Map, Value};

use folksync_core::{CacheDomain, Key, ObjectKind, Record, RemoteRecord, SinkConfig, UidField};
use folksync_sync::{io_err, Action, ChangeSet, ConnectorError, Delta, RemoteRecords, Sink};

type Store = BTreeMap<String, Value>;

#[derive(Debug)]
pub struct FileSink {
    name: String,
    dir: PathBuf,
    skip: BTreeSet<String>,
    cache: CacheDomain,
    connected: bool,
}

impl FileSink {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, cache: CacheDomain) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            skip: BTreeSet::new(),
            cache,
            connected: false,
        }
    }

    pub fn from_config(config: &SinkConfig, cache: CacheDomain) -> Result<Self, ConnectorError> {
        let dir = config.path.as_ref().ok_or_else(|| {
            ConnectorError::Config(format!("file sink '{}' needs a `path`", config.name))
        })?;
        Ok(Self::new(&config.name, dir, cache).with_skip(config.skip.iter().cloned()))
    }

    /// HRIDs or sink ids never to touch.
    pub fn with_skip(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.skip.extend(ids);
        self
    }

    pub fn file_path(&self, kind: ObjectKind) -> PathBuf {
        self.dir.join(format!("{}.yaml", kind.plural()))
    }

    fn ensure_connected(&self) -> Result<(), ConnectorError> {
        if self.connected {
            Ok(())
        } else {
            Err(ConnectorError::NotConnected)
        }
    }

    fn load(&self, kind: ObjectKind) -> Result<Store, ConnectorError> {
        let path = self.file_path(kind);
        if !path.exists() {
            return Ok(Store::new());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        if contents.trim().is_empty() {
            return Ok(Store::new());
        }
        serde_yaml::from_str(&contents).map_err(|e| ConnectorError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    fn save(&self, kind: ObjectKind, store: &Store) -> Result<(), ConnectorError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let path = self.file_path(kind);
        let tmp = path.with_extension("yaml.tmp");
        let yaml = serde_yaml::to_string(store).map_err(|e| ConnectorError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        Ok(())
    }

    fn cache_key(kind: ObjectKind, id: &str) -> String {
        format!("{kind}:{id}")
    }

    fn remembered_uids(
        &self,
        kind: ObjectKind,
        id: &str,
    ) -> Result<BTreeMap<UidField, String>, ConnectorError> {
        let uids = self
            .cache
            .get_as::<Option<BTreeMap<UidField, String>>>(&Self::cache_key(kind, id))?;
        Ok(uids.flatten().unwrap_or_default())
    }

    /// Set the uids of `entries` in the cache, pushing the previous values on `undo`.
    fn remember(
        &self,
        kind: ObjectKind,
        entries: Vec<(String, Value)>,
        undo: &mut Vec<(String, Value)>,
    ) -> Result<(), ConnectorError> {
        for (id, uids) in entries {
            let key = Self::cache_key(kind, &id);
            let before = self.cache.get(&key)?.unwrap_or(Value::Null);
            self.cache.set(&key, uids)?;
            undo.push((key, before));
        }
        Ok(())
    }

    fn restore(&self, undo: Vec<(String, Value)>) {
        for (key, before) in undo.into_iter().rev() {
            if let Err(e) = self.cache.set(&key, before) {
                tracing::warn!("sink {}: could not restore cache entry {key}: {e}", self.name);
            }
        }
    }

    /// Apply `edit` to a copy of the store and persist it only if every change succeeded.
    ///
    /// Cache entries are written before the file and rolled back when either
    /// step fails, so the cache never disagrees with a file that was not saved.
    fn transact<F>(&mut self, kind: ObjectKind, action: Action, edit: F) -> Result<(), ConnectorError>
    where
        F: FnOnce(&mut Store, &mut Vec<(String, Value)>) -> Result<usize, ConnectorError>,
    {
        self.ensure_connected()?;
        let mut store = self.load(kind)?;
        let mut entries = Vec::new();
        let applied = edit(&mut store, &mut entries)?;

        let mut undo = Vec::new();
        let result = self
            .remember(kind, entries, &mut undo)
            .and_then(|()| self.save(kind, &store));
        if let Err(e) = result {
            self.restore(undo);
            return Err(e);
        }
        tracing::info!(
            "sink {}: {action} {applied} {} in {}",
            self.name,
            kind.plural(),
            self.file_path(kind).display()
        );
        Ok(())
    }
}

/// Registry constructor.
pub fn build(config: &SinkConfig, cache: CacheDomain) -> Result<Box<dyn Sink>, ConnectorError> {
    Ok(Box::new(FileSink::from_config(config, cache)?))
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// What the sink stores for a source record.
pub fn project(record: &Record) -> Value {
    let mut out = Map::new();
    let mut put = |field: &str, value: Option<&String>| {
        if let Some(v) = value {
            out.insert(field.to_string(), Value::String(v.clone()));
        }
    };
    match record {
        Record::Account(a) => {
            put("username", a.uids.username.as_ref());
            put("email", a.uids.email.as_ref());
            put("firstname", a.firstname.as_ref());
            put("lastname", a.lastname.as_ref());
            put("displayname", a.displayname.as_ref());
            out.insert("type".into(), json!(a.account_type));
            out.insert("active".into(), json!(!a.is_deactivated(Utc::now())));
        }
        Record::Group(g) => {
            put("name", g.uids.name.as_ref());
            put("description", g.description.as_ref());
            let sorted = |ids: &[String]| ids.iter().cloned().collect::<BTreeSet<_>>();
            out.insert("owners".into(), json!(sorted(&g.owners)));
            out.insert("members".into(), json!(sorted(&g.members)));
        }
    }
    Value::Object(out)
}

/// Uids readable from a stored projection.
fn projected_uids(kind: ObjectKind, attrs: &Value) -> BTreeMap<UidField, String> {
    let fields: &[UidField] = match kind {
        ObjectKind::Account => &[UidField::Username, UidField::Email],
        ObjectKind::Group => &[UidField::Name],
    };
    fields
        .iter()
        .filter_map(|f| {
            attrs
                .get(f.to_string())
                .and_then(Value::as_str)
                .map(|v| (*f, v.to_string()))
        })
        .collect()
}

/// Field-level difference between two projections; `None` when equal.
pub fn field_delta(previous: &Value, new: &Value) -> Option<Value> {
    let empty = Map::new();
    let prev = previous.as_object().unwrap_or(&empty);
    let next = new.as_object().unwrap_or(&empty);

    let fields: BTreeSet<&String> = prev.keys().chain(next.keys()).collect();
    let mut before = Map::new();
    let mut after = Map::new();
    for field in fields {
        let (a, b) = (prev.get(field), next.get(field));
        if a != b {
            before.insert(field.clone(), a.cloned().unwrap_or(Value::Null));
            after.insert(field.clone(), b.cloned().unwrap_or(Value::Null));
        }
    }
    if after.is_empty() {
        None
    } else {
        Some(json!({ "prev": before, "new": after }))
    }
}

/// Next free `<prefix><n>` id.
fn allocate_id(kind: ObjectKind, store: &Store) -> String {
    let prefix = match kind {
        ObjectKind::Account => "acct-",
        ObjectKind::Group => "grp-",
    };
    let next = store
        .keys()
        .filter_map(|id| id.strip_prefix(prefix)?.parse::<u32>().ok())
        .max()
        .map_or(1, |n| n + 1);
    format!("{prefix}{next:04}")
}

fn missing_target(change_key: &Key) -> ConnectorError {
    ConnectorError::Rejected(format!("change for {change_key} carries no source record"))
}

fn missing_previous(change_key: &Key) -> ConnectorError {
    ConnectorError::Rejected(format!("change for {change_key} carries no sink record"))
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    /// The directory is created on the first write, never by a dry run.
    fn connect(&mut self) -> Result<(), ConnectorError> {
        if self.dir.exists() && !self.dir.is_dir() {
            return Err(ConnectorError::Config(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }
        self.connected = true;
        Ok(())
    }

    fn fetch(&mut self, kind: ObjectKind) -> Result<RemoteRecords, ConnectorError> {
        self.ensure_connected()?;
        let mut records = RemoteRecords::new();
        for (id, attrs) in self.load(kind)? {
            let mut uids = projected_uids(kind, &attrs);
            uids.extend(self.remembered_uids(kind, &id)?);
            let mut record = RemoteRecord::new(&id).with_attrs(attrs);
            record.uids = uids;
            records.insert(id, record);
        }
        Ok(records)
    }

    fn skipped_keys(&self, _kind: ObjectKind, keys: &BTreeSet<Key>) -> BTreeSet<Key> {
        keys.iter()
            .filter(|k| self.skip.contains(k.id()))
            .cloned()
            .collect()
    }

    fn merge(&self, remote: Option<&RemoteRecord>, local: &Record) -> Delta {
        let new = project(local);
        match remote {
            None => Delta::Changed(json!({ "prev": null, "new": new })),
            Some(r) => match field_delta(&r.attrs, &new) {
                Some(delta) => Delta::Changed(delta),
                None => Delta::Unchanged,
            },
        }
    }

    fn create_batch(&mut self, kind: ObjectKind, changes: &ChangeSet) -> Result<(), ConnectorError> {
        self.transact(kind, Action::Created, |store, remember| {
            for change in changes.values() {
                let target = change.target.as_ref().ok_or_else(|| missing_target(&change.key))?;
                let id = allocate_id(kind, store);
                store.insert(id.clone(), project(target));
                remember.push((id, json!(target.uids())));
            }
            Ok(changes.len())
        })
    }

    fn update_batch(&mut self, kind: ObjectKind, changes: &ChangeSet) -> Result<(), ConnectorError> {
        self.transact(kind, Action::Updated, |store, remember| {
            for change in changes.values() {
                let target = change.target.as_ref().ok_or_else(|| missing_target(&change.key))?;
                let previous = change
                    .previous
                    .as_ref()
                    .ok_or_else(|| missing_previous(&change.key))?;
                let slot = store.get_mut(&previous.id).ok_or_else(|| {
                    ConnectorError::Rejected(format!("{} {} vanished", kind, previous.id))
                })?;
                *slot = project(target);
                remember.push((previous.id.clone(), json!(target.uids())));
            }
            Ok(changes.len())
        })
    }

    fn delete_batch(&mut self, kind: ObjectKind, changes: &ChangeSet) -> Result<(), ConnectorError> {
        self.transact(kind, Action::Deleted, |store, remember| {
            for change in changes.values() {
                let previous = change
                    .previous
                    .as_ref()
                    .ok_or_else(|| missing_previous(&change.key))?;
                if store.remove(&previous.id).is_none() {
                    return Err(ConnectorError::Rejected(format!(
                        "{} {} vanished",
                        kind, previous.id
                    )));
                }
                remember.push((previous.id.clone(), Value::Null));
            }
            Ok(changes.len())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use folksync_core::{Account, Cache, FileCache, Group, SharedCache};
    use folksync_sync::Change;

    fn account(hrid: &str, email: &str, name: &str) -> Record {
        let mut a = Account::new(hrid);
        a.uids.uuid = Some(format!("uuid-{hrid}"));
        a.uids.email = Some(email.into());
        a.displayname = Some(name.into());
        Record::from(a)
    }

    #[test]
    fn projection_drops_hrid_and_uuid() {
        let attrs = project(&account("jdoe", "jdoe@example.org", "John"));
        assert_eq!(attrs["email"], "jdoe@example.org");
        assert_eq!(attrs["displayname"], "John");
        assert_eq!(attrs["active"], true);
        assert!(attrs.get("hrid").is_none());
        assert!(attrs.get("uuid").is_none());
    }

    #[test]
    fn group_projection_sorts_members() {
        let mut g = Group::new("ops");
        g.members = vec!["zed".into(), "amy".into()];
        let attrs = project(&Record::from(g));
        assert_eq!(attrs["members"], json!(["amy", "zed"]));
    }

    #[test]
    fn field_delta_reports_only_changed_fields() {
        let before = json!({ "email": "a@x", "displayname": "A" });
        let after = json!({ "email": "a@x", "displayname": "B", "lastname": "L" });
        let delta = field_delta(&before, &after).expect("changed");
        assert_eq!(
            delta,
            json!({
                "prev": { "displayname": "A", "lastname": null },
                "new": { "displayname": "B", "lastname": "L" },
            })
        );
        assert_eq!(field_delta(&after, &after), None);
    }

    #[test]
    fn ids_are_allocated_after_the_highest() {
        let store: Store = [
            ("acct-0001".to_string(), json!({})),
            ("acct-0007".to_string(), json!({})),
            ("legacy".to_string(), json!({})),
        ]
        .into_iter()
        .collect();
        assert_eq!(allocate_id(ObjectKind::Account, &store), "acct-0008");
        assert_eq!(allocate_id(ObjectKind::Group, &store), "grp-0001");
    }

    #[test]
    fn failed_save_rolls_back_remembered_uids() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let cache: SharedCache = Rc::new(RefCell::new(FileCache::new(dir.path().join("cache.json"))));
        cache.borrow_mut().open().expect("open");
        let target = dir.path().join("directory");
        // A directory where the temporary file must go makes the save fail.
        std::fs::create_dir_all(target.join("accounts.yaml.tmp")).expect("blocker");

        let mut sink = FileSink::new(
            "directory",
            &target,
            CacheDomain::new(Rc::clone(&cache), "directory"),
        );
        sink.connect().expect("connect");
        let changes: ChangeSet = [(
            Key::local("jdoe"),
            Change {
                action: Action::Created,
                key: Key::local("jdoe"),
                previous: None,
                target: Some(account("jdoe", "jdoe@example.org", "John")),
                sink: "directory".into(),
                delta: None,
            },
        )]
        .into_iter()
        .collect();

        assert!(sink.create_batch(ObjectKind::Account, &changes).is_err());
        assert!(!target.join("accounts.yaml").exists());
        let uids = sink
            .remembered_uids(ObjectKind::Account, "acct-0001")
            .expect("cache lookup");
        assert!(uids.is_empty(), "{uids:?}");
    }

    #[test]
    fn projected_uids_come_from_attrs() {
        let attrs = json!({ "username": "jdoe", "email": "jdoe@example.org", "type": "internal" });
        let uids = projected_uids(ObjectKind::Account, &attrs);
        assert_eq!(uids.len(), 2);
        assert_eq!(uids[&UidField::Email], "jdoe@example.org");
    }
}
