//! `file` source: a YAML directory export.
//!
//! ```yaml
//! accounts:
//!   jdoe: { uids: { hrid: jdoe, uuid: 4f1c…, email: jdoe@example.org }, displayname: John Doe }
//! groups:
//!   ops: { uids: { hrid: ops, name: Operations }, members: [jdoe] }
//! ```
//!
//! Map keys must equal the record's HRID.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use folksync_core::{Account, Group, Key, ObjectKind, Record, SourceConfig};
use folksync_sync::{io_err, ConnectorError, Source, SourceRecords};

#[derive(Debug, Default, Deserialize)]
struct Export {
    #[serde(default)]
    accounts: BTreeMap<String, Account>,
    #[serde(default)]
    groups: BTreeMap<String, Group>,
}

#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    data: Option<BTreeMap<ObjectKind, SourceRecords>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: None,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, ConnectorError> {
        let path = config
            .path
            .as_ref()
            .ok_or_else(|| ConnectorError::Config("the file source needs a `path`".into()))?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Registry constructor.
pub fn build(config: &SourceConfig) -> Result<Box<dyn Source>, ConnectorError> {
    Ok(Box::new(FileSource::from_config(config)?))
}

fn keyed<T>(
    path: &Path,
    records: BTreeMap<String, T>,
) -> Result<SourceRecords, ConnectorError>
where
    Record: From<T>,
{
    records
        .into_iter()
        .map(|(id, record)| {
            let record = Record::from(record);
            if record.hrid() != id {
                return Err(ConnectorError::Parse {
                    path: path.to_path_buf(),
                    message: format!(
                        "{} '{id}' has hrid '{}'; entries must be keyed by hrid",
                        record.kind(),
                        record.hrid()
                    ),
                });
            }
            Ok((Key::Local(id), record))
        })
        .collect()
}

impl Source for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn connect(&mut self) -> Result<(), ConnectorError> {
        if self.data.is_some() {
            return Ok(());
        }
        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| io_err(&self.path, e))?;
        let export: Export = serde_yaml::from_str(&contents).map_err(|e| ConnectorError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let data = BTreeMap::from([
            (ObjectKind::Account, keyed(&self.path, export.accounts)?),
            (ObjectKind::Group, keyed(&self.path, export.groups)?),
        ]);
        tracing::debug!("loaded source export {}", self.path.display());
        self.data = Some(data);
        Ok(())
    }

    fn fetch(&mut self, kind: ObjectKind) -> Result<SourceRecords, ConnectorError> {
        let data = self.data.as_ref().ok_or(ConnectorError::NotConnected)?;
        Ok(data.get(&kind).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
