//! Domain-scoped key/value cache used by sinks that need to remember
//! identifiers across runs.
//!
//! A session is bracketed by [`Cache::open`] and [`Cache::commit`]. Values are
//! JSON. [`FileCache`] persists the whole store as one JSON document:
//!
//! ```text
//! { "<domain>": { "<key>": <value>, ... }, ... }
//! ```
//!
//! Writes use the atomic `.tmp` + rename pattern.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{cache_io_err, CacheError};

/// Whole-store payload: domain → key → value.
pub type CacheData = BTreeMap<String, BTreeMap<String, Value>>;

/// A cache shared between the pipeline (which opens/commits it) and the
/// sinks (which read and write their own domain).
pub type SharedCache = Rc<RefCell<dyn Cache>>;

pub trait Cache {
    /// Start a read-modify-write session.
    fn open(&mut self) -> Result<(), CacheError>;

    /// Persist everything set since [`Cache::open`].
    fn commit(&mut self) -> Result<(), CacheError>;

    fn get(&self, domain: &str, key: &str) -> Result<Option<Value>, CacheError>;

    fn set(&mut self, domain: &str, key: &str, value: Value) -> Result<(), CacheError>;
}

// ---------------------------------------------------------------------------
// NullCache
// ---------------------------------------------------------------------------

/// Remembers nothing; every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl Cache for NullCache {
    fn open(&mut self) -> Result<(), CacheError> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), CacheError> {
        Ok(())
    }

    fn get(&self, _domain: &str, _key: &str) -> Result<Option<Value>, CacheError> {
        Ok(None)
    }

    fn set(&mut self, _domain: &str, _key: &str, _value: Value) -> Result<(), CacheError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileCache
// ---------------------------------------------------------------------------

/// Whole-file JSON cache.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    data: Option<CacheData>,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn data(&self) -> Result<&CacheData, CacheError> {
        self.data.as_ref().ok_or(CacheError::NotOpen)
    }
}

impl Cache for FileCache {
    /// Loads the store; a missing file starts an empty store.
    fn open(&mut self) -> Result<(), CacheError> {
        if !self.path.exists() {
            tracing::debug!("cache {} does not exist yet, starting empty", self.path.display());
            self.data = Some(CacheData::new());
            return Ok(());
        }
        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| cache_io_err(&self.path, e))?;
        let data = serde_json::from_str(&contents).map_err(|source| CacheError::Json {
            path: self.path.clone(),
            source,
        })?;
        self.data = Some(data);
        Ok(())
    }

    /// Writes to `<path>.tmp` then renames to `<path>`.
    fn commit(&mut self) -> Result<(), CacheError> {
        let data = self.data()?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| cache_io_err(dir, e))?;
        }

        let json = serde_json::to_string_pretty(data).map_err(|source| CacheError::Json {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| cache_io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(cache_io_err(&self.path, e));
        }
        tracing::debug!("committed cache {}", self.path.display());
        Ok(())
    }

    fn get(&self, domain: &str, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.data()?.get(domain).and_then(|d| d.get(key)).cloned())
    }

    fn set(&mut self, domain: &str, key: &str, value: Value) -> Result<(), CacheError> {
        let data = self.data.as_mut().ok_or(CacheError::NotOpen)?;
        data.entry(domain.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CacheDomain
// ---------------------------------------------------------------------------

/// A handle on one domain of a shared cache, handed to a single sink.
#[derive(Clone)]
pub struct CacheDomain {
    cache: SharedCache,
    domain: String,
}

impl CacheDomain {
    pub fn new(cache: SharedCache, domain: impl Into<String>) -> Self {
        Self {
            cache,
            domain: domain.into(),
        }
    }

    /// A domain over a private [`NullCache`].
    pub fn null(domain: impl Into<String>) -> Self {
        Self::new(Rc::new(RefCell::new(NullCache)), domain)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.cache.borrow().get(&self.domain, key)
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.cache.borrow_mut().set(&self.domain, key, value)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        self.set(key, serde_json::to_value(value)?)
    }
}

impl std::fmt::Debug for CacheDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDomain")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
