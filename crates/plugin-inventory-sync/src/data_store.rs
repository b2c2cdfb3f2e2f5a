//! Data Store (C8): a small YAML file holding scalar values shared across
//! invocations (e.g. "cache was recently initialised" flags).
//!
//! The whole file is read, modified, and rewritten under an exclusive OS
//! lock; the lock is released on every return path via the guard's `Drop`
//! impl, matching the cache directory's own locking discipline (see
//! `plugin_inventory_oci::cache`).

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::FileExt;

use plugin_inventory_types::{Error, Result};

/// Scalar key/value file, exclusive-locked across read-modify-write.
pub struct DataStore {
    path: PathBuf,
}

impl DataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads `key`, deserialising its stored YAML scalar into `T`. Returns
    /// [`Error::KeyNotFound`] if the key has never been set.
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        let guard = self.lock()?;
        let values = guard.read()?;
        let raw = values.get(key).ok_or_else(|| Error::KeyNotFound(key.to_string()))?;
        serde_yaml::from_value(raw.clone()).map_err(|e| Error::Parse(e.to_string()))
    }

    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let guard = self.lock()?;
        let mut values = guard.read()?;
        let raw = serde_yaml::to_value(value).map_err(|e| Error::Parse(e.to_string()))?;
        values.insert(key.to_string(), raw);
        guard.write(&values)
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let guard = self.lock()?;
        let mut values = guard.read()?;
        values.remove(key);
        guard.write(&values)
    }

    fn lock(&self) -> Result<LockedFile> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)?;
        file.lock_exclusive()
            .map_err(|e| Error::Io(format!("could not lock {}: {e}", self.path.display())))?;
        Ok(LockedFile {
            file,
            path: self.path.clone(),
        })
    }
}

type ScalarMap = BTreeMap<String, serde_yaml::Value>;

/// RAII guard releasing the exclusive lock on drop, on every code path —
/// early return, `?`, or panic unwinding.
struct LockedFile {
    file: File,
    path: PathBuf,
}

impl LockedFile {
    fn read(&self) -> Result<ScalarMap> {
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(ScalarMap::new());
        }
        serde_yaml::from_str(&contents).map_err(|e| Error::Parse(e.to_string()))
    }

    fn write(&self, values: &ScalarMap) -> Result<()> {
        let serialised = serde_yaml::to_string(values).map_err(|e| Error::Parse(e.to_string()))?;
        write_atomically(&self.path, serialised.as_bytes())
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_without_prior_set_is_key_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path().join("store.yaml"));
        let err = store.get::<bool>("cache-initialised").unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(_)));
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path().join("store.yaml"));
        store.set("cache-initialised", true).unwrap();
        assert!(store.get::<bool>("cache-initialised").unwrap());
    }

    #[test]
    fn delete_removes_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path().join("store.yaml"));
        store.set("last-sync", "2026-01-01").unwrap();
        store.delete("last-sync").unwrap();
        assert!(store.get::<String>("last-sync").is_err());
    }

    #[test]
    fn values_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.yaml");
        DataStore::new(&path).set("count", 3u32).unwrap();
        let reopened = DataStore::new(&path);
        assert_eq!(reopened.get::<u32>("count").unwrap(), 3);
    }
}
