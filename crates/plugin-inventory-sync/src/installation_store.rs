//! Locally tracked installation records, persisted as a single JSON file
//! next to configuration.
//!
//! Not itself a named component in the component design, but required by
//! the Sync Engine (C7) to compute to-install/to-keep/to-retire sets and
//! to check, before uninstalling a retired plugin, whether any other
//! context scope still references the same `(name, target, version)`
//! triple. Locked the same way as the Data Store (C8) — an exclusive OS
//! lock held across the read-modify-write sequence, released on every
//! return path.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use fs4::FileExt;

use plugin_inventory_types::{InstallationRecord, Result, Target};

pub struct InstallationStore {
    path: PathBuf,
}

impl InstallationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn all(&self) -> Result<Vec<InstallationRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Replaces the record matching `record`'s `(name, target, scope,
    /// context_name)` with `record`, or appends it if none exists.
    pub fn upsert(&self, record: InstallationRecord) -> Result<()> {
        self.with_lock(|records| {
            records.retain(|r| {
                !(r.name == record.name && r.target == record.target && r.scope == record.scope && r.context_name == record.context_name)
            });
            records.push(record);
        })
    }

    /// Removes the record matching `(name, target)` within `context_name`'s
    /// scope.
    pub fn remove(&self, name: &str, target: Target, context_name: Option<&str>) -> Result<()> {
        self.with_lock(|records| {
            records.retain(|r| {
                !(r.name == name && r.target == target && r.context_name.as_deref() == context_name)
            });
        })
    }

    fn with_lock(&self, f: impl FnOnce(&mut Vec<InstallationRecord>)) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)?;
        file.lock_exclusive()
            .map_err(|e| plugin_inventory_types::Error::Io(format!("could not lock {}: {e}", self.path.display())))?;

        let result = (|| {
            let mut records = self.all()?;
            f(&mut records);
            let serialised = serde_json::to_string_pretty(&records)?;
            let tmp = self.path.with_extension("tmp");
            fs::write(&tmp, serialised)?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        })();

        let _ = FileExt::unlock(&file);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use plugin_inventory_types::{InstallScope, Version};

    fn record(name: &str, context: Option<&str>) -> InstallationRecord {
        InstallationRecord {
            name: name.to_string(),
            target: Target::ClusterManagement,
            version: Version::parse("v1.0.0").unwrap(),
            installed_from_source: "central".into(),
            installed_at: Utc::now(),
            scope: if context.is_some() {
                InstallScope::ContextRecommended
            } else {
                InstallScope::Standalone
            },
            context_name: context.map(str::to_string),
        }
    }

    #[test]
    fn upsert_then_all_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallationStore::new(dir.path().join("installed.json"));
        store.upsert(record("k8s", None)).unwrap();
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[test]
    fn upsert_replaces_existing_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallationStore::new(dir.path().join("installed.json"));
        store.upsert(record("k8s", Some("prod"))).unwrap();
        let mut updated = record("k8s", Some("prod"));
        updated.version = Version::parse("v2.0.0").unwrap();
        store.upsert(updated).unwrap();

        let all = store.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].version.to_string(), "v2.0.0");
    }

    #[test]
    fn remove_deletes_matching_record_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallationStore::new(dir.path().join("installed.json"));
        store.upsert(record("k8s", Some("prod"))).unwrap();
        store.upsert(record("k8s", Some("staging"))).unwrap();

        store.remove("k8s", Target::ClusterManagement, Some("prod")).unwrap();
        let remaining = store.all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].context_name.as_deref(), Some("staging"));
    }
}
