use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::warn;
use rusqlite::{Connection, OpenFlags, Row};

use plugin_inventory_types::{
    Error, GroupMember, PluginDescriptor, PluginEntry, PluginGroup, Result, Target, Version,
};

use crate::filter::{GroupFilter, PluginFilter};

/// Read-only handle onto one catalogue DB file.
///
/// Opened read-only for the query API described here; a separate write API
/// used only by the publishing workflow is out of core scope and lives
/// elsewhere.
pub struct InventoryStore {
    discovery_name: String,
    conn: Connection,
    /// Directory the discovered image was unpacked into. Relative URIs
    /// stored in the DB are prefixed with this before being handed back,
    /// so mirroring the repository never requires rewriting the DB.
    image_dir: PathBuf,
}

impl InventoryStore {
    /// Opens `db_path` read-only. `image_dir` is the directory the owning
    /// cache entry unpacked the image into (used to resolve relative URIs).
    pub fn open(discovery_name: &str, db_path: &Path, image_dir: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| Error::InventoryCorrupt(discovery_name.to_string(), e.to_string()))?;
        Ok(Self {
            discovery_name: discovery_name.to_string(),
            conn,
            image_dir: image_dir.to_path_buf(),
        })
    }

    fn wrap_query_err(&self, err: rusqlite::Error) -> Error {
        Error::InventoryCorrupt(self.discovery_name.clone(), err.to_string())
    }

    fn resolve_uri(&self, relative: &str) -> String {
        self.image_dir.join(relative).to_string_lossy().into_owned()
    }

    /// Returns plugin entries matching `filter`, grouped by `(name,
    /// target)`. Relies on the underlying query ordering rows by `(name,
    /// target, version)` ascending to detect entry boundaries in one pass.
    pub fn get_plugins(&self, filter: &PluginFilter) -> Result<Vec<PluginEntry>> {
        let mut sql = String::from(
            "SELECT name, target, recommended_version, version, hidden, description, \
             publisher, vendor, os, arch, digest, uri FROM PluginBinaries WHERE 1 = 1",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        push_eq(&mut sql, &mut params, "name", &filter.name);
        push_eq(&mut sql, &mut params, "target", &filter.target);
        push_eq(&mut sql, &mut params, "version", &filter.version);
        push_eq(&mut sql, &mut params, "os", &filter.os);
        push_eq(&mut sql, &mut params, "arch", &filter.arch);
        push_eq(&mut sql, &mut params, "publisher", &filter.publisher);
        push_eq(&mut sql, &mut params, "vendor", &filter.vendor);
        if !filter.include_hidden {
            sql.push_str(" AND hidden = 0");
        }
        sql.push_str(" ORDER BY name ASC, target ASC, version ASC");

        let mut stmt = self.conn.prepare(&sql).map_err(|e| self.wrap_query_err(e))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| self.row_to_raw(row))
            .map_err(|e| self.wrap_query_err(e))?;

        let mut entries: Vec<PluginEntry> = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| self.wrap_query_err(e))?;
            self.fold_row(&mut entries, raw);
        }
        Ok(entries)
    }

    fn row_to_raw(&self, row: &Row<'_>) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            name: row.get(0)?,
            target: row.get(1)?,
            recommended_version: row.get(2)?,
            version: row.get(3)?,
            hidden: row.get::<_, i64>(4)? != 0,
            description: row.get(5)?,
            publisher: row.get(6)?,
            vendor: row.get(7)?,
            os: row.get(8)?,
            arch: row.get(9)?,
            digest: row.get(10)?,
            uri: row.get(11)?,
        })
    }

    fn fold_row(&self, entries: &mut Vec<PluginEntry>, raw: RawRow) {
        let target = Target::normalise(&raw.target);
        let version = match Version::parse(&raw.version) {
            Ok(v) => v,
            Err(err) => {
                warn!(
                    "discovery `{}`: unparseable version `{}` for plugin `{}`: {}",
                    self.discovery_name, raw.version, raw.name, err
                );
                return;
            }
        };

        let boundary_matches = entries
            .last()
            .map(|e| e.name == raw.name && e.target == target)
            .unwrap_or(false);

        if !boundary_matches {
            entries.push(PluginEntry {
                name: raw.name.clone(),
                target,
                description: raw.description.clone(),
                publisher: raw.publisher.clone(),
                vendor: raw.vendor.clone(),
                declared_recommended_version: raw
                    .recommended_version
                    .as_deref()
                    .and_then(|v| Version::parse(v).ok()),
                artifacts_by_version: BTreeMap::new(),
            });
        }

        let entry = entries.last_mut().expect("entry was just pushed");
        entry
            .artifacts_by_version
            .entry(version.clone())
            .or_default()
            .push(PluginDescriptor {
                name: raw.name,
                target,
                version,
                os: raw.os,
                arch: raw.arch,
                image_uri: self.resolve_uri(&raw.uri),
                digest: raw.digest,
                publisher: raw.publisher,
                vendor: raw.vendor,
                description: raw.description,
                hidden: raw.hidden,
            });
    }

    /// Returns plugin groups matching `filter`.
    pub fn get_plugin_groups(&self, filter: &GroupFilter) -> Result<Vec<PluginGroup>> {
        let mut sql = String::from(
            "SELECT vendor, publisher, name, version, hidden FROM PluginGroups WHERE 1 = 1",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        push_eq(&mut sql, &mut params, "vendor", &filter.vendor);
        push_eq(&mut sql, &mut params, "publisher", &filter.publisher);
        push_eq(&mut sql, &mut params, "name", &filter.name);
        push_eq(&mut sql, &mut params, "version", &filter.version);
        if !filter.include_hidden {
            sql.push_str(" AND hidden = 0");
        }
        sql.push_str(" ORDER BY vendor ASC, publisher ASC, name ASC, version ASC");

        let mut stmt = self.conn.prepare(&sql).map_err(|e| self.wrap_query_err(e))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)? != 0,
                ))
            })
            .map_err(|e| self.wrap_query_err(e))?;

        let mut groups = Vec::new();
        for row in rows {
            let (vendor, publisher, name, version, hidden) =
                row.map_err(|e| self.wrap_query_err(e))?;
            let version = match Version::parse(&version) {
                Ok(v) => v,
                Err(err) => {
                    warn!(
                        "discovery `{}`: unparseable group version `{}` for `{}`: {}",
                        self.discovery_name, version, name, err
                    );
                    continue;
                }
            };
            let members = self.get_group_members(&vendor, &publisher, &name, &version)?;
            groups.push(PluginGroup {
                vendor,
                publisher,
                name,
                version,
                members,
                hidden,
            });
        }
        Ok(groups)
    }

    fn get_group_members(
        &self,
        vendor: &str,
        publisher: &str,
        name: &str,
        version: &Version,
    ) -> Result<Vec<GroupMember>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT member_name, member_target, member_version FROM PluginGroupMembers \
                 WHERE group_vendor = ?1 AND group_publisher = ?2 AND group_name = ?3 \
                 AND group_version = ?4 ORDER BY member_order ASC",
            )
            .map_err(|e| self.wrap_query_err(e))?;
        let version_str = version.to_string();
        let rows = stmt
            .query_map(
                rusqlite::params![vendor, publisher, name, version_str],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .map_err(|e| self.wrap_query_err(e))?;

        let mut members = Vec::new();
        for row in rows {
            let (member_name, member_target, member_version) =
                row.map_err(|e| self.wrap_query_err(e))?;
            let member_version = match Version::parse(&member_version) {
                Ok(v) => v,
                Err(_) => continue,
            };
            members.push(GroupMember {
                name: member_name,
                target: Target::normalise(&member_target),
                version: member_version,
            });
        }
        Ok(members)
    }
}

struct RawRow {
    name: String,
    target: String,
    recommended_version: Option<String>,
    version: String,
    hidden: bool,
    description: String,
    publisher: String,
    vendor: String,
    os: String,
    arch: String,
    digest: String,
    uri: String,
}

fn push_eq(
    sql: &mut String,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
    column: &str,
    value: &Option<String>,
) {
    if let Some(v) = value {
        params.push(Box::new(v.clone()));
        sql.push_str(&format!(" AND {column} = ?{}", params.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ensure_schema;

    #[test]
    fn get_plugins_groups_by_name_target_with_ascending_versions() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("plugin_inventory.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            ensure_schema(&conn).unwrap();
            conn.execute_batch(
                "INSERT INTO PluginBinaries VALUES
                    ('k8s', 'cluster-management', NULL, '1.9.2-beta.1', 0, 'd', 'p', 'v', 'linux', 'amd64', 'dig1', 'k8s/v1'),
                    ('k8s', 'cluster-management', NULL, '2.3.5', 0, 'd', 'p', 'v', 'linux', 'amd64', 'dig2', 'k8s/v2'),
                    ('k8s', 'cluster-management', NULL, '1.11.3', 0, 'd', 'p', 'v', 'linux', 'amd64', 'dig3', 'k8s/v3');",
            )
            .unwrap();
        }
        let store = InventoryStore::open("central", &db_path, dir.path()).unwrap();
        let entries = store.get_plugins(&PluginFilter::default()).unwrap();
        assert_eq!(entries.len(), 1);
        let versions: Vec<String> = entries[0]
            .supported_versions()
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(versions, vec!["v1.9.2-beta.1", "v1.11.3", "v2.3.5"]);
    }

    #[test]
    fn hidden_plugins_excluded_unless_requested() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("plugin_inventory.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            ensure_schema(&conn).unwrap();
            conn.execute_batch(
                "INSERT INTO PluginBinaries VALUES
                    ('secret', 'global', NULL, '1.0.0', 1, 'd', 'p', 'v', 'linux', 'amd64', 'dig', 'secret/v1');",
            )
            .unwrap();
        }
        let store = InventoryStore::open("central", &db_path, dir.path()).unwrap();
        assert!(store.get_plugins(&PluginFilter::default()).unwrap().is_empty());

        let mut filter = PluginFilter::default();
        filter.include_hidden = true;
        assert_eq!(store.get_plugins(&filter).unwrap().len(), 1);
    }

    #[test]
    fn resolves_relative_uri_against_image_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("plugin_inventory.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            ensure_schema(&conn).unwrap();
            conn.execute_batch(
                "INSERT INTO PluginBinaries VALUES
                    ('k8s', 'cluster-management', NULL, '1.0.0', 0, 'd', 'p', 'v', 'linux', 'amd64', 'dig', 'k8s/v1.0.0/linux-amd64');",
            )
            .unwrap();
        }
        let store = InventoryStore::open("central", &db_path, dir.path()).unwrap();
        let entries = store.get_plugins(&PluginFilter::default()).unwrap();
        let descriptor = &entries[0].artifacts_by_version.values().next().unwrap()[0];
        assert!(descriptor.image_uri.starts_with(dir.path().to_str().unwrap()));
        assert!(descriptor.image_uri.ends_with("k8s/v1.0.0/linux-amd64"));
    }
}
