//! Air-gapped metadata overlay.
//!
//! When a discovery ships an optional metadata image alongside its primary
//! inventory image, the metadata DB declares a *retention set*: the plugins
//! and groups that should survive in the catalogue. Rows not named in the
//! retention set are deleted from the primary DB before it is swapped into
//! the cache, so an air-gapped mirror can narrow a vendor's full catalogue
//! down to an approved subset without re-publishing the inventory image
//! itself.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;

use plugin_inventory_types::Result;

/// Deletes plugin and group rows from `primary_db` whose identifiers are
/// absent from `metadata_db`'s retention tables.
pub fn apply_retention(primary_db: &Path, metadata_db: &Path) -> Result<()> {
    let metadata_conn = Connection::open(metadata_db)?;
    let retained_plugins = read_retained_plugins(&metadata_conn)?;
    let retained_groups = read_retained_groups(&metadata_conn)?;
    drop(metadata_conn);

    let primary_conn = Connection::open(primary_db)?;
    prune_plugins(&primary_conn, &retained_plugins)?;
    prune_groups(&primary_conn, &retained_groups)?;
    Ok(())
}

fn read_retained_plugins(conn: &Connection) -> Result<HashSet<(String, String)>> {
    if !table_exists(conn, "RetainedPlugins")? {
        return Ok(HashSet::new());
    }
    let mut stmt = conn.prepare("SELECT name, target FROM RetainedPlugins")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    let mut set = HashSet::new();
    for row in rows {
        set.insert(row?);
    }
    Ok(set)
}

fn read_retained_groups(conn: &Connection) -> Result<HashSet<(String, String, String)>> {
    if !table_exists(conn, "RetainedGroups")? {
        return Ok(HashSet::new());
    }
    let mut stmt = conn.prepare("SELECT vendor, publisher, name FROM RetainedGroups")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut set = HashSet::new();
    for row in rows {
        set.insert(row?);
    }
    Ok(set)
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Retention sets that are empty (no `RetainedPlugins`/`RetainedGroups`
/// table in the metadata image) are treated as "retain everything" rather
/// than "retain nothing" — an overlay image only narrows a catalogue when
/// it explicitly says so.
fn prune_plugins(conn: &Connection, retained: &HashSet<(String, String)>) -> Result<()> {
    if retained.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare("SELECT DISTINCT name, target FROM PluginBinaries")?;
    let present: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<_, _>>()?;
    drop(stmt);

    for (name, target) in present {
        if !retained.contains(&(name.clone(), target.clone())) {
            conn.execute(
                "DELETE FROM PluginBinaries WHERE name = ?1 AND target = ?2",
                rusqlite::params![name, target],
            )?;
        }
    }
    Ok(())
}

fn prune_groups(conn: &Connection, retained: &HashSet<(String, String, String)>) -> Result<()> {
    if retained.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare("SELECT DISTINCT vendor, publisher, name FROM PluginGroups")?;
    let present: Vec<(String, String, String)> = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<_, _>>()?;
    drop(stmt);

    for (vendor, publisher, name) in present {
        if !retained.contains(&(vendor.clone(), publisher.clone(), name.clone())) {
            conn.execute(
                "DELETE FROM PluginGroups WHERE vendor = ?1 AND publisher = ?2 AND name = ?3",
                rusqlite::params![vendor, publisher, name],
            )?;
            conn.execute(
                "DELETE FROM PluginGroupMembers WHERE group_vendor = ?1 AND group_publisher = ?2 AND group_name = ?3",
                rusqlite::params![vendor, publisher, name],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn primary_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        plugin_inventory_store::ensure_schema(&conn).unwrap();
        conn.execute_batch(
            "
            INSERT INTO PluginBinaries (name, target, version, os, arch, digest, uri)
                VALUES ('kubectl-foo', 'kubectl', '1.0.0', 'linux', 'amd64', 'd1', 'kubectl-foo/1.0.0');
            INSERT INTO PluginBinaries (name, target, version, os, arch, digest, uri)
                VALUES ('kubectl-bar', 'kubectl', '1.0.0', 'linux', 'amd64', 'd2', 'kubectl-bar/1.0.0');
            INSERT INTO PluginGroups (vendor, publisher, name, version)
                VALUES ('acme', 'acme-publisher', 'starter', '1.0.0');
            ",
        )
        .unwrap();
        conn
    }

    #[test]
    fn empty_retention_set_keeps_everything() {
        let conn = primary_db();
        prune_plugins(&conn, &HashSet::new()).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM PluginBinaries", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn non_retained_plugin_is_deleted() {
        let conn = primary_db();
        let mut retained = HashSet::new();
        retained.insert(("kubectl-foo".to_string(), "kubectl".to_string()));
        prune_plugins(&conn, &retained).unwrap();

        let count: i64 = conn
            .query_row("SELECT count(*) FROM PluginBinaries", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let remaining: String = conn
            .query_row("SELECT name FROM PluginBinaries", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, "kubectl-foo");
    }

    #[test]
    fn non_retained_group_cascades_to_members() {
        let conn = primary_db();
        conn.execute(
            "INSERT INTO PluginGroupMembers (group_vendor, group_publisher, group_name, group_version, member_name, member_target, member_version, member_order)
             VALUES ('acme', 'acme-publisher', 'starter', '1.0.0', 'kubectl-foo', 'kubectl', '1.0.0', 0)",
            [],
        )
        .unwrap();

        prune_groups(&conn, &HashSet::new()).unwrap_or(());
        let mut retained = HashSet::new();
        retained.insert(("other-vendor".to_string(), "other-pub".to_string(), "other-group".to_string()));
        prune_groups(&conn, &retained).unwrap();

        let groups: i64 = conn
            .query_row("SELECT count(*) FROM PluginGroups", [], |r| r.get(0))
            .unwrap();
        let members: i64 = conn
            .query_row("SELECT count(*) FROM PluginGroupMembers", [], |r| r.get(0))
            .unwrap();
        assert_eq!(groups, 0);
        assert_eq!(members, 0);
    }
}
