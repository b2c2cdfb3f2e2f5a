//! Inventory DB schema definitions.
//!
//! One `PluginBinaries` table keyed by `(name, target, version, os, arch)`,
//! plus `PluginGroups` and a `PluginGroupMembers` join table. URIs are
//! stored relative to the discovered image's directory prefix so mirroring
//! the repository never requires DB rewrites.

use rusqlite::Connection;

use plugin_inventory_types::{Error, Result};

/// Creates the catalogue tables if they do not already exist. Used by the
/// publishing workflow (out of core scope) and by tests that build a
/// fixture DB in memory; the read path never calls this against a real
/// cache file, since the cache only ever receives tables via an atomic swap
/// of a freshly pulled image.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS PluginBinaries (
            name                 TEXT NOT NULL,
            target               TEXT NOT NULL,
            recommended_version  TEXT,
            version              TEXT NOT NULL,
            hidden               INTEGER NOT NULL DEFAULT 0,
            description          TEXT NOT NULL DEFAULT '',
            publisher            TEXT NOT NULL DEFAULT '',
            vendor               TEXT NOT NULL DEFAULT '',
            os                   TEXT NOT NULL,
            arch                 TEXT NOT NULL,
            digest               TEXT NOT NULL,
            uri                  TEXT NOT NULL,
            PRIMARY KEY (name, target, version, os, arch)
        );

        CREATE TABLE IF NOT EXISTS PluginGroups (
            vendor    TEXT NOT NULL,
            publisher TEXT NOT NULL,
            name      TEXT NOT NULL,
            version   TEXT NOT NULL,
            hidden    INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (vendor, publisher, name, version)
        );

        CREATE TABLE IF NOT EXISTS PluginGroupMembers (
            group_vendor    TEXT NOT NULL,
            group_publisher TEXT NOT NULL,
            group_name      TEXT NOT NULL,
            group_version   TEXT NOT NULL,
            member_name     TEXT NOT NULL,
            member_target   TEXT NOT NULL,
            member_version  TEXT NOT NULL,
            member_order    INTEGER NOT NULL
        );
        ",
    )
    .map_err(|e| Error::InventoryCorrupt(String::new(), e.to_string()))?;
    Ok(())
}
