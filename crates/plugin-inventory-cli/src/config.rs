//! Process-start configuration: the list of configured discovery sources,
//! the active context name, and the on-disk locations the rest of the CLI
//! derives everything else from.
//!
//! Loaded once at the top of `main`, right after `dotenvy::dotenv().ok()`
//! reads environment overrides — here that single call is followed by a
//! TOML config file read instead of a flat `.env`, since a CLI distributed
//! to end users needs a real per-OS config directory rather than a file
//! next to the binary.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use plugin_inventory_types::{DiscoverySource, Error, RawDiscoverySourceRecord, Result};

const QUALIFIER: &str = "tools";
const ORGANIZATION: &str = "example";
const APPLICATION: &str = "plugin-inventory";

const SIGNATURE_SKIP_ENV_VAR: &str = "PLUGIN_INVENTORY_SIGNATURE_SKIP";
const LOCAL_CACHE_ONLY_ENV_VAR: &str = "PLUGIN_INVENTORY_LOCAL_CACHE_ONLY";
const INCLUDE_HIDDEN_ENV_VAR: &str = "PLUGIN_INVENTORY_INCLUDE_HIDDEN";

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub discoveries: Vec<DiscoverySource>,
    pub active_context: Option<String>,
    /// Path to the PEM-encoded verifying key used to check inventory image
    /// signatures. Unset means signature verification is skipped entirely
    /// (e.g. local development against an unsigned mirror).
    pub signature_public_key: Option<String>,
}

/// On-disk shape of [`Config`]: each `[[discoveries]]` entry is a
/// [`RawDiscoverySourceRecord`] rather than the internally-tagged
/// `DiscoverySource` enum, so an entry with zero or more than one
/// populated variant table is a config error ([`DiscoverySource::from_raw`])
/// rather than a value serde happens to accept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawConfig {
    #[serde(default)]
    discoveries: Vec<RawDiscoverySourceRecord>,
    #[serde(default)]
    active_context: Option<String>,
    #[serde(default)]
    signature_public_key: Option<String>,
}

/// Resolved filesystem layout for one invocation, combining the config
/// file's content with platform directories and environment overrides
/// read once at construction and never re-read per call.
pub struct Paths {
    pub config_file: PathBuf,
    pub cache_root: PathBuf,
    pub data_store_file: PathBuf,
    pub installation_store_file: PathBuf,
    pub plugin_install_dir: PathBuf,
}

impl Paths {
    pub fn resolve() -> Result<Self> {
        let dirs = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .ok_or_else(|| Error::Io("could not resolve a platform config directory".to_string()))?;
        Ok(Self {
            config_file: dirs.config_dir().join("config.toml"),
            cache_root: dirs.cache_dir().to_path_buf(),
            data_store_file: dirs.data_dir().join("store.yaml"),
            installation_store_file: dirs.data_dir().join("installed.json"),
            plugin_install_dir: dirs.data_dir().join("plugins"),
        })
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let raw: RawConfig = toml::from_str(&contents)
            .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?;
        let discoveries = raw
            .discoveries
            .into_iter()
            .map(DiscoverySource::from_raw)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?;
        Ok(Config {
            discoveries,
            active_context: raw.active_context,
            signature_public_key: raw.signature_public_key,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = RawConfig {
            discoveries: self.discoveries.iter().map(DiscoverySource::to_raw).collect(),
            active_context: self.active_context.clone(),
            signature_public_key: self.signature_public_key.clone(),
        };
        let contents = toml::to_string_pretty(&raw).map_err(|e| Error::Parse(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Reads `PLUGIN_INVENTORY_SIGNATURE_SKIP` as a comma-separated image-URI
/// list.
pub fn signature_skip_list() -> std::collections::HashSet<String> {
    std::env::var(SIGNATURE_SKIP_ENV_VAR)
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Builds the signature verifier described by `config`, if any. Returns
/// `None` when no verifying key is configured, in which case discovery and
/// install paths skip verification entirely rather than failing closed.
pub fn signature_verifier(
    config: &Config,
) -> Result<Option<plugin_inventory_oci::SignatureVerifier>> {
    let Some(key_path) = &config.signature_public_key else {
        return Ok(None);
    };
    let verifier = plugin_inventory_oci::SignatureVerifier::new(key_path, signature_skip_list())?;
    Ok(Some(verifier))
}

pub fn local_cache_only_override() -> bool {
    std::env::var(LOCAL_CACHE_ONLY_ENV_VAR)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn include_hidden_override() -> bool {
    std::env::var(INCLUDE_HIDDEN_ENV_VAR)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert!(config.discoveries.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            discoveries: vec![DiscoverySource::Oci {
                name: "central".into(),
                image: "registry/plugins:latest".into(),
            }],
            active_context: Some("prod".into()),
            signature_public_key: None,
        };
        config.save(&path).unwrap();
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.discoveries.len(), 1);
        assert_eq!(reloaded.active_context.as_deref(), Some("prod"));
    }

    #[test]
    fn signature_verifier_is_none_without_a_configured_key() {
        let config = Config::default();
        assert!(signature_verifier(&config).unwrap().is_none());
    }
}
