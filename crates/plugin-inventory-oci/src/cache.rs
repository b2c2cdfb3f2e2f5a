use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fs4::FileExt;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use plugin_inventory_types::{Error, Result};

use crate::fetch::{ImageDigest, OciClient};
use crate::metadata_overlay;
use crate::pki::SignatureVerifier;

const DEFAULT_TTL_SECS: u64 = 1800;
const TTL_ENV_VAR: &str = "PLUGIN_INVENTORY_CACHE_TTL_SECONDS";
const LOCAL_CACHE_ONLY_ENV_VAR: &str = "PLUGIN_INVENTORY_LOCAL_CACHE_ONLY";

const INVENTORY_DIGEST_PREFIX: &str = "digest.";
const METADATA_DIGEST_PREFIX: &str = "metadata.digest.";

/// A ready-to-query catalogue: the DB file plus the directory it was
/// unpacked into (used by the inventory store to resolve relative URIs).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub db_path: PathBuf,
    pub image_dir: PathBuf,
    pub central_config_path: Option<PathBuf>,
}

/// On-disk, digest-keyed cache of one discovery's inventory image.
///
/// Implements the two-digest protocol from the component design: a TTL
/// gate short-circuits re-resolution within the freshness window; a digest
/// probe distinguishes "unchanged", "changed", and "poisoned" cache states;
/// a download-on-miss path pulls, verifies, and atomically swaps in a new
/// catalogue; a commit step resets the TTL clock and rewrites the digest
/// files.
pub struct Cache {
    cache_root: PathBuf,
    ttl: Duration,
    oci_client: Arc<dyn OciClient>,
    signature_verifier: Option<SignatureVerifier>,
}

impl Cache {
    pub fn new(cache_root: PathBuf, oci_client: Arc<dyn OciClient>) -> Self {
        let ttl = std::env::var(TTL_ENV_VAR)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_TTL_SECS));
        Self {
            cache_root,
            ttl,
            oci_client,
            signature_verifier: None,
        }
    }

    pub fn with_signature_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.signature_verifier = Some(verifier);
        self
    }

    fn env_local_cache_only() -> bool {
        std::env::var(LOCAL_CACHE_ONLY_ENV_VAR)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn discovery_dir(&self, discovery_name: &str) -> PathBuf {
        self.cache_root.join("plugin-inventory").join(discovery_name)
    }

    /// Refreshes (or reuses) the cache entry for `discovery_name`, whose
    /// current image is `image_uri` with an optional metadata overlay
    /// image at `metadata_image_uri`.
    ///
    /// `force_refresh` bypasses the TTL gate. `use_local_cache_only` (or
    /// the env var override) bypasses the fetch entirely: only an already
    /// cached entry is returned, failing if none exists.
    pub async fn refresh(
        &self,
        discovery_name: &str,
        image_uri: &str,
        metadata_image_uri: Option<&str>,
        force_refresh: bool,
        use_local_cache_only: bool,
        cancel: &CancellationToken,
    ) -> Result<CacheEntry> {
        if cancel.is_cancelled() {
            return Err(Error::CancelledOrDeadline);
        }

        let dir = self.discovery_dir(discovery_name);
        fs::create_dir_all(&dir)?;

        let local_cache_only = use_local_cache_only || Self::env_local_cache_only();

        if local_cache_only {
            return self.existing_entry(discovery_name, &dir).ok_or_else(|| {
                Error::SourceUnavailable(
                    discovery_name.to_string(),
                    "local-cache-only requested but no cached inventory is present".to_string(),
                )
            });
        }

        // Step 1: TTL gate.
        if !force_refresh {
            if let Some(entry) = self.fresh_within_ttl(discovery_name, &dir, image_uri)? {
                return Ok(entry);
            }
        }

        let lock_path = dir.join(".lock");
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        FileExt::lock_exclusive(&lock_file)
            .map_err(|e| Error::SourceUnavailable(discovery_name.to_string(), e.to_string()))?;

        let result = self
            .refresh_locked(discovery_name, &dir, image_uri, metadata_image_uri, cancel)
            .await;

        let _ = FileExt::unlock(&lock_file);
        result
    }

    fn existing_entry(&self, _discovery_name: &str, dir: &Path) -> Option<CacheEntry> {
        let db_path = dir.join("plugin_inventory.db");
        if db_path.exists() {
            Some(CacheEntry {
                db_path,
                image_dir: dir.to_path_buf(),
                central_config_path: optional_path(dir.join("central_config.yaml")),
            })
        } else {
            None
        }
    }

    fn fresh_within_ttl(
        &self,
        discovery_name: &str,
        dir: &Path,
        image_uri: &str,
    ) -> Result<Option<CacheEntry>> {
        let probe = probe_digest(dir, INVENTORY_DIGEST_PREFIX)?;
        let DigestProbe::Present { path, .. } = probe else {
            return Ok(None);
        };

        let modified = fs::metadata(&path)?.modified()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::MAX);
        if age > self.ttl {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        if content != image_uri {
            return Ok(None);
        }

        info!("discovery `{discovery_name}`: cache is fresh within TTL, skipping network I/O");
        Ok(self.existing_entry(discovery_name, dir))
    }

    async fn refresh_locked(
        &self,
        discovery_name: &str,
        dir: &Path,
        image_uri: &str,
        metadata_image_uri: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<CacheEntry> {
        // Step 2: resolve current digests.
        let inventory_digest = self
            .oci_client
            .resolve_image_digest(image_uri, cancel)
            .await
            .map_err(|e| Error::ImageResolveFailed(discovery_name.to_string(), e.to_string()))?;
        let metadata_digest = match metadata_image_uri {
            Some(uri) => self.oci_client.resolve_image_digest(uri, cancel).await?,
            None => ImageDigest::none(),
        };

        // Step 3: compare against what's on disk.
        let metadata_uri_on_disk = metadata_image_uri.unwrap_or("none");
        let inventory_state = reconcile_digest_family(dir, INVENTORY_DIGEST_PREFIX, &inventory_digest, image_uri)?;
        let metadata_state =
            reconcile_digest_family(dir, METADATA_DIGEST_PREFIX, &metadata_digest, metadata_uri_on_disk)?;

        if inventory_state == DigestState::UpToDate && metadata_state == DigestState::UpToDate {
            return self.existing_entry(discovery_name, dir).ok_or_else(|| {
                Error::InventoryCorrupt(
                    discovery_name.to_string(),
                    "digest file present but catalogue DB missing".to_string(),
                )
            });
        }

        // Step 4: download on miss.
        self.download_and_swap(
            discovery_name,
            dir,
            image_uri,
            metadata_image_uri,
            &inventory_digest,
            &metadata_digest,
            cancel,
        )
        .await
    }

    async fn download_and_swap(
        &self,
        discovery_name: &str,
        dir: &Path,
        image_uri: &str,
        metadata_image_uri: Option<&str>,
        inventory_digest: &ImageDigest,
        metadata_digest: &ImageDigest,
        cancel: &CancellationToken,
    ) -> Result<CacheEntry> {
        if let Some(verifier) = &self.signature_verifier {
            let signature = self.oci_client.resolve_image_signature(image_uri, cancel).await?;
            let message = inventory_digest.digest.as_bytes();
            if let Err(err) = verifier.verify(image_uri, message, signature.as_deref()) {
                warn!("discovery `{discovery_name}`: signature verification failed: {err}");
                return Err(err);
            }
        }

        let tmp_inventory = dir.join(format!(".tmp-inventory-{}", inventory_digest.hex()));
        let _ = fs::remove_dir_all(&tmp_inventory);
        self.oci_client
            .pull_image_to_dir(image_uri, &tmp_inventory, cancel)
            .await?;

        let pulled_db = tmp_inventory.join("plugin_inventory.db");
        if !pulled_db.exists() {
            return Err(Error::InventoryCorrupt(
                discovery_name.to_string(),
                "pulled image did not contain plugin_inventory.db".to_string(),
            ));
        }

        if let Some(metadata_uri) = metadata_image_uri.filter(|_| !metadata_digest.is_none()) {
            let tmp_metadata = dir.join(format!(".tmp-metadata-{}", metadata_digest.hex()));
            let _ = fs::remove_dir_all(&tmp_metadata);
            self.oci_client
                .pull_image_to_dir(metadata_uri, &tmp_metadata, cancel)
                .await?;
            let metadata_db = tmp_metadata.join("metadata.db");
            if metadata_db.exists() {
                metadata_overlay::apply_retention(&pulled_db, &metadata_db)?;
            }
            let _ = fs::remove_dir_all(&tmp_metadata);
        }

        // Step 4 (cont'd): atomic swap — rename the freshly populated
        // directory's contents into place.
        let final_db = dir.join("plugin_inventory.db");
        fs::rename(&pulled_db, &final_db)?;

        let pulled_config = tmp_inventory.join("central_config.yaml");
        let final_config = dir.join("central_config.yaml");
        if pulled_config.exists() {
            fs::rename(&pulled_config, &final_config)?;
        }
        let _ = fs::remove_dir_all(&tmp_inventory);

        // Step 5: commit — reset the TTL clock and rewrite digest files.
        let metadata_uri_on_disk = metadata_image_uri.unwrap_or("none");
        commit_digest_family(dir, INVENTORY_DIGEST_PREFIX, inventory_digest, image_uri)?;
        commit_digest_family(dir, METADATA_DIGEST_PREFIX, metadata_digest, metadata_uri_on_disk)?;

        Ok(CacheEntry {
            db_path: final_db,
            image_dir: dir.to_path_buf(),
            central_config_path: optional_path(final_config),
        })
    }
}

fn optional_path(path: PathBuf) -> Option<PathBuf> {
    path.exists().then_some(path)
}

#[derive(Debug, PartialEq, Eq)]
enum DigestProbe {
    Missing,
    Present { path: PathBuf, hash: String },
    Poisoned(Vec<PathBuf>),
}

#[derive(Debug, PartialEq, Eq)]
enum DigestState {
    UpToDate,
    Changed,
}

fn probe_digest(dir: &Path, prefix: &str) -> Result<DigestProbe> {
    let matches = list_digest_files(dir, prefix)?;
    match matches.len() {
        0 => Ok(DigestProbe::Missing),
        1 => {
            let path = matches.into_iter().next().expect("length checked");
            let hash = file_name_suffix(&path, prefix);
            Ok(DigestProbe::Present { path, hash })
        }
        _ => Ok(DigestProbe::Poisoned(matches)),
    }
}

fn list_digest_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    if !dir.exists() {
        return Ok(matches);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.starts_with(prefix) {
            // the metadata family shares the "digest." substring with the
            // inventory family; only match the family whose prefix is an
            // exact match, not a subset (`metadata.digest.` vs `digest.`).
            if prefix == INVENTORY_DIGEST_PREFIX && file_name.starts_with(METADATA_DIGEST_PREFIX) {
                continue;
            }
            matches.push(entry.path());
        }
    }
    Ok(matches)
}

fn file_name_suffix(path: &Path, prefix: &str) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().trim_start_matches(prefix).to_string())
        .unwrap_or_default()
}

/// Reconciles one digest family (inventory or metadata) against the
/// resolved hash: poisoned states are cleaned up (removed) and treated as
/// a miss; a single matching file is up to date (its URI content is
/// rewritten in case the source URI changed, but no download occurs); any
/// other state is a miss.
fn reconcile_digest_family(
    dir: &Path,
    prefix: &str,
    resolved: &ImageDigest,
    current_uri: &str,
) -> Result<DigestState> {
    match probe_digest(dir, prefix)? {
        DigestProbe::Poisoned(files) => {
            warn!("cache at {dir:?} poisoned for family `{prefix}`, removing {} files", files.len());
            for f in files {
                let _ = fs::remove_file(f);
            }
            Ok(DigestState::Changed)
        }
        DigestProbe::Missing => Ok(DigestState::Changed),
        DigestProbe::Present { path, hash } => {
            if hash == resolved.hex() {
                let existing = fs::read_to_string(&path)?;
                if existing != current_uri {
                    fs::write(&path, current_uri)?;
                }
                Ok(DigestState::UpToDate)
            } else {
                Ok(DigestState::Changed)
            }
        }
    }
}

/// Writes the commit-time digest file for one family, removing any stale
/// file from a previous digest first, and resets its mtime to now.
fn commit_digest_family(
    dir: &Path,
    prefix: &str,
    resolved: &ImageDigest,
    current_uri: &str,
) -> Result<()> {
    for stale in list_digest_files(dir, prefix)? {
        let _ = fs::remove_file(stale);
    }
    let path = dir.join(format!("{prefix}{}", resolved.hex()));
    fs::write(&path, current_uri)?;
    // explicitly touch the mtime so a fast filesystem clock doesn't leave
    // the file looking older than the write that just happened.
    let now = filetime_now();
    let _ = set_file_mtime(&path, now);
    Ok(())
}

fn filetime_now() -> SystemTime {
    SystemTime::now()
}

fn set_file_mtime(path: &Path, time: SystemTime) -> std::io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(time)
}
