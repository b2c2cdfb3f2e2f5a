//! Unified interface across discovery variants (C4).
//!
//! Construction from a [`DiscoverySource`] is total: every tag maps to a
//! concrete implementation, so there is no "unsupported source type" error
//! at this layer — only `UnknownSource` at the raw-record boundary (see
//! `plugin_inventory_types::source`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use plugin_inventory_oci::{Cache, HttpOciClient, OciClient, SignatureVerifier};
use plugin_inventory_store::{GroupFilter, InventoryStore, PluginFilter};
use plugin_inventory_types::{DiscoverySource, Error, PluginEntry, PluginGroup, Result};

/// Per-call options shared by `list_plugins`/`list_groups`.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub filter: PluginFilter,
    pub group_filter: GroupFilter,
    pub use_local_cache_only: bool,
    pub force_refresh: bool,
}

/// Common contract every discovery variant implements.
#[async_trait]
pub trait Discovery: Send + Sync {
    fn name(&self) -> &str;
    fn type_tag(&self) -> &'static str;
    async fn list_plugins(&self, options: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<PluginEntry>>;
    async fn list_groups(&self, options: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<PluginGroup>>;
}

/// Builds the concrete [`Discovery`] implementation for a configured
/// source. Total: every `DiscoverySource` variant maps to exactly one
/// implementation.
///
/// `signature_verifier` is only consulted by the OCI variant; other
/// variants have no inventory image to verify.
pub fn build_discovery(
    source: DiscoverySource,
    cache_root: PathBuf,
    signature_verifier: Option<SignatureVerifier>,
) -> Box<dyn Discovery> {
    match source {
        DiscoverySource::Oci { name, image } => {
            let client: Arc<dyn OciClient> = Arc::new(HttpOciClient::default());
            Box::new(OciDiscovery {
                name,
                image,
                metadata_image: None,
                cache_root,
                oci_client: client,
                signature_verifier,
            })
        }
        DiscoverySource::Local { name, path } => Box::new(LocalDiscovery {
            name,
            path: PathBuf::from(path),
        }),
        DiscoverySource::Kubernetes {
            name,
            kubeconfig,
            context,
        } => Box::new(KubernetesDiscovery {
            name,
            kubeconfig,
            context,
        }),
        DiscoverySource::Rest {
            name,
            endpoint,
            base_path,
        } => Box::new(RestDiscovery {
            name,
            endpoint,
            base_path,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("reqwest client builds with default TLS config"),
        }),
    }
}

/// The DB-backed OCI discovery engine: composes the Inventory Cache (C3)
/// and the Inventory Store (C1) behind the facade. The only variant that
/// supports criteria-based filtering and groups.
pub struct OciDiscovery {
    name: String,
    image: String,
    metadata_image: Option<String>,
    cache_root: PathBuf,
    oci_client: Arc<dyn OciClient>,
    signature_verifier: Option<SignatureVerifier>,
}

impl OciDiscovery {
    pub fn new(name: String, image: String, cache_root: PathBuf, oci_client: Arc<dyn OciClient>) -> Self {
        Self {
            name,
            image,
            metadata_image: None,
            cache_root,
            oci_client,
            signature_verifier: None,
        }
    }

    pub fn with_metadata_image(mut self, metadata_image: Option<String>) -> Self {
        self.metadata_image = metadata_image;
        self
    }

    pub fn with_signature_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.signature_verifier = Some(verifier);
        self
    }

    async fn open_store(&self, options: &QueryOptions, cancel: &CancellationToken) -> Result<InventoryStore> {
        let mut cache = Cache::new(self.cache_root.clone(), self.oci_client.clone());
        if let Some(verifier) = &self.signature_verifier {
            cache = cache.with_signature_verifier(verifier.clone());
        }
        let entry = cache
            .refresh(
                &self.name,
                &self.image,
                self.metadata_image.as_deref(),
                options.force_refresh,
                options.use_local_cache_only,
                cancel,
            )
            .await?;
        InventoryStore::open(&self.name, &entry.db_path, &entry.image_dir)
    }
}

#[async_trait]
impl Discovery for OciDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_tag(&self) -> &'static str {
        "oci"
    }

    async fn list_plugins(&self, options: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<PluginEntry>> {
        let store = self.open_store(options, cancel).await?;
        store.get_plugins(&options.filter)
    }

    async fn list_groups(&self, options: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<PluginGroup>> {
        let store = self.open_store(options, cancel).await?;
        store.get_plugin_groups(&options.group_filter)
    }
}

/// A directory on the local filesystem, read once per call; no cache, no
/// criteria filtering, no groups.
pub struct LocalDiscovery {
    name: String,
    path: PathBuf,
}

#[async_trait]
impl Discovery for LocalDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_tag(&self) -> &'static str {
        "local"
    }

    async fn list_plugins(&self, _options: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<PluginEntry>> {
        if cancel.is_cancelled() {
            return Err(Error::CancelledOrDeadline);
        }
        let db_path = self.path.join("plugin_inventory.db");
        if !db_path.exists() {
            return Err(Error::SourceUnavailable(
                self.name.clone(),
                format!("{} has no plugin_inventory.db", self.path.display()),
            ));
        }
        let store = InventoryStore::open(&self.name, &db_path, &self.path)?;
        store.get_plugins(&PluginFilter::default())
    }

    async fn list_groups(&self, _options: &QueryOptions, _cancel: &CancellationToken) -> Result<Vec<PluginGroup>> {
        Err(Error::NotSupported(format!(
            "discovery `{}` (local) does not support plugin groups",
            self.name
        )))
    }
}

/// Reads plugin descriptors directly from a remote cluster's API; no
/// content-addressed cache, since the cluster is itself the source of
/// truth for a live session.
pub struct KubernetesDiscovery {
    name: String,
    #[allow(dead_code)]
    kubeconfig: String,
    #[allow(dead_code)]
    context: String,
}

#[async_trait]
impl Discovery for KubernetesDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_tag(&self) -> &'static str {
        "kubernetes"
    }

    async fn list_plugins(&self, _options: &QueryOptions, _cancel: &CancellationToken) -> Result<Vec<PluginEntry>> {
        Err(Error::SourceUnavailable(
            self.name.clone(),
            "kubernetes discovery requires a live cluster API client, not configured here"
                .to_string(),
        ))
    }

    async fn list_groups(&self, _options: &QueryOptions, _cancel: &CancellationToken) -> Result<Vec<PluginGroup>> {
        Err(Error::NotSupported(format!(
            "discovery `{}` (kubernetes) does not support plugin groups",
            self.name
        )))
    }
}

/// Generic HTTP discovery: `GET <endpoint>/<basePath>` returning a JSON
/// list of plugin descriptors.
pub struct RestDiscovery {
    name: String,
    endpoint: String,
    base_path: String,
    client: reqwest::Client,
}

#[async_trait]
impl Discovery for RestDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_tag(&self) -> &'static str {
        "rest"
    }

    async fn list_plugins(&self, _options: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<PluginEntry>> {
        let url = join_url(&self.endpoint, &self.base_path);
        let fetch = async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::SourceUnavailable(self.name.clone(), e.to_string()))?;
            if !response.status().is_success() {
                return Err(Error::SourceUnavailable(
                    self.name.clone(),
                    format!("{} responded with {}", url, response.status()),
                ));
            }
            response
                .json::<Vec<PluginEntry>>()
                .await
                .map_err(|e| Error::SourceUnavailable(self.name.clone(), e.to_string()))
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::CancelledOrDeadline),
            result = fetch => result,
        }
    }

    async fn list_groups(&self, _options: &QueryOptions, _cancel: &CancellationToken) -> Result<Vec<PluginGroup>> {
        Err(Error::NotSupported(format!(
            "discovery `{}` (rest) does not support plugin groups",
            self.name
        )))
    }
}

fn join_url(endpoint: &str, base_path: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), base_path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_discovery_reports_source_unavailable_without_db() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = LocalDiscovery {
            name: "offline".into(),
            path: dir.path().to_path_buf(),
        };
        let err = discovery
            .list_plugins(&QueryOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(..)));
    }

    #[tokio::test]
    async fn local_discovery_groups_not_supported() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = LocalDiscovery {
            name: "offline".into(),
            path: dir.path().to_path_buf(),
        };
        let err = discovery
            .list_groups(&QueryOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[tokio::test]
    async fn local_discovery_reports_cancellation_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = LocalDiscovery {
            name: "offline".into(),
            path: dir.path().to_path_buf(),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = discovery
            .list_plugins(&QueryOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CancelledOrDeadline));
    }

    #[test]
    fn build_discovery_maps_every_tag() {
        let root = PathBuf::from("/tmp/cache");
        let oci = build_discovery(
            DiscoverySource::Oci {
                name: "central".into(),
                image: "registry/plugins".into(),
            },
            root.clone(),
            None,
        );
        assert_eq!(oci.type_tag(), "oci");

        let rest = build_discovery(
            DiscoverySource::Rest {
                name: "http".into(),
                endpoint: "https://example.test".into(),
                base_path: "plugins".into(),
            },
            root,
            None,
        );
        assert_eq!(rest.type_tag(), "rest");
    }
}
