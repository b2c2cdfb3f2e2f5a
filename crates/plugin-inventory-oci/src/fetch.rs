use std::future::Future;
use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use plugin_inventory_types::{Error, Result};

/// Races `fut` against `cancel`. Cancellation always wins a tie, so a
/// cancel requested in the same poll as completion still reports
/// `CancelledOrDeadline` rather than a stale result.
async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::CancelledOrDeadline),
        result = fut => result,
    }
}

/// A resolved OCI manifest digest, e.g. `sha256:abcdef...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDigest {
    pub digest: String,
}

impl ImageDigest {
    /// The hex suffix after `sha256:`, used as the cache digest-file
    /// filename suffix (`digest.<hex>`).
    pub fn hex(&self) -> &str {
        self.digest.split_once(':').map(|(_, h)| h).unwrap_or(&self.digest)
    }

    pub fn none() -> Self {
        ImageDigest {
            digest: "none".to_string(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.digest == "none"
    }
}

/// Thin boundary over the OCI pull and signature-verification primitives,
/// treated as externally available library calls. A real backend wraps
/// `oci-client`/a registry SDK; the default backend here falls back to
/// plain HTTP the way a registry client built on `reqwest` already talks
/// to a plugin registry.
#[async_trait]
pub trait OciClient: Send + Sync {
    /// Resolves `image_uri` to its current manifest digest.
    async fn resolve_image_digest(&self, image_uri: &str, cancel: &CancellationToken) -> Result<ImageDigest>;

    /// Downloads the image layers and unpacks them into `dest_dir`. Best
    /// effort: the caller validates the expected files exist before
    /// committing.
    async fn pull_image_to_dir(&self, image_uri: &str, dest_dir: &Path, cancel: &CancellationToken) -> Result<()>;

    /// Fetches the hex-encoded DER signature published alongside
    /// `image_uri`, if the registry has one. `None` means the registry has
    /// no signature for this image at all, as opposed to a signature that
    /// fails to verify.
    async fn resolve_image_signature(&self, image_uri: &str, cancel: &CancellationToken) -> Result<Option<String>>;
}

/// HTTP-backed [`OciClient`] used for any discovery whose image URI is
/// addressable as `https://<host>/<path>` — the same request shape the
/// registry client (`client::plugins`, `client::download`) already uses,
/// generalized from "plugin binary" to "inventory image tarball".
pub struct HttpOciClient {
    client: reqwest::Client,
}

impl Default for HttpOciClient {
    fn default() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("reqwest client builds with default TLS config"),
        }
    }
}

#[async_trait]
impl OciClient for HttpOciClient {
    async fn resolve_image_digest(&self, image_uri: &str, cancel: &CancellationToken) -> Result<ImageDigest> {
        let url = manifest_digest_url(image_uri);
        cancellable(cancel, async {
            let response = self
                .client
                .head(&url)
                .send()
                .await
                .map_err(|e| Error::ImageResolveFailed(image_uri.to_string(), e.to_string()))?;

            if !response.status().is_success() {
                return Err(Error::ImageResolveFailed(
                    image_uri.to_string(),
                    format!("registry responded with {}", response.status()),
                ));
            }

            let digest = response
                .headers()
                .get("Docker-Content-Digest")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::ImageResolveFailed(
                        image_uri.to_string(),
                        "response missing Docker-Content-Digest header".to_string(),
                    )
                })?;

            Ok(ImageDigest { digest })
        })
        .await
    }

    async fn pull_image_to_dir(&self, image_uri: &str, dest_dir: &Path, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, async {
            tokio::fs::create_dir_all(dest_dir).await?;

            let url = blob_url(image_uri);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::ImageResolveFailed(image_uri.to_string(), e.to_string()))?;

            if !response.status().is_success() {
                return Err(Error::ImageResolveFailed(
                    image_uri.to_string(),
                    format!("registry responded with {}", response.status()),
                ));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::ImageResolveFailed(image_uri.to_string(), e.to_string()))?;
            crate::archive::unpack_tar_gz(&bytes, dest_dir)
        })
        .await
    }

    async fn resolve_image_signature(&self, image_uri: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        let url = signature_url(image_uri);
        cancellable(cancel, async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::ImageResolveFailed(image_uri.to_string(), e.to_string()))?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                return Err(Error::ImageResolveFailed(
                    image_uri.to_string(),
                    format!("registry responded with {}", response.status()),
                ));
            }

            let signature = response
                .text()
                .await
                .map_err(|e| Error::ImageResolveFailed(image_uri.to_string(), e.to_string()))?;
            Ok(Some(signature.trim().to_string()))
        })
        .await
    }
}

fn manifest_digest_url(image_uri: &str) -> String {
    format!("{}/manifest", normalize(image_uri))
}

fn blob_url(image_uri: &str) -> String {
    format!("{}/blob", normalize(image_uri))
}

fn signature_url(image_uri: &str) -> String {
    format!("{}/signature", normalize(image_uri))
}

fn normalize(image_uri: &str) -> String {
    if image_uri.starts_with("http://") || image_uri.starts_with("https://") {
        image_uri.to_string()
    } else {
        format!("https://{image_uri}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_digest_hex_strips_algorithm_prefix() {
        let digest = ImageDigest {
            digest: "sha256:abc123".to_string(),
        };
        assert_eq!(digest.hex(), "abc123");
    }

    #[test]
    fn image_digest_hex_falls_back_to_whole_string_without_colon() {
        let digest = ImageDigest {
            digest: "abc123".to_string(),
        };
        assert_eq!(digest.hex(), "abc123");
    }

    #[test]
    fn image_digest_none_reports_is_none() {
        assert!(ImageDigest::none().is_none());
        assert!(!ImageDigest {
            digest: "sha256:abc123".to_string(),
        }
        .is_none());
    }

    #[test]
    fn normalize_leaves_absolute_urls_untouched() {
        assert_eq!(normalize("https://registry.example/central"), "https://registry.example/central");
        assert_eq!(normalize("http://localhost:5000/central"), "http://localhost:5000/central");
    }

    #[test]
    fn normalize_assumes_https_for_bare_hosts() {
        assert_eq!(normalize("registry.example/central"), "https://registry.example/central");
    }

    #[test]
    fn manifest_and_blob_urls_append_expected_suffixes() {
        assert_eq!(manifest_digest_url("registry.example/central"), "https://registry.example/central/manifest");
        assert_eq!(blob_url("registry.example/central"), "https://registry.example/central/blob");
    }

    #[test]
    fn signature_url_appends_expected_suffix() {
        assert_eq!(signature_url("registry.example/central"), "https://registry.example/central/signature");
    }

    #[tokio::test]
    async fn cancellable_reports_cancellation_even_if_future_would_succeed() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cancellable(&cancel, async { Ok(42) }).await.unwrap_err();
        assert!(matches!(err, Error::CancelledOrDeadline));
    }

    #[tokio::test]
    async fn cancellable_returns_future_result_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let value = cancellable(&cancel, async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }
}
