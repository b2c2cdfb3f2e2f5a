//! Recommendation Source (C6): reads plugin-recommendation resources from
//! the active context, either a cluster API or a plain HTTP endpoint, and
//! merges them into a single, duplicate-free list.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use plugin_inventory_types::{merge_recommendations, Error, Recommendation, Result, Target};

const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Wire shape shared by both transports: `{pluginName, target, version}`.
#[derive(Debug, Deserialize)]
struct RawRecommendation {
    #[serde(rename = "pluginName")]
    plugin_name: String,
    target: String,
    #[serde(default)]
    version: String,
}

impl From<RawRecommendation> for Recommendation {
    fn from(raw: RawRecommendation) -> Self {
        Recommendation {
            name: raw.plugin_name,
            target: Target::normalise(&raw.target),
            version_expr: raw.version,
        }
    }
}

/// Common contract for reading recommendations from one context.
#[async_trait]
pub trait RecommendationTransport: Send + Sync {
    /// Reads the raw recommendation list and merges duplicates on
    /// `(name, target)`, latest list position wins.
    async fn read_recommendations(&self, cancel: &CancellationToken) -> Result<Vec<Recommendation>>;
}

/// Reads `PluginRecommendation` resources from a cluster's API by
/// group/kind/version triple.
pub struct ClusterRecommendationSource {
    pub group: String,
    pub kind: String,
    pub version: String,
    client: reqwest::Client,
    /// Base URL of the cluster API server; a real implementation resolves
    /// this from the kubeconfig context instead of taking it directly.
    api_server: String,
}

impl ClusterRecommendationSource {
    pub fn new(api_server: String, group: String, kind: String, version: String) -> Self {
        Self {
            group,
            kind,
            version,
            api_server,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .build()
                .expect("reqwest client builds with default TLS config"),
        }
    }

    fn resource_url(&self) -> String {
        format!(
            "{}/apis/{}/{}/{}",
            self.api_server.trim_end_matches('/'),
            self.group,
            self.version,
            self.kind
        )
    }
}

#[async_trait]
impl RecommendationTransport for ClusterRecommendationSource {
    async fn read_recommendations(&self, cancel: &CancellationToken) -> Result<Vec<Recommendation>> {
        let url = self.resource_url();
        let fetch = async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::RecommendationReadFailed(e.to_string()))?;
            if !response.status().is_success() {
                return Err(Error::RecommendationReadFailed(format!(
                    "{url} responded with {}",
                    response.status()
                )));
            }
            let raw: Vec<RawRecommendation> = response
                .json()
                .await
                .map_err(|e| Error::RecommendationReadFailed(e.to_string()))?;
            Ok(merge_recommendations(raw.into_iter().map(Recommendation::from).collect()))
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::CancelledOrDeadline),
            result = fetch => result,
        }
    }
}

/// Issues a GET to `<endpoint>/<basePath>` returning a JSON list of plugin
/// descriptors.
pub struct RestRecommendationSource {
    pub endpoint: String,
    pub base_path: String,
    client: reqwest::Client,
}

impl RestRecommendationSource {
    pub fn new(endpoint: String, base_path: String) -> Self {
        Self {
            endpoint,
            base_path,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .build()
                .expect("reqwest client builds with default TLS config"),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.base_path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl RecommendationTransport for RestRecommendationSource {
    async fn read_recommendations(&self, cancel: &CancellationToken) -> Result<Vec<Recommendation>> {
        let url = self.url();
        let fetch = async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::RecommendationReadFailed(e.to_string()))?;
            if !response.status().is_success() {
                return Err(Error::RecommendationReadFailed(format!(
                    "{url} responded with {}",
                    response.status()
                )));
            }
            let raw: Vec<RawRecommendation> = response
                .json()
                .await
                .map_err(|e| Error::RecommendationReadFailed(e.to_string()))?;
            Ok(merge_recommendations(raw.into_iter().map(Recommendation::from).collect()))
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::CancelledOrDeadline),
            result = fetch => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_recommendation_maps_to_normalised_target() {
        let raw = RawRecommendation {
            plugin_name: "k8s".into(),
            target: "".into(),
            version: "v1".into(),
        };
        let rec: Recommendation = raw.into();
        assert_eq!(rec.name, "k8s");
        assert_eq!(rec.target, Target::Global);
        assert_eq!(rec.version_expr, "v1");
    }

    #[test]
    fn cluster_resource_url_is_group_version_kind() {
        let source = ClusterRecommendationSource::new(
            "https://cluster.example".into(),
            "plugins.example.com".into(),
            "PluginRecommendation".into(),
            "v1".into(),
        );
        assert_eq!(
            source.resource_url(),
            "https://cluster.example/apis/plugins.example.com/v1/PluginRecommendation"
        );
    }

    #[test]
    fn rest_url_joins_endpoint_and_base_path() {
        let source = RestRecommendationSource::new(
            "https://example.test/".into(),
            "/plugins/recommendations".into(),
        );
        assert_eq!(source.url(), "https://example.test/plugins/recommendations");
    }
}
