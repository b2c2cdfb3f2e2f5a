//! Discovery Facade, Version Resolver, and Recommendation Source.

pub mod discovery;
pub mod recommendation;
pub mod version_resolver;

pub use discovery::{build_discovery, Discovery, OciDiscovery, QueryOptions};
pub use recommendation::{
    ClusterRecommendationSource, RecommendationTransport, RestRecommendationSource,
};
pub use version_resolver::resolve_version;
