use serde::{Deserialize, Serialize};

use crate::target::Target;
use crate::version::Version;

/// Identity of one plugin build: a single `(name, target, version, os, arch)`
/// row of the catalogue.
///
/// `image_uri` is stored relative to the discovered image's directory
/// prefix (see the inventory DB schema notes) — the inventory store
/// prepends the discovered image's directory before handing a descriptor
/// back to a caller, so this field is never an absolute URI by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub target: Target,
    pub version: Version,
    pub os: String,
    pub arch: String,
    pub image_uri: String,
    pub digest: String,
    pub publisher: String,
    pub vendor: String,
    pub description: String,
    pub hidden: bool,
}

impl PluginDescriptor {
    /// The fully qualified identifier `vendor-publisher/name:version`, used
    /// the same way plugin groups identify themselves.
    pub fn qualified_id(&self) -> String {
        format!("{}-{}/{}:{}", self.vendor, self.publisher, self.name, self.version)
    }
}
