use serde::{Deserialize, Serialize};

use crate::target::Target;
use crate::version::Version;

/// One `(name, target, version)` reference inside a [`PluginGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub name: String,
    pub target: Target,
    pub version: Version,
}

/// Named bundle of plugin references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginGroup {
    pub vendor: String,
    pub publisher: String,
    pub name: String,
    pub version: Version,
    pub members: Vec<GroupMember>,
    pub hidden: bool,
}

impl PluginGroup {
    /// `vendor-publisher/name:version`.
    pub fn qualified_id(&self) -> String {
        format!("{}-{}/{}:{}", self.vendor, self.publisher, self.name, self.version)
    }
}
