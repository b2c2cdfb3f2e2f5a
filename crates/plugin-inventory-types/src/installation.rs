use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target::Target;
use crate::version::Version;

/// Scope under which a plugin was installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallScope {
    Standalone,
    ContextRecommended,
}

/// Locally tracked record of one installed plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationRecord {
    pub name: String,
    pub target: Target,
    pub version: Version,
    pub installed_from_source: String,
    pub installed_at: DateTime<Utc>,
    pub scope: InstallScope,
    /// Set only when `scope == ContextRecommended`.
    pub context_name: Option<String>,
}

impl InstallationRecord {
    pub fn key(&self) -> (String, Target) {
        (self.name.clone(), self.target)
    }
}
