use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::descriptor::PluginDescriptor;
use crate::target::Target;
use crate::version::Version;

/// Aggregation across versions of one `(name, target)`.
///
/// `artifacts_by_version` is a [`BTreeMap`] so that iterating it already
/// yields versions in ascending order — the query-ordering invariant the
/// inventory store relies on to fold rows into entries in a single pass
/// falls out of the container choice rather than a separate sort step.
///
/// Invariant: if `recommended_version` is `Some`, it must be a key of
/// `artifacts_by_version`; otherwise [`PluginEntry::recommended_version`]
/// (the method, not the stored field) computes it as the greatest key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    pub target: Target,
    pub description: String,
    pub publisher: String,
    pub vendor: String,
    /// Recommended version as declared by the catalogue row, if any.
    pub declared_recommended_version: Option<Version>,
    pub artifacts_by_version: BTreeMap<Version, Vec<PluginDescriptor>>,
}

impl PluginEntry {
    /// Resolves the effective recommended version: the declared value if
    /// present and still a key of `artifacts_by_version`, otherwise the
    /// maximum of the supported version list.
    pub fn recommended_version(&self) -> Option<&Version> {
        match &self.declared_recommended_version {
            Some(v) if self.artifacts_by_version.contains_key(v) => Some(v),
            _ => self.artifacts_by_version.keys().next_back(),
        }
    }

    /// The supported-version list, stable-sorted ascending.
    pub fn supported_versions(&self) -> Vec<&Version> {
        self.artifacts_by_version.keys().collect()
    }

    pub fn descriptors_for(&self, version: &Version) -> &[PluginDescriptor] {
        self.artifacts_by_version
            .get(version)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
