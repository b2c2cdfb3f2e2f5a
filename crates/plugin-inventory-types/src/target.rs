use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment scope of a plugin build.
///
/// Both the empty string and the literal `"global"` in legacy data
/// normalise to [`Target::Global`]; `Display` always renders it back as
/// `"global"`, so round-tripping through storage does not reproduce an
/// original empty-string spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    ClusterManagement,
    MissionControl,
    Global,
}

impl Target {
    /// Normalises a raw target string from a catalogue row or recommendation
    /// payload into the closed set, treating `""` and `"global"` as
    /// [`Target::Global`].
    pub fn normalise(raw: &str) -> Self {
        match raw {
            "" | "global" => Target::Global,
            "mission-control" => Target::MissionControl,
            _ => Target::ClusterManagement,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Target::ClusterManagement => "cluster-management",
            Target::MissionControl => "mission-control",
            Target::Global => "global",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_global_both_normalise_to_global() {
        assert_eq!(Target::normalise(""), Target::Global);
        assert_eq!(Target::normalise("global"), Target::Global);
    }

    #[test]
    fn unknown_strings_fall_back_to_cluster_management() {
        assert_eq!(Target::normalise("anything-else"), Target::ClusterManagement);
    }
}
