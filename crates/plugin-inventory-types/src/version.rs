use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A plugin version, rendered on the wire as `vMAJOR.MINOR.PATCH[-pre][+build]`.
///
/// Wraps [`semver::Version`] so that ordering (including pre-release
/// ordering) and tie-breaking by build metadata follow semantic-version
/// rules exactly, per the recommended-version and version-resolver
/// invariants.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(pub semver::Version);

impl Version {
    pub fn parse(raw: &str) -> Result<Self, semver::Error> {
        let trimmed = raw.strip_prefix('v').unwrap_or(raw);
        semver::Version::parse(trimmed).map(Version)
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // semver::Version ignores build metadata in its own Ord impl; break
        // ties lexicographically by build string, per the resolver's
        // tie-breaking rule.
        self.0
            .cmp(&other.0)
            .then_with(|| self.0.build.as_str().cmp(other.0.build.as_str()))
    }
}

impl FromStr for Version {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = semver::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_leading_v() {
        assert_eq!(Version::parse("v1.2.3").unwrap(), Version::parse("1.2.3").unwrap());
    }

    #[test]
    fn orders_prereleases_before_releases() {
        let pre = Version::parse("v1.9.2-beta.1").unwrap();
        let release = Version::parse("v1.9.2").unwrap();
        assert!(pre < release);
    }

    #[test]
    fn ties_break_on_build_metadata_lexicographically() {
        let a = Version::parse("v1.0.0+001").unwrap();
        let b = Version::parse("v1.0.0+002").unwrap();
        assert!(a < b);
    }

    #[test]
    fn display_roundtrips_with_leading_v() {
        let v = Version::parse("v2.3.5").unwrap();
        assert_eq!(v.to_string(), "v2.3.5");
    }
}
