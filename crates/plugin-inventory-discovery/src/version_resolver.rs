//! Resolves a requested version expression against an entry's supported
//! versions: exact match, `vMAJOR`/`vMAJOR.MINOR` prefix match, or empty
//! (meaning the entry's recommended version).

use plugin_inventory_types::{Error, PluginEntry, Result, Version};

/// Resolves `version_expr` against `entry`, returning the concrete matching
/// version.
///
/// - Empty expression resolves to `entry.recommended_version()`.
/// - An exact `vX.Y.Z[-pre][+build]` expression matches only if present
///   verbatim in the supported-version list.
/// - `vX` matches the highest version whose major equals `X`, preferring
///   non-prerelease versions unless none exist for that major.
/// - `vX.Y` matches the highest version whose major and minor equal `X`,
///   `Y` (prereleases included, since a minor-pinned caller is asking for
///   "the latest in this line", and semver ordering already carries
///   prereleases below their release).
pub fn resolve_version<'a>(
    entry: &'a PluginEntry,
    version_expr: &str,
    name: &str,
    target_label: &str,
) -> Result<&'a Version> {
    let trimmed = version_expr.trim();

    if trimmed.is_empty() {
        return entry.recommended_version().ok_or_else(|| not_resolvable(trimmed, name, target_label));
    }

    if let Ok(exact) = Version::parse(trimmed) {
        if let Some((found, _)) = entry.artifacts_by_version.get_key_value(&exact) {
            return Ok(found);
        }
        return Err(not_resolvable(trimmed, name, target_label));
    }

    match parse_prefix(trimmed) {
        Some((major, Some(minor))) => entry
            .artifacts_by_version
            .keys()
            .filter(|v| v.major() == major && v.minor() == minor)
            .next_back()
            .ok_or_else(|| not_resolvable(trimmed, name, target_label)),
        Some((major, None)) => {
            let candidates: Vec<&Version> = entry
                .artifacts_by_version
                .keys()
                .filter(|v| v.major() == major)
                .collect();
            candidates
                .iter()
                .rev()
                .find(|v| !v.is_prerelease())
                .or_else(|| candidates.iter().next_back())
                .copied()
                .ok_or_else(|| not_resolvable(trimmed, name, target_label))
        }
        None => Err(not_resolvable(trimmed, name, target_label)),
    }
}

/// Parses a `vX` or `vX.Y` prefix expression. Returns `None` if `expr` is
/// not shaped like a bare major or major.minor prefix.
fn parse_prefix(expr: &str) -> Option<(u64, Option<u64>)> {
    let rest = expr.strip_prefix('v')?;
    let mut parts = rest.split('.');
    let major = parts.next()?.parse().ok()?;
    match parts.next() {
        None => Some((major, None)),
        Some(minor_str) if parts.next().is_none() => {
            let minor = minor_str.parse().ok()?;
            Some((major, Some(minor)))
        }
        Some(_) => None,
    }
}

fn not_resolvable(expr: &str, name: &str, target_label: &str) -> Error {
    Error::VersionNotResolvable {
        expr: expr.to_string(),
        name: name.to_string(),
        target: target_label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_inventory_types::{PluginDescriptor, Target};
    use std::collections::BTreeMap;

    fn descriptor(version: &str) -> PluginDescriptor {
        PluginDescriptor {
            name: "package".into(),
            target: Target::ClusterManagement,
            version: Version::parse(version).unwrap(),
            os: "linux".into(),
            arch: "amd64".into(),
            image_uri: "package".into(),
            digest: "sha256:abc".into(),
            publisher: "pub".into(),
            vendor: "vendor".into(),
            description: "desc".into(),
            hidden: false,
        }
    }

    fn entry_with(versions: &[&str]) -> PluginEntry {
        let mut artifacts = BTreeMap::new();
        for v in versions {
            artifacts.insert(Version::parse(v).unwrap(), vec![descriptor(v)]);
        }
        PluginEntry {
            name: "package".into(),
            target: Target::ClusterManagement,
            description: "desc".into(),
            publisher: "pub".into(),
            vendor: "vendor".into(),
            declared_recommended_version: None,
            artifacts_by_version: artifacts,
        }
    }

    fn sample_entry() -> PluginEntry {
        entry_with(&[
            "v1.9.2-beta.1",
            "v1.10.2",
            "v1.11.2",
            "v1.11.3",
            "v2.3.0",
            "v2.3.5",
        ])
    }

    #[test]
    fn major_prefix_picks_highest_non_prerelease() {
        let entry = sample_entry();
        let resolved = resolve_version(&entry, "v1", "package", "k8s").unwrap();
        assert_eq!(resolved.to_string(), "v1.11.3");
    }

    #[test]
    fn major_minor_prefix_can_resolve_to_a_prerelease() {
        let entry = sample_entry();
        let resolved = resolve_version(&entry, "v1.9", "package", "k8s").unwrap();
        assert_eq!(resolved.to_string(), "v1.9.2-beta.1");
    }

    #[test]
    fn unmatched_major_minor_is_not_resolvable() {
        let entry = sample_entry();
        let err = resolve_version(&entry, "v1.12", "package", "k8s").unwrap_err();
        assert!(matches!(err, Error::VersionNotResolvable { .. }));
    }

    #[test]
    fn highest_major_resolves_to_max_release() {
        let entry = sample_entry();
        let resolved = resolve_version(&entry, "v2", "package", "k8s").unwrap();
        assert_eq!(resolved.to_string(), "v2.3.5");
    }

    #[test]
    fn empty_expression_uses_recommended_version() {
        let mut entry = sample_entry();
        entry.declared_recommended_version = Some(Version::parse("v1.10.2").unwrap());
        let resolved = resolve_version(&entry, "", "package", "k8s").unwrap();
        assert_eq!(resolved.to_string(), "v1.10.2");
    }

    #[test]
    fn exact_version_must_be_present() {
        let entry = sample_entry();
        assert!(resolve_version(&entry, "v9.9.9", "package", "k8s").is_err());
        assert_eq!(
            resolve_version(&entry, "v2.3.0", "package", "k8s").unwrap().to_string(),
            "v2.3.0"
        );
    }
}
