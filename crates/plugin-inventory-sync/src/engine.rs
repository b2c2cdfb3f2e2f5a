//! Sync Engine (C7): reconciles the set of installed plugins against the
//! set recommended by the active context.

use log::warn;
use tokio_util::sync::CancellationToken;

use plugin_inventory_discovery::{resolve_version, Discovery, QueryOptions, RecommendationTransport};
use plugin_inventory_store::PluginFilter;
use plugin_inventory_types::{
    Error, InstallScope, InstallationRecord, PluginDescriptor, Result, Target,
};

use crate::installation_store::InstallationStore;
use crate::installer::Installer;
use crate::reporter::{Reporter, SyncStatus, SyncSummary};

/// One resolved recommendation: the descriptor for the current OS/arch,
/// ready to be diffed against installed records.
struct Resolved {
    name: String,
    target: Target,
    descriptor: PluginDescriptor,
}

/// Drives one sync for `context_name` against `discoveries` (the facade
/// built from standalone sources plus the context's own source).
pub struct SyncEngine<'a> {
    pub discoveries: Vec<Box<dyn Discovery>>,
    pub recommendation_source: &'a dyn RecommendationTransport,
    pub installation_store: InstallationStore,
    pub installer: &'a dyn Installer,
    pub reporter: &'a dyn Reporter,
    pub context_name: String,
}

impl<'a> SyncEngine<'a> {
    pub async fn sync(&self, cancel: &CancellationToken) -> Result<SyncSummary> {
        // Step 1: recommendation read failure is fatal for the sync as a
        // whole — nothing can be reconciled without the desired state.
        let recommendations = self
            .recommendation_source
            .read_recommendations(cancel)
            .await
            .map_err(|e| e.context(format!("context `{}`", self.context_name)))?;

        let all_installed = self.installation_store.all()?;
        let installed_for_context: Vec<&InstallationRecord> = all_installed
            .iter()
            .filter(|r| {
                r.scope == InstallScope::ContextRecommended
                    && r.context_name.as_deref() == Some(self.context_name.as_str())
            })
            .collect();

        // Step 2: resolve each recommendation. Per-plugin failures are
        // recorded and reported but never abort the loop.
        let mut resolved = Vec::new();
        for rec in &recommendations {
            if cancel.is_cancelled() {
                return Err(Error::CancelledOrDeadline);
            }
            self.reporter.report(&rec.name, rec.target, SyncStatus::Pending);
            self.reporter.report(&rec.name, rec.target, SyncStatus::Resolving);

            match self.resolve_one(&rec.name, rec.target, &rec.version_expr, cancel).await {
                Ok(descriptor) => {
                    self.reporter.report(
                        &rec.name,
                        rec.target,
                        SyncStatus::Resolved {
                            version: descriptor.version.to_string(),
                        },
                    );
                    resolved.push(Resolved {
                        name: rec.name.clone(),
                        target: rec.target,
                        descriptor,
                    });
                }
                Err(reason) => {
                    self.reporter.report(
                        &rec.name,
                        rec.target,
                        SyncStatus::NotResolvable {
                            reason: reason.clone(),
                        },
                    );
                }
            }
        }

        // Step 3: compute to-install / to-keep / to-retire.
        let mut summary = SyncSummary::default();

        for item in &resolved {
            let existing = installed_for_context
                .iter()
                .find(|r| r.name == item.name && r.target == item.target);

            match existing {
                Some(record) if record.version == item.descriptor.version => {
                    self.reporter.report(&item.name, item.target, SyncStatus::Skipped);
                    summary.unchanged += 1;
                }
                Some(_) => {
                    self.install_one(item, true, &mut summary, cancel).await;
                }
                None => {
                    self.install_one(item, false, &mut summary, cancel).await;
                }
            }
        }

        let resolved_keys: Vec<(&str, Target)> =
            resolved.iter().map(|r| (r.name.as_str(), r.target)).collect();
        let to_retire: Vec<&InstallationRecord> = installed_for_context
            .iter()
            .filter(|r| !resolved_keys.contains(&(r.name.as_str(), r.target)))
            .copied()
            .collect();

        for retired in to_retire {
            let still_referenced = all_installed.iter().any(|r| {
                r.name == retired.name
                    && r.target == retired.target
                    && r.version == retired.version
                    && !(r.scope == retired.scope && r.context_name == retired.context_name)
            });

            if !still_referenced {
                if let Err(err) = self.installer.uninstall(retired, cancel).await {
                    warn!(
                        "context `{}`: uninstall of {}/{} failed, leaving installation record in place: {err}",
                        self.context_name, retired.name, retired.target
                    );
                    continue;
                }
            }

            self.installation_store.remove(
                &retired.name,
                retired.target,
                retired.context_name.as_deref(),
            )?;
        }

        Ok(summary)
    }

    async fn install_one(
        &self,
        item: &Resolved,
        is_update: bool,
        summary: &mut SyncSummary,
        cancel: &CancellationToken,
    ) {
        self.reporter.report(&item.name, item.target, SyncStatus::Installing);
        match self.installer.install(&item.descriptor, cancel).await {
            Ok(()) => {
                let record = InstallationRecord {
                    name: item.name.clone(),
                    target: item.target,
                    version: item.descriptor.version.clone(),
                    installed_from_source: item.descriptor.image_uri.clone(),
                    installed_at: chrono::Utc::now(),
                    scope: InstallScope::ContextRecommended,
                    context_name: Some(self.context_name.clone()),
                };
                if let Err(err) = self.installation_store.upsert(record) {
                    warn!(
                        "context `{}`: install of {}/{} succeeded but recording it failed: {err}",
                        self.context_name, item.name, item.target
                    );
                }
                self.reporter.report(&item.name, item.target, SyncStatus::Installed);
                if is_update {
                    summary.updated += 1;
                } else {
                    summary.installed += 1;
                }
            }
            Err(err) => {
                self.reporter.report(
                    &item.name,
                    item.target,
                    SyncStatus::InstallFailed {
                        reason: err.to_string(),
                    },
                );
                summary.failed += 1;
            }
        }
    }

    /// Looks the plugin up across the configured discoveries (first match
    /// wins) and resolves its version expression against the current
    /// OS/arch.
    async fn resolve_one(
        &self,
        name: &str,
        target: Target,
        version_expr: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<PluginDescriptor, String> {
        let mut options = QueryOptions::default();
        options.filter = PluginFilter {
            name: Some(name.to_string()),
            ..PluginFilter::default()
        };

        for discovery in &self.discoveries {
            let entries = match discovery.list_plugins(&options, cancel).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            let Some(entry) = entries.into_iter().find(|e| e.target == target) else {
                continue;
            };

            let target_label = target.to_string();
            let version = resolve_version(&entry, version_expr, name, &target_label)
                .map_err(|e| e.to_string())?
                .clone();

            let os = std::env::consts::OS;
            let arch = std::env::consts::ARCH;
            let descriptor = entry
                .descriptors_for(&version)
                .iter()
                .find(|d| d.os == os && d.arch == arch)
                .cloned()
                .ok_or_else(|| {
                    format!("no build of {name}@{version} for {os}/{arch}")
                })?;
            return Ok(descriptor);
        }

        Err(Error::SourceUnavailable(name.to_string(), "no configured discovery has this plugin".into()).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;
    use async_trait::async_trait;
    use plugin_inventory_discovery::QueryOptions as Opts;
    use plugin_inventory_types::{PluginEntry, PluginGroup, Recommendation, Version};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn descriptor(name: &str, version: &str) -> PluginDescriptor {
        PluginDescriptor {
            name: name.to_string(),
            target: Target::ClusterManagement,
            version: Version::parse(version).unwrap(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            image_uri: format!("{name}/{version}"),
            digest: "sha256:abc".into(),
            publisher: "pub".into(),
            vendor: "vendor".into(),
            description: "desc".into(),
            hidden: false,
        }
    }

    fn entry(name: &str, versions: &[&str]) -> PluginEntry {
        let mut artifacts = BTreeMap::new();
        for v in versions {
            artifacts.insert(Version::parse(v).unwrap(), vec![descriptor(name, v)]);
        }
        PluginEntry {
            name: name.to_string(),
            target: Target::ClusterManagement,
            description: "desc".into(),
            publisher: "pub".into(),
            vendor: "vendor".into(),
            declared_recommended_version: None,
            artifacts_by_version: artifacts,
        }
    }

    struct FakeDiscovery {
        entries: Vec<PluginEntry>,
    }

    #[async_trait]
    impl Discovery for FakeDiscovery {
        fn name(&self) -> &str {
            "central"
        }

        fn type_tag(&self) -> &'static str {
            "oci"
        }

        async fn list_plugins(&self, options: &Opts, _cancel: &CancellationToken) -> Result<Vec<PluginEntry>> {
            Ok(self
                .entries
                .iter()
                .filter(|e| options.filter.name.as_deref().map(|n| n == e.name).unwrap_or(true))
                .cloned()
                .collect())
        }

        async fn list_groups(&self, _options: &Opts, _cancel: &CancellationToken) -> Result<Vec<PluginGroup>> {
            Ok(Vec::new())
        }
    }

    struct FakeRecommendationSource {
        recommendations: Vec<Recommendation>,
    }

    #[async_trait]
    impl RecommendationTransport for FakeRecommendationSource {
        async fn read_recommendations(&self, _cancel: &CancellationToken) -> Result<Vec<Recommendation>> {
            Ok(self.recommendations.clone())
        }
    }

    struct FakeInstaller {
        fail_names: Vec<String>,
        installs: Mutex<Vec<String>>,
        uninstalls: Mutex<Vec<String>>,
    }

    impl FakeInstaller {
        fn new(fail_names: &[&str]) -> Self {
            Self {
                fail_names: fail_names.iter().map(|s| s.to_string()).collect(),
                installs: Mutex::new(Vec::new()),
                uninstalls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Installer for FakeInstaller {
        async fn install(&self, descriptor: &PluginDescriptor, _cancel: &CancellationToken) -> Result<()> {
            if self.fail_names.contains(&descriptor.name) {
                return Err(Error::InstallFailed {
                    name: descriptor.name.clone(),
                    target: descriptor.target.to_string(),
                    version: descriptor.version.to_string(),
                    reason: "simulated failure".into(),
                });
            }
            self.installs.lock().unwrap().push(descriptor.name.clone());
            Ok(())
        }

        async fn uninstall(&self, record: &InstallationRecord, _cancel: &CancellationToken) -> Result<()> {
            self.uninstalls.lock().unwrap().push(record.name.clone());
            Ok(())
        }
    }

    fn recommendation(name: &str, version_expr: &str) -> Recommendation {
        Recommendation {
            name: name.to_string(),
            target: Target::ClusterManagement,
            version_expr: version_expr.to_string(),
        }
    }

    #[tokio::test]
    async fn partial_failure_is_isolated_to_its_own_report_row() {
        let discoveries: Vec<Box<dyn Discovery>> = vec![Box::new(FakeDiscovery {
            entries: vec![entry("a", &["v1.0.0"]), entry("b", &["v1.0.0"])],
        })];
        let recs = FakeRecommendationSource {
            recommendations: vec![
                recommendation("a", "v1"),
                recommendation("b", "v1"),
                recommendation("c", "v1"),
            ],
        };
        let dir = tempfile::tempdir().unwrap();
        let installer = FakeInstaller::new(&[]);
        let reporter = CollectingReporter::new();

        let engine = SyncEngine {
            discoveries,
            recommendation_source: &recs,
            installation_store: InstallationStore::new(dir.path().join("installed.json")),
            installer: &installer,
            reporter: &reporter,
            context_name: "prod".to_string(),
        };

        let summary = engine.sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.installed, 2);
        assert_eq!(summary.failed, 1);

        let reports = reporter.into_reports();
        let c_failed = reports
            .iter()
            .any(|r| r.name == "c" && matches!(r.status, SyncStatus::NotResolvable { .. }));
        assert!(c_failed);
    }

    #[tokio::test]
    async fn repeated_sync_with_no_changes_installs_nothing() {
        let discoveries = || -> Vec<Box<dyn Discovery>> {
            vec![Box::new(FakeDiscovery {
                entries: vec![entry("a", &["v1.0.0"])],
            })]
        };
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("installed.json");

        let recs = FakeRecommendationSource {
            recommendations: vec![recommendation("a", "v1")],
        };
        let installer = FakeInstaller::new(&[]);
        let reporter = CollectingReporter::new();
        let engine = SyncEngine {
            discoveries: discoveries(),
            recommendation_source: &recs,
            installation_store: InstallationStore::new(&store_path),
            installer: &installer,
            reporter: &reporter,
            context_name: "prod".to_string(),
        };
        let first = engine.sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(first.installed, 1);

        let installer2 = FakeInstaller::new(&[]);
        let reporter2 = CollectingReporter::new();
        let engine2 = SyncEngine {
            discoveries: discoveries(),
            recommendation_source: &recs,
            installation_store: InstallationStore::new(&store_path),
            installer: &installer2,
            reporter: &reporter2,
            context_name: "prod".to_string(),
        };
        let second = engine2.sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(second.installed, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 1);

        let reports = reporter2.into_reports();
        assert_eq!(reports.len(), 1, "one row per plugin, not one per transition");
        assert_eq!(reports[0].status, SyncStatus::Skipped);
    }
}
