//! Per-plugin status reporting for a sync run.
//!
//! State machine: `Pending -> Resolving -> {Resolved, NotResolvable} ->
//! {Installing, Skipped} -> {Installed, InstallFailed}`. Only the terminal
//! states (`Resolved`+`Skipped` collapsing to `Unchanged`, `Installed`,
//! `InstallFailed`, `NotResolvable`) are counted in the sync summary;
//! intermediate states exist purely for progress reporting.

use serde::Serialize;

use plugin_inventory_types::Target;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum SyncStatus {
    Pending,
    Resolving,
    Resolved { version: String },
    NotResolvable { reason: String },
    Installing,
    Skipped,
    Installed,
    InstallFailed { reason: String },
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::NotResolvable { .. }
                | SyncStatus::Skipped
                | SyncStatus::Installed
                | SyncStatus::InstallFailed { .. }
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SyncStatus::NotResolvable { .. } | SyncStatus::InstallFailed { .. }
        )
    }
}

/// One `(plugin, status, reason)` row, as printed by the external CLI
/// surface on a sync failure summary.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub name: String,
    pub target: Target,
    pub status: SyncStatus,
}

/// Receives per-plugin status transitions as a sync progresses. The CLI's
/// implementation renders these as a progress table; tests can collect
/// them into a `Vec` to assert on ordering and terminal states.
pub trait Reporter: Send + Sync {
    fn report(&self, name: &str, target: Target, status: SyncStatus);
}

/// Reporter that only keeps the latest status per `(name, target)`, used
/// to build the final summary table without re-deriving it from the full
/// transition log.
#[derive(Default)]
pub struct CollectingReporter {
    reports: std::sync::Mutex<Vec<SyncReport>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_reports(self) -> Vec<SyncReport> {
        self.reports.into_inner().expect("mutex never poisoned by a panic here")
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, name: &str, target: Target, status: SyncStatus) {
        let mut reports = self.reports.lock().expect("mutex never poisoned by a panic here");
        match reports.iter_mut().find(|r| r.name == name && r.target == target) {
            Some(existing) => existing.status = status,
            None => reports.push(SyncReport {
                name: name.to_string(),
                target,
                status,
            }),
        }
    }
}

/// Aggregate counts emitted at the end of a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub installed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl SyncSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_reports_for_the_same_plugin_collapse_to_the_latest_status() {
        let reporter = CollectingReporter::new();
        reporter.report("agent", Target::ClusterManagement, SyncStatus::Pending);
        reporter.report("agent", Target::ClusterManagement, SyncStatus::Resolving);
        reporter.report(
            "agent",
            Target::ClusterManagement,
            SyncStatus::Resolved { version: "1.2.3".into() },
        );
        reporter.report("agent", Target::ClusterManagement, SyncStatus::Installing);
        reporter.report("agent", Target::ClusterManagement, SyncStatus::Installed);

        let reports = reporter.into_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, SyncStatus::Installed);
    }

    #[test]
    fn distinct_plugins_each_keep_their_own_row() {
        let reporter = CollectingReporter::new();
        reporter.report("agent", Target::ClusterManagement, SyncStatus::Installed);
        reporter.report("agent", Target::MissionControl, SyncStatus::Skipped);
        reporter.report("sidecar", Target::ClusterManagement, SyncStatus::InstallFailed {
            reason: "boom".into(),
        });

        let reports = reporter.into_reports();
        assert_eq!(reports.len(), 3);
    }
}
