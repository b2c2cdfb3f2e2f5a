//! Rendering for the two supported `--output` formats.

use clap::ValueEnum;
use serde::Serialize;

use plugin_inventory_sync::{SyncReport, SyncStatus};
use plugin_inventory_types::{PluginEntry, PluginGroup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

pub fn print_entries(format: OutputFormat, entries: &[PluginEntry]) {
    match format {
        OutputFormat::Json => print_json(entries),
        OutputFormat::Table => {
            println!("{:<24}{:<20}{:<12}{}", "NAME", "TARGET", "RECOMMENDED", "VERSIONS");
            for entry in entries {
                let recommended = entry
                    .recommended_version()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string());
                let versions: Vec<String> =
                    entry.supported_versions().into_iter().map(ToString::to_string).collect();
                println!(
                    "{:<24}{:<20}{:<12}{}",
                    entry.name,
                    entry.target,
                    recommended,
                    versions.join(", ")
                );
            }
        }
    }
}

pub fn print_groups(format: OutputFormat, groups: &[PluginGroup]) {
    match format {
        OutputFormat::Json => print_json(groups),
        OutputFormat::Table => {
            println!("{:<40}{:<10}{}", "GROUP", "VERSION", "MEMBERS");
            for group in groups {
                let members: Vec<String> = group
                    .members
                    .iter()
                    .map(|m| format!("{}/{}@{}", m.name, m.target, m.version))
                    .collect();
                println!(
                    "{:<40}{:<10}{}",
                    format!("{}-{}/{}", group.vendor, group.publisher, group.name),
                    group.version,
                    members.join(", ")
                );
            }
        }
    }
}

pub fn print_sync_report(format: OutputFormat, reports: &[SyncReport]) {
    match format {
        OutputFormat::Json => print_json(reports),
        OutputFormat::Table => {
            println!("{:<24}{:<20}{:<16}{}", "PLUGIN", "TARGET", "STATUS", "REASON");
            for report in reports {
                let (status, reason) = status_columns(&report.status);
                println!("{:<24}{:<20}{:<16}{}", report.name, report.target, status, reason);
            }
        }
    }
}

fn status_columns(status: &SyncStatus) -> (&'static str, String) {
    match status {
        SyncStatus::Pending => ("pending", String::new()),
        SyncStatus::Resolving => ("resolving", String::new()),
        SyncStatus::Resolved { version } => ("resolved", version.clone()),
        SyncStatus::NotResolvable { reason } => ("not-resolvable", reason.clone()),
        SyncStatus::Installing => ("installing", String::new()),
        SyncStatus::Skipped => ("unchanged", String::new()),
        SyncStatus::Installed => ("installed", String::new()),
        SyncStatus::InstallFailed { reason } => ("install-failed", reason.clone()),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => eprintln!("failed to render JSON output: {err}"),
    }
}
