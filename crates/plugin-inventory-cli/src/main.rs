mod cli;
mod config;
mod installer;
mod output;

use std::process::ExitCode;

use clap::Parser;
use log::{error, warn};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command, DiscoveryCommand, PluginCommand};
use config::{Config, Paths};
use installer::DefaultInstaller;
use output::{print_entries, print_groups, print_sync_report};
use plugin_inventory_discovery::{
    build_discovery, resolve_version, ClusterRecommendationSource, Discovery, QueryOptions,
    RecommendationTransport, RestRecommendationSource,
};
use plugin_inventory_store::{GroupFilter, PluginFilter};
use plugin_inventory_sync::{CollectingReporter, DataStore, InstallationStore, SyncEngine};
use plugin_inventory_types::{DiscoverySource, Error, InstallScope, InstallationRecord, Target};

const EXIT_SUCCESS: u8 = 0;
const EXIT_USER_ERROR: u8 = 1;
// Invalid-usage exits (2) are clap's own `Cli::parse()` error path; there is
// no call site here because that path never reaches `run`.

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    match run(cli, &cancel).await {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(err) => {
            error!("{err}");
            ExitCode::from(EXIT_USER_ERROR)
        }
    }
}

/// Cancels `cancel` on Ctrl-C so an in-flight OCI pull or recommendation
/// read aborts instead of leaving the process to be killed mid-write.
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("received interrupt, cancelling in-flight operations");
        cancel.cancel();
    }
}

/// `RUST_LOG` wins when set; otherwise `-q` forces `error` and each `-v`
/// steps the default level up from `info` through `debug` to `trace`.
fn init_logging(verbose: u8, quiet: bool) {
    if std::env::var("RUST_LOG").is_err() {
        let default_level = if quiet {
            "error"
        } else {
            match verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        };
        std::env::set_var("RUST_LOG", default_level);
    }
    env_logger::init();
}

async fn run(cli: Cli, cancel: &CancellationToken) -> plugin_inventory_types::Result<()> {
    let paths = Paths::resolve()?;
    let mut config = Config::load(&paths.config_file)?;
    let output_format = cli.output;

    match cli.command {
        Command::Discovery { command } => run_discovery_command(command, &mut config, &paths, output_format)?,
        Command::Plugin { command } => run_plugin_command(command, &config, &paths, output_format, cancel).await?,
        Command::Group { vendor, discovery } => {
            run_group_list(&config, &paths, discovery, vendor, output_format, cancel).await?
        }
        Command::Sync { context } => run_sync(&config, &paths, context, output_format, cancel).await?,
    }

    Ok(())
}

fn run_discovery_command(
    command: DiscoveryCommand,
    config: &mut Config,
    paths: &Paths,
    output_format: output::OutputFormat,
) -> plugin_inventory_types::Result<()> {
    match command {
        DiscoveryCommand::List => {
            for source in &config.discoveries {
                println!("{:<20}{:<12}", source.name(), source.type_tag());
            }
            let _ = output_format;
        }
        DiscoveryCommand::Add {
            name,
            image,
            path,
            endpoint,
            base_path,
            kubeconfig,
            context,
        } => {
            let source = match (image, path, endpoint, kubeconfig, context) {
                (Some(image), None, None, None, None) => DiscoverySource::Oci { name, image },
                (None, Some(path), None, None, None) => DiscoverySource::Local { name, path },
                (None, None, Some(endpoint), None, None) => {
                    DiscoverySource::Rest { name, endpoint, base_path }
                }
                (None, None, None, Some(kubeconfig), Some(context)) => {
                    DiscoverySource::Kubernetes { name, kubeconfig, context }
                }
                _ => {
                    return Err(Error::Parse(
                        "exactly one of --image, --path, --endpoint, or --kubeconfig/--context must be given".into(),
                    ))
                }
            };
            config.discoveries.retain(|s| s.name() != source.name());
            config.discoveries.push(source);
            config.save(&paths.config_file)?;
        }
        DiscoveryCommand::Remove { name } => {
            config.discoveries.retain(|s| s.name() != name);
            config.save(&paths.config_file)?;
        }
    }
    Ok(())
}

fn build_all_discoveries(config: &Config, paths: &Paths) -> plugin_inventory_types::Result<Vec<Box<dyn Discovery>>> {
    let verifier = config::signature_verifier(config)?;
    Ok(config
        .discoveries
        .iter()
        .cloned()
        .map(|source| build_discovery(source, paths.cache_root.clone(), verifier.clone()))
        .collect())
}

async fn run_plugin_command(
    command: PluginCommand,
    config: &Config,
    paths: &Paths,
    output_format: output::OutputFormat,
    cancel: &CancellationToken,
) -> plugin_inventory_types::Result<()> {
    match command {
        PluginCommand::List { discovery, name, force_refresh } => {
            let discoveries = selected_discoveries(config, paths, discovery.as_deref())?;
            let mut options = QueryOptions {
                force_refresh,
                ..default_query_options()
            };
            options.filter = PluginFilter {
                name,
                include_hidden: config::include_hidden_override(),
                ..PluginFilter::default()
            };
            let mut entries = Vec::new();
            for d in &discoveries {
                entries.extend(d.list_plugins(&options, cancel).await?);
            }
            print_entries(output_format, &entries);
        }
        PluginCommand::Search { query, discovery } => {
            let discoveries = selected_discoveries(config, paths, discovery.as_deref())?;
            let mut entries = Vec::new();
            for d in &discoveries {
                entries.extend(d.list_plugins(&default_query_options(), cancel).await?);
            }
            entries.retain(|e| e.name.contains(&query));
            print_entries(output_format, &entries);
        }
        PluginCommand::Install { name, target, version, discovery } => {
            let discoveries = selected_discoveries(config, paths, discovery.as_deref())?;
            let target = target.as_deref().map(Target::normalise).unwrap_or(Target::Global);
            let options = QueryOptions {
                filter: PluginFilter { name: Some(name.clone()), ..PluginFilter::default() },
                ..default_query_options()
            };

            let mut found = None;
            for d in &discoveries {
                if let Some(entry) = d.list_plugins(&options, cancel).await?.into_iter().find(|e| e.target == target) {
                    found = Some(entry);
                    break;
                }
            }
            let entry = found.ok_or_else(|| {
                Error::SourceUnavailable(name.clone(), "no configured discovery has this plugin".into())
            })?;
            let target_label = target.to_string();
            let resolved_version = resolve_version(&entry, &version, &name, &target_label)?.clone();
            let os = std::env::consts::OS;
            let arch = std::env::consts::ARCH;
            let descriptor = entry
                .descriptors_for(&resolved_version)
                .iter()
                .find(|d| d.os == os && d.arch == arch)
                .cloned()
                .ok_or_else(|| Error::VersionNotResolvable {
                    expr: version.clone(),
                    name: name.clone(),
                    target: target_label.clone(),
                })?;

            let installer = build_installer(config, paths)?;
            plugin_inventory_sync::Installer::install(&installer, &descriptor, cancel).await?;

            let store = InstallationStore::new(&paths.installation_store_file);
            store.upsert(InstallationRecord {
                name: descriptor.name.clone(),
                target: descriptor.target,
                version: descriptor.version.clone(),
                installed_from_source: descriptor.image_uri.clone(),
                installed_at: chrono::Utc::now(),
                scope: InstallScope::Standalone,
                context_name: None,
            })?;
        }
        PluginCommand::Uninstall { name, target } => {
            let target = target.as_deref().map(Target::normalise).unwrap_or(Target::Global);
            let store = InstallationStore::new(&paths.installation_store_file);
            let all = store.all()?;
            let record = all
                .iter()
                .find(|r| r.name == name && r.target == target)
                .ok_or_else(|| Error::KeyNotFound(format!("{name}/{target}")))?
                .clone();
            let installer = build_installer(config, paths)?;
            plugin_inventory_sync::Installer::uninstall(&installer, &record, cancel).await?;
            store.remove(&name, target, record.context_name.as_deref())?;
        }
    }
    Ok(())
}

fn selected_discoveries(
    config: &Config,
    paths: &Paths,
    name: Option<&str>,
) -> plugin_inventory_types::Result<Vec<Box<dyn Discovery>>> {
    Ok(build_all_discoveries(config, paths)?
        .into_iter()
        .filter(|d| name.map(|n| d.name() == n).unwrap_or(true))
        .collect())
}

/// Baseline query options with the process-start `--local-cache-only`
/// environment override already applied; call sites layer their own
/// filters and explicit `force_refresh` on top.
fn default_query_options() -> QueryOptions {
    QueryOptions {
        use_local_cache_only: config::local_cache_only_override(),
        ..QueryOptions::default()
    }
}

/// Builds the default installer, wired with the same signature verifier
/// (if configured) that discovery uses for the inventory image itself.
fn build_installer(config: &Config, paths: &Paths) -> plugin_inventory_types::Result<DefaultInstaller> {
    let mut installer = DefaultInstaller::new(paths.plugin_install_dir.clone());
    if let Some(verifier) = config::signature_verifier(config)? {
        installer = installer.with_signature_verifier(verifier);
    }
    Ok(installer)
}

async fn run_group_list(
    config: &Config,
    paths: &Paths,
    discovery: Option<String>,
    vendor: Option<String>,
    output_format: output::OutputFormat,
    cancel: &CancellationToken,
) -> plugin_inventory_types::Result<()> {
    let discoveries = selected_discoveries(config, paths, discovery.as_deref())?;
    let options = QueryOptions {
        group_filter: GroupFilter { vendor, ..GroupFilter::default() },
        ..default_query_options()
    };
    let mut groups = Vec::new();
    for d in &discoveries {
        match d.list_groups(&options, cancel).await {
            Ok(g) => groups.extend(g),
            Err(Error::NotSupported(_)) => continue,
            Err(err) => return Err(err),
        }
    }
    print_groups(output_format, &groups);
    Ok(())
}

async fn run_sync(
    config: &Config,
    paths: &Paths,
    context_override: Option<String>,
    output_format: output::OutputFormat,
    cancel: &CancellationToken,
) -> plugin_inventory_types::Result<()> {
    let context_name = context_override
        .or_else(|| config.active_context.clone())
        .ok_or_else(|| Error::Parse("no active context configured; pass --context".into()))?;

    let source = config
        .discoveries
        .iter()
        .find(|s| s.name() == context_name)
        .ok_or_else(|| Error::ContextNotFound(context_name.clone()))?;

    let recommendation_source: Box<dyn RecommendationTransport> = match source {
        DiscoverySource::Kubernetes { kubeconfig, context, .. } => {
            warn!("kubeconfig `{kubeconfig}` is read only for the API server address in this build");
            Box::new(ClusterRecommendationSource::new(
                context.clone(),
                "plugins.cluster-management.io".to_string(),
                "PluginRecommendation".to_string(),
                "v1".to_string(),
            ))
        }
        DiscoverySource::Rest { endpoint, base_path, .. } => {
            Box::new(RestRecommendationSource::new(endpoint.clone(), base_path.clone()))
        }
        _ => {
            return Err(Error::Parse(format!(
                "context `{context_name}` is not a cluster or endpoint source"
            )))
        }
    };

    let discoveries = build_all_discoveries(config, paths)?;
    let installer = build_installer(config, paths)?;
    let reporter = CollectingReporter::new();
    let installation_store = InstallationStore::new(&paths.installation_store_file);
    let data_store = DataStore::new(&paths.data_store_file);

    let engine = SyncEngine {
        discoveries,
        recommendation_source: recommendation_source.as_ref(),
        installation_store,
        installer: &installer,
        reporter: &reporter,
        context_name: context_name.clone(),
    };

    let summary = engine.sync(cancel).await?;
    data_store.set("last-sync-context", context_name)?;

    let reports = reporter.into_reports();
    print_sync_report(output_format, &reports);

    if summary.has_failures() || reports.iter().any(|r| r.status.is_failure()) {
        return Err(Error::Parse(format!(
            "sync completed with failures: {} failed",
            summary.failed
        )));
    }
    Ok(())
}
