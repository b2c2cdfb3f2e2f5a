use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "plugin-inventory", about = "Discover, cache, and sync cluster-management plugins")]
pub struct Cli {
    #[arg(long, value_enum, global = true, default_value = "table")]
    pub output: OutputFormat,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage configured discovery sources.
    Discovery {
        #[command(subcommand)]
        command: DiscoveryCommand,
    },
    /// List, search, install, and uninstall plugins.
    Plugin {
        #[command(subcommand)]
        command: PluginCommand,
    },
    /// List plugin groups.
    Group {
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        discovery: Option<String>,
    },
    /// Reconcile installed plugins against the active context's recommendations.
    Sync {
        #[arg(long)]
        context: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DiscoveryCommand {
    List,
    Add {
        name: String,
        #[arg(long)]
        image: Option<String>,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long, default_value = "plugins")]
        base_path: String,
        #[arg(long)]
        kubeconfig: Option<String>,
        #[arg(long)]
        context: Option<String>,
    },
    Remove {
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum PluginCommand {
    List {
        #[arg(long)]
        discovery: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        force_refresh: bool,
    },
    Search {
        query: String,
        #[arg(long)]
        discovery: Option<String>,
    },
    Install {
        name: String,
        #[arg(long)]
        target: Option<String>,
        #[arg(long, default_value = "")]
        version: String,
        #[arg(long)]
        discovery: Option<String>,
    },
    Uninstall {
        name: String,
        #[arg(long)]
        target: Option<String>,
    },
}
