//! CLI command definitions and handlers.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Load configuration with graceful fallback to defaults.
///
/// A missing file yields defaults. A file that cannot be parsed or fails
/// validation is reported and then ignored.
pub fn load_config() -> hotmirror_core::config::Config {
    hotmirror_core::config::Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring configuration file, using defaults");
        hotmirror_core::config::Config::default()
    })
}

pub mod announce;
pub mod cat;
pub mod completions;
pub mod config;
pub mod connect;
pub mod scan;

/// Hotmirror - Live preview client for declarative UI projects
#[derive(Parser)]
#[command(name = "hotmirror")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// List hosts announcing themselves on the network
    Scan(ScanArgs),

    /// Connect to a host and mirror its project
    Connect(ConnectArgs),

    /// Broadcast host beacons (for testing discovery)
    Announce(AnnounceArgs),

    /// Print a mirrored file from the sandbox
    Cat(CatArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the scan command
#[derive(Parser)]
pub struct ScanArgs {
    /// How long to listen (e.g., 3s, 500ms)
    #[arg(short, long)]
    pub duration: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the connect command
#[derive(Parser)]
pub struct ConnectArgs {
    /// Host address (`ip`, `ip:port` or `ws://` URL). Discovered if omitted.
    pub address: Option<String>,

    /// Directory to mirror projects into
    #[arg(short, long)]
    pub sandbox: Option<PathBuf>,

    /// How long to look for a host when no address is given
    #[arg(short, long)]
    pub duration: Option<String>,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the announce command
#[derive(Parser)]
pub struct AnnounceArgs {
    /// Identity to announce (defaults to `general.host_id`)
    #[arg(long)]
    pub id: Option<String>,

    /// Interval between beacons (e.g., 1s, 250ms)
    #[arg(short, long)]
    pub interval: Option<String>,
}

/// Arguments for the cat command
#[derive(Parser)]
pub struct CatArgs {
    /// Project name under the sandbox
    pub project: String,

    /// File path relative to the project
    pub path: String,

    /// Sandbox to read from
    #[arg(short, long)]
    pub sandbox: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Clone, Copy)]
pub enum ConfigAction {
    /// Show all configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Reset configuration to defaults
    Reset,
}

/// Arguments for the completions command
#[derive(Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
