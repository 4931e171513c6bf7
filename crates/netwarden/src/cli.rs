//! Clap derive structures for the `netwarden` binary.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// netwarden -- watch, meter and gate the devices on a home network
#[derive(Debug, Parser)]
#[command(
    name = "netwarden",
    version,
    about = "Discover, meter and control devices on the local network",
    long_about = "Keeps a registry of devices seen on the LAN, enforces per-device data \
        quotas, and blocks or throttles devices through ARP poisoning or a router's \
        control plane.\n\n\
        `netwarden run` starts the daemon and serves the live event stream on /ws.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path to the config file (defaults to the platform config dir)
    #[arg(long, env = "NETWARDEN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Network interface to watch (overrides config)
    #[arg(long, short = 'i', global = true)]
    pub interface: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "NETWARDEN_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output Enums ─────────────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the engine and serve the event stream
    Run(RunArgs),

    /// Run a single discovery pass and list what answered
    #[command(alias = "d")]
    Discover,

    /// Probe one address for open ports and risky services
    Scan(ScanArgs),

    /// Inspect the configured router
    Router(RouterArgs),

    /// Manage the config file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Address for the WebSocket observer endpoint (overrides config)
    #[arg(long, short = 'l')]
    pub listen: Option<SocketAddr>,
}

// ── Scan ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// IPv4 or IPv6 address to probe
    pub address: IpAddr,
}

// ── Router ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RouterArgs {
    #[command(subcommand)]
    pub command: RouterCommand,
}

#[derive(Debug, Subcommand)]
pub enum RouterCommand {
    /// Log in and report brand, reachability and capabilities
    Status,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Write a config file populated with defaults
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration (secrets redacted)
    Show,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
