//! Command-line interface for Multiwan.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Multiwan - fault-tolerant multi-WAN policy routing
#[derive(Parser, Debug)]
#[command(
    name = "multiwan",
    author,
    version,
    about = "Fault-tolerant multi-WAN policy routing with automatic failover",
    long_about = r"
Multiwan balances outbound traffic across several uplinks, each with its
own routing table and policy rules, and fails over automatically when an
uplink's gateway stops answering or its address changes.

QUICK START:
  Print a starting configuration:   multiwan config > /etc/multiwan.toml
  Inspect what would be installed:  multiwan init -c /etc/multiwan.toml
  Run the monitor:                  multiwan monitor -c /etc/multiwan.toml
"
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the monitoring loop (initializes routing first)
    Monitor(MonitorArgs),

    /// Emit the routing initialization command sequence
    Init(InitArgs),

    /// Print an example configuration
    Config(ConfigArgs),
}

/// Monitor command arguments
#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Print commands instead of executing them
    #[arg(long)]
    pub dry_run: bool,
}

/// Init command arguments
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Execute the sequence instead of printing it
    #[arg(long)]
    pub execute: bool,
}

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {}
