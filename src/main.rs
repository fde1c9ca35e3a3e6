//! Multiwan CLI - fault-tolerant multi-WAN policy routing daemon.

use clap::Parser;
use colored::Colorize;
use tokio::signal;
use tracing::info;

use multiwan::cli::{Cli, Commands, ConfigArgs, InitArgs, MonitorArgs};
use multiwan::config::{init_logging, Config, LoggingConfig};
use multiwan::error::{Error, Result};
use multiwan::monitor::Monitor;
use multiwan::routing::UplinkSet;
use multiwan::sink::{CommandSink, PrintSink, ShellSink};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LoggingConfig {
        level: cli.log_level.clone(),
        color: !cli.no_color,
        ..Default::default()
    };
    init_logging(&log_config)?;

    let config = if let Some(ref path) = cli.config {
        Config::load(path)?
    } else if Config::default_path().exists() {
        Config::load(Config::default_path())?
    } else if matches!(cli.command, Commands::Config(_)) {
        Config::default()
    } else {
        return Err(Error::Config(format!(
            "no configuration found; pass --config or create {}",
            Config::default_path().display()
        )));
    };

    match cli.command {
        Commands::Monitor(args) => run_monitor(args, config).await,
        Commands::Init(args) => run_init(args, config).await,
        Commands::Config(args) => run_config(&args),
    }
}

/// Run the monitoring loop until interrupted.
async fn run_monitor(args: MonitorArgs, config: Config) -> Result<()> {
    if args.dry_run {
        monitor_until_interrupt(Monitor::from_config(&config, PrintSink)?).await
    } else {
        monitor_until_interrupt(Monitor::from_config(&config, ShellSink::new())?).await
    }
}

async fn monitor_until_interrupt<S: CommandSink>(monitor: Monitor<S>) -> Result<()> {
    info!(
        uplinks = monitor.uplinks().len(),
        version = multiwan::VERSION,
        "starting multiwan monitor"
    );
    tokio::select! {
        result = monitor.run() => result,
        _ = signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        }
    }
}

/// Emit or execute the full initialization sequence.
async fn run_init(args: InitArgs, config: Config) -> Result<()> {
    let set = UplinkSet::new(&config.uplinks, &config.routing)?;
    let commands = set.initialize_routing_commands();

    if args.execute {
        ShellSink::new().apply(&commands).await?;
        println!(
            "{}",
            format!("installed routing for {} uplinks", set.len()).green()
        );
    } else {
        for command in &commands {
            println!("{command}");
        }
    }
    Ok(())
}

/// Print an example configuration.
fn run_config(_args: &ConfigArgs) -> Result<()> {
    let example = Config::example();
    let toml = toml::to_string_pretty(&example)
        .map_err(|e| Error::Config(format!("failed to render example config: {e}")))?;
    print!("{toml}");
    Ok(())
}
