//! Annunciator command-line entry point.
//!
//! Runs the display arbitration service against the sign bridge, the
//! intercom speech host and the upstream process-data source named in the
//! config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use annunciator_agent::{Annunciator, AnnunciatorConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Background tasks get this long to finish after a stop request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "annunciator")]
#[command(about = "LED sign and intercom annunciator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "annunciator.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the annunciator until interrupted (default)
    Run,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let log_level = if cli.verbose || config.settings.debug {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// A missing file means defaults; an unreadable or invalid one is fatal.
fn load_config(path: &Path) -> Result<AnnunciatorConfig> {
    if !path.exists() {
        return Ok(AnnunciatorConfig::default());
    }
    AnnunciatorConfig::load(path)
        .with_context(|| format!("loading config from {}", path.display()))
}

async fn run(config: AnnunciatorConfig) -> Result<()> {
    info!(
        listen = %config.server.bind_addr(),
        upstream = %config.upstream.addr(),
        sign = %config.sign.bridge_addr,
        "starting annunciator"
    );
    let annunciator = Annunciator::with_production_handlers(config);

    tokio::select! {
        started = annunciator.start() => {
            if let Err(err) = started {
                error!(error = %err, "annunciator failed to start");
                annunciator.stop(SHUTDOWN_GRACE).await;
                return Err(err.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted during startup");
            annunciator.trigger_shutdown();
            annunciator.stop(SHUTDOWN_GRACE).await;
            return Ok(());
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested");
    annunciator.stop(SHUTDOWN_GRACE).await;
    Ok(())
}
