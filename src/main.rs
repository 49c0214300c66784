use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use honeypotd::config::{self, default_search_paths, Config, ConfigHandle, CONFIG_FILE_NAME};
use honeypotd::error::Result;
use honeypotd::event::TracingSink;
use honeypotd::service::ServiceRegistry;
use honeypotd::utils::logging;
use tracing::{error, info, warn};

/// Decoy network services
#[derive(Parser, Debug)]
#[command(name = "honeypotd", version, about)]
struct Cli {
    /// Config file to try before the standard locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the sample configuration to ./honeypot.conf and exit
    #[arg(long)]
    copyconfig: bool,

    /// Print the loaded configuration and exit
    #[arg(long)]
    dump_config: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.log_level, cli.json_logs) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "honeypotd exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.copyconfig {
        config::write_sample(CONFIG_FILE_NAME)?;
        info!(path = CONFIG_FILE_NAME, "Wrote sample configuration");
        return Ok(());
    }

    let paths: Vec<PathBuf> = cli.config.into_iter().chain(default_search_paths()).collect();
    let config = Config::load(&paths)?;

    if cli.dump_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let handle = ConfigHandle::new(config);
    let mut registry = ServiceRegistry::from_config(&handle, Arc::new(TracingSink))?;
    let bound = registry.start().await;
    if bound.is_empty() {
        warn!("No decoys running; enable a module such as mysql.enabled");
    }
    for (service, addr) in &bound {
        info!(service, address = %addr, "Decoy ready");
    }

    tokio::signal::ctrl_c().await?;
    info!("Received CTRL+C signal, shutting down");
    registry.shutdown().await;
    Ok(())
}
