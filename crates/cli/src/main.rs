use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use scoa_collector::CollectionOrchestrator;
use scoa_core::config_loader::ConfigLoader;
use scoa_core::exchange::Exchange;
use scoa_influx::InfluxSink;

#[derive(Parser)]
#[command(name = "scoa")]
#[command(about = "Multi-exchange account data collector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collection service until terminated
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Probe connectivity for every enabled exchange, then exit
    TestConnections {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_collector(&config).await,
        Commands::TestConnections { config } => test_connections(&config).await,
    }
}

async fn run_collector(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;

    let sink = InfluxSink::new(&config.influx)
        .context("failed to construct time-series sink")?;
    if let Err(e) = sink.ping().await {
        warn!(error = %e, "time-series store unreachable, continuing anyway");
    }

    let mut orchestrator = CollectionOrchestrator::new(config, Arc::new(sink));
    orchestrator
        .initialize()
        .await
        .context("collector initialization failed")?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received termination signal, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    orchestrator.run(shutdown_rx).await?;
    info!("collector stopped");
    Ok(())
}

async fn test_connections(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;

    let mut any_ok = false;
    for (name, exchange_config) in &config.exchanges {
        if !exchange_config.enabled {
            continue;
        }

        let adapter = match scoa_collector::registry::build_adapter(name, exchange_config) {
            Ok(adapter) => adapter,
            Err(e) => {
                error!(exchange = %name, error = %e, "failed to construct adapter");
                continue;
            }
        };

        match adapter.test_connection().await {
            Ok(true) => {
                info!(exchange = %name, "connection OK");
                any_ok = true;
            }
            Ok(false) => warn!(exchange = %name, "connection test returned unexpected data"),
            Err(e) => error!(exchange = %name, error = %e, "connection failed"),
        }
    }

    if any_ok {
        Ok(())
    } else {
        anyhow::bail!("no exchange connection succeeded")
    }
}
