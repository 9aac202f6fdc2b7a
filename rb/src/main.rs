//! RelayBroker - leader-elected pub/sub relay
//!
//! CLI entry point.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{info, warn};

use relaybroker::cli::{Cli, Command};
use relaybroker::config::Config;
use relaybroker::coordination;
use relaybroker::{Broker, BrokerError};

fn setup_logging(level: &str, to_stderr: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Invalid log level")?;

    if to_stderr {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        // Create log directory
        let log_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relaybroker")
            .join("logs");

        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        let log_file = fs::File::create(log_dir.join("relaybroker.log")).context("Failed to create log file")?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    }

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);

    let level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    setup_logging(&level, cli.log_stderr).context("Failed to setup logging")?;

    match cli.command {
        Command::Run { .. } => cmd_run(config).await,
        Command::Leader { .. } => cmd_leader(&config).await,
        Command::Endpoint { .. } => cmd_endpoint(&config).await,
    }
}

/// Run the broker until interrupted or a fatal error
async fn cmd_run(config: Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let identity = config.broker.identity();
    info!(
        %identity,
        topics = ?config.broker.topics,
        "RelayBroker starting"
    );
    println!(
        "{} Broker {} waiting for leadership (topics: {})",
        "→".cyan(),
        identity.to_string().yellow(),
        config.broker.topics.join(", ")
    );

    let coordination = coordination::connect(&config.coordination)
        .await
        .context("Failed to connect to coordination service")?;

    let broker = Broker::new(config, coordination);
    let shutdown = broker.shutdown_flag();

    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            shutdown.stop();
        }
    });

    // the broker winds down on its own once the flag is cleared
    let result = broker.run().await;
    signal.abort();

    match result {
        Ok(()) => {
            println!("{} Broker stopped", "✓".green());
            Ok(())
        }
        Err(BrokerError::GateAborted) => {
            println!("{} Stopped before gaining leadership", "✓".green());
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Broker exited with error");
            Err(e).context("Broker failed")
        }
    }
}

/// Print the leader record and whether this identity holds it
async fn cmd_leader(config: &Config) -> Result<()> {
    let coordination = coordination::connect(&config.coordination)
        .await
        .context("Failed to connect to coordination service")?;
    let record = coordination
        .get_leader_record()
        .await
        .context("Failed to read leader record")?;

    let identity = config.broker.identity();
    if identity.matches_record(&record) {
        println!("{} {} (this broker)", "leader:".cyan(), record.green());
    } else {
        println!("{} {}", "leader:".cyan(), record.yellow());
        println!("{} {}", "self:".cyan(), identity.to_string().dimmed());
    }
    Ok(())
}

/// Print the discovery endpoint
async fn cmd_endpoint(config: &Config) -> Result<()> {
    let coordination = coordination::connect(&config.coordination)
        .await
        .context("Failed to connect to coordination service")?;
    let endpoint = coordination
        .get_discovery_endpoint()
        .await
        .context("Failed to read discovery endpoint")?;

    println!("{} {}", "discovery:".cyan(), endpoint);
    Ok(())
}
