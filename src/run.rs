use crate::collector::client::CollectorClient;
use crate::collector::influx::InfluxSink;
use crate::config::parse::load_config;
use crate::ingest::batch::PendingBatch;
use crate::ingest::parser::LineParser;
use crate::ingest::runner::{run_delivery, run_ingestion};
use crate::ingest::tailer::LogTailer;
use crate::registration::server::run_check_server;
use crate::registration::{run_heartbeat, Registrar, RegistrationOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("collector client error: {0}")]
    Collector(#[from] crate::collector::client::SubmitError),

    #[error("registration error: {0}")]
    Registration(#[from] crate::registration::RegistrationError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/bandwatch/config.yml");
            eprintln!("  /etc/bandwatch/config.yml");
            eprintln!("\nUse --config <path> to specify a config file.");
            std::process::exit(1);
        }
    };

    run_agent(&config_path).await.map_err(|e| e.into())
}

async fn run_agent(config_path: &PathBuf) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    // Token shared between the collector client and the registration
    // heartbeat, which refreshes it on every successful re-registration.
    let token = Arc::new(RwLock::new(config.node.token.clone()));

    let registrar = Arc::new(Registrar::new(
        config.registration.clone(),
        config.node.clone(),
        Arc::clone(&token),
    ));

    // Initial registration is the one fatal path: the supervisor contract
    // is restart-on-exit, so both credential issuance and a first-attempt
    // failure end the process here.
    match registrar.register(true).await {
        Ok(RegistrationOutcome::Registered) => info!("Initial registration complete"),
        Ok(RegistrationOutcome::RestartRequired) => {
            info!("Exiting for supervisor restart");
            std::process::exit(0);
        }
        Err(err) => {
            error!(error = %err, "Initial registration failed");
            std::process::exit(1);
        }
    }

    info!(listen = %config.registration.check_listen, "Starting register-check endpoint");
    let check_listen = config.registration.check_listen.clone();
    let check_node_id = config.node.id.clone();
    tokio::spawn(async move {
        if let Err(err) = run_check_server(&check_listen, check_node_id).await {
            error!(error = %err, "Register-check server failed");
        }
    });

    info!("Starting registration heartbeat");
    tokio::spawn(run_heartbeat(Arc::clone(&registrar)));

    let batch = PendingBatch::shared();

    let tailer = LogTailer::new(config.source.path.clone(), config.source.max_log_size);
    let parser = LineParser::new(config.source.testing_cid.clone());
    info!(path = %config.source.path.display(), "Starting ingestion loop");
    tokio::spawn(run_ingestion(
        tailer,
        parser,
        Arc::clone(&batch),
        config.source.poll_interval,
        config.source.poll_floor,
    ));

    let client = CollectorClient::new(&config.collector, &config.node, Arc::clone(&token))?;
    let influx = config
        .influx
        .as_ref()
        .map(|influx| InfluxSink::new(influx, config.node.id.clone()));
    info!(url = %config.collector.url, "Starting delivery loop");
    tokio::spawn(run_delivery(
        Arc::clone(&batch),
        client,
        influx,
        config.collector.submit_interval,
        config.collector.submit_floor,
    ));

    info!("Agent running, press Ctrl+C to shut down");
    signal::ctrl_c().await.ok();

    // No graceful drain: pending records are lost by design. Deregistration
    // is still attempted, bounded by its own timeout.
    info!("Shutdown signal received");
    registrar.deregister().await;
    info!("Shutdown complete");

    Ok(())
}
