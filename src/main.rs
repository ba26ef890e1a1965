// src/main.rs
use anyhow::Context;
use esl_call_logger::esl::EslConnector;
use esl_call_logger::logging::init_tracing;
use esl_call_logger::{Config, Supervisor, SupervisorConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(&config).context("Failed to initialize logging")?;

    info!("Starting ESL call logger v{}", env!("CARGO_PKG_VERSION"));
    info!("Writing call log to {}", config.log_path().display());
    info!("Subscribing to {} events", config.event_format);

    let connector = EslConnector::new(config.freeswitch.clone(), config.connect_timeout);
    let supervisor = Supervisor::new(connector, SupervisorConfig::from(&config));

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                on_signal.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let remaining = supervisor.run(shutdown).await;
    if !remaining.is_empty() {
        info!("Exiting with {} call(s) still in progress", remaining.len());
    }

    Ok(())
}
