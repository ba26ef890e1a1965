// src/logging.rs
//! Tracing setup: every record goes both to the console and to the
//! append-only call log file.

use crate::config::{Config, LogFormat};
use crate::error::ConfigError;
use std::fs::{self, OpenOptions};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_tracing(config: &Config) -> Result<(), ConfigError> {
    fs::create_dir_all(&config.log_dir)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())?;
    let file = Arc::new(file);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .with(fmt::layer().with_target(false).with_ansi(false).with_writer(file))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .with(fmt::layer().json().with_writer(file))
            .init(),
    }

    Ok(())
}
