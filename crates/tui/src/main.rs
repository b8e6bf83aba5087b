mod app;

use std::{
    fs::{self, OpenOptions},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use gamevault_core::{
    config::{self, AppConfig},
    LocalSource, RemoteSource, Sources,
};
use tracing::warn;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    if config.api_key.is_empty() {
        warn!(
            "no catalog API key configured; set {} or api_key in {}",
            config::API_KEY_ENV,
            config::config_path().display()
        );
    }

    let remote = RemoteSource::from_config(&config).context("failed to build catalog client")?;
    let local = LocalSource::from_config(&config).context("failed to build collection client")?;
    let sources = Sources::new(Arc::new(remote), Arc::new(local));

    let mut app = app::GameVaultApp::new(sources);
    app.run().await
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("gamevault.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The terminal is in raw/alternate-screen mode, so log to file only.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
