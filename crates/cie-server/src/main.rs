//! CIE Server - Main entry point

use anyhow::{Context, Result};
use cie_common::logging::{init_logging, LogConfig};
use cie_ingest::{load_config, IngestionService, PgStore};
use tracing::info;

use cie_server::{api, config::Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("cie-server")
        .filter_directives("cie_server=debug,cie_ingest=info,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    info!("Starting CIE Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let events = load_config(&config.ingest.config_dir).with_context(|| {
        format!(
            "Failed to load event configuration from {}",
            config.ingest.config_dir.display()
        )
    })?;
    info!(events = events.registry.len(), "Event configuration loaded");

    let store = PgStore::connect(&config.database)
        .await
        .context("Failed to connect to the database")?;
    info!("Database connection pool established");

    let state = api::AppState::new(IngestionService::from_config(store, events));
    api::serve(&config, state).await
}
