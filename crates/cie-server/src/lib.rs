//! CIE Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! HTTP surface of the canonical ingestion engine.
//!
//! # Endpoints
//!
//! - `POST /ingest`: body is one raw event envelope; answers
//!   `{"status":"SUCCESS", ...report}` or a `{"status":"FAILED","error":{..}}`
//!   payload (400 for malformed envelopes, 422 for unknown event types and
//!   missing mandatory fields, 500 for store-side failures)
//! - `GET /health`: store connectivity
//!
//! The router is generic over the [`cie_ingest::Store`] so handlers can be
//! exercised against the in-memory store.
//!
//! # Example
//!
//! ```no_run
//! use cie_ingest::{load_config, IngestionService, PgStore};
//! use cie_server::{api, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let events = load_config(&config.ingest.config_dir)?;
//!     let store = PgStore::connect(&config.database).await?;
//!     let state = api::AppState::new(IngestionService::from_config(store, events));
//!     api::serve(&config, state).await
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;

pub use error::ApiError;
