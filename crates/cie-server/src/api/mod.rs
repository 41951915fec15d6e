pub mod response;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use cie_ingest::{IngestionService, Store};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::info;

use crate::config::Config;
use crate::error::ApiError;
use crate::middleware;
use response::{HealthResponse, IngestResponse};

/// Shared handler state
pub struct AppState<S> {
    pub service: Arc<IngestionService<S>>,
}

impl<S> AppState<S> {
    pub fn new(service: IngestionService<S>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

/// Bind, serve until a shutdown signal arrives, then drain
pub async fn serve<S: Store + 'static>(config: &Config, state: AppState<S>) -> anyhow::Result<()> {
    let app = create_router(state, config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Create the application router with all routes and middleware
pub fn create_router<S: Store + 'static>(state: AppState<S>, config: &Config) -> Router {
    Router::new()
        .route("/", get(root::<S>))
        .route("/health", get(health_check::<S>))
        .route("/ingest", post(ingest::<S>))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn root<S: Store + 'static>(State(state): State<AppState<S>>) -> impl IntoResponse {
    Json(json!({
        "name": "CIE Server",
        "version": env!("CARGO_PKG_VERSION"),
        "events": state.service.registry().len()
    }))
}

/// Health check handler
async fn health_check<S: Store + 'static>(State(state): State<AppState<S>>) -> impl IntoResponse {
    match state.service.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                store: "connected",
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy",
                    store: "unreachable",
                }),
            )
        },
    }
}

/// Ingest one raw event envelope
async fn ingest<S: Store + 'static>(
    State(state): State<AppState<S>>,
    body: String,
) -> Result<IngestResponse, ApiError> {
    let report = state.service.ingest(&body).await?;
    Ok(report.into())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
