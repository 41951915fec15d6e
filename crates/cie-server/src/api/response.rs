//! API response types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cie_ingest::IngestionReport;
use serde::Serialize;

/// Acknowledgement of an ingested or filtered event
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub report: IngestionReport,
}

impl From<IngestionReport> for IngestResponse {
    fn from(report: IngestionReport) -> Self {
        Self {
            status: "SUCCESS",
            report,
        }
    }
}

impl IntoResponse for IngestResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}
