//! HTTP error payloads
//!
//! Every ingestion failure becomes
//! `{"status":"FAILED","error":{"code","message","eventId","eventName","table","column"}}`
//! with a status derived from the failure kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cie_ingest::{IngestError, IngestFailure};
use serde::Serialize;

/// Failed ingestion, rendered as a JSON error response
#[derive(Debug)]
pub struct ApiError(pub IngestFailure);

impl From<IngestFailure> for ApiError {
    fn from(failure: IngestFailure) -> Self {
        Self(failure)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.error {
            IngestError::MalformedEnvelope(_) => StatusCode::BAD_REQUEST,
            IngestError::UnknownEventType(_) | IngestError::MissingMandatoryField { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            },
            IngestError::NoInsertableColumns { .. } | IngestError::Store { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    pub event_id: String,
    pub event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let IngestFailure {
            event_id,
            event_name,
            error,
        } = self.0;

        let message = match &error {
            IngestError::Store { table, .. } => {
                tracing::error!(error = %error, event_id = %event_id, "Store failure during ingestion");
                match table {
                    Some(table) => format!("A store error occurred while writing '{}'", table),
                    None => "A store error occurred".to_string(),
                }
            },
            other => other.to_string(),
        };

        let body = ErrorResponse {
            status: "FAILED",
            error: ErrorDetail {
                code: error.code(),
                message,
                event_id,
                event_name,
                table: error.table().map(str::to_string),
                column: error.column().map(str::to_string),
            },
        };

        (status, Json(body)).into_response()
    }
}
