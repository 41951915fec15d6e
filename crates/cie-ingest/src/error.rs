//! Ingestion error taxonomy

use thiserror::Error;

use crate::store::StoreError;

/// Why one event could not be ingested
///
/// A duplicate row is not an error: the executor absorbs unique violations
/// and they only show up as `duplicates_skipped` in the report.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Input is not an envelope, or its payload is not JSON
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// No configuration registered for the event name
    #[error("No configuration registered for event type '{0}'")]
    UnknownEventType(String),

    /// A mandatory column resolved to null or blank
    #[error("Mandatory field '{column}' missing for table '{table}'")]
    MissingMandatoryField { table: String, column: String },

    /// None of the candidate columns exist in the live table
    #[error("No insertable columns for table '{table}'")]
    NoInsertableColumns { table: String },

    /// Any other persistence failure
    #[error("Store failure{}: {source}", on_table(.table))]
    Store {
        table: Option<String>,
        #[source]
        source: StoreError,
    },
}

fn on_table(table: &Option<String>) -> String {
    table.as_ref().map(|t| format!(" on table '{}'", t)).unwrap_or_default()
}

impl IngestError {
    pub fn store(table: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            table: Some(table.into()),
            source,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            IngestError::UnknownEventType(_) => "UNKNOWN_EVENT_TYPE",
            IngestError::MissingMandatoryField { .. } => "MISSING_MANDATORY_FIELD",
            IngestError::NoInsertableColumns { .. } => "NO_INSERTABLE_COLUMNS",
            IngestError::Store { .. } => "STORE_FAILURE",
        }
    }

    /// Failing table, when the error is tied to one
    pub fn table(&self) -> Option<&str> {
        match self {
            IngestError::MissingMandatoryField { table, .. }
            | IngestError::NoInsertableColumns { table } => Some(table),
            IngestError::Store { table, .. } => table.as_deref(),
            _ => None,
        }
    }

    /// Failing column, when the error is tied to one
    pub fn column(&self) -> Option<&str> {
        match self {
            IngestError::MissingMandatoryField { column, .. } => Some(column),
            _ => None,
        }
    }
}

/// An [`IngestError`] with the event it happened to
#[derive(Error, Debug)]
#[error("Ingestion of event '{event_name}' (id '{event_id}') failed: {error}")]
pub struct IngestFailure {
    pub event_id: String,
    pub event_name: String,
    #[source]
    pub error: IngestError,
}

impl IngestFailure {
    pub fn new(event_id: impl Into<String>, event_name: impl Into<String>, error: IngestError) -> Self {
        Self {
            event_id: event_id.into(),
            event_name: event_name.into(),
            error,
        }
    }
}
