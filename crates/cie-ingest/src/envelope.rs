//! Event envelope
//!
//! The wire shape carries `eventPayload` and `eventMetadata` as JSON text.
//! Producers that embed the JSON directly are accepted too; embedded values
//! are re-serialized so the envelope always holds the text form.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::IngestError;

/// Metadata wrapper around one raw JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub event_name: String,

    #[serde(default)]
    pub event_id: Option<String>,

    #[serde(default)]
    pub correlation_id: Option<String>,

    #[serde(default)]
    pub event_source: Option<String>,

    #[serde(default)]
    pub regulatory_region: Option<String>,

    /// Epoch milliseconds as sent by the producer
    #[serde(default)]
    pub event_timestamp: Option<i64>,

    #[serde(default, deserialize_with = "json_text")]
    pub event_metadata: Option<String>,

    #[serde(default, deserialize_with = "json_text")]
    pub event_payload: Option<String>,

    /// Admission flag; only the rule evaluator changes it
    #[serde(skip, default = "admitted_by_default")]
    pub admitted: bool,
}

fn admitted_by_default() -> bool {
    true
}

fn json_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

impl Envelope {
    /// Parse a raw event and check that it is routable.
    ///
    /// # Errors
    ///
    /// [`IngestError::MalformedEnvelope`] when the input is not an envelope,
    /// the event name is blank, or the payload is missing or not JSON.
    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        let envelope: Envelope = serde_json::from_str(raw)
            .map_err(|e| IngestError::MalformedEnvelope(format!("invalid envelope: {}", e)))?;

        if envelope.event_name.trim().is_empty() {
            return Err(IngestError::MalformedEnvelope("eventName is missing".into()));
        }
        envelope.payload_json()?;

        Ok(envelope)
    }

    /// Parse the payload text.
    ///
    /// # Errors
    ///
    /// [`IngestError::MalformedEnvelope`] when the payload is absent or not JSON.
    pub fn payload_json(&self) -> Result<Value, IngestError> {
        let text = self
            .event_payload
            .as_deref()
            .ok_or_else(|| IngestError::MalformedEnvelope("eventPayload is missing".into()))?;
        serde_json::from_str(text)
            .map_err(|e| IngestError::MalformedEnvelope(format!("eventPayload is not JSON: {}", e)))
    }

    /// Event id for diagnostics, empty when the producer sent none
    pub fn event_id_or_empty(&self) -> &str {
        self.event_id.as_deref().unwrap_or_default()
    }
}
