//! Field mapping engine
//!
//! Turns a JSON payload into a [`MappedRow`] by resolving one JSON path per
//! column. Resolution is forgiving: a path that does not compile or does not
//! match yields null. Only the mandatory column check can fail a row.

mod fanout;

pub use fanout::FanoutBuilder;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::ids::IdGenerator;
use crate::json_path::JsonPath;
use crate::policy::IngestionPolicy;
use crate::value::{MappedRow, ScalarValue};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("Missing mandatory field: {0}")]
    MissingMandatoryField(String),
}

/// Maps payloads to rows according to a column -> path dictionary
///
/// Cheap to clone; compiled paths are shared between clones.
#[derive(Clone)]
pub struct FieldMapper {
    policy: Arc<IngestionPolicy>,
    ids: Arc<dyn IdGenerator>,
    paths: Arc<RwLock<HashMap<String, Option<Arc<JsonPath>>>>>,
}

impl std::fmt::Debug for FieldMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMapper").field("policy", &self.policy).finish_non_exhaustive()
    }
}

impl FieldMapper {
    pub fn new(policy: Arc<IngestionPolicy>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            policy,
            ids,
            paths: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> &IngestionPolicy {
        &self.policy
    }

    pub fn generate_id(&self) -> String {
        self.ids.generate()
    }

    /// Map one payload into a row.
    ///
    /// Every column of `column_mapping` appears in the row exactly once. With
    /// `auto_generate_id` the policy's id column receives a fresh identifier.
    ///
    /// # Errors
    ///
    /// [`MappingError::MissingMandatoryField`] naming the first entry of
    /// `mandatory_columns` that is absent or blank. The partial row is dropped.
    pub fn map(
        &self,
        payload: &Value,
        column_mapping: &BTreeMap<String, String>,
        mandatory_columns: &[String],
        auto_generate_id: bool,
    ) -> Result<MappedRow, MappingError> {
        let mut row = self.resolve_fields(payload, column_mapping);

        if auto_generate_id {
            row.insert(self.policy.id_column.clone(), self.ids.generate());
        }

        if let Some(missing) = mandatory_columns.iter().find(|column| row.is_blank(column)) {
            return Err(MappingError::MissingMandatoryField(missing.clone()));
        }

        tracing::trace!(columns = row.len(), "Mapped payload to row");
        Ok(row)
    }

    /// Resolve and coerce every mapped column without any validation
    pub fn resolve_fields(&self, node: &Value, column_mapping: &BTreeMap<String, String>) -> MappedRow {
        column_mapping
            .iter()
            .map(|(column, path)| {
                let value = self
                    .compiled(path)
                    .and_then(|path| path.resolve(node).map(|v| self.coerce(column, &v)))
                    .unwrap_or(ScalarValue::Null);
                (column.clone(), value)
            })
            .collect()
    }

    /// Convert a resolved JSON value into the scalar stored in `column`
    pub fn coerce(&self, column: &str, value: &Value) -> ScalarValue {
        match value {
            Value::Null => ScalarValue::Null,
            Value::Bool(b) => ScalarValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ScalarValue::Int(i),
                None => n.as_f64().map(ScalarValue::Float).unwrap_or(ScalarValue::Null),
            },
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    ScalarValue::Null
                } else if self.policy.is_date_column(column) {
                    parse_timestamp(trimmed)
                        .map(ScalarValue::Timestamp)
                        .unwrap_or_else(|| ScalarValue::Text(trimmed.to_string()))
                } else {
                    ScalarValue::Text(trimmed.to_string())
                }
            },
            Value::Array(_) | Value::Object(_) => ScalarValue::Text(value.to_string()),
        }
    }

    /// Compiled form of `path`, `None` when it does not compile
    pub(crate) fn compiled(&self, path: &str) -> Option<Arc<JsonPath>> {
        if let Some(hit) = self.paths.read().unwrap_or_else(PoisonError::into_inner).get(path) {
            return hit.clone();
        }

        let compiled = match JsonPath::compile(path) {
            Ok(p) => Some(Arc::new(p)),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Unusable JSON path; column resolves to null");
                None
            },
        };
        self.paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), compiled.clone());
        compiled
    }
}

/// ISO-8601 instant with or without an offset; offset-less values are UTC
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
