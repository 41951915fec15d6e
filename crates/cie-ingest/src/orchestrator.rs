//! Ingestion orchestrator
//!
//! One event moves through
//! `RECEIVED -> FILTERED -> CONFIGURED -> PROCESSING(table) -> DONE`:
//! parse, run the rules, look up the configuration, then write every table
//! in ascending `order` inside a single transaction. Any failure rolls the
//! whole event back.

use serde_json::Value;
use std::sync::Arc;

use crate::config::{EventConfig, EventRegistry, TableDefinition, TableKind};
use crate::envelope::Envelope;
use crate::error::{IngestError, IngestFailure};
use crate::executor::{self, InsertOutcome};
use crate::ids::{IdGenerator, UuidGenerator};
use crate::loader::LoadedConfig;
use crate::mapping::{FanoutBuilder, FieldMapper, MappingError};
use crate::policy::IngestionPolicy;
use crate::report::{IngestionReport, TableReport};
use crate::rules::{AdmitAll, RuleEvaluator};
use crate::sql::{SqlError, SqlSynthesizer};
use crate::store::{Store, StoreTransaction};
use crate::value::MappedRow;

pub struct IngestionServiceBuilder<S> {
    store: S,
    registry: Arc<EventRegistry>,
    rules: Arc<dyn RuleEvaluator>,
    policy: IngestionPolicy,
    ids: Arc<dyn IdGenerator>,
}

impl<S: Store> IngestionServiceBuilder<S> {
    pub fn rules(mut self, rules: impl RuleEvaluator + 'static) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn policy(mut self, policy: IngestionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn build(self) -> IngestionService<S> {
        let policy = Arc::new(self.policy);
        let mapper = FieldMapper::new(Arc::clone(&policy), self.ids);
        let synthesizer = SqlSynthesizer::new(self.registry.table_directory(), policy.id_column.clone());

        IngestionService {
            store: self.store,
            registry: self.registry,
            rules: self.rules,
            fanout: FanoutBuilder::new(mapper.clone()),
            mapper,
            synthesizer,
            policy,
        }
    }
}

/// Configuration-driven event ingestion over a [`Store`]
pub struct IngestionService<S> {
    store: S,
    registry: Arc<EventRegistry>,
    rules: Arc<dyn RuleEvaluator>,
    mapper: FieldMapper,
    fanout: FanoutBuilder,
    synthesizer: SqlSynthesizer,
    policy: Arc<IngestionPolicy>,
}

impl<S> std::fmt::Debug for IngestionService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionService")
            .field("events", &self.registry.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<S: Store> IngestionService<S> {
    /// Start building a service; rules default to [`AdmitAll`]
    pub fn builder(store: S, registry: Arc<EventRegistry>) -> IngestionServiceBuilder<S> {
        IngestionServiceBuilder {
            store,
            registry,
            rules: Arc::new(AdmitAll),
            policy: IngestionPolicy::default(),
            ids: Arc::new(UuidGenerator),
        }
    }

    /// Service wired from a loaded configuration directory
    pub fn from_config(store: S, config: LoadedConfig) -> Self {
        Self::builder(store, Arc::new(config.registry))
            .rules(config.rules)
            .policy(config.policy)
            .build()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Drop cached column catalogs and statements, e.g. after a migration
    pub fn clear_cache(&self) {
        self.synthesizer.clear_cache();
    }

    /// Ingest one raw event.
    ///
    /// A rejected event is acknowledged with [`crate::Outcome::Filtered`] and
    /// writes nothing. Duplicate rows are counted, not failed.
    ///
    /// # Errors
    ///
    /// Every [`IngestError`] except duplicates, wrapped with the event's id
    /// and name. Nothing is committed when an error is returned.
    #[tracing::instrument(
        skip_all,
        fields(event_name = tracing::field::Empty, event_id = tracing::field::Empty)
    )]
    pub async fn ingest(&self, raw: &str) -> Result<IngestionReport, IngestFailure> {
        let envelope = Envelope::parse(raw).map_err(|e| {
            let (event_id, event_name) = salvage_identity(raw);
            tracing::warn!(error = %e, "Rejected malformed envelope");
            IngestFailure::new(event_id, event_name, e)
        })?;

        let span = tracing::Span::current();
        span.record("event_name", envelope.event_name.as_str());
        span.record("event_id", envelope.event_id_or_empty());

        let fail = |error: IngestError| {
            IngestFailure::new(envelope.event_id_or_empty(), envelope.event_name.clone(), error)
        };

        let envelope = self.rules.evaluate(envelope.clone());
        if !envelope.admitted {
            tracing::info!("Event filtered by rules, nothing written");
            return Ok(IngestionReport::filtered(envelope.event_id, envelope.event_name));
        }

        let config = self
            .registry
            .event(&envelope.event_name)
            .ok_or_else(|| fail(IngestError::UnknownEventType(envelope.event_name.clone())))?;

        let payload = envelope.payload_json().map_err(&fail)?;

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| fail(IngestError::Store { table: None, source: e }))?;

        match self.process(&mut tx, &envelope, config, &payload).await {
            Ok((parent_id, tables)) => {
                tx.commit()
                    .await
                    .map_err(|e| fail(IngestError::Store { table: None, source: e }))?;

                let report = IngestionReport::ingested(envelope.event_id, envelope.event_name, parent_id, tables);
                tracing::info!(
                    rows_inserted = report.rows_inserted,
                    duplicates_skipped = report.duplicates_skipped,
                    "Event ingested"
                );
                Ok(report)
            },
            Err(error) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                tracing::error!(
                    error = %error,
                    table = error.table().unwrap_or_default(),
                    column = error.column().unwrap_or_default(),
                    "Event ingestion failed, transaction rolled back"
                );
                Err(fail(error))
            },
        }
    }

    async fn process(
        &self,
        tx: &mut S::Transaction,
        envelope: &Envelope,
        config: &EventConfig,
        payload: &Value,
    ) -> Result<(Option<String>, Vec<TableReport>), IngestError> {
        let mut parent_id: Option<String> = None;
        let mut reports = Vec::with_capacity(config.tables.len());

        for table in &config.tables {
            let report = match table.kind {
                TableKind::Main | TableKind::Detail => {
                    self.process_row_table(tx, table, payload, &mut parent_id).await?
                },
                TableKind::Address => {
                    self.process_address_table(tx, &envelope.event_name, table, payload, parent_id.as_deref())
                        .await?
                },
            };
            reports.push(report);
        }

        Ok((parent_id, reports))
    }

    async fn process_row_table(
        &self,
        tx: &mut S::Transaction,
        table: &TableDefinition,
        payload: &Value,
        parent_id: &mut Option<String>,
    ) -> Result<TableReport, IngestError> {
        let mut row = self
            .mapper
            .map(payload, &table.column_mapping, &table.mandatory_columns, table.auto_generate_id)
            .map_err(|MappingError::MissingMandatoryField(column)| IngestError::MissingMandatoryField {
                table: table.logical_key.clone(),
                column,
            })?;

        match table.kind {
            TableKind::Main if parent_id.is_none() => {
                let derived = self.derive_parent_id(&row);
                tracing::debug!(table = %table.logical_key, parent_id = %derived, "Captured parent id");
                *parent_id = Some(derived);
            },
            TableKind::Detail => {
                if let (Some(field), Some(parent)) = (&table.parent_id_field, parent_id.as_ref()) {
                    if row.is_blank(field) {
                        row.insert(field.clone(), parent.clone());
                    }
                }
            },
            _ => {},
        }

        let mut report = TableReport::new(&table.logical_key);
        report.record(self.write(tx, table, &row).await?);
        Ok(report)
    }

    async fn process_address_table(
        &self,
        tx: &mut S::Transaction,
        event_name: &str,
        table: &TableDefinition,
        payload: &Value,
        parent_id: Option<&str>,
    ) -> Result<TableReport, IngestError> {
        let mut report = TableReport::new(&table.logical_key);
        let Some(parent) = parent_id else {
            tracing::debug!(table = %table.logical_key, "No parent id captured, address table skipped");
            return Ok(report);
        };

        let rules = self.registry.address_rules_for(event_name, table);
        for mut row in self.fanout.build(payload, rules, Some(parent)) {
            if let Some(field) = &table.parent_id_field {
                row.insert(field.clone(), parent);
            }
            report.record(self.write(tx, table, &row).await?);
        }

        Ok(report)
    }

    async fn write(
        &self,
        tx: &mut S::Transaction,
        table: &TableDefinition,
        row: &MappedRow,
    ) -> Result<InsertOutcome, IngestError> {
        let statement = self
            .synthesizer
            .synthesize(&self.store, &table.logical_key, &row.column_set(), table.auto_generate_id)
            .await
            .map_err(|e| match e {
                SqlError::NoInsertableColumns(_) => IngestError::NoInsertableColumns {
                    table: table.logical_key.clone(),
                },
                SqlError::Catalog(source) => IngestError::store(&table.logical_key, source),
            })?;

        executor::insert(tx, &statement, row)
            .await
            .map_err(|e| IngestError::store(&table.logical_key, e))
    }

    /// First non-blank configured key of the main row, else a fresh identifier
    fn derive_parent_id(&self, row: &MappedRow) -> String {
        self.policy
            .parent_id_keys
            .iter()
            .find_map(|key| row.get(key).and_then(|v| v.to_identifier()))
            .unwrap_or_else(|| self.mapper.generate_id())
    }
}

/// Best-effort id and name from input that failed envelope parsing
fn salvage_identity(raw: &str) -> (String, String) {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) else {
        return (String::new(), String::new());
    };
    let field = |name: &str| map.get(name).and_then(Value::as_str).unwrap_or_default().to_string();
    (field("eventId"), field("eventName"))
}
