//! Shared fixtures for ingestion integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use cie_ingest::config::AddressRuleSet;
use cie_ingest::{EventConfig, EventRegistry, MemoryStore};
use serde_json::{json, Value};
use std::sync::Arc;

/// Main, detail and address tables for the AVS event
pub const AVS_EVENT_YAML: &str = r#"
eventName: AVS
description: Account verification
tables:
  - logicalKey: AVS
    table: SEND_TRANSACTIONS
    order: 1
    kind: main
    columnMapping:
      TRAN_ID: $.avsTranId
      TRAN_TYPE: $.transactionType
      CRTE_DT: $.createdAt
      AMOUNT: $.amount
    mandatoryColumns: [TRAN_ID, TRAN_TYPE]
  - logicalKey: AVS_RECIPIENT
    table: SEND_RECIPIENTS
    order: 2
    kind: detail
    parentIdField: TRAN_ID
    autoGenerateId: true
    columnMapping:
      FIRST_NAME: $.recipient.firstName
      LAST_NAME: $.recipient.lastName
  - logicalKey: AVS_ADDR
    table: SEND_ADDRESSES
    order: 3
    kind: address
"#;

pub const AVS_ADDR_YAML: &str = r#"
eventName: AVS
addresses:
  - type: HOME
    rootPath: $.addresses
    fieldMapping:
      CITY: city
      ZIP: zip
"#;

/// Single main table, exactly as in the canonical AVS example
pub const MINIMAL_AVS_YAML: &str = r#"
eventName: AVS
tables:
  - logicalKey: AVS
    table: SEND_TRANSACTIONS
    order: 1
    kind: main
    columnMapping:
      TRAN_ID: $.avsTranId
      TRAN_TYPE: $.transactionType
    mandatoryColumns: [TRAN_ID, TRAN_TYPE]
"#;

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cie_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn avs_registry() -> Arc<EventRegistry> {
    let event: EventConfig = serde_yaml::from_str(AVS_EVENT_YAML).unwrap();
    let addresses: AddressRuleSet = serde_yaml::from_str(AVS_ADDR_YAML).unwrap();
    Arc::new(EventRegistry::builder().event(event).address_rules(addresses).build().unwrap())
}

pub fn minimal_registry() -> Arc<EventRegistry> {
    let event: EventConfig = serde_yaml::from_str(MINIMAL_AVS_YAML).unwrap();
    Arc::new(EventRegistry::builder().event(event).build().unwrap())
}

/// Tables matching [`AVS_EVENT_YAML`], with natural unique keys
pub fn avs_store() -> MemoryStore {
    MemoryStore::new()
        .with_table("SEND_TRANSACTIONS", &["TRAN_ID", "TRAN_TYPE", "CRTE_DT", "AMOUNT"])
        .with_unique_key("SEND_TRANSACTIONS", &["TRAN_ID"])
        .with_table("SEND_RECIPIENTS", &["ID", "TRAN_ID", "FIRST_NAME", "LAST_NAME"])
        .with_unique_key("SEND_RECIPIENTS", &["TRAN_ID"])
        .with_table("SEND_ADDRESSES", &["ID", "PARENT_ID", "ADDR_TYPE", "CITY", "ZIP"])
        .with_unique_key("SEND_ADDRESSES", &["PARENT_ID", "ADDR_TYPE", "CITY"])
}

pub fn envelope(event_name: &str, payload: Value) -> String {
    json!({
        "eventName": event_name,
        "eventId": "evt-001",
        "eventSource": "AVS_SERVICE",
        "correlationId": "corr-001",
        "eventTimestamp": 1_738_656_000_000_i64,
        "eventMetadata": "{\"operation\":\"I\"}",
        "eventPayload": payload.to_string()
    })
    .to_string()
}

pub fn avs_payload() -> Value {
    json!({
        "avsTranId": "T1",
        "transactionType": "AVS",
        "createdAt": "2026-01-22T10:30:00Z",
        "amount": 125.5,
        "recipient": { "firstName": "Ann", "lastName": "Lee" },
        "addresses": [ { "city": "NY", "zip": "10001" }, { "city": "LA", "zip": "90001" } ]
    })
}

/// Tables matching [`AVS_EVENT_YAML`]; unquoted names fold to lowercase
pub const AVS_SCHEMA_SQL: &[&str] = &[
    "CREATE TABLE send_transactions (
        tran_id TEXT PRIMARY KEY,
        tran_type TEXT NOT NULL,
        crte_dt TIMESTAMPTZ,
        amount NUMERIC(12, 2)
    )",
    "CREATE TABLE send_recipients (
        id TEXT PRIMARY KEY,
        tran_id TEXT NOT NULL UNIQUE,
        first_name TEXT,
        last_name TEXT
    )",
    "CREATE TABLE send_addresses (
        id TEXT PRIMARY KEY,
        parent_id TEXT NOT NULL,
        addr_type TEXT NOT NULL,
        city TEXT,
        zip TEXT,
        UNIQUE (parent_id, addr_type, city)
    )",
];

/// PostgreSQL test container with a connected pool
pub struct TestPostgres {
    _container: testcontainers::ContainerAsync<testcontainers_modules::postgres::Postgres>,
    pool: sqlx::PgPool,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> anyhow::Result<Self> {
        use anyhow::Context;
        use testcontainers::core::IntoContainerPort;
        use testcontainers::runners::AsyncRunner;
        use testcontainers::ImageExt;

        tracing::info!("Starting PostgreSQL test container...");

        let container = testcontainers_modules::postgres::Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        tracing::debug!("PostgreSQL connection: {}", connection_string);

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self {
            _container: container,
            pool,
            connection_string,
        })
    }

    pub async fn apply(&self, statements: &[&str]) -> anyhow::Result<()> {
        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}
