//! PostgreSQL store
//!
//! Inserts bind the whole row as one JSON document and let
//! `jsonb_populate_record` coerce each field to its column type. Unquoted
//! identifiers fold to lowercase, so document keys are lowercased to match.
//! Every insert runs inside its own savepoint: a unique violation rolls back
//! to the savepoint and the event transaction stays usable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Acquire, Postgres, Row};
use std::time::Duration;

use super::{ColumnSet, SchemaIntrospector, Store, StoreError, StoreTransaction};
use crate::sql::InsertStatement;
use crate::value::MappedRow;

const LIST_COLUMNS_SQL: &str = r#"
SELECT UPPER(column_name::text) AS column_name
FROM information_schema.columns
WHERE UPPER(table_name::text) = UPPER($1)
  AND table_schema::text = ANY(current_schemas(false)::text[])
"#;

/// Connection pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/cie".to_string(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 10,
            idle_timeout_secs: Some(600),
        }
    }
}

impl DbConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

pub async fn create_pool(config: &DbConfig) -> Result<PgPool, StoreError> {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));

    if let Some(idle_timeout) = config.idle_timeout_secs {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }

    let pool = options.connect(&config.url).await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        Ok(Self::new(create_pool(config).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SchemaIntrospector for PgStore {
    async fn list_columns(&self, table: &str) -> Result<ColumnSet, StoreError> {
        let rows = sqlx::query(LIST_COLUMNS_SQL).bind(table).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("column_name").map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl Store for PgStore {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, StoreError> {
        Ok(PgTransaction {
            tx: self.pool.begin().await?,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ()).map_err(StoreError::from)
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn execute(&mut self, statement: &InsertStatement, row: &MappedRow) -> Result<(), StoreError> {
        let sql = populate_record_sql(statement)?;
        let document = row_document(statement, row);

        let mut savepoint = Acquire::begin(&mut self.tx).await?;
        let result = sqlx::query(&sql)
            .bind(sqlx::types::Json(document))
            .execute(&mut *savepoint)
            .await;

        match result {
            Ok(_) => {
                savepoint.commit().await?;
                Ok(())
            },
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                savepoint.rollback().await?;
                Err(StoreError::UniqueViolation {
                    table: statement.table.clone(),
                    constraint: db_err.constraint().map(str::to_string),
                })
            },
            Err(e) => {
                if let Err(rollback_err) = savepoint.rollback().await {
                    tracing::warn!(error = %rollback_err, "Savepoint rollback failed");
                }
                Err(StoreError::Database(e))
            },
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::from)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(StoreError::from)
    }
}

/// Executable form of an insert statement
fn populate_record_sql(statement: &InsertStatement) -> Result<String, StoreError> {
    if !is_plain_identifier(&statement.table) {
        return Err(StoreError::backend(format!("unsupported table name '{}'", statement.table)));
    }
    if let Some(bad) = statement.columns.iter().find(|c| !is_plain_identifier(c)) {
        return Err(StoreError::backend(format!("unsupported column name '{}'", bad)));
    }

    let columns = statement.columns.join(", ");
    let selected = statement
        .columns
        .iter()
        .map(|c| format!("r.{}", c))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "INSERT INTO {table} ({columns}) SELECT {selected} FROM jsonb_populate_record(NULL::{table}, $1) AS r",
        table = statement.table,
        columns = columns,
        selected = selected,
    ))
}

fn row_document(statement: &InsertStatement, row: &MappedRow) -> Value {
    let mut document = Map::new();
    for column in &statement.columns {
        let value = serde_json::to_value(row.value_or_null(column)).unwrap_or(Value::Null);
        document.insert(column.to_lowercase(), value);
    }
    Value::Object(document)
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
