//! Relational store abstraction
//!
//! The pipeline needs two things from a database: the live column catalog of
//! a table, and named-parameter inserts inside one transaction per event.

mod memory;
mod postgres;

pub use memory::{MemoryStore, MemoryTransaction};
pub use postgres::{create_pool, DbConfig, PgStore, PgTransaction};

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::sql::InsertStatement;
use crate::value::MappedRow;

/// Column names of a table, uppercased
pub type ColumnSet = BTreeSet<String>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Insert collided with an existing row
    #[error("Unique constraint violated on table '{table}'{}", .constraint.as_ref().map(|c| format!(" ({})", c)).unwrap_or_default())]
    UniqueViolation {
        table: String,
        constraint: Option<String>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failure reported by a non-SQL backend
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}

/// Read access to the live column catalog
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Uppercased column names of `table`; empty when the table does not exist
    async fn list_columns(&self, table: &str) -> Result<ColumnSet, StoreError>;
}

/// A store that can open ingestion transactions
#[async_trait]
pub trait Store: SchemaIntrospector {
    type Transaction: StoreTransaction;

    async fn begin(&self) -> Result<Self::Transaction, StoreError>;

    /// Cheap liveness probe
    async fn ping(&self) -> Result<(), StoreError>;
}

/// One open transaction; dropped without commit means rolled back
#[async_trait]
pub trait StoreTransaction: Send {
    /// Execute `statement` binding each of its columns from `row`.
    ///
    /// Columns the row lacks are bound as null. A unique violation must leave
    /// the transaction usable and be reported as [`StoreError::UniqueViolation`].
    async fn execute(&mut self, statement: &InsertStatement, row: &MappedRow) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
