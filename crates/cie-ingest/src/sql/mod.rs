//! Schema-aware INSERT synthesis
//!
//! Candidate columns come from configuration, which may run ahead of the live
//! schema. Statements only ever name columns the catalog confirms.

mod catalog;
mod synthesizer;

pub use catalog::ColumnCatalogCache;
pub use synthesizer::SqlSynthesizer;

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SqlError {
    /// Candidate columns and live catalog do not intersect
    #[error("No columns to insert for table: {0}")]
    NoInsertableColumns(String),

    /// Column catalog could not be read
    #[error("Column catalog lookup failed: {0}")]
    Catalog(#[from] StoreError),
}

/// A parameterized INSERT, reusable for every row of the same shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertStatement {
    /// Physical table name
    pub table: String,

    /// Inserted columns in lexical order
    pub columns: Vec<String>,

    /// Canonical text with named placeholders
    pub sql: String,
}

impl InsertStatement {
    pub fn new(table: impl Into<String>, mut columns: Vec<String>) -> Self {
        let table = table.into();
        columns.sort();
        columns.dedup();
        let placeholders = columns.iter().map(|c| format!(":{}", c)).collect::<Vec<_>>().join(", ");
        let sql = format!("INSERT INTO {} ({}) VALUES ({})", table, columns.join(", "), placeholders);
        Self { table, columns, sql }
    }
}

impl std::fmt::Display for InsertStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}
