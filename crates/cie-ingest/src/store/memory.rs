//! In-memory store
//!
//! Behaves like a small relational database: declared tables with a column
//! catalog, optional unique keys, and writes that only become visible when
//! their transaction commits. Used by tests and by dry runs.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ColumnSet, SchemaIntrospector, Store, StoreError, StoreTransaction};
use crate::config::{EventRegistry, TableKind};
use crate::policy::IngestionPolicy;
use crate::sql::InsertStatement;
use crate::value::MappedRow;

#[derive(Debug, Default)]
struct MemoryTable {
    columns: ColumnSet,
    unique_key: Vec<String>,
    rows: Vec<MappedRow>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    introspections: usize,
    failing_tables: HashMap<String, String>,
    committed_sql: Vec<String>,
}

/// Shared handle; clones see the same tables
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a table (replacing any previous definition)
    pub fn with_table(self, name: &str, columns: &[&str]) -> Self {
        self.declare_table(name, columns.iter().copied());
        self
    }

    /// Reject inserts whose values for `columns` match an existing row
    pub fn with_unique_key(self, table: &str, columns: &[&str]) -> Self {
        if let Some(t) = self.lock().tables.get_mut(&table.to_uppercase()) {
            t.unique_key = columns.iter().map(|c| c.to_uppercase()).collect();
        }
        self
    }

    pub fn declare_table<'a>(&self, name: &str, columns: impl IntoIterator<Item = &'a str>) {
        let table = MemoryTable {
            columns: columns.into_iter().map(str::to_uppercase).collect(),
            ..MemoryTable::default()
        };
        self.lock().tables.insert(name.to_uppercase(), table);
    }

    /// Add a column to an existing table, as a schema migration would
    pub fn add_column(&self, table: &str, column: &str) {
        if let Some(t) = self.lock().tables.get_mut(&table.to_uppercase()) {
            t.columns.insert(column.to_uppercase());
        }
    }

    /// Make every insert into `table` fail with a backend error
    pub fn fail_inserts_into(&self, table: &str, message: &str) {
        self.lock()
            .failing_tables
            .insert(table.to_uppercase(), message.to_string());
    }

    /// Declare every table the registry can write to.
    ///
    /// Columns are the mapped, mandatory and parent columns of each table plus
    /// the reserved columns the policy stamps on generated rows.
    pub fn from_registry(registry: &EventRegistry, policy: &IngestionPolicy) -> Self {
        let mut tables: HashMap<String, BTreeSet<String>> = HashMap::new();

        for event in registry.events() {
            for table in &event.tables {
                let columns = tables.entry(table.physical_table().to_string()).or_default();
                columns.extend(table.column_mapping.keys().cloned());
                columns.extend(table.mandatory_columns.iter().cloned());
                columns.extend(table.parent_id_field.iter().cloned());
                if table.auto_generate_id {
                    columns.insert(policy.id_column.clone());
                }
                if table.kind == TableKind::Address {
                    for rule in registry.address_rules_for(&event.event_name, table) {
                        columns.extend(rule.field_mapping.keys().cloned());
                    }
                    columns.insert(policy.id_column.clone());
                    columns.insert(policy.address_type_column.clone());
                    columns.insert(policy.address_parent_column.clone());
                }
            }
        }

        let store = Self::new();
        for (name, columns) in &tables {
            store.declare_table(name, columns.iter().map(String::as_str));
        }
        store
    }

    /// Committed rows of `table`, column names uppercased
    pub fn rows(&self, table: &str) -> Vec<MappedRow> {
        self.lock()
            .tables
            .get(&table.to_uppercase())
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock()
            .tables
            .get(&table.to_uppercase())
            .map_or(0, |t| t.rows.len())
    }

    pub fn total_rows(&self) -> usize {
        self.lock().tables.values().map(|t| t.rows.len()).sum()
    }

    /// SQL text of every committed insert, in execution order
    pub fn executed_statements(&self) -> Vec<String> {
        self.lock().committed_sql.clone()
    }

    /// Number of catalog lookups served so far
    pub fn introspection_count(&self) -> usize {
        self.lock().introspections
    }
}

#[async_trait]
impl SchemaIntrospector for MemoryStore {
    async fn list_columns(&self, table: &str) -> Result<ColumnSet, StoreError> {
        let mut state = self.lock();
        state.introspections += 1;
        Ok(state
            .tables
            .get(&table.to_uppercase())
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        Ok(MemoryTransaction {
            store: self.clone(),
            staged: Vec::new(),
            staged_sql: Vec::new(),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Writes staged until commit
#[derive(Debug)]
pub struct MemoryTransaction {
    store: MemoryStore,
    staged: Vec<(String, MappedRow)>,
    staged_sql: Vec<String>,
}

impl MemoryTransaction {
    pub fn staged_rows(&self) -> usize {
        self.staged.len()
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn execute(&mut self, statement: &InsertStatement, row: &MappedRow) -> Result<(), StoreError> {
        let key = statement.table.to_uppercase();
        let state = self.store.lock();

        if let Some(message) = state.failing_tables.get(&key) {
            return Err(StoreError::backend(message.clone()));
        }

        let table = state
            .tables
            .get(&key)
            .ok_or_else(|| StoreError::backend(format!("relation \"{}\" does not exist", statement.table)))?;

        let mut record = MappedRow::new();
        for column in &statement.columns {
            let upper = column.to_uppercase();
            if !table.columns.contains(&upper) {
                return Err(StoreError::backend(format!(
                    "column \"{}\" of relation \"{}\" does not exist",
                    column, statement.table
                )));
            }
            record.insert(upper, row.value_or_null(column).clone());
        }

        // A null in any key column never collides, as in SQL
        let keyed = !table.unique_key.is_empty()
            && table.unique_key.iter().all(|c| !record.value_or_null(c).is_null());
        if keyed {
            let same_key = |other: &MappedRow| {
                table
                    .unique_key
                    .iter()
                    .all(|c| other.value_or_null(c) == record.value_or_null(c))
            };
            let staged = self.staged.iter().filter(|(t, _)| *t == key).map(|(_, r)| r);
            if table.rows.iter().chain(staged).any(same_key) {
                return Err(StoreError::UniqueViolation {
                    table: statement.table.clone(),
                    constraint: Some(format!("{}_UK", key)),
                });
            }
        }

        drop(state);
        self.staged.push((key, record));
        self.staged_sql.push(statement.sql.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut state = self.store.lock();
        for (table, row) in self.staged {
            if let Some(t) = state.tables.get_mut(&table) {
                t.rows.push(row);
            }
        }
        state.committed_sql.extend(self.staged_sql);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
