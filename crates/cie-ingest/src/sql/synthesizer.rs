//! INSERT statement synthesis

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use super::{ColumnCatalogCache, InsertStatement, SqlError};
use crate::config::TableDirectory;
use crate::store::SchemaIntrospector;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StatementKey {
    logical_key: String,
    candidates: Vec<String>,
    auto_generate_id: bool,
}

/// Builds and memoizes INSERT statements for logical tables
#[derive(Debug)]
pub struct SqlSynthesizer {
    directory: Arc<TableDirectory>,
    id_column: String,
    catalog: ColumnCatalogCache,
    statements: RwLock<HashMap<StatementKey, Arc<InsertStatement>>>,
}

impl SqlSynthesizer {
    pub fn new(directory: Arc<TableDirectory>, id_column: impl Into<String>) -> Self {
        Self {
            directory,
            id_column: id_column.into(),
            catalog: ColumnCatalogCache::new(),
            statements: RwLock::new(HashMap::new()),
        }
    }

    /// Statement inserting the live subset of `candidates` into the table
    /// behind `logical_key`.
    ///
    /// With `auto_generate_id` the id column joins the candidates. Candidate
    /// names are matched against the catalog case-insensitively and emitted
    /// as configured.
    ///
    /// # Errors
    ///
    /// [`SqlError::NoInsertableColumns`] when no candidate exists in the live
    /// table, [`SqlError::Catalog`] when the catalog cannot be read.
    #[tracing::instrument(skip(self, introspector, candidates), fields(candidates = candidates.len()))]
    pub async fn synthesize<I>(
        &self,
        introspector: &I,
        logical_key: &str,
        candidates: &BTreeSet<String>,
        auto_generate_id: bool,
    ) -> Result<Arc<InsertStatement>, SqlError>
    where
        I: SchemaIntrospector + ?Sized,
    {
        let key = StatementKey {
            logical_key: logical_key.to_string(),
            candidates: candidates.iter().cloned().collect(),
            auto_generate_id,
        };
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let table = self.directory.resolve(logical_key).to_string();
        let live = self.catalog.columns(introspector, &table).await?;

        let mut wanted: BTreeSet<&str> = candidates.iter().map(String::as_str).collect();
        if auto_generate_id {
            wanted.insert(&self.id_column);
        }

        let mut seen = HashSet::new();
        let columns: Vec<String> = wanted
            .into_iter()
            .filter(|c| {
                let upper = c.to_uppercase();
                live.contains(&upper) && seen.insert(upper)
            })
            .map(str::to_string)
            .collect();

        if columns.is_empty() {
            return Err(SqlError::NoInsertableColumns(table));
        }

        let dropped = candidates.len() + usize::from(auto_generate_id) - columns.len();
        if dropped > 0 {
            tracing::debug!(table = %table, dropped, "Candidate columns absent from live schema");
        }

        let statement = Arc::new(InsertStatement::new(table, columns));
        tracing::debug!(sql = %statement.sql, "Synthesized insert statement");

        let mut statements = self.statements.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(statements.entry(key).or_insert(statement)))
    }

    fn cached(&self, key: &StatementKey) -> Option<Arc<InsertStatement>> {
        self.statements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Forget every cached catalog and statement
    pub fn clear_cache(&self) {
        self.catalog.clear();
        self.statements.write().unwrap_or_else(PoisonError::into_inner).clear();
        tracing::info!("Cleared column catalog and statement caches");
    }

    pub fn catalog(&self) -> &ColumnCatalogCache {
        &self.catalog
    }
}
