//! Column catalog cache
//!
//! Memoizes each physical table's column set for the life of the process.
//! Entries are never invalidated on their own; a schema migration needs an
//! explicit [`ColumnCatalogCache::clear`]. Concurrent first lookups of the
//! same table may both hit the store; the results are identical and the
//! first one stored wins.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::store::{ColumnSet, SchemaIntrospector, StoreError};

#[derive(Debug, Default)]
pub struct ColumnCatalogCache {
    tables: RwLock<HashMap<String, Arc<ColumnSet>>>,
}

impl ColumnCatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns of `table`, fetched through `introspector` on first use.
    ///
    /// An empty catalog (unknown table) is returned but not cached.
    pub async fn columns<I>(&self, introspector: &I, table: &str) -> Result<Arc<ColumnSet>, StoreError>
    where
        I: SchemaIntrospector + ?Sized,
    {
        let key = table.to_uppercase();
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let fetched = introspector.list_columns(&key).await?;
        let columns = Arc::new(fetched.into_iter().map(|c| c.to_uppercase()).collect::<ColumnSet>());

        if columns.is_empty() {
            tracing::warn!(table = %key, "Column catalog is empty; table missing or not visible");
            return Ok(columns);
        }

        tracing::debug!(table = %key, columns = columns.len(), "Cached column catalog");
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(tables.entry(key).or_insert(columns)))
    }

    fn cached(&self, key: &str) -> Option<Arc<ColumnSet>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn clear(&self) {
        self.tables.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_catalog_fetched_once_per_table() {
        let store = MemoryStore::new().with_table("SEND_TRANSACTIONS", &["TRAN_ID", "TRAN_TYPE"]);
        let cache = ColumnCatalogCache::new();

        let first = cache.columns(&store, "send_transactions").await.unwrap();
        let second = cache.columns(&store, "SEND_TRANSACTIONS").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.introspection_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_catalog_not_cached() {
        let store = MemoryStore::new();
        let cache = ColumnCatalogCache::new();

        assert!(cache.columns(&store, "LATER").await.unwrap().is_empty());
        store.declare_table("LATER", ["A"]);
        assert!(cache.columns(&store, "LATER").await.unwrap().contains("A"));
        assert_eq!(store.introspection_count(), 2);
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let store = MemoryStore::new().with_table("T", &["A"]);
        let cache = ColumnCatalogCache::new();
        cache.columns(&store, "T").await.unwrap();

        store.add_column("T", "B");
        assert!(!cache.columns(&store, "T").await.unwrap().contains("B"));

        cache.clear();
        assert!(cache.columns(&store, "T").await.unwrap().contains("B"));
        assert_eq!(store.introspection_count(), 2);
    }
}
