use async_trait::async_trait;

use cartsync_core::{CacheKey, FieldValue, Record};

use crate::error::StoreError;

/// Remote relational store, addressed one collection at a time.
///
/// Each call is atomic on its own: it either affects every row it was given
/// or fails as a whole. Nothing spans two calls.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert `rows`, returning them as stored (with server-assigned fields).
    async fn insert(&self, collection: &str, rows: &[Record]) -> Result<Vec<Record>, StoreError>;

    /// Patch every existing row whose `match_columns` equal those of a given
    /// row. Fails with a not-found error if a row matches nothing.
    async fn update(
        &self,
        collection: &str,
        rows: &[Record],
        match_columns: &[String],
    ) -> Result<Vec<Record>, StoreError>;

    /// Delete every row whose `key_column` is one of `keys`.
    async fn delete(
        &self,
        collection: &str,
        key_column: &str,
        keys: &[FieldValue],
    ) -> Result<(), StoreError>;

    /// Insert rows, or patch existing rows that share `conflict_columns`.
    async fn upsert(
        &self,
        collection: &str,
        rows: &[Record],
        conflict_columns: &[String],
    ) -> Result<Vec<Record>, StoreError>;

    async fn select(&self, collection: &str) -> Result<Vec<Record>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub rows: Vec<Record>,
    pub stale: bool,
}

/// Process-wide cache of fetched result sets.
///
/// Reads and writes happen on the caller's thread; implementations only need
/// interior mutability, not cross-call coordination.
pub trait QueryCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Store `rows` under `key` as a fresh entry.
    fn set(&self, key: &CacheKey, rows: Vec<Record>);

    /// Mark `key` and every key it prefixes stale.
    fn invalidate(&self, key: &CacheKey);

    /// Drop any fetch in flight for `key` so it cannot overwrite a
    /// speculative edit when it lands.
    fn cancel_in_flight(&self, key: &CacheKey);
}
