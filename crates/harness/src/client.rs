use std::sync::Arc;

use cartsync_core::{CacheKey, FieldValue, Record};
use cartsync_engine::{EngineConfig, MutationClient};
use cartsync_storage::{MemoryCache, QueryCache, RemoteStore, SqliteStore, StoreError};

use crate::recording::RecordingStore;

/// A mutation client over an in-memory SQLite store with a call spy and an
/// inspectable cache.
pub struct TestClient {
    pub store: Arc<RecordingStore<SqliteStore>>,
    pub cache: Arc<MemoryCache>,
    pub client: MutationClient,
}

impl TestClient {
    pub fn new() -> Result<Self, StoreError> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, StoreError> {
        crate::init_tracing();
        let store = Arc::new(RecordingStore::new(SqliteStore::open_in_memory()?));
        let cache = Arc::new(MemoryCache::new());
        let client = MutationClient::new(store.clone(), cache.clone()).with_config(config);
        Ok(Self {
            store,
            cache,
            client,
        })
    }

    /// Insert rows directly, bypassing the spy and the engine.
    pub async fn seed(
        &self,
        collection: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        self.store.inner().insert(collection, &rows).await
    }

    /// Seed `count` rows with ids `1..=count`.
    pub async fn seed_ids(&self, collection: &str, count: i64) -> Result<(), StoreError> {
        let rows = (1..=count)
            .map(|id| Record::new().with("id", id).with("name", format!("{collection} {id}")))
            .collect();
        self.seed(collection, rows).await?;
        Ok(())
    }

    pub async fn rows(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.store.inner().select(collection).await
    }

    pub async fn ids(&self, collection: &str) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .rows(collection)
            .await?
            .iter()
            .filter_map(|r| r.get("id").and_then(FieldValue::as_integer))
            .collect())
    }

    /// Fill the cache entry at `key` from the store, the way a read would.
    pub async fn prime(&self, key: &CacheKey, collection: &str) -> Result<(), StoreError> {
        let rows = self.rows(collection).await?;
        self.cache.set(key, rows);
        Ok(())
    }

    pub fn cached_ids(&self, key: &CacheKey) -> Vec<i64> {
        self.cache
            .get(key)
            .map(|e| {
                e.rows
                    .iter()
                    .filter_map(|r| r.get("id").and_then(FieldValue::as_integer))
                    .collect()
            })
            .unwrap_or_default()
    }
}
