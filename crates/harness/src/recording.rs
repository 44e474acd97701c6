use async_trait::async_trait;
use parking_lot::Mutex;

use cartsync_core::{FieldValue, Record, StorePrimitive};
use cartsync_engine::StoreCall;
use cartsync_storage::{RemoteStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub collection: String,
    pub call: StoreCall,
}

type Probe = Box<dyn Fn(&RecordedCall) + Send + Sync>;

/// Spy in front of a real store: logs every write call and can be told to
/// fail the next one.
pub struct RecordingStore<S> {
    inner: S,
    calls: Mutex<Vec<RecordedCall>>,
    fail_next: Mutex<Option<(String, String)>>,
    probe: Mutex<Option<Probe>>,
}

impl<S: RemoteStore> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            probe: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn count_of(&self, primitive: StorePrimitive) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.call.primitive() == primitive)
            .count()
    }

    /// Make the next write call fail with a rejected error. The call is
    /// still recorded.
    pub fn fail_next(&self, code: &str, message: &str) {
        *self.fail_next.lock() = Some((code.to_string(), message.to_string()));
    }

    /// Run `f` as each write call arrives, before it is forwarded.
    pub fn on_call(&self, f: impl Fn(&RecordedCall) + Send + Sync + 'static) {
        *self.probe.lock() = Some(Box::new(f));
    }

    fn record(&self, collection: &str, call: StoreCall) -> Result<(), StoreError> {
        let recorded = RecordedCall {
            collection: collection.to_string(),
            call,
        };
        if let Some(probe) = self.probe.lock().as_ref() {
            probe(&recorded);
        }
        self.calls.lock().push(recorded);
        match self.fail_next.lock().take() {
            Some((code, message)) => Err(StoreError::rejected(code, message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for RecordingStore<S> {
    async fn insert(&self, collection: &str, rows: &[Record]) -> Result<Vec<Record>, StoreError> {
        self.record(collection, StoreCall::Insert { rows: rows.to_vec() })?;
        self.inner.insert(collection, rows).await
    }

    async fn update(
        &self,
        collection: &str,
        rows: &[Record],
        match_columns: &[String],
    ) -> Result<Vec<Record>, StoreError> {
        self.record(
            collection,
            StoreCall::Update {
                rows: rows.to_vec(),
                match_columns: match_columns.to_vec(),
            },
        )?;
        self.inner.update(collection, rows, match_columns).await
    }

    async fn delete(
        &self,
        collection: &str,
        key_column: &str,
        keys: &[FieldValue],
    ) -> Result<(), StoreError> {
        self.record(
            collection,
            StoreCall::Delete {
                key_column: key_column.to_string(),
                keys: keys.to_vec(),
            },
        )?;
        self.inner.delete(collection, key_column, keys).await
    }

    async fn upsert(
        &self,
        collection: &str,
        rows: &[Record],
        conflict_columns: &[String],
    ) -> Result<Vec<Record>, StoreError> {
        self.record(
            collection,
            StoreCall::Upsert {
                rows: rows.to_vec(),
                conflict_columns: conflict_columns.to_vec(),
            },
        )?;
        self.inner.upsert(collection, rows, conflict_columns).await
    }

    async fn select(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.inner.select(collection).await
    }
}
