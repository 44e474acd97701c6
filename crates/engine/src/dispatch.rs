use cartsync_core::{FieldValue, Record, StorePrimitive};
use cartsync_storage::RemoteStore;

use crate::error::EngineError;

/// One fully resolved remote call. Building one performs no I/O; every
/// pre-dispatch check has already passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Insert {
        rows: Vec<Record>,
    },
    Update {
        rows: Vec<Record>,
        match_columns: Vec<String>,
    },
    Delete {
        key_column: String,
        keys: Vec<FieldValue>,
    },
    Upsert {
        rows: Vec<Record>,
        conflict_columns: Vec<String>,
    },
}

impl StoreCall {
    pub fn primitive(&self) -> StorePrimitive {
        match self {
            Self::Insert { .. } => StorePrimitive::Insert,
            Self::Update { .. } => StorePrimitive::Update,
            Self::Delete { .. } => StorePrimitive::Delete,
            Self::Upsert { .. } => StorePrimitive::Upsert,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Insert { rows } | Self::Update { rows, .. } | Self::Upsert { rows, .. } => {
                rows.len()
            }
            Self::Delete { keys, .. } => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Issue `call` against `collection`. Deletes yield `None`, everything else
/// the rows the store returned.
pub async fn dispatch(
    store: &dyn RemoteStore,
    collection: &str,
    call: &StoreCall,
) -> Result<Option<Vec<Record>>, EngineError> {
    let rows = match call {
        StoreCall::Insert { rows } => store.insert(collection, rows).await?,
        StoreCall::Update {
            rows,
            match_columns,
        } => store.update(collection, rows, match_columns).await?,
        StoreCall::Delete { key_column, keys } => {
            store.delete(collection, key_column, keys).await?;
            return Ok(None);
        }
        StoreCall::Upsert {
            rows,
            conflict_columns,
        } => store.upsert(collection, rows, conflict_columns).await?,
    };
    Ok(Some(rows))
}
