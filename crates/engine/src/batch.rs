//! Bulk mutations: one action applied to a list of records in a single store
//! call.
//!
//! The remote store's only bulk write-by-key primitive is replace-or-insert,
//! so a batch `update` is carried out as one upsert conflict-matched on the
//! key columns. Rows missing remotely are inserted rather than rejected.

use tracing::{debug, warn};

use cartsync_core::{Action, KeySpec, Record, StorePrimitive};
use cartsync_storage::RemoteStore;

use crate::dispatch::{StoreCall, dispatch};
use crate::error::EngineError;
use crate::executor::{delete_column, normalize_key};

/// Outcome of planning a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPlan {
    /// Empty input; nothing is sent.
    Noop,
    Call {
        call: StoreCall,
        /// Set when the call is an upsert standing in for an update.
        update_as_upsert: bool,
    },
}

impl BatchPlan {
    pub fn call(&self) -> Option<&StoreCall> {
        match self {
            Self::Noop => None,
            Self::Call { call, .. } => Some(call),
        }
    }
}

/// Validate `items` and translate the batch into at most one store call.
///
/// Every check happens here: a batch that fails planning is rejected whole
/// and nothing reaches the store.
pub fn plan_batch(
    action: Action,
    items: Vec<Record>,
    key: &KeySpec,
) -> Result<BatchPlan, EngineError> {
    if items.is_empty() {
        return Ok(BatchPlan::Noop);
    }
    let key = normalize_key(key)?;

    let primitive = action.batch_primitive();
    // Composite delete is a property of the request, reported before any
    // per-item key problem.
    if primitive == StorePrimitive::Delete {
        delete_column(&key)?;
    }
    if action.requires_key(true) {
        key.require_all(&items)?;
    }

    let call = match primitive {
        StorePrimitive::Insert => StoreCall::Insert { rows: items },
        StorePrimitive::Upsert => StoreCall::Upsert {
            rows: items,
            conflict_columns: key.columns(),
        },
        StorePrimitive::Delete => {
            let key_column = delete_column(&key)?;
            let keys = key
                .extract_all(&items)?
                .into_iter()
                .filter_map(|k| k.into_scalar())
                .collect();
            StoreCall::Delete { key_column, keys }
        }
        // the batch table never yields Update
        StorePrimitive::Update => StoreCall::Update {
            rows: items,
            match_columns: key.columns(),
        },
    };
    Ok(BatchPlan::Call {
        call,
        update_as_upsert: action == Action::Update,
    })
}

/// Dispatch a planned batch. `Noop` resolves to `None` without touching the
/// store.
pub async fn dispatch_batch(
    store: &dyn RemoteStore,
    collection: &str,
    plan: &BatchPlan,
    warn_on_update_as_upsert: bool,
) -> Result<Option<Vec<Record>>, EngineError> {
    let (call, update_as_upsert) = match plan {
        BatchPlan::Noop => {
            debug!(target: "cartsync::engine", collection, "empty batch, nothing to send");
            return Ok(None);
        }
        BatchPlan::Call {
            call,
            update_as_upsert,
        } => (call, *update_as_upsert),
    };
    if update_as_upsert {
        if warn_on_update_as_upsert {
            warn!(
                target: "cartsync::engine",
                collection,
                rows = call.len(),
                "batch update sent as upsert; rows missing remotely will be inserted"
            );
        } else {
            debug!(
                target: "cartsync::engine",
                collection,
                rows = call.len(),
                "batch update sent as upsert"
            );
        }
    }
    debug!(
        target: "cartsync::engine",
        collection,
        primitive = call.primitive().as_str(),
        items = call.len(),
        "batch mutation"
    );
    dispatch(store, collection, call).await
}

/// Plan and run one batch mutation.
pub async fn execute_batch(
    store: &dyn RemoteStore,
    collection: &str,
    action: Action,
    items: Vec<Record>,
    key: Option<&KeySpec>,
) -> Result<Option<Vec<Record>>, EngineError> {
    let default_key = KeySpec::default();
    let plan = plan_batch(action, items, key.unwrap_or(&default_key))?;
    dispatch_batch(store, collection, &plan, true).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartsync_core::FieldValue;

    fn rows(ids: &[i64]) -> Vec<Record> {
        ids.iter().map(|&id| Record::new().with("id", id)).collect()
    }

    #[test]
    fn empty_batch_plans_nothing_for_every_action() {
        for action in Action::ALL {
            let plan = plan_batch(action, vec![], &KeySpec::default()).unwrap();
            assert_eq!(plan, BatchPlan::Noop);
        }
    }

    #[test]
    fn empty_batch_skips_key_validation() {
        let degenerate = KeySpec::Composite(vec![]);
        for action in Action::ALL {
            let plan = plan_batch(action, vec![], &degenerate).unwrap();
            assert_eq!(plan, BatchPlan::Noop, "{action}");
        }
        let err = plan_batch(Action::Delete, rows(&[1]), &degenerate).unwrap_err();
        assert!(matches!(err, EngineError::InvalidKeySpec(_)));
    }

    #[test]
    fn update_plans_as_upsert_on_key_columns() {
        let items = vec![
            Record::new().with("id", 1).with("name", "A"),
            Record::new().with("id", 2).with("name", "B"),
        ];
        let plan = plan_batch(Action::Update, items.clone(), &KeySpec::default()).unwrap();
        assert_eq!(
            plan,
            BatchPlan::Call {
                call: StoreCall::Upsert {
                    rows: items,
                    conflict_columns: vec!["id".into()],
                },
                update_as_upsert: true,
            }
        );
    }

    #[test]
    fn delete_collects_keys_in_order() {
        let plan = plan_batch(Action::Delete, rows(&[7, 9]), &KeySpec::default()).unwrap();
        assert_eq!(
            plan.call(),
            Some(&StoreCall::Delete {
                key_column: "id".into(),
                keys: vec![FieldValue::Integer(7), FieldValue::Integer(9)],
            })
        );
    }

    #[test]
    fn composite_delete_wins_over_missing_key() {
        let key = KeySpec::columns_of(["tenant_id", "id"]).unwrap();
        let err = plan_batch(Action::Delete, rows(&[1]), &key).unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnsupportedCompositeDelete { ref columns } if columns.len() == 2
        ));
    }

    #[test]
    fn any_item_without_key_rejects_the_batch() {
        let mut items = rows(&[1, 2]);
        items.push(Record::new().with("name", "no id"));
        for action in [Action::Update, Action::Delete, Action::Upsert] {
            let err = plan_batch(action, items.clone(), &KeySpec::default()).unwrap_err();
            assert!(matches!(err, EngineError::MissingKey { index: 2, .. }), "{action}");
        }
    }

    #[test]
    fn insert_needs_no_key() {
        let items = vec![Record::new().with("name", "x")];
        let plan = plan_batch(Action::Create, items, &KeySpec::default()).unwrap();
        assert_eq!(plan.call().map(StoreCall::primitive), Some(StorePrimitive::Insert));
    }
}
