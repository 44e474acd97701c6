use tracing::debug;

use cartsync_core::{Action, KeySpec, Record, StorePrimitive};
use cartsync_storage::RemoteStore;

use crate::dispatch::{StoreCall, dispatch};
use crate::error::EngineError;

/// Re-validate a key that may have been deserialized or hand-built.
pub(crate) fn normalize_key(key: &KeySpec) -> Result<KeySpec, EngineError> {
    Ok(KeySpec::columns_of(key.columns())?)
}

/// Resolve the column a delete is matched on, rejecting composite keys
/// before anything else is checked.
pub(crate) fn delete_column(key: &KeySpec) -> Result<String, EngineError> {
    key.single_column()
        .map(str::to_string)
        .ok_or_else(|| EngineError::UnsupportedCompositeDelete {
            columns: key.columns(),
        })
}

/// Translate one action on one record into exactly one store call.
pub fn plan_single(
    action: Action,
    payload: Record,
    key: &KeySpec,
) -> Result<StoreCall, EngineError> {
    let key = normalize_key(key)?;
    let rows = vec![payload];
    let call = match action.single_primitive() {
        StorePrimitive::Insert => StoreCall::Insert { rows },
        StorePrimitive::Update => {
            key.require_all(&rows)?;
            StoreCall::Update {
                rows,
                match_columns: key.columns(),
            }
        }
        StorePrimitive::Delete => {
            let key_column = delete_column(&key)?;
            let keys = key
                .extract_all(&rows)?
                .into_iter()
                .filter_map(|k| k.into_scalar())
                .collect();
            StoreCall::Delete { key_column, keys }
        }
        StorePrimitive::Upsert => StoreCall::Upsert {
            rows,
            conflict_columns: key.columns(),
        },
    };
    Ok(call)
}

/// Run one single-item mutation. No retries: the first store error is
/// returned as is.
pub async fn execute(
    store: &dyn RemoteStore,
    collection: &str,
    action: Action,
    payload: Record,
    key: &KeySpec,
) -> Result<Option<Vec<Record>>, EngineError> {
    let call = plan_single(action, payload, key)?;
    debug!(
        target: "cartsync::engine",
        collection,
        %action,
        primitive = call.primitive().as_str(),
        "single mutation"
    );
    dispatch(store, collection, &call).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartsync_core::FieldValue;

    #[test]
    fn update_matches_on_key_columns() {
        let call = plan_single(
            Action::Update,
            Record::new().with("id", 4).with("price", 10),
            &KeySpec::default(),
        )
        .unwrap();
        assert_eq!(
            call,
            StoreCall::Update {
                rows: vec![Record::new().with("id", 4).with("price", 10)],
                match_columns: vec!["id".into()],
            }
        );
    }

    #[test]
    fn update_without_key_fails_before_dispatch() {
        let err = plan_single(Action::Update, Record::new().with("price", 10), &KeySpec::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingKey { ref field, index: 0 } if field == "id"));
        assert!(err.is_pre_dispatch());
    }

    #[test]
    fn delete_extracts_scalar_key() {
        let record = Record::new().with("sku", "A-1");
        let call = plan_single(Action::Delete, record, &"sku".into()).unwrap();
        assert_eq!(
            call,
            StoreCall::Delete {
                key_column: "sku".into(),
                keys: vec![FieldValue::from("A-1")],
            }
        );
    }

    #[test]
    fn composite_delete_is_rejected() {
        let key = KeySpec::columns_of(["order_id", "line"]).unwrap();
        let record = Record::new().with("order_id", 1).with("line", 2);
        let err = plan_single(Action::Delete, record, &key).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedCompositeDelete { .. }));
    }

    #[test]
    fn upsert_and_create_tolerate_missing_key() {
        let unkeyed = || Record::new().with("name", "n");
        let call = plan_single(Action::Upsert, unkeyed(), &KeySpec::default()).unwrap();
        assert_eq!(call.primitive(), StorePrimitive::Upsert);
        let call = plan_single(Action::Create, unkeyed(), &KeySpec::default()).unwrap();
        assert_eq!(call.primitive(), StorePrimitive::Insert);
    }

    #[test]
    fn degenerate_composite_key_is_normalized() {
        let key = KeySpec::Composite(vec!["id".into()]);
        let call = plan_single(Action::Delete, Record::new().with("id", 1), &key).unwrap();
        assert_eq!(call.primitive(), StorePrimitive::Delete);
    }
}
