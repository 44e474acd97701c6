use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::record::Record;

pub const DEFAULT_KEY_FIELD: &str = "id";

/// Column(s) used to match existing remote records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    Single(String),
    /// Ordered, always two or more columns.
    Composite(Vec<String>),
}

impl Default for KeySpec {
    fn default() -> Self {
        Self::Single(DEFAULT_KEY_FIELD.to_string())
    }
}

impl From<&str> for KeySpec {
    fn from(field: &str) -> Self {
        Self::Single(field.to_string())
    }
}

impl From<String> for KeySpec {
    fn from(field: String) -> Self {
        Self::Single(field)
    }
}

/// Extracted key of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
    Scalar(FieldValue),
    Tuple(Vec<FieldValue>),
}

impl KeyValue {
    pub fn into_scalar(self) -> Option<FieldValue> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Tuple(_) => None,
        }
    }
}

impl KeySpec {
    /// Build a key from an ordered column list. A single column collapses to
    /// `Single`; an empty list or a repeated column is rejected.
    pub fn columns_of<I, S>(columns: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        for (i, column) in columns.iter().enumerate() {
            if column.is_empty() {
                return Err(CoreError::InvalidKeySpec("empty column name".into()));
            }
            if columns[..i].contains(column) {
                return Err(CoreError::InvalidKeySpec(format!("duplicate column `{column}`")));
            }
        }
        match columns.len() {
            0 => Err(CoreError::InvalidKeySpec("no key columns".into())),
            1 => Ok(Self::Single(columns.remove(0))),
            _ => Ok(Self::Composite(columns)),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }

    /// Column names for `matchColumns` / `conflictColumns`.
    pub fn columns(&self) -> Vec<String> {
        match self {
            Self::Single(c) => vec![c.clone()],
            Self::Composite(cs) => cs.clone(),
        }
    }

    /// The sole column of a single-field key.
    pub fn single_column(&self) -> Option<&str> {
        match self {
            Self::Single(c) => Some(c),
            Self::Composite(_) => None,
        }
    }

    pub fn extract(&self, record: &Record, index: usize) -> Result<KeyValue, CoreError> {
        let take = |field: &str| {
            record
                .present(field)
                .cloned()
                .ok_or_else(|| CoreError::MissingKey {
                    field: field.to_string(),
                    index,
                })
        };
        match self {
            Self::Single(c) => Ok(KeyValue::Scalar(take(c)?)),
            Self::Composite(cs) => cs
                .iter()
                .map(|c| take(c))
                .collect::<Result<Vec<_>, _>>()
                .map(KeyValue::Tuple),
        }
    }

    /// Extract every record's key, failing on the first record that lacks one.
    pub fn extract_all(&self, records: &[Record]) -> Result<Vec<KeyValue>, CoreError> {
        records
            .iter()
            .enumerate()
            .map(|(i, r)| self.extract(r, i))
            .collect()
    }

    /// Check that every record carries every key field.
    pub fn require_all(&self, records: &[Record]) -> Result<(), CoreError> {
        for (index, record) in records.iter().enumerate() {
            for field in self.columns() {
                if record.present(&field).is_none() {
                    return Err(CoreError::MissingKey { field, index });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_is_id() {
        assert_eq!(KeySpec::default(), KeySpec::Single("id".into()));
        assert_eq!(KeySpec::default().columns(), vec!["id".to_string()]);
    }

    #[test]
    fn one_column_list_collapses_to_single() {
        let spec = KeySpec::columns_of(["sku"]).unwrap();
        assert_eq!(spec, KeySpec::Single("sku".into()));
        assert!(!spec.is_composite());
    }

    #[test]
    fn rejects_empty_and_duplicate_columns() {
        assert!(matches!(
            KeySpec::columns_of(Vec::<String>::new()),
            Err(CoreError::InvalidKeySpec(_))
        ));
        assert!(matches!(
            KeySpec::columns_of(["id", "id"]),
            Err(CoreError::InvalidKeySpec(_))
        ));
    }

    #[test]
    fn composite_extraction_yields_ordered_tuple() {
        let spec = KeySpec::columns_of(["tenant_id", "id"]).unwrap();
        let record = Record::new().with("id", 9).with("tenant_id", 2).with("name", "x");
        assert_eq!(
            spec.extract(&record, 0).unwrap(),
            KeyValue::Tuple(vec![FieldValue::Integer(2), FieldValue::Integer(9)])
        );
    }

    #[test]
    fn missing_key_names_field_and_index() {
        let spec = KeySpec::columns_of(["tenant_id", "id"]).unwrap();
        let records = vec![
            Record::new().with("tenant_id", 1).with("id", 1),
            Record::new().with("tenant_id", 1).with("id", FieldValue::Null),
        ];
        let err = spec.extract_all(&records).unwrap_err();
        assert_eq!(
            err,
            CoreError::MissingKey {
                field: "id".into(),
                index: 1
            }
        );
        assert_eq!(spec.require_all(&records).unwrap_err(), err);
    }

    #[test]
    fn deserializes_from_string_or_list() {
        let single: KeySpec = serde_json::from_str(r#""sku""#).unwrap();
        assert_eq!(single, KeySpec::Single("sku".into()));
        let composite: KeySpec = serde_json::from_str(r#"["order_id","line"]"#).unwrap();
        assert_eq!(composite.columns(), vec!["order_id".to_string(), "line".to_string()]);
    }
}
