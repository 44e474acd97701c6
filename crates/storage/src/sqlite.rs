use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

use cartsync_core::{FieldValue, Record};

use crate::error::StoreError;
use crate::traits::RemoteStore;

/// Server-side column conventions of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Auto-assigned integer column, unique per collection.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default = "default_created_at")]
    pub created_at_field: Option<String>,
    #[serde(default = "default_updated_at")]
    pub updated_at_field: Option<String>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_created_at() -> Option<String> {
    Some("created_at".to_string())
}

fn default_updated_at() -> Option<String> {
    Some("updated_at".to_string())
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            primary_key: default_primary_key(),
            created_at_field: default_created_at(),
            updated_at_field: default_updated_at(),
        }
    }
}

struct StoredRow {
    rowid: i64,
    record: Record,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn encode(record: &Record) -> Result<Vec<u8>, StoreError> {
    rmp_serde::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Record, StoreError> {
    rmp_serde::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// A row matches when every listed column is present in `probe` and equal.
fn matches(stored: &Record, probe: &Record, columns: &[String]) -> bool {
    columns.iter().all(|c| match probe.present(c) {
        Some(v) => stored.get(c) == Some(v),
        None => false,
    })
}

/// Remote store backed by one SQLite database. Every call runs in its own
/// transaction, so a rejected batch leaves no partial writes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: StoreConfig,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: StoreConfig::default(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: StoreConfig::default(),
        })
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn load(tx: &Transaction<'_>, collection: &str) -> Result<Vec<StoredRow>, StoreError> {
        let mut stmt =
            tx.prepare("SELECT rowid, body FROM records WHERE collection = ?1 ORDER BY rowid")?;
        let raw: Vec<(i64, Vec<u8>)> = stmt
            .query_map(rusqlite::params![collection], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(|(rowid, body)| {
                Ok(StoredRow {
                    rowid,
                    record: decode(&body)?,
                })
            })
            .collect()
    }

    fn next_id(tx: &Transaction<'_>, collection: &str) -> Result<i64, StoreError> {
        tx.execute(
            "INSERT OR IGNORE INTO collections (name) VALUES (?1)",
            rusqlite::params![collection],
        )?;
        let id: i64 = tx.query_row(
            "SELECT next_id FROM collections WHERE name = ?1",
            rusqlite::params![collection],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE collections SET next_id = ?2 WHERE name = ?1",
            rusqlite::params![collection, id.saturating_add(1)],
        )?;
        Ok(id)
    }

    /// Keep auto-assigned ids ahead of an explicitly supplied one.
    fn reserve_id(tx: &Transaction<'_>, collection: &str, id: i64) -> Result<(), StoreError> {
        tx.execute(
            "INSERT OR IGNORE INTO collections (name) VALUES (?1)",
            rusqlite::params![collection],
        )?;
        tx.execute(
            "UPDATE collections SET next_id = MAX(next_id, ?2) WHERE name = ?1",
            rusqlite::params![collection, id.saturating_add(1)],
        )?;
        Ok(())
    }

    fn insert_row(
        &self,
        tx: &Transaction<'_>,
        collection: &str,
        existing: &mut Vec<StoredRow>,
        mut row: Record,
        now: i64,
    ) -> Result<Record, StoreError> {
        let pk = self.config.primary_key.as_str();
        let value = match row.present(pk).cloned() {
            Some(value) => value,
            None => {
                let id = FieldValue::Integer(Self::next_id(tx, collection)?);
                row.set(pk, id.clone());
                id
            }
        };
        // generated ids collide too once the sequence is pinned at i64::MAX
        if existing.iter().any(|s| s.record.get(pk) == Some(&value)) {
            return Err(StoreError::UniqueViolation {
                collection: collection.to_string(),
                detail: format!("{pk}={value}"),
            });
        }
        if let Some(n) = value.as_integer() {
            Self::reserve_id(tx, collection, n)?;
        }
        if let Some(field) = &self.config.created_at_field
            && row.present(field).is_none()
        {
            row.set(field, FieldValue::Timestamp(now));
        }
        tx.execute(
            "INSERT INTO records (collection, body) VALUES (?1, ?2)",
            rusqlite::params![collection, encode(&row)?],
        )?;
        existing.push(StoredRow {
            rowid: tx.last_insert_rowid(),
            record: row.clone(),
        });
        Ok(row)
    }

    /// Patch every stored row matching `row` on `columns`; returns the
    /// patched rows, empty if nothing matched.
    fn patch_matching(
        &self,
        tx: &Transaction<'_>,
        existing: &mut [StoredRow],
        row: &Record,
        columns: &[String],
        now: i64,
    ) -> Result<Vec<Record>, StoreError> {
        let mut patched = Vec::new();
        for stored in existing.iter_mut().filter(|s| matches(&s.record, row, columns)) {
            stored.record.merge(row);
            if let Some(field) = &self.config.updated_at_field {
                stored.record.set(field, FieldValue::Timestamp(now));
            }
            tx.execute(
                "UPDATE records SET body = ?1 WHERE rowid = ?2",
                rusqlite::params![encode(&stored.record)?, stored.rowid],
            )?;
            patched.push(stored.record.clone());
        }
        Ok(patched)
    }
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn insert(&self, collection: &str, rows: &[Record]) -> Result<Vec<Record>, StoreError> {
        debug!(target: "cartsync::store", collection, rows = rows.len(), "insert");
        let now = now_ms();
        self.with_tx(|tx| {
            let mut existing = Self::load(tx, collection)?;
            rows.iter()
                .map(|row| self.insert_row(tx, collection, &mut existing, row.clone(), now))
                .collect()
        })
    }

    async fn update(
        &self,
        collection: &str,
        rows: &[Record],
        match_columns: &[String],
    ) -> Result<Vec<Record>, StoreError> {
        debug!(target: "cartsync::store", collection, rows = rows.len(), ?match_columns, "update");
        let now = now_ms();
        self.with_tx(|tx| {
            let mut existing = Self::load(tx, collection)?;
            let mut updated = Vec::new();
            for row in rows {
                let patched = self.patch_matching(tx, &mut existing, row, match_columns, now)?;
                if patched.is_empty() {
                    return Err(StoreError::NotFound {
                        collection: collection.to_string(),
                        columns: match_columns.to_vec(),
                    });
                }
                updated.extend(patched);
            }
            Ok(updated)
        })
    }

    async fn delete(
        &self,
        collection: &str,
        key_column: &str,
        keys: &[FieldValue],
    ) -> Result<(), StoreError> {
        debug!(target: "cartsync::store", collection, key_column, keys = keys.len(), "delete");
        self.with_tx(|tx| {
            let existing = Self::load(tx, collection)?;
            let mut removed = 0usize;
            for stored in &existing {
                if stored.record.get(key_column).is_some_and(|v| keys.contains(v)) {
                    tx.execute(
                        "DELETE FROM records WHERE rowid = ?1",
                        rusqlite::params![stored.rowid],
                    )?;
                    removed += 1;
                }
            }
            debug!(target: "cartsync::store", collection, removed, "delete applied");
            Ok(())
        })
    }

    async fn upsert(
        &self,
        collection: &str,
        rows: &[Record],
        conflict_columns: &[String],
    ) -> Result<Vec<Record>, StoreError> {
        debug!(
            target: "cartsync::store",
            collection,
            rows = rows.len(),
            ?conflict_columns,
            "upsert"
        );
        let now = now_ms();
        self.with_tx(|tx| {
            let mut existing = Self::load(tx, collection)?;
            let mut out = Vec::new();
            for row in rows {
                let patched = self.patch_matching(tx, &mut existing, row, conflict_columns, now)?;
                if patched.is_empty() {
                    out.push(self.insert_row(tx, collection, &mut existing, row.clone(), now)?);
                } else {
                    out.extend(patched);
                }
            }
            Ok(out)
        })
    }

    async fn select(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.with_tx(|tx| {
            Ok(Self::load(tx, collection)?
                .into_iter()
                .map(|s| s.record)
                .collect())
        })
    }
}
