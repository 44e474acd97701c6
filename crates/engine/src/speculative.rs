//! Speculative ("optimistic") cache edits.
//!
//! An edit runs in two phases around the store call. `prepare` writes the
//! predicted result into the cache before dispatch and returns a [`Rollback`]
//! saying what to do if the call fails; `commit` runs after success. The
//! engine never snapshots the cache on its own: an edit that wants exact undo
//! captures what it needs in `prepare` and hands it back as `Rollback::Undo`.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use cartsync_core::{CacheKey, KeySpec, Record};
use cartsync_storage::QueryCache;

use crate::request::{MutationRequest, Payload};

type UndoFn = Box<dyn FnOnce(&dyn QueryCache) + Send>;

/// Recovery chosen by an edit for a failed mutation.
pub enum Rollback {
    /// Run this against the cache on failure.
    Undo(UndoFn),
    /// Leave the speculative value in place; the next invalidation of the
    /// key resyncs it.
    RelyOnInvalidation,
}

impl Rollback {
    pub fn undo(f: impl FnOnce(&dyn QueryCache) + Send + 'static) -> Self {
        Self::Undo(Box::new(f))
    }

    pub fn has_undo(&self) -> bool {
        matches!(self, Self::Undo(_))
    }
}

impl fmt::Debug for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undo(_) => write!(f, "Rollback::Undo(..)"),
            Self::RelyOnInvalidation => write!(f, "Rollback::RelyOnInvalidation"),
        }
    }
}

pub trait SpeculativeEdit<P>: Send {
    /// Apply the predicted result for `request` to the entries at `keys`.
    fn prepare(
        &mut self,
        cache: &dyn QueryCache,
        keys: &[CacheKey],
        request: &MutationRequest<P>,
    ) -> Rollback;

    /// Called once the store accepted the mutation, before invalidation is
    /// observed by readers.
    fn commit(&mut self, _cache: &dyn QueryCache, _output: Option<&[Record]>) {}
}

/// Closure-backed edit; see [`from_fn`].
pub struct FnEdit<P, F> {
    f: F,
    _payload: PhantomData<fn(P)>,
}

/// Wrap a `prepare` closure as a [`SpeculativeEdit`].
pub fn from_fn<P, F>(f: F) -> FnEdit<P, F>
where
    F: FnMut(&dyn QueryCache, &[CacheKey], &MutationRequest<P>) -> Rollback + Send,
{
    FnEdit {
        f,
        _payload: PhantomData,
    }
}

impl<P, F> SpeculativeEdit<P> for FnEdit<P, F>
where
    F: FnMut(&dyn QueryCache, &[CacheKey], &MutationRequest<P>) -> Rollback + Send,
{
    fn prepare(
        &mut self,
        cache: &dyn QueryCache,
        keys: &[CacheKey],
        request: &MutationRequest<P>,
    ) -> Rollback {
        (self.f)(cache, keys, request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditKind {
    Append,
    Patch,
    Remove,
}

/// Stock edit over cached row lists, for callers who want the usual
/// "show it now" behaviour without writing their own.
#[derive(Debug, Clone)]
pub struct CacheEdit {
    kind: EditKind,
    key: Option<KeySpec>,
    restore_on_failure: bool,
}

impl CacheEdit {
    /// Append the payload rows to every cached entry.
    pub fn append() -> Self {
        Self::of(EditKind::Append)
    }

    /// Merge each payload row into the cached rows sharing its key.
    pub fn patch() -> Self {
        Self::of(EditKind::Patch)
    }

    /// Drop cached rows sharing a key with any payload row.
    pub fn remove() -> Self {
        Self::of(EditKind::Remove)
    }

    fn of(kind: EditKind) -> Self {
        Self {
            kind,
            key: None,
            restore_on_failure: false,
        }
    }

    /// Match cached rows on `key` instead of the request's key.
    pub fn keyed_by(mut self, key: impl Into<KeySpec>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Snapshot touched entries and put them back if the mutation fails.
    pub fn restore_on_failure(mut self) -> Self {
        self.restore_on_failure = true;
        self
    }

    fn apply(&self, rows: &mut Vec<Record>, items: &[Record], key: &KeySpec) {
        let same = |a: &Record, b: &Record| match (key.extract(a, 0), key.extract(b, 0)) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        };
        match self.kind {
            EditKind::Append => rows.extend(items.iter().cloned()),
            EditKind::Patch => {
                for item in items {
                    for row in rows.iter_mut().filter(|r| same(&**r, item)) {
                        row.merge(item);
                    }
                }
            }
            EditKind::Remove => rows.retain(|r| !items.iter().any(|item| same(r, item))),
        }
    }
}

impl<P: Payload> SpeculativeEdit<P> for CacheEdit {
    fn prepare(
        &mut self,
        cache: &dyn QueryCache,
        keys: &[CacheKey],
        request: &MutationRequest<P>,
    ) -> Rollback {
        let key = self
            .key
            .clone()
            .or_else(|| request.key_spec.clone())
            .unwrap_or_default();
        let mut snapshot = HashMap::new();
        for cache_key in keys {
            let Some(entry) = cache.get(cache_key) else {
                continue;
            };
            let mut rows = entry.rows.clone();
            self.apply(&mut rows, request.payload.items(), &key);
            if self.restore_on_failure {
                snapshot.insert(cache_key.clone(), entry.rows);
            }
            cache.set(cache_key, rows);
        }
        if !self.restore_on_failure {
            return Rollback::RelyOnInvalidation;
        }
        Rollback::undo(move |cache| {
            for (cache_key, rows) in snapshot {
                cache.set(&cache_key, rows);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartsync_core::Action;
    use cartsync_storage::MemoryCache;

    fn request(action: Action, payload: Vec<Record>) -> MutationRequest<Vec<Record>> {
        MutationRequest {
            action,
            payload,
            key_spec: None,
        }
    }

    fn ids(cache: &MemoryCache, key: &CacheKey) -> Vec<i64> {
        cache
            .get(key)
            .map(|e| e.rows.iter().filter_map(|r| r.get("id")?.as_integer()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn remove_drops_matching_rows_and_relies_on_invalidation() {
        let cache = MemoryCache::new();
        let key = CacheKey::collection("products");
        cache.set(&key, (1..=3).map(|i| Record::new().with("id", i)).collect());

        let mut edit = CacheEdit::remove();
        let rollback = edit.prepare(
            &cache,
            std::slice::from_ref(&key),
            &request(Action::Delete, vec![Record::new().with("id", 2)]),
        );

        assert!(!rollback.has_undo());
        assert_eq!(ids(&cache, &key), vec![1, 3]);
    }

    #[test]
    fn restore_on_failure_returns_working_undo() {
        let cache = MemoryCache::new();
        let key = CacheKey::collection("brands");
        cache.set(&key, vec![Record::new().with("id", 1).with("name", "Old")]);

        let mut edit = CacheEdit::patch().restore_on_failure();
        let rollback = edit.prepare(
            &cache,
            std::slice::from_ref(&key),
            &request(Action::Update, vec![Record::new().with("id", 1).with("name", "New")]),
        );
        assert_eq!(
            cache.get(&key).unwrap().rows[0].get("name").and_then(|v| v.as_text()),
            Some("New")
        );

        let Rollback::Undo(undo) = rollback else {
            panic!("expected undo");
        };
        undo(&cache);
        assert_eq!(
            cache.get(&key).unwrap().rows[0].get("name").and_then(|v| v.as_text()),
            Some("Old")
        );
    }

    #[test]
    fn absent_entries_are_left_alone() {
        let cache = MemoryCache::new();
        let key = CacheKey::collection("orders");
        let mut edit = CacheEdit::append();
        edit.prepare(
            &cache,
            std::slice::from_ref(&key),
            &request(Action::Create, vec![Record::new().with("id", 1)]),
        );
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn patch_matches_composite_keys() {
        let cache = MemoryCache::new();
        let key = CacheKey::new(["addresses", "user", "1"]);
        cache.set(
            &key,
            vec![
                Record::new().with("user_id", 1).with("kind", "home").with("city", "Oslo"),
                Record::new().with("user_id", 1).with("kind", "work").with("city", "Oslo"),
            ],
        );
        let key_spec = KeySpec::columns_of(["user_id", "kind"]).unwrap();
        let mut edit = CacheEdit::patch().keyed_by(key_spec);
        edit.prepare(
            &cache,
            std::slice::from_ref(&key),
            &request(
                Action::Update,
                vec![Record::new().with("user_id", 1).with("kind", "work").with("city", "Bergen")],
            ),
        );
        let rows = cache.get(&key).unwrap().rows;
        assert_eq!(rows[0].get("city").and_then(|v| v.as_text()), Some("Oslo"));
        assert_eq!(rows[1].get("city").and_then(|v| v.as_text()), Some("Bergen"));
    }
}
