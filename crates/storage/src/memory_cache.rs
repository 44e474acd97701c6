use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use cartsync_core::{CacheKey, Record};

use crate::traits::{CacheEntry, QueryCache};

/// Handle for a read started with [`MemoryCache::begin_fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: CacheKey,
    generation: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Per-entry count of times it was marked stale.
    stale_marks: HashMap<CacheKey, usize>,
    /// Every key passed to `invalidate`, in call order.
    invalidations: Vec<CacheKey>,
    in_flight: HashMap<CacheKey, u64>,
    next_generation: u64,
}

/// In-memory [`QueryCache`] with an invalidation log.
#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<CacheState>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stale(&self, key: &CacheKey) -> Option<bool> {
        self.state.lock().entries.get(key).map(|e| e.stale)
    }

    /// Times the entry at `key` has been marked stale.
    pub fn stale_marks(&self, key: &CacheKey) -> usize {
        self.state.lock().stale_marks.get(key).copied().unwrap_or(0)
    }

    pub fn invalidations(&self) -> Vec<CacheKey> {
        self.state.lock().invalidations.clone()
    }

    /// Register a read for `key`; its result only lands if no cancel
    /// arrives in between.
    pub fn begin_fetch(&self, key: &CacheKey) -> FetchTicket {
        let mut state = self.state.lock();
        state.next_generation += 1;
        let generation = state.next_generation;
        state.in_flight.insert(key.clone(), generation);
        FetchTicket {
            key: key.clone(),
            generation,
        }
    }

    /// Store a fetched result. Returns false, leaving the entry untouched,
    /// when the fetch was cancelled or superseded.
    pub fn complete_fetch(&self, ticket: FetchTicket, rows: Vec<Record>) -> bool {
        let mut state = self.state.lock();
        if state.in_flight.get(&ticket.key) != Some(&ticket.generation) {
            trace!(target: "cartsync::cache", key = %ticket.key, "discarding cancelled fetch");
            return false;
        }
        state.in_flight.remove(&ticket.key);
        state
            .entries
            .insert(ticket.key, CacheEntry { rows, stale: false });
        true
    }

    pub fn has_fetch_in_flight(&self, key: &CacheKey) -> bool {
        self.state.lock().in_flight.contains_key(key)
    }
}

impl QueryCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).cloned()
    }

    fn set(&self, key: &CacheKey, rows: Vec<Record>) {
        self.state
            .lock()
            .entries
            .insert(key.clone(), CacheEntry { rows, stale: false });
    }

    fn invalidate(&self, key: &CacheKey) {
        let mut state = self.state.lock();
        let CacheState {
            entries,
            stale_marks,
            invalidations,
            ..
        } = &mut *state;
        invalidations.push(key.clone());
        let mut marked = 0usize;
        for (entry_key, entry) in entries.iter_mut() {
            if key.is_prefix_of(entry_key) {
                entry.stale = true;
                *stale_marks.entry(entry_key.clone()).or_default() += 1;
                marked += 1;
            }
        }
        trace!(target: "cartsync::cache", key = %key, marked, "invalidated");
    }

    fn cancel_in_flight(&self, key: &CacheKey) {
        let mut state = self.state.lock();
        state.in_flight.retain(|k, _| !key.is_prefix_of(k));
    }
}
