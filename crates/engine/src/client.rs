use std::sync::Arc;

use tracing::{Instrument, debug, info, info_span, trace, warn};

use cartsync_core::{CacheKey, KeySpec, MutationId, Record};
use cartsync_storage::{QueryCache, RemoteStore};

use crate::batch::{BatchPlan, dispatch_batch, plan_batch};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::executor::plan_single;
use crate::request::{MutationOptions, MutationRequest, MutationResult, Payload};
use crate::speculative::Rollback;

/// Lifecycle of one mutation. There are no retries, so the path only moves
/// forward: `Idle → Dispatching → {Succeeded, Failed} → Settled`, with
/// `Idle → Failed` for requests rejected before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    Dispatching,
    Succeeded,
    Failed,
    Settled,
}

impl MutationPhase {
    pub fn can_advance_to(self, next: MutationPhase) -> bool {
        use MutationPhase::*;
        matches!(
            (self, next),
            (Idle, Dispatching)
                | (Idle, Failed)
                | (Dispatching, Succeeded)
                | (Dispatching, Failed)
                | (Succeeded, Settled)
                | (Failed, Settled)
        )
    }

    /// The next phase, or `None` if `next` is not reachable from `self`.
    pub fn advance(self, next: MutationPhase) -> Option<MutationPhase> {
        self.can_advance_to(next).then_some(next)
    }
}

struct Tracker {
    id: MutationId,
    phase: MutationPhase,
}

impl Tracker {
    fn enter(&mut self, next: MutationPhase) {
        match self.phase.advance(next) {
            Some(phase) => {
                trace!(
                    target: "cartsync::engine",
                    id = %self.id,
                    from = ?self.phase,
                    to = ?phase,
                    "phase"
                );
                self.phase = phase;
            }
            None => {
                debug_assert!(false, "illegal transition {:?} -> {:?}", self.phase, next);
                warn!(
                    target: "cartsync::engine",
                    id = %self.id,
                    from = ?self.phase,
                    to = ?next,
                    "illegal phase transition ignored"
                );
            }
        }
    }
}

/// Keys whose prefix invalidation reaches every entry `keys` names, with
/// nested and repeated keys dropped, so no entry is marked stale twice.
fn covering_keys(keys: &[CacheKey]) -> Vec<CacheKey> {
    let mut covering: Vec<CacheKey> = Vec::with_capacity(keys.len());
    for key in keys {
        if covering.iter().any(|k| k.is_prefix_of(key)) {
            continue;
        }
        covering.retain(|k| !key.is_prefix_of(k));
        covering.push(key.clone());
    }
    covering
}

/// Runs mutations against a remote store and keeps a query cache in step.
///
/// Cheap to clone; clones share the store and cache. Mutations are not
/// ordered against each other: two in flight on the same record race at the
/// store, and each caller learns the outcome only from its own result.
#[derive(Clone)]
pub struct MutationClient {
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn QueryCache>,
    config: EngineConfig,
}

impl MutationClient {
    pub fn new(store: Arc<dyn RemoteStore>, cache: Arc<dyn QueryCache>) -> Self {
        Self {
            store,
            cache,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        &self.cache
    }

    /// Single-item mutation.
    pub async fn mutate(
        &self,
        collection: &str,
        mut options: MutationOptions<Record>,
    ) -> MutationResult {
        let key = self.resolve_key(&mut options.request);
        let request = &options.request;
        let plan = plan_single(request.action, request.payload.clone(), &key).map(|call| {
            BatchPlan::Call {
                call,
                update_as_upsert: false,
            }
        });
        self.run(collection, options, plan).await
    }

    /// Batch mutation; an empty list resolves to `None` without contacting
    /// the store or touching the cache.
    pub async fn mutate_batch(
        &self,
        collection: &str,
        mut options: MutationOptions<Vec<Record>>,
    ) -> MutationResult {
        let key = self.resolve_key(&mut options.request);
        let request = &options.request;
        let plan = plan_batch(request.action, request.payload.clone(), &key);
        self.run(collection, options, plan).await
    }

    /// Pin the key in effect onto the request so speculative edits match on
    /// the same columns the planner used.
    fn resolve_key<P>(&self, request: &mut MutationRequest<P>) -> KeySpec {
        request
            .key_spec
            .get_or_insert_with(|| self.config.default_key_spec())
            .clone()
    }

    async fn run<P: Payload>(
        &self,
        collection: &str,
        options: MutationOptions<P>,
        plan: Result<BatchPlan, EngineError>,
    ) -> MutationResult {
        let MutationOptions {
            request,
            mut speculative,
            invalidate_keys,
            on_success,
            on_error,
            on_settled,
        } = options;
        let mut tracker = Tracker {
            id: MutationId::new(),
            phase: MutationPhase::Idle,
        };
        let span = info_span!(
            target: "cartsync::engine",
            "mutation",
            id = %tracker.id,
            collection,
            action = %request.action,
            items = request.payload.items().len(),
        );

        async move {
            let plan = match plan {
                Ok(plan) => plan,
                Err(err) => {
                    warn!(target: "cartsync::engine", error = %err, "rejected before dispatch");
                    tracker.enter(MutationPhase::Failed);
                    if let Some(f) = on_error {
                        f(&err);
                    }
                    let result = Err(err);
                    tracker.enter(MutationPhase::Settled);
                    if let Some(f) = on_settled {
                        f(&result);
                    }
                    return result;
                }
            };

            let keys: Vec<CacheKey> =
                invalidate_keys.unwrap_or_else(|| vec![self.config.default_cache_key(collection)]);
            let cache = self.cache.as_ref();
            let noop = plan == BatchPlan::Noop;

            let rollback = match speculative.as_mut() {
                Some(edit) if !noop => {
                    if self.config.cancel_in_flight_on_speculation {
                        for key in &keys {
                            cache.cancel_in_flight(key);
                        }
                    }
                    let rollback = edit.prepare(cache, &keys, &request);
                    debug!(
                        target: "cartsync::engine",
                        undo = rollback.has_undo(),
                        "speculative edit applied"
                    );
                    Some(rollback)
                }
                _ => None,
            };

            tracker.enter(MutationPhase::Dispatching);
            let result = dispatch_batch(
                self.store.as_ref(),
                collection,
                &plan,
                self.config.warn_on_update_as_upsert,
            )
            .await;

            match &result {
                Ok(output) => {
                    tracker.enter(MutationPhase::Succeeded);
                    if let Some(edit) = speculative.as_mut()
                        && rollback.is_some()
                    {
                        edit.commit(cache, output.as_deref());
                    }
                    let invalidated = if noop { Vec::new() } else { covering_keys(&keys) };
                    for key in &invalidated {
                        cache.invalidate(key);
                    }
                    info!(
                        target: "cartsync::engine",
                        rows = output.as_ref().map_or(0, Vec::len),
                        invalidated = invalidated.len(),
                        "mutation succeeded"
                    );
                    if let Some(f) = on_success {
                        f(output.as_deref());
                    }
                }
                Err(err) => {
                    tracker.enter(MutationPhase::Failed);
                    warn!(
                        target: "cartsync::engine",
                        code = err.store_code().unwrap_or("-"),
                        error = %err,
                        "mutation failed"
                    );
                    match rollback {
                        Some(Rollback::Undo(undo)) => {
                            undo(cache);
                            debug!(target: "cartsync::engine", "speculative edit undone");
                        }
                        Some(Rollback::RelyOnInvalidation) => {
                            debug!(
                                target: "cartsync::engine",
                                "speculative edit kept until next invalidation"
                            );
                        }
                        None => {}
                    }
                    if let Some(f) = on_error {
                        f(err);
                    }
                }
            }

            tracker.enter(MutationPhase::Settled);
            if let Some(f) = on_settled {
                f(&result);
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::MutationPhase::*;
    use super::*;

    #[test]
    fn phases_only_move_forward() {
        assert_eq!(Idle.advance(Dispatching), Some(Dispatching));
        assert_eq!(Dispatching.advance(Failed), Some(Failed));
        assert_eq!(Failed.advance(Settled), Some(Settled));
        assert_eq!(Idle.advance(Failed), Some(Failed));
        assert_eq!(Failed.advance(Dispatching), None);
        assert_eq!(Settled.advance(Dispatching), None);
        assert_eq!(Idle.advance(Succeeded), None);
        assert_eq!(Succeeded.advance(Failed), None);
    }

    #[test]
    fn covering_keys_drops_nested_and_repeated() {
        let products = CacheKey::collection("products");
        let list = products.child("list");
        let brands = CacheKey::collection("brands");
        assert_eq!(
            covering_keys(&[list.clone(), brands.clone(), products.clone(), list.clone()]),
            vec![brands.clone(), products.clone()]
        );
        assert_eq!(covering_keys(&[list.clone(), list.clone()]), vec![list]);
        assert!(covering_keys(&[]).is_empty());
    }
}
