use cartsync_core::{Action, CacheKey, KeySpec, Record};

use crate::error::EngineError;
use crate::speculative::SpeculativeEdit;

/// Rows returned by the store; `None` for deletes and empty batches.
pub type MutationOutput = Option<Vec<Record>>;
pub type MutationResult = Result<MutationOutput, EngineError>;

/// Payload shape of a request: one record or a list of them.
pub trait Payload: Send + Sync + 'static {
    fn items(&self) -> &[Record];
}

impl Payload for Record {
    fn items(&self) -> &[Record] {
        std::slice::from_ref(self)
    }
}

impl Payload for Vec<Record> {
    fn items(&self) -> &[Record] {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest<P> {
    pub action: Action,
    pub payload: P,
    /// Overrides the configured default key column. `MutationClient` fills
    /// this in with the key in effect before planning.
    pub key_spec: Option<KeySpec>,
}

type SuccessFn = Box<dyn FnOnce(Option<&[Record]>) + Send>;
type ErrorFn = Box<dyn FnOnce(&EngineError) + Send>;
type SettledFn = Box<dyn FnOnce(&MutationResult) + Send>;

/// A request plus everything the coordinator does around it.
pub struct MutationOptions<P> {
    pub request: MutationRequest<P>,
    pub(crate) speculative: Option<Box<dyn SpeculativeEdit<P>>>,
    pub(crate) invalidate_keys: Option<Vec<CacheKey>>,
    pub(crate) on_success: Option<SuccessFn>,
    pub(crate) on_error: Option<ErrorFn>,
    pub(crate) on_settled: Option<SettledFn>,
}

impl<P: Payload> MutationOptions<P> {
    pub fn new(action: Action, payload: P) -> Self {
        Self {
            request: MutationRequest {
                action,
                payload,
                key_spec: None,
            },
            speculative: None,
            invalidate_keys: None,
            on_success: None,
            on_error: None,
            on_settled: None,
        }
    }

    pub fn key_spec(mut self, key: impl Into<KeySpec>) -> Self {
        self.request.key_spec = Some(key.into());
        self
    }

    /// Keys to mark stale on success, replacing the collection default.
    pub fn invalidate<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = CacheKey>,
    {
        self.invalidate_keys = Some(keys.into_iter().collect());
        self
    }

    pub fn speculative(mut self, edit: impl SpeculativeEdit<P> + 'static) -> Self {
        self.speculative = Some(Box::new(edit));
        self
    }

    pub fn on_success(mut self, f: impl FnOnce(Option<&[Record]>) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&EngineError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_settled(mut self, f: impl FnOnce(&MutationResult) + Send + 'static) -> Self {
        self.on_settled = Some(Box::new(f));
        self
    }
}
