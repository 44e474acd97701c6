use cartsync_core::CoreError;
use cartsync_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("item {index} is missing key field `{field}`")]
    MissingKey { field: String, index: usize },

    #[error("delete needs a single-column key, got composite {columns:?}")]
    UnsupportedCompositeDelete { columns: Vec<String> },

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("invalid key specification: {0}")]
    InvalidKeySpec(String),

    #[error("invalid config: {0}")]
    Config(String),
}

impl EngineError {
    /// Errors raised while planning, before the store is contacted.
    pub fn is_pre_dispatch(&self) -> bool {
        !matches!(self, Self::Store(_))
    }

    /// Store-provided machine code, for store failures.
    pub fn store_code(&self) -> Option<&str> {
        match self {
            Self::Store(e) => e.code(),
            _ => None,
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingKey { field, index } => Self::MissingKey { field, index },
            CoreError::InvalidKeySpec(msg) => Self::InvalidKeySpec(msg),
            CoreError::UnsupportedAction(tag) => Self::UnsupportedAction(tag),
        }
    }
}
