use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("item {index} is missing key field `{field}`")]
    MissingKey { field: String, index: usize },

    #[error("invalid key specification: {0}")]
    InvalidKeySpec(String),

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
}
