use thiserror::Error;

pub const CODE_NOT_FOUND: &str = "PGRST116";
pub const CODE_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("no rows in {collection} matched {columns:?}")]
    NotFound {
        collection: String,
        columns: Vec<String>,
    },

    #[error("duplicate key in {collection}: {detail}")]
    UniqueViolation { collection: String, detail: String },

    /// Failure reported by a remote backend in its own terms.
    #[error("{message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },
}

impl StoreError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Machine-readable code, where one is known.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Sqlite(_) => Some("sqlite"),
            Self::Serialization(_) => Some("serialization"),
            Self::NotFound { .. } => Some(CODE_NOT_FOUND),
            Self::UniqueViolation { .. } => Some(CODE_UNIQUE_VIOLATION),
            Self::Rejected { code, .. } => code.as_deref(),
        }
    }
}
