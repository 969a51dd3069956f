//! Error types for ledger storage.

use batpoints_core::LedgerError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Record already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Conflicting identifier.
        id: String,
    },

    /// Not enough spendable points.
    #[error("insufficient balance: available={available}, required={required}")]
    InsufficientBalance {
        /// Points available to spend.
        available: i64,
        /// Points required.
        required: i64,
    },

    /// Tipped content item is not registered.
    #[error("content not found: {content_id}")]
    ContentNotFound {
        /// The missing content item.
        content_id: String,
    },

    /// Per-user conversion limit reached.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// A lock stripe could not be acquired in time.
    #[error("lock timeout on {key}")]
    LockTimeout {
        /// Key whose stripe was contended.
        key: String,
    },

    /// A stored record violates a ledger invariant.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Domain rule rejected the mutation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::AlreadyExists { entity, id } => Self::AlreadyExists { entity, id },
            StoreError::InsufficientBalance {
                available,
                required,
            } => Self::InsufficientBalance {
                available,
                required,
            },
            StoreError::ContentNotFound { content_id } => Self::ContentNotFound { content_id },
            StoreError::LimitExceeded(msg) => Self::ConversionLimitExceeded(msg),
            StoreError::LockTimeout { key } => Self::ConcurrentModification { user_id: key },
            StoreError::Ledger(err) => err,
            StoreError::Database(msg)
            | StoreError::Serialization(msg)
            | StoreError::Invariant(msg) => Self::Storage(msg),
        }
    }
}
