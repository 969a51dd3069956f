//! Error types for the points ledger.

use crate::conversion::ConversionStatus;
use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A user account, tip or conversion does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A record that must be unique already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Conflicting identifier.
        id: String,
    },

    /// Amount outside the allowed bounds or step.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed request field other than the amount.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Not enough spendable points.
    #[error("insufficient balance: available={available}, required={required}")]
    InsufficientBalance {
        /// Points available to spend.
        available: i64,
        /// Points the operation needs.
        required: i64,
    },

    /// Sender and recipient are the same user.
    #[error("you cannot tip yourself")]
    SelfTipNotAllowed,

    /// The tipped content item is not registered.
    #[error("content not found: {content_id}")]
    ContentNotFound {
        /// The missing content item.
        content_id: String,
    },

    /// The chain did not deliver the tokens.
    #[error("chain transfer failed for conversion {conversion_id}: {reason}")]
    ChainTransferFailed {
        /// The conversion that failed.
        conversion_id: String,
        /// Sanitised reason, safe to show to the user.
        reason: String,
    },

    /// Per-user conversion limits would be exceeded.
    #[error("conversion limit exceeded: {0}")]
    ConversionLimitExceeded(String),

    /// Could not obtain exclusive access to an account in time.
    #[error("concurrent modification of account {user_id}")]
    ConcurrentModification {
        /// The contended account.
        user_id: String,
    },

    /// Attempted to move a conversion out of a terminal state.
    #[error("invalid conversion transition for {id}: {from} -> {to}")]
    InvalidTransition {
        /// The conversion.
        id: String,
        /// Current status.
        from: ConversionStatus,
        /// Requested status.
        to: ConversionStatus,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Shorthand for a missing account.
    #[must_use]
    pub fn account_not_found(user_id: impl ToString) -> Self {
        Self::NotFound {
            entity: "account",
            id: user_id.to_string(),
        }
    }
}
