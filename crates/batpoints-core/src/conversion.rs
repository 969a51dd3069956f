//! Points-to-token conversion records and their state machine.
//!
//! ```text
//! processing ──complete()──▶ completed
//!      │
//!      └──────fail()───────▶ failed
//! ```
//!
//! Records are created in `processing`. `completed` and `failed` are
//! terminal: both transition functions reject a terminal record.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::{ConversionId, ConversionPolicy, UserId};

/// Status of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    /// Accepted but not yet started. Kept for stored-data compatibility;
    /// the engine creates records directly in `Processing`.
    Pending,

    /// Intent recorded and points held; chain outcome not yet finalized.
    Processing,

    /// Tokens delivered and points debited.
    Completed,

    /// No tokens delivered; points released.
    Failed,
}

impl ConversionStatus {
    /// Check if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stable lowercase name, as serialized.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversion of off-chain points into an on-chain token transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// Unique conversion ID, also the chain idempotency reference.
    pub id: ConversionId,

    /// The converting user.
    pub user_id: UserId,

    /// Points being converted.
    pub points_amount: i64,

    /// Tokens owed, fixed at 8 decimal places when the request was made.
    pub estimated_tokens: Decimal,

    /// Wallet receiving the tokens.
    pub destination_address: String,

    /// Current status.
    pub status: ConversionStatus,

    /// Chain transaction hash, set on completion.
    pub transaction_hash: Option<String>,

    /// Reason for failure, set on failure.
    pub error_message: Option<String>,

    /// When the record reached a terminal state.
    pub processed_at: Option<DateTime<Utc>>,

    /// Tokens per point in effect at request time.
    pub rate_at_request: Decimal,

    /// Token decimals in effect at request time.
    pub token_decimals: u8,

    /// Chain the transfer targets.
    pub chain_id: u64,

    /// When the conversion was requested.
    pub created_at: DateTime<Utc>,

    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

impl ConversionRecord {
    /// Create a record in `processing`, snapshotting the policy's rate,
    /// token decimals and chain id.
    #[must_use]
    pub fn processing(
        user_id: UserId,
        points_amount: i64,
        destination_address: impl Into<String>,
        policy: &ConversionPolicy,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ConversionId::generate(),
            user_id,
            points_amount,
            estimated_tokens: policy.tokens_for(points_amount),
            destination_address: destination_address.into(),
            status: ConversionStatus::Processing,
            transaction_hash: None,
            error_message: None,
            processed_at: None,
            rate_at_request: policy.points_to_token_rate,
            token_decimals: policy.token_decimals,
            chain_id: policy.chain_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to `completed` with the chain transaction hash.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidTransition` if the record is terminal.
    pub fn complete(
        &mut self,
        transaction_hash: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.check_transition(ConversionStatus::Completed)?;
        self.status = ConversionStatus::Completed;
        self.transaction_hash = Some(transaction_hash.into());
        self.error_message = None;
        self.processed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Transition to `failed` with the reason.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidTransition` if the record is terminal.
    pub fn fail(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.check_transition(ConversionStatus::Failed)?;
        self.status = ConversionStatus::Failed;
        self.error_message = Some(reason.into());
        self.processed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Check if the record can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn check_transition(&self, to: ConversionStatus) -> Result<(), LedgerError> {
        if self.status.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                id: self.id.to_string(),
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}
