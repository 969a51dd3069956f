//! Chain gateway: token payouts from the treasury.
//!
//! The ledger never holds signing keys. Payouts go through a treasury relayer
//! which signs and submits transfers (or mints, when enabled) and can be asked
//! afterwards what happened to a transfer submitted under a given reference.

pub mod client;
pub mod types;

use async_trait::async_trait;
use rust_decimal::Decimal;

pub use client::HttpChainGateway;
pub use types::{ChainTransfer, TransferRequest, TransferStatus, TxHash};

/// Error type for chain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Relayer returned an error.
    #[error("relayer API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Treasury cannot cover the payout and minting is disabled.
    #[error("insufficient treasury balance: available {available}, required {required}")]
    InsufficientTreasury {
        /// Treasury balance.
        available: Decimal,
        /// Payout amount.
        required: Decimal,
    },

    /// The transaction was mined but reverted.
    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// The transaction was broadcast but is not mined yet.
    #[error("transaction not yet confirmed: {0}")]
    Unconfirmed(String),

    /// Response could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Gateway is misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ChainError {
    /// Whether the payout is known not to have happened.
    ///
    /// Anything else (timeouts, transport errors, 5xx) leaves the outcome
    /// unknown: the transfer may or may not have been submitted.
    #[must_use]
    pub fn is_definitive(&self) -> bool {
        match self {
            Self::InsufficientTreasury { .. } | Self::Reverted(_) | Self::Configuration(_) => true,
            Self::Api { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            Self::Http(_) | Self::Serialization(_) | Self::Unconfirmed(_) => false,
        }
    }

    /// Reason safe to show to the user and store on the record.
    #[must_use]
    pub fn public_reason(&self) -> String {
        match self {
            Self::InsufficientTreasury {
                available,
                required,
            } => format!(
                "Insufficient treasury balance: available {available} BAT, required {required} BAT"
            ),
            Self::Reverted(_) => "Token transfer reverted on chain".into(),
            Self::Unconfirmed(_) => "Token transfer awaiting confirmation".into(),
            Self::Api { .. } if self.is_definitive() => "Token transfer was rejected".into(),
            Self::Configuration(_) => "Token transfers are not available".into(),
            Self::Http(_) | Self::Api { .. } | Self::Serialization(_) => {
                "Chain service unavailable".into()
            }
        }
    }
}

/// Token payout backend.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Pay `request.amount` tokens to `request.to`, transferring from the
    /// treasury when it can cover the amount and minting otherwise (if
    /// enabled).
    ///
    /// Implementations must treat `request.reference` as an idempotency key.
    async fn transfer_or_mint(&self, request: &TransferRequest) -> Result<TxHash, ChainError>;

    /// Token balance of `address`.
    async fn get_balance(&self, address: &str) -> Result<Decimal, ChainError>;

    /// Look up a transfer previously submitted under `reference`.
    async fn find_transfer(&self, reference: &str) -> Result<Option<ChainTransfer>, ChainError>;
}

/// Gateway used when no relayer is configured. Every payout fails
/// definitively, so conversions release their holds immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledChainGateway;

#[async_trait]
impl ChainGateway for DisabledChainGateway {
    async fn transfer_or_mint(&self, _request: &TransferRequest) -> Result<TxHash, ChainError> {
        Err(ChainError::Configuration("chain relayer not configured".into()))
    }

    async fn get_balance(&self, _address: &str) -> Result<Decimal, ChainError> {
        Err(ChainError::Configuration("chain relayer not configured".into()))
    }

    async fn find_transfer(&self, _reference: &str) -> Result<Option<ChainTransfer>, ChainError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let shortfall = ChainError::InsufficientTreasury {
            available: Decimal::new(1, 0),
            required: Decimal::new(3, 0),
        };
        assert!(shortfall.is_definitive());
        assert_eq!(
            shortfall.public_reason(),
            "Insufficient treasury balance: available 1 BAT, required 3 BAT"
        );

        let rejected = ChainError::Api {
            status: 422,
            message: "bad address".into(),
        };
        assert!(rejected.is_definitive());

        let outage = ChainError::Api {
            status: 503,
            message: "upstream node down at 10.0.0.4".into(),
        };
        assert!(!outage.is_definitive());
        assert_eq!(outage.public_reason(), "Chain service unavailable");

        let throttled = ChainError::Api {
            status: 429,
            message: "slow down".into(),
        };
        assert!(!throttled.is_definitive());

        let unmined = ChainError::Unconfirmed("0xabc".into());
        assert!(!unmined.is_definitive());
        assert_eq!(unmined.public_reason(), "Token transfer awaiting confirmation");
    }
}
