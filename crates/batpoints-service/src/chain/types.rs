//! Treasury relayer request and response types.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A hash of a submitted chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl TxHash {
    /// The hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A token payout to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRequest {
    /// Idempotency reference (the conversion id).
    pub reference: String,
    /// Destination wallet address.
    pub to: String,
    /// Token amount in whole tokens.
    pub amount: Decimal,
    /// Decimals of the token contract.
    pub decimals: u8,
}

/// On-chain state of a submitted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Mined and successful.
    Confirmed,
    /// Submitted but not yet final.
    Pending,
    /// Reverted or dropped.
    Failed,
}

/// A transfer previously submitted under some reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransfer {
    /// Idempotency reference given at submission.
    pub reference: String,
    /// Transaction hash, once known.
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// Current status.
    pub status: TransferStatus,
}

/// Response of `POST /v1/transfers` and `POST /v1/mints`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    /// Transaction hash.
    pub tx_hash: String,
    /// Status after submission.
    pub status: TransferStatus,
    /// Revert reason, if any.
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `GET /v1/balances/{address}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Queried address.
    pub address: String,
    /// Token balance in whole tokens.
    pub balance: Decimal,
}

/// Error body returned by the relayer.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerErrorResponse {
    /// Error message.
    pub error: String,
    /// Machine-readable code.
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_request_sends_amount_as_string() {
        let request = TransferRequest {
            reference: "01J0000000000000000000000".into(),
            to: "0x52908400098527886E0F7030069857D2E4169EE7".into(),
            amount: Decimal::new(300_000_000, 8),
            decimals: 18,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["amount"], "3.00000000");
        assert_eq!(json["decimals"], 18);
    }

    #[test]
    fn transfer_lookup_parses() {
        let transfer: ChainTransfer = serde_json::from_str(
            r#"{"reference":"abc","tx_hash":"0xdead","status":"confirmed"}"#,
        )
        .unwrap();
        assert_eq!(transfer.status, TransferStatus::Confirmed);
        assert_eq!(transfer.tx_hash.as_deref(), Some("0xdead"));
    }
}
