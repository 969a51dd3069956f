//! Treasury relayer client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;

use super::types::{
    BalanceResponse, ChainTransfer, RelayerErrorResponse, SubmitResponse, TransferRequest,
    TransferStatus, TxHash,
};
use super::{ChainError, ChainGateway};

/// HTTP timeout for relayer calls.
const RELAYER_TIMEOUT: Duration = Duration::from_secs(30);

/// [`ChainGateway`] backed by the treasury relayer REST API.
#[derive(Debug, Clone)]
pub struct HttpChainGateway {
    client: Client,
    base_url: String,
    api_key: String,
    treasury_address: String,
    mint_enabled: bool,
}

impl HttpChainGateway {
    /// Create a new relayer client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Relayer URL (e.g., `"http://localhost:8545"`)
    /// * `api_key` - Relayer API key
    /// * `treasury_address` - Address payouts are sent from
    /// * `mint_enabled` - Mint when the treasury cannot cover a payout
    ///
    /// # Errors
    ///
    /// Returns `ChainError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        treasury_address: impl Into<String>,
        mint_enabled: bool,
    ) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(RELAYER_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            treasury_address: treasury_address.into(),
            mint_enabled,
        })
    }

    /// Submit to `/v1/transfers` or `/v1/mints`.
    ///
    /// Only a mined transaction counts as paid. A broadcast that has not
    /// been mined yet comes back as `ChainError::Unconfirmed`.
    async fn submit(&self, path: &str, request: &TransferRequest) -> Result<TxHash, ChainError> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Idempotency-Key", &request.reference)
            .json(request)
            .send()
            .await?;

        let submitted: SubmitResponse = self.handle_response(response).await?;
        match submitted.status {
            TransferStatus::Confirmed => Ok(TxHash(submitted.tx_hash)),
            TransferStatus::Pending => Err(ChainError::Unconfirmed(submitted.tx_hash)),
            TransferStatus::Failed => Err(ChainError::Reverted(
                submitted.error.unwrap_or(submitted.tx_hash),
            )),
        }
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ChainError> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            return serde_json::from_str(&body)
                .map_err(|e| ChainError::Serialization(e.to_string()));
        }

        let error_body: Result<RelayerErrorResponse, _> = response.json().await;
        let message = match error_body {
            Ok(err) => match err.code {
                Some(code) => format!("{} ({code})", err.error),
                None => err.error,
            },
            Err(_) => format!("HTTP {status}"),
        };
        Err(ChainError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ChainGateway for HttpChainGateway {
    async fn transfer_or_mint(&self, request: &TransferRequest) -> Result<TxHash, ChainError> {
        let available = self.get_balance(&self.treasury_address).await?;

        if available >= request.amount {
            tracing::debug!(
                reference = %request.reference,
                amount = %request.amount,
                "Transferring from treasury"
            );
            return self.submit("/v1/transfers", request).await;
        }

        if self.mint_enabled {
            tracing::info!(
                reference = %request.reference,
                amount = %request.amount,
                treasury = %available,
                "Treasury short, minting"
            );
            return self.submit("/v1/mints", request).await;
        }

        Err(ChainError::InsufficientTreasury {
            available,
            required: request.amount,
        })
    }

    async fn get_balance(&self, address: &str) -> Result<Decimal, ChainError> {
        let url = format!("{}/v1/balances/{address}", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        self.handle_response::<BalanceResponse>(response)
            .await
            .map(|r| r.balance)
    }

    async fn find_transfer(&self, reference: &str) -> Result<Option<ChainTransfer>, ChainError> {
        let url = format!("{}/v1/transfers/{reference}", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        self.handle_response::<ChainTransfer>(response).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let gateway =
            HttpChainGateway::new("http://localhost:8545/", "key", "0xtreasury", false).unwrap();
        assert_eq!(gateway.base_url, "http://localhost:8545");
    }
}
