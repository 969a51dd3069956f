//! Points-to-token conversion engine.
//!
//! A conversion is settled in three steps:
//!
//! 1. **Intent**: the `processing` record and a hold on the points are
//!    committed together ([`Store::open_conversion`]).
//! 2. **Outcome**: the chain gateway is called with the conversion id as its
//!    idempotency reference. No store lock is held across this call.
//! 3. **Finalize**: the record is completed (points debited) or failed (hold
//!    released) in one atomic store operation.
//!
//! Step 2 and 3 run in a spawned task. If the caller's future is dropped
//! mid-flight the task keeps running, so a submitted transfer is always
//! reconciled into the ledger. Anything left in `processing` after a crash is
//! picked up by [`ConversionRecovery`](super::ConversionRecovery).

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;

use batpoints_core::{
    is_valid_address, ConversionId, ConversionPolicy, ConversionRecord, ConversionStatus,
    LedgerError, UserId,
};
use batpoints_store::{ConversionLimits, Page, Store};

use super::{Finalizer, Paging};
use crate::chain::{ChainError, ChainGateway, TransferRequest, TransferStatus};
use crate::notify::Notifier;

/// How an indeterminate chain outcome is polled before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Lookups before leaving the record to the recovery sweep.
    pub attempts: u32,
    /// Delay before the first lookup.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Current conversion terms.
#[derive(Debug, Clone, Serialize)]
pub struct RateInfo {
    /// Tokens per point.
    pub points_to_token_rate: Decimal,
    /// Smallest conversion.
    pub min_conversion_points: i64,
    /// Conversions must be a multiple of this.
    pub conversion_step_points: i64,
    /// In-flight conversions allowed per user.
    pub max_pending_per_user: usize,
    /// Points convertible per user per day.
    pub daily_limit_points: i64,
    /// Target chain.
    pub chain_id: u64,
}

/// Converts points into on-chain tokens.
#[derive(Clone)]
pub struct ConversionEngine {
    store: Arc<dyn Store>,
    settlement: Settlement,
    policy: ConversionPolicy,
}

impl ConversionEngine {
    /// Create a conversion engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainGateway>,
        notifier: Arc<dyn Notifier>,
        policy: ConversionPolicy,
    ) -> Self {
        let finalizer = Finalizer::new(Arc::clone(&store), notifier);
        Self {
            store,
            settlement: Settlement {
                chain,
                finalizer,
                poll: PollSettings::default(),
            },
            policy,
        }
    }

    /// Override the indeterminate-outcome polling schedule.
    #[must_use]
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.settlement.poll = poll;
        self
    }

    /// The active conversion policy.
    #[must_use]
    pub fn policy(&self) -> &ConversionPolicy {
        &self.policy
    }

    /// Convert `points_amount` of `user_id`'s points into tokens paid to
    /// `destination_address`.
    ///
    /// Returns the record once it is final, or still `processing` when the
    /// chain outcome could not be determined in time.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` / `InvalidInput` for a bad amount or address
    /// - `NotFound` if the account doesn't exist
    /// - `InsufficientBalance` if the available balance is too low
    /// - `ConversionLimitExceeded` if a per-user limit is reached
    /// - `ChainTransferFailed` if the payout definitively failed; the hold
    ///   has been released by then
    pub async fn convert(
        &self,
        user_id: UserId,
        points_amount: i64,
        destination_address: &str,
    ) -> Result<ConversionRecord, LedgerError> {
        self.policy.check_amount(points_amount)?;
        if !is_valid_address(destination_address) {
            return Err(LedgerError::InvalidInput(
                "Invalid wallet address format".into(),
            ));
        }

        let account = self
            .store
            .get_account(&user_id)?
            .ok_or_else(|| LedgerError::account_not_found(user_id))?;
        if !account.can_spend(points_amount) {
            return Err(LedgerError::InsufficientBalance {
                available: account.available_points(),
                required: points_amount,
            });
        }

        let record =
            ConversionRecord::processing(user_id, points_amount, destination_address, &self.policy);
        self.store
            .open_conversion(&record, &ConversionLimits::from(&self.policy))?;

        tracing::info!(
            conversion_id = %record.id,
            user_id = %user_id,
            points = points_amount,
            tokens = %record.estimated_tokens,
            "Conversion opened"
        );

        let conversion_id = record.id;
        let settled = tokio::spawn(self.settlement.clone().run(record))
            .await
            .map_err(|e| LedgerError::Storage(format!("settlement task failed: {e}")))??;

        match settled.status {
            ConversionStatus::Failed => Err(LedgerError::ChainTransferFailed {
                conversion_id: conversion_id.to_string(),
                reason: settled.error_message.unwrap_or_default(),
            }),
            _ => Ok(settled),
        }
    }

    /// A user's conversions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_conversion_history(
        &self,
        user_id: &UserId,
        paging: Paging,
    ) -> Result<Page<ConversionRecord>, LedgerError> {
        let paging = paging.normalized();
        Ok(self
            .store
            .list_conversions_by_user(user_id, paging.limit, paging.offset())?)
    }

    /// A conversion owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if it doesn't exist or belongs to
    /// someone else.
    pub fn get_conversion_by_id(
        &self,
        id: &ConversionId,
        user_id: &UserId,
    ) -> Result<ConversionRecord, LedgerError> {
        self.store
            .get_conversion(id)?
            .filter(|record| record.user_id == *user_id)
            .ok_or_else(|| LedgerError::NotFound {
                entity: "conversion",
                id: id.to_string(),
            })
    }

    /// Current conversion terms.
    #[must_use]
    pub fn rate(&self) -> RateInfo {
        RateInfo {
            points_to_token_rate: self.policy.points_to_token_rate,
            min_conversion_points: self.policy.min_conversion_points,
            conversion_step_points: self.policy.conversion_step_points,
            max_pending_per_user: self.policy.max_pending_per_user,
            daily_limit_points: self.policy.daily_limit_points,
            chain_id: self.policy.chain_id,
        }
    }
}

/// What the polling loop last saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sighting {
    Absent,
    Pending,
    LookupFailed,
}

/// Chain call and finalization for one conversion.
#[derive(Clone)]
struct Settlement {
    chain: Arc<dyn ChainGateway>,
    finalizer: Finalizer,
    poll: PollSettings,
}

impl Settlement {
    async fn run(self, record: ConversionRecord) -> Result<ConversionRecord, LedgerError> {
        let request = TransferRequest {
            reference: record.id.to_string(),
            to: record.destination_address.clone(),
            amount: record.estimated_tokens,
            decimals: record.token_decimals,
        };

        match self.chain.transfer_or_mint(&request).await {
            Ok(tx_hash) => {
                tracing::info!(
                    conversion_id = %record.id,
                    tx_hash = %tx_hash,
                    "Token transfer submitted"
                );
                self.finalizer.complete(&record.id, tx_hash.as_str()).await
            }
            Err(e) if e.is_definitive() => {
                tracing::warn!(conversion_id = %record.id, error = %e, "Token transfer failed");
                self.finalizer.fail(&record.id, &e.public_reason()).await
            }
            Err(e) => {
                tracing::warn!(
                    conversion_id = %record.id,
                    error = %e,
                    "Token transfer outcome unknown, polling"
                );
                self.resolve(record, &request.reference, &e).await
            }
        }
    }

    /// Poll the relayer until the transfer's fate is known.
    ///
    /// Only a confirmed or reverted transfer finalizes the record. A transfer
    /// the relayer has not indexed yet may still land, so absence is never
    /// taken as failure here; the recovery sweep applies its stale rule.
    async fn resolve(
        &self,
        record: ConversionRecord,
        reference: &str,
        cause: &ChainError,
    ) -> Result<ConversionRecord, LedgerError> {
        let mut backoff = self.poll.initial_backoff;
        let mut last = Sighting::Absent;

        for attempt in 1..=self.poll.attempts {
            tokio::time::sleep(backoff).await;

            match self.chain.find_transfer(reference).await {
                Ok(Some(transfer)) => match (transfer.status, transfer.tx_hash) {
                    (TransferStatus::Confirmed, Some(hash)) => {
                        return self.finalizer.complete(&record.id, &hash).await;
                    }
                    (TransferStatus::Failed, _) => {
                        return self
                            .finalizer
                            .fail(&record.id, "Token transfer reverted on chain")
                            .await;
                    }
                    _ => last = Sighting::Pending,
                },
                Ok(None) => last = Sighting::Absent,
                Err(e) => {
                    tracing::debug!(
                        conversion_id = %record.id,
                        attempt,
                        error = %e,
                        "Transfer lookup failed"
                    );
                    last = Sighting::LookupFailed;
                }
            }

            backoff = (backoff * 2).min(self.poll.max_backoff);
        }

        tracing::warn!(
            conversion_id = %record.id,
            cause = %cause,
            last_seen = ?last,
            "Conversion left processing for recovery"
        );
        Ok(record)
    }
}
