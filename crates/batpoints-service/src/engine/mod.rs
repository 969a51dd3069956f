//! Ledger engines: tips, conversions and conversion recovery.
//!
//! Engines validate requests, drive the store's atomic operations and emit
//! notifications once a change is committed. They hold no state of their own
//! beyond their collaborators, so they are cheap to clone.

pub mod conversions;
pub mod recovery;
pub mod tips;

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use batpoints_core::{ConversionId, ConversionRecord, ConversionStatus, LedgerError};
use batpoints_store::{ConversionOutcome, Store};

use crate::notify::{emit_logged, LedgerEvent, Notifier};

pub use conversions::{ConversionEngine, PollSettings, RateInfo};
pub use recovery::{ConversionRecovery, SweepReport};
pub use tips::{TipEngine, TipRequest};

/// Largest page a listing returns.
pub const MAX_PAGE_SIZE: usize = 100;

/// Default page size.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// 1-based page selection for history listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Paging {
    /// Page number, starting at 1.
    #[serde(default = "first_page")]
    pub page: usize,
    /// Records per page, clamped to `1..=100`.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn first_page() -> usize {
    1
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Paging {
    /// Clamp out-of-range values.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Records to skip.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1).saturating_mul(self.limit)
    }
}

/// Moves conversions into their terminal state and announces the change.
///
/// Shared by the live settlement path and the recovery sweep; whichever gets
/// there first wins and the other observes the terminal record.
#[derive(Clone)]
pub(crate) struct Finalizer {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl Finalizer {
    pub(crate) fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub(crate) async fn complete(
        &self,
        id: &ConversionId,
        transaction_hash: &str,
    ) -> Result<ConversionRecord, LedgerError> {
        let outcome = self
            .store
            .complete_conversion(id, transaction_hash, Utc::now())?;
        self.announce(&outcome).await;
        Ok(outcome.record)
    }

    pub(crate) async fn fail(
        &self,
        id: &ConversionId,
        reason: &str,
    ) -> Result<ConversionRecord, LedgerError> {
        let outcome = self.store.fail_conversion(id, reason, Utc::now())?;
        self.announce(&outcome).await;
        Ok(outcome.record)
    }

    async fn announce(&self, outcome: &ConversionOutcome) {
        if !outcome.changed {
            tracing::debug!(
                conversion_id = %outcome.record.id,
                status = %outcome.record.status,
                "Conversion already final"
            );
            return;
        }

        let record = &outcome.record;
        let event = match record.status {
            ConversionStatus::Completed => LedgerEvent::ConversionCompleted {
                conversion_id: record.id,
                points_amount: record.points_amount,
                tokens: record.estimated_tokens,
                transaction_hash: record.transaction_hash.clone().unwrap_or_default(),
            },
            ConversionStatus::Failed => LedgerEvent::ConversionFailed {
                conversion_id: record.id,
                points_amount: record.points_amount,
                reason: record.error_message.clone().unwrap_or_default(),
            },
            ConversionStatus::Pending | ConversionStatus::Processing => return,
        };
        emit_logged(&self.notifier, &record.user_id, event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_is_clamped() {
        let paging = Paging {
            page: 0,
            limit: 1_000,
        }
        .normalized();
        assert_eq!(paging.page, 1);
        assert_eq!(paging.limit, MAX_PAGE_SIZE);
        assert_eq!(paging.offset(), 0);

        let third = Paging { page: 3, limit: 20 }.normalized();
        assert_eq!(third.offset(), 40);
    }

    #[test]
    fn huge_page_saturates_offset() {
        let paging = Paging {
            page: usize::MAX,
            limit: 20,
        }
        .normalized();
        assert_eq!(paging.offset(), usize::MAX);
    }
}
