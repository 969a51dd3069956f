//! Reconciles conversions left in `processing`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use batpoints_core::{ConversionId, ConversionRecord, ConversionStatus, LedgerError};
use batpoints_store::Store;

use super::Finalizer;
use crate::chain::{ChainGateway, TransferStatus};
use crate::notify::Notifier;

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records looked at.
    pub examined: usize,
    /// Records completed.
    pub completed: usize,
    /// Records failed.
    pub failed: usize,
    /// Records still processing.
    pub pending: usize,
}

/// Finalizes in-flight conversions from the relayer's view of their
/// transfers.
#[derive(Clone)]
pub struct ConversionRecovery {
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainGateway>,
    finalizer: Finalizer,
    stale_after: Duration,
}

impl ConversionRecovery {
    /// Create a recovery worker. Conversions with no matching transfer are
    /// failed once older than `stale_after`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainGateway>,
        notifier: Arc<dyn Notifier>,
        stale_after: Duration,
    ) -> Self {
        let finalizer = Finalizer::new(Arc::clone(&store), notifier);
        Self {
            store,
            chain,
            finalizer,
            stale_after,
        }
    }

    /// Bring one conversion up to date.
    ///
    /// Terminal records are returned unchanged, so repeating a reconcile is
    /// harmless.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a store error.
    pub async fn reconcile(&self, id: &ConversionId) -> Result<ConversionRecord, LedgerError> {
        let record = self
            .store
            .get_conversion(id)?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "conversion",
                id: id.to_string(),
            })?;
        if record.is_terminal() {
            return Ok(record);
        }

        match self.chain.find_transfer(&id.to_string()).await {
            Ok(Some(transfer)) => match (transfer.status, transfer.tx_hash) {
                (TransferStatus::Confirmed, Some(hash)) => self.finalizer.complete(id, &hash).await,
                (TransferStatus::Failed, _) => {
                    self.finalizer
                        .fail(id, "Token transfer reverted on chain")
                        .await
                }
                _ => Ok(record),
            },
            Ok(None) if self.is_stale(&record) => {
                self.finalizer.fail(id, "No matching chain transaction").await
            }
            Ok(None) => Ok(record),
            Err(e) => {
                tracing::warn!(conversion_id = %id, error = %e, "Transfer lookup failed");
                Ok(record)
            }
        }
    }

    /// Reconcile every conversion in `processing`.
    ///
    /// # Errors
    ///
    /// Returns an error if the processing set cannot be listed. Failures on
    /// individual records are logged and counted as pending.
    pub async fn sweep(&self) -> Result<SweepReport, LedgerError> {
        let processing = self.store.list_processing_conversions()?;
        let mut report = SweepReport {
            examined: processing.len(),
            ..SweepReport::default()
        };

        for record in processing {
            match self.reconcile(&record.id).await {
                Ok(r) if r.status == ConversionStatus::Completed => report.completed += 1,
                Ok(r) if r.status == ConversionStatus::Failed => report.failed += 1,
                Ok(_) => report.pending += 1,
                Err(e) => {
                    tracing::error!(conversion_id = %record.id, error = %e, "Reconcile failed");
                    report.pending += 1;
                }
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                completed = report.completed,
                failed = report.failed,
                pending = report.pending,
                "Recovery sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweep now and then every `interval` (at least a second), until the
    /// runtime shuts down.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    tracing::error!(error = %e, "Recovery sweep failed");
                }
            }
        })
    }

    fn is_stale(&self, record: &ConversionRecord) -> bool {
        let age = Utc::now().signed_duration_since(record.created_at);
        age.to_std().is_ok_and(|age| age >= self.stale_after)
    }
}
