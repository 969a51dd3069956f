//! Tip transfer engine.

use std::sync::Arc;

use serde::Deserialize;

use batpoints_core::{ContentId, LedgerError, TipId, TipPolicy, TipRecord, UserId};
use batpoints_store::{Page, Store, TipReceipt};

use super::Paging;
use crate::notify::{emit_logged, LedgerEvent, Notifier};

/// A tip as requested by its sender.
#[derive(Debug, Clone, Deserialize)]
pub struct TipRequest {
    /// Who receives the points.
    pub recipient_id: UserId,
    /// Points to send.
    pub amount: i64,
    /// Optional note, at most 200 characters.
    #[serde(default)]
    pub message: Option<String>,
    /// Content item being tipped, if any.
    #[serde(default)]
    pub content_id: Option<ContentId>,
}

/// Validates and commits user-to-user tips.
#[derive(Clone)]
pub struct TipEngine {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    policy: TipPolicy,
}

impl TipEngine {
    /// Create a tip engine.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, policy: TipPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    /// The active tip bounds.
    #[must_use]
    pub fn policy(&self) -> &TipPolicy {
        &self.policy
    }

    /// Send a tip from `sender_id`.
    ///
    /// Checks, in order: sender exists, recipient exists, not a self-tip,
    /// amount within bounds, message length, spendable balance, content
    /// exists. The store re-checks balance and content under lock, then
    /// commits the whole tip as one unit.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`LedgerError`].
    pub async fn send_tip(
        &self,
        sender_id: UserId,
        request: TipRequest,
    ) -> Result<TipReceipt, LedgerError> {
        let sender = self
            .store
            .get_account(&sender_id)?
            .ok_or_else(|| LedgerError::account_not_found(sender_id))?;
        self.store
            .get_account(&request.recipient_id)?
            .ok_or_else(|| LedgerError::account_not_found(request.recipient_id))?;

        if sender_id == request.recipient_id {
            return Err(LedgerError::SelfTipNotAllowed);
        }
        self.policy.check_amount(request.amount)?;
        let message = self.policy.normalize_message(request.message.as_deref())?;

        if !sender.can_spend(request.amount) {
            return Err(LedgerError::InsufficientBalance {
                available: sender.available_points(),
                required: request.amount,
            });
        }
        if let Some(content_id) = &request.content_id {
            if self.store.get_content(content_id)?.is_none() {
                return Err(LedgerError::ContentNotFound {
                    content_id: content_id.to_string(),
                });
            }
        }

        let tip = TipRecord::new(
            sender_id,
            request.recipient_id,
            request.amount,
            message,
            request.content_id,
        );
        let receipt = self.store.record_tip(&tip)?;

        tracing::info!(
            tip_id = %tip.id,
            sender_id = %sender_id,
            recipient_id = %tip.recipient_id,
            amount = tip.amount,
            "Tip sent"
        );

        let notifier = Arc::clone(&self.notifier);
        let event = LedgerEvent::TipReceived {
            tip_id: tip.id,
            sender_id,
            amount: tip.amount,
            message: tip.message.clone(),
            content_id: tip.content_id,
        };
        let recipient_id = tip.recipient_id;
        tokio::spawn(async move {
            emit_logged(&notifier, &recipient_id, event).await;
        });

        Ok(receipt)
    }

    /// A tip visible to `viewer`, who must be its sender or recipient.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if the tip doesn't exist or the viewer
    /// is not a party to it.
    pub fn get_tip(&self, tip_id: &TipId, viewer: &UserId) -> Result<TipRecord, LedgerError> {
        self.store
            .get_tip(tip_id)?
            .filter(|tip| tip.involves(viewer))
            .ok_or_else(|| LedgerError::NotFound {
                entity: "tip",
                id: tip_id.to_string(),
            })
    }

    /// Tips sent by `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn sent_tips(&self, user_id: &UserId, paging: Paging) -> Result<Page<TipRecord>, LedgerError> {
        let paging = paging.normalized();
        Ok(self
            .store
            .list_tips_sent(user_id, paging.limit, paging.offset())?)
    }

    /// Tips received by `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn received_tips(
        &self,
        user_id: &UserId,
        paging: Paging,
    ) -> Result<Page<TipRecord>, LedgerError> {
        let paging = paging.normalized();
        Ok(self
            .store
            .list_tips_received(user_id, paging.limit, paging.offset())?)
    }
}
