//! Outgoing user notifications.
//!
//! Events are emitted only after the ledger change they describe has been
//! committed. Delivery is best effort: a failed emit is logged and never
//! affects the ledger.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;

use batpoints_core::{ContentId, ConversionId, TipId, UserId};

/// A ledger event addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// The user received a tip.
    TipReceived {
        /// The tip.
        tip_id: TipId,
        /// Who sent it.
        sender_id: UserId,
        /// Points received.
        amount: i64,
        /// Optional note from the sender.
        message: Option<String>,
        /// Tipped content item, if any.
        content_id: Option<ContentId>,
    },
    /// A conversion paid out.
    ConversionCompleted {
        /// The conversion.
        conversion_id: ConversionId,
        /// Points debited.
        points_amount: i64,
        /// Tokens paid.
        tokens: Decimal,
        /// Chain transaction hash.
        transaction_hash: String,
    },
    /// A conversion failed and its points were released.
    ConversionFailed {
        /// The conversion.
        conversion_id: ConversionId,
        /// Points released.
        points_amount: i64,
        /// Sanitised failure reason.
        reason: String,
    },
}

impl LedgerEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::TipReceived { .. } => "tip_received",
            Self::ConversionCompleted { .. } => "conversion_completed",
            Self::ConversionFailed { .. } => "conversion_failed",
        }
    }
}

/// Error type for notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Notification service rejected the event.
    #[error("notification rejected with status {0}")]
    Rejected(u16),
}

/// Notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `event` to `user_id`.
    async fn emit(&self, user_id: &UserId, event: &LedgerEvent) -> Result<(), NotifyError>;
}

/// Emit without letting a delivery failure escape.
pub async fn emit_logged(notifier: &Arc<dyn Notifier>, user_id: &UserId, event: LedgerEvent) {
    if let Err(e) = notifier.emit(user_id, &event).await {
        tracing::warn!(
            user_id = %user_id,
            event_type = event.event_type(),
            error = %e,
            "Failed to emit notification"
        );
    }
}

/// Writes events to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn emit(&self, user_id: &UserId, event: &LedgerEvent) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %user_id,
            event_type = event.event_type(),
            "Notification"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct NotificationBody<'a> {
    user_id: &'a UserId,
    #[serde(flatten)]
    event: &'a LedgerEvent,
}

/// Posts events to the notification service.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
    url: String,
}

impl HttpNotifier {
    /// Create a notifier posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn emit(&self, user_id: &UserId, event: &LedgerEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&NotificationBody { user_id, event })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        tracing::debug!(user_id = %user_id, event_type = event.event_type(), "Notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_shape() {
        let user_id = UserId::generate();
        let event = LedgerEvent::ConversionFailed {
            conversion_id: ConversionId::generate(),
            points_amount: 300,
            reason: "Chain service unavailable".into(),
        };
        let json = serde_json::to_value(NotificationBody {
            user_id: &user_id,
            event: &event,
        })
        .unwrap();

        assert_eq!(json["type"], "conversion_failed");
        assert_eq!(json["data"]["points_amount"], 300);
        assert_eq!(json["user_id"], user_id.to_string());
        assert_eq!(event.event_type(), "conversion_failed");
    }
}
