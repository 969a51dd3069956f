//! Tip records and content tip counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContentId, TipId, UserId};

/// A settled tip. Immutable once written: there is no pending tip state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipRecord {
    /// Unique tip ID.
    pub id: TipId,

    /// The user who paid.
    pub sender_id: UserId,

    /// The user who was paid.
    pub recipient_id: UserId,

    /// Points moved.
    pub amount: i64,

    /// Optional note from the sender.
    pub message: Option<String>,

    /// Content item the tip was attributed to.
    pub content_id: Option<ContentId>,

    /// When the tip settled.
    pub created_at: DateTime<Utc>,
}

impl TipRecord {
    /// Create a tip record stamped with the current time.
    #[must_use]
    pub fn new(
        sender_id: UserId,
        recipient_id: UserId,
        amount: i64,
        message: Option<String>,
        content_id: Option<ContentId>,
    ) -> Self {
        Self {
            id: TipId::generate(),
            sender_id,
            recipient_id,
            amount,
            message,
            content_id,
            created_at: Utc::now(),
        }
    }

    /// Whether `user_id` took part in this tip.
    #[must_use]
    pub fn involves(&self, user_id: &UserId) -> bool {
        self.sender_id == *user_id || self.recipient_id == *user_id
    }
}

/// Tip counters for one content item.
///
/// The content itself lives with the content service; the counters are kept
/// next to the ledger so that bumping them is part of the tip's atomic write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTipStats {
    /// The content item.
    pub content_id: ContentId,

    /// Author of the content item.
    pub author_id: UserId,

    /// Number of tips received.
    pub tip_count: u64,

    /// Total points received.
    pub tip_total: i64,

    /// When the content item was registered.
    pub created_at: DateTime<Utc>,

    /// When the counters last changed.
    pub updated_at: DateTime<Utc>,
}

impl ContentTipStats {
    /// Register a content item with empty counters.
    #[must_use]
    pub fn new(content_id: ContentId, author_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            content_id,
            author_id,
            tip_count: 0,
            tip_total: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Count one more tip of `amount` points.
    pub fn record_tip(&mut self, amount: i64, at: DateTime<Utc>) {
        self.tip_count += 1;
        self.tip_total += amount;
        self.updated_at = at;
    }
}
