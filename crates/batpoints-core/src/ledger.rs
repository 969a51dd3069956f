//! Points journal types.
//!
//! Every change to an account's balance writes a `PointsTransaction` in the
//! same atomic unit as the balance change itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContentId, TransactionId, UserId};

/// A journal entry describing one balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsTransaction {
    /// Unique entry ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Signed amount. Positive = credit, negative = debit.
    pub amount: i64,

    /// Type of entry.
    pub transaction_type: TransactionType,

    /// Balance after this entry was applied.
    pub balance_after: i64,

    /// Human-readable description.
    pub description: String,

    /// Counterparty for tips.
    pub related_user: Option<UserId>,

    /// Content item a tip was attributed to.
    pub related_content: Option<ContentId>,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl PointsTransaction {
    /// Create an entry. The sign of `amount` is normalised from the type.
    #[must_use]
    pub fn new(
        user_id: UserId,
        amount: i64,
        transaction_type: TransactionType,
        balance_after: i64,
        description: impl Into<String>,
    ) -> Self {
        let amount = match transaction_type {
            TransactionType::TipSent | TransactionType::Conversion => -amount.abs(),
            TransactionType::TipReceived | TransactionType::SignupBonus => amount.abs(),
            TransactionType::AdminAdjustment => amount,
        };

        Self {
            id: TransactionId::generate(),
            user_id,
            amount,
            transaction_type,
            balance_after,
            description: description.into(),
            related_user: None,
            related_content: None,
            created_at: Utc::now(),
        }
    }

    /// Attach the counterparty of a tip.
    #[must_use]
    pub fn with_related_user(mut self, user_id: UserId) -> Self {
        self.related_user = Some(user_id);
        self
    }

    /// Attach the content item a tip was attributed to.
    #[must_use]
    pub fn with_related_content(mut self, content_id: Option<ContentId>) -> Self {
        self.related_content = content_id;
        self
    }
}

/// Type of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// One-time credit granted when the account is created.
    SignupBonus,

    /// Points sent as a tip.
    TipSent,

    /// Points received as a tip.
    TipReceived,

    /// Points debited by a completed token conversion.
    Conversion,

    /// Manual credit or debit by an operator.
    AdminAdjustment,
}

impl TransactionType {
    /// Stable lowercase name, as serialized.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SignupBonus => "signup_bonus",
            Self::TipSent => "tip_sent",
            Self::TipReceived => "tip_received",
            Self::Conversion => "conversion",
            Self::AdminAdjustment => "admin_adjustment",
        }
    }
}
