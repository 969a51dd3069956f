//! Points account types.
//!
//! An account holds the authoritative points balance for one user. Points
//! reserved by in-flight conversions are tracked separately as a hold so the
//! spendable amount can be checked without touching the balance itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A points account for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The owning user.
    pub user_id: UserId,

    /// Current BAT Points balance. Never negative.
    pub balance_points: i64,

    /// Points reserved by conversions still in `processing`.
    /// Always `0 <= held_points <= balance_points`.
    pub held_points: i64,

    /// Lifetime points received as tips.
    pub lifetime_tipped_in: i64,

    /// Lifetime points sent as tips.
    pub lifetime_tipped_out: i64,

    /// Lifetime points converted to tokens.
    pub lifetime_converted: i64,

    /// Lifetime points granted as bonuses or admin credits.
    pub lifetime_bonus: i64,

    /// Incremented on every committed mutation.
    pub version: u64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance_points: 0,
            held_points: 0,
            lifetime_tipped_in: 0,
            lifetime_tipped_out: 0,
            lifetime_converted: 0,
            lifetime_bonus: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Points that may be spent right now.
    #[must_use]
    pub const fn available_points(&self) -> i64 {
        self.balance_points - self.held_points
    }

    /// Check if the account can spend `amount` points.
    #[must_use]
    pub const fn can_spend(&self, amount: i64) -> bool {
        self.available_points() >= amount
    }

    /// Balance snapshot for callers.
    #[must_use]
    pub const fn balance(&self) -> Balance {
        Balance {
            balance: self.balance_points,
            held: self.held_points,
            available: self.available_points(),
        }
    }

    /// Mark the account as mutated.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = at;
    }
}

/// A point-in-time view of an account's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Total points owned.
    pub balance: i64,
    /// Points reserved by in-flight conversions.
    pub held: i64,
    /// Points that may be spent.
    pub available: i64,
}
