//! Ledger storage for BAT Points.
//!
//! This crate owns every balance mutation. Each operation on the [`Store`]
//! trait is one atomic unit: the balances it touches, the journal entries that
//! describe them, and any records or indexes it creates are committed together
//! or not at all.
//!
//! # Backends
//!
//! - [`RocksStore`] (feature `rocksdb-backend`, default): persistent, one
//!   `WriteBatch` per operation, per-account striped locks.
//! - [`MemoryStore`]: a single mutex over in-memory maps, for tests and local
//!   runs without `RocksDB`.
//!
//! # Column families
//!
//! - `accounts`: account records, keyed by `user_id`
//! - `transactions` / `transactions_by_user`: the points journal
//! - `tips` / `tips_by_sender` / `tips_by_recipient`: tip records
//! - `contents`: per content item tip counters
//! - `conversions` / `conversions_by_user` / `conversions_processing`
//!
//! # Example
//!
//! ```no_run
//! use batpoints_store::{RocksStore, Store};
//! use batpoints_core::{Account, UserId};
//!
//! let store = RocksStore::open("/tmp/batpoints-db").unwrap();
//!
//! let user_id = UserId::generate();
//! store.create_account(&Account::new(user_id), 100).unwrap();
//!
//! let balance = store.get_balance(&user_id).unwrap();
//! assert_eq!(balance.available, 100);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
pub mod locks;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
mod rules;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use locks::StripedLocks;
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use serde::Serialize;

use batpoints_core::{
    Account, Balance, ContentId, ContentTipStats, ConversionId, ConversionPolicy,
    ConversionRecord, PointsTransaction, TipId, TipRecord, UserId,
};

/// One page of a newest-first listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// Records on this page.
    pub items: Vec<T>,
    /// Total number of records across all pages.
    pub total: usize,
}

impl<T> Page<T> {
    /// Build a page from records ordered oldest first.
    #[must_use]
    pub fn newest_first(mut oldest_first: Vec<T>, limit: usize, offset: usize) -> Self {
        let total = oldest_first.len();
        oldest_first.reverse();
        let items = oldest_first.into_iter().skip(offset).take(limit).collect();
        Self { items, total }
    }
}

/// Per-user limits enforced when a conversion is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionLimits {
    /// Maximum conversions a user may have in `processing` at once.
    pub max_in_flight: usize,
    /// Maximum points converted (non-failed) in any 24 hour window.
    pub daily_limit_points: i64,
}

impl From<&ConversionPolicy> for ConversionLimits {
    fn from(policy: &ConversionPolicy) -> Self {
        Self {
            max_in_flight: policy.max_pending_per_user,
            daily_limit_points: policy.daily_limit_points,
        }
    }
}

/// Both sides of a committed tip.
#[derive(Debug, Clone)]
pub struct TipReceipt {
    /// The stored tip.
    pub tip: TipRecord,
    /// Sender balance after the tip.
    pub sender_balance: Balance,
    /// Recipient balance after the tip.
    pub recipient_balance: Balance,
}

/// Result of finalizing a conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    /// The record as stored after the call.
    pub record: ConversionRecord,
    /// `false` when the record was already terminal and nothing was written.
    pub changed: bool,
}

/// The storage trait defining all ledger operations.
///
/// Implementations must make every mutating method linearizable per account.
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert a new account, crediting `signup_bonus` points in the same unit.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the account exists.
    fn create_account(&self, account: &Account, signup_bonus: i64) -> Result<Account>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Get the balance triple of an account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn get_balance(&self, user_id: &UserId) -> Result<Balance> {
        self.get_account(user_id)?
            .map(|account| account.balance())
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: user_id.to_string(),
            })
    }

    /// Apply a signed admin adjustment and journal it.
    ///
    /// Returns the journal entry, whose `balance_after` is the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientBalance` if a debit exceeds available points.
    fn apply_delta(&self, user_id: &UserId, delta: i64, description: &str)
        -> Result<PointsTransaction>;

    /// Move `amount` points between two accounts and journal both sides.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if either account doesn't exist.
    /// - `StoreError::InsufficientBalance` if `from` cannot cover `amount`.
    fn apply_paired_delta(
        &self,
        from: &UserId,
        to: &UserId,
        amount: i64,
        description: &str,
    ) -> Result<(PointsTransaction, PointsTransaction)>;

    // =========================================================================
    // Journal Operations
    // =========================================================================

    /// List journal entries for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<PointsTransaction>>;

    // =========================================================================
    // Tip Operations
    // =========================================================================

    /// Commit a tip: debit, credit, tip record, journal and content counter.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if either account doesn't exist.
    /// - `StoreError::InsufficientBalance` if the sender cannot cover it.
    /// - `StoreError::ContentNotFound` if the tipped content is unknown.
    fn record_tip(&self, tip: &TipRecord) -> Result<TipReceipt>;

    /// Get a tip by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_tip(&self, tip_id: &TipId) -> Result<Option<TipRecord>>;

    /// List tips sent by a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_tips_sent(&self, user_id: &UserId, limit: usize, offset: usize)
        -> Result<Page<TipRecord>>;

    /// List tips received by a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_tips_received(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<TipRecord>>;

    // =========================================================================
    // Content Operations
    // =========================================================================

    /// Register a content item so it can receive tips.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the content is registered.
    fn register_content(&self, stats: &ContentTipStats) -> Result<()>;

    /// Get the tip counters of a content item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_content(&self, content_id: &ContentId) -> Result<Option<ContentTipStats>>;

    // =========================================================================
    // Conversion Operations
    // =========================================================================

    /// Persist a `processing` conversion and hold its points.
    ///
    /// Returns the account balance after the hold.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientBalance` if available points are too low.
    /// - `StoreError::LimitExceeded` if a per-user limit would be exceeded.
    fn open_conversion(&self, record: &ConversionRecord, limits: &ConversionLimits)
        -> Result<Balance>;

    /// Mark a conversion completed: debit the points and release the hold.
    ///
    /// A terminal record is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the conversion doesn't exist.
    fn complete_conversion(
        &self,
        id: &ConversionId,
        transaction_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<ConversionOutcome>;

    /// Mark a conversion failed and release the hold.
    ///
    /// A terminal record is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the conversion doesn't exist.
    fn fail_conversion(
        &self,
        id: &ConversionId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<ConversionOutcome>;

    /// Get a conversion by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_conversion(&self, id: &ConversionId) -> Result<Option<ConversionRecord>>;

    /// List a user's conversions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_conversions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<ConversionRecord>>;

    /// List every conversion still in `processing`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_processing_conversions(&self) -> Result<Vec<ConversionRecord>>;
}
