//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Journal entries, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: journal entries by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Tip records, keyed by `tip_id` (ULID).
    pub const TIPS: &str = "tips";

    /// Index: tips by sender, keyed by `sender_id || tip_id`.
    pub const TIPS_BY_SENDER: &str = "tips_by_sender";

    /// Index: tips by recipient, keyed by `recipient_id || tip_id`.
    pub const TIPS_BY_RECIPIENT: &str = "tips_by_recipient";

    /// Content tip counters, keyed by `content_id`.
    pub const CONTENTS: &str = "contents";

    /// Conversion records, keyed by `conversion_id` (ULID).
    pub const CONVERSIONS: &str = "conversions";

    /// Index: conversions by user, keyed by `user_id || conversion_id`.
    pub const CONVERSIONS_BY_USER: &str = "conversions_by_user";

    /// Index: conversions still in `processing`, keyed by `user_id || conversion_id`.
    /// Entries are removed when the conversion reaches a terminal state.
    pub const CONVERSIONS_PROCESSING: &str = "conversions_processing";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::TIPS,
        cf::TIPS_BY_SENDER,
        cf::TIPS_BY_RECIPIENT,
        cf::CONTENTS,
        cf::CONVERSIONS,
        cf::CONVERSIONS_BY_USER,
        cf::CONVERSIONS_PROCESSING,
    ]
}
