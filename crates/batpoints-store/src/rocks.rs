//! `RocksDB` storage implementation.
//!
//! Each mutating operation reads the records it needs under the stripe locks
//! of every account (and content item) it touches, checks the ledger rules,
//! and commits all writes in a single `WriteBatch`.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use batpoints_core::{
    Account, Balance, ContentId, ContentTipStats, ConversionId, ConversionRecord,
    ConversionStatus, LedgerError, PointsTransaction, TipId, TipRecord, TransactionType, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::locks::StripedLocks;
use crate::rules;
use crate::schema::{all_column_families, cf};
use crate::{ConversionLimits, ConversionOutcome, Page, Store, TipReceipt};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    locks: StripedLocks,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_locks(path, StripedLocks::default())
    }

    /// Open a database with a custom lock table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open_with_locks<P: AsRef<Path>>(path: P, locks: StripedLocks) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            locks,
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn read<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn load_account(&self, user_id: &UserId) -> Result<Account> {
        self.read(cf::ACCOUNTS, &keys::account_key(user_id))?
            .ok_or_else(|| rules::not_found("account", user_id))
    }

    fn load_conversion(&self, id: &ConversionId) -> Result<ConversionRecord> {
        self.read(cf::CONVERSIONS, &keys::record_key(id.to_bytes()))?
            .ok_or_else(|| rules::not_found("conversion", id))
    }

    fn stage<T: serde::Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(&cf, key, Self::serialize(value)?);
        Ok(())
    }

    /// Stage an index entry (empty value).
    fn stage_index(&self, batch: &mut WriteBatch, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(&cf, key, []);
        Ok(())
    }

    fn stage_account(&self, batch: &mut WriteBatch, account: &Account) -> Result<()> {
        self.stage(batch, cf::ACCOUNTS, &keys::account_key(&account.user_id), account)
    }

    fn stage_journal(&self, batch: &mut WriteBatch, entry: &PointsTransaction) -> Result<()> {
        let id = entry.id.to_bytes();
        self.stage(batch, cf::TRANSACTIONS, &keys::record_key(id), entry)?;
        self.stage_index(
            batch,
            cf::TRANSACTIONS_BY_USER,
            &keys::user_index_key(&entry.user_id, id),
        )
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Record ids under a per-user index prefix, oldest first.
    fn index_ids(&self, index_cf: &str, prefix: &[u8]) -> Result<Vec<[u8; 16]>> {
        let cf = self.cf(index_cf)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            if let Some(id) = keys::ulid_from_index_key(&key) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Read one newest-first page of records through a per-user index.
    fn page<T: serde::de::DeserializeOwned>(
        &self,
        index_cf: &str,
        record_cf: &str,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<T>> {
        let ids = self.index_ids(index_cf, &keys::user_prefix(user_id))?;
        let total = ids.len();

        let mut items = Vec::new();
        for id in ids.into_iter().rev().skip(offset).take(limit) {
            if let Some(record) = self.read(record_cf, &keys::record_key(id))? {
                items.push(record);
            }
        }
        Ok(Page { items, total })
    }

    /// A user's conversions that can affect the per-user limits: everything
    /// created in the last day plus anything older still in flight.
    fn limit_relevant_conversions(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConversionRecord>> {
        let mut records = Vec::new();
        for id in self
            .index_ids(cf::CONVERSIONS_BY_USER, &keys::user_prefix(user_id))?
            .into_iter()
            .rev()
        {
            let record = self.load_conversion(&ConversionId::from_bytes(id))?;
            if record.created_at < since {
                break;
            }
            records.push(record);
        }

        for id in self.index_ids(cf::CONVERSIONS_PROCESSING, &keys::user_prefix(user_id))? {
            let record = self.load_conversion(&ConversionId::from_bytes(id))?;
            if record.created_at < since {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn finalize(
        &self,
        id: &ConversionId,
        at: DateTime<Utc>,
        apply: impl FnOnce(&mut ConversionRecord, &mut Account) -> Result<()>,
    ) -> Result<ConversionOutcome> {
        let user_id = self.load_conversion(id)?.user_id;
        let _guard = self.locks.lock(&[user_id.as_bytes()])?;

        // Re-read under the lock: a concurrent finalize may have won.
        let mut record = self.load_conversion(id)?;
        if record.is_terminal() {
            return Ok(ConversionOutcome {
                record,
                changed: false,
            });
        }

        let mut account = self.load_account(&user_id)?;
        apply(&mut record, &mut account)?;
        record.updated_at = at;

        let record_key = keys::record_key(id.to_bytes());
        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.stage(&mut batch, cf::CONVERSIONS, &record_key, &record)?;
        let processing = self.cf(cf::CONVERSIONS_PROCESSING)?;
        batch.delete_cf(&processing, keys::user_index_key(&user_id, id.to_bytes()));
        if record.status == ConversionStatus::Completed {
            self.stage_journal(&mut batch, &rules::conversion_journal(&record, &account))?;
        }
        self.commit(batch)?;

        tracing::info!(
            conversion_id = %id,
            user_id = %user_id,
            status = %record.status,
            balance = account.balance_points,
            held = account.held_points,
            "Conversion finalized"
        );

        Ok(ConversionOutcome {
            record,
            changed: true,
        })
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn create_account(&self, account: &Account, signup_bonus: i64) -> Result<Account> {
        let _guard = self.locks.lock(&[account.user_id.as_bytes()])?;
        if self.get_account(&account.user_id)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.user_id.to_string(),
            });
        }

        let mut account = account.clone();
        let mut batch = WriteBatch::default();
        if signup_bonus > 0 {
            rules::grant_bonus(&mut account, signup_bonus, Utc::now());
            self.stage_journal(&mut batch, &rules::bonus_journal(&account, signup_bonus))?;
        }
        self.stage_account(&mut batch, &account)?;
        self.commit(batch)?;

        Ok(account)
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.read(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn apply_delta(
        &self,
        user_id: &UserId,
        delta: i64,
        description: &str,
    ) -> Result<PointsTransaction> {
        let _guard = self.locks.lock(&[user_id.as_bytes()])?;
        let mut account = self.load_account(user_id)?;
        rules::adjust(&mut account, delta, Utc::now())?;

        let entry = PointsTransaction::new(
            *user_id,
            delta,
            TransactionType::AdminAdjustment,
            account.balance_points,
            description,
        );

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.stage_journal(&mut batch, &entry)?;
        self.commit(batch)?;

        Ok(entry)
    }

    fn apply_paired_delta(
        &self,
        from: &UserId,
        to: &UserId,
        amount: i64,
        description: &str,
    ) -> Result<(PointsTransaction, PointsTransaction)> {
        if from == to || amount <= 0 {
            return Err(LedgerError::InvalidInput(
                "paired delta needs two accounts and a positive amount".into(),
            )
            .into());
        }
        let _guard = self.locks.lock(&[from.as_bytes(), to.as_bytes()])?;
        let mut source = self.load_account(from)?;
        let mut target = self.load_account(to)?;
        let at = Utc::now();
        rules::adjust(&mut source, -amount, at)?;
        rules::adjust(&mut target, amount, at)?;

        let debit = PointsTransaction::new(
            *from,
            -amount,
            TransactionType::AdminAdjustment,
            source.balance_points,
            description,
        )
        .with_related_user(*to);
        let credit = PointsTransaction::new(
            *to,
            amount,
            TransactionType::AdminAdjustment,
            target.balance_points,
            description,
        )
        .with_related_user(*from);

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &source)?;
        self.stage_account(&mut batch, &target)?;
        self.stage_journal(&mut batch, &debit)?;
        self.stage_journal(&mut batch, &credit)?;
        self.commit(batch)?;

        Ok((debit, credit))
    }

    // =========================================================================
    // Journal Operations
    // =========================================================================

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<PointsTransaction>> {
        self.page(
            cf::TRANSACTIONS_BY_USER,
            cf::TRANSACTIONS,
            user_id,
            limit,
            offset,
        )
    }

    // =========================================================================
    // Tip Operations
    // =========================================================================

    fn record_tip(&self, tip: &TipRecord) -> Result<TipReceipt> {
        if tip.sender_id == tip.recipient_id {
            return Err(LedgerError::SelfTipNotAllowed.into());
        }

        let mut lock_keys = vec![tip.sender_id.as_bytes(), tip.recipient_id.as_bytes()];
        if let Some(content_id) = &tip.content_id {
            lock_keys.push(content_id.as_bytes());
        }
        let _guard = self.locks.lock(&lock_keys)?;

        let mut sender = self.load_account(&tip.sender_id)?;
        let mut recipient = self.load_account(&tip.recipient_id)?;
        rules::ensure_available(&sender, tip.amount)?;

        let mut content: Option<ContentTipStats> = match &tip.content_id {
            Some(content_id) => Some(self.get_content(content_id)?.ok_or_else(|| {
                StoreError::ContentNotFound {
                    content_id: content_id.to_string(),
                }
            })?),
            None => None,
        };

        let at = tip.created_at;
        rules::settle_tip(&mut sender, &mut recipient, tip.amount, at)?;
        if let Some(stats) = content.as_mut() {
            stats.record_tip(tip.amount, at);
        }
        let (sent, received) = rules::tip_journal(tip, &sender, &recipient);

        let tip_id = tip.id.to_bytes();
        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &sender)?;
        self.stage_account(&mut batch, &recipient)?;
        self.stage_journal(&mut batch, &sent)?;
        self.stage_journal(&mut batch, &received)?;
        self.stage(&mut batch, cf::TIPS, &keys::record_key(tip_id), tip)?;
        self.stage_index(
            &mut batch,
            cf::TIPS_BY_SENDER,
            &keys::user_index_key(&tip.sender_id, tip_id),
        )?;
        self.stage_index(
            &mut batch,
            cf::TIPS_BY_RECIPIENT,
            &keys::user_index_key(&tip.recipient_id, tip_id),
        )?;
        if let Some(stats) = &content {
            self.stage(
                &mut batch,
                cf::CONTENTS,
                &keys::content_key(&stats.content_id),
                stats,
            )?;
        }
        self.commit(batch)?;

        Ok(TipReceipt {
            tip: tip.clone(),
            sender_balance: sender.balance(),
            recipient_balance: recipient.balance(),
        })
    }

    fn get_tip(&self, tip_id: &TipId) -> Result<Option<TipRecord>> {
        self.read(cf::TIPS, &keys::record_key(tip_id.to_bytes()))
    }

    fn list_tips_sent(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<TipRecord>> {
        self.page(cf::TIPS_BY_SENDER, cf::TIPS, user_id, limit, offset)
    }

    fn list_tips_received(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<TipRecord>> {
        self.page(cf::TIPS_BY_RECIPIENT, cf::TIPS, user_id, limit, offset)
    }

    // =========================================================================
    // Content Operations
    // =========================================================================

    fn register_content(&self, stats: &ContentTipStats) -> Result<()> {
        let _guard = self.locks.lock(&[stats.content_id.as_bytes()])?;
        if self.get_content(&stats.content_id)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "content",
                id: stats.content_id.to_string(),
            });
        }

        let cf = self.cf(cf::CONTENTS)?;
        self.db
            .put_cf(&cf, keys::content_key(&stats.content_id), Self::serialize(stats)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_content(&self, content_id: &ContentId) -> Result<Option<ContentTipStats>> {
        self.read(cf::CONTENTS, &keys::content_key(content_id))
    }

    // =========================================================================
    // Conversion Operations
    // =========================================================================

    fn open_conversion(
        &self,
        record: &ConversionRecord,
        limits: &ConversionLimits,
    ) -> Result<Balance> {
        let _guard = self.locks.lock(&[record.user_id.as_bytes()])?;
        let conversion_id = record.id.to_bytes();
        if self
            .read::<ConversionRecord>(cf::CONVERSIONS, &keys::record_key(conversion_id))?
            .is_some()
        {
            return Err(StoreError::AlreadyExists {
                entity: "conversion",
                id: record.id.to_string(),
            });
        }

        let mut account = self.load_account(&record.user_id)?;
        rules::ensure_available(&account, record.points_amount)?;
        let existing =
            self.limit_relevant_conversions(&record.user_id, record.created_at - Duration::hours(24))?;
        rules::check_conversion_limits(record, &existing, limits)?;
        rules::place_hold(&mut account, record.points_amount, record.created_at)?;

        let index_key = keys::user_index_key(&record.user_id, conversion_id);
        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.stage(&mut batch, cf::CONVERSIONS, &keys::record_key(conversion_id), record)?;
        self.stage_index(&mut batch, cf::CONVERSIONS_BY_USER, &index_key)?;
        self.stage_index(&mut batch, cf::CONVERSIONS_PROCESSING, &index_key)?;
        self.commit(batch)?;

        Ok(account.balance())
    }

    fn complete_conversion(
        &self,
        id: &ConversionId,
        transaction_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<ConversionOutcome> {
        self.finalize(id, at, |record, account| {
            rules::settle_conversion(account, record.points_amount, at)?;
            record.complete(transaction_hash, at)?;
            Ok(())
        })
    }

    fn fail_conversion(
        &self,
        id: &ConversionId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<ConversionOutcome> {
        self.finalize(id, at, |record, account| {
            rules::release_hold(account, record.points_amount, at)?;
            record.fail(reason, at)?;
            Ok(())
        })
    }

    fn get_conversion(&self, id: &ConversionId) -> Result<Option<ConversionRecord>> {
        self.read(cf::CONVERSIONS, &keys::record_key(id.to_bytes()))
    }

    fn list_conversions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<ConversionRecord>> {
        self.page(
            cf::CONVERSIONS_BY_USER,
            cf::CONVERSIONS,
            user_id,
            limit,
            offset,
        )
    }

    fn list_processing_conversions(&self) -> Result<Vec<ConversionRecord>> {
        let cf = self.cf(cf::CONVERSIONS_PROCESSING)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if let Some(id) = keys::ulid_from_index_key(&key) {
                if let Some(record) = self.get_conversion(&ConversionId::from_bytes(id))? {
                    records.push(record);
                }
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}
