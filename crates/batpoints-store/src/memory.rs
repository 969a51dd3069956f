//! In-memory storage implementation.
//!
//! Every operation runs under one mutex, so the whole store is trivially
//! linearizable. Nothing survives a restart.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use batpoints_core::{
    Account, Balance, ContentId, ContentTipStats, ConversionId, ConversionRecord,
    ConversionStatus, LedgerError, PointsTransaction, TipId, TipRecord, TransactionType, UserId,
};

use crate::error::{Result, StoreError};
use crate::rules;
use crate::{ConversionLimits, ConversionOutcome, Page, Store, TipReceipt};

#[derive(Default)]
struct Inner {
    accounts: HashMap<UserId, Account>,
    transactions: Vec<PointsTransaction>,
    tips: Vec<TipRecord>,
    contents: HashMap<ContentId, ContentTipStats>,
    conversions: Vec<ConversionRecord>,
}

impl Inner {
    fn account(&self, user_id: &UserId) -> Result<Account> {
        self.accounts
            .get(user_id)
            .cloned()
            .ok_or_else(|| rules::not_found("account", user_id))
    }

    fn conversion_index(&self, id: &ConversionId) -> Result<usize> {
        self.conversions
            .iter()
            .position(|c| c.id == *id)
            .ok_or_else(|| rules::not_found("conversion", id))
    }
}

/// Store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn finalize(
        &self,
        id: &ConversionId,
        at: DateTime<Utc>,
        apply: impl FnOnce(&mut ConversionRecord, &mut Account) -> Result<()>,
    ) -> Result<ConversionOutcome> {
        let mut inner = self.inner.lock();
        let index = inner.conversion_index(id)?;
        let mut record = inner.conversions[index].clone();
        if record.is_terminal() {
            return Ok(ConversionOutcome {
                record,
                changed: false,
            });
        }

        let mut account = inner.account(&record.user_id)?;
        apply(&mut record, &mut account)?;
        record.updated_at = at;

        if record.status == ConversionStatus::Completed {
            let entry = rules::conversion_journal(&record, &account);
            inner.transactions.push(entry);
        }
        inner.accounts.insert(account.user_id, account);
        inner.conversions[index] = record.clone();

        Ok(ConversionOutcome {
            record,
            changed: true,
        })
    }
}

impl Store for MemoryStore {
    fn create_account(&self, account: &Account, signup_bonus: i64) -> Result<Account> {
        let mut inner = self.inner.lock();
        if inner.accounts.contains_key(&account.user_id) {
            return Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.user_id.to_string(),
            });
        }

        let mut account = account.clone();
        if signup_bonus > 0 {
            rules::grant_bonus(&mut account, signup_bonus, Utc::now());
            inner
                .transactions
                .push(rules::bonus_journal(&account, signup_bonus));
        }
        inner.accounts.insert(account.user_id, account.clone());
        Ok(account)
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        Ok(self.inner.lock().accounts.get(user_id).cloned())
    }

    fn apply_delta(
        &self,
        user_id: &UserId,
        delta: i64,
        description: &str,
    ) -> Result<PointsTransaction> {
        let mut inner = self.inner.lock();
        let mut account = inner.account(user_id)?;
        rules::adjust(&mut account, delta, Utc::now())?;

        let entry = PointsTransaction::new(
            *user_id,
            delta,
            TransactionType::AdminAdjustment,
            account.balance_points,
            description,
        );
        inner.transactions.push(entry.clone());
        inner.accounts.insert(*user_id, account);
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
        let mut inner = self.inner.lock();
        let mut source = inner.account(from)?;
        let mut target = inner.account(to)?;
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

        inner.transactions.push(debit.clone());
        inner.transactions.push(credit.clone());
        inner.accounts.insert(*from, source);
        inner.accounts.insert(*to, target);
        Ok((debit, credit))
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<PointsTransaction>> {
        let inner = self.inner.lock();
        let entries = inner
            .transactions
            .iter()
            .filter(|t| t.user_id == *user_id)
            .cloned()
            .collect();
        Ok(Page::newest_first(entries, limit, offset))
    }

    fn record_tip(&self, tip: &TipRecord) -> Result<TipReceipt> {
        if tip.sender_id == tip.recipient_id {
            return Err(LedgerError::SelfTipNotAllowed.into());
        }
        let mut inner = self.inner.lock();
        let mut sender = inner.account(&tip.sender_id)?;
        let mut recipient = inner.account(&tip.recipient_id)?;
        rules::ensure_available(&sender, tip.amount)?;

        let mut content = match &tip.content_id {
            Some(content_id) => Some(inner.contents.get(content_id).cloned().ok_or_else(|| {
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

        let receipt = TipReceipt {
            tip: tip.clone(),
            sender_balance: sender.balance(),
            recipient_balance: recipient.balance(),
        };
        inner.transactions.push(sent);
        inner.transactions.push(received);
        inner.tips.push(tip.clone());
        if let Some(stats) = content {
            inner.contents.insert(stats.content_id, stats);
        }
        inner.accounts.insert(sender.user_id, sender);
        inner.accounts.insert(recipient.user_id, recipient);
        Ok(receipt)
    }

    fn get_tip(&self, tip_id: &TipId) -> Result<Option<TipRecord>> {
        let inner = self.inner.lock();
        Ok(inner.tips.iter().find(|t| t.id == *tip_id).cloned())
    }

    fn list_tips_sent(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<TipRecord>> {
        let inner = self.inner.lock();
        let tips = inner
            .tips
            .iter()
            .filter(|t| t.sender_id == *user_id)
            .cloned()
            .collect();
        Ok(Page::newest_first(tips, limit, offset))
    }

    fn list_tips_received(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<TipRecord>> {
        let inner = self.inner.lock();
        let tips = inner
            .tips
            .iter()
            .filter(|t| t.recipient_id == *user_id)
            .cloned()
            .collect();
        Ok(Page::newest_first(tips, limit, offset))
    }

    fn register_content(&self, stats: &ContentTipStats) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.contents.contains_key(&stats.content_id) {
            return Err(StoreError::AlreadyExists {
                entity: "content",
                id: stats.content_id.to_string(),
            });
        }
        inner.contents.insert(stats.content_id, stats.clone());
        Ok(())
    }

    fn get_content(&self, content_id: &ContentId) -> Result<Option<ContentTipStats>> {
        Ok(self.inner.lock().contents.get(content_id).cloned())
    }

    fn open_conversion(
        &self,
        record: &ConversionRecord,
        limits: &ConversionLimits,
    ) -> Result<Balance> {
        let mut inner = self.inner.lock();
        if inner.conversions.iter().any(|c| c.id == record.id) {
            return Err(StoreError::AlreadyExists {
                entity: "conversion",
                id: record.id.to_string(),
            });
        }
        let mut account = inner.account(&record.user_id)?;
        rules::ensure_available(&account, record.points_amount)?;
        rules::check_conversion_limits(
            record,
            inner
                .conversions
                .iter()
                .filter(|c| c.user_id == record.user_id),
            limits,
        )?;
        rules::place_hold(&mut account, record.points_amount, record.created_at)?;

        let balance = account.balance();
        inner.accounts.insert(account.user_id, account);
        inner.conversions.push(record.clone());
        Ok(balance)
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
        let inner = self.inner.lock();
        Ok(inner.conversions.iter().find(|c| c.id == *id).cloned())
    }

    fn list_conversions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Page<ConversionRecord>> {
        let inner = self.inner.lock();
        let records = inner
            .conversions
            .iter()
            .filter(|c| c.user_id == *user_id)
            .cloned()
            .collect();
        Ok(Page::newest_first(records, limit, offset))
    }

    fn list_processing_conversions(&self) -> Result<Vec<ConversionRecord>> {
        let inner = self.inner.lock();
        Ok(inner
            .conversions
            .iter()
            .filter(|c| !c.is_terminal())
            .cloned()
            .collect())
    }
}
