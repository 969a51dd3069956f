//! Balance mutation rules shared by every backend.
//!
//! Each function checks its precondition against the account as read under
//! lock and only then mutates it, so a failed check leaves the account
//! untouched.

use chrono::{DateTime, Duration, Utc};

use batpoints_core::{
    Account, ConversionRecord, ConversionStatus, LedgerError, PointsTransaction, TipRecord,
    TransactionType,
};

use crate::error::{Result, StoreError};
use crate::ConversionLimits;

/// Fail with `InsufficientBalance` unless `required` points are spendable.
pub(crate) fn ensure_available(account: &Account, required: i64) -> Result<()> {
    if account.can_spend(required) {
        Ok(())
    } else {
        Err(StoreError::InsufficientBalance {
            available: account.available_points(),
            required,
        })
    }
}

/// Credit the one-time signup bonus.
pub(crate) fn grant_bonus(account: &mut Account, bonus: i64, at: DateTime<Utc>) {
    account.balance_points += bonus;
    account.lifetime_bonus += bonus;
    account.touch(at);
}

/// Apply a signed adjustment. Debits may not dip into held points.
pub(crate) fn adjust(account: &mut Account, delta: i64, at: DateTime<Utc>) -> Result<()> {
    if delta == 0 {
        return Err(LedgerError::InvalidAmount("adjustment must be non-zero".into()).into());
    }
    if delta < 0 {
        let debit = delta
            .checked_neg()
            .ok_or_else(|| LedgerError::InvalidAmount("adjustment out of range".into()))?;
        ensure_available(account, debit)?;
    }
    account.balance_points = credited(account.balance_points, delta)?;
    account.touch(at);
    Ok(())
}

/// `balance + amount`, rejecting overflow.
fn credited(balance: i64, amount: i64) -> Result<i64> {
    balance
        .checked_add(amount)
        .ok_or_else(|| LedgerError::InvalidAmount("resulting balance out of range".into()).into())
}

/// Move `amount` points from `sender` to `recipient` as a tip.
pub(crate) fn settle_tip(
    sender: &mut Account,
    recipient: &mut Account,
    amount: i64,
    at: DateTime<Utc>,
) -> Result<()> {
    ensure_available(sender, amount)?;
    let recipient_balance = credited(recipient.balance_points, amount)?;

    sender.balance_points -= amount;
    sender.lifetime_tipped_out += amount;
    sender.touch(at);

    recipient.balance_points = recipient_balance;
    recipient.lifetime_tipped_in = recipient.lifetime_tipped_in.saturating_add(amount);
    recipient.touch(at);
    Ok(())
}

/// Reserve points for an in-flight conversion.
pub(crate) fn place_hold(account: &mut Account, points: i64, at: DateTime<Utc>) -> Result<()> {
    ensure_available(account, points)?;
    account.held_points += points;
    account.touch(at);
    Ok(())
}

/// Debit a completed conversion and release its hold.
pub(crate) fn settle_conversion(
    account: &mut Account,
    points: i64,
    at: DateTime<Utc>,
) -> Result<()> {
    if account.held_points < points || account.balance_points < points {
        return Err(StoreError::Invariant(format!(
            "account {} cannot settle {points} points (balance={}, held={})",
            account.user_id, account.balance_points, account.held_points
        )));
    }
    account.balance_points -= points;
    account.held_points -= points;
    account.lifetime_converted += points;
    account.touch(at);
    Ok(())
}

/// Release the hold of a failed conversion. The balance is untouched.
pub(crate) fn release_hold(account: &mut Account, points: i64, at: DateTime<Utc>) -> Result<()> {
    if account.held_points < points {
        return Err(StoreError::Invariant(format!(
            "account {} holds {} points, cannot release {points}",
            account.user_id, account.held_points
        )));
    }
    account.held_points -= points;
    account.touch(at);
    Ok(())
}

/// Check the per-user conversion limits against the user's existing records.
///
/// `existing` may be any subset of the user's conversions that contains every
/// record created in the last 24 hours.
pub(crate) fn check_conversion_limits<'a>(
    request: &ConversionRecord,
    existing: impl IntoIterator<Item = &'a ConversionRecord>,
    limits: &ConversionLimits,
) -> Result<()> {
    let window_start = request.created_at - Duration::hours(24);
    let mut in_flight = 0usize;
    let mut recent_points = 0i64;

    for record in existing {
        if matches!(
            record.status,
            ConversionStatus::Processing | ConversionStatus::Pending
        ) {
            in_flight += 1;
        }
        if record.status != ConversionStatus::Failed && record.created_at >= window_start {
            recent_points += record.points_amount;
        }
    }

    if in_flight >= limits.max_in_flight {
        return Err(StoreError::LimitExceeded(format!(
            "at most {} conversions may be in progress",
            limits.max_in_flight
        )));
    }
    if recent_points + request.points_amount > limits.daily_limit_points {
        return Err(StoreError::LimitExceeded(format!(
            "daily conversion limit of {} points reached ({recent_points} used)",
            limits.daily_limit_points
        )));
    }
    Ok(())
}

/// Shorthand for a missing record.
pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

/// Journal entries for both sides of a tip, after it was applied.
pub(crate) fn tip_journal(
    tip: &TipRecord,
    sender: &Account,
    recipient: &Account,
) -> (PointsTransaction, PointsTransaction) {
    let sent = PointsTransaction::new(
        tip.sender_id,
        tip.amount,
        TransactionType::TipSent,
        sender.balance_points,
        format!("Tip to {}", tip.recipient_id),
    )
    .with_related_user(tip.recipient_id)
    .with_related_content(tip.content_id);
    let received = PointsTransaction::new(
        tip.recipient_id,
        tip.amount,
        TransactionType::TipReceived,
        recipient.balance_points,
        format!("Tip from {}", tip.sender_id),
    )
    .with_related_user(tip.sender_id)
    .with_related_content(tip.content_id);
    (sent, received)
}

/// Journal entry for a completed conversion, after it was settled.
pub(crate) fn conversion_journal(record: &ConversionRecord, account: &Account) -> PointsTransaction {
    PointsTransaction::new(
        record.user_id,
        record.points_amount,
        TransactionType::Conversion,
        account.balance_points,
        format!(
            "Converted to {} BAT ({})",
            record.estimated_tokens, record.id
        ),
    )
}

/// Journal entry for the signup bonus.
pub(crate) fn bonus_journal(account: &Account, bonus: i64) -> PointsTransaction {
    PointsTransaction::new(
        account.user_id,
        bonus,
        TransactionType::SignupBonus,
        account.balance_points,
        "Signup bonus",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use batpoints_core::{ConversionPolicy, UserId};

    fn funded(points: i64) -> Account {
        let mut account = Account::new(UserId::generate());
        account.balance_points = points;
        account
    }

    #[test]
    fn tip_moves_points_and_counters() {
        let mut sender = funded(100);
        let mut recipient = funded(0);
        settle_tip(&mut sender, &mut recipient, 40, Utc::now()).unwrap();

        assert_eq!(sender.balance_points, 60);
        assert_eq!(sender.lifetime_tipped_out, 40);
        assert_eq!(recipient.balance_points, 40);
        assert_eq!(recipient.lifetime_tipped_in, 40);
    }

    #[test]
    fn tip_cannot_spend_held_points() {
        let mut sender = funded(100);
        place_hold(&mut sender, 80, Utc::now()).unwrap();
        let mut recipient = funded(0);

        let err = settle_tip(&mut sender, &mut recipient, 30, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientBalance {
                available: 20,
                required: 30
            }
        ));
        assert_eq!(sender.balance_points, 100);
        assert_eq!(recipient.balance_points, 0);
    }

    #[test]
    fn hold_then_settle_or_release() {
        let mut account = funded(500);
        place_hold(&mut account, 300, Utc::now()).unwrap();
        assert_eq!(account.available_points(), 200);

        let mut released = account.clone();
        release_hold(&mut released, 300, Utc::now()).unwrap();
        assert_eq!(released.balance_points, 500);
        assert_eq!(released.held_points, 0);

        settle_conversion(&mut account, 300, Utc::now()).unwrap();
        assert_eq!(account.balance_points, 200);
        assert_eq!(account.held_points, 0);
        assert_eq!(account.lifetime_converted, 300);
    }

    #[test]
    fn settling_without_hold_is_an_invariant_error() {
        let mut account = funded(500);
        assert!(matches!(
            settle_conversion(&mut account, 300, Utc::now()),
            Err(StoreError::Invariant(_))
        ));
        assert_eq!(account.balance_points, 500);
    }

    #[test]
    fn adjustments_respect_available_points() {
        let mut account = funded(50);
        adjust(&mut account, 25, Utc::now()).unwrap();
        assert_eq!(account.balance_points, 75);

        assert!(matches!(
            adjust(&mut account, -76, Utc::now()),
            Err(StoreError::InsufficientBalance { .. })
        ));
        assert!(adjust(&mut account, 0, Utc::now()).is_err());
    }

    #[test]
    fn out_of_range_adjustments_are_rejected() {
        let mut account = funded(10);

        assert!(matches!(
            adjust(&mut account, i64::MIN, Utc::now()),
            Err(StoreError::Ledger(LedgerError::InvalidAmount(_)))
        ));
        assert!(matches!(
            adjust(&mut account, i64::MAX, Utc::now()),
            Err(StoreError::Ledger(LedgerError::InvalidAmount(_)))
        ));
        assert_eq!(account.balance_points, 10);
    }

    #[test]
    fn tip_cannot_overflow_recipient() {
        let mut sender = funded(100);
        let mut recipient = funded(i64::MAX - 10);

        let err = settle_tip(&mut sender, &mut recipient, 50, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::InvalidAmount(_))));
        assert_eq!(sender.balance_points, 100);
        assert_eq!(recipient.balance_points, i64::MAX - 10);
    }

    #[test]
    fn conversion_limits() {
        let policy = ConversionPolicy::default();
        let limits = ConversionLimits {
            max_in_flight: 2,
            daily_limit_points: 1_000,
        };
        let user = UserId::generate();
        let addr = "0x52908400098527886E0F7030069857D2E4169EE7";

        let a = ConversionRecord::processing(user, 300, addr, &policy);
        let b = ConversionRecord::processing(user, 300, addr, &policy);
        let request = ConversionRecord::processing(user, 300, addr, &policy);
        assert!(matches!(
            check_conversion_limits(&request, [&a, &b], &limits),
            Err(StoreError::LimitExceeded(_))
        ));

        let mut done = a.clone();
        done.complete("0xabc", Utc::now()).unwrap();
        let mut failed = b.clone();
        failed.fail("boom", Utc::now()).unwrap();
        // Failed conversions do not count toward the daily cap.
        assert!(check_conversion_limits(&request, [&done, &failed], &limits).is_ok());

        let big = ConversionRecord::processing(user, 800, addr, &policy);
        assert!(matches!(
            check_conversion_limits(&big, [&done], &limits),
            Err(StoreError::LimitExceeded(_))
        ));
    }
}
