//! Static ledger policies: tip bounds and conversion rules.
//!
//! Policies are loaded once at process start and treated as read-only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::token::tokens_for_points;

/// Smallest tip, in points.
pub const DEFAULT_MIN_TIP_AMOUNT: i64 = 1;

/// Largest tip, in points.
pub const DEFAULT_MAX_TIP_AMOUNT: i64 = 1000;

/// Longest tip message, in characters.
pub const MAX_TIP_MESSAGE_CHARS: usize = 200;

/// Points granted once when an account is created.
pub const DEFAULT_SIGNUP_BONUS_POINTS: i64 = 100;

/// Smallest conversion, in points.
pub const DEFAULT_MIN_CONVERSION_POINTS: i64 = 100;

/// Conversions must be a multiple of this many points.
pub const DEFAULT_CONVERSION_STEP_POINTS: i64 = 100;

/// Conversions a user may have in `processing` at once.
pub const DEFAULT_MAX_PENDING_CONVERSIONS: usize = 3;

/// Points a user may convert per UTC day.
pub const DEFAULT_DAILY_CONVERSION_LIMIT_POINTS: i64 = 100_000;

/// Decimals of the BAT token contract.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Sepolia.
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;

/// Tip validation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipPolicy {
    /// Smallest allowed tip.
    pub min_amount: i64,
    /// Largest allowed tip.
    pub max_amount: i64,
    /// Longest allowed message.
    pub max_message_chars: usize,
}

impl Default for TipPolicy {
    fn default() -> Self {
        Self {
            min_amount: DEFAULT_MIN_TIP_AMOUNT,
            max_amount: DEFAULT_MAX_TIP_AMOUNT,
            max_message_chars: MAX_TIP_MESSAGE_CHARS,
        }
    }
}

impl TipPolicy {
    /// Check the tip amount bounds.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` outside `min_amount..=max_amount`.
    pub fn check_amount(&self, amount: i64) -> Result<(), LedgerError> {
        if (self.min_amount..=self.max_amount).contains(&amount) {
            Ok(())
        } else {
            Err(LedgerError::InvalidAmount(format!(
                "tip amount must be between {} and {} BAT Points",
                self.min_amount, self.max_amount
            )))
        }
    }

    /// Trim the message and check its length. Blank messages become `None`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidInput` if the message is too long.
    pub fn normalize_message(&self, message: Option<&str>) -> Result<Option<String>, LedgerError> {
        let Some(message) = message.map(str::trim).filter(|m| !m.is_empty()) else {
            return Ok(None);
        };
        if message.chars().count() > self.max_message_chars {
            return Err(LedgerError::InvalidInput(format!(
                "message must be at most {} characters",
                self.max_message_chars
            )));
        }
        Ok(Some(message.to_string()))
    }
}

/// Conversion rules and the chain snapshot recorded on each conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionPolicy {
    /// Tokens per point.
    pub points_to_token_rate: Decimal,
    /// Smallest conversion.
    pub min_conversion_points: i64,
    /// Conversions must be a multiple of this.
    pub conversion_step_points: i64,
    /// In-flight conversions allowed per user.
    pub max_pending_per_user: usize,
    /// Points convertible per user per UTC day.
    pub daily_limit_points: i64,
    /// Token contract decimals.
    pub token_decimals: u8,
    /// Target chain.
    pub chain_id: u64,
}

impl Default for ConversionPolicy {
    fn default() -> Self {
        Self {
            points_to_token_rate: Decimal::new(1, 2),
            min_conversion_points: DEFAULT_MIN_CONVERSION_POINTS,
            conversion_step_points: DEFAULT_CONVERSION_STEP_POINTS,
            max_pending_per_user: DEFAULT_MAX_PENDING_CONVERSIONS,
            daily_limit_points: DEFAULT_DAILY_CONVERSION_LIMIT_POINTS,
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            chain_id: DEFAULT_CHAIN_ID,
        }
    }
}

impl ConversionPolicy {
    /// Check minimum and step.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` if `points` is below the minimum
    /// or not a multiple of the step.
    pub fn check_amount(&self, points: i64) -> Result<(), LedgerError> {
        if points < self.min_conversion_points {
            return Err(LedgerError::InvalidAmount(format!(
                "minimum conversion is {} points",
                self.min_conversion_points
            )));
        }
        if self.conversion_step_points > 0 && points % self.conversion_step_points != 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "points must be in multiples of {}",
                self.conversion_step_points
            )));
        }
        Ok(())
    }

    /// Tokens owed for `points` at the current rate.
    #[must_use]
    pub fn tokens_for(&self, points: i64) -> Decimal {
        tokens_for_points(points, self.points_to_token_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tip_bounds_are_inclusive() {
        let policy = TipPolicy::default();
        assert!(policy.check_amount(1).is_ok());
        assert!(policy.check_amount(1000).is_ok());
        assert!(matches!(
            policy.check_amount(0),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            policy.check_amount(1001),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn tip_message_is_trimmed_and_bounded() {
        let policy = TipPolicy::default();
        assert_eq!(
            policy.normalize_message(Some("  thanks!  ")).unwrap(),
            Some("thanks!".to_string())
        );
        assert_eq!(policy.normalize_message(Some("   ")).unwrap(), None);
        assert_eq!(policy.normalize_message(None).unwrap(), None);

        let long = "x".repeat(201);
        assert!(matches!(
            policy.normalize_message(Some(&long)),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn conversion_minimum_and_step() {
        let policy = ConversionPolicy::default();
        assert!(policy.check_amount(100).is_ok());
        assert!(policy.check_amount(300).is_ok());
        assert!(policy.check_amount(50).is_err());
        assert!(policy.check_amount(150).is_err());
    }

    #[test]
    fn default_rate_is_one_cent() {
        let policy = ConversionPolicy::default();
        assert_eq!(policy.tokens_for(300).to_string(), "3.00000000");
    }
}
