//! Core types and utilities for the BAT Points ledger.
//!
//! This crate provides the foundational types used throughout the ledger:
//!
//! - **Identifiers**: `UserId`, `ContentId`, `TransactionId`, `TipId`, `ConversionId`
//! - **Accounts**: `Account`, `Balance`
//! - **Journal**: `PointsTransaction`, `TransactionType`
//! - **Tips**: `TipRecord`, `ContentTipStats`, `TipPolicy`
//! - **Conversions**: `ConversionRecord`, `ConversionStatus`, `ConversionPolicy`
//!
//! # Point Unit
//!
//! **1 BAT Point = 1 unit of `i64`.** Points are whole numbers; token amounts
//! produced by a conversion are `Decimal` values fixed at 8 decimal places.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod conversion;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod policy;
pub mod tip;
pub mod token;

pub use account::{Account, Balance};
pub use conversion::{ConversionRecord, ConversionStatus};
pub use error::{LedgerError, Result};
pub use ids::{ContentId, ConversionId, IdError, TipId, TransactionId, UserId};
pub use ledger::{PointsTransaction, TransactionType};
pub use policy::{
    ConversionPolicy, TipPolicy, DEFAULT_CHAIN_ID, DEFAULT_DAILY_CONVERSION_LIMIT_POINTS,
    DEFAULT_MAX_PENDING_CONVERSIONS, DEFAULT_MAX_TIP_AMOUNT, DEFAULT_MIN_CONVERSION_POINTS,
    DEFAULT_MIN_TIP_AMOUNT, DEFAULT_CONVERSION_STEP_POINTS, DEFAULT_SIGNUP_BONUS_POINTS,
    DEFAULT_TOKEN_DECIMALS, MAX_TIP_MESSAGE_CHARS,
};
pub use tip::{ContentTipStats, TipRecord};
pub use token::{is_valid_address, tokens_for_points, TOKEN_SCALE};
