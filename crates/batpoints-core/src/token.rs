//! Token amount arithmetic.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places stored for token amounts.
pub const TOKEN_SCALE: u32 = 8;

/// Tokens owed for `points` at `rate` tokens per point.
///
/// Rounded to [`TOKEN_SCALE`] places, midpoint away from zero, and always
/// carried at exactly that scale so `300 * 0.01` renders as `3.00000000`.
#[must_use]
pub fn tokens_for_points(points: i64, rate: Decimal) -> Decimal {
    let mut tokens = (Decimal::from(points) * rate)
        .round_dp_with_strategy(TOKEN_SCALE, RoundingStrategy::MidpointAwayFromZero);
    tokens.rescale(TOKEN_SCALE);
    tokens
}

/// Check that `address` looks like an EVM account address (`0x` + 40 hex digits).
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
