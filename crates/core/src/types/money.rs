//! Monetary amounts using decimal arithmetic.
//!
//! All prices are Colombian pesos stored as `numeric(12,2)`. `Money` keeps
//! that scale in Rust so order totals computed by the API match what the
//! database stores.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places carried by every amount.
pub const MONEY_SCALE: u32 = 2;

/// Errors produced when constructing or combining [`Money`] values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Amounts cannot be negative.
    #[error("amount cannot be negative")]
    Negative,
    /// The amount exceeds [`Money::MAX`].
    #[error("amount exceeds {}", Money::MAX)]
    Overflow,
}

/// A non-negative amount rounded to two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero pesos.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest amount a `numeric(12,2)` column holds: 9 999 999 999.99.
    pub const MAX: Self = Self(Decimal::from_parts(3_567_587_327, 232, 0, false, MONEY_SCALE));

    /// Create an amount, rounding half away from zero to two places.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] for negative input and
    /// [`MoneyError::Overflow`] above [`Money::MAX`].
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        bounded(round(amount))
    }

    /// The underlying decimal value.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Multiply by an item quantity.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] for a negative quantity and
    /// [`MoneyError::Overflow`] if the product does not fit.
    pub fn times(self, quantity: i32) -> Result<Self, MoneyError> {
        if quantity < 0 {
            return Err(MoneyError::Negative);
        }
        self.0
            .checked_mul(Decimal::from(quantity))
            .ok_or(MoneyError::Overflow)
            .and_then(|v| bounded(round(v)))
    }

    /// Apply a rate (for example a tax rate of `0.19`).
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] for a negative rate and
    /// [`MoneyError::Overflow`] if the product does not fit.
    pub fn apply_rate(self, rate: Decimal) -> Result<Self, MoneyError> {
        if rate.is_sign_negative() && !rate.is_zero() {
            return Err(MoneyError::Negative);
        }
        self.0
            .checked_mul(rate)
            .ok_or(MoneyError::Overflow)
            .and_then(|v| bounded(round(v)))
    }

    /// Add two amounts, failing on overflow.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the sum exceeds [`Money::MAX`].
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_add(other.0)
            .ok_or(MoneyError::Overflow)
            .and_then(bounded)
    }
}

fn bounded(value: Decimal) -> Result<Money, MoneyError> {
    if value > Money::MAX.0 {
        return Err(MoneyError::Overflow);
    }
    Ok(Money(value))
}

fn round(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Saturates at [`Money::MAX`]; use [`Money::checked_add`] to detect it.
impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs).unwrap_or(Self::MAX)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_new_rounds_half_away_from_zero() {
        assert_eq!(Money::new(dec("10.005")).unwrap().amount(), dec("10.01"));
        assert_eq!(Money::new(dec("10.004")).unwrap().amount(), dec("10.00"));
        assert_eq!(Money::new(dec("7")).unwrap().to_string(), "7.00");
    }

    #[test]
    fn test_new_rejects_negative() {
        assert_eq!(Money::new(dec("-0.01")), Err(MoneyError::Negative));
        assert!(Money::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_times_and_sum() {
        let croissant = Money::new(dec("2500.00")).unwrap();
        let baguette = Money::new(dec("4800.50")).unwrap();
        let lines = [croissant.times(12).unwrap(), baguette.times(3).unwrap()];
        let subtotal: Money = lines.into_iter().sum();
        assert_eq!(subtotal.amount(), dec("44401.50"));
        assert_eq!(croissant.times(-1), Err(MoneyError::Negative));
    }

    #[test]
    fn test_amounts_above_column_range_overflow() {
        assert_eq!(Money::MAX.to_string(), "9999999999.99");
        assert_eq!(Money::new(dec("9999999999.99")), Ok(Money::MAX));
        assert_eq!(Money::new(dec("99999999999")), Err(MoneyError::Overflow));
        // Rounds up past the limit
        assert_eq!(Money::new(dec("9999999999.995")), Err(MoneyError::Overflow));

        let price = Money::new(dec("2000000.00")).unwrap();
        assert_eq!(price.times(10_000), Err(MoneyError::Overflow));
        assert_eq!(
            Money::MAX.checked_add(Money::new(dec("0.01")).unwrap()),
            Err(MoneyError::Overflow)
        );
        assert_eq!(Money::MAX + Money::MAX, Money::MAX);
        assert_eq!(Money::MAX.apply_rate(dec("1.19")), Err(MoneyError::Overflow));
        assert!(serde_json::from_str::<Money>("\"10000000000\"").is_err());
    }

    #[test]
    fn test_apply_rate_rounds_tax() {
        let subtotal = Money::new(dec("1234.56")).unwrap();
        let tax = subtotal.apply_rate(dec("0.19")).unwrap();
        // 234.5664 -> 234.57
        assert_eq!(tax.amount(), dec("234.57"));
    }

    #[test]
    fn test_serde_uses_decimal_strings() {
        let money = Money::new(dec("15.5")).unwrap();
        let json = serde_json::to_string(&money).unwrap();
        assert_eq!(json, "\"15.50\"");

        let parsed: Money = serde_json::from_str("\"15.50\"").unwrap();
        assert_eq!(parsed, money);
        assert!(serde_json::from_str::<Money>("\"-3\"").is_err());
    }
}
