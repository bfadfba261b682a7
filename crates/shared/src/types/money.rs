//! Money type with fixed-point precision.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! This type wraps `rust_decimal::Decimal` and keeps full precision through
//! every intermediate sum. Rounding to two decimal places happens only at the
//! output boundary via [`Money::to_output`].

use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places money is rounded to at the output boundary.
pub const OUTPUT_DECIMAL_PLACES: u32 = 2;

/// A monetary amount in the store's single operating currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// The zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Creates a new Money instance.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Returns the unrounded amount.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly negative.
    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Returns true if the amount is strictly positive.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Multiplies a unit price by a quantity without rounding.
    #[must_use]
    pub fn times(self, quantity: Decimal) -> Self {
        Self(self.0 * quantity)
    }

    /// Rounds to exactly two decimal places, half away from zero.
    ///
    /// Only call this when a value leaves the ledger core.
    #[must_use]
    pub fn to_output(self) -> Decimal {
        let mut rounded = self
            .0
            .round_dp_with_strategy(OUTPUT_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(OUTPUT_DECIMAL_PLACES);
        rounded
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_zero() {
        assert!(Money::ZERO.is_zero());
        assert!(!Money::ZERO.is_negative());
        assert!(!Money::ZERO.is_positive());
    }

    #[test]
    fn test_money_sign() {
        assert!(Money::new(dec!(10)).is_positive());
        assert!(Money::new(dec!(-10)).is_negative());
    }

    #[test]
    fn test_output_rounds_to_two_places() {
        assert_eq!(Money::new(dec!(10.005)).to_output(), dec!(10.01));
        assert_eq!(Money::new(dec!(10.004)).to_output(), dec!(10.00));
        assert_eq!(Money::new(dec!(-10.005)).to_output(), dec!(-10.01));
        assert_eq!(Money::new(dec!(7)).to_output().to_string(), "7.00");
    }

    #[test]
    fn test_accumulation_does_not_round() {
        // 1000 * 0.333 rounded per step would drift to 330.00
        let total: Money = (0..1000).map(|_| Money::new(dec!(0.333))).sum();
        assert_eq!(total.amount(), dec!(333.000));
        assert_eq!(total.to_output(), dec!(333.00));
    }

    #[test]
    fn test_times_keeps_precision() {
        let value = Money::new(dec!(12.345)).times(dec!(3));
        assert_eq!(value.amount(), dec!(37.035));
        assert_eq!(value.to_output(), dec!(37.04));
    }

    #[test]
    fn test_arithmetic_and_min() {
        let mut balance = Money::new(dec!(100));
        balance -= Money::new(dec!(40));
        balance += Money::new(dec!(5));
        assert_eq!(balance, Money::new(dec!(65)));
        assert_eq!(balance.min(Money::new(dec!(30))), Money::new(dec!(30)));
        assert_eq!(-balance, Money::new(dec!(-65)));
    }

    #[test]
    fn test_display_uses_output_boundary() {
        assert_eq!(Money::new(dec!(1.5)).to_string(), "1.50");
    }
}
