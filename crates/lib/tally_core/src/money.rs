//! Monetary amounts in integer minor units.
//!
//! Amounts are stored and summed as cents so that balances never drift.
//! On the wire they are plain JSON numbers with two decimal places.
//!
//! Arithmetic is checked: every operation returns `None` on overflow.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// An amount of money in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Convert a major-unit value (e.g. `12.5`) to cents, rounding half away
    /// from zero. Returns `None` for non-finite or out-of-range input.
    pub fn from_major(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Self::from_rounded(value * 100.0)
    }

    pub fn as_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Price-per-unit times a (possibly fractional) quantity, rounded to the cent.
    pub fn times(self, quantity: f64) -> Option<Self> {
        if !quantity.is_finite() {
            return None;
        }
        Self::from_rounded(self.0 as f64 * quantity)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn checked_neg(self) -> Option<Money> {
        self.0.checked_neg().map(Money)
    }

    /// Total of `amounts`, or `None` if it does not fit.
    pub fn checked_sum<I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
    }

    fn from_rounded(cents: f64) -> Option<Self> {
        let rounded = cents.round();
        if rounded.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self(rounded as i64))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_major())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Money::from_major(value)
            .ok_or_else(|| de::Error::custom(format!("invalid monetary amount: {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_units_at_fifty_is_exactly_five_hundred() {
        let price = Money::from_major(50.0).unwrap();
        let amount = price.times(10.0).unwrap();
        assert_eq!(amount, Money::from_cents(50_000));
        assert_eq!(amount.to_string(), "500.00");
    }

    #[test]
    fn fractional_quantities_round_to_the_cent() {
        let price = Money::from_major(33.33).unwrap();
        // 3333 * 1.5 = 4999.5 -> rounds away from zero
        assert_eq!(price.times(1.5), Some(Money::from_cents(5000)));
        assert_eq!(Money::from_major(19.999), Some(Money::from_cents(2000)));
    }

    #[test]
    fn non_finite_input_is_rejected() {
        assert_eq!(Money::from_major(f64::NAN), None);
        assert_eq!(Money::from_major(f64::INFINITY), None);
        assert_eq!(Money::from_cents(100).times(f64::NAN), None);
    }

    #[test]
    fn display_handles_negative_amounts() {
        assert_eq!(Money::from_cents(-1234).to_string(), "-12.34");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn sums_without_drift() {
        let dime = Money::from_major(0.1).unwrap();
        let total = Money::checked_sum(std::iter::repeat_n(dime, 1000));
        assert_eq!(total, Some(Money::from_cents(10_000)));
    }

    #[test]
    fn overflow_is_reported_instead_of_wrapping() {
        let big = Money::from_major(90_000_000_000_000_000.0).unwrap();
        assert_eq!(big.checked_add(big), None);
        assert_eq!(Money::checked_sum([big, big]), None);
        assert_eq!(Money::from_cents(i64::MIN).checked_neg(), None);
        assert_eq!(Money::from_cents(i64::MIN).checked_sub(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(700).checked_sub(Money::from_cents(1000)),
            Some(Money::from_cents(-300))
        );
    }

    #[test]
    fn serializes_as_json_number() {
        let json = serde_json::to_string(&Money::from_cents(50_000)).unwrap();
        assert_eq!(json, "500.0");
        let parsed: Money = serde_json::from_str("12.34").unwrap();
        assert_eq!(parsed, Money::from_cents(1234));
    }
}
