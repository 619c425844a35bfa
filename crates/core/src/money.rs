//! Monetary amounts in minor currency units.

use core::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Non-negative amount in the smallest currency unit (cents).
///
/// Amounts travel as decimal strings with at most two fractional digits
/// (`"50.00"`, `"12.5"`, `"7"`), which keeps the wire format exact. Plain
/// numbers are accepted on input.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    /// Smallest valid fee amount (0.01).
    pub const MIN_CHARGE: Money = Money(1);

    /// Largest amount a single fee, or the unpaid total of one owner, may
    /// reach. Matches the range of a signed 64-bit cents column.
    pub const MAX_CHARGE: Money = Money(i64::MAX as u64);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Sum a sequence of amounts, failing once the total passes `MAX_CHARGE`.
    pub fn checked_sum<I>(amounts: I) -> Result<Money, DomainError>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts.into_iter().try_fold(Money::ZERO, |acc, m| {
            acc.checked_add(m)
                .filter(|total| *total <= Money::MAX_CHARGE)
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "total exceeds the maximum of {}",
                        Money::MAX_CHARGE
                    ))
                })
        })
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DomainError::validation("amount is required"));
        }
        if s.starts_with('-') {
            return Err(DomainError::validation("amount must not be negative"));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!("invalid amount '{s}'")));
        }
        if frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "invalid amount '{s}' (at most two decimal places)"
            )));
        }

        let overflow = || DomainError::validation(format!("amount '{s}' is too large"));

        let whole: u64 = whole.parse().map_err(|_| overflow())?;
        let frac_cents: u64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().map_err(|_| overflow())? * 10,
            _ => frac.parse().map_err(|_| overflow())?,
        };

        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .map(Money)
            .ok_or_else(overflow)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepts a decimal string or a plain JSON number (`50`, `12.5`).
impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

struct MoneyVisitor;

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("a non-negative amount with at most two decimal places")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        v.checked_mul(100)
            .map(Money)
            .ok_or_else(|| E::custom(format!("amount '{v}' is too large")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        let v = u64::try_from(v).map_err(|_| E::custom("amount must not be negative"))?;
        self.visit_u64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        if !v.is_finite() {
            return Err(E::custom("amount must be a finite number"));
        }
        self.visit_str(&v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_common_forms() {
        assert_eq!("50.00".parse::<Money>().unwrap(), Money::from_cents(5000));
        assert_eq!("12.5".parse::<Money>().unwrap(), Money::from_cents(1250));
        assert_eq!("7".parse::<Money>().unwrap(), Money::from_cents(700));
        assert_eq!(" 0.01 ".parse::<Money>().unwrap(), Money::MIN_CHARGE);
    }

    #[test]
    fn rejects_negative_and_malformed() {
        for bad in ["", "-1.00", "1.234", "abc", ".50", "1.x", "1e3"] {
            let err = bad.parse::<Money>().unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "accepted {bad:?}");
        }
    }

    #[test]
    fn displays_with_two_decimals() {
        assert_eq!(Money::from_cents(5000).to_string(), "50.00");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn serde_uses_decimal_strings() {
        let json = serde_json::to_string(&Money::from_cents(10050)).unwrap();
        assert_eq!(json, "\"100.50\"");
        let back: Money = serde_json::from_str("\"100.5\"").unwrap();
        assert_eq!(back, Money::from_cents(10050));
    }

    #[test]
    fn deserializes_plain_numbers() {
        assert_eq!(serde_json::from_str::<Money>("50").unwrap(), Money::from_cents(5000));
        assert_eq!(serde_json::from_str::<Money>("12.5").unwrap(), Money::from_cents(1250));
        assert_eq!(serde_json::from_str::<Money>("0.01").unwrap(), Money::MIN_CHARGE);
        for bad in ["-5", "1.234", "true", "null"] {
            assert!(serde_json::from_str::<Money>(bad).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn checked_sum_rejects_totals_past_the_cap() {
        let err = Money::checked_sum([Money::from_cents(u64::MAX), Money::MIN_CHARGE]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = Money::checked_sum([Money::MAX_CHARGE, Money::MIN_CHARGE]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        assert_eq!(
            Money::checked_sum([Money::from_cents(i64::MAX as u64 - 1), Money::MIN_CHARGE]).unwrap(),
            Money::MAX_CHARGE
        );
    }

    proptest! {
        #[test]
        fn checked_sum_matches_integer_sum(cents in proptest::collection::vec(0u64..1_000_000, 0..32)) {
            let expected: u64 = cents.iter().sum();
            let total = Money::checked_sum(cents.iter().copied().map(Money::from_cents)).unwrap();
            prop_assert_eq!(total.cents(), expected);
        }

        #[test]
        fn displayed_amounts_parse_back(cents in 0u64..10_000_000_000) {
            let m = Money::from_cents(cents);
            prop_assert_eq!(m.to_string().parse::<Money>().unwrap(), m);
        }
    }
}
