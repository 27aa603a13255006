//! Type-safe price representation using decimal arithmetic.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors from constructing or combining prices.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// Catalog prices are never negative.
    #[error("price cannot be negative: {0}")]
    Negative(Decimal),
    /// Two prices in different currencies were combined.
    #[error("cannot combine {left:?} with {right:?}")]
    CurrencyMismatch {
        /// Currency of the left operand.
        left: CurrencyCode,
        /// Currency of the right operand.
        right: CurrencyCode,
    },
}

/// A non-negative amount of money in one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPrice")]
pub struct Price {
    /// Amount in the currency's standard unit (dollars, not cents).
    amount: Decimal,
    /// ISO 4217 currency code.
    currency_code: CurrencyCode,
}

/// Wire shape of [`Price`] before the sign check.
#[derive(Deserialize)]
struct RawPrice {
    amount: Decimal,
    #[serde(default)]
    currency_code: CurrencyCode,
}

impl TryFrom<RawPrice> for Price {
    type Error = PriceError;

    fn try_from(raw: RawPrice) -> Result<Self, Self::Error> {
        Self::new(raw.amount, raw.currency_code)
    }
}

impl Price {
    /// Create a price, rejecting negative amounts.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] if `amount < 0`.
    pub fn new(amount: Decimal, currency_code: CurrencyCode) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative(amount));
        }
        Ok(Self {
            amount,
            currency_code,
        })
    }

    /// Build a price from an integer number of minor units (cents).
    ///
    /// Negative input is clamped to zero.
    #[must_use]
    pub fn from_minor_units(cents: i64, currency_code: CurrencyCode) -> Self {
        Self {
            amount: Decimal::new(cents.max(0), 2),
            currency_code,
        }
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency_code,
        }
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    /// The currency.
    #[must_use]
    pub const fn currency_code(&self) -> CurrencyCode {
        self.currency_code
    }

    /// This price multiplied by a quantity, saturating at `Decimal::MAX`.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        Self {
            amount: self.amount.saturating_mul(Decimal::from(quantity)),
            currency_code: self.currency_code,
        }
    }

    /// Add two prices of the same currency, saturating at `Decimal::MAX`.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::CurrencyMismatch`] when the currencies differ.
    pub fn checked_add(&self, other: &Self) -> Result<Self, PriceError> {
        if self.currency_code != other.currency_code {
            return Err(PriceError::CurrencyMismatch {
                left: self.currency_code,
                right: other.currency_code,
            });
        }
        Ok(Self {
            amount: self.amount.saturating_add(other.amount),
            currency_code: self.currency_code,
        })
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency_code.code())
    }
}

/// ISO 4217 currency codes the catalog may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// The three-letter code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_negative() {
        let err = Price::new(Decimal::new(-1, 0), CurrencyCode::USD).unwrap_err();
        assert!(matches!(err, PriceError::Negative(_)));
        assert!(Price::new(Decimal::ZERO, CurrencyCode::USD).is_ok());
    }

    #[test]
    fn test_times_and_add() {
        let shirt = Price::from_minor_units(2_499, CurrencyCode::USD);
        let total = shirt
            .times(3)
            .checked_add(&Price::from_minor_units(1, CurrencyCode::USD))
            .unwrap();
        assert_eq!(total.amount(), Decimal::new(7_498, 2));
    }

    #[test]
    fn test_arithmetic_saturates() {
        let huge = Price::new(Decimal::MAX, CurrencyCode::USD).unwrap();
        assert_eq!(huge.times(u32::MAX).amount(), Decimal::MAX);
        assert_eq!(huge.checked_add(&huge).unwrap().amount(), Decimal::MAX);
    }

    #[test]
    fn test_add_currency_mismatch() {
        let usd = Price::from_minor_units(100, CurrencyCode::USD);
        let eur = Price::from_minor_units(100, CurrencyCode::EUR);
        assert_eq!(
            usd.checked_add(&eur),
            Err(PriceError::CurrencyMismatch {
                left: CurrencyCode::USD,
                right: CurrencyCode::EUR,
            })
        );
    }

    #[test]
    fn test_serde_amount_as_string() {
        let price = Price::from_minor_units(10_000, CurrencyCode::USD);
        let json = serde_json::to_value(price).unwrap();
        assert_eq!(json["amount"], "100.00");
        assert_eq!(json["currency_code"], "USD");

        let parsed: Price = serde_json::from_str(r#"{"amount":"50"}"#).unwrap();
        assert_eq!(parsed.currency_code(), CurrencyCode::USD);
        assert_eq!(parsed.to_string(), "50.00 USD");

        assert!(serde_json::from_str::<Price>(r#"{"amount":"-5"}"#).is_err());
    }
}
