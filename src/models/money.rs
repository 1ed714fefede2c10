//! Integer minor-unit money.

use serde::{Deserialize, Serialize};

use super::Currency;
use crate::error::{CheckoutError, Result};

/// An amount in minor currency units (e.g. cents) with its currency.
///
/// Amounts are never represented as fractional major units; the only
/// conversion to major units is [`Money::format_major`], which is for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    /// Amount in minor units.
    pub amount: u64,
    /// Currency of the amount.
    pub currency: Currency,
}

impl Money {
    /// Creates a new amount.
    #[inline]
    #[must_use]
    pub const fn new(amount: u64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Zero in the given currency.
    #[inline]
    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self {
            amount: 0,
            currency,
        }
    }

    /// Returns `true` if the amount is zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.amount == 0
    }

    /// Subtracts `other`, failing on currency mismatch or underflow.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::CurrencyMismatch`] if the currencies differ
    /// and [`CheckoutError::InvalidAmount`] if the result would be negative.
    #[inline]
    pub fn checked_sub(self, other: Self) -> Result<Self> {
        self.ensure_same_currency(other)?;
        let amount = self.amount.checked_sub(other.amount).ok_or_else(|| {
            CheckoutError::InvalidAmount(format!("{other} exceeds {self}"))
        })?;
        Ok(Self::new(amount, self.currency))
    }

    /// Fails unless both amounts share a currency.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::CurrencyMismatch`] if the currencies differ.
    #[inline]
    pub fn ensure_same_currency(self, other: Self) -> Result<()> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(CheckoutError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            })
        }
    }

    /// Formats the amount in major units, e.g. `1.20` for 120 cents.
    ///
    /// Uses integer division so the output is exact.
    #[inline]
    #[must_use]
    pub fn format_major(self) -> String {
        let exponent = self.currency.minor_exponent();
        let scale = 10_u64.pow(exponent);
        let major = self.amount.checked_div(scale).unwrap_or_default();
        let minor = self.amount.checked_rem(scale).unwrap_or_default();
        if exponent == 0 {
            return major.to_string();
        }
        let width = usize::try_from(exponent).unwrap_or(2);
        format!("{major}.{minor:0width$}")
    }

    /// Formats the amount with its currency symbol and code, e.g.
    /// `$1.20 AUD`.
    #[inline]
    #[must_use]
    pub fn display_with_symbol(self) -> String {
        format!(
            "{}{} {}",
            self.currency.symbol(),
            self.format_major(),
            self.currency
        )
    }
}

impl core::fmt::Display for Money {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
