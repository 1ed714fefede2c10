//! Supported charge currencies.

use serde::{Deserialize, Serialize};

use crate::error::CheckoutError;

/// ISO-4217 currency accepted at checkout.
///
/// Serialized as the three-letter uppercase code. Deserialization accepts any
/// letter case because processors commonly echo codes in lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    /// Australian dollar.
    Aud,
    /// United States dollar.
    Usd,
    /// Pound sterling.
    Gbp,
    /// Euro.
    Eur,
    /// Canadian dollar.
    Cad,
    /// New Zealand dollar.
    Nzd,
}

impl Currency {
    /// All supported currencies.
    pub const ALL: [Self; 6] = [
        Self::Aud,
        Self::Usd,
        Self::Gbp,
        Self::Eur,
        Self::Cad,
        Self::Nzd,
    ];

    /// Returns the uppercase ISO-4217 code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Aud => "AUD",
            Self::Usd => "USD",
            Self::Gbp => "GBP",
            Self::Eur => "EUR",
            Self::Cad => "CAD",
            Self::Nzd => "NZD",
        }
    }

    /// Returns the display symbol.
    #[inline]
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Aud | Self::Usd | Self::Cad | Self::Nzd => "$",
            Self::Gbp => "\u{a3}",
            Self::Eur => "\u{20ac}",
        }
    }

    /// Number of decimal places between major and minor units.
    #[inline]
    #[must_use]
    pub const fn minor_exponent(self) -> u32 {
        match self {
            Self::Aud | Self::Usd | Self::Gbp | Self::Eur | Self::Cad | Self::Nzd => 2,
        }
    }

    /// Smallest amount, in minor units, the processor accepts for an intent.
    #[inline]
    #[must_use]
    pub const fn processor_minimum(self) -> u64 {
        match self {
            Self::Gbp => 30,
            Self::Aud | Self::Usd | Self::Eur | Self::Cad | Self::Nzd => 50,
        }
    }
}

impl core::fmt::Display for Currency {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl core::str::FromStr for Currency {
    type Err = CheckoutError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|currency| currency.code() == upper)
            .ok_or_else(|| CheckoutError::Config(format!("unsupported currency: {s}")))
    }
}

impl TryFrom<String> for Currency {
    type Error = CheckoutError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    #[inline]
    fn from(value: Currency) -> Self {
        value.code().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_uppercase() {
        let json = serde_json::to_string(&Currency::Aud).unwrap();
        assert_eq!(json, r#""AUD""#);
    }

    #[test]
    fn deserializes_any_case() {
        let lower: Currency = serde_json::from_str(r#""aud""#).unwrap();
        let mixed: Currency = serde_json::from_str(r#""Gbp""#).unwrap();
        assert_eq!(lower, Currency::Aud);
        assert_eq!(mixed, Currency::Gbp);
    }

    #[test]
    fn rejects_unknown_code() {
        assert!(serde_json::from_str::<Currency>(r#""JPY""#).is_err());
        assert!("XX".parse::<Currency>().is_err());
    }

    #[test]
    fn processor_minimums() {
        assert_eq!(Currency::Aud.processor_minimum(), 50);
        assert_eq!(Currency::Gbp.processor_minimum(), 30);
    }

    #[test]
    fn symbols() {
        assert_eq!(Currency::Nzd.symbol(), "$");
        assert_eq!(Currency::Eur.symbol(), "\u{20ac}");
    }
}
