//! Pricing regions and country codes.

use serde::{Deserialize, Serialize};

use super::{Currency, Money};
use crate::error::CheckoutError;

/// Pricing bucket a customer is placed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegionCode {
    /// Australia (the default region).
    Au,
    /// United States and the rest of the Americas.
    Us,
    /// United Kingdom.
    Gb,
    /// European Union and neighbours.
    Eu,
    /// Canada.
    Ca,
    /// New Zealand.
    Nz,
}

impl RegionCode {
    /// All pricing regions.
    pub const ALL: [Self; 6] = [Self::Au, Self::Us, Self::Gb, Self::Eu, Self::Ca, Self::Nz];

    /// Returns the two-letter uppercase code.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Au => "AU",
            Self::Us => "US",
            Self::Gb => "GB",
            Self::Eu => "EU",
            Self::Ca => "CA",
            Self::Nz => "NZ",
        }
    }
}

impl core::fmt::Display for RegionCode {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RegionCode {
    type Err = CheckoutError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|region| region.as_str() == upper)
            .ok_or_else(|| CheckoutError::Config(format!("unknown region code: {s}")))
    }
}

/// ISO-3166 alpha-2 country code, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    /// Validates and uppercases a two-letter country code.
    ///
    /// Returns `None` unless the input is exactly two ASCII letters.
    #[inline]
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (trimmed.len() == 2 && trimmed.chars().all(|ch| ch.is_ascii_alphabetic()))
            .then(|| Self(trimmed.to_ascii_uppercase()))
    }

    /// Returns the uppercase code.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CountryCode {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = CheckoutError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
            .ok_or_else(|| CheckoutError::Config(format!("invalid country code: {value}")))
    }
}

impl From<CountryCode> for String {
    #[inline]
    fn from(value: CountryCode) -> Self {
        value.0
    }
}

/// Base list price for a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionPrice {
    /// Region this price applies to.
    pub code: RegionCode,
    /// List price before discounts.
    pub base_amount: Money,
    /// Display symbol shown next to prices.
    pub symbol: String,
}

impl RegionPrice {
    /// Creates a region price using the currency's own symbol.
    #[inline]
    #[must_use]
    pub fn new(code: RegionCode, base_amount: Money) -> Self {
        Self {
            code,
            base_amount,
            symbol: base_amount.currency.symbol().to_owned(),
        }
    }

    /// Currency charged in this region.
    #[inline]
    #[must_use]
    pub const fn currency(&self) -> Currency {
        self.base_amount.currency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_code_serde() {
        let json = serde_json::to_string(&RegionCode::Nz).unwrap();
        assert_eq!(json, r#""NZ""#);
        let region: RegionCode = serde_json::from_str(r#""EU""#).unwrap();
        assert_eq!(region, RegionCode::Eu);
    }

    #[test]
    fn region_code_parse_is_case_insensitive() {
        assert_eq!(" gb ".parse::<RegionCode>().unwrap(), RegionCode::Gb);
        assert!("XX".parse::<RegionCode>().is_err());
    }

    #[test]
    fn country_code_parse() {
        assert_eq!(CountryCode::parse("au").unwrap().as_str(), "AU");
        assert!(CountryCode::parse("AUS").is_none());
        assert!(CountryCode::parse("1A").is_none());
        assert!(CountryCode::parse("").is_none());
    }

    #[test]
    fn deserialize_region_price() {
        let json = r#"{
            "code": "AU",
            "baseAmount": { "amount": 12000, "currency": "AUD" },
            "symbol": "$"
        }"#;
        let price: RegionPrice = serde_json::from_str(json).unwrap();
        assert_eq!(price.code, RegionCode::Au);
        assert_eq!(price.base_amount, Money::new(12_000, Currency::Aud));
        assert_eq!(price.currency(), Currency::Aud);
    }
}
