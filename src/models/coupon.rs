//! Coupon model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Currency;
use crate::error::CheckoutError;

/// Canonical coupon code: trimmed and uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    /// Canonicalizes a raw code as typed by a customer.
    ///
    /// Returns `None` for blank input.
    #[inline]
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_uppercase()))
    }

    /// Returns the canonical code.
    #[inline]
    #[must_use]
    pub fn as_inner(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CouponCode {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CouponCode {
    type Error = CheckoutError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(CheckoutError::InvalidCoupon { code: value })
    }
}

impl From<CouponCode> for String {
    #[inline]
    fn from(value: CouponCode) -> Self {
        value.0
    }
}

/// How a coupon discounts the base price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CouponKind {
    /// Percentage off, in `1..=100`.
    PercentOff(u8),
    /// Fixed amount off, in minor units, greater than zero.
    AmountOff(u64),
}

/// A named discount rule.
///
/// On the wire exactly one of `percentOff` or `amountOff` is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCoupon", into = "RawCoupon")]
pub struct Coupon {
    /// Canonical code.
    pub code: CouponCode,
    /// Discount rule.
    pub kind: CouponKind,
    /// Inactive coupons never apply.
    pub active: bool,
    /// Restricts the coupon to one charge currency.
    pub currency: Option<Currency>,
    /// The coupon stops applying at this instant.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Coupon {
    /// Creates an active percentage-off coupon.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::InvalidAmount`] unless `percent` is in
    /// `1..=100`, and [`CheckoutError::InvalidCoupon`] for a blank code.
    #[inline]
    pub fn percent_off(code: &str, percent: u8) -> Result<Self, CheckoutError> {
        Self::new(code, CouponKind::PercentOff(percent))
    }

    /// Creates an active fixed-amount coupon.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::InvalidAmount`] if `amount` is zero, and
    /// [`CheckoutError::InvalidCoupon`] for a blank code.
    #[inline]
    pub fn amount_off(code: &str, amount: u64) -> Result<Self, CheckoutError> {
        Self::new(code, CouponKind::AmountOff(amount))
    }

    /// Creates an active coupon after validating its rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is blank or the rule is out of range.
    #[inline]
    pub fn new(code: &str, kind: CouponKind) -> Result<Self, CheckoutError> {
        let canonical = CouponCode::parse(code).ok_or_else(|| CheckoutError::InvalidCoupon {
            code: code.to_owned(),
        })?;
        validate_kind(kind)?;
        Ok(Self {
            code: canonical,
            kind,
            active: true,
            currency: None,
            expires_at: None,
        })
    }

    /// Marks the coupon inactive.
    #[inline]
    #[must_use]
    pub const fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Restricts the coupon to one currency.
    #[inline]
    #[must_use]
    pub const fn restricted_to(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    /// Sets an expiry instant.
    #[inline]
    #[must_use]
    pub const fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Returns `true` if the coupon can be applied to a charge in
    /// `currency` at `now`.
    #[inline]
    #[must_use]
    pub fn applies(&self, currency: Currency, now: DateTime<Utc>) -> bool {
        self.active
            && self.currency.is_none_or(|only| only == currency)
            && self.expires_at.is_none_or(|at| now < at)
    }
}

/// Checks the range invariants of a discount rule.
fn validate_kind(kind: CouponKind) -> Result<(), CheckoutError> {
    match kind {
        CouponKind::PercentOff(percent) if percent == 0 || percent > 100 => Err(
            CheckoutError::InvalidAmount(format!("percent off must be 1..=100, got {percent}")),
        ),
        CouponKind::AmountOff(0) => Err(CheckoutError::InvalidAmount(
            "amount off must be greater than zero".to_owned(),
        )),
        CouponKind::PercentOff(_) | CouponKind::AmountOff(_) => Ok(()),
    }
}

/// Wire representation of a [`Coupon`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCoupon {
    /// Code as stored.
    code: String,
    /// Percentage off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    percent_off: Option<u8>,
    /// Amount off in minor units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amount_off: Option<u64>,
    /// Active flag (defaults to active).
    #[serde(default = "default_active")]
    active: bool,
    /// Currency restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    currency: Option<Currency>,
    /// Expiry instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Serde default for [`RawCoupon::active`].
const fn default_active() -> bool {
    true
}

impl TryFrom<RawCoupon> for Coupon {
    type Error = CheckoutError;

    #[inline]
    fn try_from(raw: RawCoupon) -> Result<Self, Self::Error> {
        let kind = match (raw.percent_off, raw.amount_off) {
            (Some(percent), None) => CouponKind::PercentOff(percent),
            (None, Some(amount)) => CouponKind::AmountOff(amount),
            (Some(_), Some(_)) | (None, None) => {
                return Err(CheckoutError::InvalidAmount(format!(
                    "coupon {} must set exactly one of percentOff or amountOff",
                    raw.code
                )));
            }
        };
        let mut coupon = Self::new(&raw.code, kind)?;
        coupon.active = raw.active;
        coupon.currency = raw.currency;
        coupon.expires_at = raw.expires_at;
        Ok(coupon)
    }
}

impl From<Coupon> for RawCoupon {
    #[inline]
    fn from(coupon: Coupon) -> Self {
        let (percent_off, amount_off) = match coupon.kind {
            CouponKind::PercentOff(percent) => (Some(percent), None),
            CouponKind::AmountOff(amount) => (None, Some(amount)),
        };
        Self {
            code: coupon.code.into(),
            percent_off,
            amount_off,
            active: coupon.active,
            currency: coupon.currency,
            expires_at: coupon.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_canonicalization() {
        let a = CouponCode::parse(" checkout-99 ").unwrap();
        let b = CouponCode::parse("CHECKOUT-99").unwrap();
        let c = CouponCode::parse("Checkout-99").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.as_inner(), "CHECKOUT-99");
        assert!(CouponCode::parse("   ").is_none());
    }

    #[test]
    fn deserialize_percent_coupon() {
        let json = r#"{ "code": "checkout-99", "percentOff": 99 }"#;
        let coupon: Coupon = serde_json::from_str(json).unwrap();
        assert_eq!(coupon.code.as_inner(), "CHECKOUT-99");
        assert_eq!(coupon.kind, CouponKind::PercentOff(99));
        assert!(coupon.active);
        assert!(coupon.currency.is_none());
    }

    #[test]
    fn deserialize_amount_coupon_with_restrictions() {
        let json = r#"{
            "code": "TENOFF",
            "amountOff": 1000,
            "active": false,
            "currency": "aud",
            "expiresAt": "2030-01-01T00:00:00Z"
        }"#;
        let coupon: Coupon = serde_json::from_str(json).unwrap();
        assert_eq!(coupon.kind, CouponKind::AmountOff(1_000));
        assert!(!coupon.active);
        assert_eq!(coupon.currency, Some(Currency::Aud));
        assert!(coupon.expires_at.is_some());
    }

    #[test]
    fn rejects_both_or_neither_discount() {
        let both = r#"{ "code": "X", "percentOff": 10, "amountOff": 100 }"#;
        let neither = r#"{ "code": "X" }"#;
        assert!(serde_json::from_str::<Coupon>(both).is_err());
        assert!(serde_json::from_str::<Coupon>(neither).is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(Coupon::percent_off("X", 0).is_err());
        assert!(Coupon::percent_off("X", 101).is_err());
        assert!(Coupon::percent_off("X", 100).is_ok());
        assert!(Coupon::amount_off("X", 0).is_err());
        assert!(Coupon::amount_off("  ", 10).is_err());
    }

    #[test]
    fn serializes_single_discount_field() {
        let coupon = Coupon::amount_off("tenoff", 1_000).unwrap();
        let json = serde_json::to_value(&coupon).unwrap();
        assert_eq!(json["code"], "TENOFF");
        assert_eq!(json["amountOff"], 1_000);
        assert!(json.get("percentOff").is_none());
        assert_eq!(json["active"], true);
    }

    #[test]
    fn applies_respects_active_currency_and_expiry() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let later = DateTime::from_timestamp(1_800_000_000, 0).unwrap();
        let earlier = DateTime::from_timestamp(1_600_000_000, 0).unwrap();

        let plain = Coupon::percent_off("A", 10).unwrap();
        assert!(plain.applies(Currency::Usd, now));
        assert!(!plain.clone().deactivated().applies(Currency::Usd, now));

        let aud_only = plain.clone().restricted_to(Currency::Aud);
        assert!(aud_only.applies(Currency::Aud, now));
        assert!(!aud_only.applies(Currency::Usd, now));

        assert!(plain.clone().expiring_at(later).applies(Currency::Usd, now));
        assert!(!plain.expiring_at(earlier).applies(Currency::Usd, now));
    }
}
