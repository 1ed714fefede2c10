//! Discount resolution, charge computation, and reconciliation.
//!
//! Everything here is a pure function of its inputs: no I/O, no clock reads
//! (callers pass `now`), no mutation. All arithmetic is on integer minor
//! units.

use chrono::{DateTime, Utc};

use crate::error::{CheckoutError, Result};
use crate::models::{
    ChargeRequest, ChargeResult, Coupon, CouponCode, CouponKind, IntentId, Money, PaymentIntent,
    RegionPrice,
};

/// A coupon that passed validation, with the discount it grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedDiscount {
    /// The coupon that was applied.
    pub coupon: Coupon,
    /// Discount in the base amount's currency.
    pub discount_amount: Money,
}

/// Canonicalizes a customer-entered coupon code.
///
/// Lookups are case- and whitespace-insensitive: `" checkout-99 "`,
/// `"CHECKOUT-99"` and `"Checkout-99"` all canonicalize to `CHECKOUT-99`.
#[inline]
#[must_use]
pub fn canonicalize_code(raw: &str) -> Option<CouponCode> {
    CouponCode::parse(raw)
}

/// Discount granted by a rule against a base amount in minor units.
///
/// Percentages round half-up on minor units; fixed amounts never exceed the
/// base.
#[inline]
#[must_use]
pub fn discount_for(kind: CouponKind, base: u64) -> u64 {
    match kind {
        CouponKind::PercentOff(percent) => {
            let scaled = u128::from(base) * u128::from(percent) + 50;
            let rounded = scaled.checked_div(100).unwrap_or_default();
            u64::try_from(rounded).map_or(base, |discount| discount.min(base))
        }
        CouponKind::AmountOff(amount) => amount.min(base),
    }
}

/// Validates a looked-up coupon and computes its discount.
///
/// `found` is the catalog's answer for the canonical form of `raw_code`.
/// The same inputs always produce the same output.
///
/// # Errors
///
/// Returns [`CheckoutError::InvalidCoupon`] if the code is blank, unknown,
/// inactive, expired, or restricted to another currency.
#[inline]
pub fn resolve_coupon(
    raw_code: &str,
    found: Option<&Coupon>,
    base: Money,
    now: DateTime<Utc>,
) -> Result<AppliedDiscount> {
    let invalid = || CheckoutError::InvalidCoupon {
        code: raw_code.trim().to_owned(),
    };
    let canonical = canonicalize_code(raw_code).ok_or_else(invalid)?;
    let coupon = found
        .filter(|coupon| coupon.code == canonical)
        .ok_or_else(invalid)?;
    if !coupon.applies(base.currency, now) {
        tracing::debug!(code = %canonical, "coupon not applicable");
        return Err(invalid());
    }
    let discount = discount_for(coupon.kind, base.amount);
    Ok(AppliedDiscount {
        coupon: coupon.clone(),
        discount_amount: Money::new(discount, base.currency),
    })
}

/// Price before discounts: the override when present, else the region's
/// list price.
#[inline]
#[must_use]
pub fn original_amount(region: &RegionPrice, request: &ChargeRequest) -> Money {
    request.base_amount_override.unwrap_or(region.base_amount)
}

/// Composes base price and discount into a final charge.
///
/// If the discounted amount falls below `floor` (the processor minimum, in
/// minor units), the charge is raised to `floor` and `floor_clamped` is set.
///
/// # Errors
///
/// Returns [`CheckoutError::CurrencyMismatch`] if the discount is in a
/// different currency than the base, or [`CheckoutError::InvalidAmount`] if it
/// exceeds the base.
#[inline]
pub fn price_charge(
    region: &RegionPrice,
    request: &ChargeRequest,
    applied: Option<AppliedDiscount>,
    floor: u64,
) -> Result<ChargeResult> {
    let original = original_amount(region, request);
    let (discount, coupon_applied) = match applied {
        Some(AppliedDiscount {
            coupon,
            discount_amount,
        }) => (discount_amount, Some(coupon)),
        None => (Money::zero(original.currency), None),
    };
    let unclamped = original.checked_sub(discount)?;
    let floor_clamped = unclamped.amount < floor;
    let final_amount = if floor_clamped {
        tracing::debug!(
            unclamped = unclamped.amount,
            floor,
            "charge below processor minimum, clamping"
        );
        Money::new(floor, original.currency)
    } else {
        unclamped
    };
    Ok(ChargeResult {
        region: region.code,
        original_amount: original,
        discount_amount: discount,
        final_amount,
        currency: original.currency,
        coupon_applied,
        floor_clamped,
    })
}

/// Asserts the processor recorded exactly the computed charge under the
/// intent that was created.
///
/// The recorded amount must be a non-negative integer equal to the final
/// amount, and the recorded currency code must name the charge currency
/// (letter case is ignored).
///
/// # Errors
///
/// Returns [`CheckoutError::ChargeMismatch`] if the id, amount or currency
/// differ, including values no supported charge could produce.
#[inline]
pub fn reconcile(expected: &ChargeResult, created: &IntentId, intent: &PaymentIntent) -> Result<()> {
    let same_id = intent.id == *created;
    let same_amount = intent.amount.as_u64() == Some(expected.final_amount.amount);
    let same_currency = intent
        .currency
        .trim()
        .eq_ignore_ascii_case(expected.currency.code());
    if same_id && same_amount && same_currency {
        return Ok(());
    }
    Err(CheckoutError::ChargeMismatch {
        intent_id: created.to_string(),
        recorded_id: intent.id.to_string(),
        expected_amount: expected.final_amount.amount,
        expected_currency: expected.currency,
        actual_amount: intent.amount.to_string(),
        actual_currency: intent.currency.clone(),
    })
}
