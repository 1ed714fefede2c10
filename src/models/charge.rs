//! Charge request and result models.

use serde::{Deserialize, Serialize};

use super::{CartId, Coupon, Currency, Money, ProductId, RegionCode};

/// Whether the purchase is a one-off payment or a subscription's first
/// charge. Both use the same discount rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PurchaseKind {
    /// Single payment for lifetime access.
    #[default]
    OneOff,
    /// Recurring subscription.
    Subscription,
}

/// One checkout attempt's pricing input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    /// Cart or session the charge belongs to; seeds the idempotency key.
    pub cart_id: CartId,
    /// Region the customer was placed into.
    pub region: RegionCode,
    /// Coupon code exactly as the customer typed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    /// Replaces the region's base price (and currency) when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_amount_override: Option<Money>,
    /// One-off or subscription purchase.
    #[serde(default)]
    pub purchase_kind: PurchaseKind,
    /// Product being purchased.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    /// Customer email, forwarded to post-purchase notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
}

impl ChargeRequest {
    /// Creates a request for the region's list price with no coupon.
    #[inline]
    #[must_use]
    pub const fn new(cart_id: CartId, region: RegionCode) -> Self {
        Self {
            cart_id,
            region,
            coupon_code: None,
            base_amount_override: None,
            purchase_kind: PurchaseKind::OneOff,
            product_id: None,
            customer_email: None,
        }
    }

    /// Attaches a coupon code. Blank codes are treated as no coupon.
    #[inline]
    #[must_use]
    pub fn coupon<T: Into<String>>(mut self, code: T) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    /// Overrides the base price.
    #[inline]
    #[must_use]
    pub const fn base_amount(mut self, amount: Money) -> Self {
        self.base_amount_override = Some(amount);
        self
    }

    /// Sets the purchase kind.
    #[inline]
    #[must_use]
    pub const fn kind(mut self, kind: PurchaseKind) -> Self {
        self.purchase_kind = kind;
        self
    }

    /// Sets the product identifier.
    #[inline]
    #[must_use]
    pub fn product(mut self, id: ProductId) -> Self {
        self.product_id = Some(id);
        self
    }

    /// Sets the customer email.
    #[inline]
    #[must_use]
    pub fn customer_email<T: Into<String>>(mut self, email: T) -> Self {
        self.customer_email = Some(email.into());
        self
    }
}

/// Priced outcome of a checkout attempt.
///
/// Unless `floor_clamped` is set, `final_amount = original_amount -
/// discount_amount`. When the difference falls below the processor minimum,
/// `final_amount` is raised to that minimum and `floor_clamped` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeResult {
    /// Region whose price was used.
    pub region: RegionCode,
    /// Price before discount.
    pub original_amount: Money,
    /// Discount granted by the coupon (zero without one).
    pub discount_amount: Money,
    /// Amount sent to the processor.
    pub final_amount: Money,
    /// Currency of all three amounts.
    pub currency: Currency,
    /// Coupon that produced the discount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_applied: Option<Coupon>,
    /// Whether `final_amount` was raised to the processor minimum.
    pub floor_clamped: bool,
}

impl ChargeResult {
    /// Amount the customer would pay before the processor-minimum clamp.
    #[inline]
    #[must_use]
    pub const fn unclamped_amount(&self) -> u64 {
        self.original_amount
            .amount
            .saturating_sub(self.discount_amount.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let request = ChargeRequest::new(CartId::from("cart-1"), RegionCode::Au)
            .coupon(" checkout-99 ")
            .kind(PurchaseKind::Subscription)
            .product(ProductId::from("course-sleep"))
            .customer_email("parent@example.com");
        assert_eq!(request.coupon_code.as_deref(), Some(" checkout-99 "));
        assert_eq!(request.purchase_kind, PurchaseKind::Subscription);
        assert_eq!(
            request.product_id.as_ref().map(ProductId::as_inner),
            Some("course-sleep")
        );
    }

    #[test]
    fn deserialize_minimal_request() {
        let json = r#"{ "cartId": "c-1", "region": "NZ" }"#;
        let request: ChargeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.region, RegionCode::Nz);
        assert_eq!(request.purchase_kind, PurchaseKind::OneOff);
        assert!(request.coupon_code.is_none());
        assert!(request.base_amount_override.is_none());
    }

    #[test]
    fn unclamped_amount() {
        let result = ChargeResult {
            region: RegionCode::Au,
            original_amount: Money::new(12_000, Currency::Aud),
            discount_amount: Money::new(12_000, Currency::Aud),
            final_amount: Money::new(50, Currency::Aud),
            currency: Currency::Aud,
            coupon_applied: None,
            floor_clamped: true,
        };
        assert_eq!(result.unclamped_amount(), 0);
    }
}
