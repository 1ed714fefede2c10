//! Payment processor intent models.

use serde::{Deserialize, Serialize};

use super::{
    CartId, ChargeRequest, ChargeResult, ClientSecret, CouponCode, Currency, IntentId, ProductId,
    PurchaseKind, RegionCode,
};

/// Lifecycle state of a processor intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Awaiting a payment method from the customer.
    RequiresPaymentMethod,
    /// Payment method attached, awaiting confirmation.
    RequiresConfirmation,
    /// Customer action (e.g. 3-D Secure) required.
    RequiresAction,
    /// Being processed.
    Processing,
    /// Authorized, awaiting capture.
    RequiresCapture,
    /// Funds captured.
    Succeeded,
    /// Cancelled.
    Canceled,
    /// A state this crate does not know about.
    #[serde(other)]
    Unknown,
}

/// Bookkeeping attached to a created intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMetadata {
    /// Cart the charge belongs to.
    pub cart_id: CartId,
    /// Pricing region.
    pub region: RegionCode,
    /// Price before discount, minor units.
    pub original_amount: u64,
    /// Discount, minor units.
    pub discount_amount: u64,
    /// Applied coupon code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<CouponCode>,
    /// Whether the amount was raised to the processor minimum.
    pub floor_clamped: bool,
    /// One-off or subscription purchase.
    pub purchase_kind: PurchaseKind,
    /// Product identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
}

/// Body of an intent creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    /// Amount to charge, minor units.
    pub amount: u64,
    /// Charge currency.
    pub currency: Currency,
    /// Pricing breakdown for later auditing.
    pub metadata: IntentMetadata,
}

impl CreateIntentRequest {
    /// Builds the creation body for a priced charge.
    #[inline]
    #[must_use]
    pub fn from_charge(request: &ChargeRequest, charge: &ChargeResult) -> Self {
        Self {
            amount: charge.final_amount.amount,
            currency: charge.currency,
            metadata: IntentMetadata {
                cart_id: request.cart_id.clone(),
                region: charge.region,
                original_amount: charge.original_amount.amount,
                discount_amount: charge.discount_amount.amount,
                coupon_code: charge.coupon_applied.as_ref().map(|coupon| coupon.code.clone()),
                floor_clamped: charge.floor_clamped,
                purchase_kind: request.purchase_kind,
                product_id: request.product_id.clone(),
            },
        }
    }
}

/// Processor response to an intent creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIntent {
    /// Intent identifier.
    pub id: IntentId,
    /// Secret the storefront uses to confirm the payment.
    pub client_secret: ClientSecret,
}

/// An intent as recorded by the processor.
///
/// Amount and currency are kept as the processor sent them. Values this
/// crate cannot represent (an unsupported currency, a fractional or negative
/// amount) must reach reconciliation and fail there as a mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Intent identifier.
    pub id: IntentId,
    /// Recorded amount, expected in minor units.
    pub amount: serde_json::Number,
    /// Recorded currency code, in whatever case the processor uses.
    pub currency: String,
    /// Lifecycle state.
    pub status: IntentStatus,
    /// Confirmation secret, when the processor includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<ClientSecret>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coupon, Money};

    #[test]
    fn deserialize_processor_intent() {
        let json = r#"{
            "id": "pi_123",
            "object": "payment_intent",
            "amount": 120,
            "currency": "aud",
            "status": "requires_payment_method",
            "client_secret": "pi_123_secret_xyz"
        }"#;
        let intent: PaymentIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.id, IntentId::from("pi_123"));
        assert_eq!(intent.amount.as_u64(), Some(120));
        assert_eq!(intent.currency, "aud");
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
        assert_eq!(
            intent.client_secret.as_ref().map(ClientSecret::expose),
            Some("pi_123_secret_xyz")
        );
    }

    #[test]
    fn unrepresentable_record_still_parses() {
        let json = r#"{ "id": "pi_2", "amount": 1.2, "currency": "jpy", "status": "succeeded" }"#;
        let intent: PaymentIntent = serde_json::from_str(json).unwrap();
        assert!(intent.amount.as_u64().is_none());
        assert_eq!(intent.currency, "jpy");
    }

    #[test]
    fn unknown_status_is_tolerated() {
        let json = r#"{ "id": "pi_1", "amount": 1, "currency": "USD", "status": "on_hold" }"#;
        let intent: PaymentIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.status, IntentStatus::Unknown);
        assert!(intent.client_secret.is_none());
    }

    #[test]
    fn create_request_from_charge() {
        let request = ChargeRequest::new(CartId::from("cart-7"), RegionCode::Au)
            .coupon("checkout-99")
            .kind(PurchaseKind::Subscription);
        let charge = ChargeResult {
            region: RegionCode::Au,
            original_amount: Money::new(12_000, Currency::Aud),
            discount_amount: Money::new(11_880, Currency::Aud),
            final_amount: Money::new(120, Currency::Aud),
            currency: Currency::Aud,
            coupon_applied: Some(Coupon::percent_off("checkout-99", 99).unwrap()),
            floor_clamped: false,
        };
        let body = CreateIntentRequest::from_charge(&request, &charge);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["amount"], 120);
        assert_eq!(json["currency"], "AUD");
        assert_eq!(json["metadata"]["originalAmount"], 12_000);
        assert_eq!(json["metadata"]["discountAmount"], 11_880);
        assert_eq!(json["metadata"]["couponCode"], "CHECKOUT-99");
        assert_eq!(json["metadata"]["purchaseKind"], "subscription");
        assert!(json["metadata"].get("productId").is_none());
    }
}
