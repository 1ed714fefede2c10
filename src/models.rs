//! Data models for checkout pricing.
//!
//! This module contains strongly-typed representations of money, regions,
//! coupons, charge requests and results, and the payment processor's intent
//! records, plus newtype identifier wrappers.

mod charge;
mod coupon;
mod currency;
mod ids;
mod intent;
mod money;
mod region;

pub use charge::{ChargeRequest, ChargeResult, PurchaseKind};
pub use coupon::{Coupon, CouponCode, CouponKind};
pub use currency::Currency;
pub use ids::{CartId, ClientSecret, IdempotencyKey, IntentId, ProductId};
pub use intent::{CreateIntentRequest, CreatedIntent, IntentMetadata, IntentStatus, PaymentIntent};
pub use money::Money;
pub use region::{CountryCode, RegionCode, RegionPrice};

/// Re-export of the timestamp type used for coupon expiry and events.
pub use chrono::{DateTime, Utc};
