//! Newtype wrappers for identifiers crossing the checkout boundary.
//!
//! These prevent accidentally passing a cart identifier where a processor
//! intent identifier is expected, at compile time.

use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};

use super::{CouponCode, Money};

/// Macro to define a newtype identifier wrapping a `String`.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from the given string.
            #[inline]
            #[must_use]
            pub const fn new(value: String) -> Self {
                Self(value)
            }

            /// Returns a reference to the inner string.
            #[inline]
            #[must_use]
            pub fn as_inner(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper and returns the inner string.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

define_string_id! {
    /// Payment processor intent identifier (e.g. `pi_3N...`).
    IntentId
}

define_string_id! {
    /// Cart or checkout-session identifier supplied by the storefront.
    CartId
}

define_string_id! {
    /// Purchased product (course) identifier.
    ProductId
}

define_string_id! {
    /// Key sent with intent creation so retried calls are deduplicated by
    /// the processor.
    IdempotencyKey
}

impl IdempotencyKey {
    /// Derives a deterministic key from the cart and the priced charge.
    ///
    /// The same cart charged the same amount with the same coupon always
    /// yields the same key; changing the amount or coupon yields a new key,
    /// so the processor never hands back a stale intent for a different price.
    #[inline]
    #[must_use]
    pub fn derive(cart: &CartId, amount: Money, coupon: Option<&CouponCode>) -> Self {
        let coupon_part = coupon.map_or("none", CouponCode::as_inner);
        Self(format!(
            "checkout-{cart}-{}-{}-{coupon_part}",
            amount.amount,
            amount.currency.code().to_ascii_lowercase()
        ))
    }
}

/// Secret the storefront client uses to confirm an intent.
///
/// Held in a [`SecretString`] so `Debug` output stays redacted. It still
/// serializes in the clear because the storefront needs the value.
#[derive(Debug)]
pub struct ClientSecret(SecretString);

impl ClientSecret {
    /// Wraps a secret string.
    #[inline]
    #[must_use]
    pub fn new(value: String) -> Self {
        Self(SecretString::from(value))
    }

    /// Returns the secret for handing to the storefront client.
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for ClientSecret {
    #[inline]
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned())
    }
}

impl PartialEq for ClientSecret {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for ClientSecret {}

impl Serialize for ClientSecret {
    #[inline]
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for ClientSecret {
    #[inline]
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Currency;

    #[test]
    fn intent_id_serde_roundtrip() {
        let id = IntentId::from("pi_123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""pi_123""#);
        let deserialized: IntentId = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, id);
    }

    #[test]
    fn string_id_display_and_inner() {
        let id = CartId::new("cart-9".to_owned());
        assert_eq!(id.to_string(), "cart-9");
        assert_eq!(id.as_inner(), "cart-9");
        assert_eq!(id.into_inner(), "cart-9");
    }

    #[test]
    fn idempotency_key_is_deterministic() {
        let cart = CartId::from("cart-1");
        let coupon = CouponCode::parse("checkout-99");
        let amount = Money::new(120, Currency::Aud);
        let first = IdempotencyKey::derive(&cart, amount, coupon.as_ref());
        let second = IdempotencyKey::derive(&cart, amount, coupon.as_ref());
        assert_eq!(first, second);
        assert_eq!(first.as_inner(), "checkout-cart-1-120-aud-CHECKOUT-99");
    }

    #[test]
    fn idempotency_key_changes_with_amount_or_coupon() {
        let cart = CartId::from("cart-1");
        let full = IdempotencyKey::derive(&cart, Money::new(12_000, Currency::Aud), None);
        let discounted = IdempotencyKey::derive(&cart, Money::new(120, Currency::Aud), None);
        let coupon = CouponCode::parse("HALF");
        let with_coupon =
            IdempotencyKey::derive(&cart, Money::new(12_000, Currency::Aud), coupon.as_ref());
        assert_ne!(full, discounted);
        assert_ne!(full, with_coupon);
    }

    #[test]
    fn client_secret_debug_is_redacted() {
        let secret = ClientSecret::new("pi_1_secret_abc".to_owned());
        let debug = format!("{secret:?}");
        assert!(!debug.contains("abc"));
        assert_eq!(secret.expose(), "pi_1_secret_abc");
    }

    #[test]
    fn client_secret_serializes_for_the_storefront() {
        let secret: ClientSecret = serde_json::from_str(r#""pi_1_secret_abc""#).unwrap();
        assert_eq!(secret.clone(), secret);
        assert_eq!(serde_json::to_string(&secret).unwrap(), r#""pi_1_secret_abc""#);
    }
}
