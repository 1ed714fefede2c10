//! Checkout pricing for online course purchases.
//!
//! Resolves the customer's pricing region from their network address,
//! applies coupon codes to the regional price, clamps the result to the
//! payment processor's minimum charge, creates a payment intent for the
//! final amount and reconciles what the processor recorded against what
//! was computed.
//!
//! The processor client and the charge calculator come in async and
//! blocking flavours behind the `async` and `blocking` features.

pub mod catalog;
#[cfg(any(feature = "async", feature = "blocking"))]
pub mod checkout;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod pricing;
pub mod region;
pub mod session;
