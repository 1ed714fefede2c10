//! Post-purchase notification dispatch.
//!
//! Once a charge is reconciled the checkout flow announces it to every
//! registered [`PurchaseNotifier`] (email confirmation, marketing lists,
//! account provisioning). Delivery is fire-and-forget: a failing notifier
//! is logged and never affects the charge outcome.

use std::sync::mpsc::Sender;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};
use crate::models::{CartId, ChargeResult, IntentId, ProductId, PurchaseKind};

/// A completed, reconciled purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEvent {
    /// Cart that was charged.
    pub cart_id: CartId,
    /// The charge as computed and confirmed by the processor.
    pub charge: ChargeResult,
    /// Processor intent identifier.
    pub intent_id: IntentId,
    /// Customer email, when the storefront collected one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    /// Purchased product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    /// One-off or subscription purchase.
    pub purchase_kind: PurchaseKind,
    /// When the purchase was reconciled.
    pub occurred_at: DateTime<Utc>,
}

/// Receives purchase events.
///
/// Implementations must not block for long: they run inline on the
/// checkout path after the charge has already succeeded.
pub trait PurchaseNotifier: core::fmt::Debug + Send + Sync {
    /// Handles one purchase event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be handed off. The checkout
    /// flow logs it and carries on.
    fn notify(&self, event: &PurchaseEvent) -> Result<()>;
}

/// Logs every purchase at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl PurchaseNotifier for TracingNotifier {
    #[inline]
    fn notify(&self, event: &PurchaseEvent) -> Result<()> {
        tracing::info!(
            cart_id = %event.cart_id,
            intent_id = %event.intent_id,
            amount = event.charge.final_amount.amount,
            currency = %event.charge.currency,
            coupon = event.charge.coupon_applied.as_ref().map(|coupon| coupon.code.as_inner()),
            kind = ?event.purchase_kind,
            "purchase completed"
        );
        Ok(())
    }
}

/// Forwards events into a channel for a background consumer (mailer,
/// provisioning worker).
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    /// Sending half of the consumer's queue.
    sender: Sender<PurchaseEvent>,
}

impl ChannelNotifier {
    /// Wraps the sending half of a channel.
    #[inline]
    #[must_use]
    pub const fn new(sender: Sender<PurchaseEvent>) -> Self {
        Self { sender }
    }
}

impl PurchaseNotifier for ChannelNotifier {
    #[inline]
    fn notify(&self, event: &PurchaseEvent) -> Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|err| CheckoutError::Storage(format!("notification queue closed: {err}").into()))
    }
}

/// Fan-out over several notifiers.
///
/// Every notifier sees every event, in registration order, even when an
/// earlier one fails.
#[derive(Debug, Default)]
pub struct NotifierSet {
    /// Registered notifiers.
    notifiers: Vec<Box<dyn PurchaseNotifier>>,
}

impl NotifierSet {
    /// Creates an empty set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a notifier.
    #[inline]
    #[must_use]
    pub fn with<N: PurchaseNotifier + 'static>(mut self, notifier: N) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    /// Number of registered notifiers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// Returns `true` if no notifier is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Delivers `event` to every notifier, logging failures at `warn`.
    ///
    /// Returns the number of notifiers that failed.
    #[inline]
    pub fn dispatch(&self, event: &PurchaseEvent) -> usize {
        self.notifiers
            .iter()
            .filter(|notifier| match notifier.notify(event) {
                Ok(()) => false,
                Err(err) => {
                    tracing::warn!(
                        intent_id = %event.intent_id,
                        notifier = ?notifier,
                        error = %err,
                        "purchase notification failed"
                    );
                    true
                }
            })
            .count()
    }
}

impl PurchaseNotifier for NotifierSet {
    #[inline]
    fn notify(&self, event: &PurchaseEvent) -> Result<()> {
        let failed = self.dispatch(event);
        if failed == 0 {
            Ok(())
        } else {
            Err(CheckoutError::Storage(
                format!("{failed} notifier(s) failed").into(),
            ))
        }
    }
}
