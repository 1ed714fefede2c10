//! Per-cart inactivity tracking for abandoned-cart follow-ups.
//!
//! Each [`CartSession`] is owned by whoever serves the cart (a request
//! handler, a session store entry). There is no process-wide timer: the
//! owner polls with the current time and decides what to do with an
//! [`AbandonedCart`].

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CartId;

/// Inactivity after which a cart counts as abandoned.
pub const DEFAULT_ABANDON_AFTER: TimeDelta = TimeDelta::minutes(30);

/// A cart that went quiet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbandonedCart {
    /// The abandoned cart.
    pub cart_id: CartId,
    /// Last customer activity.
    pub last_activity: DateTime<Utc>,
    /// Time between `last_activity` and the poll that detected abandonment.
    #[serde(with = "idle_seconds")]
    pub idle_for: TimeDelta,
}

/// Activity state of one cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSession {
    /// Cart being tracked.
    cart_id: CartId,
    /// When the session started.
    started_at: DateTime<Utc>,
    /// Most recent activity.
    last_activity: DateTime<Utc>,
    /// Inactivity threshold.
    abandon_after: TimeDelta,
    /// Set once the purchase went through.
    completed: bool,
    /// Activity timestamp an abandonment was already reported for.
    reported_for: Option<DateTime<Utc>>,
}

impl CartSession {
    /// Starts tracking a cart at `now` with the default threshold.
    #[inline]
    #[must_use]
    pub const fn start(cart_id: CartId, now: DateTime<Utc>) -> Self {
        Self {
            cart_id,
            started_at: now,
            last_activity: now,
            abandon_after: DEFAULT_ABANDON_AFTER,
            completed: false,
            reported_for: None,
        }
    }

    /// Overrides the inactivity threshold.
    #[inline]
    #[must_use]
    pub const fn abandon_after(mut self, threshold: TimeDelta) -> Self {
        self.abandon_after = threshold;
        self
    }

    /// Cart being tracked.
    #[inline]
    #[must_use]
    pub const fn cart_id(&self) -> &CartId {
        &self.cart_id
    }

    /// When tracking started.
    #[inline]
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Most recent activity.
    #[inline]
    #[must_use]
    pub const fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Returns `true` once [`CartSession::complete`] was called.
    #[inline]
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    /// Records customer activity. Timestamps older than the last activity
    /// are ignored.
    #[inline]
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Marks the cart as purchased; it will never be reported as abandoned.
    #[inline]
    pub const fn complete(&mut self) {
        self.completed = true;
    }

    /// Reports the cart as abandoned if it has been idle for at least the
    /// threshold.
    ///
    /// Fires at most once per stretch of inactivity: further polls return
    /// `None` until [`CartSession::touch`] records new activity.
    #[inline]
    pub fn poll_abandoned(&mut self, now: DateTime<Utc>) -> Option<AbandonedCart> {
        if self.completed || self.reported_for == Some(self.last_activity) {
            return None;
        }
        let idle_for = now.signed_duration_since(self.last_activity);
        if idle_for < self.abandon_after {
            return None;
        }
        self.reported_for = Some(self.last_activity);
        tracing::debug!(cart_id = %self.cart_id, idle_secs = idle_for.num_seconds(), "cart abandoned");
        Some(AbandonedCart {
            cart_id: self.cart_id.clone(),
            last_activity: self.last_activity,
            idle_for,
        })
    }
}

/// Serializes a [`TimeDelta`] as whole seconds.
mod idle_seconds {
    use chrono::TimeDelta;
    use serde::{Deserialize as _, Deserializer, Serializer};

    /// Writes the delta as seconds.
    pub(super) fn serialize<S: Serializer>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(delta.num_seconds())
    }

    /// Reads seconds into a delta.
    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        TimeDelta::try_seconds(seconds)
            .ok_or_else(|| serde::de::Error::custom(format!("{seconds} seconds is out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + minutes * 60, 0).unwrap()
    }

    #[test]
    fn fires_once_after_threshold() {
        let mut session = CartSession::start(CartId::from("cart-1"), at(0));
        assert!(session.poll_abandoned(at(29)).is_none());
        let abandoned = session.poll_abandoned(at(30)).unwrap();
        assert_eq!(abandoned.cart_id, CartId::from("cart-1"));
        assert_eq!(abandoned.idle_for, TimeDelta::minutes(30));
        assert!(session.poll_abandoned(at(45)).is_none());
        assert!(session.poll_abandoned(at(300)).is_none());
    }

    #[test]
    fn activity_rearms_the_timer() {
        let mut session = CartSession::start(CartId::from("cart-1"), at(0));
        assert!(session.poll_abandoned(at(31)).is_some());
        session.touch(at(40));
        assert!(session.poll_abandoned(at(60)).is_none());
        let again = session.poll_abandoned(at(70)).unwrap();
        assert_eq!(again.last_activity, at(40));
    }

    #[test]
    fn stale_touch_is_ignored() {
        let mut session = CartSession::start(CartId::from("cart-1"), at(10));
        session.touch(at(5));
        assert_eq!(session.last_activity(), at(10));
        assert_eq!(session.started_at(), at(10));
    }

    #[test]
    fn completed_cart_never_fires() {
        let mut session =
            CartSession::start(CartId::from("cart-1"), at(0)).abandon_after(TimeDelta::minutes(5));
        session.complete();
        assert!(session.is_completed());
        assert!(session.poll_abandoned(at(500)).is_none());
    }

    #[test]
    fn sessions_are_independent() {
        let mut first = CartSession::start(CartId::from("a"), at(0));
        let mut second = CartSession::start(CartId::from("b"), at(20));
        assert!(first.poll_abandoned(at(35)).is_some());
        assert!(second.poll_abandoned(at(35)).is_none());
        assert_eq!(second.cart_id().as_inner(), "b");
    }

    #[test]
    fn abandoned_cart_serializes_idle_seconds() {
        let mut session = CartSession::start(CartId::from("cart-1"), at(0));
        let abandoned = session.poll_abandoned(at(31)).unwrap();
        let json = serde_json::to_value(&abandoned).unwrap();
        assert_eq!(json["idleFor"], 1_860);
        let back: AbandonedCart = serde_json::from_value(json).unwrap();
        assert_eq!(back, abandoned);
    }
}
