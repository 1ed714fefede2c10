//! Error types for the checkout pricing library.

use crate::models::Currency;

/// All errors that can occur while pricing or charging a checkout.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    /// The coupon code is unknown, inactive, expired, or not valid for the
    /// charge currency.
    #[error("coupon code \"{code}\" is not valid")]
    InvalidCoupon {
        /// The code as entered by the customer.
        code: String,
    },

    /// The intent recorded by the payment processor does not match the
    /// locally computed charge.
    #[error(
        "payment intent {intent_id} recorded as {recorded_id} with {actual_amount} {actual_currency}, \
         expected {expected_amount} {expected_currency}"
    )]
    ChargeMismatch {
        /// Identifier returned when the intent was created.
        intent_id: String,
        /// Identifier on the re-fetched record.
        recorded_id: String,
        /// Locally computed amount in minor units.
        expected_amount: u64,
        /// Locally computed currency.
        expected_currency: Currency,
        /// Amount recorded by the processor, verbatim.
        actual_amount: String,
        /// Currency recorded by the processor, verbatim.
        actual_currency: String,
    },

    /// Transient processor failures persisted through every retry attempt.
    #[error("payment processor unavailable after {attempts} attempt(s): {message}")]
    ProcessorUnavailable {
        /// Number of creation attempts made.
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },

    /// The processor rejected the request with a non-success status.
    #[error("processor error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or error description.
        message: String,
    },

    /// HTTP transport failure.
    #[cfg(any(feature = "async", feature = "blocking"))]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Coupon catalog or geo table backend failed.
    #[error("storage error: {0}")]
    Storage(Box<dyn core::error::Error + Send + Sync>),

    /// Invalid or missing configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Arithmetic on amounts of different currencies.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        /// Currency of the left operand.
        left: Currency,
        /// Currency of the right operand.
        right: Currency,
    },

    /// A monetary amount violated its invariants.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// Coarse failure classes the checkout UI branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// User-correctable coupon problem.
    InvalidCoupon,
    /// Internal invariant violation between local and processor amounts.
    ChargeMismatch,
    /// Payment processor trouble, transient or not.
    ProcessorError,
    /// Anything else (configuration, storage, serialization).
    Internal,
}

/// Message shown to customers for reconciliation failures and internal errors.
const GENERIC_FAILURE_MESSAGE: &str =
    "We could not complete your payment. You have not been charged.";

/// Message shown to customers when the processor cannot be reached.
const PROCESSOR_FAILURE_MESSAGE: &str = "The payment system is unavailable. Please try again shortly.";

impl CheckoutError {
    /// Classifies the error for the checkout UI.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match *self {
            Self::InvalidCoupon { .. } => FailureKind::InvalidCoupon,
            Self::ChargeMismatch { .. } => FailureKind::ChargeMismatch,
            Self::ProcessorUnavailable { .. } | Self::Api { .. } => FailureKind::ProcessorError,
            #[cfg(any(feature = "async", feature = "blocking"))]
            Self::Http(_) => FailureKind::ProcessorError,
            Self::Serialization(_)
            | Self::Storage(_)
            | Self::Config(_)
            | Self::CurrencyMismatch { .. }
            | Self::InvalidAmount(_) => FailureKind::Internal,
        }
    }

    /// Returns the message safe to show to the customer.
    ///
    /// Coupon failures are surfaced verbatim; everything else is replaced by
    /// a generic message so internal details never leak to the UI.
    #[inline]
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.kind() {
            FailureKind::InvalidCoupon => self.to_string(),
            FailureKind::ProcessorError => PROCESSOR_FAILURE_MESSAGE.to_owned(),
            FailureKind::ChargeMismatch | FailureKind::Internal => {
                GENERIC_FAILURE_MESSAGE.to_owned()
            }
        }
    }

    /// Returns `true` for failures worth retrying: timeouts, connection
    /// errors, HTTP 5xx and 429.
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match *self {
            Self::Api { status, .. } => status >= 500 || status == 429,
            #[cfg(any(feature = "async", feature = "blocking"))]
            Self::Http(ref err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::InvalidCoupon { .. }
            | Self::ChargeMismatch { .. }
            | Self::ProcessorUnavailable { .. }
            | Self::Serialization(_)
            | Self::Storage(_)
            | Self::Config(_)
            | Self::CurrencyMismatch { .. }
            | Self::InvalidAmount(_) => false,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_from_serde_json() {
        let serde_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err = CheckoutError::from(serde_err);
        assert!(matches!(err, CheckoutError::Serialization(_)));
        assert!(err.to_string().contains("serialization error"));
        assert_eq!(err.kind(), FailureKind::Internal);
    }

    #[test]
    fn invalid_coupon_message_is_surfaced_verbatim() {
        let err = CheckoutError::InvalidCoupon {
            code: "SPRING".to_owned(),
        };
        assert_eq!(err.kind(), FailureKind::InvalidCoupon);
        assert_eq!(err.user_message(), "coupon code \"SPRING\" is not valid");
    }

    #[test]
    fn charge_mismatch_hides_details_from_user() {
        let err = CheckoutError::ChargeMismatch {
            intent_id: "pi_1".to_owned(),
            recorded_id: "pi_1".to_owned(),
            expected_amount: 120,
            expected_currency: Currency::Aud,
            actual_amount: "12000".to_owned(),
            actual_currency: "aud".to_owned(),
        };
        assert_eq!(err.kind(), FailureKind::ChargeMismatch);
        assert!(err.to_string().contains("pi_1"));
        assert!(!err.user_message().contains("pi_1"));
        assert!(!err.is_transient());
    }

    #[test]
    fn api_status_transience() {
        let server = CheckoutError::Api {
            status: 503,
            message: "unavailable".to_owned(),
        };
        let throttled = CheckoutError::Api {
            status: 429,
            message: "slow down".to_owned(),
        };
        let rejected = CheckoutError::Api {
            status: 402,
            message: "card declined".to_owned(),
        };
        assert!(server.is_transient());
        assert!(throttled.is_transient());
        assert!(!rejected.is_transient());
        assert_eq!(rejected.kind(), FailureKind::ProcessorError);
        assert!(rejected.user_message().contains("unavailable"));
    }

    #[test]
    fn storage_error_display() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = CheckoutError::Storage(Box::new(inner));
        let msg = err.to_string();
        assert!(msg.contains("storage error"));
        assert!(msg.contains("file missing"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CheckoutError>();
    }
}
