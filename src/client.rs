//! HTTP client for the payment processor's intent API.
//!
//! Provides both async and blocking client variants behind feature flags.

use core::time::Duration;

/// Base URL of the payment processor.
const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

/// Path segments of the payment intents collection.
const INTENTS_PATH: [&str; 2] = ["v1", "payment_intents"];

/// Header carrying the idempotency key on creation calls.
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded exponential backoff for transient processor failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    max_attempts: u32,
    /// Delay after the first failed attempt.
    base_delay: Duration,
    /// Upper bound on any single delay.
    max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. Zero attempts is treated as one.
    #[inline]
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            base_delay,
            max_delay,
        }
    }

    /// A policy that never retries.
    #[inline]
    #[must_use]
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Replaces the attempt bound, keeping the delays. Zero is treated as
    /// one.
    #[inline]
    #[must_use]
    pub const fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self::new(max_attempts, self.base_delay, self.max_delay)
    }

    /// Total attempts, including the first.
    #[inline]
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[inline]
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200), Duration::from_secs(2))
    }
}

/// Validates a base URL and normalizes it for path joining.
fn parse_base_url(raw: &str) -> crate::error::Result<url::Url> {
    let parsed = url::Url::parse(raw)
        .map_err(|err| crate::error::CheckoutError::Config(format!("invalid base URL {raw:?}: {err}")))?;
    if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
        return Err(crate::error::CheckoutError::Config(format!(
            "base URL {raw:?} must be an absolute http(s) URL"
        )));
    }
    Ok(parsed)
}

/// Appends path segments to a base URL, percent-encoding each one.
fn endpoint(base: &url::Url, segments: &[&str]) -> crate::error::Result<url::Url> {
    let mut url = base.clone();
    {
        let mut path = url.path_segments_mut().map_err(|()| {
            crate::error::CheckoutError::Config(format!("base URL {base} cannot carry a path"))
        })?;
        _ = path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

/// Generates a processor client (async or blocking) with builder, methods, and tests.
macro_rules! define_client {
    (
        client_name: $client:ident,
        builder_name: $builder:ident,
        http_type: $http_type:ty,
        request_type: $req_type:ty,
        response_type: $resp_type:ty,
        sleep: $sleep:path,
        client_doc: $client_doc:expr,
        builder_doc: $builder_doc:expr,
        $(async_kw: $async_kw:tt,)?
        $(await_kw: $await_ext:tt,)?
        $(send_bound: $send_bound:tt,)?
    ) => {
        #[doc = $builder_doc]
        #[derive(Debug)]
        pub struct $builder {
            /// Secret API key.
            api_key: Option<SecretString>,
            /// Base URL override (for testing).
            base_url: Option<String>,
            /// Per-request timeout.
            timeout: Duration,
            /// Backoff for intent creation.
            retry_policy: RetryPolicy,
        }

        impl $builder {
            /// Sets the secret API key, sent as a bearer token.
            #[inline]
            #[must_use]
            pub fn api_key<T: Into<String>>(mut self, key: T) -> Self {
                self.api_key = Some(SecretString::from(key.into()));
                self
            }

            /// Overrides the base URL (useful for testing with a mock server).
            #[inline]
            #[must_use]
            pub fn base_url<T: Into<String>>(mut self, url: T) -> Self {
                self.base_url = Some(url.into());
                self
            }

            /// Sets the per-request timeout.
            #[inline]
            #[must_use]
            pub const fn timeout(mut self, timeout: Duration) -> Self {
                self.timeout = timeout;
                self
            }

            /// Sets the backoff used for intent creation.
            #[inline]
            #[must_use]
            pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
                self.retry_policy = policy;
                self
            }

            /// Builds the client.
            ///
            /// # Errors
            ///
            /// Returns [`CheckoutError::Config`] if no API key was provided or
            /// the base URL is invalid.
            /// Returns [`CheckoutError::Http`] if the HTTP client fails to build.
            #[inline]
            #[tracing::instrument(skip_all)]
            pub fn build(self) -> Result<$client> {
                let api_key = self
                    .api_key
                    .ok_or_else(|| CheckoutError::Config("processor API key is required".to_owned()))?;
                let raw_url = self
                    .base_url
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
                let base_url = parse_base_url(&raw_url)?;
                tracing::debug!(base_url = %base_url, timeout = ?self.timeout, "building processor client");
                let http = <$http_type>::builder().timeout(self.timeout).build()?;

                Ok($client {
                    http,
                    api_key,
                    base_url,
                    retry_policy: self.retry_policy,
                })
            }
        }

        #[doc = $client_doc]
        #[derive(Debug)]
        pub struct $client {
            /// Underlying HTTP client.
            http: $http_type,
            /// Secret API key.
            api_key: SecretString,
            /// API base URL.
            base_url: url::Url,
            /// Backoff for intent creation.
            retry_policy: RetryPolicy,
        }

        impl $client {
            /// Creates a new builder for configuring the client.
            #[inline]
            #[must_use]
            pub const fn builder() -> $builder {
                $builder {
                    api_key: None,
                    base_url: None,
                    timeout: DEFAULT_TIMEOUT,
                    retry_policy: RetryPolicy::new(3, Duration::from_millis(200), Duration::from_secs(2)),
                }
            }

            /// Creates a payment intent via `POST /v1/payment_intents`.
            ///
            /// Timeouts, connection errors, HTTP 5xx and 429 are retried with
            /// exponential backoff, each attempt carrying the same
            /// idempotency key.
            ///
            /// # Errors
            ///
            /// Returns [`CheckoutError::ProcessorUnavailable`] once every
            /// attempt failed transiently, or the first non-transient error
            /// (e.g. [`CheckoutError::Api`] for a 4xx) as is.
            #[inline]
            #[tracing::instrument(skip_all, fields(key = %key))]
            pub $($async_kw)? fn create_intent(
                &self,
                request: &CreateIntentRequest,
                key: &IdempotencyKey,
            ) -> Result<CreatedIntent> {
                let url = endpoint(&self.base_url, &INTENTS_PATH)?;
                let mut attempt = 1_u32;
                loop {
                    tracing::debug!(attempt, amount = request.amount, currency = %request.currency, "creating payment intent");
                    let builder = self
                        .http
                        .post(url.clone())
                        .header(IDEMPOTENCY_HEADER, key.as_inner())
                        .json(request);
                    match self.execute(builder) $( .$await_ext )? {
                        Ok(created) => return Ok(created),
                        Err(err) if err.is_transient() => {
                            if attempt >= self.retry_policy.max_attempts() {
                                tracing::warn!(attempt, error = %err, "giving up on payment intent creation");
                                return Err(CheckoutError::ProcessorUnavailable {
                                    attempts: attempt,
                                    message: err.to_string(),
                                });
                            }
                            let delay = self.retry_policy.delay_after(attempt);
                            tracing::warn!(attempt, delay = ?delay, error = %err, "transient processor failure, retrying");
                            $sleep(delay) $( .$await_ext )?;
                            attempt = attempt.saturating_add(1);
                        }
                        Err(err) => return Err(err),
                    }
                }
            }

            /// Fetches an intent via `GET /v1/payment_intents/{id}`.
            ///
            /// # Errors
            ///
            /// Returns an error if the HTTP request fails, the server returns a
            /// non-success status, or the response cannot be deserialized.
            #[inline]
            #[tracing::instrument(skip_all, fields(intent_id = %id))]
            pub $($async_kw)? fn retrieve_intent(&self, id: &IntentId) -> Result<PaymentIntent> {
                let [version, collection] = INTENTS_PATH;
                let url = endpoint(&self.base_url, &[version, collection, id.as_inner()])?;
                tracing::debug!("retrieving payment intent");
                self.execute(self.http.get(url)) $( .$await_ext )?
            }

            /// Sends an authenticated request and deserializes the JSON
            /// response.
            $($async_kw)? fn execute<Resp: serde::de::DeserializeOwned $(+ $send_bound)?>(
                &self,
                builder: $req_type,
            ) -> Result<Resp> {
                let response: $resp_type = builder
                    .bearer_auth(self.api_key.expose_secret())
                    .header(ACCEPT, "application/json")
                    .send()
                    $( .$await_ext )?
                    ?;

                let status = response.status();
                tracing::debug!(status = %status, "received response");
                if status.is_success() {
                    let body = response.text() $( .$await_ext )? ?;
                    tracing::trace!(body_len = body.len(), "parsing response body");
                    serde_json::from_str(&body).map_err(CheckoutError::from)
                } else {
                    let message = response
                        .text()
                        $( .$await_ext )?
                        .unwrap_or_else(|_| "unknown error".to_owned());
                    tracing::debug!(status = status.as_u16(), message = %message, "processor error");
                    Err(CheckoutError::Api {
                        status: status.as_u16(),
                        message,
                    })
                }
            }
        }

    };
}

#[cfg(feature = "async")]
mod async_client {
    //! Async HTTP client for the payment processor.

    use core::time::Duration;

    use reqwest::header::ACCEPT;
    use secrecy::{ExposeSecret as _, SecretString};

    use super::{
        DEFAULT_BASE_URL, DEFAULT_TIMEOUT, IDEMPOTENCY_HEADER, INTENTS_PATH, RetryPolicy, endpoint,
        parse_base_url,
    };
    use crate::error::{CheckoutError, Result};
    use crate::models::{CreateIntentRequest, CreatedIntent, IdempotencyKey, IntentId, PaymentIntent};

    define_client! {
        client_name: ProcessorClient,
        builder_name: ProcessorClientBuilder,
        http_type: reqwest::Client,
        request_type: reqwest::RequestBuilder,
        response_type: reqwest::Response,
        sleep: tokio::time::sleep,
        client_doc: "Async client for the payment processor.\n\nUse [`ProcessorClient::builder()`] to construct an instance.",
        builder_doc: "Builder for constructing a [`ProcessorClient`].",
        async_kw: async,
        await_kw: await,
        send_bound: Send,
    }
}

#[cfg(feature = "blocking")]
mod blocking_client {
    //! Blocking (synchronous) HTTP client for the payment processor.

    use core::time::Duration;

    use reqwest::header::ACCEPT;
    use secrecy::{ExposeSecret as _, SecretString};

    use super::{
        DEFAULT_BASE_URL, DEFAULT_TIMEOUT, IDEMPOTENCY_HEADER, INTENTS_PATH, RetryPolicy, endpoint,
        parse_base_url,
    };
    use crate::error::{CheckoutError, Result};
    use crate::models::{CreateIntentRequest, CreatedIntent, IdempotencyKey, IntentId, PaymentIntent};

    define_client! {
        client_name: ProcessorBlockingClient,
        builder_name: ProcessorBlockingClientBuilder,
        http_type: reqwest::blocking::Client,
        request_type: reqwest::blocking::RequestBuilder,
        response_type: reqwest::blocking::Response,
        sleep: std::thread::sleep,
        client_doc: "Blocking (synchronous) client for the payment processor.\n\nUse [`ProcessorBlockingClient::builder()`] to construct an instance.",
        builder_doc: "Builder for constructing a [`ProcessorBlockingClient`].",
    }
}

#[cfg(feature = "async")]
pub use async_client::{ProcessorClient, ProcessorClientBuilder};
#[cfg(feature = "blocking")]
pub use blocking_client::{ProcessorBlockingClient, ProcessorBlockingClientBuilder};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
        assert_eq!(policy.delay_after(3), Duration::from_millis(800));
        assert_eq!(policy.delay_after(5), Duration::from_secs(2));
        assert_eq!(policy.delay_after(64), Duration::from_secs(2));
    }

    #[test]
    fn zero_attempts_means_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn endpoint_encodes_segments() {
        let base = parse_base_url("https://api.example.com").unwrap();
        let url = endpoint(&base, &["v1", "payment_intents", "pi 1/x"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/payment_intents/pi%201%2Fx");
    }
}
