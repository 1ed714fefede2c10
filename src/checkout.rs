//! Charge calculation and the end-to-end checkout flow.
//!
//! Combines the region price table, a [`CouponCatalog`] /
//! [`BlockingCouponCatalog`] backend and the processor client. A checkout
//! walks a fixed sequence of [`CheckoutState`]s:
//!
//! ```text
//! Initiated -> RegionResolved -> CouponResolved | CouponSkipped
//!           -> AmountComputed -> IntentCreated -> Reconciled
//! ```
//!
//! Any step may end in `Failed(kind)` instead.
//!
//! [`CouponCatalog`]: crate::catalog::CouponCatalog
//! [`BlockingCouponCatalog`]: crate::catalog::BlockingCouponCatalog

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CheckoutError, FailureKind, Result};
use crate::models::{
    ChargeRequest, ChargeResult, ClientSecret, Coupon, CouponCode, IntentId, Money, RegionCode,
    RegionPrice,
};
use crate::notify::PurchaseEvent;
use crate::pricing::{canonicalize_code, original_amount, price_charge, resolve_coupon};
use crate::region::RegionTable;

/// One step of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum CheckoutState {
    /// The request was accepted.
    Initiated,
    /// The request's region was found in the price table.
    RegionResolved(RegionCode),
    /// A coupon was validated.
    CouponResolved(CouponCode),
    /// No coupon was entered.
    CouponSkipped,
    /// The final amount is known.
    AmountComputed(Money),
    /// The processor accepted the intent.
    IntentCreated(IntentId),
    /// The processor's intent matches the computed charge.
    Reconciled,
    /// The checkout stopped.
    Failed(FailureKind),
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOutcome {
    /// The charge placed on the processor.
    pub charge: ChargeResult,
    /// Processor intent identifier.
    pub intent_id: IntentId,
    /// Secret the storefront confirms the payment with.
    pub client_secret: ClientSecret,
    /// Every state the checkout went through, in order.
    pub trail: Vec<CheckoutState>,
}

/// Records and logs state transitions.
#[derive(Debug)]
struct Trail {
    /// Transitions so far.
    states: Vec<CheckoutState>,
}

impl Trail {
    /// Starts a trail in [`CheckoutState::Initiated`].
    fn start(request: &ChargeRequest) -> Self {
        tracing::debug!(cart_id = %request.cart_id, region = %request.region, "checkout initiated");
        Self {
            states: vec![CheckoutState::Initiated],
        }
    }

    /// Appends a transition.
    fn push(&mut self, state: CheckoutState) {
        tracing::debug!(state = ?state, "checkout transition");
        self.states.push(state);
    }

    /// Records a failure and hands the error back.
    fn fail(&mut self, err: CheckoutError) -> CheckoutError {
        let kind = err.kind();
        match kind {
            FailureKind::ChargeMismatch => {
                tracing::error!(error = %err, "processor intent does not match computed charge");
            }
            FailureKind::InvalidCoupon => tracing::info!(error = %err, "coupon rejected"),
            FailureKind::ProcessorError | FailureKind::Internal => {
                tracing::warn!(error = %err, "checkout failed");
            }
        }
        self.push(CheckoutState::Failed(kind));
        err
    }

    /// Consumes the trail.
    fn into_states(self) -> Vec<CheckoutState> {
        self.states
    }
}

/// Looks up the request's region price.
fn resolve_region<'table>(
    regions: &'table RegionTable,
    request: &ChargeRequest,
    trail: &mut Trail,
) -> Result<&'table RegionPrice> {
    let price = regions.get(request.region).ok_or_else(|| {
        CheckoutError::Config(format!("no price configured for region {}", request.region))
    })?;
    trail.push(CheckoutState::RegionResolved(price.code));
    Ok(price)
}

/// Canonical coupon code entered with the request. Blank input is no coupon.
fn requested_code(request: &ChargeRequest) -> Option<CouponCode> {
    request.coupon_code.as_deref().and_then(canonicalize_code)
}

/// Applies the coupon (if any) and the processor-minimum floor.
fn apply_pricing(
    region: &RegionPrice,
    request: &ChargeRequest,
    found: Option<&Coupon>,
    minimum_charge: Option<u64>,
    now: DateTime<Utc>,
    trail: &mut Trail,
) -> Result<ChargeResult> {
    let base = original_amount(region, request);
    let applied = match request
        .coupon_code
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
    {
        Some(raw) => {
            let discount = resolve_coupon(raw, found, base, now)?;
            trail.push(CheckoutState::CouponResolved(discount.coupon.code.clone()));
            Some(discount)
        }
        None => {
            trail.push(CheckoutState::CouponSkipped);
            None
        }
    };
    let floor = minimum_charge.unwrap_or_else(|| base.currency.processor_minimum());
    let charge = price_charge(region, request, applied, floor)?;
    trail.push(CheckoutState::AmountComputed(charge.final_amount));
    Ok(charge)
}

/// Builds the purchase event for a reconciled charge.
fn purchase_event(request: &ChargeRequest, charge: &ChargeResult, intent_id: &IntentId) -> PurchaseEvent {
    PurchaseEvent {
        cart_id: request.cart_id.clone(),
        charge: charge.clone(),
        intent_id: intent_id.clone(),
        customer_email: request.customer_email.clone(),
        product_id: request.product_id.clone(),
        purchase_kind: request.purchase_kind,
        occurred_at: Utc::now(),
    }
}

/// Generates a charge calculator (async or blocking) with builder and
/// checkout methods.
macro_rules! define_calculator {
    (
        calculator_name: $calculator:ident,
        builder_name: $builder:ident,
        http_client: $http_client:ty,
        catalog_trait: $catalog_trait:ident,
        calculator_doc: $calculator_doc:expr,
        builder_doc: $builder_doc:expr,
        $(async_kw: $async_kw:tt,)?
        $(await_kw: $await_ext:tt,)?
    ) => {
        #[doc = $builder_doc]
        #[derive(Debug)]
        pub struct $builder<C: $catalog_trait> {
            /// Processor API key.
            api_key: Option<SecretString>,
            /// Processor base URL override.
            base_url: Option<String>,
            /// Per-request timeout.
            timeout: Option<Duration>,
            /// Backoff for intent creation.
            retry_policy: Option<RetryPolicy>,
            /// Coupon catalog.
            catalog: Option<C>,
            /// Region price table.
            regions: RegionTable,
            /// Floor override, in minor units.
            minimum_charge: Option<u64>,
            /// Post-purchase notifiers.
            notifiers: NotifierSet,
        }

        impl<C: $catalog_trait> $builder<C> {
            /// Sets the processor API key. Without one the calculator can
            /// only quote.
            #[inline]
            #[must_use]
            pub fn api_key<T: Into<String>>(mut self, key: T) -> Self {
                self.api_key = Some(SecretString::from(key.into()));
                self
            }

            /// Overrides the processor base URL (useful for testing with a
            /// mock server).
            #[inline]
            #[must_use]
            pub fn base_url<T: Into<String>>(mut self, url: T) -> Self {
                self.base_url = Some(url.into());
                self
            }

            /// Sets the per-request processor timeout.
            #[inline]
            #[must_use]
            pub const fn timeout(mut self, timeout: Duration) -> Self {
                self.timeout = Some(timeout);
                self
            }

            /// Sets the backoff used for intent creation.
            #[inline]
            #[must_use]
            pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
                self.retry_policy = Some(policy);
                self
            }

            /// Sets the coupon catalog.
            #[inline]
            #[must_use]
            pub fn catalog(mut self, catalog: C) -> Self {
                self.catalog = Some(catalog);
                self
            }

            /// Replaces the built-in region price table.
            #[inline]
            #[must_use]
            pub fn regions(mut self, regions: RegionTable) -> Self {
                self.regions = regions;
                self
            }

            /// Overrides the processor minimum for every currency.
            #[inline]
            #[must_use]
            pub const fn minimum_charge(mut self, minor_units: u64) -> Self {
                self.minimum_charge = Some(minor_units);
                self
            }

            /// Registers a post-purchase notifier.
            #[inline]
            #[must_use]
            pub fn notifier<N: PurchaseNotifier + 'static>(mut self, notifier: N) -> Self {
                self.notifiers = self.notifiers.with(notifier);
                self
            }

            /// Builds the calculator.
            ///
            /// # Errors
            ///
            /// Returns [`CheckoutError::Storage`] if no catalog was provided.
            /// Returns [`CheckoutError::Config`] if the base URL is invalid.
            /// Returns [`CheckoutError::Http`] if the HTTP client fails to build.
            #[inline]
            pub fn build(self) -> Result<$calculator<C>> {
                let catalog = self.catalog.ok_or_else(|| {
                    CheckoutError::Storage("coupon catalog is required".into())
                })?;

                let client = match self.api_key {
                    Some(key) => {
                        let mut http_builder = <$http_client>::builder().api_key(key.expose_secret());
                        if let Some(url) = self.base_url {
                            http_builder = http_builder.base_url(url);
                        }
                        if let Some(timeout) = self.timeout {
                            http_builder = http_builder.timeout(timeout);
                        }
                        if let Some(policy) = self.retry_policy {
                            http_builder = http_builder.retry_policy(policy);
                        }
                        Some(http_builder.build()?)
                    }
                    None => {
                        tracing::debug!("no processor API key, building quote-only calculator");
                        None
                    }
                };

                Ok($calculator {
                    client,
                    catalog,
                    regions: self.regions,
                    minimum_charge: self.minimum_charge,
                    notifiers: self.notifiers,
                })
            }
        }

        #[doc = $calculator_doc]
        #[derive(Debug)]
        pub struct $calculator<C: $catalog_trait> {
            /// Processor client; absent for quote-only calculators.
            client: Option<$http_client>,
            /// Coupon catalog.
            catalog: C,
            /// Region price table.
            regions: RegionTable,
            /// Floor override, in minor units.
            minimum_charge: Option<u64>,
            /// Post-purchase notifiers.
            notifiers: NotifierSet,
        }

        impl<C: $catalog_trait> $calculator<C> {
            /// Creates a new builder for configuring the calculator.
            #[inline]
            #[must_use]
            pub fn builder() -> $builder<C> {
                $builder {
                    api_key: None,
                    base_url: None,
                    timeout: None,
                    retry_policy: None,
                    catalog: None,
                    regions: RegionTable::default(),
                    minimum_charge: None,
                    notifiers: NotifierSet::new(),
                }
            }

            /// Returns the coupon catalog.
            #[inline]
            #[must_use]
            pub const fn catalog(&self) -> &C {
                &self.catalog
            }

            /// Returns the region price table.
            #[inline]
            #[must_use]
            pub const fn regions(&self) -> &RegionTable {
                &self.regions
            }

            /// Prices a request without contacting the processor.
            ///
            /// # Errors
            ///
            /// Returns [`CheckoutError::InvalidCoupon`] if a coupon was
            /// entered and does not apply, [`CheckoutError::Config`] if the
            /// region has no price, or a storage error from the catalog.
            #[inline]
            #[tracing::instrument(skip_all, fields(cart_id = %request.cart_id))]
            pub $($async_kw)? fn quote(&self, request: &ChargeRequest) -> Result<ChargeResult> {
                let mut trail = Trail::start(request);
                let priced = self.price(request, &mut trail) $( .$await_ext )?;
                priced.map_err(|err| trail.fail(err))
            }

            /// Prices a request, creates the processor intent, and checks the
            /// processor recorded exactly the computed amount.
            ///
            /// Registered notifiers are told about the purchase afterwards;
            /// their failures are logged and do not affect the result.
            ///
            /// # Errors
            ///
            /// Everything [`Self::quote`] returns, plus
            /// [`CheckoutError::ProcessorUnavailable`] /
            /// [`CheckoutError::Api`] from the processor and
            /// [`CheckoutError::ChargeMismatch`] if the recorded intent
            /// differs from the computed charge. A calculator built without
            /// an API key returns [`CheckoutError::Config`].
            #[inline]
            #[tracing::instrument(skip_all, fields(cart_id = %request.cart_id))]
            pub $($async_kw)? fn compute_charge(&self, request: &ChargeRequest) -> Result<CheckoutOutcome> {
                let mut trail = Trail::start(request);
                let client = self.client.as_ref().ok_or_else(|| {
                    trail.fail(CheckoutError::Config("processor API key is required to charge".to_owned()))
                })?;
                let priced = self.price(request, &mut trail) $( .$await_ext )?;
                let charge = priced.map_err(|err| trail.fail(err))?;

                let key = IdempotencyKey::derive(
                    &request.cart_id,
                    charge.final_amount,
                    charge.coupon_applied.as_ref().map(|coupon| &coupon.code),
                );
                let body = CreateIntentRequest::from_charge(request, &charge);
                let created = client
                    .create_intent(&body, &key)
                    $( .$await_ext )?
                    .map_err(|err| trail.fail(err))?;
                trail.push(CheckoutState::IntentCreated(created.id.clone()));

                let recorded = client
                    .retrieve_intent(&created.id)
                    $( .$await_ext )?
                    .map_err(|err| trail.fail(err))?;
                reconcile(&charge, &created.id, &recorded).map_err(|err| trail.fail(err))?;
                trail.push(CheckoutState::Reconciled);

                let failed = self.notifiers.dispatch(&purchase_event(request, &charge, &created.id));
                tracing::debug!(failed, "purchase notifications dispatched");

                Ok(CheckoutOutcome {
                    charge,
                    intent_id: created.id,
                    client_secret: created.client_secret,
                    trail: trail.into_states(),
                })
            }

            /// Runs the pricing steps, recording transitions on `trail`.
            $($async_kw)? fn price(&self, request: &ChargeRequest, trail: &mut Trail) -> Result<ChargeResult> {
                let region = resolve_region(&self.regions, request, trail)?;
                let found = match requested_code(request) {
                    Some(code) => self.catalog.find_by_code(&code) $( .$await_ext )? ?,
                    None => None,
                };
                apply_pricing(region, request, found.as_ref(), self.minimum_charge, Utc::now(), trail)
            }
        }
    };
}

#[cfg(feature = "async")]
mod async_calculator {
    //! Async charge calculator.

    use core::time::Duration;

    use chrono::Utc;
    use secrecy::{ExposeSecret as _, SecretString};

    use super::{CheckoutOutcome, CheckoutState, Trail, apply_pricing, purchase_event, requested_code, resolve_region};
    use crate::catalog::CouponCatalog;
    use crate::client::{ProcessorClient, RetryPolicy};
    use crate::error::{CheckoutError, Result};
    use crate::models::{ChargeRequest, ChargeResult, CreateIntentRequest, IdempotencyKey};
    use crate::notify::{NotifierSet, PurchaseNotifier};
    use crate::pricing::reconcile;
    use crate::region::RegionTable;

    define_calculator! {
        calculator_name: ChargeCalculator,
        builder_name: ChargeCalculatorBuilder,
        http_client: ProcessorClient,
        catalog_trait: CouponCatalog,
        calculator_doc: "Async checkout calculator with an integrated coupon catalog.\n\nUse [`ChargeCalculator::builder()`] to construct an instance.",
        builder_doc: "Builder for constructing a [`ChargeCalculator`].",
        async_kw: async,
        await_kw: await,
    }
}

#[cfg(feature = "blocking")]
mod blocking_calculator {
    //! Blocking charge calculator.

    use core::time::Duration;

    use chrono::Utc;
    use secrecy::{ExposeSecret as _, SecretString};

    use super::{CheckoutOutcome, CheckoutState, Trail, apply_pricing, purchase_event, requested_code, resolve_region};
    use crate::catalog::BlockingCouponCatalog;
    use crate::client::{ProcessorBlockingClient, RetryPolicy};
    use crate::error::{CheckoutError, Result};
    use crate::models::{ChargeRequest, ChargeResult, CreateIntentRequest, IdempotencyKey};
    use crate::notify::{NotifierSet, PurchaseNotifier};
    use crate::pricing::reconcile;
    use crate::region::RegionTable;

    define_calculator! {
        calculator_name: ChargeCalculatorBlocking,
        builder_name: ChargeCalculatorBlockingBuilder,
        http_client: ProcessorBlockingClient,
        catalog_trait: BlockingCouponCatalog,
        calculator_doc: "Blocking checkout calculator with an integrated coupon catalog.\n\nUse [`ChargeCalculatorBlocking::builder()`] to construct an instance.",
        builder_doc: "Builder for constructing a [`ChargeCalculatorBlocking`].",
    }
}

#[cfg(feature = "async")]
pub use async_calculator::{ChargeCalculator, ChargeCalculatorBuilder};
#[cfg(feature = "blocking")]
pub use blocking_calculator::{ChargeCalculatorBlocking, ChargeCalculatorBlockingBuilder};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCouponCatalog;
    use crate::models::{CartId, Currency};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn request() -> ChargeRequest {
        ChargeRequest::new(CartId::from("cart-1"), RegionCode::Au)
    }

    fn catalog() -> InMemoryCouponCatalog {
        InMemoryCouponCatalog::with_coupons(vec![
            Coupon::percent_off("CHECKOUT-99", 99).unwrap(),
            Coupon::amount_off("BIGOFF", 15_000).unwrap(),
            Coupon::percent_off("RETIRED", 50).unwrap().deactivated(),
        ])
    }

    #[test]
    fn pricing_trail_without_coupon() {
        let regions = RegionTable::default();
        let req = request();
        let mut trail = Trail::start(&req);
        let region = resolve_region(&regions, &req, &mut trail).unwrap();
        let charge = apply_pricing(region, &req, None, None, now(), &mut trail).unwrap();
        assert_eq!(charge.final_amount, Money::new(12_000, Currency::Aud));
        assert_eq!(
            trail.into_states(),
            vec![
                CheckoutState::Initiated,
                CheckoutState::RegionResolved(RegionCode::Au),
                CheckoutState::CouponSkipped,
                CheckoutState::AmountComputed(Money::new(12_000, Currency::Aud)),
            ]
        );
    }

    #[test]
    fn blank_coupon_is_skipped() {
        let regions = RegionTable::default();
        let req = request().coupon("   ");
        assert!(requested_code(&req).is_none());
        let mut trail = Trail::start(&req);
        let region = resolve_region(&regions, &req, &mut trail).unwrap();
        let charge = apply_pricing(region, &req, None, None, now(), &mut trail).unwrap();
        assert!(charge.coupon_applied.is_none());
        assert!(trail.into_states().contains(&CheckoutState::CouponSkipped));
    }

    #[test]
    fn minimum_override_replaces_processor_floor() {
        let regions = RegionTable::default();
        let coupon = Coupon::amount_off("BIGOFF", 15_000).unwrap();
        let req = request().coupon("bigoff");
        let mut trail = Trail::start(&req);
        let region = resolve_region(&regions, &req, &mut trail).unwrap();
        let charge = apply_pricing(region, &req, Some(&coupon), Some(100), now(), &mut trail).unwrap();
        assert_eq!(charge.final_amount, Money::new(100, Currency::Aud));
        assert!(charge.floor_clamped);
    }

    #[test]
    fn gbp_floor_is_thirty_pence() {
        let regions = RegionTable::default();
        let coupon = Coupon::percent_off("FREE", 100).unwrap();
        let req = ChargeRequest::new(CartId::from("cart-uk"), RegionCode::Gb).coupon("free");
        let mut trail = Trail::start(&req);
        let region = resolve_region(&regions, &req, &mut trail).unwrap();
        let charge = apply_pricing(region, &req, Some(&coupon), None, now(), &mut trail).unwrap();
        assert_eq!(charge.final_amount, Money::new(30, Currency::Gbp));
    }

    #[test]
    fn unknown_region_in_custom_table_is_config_error() {
        let regions = RegionTable::new(
            vec![RegionPrice::new(RegionCode::Us, Money::new(8_000, Currency::Usd))],
            RegionCode::Us,
        )
        .unwrap();
        let req = request();
        let mut trail = Trail::start(&req);
        let err = resolve_region(&regions, &req, &mut trail).unwrap_err();
        assert!(matches!(err, CheckoutError::Config(_)));
    }

    #[test]
    fn failure_is_recorded() {
        let req = request();
        let mut trail = Trail::start(&req);
        let err = trail.fail(CheckoutError::InvalidCoupon {
            code: "X".to_owned(),
        });
        assert_eq!(err.kind(), FailureKind::InvalidCoupon);
        assert_eq!(
            trail.into_states().last(),
            Some(&CheckoutState::Failed(FailureKind::InvalidCoupon))
        );
    }

    #[test]
    fn state_serializes_tagged() {
        let json = serde_json::to_value(CheckoutState::RegionResolved(RegionCode::Nz)).unwrap();
        assert_eq!(json["state"], "regionResolved");
        assert_eq!(json["detail"], "NZ");
        let unit = serde_json::to_value(CheckoutState::Reconciled).unwrap();
        assert_eq!(unit["state"], "reconciled");
    }

    #[cfg(feature = "async")]
    mod async_tests {
        use super::*;

        #[tokio::test]
        async fn quote_applies_catalog_coupon() {
            let calculator = ChargeCalculator::builder().catalog(catalog()).build().unwrap();
            let charge = calculator
                .quote(&request().coupon(" checkout-99 "))
                .await
                .unwrap();
            assert_eq!(charge.discount_amount.amount, 11_880);
            assert_eq!(charge.final_amount.amount, 120);
        }

        #[tokio::test]
        async fn quote_rejects_unknown_and_inactive_coupons() {
            let calculator = ChargeCalculator::builder().catalog(catalog()).build().unwrap();
            for code in ["nope", "retired"] {
                let err = calculator
                    .quote(&request().coupon(code))
                    .await
                    .unwrap_err();
                assert_eq!(err.kind(), FailureKind::InvalidCoupon);
            }
        }

        #[tokio::test]
        async fn charge_without_api_key_is_config_error() {
            let calculator = ChargeCalculator::builder().catalog(catalog()).build().unwrap();
            let err = calculator.compute_charge(&request()).await.unwrap_err();
            assert!(matches!(err, CheckoutError::Config(_)));
        }

        #[test]
        fn builder_requires_catalog() {
            let result = ChargeCalculator::<InMemoryCouponCatalog>::builder().build();
            assert!(matches!(result, Err(CheckoutError::Storage(_))));
        }
    }

    #[cfg(feature = "blocking")]
    mod blocking_tests {
        use super::*;

        #[test]
        fn quote_clamps_oversized_amount_off() {
            let calculator = ChargeCalculatorBlocking::builder()
                .catalog(catalog())
                .build()
                .unwrap();
            let charge = calculator.quote(&request().coupon("BIGOFF")).unwrap();
            assert_eq!(charge.discount_amount.amount, 12_000);
            assert_eq!(charge.final_amount.amount, 50);
            assert!(charge.floor_clamped);
        }

        #[test]
        fn quote_honors_base_amount_override() {
            let calculator = ChargeCalculatorBlocking::builder()
                .catalog(catalog())
                .build()
                .unwrap();
            let charge = calculator
                .quote(&request().base_amount(Money::new(4_900, Currency::Usd)))
                .unwrap();
            assert_eq!(charge.final_amount, Money::new(4_900, Currency::Usd));
        }
    }
}
