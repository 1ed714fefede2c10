//! In-memory coupon catalog.
//!
//! Provides [`InMemoryCouponCatalog`], a thread-safe implementation of both
//! catalog traits. Suitable for tests and for storefronts that load their
//! coupons from configuration at startup.

use std::collections::BTreeMap;
use std::sync::Mutex;

#[cfg(feature = "async")]
use core::future::{self, Future};

use crate::error::{CheckoutError, Result};
use crate::models::{Coupon, CouponCode};

/// Thread-safe in-memory coupon catalog.
///
/// Implements both [`super::CouponCatalog`] (async) and
/// [`super::BlockingCouponCatalog`] (blocking).
///
/// # Example
///
/// ```rust
/// use course_checkout::catalog::InMemoryCouponCatalog;
/// use course_checkout::models::Coupon;
///
/// let catalog = InMemoryCouponCatalog::with_coupons(vec![
///     Coupon::percent_off("CHECKOUT-99", 99).unwrap(),
/// ]);
/// // ChargeCalculator::builder().catalog(catalog).api_key("...").build()
/// ```
#[derive(Debug, Default)]
pub struct InMemoryCouponCatalog {
    /// Coupons keyed by canonical code.
    coupons: Mutex<BTreeMap<CouponCode, Coupon>>,
}

impl InMemoryCouponCatalog {
    /// Creates an empty catalog.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog pre-populated with `coupons`. Later duplicates win.
    #[inline]
    #[must_use]
    pub fn with_coupons(coupons: Vec<Coupon>) -> Self {
        let by_code = coupons
            .into_iter()
            .map(|coupon| (coupon.code.clone(), coupon))
            .collect();
        Self {
            coupons: Mutex::new(by_code),
        }
    }

    /// Acquires the lock and applies a closure.
    fn with_lock<R>(&self, op: impl FnOnce(&mut BTreeMap<CouponCode, Coupon>) -> R) -> Result<R> {
        let mut coupons = self
            .coupons
            .lock()
            .map_err(|err| CheckoutError::Storage(err.to_string().into()))?;
        Ok(op(&mut coupons))
    }

    /// Looks up one coupon.
    fn find(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        self.with_lock(|coupons| coupons.get(code).cloned())
    }

    /// Lists all coupons in code order.
    fn list(&self) -> Result<Vec<Coupon>> {
        self.with_lock(|coupons| coupons.values().cloned().collect())
    }

    /// Inserts or replaces by code.
    fn upsert(&self, items: Vec<Coupon>) -> Result<()> {
        self.with_lock(|coupons| {
            for coupon in items {
                let _old = coupons.insert(coupon.code.clone(), coupon);
            }
        })
    }

    /// Removes by code.
    fn remove(&self, codes: &[CouponCode]) -> Result<()> {
        self.with_lock(|coupons| {
            for code in codes {
                let _old = coupons.remove(code);
            }
        })
    }
}

#[cfg(feature = "blocking")]
impl super::BlockingCouponCatalog for InMemoryCouponCatalog {
    #[inline]
    fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        self.find(code)
    }

    #[inline]
    fn coupons(&self) -> Result<Vec<Coupon>> {
        self.list()
    }

    #[inline]
    fn upsert_coupons(&self, items: Vec<Coupon>) -> Result<()> {
        self.upsert(items)
    }

    #[inline]
    fn remove_coupons(&self, codes: &[CouponCode]) -> Result<()> {
        self.remove(codes)
    }
}

#[cfg(feature = "async")]
impl super::CouponCatalog for InMemoryCouponCatalog {
    #[inline]
    fn find_by_code(
        &self,
        code: &CouponCode,
    ) -> impl Future<Output = Result<Option<Coupon>>> + Send {
        future::ready(self.find(code))
    }

    #[inline]
    fn coupons(&self) -> impl Future<Output = Result<Vec<Coupon>>> + Send {
        future::ready(self.list())
    }

    #[inline]
    fn upsert_coupons(&self, items: Vec<Coupon>) -> impl Future<Output = Result<()>> + Send {
        future::ready(self.upsert(items))
    }

    #[inline]
    fn remove_coupons(&self, codes: &[CouponCode]) -> impl Future<Output = Result<()>> + Send {
        future::ready(self.remove(codes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> CouponCode {
        CouponCode::parse(raw).unwrap()
    }

    #[test]
    fn with_coupons_indexes_by_canonical_code() {
        let catalog = InMemoryCouponCatalog::with_coupons(vec![
            Coupon::percent_off("checkout-99", 99).unwrap(),
            Coupon::amount_off("tenoff", 1_000).unwrap(),
        ]);
        assert!(catalog.find(&code(" Checkout-99 ")).unwrap().is_some());
        assert!(catalog.find(&code("missing")).unwrap().is_none());
        let listed = catalog.list().unwrap();
        let codes: Vec<&str> = listed.iter().map(|coupon| coupon.code.as_inner()).collect();
        assert_eq!(codes, ["CHECKOUT-99", "TENOFF"]);
    }

    #[test]
    fn later_duplicate_wins() {
        let catalog = InMemoryCouponCatalog::with_coupons(vec![
            Coupon::percent_off("A", 10).unwrap(),
            Coupon::percent_off("a", 20).unwrap(),
        ]);
        let found = catalog.find(&code("A")).unwrap().unwrap();
        assert_eq!(found.kind, crate::models::CouponKind::PercentOff(20));
    }

    #[cfg(feature = "blocking")]
    mod blocking {
        use super::*;
        use crate::catalog::BlockingCouponCatalog;

        #[test]
        fn upsert_replaces_and_remove_ignores_unknown() {
            let catalog = InMemoryCouponCatalog::new();
            catalog
                .upsert_coupons(vec![Coupon::percent_off("SPRING", 10).unwrap()])
                .unwrap();
            catalog
                .upsert_coupons(vec![Coupon::percent_off("SPRING", 10).unwrap().deactivated()])
                .unwrap();
            let stored = catalog.find_by_code(&code("spring")).unwrap().unwrap();
            assert!(!stored.active);

            catalog
                .remove_coupons(&[code("SPRING"), code("NEVER")])
                .unwrap();
            assert!(catalog.coupons().unwrap().is_empty());
        }
    }

    #[cfg(feature = "async")]
    mod async_tests {
        use super::*;
        use crate::catalog::CouponCatalog;

        #[tokio::test]
        async fn upsert_find_remove() {
            let catalog = InMemoryCouponCatalog::new();
            catalog
                .upsert_coupons(vec![Coupon::amount_off("BIGOFF", 15_000).unwrap()])
                .await
                .unwrap();
            assert!(catalog.find_by_code(&code("bigoff")).await.unwrap().is_some());
            catalog.remove_coupons(&[code("BIGOFF")]).await.unwrap();
            assert!(catalog.find_by_code(&code("bigoff")).await.unwrap().is_none());
        }
    }
}
