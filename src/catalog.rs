//! Pluggable coupon catalog backends.
//!
//! This module defines the [`CouponCatalog`] (async) and
//! [`BlockingCouponCatalog`] (blocking) traits via a shared macro, mirroring
//! the client generation pattern in [`crate::client`].

#[cfg(feature = "catalog-file")]
mod file;
mod memory;

#[cfg(feature = "catalog-file")]
pub use file::FileCouponCatalog;
pub use memory::InMemoryCouponCatalog;

/// Generates a catalog trait (async or blocking) with all coupon methods.
///
/// Uses `@methods` to define the method list once, and `@method` to render
/// each method in async (`impl Future + Send`) or blocking (`fn`) style.
macro_rules! define_catalog {
    (
        trait_name: $trait_name:ident,
        trait_doc: $trait_doc:expr,
        mode: async_mode,
    ) => {
        #[doc = $trait_doc]
        pub trait $trait_name: core::fmt::Debug + Send + Sync {
            define_catalog!(@methods async_mode);
        }
    };
    (
        trait_name: $trait_name:ident,
        trait_doc: $trait_doc:expr,
        mode: blocking,
    ) => {
        #[doc = $trait_doc]
        pub trait $trait_name: core::fmt::Debug + Send + Sync {
            define_catalog!(@methods blocking);
        }
    };

    (@methods $mode:ident) => {
        define_catalog!(@method $mode, find_by_code,
            "Looks up a coupon by its canonical code.\n\nReturns `Ok(None)` for unknown codes. Inactive coupons are returned as stored; callers decide whether they apply.\n\n# Errors\n\nReturns an error if the catalog backend fails to read.",
            code: &CouponCode, -> Result<Option<Coupon>>);
        define_catalog!(@method $mode, coupons,
            "Returns all stored coupons, ordered by code.\n\n# Errors\n\nReturns an error if the catalog backend fails to read.",
            -> Result<Vec<Coupon>>);
        define_catalog!(@method $mode, upsert_coupons,
            "Inserts or replaces coupons (matched by code).\n\n# Errors\n\nReturns an error if the catalog backend fails to write.",
            items: Vec<Coupon>, -> Result<()>);
        define_catalog!(@method $mode, remove_coupons,
            "Removes coupons by code. Unknown codes are ignored.\n\n# Errors\n\nReturns an error if the catalog backend fails to write.",
            codes: &[CouponCode], -> Result<()>);
    };

    (@method blocking, $name:ident, $doc:expr,
     $($param:ident: $param_ty:ty,)* -> $ret:ty) => {
        #[doc = $doc]
        fn $name(&self $(, $param: $param_ty)*) -> $ret;
    };

    (@method async_mode, $name:ident, $doc:expr,
     $($param:ident: $param_ty:ty,)* -> $ret:ty) => {
        #[doc = $doc]
        fn $name(&self $(, $param: $param_ty)*)
            -> impl core::future::Future<Output = $ret> + Send;
    };
}

#[cfg(feature = "async")]
mod async_catalog {
    //! Async catalog trait definition.

    use crate::error::Result;
    use crate::models::{Coupon, CouponCode};

    define_catalog! {
        trait_name: CouponCatalog,
        trait_doc: "Async coupon catalog.\n\nAll methods take `&self`; implementations use interior mutability\n(e.g. `Mutex`) for thread-safe mutation.",
        mode: async_mode,
    }
}

#[cfg(feature = "blocking")]
mod blocking_catalog {
    //! Blocking catalog trait definition.

    use crate::error::Result;
    use crate::models::{Coupon, CouponCode};

    define_catalog! {
        trait_name: BlockingCouponCatalog,
        trait_doc: "Blocking coupon catalog.\n\nAll methods take `&self`; implementations use interior mutability\n(e.g. `Mutex`) for thread-safe mutation.",
        mode: blocking,
    }
}

#[cfg(feature = "async")]
pub use async_catalog::CouponCatalog;
#[cfg(feature = "blocking")]
pub use blocking_catalog::BlockingCouponCatalog;
