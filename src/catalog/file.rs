//! JSON-file-based coupon catalog.
//!
//! Stores every coupon in a single `coupons.json` under a configurable
//! directory (default: `$XDG_DATA_HOME/course-checkout/`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[cfg(feature = "async")]
use core::future::Future;

use crate::error::{CheckoutError, Result};
use crate::models::{Coupon, CouponCode};

/// Application name used for the XDG data directory.
const APP_NAME: &str = "course-checkout";

/// File name for the coupon list.
const COUPONS_FILE: &str = "coupons.json";
/// Temporary file used for atomic replacement of [`COUPONS_FILE`].
const COUPONS_TMP_FILE: &str = "coupons.json.tmp";
/// Sentinel file used for cross-process file locking.
const LOCK_FILE: &str = "coupons.lock";

/// File-backed coupon catalog.
///
/// # Concurrency
///
/// Thread safety within a single process is provided by an in-process
/// [`Mutex`]. Cross-process safety is achieved via an advisory file lock
/// on `coupons.lock` (using [`std::fs::File::lock`] /
/// [`std::fs::File::lock_shared`]).
///
/// Read operations acquire a shared lock (allowing concurrent readers),
/// while write operations acquire an exclusive lock.
///
/// # File layout
///
/// ```text
/// <dir>/
///   coupons.lock   (cross-process lock sentinel)
///   coupons.json   (array of coupons, ordered by code)
/// ```
#[derive(Debug)]
pub struct FileCouponCatalog {
    /// Directory containing the catalog files.
    dir: PathBuf,
    /// Mutex serializing concurrent in-process access.
    lock: Mutex<()>,
    /// Sentinel file for cross-process advisory locking.
    lock_file: fs::File,
}

impl FileCouponCatalog {
    /// Opens (or creates) a catalog rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the lock
    /// file cannot be opened.
    #[inline]
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(storage_io_error)?;
        let lock_file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))
            .map_err(storage_io_error)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
            lock_file,
        })
    }

    /// Returns the default XDG-compliant data directory for this application.
    ///
    /// On Linux: `$XDG_DATA_HOME/course-checkout/` (typically
    /// `~/.local/share/course-checkout/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform data directory cannot be determined.
    #[inline]
    pub fn default_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|data_path| data_path.join(APP_NAME))
            .ok_or_else(|| {
                CheckoutError::Storage("could not determine platform data directory".into())
            })
    }

    /// Directory the catalog lives in.
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Acquires the in-process mutex and a shared file lock around `op`.
    fn with_shared_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock_shared().map_err(storage_io_error)?;
        let result = op();
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Acquires the in-process mutex and an exclusive file lock around `op`.
    fn with_exclusive_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock().map_err(storage_io_error)?;
        let result = op();
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Reads the coupon file into a code-indexed map. A missing file is an
    /// empty catalog.
    fn read_all(&self) -> Result<BTreeMap<CouponCode, Coupon>> {
        match fs::read_to_string(self.dir.join(COUPONS_FILE)) {
            Ok(contents) => {
                let coupons: Vec<Coupon> = serde_json::from_str(&contents)?;
                Ok(coupons
                    .into_iter()
                    .map(|coupon| (coupon.code.clone(), coupon))
                    .collect())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(storage_io_error(err)),
        }
    }

    /// Atomically rewrites the coupon file (write-to-tmp then rename).
    fn write_all(&self, coupons: BTreeMap<CouponCode, Coupon>) -> Result<()> {
        let items: Vec<Coupon> = coupons.into_values().collect();
        let json = serde_json::to_string_pretty(&items)?;
        let tmp_path = self.dir.join(COUPONS_TMP_FILE);
        fs::write(&tmp_path, json).map_err(storage_io_error)?;
        fs::rename(&tmp_path, self.dir.join(COUPONS_FILE)).map_err(storage_io_error)?;
        tracing::debug!(count = items.len(), dir = %self.dir.display(), "wrote coupon catalog");
        Ok(())
    }

    /// Looks up one coupon under a shared lock.
    fn find(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        self.with_shared_lock(|| {
            let mut coupons = self.read_all()?;
            Ok(coupons.remove(code))
        })
    }

    /// Lists all coupons under a shared lock.
    fn list(&self) -> Result<Vec<Coupon>> {
        self.with_shared_lock(|| Ok(self.read_all()?.into_values().collect()))
    }

    /// Inserts or replaces by code under an exclusive lock.
    fn upsert(&self, items: Vec<Coupon>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.with_exclusive_lock(|| {
            let mut coupons = self.read_all()?;
            for coupon in items {
                let _old = coupons.insert(coupon.code.clone(), coupon);
            }
            self.write_all(coupons)
        })
    }

    /// Removes by code under an exclusive lock.
    fn remove(&self, codes: &[CouponCode]) -> Result<()> {
        if codes.is_empty() {
            return Ok(());
        }
        self.with_exclusive_lock(|| {
            let mut coupons = self.read_all()?;
            for code in codes {
                let _old = coupons.remove(code);
            }
            self.write_all(coupons)
        })
    }
}

/// Wraps an I/O error into a [`CheckoutError::Storage`].
fn storage_io_error(err: std::io::Error) -> CheckoutError {
    CheckoutError::Storage(Box::new(err))
}

/// Wraps a mutex poison error into a [`CheckoutError::Storage`].
fn lock_poison_error<T>(err: &std::sync::PoisonError<T>) -> CheckoutError {
    CheckoutError::Storage(err.to_string().into())
}

#[cfg(feature = "blocking")]
impl super::BlockingCouponCatalog for FileCouponCatalog {
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
impl super::CouponCatalog for FileCouponCatalog {
    #[inline]
    fn find_by_code(
        &self,
        code: &CouponCode,
    ) -> impl Future<Output = Result<Option<Coupon>>> + Send {
        core::future::ready(self.find(code))
    }

    #[inline]
    fn coupons(&self) -> impl Future<Output = Result<Vec<Coupon>>> + Send {
        core::future::ready(self.list())
    }

    #[inline]
    fn upsert_coupons(&self, items: Vec<Coupon>) -> impl Future<Output = Result<()>> + Send {
        core::future::ready(self.upsert(items))
    }

    #[inline]
    fn remove_coupons(&self, codes: &[CouponCode]) -> impl Future<Output = Result<()>> + Send {
        core::future::ready(self.remove(codes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Currency, DateTime};

    /// Helper to create a [`FileCouponCatalog`] in a temporary directory.
    fn temp_catalog() -> (FileCouponCatalog, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCouponCatalog::new(dir.path().to_path_buf()).unwrap();
        (catalog, dir)
    }

    fn code(raw: &str) -> CouponCode {
        CouponCode::parse(raw).unwrap()
    }

    #[test]
    fn missing_file_is_empty_catalog() {
        let (catalog, _dir) = temp_catalog();
        assert!(catalog.list().unwrap().is_empty());
        assert!(catalog.find(&code("ANY")).unwrap().is_none());
        assert!(catalog.dir().join(LOCK_FILE).exists());
    }

    #[test]
    fn upsert_persists_across_instances() {
        let (catalog, dir) = temp_catalog();
        let expiry = DateTime::from_timestamp(1_900_000_000, 0).unwrap();
        catalog
            .upsert(vec![
                Coupon::amount_off("tenoff", 1_000)
                    .unwrap()
                    .restricted_to(Currency::Aud)
                    .expiring_at(expiry),
                Coupon::percent_off("checkout-99", 99).unwrap(),
            ])
            .unwrap();
        drop(catalog);

        let reopened = FileCouponCatalog::new(dir.path().to_path_buf()).unwrap();
        let listed = reopened.list().unwrap();
        assert_eq!(listed.len(), 2);
        let tenoff = reopened.find(&code("TENOFF")).unwrap().unwrap();
        assert_eq!(tenoff.currency, Some(Currency::Aud));
        assert_eq!(tenoff.expires_at, Some(expiry));
        assert!(!dir.path().join(COUPONS_TMP_FILE).exists());
    }

    #[test]
    fn file_is_readable_json() {
        let (catalog, dir) = temp_catalog();
        catalog
            .upsert(vec![Coupon::percent_off("spring", 15).unwrap()])
            .unwrap();
        let contents = fs::read_to_string(dir.path().join(COUPONS_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json[0]["code"], "SPRING");
        assert_eq!(json[0]["percentOff"], 15);
    }

    #[test]
    fn hand_edited_file_is_loaded() {
        let (catalog, dir) = temp_catalog();
        fs::write(
            dir.path().join(COUPONS_FILE),
            r#"[{ "code": "launch", "amountOff": 2500, "active": false }]"#,
        )
        .unwrap();
        let launch = catalog.find(&code("LAUNCH")).unwrap().unwrap();
        assert!(!launch.active);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let (catalog, dir) = temp_catalog();
        fs::write(dir.path().join(COUPONS_FILE), "{ nope").unwrap();
        assert!(matches!(
            catalog.list(),
            Err(CheckoutError::Serialization(_))
        ));
    }

    #[test]
    fn remove_and_empty_noops() {
        let (catalog, dir) = temp_catalog();
        catalog.upsert(Vec::new()).unwrap();
        assert!(!dir.path().join(COUPONS_FILE).exists());
        catalog
            .upsert(vec![Coupon::percent_off("A", 1).unwrap()])
            .unwrap();
        catalog.remove(&[code("a")]).unwrap();
        assert!(catalog.list().unwrap().is_empty());
    }

    #[test]
    fn concurrent_upserts_are_serialized() {
        let (owned, _dir) = temp_catalog();
        let catalog = std::sync::Arc::new(owned);
        let handles: Vec<_> = (0..8_u32)
            .map(|thread| {
                let shared = std::sync::Arc::clone(&catalog);
                std::thread::spawn(move || {
                    for index in 0..5_u32 {
                        let name = format!("T{thread}-{index}");
                        shared
                            .upsert(vec![Coupon::percent_off(&name, 10).unwrap()])
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(catalog.list().unwrap().len(), 40);
    }

    #[cfg(feature = "async")]
    mod async_tests {
        use super::*;
        use crate::catalog::CouponCatalog;

        #[tokio::test]
        async fn upsert_and_find() {
            let (catalog, _dir) = temp_catalog();
            catalog
                .upsert_coupons(vec![Coupon::percent_off("checkout-99", 99).unwrap()])
                .await
                .unwrap();
            let found = catalog.find_by_code(&code("CHECKOUT-99")).await.unwrap();
            assert!(found.is_some());
        }
    }
}
