//! Environment-driven configuration.

use core::time::Duration;
use std::path::PathBuf;

use secrecy::SecretString;

use crate::client::RetryPolicy;
use crate::error::{CheckoutError, Result};
use crate::models::RegionCode;

/// Secret processor API key.
pub const ENV_API_KEY: &str = "CHECKOUT_PROCESSOR_API_KEY";
/// Processor base URL override.
pub const ENV_PROCESSOR_URL: &str = "CHECKOUT_PROCESSOR_URL";
/// Per-request timeout in whole seconds.
pub const ENV_TIMEOUT_SECS: &str = "CHECKOUT_TIMEOUT_SECS";
/// Total intent creation attempts.
pub const ENV_MAX_ATTEMPTS: &str = "CHECKOUT_MAX_ATTEMPTS";
/// Minimum charge override in minor units.
pub const ENV_MINIMUM_CHARGE: &str = "CHECKOUT_MINIMUM_CHARGE";
/// Fallback region code.
pub const ENV_DEFAULT_REGION: &str = "CHECKOUT_DEFAULT_REGION";
/// Path to a geolocation CIDR table.
pub const ENV_GEO_TABLE: &str = "CHECKOUT_GEO_TABLE";
/// Directory of the file-backed coupon catalog.
pub const ENV_COUPON_DIR: &str = "CHECKOUT_COUPON_DIR";

/// Checkout settings.
#[derive(Debug)]
pub struct CheckoutConfig {
    /// Processor API key; charging is disabled without one.
    pub api_key: Option<SecretString>,
    /// Processor base URL override.
    pub processor_url: Option<String>,
    /// Per-request processor timeout.
    pub timeout: Duration,
    /// Backoff for intent creation.
    pub retry_policy: RetryPolicy,
    /// Minimum charge override in minor units.
    pub minimum_charge: Option<u64>,
    /// Region used whenever geolocation cannot decide.
    pub default_region: RegionCode,
    /// Geolocation table file.
    pub geo_table: Option<PathBuf>,
    /// Coupon catalog directory.
    pub coupon_dir: Option<PathBuf>,
}

impl Default for CheckoutConfig {
    #[inline]
    fn default() -> Self {
        Self {
            api_key: None,
            processor_url: None,
            timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
            minimum_charge: None,
            default_region: RegionCode::Au,
            geo_table: None,
            coupon_dir: None,
        }
    }
}

impl CheckoutConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Config`] if a variable is set to an
    /// unparsable value.
    #[inline]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Config`] if a variable is set to an
    /// unparsable value.
    #[inline]
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let timeout = get(ENV_TIMEOUT_SECS)
            .map(|raw| parse_number::<u64>(ENV_TIMEOUT_SECS, &raw))
            .transpose()?
            .map_or(defaults.timeout, Duration::from_secs);
        let retry_policy = match get(ENV_MAX_ATTEMPTS) {
            Some(raw) => {
                let attempts = parse_number::<u32>(ENV_MAX_ATTEMPTS, &raw)?;
                if attempts == 0 {
                    return Err(CheckoutError::Config(format!(
                        "{ENV_MAX_ATTEMPTS} must be at least 1"
                    )));
                }
                RetryPolicy::default().with_max_attempts(attempts)
            }
            None => defaults.retry_policy,
        };
        let minimum_charge = get(ENV_MINIMUM_CHARGE)
            .map(|raw| parse_number::<u64>(ENV_MINIMUM_CHARGE, &raw))
            .transpose()?;
        let default_region = get(ENV_DEFAULT_REGION)
            .map(|raw| raw.parse::<RegionCode>())
            .transpose()?
            .unwrap_or(defaults.default_region);

        Ok(Self {
            api_key: get(ENV_API_KEY).map(SecretString::from),
            processor_url: get(ENV_PROCESSOR_URL),
            timeout,
            retry_policy,
            minimum_charge,
            default_region,
            geo_table: get(ENV_GEO_TABLE).map(PathBuf::from),
            coupon_dir: get(ENV_COUPON_DIR).map(PathBuf::from),
        })
    }
}

/// Parses a numeric variable.
fn parse_number<T: core::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: core::fmt::Display,
{
    raw.parse()
        .map_err(|err| CheckoutError::Config(format!("{name}={raw:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret as _;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|&(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = CheckoutConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry_policy, RetryPolicy::default());
        assert_eq!(config.default_region, RegionCode::Au);
        assert!(config.minimum_charge.is_none());
    }

    #[test]
    fn reads_every_variable() {
        let config = CheckoutConfig::from_lookup(lookup(&[
            (ENV_API_KEY, "sk_live_abc"),
            (ENV_PROCESSOR_URL, "http://localhost:12111"),
            (ENV_TIMEOUT_SECS, "3"),
            (ENV_MAX_ATTEMPTS, "5"),
            (ENV_MINIMUM_CHARGE, "100"),
            (ENV_DEFAULT_REGION, "us"),
            (ENV_GEO_TABLE, "/etc/checkout/geo.json"),
            (ENV_COUPON_DIR, "/var/lib/checkout"),
        ]))
        .unwrap();
        assert_eq!(
            config.api_key.as_ref().map(|key| key.expose_secret()),
            Some("sk_live_abc")
        );
        assert_eq!(config.processor_url.as_deref(), Some("http://localhost:12111"));
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.retry_policy.max_attempts(), 5);
        assert_eq!(config.minimum_charge, Some(100));
        assert_eq!(config.default_region, RegionCode::Us);
        assert_eq!(config.geo_table, Some(PathBuf::from("/etc/checkout/geo.json")));
        assert_eq!(config.coupon_dir, Some(PathBuf::from("/var/lib/checkout")));
    }

    #[test]
    fn blank_values_are_unset() {
        let config =
            CheckoutConfig::from_lookup(lookup(&[(ENV_API_KEY, "  "), (ENV_DEFAULT_REGION, "")]))
                .unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.default_region, RegionCode::Au);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for (name, value) in [
            (ENV_TIMEOUT_SECS, "ten"),
            (ENV_MAX_ATTEMPTS, "0"),
            (ENV_MAX_ATTEMPTS, "-1"),
            (ENV_MINIMUM_CHARGE, "0.5"),
            (ENV_DEFAULT_REGION, "XX"),
        ] {
            let result = CheckoutConfig::from_lookup(lookup(&[(name, value)]));
            assert!(matches!(result, Err(CheckoutError::Config(_))), "{name}={value}");
        }
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = CheckoutConfig::from_lookup(lookup(&[(ENV_API_KEY, "sk_live_abc")])).unwrap();
        assert!(!format!("{config:?}").contains("sk_live_abc"));
    }
}
