//! Network origin to pricing region resolution.
//!
//! [`RegionResolver`] maps a caller's address to one of the fixed pricing
//! regions. Resolution is fail-open: any lookup problem yields the default
//! region with [`RegionResolution::lookup_failed`] set, never an error, so
//! pricing cannot block checkout.

use core::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CheckoutError, Result};
use crate::models::{CountryCode, Currency, Money, RegionCode, RegionPrice};

/// Geographic coordinates in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    /// Latitude, −90..=90.
    pub latitude: f64,
    /// Longitude, −180..=180.
    pub longitude: f64,
}

/// Result of a geolocation lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRecord {
    /// Country the address is registered in.
    pub country: CountryCode,
    /// Approximate location, when known.
    pub coordinates: Option<Coordinates>,
}

/// Geolocation collaborator.
///
/// Implementations return `Ok(None)` for addresses they know nothing about
/// and `Err` only for genuine failures (corrupt data, unreachable service).
pub trait GeoLookup: core::fmt::Debug + Send + Sync {
    /// Looks up geographic data for an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup backend fails.
    fn lookup(&self, addr: IpAddr) -> Result<Option<GeoRecord>>;
}

/// One row of a geo table file.
#[derive(Debug, Deserialize)]
struct GeoEntry {
    /// CIDR block, e.g. `1.0.0.0/24` or `2400:cb00::/32`.
    network: String,
    /// Registered country.
    country: CountryCode,
    /// Latitude of the block.
    #[serde(default)]
    latitude: Option<f64>,
    /// Longitude of the block.
    #[serde(default)]
    longitude: Option<f64>,
}

/// A contiguous address range mapped to a record.
#[derive(Debug, Clone)]
struct GeoRange {
    /// First address in the range, as IPv6 bits.
    start: u128,
    /// Last address in the range, as IPv6 bits.
    end: u128,
    /// Record for every address in the range.
    record: GeoRecord,
}

/// Offline CIDR range table.
///
/// IPv4 blocks are stored as IPv4-mapped IPv6 ranges so a single sorted
/// vector serves both families.
#[derive(Debug, Clone, Default)]
pub struct GeoTable {
    /// Ranges sorted by start address.
    ranges: Vec<GeoRange>,
}

impl GeoTable {
    /// A table that knows no addresses.
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a JSON array of `{ network, country, latitude?, longitude? }`.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON, country codes, or CIDR blocks.
    #[inline]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: Vec<GeoEntry> = serde_json::from_str(json)?;
        let mut ranges = entries
            .into_iter()
            .map(|entry| -> Result<GeoRange> {
                let (start, end) = parse_cidr(&entry.network)?;
                let coordinates = match (entry.latitude, entry.longitude) {
                    (Some(latitude), Some(longitude)) => Some(Coordinates {
                        latitude,
                        longitude,
                    }),
                    (Some(_), None) | (None, Some(_)) | (None, None) => None,
                };
                Ok(GeoRange {
                    start,
                    end,
                    record: GeoRecord {
                        country: entry.country,
                        coordinates,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        ranges.sort_by_key(|range| range.start);
        tracing::debug!(ranges = ranges.len(), "geo table loaded");
        Ok(Self { ranges })
    }

    /// Loads a table from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[inline]
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|err| CheckoutError::Storage(Box::new(err)))?;
        Self::from_json_str(&json)
    }

    /// Number of ranges in the table.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns `true` if the table has no ranges.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl GeoLookup for GeoTable {
    #[inline]
    fn lookup(&self, addr: IpAddr) -> Result<Option<GeoRecord>> {
        let key = address_bits(addr);
        let idx = self.ranges.partition_point(|range| range.start <= key);
        let found = idx
            .checked_sub(1)
            .and_then(|last| self.ranges.get(last))
            .filter(|range| key <= range.end)
            .map(|range| range.record.clone());
        Ok(found)
    }
}

/// Converts an address to IPv6 bits, mapping IPv4 into `::ffff:0:0/96`.
fn address_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().to_bits(),
        IpAddr::V6(v6) => v6.to_bits(),
    }
}

/// Parses a CIDR block into its inclusive `(start, end)` bit range.
fn parse_cidr(network: &str) -> Result<(u128, u128)> {
    let invalid = || CheckoutError::Config(format!("invalid CIDR block: {network}"));
    let (addr_part, prefix_part) = network.trim().split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr_part.parse().map_err(|_err| invalid())?;
    let prefix: u32 = prefix_part.parse().map_err(|_err| invalid())?;
    let v6_prefix = match addr {
        IpAddr::V4(_) if prefix <= 32 => prefix + 96,
        IpAddr::V6(_) if prefix <= 128 => prefix,
        IpAddr::V4(_) | IpAddr::V6(_) => return Err(invalid()),
    };
    let mask = u128::MAX.checked_shl(128 - v6_prefix).unwrap_or(0);
    let start = address_bits(addr) & mask;
    Ok((start, start | !mask))
}

/// Region list prices.
///
/// Always contains the default region, so resolution can never come back
/// empty-handed.
#[derive(Debug, Clone)]
pub struct RegionTable {
    /// Prices by region.
    prices: HashMap<RegionCode, RegionPrice>,
    /// Price used for every fallback.
    default_price: RegionPrice,
}

impl Default for RegionTable {
    #[inline]
    fn default() -> Self {
        let builtin = [
            (RegionCode::Au, 12_000, Currency::Aud),
            (RegionCode::Us, 8_000, Currency::Usd),
            (RegionCode::Gb, 6_500, Currency::Gbp),
            (RegionCode::Eu, 7_500, Currency::Eur),
            (RegionCode::Ca, 11_000, Currency::Cad),
            (RegionCode::Nz, 13_000, Currency::Nzd),
        ];
        let prices = builtin
            .into_iter()
            .map(|(code, amount, currency)| {
                (code, RegionPrice::new(code, Money::new(amount, currency)))
            })
            .collect();
        Self {
            prices,
            default_price: RegionPrice::new(RegionCode::Au, Money::new(12_000, Currency::Aud)),
        }
    }
}

impl RegionTable {
    /// Builds a table from explicit prices.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Config`] if `default_region` has no price.
    #[inline]
    pub fn new(prices: Vec<RegionPrice>, default_region: RegionCode) -> Result<Self> {
        let by_code: HashMap<RegionCode, RegionPrice> =
            prices.into_iter().map(|price| (price.code, price)).collect();
        let default_price = by_code.get(&default_region).cloned().ok_or_else(|| {
            CheckoutError::Config(format!("no price for default region {default_region}"))
        })?;
        Ok(Self {
            prices: by_code,
            default_price,
        })
    }

    /// Parses a JSON array of [`RegionPrice`] records.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or a missing default region.
    #[inline]
    pub fn from_json_str(json: &str, default_region: RegionCode) -> Result<Self> {
        let prices: Vec<RegionPrice> = serde_json::from_str(json)?;
        Self::new(prices, default_region)
    }

    /// Returns the built-in table with a different default region.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Config`] if the region has no built-in price.
    #[inline]
    pub fn with_default(self, default_region: RegionCode) -> Result<Self> {
        Self::new(self.prices.into_values().collect(), default_region)
    }

    /// Price for a region, if configured.
    #[inline]
    #[must_use]
    pub fn get(&self, code: RegionCode) -> Option<&RegionPrice> {
        self.prices.get(&code)
    }

    /// Price used for every fallback.
    #[inline]
    #[must_use]
    pub const fn default_price(&self) -> &RegionPrice {
        &self.default_price
    }

    /// All configured prices, ordered by region code.
    #[inline]
    #[must_use]
    pub fn prices(&self) -> Vec<&RegionPrice> {
        let mut all: Vec<&RegionPrice> = self.prices.values().collect();
        all.sort_by_key(|price| price.code);
        all
    }
}

/// How a resolution was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionSource {
    /// Loopback or private address; lookup skipped.
    Local,
    /// Country found in the country table.
    Country,
    /// Country unmapped; region chosen from coordinates.
    Proximity,
    /// Nothing matched, or the lookup failed.
    Default,
}

/// Outcome of [`RegionResolver::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegionResolution {
    /// Chosen region's price.
    pub price: RegionPrice,
    /// How the region was chosen.
    pub source: ResolutionSource,
    /// Country reported by the lookup, if any.
    pub country: Option<CountryCode>,
    /// Set when the address could not be parsed or the lookup errored.
    pub lookup_failed: bool,
}

impl RegionResolution {
    /// Chosen region.
    #[inline]
    #[must_use]
    pub const fn region_code(&self) -> RegionCode {
        self.price.code
    }

    /// Region currency.
    #[inline]
    #[must_use]
    pub const fn currency(&self) -> Currency {
        self.price.base_amount.currency
    }

    /// Region list price.
    #[inline]
    #[must_use]
    pub const fn base_amount(&self) -> Money {
        self.price.base_amount
    }

    /// Display symbol.
    #[inline]
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.price.symbol
    }
}

/// Maps addresses to pricing regions.
#[derive(Debug)]
pub struct RegionResolver<G: GeoLookup = GeoTable> {
    /// Geolocation backend.
    geo: G,
    /// Region prices.
    table: RegionTable,
}

impl<G: GeoLookup> RegionResolver<G> {
    /// Creates a resolver over a lookup backend and price table.
    #[inline]
    #[must_use]
    pub const fn new(geo: G, table: RegionTable) -> Self {
        Self { geo, table }
    }

    /// Price table in use.
    #[inline]
    #[must_use]
    pub const fn table(&self) -> &RegionTable {
        &self.table
    }

    /// Resolves a network origin to a pricing region.
    ///
    /// Accepts plain addresses, IPv4-mapped IPv6 addresses, and
    /// `X-Forwarded-For` style lists (the first entry is the client).
    /// Never fails.
    #[tracing::instrument(skip(self))]
    #[inline]
    pub fn resolve(&self, source_address: &str) -> RegionResolution {
        let client = source_address.split(',').next().unwrap_or_default().trim();
        let Ok(parsed) = client.parse::<IpAddr>() else {
            tracing::warn!("unparsable source address, using default region");
            return self.fallback(ResolutionSource::Default, None, true);
        };
        let addr = unmap_ipv4(parsed);
        if is_local(addr) {
            tracing::debug!(%addr, "local address, skipping lookup");
            return self.fallback(ResolutionSource::Local, None, false);
        }

        let record = match self.geo.lookup(addr) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(%addr, "address unknown to geo lookup");
                return self.fallback(ResolutionSource::Default, None, false);
            }
            Err(err) => {
                tracing::warn!(%addr, error = %err, "geo lookup failed, using default region");
                return self.fallback(ResolutionSource::Default, None, true);
            }
        };

        let (region, source) = match region_for_country(&record.country) {
            Some(region) => (Some(region), ResolutionSource::Country),
            None => (
                record.coordinates.and_then(proximity_region),
                ResolutionSource::Proximity,
            ),
        };
        match region.and_then(|code| self.table.get(code)) {
            Some(price) => {
                tracing::debug!(country = %record.country, region = %price.code, "region resolved");
                RegionResolution {
                    price: price.clone(),
                    source,
                    country: Some(record.country),
                    lookup_failed: false,
                }
            }
            None => self.fallback(ResolutionSource::Default, Some(record.country), false),
        }
    }

    /// Builds a default-region resolution.
    fn fallback(
        &self,
        source: ResolutionSource,
        country: Option<CountryCode>,
        lookup_failed: bool,
    ) -> RegionResolution {
        RegionResolution {
            price: self.table.default_price().clone(),
            source,
            country,
            lookup_failed,
        }
    }
}

/// Unwraps `::ffff:a.b.c.d` into its IPv4 address.
fn unmap_ipv4(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4),
        IpAddr::V4(_) => addr,
    }
}

/// Returns `true` for addresses that never leave a local network.
fn is_local(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_local_v4(v4),
        IpAddr::V6(v6) => is_local_v6(v6),
    }
}

/// Loopback, RFC 1918 private, link-local, or unspecified IPv4.
const fn is_local_v4(v4: Ipv4Addr) -> bool {
    v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
}

/// Loopback, unspecified, unique-local (`fc00::/7`) or link-local
/// (`fe80::/10`) IPv6.
const fn is_local_v6(v6: Ipv6Addr) -> bool {
    let bits = v6.to_bits();
    v6.is_loopback() || v6.is_unspecified() || bits >> 121 == 0x7e || bits >> 118 == 0x3fa
}

/// Explicit country to region mapping.
fn region_for_country(country: &CountryCode) -> Option<RegionCode> {
    match country.as_str() {
        "AU" => Some(RegionCode::Au),
        "NZ" => Some(RegionCode::Nz),
        "US" | "PR" | "GU" => Some(RegionCode::Us),
        "CA" => Some(RegionCode::Ca),
        "GB" | "IM" | "JE" | "GG" => Some(RegionCode::Gb),
        "AT" | "BE" | "BG" | "HR" | "CY" | "CZ" | "DK" | "EE" | "FI" | "FR" | "DE" | "GR"
        | "HU" | "IE" | "IT" | "LV" | "LT" | "LU" | "MT" | "NL" | "PL" | "PT" | "RO" | "SK"
        | "SI" | "ES" | "SE" | "IS" | "LI" | "NO" | "CH" => Some(RegionCode::Eu),
        _ => None,
    }
}

/// Coarse quadrant heuristic for countries missing from the table.
fn proximity_region(coords: Coordinates) -> Option<RegionCode> {
    let Coordinates {
        latitude,
        longitude,
    } = coords;
    let valid = latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude);
    if !valid {
        return None;
    }
    if longitude >= 110.0 && latitude < 0.0 {
        return Some(if longitude >= 165.0 {
            RegionCode::Nz
        } else {
            RegionCode::Au
        });
    }
    if longitude < -30.0 {
        return Some(if latitude >= 50.0 {
            RegionCode::Ca
        } else {
            RegionCode::Us
        });
    }
    (longitude < 60.0).then_some(RegionCode::Eu)
}
