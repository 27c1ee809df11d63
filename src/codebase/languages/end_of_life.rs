//! End-of-life version catalog
//!
//! Talks to an endoflife.date style service (`GET /api/{product}.json`) and
//! answers two questions: the latest published version matching a set of
//! constraints, and whether a concrete version has reached end of life.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://endoflife.date/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum EndOfLifeError {
    #[error("product {0:?} is not published in the version catalog")]
    UnknownProduct(String),

    #[error("product {product:?} has no release cycle matching {version:?}")]
    UnknownVersion { product: String, version: String },

    #[error("version catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("release cycle {cycle:?} has an unparseable eol date {date:?}")]
    BadDate { cycle: String, date: String },
}

/// Boolean-or-date field as published by the catalog
///
/// `lts` and `eol` are `false` for "no"/"never" and an ISO date string once a
/// cutoff exists.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Date(String),
}

impl Default for Flag {
    fn default() -> Self {
        Flag::Bool(false)
    }
}

impl Flag {
    /// Anything other than a plain `false` counts as set
    pub fn is_set(&self) -> bool {
        !matches!(self, Flag::Bool(false))
    }
}

/// One published release cycle for a product
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseCycle {
    pub cycle: String,
    #[serde(default)]
    pub lts: Flag,
    pub eol: Flag,
    pub latest: String,
}

/// Version lookup collaborator
pub trait VersionCatalog {
    fn releases(&self, product: &str) -> Result<Vec<ReleaseCycle>, EndOfLifeError>;
}

/// HTTP client for the endoflife.date API
#[derive(Debug)]
pub struct EndOfLifeClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl Default for EndOfLifeClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl EndOfLifeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::blocking::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new()),
        }
    }
}

impl VersionCatalog for EndOfLifeClient {
    fn releases(&self, product: &str) -> Result<Vec<ReleaseCycle>, EndOfLifeError> {
        let response = self
            .http
            .get(format!("{}/{}.json", self.base_url, product))
            .send()?;

        if !response.status().is_success() {
            return Err(EndOfLifeError::UnknownProduct(product.to_string()));
        }

        Ok(response.json()?)
    }
}

/// Fixed catalog used as a test double
#[derive(Debug, Default)]
pub struct StaticCatalog {
    products: std::collections::HashMap<String, Vec<ReleaseCycle>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, product: &str, releases: Vec<ReleaseCycle>) -> Self {
        self.products.insert(product.to_string(), releases);
        self
    }
}

impl VersionCatalog for StaticCatalog {
    fn releases(&self, product: &str) -> Result<Vec<ReleaseCycle>, EndOfLifeError> {
        self.products
            .get(product)
            .cloned()
            .ok_or_else(|| EndOfLifeError::UnknownProduct(product.to_string()))
    }
}

/// Finds the latest published version for a product
///
/// When `lts_only` is set, non-LTS cycles are dropped. When a version hint is
/// given, only cycles equal to the hint or to its major component are kept.
/// The winning cycle's `latest` version is truncated to `major.minor`.
pub fn latest_version_for(
    catalog: &dyn VersionCatalog,
    product: &str,
    lts_only: bool,
    version_hint: Option<&str>,
) -> Result<String, EndOfLifeError> {
    let mut releases = catalog.releases(product)?;

    if lts_only {
        releases.retain(|release| release.lts.is_set());
    }

    if let Some(hint) = version_hint {
        let major = hint.split('.').next().unwrap_or(hint);
        releases.retain(|release| release.cycle == hint || release.cycle == major);
    }

    releases.sort_by_key(|release| std::cmp::Reverse(cycle_key(&release.cycle)));

    let newest = releases
        .first()
        .ok_or_else(|| EndOfLifeError::UnknownVersion {
            product: product.to_string(),
            version: version_hint.unwrap_or("latest").to_string(),
        })?;

    Ok(truncate_to_minor(&newest.latest))
}

/// Whether a concrete product version has reached end of life
///
/// Matches the cycle equal to the version, falling back to the major
/// component. A boolean `false` eol means never; a date is compared against
/// today.
pub fn is_end_of_life(
    catalog: &dyn VersionCatalog,
    product: &str,
    version: &str,
) -> Result<bool, EndOfLifeError> {
    let releases = catalog.releases(product)?;

    let cycle = releases
        .iter()
        .find(|release| release.cycle == version)
        .or_else(|| {
            let major = version.split('.').next().unwrap_or(version);
            releases.iter().find(|release| release.cycle == major)
        })
        .ok_or_else(|| EndOfLifeError::UnknownVersion {
            product: product.to_string(),
            version: version.to_string(),
        })?;

    match &cycle.eol {
        Flag::Bool(eol) => Ok(*eol),
        Flag::Date(date) => {
            let eol_date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                EndOfLifeError::BadDate {
                    cycle: cycle.cycle.clone(),
                    date: date.clone(),
                }
            })?;
            Ok(eol_date < Utc::now().date_naive())
        }
    }
}

fn cycle_key(cycle: &str) -> Vec<u32> {
    cycle
        .split('.')
        .map(|segment| segment.parse().unwrap_or(0))
        .collect()
}

fn truncate_to_minor(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(cycle: &str, lts: Flag, eol: Flag, latest: &str) -> ReleaseCycle {
        ReleaseCycle {
            cycle: cycle.to_string(),
            lts,
            eol,
            latest: latest.to_string(),
        }
    }

    // Kept relative so the fixture never ages into its own EOL window.
    fn a_year_from_now() -> String {
        (Utc::now().date_naive() + chrono::Days::new(365)).to_string()
    }

    fn node_catalog() -> StaticCatalog {
        StaticCatalog::new().with_product(
            "nodejs",
            vec![
                release("21", Flag::Bool(false), Flag::Bool(false), "21.1.0"),
                release("20", Flag::Date("2023-10-24".to_string()), Flag::Bool(false), "20.9.0"),
                release("18", Flag::Date("2022-10-25".to_string()), Flag::Date(a_year_from_now()), "18.18.2"),
            ],
        )
    }

    #[test]
    fn test_latest_version_prefers_newest_cycle() {
        let version = latest_version_for(&node_catalog(), "nodejs", false, None).unwrap();
        assert_eq!(version, "21.1");
    }

    #[test]
    fn test_latest_version_lts_only_skips_non_lts() {
        let version = latest_version_for(&node_catalog(), "nodejs", true, None).unwrap();
        assert_eq!(version, "20.9");
    }

    #[test]
    fn test_latest_version_with_hint_matches_major() {
        let version = latest_version_for(&node_catalog(), "nodejs", false, Some("18.2")).unwrap();
        assert_eq!(version, "18.18");
    }

    #[test]
    fn test_unknown_product_is_distinct_error() {
        let err = latest_version_for(&StaticCatalog::new(), "zig", false, None).unwrap_err();
        assert!(matches!(err, EndOfLifeError::UnknownProduct(_)));
    }

    #[test]
    fn test_unmatched_version_is_distinct_error() {
        let err = latest_version_for(&node_catalog(), "nodejs", false, Some("99")).unwrap_err();
        assert!(matches!(err, EndOfLifeError::UnknownVersion { .. }));
    }

    #[test]
    fn test_boolean_false_eol_is_never_end_of_life() {
        assert!(!is_end_of_life(&node_catalog(), "nodejs", "21").unwrap());
    }

    #[test]
    fn test_past_date_eol_is_end_of_life() {
        let catalog = StaticCatalog::new().with_product(
            "python",
            vec![release(
                "2.7",
                Flag::Bool(false),
                Flag::Date("2020-01-01".to_string()),
                "2.7.18",
            )],
        );
        assert!(is_end_of_life(&catalog, "python", "2.7").unwrap());
    }

    #[test]
    fn test_future_date_eol_is_not_end_of_life() {
        assert!(!is_end_of_life(&node_catalog(), "nodejs", "18").unwrap());
    }

    #[test]
    fn test_eol_falls_back_to_major_component() {
        assert!(!is_end_of_life(&node_catalog(), "nodejs", "20.9").unwrap());
    }

    #[test]
    fn test_flag_deserializes_bool_and_date() {
        let bool_flag: Flag = serde_json::from_str("false").unwrap();
        let date_flag: Flag = serde_json::from_str("\"2025-04-30\"").unwrap();
        assert!(!bool_flag.is_set());
        assert!(date_flag.is_set());
    }
}
