//! Metrics settings loaded from a TOML file.
//!
//! Every domain constant the engine relies on lives here: CRM object and
//! property names, category labels, sampling caps, the cache TTL, quota
//! brackets and recommendation thresholds. Every section is optional and
//! falls back to the defaults below, so an empty file is a valid config.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Root of `metrics.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// CRM object type names
    pub objects: ObjectTypes,
    /// Contact sampling limits
    pub sampling: SamplingConfig,
    /// Metrics cache settings
    pub cache: CacheConfig,
    /// Contact property names and category labels
    pub contacts: ContactFields,
    /// Donation property names and sample size
    pub donations: DonationFields,
    /// Quota bracket boundaries
    pub quota: QuotaConfig,
    /// Campaign property names and join settings
    pub campaigns: CampaignFields,
    /// Recommendation rule thresholds
    pub recommendations: RecommendationThresholds,
}

/// Names of the CRM object types the engine reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObjectTypes {
    /// Contact object type
    pub contacts: String,
    /// Donation object type (usually a custom object)
    pub donations: String,
    /// Campaign object type
    pub campaigns: String,
}

impl Default for ObjectTypes {
    fn default() -> Self {
        Self {
            contacts: "contacts".to_string(),
            donations: "donations".to_string(),
            campaigns: "campaigns".to_string(),
        }
    }
}

/// Bounds on the contact sample used for extrapolation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Records requested per page
    pub page_size: usize,
    /// Maximum number of pages fetched
    pub max_pages: usize,
    /// Timeout for a single page fetch, in milliseconds
    pub page_timeout_ms: u64,
    /// Window for "recent" contacts, in days
    pub recent_window_days: i64,
    /// Contacts without activity for this many days count as inactive
    pub inactivity_window_days: i64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 3,
            page_timeout_ms: 10_000,
            recent_window_days: 30,
            inactivity_window_days: 90,
        }
    }
}

impl SamplingConfig {
    /// Largest number of contacts a sample can hold.
    #[must_use]
    pub const fn sample_cap(&self) -> usize {
        self.page_size.saturating_mul(self.max_pages)
    }
}

/// Metrics cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live of a cached aggregate, in milliseconds
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: crate::core::cache::DEFAULT_TTL_MS,
        }
    }
}

/// Contact property names and category labels.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContactFields {
    /// Property holding the membership category
    pub category_field: String,
    /// Property holding the region
    pub region_field: String,
    /// Property holding the creation timestamp
    pub created_field: String,
    /// Property holding the last activity timestamp
    pub last_activity_field: String,
    /// Property holding the contact's quota
    pub quota_field: String,
    /// Category counted as converted
    pub affiliate_label: String,
    /// Recognized category labels; any other value is unclassified
    pub categories: Vec<String>,
}

impl Default for ContactFields {
    fn default() -> Self {
        Self {
            category_field: "membership_type".to_string(),
            region_field: "state".to_string(),
            created_field: "createdate".to_string(),
            last_activity_field: "notes_last_updated".to_string(),
            quota_field: "quota".to_string(),
            affiliate_label: "Affiliate".to_string(),
            categories: vec!["Affiliate".to_string(), "Sympathizer".to_string()],
        }
    }
}

/// Donation property names and sample size.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DonationFields {
    /// Property holding the donated amount
    pub amount_field: String,
    /// Property holding the donation date
    pub date_field: String,
    /// Property holding the donor contact id
    pub contact_field: String,
    /// Number of donations sampled
    pub sample_size: usize,
}

impl Default for DonationFields {
    fn default() -> Self {
        Self {
            amount_field: "amount".to_string(),
            date_field: "donation_date".to_string(),
            contact_field: "contact_id".to_string(),
            sample_size: 100,
        }
    }
}

/// One quota bracket. `max` is inclusive; `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuotaBracket {
    /// Display label (e.g. "101-500")
    pub label: String,
    /// Inclusive upper bound
    #[serde(default)]
    pub max: Option<f64>,
}

impl QuotaBracket {
    fn bounded(label: &str, max: f64) -> Self {
        Self {
            label: label.to_string(),
            max: Some(max),
        }
    }
}

/// Ordered quota brackets; a value lands in the first bracket whose `max` it
/// does not exceed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Brackets in ascending order
    pub brackets: Vec<QuotaBracket>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            brackets: vec![
                QuotaBracket::bounded("0-100", 100.0),
                QuotaBracket::bounded("101-500", 500.0),
                QuotaBracket::bounded("501-1000", 1000.0),
                QuotaBracket {
                    label: "1000+".to_string(),
                    max: None,
                },
            ],
        }
    }
}

/// Campaign property names and join settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CampaignFields {
    /// Property holding the campaign name
    pub name_field: String,
    /// Property holding the campaign status
    pub status_field: String,
    /// Property holding the start date
    pub start_field: String,
    /// Property holding the end date
    pub end_field: String,
    /// Status values counted as active (case-insensitive)
    pub active_statuses: Vec<String>,
    /// Maximum ids per batch read
    pub batch_size: usize,
    /// Object type of the campaign's associated members
    pub association_type: String,
}

impl Default for CampaignFields {
    fn default() -> Self {
        Self {
            name_field: "name".to_string(),
            status_field: "status".to_string(),
            start_field: "start_date".to_string(),
            end_field: "end_date".to_string(),
            active_statuses: vec!["active".to_string(), "in_progress".to_string()],
            batch_size: 100,
            association_type: "contacts".to_string(),
        }
    }
}

/// Thresholds of the recommendation rules. Rates are percentages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecommendationThresholds {
    /// Conversion below this is flagged
    pub min_conversion_rate: f64,
    /// Monthly growth below this is flagged
    pub min_growth_rate: f64,
    /// Inactive contacts above this share of active ones are flagged
    pub max_inactive_ratio: f64,
    /// Conversion above this is reported as a positive signal
    pub strong_conversion_rate: f64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            min_conversion_rate: 5.0,
            min_growth_rate: 2.0,
            max_inactive_ratio: 0.3,
            strong_conversion_rate: 10.0,
        }
    }
}

impl MetricsConfig {
    /// Checks the invariants the engine relies on.
    ///
    /// # Errors
    /// Returns `Error::Config` for zero-sized pages or batches, an affiliate
    /// label missing from the categories, an unbounded bracket before the
    /// last one, or brackets that are not in ascending order.
    pub fn validate(&self) -> Result<()> {
        if self.sampling.page_size == 0 || self.sampling.max_pages == 0 {
            return Err(Error::Config {
                message: "sampling.page_size and sampling.max_pages must be positive".to_string(),
            });
        }
        if self.campaigns.batch_size == 0 {
            return Err(Error::Config {
                message: "campaigns.batch_size must be positive".to_string(),
            });
        }
        if !self.contacts.categories.contains(&self.contacts.affiliate_label) {
            return Err(Error::Config {
                message: format!(
                    "contacts.affiliate_label {:?} must be one of contacts.categories",
                    self.contacts.affiliate_label
                ),
            });
        }
        if self.quota.brackets.is_empty() {
            return Err(Error::Config {
                message: "quota.brackets must not be empty".to_string(),
            });
        }
        let last = self.quota.brackets.len() - 1;
        if let Some(open) = self.quota.brackets[..last].iter().find(|b| b.max.is_none()) {
            return Err(Error::Config {
                message: format!(
                    "quota bracket {:?} has no upper bound but is not the last bracket",
                    open.label
                ),
            });
        }
        let bounds: Vec<f64> = self.quota.brackets.iter().filter_map(|b| b.max).collect();
        if bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(Error::Config {
                message: "quota.brackets must be in ascending order".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads and validates metrics settings from a TOML file.
///
/// # Errors
/// Returns `Error::Config` if the file cannot be read, is not valid TOML,
/// or fails validation.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MetricsConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Loading metrics configuration from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;
    let config: MetricsConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path_ref.display()),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads settings from `METRICS_CONFIG` (default `metrics.toml`), using the
/// built-in defaults when that file does not exist.
///
/// # Errors
/// Returns `Error::Config` if the file exists but is invalid.
pub fn load_default_config() -> Result<MetricsConfig> {
    let path = std::env::var("METRICS_CONFIG").unwrap_or_else(|_| "metrics.toml".to_string());
    if Path::new(&path).exists() {
        load_config(&path)
    } else {
        tracing::info!("No metrics config at {path}, using defaults");
        Ok(MetricsConfig::default())
    }
}
