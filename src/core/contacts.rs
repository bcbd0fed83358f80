//! Contact sampling and population summary.
//!
//! The exact contact count comes from one cheap count call; everything else
//! is extrapolated from a bounded multi-page sample. Paging stops early when
//! a page times out or fails, and the summary is built from whatever was
//! collected. Only the count call can fail the summary.

use crate::{
    config::metrics::{ContactFields, MetricsConfig, SamplingConfig},
    core::{
        extrapolate::{extrapolate_by, extrapolate_matching, extrapolate_since},
        percentage,
    },
    entities::{Entity, SearchQuery},
    errors::{Error, Result},
    gateway::CrmGateway,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Region label for contacts without a region.
pub const UNKNOWN_REGION: &str = "Unknown";

/// Population-level contact statistics extrapolated from a sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    /// Exact number of contacts
    pub total: u64,
    /// Extrapolated contacts per configured category
    pub by_category: BTreeMap<String, u64>,
    /// Extrapolated contacts per region
    pub by_region: BTreeMap<String, u64>,
    /// Extrapolated contacts created inside the recent window
    pub recent_count: u64,
    /// Extrapolated contacts with activity inside the inactivity window
    pub active_count: u64,
    /// Extrapolated contacts without recent activity
    pub inactive_count: u64,
    /// Number of contacts actually sampled
    pub sample_size: usize,
}

impl ContactSummary {
    /// Extrapolated count for a category label, 0 if unknown.
    #[must_use]
    pub fn category(&self, label: &str) -> u64 {
        self.by_category.get(label).copied().unwrap_or(0)
    }
}

/// A region with its count and share of the total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionCount {
    /// Region label
    pub region: String,
    /// Number of contacts
    pub count: u64,
    /// Share of the total, 0-100
    pub percentage: f64,
}

/// Turns per-region counts into a list sorted by count, largest first.
/// Ties are ordered by region name.
#[must_use]
pub fn region_distribution(counts: &BTreeMap<String, u64>, total: u64) -> Vec<RegionCount> {
    let mut regions: Vec<RegionCount> = counts
        .iter()
        .map(|(region, &count)| RegionCount {
            region: region.clone(),
            count,
            percentage: percentage(count, total),
        })
        .collect();
    regions.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.region.cmp(&b.region)));
    regions
}

/// Maps a contact to one of the configured category labels.
///
/// Matching is case-insensitive and returns the configured spelling;
/// contacts with any other value are unclassified.
#[must_use]
pub fn classify_category(entity: &Entity, fields: &ContactFields) -> Option<String> {
    let raw = entity.text(&fields.category_field)?;
    fields
        .categories
        .iter()
        .find(|label| label.eq_ignore_ascii_case(raw))
        .cloned()
}

/// Region of a contact, `UNKNOWN_REGION` when missing.
#[must_use]
pub fn region_of(entity: &Entity, fields: &ContactFields) -> String {
    entity
        .text(&fields.region_field)
        .map_or_else(|| UNKNOWN_REGION.to_string(), str::to_string)
}

/// Properties requested for every sampled contact.
#[must_use]
pub fn contact_properties(fields: &ContactFields) -> Vec<&str> {
    vec![
        fields.category_field.as_str(),
        fields.region_field.as_str(),
        fields.created_field.as_str(),
        fields.last_activity_field.as_str(),
        fields.quota_field.as_str(),
    ]
}

/// Result of a bounded sampling run.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    /// Records collected, at most `page_size * max_pages`
    pub records: Vec<Entity>,
    /// Pages successfully fetched
    pub pages_fetched: usize,
    /// True if paging stopped because of a timeout or error
    pub truncated: bool,
}

/// Collects up to `max_pages` pages of `object_type`.
///
/// Each page fetch is bounded by `page_timeout_ms`. A timed-out or failed
/// page ends paging as if there were no more pages; it never fails the call.
pub async fn collect_sample(
    gateway: &dyn CrmGateway,
    object_type: &str,
    properties: &[&str],
    sampling: &SamplingConfig,
) -> Sample {
    let timeout = std::time::Duration::from_millis(sampling.page_timeout_ms);
    let mut sample = Sample::default();
    let mut cursor: Option<String> = None;

    for page_index in 0..sampling.max_pages {
        let query = SearchQuery::new(object_type, sampling.page_size)
            .with_properties(properties)
            .after(cursor.take());

        let outcome = tokio::time::timeout(timeout, gateway.search(&query))
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout {
                    millis: sampling.page_timeout_ms,
                })
            });

        match outcome {
            Err(err) => {
                warn!(
                    "Page {} of {} stopped paging: {}; extrapolating from {} records",
                    page_index,
                    object_type,
                    err,
                    sample.records.len()
                );
                sample.truncated = true;
                break;
            }
            Ok(page) => {
                sample.pages_fetched += 1;
                sample.records.extend(page.results);
                cursor = page.next_cursor;
                if cursor.is_none() {
                    break;
                }
            }
        }
    }

    sample.records.truncate(sampling.sample_cap());
    debug!(
        "Sampled {} {} records over {} pages",
        sample.records.len(),
        object_type,
        sample.pages_fetched
    );
    sample
}

/// Builds a summary from a sample and the exact population count.
#[must_use]
pub fn summarize(
    sample: &[Entity],
    total: u64,
    fields: &ContactFields,
    sampling: &SamplingConfig,
    now: DateTime<Utc>,
) -> ContactSummary {
    let mut by_category: BTreeMap<String, u64> = fields
        .categories
        .iter()
        .map(|label| (label.clone(), 0))
        .collect();
    by_category.extend(extrapolate_by(sample, total, |e| classify_category(e, fields)));

    let by_region = extrapolate_by(sample, total, |e| Some(region_of(e, fields)));

    let recent_cutoff = now - Duration::days(sampling.recent_window_days);
    let recent_count = extrapolate_since(
        sample,
        total,
        |e| e.timestamp(&fields.created_field),
        recent_cutoff,
    );

    let activity_cutoff = now - Duration::days(sampling.inactivity_window_days);
    let is_active = |e: &Entity| {
        e.timestamp(&fields.last_activity_field)
            .is_some_and(|last| last >= activity_cutoff)
    };
    let active_count = extrapolate_matching(sample, total, &is_active);
    let inactive_count = extrapolate_matching(sample, total, |e| !is_active(e));

    ContactSummary {
        total,
        by_category,
        by_region,
        recent_count,
        active_count,
        inactive_count,
        sample_size: sample.len(),
    }
}

/// Counts all contacts, samples them, and extrapolates the summary.
///
/// # Errors
/// Returns `Error::Aggregation` if the population count fails. Sampling
/// failures only shrink the sample.
pub async fn compute_contact_summary(
    gateway: &dyn CrmGateway,
    config: &MetricsConfig,
    now: DateTime<Utc>,
) -> Result<ContactSummary> {
    let object_type = config.objects.contacts.as_str();
    let properties = contact_properties(&config.contacts);

    // A failed count abandons the sample still in flight.
    let (total, sample) = tokio::try_join!(
        async {
            gateway
                .count(object_type, &[])
                .await
                .map_err(|e| Error::aggregation("contact count", e))
        },
        async {
            let sample = collect_sample(gateway, object_type, &properties, &config.sampling).await;
            Ok::<_, Error>(sample)
        },
    )?;

    let summary = summarize(&sample.records, total, &config.contacts, &config.sampling, now);
    info!(
        "Contact summary: {} contacts, sample of {}{}",
        summary.total,
        summary.sample_size,
        if sample.truncated { " (truncated)" } else { "" }
    );
    Ok(summary)
}
