//! Dashboard metrics aggregation.
//!
//! One call produces one [`DashboardMetrics`] snapshot. The contact summary
//! is served from the cache when fresh; donations and campaigns are fetched
//! on every call and degrade to empty when their fetch fails. Only a failure
//! of the contact population count aborts the snapshot.

use crate::{
    config::MetricsConfig,
    core::{
        cache::MetricsCache,
        campaigns::{Campaign, fetch_campaigns},
        contacts::{ContactSummary, RegionCount, compute_contact_summary, region_distribution},
        degrade::degrade_to_default,
        donations::{DonationStats, fetch_donations, summarize_donations},
        percentage,
    },
    errors::Result,
    gateway::CrmGateway,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Full derived snapshot shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    /// Exact number of contacts
    pub total_contacts: u64,
    /// Extrapolated contacts per category
    pub category_totals: BTreeMap<String, u64>,
    /// Extrapolated affiliates
    pub affiliates: u64,
    /// Affiliates over total contacts, 0-100
    pub conversion_rate: f64,
    /// Extrapolated contacts created inside the recent window
    pub recent_contacts: u64,
    /// Recent contacts over total contacts, 0-100
    pub monthly_growth_rate: f64,
    /// Extrapolated contacts with recent activity
    pub active_contacts: u64,
    /// Extrapolated contacts without recent activity
    pub inactive_contacts: u64,
    /// Contacts per region, largest first
    pub region_distribution: Vec<RegionCount>,
    /// Donation sample statistics
    pub donations: DonationStats,
    /// Campaigns whose status counts as active
    pub active_campaigns: u64,
    /// Campaigns listed
    pub total_campaigns: u64,
    /// When the snapshot was built
    pub generated_at: DateTime<Utc>,
}

/// Merges the three sub-results into a snapshot.
#[must_use]
pub fn build_metrics(
    summary: &ContactSummary,
    donations: DonationStats,
    campaigns: &[Campaign],
    config: &MetricsConfig,
    now: DateTime<Utc>,
) -> DashboardMetrics {
    let affiliates = summary.category(&config.contacts.affiliate_label);
    let active_campaigns = campaigns
        .iter()
        .filter(|c| c.is_active(&config.campaigns))
        .count() as u64;

    DashboardMetrics {
        total_contacts: summary.total,
        category_totals: summary.by_category.clone(),
        affiliates,
        conversion_rate: percentage(affiliates, summary.total),
        recent_contacts: summary.recent_count,
        monthly_growth_rate: percentage(summary.recent_count, summary.total),
        active_contacts: summary.active_count,
        inactive_contacts: summary.inactive_count,
        region_distribution: region_distribution(&summary.by_region, summary.total),
        donations,
        active_campaigns,
        total_campaigns: campaigns.len() as u64,
        generated_at: now,
    }
}

/// Builds dashboard snapshots, caching the contact summary.
#[derive(Clone)]
pub struct MetricsService {
    gateway: Arc<dyn CrmGateway>,
    config: Arc<MetricsConfig>,
    cache: Arc<MetricsCache<ContactSummary>>,
}

impl MetricsService {
    /// Creates a service with its own cache using the configured TTL.
    #[must_use]
    pub fn new(gateway: Arc<dyn CrmGateway>, config: Arc<MetricsConfig>) -> Self {
        let cache = Arc::new(MetricsCache::new(config.cache.ttl_ms));
        Self::with_cache(gateway, config, cache)
    }

    /// Creates a service sharing an existing cache.
    #[must_use]
    pub fn with_cache(
        gateway: Arc<dyn CrmGateway>,
        config: Arc<MetricsConfig>,
        cache: Arc<MetricsCache<ContactSummary>>,
    ) -> Self {
        Self {
            gateway,
            config,
            cache,
        }
    }

    /// The shared configuration.
    #[must_use]
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    fn summary_key(&self) -> String {
        format!("contact-summary:{}", self.config.objects.contacts)
    }

    /// Returns the cached contact summary or computes and stores a new one.
    ///
    /// # Errors
    /// Returns `Error::Aggregation` when the contact count fails.
    pub async fn contact_summary(&self, now: DateTime<Utc>) -> Result<ContactSummary> {
        let key = self.summary_key();
        if let Some(summary) = self.cache.get_at(&key, now).await {
            debug!("Contact summary served from cache");
            return Ok(summary);
        }
        let summary = compute_contact_summary(self.gateway.as_ref(), &self.config, now).await?;
        self.cache.set_at(&key, summary.clone(), now).await;
        Ok(summary)
    }

    /// Drops the cached contact summary so the next call recomputes it.
    pub async fn invalidate_summary(&self) -> bool {
        self.cache.invalidate(&self.summary_key()).await
    }

    /// Builds a fresh snapshot as of now.
    ///
    /// # Errors
    /// See [`MetricsService::get_dashboard_metrics_at`].
    pub async fn get_dashboard_metrics(&self) -> Result<DashboardMetrics> {
        self.get_dashboard_metrics_at(Utc::now()).await
    }

    /// Builds a snapshot as of `now`.
    ///
    /// # Errors
    /// Returns `Error::Aggregation` when the contact population count fails.
    /// Donation and campaign failures are logged and degrade to empty.
    #[instrument(skip(self))]
    pub async fn get_dashboard_metrics_at(&self, now: DateTime<Utc>) -> Result<DashboardMetrics> {
        let gateway = self.gateway.as_ref();
        let config = self.config.as_ref();

        let (summary, donations, campaigns) = tokio::join!(
            self.contact_summary(now),
            degrade_to_default("donations", fetch_donations(gateway, config)),
            degrade_to_default("campaigns", fetch_campaigns(gateway, config)),
        );
        let summary = summary?;

        let stats = summarize_donations(
            &donations,
            &config.quota.brackets,
            now,
            config.sampling.recent_window_days,
        );
        let metrics = build_metrics(&summary, stats, &campaigns, config, now);
        info!(
            "Dashboard built: {} contacts, conversion {:.2}%, {} donations, {}/{} campaigns active",
            metrics.total_contacts,
            metrics.conversion_rate,
            metrics.donations.total_donations,
            metrics.active_campaigns,
            metrics.total_campaigns
        );
        Ok(metrics)
    }
}
