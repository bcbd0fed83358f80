//! Campaign effectiveness analysis.
//!
//! Each campaign is joined against its associated contacts: association ids
//! are listed, contacts are batch-read in chunks, and the contacts are
//! partitioned by category to derive conversion, regional spread and quota
//! figures. Campaigns are analyzed concurrently and independently. A campaign
//! whose analysis fails is reported as a zeroed insight in its input
//! position instead of failing the whole run.

use crate::{
    config::metrics::{CampaignFields, MetricsConfig},
    core::{
        contacts::{
            RegionCount, classify_category, contact_properties, region_distribution, region_of,
        },
        degrade::degrade_to_default,
        percentage, round2,
    },
    entities::{Entity, SearchQuery},
    errors::Result,
    gateway::{CrmGateway, fetch_in_chunks},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Page size used when listing campaigns.
const CAMPAIGN_PAGE_SIZE: usize = 100;
/// Campaign listing stops after this many pages.
const MAX_CAMPAIGN_PAGES: usize = 10;

/// A campaign record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    /// CRM identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Status as stored in the CRM
    pub status: Option<String>,
    /// Start date
    pub start_date: Option<DateTime<Utc>>,
    /// End date
    pub end_date: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Reads a campaign from a CRM record. A missing name falls back to the id.
    #[must_use]
    pub fn from_entity(entity: &Entity, fields: &CampaignFields) -> Self {
        Self {
            id: entity.id.clone(),
            name: entity
                .text(&fields.name_field)
                .map_or_else(|| entity.id.clone(), str::to_string),
            status: entity.text(&fields.status_field).map(str::to_string),
            start_date: entity.timestamp(&fields.start_field),
            end_date: entity.timestamp(&fields.end_field),
        }
    }

    /// True when the status is one of the configured active statuses.
    #[must_use]
    pub fn is_active(&self, fields: &CampaignFields) -> bool {
        self.status.as_deref().is_some_and(|status| {
            fields
                .active_statuses
                .iter()
                .any(|active| active.eq_ignore_ascii_case(status))
        })
    }
}

fn campaign_properties(fields: &CampaignFields) -> Vec<&str> {
    vec![
        fields.name_field.as_str(),
        fields.status_field.as_str(),
        fields.start_field.as_str(),
        fields.end_field.as_str(),
    ]
}

/// Lists campaigns, following pagination up to a fixed page cap.
///
/// # Errors
/// Propagates the gateway error of any page.
pub async fn fetch_campaigns(gateway: &dyn CrmGateway, config: &MetricsConfig) -> Result<Vec<Campaign>> {
    let fields = &config.campaigns;
    let properties = campaign_properties(fields);
    let mut campaigns = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_CAMPAIGN_PAGES {
        let query = SearchQuery::new(&config.objects.campaigns, CAMPAIGN_PAGE_SIZE)
            .with_properties(&properties)
            .after(cursor.take());
        let page = gateway.search(&query).await?;
        campaigns.extend(page.results.iter().map(|e| Campaign::from_entity(e, fields)));
        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
    }
    debug!("Fetched {} campaigns", campaigns.len());
    Ok(campaigns)
}

/// Number of affiliates sharing one exact quota value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaValueCount {
    /// Quota value
    pub quota: f64,
    /// Affiliates paying exactly this quota
    pub count: u64,
}

/// Quota figures over a campaign's affiliates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaAnalysis {
    /// Mean quota of affiliates with a quota set
    pub average_quota: f64,
    /// Sum of those quotas
    pub total_revenue: f64,
    /// Affiliates per exact quota value, ascending by value
    pub distribution: Vec<QuotaValueCount>,
}

/// Groups quota values by exact value and totals them.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn analyze_quotas(quotas: &[f64]) -> QuotaAnalysis {
    if quotas.is_empty() {
        return QuotaAnalysis::default();
    }
    let total: f64 = quotas.iter().sum();

    let mut sorted = quotas.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut distribution: Vec<QuotaValueCount> = Vec::new();
    for quota in sorted {
        match distribution.last_mut() {
            Some(last) if last.quota.total_cmp(&quota).is_eq() => last.count += 1,
            _ => distribution.push(QuotaValueCount { quota, count: 1 }),
        }
    }

    QuotaAnalysis {
        average_quota: round2(total / quotas.len() as f64),
        total_revenue: round2(total),
        distribution,
    }
}

/// Derived effectiveness figures for one campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignInsight {
    /// Campaign id
    pub id: String,
    /// Campaign name
    pub name: String,
    /// Number of associated contacts
    pub total_contacts: u64,
    /// Associated contacts per configured category
    pub category_counts: BTreeMap<String, u64>,
    /// Affiliates over total contacts, 0-100
    pub conversion_rate: f64,
    /// Contacts per region, largest first
    pub region_distribution: Vec<RegionCount>,
    /// Quota figures over the affiliate subset
    pub quota_analysis: QuotaAnalysis,
    /// Campaign status
    pub status: Option<String>,
    /// Start date
    pub start_date: Option<DateTime<Utc>>,
    /// End date
    pub end_date: Option<DateTime<Utc>>,
    /// True when the figures are zeroed because the analysis failed
    pub analysis_failed: bool,
}

impl CampaignInsight {
    /// An insight with zero figures, flagged as failed.
    #[must_use]
    pub fn failed(campaign: &Campaign) -> Self {
        Self {
            id: campaign.id.clone(),
            name: campaign.name.clone(),
            total_contacts: 0,
            category_counts: BTreeMap::new(),
            conversion_rate: 0.0,
            region_distribution: Vec::new(),
            quota_analysis: QuotaAnalysis::default(),
            status: campaign.status.clone(),
            start_date: campaign.start_date,
            end_date: campaign.end_date,
            analysis_failed: true,
        }
    }

    /// Count for a category label, 0 if absent.
    #[must_use]
    pub fn category(&self, label: &str) -> u64 {
        self.category_counts.get(label).copied().unwrap_or(0)
    }
}

/// Builds the insight for a campaign from its associated contacts.
#[must_use]
pub fn build_insight(campaign: &Campaign, contacts: &[Entity], config: &MetricsConfig) -> CampaignInsight {
    let fields = &config.contacts;
    let total = contacts.len() as u64;

    let mut category_counts: BTreeMap<String, u64> = fields
        .categories
        .iter()
        .map(|label| (label.clone(), 0))
        .collect();
    let mut region_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut affiliate_quotas = Vec::new();

    for contact in contacts {
        *region_counts.entry(region_of(contact, fields)).or_insert(0) += 1;
        let Some(category) = classify_category(contact, fields) else {
            continue;
        };
        if category == fields.affiliate_label {
            if let Some(quota) = contact.number(&fields.quota_field) {
                affiliate_quotas.push(quota);
            }
        }
        *category_counts.entry(category).or_insert(0) += 1;
    }

    let affiliates = category_counts
        .get(&fields.affiliate_label)
        .copied()
        .unwrap_or(0);

    CampaignInsight {
        id: campaign.id.clone(),
        name: campaign.name.clone(),
        total_contacts: total,
        conversion_rate: percentage(affiliates, total),
        region_distribution: region_distribution(&region_counts, total),
        quota_analysis: analyze_quotas(&affiliate_quotas),
        category_counts,
        status: campaign.status.clone(),
        start_date: campaign.start_date,
        end_date: campaign.end_date,
        analysis_failed: false,
    }
}

/// Fetches a campaign's contacts and builds its insight.
async fn analyze_one(
    gateway: &dyn CrmGateway,
    config: &MetricsConfig,
    campaign: &Campaign,
) -> Result<CampaignInsight> {
    let mut seen = HashSet::new();
    let ids: Vec<String> = gateway
        .associated_ids(
            &config.objects.campaigns,
            &campaign.id,
            &config.campaigns.association_type,
        )
        .await?
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();

    let properties: Vec<String> = contact_properties(&config.contacts)
        .into_iter()
        .map(str::to_string)
        .collect();
    let contacts = fetch_in_chunks(
        gateway,
        &config.objects.contacts,
        &ids,
        &properties,
        config.campaigns.batch_size,
    )
    .await?;

    debug!(
        "Campaign {} has {} associated contacts ({} fetched)",
        campaign.id,
        ids.len(),
        contacts.len()
    );
    Ok(build_insight(campaign, &contacts, config))
}

/// Runs campaign analyses against a shared gateway.
#[derive(Clone)]
pub struct CampaignAnalyzer {
    gateway: Arc<dyn CrmGateway>,
    config: Arc<MetricsConfig>,
}

impl CampaignAnalyzer {
    /// Creates an analyzer.
    #[must_use]
    pub fn new(gateway: Arc<dyn CrmGateway>, config: Arc<MetricsConfig>) -> Self {
        Self { gateway, config }
    }

    /// Lists every campaign and analyzes each one.
    ///
    /// A failing campaign listing yields an empty result.
    #[instrument(skip(self))]
    pub async fn analyze_all(&self) -> Vec<CampaignInsight> {
        let campaigns =
            degrade_to_default("campaigns", fetch_campaigns(self.gateway.as_ref(), &self.config))
                .await;
        self.analyze_campaigns(campaigns).await
    }

    /// Analyzes `campaigns` concurrently. Output order matches input order.
    pub async fn analyze_campaigns(&self, campaigns: Vec<Campaign>) -> Vec<CampaignInsight> {
        let mut insights: Vec<CampaignInsight> =
            campaigns.iter().map(CampaignInsight::failed).collect();

        let mut tasks = JoinSet::new();
        for (index, campaign) in campaigns.into_iter().enumerate() {
            let gateway = Arc::clone(&self.gateway);
            let config = Arc::clone(&self.config);
            tasks.spawn(async move {
                let result = analyze_one(gateway.as_ref(), &config, &campaign).await;
                (index, campaign.id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(insight))) => insights[index] = insight,
                Ok((_, id, Err(err))) => {
                    warn!("Analysis of campaign {id} failed, reporting zeroed insight: {err}");
                }
                Err(join_err) => {
                    error!("Campaign analysis task aborted: {join_err}");
                }
            }
        }

        let failed = insights.iter().filter(|i| i.analysis_failed).count();
        info!(
            "Analyzed {} campaigns ({} failed)",
            insights.len(),
            failed
        );
        insights
    }

    /// Fetches and analyzes a single campaign by id.
    ///
    /// # Errors
    /// Propagates gateway errors; unlike the bulk analysis nothing is degraded.
    #[instrument(skip(self))]
    pub async fn analyze_campaign(&self, id: &str) -> Result<Option<CampaignInsight>> {
        let properties: Vec<String> = campaign_properties(&self.config.campaigns)
            .into_iter()
            .map(str::to_string)
            .collect();
        let Some(entity) = self
            .gateway
            .get_by_id(&self.config.objects.campaigns, id, &properties)
            .await?
        else {
            return Ok(None);
        };
        let campaign = Campaign::from_entity(&entity, &self.config.campaigns);
        analyze_one(self.gateway.as_ref(), &self.config, &campaign)
            .await
            .map(Some)
    }
}
