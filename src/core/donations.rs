//! Donation sampling and quota statistics.
//!
//! Donations are read transiently from a bounded sample and reduced to
//! averages, bracket counts and a rolling monthly income figure. They are
//! never cached individually.

use crate::{
    config::metrics::{DonationFields, MetricsConfig, QuotaBracket},
    core::round2,
    entities::{Entity, Filter, FilterGroup, SearchQuery},
    errors::Result,
    gateway::CrmGateway,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

/// A single donation snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    /// CRM identifier
    pub id: String,
    /// Donated amount, never negative
    pub amount: f64,
    /// When the donation was made
    pub date: Option<DateTime<Utc>>,
    /// Donor contact, if linked
    pub contact_id: Option<String>,
}

impl Donation {
    /// Reads a donation from a CRM record.
    ///
    /// Records without a numeric, non-negative amount are rejected.
    #[must_use]
    pub fn from_entity(entity: &Entity, fields: &DonationFields) -> Option<Self> {
        let amount = entity.number(&fields.amount_field)?;
        if amount < 0.0 {
            return None;
        }
        Some(Self {
            id: entity.id.clone(),
            amount,
            date: entity.timestamp(&fields.date_field),
            contact_id: entity.text(&fields.contact_field).map(str::to_string),
        })
    }
}

/// Number of values in one bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketCount {
    /// Bracket label
    pub label: String,
    /// Number of values in the bracket
    pub count: u64,
}

/// Aggregate statistics over the donation sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationStats {
    /// Number of donations sampled
    pub total_donations: u64,
    /// Sum of sampled amounts
    pub total_amount: f64,
    /// Mean sampled amount, 0 when there are none
    pub average_amount: f64,
    /// Count per quota bracket, in bracket order
    pub brackets: Vec<BracketCount>,
    /// Sum of amounts dated inside the recent window
    pub monthly_income: f64,
}

fn admits(bracket: &QuotaBracket, value: f64) -> bool {
    bracket.max.is_none_or(|max| value <= max)
}

/// First bracket whose inclusive upper bound admits `value`.
#[must_use]
pub fn bracket_for(value: f64, brackets: &[QuotaBracket]) -> Option<&QuotaBracket> {
    brackets.iter().find(|bracket| admits(bracket, value))
}

/// Counts values per bracket. Every bracket appears, even when empty.
pub fn bracket_counts<I>(values: I, brackets: &[QuotaBracket]) -> Vec<BracketCount>
where
    I: IntoIterator<Item = f64>,
{
    let mut counts: Vec<BracketCount> = brackets
        .iter()
        .map(|bracket| BracketCount {
            label: bracket.label.clone(),
            count: 0,
        })
        .collect();
    for value in values {
        if let Some(index) = brackets.iter().position(|bracket| admits(bracket, value)) {
            counts[index].count += 1;
        }
    }
    counts
}

/// Reduces a donation sample to statistics.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize_donations(
    donations: &[Donation],
    brackets: &[QuotaBracket],
    now: DateTime<Utc>,
    window_days: i64,
) -> DonationStats {
    let total_amount: f64 = donations.iter().map(|d| d.amount).sum();
    let average_amount = if donations.is_empty() {
        0.0
    } else {
        total_amount / donations.len() as f64
    };

    let cutoff = now - Duration::days(window_days);
    let monthly_income: f64 = donations
        .iter()
        .filter(|d| d.date.is_some_and(|date| date >= cutoff && date <= now))
        .map(|d| d.amount)
        .sum();

    DonationStats {
        total_donations: donations.len() as u64,
        total_amount: round2(total_amount),
        average_amount: round2(average_amount),
        brackets: bracket_counts(donations.iter().map(|d| d.amount), brackets),
        monthly_income: round2(monthly_income),
    }
}

/// Fetches one page of donations with an amount set.
///
/// # Errors
/// Propagates the gateway error; callers decide whether to degrade.
pub async fn fetch_donations(gateway: &dyn CrmGateway, config: &MetricsConfig) -> Result<Vec<Donation>> {
    let fields = &config.donations;
    let query = SearchQuery::new(&config.objects.donations, fields.sample_size)
        .with_properties(&[
            fields.amount_field.as_str(),
            fields.date_field.as_str(),
            fields.contact_field.as_str(),
        ])
        .with_filter_group(FilterGroup::single(Filter::has_property(&fields.amount_field)));

    let page = gateway.search(&query).await?;
    let donations: Vec<Donation> = page
        .results
        .iter()
        .filter_map(|entity| Donation::from_entity(entity, fields))
        .take(fields.sample_size)
        .collect();
    debug!(
        "Fetched {} donations ({} records on page)",
        donations.len(),
        page.results.len()
    );
    Ok(donations)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::config::metrics::QuotaConfig;
    use crate::test_utils::{FailureMode, FakeCrm, FakeOp, donation};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn plain(amount: f64) -> Donation {
        Donation {
            id: format!("d{amount}"),
            amount,
            date: None,
            contact_id: None,
        }
    }

    fn counts_of(stats: &DonationStats) -> Vec<(String, u64)> {
        stats
            .brackets
            .iter()
            .map(|b| (b.label.clone(), b.count))
            .collect()
    }

    #[test]
    fn test_brackets_and_average() {
        let brackets = QuotaConfig::default().brackets;
        let donations = vec![plain(50.0), plain(150.0), plain(1200.0)];

        let stats = summarize_donations(&donations, &brackets, now(), 30);

        assert_eq!(
            counts_of(&stats),
            vec![
                ("0-100".to_string(), 1),
                ("101-500".to_string(), 1),
                ("501-1000".to_string(), 0),
                ("1000+".to_string(), 1),
            ]
        );
        assert_eq!(stats.average_amount, 466.67);
        assert_eq!(stats.total_amount, 1400.0);
        assert_eq!(stats.total_donations, 3);
    }

    #[test]
    fn test_bracket_boundaries_are_inclusive() {
        let brackets = QuotaConfig::default().brackets;
        assert_eq!(bracket_for(100.0, &brackets).unwrap().label, "0-100");
        assert_eq!(bracket_for(100.5, &brackets).unwrap().label, "101-500");
        assert_eq!(bracket_for(1000.0, &brackets).unwrap().label, "501-1000");
        assert_eq!(bracket_for(1000.01, &brackets).unwrap().label, "1000+");
        assert_eq!(bracket_for(0.0, &brackets).unwrap().label, "0-100");
    }

    #[test]
    fn test_empty_sample_has_zeroes() {
        let brackets = QuotaConfig::default().brackets;
        let stats = summarize_donations(&[], &brackets, now(), 30);
        assert_eq!(stats.total_donations, 0);
        assert_eq!(stats.average_amount, 0.0);
        assert_eq!(stats.monthly_income, 0.0);
        assert_eq!(stats.brackets.len(), 4);
        assert!(stats.brackets.iter().all(|b| b.count == 0));
    }

    #[test]
    fn test_monthly_income_uses_window() {
        let brackets = QuotaConfig::default().brackets;
        let donations = vec![
            Donation {
                date: Some(now() - Duration::days(2)),
                ..plain(40.0)
            },
            Donation {
                date: Some(now() - Duration::days(29)),
                ..plain(60.0)
            },
            Donation {
                date: Some(now() - Duration::days(31)),
                ..plain(500.0)
            },
            plain(1000.0),
        ];
        let stats = summarize_donations(&donations, &brackets, now(), 30);
        assert_eq!(stats.monthly_income, 100.0);
    }

    #[test]
    fn test_from_entity_rejects_bad_amounts() {
        let fields = DonationFields::default();
        let ok = Entity::new("1")
            .with_property("amount", "25.50")
            .with_property("donation_date", "2024-06-01")
            .with_property("contact_id", "c9");
        let donation = Donation::from_entity(&ok, &fields).unwrap();
        assert_eq!(donation.amount, 25.5);
        assert_eq!(donation.contact_id.as_deref(), Some("c9"));
        assert!(donation.date.is_some());

        let negative = Entity::new("2").with_property("amount", -5.0);
        assert!(Donation::from_entity(&negative, &fields).is_none());
        let missing = Entity::new("3");
        assert!(Donation::from_entity(&missing, &fields).is_none());
    }

    #[tokio::test]
    async fn test_fetch_donations_skips_records_without_amount() -> Result<()> {
        let crm = FakeCrm::new();
        crm.add_records(
            "donations",
            vec![
                donation("d1", 10.0, "2024-06-01"),
                Entity::new("d2"),
                donation("d3", 30.0, "2024-06-02"),
            ],
        )
        .await;

        let donations = fetch_donations(&crm, &MetricsConfig::default()).await?;

        let ids: Vec<&str> = donations.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d3"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_donations_propagates_errors() {
        let crm = FakeCrm::new();
        crm.fail(FakeOp::Search, "donations", FailureMode::Authorization)
            .await;
        let result = fetch_donations(&crm, &MetricsConfig::default()).await;
        assert!(result.unwrap_err().is_authorization());
    }
}
