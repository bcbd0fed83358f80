//! Plain-text rendering of a dashboard run.
//!
//! Formats a snapshot, campaign insights and recommendations into a report
//! suitable for a terminal or a log file. All functions are pure.

use crate::core::{
    campaigns::CampaignInsight, dashboard::DashboardMetrics,
    recommendations::RecommendationList,
};
use std::fmt::Write;

/// Number of regions listed in the report.
const TOP_REGIONS: usize = 5;

/// Generates a progress bar string for visual representation.
///
/// Creates a text-based bar like: `[████████░░] 80.0%`
///
/// # Arguments
/// * `percent` - Value between 0 and 100; out-of-range values are clamped in the bar
/// * `bar_length` - Length of the bar in characters (default 10)
#[must_use]
pub fn format_progress_bar(percent: f64, bar_length: Option<usize>) -> String {
    let length = bar_length.unwrap_or(10);
    let clamped = percent.clamp(0.0, 100.0);

    // clamped is in [0, 100] so the product is in [0, length]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = ((clamped / 100.0) * length as f64).round() as usize;
    let empty = length.saturating_sub(filled);

    format!("[{}{}] {percent:.1}%", "█".repeat(filled), "░".repeat(empty))
}

/// Formats an amount as currency, e.g. `$1,234.50`.
#[must_use]
pub fn format_currency(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{sign}${grouped}.{cents}")
}

/// One line per campaign: name, contacts, conversion bar.
#[must_use]
pub fn format_campaign_line(insight: &CampaignInsight) -> String {
    if insight.analysis_failed {
        return format!("{} | analysis unavailable", insight.name);
    }
    format!(
        "{} | {} contacts | {} | quota avg {}",
        insight.name,
        insight.total_contacts,
        format_progress_bar(insight.conversion_rate, None),
        format_currency(insight.quota_analysis.average_quota)
    )
}

/// Renders the full report.
#[must_use]
pub fn render_dashboard(
    metrics: &DashboardMetrics,
    insights: &[CampaignInsight],
    recommendations: &RecommendationList,
) -> String {
    let mut out = String::new();
    // writing to a String never fails
    let _ = writeln!(out, "CRM dashboard ({})", metrics.generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(out);
    let _ = writeln!(out, "Contacts: {}", metrics.total_contacts);
    for (category, count) in &metrics.category_totals {
        let _ = writeln!(out, "  {category}: {count}");
    }
    let _ = writeln!(
        out,
        "Conversion: {}",
        format_progress_bar(metrics.conversion_rate, None)
    );
    let _ = writeln!(
        out,
        "Monthly growth: {:.2}% ({} new)",
        metrics.monthly_growth_rate, metrics.recent_contacts
    );
    let _ = writeln!(
        out,
        "Activity: {} active, {} inactive",
        metrics.active_contacts, metrics.inactive_contacts
    );

    if !metrics.region_distribution.is_empty() {
        let _ = writeln!(out, "Top regions:");
        for region in metrics.region_distribution.iter().take(TOP_REGIONS) {
            let _ = writeln!(
                out,
                "  {}: {} ({:.1}%)",
                region.region, region.count, region.percentage
            );
        }
    }

    let donations = &metrics.donations;
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Donations sampled: {} (avg {}, last 30 days {})",
        donations.total_donations,
        format_currency(donations.average_amount),
        format_currency(donations.monthly_income)
    );
    for bracket in &donations.brackets {
        let _ = writeln!(out, "  {}: {}", bracket.label, bracket.count);
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Campaigns: {} active of {}",
        metrics.active_campaigns, metrics.total_campaigns
    );
    for insight in insights {
        let _ = writeln!(out, "  {}", format_campaign_line(insight));
    }

    let _ = writeln!(out);
    if recommendations.items.is_empty() {
        let _ = writeln!(out, "No recommendations.");
    } else {
        let _ = writeln!(out, "Recommendations ({}):", recommendations.count);
        for item in &recommendations.items {
            let _ = writeln!(out, "  [{}] {}", item.kind, item.recommendation);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{
        campaigns::{Campaign, QuotaAnalysis},
        contacts::RegionCount,
        donations::{BracketCount, DonationStats},
        recommendations::{Recommendation, RecommendationKind},
    };
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn metrics() -> DashboardMetrics {
        DashboardMetrics {
            total_contacts: 1000,
            category_totals: BTreeMap::from([
                ("Affiliate".to_string(), 300),
                ("Sympathizer".to_string(), 700),
            ]),
            affiliates: 300,
            conversion_rate: 30.0,
            recent_contacts: 100,
            monthly_growth_rate: 10.0,
            active_contacts: 100,
            inactive_contacts: 900,
            region_distribution: vec![RegionCount {
                region: "North".to_string(),
                count: 600,
                percentage: 60.0,
            }],
            donations: DonationStats {
                total_donations: 3,
                total_amount: 1400.0,
                average_amount: 466.67,
                brackets: vec![BracketCount {
                    label: "0-100".to_string(),
                    count: 1,
                }],
                monthly_income: 1250.0,
            },
            active_campaigns: 1,
            total_campaigns: 2,
            generated_at: Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_format_progress_bar_full() {
        assert_eq!(format_progress_bar(100.0, Some(10)), "[██████████] 100.0%");
    }

    #[test]
    fn test_format_progress_bar_partial() {
        assert_eq!(format_progress_bar(30.0, Some(10)), "[███░░░░░░░] 30.0%");
        assert_eq!(format_progress_bar(0.0, Some(4)), "[░░░░] 0.0%");
    }

    #[test]
    fn test_format_progress_bar_clamps() {
        assert_eq!(format_progress_bar(150.0, Some(5)), "[█████] 150.0%");
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(466.666), "$466.67");
        assert_eq!(format_currency(1234.5), "$1,234.50");
        assert_eq!(format_currency(1_000_000.0), "$1,000,000.00");
        assert_eq!(format_currency(-25.5), "-$25.50");
    }

    #[test]
    fn test_failed_campaign_line() {
        let campaign = Campaign {
            id: "c1".to_string(),
            name: "Broken".to_string(),
            status: None,
            start_date: None,
            end_date: None,
        };
        let insight = CampaignInsight::failed(&campaign);
        assert_eq!(format_campaign_line(&insight), "Broken | analysis unavailable");
    }

    #[test]
    fn test_campaign_line() {
        let campaign = Campaign {
            id: "c2".to_string(),
            name: "Spring".to_string(),
            status: None,
            start_date: None,
            end_date: None,
        };
        let insight = CampaignInsight {
            total_contacts: 4,
            conversion_rate: 50.0,
            quota_analysis: QuotaAnalysis {
                average_quota: 12.5,
                ..QuotaAnalysis::default()
            },
            analysis_failed: false,
            ..CampaignInsight::failed(&campaign)
        };
        assert_eq!(
            format_campaign_line(&insight),
            "Spring | 4 contacts | [█████░░░░░] 50.0% | quota avg $12.50"
        );
    }

    #[test]
    fn test_render_dashboard_sections() {
        let recommendations = RecommendationList {
            count: 1,
            items: vec![Recommendation {
                metric: "inactiveContacts".to_string(),
                current_value: 900.0,
                target_value: 30.0,
                recommendation: "Plan a reactivation campaign.".to_string(),
                kind: RecommendationKind::Alert,
                priority: RecommendationKind::Alert.priority(),
            }],
        };

        let report = render_dashboard(&metrics(), &[], &recommendations);

        assert!(report.starts_with("CRM dashboard (2024-06-30 12:00 UTC)"));
        assert!(report.contains("Contacts: 1000"));
        assert!(report.contains("  Affiliate: 300"));
        assert!(report.contains("Conversion: [███░░░░░░░] 30.0%"));
        assert!(report.contains("  North: 600 (60.0%)"));
        assert!(report.contains("avg $466.67, last 30 days $1,250.00"));
        assert!(report.contains("Campaigns: 1 active of 2"));
        assert!(report.contains("  [ALERT] Plan a reactivation campaign."));
    }

    #[test]
    fn test_render_without_recommendations() {
        let report = render_dashboard(&metrics(), &[], &RecommendationList::default());
        assert!(report.contains("No recommendations."));
    }
}
