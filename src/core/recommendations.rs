//! Threshold rules over a dashboard snapshot.
//!
//! Every rule is evaluated; each one that triggers contributes exactly one
//! recommendation. The result is ordered by priority, keeping rule order
//! within the same priority.

use crate::{config::metrics::RecommendationThresholds, core::dashboard::DashboardMetrics};
use serde::Serialize;
use std::fmt;

/// Ordering key for recommendations. `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Needs attention now
    High,
    /// Should be looked at
    Medium,
    /// Informational
    Low,
}

/// What a recommendation signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    /// A metric is in a bad state
    Alert,
    /// A metric is below target
    Warning,
    /// A metric is doing well
    Success,
}

impl RecommendationKind {
    /// Priority this kind sorts at.
    #[must_use]
    pub const fn priority(self) -> Priority {
        match self {
            Self::Alert => Priority::High,
            Self::Warning => Priority::Medium,
            Self::Success => Priority::Low,
        }
    }
}

impl fmt::Display for RecommendationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Alert => "ALERT",
            Self::Warning => "WARNING",
            Self::Success => "OK",
        };
        f.write_str(label)
    }
}

/// One triggered rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Metric the rule looked at
    pub metric: String,
    /// Observed value
    pub current_value: f64,
    /// Threshold the value was compared with
    pub target_value: f64,
    /// Human-readable advice
    pub recommendation: String,
    /// Signal kind
    pub kind: RecommendationKind,
    /// Sort priority
    pub priority: Priority,
}

impl Recommendation {
    fn new(metric: &str, current: f64, target: f64, kind: RecommendationKind, text: &str) -> Self {
        Self {
            metric: metric.to_string(),
            current_value: current,
            target_value: target,
            recommendation: text.to_string(),
            kind,
            priority: kind.priority(),
        }
    }
}

/// Ordered recommendations with their count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecommendationList {
    /// Number of items
    pub count: usize,
    /// Recommendations, high priority first
    pub items: Vec<Recommendation>,
}

/// Evaluates every rule against `metrics`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn generate_recommendations(
    metrics: &DashboardMetrics,
    thresholds: &RecommendationThresholds,
) -> RecommendationList {
    let mut items = Vec::new();

    if metrics.conversion_rate < thresholds.min_conversion_rate {
        items.push(Recommendation::new(
            "conversionRate",
            metrics.conversion_rate,
            thresholds.min_conversion_rate,
            RecommendationKind::Warning,
            "Low conversion from sympathizer to affiliate. Follow up with sympathizers and run targeted affiliation campaigns.",
        ));
    }

    if metrics.monthly_growth_rate < thresholds.min_growth_rate {
        items.push(Recommendation::new(
            "monthlyGrowthRate",
            metrics.monthly_growth_rate,
            thresholds.min_growth_rate,
            RecommendationKind::Warning,
            "Contact growth is slow. Invest in outreach and recruitment of new contacts.",
        ));
    }

    let inactive_limit = metrics.active_contacts as f64 * thresholds.max_inactive_ratio;
    if metrics.inactive_contacts as f64 > inactive_limit {
        items.push(Recommendation::new(
            "inactiveContacts",
            metrics.inactive_contacts as f64,
            inactive_limit,
            RecommendationKind::Alert,
            "Many contacts have had no recent activity. Plan a reactivation campaign.",
        ));
    }

    if metrics.conversion_rate > thresholds.strong_conversion_rate {
        items.push(Recommendation::new(
            "conversionRate",
            metrics.conversion_rate,
            thresholds.strong_conversion_rate,
            RecommendationKind::Success,
            "Conversion is strong. Keep the current engagement strategy.",
        ));
    }

    // sort_by_key is stable
    items.sort_by_key(|item| item.priority);
    RecommendationList {
        count: items.len(),
        items,
    }
}
