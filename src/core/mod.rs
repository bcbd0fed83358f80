//! Core metrics engine - framework-agnostic aggregation, extrapolation and
//! rule evaluation over CRM data.

/// Keyed TTL cache for computed aggregates
pub mod cache;
/// Per-campaign join against associated contacts
pub mod campaigns;
/// Contact sampling and population summary
pub mod contacts;
/// Dashboard metrics aggregation
pub mod dashboard;
/// Degrade-on-failure wrapper for sub-fetches
pub mod degrade;
/// Donation sampling and bracket statistics
pub mod donations;
/// Sample-to-population extrapolation
pub mod extrapolate;
/// Threshold rules producing recommendations
pub mod recommendations;
/// Plain-text rendering of a dashboard run
pub mod report;

/// `part / whole * 100`, or 0 when `whole` is 0. Never negative.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2((part as f64 / whole as f64 * 100.0).max(0.0))
}

/// Rounds to two decimal places.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_percentage_guards_zero_whole() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(10, 0), 0.0);
    }

    #[test]
    fn test_percentage_values() {
        assert_eq!(percentage(300, 1000), 30.0);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(5, 5), 100.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(466.666_666), 466.67);
        assert_eq!(round2(0.004), 0.0);
        assert_eq!(round2(12.0), 12.0);
    }
}
