//! Sampling extrapolation.
//!
//! Scales counts observed in a bounded sample up to a known population size:
//! `round(count_in_sample / sample_len * population)`. Each category is
//! rounded on its own, so extrapolated counts from different classifier
//! passes over the same sample need not add up to the same total. That drift
//! is at most half a unit per category and is an accepted approximation.

use crate::entities::Entity;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Scales `count_in_sample` out of `sample_len` to `population`.
///
/// Returns 0 for an empty sample or an empty population. Rounds half up.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn extrapolate(count_in_sample: usize, sample_len: usize, population: u64) -> u64 {
    if sample_len == 0 || population == 0 {
        return 0;
    }
    let ratio = count_in_sample as f64 / sample_len as f64;
    // ratio and population are non-negative, so round() is half-up here
    (ratio * population as f64).round() as u64
}

/// Counts sample entities per label. Entities the classifier rejects are skipped.
pub fn count_by<F>(sample: &[Entity], classify: F) -> BTreeMap<String, usize>
where
    F: Fn(&Entity) -> Option<String>,
{
    let mut counts = BTreeMap::new();
    for entity in sample {
        if let Some(label) = classify(entity) {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    counts
}

/// Extrapolated count per label observed in the sample.
pub fn extrapolate_by<F>(sample: &[Entity], population: u64, classify: F) -> BTreeMap<String, u64>
where
    F: Fn(&Entity) -> Option<String>,
{
    count_by(sample, classify)
        .into_iter()
        .map(|(label, count)| (label, extrapolate(count, sample.len(), population)))
        .collect()
}

/// Extrapolated number of entities matching `predicate`.
pub fn extrapolate_matching<F>(sample: &[Entity], population: u64, predicate: F) -> u64
where
    F: Fn(&Entity) -> bool,
{
    let matching = sample.iter().filter(|entity| predicate(entity)).count();
    extrapolate(matching, sample.len(), population)
}

/// Extrapolated number of entities whose date is at or after `cutoff`.
/// Entities without a date are not counted.
pub fn extrapolate_since<F>(
    sample: &[Entity],
    population: u64,
    date_of: F,
    cutoff: DateTime<Utc>,
) -> u64
where
    F: Fn(&Entity) -> Option<DateTime<Utc>>,
{
    extrapolate_matching(sample, population, |entity| {
        date_of(entity).is_some_and(|date| date >= cutoff)
    })
}
