//! Dynamic sizing and tie-break ordering for the Stage 2 candidate set.

use crate::Candidate;
use std::cmp::Ordering;
use tracing::info;

/// Order candidates by the spec's four-level tie-break: higher score
/// first, then higher max elevation, then lower mean range, then lower
/// satellite id.
fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.suitability
        .total
        .partial_cmp(&a.suitability.total)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.max_elevation_deg
                .partial_cmp(&a.max_elevation_deg)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| {
            a.mean_range_km
                .partial_cmp(&b.mean_range_km)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.satellite_id.cmp(&b.satellite_id))
}

fn median_score(candidates: &[Candidate]) -> f64 {
    let mut scores: Vec<f64> = candidates.iter().map(|c| c.suitability.total).collect();
    scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = scores.len() / 2;
    if scores.len() % 2 == 0 {
        (scores[mid - 1] + scores[mid]) / 2.0
    } else {
        scores[mid]
    }
}

/// Apply dynamic sizing: the number retained is the count of candidates
/// scoring at or above `median + guard_margin`, clamped to
/// `[min_pool_size, max_pool_size]`. Returns the retained set (sorted by
/// the tie-break rule), the median score, and the score threshold used.
pub fn select_candidates(
    mut candidates: Vec<Candidate>,
    min_pool_size: usize,
    max_pool_size: usize,
    guard_margin: f64,
) -> (Vec<Candidate>, f64, f64) {
    candidates.sort_by(compare_candidates);

    let median = median_score(&candidates);
    let threshold = median + guard_margin;

    let above_threshold = candidates
        .iter()
        .filter(|c| c.suitability.total >= threshold)
        .count();

    let target_count = above_threshold.clamp(min_pool_size.min(candidates.len()), max_pool_size.min(candidates.len()));

    info!(
        "Dynamic sizing: {} above threshold {:.1}, target count {} (bounds [{}, {}])",
        above_threshold, threshold, target_count, min_pool_size, max_pool_size
    );

    candidates.truncate(target_count);
    (candidates, median, threshold)
}
