//! Geographic & Suitability Filter — Stage 2
//!
//! Reduces a propagated catalogue to a handover-relevant candidate set,
//! independently per constellation: first a cheap geographic-relevance
//! pass (ever visible above the minimum elevation threshold), then a
//! 5-factor weighted suitability score, then dynamic sizing of the
//! retained set against the constellation's median score.

use pipeline_config::{Config, ElevationThresholds, SuitabilityWeights};
use orbital_propagator::SatelliteTrack;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tle_loader::Constellation;
use tracing::info;

pub mod scorer;
pub mod selector;

pub use scorer::score_suitability;
pub use selector::select_candidates;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("no candidates survived geographic relevance filtering for {0:?}")]
    FilterEmpty(Constellation),
}

pub type Result<T> = std::result::Result<T, FilterError>;

/// The five independently weighted suitability factors (spec's data
/// model lists `constellation` as its own factor alongside the raw
/// `inclination`/`altitude` ones; here it is the joint fit of both to
/// the constellation's nominal orbit, distinct from each univariate term).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SuitabilityFactors {
    pub inclination_score: f64,
    pub altitude_score: f64,
    pub eccentricity_score: f64,
    pub pass_frequency_score: f64,
    pub constellation_fit_score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SuitabilityScore {
    pub total: f64,
    pub factors: SuitabilityFactors,
}

/// One satellite as it exits Stage 2: its score, and the summary fields
/// the tie-break rule and Stage 6 greedy selection need without having
/// to re-walk the full track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub satellite_id: u32,
    pub name: String,
    pub constellation: Constellation,
    pub suitability: SuitabilityScore,
    pub max_elevation_deg: f64,
    pub mean_range_km: f64,
    pub visible_sample_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterReport {
    pub constellation: Constellation,
    pub catalogue_size: usize,
    pub geographically_relevant: usize,
    pub retained: usize,
    pub median_score: f64,
    pub score_threshold: f64,
}

/// Margin added on top of the median score before the dynamic-sizing cut
/// (spec §4.4: "median plus a guard margin"). Expressed in score points,
/// since `SuitabilityScore::total` lives in `[0, 100]`.
const GUARD_MARGIN: f64 = 5.0;

/// Run geographic relevance + suitability scoring + dynamic sizing for
/// one constellation's propagated tracks.
pub fn filter_constellation(
    tracks: &[SatelliteTrack],
    constellation: Constellation,
    config: &Config,
) -> Result<(Vec<Candidate>, FilterReport)> {
    let catalogue_size = tracks.len();
    let relevant = geographic_relevance(tracks, &config.elevation_thresholds);
    let geographically_relevant = relevant.len();

    if relevant.is_empty() {
        return Err(FilterError::FilterEmpty(constellation));
    }

    let profile = match constellation {
        Constellation::Starlink => config.orbit_profiles.starlink,
        Constellation::OneWeb => config.orbit_profiles.oneweb,
    };

    let mut candidates: Vec<Candidate> = relevant
        .into_iter()
        .map(|track| {
            let suitability =
                score_suitability(track, &profile, &config.suitability_weights);
            summarize(track, suitability)
        })
        .collect();

    let (selected, median_score, score_threshold) =
        select_candidates(candidates.clone(), config.min_pool_size, config.max_pool_size, GUARD_MARGIN);
    candidates = selected;

    let report = FilterReport {
        constellation,
        catalogue_size,
        geographically_relevant,
        retained: candidates.len(),
        median_score,
        score_threshold,
    };

    info!(
        "{:?}: {} in catalogue, {} geographically relevant, {} retained (median {:.1}, threshold {:.1})",
        constellation, catalogue_size, geographically_relevant, report.retained, median_score, score_threshold
    );

    Ok((candidates, report))
}

/// Retain a track iff at least one sample has elevation above the
/// minimum threshold, and it is visible for at least 3 samples — a
/// satellite only visible at the window boundary is not usable.
fn geographic_relevance<'a>(
    tracks: &'a [SatelliteTrack],
    thresholds: &ElevationThresholds,
) -> Vec<&'a SatelliteTrack> {
    tracks
        .iter()
        .filter(|track| {
            let visible_count = track
                .samples
                .iter()
                .filter(|s| s.look.elevation_deg >= thresholds.minimum_deg)
                .count();
            visible_count >= 3
        })
        .collect()
}

fn summarize(track: &SatelliteTrack, suitability: SuitabilityScore) -> Candidate {
    let max_elevation_deg = track
        .samples
        .iter()
        .map(|s| s.look.elevation_deg)
        .fold(f64::MIN, f64::max);

    let mean_range_km = track.samples.iter().map(|s| s.look.range_km).sum::<f64>()
        / track.samples.len() as f64;

    let visible_sample_count = track
        .samples
        .iter()
        .filter(|s| s.look.elevation_deg >= 0.0)
        .count();

    Candidate {
        satellite_id: track.satellite_id,
        name: track.name.clone(),
        constellation: track.constellation,
        suitability,
        max_elevation_deg,
        mean_range_km,
        visible_sample_count,
    }
}
