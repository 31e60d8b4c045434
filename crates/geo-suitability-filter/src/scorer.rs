//! Suitability scoring
//!
//! Implements the 5-factor weighted model:
//! `Score = w_inc·inclination + w_alt·altitude + w_ecc·eccentricity
//!        + w_pf·pass_frequency + w_const·constellation_fit`

use crate::{SuitabilityFactors, SuitabilityScore};
use orbital_propagator::SatelliteTrack;
use pipeline_config::{OrbitProfile, SuitabilityWeights};

/// Half-width (degrees) of the inclination scoring window: a satellite
/// this far from the profile's target inclination scores zero.
const INCLINATION_TOLERANCE_DEG: f64 = 10.0;

/// Half-width (km) of the altitude scoring window.
const ALTITUDE_TOLERANCE_KM: f64 = 300.0;

/// Eccentricity above this is treated as fully unsuitable; LEO
/// constellations targeted by this pipeline are near-circular.
const ECCENTRICITY_CEILING: f64 = 0.02;

pub fn score_suitability(
    track: &SatelliteTrack,
    profile: &OrbitProfile,
    weights: &SuitabilityWeights,
) -> SuitabilityScore {
    let inclination_score = proximity_score(
        track.inclination_deg,
        profile.target_inclination_deg,
        INCLINATION_TOLERANCE_DEG,
    );

    let mean_altitude_km = mean_subpoint_altitude(track);
    let altitude_score = proximity_score(
        mean_altitude_km,
        profile.target_altitude_km,
        ALTITUDE_TOLERANCE_KM,
    );

    let eccentricity_score = (1.0 - track.eccentricity / ECCENTRICITY_CEILING).clamp(0.0, 1.0);

    let pass_frequency_score = visible_fraction(track);

    // Joint fit of inclination and altitude to the constellation's
    // nominal orbit — distinct from the two univariate terms above.
    let constellation_fit_score = (inclination_score * altitude_score).sqrt();

    let factors = SuitabilityFactors {
        inclination_score,
        altitude_score,
        eccentricity_score,
        pass_frequency_score,
        constellation_fit_score,
    };

    let total = 100.0
        * (weights.inclination * inclination_score
            + weights.altitude * altitude_score
            + weights.eccentricity * eccentricity_score
            + weights.pass_frequency * pass_frequency_score
            + weights.constellation * constellation_fit_score);

    SuitabilityScore { total, factors }
}

/// 1.0 at `target`, decaying linearly to 0.0 at `tolerance` away.
fn proximity_score(value: f64, target: f64, tolerance: f64) -> f64 {
    (1.0 - (value - target).abs() / tolerance).clamp(0.0, 1.0)
}

fn mean_subpoint_altitude(track: &SatelliteTrack) -> f64 {
    track.samples.iter().map(|s| s.subpoint.altitude_km).sum::<f64>() / track.samples.len() as f64
}

fn visible_fraction(track: &SatelliteTrack) -> f64 {
    let visible = track
        .samples
        .iter()
        .filter(|s| s.look.elevation_deg >= 0.0)
        .count();
    visible as f64 / track.samples.len() as f64
}
