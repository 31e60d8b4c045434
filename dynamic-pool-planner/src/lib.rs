//! Dynamic Pool Planner — Stage 6
//!
//! Picks, per constellation, the smallest satellite pool such that at
//! every sampled instant in the window, the pool delivers at least the
//! configured number of candidates above the handover elevation
//! threshold. Greedy temporal set-cover builds a feasible pool; a
//! seeded simulated-annealing pass then tries to shrink it further
//! without losing coverage.

use geo_suitability_filter::{Candidate, SuitabilityScore};
use orbital_propagator::SatelliteTrack;
use pipeline_config::{ConstellationTarget, ElevationThresholds};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tle_loader::Constellation;

#[derive(Error, Debug)]
pub enum DynamicPoolInfeasible {
    #[error("{constellation:?}: greedy cover could not reach {min_visible} visible candidates at instant index {instant_index} (best achieved: {best_achieved})")]
    CoverageUnreachable {
        constellation: Constellation,
        min_visible: usize,
        instant_index: usize,
        best_achieved: usize,
    },
}

pub type Result<T> = std::result::Result<T, DynamicPoolInfeasible>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedSatellite {
    pub satellite_id: u32,
    pub suitability: SuitabilityScore,
    pub position_timeseries: Vec<orbital_propagator::PropagatedSample>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoverageProof {
    pub instants_checked: usize,
    pub min_visible_target: usize,
    pub min_visible_achieved: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicPool {
    pub constellation: Constellation,
    pub selected: Vec<SelectedSatellite>,
    pub coverage_proof: CoverageProof,
}

/// Annealing tuning knobs. Kept separate from `Config` since these are
/// planner-internal search parameters, not externally configured
/// pipeline behaviour.
#[derive(Debug, Clone, Copy)]
pub struct AnnealingParams {
    pub seed: u64,
    pub max_iterations: usize,
    pub stall_iterations: usize,
    pub initial_temperature: f64,
    pub cooling_rate: f64,
}

impl Default for AnnealingParams {
    fn default() -> Self {
        Self {
            seed: 0,
            max_iterations: 2000,
            stall_iterations: 200,
            initial_temperature: 10.0,
            cooling_rate: 0.995,
        }
    }
}

/// Plan the Stage 6 pool for one constellation: greedy cover, then
/// seeded annealing refinement subject to the coverage constraint.
pub fn plan_pool(
    candidates: &[Candidate],
    tracks: &[SatelliteTrack],
    target: &ConstellationTarget,
    thresholds: &ElevationThresholds,
    annealing: &AnnealingParams,
) -> Result<DynamicPool> {
    let constellation = candidates
        .first()
        .map(|c| c.constellation)
        .or_else(|| tracks.first().map(|t| t.constellation))
        .unwrap_or(Constellation::Starlink);

    let sample_count = tracks.first().map(|t| t.samples.len()).unwrap_or(0);
    let visibility = build_visibility_matrix(tracks, thresholds.handover_deg);

    let greedy = greedy_cover(candidates, &visibility, sample_count, target.min_visible)?;
    let refined = anneal_refine(&greedy, candidates, &visibility, sample_count, target.min_visible, annealing);

    let min_visible_achieved = min_visible_across_instants(&refined, &visibility, sample_count);

    let selected = refined
        .iter()
        .filter_map(|&satellite_id| {
            let candidate = candidates.iter().find(|c| c.satellite_id == satellite_id)?;
            let track = tracks.iter().find(|t| t.satellite_id == satellite_id)?;
            Some(SelectedSatellite {
                satellite_id,
                suitability: candidate.suitability,
                position_timeseries: track.samples.clone(),
            })
        })
        .collect();

    Ok(DynamicPool {
        constellation,
        selected,
        coverage_proof: CoverageProof {
            instants_checked: sample_count,
            min_visible_target: target.min_visible,
            min_visible_achieved,
        },
    })
}

/// `visibility[i]` is the set of satellite indices (into `candidates`)
/// visible above `handover_deg` at sample index `i`.
fn build_visibility_matrix(tracks: &[SatelliteTrack], handover_deg: f64) -> Vec<HashSet<u32>> {
    let sample_count = tracks.first().map(|t| t.samples.len()).unwrap_or(0);
    let mut visibility = vec![HashSet::new(); sample_count];

    for track in tracks {
        for (i, sample) in track.samples.iter().enumerate() {
            if sample.look.elevation_deg >= handover_deg {
                visibility[i].insert(track.satellite_id);
            }
        }
    }

    visibility
}

fn visible_count_for(
    pool: &HashSet<u32>,
    visibility: &[HashSet<u32>],
    instant: usize,
) -> usize {
    visibility[instant].intersection(pool).count()
}

fn min_visible_across_instants(
    pool: &[u32],
    visibility: &[HashSet<u32>],
    sample_count: usize,
) -> usize {
    let pool_set: HashSet<u32> = pool.iter().copied().collect();
    (0..sample_count)
        .map(|i| visible_count_for(&pool_set, visibility, i))
        .min()
        .unwrap_or(0)
}

fn tie_break(a: &Candidate, b: &Candidate) -> std::cmp::Ordering {
    b.suitability
        .total
        .partial_cmp(&a.suitability.total)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.mean_range_km.partial_cmp(&b.mean_range_km).unwrap_or(std::cmp::Ordering::Equal))
        .then_with(|| a.satellite_id.cmp(&b.satellite_id))
}

/// Repeatedly pick the satellite covering the largest number of
/// currently-undercovered instants, until every instant has at least
/// `min_visible` pool satellites above threshold, or no satellite can
/// add any coverage (infeasible).
fn greedy_cover(
    candidates: &[Candidate],
    visibility: &[HashSet<u32>],
    sample_count: usize,
    min_visible: usize,
) -> Result<Vec<u32>> {
    if sample_count == 0 || candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut remaining_need = vec![min_visible; sample_count];
    let mut selected: Vec<u32> = Vec::new();
    let mut remaining_candidates: Vec<&Candidate> = candidates.iter().collect();
    remaining_candidates.sort_by(|a, b| tie_break(a, b));

    while remaining_need.iter().any(|&need| need > 0) {
        let best = remaining_candidates
            .iter()
            .map(|candidate| {
                let coverage: usize = (0..sample_count)
                    .filter(|&i| remaining_need[i] > 0 && visibility[i].contains(&candidate.satellite_id))
                    .count();
                (candidate, coverage)
            })
            .filter(|(_, coverage)| *coverage > 0)
            .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| tie_break(a, b).reverse()))
            .map(|(candidate, _)| *candidate);

        let Some(best) = best else {
            let worst_instant = remaining_need
                .iter()
                .enumerate()
                .filter(|(_, &need)| need > 0)
                .max_by_key(|(_, &need)| need)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let achieved = min_visible - remaining_need[worst_instant];
            return Err(DynamicPoolInfeasible::CoverageUnreachable {
                constellation: candidates[0].constellation,
                min_visible,
                instant_index: worst_instant,
                best_achieved: achieved,
            });
        };

        for i in 0..sample_count {
            if visibility[i].contains(&best.satellite_id) && remaining_need[i] > 0 {
                remaining_need[i] -= 1;
            }
        }
        selected.push(best.satellite_id);
        remaining_candidates.retain(|c| c.satellite_id != best.satellite_id);
    }

    Ok(selected)
}

/// Bounded-time simulated annealing: at each step, propose dropping one
/// pool member (or swapping it for an unused candidate), accept if
/// coverage holds and the move improves the secondary objective (pool
/// size, then mean suitability), or probabilistically accept a
/// worsening move per a temperature-based acceptance ladder modeled on
/// a discrete risk cascade. Stops after `stall_iterations` without
/// improvement or `max_iterations`, whichever comes first.
fn anneal_refine(
    initial: &[u32],
    candidates: &[Candidate],
    visibility: &[HashSet<u32>],
    sample_count: usize,
    min_visible: usize,
    params: &AnnealingParams,
) -> Vec<u32> {
    let mut rng = SmallRng::seed_from_u64(params.seed);
    let mut pool: Vec<u32> = initial.to_vec();
    let mut best = pool.clone();
    let mut temperature = params.initial_temperature;
    let mut stalled = 0;

    let unused: Vec<u32> = candidates
        .iter()
        .map(|c| c.satellite_id)
        .filter(|id| !pool.contains(id))
        .collect();

    for _ in 0..params.max_iterations {
        if stalled >= params.stall_iterations || pool.len() <= min_visible.max(1) {
            break;
        }

        let drop_index = rng.gen_range(0..pool.len());
        let mut candidate_pool = pool.clone();
        candidate_pool.remove(drop_index);

        let swap_in = if !unused.is_empty() && rng.gen_bool(0.3) {
            Some(unused[rng.gen_range(0..unused.len())])
        } else {
            None
        };
        if let Some(swap_in) = swap_in {
            candidate_pool.push(swap_in);
        }

        let feasible = meets_coverage(&candidate_pool, visibility, sample_count, min_visible);

        let objective = |p: &[u32]| -> f64 {
            let mean_score: f64 = p
                .iter()
                .filter_map(|id| candidates.iter().find(|c| c.satellite_id == *id))
                .map(|c| c.suitability.total)
                .sum::<f64>()
                / p.len().max(1) as f64;
            p.len() as f64 * 1000.0 - mean_score
        };

        let accept = if feasible {
            let delta = objective(&candidate_pool) - objective(&pool);
            delta < 0.0 || rng.gen_range(0.0..1.0) < (-delta / temperature.max(1e-6)).exp()
        } else {
            false
        };

        if accept {
            pool = candidate_pool;
            if pool.len() < best.len()
                || (pool.len() == best.len() && objective(&pool) < objective(&best))
            {
                best = pool.clone();
                stalled = 0;
            } else {
                stalled += 1;
            }
        } else {
            stalled += 1;
        }

        temperature *= params.cooling_rate;
    }

    best
}

fn meets_coverage(
    pool: &[u32],
    visibility: &[HashSet<u32>],
    sample_count: usize,
    min_visible: usize,
) -> bool {
    let pool_set: HashSet<u32> = pool.iter().copied().collect();
    (0..sample_count).all(|i| visible_count_for(&pool_set, visibility, i) >= min_visible)
}

/// Score every unused candidate's marginal contribution to coverage in
/// parallel; used by callers wanting a quick diagnostic of which
/// satellites are "load-bearing" without running a full anneal.
pub fn marginal_coverage_contributions(
    candidates: &[Candidate],
    visibility: &[HashSet<u32>],
    sample_count: usize,
) -> Vec<(u32, usize)> {
    candidates
        .par_iter()
        .map(|candidate| {
            let coverage = (0..sample_count)
                .filter(|&i| visibility[i].contains(&candidate.satellite_id))
                .count();
            (candidate.satellite_id, coverage)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use geo_suitability_filter::SuitabilityFactors;
    use orbital_propagator::{GeodeticPosition, PropagatedSample, StateVector, TopocentricLook};

    fn make_candidate(satellite_id: u32, score: f64) -> Candidate {
        Candidate {
            satellite_id,
            name: format!("SAT-{satellite_id}"),
            constellation: Constellation::Starlink,
            suitability: SuitabilityScore {
                total: score,
                factors: SuitabilityFactors {
                    inclination_score: 1.0,
                    altitude_score: 1.0,
                    eccentricity_score: 1.0,
                    pass_frequency_score: 1.0,
                    constellation_fit_score: 1.0,
                },
            },
            max_elevation_deg: 60.0,
            mean_range_km: 1000.0,
            visible_sample_count: 4,
        }
    }

    fn make_track(satellite_id: u32, visible_at: &[bool]) -> SatelliteTrack {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let samples = visible_at
            .iter()
            .enumerate()
            .map(|(i, &visible)| PropagatedSample {
                epoch: base + chrono::Duration::seconds(i as i64 * 30),
                state: StateVector {
                    position_x_km: 7000.0,
                    position_y_km: 0.0,
                    position_z_km: 0.0,
                    velocity_x_km_s: 0.0,
                    velocity_y_km_s: 7.5,
                    velocity_z_km_s: 0.0,
                },
                subpoint: GeodeticPosition {
                    latitude_deg: 0.0,
                    longitude_deg: 0.0,
                    altitude_km: 550.0,
                },
                look: TopocentricLook {
                    azimuth_deg: 90.0,
                    elevation_deg: if visible { 20.0 } else { -5.0 },
                    range_km: 1000.0,
                },
            })
            .collect();

        SatelliteTrack {
            satellite_id,
            name: format!("SAT-{satellite_id}"),
            constellation: Constellation::Starlink,
            inclination_deg: 53.0,
            eccentricity: 0.0001,
            mean_motion_orbits_day: 15.06,
            samples,
        }
    }

    #[test]
    fn test_greedy_cover_picks_enough_for_full_coverage() {
        let candidates = vec![make_candidate(1, 90.0), make_candidate(2, 80.0)];
        let tracks = vec![
            make_track(1, &[true, true, false, true]),
            make_track(2, &[false, true, true, true]),
        ];
        let visibility = build_visibility_matrix(&tracks, 10.0);

        let pool = greedy_cover(&candidates, &visibility, 4, 1).unwrap();
        assert!(meets_coverage(&pool, &visibility, 4, 1));
    }

    #[test]
    fn test_greedy_cover_infeasible_reports_error() {
        let candidates = vec![make_candidate(1, 90.0)];
        let tracks = vec![make_track(1, &[true, false, true, true])];
        let visibility = build_visibility_matrix(&tracks, 10.0);

        let result = greedy_cover(&candidates, &visibility, 4, 2);
        assert!(matches!(
            result,
            Err(DynamicPoolInfeasible::CoverageUnreachable { .. })
        ));
    }

    #[test]
    fn test_plan_pool_retains_full_timeseries() {
        let candidates = vec![make_candidate(1, 90.0), make_candidate(2, 80.0)];
        let tracks = vec![
            make_track(1, &[true, true, true, true]),
            make_track(2, &[true, true, true, true]),
        ];
        let target = ConstellationTarget {
            pool_size: 2,
            min_visible: 1,
        };
        let thresholds = ElevationThresholds::default();
        let annealing = AnnealingParams {
            max_iterations: 50,
            ..AnnealingParams::default()
        };

        let pool = plan_pool(&candidates, &tracks, &target, &thresholds, &annealing).unwrap();
        assert!(pool.coverage_proof.min_visible_achieved >= 1);
        for satellite in &pool.selected {
            assert_eq!(satellite.position_timeseries.len(), 4);
        }
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let candidates = vec![
            make_candidate(1, 90.0),
            make_candidate(2, 85.0),
            make_candidate(3, 70.0),
        ];
        let tracks = vec![
            make_track(1, &[true, true, true, true]),
            make_track(2, &[true, true, true, true]),
            make_track(3, &[true, false, true, true]),
        ];
        let target = ConstellationTarget {
            pool_size: 3,
            min_visible: 1,
        };
        let thresholds = ElevationThresholds::default();
        let annealing = AnnealingParams {
            seed: 42,
            max_iterations: 100,
            ..AnnealingParams::default()
        };

        let pool_a = plan_pool(&candidates, &tracks, &target, &thresholds, &annealing).unwrap();
        let pool_b = plan_pool(&candidates, &tracks, &target, &thresholds, &annealing).unwrap();

        let mut ids_a: Vec<u32> = pool_a.selected.iter().map(|s| s.satellite_id).collect();
        let mut ids_b: Vec<u32> = pool_b.selected.iter().map(|s| s.satellite_id).collect();
        ids_a.sort();
        ids_b.sort();
        assert_eq!(ids_a, ids_b);
    }
}
