//! Stage Orchestrator & Validator — Stage 0/7
//!
//! Runs Stages 1-6 in order, computing a validation snapshot after each
//! stage boundary and halting fail-fast if any named check fails.
//! Emits lineage distinguishing three separate times that must never be
//! conflated: when the TLE data was generated, when this run started,
//! and the SGP4 propagation base epoch.

use chrono::{DateTime, NaiveDate, Utc};
use dynamic_pool_planner::{AnnealingParams, DynamicPool, DynamicPoolInfeasible};
use geo_suitability_filter::{Candidate, FilterError};
use orbital_propagator::{PropagationError, SatelliteTrack};
use pipeline_config::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use signal_event_analyzer::{AnalyzerError, ElevationLinearModel, HandoverEvent};
use stage_integrator::{StageConsistencyError, StageFiveRecord};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use timeseries_shaper::{ShaperError, SatelliteTimeSeries};
use tle_loader::{Constellation, LoaderError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("TLE loader error: {0}")]
    Loader(#[from] LoaderError),
    #[error("propagation error: {0}")]
    Propagation(#[from] PropagationError),
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),
    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("shaper error: {0}")]
    Shaper(#[from] ShaperError),
    #[error("cross-stage consistency error: {0}")]
    Consistency(#[from] StageConsistencyError),
    #[error("dynamic pool infeasible: {0}")]
    PoolInfeasible(#[from] DynamicPoolInfeasible),
    #[error("stage invariant check failed at {stage}: {check}")]
    Invariant { stage: String, check: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSnapshot {
    pub stage: String,
    pub checks: Vec<NamedCheck>,
}

impl ValidationSnapshot {
    pub fn ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    fn first_failure(&self) -> Option<&NamedCheck> {
        self.checks.iter().find(|c| !c.passed)
    }
}

/// Implemented once per stage output type, each bundling whatever
/// context (config thresholds, target pool) its checks need.
pub trait StageValidate {
    fn validate(&self) -> ValidationSnapshot;
}

pub struct Stage1Validation<'a> {
    pub tracks: &'a [SatelliteTrack],
    pub window: &'a pipeline_config::AnalysisWindow,
}

impl StageValidate for Stage1Validation<'_> {
    fn validate(&self) -> ValidationSnapshot {
        let monotonic = self.tracks.iter().all(|t| {
            t.samples
                .windows(2)
                .all(|pair| pair[0].epoch < pair[1].epoch)
        });

        let expected_count = self.window.sample_count();
        let sample_count_ok = self
            .tracks
            .iter()
            .all(|t| t.samples.len() == expected_count);

        let look_angles_ok = self.tracks.iter().all(|t| {
            t.samples.iter().all(|s| {
                (-90.0..=90.0).contains(&s.look.elevation_deg)
                    && (0.0..360.0).contains(&s.look.azimuth_deg)
                    && s.look.range_km > 0.0
            })
        });

        ValidationSnapshot {
            stage: "propagate".to_string(),
            checks: vec![
                NamedCheck {
                    name: "timestamps_strictly_increasing".to_string(),
                    passed: monotonic,
                    detail: format!("{} tracks checked", self.tracks.len()),
                },
                NamedCheck {
                    name: "sample_count_matches_window".to_string(),
                    passed: sample_count_ok,
                    detail: format!("expected {expected_count} samples per track"),
                },
                NamedCheck {
                    name: "look_angles_in_range".to_string(),
                    passed: look_angles_ok,
                    detail: "elevation in [-90,90], azimuth in [0,360), range > 0".to_string(),
                },
            ],
        }
    }
}

pub struct Stage2Validation<'a> {
    pub candidates: &'a [Candidate],
}

impl StageValidate for Stage2Validation<'_> {
    fn validate(&self) -> ValidationSnapshot {
        ValidationSnapshot {
            stage: "filter".to_string(),
            checks: vec![NamedCheck {
                name: "candidates_nonempty".to_string(),
                passed: !self.candidates.is_empty(),
                detail: format!("{} candidates", self.candidates.len()),
            }],
        }
    }
}

pub struct Stage3Validation<'a> {
    pub analyzed: &'a [signal_event_analyzer::AnalyzedTrack],
    pub events: &'a [HandoverEvent],
}

impl StageValidate for Stage3Validation<'_> {
    fn validate(&self) -> ValidationSnapshot {
        let id_to_constellation: HashMap<u32, Constellation> = self
            .analyzed
            .iter()
            .map(|t| (t.satellite_id, t.constellation))
            .collect();

        let same_constellation = self.events.iter().all(|e| {
            let serving = id_to_constellation.get(&e.serving_satellite_id);
            let neighbour = id_to_constellation.get(&e.neighbour_satellite_id);
            matches!((serving, neighbour), (Some(a), Some(b)) if a == b)
        });

        ValidationSnapshot {
            stage: "analyze".to_string(),
            checks: vec![NamedCheck {
                name: "same_constellation_events".to_string(),
                passed: same_constellation,
                detail: format!("{} events checked", self.events.len()),
            }],
        }
    }
}

pub struct Stage4Validation<'a> {
    pub series: &'a [SatelliteTimeSeries],
}

impl StageValidate for Stage4Validation<'_> {
    fn validate(&self) -> ValidationSnapshot {
        let monotonic_and_unique = self.series.iter().all(|s| {
            s.points.windows(2).all(|pair| pair[0].t < pair[1].t)
        });

        ValidationSnapshot {
            stage: "shape".to_string(),
            checks: vec![NamedCheck {
                name: "timeseries_monotonic_and_unique".to_string(),
                passed: monotonic_and_unique,
                detail: format!("{} series checked", self.series.len()),
            }],
        }
    }
}

pub struct Stage6Validation<'a> {
    pub pool: &'a DynamicPool,
    pub target: &'a pipeline_config::ConstellationTarget,
}

impl StageValidate for Stage6Validation<'_> {
    fn validate(&self) -> ValidationSnapshot {
        let satisfied = self.pool.coverage_proof.min_visible_achieved >= self.target.min_visible;

        ValidationSnapshot {
            stage: "plan".to_string(),
            checks: vec![NamedCheck {
                name: "coverage_satisfied".to_string(),
                passed: satisfied,
                detail: format!(
                    "achieved {} of target {}",
                    self.pool.coverage_proof.min_visible_achieved, self.target.min_visible
                ),
            }],
        }
    }
}

/// The three time fields are separate by design: conflating "when we
/// processed this" with "which day the TLEs are from" is the exact bug
/// this record exists to prevent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lineage {
    pub tle_data_epoch: NaiveDate,
    pub processing_started_at: DateTime<Utc>,
    pub sgp4_base_time: DateTime<Utc>,
    pub stages_completed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub stage5: HashMap<Constellation, StageFiveRecord>,
    pub pools: HashMap<Constellation, DynamicPool>,
    pub lineage: Lineage,
    pub snapshots: Vec<ValidationSnapshot>,
}

fn gate(snapshots: &mut Vec<ValidationSnapshot>, snapshot: ValidationSnapshot) -> Result<()> {
    let ok = snapshot.ok();
    let stage = snapshot.stage.clone();
    let failure = snapshot.first_failure().cloned();
    snapshots.push(snapshot);
    if ok {
        Ok(())
    } else {
        let check = failure.map(|c| c.name).unwrap_or_else(|| "unknown".to_string());
        Err(PipelineError::Invariant { stage, check })
    }
}

/// Run the full pipeline: load, propagate, then per constellation
/// filter, analyze, shape, integrate, and plan. Halts at the first
/// failing validation snapshot or propagated error. `annealing` tunes
/// the Stage 6 simulated-annealing refinement shared by every
/// constellation's pool search.
pub fn run_pipeline(
    config: &Config,
    tle_root: &Path,
    annealing: &AnnealingParams,
) -> Result<PipelineReport> {
    let processing_started_at = Utc::now();
    let as_of = processing_started_at.date_naive();

    let catalogue = tle_loader::load_catalogue(tle_root, as_of, config)?;
    let tle_data_epoch = catalogue
        .values()
        .map(|file| file.data_epoch)
        .min()
        .unwrap_or(as_of);

    // Propagation is anchored to the data epoch, not the wall clock: the
    // TLE is only valid near the day it was generated, not the day this
    // pipeline happens to run.
    let sgp4_base_time = DateTime::<Utc>::from_naive_utc_and_offset(
        tle_data_epoch.and_hms_opt(12, 0, 0).unwrap(),
        Utc,
    );

    let tracks = orbital_propagator::propagate_catalogue(
        &catalogue,
        &config.analysis_window,
        sgp4_base_time,
        &config.observer,
    )?;

    let mut snapshots = Vec::new();
    let mut stages_completed = vec!["load".to_string(), "propagate".to_string()];

    gate(
        &mut snapshots,
        Stage1Validation {
            tracks: &tracks,
            window: &config.analysis_window,
        }
        .validate(),
    )?;

    let mut pools = HashMap::new();
    let mut stage5 = HashMap::new();

    for constellation in Constellation::all() {
        let constellation_tracks: Vec<SatelliteTrack> = tracks
            .iter()
            .filter(|t| t.constellation == constellation)
            .cloned()
            .collect();

        let (candidates, _filter_report) =
            geo_suitability_filter::filter_constellation(&constellation_tracks, constellation, config)?;
        gate(
            &mut snapshots,
            Stage2Validation {
                candidates: &candidates,
            }
            .validate(),
        )?;
        stages_completed.push(format!("filter:{constellation:?}"));

        let candidate_tracks: Vec<SatelliteTrack> = constellation_tracks
            .iter()
            .filter(|t| candidates.iter().any(|c| c.satellite_id == t.satellite_id))
            .cloned()
            .collect();

        let atmospheric_model = ElevationLinearModel::default();
        let (analyzed, events) =
            signal_event_analyzer::analyze_constellation(&candidate_tracks, config, &atmospheric_model)?;
        gate(
            &mut snapshots,
            Stage3Validation {
                analyzed: &analyzed,
                events: &events,
            }
            .validate(),
        )?;
        stages_completed.push(format!("analyze:{constellation:?}"));

        let series = timeseries_shaper::shape_tracks(&analyzed)?;
        gate(&mut snapshots, Stage4Validation { series: &series }.validate())?;
        stages_completed.push(format!("shape:{constellation:?}"));

        let record = stage_integrator::integrate(
            &candidates,
            &candidate_tracks,
            &analyzed,
            &series,
            &events,
            &config.analysis_window,
            &config.elevation_thresholds,
            sgp4_base_time,
        )?;
        stage5.insert(constellation, record);
        stages_completed.push(format!("integrate:{constellation:?}"));

        let target = match constellation {
            Constellation::Starlink => config.constellation_targets.starlink,
            Constellation::OneWeb => config.constellation_targets.oneweb,
        };
        let pool = dynamic_pool_planner::plan_pool(
            &candidates,
            &candidate_tracks,
            &target,
            &config.elevation_thresholds,
            annealing,
        )?;
        gate(
            &mut snapshots,
            Stage6Validation {
                pool: &pool,
                target: &target,
            }
            .validate(),
        )?;
        pools.insert(constellation, pool);
        stages_completed.push(format!("plan:{constellation:?}"));
    }

    Ok(PipelineReport {
        stage5,
        pools,
        lineage: Lineage {
            tle_data_epoch,
            processing_started_at,
            sgp4_base_time,
            stages_completed,
        },
        snapshots,
    })
}
