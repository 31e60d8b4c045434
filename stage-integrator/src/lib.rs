//! Cross-stage Integrator — Stage 5
//!
//! Consolidates Stages 2-4 into the boundary records an external store
//! would persist: satellite metadata, layered elevation cuts, and event
//! timelines. Runs consistency checks across the stage boundary before
//! anything is emitted; any failure is a `StageConsistencyError` and
//! halts the pipeline.

use chrono::{DateTime, Utc};
use geo_suitability_filter::{Candidate, SuitabilityScore};
use orbital_propagator::SatelliteTrack;
use pipeline_config::{AnalysisWindow, ElevationThresholds};
use serde::{Deserialize, Serialize};
use signal_event_analyzer::{AnalyzedTrack, HandoverEvent};
use thiserror::Error;
use timeseries_shaper::{SatelliteTimeSeries, VisibleCounts};
use tle_loader::Constellation;

#[derive(Error, Debug)]
pub enum StageConsistencyError {
    #[error("satellite {0} appears in Stage 3 but was not a Stage 2 candidate")]
    AnalyzedNotInCandidates(u32),
    #[error("event at {triggered_at} for satellites ({serving}, {neighbour}) falls outside the analysis window [{window_start}, {window_end}]")]
    EventOutsideWindow {
        triggered_at: DateTime<Utc>,
        serving: u32,
        neighbour: u32,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    },
    #[error("visible-sample count mismatch for satellite {satellite_id}: Stage 3 counted {stage3_count}, Stage 4 counted {stage4_count}")]
    VisibleCountMismatch {
        satellite_id: u32,
        stage3_count: usize,
        stage4_count: usize,
    },
}

pub type Result<T> = std::result::Result<T, StageConsistencyError>;

/// Orbital-element summary carried alongside the suitability score, so
/// a store consumer never needs to join back against Stage 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrbitalElementSummary {
    pub inclination_deg: f64,
    pub eccentricity: f64,
    pub mean_motion_orbits_day: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteMetadata {
    pub satellite_id: u32,
    pub name: String,
    pub constellation: Constellation,
    pub orbital_elements: OrbitalElementSummary,
    pub suitability: SuitabilityScore,
}

/// One crossing of a layered elevation threshold: the satellite and the
/// timestamp at which its elevation first reached `threshold_deg` from
/// below on this pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdCrossing {
    pub satellite_id: u32,
    pub crossed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationCut {
    pub threshold_deg: f64,
    pub crossings: Vec<ThresholdCrossing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageFiveRecord {
    pub constellation: Constellation,
    pub metadata: Vec<SatelliteMetadata>,
    pub elevation_cuts: Vec<ElevationCut>,
    pub events: Vec<HandoverEvent>,
}

/// Build the Stage 5 record for one constellation, checking consistency
/// against Stages 2-4 before returning anything.
pub fn integrate(
    candidates: &[Candidate],
    tracks: &[SatelliteTrack],
    analyzed: &[AnalyzedTrack],
    series: &[SatelliteTimeSeries],
    events: &[HandoverEvent],
    window: &AnalysisWindow,
    thresholds: &ElevationThresholds,
    window_start: DateTime<Utc>,
) -> Result<StageFiveRecord> {
    let constellation = candidates
        .first()
        .map(|c| c.constellation)
        .or_else(|| tracks.first().map(|t| t.constellation))
        .unwrap_or(Constellation::Starlink);

    check_analyzed_subset_of_candidates(candidates, analyzed)?;

    let window_end = window_start + chrono::Duration::seconds(window.duration_seconds);
    check_events_inside_window(events, window_start, window_end)?;

    check_visible_count_consistency(analyzed, series)?;

    let metadata = build_metadata(candidates, tracks);
    let elevation_cuts = vec![
        build_cut(thresholds.minimum_deg, analyzed),
        build_cut(thresholds.handover_deg, analyzed),
        build_cut(thresholds.optimal_deg, analyzed),
    ];

    let mut events = events.to_vec();
    events.sort_by_key(|e| e.triggered_at);

    Ok(StageFiveRecord {
        constellation,
        metadata,
        elevation_cuts,
        events,
    })
}

fn check_analyzed_subset_of_candidates(
    candidates: &[Candidate],
    analyzed: &[AnalyzedTrack],
) -> Result<()> {
    let candidate_ids: std::collections::HashSet<u32> =
        candidates.iter().map(|c| c.satellite_id).collect();
    for track in analyzed {
        if !candidate_ids.contains(&track.satellite_id) {
            return Err(StageConsistencyError::AnalyzedNotInCandidates(
                track.satellite_id,
            ));
        }
    }
    Ok(())
}

fn check_events_inside_window(
    events: &[HandoverEvent],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<()> {
    for event in events {
        if event.triggered_at < window_start || event.triggered_at > window_end {
            return Err(StageConsistencyError::EventOutsideWindow {
                triggered_at: event.triggered_at,
                serving: event.serving_satellite_id,
                neighbour: event.neighbour_satellite_id,
                window_start,
                window_end,
            });
        }
    }
    Ok(())
}

/// Stage 3 visible-sample count (elevation >= 0, i.e. signal defined)
/// must equal Stage 4's `visible` flag count for the same satellite.
fn check_visible_count_consistency(
    analyzed: &[AnalyzedTrack],
    series: &[SatelliteTimeSeries],
) -> Result<()> {
    for track in analyzed {
        let Some(shaped) = series.iter().find(|s| s.satellite_id == track.satellite_id) else {
            continue;
        };
        let stage3_count = track.samples.iter().filter(|s| s.signal.is_some()).count();
        let stage4_count = shaped.points.iter().filter(|p| p.visible).count();
        if stage3_count != stage4_count {
            return Err(StageConsistencyError::VisibleCountMismatch {
                satellite_id: track.satellite_id,
                stage3_count,
                stage4_count,
            });
        }
    }
    Ok(())
}

fn build_metadata(candidates: &[Candidate], tracks: &[SatelliteTrack]) -> Vec<SatelliteMetadata> {
    candidates
        .iter()
        .filter_map(|candidate| {
            let track = tracks.iter().find(|t| t.satellite_id == candidate.satellite_id)?;
            Some(SatelliteMetadata {
                satellite_id: candidate.satellite_id,
                name: candidate.name.clone(),
                constellation: candidate.constellation,
                orbital_elements: OrbitalElementSummary {
                    inclination_deg: track.inclination_deg,
                    eccentricity: track.eccentricity,
                    mean_motion_orbits_day: track.mean_motion_orbits_day,
                },
                suitability: candidate.suitability,
            })
        })
        .collect()
}

/// For every analyzed track, the first sample at which elevation rises
/// through `threshold_deg` from below (or the first sample overall, if
/// the track starts already above threshold).
fn build_cut(threshold_deg: f64, analyzed: &[AnalyzedTrack]) -> ElevationCut {
    let mut crossings = Vec::new();
    for track in analyzed {
        let mut previous_below = true;
        for sample in &track.samples {
            let above = sample.elevation_deg >= threshold_deg;
            if above && previous_below {
                crossings.push(ThresholdCrossing {
                    satellite_id: track.satellite_id,
                    crossed_at: sample.epoch,
                });
            }
            previous_below = !above;
        }
    }
    ElevationCut {
        threshold_deg,
        crossings,
    }
}

/// Optional diagnostic export of the layered elevation cuts, not part
/// of the Stage 5 contract itself (that remains the typed record above).
/// A crossing is a timestamp, not a point on Earth, so every feature
/// carries `geometry: None` — GeoJSON permits this.
pub fn cuts_to_geojson(record: &StageFiveRecord) -> geojson::FeatureCollection {
    let features: Vec<geojson::Feature> = record
        .elevation_cuts
        .iter()
        .flat_map(|cut| {
            cut.crossings.iter().map(move |crossing| {
                let mut properties = serde_json::Map::new();
                properties.insert("satellite_id".to_string(), crossing.satellite_id.into());
                properties.insert("threshold_deg".to_string(), cut.threshold_deg.into());
                properties.insert(
                    "crossed_at".to_string(),
                    crossing.crossed_at.to_rfc3339().into(),
                );
                geojson::Feature {
                    bbox: None,
                    geometry: None,
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
        })
        .collect();

    geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo_suitability_filter::SuitabilityFactors;
    use orbital_propagator::{GeodeticPosition, PropagatedSample, StateVector, TopocentricLook};
    use signal_event_analyzer::{AnalyzedSample, SignalSample};
    use timeseries_shaper::TimeSeriesPoint;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn make_candidate(satellite_id: u32) -> Candidate {
        Candidate {
            satellite_id,
            name: format!("SAT-{satellite_id}"),
            constellation: Constellation::Starlink,
            suitability: SuitabilityScore {
                total: 80.0,
                factors: SuitabilityFactors {
                    inclination_score: 1.0,
                    altitude_score: 1.0,
                    eccentricity_score: 1.0,
                    pass_frequency_score: 1.0,
                    constellation_fit_score: 1.0,
                },
            },
            max_elevation_deg: 60.0,
            mean_range_km: 1200.0,
            visible_sample_count: 10,
        }
    }

    fn make_track(satellite_id: u32) -> SatelliteTrack {
        let base = base_time();
        let samples = (0..3)
            .map(|i| PropagatedSample {
                epoch: base + chrono::Duration::seconds(i * 30),
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
                    elevation_deg: 20.0,
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

    fn make_analyzed(satellite_id: u32, visible_count: usize) -> AnalyzedTrack {
        let base = base_time();
        let samples = (0..3)
            .map(|i| AnalyzedSample {
                epoch: base + chrono::Duration::seconds(i * 30),
                azimuth_deg: 90.0,
                elevation_deg: 20.0,
                range_km: 1000.0,
                signal: if (i as usize) < visible_count {
                    Some(SignalSample {
                        rsrp_dbm: -95.0,
                        rsrq_db: -10.0,
                        sinr_db: 10.0,
                        path_loss_db: 180.0,
                        atmospheric_loss_db: 0.3,
                    })
                } else {
                    None
                },
            })
            .collect();

        AnalyzedTrack {
            satellite_id,
            name: format!("SAT-{satellite_id}"),
            constellation: Constellation::Starlink,
            samples,
        }
    }

    fn make_series(satellite_id: u32, visible_count: usize) -> SatelliteTimeSeries {
        let base = base_time();
        let points = (0..3)
            .map(|i| TimeSeriesPoint {
                t: base + chrono::Duration::seconds(i * 30),
                elevation_deg: 20.0,
                azimuth_deg: 90.0,
                range_km: 1000.0,
                rsrp_dbm: Some(-95.0),
                visible: (i as usize) < visible_count,
            })
            .collect();

        SatelliteTimeSeries {
            satellite_id,
            name: format!("SAT-{satellite_id}"),
            constellation: Constellation::Starlink,
            points,
        }
    }

    #[test]
    fn test_integrate_happy_path() {
        let candidates = vec![make_candidate(1)];
        let tracks = vec![make_track(1)];
        let analyzed = vec![make_analyzed(1, 2)];
        let series = vec![make_series(1, 2)];
        let window = AnalysisWindow::custom(60, 30).unwrap();
        let thresholds = ElevationThresholds::default();

        let record = integrate(
            &candidates,
            &tracks,
            &analyzed,
            &series,
            &[],
            &window,
            &thresholds,
            base_time(),
        )
        .unwrap();

        assert_eq!(record.metadata.len(), 1);
        assert_eq!(record.elevation_cuts.len(), 3);
    }

    #[test]
    fn test_analyzed_not_in_candidates_rejected() {
        let candidates: Vec<Candidate> = vec![];
        let tracks = vec![make_track(1)];
        let analyzed = vec![make_analyzed(1, 2)];
        let series = vec![make_series(1, 2)];
        let window = AnalysisWindow::custom(60, 30).unwrap();
        let thresholds = ElevationThresholds::default();

        let result = integrate(
            &candidates,
            &tracks,
            &analyzed,
            &series,
            &[],
            &window,
            &thresholds,
            base_time(),
        );
        assert!(matches!(
            result,
            Err(StageConsistencyError::AnalyzedNotInCandidates(1))
        ));
    }

    #[test]
    fn test_visible_count_mismatch_rejected() {
        let candidates = vec![make_candidate(1)];
        let tracks = vec![make_track(1)];
        let analyzed = vec![make_analyzed(1, 2)];
        let series = vec![make_series(1, 1)];
        let window = AnalysisWindow::custom(60, 30).unwrap();
        let thresholds = ElevationThresholds::default();

        let result = integrate(
            &candidates,
            &tracks,
            &analyzed,
            &series,
            &[],
            &window,
            &thresholds,
            base_time(),
        );
        assert!(matches!(
            result,
            Err(StageConsistencyError::VisibleCountMismatch { .. })
        ));
    }

    #[test]
    fn test_cuts_to_geojson_one_feature_per_crossing() {
        let record = StageFiveRecord {
            constellation: Constellation::Starlink,
            metadata: vec![],
            elevation_cuts: vec![ElevationCut {
                threshold_deg: 5.0,
                crossings: vec![ThresholdCrossing {
                    satellite_id: 1,
                    crossed_at: base_time(),
                }],
            }],
            events: vec![],
        };

        let collection = cuts_to_geojson(&record);
        assert_eq!(collection.features.len(), 1);
        assert!(collection.features[0].geometry.is_none());
    }

    #[test]
    fn test_event_outside_window_rejected() {
        let candidates = vec![make_candidate(1), make_candidate(2)];
        let tracks = vec![make_track(1), make_track(2)];
        let analyzed = vec![make_analyzed(1, 2), make_analyzed(2, 2)];
        let series = vec![make_series(1, 2), make_series(2, 2)];
        let window = AnalysisWindow::custom(60, 30).unwrap();
        let thresholds = ElevationThresholds::default();

        let bad_event = HandoverEvent {
            event_type: signal_event_analyzer::EventType::A4,
            triggered_at: base_time() - chrono::Duration::seconds(1000),
            serving_satellite_id: 1,
            neighbour_satellite_id: 2,
            parameters: signal_event_analyzer::EventParameters {
                serving_rsrp_dbm: -100.0,
                neighbour_rsrp_dbm: -90.0,
                serving_range_km: 1000.0,
                neighbour_range_km: 900.0,
            },
            priority: signal_event_analyzer::Priority::Medium,
        };

        let result = integrate(
            &candidates,
            &tracks,
            &analyzed,
            &series,
            &[bad_event],
            &window,
            &thresholds,
            base_time(),
        );
        assert!(matches!(
            result,
            Err(StageConsistencyError::EventOutsideWindow { .. })
        ));
    }
}
