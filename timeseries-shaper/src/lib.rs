//! Time-series Shaper — Stage 4
//!
//! Normalises an analyzed track into the compact, animation-friendly
//! shape external consumers see: `(t, elevation, azimuth, range, rsrp,
//! visible)` per sample, plus constellation-level visible-count
//! aggregates at the three layered elevation thresholds. Deliberately
//! the smallest stage — no downsampling, no added scoring.

use chrono::{DateTime, Utc};
use pipeline_config::ElevationThresholds;
use serde::{Deserialize, Serialize};
use signal_event_analyzer::AnalyzedTrack;
use thiserror::Error;
use tle_loader::Constellation;

#[derive(Error, Debug)]
pub enum ShaperError {
    #[error("satellite {0} track is not strictly increasing in time at index {1}")]
    NotMonotonic(u32, usize),
    #[error("satellite {0} track has a duplicate timestamp at index {1}")]
    DuplicateTimestamp(u32, usize),
}

pub type Result<T> = std::result::Result<T, ShaperError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub t: DateTime<Utc>,
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
    pub rsrp_dbm: Option<f64>,
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteTimeSeries {
    pub satellite_id: u32,
    pub name: String,
    pub constellation: Constellation,
    pub points: Vec<TimeSeriesPoint>,
}

/// Normalise one analyzed track, rejecting any violation of strict
/// monotonicity or sample uniqueness before it reaches a front end.
pub fn shape_track(track: &AnalyzedTrack) -> Result<SatelliteTimeSeries> {
    let mut points = Vec::with_capacity(track.samples.len());

    for (i, sample) in track.samples.iter().enumerate() {
        if i > 0 {
            let previous = track.samples[i - 1].epoch;
            if sample.epoch == previous {
                return Err(ShaperError::DuplicateTimestamp(track.satellite_id, i));
            }
            if sample.epoch < previous {
                return Err(ShaperError::NotMonotonic(track.satellite_id, i));
            }
        }

        points.push(TimeSeriesPoint {
            t: sample.epoch,
            elevation_deg: sample.elevation_deg,
            azimuth_deg: sample.azimuth_deg,
            range_km: sample.range_km,
            rsrp_dbm: sample.signal.map(|s| s.rsrp_dbm),
            visible: sample.signal.is_some(),
        });
    }

    Ok(SatelliteTimeSeries {
        satellite_id: track.satellite_id,
        name: track.name.clone(),
        constellation: track.constellation,
        points,
    })
}

pub fn shape_tracks(tracks: &[AnalyzedTrack]) -> Result<Vec<SatelliteTimeSeries>> {
    tracks.iter().map(shape_track).collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisibleCounts {
    pub above_minimum: usize,
    pub above_handover: usize,
    pub above_optimal: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSample {
    pub timestamp: DateTime<Utc>,
    pub constellation: Constellation,
    pub counts: VisibleCounts,
}

/// Per-timestamp visible-satellite counts at the three layered
/// thresholds, one stream per constellation present in `series`.
/// Assumes every series shares the same sample cadence and count — true
/// for any run, since every track is propagated over the same window.
pub fn aggregate_visible_counts(
    series: &[SatelliteTimeSeries],
    thresholds: &ElevationThresholds,
) -> Vec<AggregateSample> {
    let mut result = Vec::new();

    for constellation in Constellation::all() {
        let members: Vec<&SatelliteTimeSeries> = series
            .iter()
            .filter(|s| s.constellation == constellation)
            .collect();

        let Some(sample_count) = members.first().map(|m| m.points.len()) else {
            continue;
        };

        for i in 0..sample_count {
            let mut counts = VisibleCounts {
                above_minimum: 0,
                above_handover: 0,
                above_optimal: 0,
            };
            let mut timestamp = None;

            for member in &members {
                let Some(point) = member.points.get(i) else {
                    continue;
                };
                timestamp.get_or_insert(point.t);

                if point.elevation_deg >= thresholds.minimum_deg {
                    counts.above_minimum += 1;
                }
                if point.elevation_deg >= thresholds.handover_deg {
                    counts.above_handover += 1;
                }
                if point.elevation_deg >= thresholds.optimal_deg {
                    counts.above_optimal += 1;
                }
            }

            if let Some(timestamp) = timestamp {
                result.push(AggregateSample {
                    timestamp,
                    constellation,
                    counts,
                });
            }
        }
    }

    result
}
