//! Signal & 3GPP Event Analyzer — Stage 3
//!
//! Computes a Ku-band link budget (RSRP/RSRQ/SINR) per sample for
//! Stage-2 candidates, then detects 3GPP TS 38.331 A4/A5/D2 handover
//! triggers on every same-constellation (serving, neighbour) pair.
//! Grounded on this workspace's FSO link-budget calculator, re-derived
//! for a Ku-band RF downlink instead of a 1550 nm optical link.

use chrono::{DateTime, Utc};
use orbital_propagator::SatelliteTrack;
use pipeline_config::{Config, EventThresholds, LinkBudgetParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tle_loader::Constellation;

pub mod events;
pub mod link_budget;

pub use events::detect_events_for_pair;
pub use link_budget::{AtmosphericLossModel, ElevationLinearModel};

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("cannot analyze an empty track for satellite {0}")]
    EmptyTrack(u32),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalSample {
    pub rsrp_dbm: f64,
    pub rsrq_db: f64,
    pub sinr_db: f64,
    pub path_loss_db: f64,
    pub atmospheric_loss_db: f64,
}

/// One sample of an analyzed track: the underlying geometry plus the
/// signal quantities, which are only defined when `elevation_deg >= 0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnalyzedSample {
    pub epoch: DateTime<Utc>,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
    pub signal: Option<SignalSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedTrack {
    pub satellite_id: u32,
    pub name: String,
    pub constellation: Constellation,
    pub samples: Vec<AnalyzedSample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    A4,
    A5,
    D2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EventParameters {
    pub serving_rsrp_dbm: f64,
    pub neighbour_rsrp_dbm: f64,
    pub serving_range_km: f64,
    pub neighbour_range_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoverEvent {
    pub event_type: EventType,
    pub triggered_at: DateTime<Utc>,
    pub serving_satellite_id: u32,
    pub neighbour_satellite_id: u32,
    pub parameters: EventParameters,
    pub priority: Priority,
}

/// Run the link budget over every sample of `track`.
pub fn analyze_track(
    track: &SatelliteTrack,
    params: &LinkBudgetParams,
    atm_model: &dyn AtmosphericLossModel,
) -> Result<AnalyzedTrack> {
    if track.samples.is_empty() {
        return Err(AnalyzerError::EmptyTrack(track.satellite_id));
    }

    let eirp_dbm = match track.constellation {
        Constellation::Starlink => params.starlink_eirp_dbm,
        Constellation::OneWeb => params.oneweb_eirp_dbm,
    };

    let samples = track
        .samples
        .iter()
        .map(|sample| {
            let signal = if sample.look.elevation_deg >= 0.0 {
                Some(link_budget::compute_signal(
                    sample.look.elevation_deg,
                    sample.look.range_km,
                    eirp_dbm,
                    params.downlink_frequency_ghz,
                    atm_model,
                ))
            } else {
                None
            };

            AnalyzedSample {
                epoch: sample.epoch,
                azimuth_deg: sample.look.azimuth_deg,
                elevation_deg: sample.look.elevation_deg,
                range_km: sample.look.range_km,
                signal,
            }
        })
        .collect();

    Ok(AnalyzedTrack {
        satellite_id: track.satellite_id,
        name: track.name.clone(),
        constellation: track.constellation,
        samples,
    })
}

/// Analyze every track and detect events across all same-constellation
/// (serving, neighbour) pairs. Cross-constellation pairs are skipped by
/// construction — the outer loop only ever pairs tracks sharing a
/// constellation.
pub fn analyze_constellation(
    tracks: &[SatelliteTrack],
    config: &Config,
    atm_model: &dyn AtmosphericLossModel,
) -> Result<(Vec<AnalyzedTrack>, Vec<HandoverEvent>)> {
    let analyzed: Vec<AnalyzedTrack> = tracks
        .iter()
        .map(|t| analyze_track(t, &config.link_budget, atm_model))
        .collect::<Result<Vec<_>>>()?;

    let mut events = Vec::new();
    for serving in &analyzed {
        for neighbour in &analyzed {
            if serving.satellite_id == neighbour.satellite_id {
                continue;
            }
            if serving.constellation != neighbour.constellation {
                continue;
            }
            events.extend(detect_events_for_pair(
                serving,
                neighbour,
                &config.event_thresholds,
            ));
        }
    }

    events.sort_by_key(|e| e.triggered_at);

    Ok((analyzed, events))
}
