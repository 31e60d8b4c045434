//! Observer & Config Service
//!
//! Single source of truth for observer coordinates, elevation thresholds,
//! scoring weights, and analysis-window parameters. Constructed once by
//! the orchestrator and threaded through every stage by shared reference;
//! nothing here is a global or a `lazy_static`.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid observer latitude {0}: must be in [-90, 90]")]
    InvalidLatitude(f64),
    #[error("invalid observer longitude {0}: must be in [-180, 180]")]
    InvalidLongitude(f64),
    #[error("elevation thresholds not monotonic: min={min} handover={handover} optimal={optimal}")]
    ThresholdsNotMonotonic { min: f64, handover: f64, optimal: f64 },
    #[error("analysis window duration {duration_s}s is not a multiple of cadence {cadence_s}s")]
    WindowNotDivisible { duration_s: i64, cadence_s: i64 },
    #[error("constellation target for {constellation} has min_visible ({min_visible}) > pool_size ({pool_size})")]
    TargetInfeasible {
        constellation: String,
        min_visible: usize,
        pool_size: usize,
    },
    #[error("suitability weights sum to {0:.6}, expected ~1.0")]
    WeightsDoNotSumToOne(f64),
    #[error("IO error loading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error loading config: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Fixed ground reference from which visibility is computed. Default is NTPU.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Observer {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
}

impl Default for Observer {
    fn default() -> Self {
        // NTPU: 24.9441667N, 121.3713889E, 50m
        Self {
            latitude_deg: 24.944_166_7,
            longitude_deg: 121.371_388_9,
            altitude_m: 50.0,
        }
    }
}

impl Observer {
    fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude_deg) || !self.latitude_deg.is_finite() {
            return Err(ConfigError::InvalidLatitude(self.latitude_deg));
        }
        if !(-180.0..=180.0).contains(&self.longitude_deg) || !self.longitude_deg.is_finite() {
            return Err(ConfigError::InvalidLongitude(self.longitude_deg));
        }
        Ok(())
    }
}

/// Layered elevation thresholds (degrees). Must be strictly increasing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ElevationThresholds {
    pub minimum_deg: f64,
    pub handover_deg: f64,
    pub optimal_deg: f64,
}

impl Default for ElevationThresholds {
    fn default() -> Self {
        Self {
            minimum_deg: 5.0,
            handover_deg: 10.0,
            optimal_deg: 15.0,
        }
    }
}

impl ElevationThresholds {
    fn validate(&self) -> Result<()> {
        if !(self.minimum_deg < self.handover_deg && self.handover_deg < self.optimal_deg) {
            return Err(ConfigError::ThresholdsNotMonotonic {
                min: self.minimum_deg,
                handover: self.handover_deg,
                optimal: self.optimal_deg,
            });
        }
        Ok(())
    }
}

/// Per-constellation dynamic-pool target: minimum simultaneous visible
/// candidates above `handover_deg`, and the target pool size to aim for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConstellationTarget {
    pub pool_size: usize,
    pub min_visible: usize,
}

impl ConstellationTarget {
    fn validate(&self, name: &str) -> Result<()> {
        if self.min_visible > self.pool_size {
            return Err(ConfigError::TargetInfeasible {
                constellation: name.to_string(),
                min_visible: self.min_visible,
                pool_size: self.pool_size,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConstellationTargets {
    pub starlink: ConstellationTarget,
    pub oneweb: ConstellationTarget,
}

impl Default for ConstellationTargets {
    fn default() -> Self {
        Self {
            starlink: ConstellationTarget {
                pool_size: 120,
                min_visible: 10,
            },
            oneweb: ConstellationTarget {
                pool_size: 36,
                min_visible: 3,
            },
        }
    }
}

/// Weights for the Stage 2 suitability score. Sum should be ~1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SuitabilityWeights {
    pub inclination: f64,
    pub altitude: f64,
    pub eccentricity: f64,
    pub pass_frequency: f64,
    pub constellation: f64,
}

impl Default for SuitabilityWeights {
    fn default() -> Self {
        Self {
            inclination: 0.25,
            altitude: 0.20,
            eccentricity: 0.15,
            pass_frequency: 0.20,
            constellation: 0.20,
        }
    }
}

impl SuitabilityWeights {
    fn validate(&self) -> Result<()> {
        let total = self.inclination
            + self.altitude
            + self.eccentricity
            + self.pass_frequency
            + self.constellation;
        if (total - 1.0).abs() > 0.01 {
            return Err(ConfigError::WeightsDoNotSumToOne(total));
        }
        Ok(())
    }
}

/// Constellation-specific profile the suitability scorer targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OrbitProfile {
    pub target_inclination_deg: f64,
    pub target_altitude_km: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OrbitProfiles {
    pub starlink: OrbitProfile,
    pub oneweb: OrbitProfile,
}

impl Default for OrbitProfiles {
    fn default() -> Self {
        Self {
            starlink: OrbitProfile {
                target_inclination_deg: 53.0,
                target_altitude_km: 550.0,
            },
            oneweb: OrbitProfile {
                target_inclination_deg: 87.0,
                target_altitude_km: 1200.0,
            },
        }
    }
}

/// Link-budget inputs for the Stage 3 signal model (spec §4.5 calls the
/// transmit EIRP "constellation-tunable", so it lives here per
/// constellation rather than as a hardcoded constant).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LinkBudgetParams {
    pub starlink_eirp_dbm: f64,
    pub oneweb_eirp_dbm: f64,
    pub downlink_frequency_ghz: f64,
}

impl Default for LinkBudgetParams {
    fn default() -> Self {
        Self {
            starlink_eirp_dbm: 43.0,
            oneweb_eirp_dbm: 43.0,
            downlink_frequency_ghz: 12.0,
        }
    }
}

/// 3GPP A4/A5/D2 thresholds and hysteresis (spec §4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EventThresholds {
    pub a4_threshold_dbm: f64,
    pub a5_threshold_serving_dbm: f64,
    pub a5_threshold_neighbour_dbm: f64,
    pub d2_serving_km: f64,
    pub d2_neighbour_km: f64,
    pub hysteresis_db: f64,
}

impl Default for EventThresholds {
    fn default() -> Self {
        Self {
            a4_threshold_dbm: -100.0,
            a5_threshold_serving_dbm: -110.0,
            a5_threshold_neighbour_dbm: -100.0,
            d2_serving_km: 5000.0,
            d2_neighbour_km: 3000.0,
            hysteresis_db: 3.0,
        }
    }
}

/// Analysis window: contiguous UTC interval over which orbits are
/// propagated and events analysed, at a fixed sample cadence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AnalysisWindow {
    pub duration_seconds: i64,
    pub cadence_seconds: i64,
}

impl AnalysisWindow {
    /// Canonical reference window: 6 hours at 30s cadence (721 samples).
    /// This is the default used throughout the pipeline (see SPEC_FULL.md).
    pub fn six_hour_reference() -> Self {
        Self {
            duration_seconds: 6 * 3600,
            cadence_seconds: 30,
        }
    }

    /// Alternate single-orbit window: 96 minutes at 30s cadence (192 samples).
    pub fn single_orbit() -> Self {
        Self {
            duration_seconds: 96 * 60,
            cadence_seconds: 30,
        }
    }

    pub fn custom(duration_seconds: i64, cadence_seconds: i64) -> Result<Self> {
        let window = Self {
            duration_seconds,
            cadence_seconds,
        };
        window.validate()?;
        Ok(window)
    }

    fn validate(&self) -> Result<()> {
        if self.cadence_seconds <= 0 || self.duration_seconds <= 0 {
            return Err(ConfigError::WindowNotDivisible {
                duration_s: self.duration_seconds,
                cadence_s: self.cadence_seconds,
            });
        }
        if self.duration_seconds % self.cadence_seconds != 0 {
            return Err(ConfigError::WindowNotDivisible {
                duration_s: self.duration_seconds,
                cadence_s: self.cadence_seconds,
            });
        }
        Ok(())
    }

    /// Number of samples covering the window, inclusive of both endpoints.
    pub fn sample_count(&self) -> usize {
        (self.duration_seconds / self.cadence_seconds) as usize + 1
    }
}

impl Default for AnalysisWindow {
    fn default() -> Self {
        Self::six_hour_reference()
    }
}

/// Top-level pipeline configuration. Immutable within a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub observer: Observer,
    pub elevation_thresholds: ElevationThresholds,
    pub constellation_targets: ConstellationTargets,
    pub suitability_weights: SuitabilityWeights,
    pub orbit_profiles: OrbitProfiles,
    pub event_thresholds: EventThresholds,
    pub link_budget: LinkBudgetParams,
    pub analysis_window: AnalysisWindow,
    /// Minimum fraction of valid TLE records required to proceed (spec §4.2).
    pub min_valid_tle_ratio: f64,
    /// Maximum age in days of a TLE data epoch relative to the "as-of" date.
    pub max_tle_epoch_age_days: i64,
    /// Upper/lower bound on Stage 2 candidate set size, per constellation.
    pub min_pool_size: usize,
    pub max_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            observer: Observer::default(),
            elevation_thresholds: ElevationThresholds::default(),
            constellation_targets: ConstellationTargets::default(),
            suitability_weights: SuitabilityWeights::default(),
            orbit_profiles: OrbitProfiles::default(),
            event_thresholds: EventThresholds::default(),
            link_budget: LinkBudgetParams::default(),
            analysis_window: AnalysisWindow::default(),
            min_valid_tle_ratio: 0.95,
            max_tle_epoch_age_days: 30,
            min_pool_size: 50,
            max_pool_size: 1100,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.observer.validate()?;
        self.elevation_thresholds.validate()?;
        self.suitability_weights.validate()?;
        self.constellation_targets.starlink.validate("starlink")?;
        self.constellation_targets.oneweb.validate("oneweb")?;
        self.analysis_window.validate()?;
        Ok(())
    }
}
