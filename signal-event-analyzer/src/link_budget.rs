//! Ku-band (12 GHz) LEO downlink link budget.
//!
//! `rsrp_dbm = EIRP − FSPL + elevation_gain − atmospheric_loss`, with
//! RSRQ and SINR derived as monotonic functions of elevation, bounded to
//! their 3GPP measurement ranges.

use crate::SignalSample;

const RSRQ_MIN_DB: f64 = -43.0;
const RSRQ_MAX_DB: f64 = 20.0;
const SINR_MIN_DB: f64 = -23.0;
const SINR_MAX_DB: f64 = 40.0;

/// Pluggable atmospheric-loss term. `ElevationLinearModel` is the
/// default (spec §9 open question); an ITU-R P.618 implementation can
/// replace it without touching any call site.
pub trait AtmosphericLossModel: Send + Sync {
    fn loss_db(&self, elevation_deg: f64, rain_rate_mm_h: Option<f64>) -> f64;
}

/// Zenith loss decaying linearly to zero at the horizon, with an
/// optional additive rain-rate penalty. Clear sky (`rain_rate = None`)
/// by default.
#[derive(Debug, Clone, Copy)]
pub struct ElevationLinearModel {
    pub zenith_loss_db: f64,
    pub rain_loss_db_per_mm_h: f64,
}

impl Default for ElevationLinearModel {
    fn default() -> Self {
        Self {
            zenith_loss_db: 0.5,
            rain_loss_db_per_mm_h: 0.05,
        }
    }
}

impl AtmosphericLossModel for ElevationLinearModel {
    fn loss_db(&self, elevation_deg: f64, rain_rate_mm_h: Option<f64>) -> f64 {
        let elevation_fraction = (elevation_deg.max(0.0) / 90.0).min(1.0);
        let clear_sky_loss = self.zenith_loss_db * (1.0 - elevation_fraction);
        let rain_loss = rain_rate_mm_h.unwrap_or(0.0) * self.rain_loss_db_per_mm_h;
        clear_sky_loss + rain_loss
    }
}

fn free_space_path_loss_db(range_km: f64, frequency_ghz: f64) -> f64 {
    20.0 * range_km.log10() + 20.0 * frequency_ghz.log10() + 32.45
}

fn elevation_antenna_gain_db(elevation_deg: f64) -> f64 {
    (elevation_deg / 90.0).min(1.0).max(0.0) * 15.0
}

fn derive_rsrq_db(elevation_deg: f64) -> f64 {
    let fraction = (elevation_deg / 90.0).clamp(0.0, 1.0);
    RSRQ_MIN_DB + fraction * (RSRQ_MAX_DB - RSRQ_MIN_DB)
}

fn derive_sinr_db(elevation_deg: f64) -> f64 {
    let fraction = (elevation_deg / 90.0).clamp(0.0, 1.0);
    SINR_MIN_DB + fraction * (SINR_MAX_DB - SINR_MIN_DB)
}

pub fn compute_signal(
    elevation_deg: f64,
    range_km: f64,
    eirp_dbm: f64,
    frequency_ghz: f64,
    atm_model: &dyn AtmosphericLossModel,
) -> SignalSample {
    let path_loss_db = free_space_path_loss_db(range_km, frequency_ghz);
    let atmospheric_loss_db = atm_model.loss_db(elevation_deg, None);
    let elevation_gain_db = elevation_antenna_gain_db(elevation_deg);

    let rsrp_dbm = eirp_dbm - path_loss_db + elevation_gain_db - atmospheric_loss_db;

    SignalSample {
        rsrp_dbm,
        rsrq_db: derive_rsrq_db(elevation_deg),
        sinr_db: derive_sinr_db(elevation_deg),
        path_loss_db,
        atmospheric_loss_db,
    }
}
