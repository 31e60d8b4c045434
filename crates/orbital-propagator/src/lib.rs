//! Orbital Propagator
//!
//! SGP4 propagation of validated TLE records over a fixed analysis window,
//! producing per-sample ECI state, geodetic subpoint, and topocentric
//! look angles (azimuth/elevation/range) relative to a single ground
//! observer. Grounded on this workspace's original SGP4 wrapper; the
//! Walker-Delta synthetic-constellation generator that wrapper carried is
//! not needed here since every satellite originates from a real TLE file.

use chrono::{DateTime, Duration, Utc};
use pipeline_config::{AnalysisWindow, Observer};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tle_loader::{Constellation, TLEFile, TLERecord};
use tracing::debug;

#[derive(Error, Debug)]
pub enum PropagationError {
    #[error("invalid TLE for satellite {0}: {1}")]
    InvalidTle(u32, String),
    #[error("SGP4 propagation failed for satellite {0} at sample {1}: {2}")]
    PropagationFailed(u32, usize, String),
}

pub type Result<T> = std::result::Result<T, PropagationError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateVector {
    pub position_x_km: f64,
    pub position_y_km: f64,
    pub position_z_km: f64,
    pub velocity_x_km_s: f64,
    pub velocity_y_km_s: f64,
    pub velocity_z_km_s: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

/// Azimuth/elevation/range as seen from the fixed ground observer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TopocentricLook {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PropagatedSample {
    pub epoch: DateTime<Utc>,
    pub state: StateVector,
    pub subpoint: GeodeticPosition,
    pub look: TopocentricLook,
}

/// One satellite's full ordered sample sequence over the analysis window,
/// plus the TLE-derived orbital elements the suitability scorer needs
/// (carried here rather than re-joined later, since the record that
/// produced this track is otherwise discarded after propagation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteTrack {
    pub satellite_id: u32,
    pub name: String,
    pub constellation: Constellation,
    pub inclination_deg: f64,
    pub eccentricity: f64,
    pub mean_motion_orbits_day: f64,
    pub samples: Vec<PropagatedSample>,
}

/// Propagate a single TLE record over `window`, starting at `base_time`,
/// against `observer`. Samples are produced in strict chronological order.
pub fn propagate_track(
    record: &TLERecord,
    constellation: Constellation,
    window: &AnalysisWindow,
    base_time: DateTime<Utc>,
    observer: &Observer,
) -> Result<SatelliteTrack> {
    let elements = sgp4::Elements::from_tle(
        None,
        record.line1.as_bytes(),
        record.line2.as_bytes(),
    )
    .map_err(|e| PropagationError::InvalidTle(record.satellite_id, format!("{:?}", e)))?;

    let constants = sgp4::Constants::from_elements(&elements)
        .map_err(|e| PropagationError::InvalidTle(record.satellite_id, format!("{:?}", e)))?;

    let epoch_utc = DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc);
    let observer_ecef = transforms::geodetic_to_ecef(&GeodeticPosition {
        latitude_deg: observer.latitude_deg,
        longitude_deg: observer.longitude_deg,
        altitude_km: observer.altitude_m / 1000.0,
    });

    let sample_count = window.sample_count();
    let mut samples = Vec::with_capacity(sample_count);

    for i in 0..sample_count {
        let t = base_time + Duration::seconds(i as i64 * window.cadence_seconds);
        let minutes_since_epoch = t.signed_duration_since(epoch_utc).num_seconds() as f64 / 60.0;

        let prediction = constants.propagate(minutes_since_epoch).map_err(|e| {
            PropagationError::PropagationFailed(record.satellite_id, i, format!("{:?}", e))
        })?;

        let state = StateVector {
            position_x_km: prediction.position[0],
            position_y_km: prediction.position[1],
            position_z_km: prediction.position[2],
            velocity_x_km_s: prediction.velocity[0],
            velocity_y_km_s: prediction.velocity[1],
            velocity_z_km_s: prediction.velocity[2],
        };

        let ecef = transforms::eci_to_ecef(
            state.position_x_km,
            state.position_y_km,
            state.position_z_km,
            t,
        );
        let subpoint = transforms::ecef_to_geodetic(ecef);
        let look = transforms::ecef_to_topocentric(ecef, observer_ecef, observer);

        samples.push(PropagatedSample {
            epoch: t,
            state,
            subpoint,
            look,
        });
    }

    debug!(
        "Propagated satellite {} ({:?}) over {} samples",
        record.satellite_id, constellation, sample_count
    );

    Ok(SatelliteTrack {
        satellite_id: record.satellite_id,
        name: record.name.clone(),
        constellation,
        inclination_deg: record.inclination_deg,
        eccentricity: record.eccentricity,
        mean_motion_orbits_day: record.mean_motion_orbits_day,
        samples,
    })
}

/// Propagate every record in a loaded catalogue in parallel, one worker
/// per satellite. Each worker owns its whole track end to end, so
/// parallelism across satellites cannot reorder samples within a track.
pub fn propagate_catalogue(
    catalogue: &std::collections::HashMap<Constellation, TLEFile>,
    window: &AnalysisWindow,
    base_time: DateTime<Utc>,
    observer: &Observer,
) -> Result<Vec<SatelliteTrack>> {
    let records: Vec<(Constellation, &TLERecord)> = catalogue
        .iter()
        .flat_map(|(c, file)| file.records.iter().map(move |r| (*c, r)))
        .collect();

    records
        .par_iter()
        .map(|(constellation, record)| {
            propagate_track(record, *constellation, window, base_time, observer)
        })
        .collect()
}

pub mod transforms {
    use super::GeodeticPosition;
    use super::TopocentricLook;
    use chrono::{DateTime, Utc};
    use pipeline_config::Observer;

    const EARTH_RADIUS_KM: f64 = 6378.137;
    const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;

    /// Greenwich Mean Sidereal Time at `epoch`, in radians. IAU 1982 model.
    fn gmst_rad(epoch: DateTime<Utc>) -> f64 {
        let j2000 = DateTime::<Utc>::from_naive_utc_and_offset(
            chrono::NaiveDate::from_ymd_opt(2000, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            Utc,
        );
        let jd = 2_451_545.0
            + epoch.signed_duration_since(j2000).num_milliseconds() as f64 / 86_400_000.0;
        let t = (jd - 2_451_545.0) / 36525.0;

        let gmst_sec = 67_310.548_41
            + (876_600.0 * 3600.0 + 8_640_184.812_866) * t
            + 0.093_104 * t * t
            - 6.2e-6 * t * t * t;

        let gmst_deg = gmst_sec.rem_euclid(86_400.0) / 240.0;
        gmst_deg.to_radians()
    }

    /// Rotate an ECI position vector into ECEF by undoing Earth's rotation
    /// since the vernal-equinox reference, using GMST at `epoch`.
    pub fn eci_to_ecef(x: f64, y: f64, z: f64, epoch: DateTime<Utc>) -> (f64, f64, f64) {
        let theta = gmst_rad(epoch);
        let (sin_t, cos_t) = theta.sin_cos();
        let x_ecef = x * cos_t + y * sin_t;
        let y_ecef = -x * sin_t + y * cos_t;
        (x_ecef, y_ecef, z)
    }

    /// Iterative (Bowring) ECEF-to-geodetic conversion on the WGS-84
    /// reference ellipsoid.
    pub fn ecef_to_geodetic(ecef: (f64, f64, f64)) -> GeodeticPosition {
        let (x, y, z) = ecef;
        let a = EARTH_RADIUS_KM;
        let f = EARTH_FLATTENING;
        let e2 = f * (2.0 - f);

        let longitude = y.atan2(x);
        let p = (x * x + y * y).sqrt();

        let mut lat = z.atan2(p * (1.0 - e2));
        let mut n = a;
        for _ in 0..5 {
            let sin_lat = lat.sin();
            n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
            lat = (z + e2 * n * sin_lat).atan2(p);
        }
        let altitude_km = p / lat.cos() - n;

        GeodeticPosition {
            latitude_deg: lat.to_degrees(),
            longitude_deg: longitude.to_degrees(),
            altitude_km,
        }
    }

    /// Geodetic to ECEF (used once per track to place the fixed observer).
    pub fn geodetic_to_ecef(pos: &GeodeticPosition) -> (f64, f64, f64) {
        let lat_rad = pos.latitude_deg.to_radians();
        let lon_rad = pos.longitude_deg.to_radians();
        let f = EARTH_FLATTENING;
        let e2 = f * (2.0 - f);

        let n = EARTH_RADIUS_KM / (1.0 - e2 * lat_rad.sin().powi(2)).sqrt();

        let x = (n + pos.altitude_km) * lat_rad.cos() * lon_rad.cos();
        let y = (n + pos.altitude_km) * lat_rad.cos() * lon_rad.sin();
        let z = (n * (1.0 - e2) + pos.altitude_km) * lat_rad.sin();

        (x, y, z)
    }

    /// Azimuth/elevation/range of an ECEF point as seen from `observer_ecef`,
    /// via the East-North-Up rotation at the observer's geodetic latitude
    /// and longitude.
    pub fn ecef_to_topocentric(
        target_ecef: (f64, f64, f64),
        observer_ecef: (f64, f64, f64),
        observer: &Observer,
    ) -> TopocentricLook {
        let dx = target_ecef.0 - observer_ecef.0;
        let dy = target_ecef.1 - observer_ecef.1;
        let dz = target_ecef.2 - observer_ecef.2;

        let lat_rad = observer.latitude_deg.to_radians();
        let lon_rad = observer.longitude_deg.to_radians();
        let (sin_lat, cos_lat) = lat_rad.sin_cos();
        let (sin_lon, cos_lon) = lon_rad.sin_cos();

        let east = -dx * sin_lon + dy * cos_lon;
        let north = -dx * sin_lat * cos_lon - dy * sin_lat * sin_lon + dz * cos_lat;
        let up = dx * cos_lat * cos_lon + dy * cos_lat * sin_lon + dz * sin_lat;

        let range_km = (east * east + north * north + up * up).sqrt();
        let elevation_deg = (up / range_km).asin().to_degrees();
        let azimuth_deg = east.atan2(north).to_degrees().rem_euclid(360.0);

        TopocentricLook {
            azimuth_deg,
            elevation_deg,
            range_km,
        }
    }
}
