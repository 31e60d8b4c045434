//! TLE Loader
//!
//! Scans a local `<root>/<constellation>/tle/<constellation>_YYYYMMDD.tle`
//! tree, parses trios of lines, validates TLE format and checksum, and
//! exposes an immutable, constellation-partitioned catalogue. Grounded on
//! the checksum algorithm and fixed-width TLE line construction in this
//! workspace's orbital propagator (`walker::tle_checksum`/`format_tle_line*`),
//! read in the reverse direction (parsing instead of generating).

use chrono::{Duration, NaiveDate, NaiveDateTime};
use pipeline_config::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("no TLE files found under {0:?}")]
    TleMissing(PathBuf),
    #[error("TLE validation failure: {0}")]
    TleFormat(String),
    #[error("TLE data epoch for {constellation:?} ({epoch}) is {age_days} days old, exceeds max {max_days}")]
    TleEpochStale {
        constellation: Constellation,
        epoch: NaiveDate,
        age_days: i64,
        max_days: i64,
    },
    #[error("valid-record ratio {ratio:.3} for {constellation:?} is below the {min_ratio:.3} gate")]
    InsufficientValidRatio {
        constellation: Constellation,
        ratio: f64,
        min_ratio: f64,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// The two constellations this pipeline ever reasons about. Closed and
/// tagged rather than a free-form string: downstream strict partitioning
/// (spec §4.2, §4.4) depends on there being no third value to confuse with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constellation {
    Starlink,
    OneWeb,
}

impl Constellation {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Constellation::Starlink => "starlink",
            Constellation::OneWeb => "oneweb",
        }
    }

    pub fn all() -> [Constellation; 2] {
        [Constellation::Starlink, Constellation::OneWeb]
    }
}

/// A single validated TLE record. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TLERecord {
    pub satellite_id: u32,
    pub name: String,
    pub line1: String,
    pub line2: String,
    pub epoch: NaiveDateTime,
    pub inclination_deg: f64,
    pub right_ascension_deg: f64,
    pub eccentricity: f64,
    pub argument_of_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    pub mean_motion_orbits_day: f64,
}

/// All TLE records for one constellation, keyed to the calendar date
/// embedded in the source filename. That data epoch, not the wall clock,
/// is the time base for every downstream orbital calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TLEFile {
    pub constellation: Constellation,
    pub data_epoch: NaiveDate,
    pub records: Vec<TLERecord>,
    pub report: LoadReport,
}

/// Counts of what happened while parsing one constellation's TLE file(s).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoadReport {
    pub parsed: usize,
    pub skipped_malformed: usize,
    pub skipped_checksum: usize,
    pub skipped_epoch_insane: usize,
}

impl LoadReport {
    pub fn total_seen(&self) -> usize {
        self.parsed + self.skipped_malformed + self.skipped_checksum + self.skipped_epoch_insane
    }

    pub fn valid_ratio(&self) -> f64 {
        let total = self.total_seen();
        if total == 0 {
            0.0
        } else {
            self.parsed as f64 / total as f64
        }
    }
}

/// Load every constellation directory under `root`, validating against
/// `config`. `as_of` is the pipeline's configured "as-of" date used for the
/// staleness check (spec §4.2 `TLEEpochStaleError`).
pub fn load_catalogue(
    root: impl AsRef<Path>,
    as_of: NaiveDate,
    config: &Config,
) -> Result<HashMap<Constellation, TLEFile>> {
    let root = root.as_ref();
    let mut catalogue = HashMap::new();

    for constellation in Constellation::all() {
        let tle_file = load_constellation(root, constellation, as_of, config)?;
        catalogue.insert(constellation, tle_file);
    }

    Ok(catalogue)
}

fn load_constellation(
    root: &Path,
    constellation: Constellation,
    as_of: NaiveDate,
    config: &Config,
) -> Result<TLEFile> {
    let tle_dir = root.join(constellation.dir_name()).join("tle");

    let mut files: Vec<PathBuf> = fs::read_dir(&tle_dir)
        .map_err(|_| LoaderError::TleMissing(tle_dir.clone()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("tle"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(LoaderError::TleMissing(tle_dir));
    }

    // Use the most recent file per the YYYYMMDD embedded in its name.
    let newest = files
        .iter()
        .filter_map(|p| extract_data_epoch(p).map(|epoch| (epoch, p)))
        .max_by_key(|(epoch, _)| *epoch)
        .ok_or_else(|| LoaderError::TleFormat(format!("no parseable filename under {:?}", tle_dir)))?;

    let (data_epoch, path) = newest;
    info!(
        "Loading {:?} TLEs from {:?} (data epoch {})",
        constellation, path, data_epoch
    );

    let age_days = (as_of - data_epoch).num_days();
    if age_days > config.max_tle_epoch_age_days {
        return Err(LoaderError::TleEpochStale {
            constellation,
            epoch: data_epoch,
            age_days,
            max_days: config.max_tle_epoch_age_days,
        });
    }

    let text = fs::read_to_string(path)?;
    let (records, report) = parse_tle_trios(&text, data_epoch, config.max_tle_epoch_age_days);

    let ratio = report.valid_ratio();
    if ratio < config.min_valid_tle_ratio {
        return Err(LoaderError::InsufficientValidRatio {
            constellation,
            ratio,
            min_ratio: config.min_valid_tle_ratio,
        });
    }

    info!(
        "{:?}: parsed {} records, skipped {} malformed, {} checksum, {} epoch-insane (ratio {:.3})",
        constellation,
        report.parsed,
        report.skipped_malformed,
        report.skipped_checksum,
        report.skipped_epoch_insane,
        ratio
    );

    Ok(TLEFile {
        constellation,
        data_epoch,
        records,
        report,
    })
}

/// Extract the `YYYYMMDD` date embedded in `<constellation>_YYYYMMDD.tle`.
fn extract_data_epoch(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    let digits: String = stem.chars().rev().take(8).collect::<String>().chars().rev().collect();
    if digits.len() != 8 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(&digits, "%Y%m%d").ok()
}

/// Parse the file body as name/line1/line2 trios, validating each.
fn parse_tle_trios(
    text: &str,
    data_epoch: NaiveDate,
    max_epoch_age_days: i64,
) -> (Vec<TLERecord>, LoadReport) {
    let lines: Vec<&str> = text.lines().collect();
    let mut records = Vec::new();
    let mut report = LoadReport::default();

    let mut i = 0;
    while i + 2 < lines.len() + 1 && i + 2 <= lines.len() {
        let name = lines[i].trim();
        let line1 = lines[i + 1];
        let line2 = lines[i + 2];
        i += 3;

        if name.is_empty() {
            continue;
        }

        match validate_and_parse(name, line1, line2) {
            Ok(record) => {
                let age = (data_epoch - record.epoch.date()).num_days().abs();
                if age > max_epoch_age_days {
                    report.skipped_epoch_insane += 1;
                    warn!("Skipping {} — epoch {} days from data epoch", name, age);
                    continue;
                }
                report.parsed += 1;
                records.push(record);
            }
            Err(TleValidationError::Checksum) => {
                report.skipped_checksum += 1;
            }
            Err(TleValidationError::Format(_)) => {
                report.skipped_malformed += 1;
            }
        }
    }

    (records, report)
}

enum TleValidationError {
    Format(String),
    Checksum,
}

fn validate_and_parse(
    name: &str,
    line1: &str,
    line2: &str,
) -> std::result::Result<TLERecord, TleValidationError> {
    let line1 = line1.trim_end();
    let line2 = line2.trim_end();

    if line1.len() != 69 || line2.len() != 69 {
        return Err(TleValidationError::Format(format!(
            "expected 69-char lines, got {} and {}",
            line1.len(),
            line2.len()
        )));
    }
    if !line1.starts_with('1') || !line2.starts_with('2') {
        return Err(TleValidationError::Format("wrong line numbers".to_string()));
    }

    if tle_checksum(line1) != last_digit(line1) || tle_checksum(line2) != last_digit(line2) {
        return Err(TleValidationError::Checksum);
    }

    let satellite_id: u32 = line1[2..7]
        .trim()
        .parse()
        .map_err(|_| TleValidationError::Format("bad norad id".to_string()))?;

    let epoch_year: i32 = line1[18..20]
        .trim()
        .parse()
        .map_err(|_| TleValidationError::Format("bad epoch year".to_string()))?;
    let epoch_day: f64 = line1[20..32]
        .trim()
        .parse()
        .map_err(|_| TleValidationError::Format("bad epoch day".to_string()))?;
    let full_year = if epoch_year < 57 { 2000 + epoch_year } else { 1900 + epoch_year };
    let epoch = NaiveDate::from_ymd_opt(full_year, 1, 1)
        .ok_or_else(|| TleValidationError::Format("bad epoch year".to_string()))?
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::seconds(((epoch_day - 1.0) * 86400.0).round() as i64);

    let inclination_deg: f64 = line2[8..16]
        .trim()
        .parse()
        .map_err(|_| TleValidationError::Format("bad inclination".to_string()))?;
    let right_ascension_deg: f64 = line2[17..25]
        .trim()
        .parse()
        .map_err(|_| TleValidationError::Format("bad raan".to_string()))?;
    let eccentricity: f64 = format!("0.{}", line2[26..33].trim())
        .parse()
        .map_err(|_| TleValidationError::Format("bad eccentricity".to_string()))?;
    let argument_of_perigee_deg: f64 = line2[34..42]
        .trim()
        .parse()
        .map_err(|_| TleValidationError::Format("bad argp".to_string()))?;
    let mean_anomaly_deg: f64 = line2[43..51]
        .trim()
        .parse()
        .map_err(|_| TleValidationError::Format("bad mean anomaly".to_string()))?;
    let mean_motion_orbits_day: f64 = line2[52..63]
        .trim()
        .parse()
        .map_err(|_| TleValidationError::Format("bad mean motion".to_string()))?;

    Ok(TLERecord {
        satellite_id,
        name: name.to_string(),
        line1: line1.to_string(),
        line2: line2.to_string(),
        epoch,
        inclination_deg,
        right_ascension_deg,
        eccentricity,
        argument_of_perigee_deg,
        mean_anomaly_deg,
        mean_motion_orbits_day,
    })
}

fn last_digit(line: &str) -> u8 {
    line.as_bytes()[68] - b'0'
}

/// Modulo-10 TLE checksum over the first 68 characters: digits count as
/// themselves, '-' counts as 1, everything else counts as 0.
fn tle_checksum(line: &str) -> u8 {
    (line
        .bytes()
        .take(68)
        .map(|b| {
            if b.is_ascii_digit() {
                (b - b'0') as u16
            } else if b == b'-' {
                1u16
            } else {
                0u16
            }
        })
        .sum::<u16>()
        % 10) as u8
}
