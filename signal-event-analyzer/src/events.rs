//! 3GPP TS 38.331 A4/A5/D2 event detection.
//!
//! One priority rule, evaluated in order, per sample index shared by a
//! (serving, neighbour) pair: `A5 ⇒ HIGH`, else `A4 ⇒ MEDIUM`, else
//! `D2 ⇒ LOW`. No event is emitted when none fire.

use crate::{AnalyzedTrack, EventParameters, EventType, HandoverEvent, Priority};
use pipeline_config::EventThresholds;

/// RSRP used for a sample with no signal (below the horizon) — far
/// below any realistic threshold, so such a sample can never look like
/// a good neighbour or a healthy serving cell.
const NO_SIGNAL_RSRP_DBM: f64 = -999.0;

pub fn detect_events_for_pair(
    serving: &AnalyzedTrack,
    neighbour: &AnalyzedTrack,
    thresholds: &EventThresholds,
) -> Vec<HandoverEvent> {
    let sample_count = serving.samples.len().min(neighbour.samples.len());
    let mut events = Vec::new();

    for i in 0..sample_count {
        let s = &serving.samples[i];
        let n = &neighbour.samples[i];

        let serving_rsrp_dbm = s.signal.map(|sig| sig.rsrp_dbm).unwrap_or(NO_SIGNAL_RSRP_DBM);
        let neighbour_rsrp_dbm = n.signal.map(|sig| sig.rsrp_dbm).unwrap_or(NO_SIGNAL_RSRP_DBM);

        let parameters = EventParameters {
            serving_rsrp_dbm,
            neighbour_rsrp_dbm,
            serving_range_km: s.range_km,
            neighbour_range_km: n.range_km,
        };

        let a5_fires = serving_rsrp_dbm + thresholds.hysteresis_db < thresholds.a5_threshold_serving_dbm
            && neighbour_rsrp_dbm - thresholds.hysteresis_db > thresholds.a5_threshold_neighbour_dbm;

        let a4_fires = neighbour_rsrp_dbm - thresholds.hysteresis_db > thresholds.a4_threshold_dbm;

        let d2_fires =
            s.range_km > thresholds.d2_serving_km && n.range_km < thresholds.d2_neighbour_km;

        let (event_type, priority) = if a5_fires {
            (EventType::A5, Priority::High)
        } else if a4_fires {
            (EventType::A4, Priority::Medium)
        } else if d2_fires {
            (EventType::D2, Priority::Low)
        } else {
            continue;
        };

        events.push(HandoverEvent {
            event_type,
            triggered_at: s.epoch,
            serving_satellite_id: serving.satellite_id,
            neighbour_satellite_id: neighbour.satellite_id,
            parameters,
            priority,
        });
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnalyzedSample, SignalSample};
    use chrono::{TimeZone, Utc};
    use tle_loader::Constellation;

    fn sample(epoch_offset_s: i64, elevation_deg: f64, range_km: f64, rsrp_dbm: Option<f64>) -> AnalyzedSample {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        AnalyzedSample {
            epoch: base + chrono::Duration::seconds(epoch_offset_s),
            azimuth_deg: 90.0,
            elevation_deg,
            range_km,
            signal: rsrp_dbm.map(|rsrp_dbm| SignalSample {
                rsrp_dbm,
                rsrq_db: -10.0,
                sinr_db: 10.0,
                path_loss_db: 180.0,
                atmospheric_loss_db: 0.3,
            }),
        }
    }

    fn track(satellite_id: u32, samples: Vec<AnalyzedSample>) -> AnalyzedTrack {
        AnalyzedTrack {
            satellite_id,
            name: format!("SAT-{}", satellite_id),
            constellation: Constellation::Starlink,
            samples,
        }
    }

    #[test]
    fn test_a4_fires_when_neighbour_strong() {
        let serving = track(1, vec![sample(0, 45.0, 1000.0, Some(-105.0))]);
        let neighbour = track(2, vec![sample(0, 45.0, 900.0, Some(-95.0))]);
        let thresholds = EventThresholds::default();

        let events = detect_events_for_pair(&serving, &neighbour, &thresholds);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::A4);
        assert_eq!(events[0].priority, Priority::Medium);
    }

    #[test]
    fn test_a4_not_triggered_at_exact_threshold() {
        let thresholds = EventThresholds::default();
        let neighbour_rsrp = thresholds.a4_threshold_dbm + thresholds.hysteresis_db;
        let serving = track(1, vec![sample(0, 45.0, 1000.0, Some(-105.0))]);
        let neighbour = track(2, vec![sample(0, 45.0, 900.0, Some(neighbour_rsrp))]);

        let events = detect_events_for_pair(&serving, &neighbour, &thresholds);
        assert!(events.is_empty());
    }

    #[test]
    fn test_a5_fires_on_serving_degradation() {
        let serving = track(1, vec![sample(0, 3.0, 1800.0, Some(-115.0))]);
        let neighbour = track(2, vec![sample(0, 70.0, 600.0, Some(-90.0))]);
        let thresholds = EventThresholds::default();

        let events = detect_events_for_pair(&serving, &neighbour, &thresholds);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::A5);
        assert_eq!(events[0].priority, Priority::High);
    }

    #[test]
    fn test_d2_fires_on_distance() {
        let serving = track(1, vec![sample(0, 5.0, 5500.0, Some(-120.0))]);
        let neighbour = track(2, vec![sample(0, 50.0, 2800.0, Some(-120.0))]);
        let thresholds = EventThresholds::default();

        let events = detect_events_for_pair(&serving, &neighbour, &thresholds);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::D2);
        assert_eq!(events[0].priority, Priority::Low);
    }

    #[test]
    fn test_no_d2_when_both_within_range() {
        let serving = track(1, vec![sample(0, 45.0, 2000.0, Some(-100.0))]);
        let neighbour = track(2, vec![sample(0, 45.0, 2000.0, Some(-120.0))]);
        let thresholds = EventThresholds::default();

        let events = detect_events_for_pair(&serving, &neighbour, &thresholds);
        assert!(events.is_empty());
    }

    #[test]
    fn test_a5_outranks_a4_and_d2_when_all_would_fire() {
        // serving poor + far, neighbour strong + near: A5, A4 and D2
        // conditions are all satisfiable; A5 must win.
        let serving = track(1, vec![sample(0, 2.0, 5200.0, Some(-115.0))]);
        let neighbour = track(2, vec![sample(0, 70.0, 2500.0, Some(-90.0))]);
        let thresholds = EventThresholds::default();

        let events = detect_events_for_pair(&serving, &neighbour, &thresholds);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::A5);
    }
}
