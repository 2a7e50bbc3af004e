#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Online presence computation.
//!
//! Joins the offline ridership profiles and crime risk with one cycle's live
//! signals and produces a [`PresenceSnapshot`]: per-station modulated
//! ridership, anomaly flag, crime risk and safety tier, plus system-wide
//! totals. The computation reads its inputs only and holds no state, so any
//! number of cycles may run concurrently against the same
//! [`ModelSnapshot`].

pub mod anomaly;
pub mod model;
pub mod modulation;
pub mod policy;

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime, Timelike};
use transit_safety_crime_models::StationCrimeRisk;
use transit_safety_presence_models::{
    LiveSignalSnapshot, PresenceConfig, PresenceRecord, PresenceSnapshot, SafetyCounts, is_night,
};
use transit_safety_station_models::StationProfile;

pub use model::{ModelHandle, ModelSnapshot};

/// Computes presence for every station in `profiles` at `now`.
///
/// Stations only present in the live signals are ignored. A station with
/// no crime risk entry reads as zero risk. Missing live signals degrade
/// independently: no trains leaves the baseline, no weather is a `1.0`
/// multiplier, no disruption means no escalation.
#[must_use]
pub fn compute_presence(
    profiles: &BTreeMap<String, StationProfile>,
    crime_risk: &BTreeMap<String, StationCrimeRisk>,
    live: &LiveSignalSnapshot,
    now: NaiveDateTime,
    config: &PresenceConfig,
) -> PresenceSnapshot {
    let hour = now.hour();
    let day = now.weekday().num_days_from_monday();
    let night_mode = is_night(hour);
    let weather_multiplier = config.weather.multiplier(live.weather.as_ref());

    let mut stations: Vec<PresenceRecord> = profiles
        .iter()
        .map(|(id, profile)| {
            station_record(
                id,
                profile,
                crime_risk.get(id),
                live,
                (day as usize, hour),
                weather_multiplier,
                config,
            )
        })
        .collect();

    stations.sort_by(|a, b| {
        b.ridership
            .cmp(&a.ridership)
            .then_with(|| a.station_id.cmp(&b.station_id))
    });

    let mut snapshot = PresenceSnapshot {
        generated_at: now,
        hour,
        day_of_week: day,
        night_mode,
        weather_condition: live.weather.as_ref().map(|w| w.condition.clone()),
        weather_multiplier,
        total_ridership: 0,
        station_count: 0,
        anomaly_count: 0,
        disrupted_count: 0,
        safety_counts: SafetyCounts::default(),
        model_generation: 0,
        stations: Vec::new(),
    };
    for record in &stations {
        snapshot.total_ridership += u64::from(record.ridership);
        snapshot.station_count += 1;
        snapshot.anomaly_count += u32::from(record.anomaly);
        snapshot.disrupted_count += u32::from(record.disrupted);
        snapshot.safety_counts.record(record.safety_level);
    }
    snapshot.stations = stations;

    log::debug!(
        "Presence at {now}: {} stations, {} riders, {} anomalies, {}/{}/{} safe/caution/avoid",
        snapshot.station_count,
        snapshot.total_ridership,
        snapshot.anomaly_count,
        snapshot.safety_counts.safe,
        snapshot.safety_counts.caution,
        snapshot.safety_counts.avoid,
    );

    snapshot
}

impl ModelSnapshot {
    /// Runs [`compute_presence`] against this snapshot and stamps the
    /// snapshot's generation on the result.
    #[must_use]
    pub fn compute(
        &self,
        live: &LiveSignalSnapshot,
        now: NaiveDateTime,
        config: &PresenceConfig,
    ) -> PresenceSnapshot {
        let mut snapshot = compute_presence(&self.profiles, &self.crime_risk, live, now, config);
        snapshot.model_generation = self.generation;
        snapshot
    }
}

fn station_record(
    id: &str,
    profile: &StationProfile,
    risk: Option<&StationCrimeRisk>,
    live: &LiveSignalSnapshot,
    (day, hour): (usize, u32),
    weather_multiplier: f64,
    config: &PresenceConfig,
) -> PresenceRecord {
    let slot = hour as usize;
    let baseline = profile.baseline(day, slot);
    let trains = live.trains.get(id).copied().unwrap_or(0);
    let ridership =
        modulation::modulated_ridership(baseline, trains, weather_multiplier, &config.train);
    let anomaly = anomaly::detect(baseline, ridership, profile.stddev(day, slot), &config.anomaly);

    let crime_risk = risk.map_or(0.0, |r| r.risk_at(hour));
    let base_safety_level = policy::classify(ridership, crime_risk, hour, &config.classification);

    let mut record = PresenceRecord {
        station_id: id.to_string(),
        name: profile.station.name.clone(),
        latitude: profile.station.latitude,
        longitude: profile.station.longitude,
        baseline,
        ridership,
        trains,
        anomaly: anomaly.flagged,
        anomaly_score: anomaly.score,
        z_score: anomaly.z_score,
        crime_risk,
        risk_tier: risk.map(|r| r.risk_tier),
        top_crime_type: risk.and_then(|r| r.top_crime_type.clone()),
        base_safety_level,
        safety_level: base_safety_level,
        disrupted: false,
        disruption_effect: None,
        disruption_routes: Vec::new(),
    };
    policy::apply_escalation(&mut record, live.disruptions.get(id), hour);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use transit_safety_crime_models::{RiskTier, WindowValues};
    use transit_safety_presence_models::{
        Disruption, DisruptionEffect, SafetyLevel, WeatherDescriptor,
    };
    use transit_safety_station_models::Station;

    /// 2024-01-01 is a Monday.
    fn monday(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(hour, 30, 0)
            .unwrap()
    }

    fn profile(id: &str, hour: usize, baseline: u32, stddev: f64) -> StationProfile {
        let mut profile = StationProfile::empty(Station {
            id: id.to_string(),
            name: format!("Station {id}"),
            latitude: 40.75,
            longitude: -73.98,
        });
        profile.hourly[0][hour] = baseline;
        profile.stddev[0][hour] = stddev;
        profile.samples[0][hour] = 12;
        profile
    }

    fn risk(id: &str, value: f64) -> StationCrimeRisk {
        StationCrimeRisk {
            station_id: id.to_string(),
            total: 10,
            weighted_total: 5.0,
            window_weighted: WindowValues::default(),
            window_risk: WindowValues::default(),
            hourly_risk: Some([value; 24]),
            overall_risk: value,
            top_crime_type: Some("ROBBERY".to_string()),
            risk_tier: RiskTier::Elevated,
        }
    }

    #[test]
    fn end_to_end_clear_morning_is_safe() {
        let profiles = BTreeMap::from([("611".to_string(), profile("611", 9, 2000, 150.0))]);
        let crime = BTreeMap::from([("611".to_string(), risk("611", 0.2))]);
        let live = LiveSignalSnapshot {
            trains: BTreeMap::from([("611".to_string(), 8)]),
            weather: Some(WeatherDescriptor {
                condition: "Clear".to_string(),
                is_rain: false,
                is_snow: false,
                is_extreme: false,
            }),
            disruptions: BTreeMap::new(),
        };

        let snapshot = compute_presence(
            &profiles,
            &crime,
            &live,
            monday(9),
            &PresenceConfig::default(),
        );
        let record = &snapshot.stations[0];

        assert_eq!(record.baseline, 2000);
        assert_eq!(record.ridership, 2000);
        assert_eq!(record.z_score, Some(0.0));
        assert!(!record.anomaly);
        assert!((record.crime_risk - 0.2).abs() < f64::EPSILON);
        assert_eq!(record.base_safety_level, SafetyLevel::Safe);
        assert_eq!(record.safety_level, SafetyLevel::Safe);
        assert_eq!(record.risk_tier, Some(RiskTier::Elevated));

        assert_eq!(snapshot.total_ridership, 2000);
        assert_eq!(snapshot.station_count, 1);
        assert_eq!(snapshot.anomaly_count, 0);
        assert!(!snapshot.night_mode);
        assert_eq!(snapshot.day_of_week, 0);
        assert_eq!(snapshot.weather_condition.as_deref(), Some("Clear"));
    }

    #[test]
    fn missing_live_signals_fall_back_to_baseline() {
        let profiles = BTreeMap::from([("A".to_string(), profile("A", 14, 800, 40.0))]);
        let snapshot = compute_presence(
            &profiles,
            &BTreeMap::new(),
            &LiveSignalSnapshot::default(),
            monday(14),
            &PresenceConfig::default(),
        );
        let record = &snapshot.stations[0];
        assert_eq!(record.ridership, 800);
        assert!(record.crime_risk.abs() < f64::EPSILON);
        assert_eq!(record.risk_tier, None);
        assert_eq!(record.safety_level, SafetyLevel::Safe);
        assert!((snapshot.weather_multiplier - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snow_scales_ridership() {
        let profiles = BTreeMap::from([("A".to_string(), profile("A", 9, 1000, 0.0))]);
        let live = LiveSignalSnapshot {
            weather: Some(WeatherDescriptor {
                condition: "Snow".to_string(),
                is_rain: false,
                is_snow: true,
                is_extreme: false,
            }),
            ..LiveSignalSnapshot::default()
        };
        let snapshot = compute_presence(
            &profiles,
            &BTreeMap::new(),
            &live,
            monday(9),
            &PresenceConfig::default(),
        );
        assert_eq!(snapshot.stations[0].ridership, 700);
        // Exactly 30% below baseline does not exceed the threshold.
        assert!(!snapshot.stations[0].anomaly);
    }

    #[test]
    fn live_only_stations_are_ignored() {
        let profiles = BTreeMap::from([("A".to_string(), profile("A", 9, 100, 10.0))]);
        let live = LiveSignalSnapshot {
            trains: BTreeMap::from([("ghost".to_string(), 20)]),
            disruptions: BTreeMap::from([(
                "ghost".to_string(),
                Disruption {
                    effect: DisruptionEffect::NoService,
                    routes: vec!["G".to_string()],
                },
            )]),
            ..LiveSignalSnapshot::default()
        };
        let snapshot = compute_presence(
            &profiles,
            &BTreeMap::new(),
            &live,
            monday(9),
            &PresenceConfig::default(),
        );
        assert_eq!(snapshot.station_count, 1);
        assert_eq!(snapshot.disrupted_count, 0);
        assert_eq!(snapshot.stations[0].station_id, "A");
    }

    #[test]
    fn sorted_busiest_first_and_counted() {
        let profiles = BTreeMap::from([
            ("A".to_string(), profile("A", 23, 10, 0.0)),
            ("B".to_string(), profile("B", 23, 900, 50.0)),
            ("C".to_string(), profile("C", 23, 900, 50.0)),
            ("D".to_string(), profile("D", 23, 20, 0.0)),
        ]);
        let crime = BTreeMap::from([
            ("A".to_string(), risk("A", 0.9)),
            ("D".to_string(), risk("D", 0.4)),
        ]);
        let live = LiveSignalSnapshot {
            disruptions: BTreeMap::from([(
                "B".to_string(),
                Disruption {
                    effect: DisruptionEffect::SignificantDelays,
                    routes: vec!["7".to_string()],
                },
            )]),
            ..LiveSignalSnapshot::default()
        };

        let snapshot = compute_presence(
            &profiles,
            &crime,
            &live,
            monday(23),
            &PresenceConfig::default(),
        );

        let order: Vec<&str> = snapshot
            .stations
            .iter()
            .map(|r| r.station_id.as_str())
            .collect();
        assert_eq!(order, vec!["B", "C", "D", "A"]);
        assert!(snapshot.night_mode);
        assert_eq!(snapshot.total_ridership, 1830);
        assert_eq!(snapshot.disrupted_count, 1);
        assert_eq!(
            snapshot.safety_counts,
            SafetyCounts {
                safe: 1,
                caution: 2,
                avoid: 1
            }
        );

        let b = &snapshot.stations[0];
        assert_eq!(b.base_safety_level, SafetyLevel::Safe);
        assert_eq!(b.safety_level, SafetyLevel::Caution);
        assert_eq!(b.disruption_effect, Some(DisruptionEffect::SignificantDelays));
        assert_eq!(b.disruption_routes, vec!["7"]);
    }

    #[test]
    fn model_snapshot_stamps_generation() {
        let handle = ModelHandle::new(ModelSnapshot::new(
            BTreeMap::from([("A".to_string(), profile("A", 9, 100, 10.0))]),
            BTreeMap::new(),
        ));
        handle.swap(ModelSnapshot::new(
            BTreeMap::from([("A".to_string(), profile("A", 9, 100, 10.0))]),
            BTreeMap::new(),
        ));

        let snapshot = handle.load().compute(
            &LiveSignalSnapshot::default(),
            monday(9),
            &PresenceConfig::default(),
        );
        assert_eq!(snapshot.model_generation, 1);
    }

    #[test]
    fn concurrent_cycles_agree() {
        let model = ModelSnapshot::new(
            BTreeMap::from([
                ("A".to_string(), profile("A", 9, 100, 10.0)),
                ("B".to_string(), profile("B", 9, 3000, 200.0)),
            ]),
            BTreeMap::from([("A".to_string(), risk("A", 0.85))]),
        );
        let live = LiveSignalSnapshot {
            trains: BTreeMap::from([("B".to_string(), 4)]),
            ..LiveSignalSnapshot::default()
        };
        let config = PresenceConfig::default();
        let expected = model.compute(&live, monday(9), &config);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| model.compute(&live, monday(9), &config)))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }
}
