#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crime risk builder.
//!
//! Joins every whitelisted incident to each station within a fixed radius,
//! weights it by recency (exponential decay with a configurable half-life),
//! and reduces the matches into a [`StationCrimeRisk`] per station.
//!
//! Window, hour and overall figures are normalized against the most affected
//! station in the same build, so they are only comparable within one build.
//! The absolute [`RiskTier`](transit_safety_crime_models::RiskTier) comes
//! from the decayed total alone.
//!
//! The join runs over contiguous incident partitions on a dedicated rayon
//! pool. Partitions are merged in input order with exact integer sums, so
//! the result does not depend on the worker count.

mod accumulator;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDateTime, Timelike};
use rayon::prelude::*;
use transit_safety_crime_models::{
    CrimeIncident, CrimeRiskConfig, StationCrimeRisk, TimeWindow, WindowValues,
};
use transit_safety_source::progress::{ProgressCallback, null_progress};
use transit_safety_spatial::StationIndex;
use transit_safety_station_models::{HOURS_PER_DAY, Station, valid_coordinates};

use crate::accumulator::{Partition, StationTally, from_fixed, to_fixed};

const MILLIS_PER_DAY: f64 = 86_400_000.0;
const PROGRESS_BATCH: u64 = 5_000;

/// Errors that abort a crime risk build.
#[derive(Debug, thiserror::Error)]
pub enum CrimeRiskError {
    /// The incident source returned zero rows. Treated as an upstream outage
    /// rather than "no crime".
    #[error("Incident source returned no rows; refusing to build an all-zero risk model")]
    NoIncidents,

    /// Rows were present but none passed the category and coordinate
    /// filters.
    #[error("None of the {total} incidents passed the category and coordinate filters")]
    NoMatchingIncidents {
        /// Number of input rows.
        total: u64,
    },

    /// The worker pool for the join could not be started.
    #[error("Failed to start join worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Counters reported at the end of a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrimeRiskBuildStats {
    /// Input incidents.
    pub incidents: u64,
    /// Incidents outside the category whitelist.
    pub dropped_category: u64,
    /// Incidents with missing or invalid coordinates.
    pub dropped_coordinates: u64,
    /// Accepted incidents that matched no station.
    pub unmatched: u64,
    /// Incident-to-station attributions (one incident may match several).
    pub attributions: u64,
    /// Worker threads used for the join.
    pub workers: usize,
}

/// Recency weight `exp(-ln 2 · days_ago / half_life_days)`.
///
/// `1.0` at zero days, `0.5` at one half-life, strictly decreasing and never
/// exactly zero for finite input. A non-positive half-life disables decay.
#[must_use]
pub fn recency_weight(days_ago: f64, half_life_days: f64) -> f64 {
    if half_life_days.is_nan() || half_life_days <= 0.0 {
        return 1.0;
    }
    (-std::f64::consts::LN_2 * days_ago / half_life_days).exp()
}

/// Fractional days between `occurred_at` and `as_of`, clamped at zero for
/// future-dated incidents.
#[must_use]
pub fn days_ago(as_of: NaiveDateTime, occurred_at: NaiveDateTime) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let millis = (as_of - occurred_at).num_milliseconds() as f64;
    (millis / MILLIS_PER_DAY).max(0.0)
}

/// Builds per-station crime risk.
///
/// # Errors
///
/// * [`CrimeRiskError::NoIncidents`] if `incidents` is empty
/// * [`CrimeRiskError::NoMatchingIncidents`] if nothing survives filtering
/// * [`CrimeRiskError::ThreadPool`] if the join pool cannot be started
pub fn build_crime_risk(
    stations: &[Station],
    incidents: &[CrimeIncident],
    config: &CrimeRiskConfig,
) -> Result<BTreeMap<String, StationCrimeRisk>, CrimeRiskError> {
    build_crime_risk_with_progress(stations, incidents, config, &null_progress())
        .map(|(risk, _)| risk)
}

/// Like [`build_crime_risk`], reporting progress per incident and returning
/// the build counters.
///
/// # Errors
///
/// See [`build_crime_risk`].
pub fn build_crime_risk_with_progress(
    stations: &[Station],
    incidents: &[CrimeIncident],
    config: &CrimeRiskConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<(BTreeMap<String, StationCrimeRisk>, CrimeRiskBuildStats), CrimeRiskError> {
    if incidents.is_empty() {
        return Err(CrimeRiskError::NoIncidents);
    }

    let start = Instant::now();
    let as_of = config
        .as_of
        .unwrap_or_else(|| chrono::Local::now().naive_local());
    let workers = worker_count(config.workers, incidents.len());

    log::info!(
        "Joining {} incidents to {} stations (radius {} m, half-life {} days, {workers} workers, as of {as_of})",
        incidents.len(),
        stations.len(),
        config.radius_meters,
        config.half_life_days,
    );

    progress.set_total(incidents.len() as u64);
    progress.set_message("Joining incidents to stations".to_string());

    let index = StationIndex::new(stations);
    let join = Join {
        index: &index,
        station_count: stations.len(),
        config,
        as_of,
        progress,
    };

    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    let chunk_size = incidents.len().div_ceil(workers);
    let partitions: Vec<Partition> = pool.install(|| {
        incidents
            .par_chunks(chunk_size)
            .map(|chunk| join.accumulate(chunk))
            .collect()
    });

    let mut merged = Partition::new(stations.len());
    for partition in partitions {
        merged.merge(partition);
    }
    progress.finish(format!("{} attributions", merged.attributions));

    let stats = CrimeRiskBuildStats {
        incidents: incidents.len() as u64,
        dropped_category: merged.dropped_category,
        dropped_coordinates: merged.dropped_coordinates,
        unmatched: merged.unmatched,
        attributions: merged.attributions,
        workers,
    };

    if merged.accepted == 0 {
        return Err(CrimeRiskError::NoMatchingIncidents {
            total: stats.incidents,
        });
    }

    let risk = finalize(stations, merged.tallies, config);

    log::info!(
        "Built crime risk for {} stations from {} incidents ({} off-whitelist, {} bad coordinates, {} outside every radius, {} attributions) in {:.2?}",
        risk.len(),
        stats.incidents,
        stats.dropped_category,
        stats.dropped_coordinates,
        stats.unmatched,
        stats.attributions,
        start.elapsed(),
    );

    Ok((risk, stats))
}

fn worker_count(configured: Option<usize>, incidents: usize) -> usize {
    configured
        .unwrap_or_else(rayon::current_num_threads)
        .clamp(1, incidents.max(1))
}

/// Shared, read-only inputs for every partition worker.
struct Join<'a> {
    index: &'a StationIndex,
    station_count: usize,
    config: &'a CrimeRiskConfig,
    as_of: NaiveDateTime,
    progress: &'a Arc<dyn ProgressCallback>,
}

impl Join<'_> {
    fn accumulate(&self, incidents: &[CrimeIncident]) -> Partition {
        let mut partition = Partition::new(self.station_count);
        let mut pending = 0u64;

        for incident in incidents {
            pending += 1;
            if pending == PROGRESS_BATCH {
                self.progress.inc(pending);
                pending = 0;
            }

            if !self.config.includes_category(&incident.category) {
                partition.dropped_category += 1;
                continue;
            }
            let (Some(lat), Some(lon)) = (incident.latitude, incident.longitude) else {
                partition.dropped_coordinates += 1;
                continue;
            };
            if !valid_coordinates(lat, lon) {
                partition.dropped_coordinates += 1;
                continue;
            }
            partition.accepted += 1;

            let hits = self.index.stations_within(
                lat,
                lon,
                self.config.radius_meters,
                self.config.bbox_pad_degrees,
            );
            if hits.is_empty() {
                partition.unmatched += 1;
                continue;
            }

            let weight = to_fixed(recency_weight(
                days_ago(self.as_of, incident.occurred_at),
                self.config.half_life_days,
            ));
            let hour = incident.occurred_at.hour() as usize;
            let category = incident.category.trim();

            for station in hits {
                partition.tallies[station].add(category, hour, weight);
                partition.attributions += 1;
            }
        }

        self.progress.inc(pending);
        partition
    }
}

/// Normalizes merged tallies into the published per-station model.
fn finalize(
    stations: &[Station],
    tallies: Vec<StationTally>,
    config: &CrimeRiskConfig,
) -> BTreeMap<String, StationCrimeRisk> {
    let windows: Vec<WindowValues> = tallies.iter().map(window_sums).collect();
    let composites: Vec<f64> = windows
        .iter()
        .map(|w| w.dot(&config.window_weights))
        .collect();

    let mut window_max = WindowValues::default();
    for w in &windows {
        for &window in TimeWindow::all() {
            let max = window_max.get_mut(window);
            *max = max.max(w.get(window));
        }
    }
    let mut hour_max = [0u64; HOURS_PER_DAY];
    for tally in &tallies {
        for (max, &value) in hour_max.iter_mut().zip(&tally.hours) {
            *max = (*max).max(value);
        }
    }
    let composite_max = composites.iter().copied().fold(0.0, f64::max);

    stations
        .iter()
        .zip(tallies)
        .zip(windows.into_iter().zip(composites))
        .map(|((station, tally), (window_weighted, composite))| {
            let mut window_risk = WindowValues::default();
            for &window in TimeWindow::all() {
                *window_risk.get_mut(window) =
                    normalize(window_weighted.get(window), window_max.get(window));
            }

            let hourly_risk = config.hourly_curve.then(|| {
                let mut curve = [0.0; HOURS_PER_DAY];
                for (hour, value) in curve.iter_mut().enumerate() {
                    *value = normalize(from_fixed(tally.hours[hour]), from_fixed(hour_max[hour]));
                }
                curve
            });

            let weighted_total = from_fixed(tally.weighted);
            let risk = StationCrimeRisk {
                station_id: station.id.clone(),
                total: tally.total,
                weighted_total: round3(weighted_total),
                window_weighted: round_windows(&window_weighted),
                window_risk,
                hourly_risk,
                overall_risk: normalize(composite, composite_max),
                top_crime_type: tally.top_category().map(ToString::to_string),
                risk_tier: config.tier_thresholds.tier_for(weighted_total),
            };
            (station.id.clone(), risk)
        })
        .collect()
}

fn window_sums(tally: &StationTally) -> WindowValues {
    WindowValues {
        morning: from_fixed(tally.windows[0]),
        afternoon: from_fixed(tally.windows[1]),
        evening: from_fixed(tally.windows[2]),
        late_night: from_fixed(tally.windows[3]),
    }
}

fn round_windows(values: &WindowValues) -> WindowValues {
    WindowValues {
        morning: round3(values.morning),
        afternoon: round3(values.afternoon),
        evening: round3(values.evening),
        late_night: round3(values.late_night),
    }
}

/// `value / max` clamped into `[0, 1]` and rounded to 3 decimals; zero when
/// the column is empty.
fn normalize(value: f64, max: f64) -> f64 {
    if max > 0.0 {
        round3((value / max).clamp(0.0, 1.0))
    } else {
        0.0
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use transit_safety_crime_models::RiskTier;

    fn as_of() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn config(workers: usize) -> CrimeRiskConfig {
        CrimeRiskConfig {
            workers: Some(workers),
            as_of: Some(as_of()),
            ..CrimeRiskConfig::default()
        }
    }

    fn station(id: &str, lat: f64, lon: f64) -> Station {
        Station {
            id: id.to_string(),
            name: id.to_string(),
            latitude: lat,
            longitude: lon,
        }
    }

    fn stations() -> Vec<Station> {
        vec![
            station("times-sq", 40.7559, -73.9871),
            station("grand-central", 40.7527, -73.9772),
            station("coney-island", 40.5773, -73.9811),
        ]
    }

    fn incident(category: &str, days: i64, hour: u32, lat: f64, lon: f64) -> CrimeIncident {
        let date = as_of().date() - Duration::days(days);
        CrimeIncident {
            category: category.to_string(),
            occurred_at: date.and_hms_opt(hour, 0, 0).unwrap(),
            latitude: Some(lat),
            longitude: Some(lon),
        }
    }

    fn sample_incidents() -> Vec<CrimeIncident> {
        let mut incidents = Vec::new();
        for day in 0..40 {
            let hour = (day * 5 % 24) as u32;
            incidents.push(incident("ROBBERY", day, hour, 40.7559, -73.9871));
            if day % 3 == 0 {
                incidents.push(incident("FELONY ASSAULT", day, 23, 40.7527, -73.9772));
            }
            if day % 7 == 0 {
                incidents.push(incident("HARRASSMENT 2", day, 8, 40.7543, -73.9822));
            }
        }
        incidents.push(incident("PETIT LARCENY", 1, 9, 40.7559, -73.9871));
        incidents
    }

    #[test]
    fn recency_weight_halves_every_half_life() {
        assert!((recency_weight(0.0, 30.0) - 1.0).abs() < f64::EPSILON);
        assert!((recency_weight(30.0, 30.0) - 0.5).abs() < 1e-12);
        assert!((recency_weight(60.0, 30.0) - 0.25).abs() < 1e-12);
        assert!(recency_weight(10_000.0, 30.0) > 0.0);

        let mut previous = recency_weight(0.0, 30.0);
        for day in 1..200 {
            let w = recency_weight(f64::from(day), 30.0);
            assert!(w < previous);
            previous = w;
        }
    }

    #[test]
    fn future_incidents_count_at_full_weight() {
        let tomorrow = as_of() + Duration::days(1);
        assert!(days_ago(as_of(), tomorrow).abs() < f64::EPSILON);
        assert!((days_ago(as_of(), as_of() - Duration::hours(36)) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn zero_incidents_is_a_hard_failure() {
        let err = build_crime_risk(&stations(), &[], &config(2)).unwrap_err();
        assert!(matches!(err, CrimeRiskError::NoIncidents));
    }

    #[test]
    fn nothing_after_filtering_is_a_hard_failure() {
        let mut no_coords = incident("ROBBERY", 1, 9, 40.7559, -73.9871);
        no_coords.latitude = None;
        let incidents = vec![incident("PETIT LARCENY", 1, 9, 40.7559, -73.9871), no_coords];

        let err = build_crime_risk(&stations(), &incidents, &config(1)).unwrap_err();
        assert!(matches!(err, CrimeRiskError::NoMatchingIncidents { total: 2 }));
    }

    #[test]
    fn normalized_figures_are_bounded_and_peak_at_one() {
        let risk = build_crime_risk(&stations(), &sample_incidents(), &config(3)).unwrap();

        for &window in TimeWindow::all() {
            let max = risk
                .values()
                .map(|r| r.window_risk.get(window))
                .fold(0.0, f64::max);
            for r in risk.values() {
                let v = r.window_risk.get(window);
                assert!((0.0..=1.0).contains(&v));
            }
            let peak = risk
                .values()
                .max_by(|a, b| a.window_weighted.get(window).total_cmp(&b.window_weighted.get(window)))
                .unwrap();
            if peak.window_weighted.get(window) > 0.0 {
                assert!((peak.window_risk.get(window) - 1.0).abs() < f64::EPSILON);
                assert!((max - 1.0).abs() < f64::EPSILON);
            }
        }

        let overall_max = risk.values().map(|r| r.overall_risk).fold(0.0, f64::max);
        assert!((overall_max - 1.0).abs() < f64::EPSILON);

        for r in risk.values() {
            for v in r.hourly_risk.unwrap() {
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn overlapping_catchments_count_for_both_stations() {
        let incidents = vec![incident("ROBBERY", 0, 23, 40.7543, -73.9822)];
        let cfg = CrimeRiskConfig {
            radius_meters: 600.0,
            ..config(1)
        };
        let risk = build_crime_risk(&stations(), &incidents, &cfg).unwrap();

        assert_eq!(risk["times-sq"].total, 1);
        assert_eq!(risk["grand-central"].total, 1);
        assert_eq!(risk["coney-island"].total, 0);
        assert!((risk["times-sq"].window_risk.late_night - 1.0).abs() < f64::EPSILON);
        assert_eq!(risk["coney-island"].top_crime_type, None);
        assert_eq!(risk["coney-island"].risk_tier, RiskTier::Low);
    }

    #[test]
    fn tier_comes_from_decayed_total() {
        let incidents: Vec<_> = (0..9)
            .map(|_| incident("ROBBERY", 0, 20, 40.7559, -73.9871))
            .chain((0..2).map(|_| incident("ROBBERY", 0, 20, 40.5773, -73.9811)))
            .collect();
        let risk = build_crime_risk(&stations(), &incidents, &config(2)).unwrap();

        assert_eq!(risk["times-sq"].risk_tier, RiskTier::Critical);
        assert_eq!(risk["coney-island"].risk_tier, RiskTier::Moderate);
        assert_eq!(risk["grand-central"].risk_tier, RiskTier::Low);
        assert_eq!(risk["times-sq"].top_crime_type.as_deref(), Some("ROBBERY"));
    }

    #[test]
    fn result_is_identical_for_any_worker_count() {
        let incidents = sample_incidents();
        let single = build_crime_risk(&stations(), &incidents, &config(1)).unwrap();
        for workers in [2, 3, 7, 64] {
            let parallel = build_crime_risk(&stations(), &incidents, &config(workers)).unwrap();
            assert_eq!(single, parallel, "workers = {workers}");
        }
    }

    #[test]
    fn window_only_model_falls_back_to_windows() {
        let cfg = CrimeRiskConfig {
            hourly_curve: false,
            ..config(2)
        };
        let risk = build_crime_risk(&stations(), &sample_incidents(), &cfg).unwrap();
        let times_sq = &risk["times-sq"];
        assert!(times_sq.hourly_risk.is_none());
        assert!(
            (times_sq.risk_at(23) - times_sq.window_risk.get(TimeWindow::LateNight)).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn reports_dropped_rows() {
        let (_, stats) = build_crime_risk_with_progress(
            &stations(),
            &sample_incidents(),
            &config(4),
            &null_progress(),
        )
        .unwrap();
        assert_eq!(stats.dropped_category, 1);
        assert_eq!(stats.dropped_coordinates, 0);
        assert_eq!(stats.workers, 4);
        // Harassment reports sit between the two midtown catchments.
        assert_eq!(stats.unmatched, 6);
        assert_eq!(stats.attributions, 54);
    }
}
