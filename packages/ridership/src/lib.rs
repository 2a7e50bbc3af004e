#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Ridership profile builder.
//!
//! Turns a historical ridership log into one [`StationProfile`] per station:
//! a 7×24 grid of mean ridership and a parallel grid of population standard
//! deviation, keyed by day-of-week and hour-of-day. Each cell is estimated
//! only from events in that exact bucket; empty cells stay at zero.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use transit_safety_source::progress::{ProgressCallback, null_progress};
use transit_safety_station_models::{
    DAYS_PER_WEEK, HOURS_PER_DAY, RidershipEvent, Station, StationProfile, WeekGrid, day_index,
    hour_index,
};

const PROGRESS_BATCH: u64 = 10_000;

/// Running sums for one `(day, hour)` bucket.
#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    sum: f64,
    sum_sq: f64,
    count: u32,
}

impl Bucket {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.sum_sq += value * value;
        self.count += 1;
    }

    /// Mean and population standard deviation, or zeros for an empty bucket.
    fn finish(self) -> (f64, f64) {
        if self.count == 0 {
            return (0.0, 0.0);
        }
        let n = f64::from(self.count);
        let mean = self.sum / n;
        let variance = (self.sum_sq / n - mean * mean).max(0.0);
        (mean, variance.sqrt())
    }
}

/// Per-station accumulator.
struct StationAccumulator {
    station: Station,
    buckets: WeekGrid<Bucket>,
}

impl StationAccumulator {
    fn into_profile(self) -> StationProfile {
        let mut profile = StationProfile::empty(self.station);
        for day in 0..DAYS_PER_WEEK {
            for hour in 0..HOURS_PER_DAY {
                let bucket = self.buckets[day][hour];
                let (mean, stddev) = bucket.finish();
                profile.hourly[day][hour] = round_count(mean);
                profile.stddev[day][hour] = round2(stddev);
                profile.samples[day][hour] = bucket.count;
            }
        }
        profile
    }
}

/// Counters reported at the end of a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RidershipBuildStats {
    /// Events that contributed to a bucket.
    pub used: u64,
    /// Events dropped for missing or invalid coordinates.
    pub dropped_coordinates: u64,
    /// Events dropped for a negative or non-finite rider count.
    pub dropped_counts: u64,
}

/// Builds ridership profiles from historical events.
///
/// Input order does not matter. An empty input yields an empty map.
#[must_use]
pub fn build_ridership_profiles(events: &[RidershipEvent]) -> BTreeMap<String, StationProfile> {
    build_ridership_profiles_with_progress(events, &null_progress()).0
}

/// Like [`build_ridership_profiles`], reporting progress per event and
/// returning the build counters.
#[must_use]
pub fn build_ridership_profiles_with_progress(
    events: &[RidershipEvent],
    progress: &Arc<dyn ProgressCallback>,
) -> (BTreeMap<String, StationProfile>, RidershipBuildStats) {
    let start = Instant::now();
    progress.set_total(events.len() as u64);
    progress.set_message("Bucketing ridership events".to_string());

    let mut stations: BTreeMap<String, StationAccumulator> = BTreeMap::new();
    let mut stats = RidershipBuildStats::default();

    for (i, event) in events.iter().enumerate() {
        if (i as u64 + 1) % PROGRESS_BATCH == 0 {
            progress.inc(PROGRESS_BATCH);
        }

        if !event.rider_count.is_finite() || event.rider_count < 0.0 {
            stats.dropped_counts += 1;
            continue;
        }
        let Some((latitude, longitude)) = event.coordinates() else {
            stats.dropped_coordinates += 1;
            continue;
        };

        let acc = stations
            .entry(event.station_id.clone())
            .or_insert_with(|| StationAccumulator {
                station: Station {
                    id: event.station_id.clone(),
                    name: event.station_name.clone(),
                    latitude,
                    longitude,
                },
                buckets: [[Bucket::default(); HOURS_PER_DAY]; DAYS_PER_WEEK],
            });

        acc.buckets[day_index(&event.timestamp)][hour_index(&event.timestamp)]
            .add(event.rider_count);
        stats.used += 1;
    }
    progress.inc(events.len() as u64 % PROGRESS_BATCH);

    let profiles: BTreeMap<String, StationProfile> = stations
        .into_iter()
        .map(|(id, acc)| (id, acc.into_profile()))
        .collect();

    progress.finish(format!("{} station profiles", profiles.len()));
    log::info!(
        "Built {} ridership profiles from {} events ({} bad coordinates, {} bad counts) in {:.2?}",
        profiles.len(),
        stats.used,
        stats.dropped_coordinates,
        stats.dropped_counts,
        start.elapsed(),
    );

    (profiles, stats)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_count(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
