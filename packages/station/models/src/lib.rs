#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Station identity and historical ridership profile types.
//!
//! A [`StationProfile`] is the offline product of the ridership builder: a
//! 7×24 grid of mean ridership and a parallel grid of standard deviations,
//! keyed by day-of-week (Monday = 0) and hour-of-day. Profiles are keyed by
//! station complex id.

use chrono::{Datelike as _, NaiveDateTime, Timelike as _};
use serde::{Deserialize, Serialize};

/// Number of day-of-week rows in a profile grid.
pub const DAYS_PER_WEEK: usize = 7;

/// Number of hour-of-day columns in a profile grid.
pub const HOURS_PER_DAY: usize = 24;

/// A `[day][hour]` grid.
pub type WeekGrid<T> = [[T; HOURS_PER_DAY]; DAYS_PER_WEEK];

/// A transit station complex with its display name and location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Station complex id.
    pub id: String,
    /// Human-readable station name.
    pub name: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
}

/// One row of the historical ridership log.
///
/// Coordinates are optional because the upstream log does not always carry
/// them; events without usable coordinates are ignored by the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RidershipEvent {
    /// Station complex id.
    pub station_id: String,
    /// Station display name as it appears in the log.
    pub station_name: String,
    /// Local wall-clock time of the observation.
    pub timestamp: NaiveDateTime,
    /// Riders counted in this observation.
    pub rider_count: f64,
    /// Latitude (WGS84), if present.
    pub latitude: Option<f64>,
    /// Longitude (WGS84), if present.
    pub longitude: Option<f64>,
}

impl RidershipEvent {
    /// Returns the event's coordinates when they are usable for a station
    /// identity (finite, non-zero, and in range).
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if valid_coordinates(lat, lon) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Returns `true` if the pair is a plausible WGS84 location.
///
/// Zero is treated as "missing": upstream logs use `0.0` as a placeholder.
#[must_use]
pub fn valid_coordinates(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && lat != 0.0
        && lon != 0.0
        && lat.abs() <= 90.0
        && lon.abs() <= 180.0
}

/// Day-of-week index for a timestamp (Monday = 0 … Sunday = 6).
#[must_use]
pub fn day_index(timestamp: &NaiveDateTime) -> usize {
    timestamp.weekday().num_days_from_monday() as usize
}

/// Hour-of-day index for a timestamp (`0..24`).
#[must_use]
pub fn hour_index(timestamp: &NaiveDateTime) -> usize {
    timestamp.hour() as usize
}

/// Per-station historical ridership profile.
///
/// Every `[day][hour]` cell is estimated only from the events that fell in
/// that exact bucket. A cell with zero observations holds `0` in both grids;
/// check [`StationProfile::sample_count`] before treating it as "no riders".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationProfile {
    /// Station identity.
    pub station: Station,
    /// Mean ridership per `[day][hour]`, rounded to whole riders.
    pub hourly: WeekGrid<u32>,
    /// Population standard deviation per `[day][hour]`.
    pub stddev: WeekGrid<f64>,
    /// Number of observations that contributed to each cell.
    pub samples: WeekGrid<u32>,
}

impl StationProfile {
    /// Creates an all-zero profile for `station`.
    #[must_use]
    pub const fn empty(station: Station) -> Self {
        Self {
            station,
            hourly: [[0; HOURS_PER_DAY]; DAYS_PER_WEEK],
            stddev: [[0.0; HOURS_PER_DAY]; DAYS_PER_WEEK],
            samples: [[0; HOURS_PER_DAY]; DAYS_PER_WEEK],
        }
    }

    /// Mean ridership for the given slot. Out-of-range slots read as `0`.
    #[must_use]
    pub fn baseline(&self, day: usize, hour: usize) -> u32 {
        self.hourly
            .get(day)
            .and_then(|row| row.get(hour))
            .copied()
            .unwrap_or(0)
    }

    /// Standard deviation for the given slot. Out-of-range slots read as `0`.
    #[must_use]
    pub fn stddev(&self, day: usize, hour: usize) -> f64 {
        self.stddev
            .get(day)
            .and_then(|row| row.get(hour))
            .copied()
            .unwrap_or(0.0)
    }

    /// Observation count for the given slot.
    #[must_use]
    pub fn sample_count(&self, day: usize, hour: usize) -> u32 {
        self.samples
            .get(day)
            .and_then(|row| row.get(hour))
            .copied()
            .unwrap_or(0)
    }

    /// Returns `true` if the slot had no observations at all.
    #[must_use]
    pub fn is_insufficient(&self, day: usize, hour: usize) -> bool {
        self.sample_count(day, hour) == 0
    }
}
