#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Live signal adapters.
//!
//! Feed decoding happens upstream; this crate takes the decoded records
//! (train arrival predictions, service alerts, a weather observation) and
//! reduces them to the per-complex inputs of a presence cycle. Signals are
//! kept in a [`LiveSignalCache`] so a failed fetch falls back to the
//! last-known value until it goes stale.

pub mod alerts;
pub mod arrivals;
pub mod cache;
pub mod complex;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use transit_safety_presence_models::WeatherDescriptor;

pub use alerts::{ServiceAlert, disruptions_by_station};
pub use arrivals::{TrainArrival, count_arrivals};
pub use cache::LiveSignalCache;
pub use complex::ComplexMap;

/// Errors that can occur while reading live inputs.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed live feed document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed complex mapping CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The complex mapping lacks a required column.
    #[error("Missing column '{0}' in complex mapping")]
    MissingColumn(String),
}

/// Live adapter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LiveConfig {
    /// Half-width of the arrival window around "now", in seconds.
    pub arrival_window_secs: u32,
    /// Age after which a cached signal is dropped, in seconds.
    pub max_staleness_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            arrival_window_secs: 300,
            max_staleness_secs: 300,
        }
    }
}

impl LiveConfig {
    /// The arrival window as a duration.
    #[must_use]
    pub fn arrival_window(&self) -> Duration {
        Duration::seconds(i64::from(self.arrival_window_secs))
    }
}

/// Raw weather reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherObservation {
    /// Condition label, e.g. "Light Rain".
    pub condition: String,
    /// Temperature in °F.
    #[serde(default)]
    pub temperature_f: Option<f64>,
    /// Sustained wind in mph.
    #[serde(default)]
    pub wind_mph: Option<f64>,
}

/// One decoded live feed document.
///
/// `trains` carries counts already aggregated by complex; `arrivals` carries
/// raw predictions that are counted here. Both are summed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LiveFeed {
    /// Raw arrival predictions.
    pub arrivals: Vec<TrainArrival>,
    /// Pre-aggregated arrival counts keyed by complex id.
    pub trains: BTreeMap<String, u32>,
    /// Active service alerts.
    pub alerts: Vec<ServiceAlert>,
    /// Current weather reading, if the feed has one.
    pub weather: Option<WeatherObservation>,
}

impl LiveFeed {
    /// Parses a feed document.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Json`] if the document is malformed.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LiveError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Reads a feed document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, LiveError> {
        Self::from_reader(std::io::BufReader::new(std::fs::File::open(path)?))
    }

    /// Reduces the feed and stores every signal it carries in `cache`.
    ///
    /// Train counts and disruptions are always replaced. Weather is only
    /// replaced when the feed has a reading, so a feed without one leaves
    /// the last-known weather to age out on its own.
    pub fn ingest(
        &self,
        cache: &mut LiveSignalCache,
        map: &ComplexMap,
        now: NaiveDateTime,
        config: &LiveConfig,
    ) {
        let mut trains = count_arrivals(&self.arrivals, map, now, config.arrival_window());
        for (complex, count) in &self.trains {
            *trains.entry(complex.clone()).or_default() += count;
        }
        let disruptions = disruptions_by_station(&self.alerts, map);

        log::debug!(
            "Live feed: {} complexes with arrivals, {} disrupted, weather {}",
            trains.len(),
            disruptions.len(),
            self.weather
                .as_ref()
                .map_or("unknown", |w| w.condition.as_str()),
        );

        cache.update_trains(trains, now);
        cache.update_disruptions(disruptions, now);
        if let Some(w) = &self.weather {
            cache.update_weather(
                WeatherDescriptor::from_observation(&w.condition, w.temperature_f, w.wind_mph),
                now,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use transit_safety_presence_models::DisruptionEffect;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    const FEED: &str = r#"{
        "arrivals": [
            {"stopId": "127N", "routeId": "1", "arrival": "2024-03-04T08:31:00"},
            {"stopId": "127S", "arrival": "2024-03-04T08:29:30"},
            {"stopId": "631N", "arrival": "2024-03-04T09:15:00"}
        ],
        "trains": {"611": 2, "620": 4},
        "alerts": [
            {"effect": "No Service", "routes": ["4"], "stopIds": ["631S"]}
        ],
        "weather": {"condition": "Heavy Snow", "temperatureF": 18.0, "windMph": 12.0}
    }"#;

    fn map() -> ComplexMap {
        let mut map = ComplexMap::default();
        map.insert("127", "611");
        map.insert("631", "610");
        map
    }

    #[test]
    fn ingests_a_feed_document() {
        let feed = LiveFeed::from_reader(FEED.as_bytes()).unwrap();
        let mut cache = LiveSignalCache::new(300);
        feed.ingest(&mut cache, &map(), now(), &LiveConfig::default());

        let snapshot = cache.snapshot(now());
        assert_eq!(snapshot.trains.get("611"), Some(&4));
        assert_eq!(snapshot.trains.get("620"), Some(&4));
        assert_eq!(snapshot.trains.get("610"), None);
        assert_eq!(snapshot.disruptions["610"].effect, DisruptionEffect::NoService);

        let weather = snapshot.weather.unwrap();
        assert!(weather.is_snow);
        assert!(weather.is_extreme);
    }

    #[test]
    fn feed_without_weather_keeps_last_reading() {
        let mut cache = LiveSignalCache::new(300);
        LiveFeed::from_reader(FEED.as_bytes())
            .unwrap()
            .ingest(&mut cache, &map(), now(), &LiveConfig::default());

        let later = now() + Duration::seconds(60);
        LiveFeed::default().ingest(&mut cache, &map(), later, &LiveConfig::default());

        let snapshot = cache.snapshot(later);
        assert!(snapshot.weather.is_some());
        assert!(snapshot.trains.is_empty());
        assert!(snapshot.disruptions.is_empty());
    }

    #[test]
    fn malformed_feed_is_an_error() {
        let err = LiveFeed::from_reader("{ not json".as_bytes()).unwrap_err();
        assert!(matches!(err, LiveError::Json(_)));
    }
}
