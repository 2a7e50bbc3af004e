//! Last-known live signals.
//!
//! Each signal is stored with the time it was fetched. A snapshot only
//! includes signals younger than the staleness limit, so a stalled weather
//! fetch drops the weather factor without touching train counts.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use transit_safety_presence_models::{Disruption, LiveSignalSnapshot, WeatherDescriptor};

#[derive(Debug, Clone)]
struct Stamped<T> {
    value: T,
    fetched_at: NaiveDateTime,
}

/// Cache of the most recent value of each live signal.
#[derive(Debug, Clone)]
pub struct LiveSignalCache {
    max_staleness: Duration,
    trains: Option<Stamped<BTreeMap<String, u32>>>,
    weather: Option<Stamped<WeatherDescriptor>>,
    disruptions: Option<Stamped<BTreeMap<String, Disruption>>>,
}

impl LiveSignalCache {
    /// Creates an empty cache that drops signals older than
    /// `max_staleness_secs`.
    #[must_use]
    pub fn new(max_staleness_secs: u64) -> Self {
        let secs = i64::try_from(max_staleness_secs).unwrap_or(i64::MAX);
        Self {
            max_staleness: Duration::try_seconds(secs).unwrap_or(Duration::MAX),
            trains: None,
            weather: None,
            disruptions: None,
        }
    }

    /// Stores fresh train counts.
    pub fn update_trains(&mut self, value: BTreeMap<String, u32>, fetched_at: NaiveDateTime) {
        self.trains = Some(Stamped { value, fetched_at });
    }

    /// Stores a fresh weather descriptor.
    pub fn update_weather(&mut self, value: WeatherDescriptor, fetched_at: NaiveDateTime) {
        self.weather = Some(Stamped { value, fetched_at });
    }

    /// Stores a fresh disruption map.
    pub fn update_disruptions(
        &mut self,
        value: BTreeMap<String, Disruption>,
        fetched_at: NaiveDateTime,
    ) {
        self.disruptions = Some(Stamped { value, fetched_at });
    }

    /// Builds a snapshot from every signal that is still fresh at `now`.
    #[must_use]
    pub fn snapshot(&self, now: NaiveDateTime) -> LiveSignalSnapshot {
        LiveSignalSnapshot {
            trains: self.fresh(self.trains.as_ref(), now).cloned().unwrap_or_default(),
            weather: self.fresh(self.weather.as_ref(), now).cloned(),
            disruptions: self
                .fresh(self.disruptions.as_ref(), now)
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn fresh<'a, T>(&self, signal: Option<&'a Stamped<T>>, now: NaiveDateTime) -> Option<&'a T> {
        let signal = signal?;
        if now - signal.fetched_at > self.max_staleness {
            log::debug!("Dropping live signal fetched at {}", signal.fetched_at);
            return None;
        }
        Some(&signal.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use transit_safety_presence_models::DisruptionEffect;

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(8, minute, 0)
            .unwrap()
    }

    #[test]
    fn empty_cache_gives_empty_snapshot() {
        let cache = LiveSignalCache::new(300);
        assert_eq!(cache.snapshot(at(0)), LiveSignalSnapshot::default());
    }

    #[test]
    fn signals_expire_independently() {
        let mut cache = LiveSignalCache::new(300);
        cache.update_weather(
            WeatherDescriptor::from_observation("Rain", Some(50.0), None),
            at(0),
        );
        cache.update_trains(BTreeMap::from([("611".to_string(), 6)]), at(4));
        cache.update_disruptions(
            BTreeMap::from([(
                "611".to_string(),
                Disruption {
                    effect: DisruptionEffect::NoService,
                    routes: vec!["1".to_string()],
                },
            )]),
            at(4),
        );

        let fresh = cache.snapshot(at(5));
        assert!(fresh.weather.is_some());
        assert_eq!(fresh.trains.get("611"), Some(&6));

        let later = cache.snapshot(at(6));
        assert!(later.weather.is_none());
        assert_eq!(later.trains.get("611"), Some(&6));
        assert_eq!(later.disruptions.len(), 1);

        let stale = cache.snapshot(at(10));
        assert_eq!(stale, LiveSignalSnapshot::default());
    }
}
