//! Train arrival counts per station complex.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::complex::ComplexMap;

/// One decoded arrival prediction from the realtime feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainArrival {
    /// Feed stop id (platform level).
    pub stop_id: String,
    /// Route the train is running on.
    #[serde(default)]
    pub route_id: Option<String>,
    /// Predicted local arrival time.
    pub arrival: NaiveDateTime,
}

/// Counts arrivals within `now ± window`, grouped by complex.
///
/// Arrivals at stops the map cannot resolve are dropped.
#[must_use]
pub fn count_arrivals(
    arrivals: &[TrainArrival],
    map: &ComplexMap,
    now: NaiveDateTime,
    window: Duration,
) -> BTreeMap<String, u32> {
    let window = window.abs();
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    let mut unmapped = 0u64;

    for arrival in arrivals {
        if (arrival.arrival - now).abs() > window {
            continue;
        }
        let Some(complex) = map.resolve(&arrival.stop_id) else {
            unmapped += 1;
            continue;
        };
        *counts.entry(complex.to_string()).or_default() += 1;
    }

    if unmapped > 0 {
        log::debug!("{unmapped} arrivals at unmapped stops were dropped");
    }
    counts
}
