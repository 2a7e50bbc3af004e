//! Immutable model snapshots and the swappable handle that serves them.
//!
//! A [`ModelSnapshot`] bundles the two offline models from one rebuild. It is
//! never mutated after construction; a rebuild produces a new snapshot and
//! [`ModelHandle::swap`] replaces the current one. Readers keep whatever
//! `Arc` they cloned until they drop it.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use transit_safety_crime_models::StationCrimeRisk;
use transit_safety_station_models::StationProfile;

/// Offline models from a single rebuild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSnapshot {
    /// Monotonic rebuild counter assigned by the handle.
    pub generation: u64,
    /// Ridership profiles keyed by station complex id.
    pub profiles: BTreeMap<String, StationProfile>,
    /// Crime risk keyed by station complex id.
    pub crime_risk: BTreeMap<String, StationCrimeRisk>,
}

impl ModelSnapshot {
    /// Creates a generation-zero snapshot.
    #[must_use]
    pub const fn new(
        profiles: BTreeMap<String, StationProfile>,
        crime_risk: BTreeMap<String, StationCrimeRisk>,
    ) -> Self {
        Self {
            generation: 0,
            profiles,
            crime_risk,
        }
    }
}

/// Shared handle to the current [`ModelSnapshot`].
///
/// The lock is held only long enough to clone or replace the `Arc`, never
/// during a computation.
#[derive(Debug, Default)]
pub struct ModelHandle {
    current: RwLock<Arc<ModelSnapshot>>,
}

impl ModelHandle {
    /// Wraps an initial snapshot.
    #[must_use]
    pub fn new(snapshot: ModelSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<ModelSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Installs `snapshot` as the next generation and returns its number.
    pub fn swap(&self, mut snapshot: ModelSnapshot) -> u64 {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        snapshot.generation = current.generation + 1;
        let generation = snapshot.generation;
        *current = Arc::new(snapshot);
        drop(current);

        log::info!("Installed model generation {generation}");
        generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transit_safety_station_models::Station;

    fn profiles(id: &str) -> BTreeMap<String, StationProfile> {
        let station = Station {
            id: id.to_string(),
            name: id.to_string(),
            latitude: 40.75,
            longitude: -73.98,
        };
        BTreeMap::from([(id.to_string(), StationProfile::empty(station))])
    }

    #[test]
    fn swap_bumps_generation() {
        let handle = ModelHandle::new(ModelSnapshot::new(profiles("A"), BTreeMap::new()));
        assert_eq!(handle.load().generation, 0);

        let generation = handle.swap(ModelSnapshot::new(profiles("B"), BTreeMap::new()));
        assert_eq!(generation, 1);
        assert_eq!(handle.load().generation, 1);
        assert!(handle.load().profiles.contains_key("B"));
    }

    #[test]
    fn readers_keep_their_snapshot_across_a_swap() {
        let handle = ModelHandle::new(ModelSnapshot::new(profiles("A"), BTreeMap::new()));
        let before = handle.load();

        handle.swap(ModelSnapshot::new(profiles("B"), BTreeMap::new()));

        assert!(before.profiles.contains_key("A"));
        assert!(handle.load().profiles.contains_key("B"));
    }

    #[test]
    fn concurrent_readers_see_a_whole_snapshot() {
        let handle = Arc::new(ModelHandle::new(ModelSnapshot::new(
            profiles("A"),
            BTreeMap::new(),
        )));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let handle = Arc::clone(&handle);
                scope.spawn(move || {
                    for _ in 0..100 {
                        let snapshot = handle.load();
                        assert_eq!(snapshot.profiles.len(), 1);
                    }
                });
            }
            for i in 0..10 {
                handle.swap(ModelSnapshot::new(profiles(&format!("S{i}")), BTreeMap::new()));
            }
        });

        assert_eq!(handle.load().generation, 10);
    }
}
