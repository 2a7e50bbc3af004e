#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index over station locations.
//!
//! Stations are loaded into an R-tree keyed by `[lon, lat]`. A radius query
//! first collects candidates inside a padded bounding box, then keeps only
//! those whose great-circle distance is within the radius. Used by the crime
//! risk builder to attribute incidents to every nearby station.

use geo::{Distance, Haversine, Point};
use rstar::{AABB, RTree, RTreeObject};
use transit_safety_station_models::{Station, valid_coordinates};

/// Metres per degree of latitude (mean).
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// A station position stored in the R-tree with its index into the source
/// slice.
struct StationEntry {
    index: usize,
    point: [f64; 2],
}

impl RTreeObject for StationEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// Pre-built R-tree over a fixed station list.
///
/// Query results are positions in the slice the index was built from.
pub struct StationIndex {
    tree: RTree<StationEntry>,
    len: usize,
}

impl StationIndex {
    /// Builds the index. Stations with invalid coordinates are left out and
    /// can never match a query.
    #[must_use]
    pub fn new(stations: &[Station]) -> Self {
        let entries: Vec<StationEntry> = stations
            .iter()
            .enumerate()
            .filter(|(_, s)| valid_coordinates(s.latitude, s.longitude))
            .map(|(index, s)| StationEntry {
                index,
                point: [s.longitude, s.latitude],
            })
            .collect();

        let skipped = stations.len() - entries.len();
        if skipped > 0 {
            log::warn!("{skipped} stations have invalid coordinates and were not indexed");
        }
        log::debug!("Indexed {} stations", entries.len());

        Self {
            len: entries.len(),
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed stations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no station was indexed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the positions of every station within `radius_m` metres of
    /// the point, in ascending order.
    ///
    /// `pad_deg` is the bounding-box pre-filter half-width. It is widened
    /// when smaller than the radius so the pre-filter never drops a station
    /// that passes the exact distance test.
    #[must_use]
    pub fn stations_within(&self, lat: f64, lon: f64, radius_m: f64, pad_deg: f64) -> Vec<usize> {
        if !valid_coordinates(lat, lon) || radius_m.is_nan() || radius_m < 0.0 {
            return Vec::new();
        }

        let (pad_lat, pad_lon) = bbox_pad(lat, radius_m, pad_deg);
        let envelope =
            AABB::from_corners([lon - pad_lon, lat - pad_lat], [lon + pad_lon, lat + pad_lat]);

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|e| haversine_meters(lat, lon, e.point[1], e.point[0]) <= radius_m)
            .map(|e| e.index)
            .collect();
        hits.sort_unstable();
        hits
    }
}

/// Great-circle distance in metres between two `(lat, lon)` points.
#[must_use]
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Haversine.distance(Point::new(lon1, lat1), Point::new(lon2, lat2))
}

/// Latitude and longitude half-widths of the pre-filter box.
fn bbox_pad(lat: f64, radius_m: f64, pad_deg: f64) -> (f64, f64) {
    let radius_lat = radius_m / METERS_PER_DEGREE_LAT;
    let cos_lat = lat.to_radians().cos().abs().max(1e-6);
    let radius_lon = radius_lat / cos_lat;
    let pad = pad_deg.max(0.0);
    (pad.max(radius_lat), pad.max(radius_lon))
}
