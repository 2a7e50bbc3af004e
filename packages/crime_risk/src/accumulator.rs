//! Per-partition accumulators for the incident-to-station join.
//!
//! Weighted sums are kept as fixed-point integers so merging partitions is
//! exact: the same input produces bit-identical results for any partition
//! count.

use transit_safety_crime_models::TimeWindow;

/// Fixed-point units per unit of recency weight.
const FIXED_SCALE: f64 = 1_000_000_000.0;

/// Converts a recency weight into fixed-point units.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_fixed(weight: f64) -> u64 {
    (weight.max(0.0) * FIXED_SCALE).round() as u64
}

/// Converts fixed-point units back into a weight sum.
#[allow(clippy::cast_precision_loss)]
pub fn from_fixed(value: u64) -> f64 {
    value as f64 / FIXED_SCALE
}

/// Running totals for one station.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationTally {
    /// Unweighted incident count.
    pub total: u64,
    /// Weighted sum across all windows.
    pub weighted: u64,
    /// Weighted sum per [`TimeWindow`], in declaration order.
    pub windows: [u64; 4],
    /// Weighted sum per hour of day.
    pub hours: [u64; 24],
    /// Weighted sum per category, in first-seen order.
    pub categories: Vec<(String, u64)>,
}

impl StationTally {
    /// Records one incident.
    pub fn add(&mut self, category: &str, hour: usize, weight: u64) {
        self.total += 1;
        self.weighted += weight;
        self.windows[window_slot(hour)] += weight;
        self.hours[hour % 24] += weight;
        self.add_category(category, weight);
    }

    fn add_category(&mut self, category: &str, weight: u64) {
        if let Some((_, sum)) = self.categories.iter_mut().find(|(c, _)| c == category) {
            *sum += weight;
        } else {
            self.categories.push((category.to_string(), weight));
        }
    }

    /// Folds a later partition's tally into this one.
    pub fn merge(&mut self, other: Self) {
        self.total += other.total;
        self.weighted += other.weighted;
        for (a, b) in self.windows.iter_mut().zip(other.windows) {
            *a += b;
        }
        for (a, b) in self.hours.iter_mut().zip(other.hours) {
            *a += b;
        }
        for (category, weight) in other.categories {
            self.add_category(&category, weight);
        }
    }

    /// Category with the largest weighted sum. Ties go to the one seen first.
    pub fn top_category(&self) -> Option<&str> {
        let mut best: Option<&(String, u64)> = None;
        for entry in &self.categories {
            if best.is_none_or(|b| entry.1 > b.1) {
                best = Some(entry);
            }
        }
        best.map(|(c, _)| c.as_str())
    }
}

/// Accumulated state for one contiguous slice of incidents.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// One tally per station, indexed by station position.
    pub tallies: Vec<StationTally>,
    /// Incidents outside the category whitelist.
    pub dropped_category: u64,
    /// Incidents with missing or invalid coordinates.
    pub dropped_coordinates: u64,
    /// Incidents that passed the filters.
    pub accepted: u64,
    /// Accepted incidents that fell within no station's radius.
    pub unmatched: u64,
    /// Incident-to-station attributions.
    pub attributions: u64,
}

impl Partition {
    pub fn new(stations: usize) -> Self {
        Self {
            tallies: vec![StationTally::default(); stations],
            ..Self::default()
        }
    }

    /// Folds the next partition (in input order) into this one.
    pub fn merge(&mut self, other: Self) {
        for (tally, next) in self.tallies.iter_mut().zip(other.tallies) {
            tally.merge(next);
        }
        self.dropped_category += other.dropped_category;
        self.dropped_coordinates += other.dropped_coordinates;
        self.accepted += other.accepted;
        self.unmatched += other.unmatched;
        self.attributions += other.attributions;
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn window_slot(hour: usize) -> usize {
    match TimeWindow::from_hour((hour % 24) as u32) {
        TimeWindow::Morning => 0,
        TimeWindow::Afternoon => 1,
        TimeWindow::Evening => 2,
        TimeWindow::LateNight => 3,
    }
}
