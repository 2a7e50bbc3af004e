#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crime incident and per-station crime risk types.
//!
//! Incidents are joined to stations by the crime risk builder and reduced
//! into a [`StationCrimeRisk`] per station. Normalized figures are relative
//! to the build that produced them: `1.0` means "the most affected station
//! for this window in this build", not an absolute probability.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Incident categories counted as personal-safety risk when no whitelist is
/// configured.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "FELONY ASSAULT",
    "ROBBERY",
    "ASSAULT 3 & RELATED OFFENSES",
    "RAPE",
    "SEX CRIMES",
    "MURDER & NON-NEGL. MANSLAUGHTER",
    "DANGEROUS WEAPONS",
    "KIDNAPPING & RELATED OFFENSES",
    "HARRASSMENT 2",
];

/// Fixed time-of-day windows used to bucket incidents.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimeWindow {
    /// 06:00–12:00
    Morning,
    /// 12:00–18:00
    Afternoon,
    /// 18:00–22:00
    Evening,
    /// 22:00–06:00
    LateNight,
}

impl TimeWindow {
    /// Returns the window containing `hour` (`0..24`). Hours past 23 wrap.
    #[must_use]
    pub const fn from_hour(hour: u32) -> Self {
        match hour % 24 {
            6..=11 => Self::Morning,
            12..=17 => Self::Afternoon,
            18..=21 => Self::Evening,
            _ => Self::LateNight,
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Morning, Self::Afternoon, Self::Evening, Self::LateNight]
    }
}

/// One value per [`TimeWindow`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowValues {
    /// Morning value.
    pub morning: f64,
    /// Afternoon value.
    pub afternoon: f64,
    /// Evening value.
    pub evening: f64,
    /// Late-night value.
    pub late_night: f64,
}

impl WindowValues {
    /// Returns the value for `window`.
    #[must_use]
    pub const fn get(&self, window: TimeWindow) -> f64 {
        match window {
            TimeWindow::Morning => self.morning,
            TimeWindow::Afternoon => self.afternoon,
            TimeWindow::Evening => self.evening,
            TimeWindow::LateNight => self.late_night,
        }
    }

    /// Returns a mutable reference to the value for `window`.
    pub const fn get_mut(&mut self, window: TimeWindow) -> &mut f64 {
        match window {
            TimeWindow::Morning => &mut self.morning,
            TimeWindow::Afternoon => &mut self.afternoon,
            TimeWindow::Evening => &mut self.evening,
            TimeWindow::LateNight => &mut self.late_night,
        }
    }

    /// Weighted sum `Σ self[w] * weights[w]`.
    #[must_use]
    pub fn dot(&self, weights: &Self) -> f64 {
        TimeWindow::all()
            .iter()
            .map(|&w| self.get(w) * weights.get(w))
            .sum()
    }
}

/// Absolute risk tier derived from the decayed incident total.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskTier {
    /// Below the moderate threshold.
    Low,
    /// At or above the moderate threshold.
    Moderate,
    /// At or above the elevated threshold.
    Elevated,
    /// At or above the critical threshold.
    Critical,
}

/// Decayed-total thresholds for [`RiskTier`].
///
/// Calibrated against roughly 1.3 incidents per month of equivalent recent
/// activity; these are tuning constants, not derived quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TierThresholds {
    /// Minimum decayed total for [`RiskTier::Critical`].
    pub critical: f64,
    /// Minimum decayed total for [`RiskTier::Elevated`].
    pub elevated: f64,
    /// Minimum decayed total for [`RiskTier::Moderate`].
    pub moderate: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            critical: 8.0,
            elevated: 4.0,
            moderate: 1.5,
        }
    }
}

impl TierThresholds {
    /// Buckets a decayed total into a tier.
    #[must_use]
    pub fn tier_for(&self, weighted_total: f64) -> RiskTier {
        if weighted_total >= self.critical {
            RiskTier::Critical
        } else if weighted_total >= self.elevated {
            RiskTier::Elevated
        } else if weighted_total >= self.moderate {
            RiskTier::Moderate
        } else {
            RiskTier::Low
        }
    }
}

/// One row of the historical incident log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrimeIncident {
    /// Offense category as reported by the source.
    pub category: String,
    /// Local wall-clock time the incident occurred.
    pub occurred_at: NaiveDateTime,
    /// Latitude (WGS84), if present.
    pub latitude: Option<f64>,
    /// Longitude (WGS84), if present.
    pub longitude: Option<f64>,
}

/// Crime risk model for a single station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationCrimeRisk {
    /// Station complex id.
    pub station_id: String,
    /// Raw (unweighted) number of incidents within the radius.
    pub total: u64,
    /// Recency-weighted incident total across all windows.
    pub weighted_total: f64,
    /// Recency-weighted incident sums per window.
    pub window_weighted: WindowValues,
    /// Per-window risk normalized into `[0, 1]` against the busiest station.
    pub window_risk: WindowValues,
    /// Per-hour risk normalized into `[0, 1]`, when the hourly curve is built.
    pub hourly_risk: Option<[f64; 24]>,
    /// Time-of-day weighted composite, normalized into `[0, 1]`.
    pub overall_risk: f64,
    /// Category with the highest recency-weighted sum.
    pub top_crime_type: Option<String>,
    /// Absolute tier from the weighted total.
    pub risk_tier: RiskTier,
}

impl StationCrimeRisk {
    /// Risk figure for `hour`, preferring the hourly curve when present.
    #[must_use]
    pub fn risk_at(&self, hour: u32) -> f64 {
        self.hourly_risk.as_ref().map_or_else(
            || self.window_risk.get(TimeWindow::from_hour(hour)),
            |curve| curve[(hour % 24) as usize],
        )
    }
}

/// Crime risk builder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CrimeRiskConfig {
    /// Categories counted toward risk (case-insensitive).
    pub categories: Vec<String>,
    /// Recency half-life in days.
    pub half_life_days: f64,
    /// Station catchment radius in metres.
    pub radius_meters: f64,
    /// Bounding-box half-width in degrees for the spatial pre-filter.
    pub bbox_pad_degrees: f64,
    /// Absolute tier thresholds.
    pub tier_thresholds: TierThresholds,
    /// Time-of-day weights for the overall composite.
    pub window_weights: WindowValues,
    /// Whether to build the per-hour risk curve.
    pub hourly_curve: bool,
    /// Worker count for the spatial join. `None` uses available parallelism.
    pub workers: Option<usize>,
    /// Reference "now" for recency decay. `None` means the build time.
    #[serde(skip)]
    pub as_of: Option<NaiveDateTime>,
}

impl Default for CrimeRiskConfig {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(ToString::to_string).collect(),
            half_life_days: 30.0,
            radius_meters: 400.0,
            bbox_pad_degrees: 0.004,
            tier_thresholds: TierThresholds::default(),
            window_weights: WindowValues {
                morning: 0.5,
                afternoon: 0.5,
                evening: 1.0,
                late_night: 2.0,
            },
            hourly_curve: true,
            workers: None,
            as_of: None,
        }
    }
}

impl CrimeRiskConfig {
    /// Returns `true` if `category` is on the whitelist.
    #[must_use]
    pub fn includes_category(&self, category: &str) -> bool {
        let category = category.trim();
        self.categories
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_boundaries() {
        assert_eq!(TimeWindow::from_hour(5), TimeWindow::LateNight);
        assert_eq!(TimeWindow::from_hour(6), TimeWindow::Morning);
        assert_eq!(TimeWindow::from_hour(11), TimeWindow::Morning);
        assert_eq!(TimeWindow::from_hour(12), TimeWindow::Afternoon);
        assert_eq!(TimeWindow::from_hour(18), TimeWindow::Evening);
        assert_eq!(TimeWindow::from_hour(21), TimeWindow::Evening);
        assert_eq!(TimeWindow::from_hour(22), TimeWindow::LateNight);
        assert_eq!(TimeWindow::from_hour(0), TimeWindow::LateNight);
    }

    #[test]
    fn tier_thresholds_are_inclusive() {
        let t = TierThresholds::default();
        assert_eq!(t.tier_for(8.0), RiskTier::Critical);
        assert_eq!(t.tier_for(7.99), RiskTier::Elevated);
        assert_eq!(t.tier_for(4.0), RiskTier::Elevated);
        assert_eq!(t.tier_for(1.5), RiskTier::Moderate);
        assert_eq!(t.tier_for(1.49), RiskTier::Low);
        assert_eq!(t.tier_for(0.0), RiskTier::Low);
    }

    #[test]
    fn category_match_ignores_case_and_padding() {
        let config = CrimeRiskConfig::default();
        assert!(config.includes_category("robbery"));
        assert!(config.includes_category("  FELONY ASSAULT "));
        assert!(!config.includes_category("PETIT LARCENY"));
    }

    #[test]
    fn risk_at_prefers_hourly_curve() {
        let mut curve = [0.0; 24];
        curve[23] = 0.9;
        let mut risk = StationCrimeRisk {
            station_id: "1".to_string(),
            total: 3,
            weighted_total: 2.0,
            window_weighted: WindowValues::default(),
            window_risk: WindowValues {
                late_night: 0.4,
                ..WindowValues::default()
            },
            hourly_risk: Some(curve),
            overall_risk: 0.5,
            top_crime_type: None,
            risk_tier: RiskTier::Moderate,
        };
        assert!((risk.risk_at(23) - 0.9).abs() < f64::EPSILON);

        risk.hourly_risk = None;
        assert!((risk.risk_at(23) - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn tier_names_roundtrip_through_strum() {
        assert_eq!(RiskTier::Elevated.to_string(), "elevated");
        assert_eq!("late_night".parse::<TimeWindow>().ok(), Some(TimeWindow::LateNight));
    }
}
