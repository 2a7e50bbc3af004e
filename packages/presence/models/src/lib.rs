#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Live signal inputs and presence output types.
//!
//! A [`LiveSignalSnapshot`] carries the already-decoded live inputs for one
//! computation cycle. The computation produces one [`PresenceRecord`] per
//! station, gathered into a [`PresenceSnapshot`] with system-wide totals.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use transit_safety_crime_models::RiskTier;

/// Safety tier for a station. Ordered from least to most severe.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum SafetyLevel {
    /// No conjunction of low traffic and high risk.
    #[default]
    Safe,
    /// Worth caution at this hour.
    Caution,
    /// Recommend avoiding at this hour.
    Avoid,
}

impl SafetyLevel {
    /// Returns the next tier up. `Avoid` stays `Avoid`.
    #[must_use]
    pub const fn escalated(self) -> Self {
        match self {
            Self::Safe => Self::Caution,
            Self::Caution | Self::Avoid => Self::Avoid,
        }
    }
}

/// Part of the day used to select classification thresholds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DayPeriod {
    /// 06:00–18:00
    Daytime,
    /// 18:00–22:00
    Evening,
    /// 22:00–06:00
    LateNight,
}

impl DayPeriod {
    /// Returns the period containing `hour` (`0..24`).
    #[must_use]
    pub const fn from_hour(hour: u32) -> Self {
        match hour % 24 {
            6..=17 => Self::Daytime,
            18..=21 => Self::Evening,
            _ => Self::LateNight,
        }
    }
}

/// Returns `true` for hours in `[22, 24) ∪ [0, 6)`.
#[must_use]
pub const fn is_night(hour: u32) -> bool {
    matches!(DayPeriod::from_hour(hour), DayPeriod::LateNight)
}

/// Current weather as reported by the weather adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherDescriptor {
    /// Free-form condition label (e.g. "Rain", "Clear").
    pub condition: String,
    /// Precipitation is rain.
    pub is_rain: bool,
    /// Precipitation is snow.
    pub is_snow: bool,
    /// Extreme temperature or wind.
    pub is_extreme: bool,
}

impl WeatherDescriptor {
    /// Temperature at or below which conditions are extreme (°F).
    pub const EXTREME_COLD_F: f64 = 20.0;
    /// Temperature at or above which conditions are extreme (°F).
    pub const EXTREME_HEAT_F: f64 = 95.0;
    /// Wind speed at or above which conditions are extreme (mph).
    pub const EXTREME_WIND_MPH: f64 = 30.0;

    /// Derives the descriptor from a raw observation.
    ///
    /// Snow and rain are read from the condition text (so "Freezing Rain"
    /// counts as rain and "Snow Showers" as snow).
    #[must_use]
    pub fn from_observation(condition: &str, temp_f: Option<f64>, wind_mph: Option<f64>) -> Self {
        let lower = condition.to_ascii_lowercase();
        let is_snow = ["snow", "sleet", "blizzard", "flurr"]
            .iter()
            .any(|k| lower.contains(k));
        let is_rain = ["rain", "drizzle", "shower", "thunderstorm"]
            .iter()
            .any(|k| lower.contains(k));
        let is_extreme = temp_f.is_some_and(|t| t <= Self::EXTREME_COLD_F || t >= Self::EXTREME_HEAT_F)
            || wind_mph.is_some_and(|w| w >= Self::EXTREME_WIND_MPH);

        Self {
            condition: condition.trim().to_string(),
            is_rain,
            is_snow,
            is_extreme,
        }
    }
}

/// Effect of a service alert on a station.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DisruptionEffect {
    /// Trains are not stopping.
    NoService,
    /// Trains are running with significant delays.
    SignificantDelays,
    /// Any other effect, kept verbatim.
    Other(String),
}

impl DisruptionEffect {
    /// Relative severity used when several alerts hit the same station.
    #[must_use]
    pub const fn severity(&self) -> u8 {
        match self {
            Self::NoService => 2,
            Self::SignificantDelays => 1,
            Self::Other(_) => 0,
        }
    }
}

impl From<&str> for DisruptionEffect {
    fn from(value: &str) -> Self {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "NOSERVICE" => Self::NoService,
            "SIGNIFICANTDELAYS" => Self::SignificantDelays,
            _ => Self::Other(value.trim().to_string()),
        }
    }
}

impl From<String> for DisruptionEffect {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<DisruptionEffect> for String {
    fn from(value: DisruptionEffect) -> Self {
        match value {
            DisruptionEffect::NoService => "No Service".to_string(),
            DisruptionEffect::SignificantDelays => "Significant Delays".to_string(),
            DisruptionEffect::Other(s) => s,
        }
    }
}

impl std::fmt::Display for DisruptionEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoService => write!(f, "No Service"),
            Self::SignificantDelays => write!(f, "Significant Delays"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// An active service disruption at a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disruption {
    /// Most severe effect affecting the station.
    pub effect: DisruptionEffect,
    /// Affected route ids.
    pub routes: Vec<String>,
}

/// Live inputs for one computation cycle.
///
/// Every signal may be absent; the computation degrades each one
/// independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LiveSignalSnapshot {
    /// Train arrivals in the trailing window, keyed by station complex id.
    pub trains: BTreeMap<String, u32>,
    /// Current weather, if known.
    pub weather: Option<WeatherDescriptor>,
    /// Active disruptions keyed by station complex id.
    pub disruptions: BTreeMap<String, Disruption>,
}

/// Output record for one station in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    /// Station complex id.
    pub station_id: String,
    /// Station display name.
    pub name: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Historical mean for the current slot.
    pub baseline: u32,
    /// Live-modulated ridership estimate.
    pub ridership: u32,
    /// Live train arrivals used for modulation.
    pub trains: u32,
    /// Whether the estimate deviates significantly from the baseline.
    pub anomaly: bool,
    /// `(ridership - baseline) / baseline`, or `0` with no baseline.
    pub anomaly_score: f64,
    /// Z-score when the statistical test applied.
    pub z_score: Option<f64>,
    /// Crime risk figure for the current hour.
    pub crime_risk: f64,
    /// Absolute crime risk tier, if the station has a crime model.
    pub risk_tier: Option<RiskTier>,
    /// Highest-weighted incident category nearby.
    pub top_crime_type: Option<String>,
    /// Classification before disruption escalation.
    pub base_safety_level: SafetyLevel,
    /// Final classification.
    pub safety_level: SafetyLevel,
    /// Whether an active disruption affects the station.
    pub disrupted: bool,
    /// Disruption effect, if any.
    pub disruption_effect: Option<DisruptionEffect>,
    /// Routes affected by the disruption.
    pub disruption_routes: Vec<String>,
}

/// Per-tier station counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyCounts {
    /// Stations classified [`SafetyLevel::Safe`].
    pub safe: u32,
    /// Stations classified [`SafetyLevel::Caution`].
    pub caution: u32,
    /// Stations classified [`SafetyLevel::Avoid`].
    pub avoid: u32,
}

impl SafetyCounts {
    /// Counts one more station at `level`.
    pub const fn record(&mut self, level: SafetyLevel) {
        match level {
            SafetyLevel::Safe => self.safe += 1,
            SafetyLevel::Caution => self.caution += 1,
            SafetyLevel::Avoid => self.avoid += 1,
        }
    }
}

/// Aggregate result of one presence computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    /// Wall-clock time the snapshot describes.
    pub generated_at: NaiveDateTime,
    /// Hour of day used for lookup.
    pub hour: u32,
    /// Day of week used for lookup (Monday = 0).
    pub day_of_week: u32,
    /// Whether the hour falls in the night window.
    pub night_mode: bool,
    /// Weather condition label, if known.
    pub weather_condition: Option<String>,
    /// Weather multiplier applied to every station.
    pub weather_multiplier: f64,
    /// Sum of all station ridership estimates.
    pub total_ridership: u64,
    /// Number of stations in the snapshot.
    pub station_count: u32,
    /// Number of stations flagged anomalous.
    pub anomaly_count: u32,
    /// Number of stations with an active disruption.
    pub disrupted_count: u32,
    /// Stations per safety tier.
    pub safety_counts: SafetyCounts,
    /// Generation number of the models used.
    pub model_generation: u64,
    /// Station records, busiest first.
    pub stations: Vec<PresenceRecord>,
}

/// Expected train count for stations whose baseline reaches `min_baseline`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainTier {
    /// Smallest baseline in this tier.
    pub min_baseline: u32,
    /// Expected arrivals in the trailing window.
    pub expected: u32,
}

/// Train-arrival modulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrainModulationConfig {
    /// Tiers checked from the largest `min_baseline` down.
    pub tiers: Vec<TrainTier>,
    /// Expected arrivals when no tier matches.
    pub default_expected: u32,
    /// Lowest modulation factor.
    pub floor: f64,
    /// Highest modulation factor.
    pub cap: f64,
}

impl Default for TrainModulationConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                TrainTier {
                    min_baseline: 5000,
                    expected: 12,
                },
                TrainTier {
                    min_baseline: 2000,
                    expected: 8,
                },
                TrainTier {
                    min_baseline: 500,
                    expected: 5,
                },
            ],
            default_expected: 3,
            floor: 0.7,
            cap: 2.0,
        }
    }
}

/// Ridership multipliers per weather condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WeatherFactors {
    /// Multiplier under snow.
    pub snow: f64,
    /// Multiplier under rain.
    pub rain: f64,
    /// Multiplier under extreme temperature or wind.
    pub extreme: f64,
}

impl Default for WeatherFactors {
    fn default() -> Self {
        Self {
            snow: 0.70,
            rain: 0.80,
            extreme: 0.85,
        }
    }
}

impl WeatherFactors {
    /// Multiplier for `weather`. Snow wins over rain, rain over extreme.
    #[must_use]
    pub fn multiplier(&self, weather: Option<&WeatherDescriptor>) -> f64 {
        match weather {
            Some(w) if w.is_snow => self.snow,
            Some(w) if w.is_rain => self.rain,
            Some(w) if w.is_extreme => self.extreme,
            _ => 1.0,
        }
    }
}

/// Anomaly detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnomalyConfig {
    /// Absolute z-score above which a station is anomalous.
    pub z_threshold: f64,
    /// Relative deviation above which a station is anomalous when no
    /// standard deviation is available.
    pub percent_threshold: f64,
    /// Baselines at or below this are never flagged.
    pub min_baseline: u32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            z_threshold: 2.0,
            percent_threshold: 0.3,
            min_baseline: 50,
        }
    }
}

/// One row of the classification decision table.
///
/// Matches when `crime_risk >= min_crime_risk` and
/// `ridership < max_ridership` during `period`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRule {
    /// Part of the day this row applies to.
    pub period: DayPeriod,
    /// Inclusive lower bound on crime risk.
    pub min_crime_risk: f64,
    /// Exclusive upper bound on ridership.
    pub max_ridership: u32,
    /// Tier assigned when the row matches.
    pub level: SafetyLevel,
}

/// The default ordered classification table.
#[must_use]
pub fn default_classification_rules() -> Vec<ClassificationRule> {
    const fn rule(
        period: DayPeriod,
        min_crime_risk: f64,
        max_ridership: u32,
        level: SafetyLevel,
    ) -> ClassificationRule {
        ClassificationRule {
            period,
            min_crime_risk,
            max_ridership,
            level,
        }
    }

    vec![
        rule(DayPeriod::Daytime, 0.8, 15, SafetyLevel::Caution),
        rule(DayPeriod::Evening, 0.7, 25, SafetyLevel::Avoid),
        rule(DayPeriod::Evening, 0.5, 15, SafetyLevel::Caution),
        rule(DayPeriod::LateNight, 0.5, 15, SafetyLevel::Avoid),
        rule(DayPeriod::LateNight, 0.3, 25, SafetyLevel::Caution),
        rule(DayPeriod::LateNight, 0.15, 5, SafetyLevel::Caution),
    ]
}

/// Online presence computation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PresenceConfig {
    /// Train modulation.
    pub train: TrainModulationConfig,
    /// Weather multipliers.
    pub weather: WeatherFactors,
    /// Anomaly thresholds.
    pub anomaly: AnomalyConfig,
    /// Ordered classification table; first match wins.
    pub classification: Vec<ClassificationRule>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            train: TrainModulationConfig::default(),
            weather: WeatherFactors::default(),
            anomaly: AnomalyConfig::default(),
            classification: default_classification_rules(),
        }
    }
}
