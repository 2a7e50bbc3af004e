//! Live modulation of the historical baseline.
//!
//! The train factor scales the baseline by how busy the trailing arrival
//! window is relative to what a station of that size normally sees. The
//! weather factor is applied after it. Rounding happens once, at the end.

use transit_safety_presence_models::TrainModulationConfig;

/// Expected arrivals in the trailing window for a station with `baseline`.
///
/// Uses the tier with the largest `min_baseline` that `baseline` reaches,
/// else the default.
#[must_use]
pub fn expected_trains(baseline: u32, config: &TrainModulationConfig) -> u32 {
    config
        .tiers
        .iter()
        .filter(|tier| baseline >= tier.min_baseline)
        .max_by_key(|tier| tier.min_baseline)
        .map_or(config.default_expected, |tier| tier.expected)
}

/// Modulation factor `clamp(actual / expected, floor, cap)`.
#[must_use]
pub fn train_modulation(actual: u32, expected: u32, config: &TrainModulationConfig) -> f64 {
    let ratio = if expected == 0 {
        config.cap
    } else {
        f64::from(actual) / f64::from(expected)
    };
    ratio.max(config.floor).min(config.cap)
}

/// Modulated ridership for a station.
///
/// No arrivals or a zero baseline leaves the baseline untouched by the train
/// factor. `weather_multiplier` always applies.
#[must_use]
pub fn modulated_ridership(
    baseline: u32,
    trains: u32,
    weather_multiplier: f64,
    config: &TrainModulationConfig,
) -> u32 {
    let train_factor = if trains > 0 && baseline > 0 {
        train_modulation(trains, expected_trains(baseline, config), config)
    } else {
        1.0
    };
    round_riders(f64::from(baseline) * train_factor * weather_multiplier)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_riders(value: f64) -> u32 {
    if value.is_finite() {
        value.round().clamp(0.0, f64::from(u32::MAX)) as u32
    } else {
        0
    }
}
