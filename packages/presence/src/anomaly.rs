//! Ridership anomaly detection.

use transit_safety_presence_models::AnomalyConfig;

/// Outcome of testing one station against its baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anomaly {
    /// Whether the deviation is significant.
    pub flagged: bool,
    /// `(ridership - baseline) / baseline`, or `0` for a zero baseline.
    pub score: f64,
    /// z-score, when the statistical test applied.
    pub z_score: Option<f64>,
}

/// Tests `ridership` against the slot's `baseline` and `stddev`.
///
/// Uses a z-score when the slot has spread and enough volume, otherwise a
/// relative deviation test. Baselines at or below `min_baseline` are never
/// flagged by either test.
#[must_use]
pub fn detect(baseline: u32, ridership: u32, stddev: f64, config: &AnomalyConfig) -> Anomaly {
    let base = f64::from(baseline);
    let deviation = f64::from(ridership) - base;
    let score = if baseline > 0 { deviation / base } else { 0.0 };
    let enough_volume = baseline > config.min_baseline;

    if stddev > 0.0 && enough_volume {
        let z = deviation / stddev;
        return Anomaly {
            flagged: z.abs() > config.z_threshold,
            score: round3(score),
            z_score: Some(round2(z)),
        };
    }

    Anomaly {
        flagged: enough_volume && score.abs() > config.percent_threshold,
        score: round3(score),
        z_score: None,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
