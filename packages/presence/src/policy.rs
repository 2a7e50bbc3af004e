//! Safety classification policy.
//!
//! Classification is a lookup in an ordered decision table: the first row
//! for the current [`DayPeriod`] whose crime-risk floor and ridership ceiling
//! both match sets the tier, and no match means [`SafetyLevel::Safe`]. Low
//! ridership alone or high risk alone never matches a row.
//!
//! Disruption escalation is layered on top and always starts from the base
//! tier, so re-applying the same disruption state changes nothing.

use transit_safety_presence_models::{
    ClassificationRule, DayPeriod, Disruption, DisruptionEffect, PresenceRecord, SafetyLevel,
    is_night,
};

/// Classifies a station for the given hour.
#[must_use]
pub fn classify(
    ridership: u32,
    crime_risk: f64,
    hour: u32,
    rules: &[ClassificationRule],
) -> SafetyLevel {
    let period = DayPeriod::from_hour(hour);
    rules
        .iter()
        .find(|rule| {
            rule.period == period
                && crime_risk >= rule.min_crime_risk
                && ridership < rule.max_ridership
        })
        .map_or(SafetyLevel::Safe, |rule| rule.level)
}

/// Tier after applying a disruption to `base`.
///
/// `No Service` raises one tier. `Significant Delays` raises `Safe` to
/// `Caution` at night only. Anything else leaves the tier as is.
#[must_use]
pub const fn escalate(
    base: SafetyLevel,
    effect: Option<&DisruptionEffect>,
    night_mode: bool,
) -> SafetyLevel {
    match (effect, base) {
        (Some(DisruptionEffect::NoService), _) => base.escalated(),
        (Some(DisruptionEffect::SignificantDelays), SafetyLevel::Safe) if night_mode => {
            SafetyLevel::Caution
        }
        _ => base,
    }
}

/// Sets the record's disruption fields and its final tier from
/// `base_safety_level`.
pub fn apply_escalation(record: &mut PresenceRecord, disruption: Option<&Disruption>, hour: u32) {
    record.disrupted = disruption.is_some();
    record.disruption_effect = disruption.map(|d| d.effect.clone());
    record.disruption_routes = disruption.map(|d| d.routes.clone()).unwrap_or_default();
    record.safety_level = escalate(
        record.base_safety_level,
        record.disruption_effect.as_ref(),
        is_night(hour),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use transit_safety_presence_models::default_classification_rules;

    fn record(base: SafetyLevel) -> PresenceRecord {
        PresenceRecord {
            station_id: "611".to_string(),
            name: "Times Sq-42 St".to_string(),
            latitude: 40.7559,
            longitude: -73.9871,
            baseline: 10,
            ridership: 10,
            trains: 0,
            anomaly: false,
            anomaly_score: 0.0,
            z_score: None,
            crime_risk: 0.9,
            risk_tier: None,
            top_crime_type: None,
            base_safety_level: base,
            safety_level: base,
            disrupted: false,
            disruption_effect: None,
            disruption_routes: Vec::new(),
        }
    }

    fn disruption(effect: DisruptionEffect) -> Disruption {
        Disruption {
            effect,
            routes: vec!["1".to_string(), "2".to_string()],
        }
    }

    #[test]
    fn same_station_is_stricter_late_at_night() {
        let rules = default_classification_rules();
        assert_eq!(classify(10, 0.9, 14, &rules), SafetyLevel::Caution);
        assert_eq!(classify(10, 0.9, 23, &rules), SafetyLevel::Avoid);
    }

    #[test]
    fn daytime_rows() {
        let rules = default_classification_rules();
        assert_eq!(classify(14, 0.8, 6, &rules), SafetyLevel::Caution);
        assert_eq!(classify(15, 0.8, 12, &rules), SafetyLevel::Safe);
        assert_eq!(classify(0, 0.79, 17, &rules), SafetyLevel::Safe);
    }

    #[test]
    fn evening_rows_in_order() {
        let rules = default_classification_rules();
        assert_eq!(classify(20, 0.7, 19, &rules), SafetyLevel::Avoid);
        assert_eq!(classify(14, 0.6, 19, &rules), SafetyLevel::Caution);
        assert_eq!(classify(20, 0.6, 19, &rules), SafetyLevel::Safe);
        assert_eq!(classify(25, 1.0, 21, &rules), SafetyLevel::Safe);
    }

    #[test]
    fn late_night_rows_in_order() {
        let rules = default_classification_rules();
        assert_eq!(classify(14, 0.5, 2, &rules), SafetyLevel::Avoid);
        assert_eq!(classify(24, 0.3, 2, &rules), SafetyLevel::Caution);
        assert_eq!(classify(4, 0.15, 22, &rules), SafetyLevel::Caution);
        assert_eq!(classify(4, 0.14, 22, &rules), SafetyLevel::Safe);
        assert_eq!(classify(5, 0.2, 5, &rules), SafetyLevel::Safe);
    }

    #[test]
    fn quiet_or_risky_alone_is_never_flagged() {
        let rules = default_classification_rules();
        for hour in 0..24 {
            assert_eq!(classify(0, 0.0, hour, &rules), SafetyLevel::Safe);
            assert_eq!(classify(500, 1.0, hour, &rules), SafetyLevel::Safe);
        }
    }

    #[test]
    fn custom_table_drives_classification() {
        let rules = vec![ClassificationRule {
            period: DayPeriod::Daytime,
            min_crime_risk: 0.0,
            max_ridership: 1000,
            level: SafetyLevel::Avoid,
        }];
        assert_eq!(classify(999, 0.0, 12, &rules), SafetyLevel::Avoid);
        assert_eq!(classify(999, 0.0, 20, &rules), SafetyLevel::Safe);
        assert_eq!(classify(999, 0.0, 12, &[]), SafetyLevel::Safe);
    }

    #[test]
    fn no_service_escalates_one_tier() {
        let effect = DisruptionEffect::NoService;
        assert_eq!(escalate(SafetyLevel::Safe, Some(&effect), false), SafetyLevel::Caution);
        assert_eq!(escalate(SafetyLevel::Caution, Some(&effect), false), SafetyLevel::Avoid);
        assert_eq!(escalate(SafetyLevel::Avoid, Some(&effect), true), SafetyLevel::Avoid);
    }

    #[test]
    fn delays_escalate_safe_only_at_night() {
        let effect = DisruptionEffect::SignificantDelays;
        assert_eq!(escalate(SafetyLevel::Safe, Some(&effect), false), SafetyLevel::Safe);
        assert_eq!(escalate(SafetyLevel::Safe, Some(&effect), true), SafetyLevel::Caution);
        assert_eq!(escalate(SafetyLevel::Caution, Some(&effect), true), SafetyLevel::Caution);
    }

    #[test]
    fn other_effects_and_no_disruption_do_nothing() {
        let effect = DisruptionEffect::Other("Detour".to_string());
        assert_eq!(escalate(SafetyLevel::Safe, Some(&effect), true), SafetyLevel::Safe);
        assert_eq!(escalate(SafetyLevel::Caution, None, true), SafetyLevel::Caution);
    }

    #[test]
    fn escalation_is_idempotent() {
        let no_service = disruption(DisruptionEffect::NoService);

        let mut once = record(SafetyLevel::Safe);
        apply_escalation(&mut once, Some(&no_service), 14);

        let mut twice = once.clone();
        apply_escalation(&mut twice, Some(&no_service), 14);

        assert_eq!(once, twice);
        assert_eq!(twice.safety_level, SafetyLevel::Caution);
        assert!(twice.disrupted);
        assert_eq!(twice.disruption_routes, vec!["1", "2"]);
    }

    #[test]
    fn escalation_never_lowers_the_base() {
        let mut rec = record(SafetyLevel::Avoid);
        apply_escalation(&mut rec, Some(&disruption(DisruptionEffect::SignificantDelays)), 23);
        assert_eq!(rec.safety_level, SafetyLevel::Avoid);

        apply_escalation(&mut rec, None, 23);
        assert_eq!(rec.safety_level, SafetyLevel::Avoid);
        assert!(!rec.disrupted);
        assert!(rec.disruption_routes.is_empty());
    }
}
