//! Service alerts reduced to one disruption per station.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use transit_safety_presence_models::{Disruption, DisruptionEffect};

use crate::complex::ComplexMap;

/// One decoded service alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAlert {
    /// Alert effect label.
    pub effect: DisruptionEffect,
    /// Affected route ids.
    #[serde(default)]
    pub routes: Vec<String>,
    /// Affected feed stop ids.
    #[serde(default)]
    pub stop_ids: Vec<String>,
}

/// Folds alerts into a per-complex disruption map.
///
/// A station hit by several alerts keeps the most severe effect (earliest
/// alert on a tie) and the sorted union of every alert's routes.
#[must_use]
pub fn disruptions_by_station(
    alerts: &[ServiceAlert],
    map: &ComplexMap,
) -> BTreeMap<String, Disruption> {
    let mut merged: BTreeMap<String, (DisruptionEffect, BTreeSet<String>)> = BTreeMap::new();

    for alert in alerts {
        let complexes: BTreeSet<&str> = alert
            .stop_ids
            .iter()
            .filter_map(|stop| map.resolve(stop))
            .collect();

        for complex in complexes {
            let (effect, routes) = merged
                .entry(complex.to_string())
                .or_insert_with(|| (alert.effect.clone(), BTreeSet::new()));
            if alert.effect.severity() > effect.severity() {
                *effect = alert.effect.clone();
            }
            routes.extend(alert.routes.iter().map(|r| r.trim().to_string()));
        }
    }

    merged
        .into_iter()
        .map(|(complex, (effect, routes))| {
            (
                complex,
                Disruption {
                    effect,
                    routes: routes.into_iter().filter(|r| !r.is_empty()).collect(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(effect: &str, routes: &[&str], stops: &[&str]) -> ServiceAlert {
        ServiceAlert {
            effect: DisruptionEffect::from(effect),
            routes: routes.iter().map(ToString::to_string).collect(),
            stop_ids: stops.iter().map(ToString::to_string).collect(),
        }
    }

    fn map() -> ComplexMap {
        let mut map = ComplexMap::default();
        map.insert("127", "611");
        map.insert("725", "611");
        map.insert("631", "610");
        map
    }

    #[test]
    fn keeps_most_severe_effect_and_unions_routes() {
        let alerts = vec![
            alert("Significant Delays", &["2", "1"], &["127N", "631S"]),
            alert("No Service", &["7"], &["725"]),
            alert("Detour", &["1", "3"], &["127S"]),
        ];
        let disruptions = disruptions_by_station(&alerts, &map());

        let times_sq = &disruptions["611"];
        assert_eq!(times_sq.effect, DisruptionEffect::NoService);
        assert_eq!(times_sq.routes, vec!["1", "2", "3", "7"]);

        let grand_central = &disruptions["610"];
        assert_eq!(grand_central.effect, DisruptionEffect::SignificantDelays);
        assert_eq!(grand_central.routes, vec!["1", "2"]);
    }

    #[test]
    fn unmapped_stops_are_ignored() {
        let alerts = vec![alert("No Service", &["G"], &["G22"])];
        assert!(disruptions_by_station(&alerts, &map()).is_empty());
    }

    #[test]
    fn alert_with_two_platforms_of_one_complex_counts_once() {
        let alerts = vec![alert("No Service", &["1"], &["127N", "127S"])];
        let disruptions = disruptions_by_station(&alerts, &map());
        assert_eq!(disruptions.len(), 1);
        assert_eq!(disruptions["611"].routes, vec!["1"]);
    }
}
