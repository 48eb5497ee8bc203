//! Ranking queries over pipeline outputs.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use psps_core::{SpanId, StationId};
use serde::Serialize;

use crate::association::SpanAssociation;
use crate::exceedance::StationExceedance;

/// Spans tied at the maximum probability, plus every span sorted descending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityRanking {
    pub max_probability: f64,
    pub top_spans: Vec<SpanId>,
    pub ranked: Vec<(SpanId, f64)>,
}

/// Spans with the most associated stations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationImpact {
    pub max_station_count: usize,
    pub spans: Vec<SpanId>,
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

pub fn highest_probability_spans(probabilities: &BTreeMap<SpanId, f64>) -> ProbabilityRanking {
    let mut ranked: Vec<(SpanId, f64)> = probabilities
        .iter()
        .map(|(span, p)| (span.clone(), *p))
        .collect();
    // Stable sort keeps ties in span id order.
    ranked.sort_by(|a, b| descending(a.1, b.1));

    let max_probability = ranked.first().map(|(_, p)| *p).unwrap_or(0.0);
    let top_spans = ranked
        .iter()
        .take_while(|(_, p)| *p == max_probability)
        .map(|(span, _)| span.clone())
        .collect();

    ProbabilityRanking {
        max_probability,
        top_spans,
        ranked,
    }
}

pub fn greatest_station_impact(associations: &BTreeMap<SpanId, SpanAssociation>) -> StationImpact {
    let max_station_count = associations
        .values()
        .map(SpanAssociation::station_count)
        .max()
        .unwrap_or(0);
    let spans = associations
        .iter()
        .filter(|(_, assoc)| assoc.station_count() == max_station_count)
        .map(|(span, _)| span.clone())
        .collect();
    StationImpact {
        max_station_count,
        spans,
    }
}

/// Stations with probability at or above `threshold`, highest first.
pub fn high_risk_stations(summary: &[StationExceedance], threshold: f64) -> Vec<(StationId, f64)> {
    let mut stations: Vec<(StationId, f64)> = summary
        .iter()
        .filter(|s| s.probability >= threshold)
        .map(|s| (s.station.clone(), s.probability))
        .collect();
    stations.sort_by(|a, b| descending(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
    stations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn probabilities() -> BTreeMap<SpanId, f64> {
        [("a", 0.2), ("b", 0.7), ("c", 0.7), ("d", 0.0)]
            .into_iter()
            .map(|(id, p)| (SpanId::new(id), p))
            .collect()
    }

    #[test]
    fn top_spans_share_the_maximum() {
        let ranking = highest_probability_spans(&probabilities());
        assert_eq!(ranking.max_probability, 0.7);
        assert_eq!(ranking.top_spans, vec![SpanId::new("b"), SpanId::new("c")]);
        assert_eq!(ranking.ranked.last(), Some(&(SpanId::new("d"), 0.0)));
    }

    #[test]
    fn empty_ranking() {
        let ranking = highest_probability_spans(&BTreeMap::new());
        assert!(ranking.top_spans.is_empty());
        assert_eq!(ranking.max_probability, 0.0);
    }

    #[test]
    fn station_impact_counts_distinct_stations() {
        let assoc = |span: &str, count: usize| {
            let stations: BTreeSet<_> = (0..count)
                .map(|i| crate::association::StationTuple {
                    station: StationId::new(format!("WS{i}")),
                    probability: 0.1,
                    above_threshold_count: 1,
                    total_count: 10,
                })
                .collect();
            (
                SpanId::new(span),
                SpanAssociation {
                    span: SpanId::new(span),
                    chain: stations.iter().cloned().collect(),
                    stations,
                    upstream_spans: count,
                    cycle: None,
                },
            )
        };
        let associations: BTreeMap<_, _> =
            [assoc("x", 1), assoc("y", 3), assoc("z", 3)].into_iter().collect();
        let impact = greatest_station_impact(&associations);
        assert_eq!(impact.max_station_count, 3);
        assert_eq!(impact.spans, vec![SpanId::new("y"), SpanId::new("z")]);
    }

    #[test]
    fn high_risk_threshold_is_inclusive() {
        let summary = |id: &str, p: f64| StationExceedance {
            station: StationId::new(id),
            alert_threshold: 20.0,
            above_threshold_count: 0,
            total_count: 0,
            probability: p,
            first_reading: None,
            last_reading: None,
        };
        let stations = vec![summary("A", 0.1), summary("B", 0.5), summary("C", 0.3)];
        let risky = high_risk_stations(&stations, 0.3);
        assert_eq!(
            risky,
            vec![(StationId::new("B"), 0.5), (StationId::new("C"), 0.3)]
        );
    }
}
