//! Station-to-span association.
//!
//! A span is exposed to the weather at its own location and at every span
//! between it and the source, since de-energizing any upstream span takes it
//! down too. For each span we walk the upstream chain, look up the station
//! directly attached to every span on it, and collapse the result to a set.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use psps_core::{
    CycleReport, Diagnostics, IssueKind, PspsResult, Span, SpanGraph, SpanId, StationId,
    TraversalOrder,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::exceedance::{ExceedanceTable, StationExceedance};

/// `(station_id, psps_probability, above_threshold_count, total_reading_count)`
#[derive(Debug, Clone, Serialize)]
pub struct StationTuple {
    pub station: StationId,
    pub probability: f64,
    pub above_threshold_count: usize,
    pub total_count: usize,
}

impl StationTuple {
    fn key(&self) -> (&StationId, usize, usize, u64) {
        (
            &self.station,
            self.above_threshold_count,
            self.total_count,
            self.probability.to_bits(),
        )
    }
}

impl From<&StationExceedance> for StationTuple {
    fn from(summary: &StationExceedance) -> Self {
        StationTuple {
            station: summary.station.clone(),
            probability: summary.probability,
            above_threshold_count: summary.above_threshold_count,
            total_count: summary.total_count,
        }
    }
}

impl PartialEq for StationTuple {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for StationTuple {}

impl PartialOrd for StationTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StationTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for StationTuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Stations reachable from one span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanAssociation {
    pub span: SpanId,
    /// Station tuple per span on the chain, upstream order then the span itself
    pub chain: Vec<StationTuple>,
    /// `chain` with duplicates collapsed
    pub stations: BTreeSet<StationTuple>,
    /// Number of spans upstream of `span`
    pub upstream_spans: usize,
    pub cycle: Option<CycleReport>,
}

impl SpanAssociation {
    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn station_ids(&self) -> Vec<&StationId> {
        self.stations.iter().map(|tuple| &tuple.station).collect()
    }
}

/// Map each span to the tuple of its directly attached station.
///
/// Spans whose station has no exceedance summary get no tuple; each such
/// station is reported once with the number of spans that referenced it.
pub fn station_tuples_by_span(
    spans: &[Span],
    table: &ExceedanceTable,
    diagnostics: &mut Diagnostics,
) -> HashMap<SpanId, StationTuple> {
    let summaries: HashMap<StationId, StationTuple> = table
        .summaries()
        .iter()
        .map(|summary| (summary.station.clone(), StationTuple::from(summary)))
        .collect();

    let mut tuples = HashMap::new();
    let mut missing: BTreeMap<&StationId, usize> = BTreeMap::new();
    for span in spans {
        let Some(station) = &span.station else {
            continue;
        };
        match summaries.get(station) {
            Some(tuple) => {
                tuples.insert(span.id.clone(), tuple.clone());
            }
            None => *missing.entry(station).or_default() += 1,
        }
    }

    for (station, count) in missing {
        warn!(station = %station, spans = count, "span station has no exceedance data");
        diagnostics.add_warning_for(
            IssueKind::MissingStation,
            format!("{count} spans reference a station with no exceedance data"),
            station.as_str(),
        );
    }
    tuples
}

/// Stations reachable upstream of `span`, including its own.
pub fn associate_span(
    graph: &SpanGraph,
    span: &SpanId,
    station_by_span: &HashMap<SpanId, StationTuple>,
    order: TraversalOrder,
) -> PspsResult<SpanAssociation> {
    let traversal = graph.upstream(span, order)?;
    let chain: Vec<StationTuple> = traversal
        .with_start()
        .iter()
        .filter_map(|id| station_by_span.get(id).cloned())
        .collect();
    let stations = chain.iter().cloned().collect();

    Ok(SpanAssociation {
        span: span.clone(),
        chain,
        stations,
        upstream_spans: traversal.nodes.len(),
        cycle: traversal.cycle,
    })
}

/// Associate every span with its upstream stations.
///
/// Cycles are reported as errors against the span but its finite association
/// is kept. A span that cannot be traversed at all is reported and skipped.
pub fn associate(
    graph: &SpanGraph,
    spans: &[Span],
    station_by_span: &HashMap<SpanId, StationTuple>,
    order: TraversalOrder,
    diagnostics: &mut Diagnostics,
) -> BTreeMap<SpanId, SpanAssociation> {
    let mut associations = BTreeMap::new();
    for span in spans {
        match associate_span(graph, &span.id, station_by_span, order) {
            Ok(association) => {
                record_cycle(&association, diagnostics);
                associations.insert(span.id.clone(), association);
            }
            Err(err) => diagnostics.add_error_for(
                IssueKind::SpanFailure,
                err.to_string(),
                span.id.as_str(),
            ),
        }
    }
    debug!(spans = associations.len(), "associated stations with spans");
    associations
}

pub(crate) fn record_cycle(association: &SpanAssociation, diagnostics: &mut Diagnostics) {
    if let Some(cycle) = &association.cycle {
        diagnostics.add_error_for(
            IssueKind::CycleDetected,
            format!(
                "upstream chain loops at edge {} -> {}",
                cycle.from, cycle.to
            ),
            association.span.as_str(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use psps_core::{WeatherStation, WindReading};

    fn table() -> ExceedanceTable {
        let date = NaiveDate::from_ymd_opt(2023, 10, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let stations = vec![
            WeatherStation::new("WS1", 20.0),
            WeatherStation::new("WS2", 20.0),
        ];
        let readings = vec![
            WindReading::new("WS1", date, 30.0),
            WindReading::new("WS2", date, 10.0),
        ];
        ExceedanceTable::build(&stations, &readings, false, &mut Diagnostics::new()).unwrap()
    }

    fn spans() -> Vec<Span> {
        vec![
            Span::new("root").with_station("WS1"),
            Span::new("mid").with_upstream("root").with_station("WS1"),
            Span::new("leaf").with_upstream("mid").with_station("WS2"),
            Span::new("island"),
            Span::new("orphan").with_station("MISSING"),
        ]
    }

    #[test]
    fn tuples_only_for_stations_with_data() {
        let mut diag = Diagnostics::new();
        let tuples = station_tuples_by_span(&spans(), &table(), &mut diag);
        assert_eq!(tuples.len(), 3);
        assert!(!tuples.contains_key(&SpanId::new("orphan")));
        assert_eq!(diag.issues_of(IssueKind::MissingStation).count(), 1);
    }

    #[test]
    fn upstream_stations_are_deduplicated() {
        let spans = spans();
        let mut diag = Diagnostics::new();
        let tuples = station_tuples_by_span(&spans, &table(), &mut diag);
        let graph = SpanGraph::build(&spans, &[]).unwrap();
        let assoc = associate(&graph, &spans, &tuples, TraversalOrder::DepthFirst, &mut diag);

        let leaf = &assoc[&SpanId::new("leaf")];
        assert_eq!(leaf.chain.len(), 3);
        assert_eq!(leaf.station_count(), 2);
        assert_eq!(
            leaf.station_ids(),
            vec![&StationId::new("WS1"), &StationId::new("WS2")]
        );
        assert_eq!(leaf.upstream_spans, 2);

        let mid = &assoc[&SpanId::new("mid")];
        assert_eq!(mid.station_count(), 1);
    }

    #[test]
    fn isolated_span_without_station_is_empty() {
        let spans = spans();
        let mut diag = Diagnostics::new();
        let tuples = station_tuples_by_span(&spans, &table(), &mut diag);
        let graph = SpanGraph::build(&spans, &[]).unwrap();
        let assoc = associate(&graph, &spans, &tuples, TraversalOrder::DepthFirst, &mut diag);

        let island = &assoc[&SpanId::new("island")];
        assert!(island.is_empty());
        assert!(island.cycle.is_none());
        assert!(assoc[&SpanId::new("orphan")].is_empty());
    }

    #[test]
    fn cycles_are_reported_but_association_kept() {
        let spans = vec![
            Span::new("A").with_upstream("B").with_station("WS1"),
            Span::new("B").with_upstream("A").with_station("WS2"),
        ];
        let mut diag = Diagnostics::new();
        let tuples = station_tuples_by_span(&spans, &table(), &mut diag);
        let graph = SpanGraph::build(&spans, &[]).unwrap();
        let assoc = associate(&graph, &spans, &tuples, TraversalOrder::BreadthFirst, &mut diag);

        assert_eq!(assoc[&SpanId::new("A")].station_count(), 2);
        assert!(assoc[&SpanId::new("A")].cycle.is_some());
        assert_eq!(diag.issues_of(IssueKind::CycleDetected).count(), 2);
    }

    #[test]
    fn tuple_equality_uses_all_fields() {
        let a = StationTuple {
            station: StationId::new("WS1"),
            probability: 0.5,
            above_threshold_count: 1,
            total_count: 2,
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.total_count = 4;
        assert_ne!(a, b);
        let set: BTreeSet<_> = [a.clone(), a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
