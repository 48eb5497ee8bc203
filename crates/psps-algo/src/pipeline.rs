//! End-to-end risk pipeline.
//!
//! Stages, in order:
//!
//! 1. Build the span graph (blank or duplicate span ids are fatal)
//! 2. Build the exceedance table and station summary
//! 3. Record dangling upstream pointers
//! 4. Associate upstream stations with every span
//! 5. Compute per-span probabilities, fanned out over a rayon pool
//! 6. Roll up to feeders and circuits, plus the focused impact reports
//!
//! A failure for one span is recorded in the diagnostics and the span gets a
//! probability of 0; it never aborts the other spans.

use std::collections::{BTreeMap, HashMap};

use polars::prelude::*;
use psps_core::{
    CombinationMethod, Diagnostics, GraphExport, GraphStats, IssueKind, PspsConfig, PspsError,
    PspsResult, Span, SpanGraph, SpanId, StationId, WeatherStation, WindReading,
};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::association::{
    associate_span, record_cycle, station_tuples_by_span, SpanAssociation, StationTuple,
};
use crate::exceedance::{ExceedanceTable, StationExceedance};
use crate::ranking::high_risk_stations;
use crate::risk::{span_probability, SpanRisk};
use crate::rollup::{
    span_event_rate, station_event_rates, GroupKey, ImpactReport, RollupTable, SpanMetrics,
};
use crate::table_err;

/// Fully materialized input tables.
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub stations: Vec<WeatherStation>,
    pub readings: Vec<WindReading>,
    pub spans: Vec<Span>,
}

/// Per-span probability table, ordered by span id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpanProbabilities {
    rows: BTreeMap<SpanId, SpanRisk>,
}

impl SpanProbabilities {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, span: &SpanId) -> Option<&SpanRisk> {
        self.rows.get(span)
    }

    pub fn probability(&self, span: &SpanId) -> Option<f64> {
        self.rows.get(span).map(|risk| risk.probability)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpanRisk> {
        self.rows.values()
    }

    pub fn probabilities(&self) -> BTreeMap<SpanId, f64> {
        self.rows
            .iter()
            .map(|(span, risk)| (span.clone(), risk.probability))
            .collect()
    }

    /// `globalid`, `psps_probability`, `station_count`
    pub fn to_dataframe(&self) -> PspsResult<DataFrame> {
        let ids: Vec<&str> = self.rows.keys().map(SpanId::as_str).collect();
        let probabilities: Vec<f64> = self.rows.values().map(|r| r.probability).collect();
        let counts: Vec<u64> = self
            .rows
            .values()
            .map(|r| r.station_count as u64)
            .collect();
        DataFrame::new(vec![
            Series::new("globalid", ids),
            Series::new("psps_probability", probabilities),
            Series::new("station_count", counts),
        ])
        .map_err(table_err)
    }
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub exceedance: ExceedanceTable,
    pub station_summary: Vec<StationExceedance>,
    pub associations: BTreeMap<SpanId, SpanAssociation>,
    pub span_probabilities: SpanProbabilities,
    pub feeders: RollupTable,
    pub circuits: RollupTable,
    pub feeder_impact: Option<ImpactReport>,
    pub circuit_impact: Option<ImpactReport>,
    /// Stations at or above `min_alert_probability`
    pub high_risk_stations: Vec<(StationId, f64)>,
    pub graph: GraphExport,
    pub graph_stats: GraphStats,
    pub diagnostics: Diagnostics,
}

pub struct Pipeline<'a> {
    config: &'a PspsConfig,
}

type SpanResult = PspsResult<(SpanAssociation, SpanRisk)>;

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PspsConfig) -> Self {
        Pipeline { config }
    }

    pub fn run(&self, inputs: &PipelineInputs) -> PspsResult<PipelineOutput> {
        self.config.validate()?;
        let graph = SpanGraph::build(&inputs.spans, &self.config.root_sentinels)?;
        let params = &self.config.parameters;
        let mut diagnostics = Diagnostics::new();

        info!(
            stations = inputs.stations.len(),
            readings = inputs.readings.len(),
            spans = inputs.spans.len(),
            "starting PSPS risk run"
        );

        let exceedance = ExceedanceTable::build(
            &inputs.stations,
            &inputs.readings,
            params.drop_peak_readings,
            &mut diagnostics,
        )?;
        let station_summary = exceedance.summaries();

        for dangling in graph.dangling_upstreams() {
            diagnostics.add_warning_for(
                IssueKind::MissingAssociation,
                format!("upstream span '{}' is not in the span table", dangling.upstream),
                dangling.span.as_str(),
            );
        }

        let tuples = station_tuples_by_span(&inputs.spans, &exceedance, &mut diagnostics);
        let results = self.evaluate_spans(&inputs.spans, &graph, &tuples, &exceedance)?;

        let rates = station_event_rates(&exceedance);
        let mut associations = BTreeMap::new();
        let mut rows = BTreeMap::new();
        let mut metrics = BTreeMap::new();
        for (span, result) in results {
            let (risk, events_per_year) = match result {
                Ok((association, risk)) => {
                    record_cycle(&association, &mut diagnostics);
                    if risk.empty_overlap() {
                        diagnostics.add_warning_for(
                            IssueKind::EmptyOverlap,
                            format!(
                                "{} associated stations share no reading dates",
                                risk.station_count
                            ),
                            span.as_str(),
                        );
                    }
                    let rate = span_event_rate(&association, &rates);
                    associations.insert(span.clone(), association);
                    (risk, rate)
                }
                Err(err) => {
                    warn!(span = %span, error = %err, "span evaluation failed");
                    diagnostics.add_error_for(
                        IssueKind::SpanFailure,
                        err.to_string(),
                        span.as_str(),
                    );
                    (failed_risk(&span, params.combination), 0.0)
                }
            };
            metrics.insert(
                span.clone(),
                SpanMetrics {
                    probability: risk.probability,
                    events_per_year,
                },
            );
            rows.insert(span, risk);
        }
        let span_probabilities = SpanProbabilities { rows };

        let fill = &self.config.fill;
        let feeders = RollupTable::build(&inputs.spans, &metrics, GroupKey::Feeder, fill);
        let circuits = RollupTable::build(&inputs.spans, &metrics, GroupKey::Circuit, fill);
        let feeder_impact = focused_impact(
            &feeders,
            params.parent_feeder_id.as_deref(),
            params.impact_years,
            &mut diagnostics,
        );
        let circuit_impact = focused_impact(
            &circuits,
            params.circuit_id.as_deref(),
            params.impact_years,
            &mut diagnostics,
        );

        let high_risk = high_risk_stations(&station_summary, params.min_alert_probability);

        info!(
            spans = span_probabilities.len(),
            feeders = feeders.len(),
            circuits = circuits.len(),
            diagnostics = %diagnostics.summary(),
            "PSPS risk run complete"
        );

        Ok(PipelineOutput {
            exceedance,
            station_summary,
            associations,
            span_probabilities,
            feeders,
            circuits,
            feeder_impact,
            circuit_impact,
            high_risk_stations: high_risk,
            graph: graph.export(),
            graph_stats: graph.stats(),
            diagnostics,
        })
    }

    fn evaluate_spans(
        &self,
        spans: &[Span],
        graph: &SpanGraph,
        tuples: &HashMap<SpanId, StationTuple>,
        table: &ExceedanceTable,
    ) -> PspsResult<Vec<(SpanId, SpanResult)>> {
        let params = &self.config.parameters;
        let evaluate = |span: &Span| -> (SpanId, SpanResult) {
            let result = associate_span(graph, &span.id, tuples, params.traversal).and_then(
                |association| {
                    let risk = span_probability(&association, params.combination, table)?;
                    Ok((association, risk))
                },
            );
            (span.id.clone(), result)
        };

        if !params.parallel {
            debug!(spans = spans.len(), "evaluating spans sequentially");
            return Ok(spans.iter().map(evaluate).collect());
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(params.worker_threads)
            .build()
            .map_err(|err| PspsError::Other(format!("building span worker pool: {err}")))?;
        debug!(
            spans = spans.len(),
            threads = pool.current_num_threads(),
            "evaluating spans in parallel"
        );
        Ok(pool.install(|| spans.par_iter().map(evaluate).collect()))
    }
}

fn failed_risk(span: &SpanId, method: CombinationMethod) -> SpanRisk {
    SpanRisk {
        span: span.clone(),
        probability: 0.0,
        method,
        station_count: 0,
        join: None,
    }
}

fn focused_impact(
    table: &RollupTable,
    id: Option<&str>,
    years: u32,
    diagnostics: &mut Diagnostics,
) -> Option<ImpactReport> {
    let id = id?;
    match table.impact(id, years) {
        Ok(report) => {
            info!(
                key = %report.key,
                id = %report.id,
                spans = report.span_count,
                mean_probability = report.mean_probability,
                projected = report.projected_customers_affected,
                at_mean_probability = report.customers_at_mean_probability,
                "impact report"
            );
            Some(report)
        }
        Err(err) => {
            warn!(error = %err, "impact report target missing");
            diagnostics.add_warning_for(IssueKind::LookupNotFound, err.to_string(), id);
            None
        }
    }
}
