//! Feeder and circuit rollups.
//!
//! Groups span probabilities by parent feeder (or circuit) and applies the
//! annual customer-impact model:
//!
//! ```text
//! P_annual(span)  = 1 - (1 - p)^r
//! C_annual(span)  = P_annual × customers
//! C_projected     = Σ C_annual × years
//! ```
//!
//! where `r` is the mean expected events per year of the span's stations.
//! Impact reports also carry the coarser group-level figure
//! `customer_total × mean_probability` alongside the per-span model.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use polars::prelude::*;
use psps_core::{
    FeederId, FillPolicies, LookupKind, MissingValue, PspsError, PspsResult, Span, SpanId,
    StationId,
};
use serde::Serialize;
use tracing::debug;

use crate::association::SpanAssociation;
use crate::exceedance::ExceedanceTable;
use crate::table_err;

/// Attribute spans are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Feeder,
    Circuit,
}

impl GroupKey {
    fn of<'a>(&self, span: &'a Span) -> Option<&'a str> {
        match self {
            GroupKey::Feeder => span.feeder.as_ref().map(|id| id.as_str()),
            GroupKey::Circuit => span.circuit.as_ref().map(|id| id.as_str()),
        }
    }

    fn lookup_kind(&self) -> LookupKind {
        match self {
            GroupKey::Feeder => LookupKind::Feeder,
            GroupKey::Circuit => LookupKind::Circuit,
        }
    }

    /// Column name in exported frames.
    pub fn column(&self) -> &'static str {
        match self {
            GroupKey::Feeder => "parent_feederid",
            GroupKey::Circuit => "upstreamardfacilityid",
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Feeder => write!(f, "feeder"),
            GroupKey::Circuit => write!(f, "circuit"),
        }
    }
}

/// Per-span inputs to a rollup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpanMetrics {
    pub probability: f64,
    /// Mean expected events per year over the span's stations
    pub events_per_year: f64,
}

impl SpanMetrics {
    pub fn annual_probability(&self) -> f64 {
        annual_probability(self.probability, self.events_per_year)
    }
}

/// `1 - (1 - p)^r`
pub fn annual_probability(probability: f64, events_per_year: f64) -> f64 {
    if probability <= 0.0 || events_per_year <= 0.0 {
        return 0.0;
    }
    1.0 - (1.0 - probability).powf(events_per_year)
}

/// Expected events per year for every station with exceedance data.
pub fn station_event_rates(table: &ExceedanceTable) -> HashMap<StationId, f64> {
    table
        .summaries()
        .into_iter()
        .map(|summary| {
            let rate = summary.expected_events_per_year();
            (summary.station, rate)
        })
        .collect()
}

/// Mean rate over the associated stations, 0 when there are none.
pub fn span_event_rate(association: &SpanAssociation, rates: &HashMap<StationId, f64>) -> f64 {
    let known: Vec<f64> = association
        .stations
        .iter()
        .filter_map(|tuple| rates.get(&tuple.station).copied())
        .collect();
    if known.is_empty() {
        0.0
    } else {
        known.iter().sum::<f64>() / known.len() as f64
    }
}

/// Aggregate for one feeder or circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub id: String,
    pub span_count: usize,
    /// Spans that contributed to `mean_probability`
    pub probability_count: usize,
    pub mean_probability: f64,
    pub customer_total: u64,
    /// Spans left out of `customer_total` for lack of a count
    pub missing_customers: usize,
    pub annual_customers_affected: f64,
}

#[derive(Default)]
struct Accumulator {
    span_count: usize,
    probabilities: Vec<f64>,
    customer_total: u64,
    missing_customers: usize,
    annual_customers_affected: f64,
}

/// Group summaries keyed by feeder or circuit id.
#[derive(Debug, Clone, Serialize)]
pub struct RollupTable {
    pub key: GroupKey,
    groups: BTreeMap<String, GroupSummary>,
}

impl RollupTable {
    /// Roll `spans` up by `key`.
    ///
    /// Spans without the grouping attribute are left out. A span absent from
    /// `metrics` follows `fill.probability`; a span without customers follows
    /// `fill.customer_total`.
    pub fn build(
        spans: &[Span],
        metrics: &BTreeMap<SpanId, SpanMetrics>,
        key: GroupKey,
        fill: &FillPolicies,
    ) -> Self {
        let mut acc: BTreeMap<&str, Accumulator> = BTreeMap::new();
        for span in spans {
            let Some(id) = key.of(span) else {
                continue;
            };
            let entry = acc.entry(id).or_default();
            entry.span_count += 1;

            let span_metrics = metrics.get(&span.id);
            match (span_metrics, fill.probability) {
                (Some(m), _) => entry.probabilities.push(m.probability),
                (None, MissingValue::Zero) => entry.probabilities.push(0.0),
                (None, MissingValue::Skip) => {}
            }

            let customers = match (span.customers, fill.customer_total) {
                (Some(count), _) => count,
                (None, MissingValue::Zero) => 0,
                (None, MissingValue::Skip) => {
                    entry.missing_customers += 1;
                    0
                }
            };
            entry.customer_total += customers;
            if let Some(m) = span_metrics {
                entry.annual_customers_affected += m.annual_probability() * customers as f64;
            }
        }

        let groups: BTreeMap<String, GroupSummary> = acc
            .into_iter()
            .map(|(id, acc)| {
                let mean_probability = if acc.probabilities.is_empty() {
                    0.0
                } else {
                    acc.probabilities.iter().sum::<f64>() / acc.probabilities.len() as f64
                };
                let summary = GroupSummary {
                    id: id.to_string(),
                    span_count: acc.span_count,
                    probability_count: acc.probabilities.len(),
                    mean_probability,
                    customer_total: acc.customer_total,
                    missing_customers: acc.missing_customers,
                    annual_customers_affected: acc.annual_customers_affected,
                };
                (id.to_string(), summary)
            })
            .collect();

        debug!(key = %key, groups = groups.len(), "rolled up span probabilities");
        RollupTable { key, groups }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupSummary> {
        self.groups.values()
    }

    /// Summary for `id`, or a not-found error naming the feeder/circuit.
    pub fn get(&self, id: &str) -> PspsResult<&GroupSummary> {
        self.groups
            .get(id)
            .ok_or_else(|| PspsError::not_found(self.key.lookup_kind(), id))
    }

    /// Impact report for `id` projected over `years`.
    pub fn impact(&self, id: &str, years: u32) -> PspsResult<ImpactReport> {
        let summary = self.get(id)?;
        let at_mean = summary.customer_total as f64 * summary.mean_probability;
        Ok(ImpactReport {
            key: self.key,
            id: summary.id.clone(),
            span_count: summary.span_count,
            mean_probability: summary.mean_probability,
            customer_total: summary.customer_total,
            annual_customers_affected: summary.annual_customers_affected,
            years,
            projected_customers_affected: summary.annual_customers_affected * f64::from(years),
            customers_at_mean_probability: at_mean,
            projected_at_mean_probability: at_mean * f64::from(years),
        })
    }

    pub fn to_dataframe(&self) -> PspsResult<DataFrame> {
        let ids: Vec<&str> = self.groups.values().map(|g| g.id.as_str()).collect();
        let span_counts: Vec<u64> = self.groups.values().map(|g| g.span_count as u64).collect();
        let means: Vec<f64> = self.groups.values().map(|g| g.mean_probability).collect();
        let customers: Vec<u64> = self.groups.values().map(|g| g.customer_total).collect();
        let annual: Vec<f64> = self
            .groups
            .values()
            .map(|g| g.annual_customers_affected)
            .collect();
        DataFrame::new(vec![
            Series::new(self.key.column(), ids),
            Series::new("span_count", span_counts),
            Series::new("mean_probability", means),
            Series::new("cust_total", customers),
            Series::new("annual_customers_affected", annual),
        ])
        .map_err(table_err)
    }
}

/// Customer impact for a single feeder or circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactReport {
    pub key: GroupKey,
    pub id: String,
    pub span_count: usize,
    pub mean_probability: f64,
    pub customer_total: u64,
    pub annual_customers_affected: f64,
    pub years: u32,
    /// `annual_customers_affected × years`
    pub projected_customers_affected: f64,
    /// `customer_total × mean_probability`, ignoring per-span event rates
    pub customers_at_mean_probability: f64,
    /// `customers_at_mean_probability × years`
    pub projected_at_mean_probability: f64,
}

impl ImpactReport {
    pub fn feeder(&self) -> Option<FeederId> {
        match self.key {
            GroupKey::Feeder => Some(FeederId::new(self.id.clone())),
            GroupKey::Circuit => None,
        }
    }
}
