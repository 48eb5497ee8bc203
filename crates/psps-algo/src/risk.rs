//! Span shut-off probability.
//!
//! A span is de-energized whenever any station on its upstream chain is above
//! threshold. The primary estimate aligns the stations' exceedance records in
//! time (successive inner joins on `date`) and counts the fraction of joined
//! rows with at least one flag set. The independence product is an opt-in
//! approximation for when the records barely overlap.

use polars::prelude::*;
use psps_core::{CombinationMethod, PspsResult, SpanId, StationId};
use serde::Serialize;
use tracing::debug;

use crate::association::{SpanAssociation, StationTuple};
use crate::exceedance::{exceeds_column, ExceedanceTable};
use crate::table_err;

/// Result of the time-aligned join.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct JoinOutcome {
    pub probability: f64,
    /// Dates present for every station
    pub joined_rows: usize,
    /// Joined rows where at least one station exceeded its threshold
    pub exceeding_rows: usize,
}

impl JoinOutcome {
    /// No station was observed on a common date.
    pub fn is_empty_overlap(&self) -> bool {
        self.joined_rows == 0
    }
}

/// Probability and provenance for one span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanRisk {
    pub span: SpanId,
    pub probability: f64,
    pub method: CombinationMethod,
    pub station_count: usize,
    /// Present for the time join
    pub join: Option<JoinOutcome>,
}

impl SpanRisk {
    /// Associated stations existed but their records never lined up.
    pub fn empty_overlap(&self) -> bool {
        self.station_count > 0 && self.join.is_some_and(|join| join.is_empty_overlap())
    }
}

/// Time-aligned probability over `stations`, combined in the given order.
///
/// No stations, or an empty intersection of dates, gives probability 0.
pub fn time_join_probability(
    stations: &[&StationId],
    table: &ExceedanceTable,
) -> PspsResult<JoinOutcome> {
    let Some((first, rest)) = stations.split_first() else {
        return Ok(JoinOutcome::default());
    };

    let mut joined = table.station_frame(first, 0)?;
    for (offset, station) in rest.iter().enumerate() {
        let frame = table.station_frame(station, offset + 1)?;
        joined = joined
            .inner_join(&frame, ["date"], ["date"])
            .map_err(table_err)?;
        if joined.height() == 0 {
            break;
        }
    }

    let joined_rows = joined.height();
    if joined_rows == 0 {
        return Ok(JoinOutcome::default());
    }

    let mut any = flags(&joined, 0)?;
    for index in 1..stations.len() {
        any = &any | &flags(&joined, index)?;
    }
    let exceeding_rows = any
        .into_iter()
        .filter(|flag| matches!(flag, Some(true)))
        .count();

    Ok(JoinOutcome {
        probability: exceeding_rows as f64 / joined_rows as f64,
        joined_rows,
        exceeding_rows,
    })
}

fn flags(joined: &DataFrame, index: usize) -> PspsResult<BooleanChunked> {
    let column = joined
        .column(&exceeds_column(index))
        .map_err(table_err)?;
    Ok(column.bool().map_err(table_err)?.clone())
}

/// `1 - Π(1 - p)` over the given per-station probabilities.
pub fn independent_probability<I>(probabilities: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let survive: f64 = probabilities.into_iter().map(|p| 1.0 - p).product();
    1.0 - survive
}

/// Shut-off probability for an associated span.
pub fn span_probability(
    association: &SpanAssociation,
    method: CombinationMethod,
    table: &ExceedanceTable,
) -> PspsResult<SpanRisk> {
    let station_count = association.station_count();
    let (probability, join) = match method {
        CombinationMethod::TimeJoin => {
            let stations = association.station_ids();
            let outcome = time_join_probability(&stations, table)?;
            (outcome.probability, Some(outcome))
        }
        CombinationMethod::IndependentProduct => {
            let probability = if association.is_empty() {
                0.0
            } else {
                independent_probability(
                    association
                        .stations
                        .iter()
                        .map(|tuple: &StationTuple| tuple.probability),
                )
            };
            (probability, None)
        }
    };

    debug!(
        span = %association.span,
        stations = station_count,
        probability,
        "span probability"
    );
    Ok(SpanRisk {
        span: association.span.clone(),
        probability,
        method,
        station_count,
        join,
    })
}
