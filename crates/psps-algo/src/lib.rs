//! # psps-algo: PSPS Risk Propagation
//!
//! Turns station wind readings and a span network into per-span shut-off
//! probabilities and feeder/circuit customer-impact rollups.
//!
//! ## Stages
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Threshold exceedance | [`exceedance`] | Flagged readings, per-station probability |
//! | Station association | [`association`] | Upstream station set per span |
//! | Span risk | [`risk`] | Time-joined (or independence) probability |
//! | Rollup | [`rollup`] | Feeder/circuit summaries, annual impact |
//! | Ranking | [`ranking`] | Top spans, station impact, high-risk stations |
//!
//! [`Pipeline`] runs every stage from a [`psps_core::PspsConfig`].
//!
//! ## Span probability
//!
//! The default combination aligns the records of all stations upstream of a
//! span on their common dates and counts the share of those dates on which
//! any station was above threshold. This keeps correlated storms from being
//! double counted. [`CombinationMethod::IndependentProduct`] trades that for
//! `1 - Π(1 - p)` when records do not overlap.
//!
//! [`CombinationMethod::IndependentProduct`]: psps_core::CombinationMethod::IndependentProduct
//!
//! ## Example
//!
//! ```ignore
//! use psps_algo::{Pipeline, PipelineInputs};
//! use psps_core::PspsConfig;
//!
//! let config = PspsConfig::load_from("psps.toml".as_ref())?;
//! let output = Pipeline::new(&config).run(&inputs)?;
//! for risk in output.span_probabilities.iter() {
//!     println!("{}: {:.3}", risk.span, risk.probability);
//! }
//! ```

use polars::prelude::PolarsError;
use psps_core::PspsError;

pub mod association;
pub mod exceedance;
pub mod pipeline;
pub mod ranking;
pub mod risk;
pub mod rollup;

pub use association::{
    associate, associate_span, station_tuples_by_span, SpanAssociation, StationTuple,
};
pub use exceedance::{ExceedanceRecord, ExceedanceTable, StationExceedance};
pub use pipeline::{Pipeline, PipelineInputs, PipelineOutput, SpanProbabilities};
pub use ranking::{
    greatest_station_impact, high_risk_stations, highest_probability_spans, ProbabilityRanking,
    StationImpact,
};
pub use risk::{
    independent_probability, span_probability, time_join_probability, JoinOutcome, SpanRisk,
};
pub use rollup::{
    annual_probability, GroupKey, GroupSummary, ImpactReport, RollupTable, SpanMetrics,
};

pub(crate) fn table_err(err: PolarsError) -> PspsError {
    PspsError::Table(err.to_string())
}
