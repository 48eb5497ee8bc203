//! # psps-core: Span Network Modeling Core
//!
//! Data structures shared by the PSPS (Public Safety Power Shutoff) risk
//! engine: typed identifiers, the input records, the span dependency graph,
//! diagnostics, configuration, and the unified error type.
//!
//! ## Design Philosophy
//!
//! The distribution network is modeled as a **directed graph of spans** where
//! each span has exactly one edge pointing at its immediate upstream span
//! (toward the power source). That single pointer is the only topology the
//! engine needs:
//!
//! - **Upstream traversal** finds every span whose exposure can de-energize a
//!   given span, and therefore every weather station that matters to it.
//! - **Downstream traversal** finds every span a given span feeds.
//!
//! Snapshots are not trusted to be acyclic. Traversals are iterative, keep a
//! visited set, and report cycles rather than looping.
//!
//! ## Quick Start
//!
//! ```rust
//! use psps_core::*;
//!
//! let spans = vec![
//!     Span::new("S1"),
//!     Span::new("S2").with_upstream("S1").with_station("WS-A"),
//!     Span::new("S3").with_upstream("S2").with_feeder("222").with_customers(40),
//! ];
//!
//! let graph = SpanGraph::build(&spans, &[]).unwrap();
//! let up = graph
//!     .upstream(&SpanId::new("S3"), TraversalOrder::DepthFirst)
//!     .unwrap();
//! assert_eq!(up.nodes, vec![SpanId::new("S2"), SpanId::new("S1")]);
//! assert!(!up.is_cyclic());
//! ```
//!
//! ## ID System
//!
//! Spans, stations, feeders and circuits are all keyed by strings in the
//! source tables. Each gets its own newtype so a feeder id can never be passed
//! where a span id is expected.
//!
//! ## Modules
//!
//! - [`graph`] - Span dependency graph, traversals, export
//! - [`model`] - Input records (stations, readings, spans)
//! - [`config`] - Pipeline configuration and fill policies
//! - [`diagnostics`] - Per-span issue collection
//! - [`error`] - Unified error type

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod model;

pub use config::{
    CombinationMethod, DataSources, FillPolicies, MissingValue, OutputPaths, Parameters,
    PspsConfig,
};
pub use diagnostics::{DiagnosticIssue, Diagnostics, IssueKind, Severity};
pub use error::{LookupKind, PspsError, PspsResult};
pub use graph::{
    CycleReport, DanglingUpstream, GraphExport, GraphStats, SpanGraph, Traversal, TraversalOrder,
};
pub use model::{Span, WeatherStation, WindReading};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[inline]
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }
    };
}

string_id!(
    /// Span `globalid`.
    SpanId
);
string_id!(
    /// Weather station `weatherstationcode`.
    StationId
);
string_id!(
    /// Parent feeder id (`parent_feederid`).
    FeederId
);
string_id!(
    /// Parent circuit id (`upstreamardfacilityid`).
    CircuitId
);
