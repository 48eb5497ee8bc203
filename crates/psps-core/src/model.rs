//! Input records consumed by the risk engine.
//!
//! These mirror the three input tables: weather station metadata, wind
//! readings, and span records. Loading them from disk happens elsewhere; the
//! engine only sees fully-materialized slices of these structs.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{CircuitId, FeederId, SpanId, StationId};

/// Weather station metadata (`weatherstationcode`, `alert`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherStation {
    pub id: StationId,
    /// Wind speed above which a reading counts as an exceedance
    pub alert_threshold: f64,
    /// Carried through for reporting; never used in the computation
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl WeatherStation {
    pub fn new(id: impl Into<StationId>, alert_threshold: f64) -> Self {
        Self {
            id: id.into(),
            alert_threshold,
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }
}

/// One wind speed measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindReading {
    pub station: StationId,
    pub date: NaiveDateTime,
    pub wind_speed: f64,
}

impl WindReading {
    pub fn new(station: impl Into<StationId>, date: NaiveDateTime, wind_speed: f64) -> Self {
        Self {
            station: station.into(),
            date,
            wind_speed,
        }
    }
}

/// A conductor span (`globalid`) and its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub id: SpanId,
    /// `upstream_span_id`; `None` marks a root
    pub upstream: Option<SpanId>,
    /// `parent_feederid`
    pub feeder: Option<FeederId>,
    /// `upstreamardfacilityid`
    pub circuit: Option<CircuitId>,
    /// `cust_total`
    pub customers: Option<u64>,
    /// Directly associated station from the spatial join
    pub station: Option<StationId>,
}

impl Span {
    pub fn new(id: impl Into<SpanId>) -> Self {
        Self {
            id: id.into(),
            upstream: None,
            feeder: None,
            circuit: None,
            customers: None,
            station: None,
        }
    }

    pub fn with_upstream(mut self, upstream: impl Into<SpanId>) -> Self {
        self.upstream = Some(upstream.into());
        self
    }

    pub fn with_feeder(mut self, feeder: impl Into<FeederId>) -> Self {
        self.feeder = Some(feeder.into());
        self
    }

    pub fn with_circuit(mut self, circuit: impl Into<CircuitId>) -> Self {
        self.circuit = Some(circuit.into());
        self
    }

    pub fn with_customers(mut self, customers: u64) -> Self {
        self.customers = Some(customers);
        self
    }

    pub fn with_station(mut self, station: impl Into<StationId>) -> Self {
        self.station = Some(station.into());
        self
    }

    /// Upstream pointer with blank values and configured sentinels mapped to root.
    pub fn upstream_id(&self, root_sentinels: &[String]) -> Option<&SpanId> {
        self.upstream.as_ref().filter(|upstream| {
            let raw = upstream.as_str().trim();
            !raw.is_empty() && !root_sentinels.iter().any(|s| s == raw)
        })
    }
}
