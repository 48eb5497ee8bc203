//! Wind threshold exceedance table.
//!
//! Joins wind readings against station metadata (inner join on the station
//! code) and flags every reading whose wind speed is strictly above the
//! station's alert threshold. The per-station rollup of those flags is the
//! "combined count" table: above-threshold count, total count, and their
//! ratio as the station's PSPS probability.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use polars::prelude::*;
use psps_core::{
    Diagnostics, IssueKind, PspsError, PspsResult, StationId, WeatherStation, WindReading,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::table_err;

const DAYS_PER_YEAR: f64 = 365.25;

/// A reading annotated with its exceedance flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceedanceRecord {
    pub date: NaiveDateTime,
    pub wind_speed: f64,
    pub exceeds_threshold: bool,
}

/// Station-level exceedance summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationExceedance {
    pub station: StationId,
    pub alert_threshold: f64,
    pub above_threshold_count: usize,
    pub total_count: usize,
    /// `above_threshold_count / total_count`, or 0 with no readings
    pub probability: f64,
    pub first_reading: Option<NaiveDateTime>,
    pub last_reading: Option<NaiveDateTime>,
}

impl StationExceedance {
    /// Readings per year of record, the expected event rate `r` of the
    /// annual impact model. A record confined to a single day counts as one
    /// day long.
    pub fn expected_events_per_year(&self) -> f64 {
        match (self.first_reading, self.last_reading) {
            (Some(first), Some(last)) if self.total_count > 0 => {
                let days = ((last - first).num_days() as f64).max(1.0);
                let years = days / DAYS_PER_YEAR;
                self.total_count as f64 / years
            }
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct StationRecords {
    alert_threshold: f64,
    records: Vec<ExceedanceRecord>,
}

/// Exceedance-annotated readings grouped by station, sorted by date.
#[derive(Debug, Clone, Default)]
pub struct ExceedanceTable {
    stations: BTreeMap<StationId, StationRecords>,
}

impl ExceedanceTable {
    /// Annotate `readings` against `stations`.
    ///
    /// Malformed station metadata (blank id, duplicate id, non-finite
    /// threshold) is fatal. Readings for unknown stations and non-finite wind
    /// speeds are dropped and reported through `diagnostics`.
    pub fn build(
        stations: &[WeatherStation],
        readings: &[WindReading],
        drop_peak_readings: bool,
        diagnostics: &mut Diagnostics,
    ) -> PspsResult<Self> {
        let mut table = BTreeMap::new();
        for station in stations {
            if station.id.as_str().trim().is_empty() {
                return Err(PspsError::invalid_input(
                    "weather stations",
                    "blank weatherstationcode",
                ));
            }
            if !station.alert_threshold.is_finite() {
                return Err(PspsError::invalid_input(
                    "weather stations",
                    format!("station {} has a non-finite alert threshold", station.id),
                ));
            }
            let previous = table.insert(
                station.id.clone(),
                StationRecords {
                    alert_threshold: station.alert_threshold,
                    records: Vec::new(),
                },
            );
            if previous.is_some() {
                return Err(PspsError::invalid_input(
                    "weather stations",
                    format!("duplicate weatherstationcode {}", station.id),
                ));
            }
        }

        let peak = if drop_peak_readings {
            readings
                .iter()
                .map(|r| r.wind_speed)
                .filter(|speed| speed.is_finite())
                .reduce(f64::max)
        } else {
            None
        };

        let mut unknown: HashMap<&StationId, usize> = HashMap::new();
        let mut non_finite = 0usize;
        let mut peaks = 0usize;
        for reading in readings {
            if !reading.wind_speed.is_finite() {
                non_finite += 1;
                continue;
            }
            if peak.is_some_and(|max| reading.wind_speed >= max) {
                peaks += 1;
                continue;
            }
            let Some(entry) = table.get_mut(&reading.station) else {
                *unknown.entry(&reading.station).or_default() += 1;
                continue;
            };
            entry.records.push(ExceedanceRecord {
                date: reading.date,
                wind_speed: reading.wind_speed,
                exceeds_threshold: reading.wind_speed > entry.alert_threshold,
            });
        }

        let mut unknown: Vec<_> = unknown.into_iter().collect();
        unknown.sort();
        for (station, count) in unknown {
            warn!(station = %station, count, "dropping readings for station without metadata");
            diagnostics.add_warning_for(
                IssueKind::DroppedReading,
                format!("{count} readings reference a station with no metadata"),
                station.as_str(),
            );
        }
        if non_finite > 0 {
            diagnostics.add_warning(
                IssueKind::DroppedReading,
                format!("{non_finite} readings had a non-finite wind speed"),
            );
        }
        if peaks > 0 {
            debug!(peaks, "dropped peak wind speed readings");
            diagnostics.add_warning(
                IssueKind::DroppedReading,
                format!("{peaks} readings at the peak wind speed were filtered"),
            );
        }

        for entry in table.values_mut() {
            entry.records.sort_by_key(|record| record.date);
        }

        let table = ExceedanceTable { stations: table };
        info!(
            stations = table.station_count(),
            readings = table.reading_count(),
            "built exceedance table"
        );
        Ok(table)
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn reading_count(&self) -> usize {
        self.stations.values().map(|s| s.records.len()).sum()
    }

    pub fn contains(&self, station: &StationId) -> bool {
        self.stations.contains_key(station)
    }

    /// Date-sorted records for one station.
    pub fn records(&self, station: &StationId) -> Option<&[ExceedanceRecord]> {
        self.stations.get(station).map(|s| s.records.as_slice())
    }

    pub fn summary(&self, station: &StationId) -> Option<StationExceedance> {
        self.stations
            .get(station)
            .map(|entry| summarize(station, entry))
    }

    /// Summary for every station with metadata, ordered by station code.
    pub fn summaries(&self) -> Vec<StationExceedance> {
        self.stations
            .iter()
            .map(|(station, entry)| summarize(station, entry))
            .collect()
    }

    /// Flat frame: `weatherstationcode`, `date` (epoch millis), `wind_speed`,
    /// `exceeds_threshold`.
    pub fn to_dataframe(&self) -> PspsResult<DataFrame> {
        let rows = self.reading_count();
        let mut codes = Vec::with_capacity(rows);
        let mut dates = Vec::with_capacity(rows);
        let mut speeds = Vec::with_capacity(rows);
        let mut flags = Vec::with_capacity(rows);
        for (station, entry) in &self.stations {
            for record in &entry.records {
                codes.push(station.to_string());
                dates.push(epoch_millis(record.date));
                speeds.push(record.wind_speed);
                flags.push(record.exceeds_threshold);
            }
        }
        DataFrame::new(vec![
            Series::new("weatherstationcode", codes),
            Series::new("date", dates),
            Series::new("wind_speed", speeds),
            Series::new("exceeds_threshold", flags),
        ])
        .map_err(table_err)
    }

    /// Two-column frame for the time join: `date` and `exceeds_<index>`.
    ///
    /// A station without records yields an empty frame with the same schema.
    pub fn station_frame(&self, station: &StationId, index: usize) -> PspsResult<DataFrame> {
        let records = self.records(station).unwrap_or(&[]);
        let dates: Vec<i64> = records.iter().map(|r| epoch_millis(r.date)).collect();
        let flags: Vec<bool> = records.iter().map(|r| r.exceeds_threshold).collect();
        DataFrame::new(vec![
            Series::new("date", dates),
            Series::new(&exceeds_column(index), flags),
        ])
        .map_err(table_err)
    }
}

pub(crate) fn exceeds_column(index: usize) -> String {
    format!("exceeds_{index}")
}

fn epoch_millis(date: NaiveDateTime) -> i64 {
    date.and_utc().timestamp_millis()
}

fn summarize(station: &StationId, entry: &StationRecords) -> StationExceedance {
    let total_count = entry.records.len();
    let above_threshold_count = entry
        .records
        .iter()
        .filter(|r| r.exceeds_threshold)
        .count();
    let probability = if total_count == 0 {
        0.0
    } else {
        above_threshold_count as f64 / total_count as f64
    };
    StationExceedance {
        station: station.clone(),
        alert_threshold: entry.alert_threshold,
        above_threshold_count,
        total_count,
        probability,
        first_reading: entry.records.first().map(|r| r.date),
        last_reading: entry.records.last().map(|r| r.date),
    }
}
