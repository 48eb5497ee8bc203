//! Pipeline configuration.
//!
//! [`PspsConfig`] is passed by reference to every stage. It is usually read
//! from a TOML file; every section is `#[serde(default)]`, so partial files
//! only override what they name.
//!
//! ```toml
//! root_sentinels = ["ROOT"]
//!
//! [parameters]
//! parent_feeder_id = "222"
//! impact_years = 10
//! traversal = "dfs"
//! combination = "time_join"
//!
//! [fill]
//! customer_total = "zero"
//! probability = "skip"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PspsError, PspsResult};
use crate::graph::TraversalOrder;

/// Top-level configuration for a PSPS run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PspsConfig {
    /// Upstream values that mean "no upstream span" besides blank/absent.
    pub root_sentinels: Vec<String>,

    /// Input table locations, for callers that load from disk.
    pub data_sources: DataSources,

    /// Output locations, for callers that persist results.
    pub output: OutputPaths,

    /// Tunable parameters for the computation.
    pub parameters: Parameters,

    /// Per-field policies for missing values.
    pub fill: FillPolicies,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSources {
    /// Station metadata with locations.
    pub gis_weatherstation: Option<PathBuf>,

    /// Station alert threshold summary.
    pub station_summary: Option<PathBuf>,

    /// Wind speed readings snapshot.
    pub windspeed: Option<PathBuf>,

    /// Span table (`dev_wings_agg_span`).
    pub spans: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    pub processed_data: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            processed_data: PathBuf::from("processed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Stations at or above this probability count as high risk.
    pub min_alert_probability: f64,

    /// Feeder for the focused impact report.
    pub parent_feeder_id: Option<String>,

    /// Circuit for the focused summary lookup.
    pub circuit_id: Option<String>,

    /// Horizon for the multi-year customer projection.
    pub impact_years: u32,

    /// Upstream traversal order.
    pub traversal: TraversalOrder,

    /// How station exceedances combine into a span probability.
    pub combination: CombinationMethod,

    /// Discard readings equal to the global maximum wind speed.
    pub drop_peak_readings: bool,

    /// Fan per-span work out over rayon.
    pub parallel: bool,

    /// Number of worker threads (0 = rayon default).
    pub worker_threads: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            min_alert_probability: 0.0,
            parent_feeder_id: None,
            circuit_id: None,
            impact_years: 10,
            traversal: TraversalOrder::DepthFirst,
            combination: CombinationMethod::TimeJoin,
            drop_peak_readings: false,
            parallel: true,
            worker_threads: 0,
        }
    }
}

/// Span probability formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CombinationMethod {
    /// Align station records on shared dates and OR the exceedance flags.
    #[default]
    TimeJoin,
    /// `1 - Π(1 - p)` over per-station probabilities; assumes independence.
    IndependentProduct,
}

/// What to do when a field is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingValue {
    /// Treat the missing value as zero.
    Zero,
    /// Leave the record out of the aggregate.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FillPolicies {
    /// Spans without `cust_total`.
    pub customer_total: MissingValue,

    /// Spans without a computed probability in a rollup.
    pub probability: MissingValue,
}

impl Default for FillPolicies {
    fn default() -> Self {
        Self {
            customer_total: MissingValue::Zero,
            probability: MissingValue::Skip,
        }
    }
}

impl PspsConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> PspsResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> PspsResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> PspsResult<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> PspsResult<()> {
        let threshold = self.parameters.min_alert_probability;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PspsError::Config(format!(
                "min_alert_probability must be within [0, 1], got {threshold}"
            )));
        }
        if self.parameters.impact_years == 0 {
            return Err(PspsError::Config(
                "impact_years must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = PspsConfig::default();
        assert_eq!(config.parameters.impact_years, 10);
        assert_eq!(config.parameters.traversal, TraversalOrder::DepthFirst);
        assert_eq!(config.parameters.combination, CombinationMethod::TimeJoin);
        assert_eq!(config.fill.customer_total, MissingValue::Zero);
        assert_eq!(config.fill.probability, MissingValue::Skip);
        assert!(config.root_sentinels.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_parsing() {
        let toml = r#"
            root_sentinels = ["ROOT", "0"]

            [parameters]
            parent_feeder_id = "222"
            traversal = "bfs"
            combination = "independent_product"

            [fill]
            probability = "zero"
        "#;

        let config = PspsConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.parameters.parent_feeder_id.as_deref(), Some("222"));
        assert_eq!(config.parameters.traversal, TraversalOrder::BreadthFirst);
        assert_eq!(
            config.parameters.combination,
            CombinationMethod::IndependentProduct
        );
        assert_eq!(config.parameters.impact_years, 10);
        assert_eq!(config.fill.probability, MissingValue::Zero);
        assert_eq!(config.fill.customer_total, MissingValue::Zero);
        assert_eq!(config.root_sentinels, vec!["ROOT", "0"]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = PspsConfig::from_toml_str("[parameters]\nmin_alert_probability = 1.5\n")
            .unwrap_err();
        assert!(matches!(err, PspsError::Config(_)));

        let err = PspsConfig::from_toml_str("[parameters]\nimpact_years = 0\n").unwrap_err();
        assert!(err.to_string().contains("impact_years"));
    }

    #[test]
    fn test_unparsable_toml_is_config_error() {
        let err = PspsConfig::from_toml_str("[parameters\n").unwrap_err();
        assert!(matches!(err, PspsError::Config(_)));
    }

    #[test]
    fn test_save_and_load() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let mut config = PspsConfig::default();
        config.parameters.impact_years = 5;
        config.parameters.circuit_id = Some("CKT-9".to_string());
        config.data_sources.windspeed = Some(PathBuf::from("data/windspeed.csv"));

        config.save_to(&path).unwrap();
        let loaded = PspsConfig::load_from(&path).unwrap();

        assert_eq!(loaded.parameters.impact_years, 5);
        assert_eq!(loaded.parameters.circuit_id.as_deref(), Some("CKT-9"));
        assert_eq!(
            loaded.data_sources.windspeed,
            Some(PathBuf::from("data/windspeed.csv"))
        );
    }
}
