//! Unified error type for the PSPS workspace
//!
//! [`PspsError`] covers the fatal failures of a pipeline run: structural input
//! problems, configuration mistakes, lookups that miss, and table operations
//! that fail. Conditions that only affect a single span (cycles, empty
//! overlaps, dangling upstream pointers) are not errors; they are collected as
//! [`crate::Diagnostics`] so one bad span never aborts the batch.
//!
//! # Example
//!
//! ```ignore
//! use psps_core::{PspsError, PspsResult};
//!
//! fn feeder_mean(table: &RollupTable, id: &str) -> PspsResult<f64> {
//!     Ok(table.get(id)?.mean_probability)
//! }
//! ```

use std::fmt;

use thiserror::Error;

/// What kind of entity a failed lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Feeder,
    Circuit,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LookupKind::Feeder => "feeder",
            LookupKind::Circuit => "circuit",
        };
        f.write_str(label)
    }
}

/// Unified error type for all PSPS operations.
#[derive(Error, Debug)]
pub enum PspsError {
    /// I/O errors (config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (bad values, unparsable TOML)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structural input errors; there is no sensible default, so these are fatal
    #[error("Invalid input in {table}: {message}")]
    InvalidInput { table: &'static str, message: String },

    /// A traversal was requested from a span that is not in the graph
    #[error("Span not found in graph: {0}")]
    SpanNotFound(String),

    /// A feeder or circuit lookup found nothing
    #[error("{kind} '{id}' not found")]
    NotFound { kind: LookupKind, id: String },

    /// DataFrame construction or join failures
    #[error("Table error: {0}")]
    Table(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using PspsError.
pub type PspsResult<T> = Result<T, PspsError>;

impl PspsError {
    /// Shorthand for an explicit not-found result.
    pub fn not_found(kind: LookupKind, id: impl Into<String>) -> Self {
        PspsError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Shorthand for a structural input error.
    pub fn invalid_input(table: &'static str, message: impl Into<String>) -> Self {
        PspsError::InvalidInput {
            table,
            message: message.into(),
        }
    }

    /// True when the error is a lookup miss rather than a real failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PspsError::NotFound { .. } | PspsError::SpanNotFound(_)
        )
    }
}

impl From<String> for PspsError {
    fn from(s: String) -> Self {
        PspsError::Other(s)
    }
}

impl From<&str> for PspsError {
    fn from(s: &str) -> Self {
        PspsError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for PspsError {
    fn from(err: serde_json::Error) -> Self {
        PspsError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PspsError {
    fn from(err: toml::de::Error) -> Self {
        PspsError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PspsError {
    fn from(err: toml::ser::Error) -> Self {
        PspsError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PspsError::invalid_input("spans", "empty globalid at row 3");
        assert!(err.to_string().contains("Invalid input in spans"));
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn test_not_found_display() {
        let err = PspsError::not_found(LookupKind::Feeder, "222");
        assert_eq!(err.to_string(), "feeder '222' not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PspsError = io_err.into();
        assert!(matches!(err, PspsError::Io(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> PspsResult<()> {
            Err(PspsError::Table("join failed".into()))
        }

        fn outer() -> PspsResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
