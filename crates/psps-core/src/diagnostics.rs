//! Per-span and per-record diagnostics collected during a pipeline run.
//!
//! Spans whose upstream chain loops, whose stations never overlap in time, or
//! whose upstream pointer dangles are not fatal. Each of those conditions is
//! recorded here against the offending entity and the batch keeps going.
//!
//! # Example
//!
//! ```
//! use psps_core::diagnostics::{Diagnostics, IssueKind};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning_for(IssueKind::EmptyOverlap, "no common dates", "span-7");
//! diag.add_error_for(IssueKind::CycleDetected, "upstream chain loops", "span-9");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! assert_eq!(diag.issues_of(IssueKind::CycleDetected).count(), 1);
//! ```

use serde::Serialize;

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but the computation continued with a well-defined value
    Warning,
    /// The entity's result is degraded (e.g. traversal cut short by a cycle)
    Error,
}

/// The condition a diagnostic describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A span's upstream id is not itself a span; treated as a root boundary
    MissingAssociation,
    /// No common time points across a span's stations; probability is 0
    EmptyOverlap,
    /// A span's upstream chain loops back on itself
    CycleDetected,
    /// A requested feeder/circuit/station id is absent
    LookupNotFound,
    /// A wind reading was dropped (unknown station, non-finite value, peak filter)
    DroppedReading,
    /// A span references a station with no exceedance summary
    MissingStation,
    /// Any other per-span failure isolated from the batch
    SpanFailure,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::MissingAssociation => "missing_association",
            IssueKind::EmptyOverlap => "empty_overlap",
            IssueKind::CycleDetected => "cycle_detected",
            IssueKind::LookupNotFound => "lookup_not_found",
            IssueKind::DroppedReading => "dropped_reading",
            IssueKind::MissingStation => "missing_station",
            IssueKind::SpanFailure => "span_failure",
        }
    }
}

/// A single diagnostic issue
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub kind: IssueKind,
    /// Human-readable description of the issue
    pub message: String,
    /// Optional entity reference (span id, station code, feeder id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            entity: None,
        }
    }

    /// Attach an entity reference to the issue
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.kind.as_str(), self.message)?;

        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }

        Ok(())
    }
}

/// Collection of diagnostic issues for a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, kind, message));
    }

    pub fn add_warning_for(
        &mut self,
        kind: IssueKind,
        message: impl Into<String>,
        entity: impl Into<String>,
    ) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, kind, message).with_entity(entity));
    }

    pub fn add_error_for(
        &mut self,
        kind: IssueKind,
        message: impl Into<String>,
        entity: impl Into<String>,
    ) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, kind, message).with_entity(entity));
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// Issues of a single kind
    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    /// Issues attached to one entity (span id, station code, ...)
    pub fn issues_for<'a>(
        &'a self,
        entity: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues
            .iter()
            .filter(move |i| i.entity.as_deref() == Some(entity))
    }

    pub fn summary(&self) -> String {
        let warnings = self.warning_count();
        let errors = self.error_count();

        match (warnings, errors) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, if w == 1 { "" } else { "s" }),
            (0, e) => format!("{} error{}", e, if e == 1 { "" } else { "s" }),
            (w, e) => format!(
                "{} warning{}, {} error{}",
                w,
                if w == 1 { "" } else { "s" },
                e,
                if e == 1 { "" } else { "s" }
            ),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}
