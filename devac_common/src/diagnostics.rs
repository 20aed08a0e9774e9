//! Diagnostics row shape shared by the hub's aggregation table (`spec.md`
//! §4.F) and the SARIF importer in `devac-hub`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity scale, ordered least to most urgent for `get_diagnostics_counts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Note,
    Suggestion,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Suggestion => "suggestion",
            Severity::Note => "note",
        }
    }

    pub fn all() -> [Severity; 5] {
        [
            Severity::Critical,
            Severity::Error,
            Severity::Warning,
            Severity::Suggestion,
            Severity::Note,
        ]
    }
}

/// A single diagnostics row: one validation error, lint warning, test
/// failure, or accessibility finding, normalized from whatever tool emitted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Tool of origin, e.g. `"tsc"`, `"eslint"`, `"pytest"`.
    pub source: String,
    pub severity: Severity,
    pub category: String,
    pub repo_id: String,
    pub file_path: String,
    pub message: String,
    pub location: Option<DiagnosticLocation>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiagnosticLocation {
    pub line: u32,
    pub column: u32,
}

/// Grouping key for `get_diagnostics_summary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsGroupBy {
    Repo,
    Source,
    Severity,
    Category,
}

/// Output of `get_diagnostics_counts()`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DiagnosticsCounts {
    pub critical: u64,
    pub error: u64,
    pub warning: u64,
    pub suggestion: u64,
    pub note: u64,
    pub total: u64,
}

impl DiagnosticsCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Error => self.error += 1,
            Severity::Warning => self.warning += 1,
            Severity::Suggestion => self.suggestion += 1,
            Severity::Note => self.note += 1,
        }
        self.total += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_places_critical_highest() {
        let mut severities = vec![Severity::Note, Severity::Critical, Severity::Warning];
        severities.sort();
        assert_eq!(
            severities,
            vec![Severity::Note, Severity::Warning, Severity::Critical]
        );
    }

    #[test]
    fn counts_accumulate_per_severity() {
        let mut counts = DiagnosticsCounts::default();
        counts.record(Severity::Error);
        counts.record(Severity::Error);
        counts.record(Severity::Warning);
        assert_eq!(counts.error, 2);
        assert_eq!(counts.warning, 1);
        assert_eq!(counts.total, 3);
    }
}
