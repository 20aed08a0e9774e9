//! SARIF 2.1.0 importer (`SPEC_FULL.md` §2, supplemented feature #4).
//!
//! The teacher emits its own findings as SARIF
//! (`loctree_rs::analyzer::sarif`); typecheckers, linters, and test
//! runners commonly emit the same format, and it is the natural
//! interchange shape for the hub's diagnostics table (`spec.md` §4.F) to
//! accept from outside tools. This is the reverse direction: SARIF in,
//! `Diagnostic` rows out.

use devac_common::{Diagnostic, DiagnosticLocation, Severity};
use serde::Deserialize;

/// The slice of the SARIF 2.1.0 schema this importer reads. Unknown
/// fields are ignored rather than rejected — a stricter parse would
/// break on every SARIF producer's own extension properties.
#[derive(Debug, Deserialize)]
pub struct SarifLog {
    pub runs: Vec<SarifRun>,
}

#[derive(Debug, Deserialize)]
pub struct SarifRun {
    pub tool: SarifTool,
    #[serde(default)]
    pub results: Vec<SarifResult>,
}

#[derive(Debug, Deserialize)]
pub struct SarifTool {
    pub driver: SarifDriver,
}

#[derive(Debug, Deserialize)]
pub struct SarifDriver {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SarifResult {
    #[serde(default, rename = "ruleId")]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    pub message: SarifMessage,
    #[serde(default)]
    pub locations: Vec<SarifLocation>,
}

#[derive(Debug, Deserialize)]
pub struct SarifMessage {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SarifLocation {
    #[serde(rename = "physicalLocation")]
    pub physical_location: SarifPhysicalLocation,
}

#[derive(Debug, Deserialize)]
pub struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    pub artifact_location: SarifArtifactLocation,
    #[serde(default)]
    pub region: Option<SarifRegion>,
}

#[derive(Debug, Deserialize)]
pub struct SarifArtifactLocation {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct SarifRegion {
    #[serde(default, rename = "startLine")]
    pub start_line: Option<u32>,
    #[serde(default, rename = "startColumn")]
    pub start_column: Option<u32>,
}

/// SARIF's `level` values map onto `spec.md` §3's five-value severity
/// scale; SARIF has no `critical`, so a result without a recognized
/// `level` defaults to `warning` (SARIF's own default for omitted
/// `level`), not `note` or `error`, since most tools that set it at all
/// use `error`/`warning` and silence on ambiguity shouldn't look like
/// the quieter failure.
fn map_severity(level: Option<&str>) -> Severity {
    match level {
        Some("error") => Severity::Error,
        Some("warning") => Severity::Warning,
        Some("note") => Severity::Note,
        _ => Severity::Warning,
    }
}

/// Parses a SARIF document and flattens every run's results into
/// `Diagnostic` rows tagged with `repo_id` (SARIF has no notion of a
/// DevAC repo, so the caller supplies it).
pub fn import_sarif(repo_id: &str, contents: &str, timestamp: chrono::DateTime<chrono::Utc>) -> Result<Vec<Diagnostic>, serde_json::Error> {
    let log: SarifLog = serde_json::from_str(contents)?;
    let mut diagnostics = Vec::new();
    for run in &log.runs {
        for result in &run.results {
            let (file_path, location) = result
                .locations
                .first()
                .map(|loc| {
                    let region = loc.physical_location.region.as_ref();
                    (
                        loc.physical_location.artifact_location.uri.clone(),
                        region.and_then(|r| r.start_line).map(|line| DiagnosticLocation { line, column: r_column(region) }),
                    )
                })
                .unwrap_or_else(|| (String::new(), None));

            diagnostics.push(Diagnostic {
                source: run.tool.driver.name.clone(),
                severity: map_severity(result.level.as_deref()),
                category: result.rule_id.clone().unwrap_or_else(|| "unknown".to_string()),
                repo_id: repo_id.to_string(),
                file_path,
                message: result.message.text.clone(),
                location,
                timestamp,
            });
        }
    }
    Ok(diagnostics)
}

fn r_column(region: Option<&SarifRegion>) -> u32 {
    region.and_then(|r| r.start_column).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const SAMPLE: &str = r#"{
        "runs": [{
            "tool": { "driver": { "name": "tsc" } },
            "results": [
                {
                    "ruleId": "TS2345",
                    "level": "error",
                    "message": { "text": "Argument of type 'string' is not assignable" },
                    "locations": [{
                        "physicalLocation": {
                            "artifactLocation": { "uri": "src/app.ts" },
                            "region": { "startLine": 12, "startColumn": 4 }
                        }
                    }]
                },
                {
                    "ruleId": "no-unused-vars",
                    "message": { "text": "unused var 'x'" },
                    "locations": [{
                        "physicalLocation": { "artifactLocation": { "uri": "src/b.ts" } }
                    }]
                }
            ]
        }]
    }"#;

    #[test]
    fn imports_results_with_severity_and_location() {
        let diagnostics = import_sarif("acme/api", SAMPLE, Utc::now()).unwrap();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].source, "tsc");
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!(diagnostics[0].file_path, "src/app.ts");
        assert_eq!(diagnostics[0].location.unwrap().line, 12);
    }

    #[test]
    fn missing_level_defaults_to_warning() {
        let diagnostics = import_sarif("acme/api", SAMPLE, Utc::now()).unwrap();
        assert_eq!(diagnostics[1].severity, Severity::Warning);
        assert!(diagnostics[1].location.is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(import_sarif("acme/api", "{not json", Utc::now()).is_err());
    }
}
