//! Validation/diagnostics protocol for LLM hook integration (`spec.md`
//! §6, §4.F "legacy surface"). Some tools report failures to an
//! UserPromptSubmit/Stop hook as one of two freeform payload shapes
//! rather than through the hub's structured `Diagnostic` rows; this
//! module is the narrow adapter that turns either shape into the same
//! counts `get_diagnostics_counts()` already answers.
//!
//! The counting itself is regex over human-readable text, which is
//! brittle on its face — but `spec.md` §9 calls this out explicitly as
//! "intentional (payload is human-readable)" and a design constant to
//! preserve exactly, not a thing to make more "correct". Swapping it for
//! structured parsing would just break on the next tool whose output
//! doesn't fit that structure.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// One of the two accepted shapes (`spec.md` §6): a structured
/// `hookSpecificOutput.additionalContext` system-reminder payload, or a
/// bare `stopReason` string.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum HookPayload {
    HookSpecificOutput { #[serde(rename = "hookSpecificOutput")] hook_specific_output: HookSpecificOutput },
    StopReason { #[serde(rename = "stopReason")] stop_reason: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HookSpecificOutput {
    #[serde(rename = "additionalContext")]
    pub additional_context: String,
}

/// Counts extracted from a hook payload: `\d+\s+error` and `\d+\s+warning`,
/// case-insensitive, summed across however many matches the payload text
/// contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookCounts {
    pub errors: u64,
    pub warnings: u64,
}

static ERROR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+error").unwrap());
static WARNING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+warning").unwrap());

/// Unwraps a `<system-reminder>...</system-reminder>`-wrapped
/// `additionalContext` to its inner text; a payload without the wrapper
/// is used as-is.
fn unwrap_system_reminder(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("<system-reminder>").and_then(|rest| rest.strip_suffix("</system-reminder>")) {
        Some(inner) => inner.trim(),
        None => trimmed,
    }
}

/// Parses either accepted shape from a raw JSON value (the hook's own
/// output object) and returns the text counts are extracted from.
pub fn extract_payload_text(value: &Value) -> Option<String> {
    if let Some(reason) = value.get("stopReason").and_then(Value::as_str) {
        return Some(reason.to_string());
    }
    let additional_context = value.get("hookSpecificOutput")?.get("additionalContext")?.as_str()?;
    Some(unwrap_system_reminder(additional_context).to_string())
}

/// Sums every `\d+ error` / `\d+ warning` occurrence in `text`, per
/// `spec.md` §6's matching rule.
pub fn count_from_text(text: &str) -> HookCounts {
    let errors = ERROR_RE.captures_iter(text).filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok()).sum();
    let warnings = WARNING_RE.captures_iter(text).filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok()).sum();
    HookCounts { errors, warnings }
}

/// End-to-end: raw hook JSON in, summed counts out. Returns `None` if
/// neither accepted shape is present.
pub fn count_from_payload(value: &Value) -> Option<HookCounts> {
    extract_payload_text(value).map(|text| count_from_text(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_are_case_insensitive_and_summed() {
        let counts = count_from_text("Found 3 Errors and 1 warning in src/app.ts; 2 errors in src/b.ts");
        assert_eq!(counts, HookCounts { errors: 5, warnings: 1 });
    }

    #[test]
    fn zero_counts_when_text_has_neither() {
        assert_eq!(count_from_text("build succeeded"), HookCounts::default());
    }

    #[test]
    fn extracts_from_hook_specific_output_wrapped_in_system_reminder() {
        let payload = json!({
            "hookSpecificOutput": {
                "additionalContext": "<system-reminder>2 errors, 4 warnings</system-reminder>"
            }
        });
        let counts = count_from_payload(&payload).unwrap();
        assert_eq!(counts, HookCounts { errors: 2, warnings: 4 });
    }

    #[test]
    fn extracts_from_bare_stop_reason() {
        let payload = json!({ "stopReason": "1 error found" });
        let counts = count_from_payload(&payload).unwrap();
        assert_eq!(counts, HookCounts { errors: 1, warnings: 0 });
    }

    #[test]
    fn returns_none_for_unrecognized_shape() {
        assert!(count_from_payload(&json!({"foo": "bar"})).is_none());
    }
}
