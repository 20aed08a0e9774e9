//! Language Parser (`spec.md` §4.B): drives a syntax tree per file and
//! emits normalized nodes/edges/external-refs/effects.
//!
//! Three backends ship in the core, dispatched by extension:
//! [`ts_js`] for the curly-brace family, [`python`] for Python, [`csharp`]
//! for C#. Each exposes the same shape the spec names: `language`,
//! `extensions`, `version`, `can_parse`, `parse_file`, `parse_content`.

pub mod config;
pub mod csharp;
pub mod python;
pub mod ts_js;

pub use config::ParserConfig;

use std::path::Path;
use std::time::Instant;

use sha2::{Digest, Sha256};

use crate::model::ParseResult;

/// Common shape every language backend implements (`spec.md` §4.B,
/// "Language dispatch").
pub trait LanguageBackend {
    fn language(&self) -> &'static str;
    fn extensions(&self) -> &'static [&'static str];
    fn version(&self) -> &'static str;

    fn can_parse(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions().iter().any(|e| e.trim_start_matches('.') == ext))
            .unwrap_or(false)
    }

    fn parse_file(&self, path: &Path, cfg: &ParserConfig) -> ParseResult {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                let mut result = ParseResult {
                    file_path: cfg.relative_path(path).into_owned(),
                    ..Default::default()
                };
                result.warnings.push(format!("failed to read {}: {e}", path.display()));
                return result;
            }
        };
        self.parse_content(&bytes, path, cfg)
    }

    fn parse_content(&self, bytes: &[u8], path: &Path, cfg: &ParserConfig) -> ParseResult;
}

/// Returns the backend registered for `path`'s extension, if any.
pub fn backend_for(path: &Path) -> Option<Box<dyn LanguageBackend>> {
    let ts_js = ts_js::TsJsBackend;
    if ts_js.can_parse(path) {
        return Some(Box::new(ts_js));
    }
    let python = python::PythonBackend;
    if python.can_parse(path) {
        return Some(Box::new(python));
    }
    let csharp = csharp::CSharpBackend;
    if csharp.can_parse(path) {
        return Some(Box::new(csharp));
    }
    None
}

/// Parses `path` with whichever backend claims its extension. Files with no
/// matching backend return `None` — the caller (the seed store's ingest
/// pass) simply skips them, they never become a `ParseDegraded` warning.
pub fn parse_file(path: &Path, cfg: &ParserConfig) -> Option<ParseResult> {
    backend_for(path).map(|backend| {
        let started = Instant::now();
        let mut result = backend.parse_file(path, cfg);
        result.parse_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        result
    })
}

/// SHA-256 of whole file content, hex-encoded (`spec.md` §3, `source_file_hash`).
pub fn hash_source(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Documentation extraction per `spec.md` §4.B rule 11: take the last block
/// comment immediately preceding a declaration that begins with `*`
/// (a JSDoc/XMLDoc-style comment), strip leading whitespace and leading `*`
/// from each line, drop blank leading/trailing lines, trim trailing
/// whitespace. Returns `None` if the cleaned result is empty.
pub fn clean_block_comment(raw: &str) -> Option<String> {
    let inner = raw
        .trim()
        .trim_start_matches("/*")
        .trim_end_matches("*/");
    if !inner.trim_start().starts_with('*') {
        return None;
    }
    let lines: Vec<&str> = inner
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let trimmed = trimmed.strip_prefix('*').unwrap_or(trimmed);
            trimmed.trim_end()
        })
        .collect();
    let start = lines.iter().position(|l| !l.trim().is_empty())?;
    let end = lines.iter().rposition(|l| !l.trim().is_empty())?;
    let cleaned = lines[start..=end]
        .iter()
        .map(|l| l.trim_start())
        .collect::<Vec<_>>()
        .join("\n");
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// A known HTTP-client receiver method and the HTTP verb it implies
/// (`spec.md` §4.B rule 8). Matched against `receiver.method(...)` call sites.
pub const HTTP_CLIENT_METHODS: &[(&str, &str)] = &[
    ("get", "GET"),
    ("post", "POST"),
    ("put", "PUT"),
    ("patch", "PATCH"),
    ("delete", "DELETE"),
    ("head", "HEAD"),
    ("options", "OPTIONS"),
];

/// HTTP-method route decorators recognized at method level (`spec.md` §4.B
/// rule 9).
pub const ROUTE_METHOD_DECORATORS: &[(&str, &str)] = &[
    ("Get", "GET"),
    ("Post", "POST"),
    ("Put", "PUT"),
    ("Delete", "DELETE"),
    ("Patch", "PATCH"),
    ("Head", "HEAD"),
    ("Options", "OPTIONS"),
    ("All", "ALL"),
];

/// Class-level route-prefix decorators (`spec.md` §4.B rule 9).
pub const ROUTE_PREFIX_DECORATORS: &[&str] = &["Route", "Controller", "RestController"];

/// Recognizes a module specifier as path-like (relative/absolute import)
/// rather than a package import. Used to decide `is_external` for call
/// effects (`spec.md` §4.B rule 7).
pub fn is_path_like_specifier(specifier: &str) -> bool {
    specifier.starts_with('.') || specifier.starts_with('/') || specifier.starts_with("http://") || specifier.starts_with("https://")
}

/// Built-in module prefixes that don't count as "external" even though
/// they aren't path-like (Node's `node:` scheme, Python's stdlib handled by
/// each backend's own table).
pub const BUILTIN_MODULE_PREFIXES: &[&str] = &["node:"];

pub fn is_builtin_specifier(specifier: &str) -> bool {
    BUILTIN_MODULE_PREFIXES.iter().any(|p| specifier.starts_with(p))
}

/// Classifies a reconstructed URL template into `m2m` vs `http`, with a
/// service name when the host matches a recognizable pattern (`spec.md`
/// §4.B rule 8: "A small recognizer classifies the URL...").
pub fn classify_send_target(url_pattern: &str) -> (crate::model::SendKind, Option<String>) {
    if let Some(rest) = url_pattern
        .strip_prefix("http://")
        .or_else(|| url_pattern.strip_prefix("https://"))
    {
        let host = rest.split('/').next().unwrap_or(rest);
        // Internal-looking hostnames (no dot, or a `.svc`/`.local` suffix,
        // or a bare `service-name:port` form) are treated as m2m calls.
        let is_internal = !host.contains('.')
            || host.ends_with(".svc")
            || host.ends_with(".svc.cluster.local")
            || host.ends_with(".local");
        if is_internal {
            let service = host.split(':').next().unwrap_or(host).to_string();
            return (crate::model::SendKind::M2m, Some(service));
        }
        return (crate::model::SendKind::Http, None);
    }
    // A relative/template URL with no scheme reads as an internal call.
    (crate::model::SendKind::M2m, None)
}

/// Reconstructs a URL template from literal segments and interpolation
/// holes, substituting each hole with `:name` (`spec.md` §4.B rule 8). Each
/// entry in `parts` is either a literal chunk or a named interpolation.
#[derive(Debug, Clone)]
pub enum UrlPart {
    Literal(String),
    Interpolation(String),
}

pub fn reconstruct_url_pattern(parts: &[UrlPart]) -> String {
    parts
        .iter()
        .map(|part| match part {
            UrlPart::Literal(text) => text.clone(),
            UrlPart::Interpolation(name) => format!(":{name}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_source_is_deterministic() {
        assert_eq!(hash_source(b"hello"), hash_source(b"hello"));
        assert_ne!(hash_source(b"hello"), hash_source(b"world"));
    }

    #[test]
    fn clean_block_comment_strips_stars_and_blank_edges() {
        let raw = "/**\n * Computes the total.\n *\n * @param x input\n */";
        assert_eq!(
            clean_block_comment(raw).unwrap(),
            "Computes the total.\n\n@param x input"
        );
    }

    #[test]
    fn clean_block_comment_rejects_non_doc_comments() {
        assert_eq!(clean_block_comment("/* just a note */"), None);
    }

    #[test]
    fn reconstruct_url_pattern_substitutes_interpolations() {
        let parts = vec![
            UrlPart::Literal("/users/".to_string()),
            UrlPart::Interpolation("id".to_string()),
            UrlPart::Literal("/orders".to_string()),
        ];
        assert_eq!(reconstruct_url_pattern(&parts), "/users/:id/orders");
    }

    #[test]
    fn classify_send_target_flags_dotless_hosts_as_m2m() {
        let (kind, service) = classify_send_target("http://billing-service/charge");
        assert_eq!(kind, crate::model::SendKind::M2m);
        assert_eq!(service.as_deref(), Some("billing-service"));
    }

    #[test]
    fn classify_send_target_flags_public_hosts_as_http() {
        let (kind, service) = classify_send_target("https://api.stripe.com/v1/charges");
        assert_eq!(kind, crate::model::SendKind::Http);
        assert!(service.is_none());
    }

    #[test]
    fn path_like_specifier_detection() {
        assert!(is_path_like_specifier("./widgets"));
        assert!(is_path_like_specifier("../lib"));
        assert!(!is_path_like_specifier("@aws-sdk/client-s3"));
    }
}
