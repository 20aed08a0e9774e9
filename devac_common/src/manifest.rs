//! On-disk configuration shapes from `spec.md` §6: the repository manifest
//! and the workspace config. Shared between `devac-core` (which writes a
//! manifest after an ingest pass discovers a repo's packages) and
//! `devac-hub` (which reads both to build its catalog).

use std::path::Path;

use serde::{Deserialize, Serialize};

/// `<repo>/.devac/manifest.json` — lists the packages a repo contains.
/// `"."` as a package path denotes the repo root itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoManifest {
    pub repo_id: String,
    pub packages: Vec<PackageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageEntry {
    pub path: String,
    pub name: String,
    pub language: String,
}

impl RepoManifest {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
    }

    /// Manifest file path for a given repo root, per `spec.md` §6.
    pub fn path_for_repo(repo_root: &Path) -> std::path::PathBuf {
        repo_root.join(".devac").join("manifest.json")
    }
}

/// `<workspace>/.devac/workspace.json` — optional; missing fields and a
/// missing file both resolve to the documented defaults (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub version: String,
    pub hub: HubConfig,
    pub watcher: WatcherSettings,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { version: "1.0".to_string(), hub: HubConfig::default(), watcher: WatcherSettings::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub auto_refresh: bool,
    pub refresh_debounce_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { auto_refresh: true, refresh_debounce_ms: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    pub auto_start: bool,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self { auto_start: false }
    }
}

impl WorkspaceConfig {
    /// Loads `<workspace>/.devac/workspace.json`; a missing file resolves
    /// to full defaults rather than an error.
    pub fn load(workspace_path: &Path) -> std::io::Result<Self> {
        let path = workspace_path.join(".devac").join("workspace.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// The canonical entity URI: `devac://<ws>/<repo>[@<ref>]/<pkg_or_.>/<file>#<symbol|Lline>`.
/// Optional input per `spec.md` §6; file-path tools accept either form.
/// Fragments are ignored for file-path resolution.
///
/// `spec.md` leaves open how many path segments `<repo>` and `<pkg_or_.>`
/// each occupy when both can contain slashes. This implementation takes
/// `<ws>` and `<repo>[@<ref>]` as exactly one segment each and `<pkg_or_.>`
/// as exactly one segment (a package directory name, or `"."`); everything
/// after that is `<file>`, which may itself contain slashes. Documented as
/// an implementation decision in `DESIGN.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevacUri {
    pub workspace: String,
    pub repo: String,
    pub ref_name: Option<String>,
    pub package: String,
    pub file: String,
    pub fragment: Option<String>,
}

impl DevacUri {
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("devac://")?;
        let (path_part, fragment) = match rest.split_once('#') {
            Some((p, f)) => (p, Some(f.to_string())),
            None => (rest, None),
        };
        let mut segments = path_part.splitn(4, '/');
        let workspace = segments.next()?.to_string();
        let repo_segment = segments.next()?;
        let (repo, ref_name) = match repo_segment.split_once('@') {
            Some((r, refname)) => (r.to_string(), Some(refname.to_string())),
            None => (repo_segment.to_string(), None),
        };
        let package = segments.next()?.to_string();
        let file = segments.next()?.to_string();
        Some(DevacUri { workspace, repo, ref_name, package, file, fragment })
    }

    /// Collapses to a plain file path: `<pkg>` (unless `"."`) concatenated
    /// with `<file>`; fragments are ignored.
    pub fn to_file_path(&self) -> String {
        if self.package == "." {
            self.file.clone()
        } else {
            format!("{}/{}", self.package.trim_end_matches('/'), self.file)
        }
    }

    /// Accepts either a raw path or a `devac://` URI and resolves to a
    /// plain file path (`spec.md` §6, "File-path tools accept either").
    pub fn resolve_to_path(input: &str) -> String {
        match Self::parse(input) {
            Some(uri) => uri.to_file_path(),
            None => input.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_config_defaults_when_file_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = WorkspaceConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.version, "1.0");
        assert!(cfg.hub.auto_refresh);
        assert_eq!(cfg.hub.refresh_debounce_ms, 500);
        assert!(!cfg.watcher.auto_start);
    }

    #[test]
    fn workspace_config_fills_missing_fields_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let devac_dir = dir.path().join(".devac");
        std::fs::create_dir_all(&devac_dir).unwrap();
        std::fs::write(devac_dir.join("workspace.json"), r#"{"hub": {"auto_refresh": false}}"#).unwrap();
        let cfg = WorkspaceConfig::load(dir.path()).unwrap();
        assert!(!cfg.hub.auto_refresh);
        assert_eq!(cfg.hub.refresh_debounce_ms, 500); // filled from default
    }

    #[test]
    fn repo_manifest_round_trips_through_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let manifest = RepoManifest {
            repo_id: "acme/api".to_string(),
            packages: vec![PackageEntry { path: ".".to_string(), name: "api".to_string(), language: "typescript".to_string() }],
        };
        let path = RepoManifest::path_for_repo(dir.path());
        manifest.save(&path).unwrap();
        let back = RepoManifest::load(&path).unwrap();
        assert_eq!(back.repo_id, "acme/api");
        assert_eq!(back.packages.len(), 1);
    }

    #[test]
    fn devac_uri_parses_all_components() {
        let uri = DevacUri::parse("devac://ws1/api@feature-x/core/src/app.ts#L42").unwrap();
        assert_eq!(uri.workspace, "ws1");
        assert_eq!(uri.repo, "api");
        assert_eq!(uri.ref_name.as_deref(), Some("feature-x"));
        assert_eq!(uri.package, "core");
        assert_eq!(uri.file, "src/app.ts");
        assert_eq!(uri.fragment.as_deref(), Some("L42"));
    }

    #[test]
    fn devac_uri_collapses_to_file_path_ignoring_fragment() {
        let uri = DevacUri::parse("devac://ws1/api/core/src/app.ts#L42").unwrap();
        assert_eq!(uri.to_file_path(), "core/src/app.ts");
    }

    #[test]
    fn devac_uri_package_dot_denotes_repo_root() {
        let uri = DevacUri::parse("devac://ws1/api/./src/app.ts").unwrap();
        assert_eq!(uri.to_file_path(), "src/app.ts");
    }

    #[test]
    fn resolve_to_path_passes_through_raw_paths() {
        assert_eq!(DevacUri::resolve_to_path("src/app.ts"), "src/app.ts");
    }
}
