//! Central Hub (`spec.md` §4.F): the workspace-level catalog of repos,
//! their package manifests, and aggregated diagnostics.
//!
//! Not a query engine: the hub only tracks what exists and drives
//! refreshes (implementing `devac_core::refresh::HubHandle`); the
//! federated query engine (`query_engine.rs`) answers graph questions by
//! reading package seeds directly, using the hub only to enumerate them.
//! State is persisted at `<workspace>/.devac/hub.json`, written the same
//! temp-file-then-rename way `devac-core`'s seed store writes its tables.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use devac_common::{Diagnostic, DiagnosticsCounts, DiagnosticsGroupBy, PackageEntry, RepoManifest, Severity};
use devac_common::{DevacError, DevacResult};
use devac_core::ingest;
use devac_core::refresh::{HubHandle, RefreshOutcome};
use devac_core::seed_store::SeedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    Active,
    Stale,
    Missing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRecord {
    pub repo_id: String,
    pub local_path: PathBuf,
    pub packages_count: usize,
    pub status: RepoStatus,
    pub last_synced: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HubState {
    repos: HashMap<String, RepoRecord>,
    diagnostics: Vec<Diagnostic>,
}

/// Filter for `Hub::get_diagnostics` (`spec.md` §4.F's diagnostics query surface).
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsFilter {
    pub repo_id: Option<String>,
    pub severity: Option<Severity>,
    pub source: Option<String>,
}

impl DiagnosticsFilter {
    fn matches(&self, d: &Diagnostic) -> bool {
        self.repo_id.as_deref().map(|r| r == d.repo_id).unwrap_or(true)
            && self.severity.map(|s| s == d.severity).unwrap_or(true)
            && self.source.as_deref().map(|s| s == d.source).unwrap_or(true)
    }
}

/// Per-workspace catalog. One `Hub` owns one `<workspace>/.devac/hub.json`;
/// construct it once per process and share it (it's `Send + Sync`).
pub struct Hub {
    workspace_path: PathBuf,
    state: RwLock<HubState>,
}

impl Hub {
    pub fn new(workspace_path: impl Into<PathBuf>) -> Self {
        let workspace_path = workspace_path.into();
        let state = Self::load_state(&workspace_path).unwrap_or_default();
        Self { workspace_path, state: RwLock::new(state) }
    }

    fn hub_path(workspace_path: &Path) -> PathBuf {
        workspace_path.join(".devac").join("hub.json")
    }

    fn load_state(workspace_path: &Path) -> Option<HubState> {
        let contents = std::fs::read_to_string(Self::hub_path(workspace_path)).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn save(&self) -> DevacResult<()> {
        let path = Self::hub_path(&self.workspace_path);
        let dir = path.parent().expect("hub.json always has a .devac parent");
        std::fs::create_dir_all(dir).map_err(|e| DevacError::IoFailed { path: dir.display().to_string(), source: e })?;
        let json = {
            let state = self.state.read().unwrap();
            serde_json::to_vec_pretty(&*state)
                .map_err(|e| DevacError::InvariantViolation(format!("hub state serialize failed: {e}")))?
        };
        write_atomic(&path, &json)
    }

    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    /// Startup validation (`spec.md` §4.H, "Startup checks"): the hub
    /// directory must live directly under the workspace root, and starting
    /// with no repos registered is worth a warning, not a hard failure.
    pub fn validate_startup(&self) {
        let devac_dir = self.workspace_path.join(".devac");
        if devac_dir.parent() != Some(self.workspace_path.as_path()) {
            tracing::warn!(path = %devac_dir.display(), "hub directory is not a direct child of the workspace root");
        }
        if self.state.read().unwrap().repos.is_empty() {
            tracing::warn!("hub started with no repos registered");
        }
    }

    /// Registers a repo (idempotent on `repo_id`) and syncs its manifest.
    pub fn add_repo(&self, repo_id: &str, local_path: impl Into<PathBuf>) -> DevacResult<()> {
        let local_path = local_path.into();
        {
            let mut state = self.state.write().unwrap();
            state.repos.entry(repo_id.to_string()).or_insert_with(|| RepoRecord {
                repo_id: repo_id.to_string(),
                local_path: local_path.clone(),
                packages_count: 0,
                status: RepoStatus::Missing,
                last_synced: None,
            });
        }
        self.sync_repo(repo_id)?;
        self.save()
    }

    pub fn list_repos(&self) -> Vec<RepoRecord> {
        let mut repos: Vec<RepoRecord> = self.state.read().unwrap().repos.values().cloned().collect();
        repos.sort_by(|a, b| a.repo_id.cmp(&b.repo_id));
        repos
    }

    pub fn repo(&self, repo_id: &str) -> Option<RepoRecord> {
        self.state.read().unwrap().repos.get(repo_id).cloned()
    }

    /// Re-reads `repo_id`'s manifest and updates its catalog entry (package
    /// count, status) without re-parsing anything.
    fn sync_repo(&self, repo_id: &str) -> DevacResult<()> {
        let local_path = {
            let state = self.state.read().unwrap();
            state.repos.get(repo_id).map(|r| r.local_path.clone())
        };
        let Some(local_path) = local_path else {
            return Err(DevacError::InvariantViolation(format!("unknown repo {repo_id}")));
        };
        let manifest_path = RepoManifest::path_for_repo(&local_path);
        let mut state = self.state.write().unwrap();
        let record = state.repos.get_mut(repo_id).expect("checked above");
        match RepoManifest::load(&manifest_path) {
            Ok(manifest) => {
                record.packages_count = manifest.packages.len();
                record.status = RepoStatus::Active;
                record.last_synced = Some(Utc::now());
            }
            Err(_) if !local_path.exists() => record.status = RepoStatus::Missing,
            Err(_) => record.status = RepoStatus::Stale,
        }
        Ok(())
    }

    /// Every package across every registered repo's manifest, as
    /// `(repo_id, package_path, package_root)` — the enumeration the
    /// federated query engine's hub mode fans out over (`spec.md` §4.G).
    pub fn all_packages(&self) -> Vec<(String, String, PathBuf)> {
        let mut out = Vec::new();
        for repo in self.list_repos() {
            let manifest_path = RepoManifest::path_for_repo(&repo.local_path);
            let Ok(manifest) = RepoManifest::load(&manifest_path) else { continue };
            for package in manifest.packages {
                let package_root =
                    if package.path == "." { repo.local_path.clone() } else { repo.local_path.join(&package.path) };
                out.push((repo.repo_id.clone(), package.path, package_root));
            }
        }
        out
    }

    /// Reverse index of which repos own at least one of `entity_ids`
    /// (`spec.md` §4.F, `get_affected_repos`). The answer lives in package
    /// seeds, not the hub's own state, so this reads through to each one.
    pub fn get_affected_repos(&self, entity_ids: &[String]) -> Vec<String> {
        let mut affected = Vec::new();
        for (repo_id, _package_path, package_root) in self.all_packages() {
            let Ok(tables) = SeedStore::new(&package_root).read_merged() else { continue };
            if tables.nodes.iter().any(|n| entity_ids.contains(&n.entity_id)) && !affected.contains(&repo_id) {
                affected.push(repo_id);
            }
        }
        affected
    }

    pub fn record_diagnostics(&self, diagnostics: Vec<Diagnostic>) -> DevacResult<()> {
        {
            self.state.write().unwrap().diagnostics.extend(diagnostics);
        }
        self.save()
    }

    pub fn get_diagnostics(&self, filter: &DiagnosticsFilter) -> Vec<Diagnostic> {
        self.state.read().unwrap().diagnostics.iter().filter(|d| filter.matches(d)).cloned().collect()
    }

    /// Grouped row counts for `get_diagnostics_summary(group_by)`, sorted by key.
    pub fn get_diagnostics_summary(&self, group_by: DiagnosticsGroupBy) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for d in &self.state.read().unwrap().diagnostics {
            let key = match group_by {
                DiagnosticsGroupBy::Repo => d.repo_id.clone(),
                DiagnosticsGroupBy::Source => d.source.clone(),
                DiagnosticsGroupBy::Severity => d.severity.as_str().to_string(),
                DiagnosticsGroupBy::Category => d.category.clone(),
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        let mut rows: Vec<(String, usize)> = counts.into_iter().collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub fn get_diagnostics_counts(&self) -> DiagnosticsCounts {
        let mut counts = DiagnosticsCounts::default();
        for d in &self.state.read().unwrap().diagnostics {
            counts.record(d.severity);
        }
        counts
    }

    /// Narrower "validation errors" view for the UserPromptSubmit/Stop hook
    /// integration (`spec.md` §4.F, "A parallel legacy surface"): just the
    /// error/critical rows, flattened to strings the hook payload carries.
    pub fn validation_errors(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .diagnostics
            .iter()
            .filter(|d| matches!(d.severity, Severity::Error | Severity::Critical))
            .map(|d| format!("{}: {}: {}", d.repo_id, d.file_path, d.message))
            .collect()
    }
}

impl HubHandle for Hub {
    /// Ingests every package of `repo_id` and re-syncs its manifest entry.
    /// Implements `devac_core::refresh::HubHandle` so a `Refresher` can
    /// drive this hub without `devac-core` depending on `devac-hub`.
    fn refresh_repo(&self, repo_id: &str) -> RefreshOutcome {
        let local_path = match self.repo(repo_id) {
            Some(r) => r.local_path,
            None => return RefreshOutcome { errors: vec![format!("unknown repo {repo_id}")], ..Default::default() },
        };
        let manifest_path = RepoManifest::path_for_repo(&local_path);
        let manifest = RepoManifest::load(&manifest_path).unwrap_or_else(|_| RepoManifest {
            repo_id: repo_id.to_string(),
            packages: vec![PackageEntry { path: ".".to_string(), name: repo_id.to_string(), language: "unknown".to_string() }],
        });

        let mut outcome = RefreshOutcome::default();
        for package in &manifest.packages {
            let package_root = if package.path == "." { local_path.clone() } else { local_path.join(&package.path) };
            match ingest::ingest_package(repo_id, &package.path, &package_root) {
                Ok(report) => {
                    if report.files_parsed > 0 || report.files_dropped > 0 {
                        outcome.packages_updated += 1;
                    }
                    outcome.edges_updated += report.edges as u32;
                }
                Err(e) => outcome.errors.push(e.to_string()),
            }
        }
        outcome.repos_refreshed = if outcome.packages_updated > 0 { 1 } else { 0 };

        if let Err(e) = self.sync_repo(repo_id) {
            outcome.errors.push(e.to_string());
        }
        if let Err(e) = self.save() {
            outcome.errors.push(e.to_string());
        }
        outcome
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> DevacResult<()> {
    let dir = path.parent().ok_or_else(|| DevacError::InvariantViolation(format!("path {} has no parent", path.display())))?;
    let mut tmp = tempfile::Builder::new()
        .prefix("devac_hub_tmp")
        .tempfile_in(dir)
        .map_err(|e| DevacError::IoFailed { path: dir.display().to_string(), source: e })?;
    tmp.write_all(contents).map_err(|e| DevacError::IoFailed { path: path.display().to_string(), source: e })?;
    tmp.flush().map_err(|e| DevacError::IoFailed { path: path.display().to_string(), source: e })?;
    tmp.persist(path).map_err(|e| DevacError::IoFailed { path: path.display().to_string(), source: e.error })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use devac_common::DiagnosticLocation;
    use std::fs;
    use tempfile::TempDir;

    fn write_manifest(repo_root: &Path, repo_id: &str, packages: &[&str]) {
        let manifest = RepoManifest {
            repo_id: repo_id.to_string(),
            packages: packages
                .iter()
                .map(|p| PackageEntry { path: p.to_string(), name: (*p).to_string(), language: "typescript".to_string() })
                .collect(),
        };
        manifest.save(&RepoManifest::path_for_repo(repo_root)).unwrap();
    }

    #[test]
    fn add_repo_syncs_package_count_from_manifest() {
        let ws = TempDir::new().unwrap();
        let repo = ws.path().join("acme-api");
        fs::create_dir_all(&repo).unwrap();
        write_manifest(&repo, "acme/api", &["."]);

        let hub = Hub::new(ws.path());
        hub.add_repo("acme/api", &repo).unwrap();

        let record = hub.repo("acme/api").unwrap();
        assert_eq!(record.packages_count, 1);
        assert_eq!(record.status, RepoStatus::Active);
        assert!(record.last_synced.is_some());
    }

    #[test]
    fn refresh_repo_ingests_every_manifest_package() {
        let ws = TempDir::new().unwrap();
        let repo = ws.path().join("acme-api");
        fs::create_dir_all(repo.join("pkg")).unwrap();
        fs::write(repo.join("pkg/app.ts"), "export function greet() { return 1; }").unwrap();
        write_manifest(&repo, "acme/api", &["pkg"]);

        let hub = Hub::new(ws.path());
        hub.add_repo("acme/api", &repo).unwrap();

        let outcome = hub.refresh_repo("acme/api");
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.packages_updated, 1);
        assert_eq!(outcome.repos_refreshed, 1);
    }

    #[test]
    fn refresh_repo_reports_unknown_repo_as_error_without_panicking() {
        let ws = TempDir::new().unwrap();
        let hub = Hub::new(ws.path());
        let outcome = hub.refresh_repo("missing/repo");
        assert_eq!(outcome.repos_refreshed, 0);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn diagnostics_counts_and_summary_aggregate_across_repos() {
        let ws = TempDir::new().unwrap();
        let hub = Hub::new(ws.path());
        hub.record_diagnostics(vec![
            Diagnostic {
                source: "tsc".to_string(),
                severity: Severity::Error,
                category: "type".to_string(),
                repo_id: "acme/api".to_string(),
                file_path: "src/app.ts".to_string(),
                message: "type mismatch".to_string(),
                location: Some(DiagnosticLocation { line: 10, column: 1 }),
                timestamp: Utc::now(),
            },
            Diagnostic {
                source: "eslint".to_string(),
                severity: Severity::Warning,
                category: "style".to_string(),
                repo_id: "acme/web".to_string(),
                file_path: "src/index.ts".to_string(),
                message: "unused var".to_string(),
                location: None,
                timestamp: Utc::now(),
            },
        ])
        .unwrap();

        let counts = hub.get_diagnostics_counts();
        assert_eq!(counts.error, 1);
        assert_eq!(counts.warning, 1);
        assert_eq!(counts.total, 2);

        let by_repo = hub.get_diagnostics_summary(DiagnosticsGroupBy::Repo);
        assert_eq!(by_repo, vec![("acme/api".to_string(), 1), ("acme/web".to_string(), 1)]);

        assert_eq!(hub.validation_errors(), vec!["acme/api: src/app.ts: type mismatch".to_string()]);
    }

    #[test]
    fn hub_state_persists_across_instances() {
        let ws = TempDir::new().unwrap();
        let repo = ws.path().join("acme-api");
        fs::create_dir_all(&repo).unwrap();
        write_manifest(&repo, "acme/api", &["."]);

        {
            let hub = Hub::new(ws.path());
            hub.add_repo("acme/api", &repo).unwrap();
        }

        let hub = Hub::new(ws.path());
        assert_eq!(hub.list_repos().len(), 1);
    }
}
