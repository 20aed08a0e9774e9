//! Package-level ingest pass (`spec.md` §4.B/§4.C, `SPEC_FULL.md` §2.2):
//! walk a package's files, parse whatever changed, merge the results into
//! its seed, and keep the repo manifest in sync.
//!
//! This is the orchestration layer the CLI bins (`devac-ingest`) and the
//! hub's `refresh_repo` both call into; it owns no state of its own beyond
//! what it reads from and writes back to disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use devac_common::{DevacError, DevacResult, PackageEntry, RepoManifest};
use globset::{Glob, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::{DevacConfig, resolve_parser_config};
use crate::model::Branch;
use crate::parser;
use crate::seed_store::{IngestPlan, SeedStore, SeedTables};

/// Directories skipped unconditionally during discovery, mirroring the
/// teacher's heavy-directory skip list in `fs_utils::gather_files`.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "target", ".venv", "venv", "__pycache__", ".devac"];

/// Result of one `ingest_package` call (`SPEC_FULL.md` §2.2).
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files_parsed: usize,
    pub files_unchanged: usize,
    pub files_dropped: usize,
    pub nodes: usize,
    pub edges: usize,
    pub warnings: Vec<String>,
}

/// Walks `package_root` for source files the core's language backends
/// claim, honoring a `.gitignore` in the package root if present plus the
/// standard heavy-directory skip list. Returns paths sorted for determinism.
pub fn discover_files(package_root: &Path) -> Vec<PathBuf> {
    let mut ignore_builder = gitignore_glob_builder(package_root);
    for pattern in &DevacConfig::load(package_root).unwrap_or_default().ignore_patterns {
        if let Ok(glob) = Glob::new(pattern) {
            ignore_builder.add(glob);
        }
    }
    let ignore = ignore_builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap());
    let mut files = Vec::new();
    let walker = WalkDir::new(package_root).follow_links(false).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()) {
            return false;
        }
        if name.starts_with('.') && entry.file_type().is_dir() {
            return false;
        }
        true
    });
    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if parser::backend_for(path).is_none() {
            continue;
        }
        let relative = path.strip_prefix(package_root).unwrap_or(path);
        if ignore.is_match(relative) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();
    files
}

/// Builds a `globset` matcher from `<package_root>/.gitignore`, one glob
/// per non-comment, non-blank line. An absent file matches nothing.
fn gitignore_glob_builder(package_root: &Path) -> GlobSetBuilder {
    let mut builder = GlobSetBuilder::new();
    if let Ok(contents) = std::fs::read_to_string(package_root.join(".gitignore")) {
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let pattern = line.trim_start_matches('/').trim_end_matches('/');
            if let Ok(glob) = Glob::new(&format!("**/{pattern}")) {
                builder.add(glob);
            }
            if let Ok(glob) = Glob::new(&format!("**/{pattern}/**")) {
                builder.add(glob);
            }
        }
    }
    builder
}

/// Hashes every discovered file, keyed by path, for `IngestPlan::compute`.
fn hash_files(files: &[PathBuf]) -> HashMap<PathBuf, String> {
    let mut hashes = HashMap::new();
    for path in files {
        if let Ok(bytes) = std::fs::read(path) {
            hashes.insert(path.clone(), parser::hash_source(&bytes));
        }
    }
    hashes
}

/// Runs a full incremental ingest pass over one package, writing the
/// updated `base` overlay and returning a summary (`SPEC_FULL.md` §2.2).
///
/// `repo_name` and `package_path` feed the parser's identity rules
/// (`spec.md` §3); `package_root` is the directory actually walked.
pub fn ingest_package(repo_name: &str, package_path: &str, package_root: &Path) -> DevacResult<IngestReport> {
    let store = SeedStore::new(package_root);
    let mut existing = store.read(Branch::Base)?;

    let files = discover_files(package_root);
    let current_hashes = hash_files(&files);
    let plan = IngestPlan::compute(&current_hashes, &existing);

    existing.drop_hashes(&plan.to_drop_hashes);

    let cfg = resolve_parser_config(repo_name, package_path, package_root);

    let mut report = IngestReport { files_unchanged: plan.unchanged, files_dropped: plan.to_drop_hashes.len(), ..Default::default() };
    let mut fresh = SeedTables::default();

    for path in &plan.to_parse {
        let relative = cfg.relative_path(path).into_owned();
        let module_entity_id = crate::identity::entity_id(
            &cfg.repo_name,
            &cfg.package_path,
            crate::model::NodeKind::Module,
            &relative,
            &relative,
        );
        existing.drop_file(&relative, &module_entity_id);
        match parser::parse_file(path, &cfg) {
            Some(result) => {
                report.files_parsed += 1;
                report.nodes += result.nodes.len();
                report.edges += result.edges.len();
                report.warnings.extend(result.warnings);
                fresh.nodes.extend(result.nodes);
                fresh.edges.extend(result.edges);
                fresh.external_refs.extend(result.external_refs);
                fresh.effects.extend(result.effects);
            }
            None => {
                // No backend claims this extension; `discover_files` already
                // filters these out, so this only happens for a file that
                // disappeared between discovery and parse.
            }
        }
    }

    existing.extend_from(fresh);
    store.write(Branch::Base, &existing)?;

    update_manifest(repo_name, package_path, package_root)?;

    Ok(report)
}

/// Records `package_path` in the repo's manifest if it isn't already
/// listed, inferring a `language` from the package's dominant extension
/// among the files just discovered (`spec.md` §6).
fn update_manifest(repo_id: &str, package_path: &str, package_root: &Path) -> DevacResult<()> {
    let repo_root = infer_repo_root(package_root, package_path);
    let manifest_path = RepoManifest::path_for_repo(&repo_root);
    let mut manifest = RepoManifest::load(&manifest_path).unwrap_or_else(|_| RepoManifest { repo_id: repo_id.to_string(), packages: Vec::new() });

    if !manifest.packages.iter().any(|p| p.path == package_path) {
        let language = dominant_language(package_root);
        manifest.packages.push(PackageEntry { path: package_path.to_string(), name: package_name(package_path, package_root), language });
    }

    manifest
        .save(&manifest_path)
        .map_err(|e| DevacError::IoFailed { path: manifest_path.display().to_string(), source: e })
}

/// `package_root` is `<repo_root>/<package_path>` unless `package_path` is
/// `"."`, in which case they're the same directory.
fn infer_repo_root(package_root: &Path, package_path: &str) -> PathBuf {
    if package_path == "." {
        package_root.to_path_buf()
    } else {
        let mut root = package_root.to_path_buf();
        for _ in Path::new(package_path).components() {
            root.pop();
        }
        root
    }
}

fn package_name(package_path: &str, package_root: &Path) -> String {
    if package_path == "." {
        package_root.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| package_path.to_string())
    } else {
        Path::new(package_path).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| package_path.to_string())
    }
}

/// Picks whichever of the known extensions appears most often among the
/// package's files, as a best-effort manifest `language` field.
fn dominant_language(package_root: &Path) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in WalkDir::new(package_root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = match entry.path().extension().and_then(|e| e.to_str()) {
            Some(e) => e,
            None => continue,
        };
        let lang = match ext {
            "ts" | "tsx" => "typescript",
            "js" | "jsx" | "mjs" | "cjs" => "javascript",
            "py" => "python",
            "cs" => "csharp",
            _ => continue,
        };
        *counts.entry(lang).or_insert(0) += 1;
    }
    counts.into_iter().max_by_key(|(_, count)| *count).map(|(lang, _)| lang.to_string()).unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn discover_files_finds_known_extensions_and_skips_heavy_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        write_file(dir.path(), "src/app.ts", "export function f() {}");
        write_file(dir.path(), "node_modules/dep/index.js", "module.exports = {}");
        write_file(dir.path(), "README.md", "not code");

        let files = discover_files(dir.path());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/app.ts"));
    }

    #[test]
    fn discover_files_respects_gitignore() {
        let dir = tempfile::TempDir::new().unwrap();
        write_file(dir.path(), "src/app.ts", "export function f() {}");
        write_file(dir.path(), "dist/bundle.js", "var x = 1;");
        write_file(dir.path(), ".gitignore", "dist\n");

        let files = discover_files(dir.path());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/app.ts"));
    }

    #[test]
    fn ingest_package_writes_seed_and_manifest() {
        let dir = tempfile::TempDir::new().unwrap();
        write_file(dir.path(), "src/app.ts", "export function greet() { return 1; }");

        let report = ingest_package("acme/api", ".", dir.path()).unwrap();
        assert_eq!(report.files_parsed, 1);
        assert_eq!(report.files_unchanged, 0);

        let store = SeedStore::new(dir.path());
        let seed = store.read(Branch::Base).unwrap();
        assert!(!seed.nodes.is_empty());

        let manifest = RepoManifest::load(&RepoManifest::path_for_repo(dir.path())).unwrap();
        assert_eq!(manifest.repo_id, "acme/api");
        assert_eq!(manifest.packages.len(), 1);
        assert_eq!(manifest.packages[0].path, ".");
        assert_eq!(manifest.packages[0].language, "typescript");
    }

    #[test]
    fn ingest_package_second_pass_is_incremental() {
        let dir = tempfile::TempDir::new().unwrap();
        write_file(dir.path(), "src/app.ts", "export function greet() { return 1; }");
        ingest_package("acme/api", ".", dir.path()).unwrap();

        let second = ingest_package("acme/api", ".", dir.path()).unwrap();
        assert_eq!(second.files_parsed, 0);
        assert_eq!(second.files_unchanged, 1);
    }

    #[test]
    fn ingest_package_reparse_does_not_duplicate_external_refs() {
        let dir = tempfile::TempDir::new().unwrap();
        write_file(
            dir.path(),
            "src/app.ts",
            "import { S3Client } from \"@aws-sdk/client-s3\";\nexport function greet() { return 1; }",
        );
        ingest_package("acme/api", ".", dir.path()).unwrap();

        // Change the file's content (new hash, same import) and re-ingest;
        // the old file's external_refs row must be replaced, not duplicated.
        write_file(
            dir.path(),
            "src/app.ts",
            "import { S3Client } from \"@aws-sdk/client-s3\";\nexport function greet() { return 2; }",
        );
        let report = ingest_package("acme/api", ".", dir.path()).unwrap();
        assert_eq!(report.files_parsed, 1);

        let store = SeedStore::new(dir.path());
        let seed = store.read(Branch::Base).unwrap();
        assert_eq!(seed.external_refs.len(), 1);
    }

    #[test]
    fn ingest_package_drops_rows_for_deleted_files() {
        let dir = tempfile::TempDir::new().unwrap();
        write_file(dir.path(), "src/app.ts", "export function greet() { return 1; }");
        ingest_package("acme/api", ".", dir.path()).unwrap();

        std::fs::remove_file(dir.path().join("src/app.ts")).unwrap();
        let report = ingest_package("acme/api", ".", dir.path()).unwrap();
        assert_eq!(report.files_dropped, 1);

        let store = SeedStore::new(dir.path());
        let seed = store.read(Branch::Base).unwrap();
        assert!(seed.nodes.is_empty());
    }
}
