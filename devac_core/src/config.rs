//! Project-local `.devac/config.toml` overrides (`SPEC_FULL.md` §1,
//! "Configuration"). Distinct from `<workspace>/.devac/workspace.json`
//! (`spec.md` §6, versioned and shared) and `<repo>/.devac/manifest.json`:
//! this file holds per-checkout parser tuning that a developer wouldn't
//! want to commit to the shared workspace config, mirroring the teacher's
//! own `.loctree/config.toml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::Branch;
use crate::parser::ParserConfig;

/// `<package_root>/.devac/config.toml`. Every field is optional; a missing
/// file or a missing field both resolve to `ParserConfig::default()`'s
/// values, same "missing means default" contract as `workspace.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevacConfig {
    pub include_documentation: Option<bool>,
    pub include_types: Option<bool>,
    pub max_scope_depth: Option<u32>,
    /// Extra glob patterns to skip during ingest, on top of `.gitignore`.
    pub ignore_patterns: Vec<String>,
}

impl DevacConfig {
    pub fn load(package_root: &Path) -> std::io::Result<Self> {
        let path = package_root.join(".devac").join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        toml::from_str(&contents).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Applies this override onto a base `ParserConfig`, leaving fields
    /// untouched when the override leaves them unset.
    pub fn apply(&self, mut cfg: ParserConfig) -> ParserConfig {
        if let Some(v) = self.include_documentation {
            cfg.include_documentation = v;
        }
        if let Some(v) = self.include_types {
            cfg.include_types = v;
        }
        if let Some(v) = self.max_scope_depth {
            cfg.max_scope_depth = v;
        }
        cfg
    }
}

/// Builds the default `base`-branch `ParserConfig` for a package, with any
/// `.devac/config.toml` override applied.
pub fn resolve_parser_config(repo_name: &str, package_path: &str, package_root: &Path) -> ParserConfig {
    let base = ParserConfig {
        repo_name: repo_name.to_string(),
        package_path: package_path.to_string(),
        package_root: Some(package_root.to_path_buf()),
        branch: Branch::Base,
        ..ParserConfig::default()
    };
    DevacConfig::load(package_root).unwrap_or_default().apply(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_resolves_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = DevacConfig::load(dir.path()).unwrap();
        assert!(cfg.include_documentation.is_none());
        assert!(cfg.ignore_patterns.is_empty());
    }

    #[test]
    fn partial_override_only_touches_set_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".devac")).unwrap();
        std::fs::write(
            dir.path().join(".devac").join("config.toml"),
            "max_scope_depth = 8\nignore_patterns = [\"**/generated/**\"]\n",
        )
        .unwrap();
        let cfg = DevacConfig::load(dir.path()).unwrap();
        let resolved = cfg.apply(ParserConfig::default());
        assert_eq!(resolved.max_scope_depth, 8);
        assert!(resolved.include_documentation); // untouched, still default
        assert_eq!(cfg.ignore_patterns, vec!["**/generated/**".to_string()]);
    }
}
