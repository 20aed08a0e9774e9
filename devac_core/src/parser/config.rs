//! Parser configuration shared by every language backend (`spec.md` §4.B).

use std::path::Path;

use crate::model::Branch;

/// Configuration passed into every `parse_file`/`parse_content` call.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub repo_name: String,
    pub package_path: String,
    /// Absolute root the parser resolves relative `file_path`s against.
    /// When absent, paths pass through unchanged (`spec.md` §4.B contract).
    pub package_root: Option<std::path::PathBuf>,
    pub branch: Branch,
    pub include_documentation: bool,
    pub include_types: bool,
    pub max_scope_depth: u32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            repo_name: String::new(),
            package_path: ".".to_string(),
            package_root: None,
            branch: Branch::Base,
            include_documentation: true,
            include_types: true,
            max_scope_depth: 64,
        }
    }
}

impl ParserConfig {
    /// Path emitted in nodes/edges, relative to `package_root` when set.
    pub fn relative_path<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        match &self.package_root {
            Some(root) => match path.strip_prefix(root) {
                Ok(rel) => rel.to_string_lossy().into_owned().into(),
                Err(_) => path.to_string_lossy(),
            },
            None => path.to_string_lossy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_strips_package_root() {
        let cfg = ParserConfig {
            package_root: Some("/repo/pkg".into()),
            ..Default::default()
        };
        assert_eq!(cfg.relative_path(Path::new("/repo/pkg/src/app.ts")), "src/app.ts");
    }

    #[test]
    fn relative_path_passes_through_without_root() {
        let cfg = ParserConfig::default();
        assert_eq!(cfg.relative_path(Path::new("src/app.ts")), "src/app.ts");
    }
}
