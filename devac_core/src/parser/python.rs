//! Python backend (`.py`): a whitespace-scoped dynamic language analyzed
//! line-by-line with cached regexes, the same technique the teacher's
//! Python analyzer uses rather than a full grammar.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::identity::{entity_id, scoped_name, ScopeContext, SymbolShape};
use crate::model::{
    Branch, Edge, EdgeType, Effect, EffectData, ExternalRef, FunctionCallEffectData, ImportStyle,
    Node, NodeFlags, NodeKind, ParseResult, RequestEffectData, Visibility,
};
use crate::parser::{hash_source, is_path_like_specifier, LanguageBackend, ParserConfig};

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex literal")
}

fn regex_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^(?P<indent>\s*)import\s+(?P<modules>[\w\.]+(?:\s*,\s*[\w\.]+)*)"))
}

fn regex_from_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(r"^(?P<indent>\s*)from\s+(?P<module>[\w\.]+)\s+import\s+(?P<names>.+)")
    })
}

fn regex_def() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^(?P<indent>\s*)(?P<async>async\s+)?def\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\((?P<params>[^)]*)\)"))
}

fn regex_class() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^(?P<indent>\s*)class\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?:\((?P<bases>[^)]*)\))?\s*:"))
}

fn regex_decorator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^(?P<indent>\s*)@(?P<name>[A-Za-z_][A-Za-z0-9_\.]*)(?:\((?P<args>.*)\))?"))
}

/// Flask/FastAPI-style `@app.route("/x", methods=["GET"])` or
/// `@router.get("/x")` decorators (`spec.md` §4.B rule 9, generalized to Python).
fn regex_route_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(r#"^(?:app|router|blueprint|bp)\.(?P<verb>get|post|put|patch|delete|route)\(\s*["'](?P<path>[^"']*)["'](?:.*methods\s*=\s*\[(?P<methods>[^\]]*)\])?"#)
    })
}

fn regex_call_site() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"(?P<callee>[A-Za-z_][A-Za-z0-9_\.]*)\s*\((?P<args>[^()]*)\)"))
}

const PYTHON_STDLIB_PREFIXES: &[&str] = &[
    "os", "sys", "re", "json", "typing", "collections", "itertools", "functools", "pathlib",
    "asyncio", "dataclasses", "abc", "logging", "datetime", "enum", "unittest", "subprocess",
    "threading", "multiprocessing", "io", "math", "random", "uuid", "hashlib", "time",
];

fn is_python_builtin_module(module: &str) -> bool {
    let root = module.split('.').next().unwrap_or(module);
    PYTHON_STDLIB_PREFIXES.contains(&root)
}

fn indent_width(indent: &str) -> usize {
    indent.chars().map(|c| if c == '\t' { 8 } else { 1 }).sum()
}

#[derive(Clone)]
struct ContainerFrame {
    entity_id: String,
    name: String,
    indent: usize,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct PythonBackend;

impl LanguageBackend for PythonBackend {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn parse_content(&self, bytes: &[u8], path: &Path, cfg: &ParserConfig) -> ParseResult {
        let file_path = cfg.relative_path(path).into_owned();
        let content = String::from_utf8_lossy(bytes).into_owned();
        let source_file_hash = hash_source(bytes);

        let mut result = ParseResult {
            file_path: file_path.clone(),
            source_file_hash: source_file_hash.clone(),
            ..Default::default()
        };

        let module_entity_id = entity_id(&cfg.repo_name, &cfg.package_path, NodeKind::Module, &file_path, &file_path);
        let line_count = content.lines().count().max(1) as u32;
        result.nodes.push(Node {
            entity_id: module_entity_id.clone(),
            name: file_path.clone(),
            qualified_name: file_path.clone(),
            kind: NodeKind::Module,
            file_path: file_path.clone(),
            source_file_hash: source_file_hash.clone(),
            start_line: 1,
            end_line: line_count,
            start_column: 0,
            end_column: 0,
            visibility: Visibility::Public,
            flags: NodeFlags::default(),
            type_signature: None,
            type_parameters: Vec::new(),
            decorators: Vec::new(),
            documentation: None,
            properties: Default::default(),
            branch: cfg.branch,
        });

        let mut containers = vec![ContainerFrame {
            entity_id: module_entity_id,
            name: file_path.clone(),
            indent: 0,
            kind: NodeKind::Module,
        }];
        let mut scope_ctx = ScopeContext::new();
        let mut pending_decorators: Vec<String> = Vec::new();
        let mut all_names: Option<Vec<String>> = None;

        let lines: Vec<&str> = content.lines().collect();
        for (idx, raw_line) in lines.iter().enumerate() {
            let line_no = (idx + 1) as u32;
            if raw_line.trim().is_empty() || raw_line.trim_start().starts_with('#') {
                continue;
            }
            let indent = indent_width(&raw_line.chars().take_while(|c| c.is_whitespace()).collect::<String>());

            while containers.len() > 1 && indent <= containers.last().unwrap().indent {
                containers.pop();
            }

            if let Some(caps) = regex_decorator().captures(raw_line) {
                let name = caps.name("name").unwrap().as_str().to_string();
                pending_decorators.push(name.clone());
                if let Some(route) = regex_route_call().captures(raw_line.trim_start().trim_start_matches('@')) {
                    let verb = route.name("verb").map(|m| m.as_str()).unwrap_or("route");
                    let method = if verb == "route" {
                        route
                            .name("methods")
                            .map(|m| m.as_str().split(',').next().unwrap_or("GET").trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                            .unwrap_or_else(|| "GET".to_string())
                    } else {
                        verb.to_uppercase()
                    };
                    let route_path = route.name("path").map(|m| m.as_str().to_string()).unwrap_or_default();
                    let (container_id, _) = current_container(&containers);
                    result.effects.push(Effect {
                        source_entity_id: container_id.to_string(),
                        source_file_path: file_path.clone(),
                        source_line: line_no,
                        source_column: 0,
                        branch: cfg.branch,
                        data: EffectData::Request(RequestEffectData {
                            http_method: method,
                            route_pattern: route_path,
                            framework: "flask_or_fastapi".to_string(),
                        }),
                    });
                }
                continue;
            }

            if let Some(caps) = regex_import().captures(raw_line) {
                for module in caps.name("modules").unwrap().as_str().split(',') {
                    let module = module.trim().to_string();
                    if module.is_empty() {
                        continue;
                    }
                    result.external_refs.push(ExternalRef {
                        source_entity_id: result.nodes[0].entity_id.clone(),
                        module_specifier: module,
                        imported_symbol: "*".to_string(),
                        local_alias: None,
                        import_style: ImportStyle::Namespace,
                        is_type_only: false,
                        is_reexport: false,
                        export_alias: None,
                    });
                }
                continue;
            }

            if let Some(caps) = regex_from_import().captures(raw_line) {
                let module = caps.name("module").unwrap().as_str().to_string();
                let names_raw = caps.name("names").unwrap().as_str().trim();
                let names_raw = names_raw.trim_start_matches('(').trim_end_matches(')');
                for entry in names_raw.split(',') {
                    let entry = entry.trim();
                    if entry.is_empty() {
                        continue;
                    }
                    let (name, alias) = match entry.split_once(" as ") {
                        Some((n, a)) => (n.trim().to_string(), Some(a.trim().to_string())),
                        None => (entry.to_string(), None),
                    };
                    result.external_refs.push(ExternalRef {
                        source_entity_id: result.nodes[0].entity_id.clone(),
                        module_specifier: module.clone(),
                        imported_symbol: name,
                        local_alias: alias,
                        import_style: ImportStyle::Named,
                        is_type_only: false,
                        is_reexport: false,
                        export_alias: None,
                    });
                }
                continue;
            }

            if raw_line.trim_start().starts_with("__all__") {
                if let Some(bracket) = raw_line.find('[') {
                    if let Some(close) = raw_line.rfind(']') {
                        let names: Vec<String> = raw_line[bracket + 1..close]
                            .split(',')
                            .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                            .filter(|s| !s.is_empty())
                            .collect();
                        all_names = Some(names);
                    }
                }
                continue;
            }

            if let Some(caps) = regex_class().captures(raw_line) {
                let name = caps.name("name").unwrap().as_str().to_string();
                let is_top_level = containers.len() == 1;
                let shape = SymbolShape {
                    name: name.clone(),
                    kind: NodeKind::Class,
                    is_top_level,
                    parent_name: if is_top_level { None } else { Some(current_container(&containers).1.to_string()) },
                    ..Default::default()
                };
                let scoped = scoped_name(&shape, &mut scope_ctx);
                let id = entity_id(&cfg.repo_name, &cfg.package_path, NodeKind::Class, &file_path, &scoped);
                let is_exported = all_names.as_ref().map(|n| n.contains(&name)).unwrap_or(true);
                result.nodes.push(Node {
                    entity_id: id.clone(),
                    name: name.clone(),
                    qualified_name: scoped,
                    kind: NodeKind::Class,
                    file_path: file_path.clone(),
                    source_file_hash: source_file_hash.clone(),
                    start_line: line_no,
                    end_line: line_no,
                    start_column: 0,
                    end_column: 0,
                    visibility: Visibility::Public,
                    flags: NodeFlags { is_exported, ..Default::default() },
                    type_signature: None,
                    type_parameters: Vec::new(),
                    decorators: std::mem::take(&mut pending_decorators),
                    documentation: None,
                    properties: Default::default(),
                    branch: cfg.branch,
                });
                let (container_id, _) = current_container(&containers);
                result.edges.push(contains_edge(container_id, &id, &file_path, &source_file_hash, line_no, cfg.branch));

                if let Some(bases) = caps.name("bases") {
                    for base in bases.as_str().split(',') {
                        let base = base.trim();
                        if base.is_empty() || base == "object" {
                            continue;
                        }
                        let edge_type = if base.starts_with('I') && base.chars().nth(1).map(|c| c.is_uppercase()).unwrap_or(false) {
                            EdgeType::Implements
                        } else {
                            EdgeType::Extends
                        };
                        result.edges.push(Edge {
                            source_entity_id: id.clone(),
                            target_entity_id: Edge::unresolved_target(base),
                            edge_type,
                            source_file_path: file_path.clone(),
                            source_file_hash: source_file_hash.clone(),
                            source_line: line_no,
                            source_column: 0,
                            properties: Default::default(),
                            branch: cfg.branch,
                        });
                    }
                }

                containers.push(ContainerFrame { entity_id: id, name, indent, kind: NodeKind::Class });
                continue;
            }

            if let Some(caps) = regex_def().captures(raw_line) {
                let name = caps.name("name").unwrap().as_str().to_string();
                let is_method = containers.last().map(|c| c.kind == NodeKind::Class).unwrap_or(false);
                let is_top_level = containers.len() == 1;
                let kind = if is_method { NodeKind::Method } else { NodeKind::Function };
                let (_, parent_name) = current_container(&containers);
                let shape = SymbolShape {
                    name: name.clone(),
                    kind,
                    is_top_level,
                    is_class_member: is_method,
                    parent_name: if is_top_level { None } else { Some(parent_name.to_string()) },
                    ..Default::default()
                };
                let scoped = scoped_name(&shape, &mut scope_ctx);
                let id = entity_id(&cfg.repo_name, &cfg.package_path, kind, &file_path, &scoped);
                let is_exported = if is_method {
                    !name.starts_with('_')
                } else {
                    all_names.as_ref().map(|n| n.contains(&name)).unwrap_or(!name.starts_with('_'))
                };
                let decorators = std::mem::take(&mut pending_decorators);
                result.nodes.push(Node {
                    entity_id: id.clone(),
                    name: name.clone(),
                    qualified_name: scoped,
                    kind,
                    file_path: file_path.clone(),
                    source_file_hash: source_file_hash.clone(),
                    start_line: line_no,
                    end_line: line_no,
                    start_column: 0,
                    end_column: 0,
                    visibility: if name.starts_with('_') { Visibility::Private } else { Visibility::Public },
                    flags: NodeFlags {
                        is_exported,
                        is_async: caps.name("async").is_some(),
                        ..Default::default()
                    },
                    type_signature: None,
                    type_parameters: Vec::new(),
                    decorators,
                    documentation: None,
                    properties: Default::default(),
                    branch: cfg.branch,
                });
                let (container_id, _) = current_container(&containers);
                result.edges.push(contains_edge(container_id, &id, &file_path, &source_file_hash, line_no, cfg.branch));

                for (param_idx, param) in caps.name("params").unwrap().as_str().split(',').enumerate() {
                    let param_name = param.trim().split(':').next().unwrap_or("").split('=').next().unwrap_or("").trim();
                    if param_name.is_empty() || param_name == "self" || param_name == "cls" {
                        continue;
                    }
                    let param_shape = SymbolShape {
                        name: param_name.to_string(),
                        kind: NodeKind::Parameter,
                        parent_name: Some(id.clone()),
                        ..Default::default()
                    };
                    let param_scoped = scoped_name(&param_shape, &mut scope_ctx);
                    let param_id = entity_id(&cfg.repo_name, &cfg.package_path, NodeKind::Parameter, &file_path, &format!("{id}::{param_scoped}#{param_idx}"));
                    result.nodes.push(Node {
                        entity_id: param_id.clone(),
                        name: param_name.to_string(),
                        qualified_name: param_scoped,
                        kind: NodeKind::Parameter,
                        file_path: file_path.clone(),
                        source_file_hash: source_file_hash.clone(),
                        start_line: line_no,
                        end_line: line_no,
                        start_column: 0,
                        end_column: 0,
                        visibility: Visibility::Public,
                        flags: NodeFlags::default(),
                        type_signature: None,
                        type_parameters: Vec::new(),
                        decorators: Vec::new(),
                        documentation: None,
                        properties: Default::default(),
                        branch: cfg.branch,
                    });
                    result.edges.push(Edge {
                        source_entity_id: param_id,
                        target_entity_id: id.clone(),
                        edge_type: EdgeType::ParameterOf,
                        source_file_path: file_path.clone(),
                        source_file_hash: source_file_hash.clone(),
                        source_line: line_no,
                        source_column: 0,
                        properties: Default::default(),
                        branch: cfg.branch,
                    });
                }

                containers.push(ContainerFrame { entity_id: id, name, indent, kind });
                continue;
            }

            // Call sites within the current function/method body (rule 6/7).
            let (container_id, _) = current_container(&containers);
            let container_id = container_id.to_string();
            if containers.last().map(|c| matches!(c.kind, NodeKind::Function | NodeKind::Method)).unwrap_or(false) {
                for caps in regex_call_site().captures_iter(raw_line) {
                    let callee = caps.name("callee").unwrap().as_str();
                    if matches!(callee, "if" | "for" | "while" | "with" | "return" | "print") {
                        continue;
                    }
                    let argument_count = caps
                        .name("args")
                        .map(|m| if m.as_str().trim().is_empty() { 0 } else { m.as_str().split(',').count() as u32 })
                        .unwrap_or(0);
                    result.edges.push(Edge {
                        source_entity_id: container_id.clone(),
                        target_entity_id: Edge::unresolved_target(callee),
                        edge_type: EdgeType::Calls,
                        source_file_path: file_path.clone(),
                        source_file_hash: source_file_hash.clone(),
                        source_line: line_no,
                        source_column: 0,
                        properties: BTreeMap::new(),
                        branch: cfg.branch,
                    });
                    let base_module = callee.split('.').next().unwrap_or(callee);
                    let is_external = result
                        .external_refs
                        .iter()
                        .any(|r| r.local_alias.as_deref() == Some(base_module) || r.imported_symbol == base_module)
                        && !is_python_builtin_module(base_module)
                        && !is_path_like_specifier(base_module);
                    result.effects.push(Effect {
                        source_entity_id: container_id.clone(),
                        source_file_path: file_path.clone(),
                        source_line: line_no,
                        source_column: 0,
                        branch: cfg.branch,
                        data: EffectData::FunctionCall(FunctionCallEffectData {
                            callee_name: callee.to_string(),
                            callee_qualified_name: None,
                            is_method: callee.contains('.'),
                            is_async: false,
                            is_constructor: callee.chars().next().map(|c| c.is_uppercase()).unwrap_or(false),
                            argument_count,
                            is_external,
                            external_module: if is_external { Some(base_module.to_string()) } else { None },
                        }),
                    });
                }
            }
        }

        result
    }
}

fn current_container(containers: &[ContainerFrame]) -> (&str, &str) {
    let top = containers.last().expect("module frame always present");
    (top.entity_id.as_str(), top.name.as_str())
}

fn contains_edge(container_id: &str, child_id: &str, file_path: &str, hash: &str, line: u32, branch: Branch) -> Edge {
    Edge {
        source_entity_id: container_id.to_string(),
        target_entity_id: child_id.to_string(),
        edge_type: EdgeType::Contains,
        source_file_path: file_path.to_string(),
        source_file_hash: hash.to_string(),
        source_line: line,
        source_column: 0,
        properties: Default::default(),
        branch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(src: &str) -> ParseResult {
        let backend = PythonBackend;
        backend.parse_content(src.as_bytes(), Path::new("pkg/app.py"), &ParserConfig::default())
    }

    #[test]
    fn emits_module_node_for_empty_file() {
        let result = parse("");
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].kind, NodeKind::Module);
    }

    #[test]
    fn function_and_class_become_nodes_with_contains_edges() {
        let src = "class Widget:\n    def render(self, count):\n        pass\n";
        let result = parse(src);
        let class = result.nodes.iter().find(|n| n.name == "Widget").unwrap();
        let method = result.nodes.iter().find(|n| n.name == "render").unwrap();
        assert!(result
            .edges
            .iter()
            .any(|e| e.edge_type == EdgeType::Contains && e.source_entity_id == class.entity_id && e.target_entity_id == method.entity_id));
    }

    #[test]
    fn from_import_produces_external_ref() {
        let result = parse("from requests import Session\n");
        let ext_ref = &result.external_refs[0];
        assert_eq!(ext_ref.module_specifier, "requests");
        assert_eq!(ext_ref.imported_symbol, "Session");
    }

    #[test]
    fn route_decorator_emits_request_effect() {
        let src = "@app.get(\"/users\")\ndef list_users():\n    pass\n";
        let result = parse(src);
        let effect = result
            .effects
            .iter()
            .find_map(|e| match &e.data {
                EffectData::Request(data) => Some(data),
                _ => None,
            })
            .expect("request effect");
        assert_eq!(effect.http_method, "GET");
        assert_eq!(effect.route_pattern, "/users");
    }

    #[test]
    fn underscore_prefixed_function_is_not_exported() {
        let result = parse("def _helper():\n    pass\n");
        let func = result.nodes.iter().find(|n| n.name == "_helper").unwrap();
        assert!(!func.flags.is_exported);
    }
}
