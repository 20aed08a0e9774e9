//! C# backend (`.cs`): a nominal, brace-scoped language with no dedicated
//! analyzer in the teacher repo, so this generalizes the teacher's
//! regex/`OnceLock` construct-matching technique (used there for Rust items)
//! to C#'s declaration forms.

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

fn regex_using() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^\s*using\s+(?:static\s+)?(?P<alias>[A-Za-z_][A-Za-z0-9_]*\s*=\s*)?(?P<ns>[A-Za-z_][A-Za-z0-9_\.]*)\s*;"))
}

fn regex_namespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^\s*namespace\s+(?P<name>[A-Za-z_][A-Za-z0-9_\.]*)"))
}

fn regex_type_decl() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(
            r"^\s*(?P<modifiers>(?:(?:public|private|protected|internal|static|sealed|abstract|partial)\s+)*)(?P<kind>class|interface|struct|record|enum)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?:<[^>]*>)?\s*(?::\s*(?P<bases>[^\{]+))?",
        )
    })
}

/// `[Route("api/[controller]")]`, `[HttpGet("id")]`-style attributes
/// (generalized from the method/class route-decorator rule).
fn regex_attribute() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^\s*\[(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?:\((?P<args>[^\]]*)\))?\]"))
}

fn regex_method() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(
            r"^\s*(?P<modifiers>(?:(?:public|private|protected|internal|static|virtual|override|abstract|async|sealed)\s+)*)(?P<ret>[A-Za-z_][A-Za-z0-9_<>\[\],\.\? ]*?)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\((?P<params>[^)]*)\)\s*(?:\{|=>|;)",
        )
    })
}

fn regex_call_site() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"(?P<callee>[A-Za-z_][A-Za-z0-9_\.]*)\s*\((?P<args>[^()]*)\)"))
}

fn regex_new_expr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"\bnew\s+(?P<type>[A-Za-z_][A-Za-z0-9_\.]*)\s*\("))
}

const ROUTE_ATTRIBUTES: &[(&str, &str)] = &[
    ("HttpGet", "GET"),
    ("HttpPost", "POST"),
    ("HttpPut", "PUT"),
    ("HttpDelete", "DELETE"),
    ("HttpPatch", "PATCH"),
];

const DOTNET_BCL_PREFIXES: &[&str] = &["System", "Microsoft"];

fn is_dotnet_builtin(namespace: &str) -> bool {
    DOTNET_BCL_PREFIXES.iter().any(|p| namespace == *p || namespace.starts_with(&format!("{p}.")))
}

#[derive(Clone)]
struct ContainerFrame {
    entity_id: String,
    name: String,
    brace_depth: i32,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct CSharpBackend;

impl LanguageBackend for CSharpBackend {
    fn language(&self) -> &'static str {
        "csharp"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cs"]
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
            brace_depth: -1,
            kind: NodeKind::Module,
        }];
        let mut scope_ctx = ScopeContext::new();
        let mut pending_attributes: Vec<String> = Vec::new();
        let mut brace_depth: i32 = 0;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = (idx + 1) as u32;
            let trimmed = raw_line.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }

            let open_braces = raw_line.matches('{').count() as i32;
            let close_braces = raw_line.matches('}').count() as i32;

            while containers.len() > 1 && brace_depth <= containers.last().unwrap().brace_depth {
                containers.pop();
            }

            if let Some(caps) = regex_attribute().captures(trimmed) {
                let name = caps.name("name").unwrap().as_str().to_string();
                pending_attributes.push(name.clone());
                if let Some((_, verb)) = ROUTE_ATTRIBUTES.iter().find(|(attr, _)| *attr == name) {
                    let route_path = caps
                        .name("args")
                        .map(|m| m.as_str().trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                        .unwrap_or_default();
                    let (container_id, _) = current_container(&containers);
                    result.effects.push(Effect {
                        source_entity_id: container_id.to_string(),
                        source_file_path: file_path.clone(),
                        source_line: line_no,
                        source_column: 0,
                        branch: cfg.branch,
                        data: EffectData::Request(RequestEffectData {
                            http_method: verb.to_string(),
                            route_pattern: route_path,
                            framework: "aspnetcore".to_string(),
                        }),
                    });
                }
                brace_depth += open_braces - close_braces;
                continue;
            }

            if let Some(caps) = regex_using().captures(trimmed) {
                let ns = caps.name("ns").unwrap().as_str().to_string();
                result.external_refs.push(ExternalRef {
                    source_entity_id: result.nodes[0].entity_id.clone(),
                    module_specifier: ns,
                    imported_symbol: "*".to_string(),
                    local_alias: None,
                    import_style: ImportStyle::Namespace,
                    is_type_only: false,
                    is_reexport: false,
                    export_alias: None,
                });
                brace_depth += open_braces - close_braces;
                continue;
            }

            if let Some(caps) = regex_namespace().captures(trimmed) {
                let name = caps.name("name").unwrap().as_str().to_string();
                let id = entity_id(&cfg.repo_name, &cfg.package_path, NodeKind::Namespace, &file_path, &name);
                result.nodes.push(Node {
                    entity_id: id.clone(),
                    name: name.clone(),
                    qualified_name: name.clone(),
                    kind: NodeKind::Namespace,
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
                let (container_id, _) = current_container(&containers);
                result.edges.push(contains_edge(container_id, &id, &file_path, &source_file_hash, line_no, cfg.branch));
                scope_ctx.push_scope(name.clone());
                containers.push(ContainerFrame { entity_id: id, name, brace_depth, kind: NodeKind::Namespace });
                brace_depth += open_braces - close_braces;
                continue;
            }

            if let Some(caps) = regex_type_decl().captures(trimmed) {
                let kind = match caps.name("kind").unwrap().as_str() {
                    "class" => NodeKind::Class,
                    "interface" => NodeKind::Interface,
                    "struct" => NodeKind::Struct,
                    "record" => NodeKind::Record,
                    "enum" => NodeKind::Enum,
                    _ => NodeKind::Class,
                };
                let name = caps.name("name").unwrap().as_str().to_string();
                let is_top_level = containers.last().map(|c| c.kind == NodeKind::Module || c.kind == NodeKind::Namespace).unwrap_or(true);
                let shape = SymbolShape {
                    name: name.clone(),
                    kind,
                    is_top_level,
                    parent_name: if is_top_level { None } else { Some(current_container(&containers).1.to_string()) },
                    ..Default::default()
                };
                let scoped = scoped_name(&shape, &mut scope_ctx);
                let id = entity_id(&cfg.repo_name, &cfg.package_path, kind, &file_path, &scoped);
                let modifiers = caps.name("modifiers").map(|m| m.as_str()).unwrap_or("");
                let visibility = if modifiers.contains("private") {
                    Visibility::Private
                } else if modifiers.contains("protected") {
                    Visibility::Protected
                } else if modifiers.contains("internal") {
                    Visibility::Internal
                } else {
                    Visibility::Public
                };
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
                    visibility,
                    flags: NodeFlags {
                        is_abstract: modifiers.contains("abstract"),
                        is_static: modifiers.contains("static"),
                        is_exported: visibility == Visibility::Public,
                        ..Default::default()
                    },
                    type_signature: None,
                    type_parameters: Vec::new(),
                    decorators: std::mem::take(&mut pending_attributes),
                    documentation: None,
                    properties: Default::default(),
                    branch: cfg.branch,
                });
                let (container_id, _) = current_container(&containers);
                result.edges.push(contains_edge(container_id, &id, &file_path, &source_file_hash, line_no, cfg.branch));

                if let Some(bases) = caps.name("bases") {
                    for base in bases.as_str().split(',') {
                        let base = base.trim().trim_end_matches("where").trim();
                        if base.is_empty() {
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

                scope_ctx.push_scope(name.clone());
                containers.push(ContainerFrame { entity_id: id, name, brace_depth, kind });
                brace_depth += open_braces - close_braces;
                continue;
            }

            let container_kind = containers.last().map(|c| c.kind);
            if matches!(container_kind, Some(NodeKind::Class) | Some(NodeKind::Struct) | Some(NodeKind::Record) | Some(NodeKind::Interface)) {
                if let Some(caps) = regex_method().captures(trimmed) {
                    let name = caps.name("name").unwrap().as_str().to_string();
                    let (_, parent_name) = current_container(&containers);
                    let modifiers = caps.name("modifiers").map(|m| m.as_str()).unwrap_or("");
                    let shape = SymbolShape {
                        name: name.clone(),
                        kind: NodeKind::Method,
                        is_class_member: true,
                        parent_name: Some(parent_name.to_string()),
                        ..Default::default()
                    };
                    let scoped = scoped_name(&shape, &mut scope_ctx);
                    let id = entity_id(&cfg.repo_name, &cfg.package_path, NodeKind::Method, &file_path, &scoped);
                    let visibility = if modifiers.contains("private") {
                        Visibility::Private
                    } else if modifiers.contains("protected") {
                        Visibility::Protected
                    } else if modifiers.contains("internal") {
                        Visibility::Internal
                    } else {
                        Visibility::Public
                    };
                    result.nodes.push(Node {
                        entity_id: id.clone(),
                        name: name.clone(),
                        qualified_name: scoped,
                        kind: NodeKind::Method,
                        file_path: file_path.clone(),
                        source_file_hash: source_file_hash.clone(),
                        start_line: line_no,
                        end_line: line_no,
                        start_column: 0,
                        end_column: 0,
                        visibility,
                        flags: NodeFlags {
                            is_static: modifiers.contains("static"),
                            is_async: modifiers.contains("async"),
                            is_abstract: modifiers.contains("abstract"),
                            is_exported: visibility == Visibility::Public,
                            ..Default::default()
                        },
                        type_signature: caps.name("ret").map(|m| m.as_str().trim().to_string()),
                        type_parameters: Vec::new(),
                        decorators: std::mem::take(&mut pending_attributes),
                        documentation: None,
                        properties: Default::default(),
                        branch: cfg.branch,
                    });
                    let (container_id, _) = current_container(&containers);
                    result.edges.push(contains_edge(container_id, &id, &file_path, &source_file_hash, line_no, cfg.branch));

                    for (param_idx, param) in caps.name("params").unwrap().as_str().split(',').enumerate() {
                        let param = param.trim();
                        if param.is_empty() {
                            continue;
                        }
                        let param_name = param.split_whitespace().last().unwrap_or("").trim_end_matches(',');
                        if param_name.is_empty() {
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

                    if trimmed.ends_with('{') {
                        containers.push(ContainerFrame { entity_id: id, name, brace_depth, kind: NodeKind::Method });
                    }
                    brace_depth += open_braces - close_braces;
                    continue;
                }
            }

            if matches!(container_kind, Some(NodeKind::Method)) {
                let (container_id, _) = current_container(&containers);
                let container_id = container_id.to_string();
                for caps in regex_new_expr().captures_iter(trimmed) {
                    let type_name = caps.name("type").unwrap().as_str();
                    result.edges.push(Edge {
                        source_entity_id: container_id.clone(),
                        target_entity_id: Edge::unresolved_target(type_name),
                        edge_type: EdgeType::Calls,
                        source_file_path: file_path.clone(),
                        source_file_hash: source_file_hash.clone(),
                        source_line: line_no,
                        source_column: 0,
                        properties: BTreeMap::from([("isConstructor".to_string(), serde_json::Value::Bool(true))]),
                        branch: cfg.branch,
                    });
                    result.effects.push(Effect {
                        source_entity_id: container_id.clone(),
                        source_file_path: file_path.clone(),
                        source_line: line_no,
                        source_column: 0,
                        branch: cfg.branch,
                        data: EffectData::FunctionCall(FunctionCallEffectData {
                            callee_name: type_name.to_string(),
                            callee_qualified_name: None,
                            is_method: false,
                            is_async: false,
                            is_constructor: true,
                            argument_count: 0,
                            is_external: !is_dotnet_builtin(type_name),
                            external_module: None,
                        }),
                    });
                }
                for caps in regex_call_site().captures_iter(trimmed) {
                    let callee = caps.name("callee").unwrap().as_str();
                    if matches!(callee, "if" | "for" | "foreach" | "while" | "switch" | "catch" | "using" | "return" | "new") {
                        continue;
                    }
                    let argument_count = caps
                        .name("args")
                        .map(|m| if m.as_str().trim().is_empty() { 0 } else { m.as_str().split(',').count() as u32 })
                        .unwrap_or(0);
                    let base = callee.split('.').next().unwrap_or(callee);
                    let is_external = result.external_refs.iter().any(|r| r.module_specifier == base) && !is_path_like_specifier(base);
                    result.edges.push(Edge {
                        source_entity_id: container_id.clone(),
                        target_entity_id: Edge::unresolved_target(callee),
                        edge_type: EdgeType::Calls,
                        source_file_path: file_path.clone(),
                        source_file_hash: source_file_hash.clone(),
                        source_line: line_no,
                        source_column: 0,
                        properties: Default::default(),
                        branch: cfg.branch,
                    });
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
                            is_constructor: false,
                            argument_count,
                            is_external,
                            external_module: if is_external { Some(base.to_string()) } else { None },
                        }),
                    });
                }
            }

            brace_depth += open_braces - close_braces;
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
        let backend = CSharpBackend;
        backend.parse_content(src.as_bytes(), Path::new("Pkg/Widget.cs"), &ParserConfig::default())
    }

    #[test]
    fn emits_module_node_for_empty_file() {
        let result = parse("");
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].kind, NodeKind::Module);
    }

    #[test]
    fn namespace_and_class_nest_with_contains_edges() {
        let src = "namespace Acme.Api\n{\n    public class Widget\n    {\n    }\n}\n";
        let result = parse(src);
        let ns = result.nodes.iter().find(|n| n.kind == NodeKind::Namespace).unwrap();
        let class = result.nodes.iter().find(|n| n.name == "Widget").unwrap();
        assert!(result
            .edges
            .iter()
            .any(|e| e.edge_type == EdgeType::Contains && e.source_entity_id == ns.entity_id && e.target_entity_id == class.entity_id));
    }

    #[test]
    fn using_directive_produces_external_ref() {
        let result = parse("using System.Net.Http;\n");
        assert_eq!(result.external_refs[0].module_specifier, "System.Net.Http");
    }

    #[test]
    fn class_implements_interface_by_naming_convention() {
        let src = "public class Widget : IWidget\n{\n}\n";
        let result = parse(src);
        let class = result.nodes.iter().find(|n| n.name == "Widget").unwrap();
        assert!(result
            .edges
            .iter()
            .any(|e| e.edge_type == EdgeType::Implements && e.source_entity_id == class.entity_id));
    }

    #[test]
    fn http_get_attribute_emits_request_effect() {
        let src = "public class UsersController\n{\n    [HttpGet(\"users\")]\n    public IActionResult List()\n    {\n        return Ok();\n    }\n}\n";
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
        assert_eq!(effect.route_pattern, "users");
    }

    #[test]
    fn method_parameters_emit_parameter_of_edges() {
        let src = "public class Widget\n{\n    public void Render(int count)\n    {\n    }\n}\n";
        let result = parse(src);
        let method = result.nodes.iter().find(|n| n.name == "Render").unwrap();
        let param = result.nodes.iter().find(|n| n.name == "count").unwrap();
        assert!(result
            .edges
            .iter()
            .any(|e| e.edge_type == EdgeType::ParameterOf && e.source_entity_id == param.entity_id && e.target_entity_id == method.entity_id));
    }
}
