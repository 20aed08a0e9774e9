//! TypeScript/JavaScript backend: `.ts .tsx .js .jsx .mjs .cjs`.
//!
//! Drives `oxc_parser` into an AST, walks it with an `oxc_ast_visit::Visit`
//! implementation, and normalizes declarations into the graph model. Mirrors
//! the parser pipeline shape of the curly-brace analyzer this crate grew out
//! of: `Parser::new(...).parse()` followed by a visitor, with
//! `oxc_semantic::SemanticBuilder` layered on top for local symbol tracking.

use std::collections::HashSet;
use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{
    Visit,
    walk::{walk_class, walk_expression, walk_function, walk_ts_interface_declaration},
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, Span};
use oxc_span::SourceType;

use crate::identity::{entity_id, scoped_name, ScopeContext, SymbolShape};
use crate::model::{
    Branch, Edge, EdgeType, EffectData, ExternalRef, FunctionCallEffectData, ImportStyle,
    Node, NodeFlags, NodeKind, ParseResult, RequestEffectData, SendEffectData, Visibility,
};
use crate::parser::{
    clean_block_comment, classify_send_target, hash_source, is_builtin_specifier,
    is_path_like_specifier, reconstruct_url_pattern, LanguageBackend, ParserConfig, UrlPart,
    HTTP_CLIENT_METHODS, ROUTE_METHOD_DECORATORS, ROUTE_PREFIX_DECORATORS,
};

#[derive(Debug, Clone)]
pub struct TsJsBackend;

impl LanguageBackend for TsJsBackend {
    fn language(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "js", "jsx", "mjs", "cjs"]
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

        let allocator = Allocator::default();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let is_jsx = ext == "tsx" || ext == "jsx";
        let source_type = SourceType::from_path(path)
            .unwrap_or_default()
            .with_typescript(true)
            .with_jsx(is_jsx);

        let ret = Parser::new(&allocator, &content, source_type).parse();
        if !ret.errors.is_empty() {
            result
                .warnings
                .push(format!("{} parser errors in {file_path}", ret.errors.len()));
        }

        let module_entity_id = entity_id(
            &cfg.repo_name,
            &cfg.package_path,
            NodeKind::Module,
            &file_path,
            &file_path,
        );
        result.nodes.push(Node {
            entity_id: module_entity_id.clone(),
            name: file_path.clone(),
            qualified_name: file_path.clone(),
            kind: NodeKind::Module,
            file_path: file_path.clone(),
            source_file_hash: source_file_hash.clone(),
            start_line: 1,
            end_line: content.lines().count().max(1) as u32,
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

        let mut visitor = TsJsVisitor::new(cfg, &file_path, &content, &source_file_hash, module_entity_id);
        visitor.visit_program(&ret.program);

        result.nodes.extend(visitor.nodes);
        result.edges.extend(visitor.edges);
        result.external_refs.extend(visitor.external_refs);
        result.effects.extend(visitor.effects);
        result.warnings.extend(visitor.warnings);

        // Second pass: mark top-level exported names, per `spec.md` §3's
        // `is_exported` flag. Done after the walk so export declarations
        // anywhere in the file (before or after the declaration) apply.
        for node in result.nodes.iter_mut() {
            if visitor.exported_names.contains(&node.name) {
                node.flags.is_exported = true;
            }
            if visitor.default_export_name.as_deref() == Some(node.name.as_str()) {
                node.flags.is_default_export = true;
            }
        }

        result
    }
}

/// One level of lexical container the visitor is currently inside: a class
/// or a function/method body. Call sites and nested declarations attribute
/// their `CONTAINS`/`CALLS` edges to the top of this stack.
struct ContainerFrame {
    entity_id: String,
    name: String,
}

struct TsJsVisitor<'cfg> {
    cfg: &'cfg ParserConfig,
    file_path: String,
    source_text: &'cfg str,
    source_hash: String,
    module_entity_id: String,
    scope_ctx: ScopeContext,
    containers: Vec<ContainerFrame>,
    /// Route prefix accumulated from class-level `@Controller("/users")`
    /// style decorators, applied to method-level route decorators (rule 9).
    route_prefix_stack: Vec<String>,
    imported_externals: std::collections::HashMap<String, (String, bool)>, // local name -> (module, is_external)

    nodes: Vec<Node>,
    edges: Vec<Edge>,
    external_refs: Vec<ExternalRef>,
    effects: Vec<Effect>,
    warnings: Vec<String>,
    exported_names: HashSet<String>,
    default_export_name: Option<String>,
}

use crate::model::Effect;

impl<'cfg> TsJsVisitor<'cfg> {
    fn new(
        cfg: &'cfg ParserConfig,
        file_path: &str,
        source_text: &'cfg str,
        source_hash: &str,
        module_entity_id: String,
    ) -> Self {
        Self {
            cfg,
            file_path: file_path.to_string(),
            source_text,
            source_hash: source_hash.to_string(),
            module_entity_id: module_entity_id.clone(),
            scope_ctx: ScopeContext::new(),
            containers: vec![ContainerFrame {
                entity_id: module_entity_id,
                name: file_path.to_string(),
            }],
            route_prefix_stack: Vec::new(),
            imported_externals: Default::default(),
            nodes: Vec::new(),
            edges: Vec::new(),
            external_refs: Vec::new(),
            effects: Vec::new(),
            warnings: Vec::new(),
            exported_names: HashSet::new(),
            default_export_name: None,
        }
    }

    fn get_line(&self, span: Span) -> u32 {
        let capped = std::cmp::min(span.start as usize, self.source_text.len());
        (self.source_text[..capped].bytes().filter(|b| *b == b'\n').count() + 1) as u32
    }

    fn current_container(&self) -> (&str, &str) {
        let top = self.containers.last().expect("module frame always present");
        (top.entity_id.as_str(), top.name.as_str())
    }

    fn documentation_for(&self, start: u32) -> Option<String> {
        let target_line = start.saturating_sub(1) as usize;
        let lines: Vec<&str> = self.source_text.lines().collect();
        if target_line == 0 || target_line > lines.len() {
            return None;
        }
        let mut end = target_line; // 1-indexed line just above the declaration
        // Walk upward over blank lines to find a preceding block comment end.
        while end > 0 && lines[end - 1].trim().is_empty() {
            end -= 1;
        }
        if end == 0 || !lines[end - 1].trim_end().ends_with("*/") {
            return None;
        }
        let mut start_idx = end;
        while start_idx > 0 && !lines[start_idx - 1].trim_start().starts_with("/*") {
            start_idx -= 1;
        }
        if start_idx == 0 {
            return None;
        }
        let raw = lines[start_idx - 1..end].join("\n");
        clean_block_comment(&raw)
    }

    fn push_node(&mut self, shape: &SymbolShape, span: Span, flags: NodeFlags, decorators: Vec<String>, type_signature: Option<String>, visibility: Visibility, documentation: Option<String>) -> String {
        let name = scoped_name(shape, &mut self.scope_ctx);
        let qualified_name = name.clone();
        let id = entity_id(&self.cfg.repo_name, &self.cfg.package_path, shape.kind, &self.file_path, &name);
        let line = self.get_line(span);
        self.nodes.push(Node {
            entity_id: id.clone(),
            name: shape.name.clone(),
            qualified_name,
            kind: shape.kind,
            file_path: self.file_path.clone(),
            source_file_hash: self.source_hash.clone(),
            start_line: line,
            end_line: line,
            start_column: span.start,
            end_column: span.end,
            visibility,
            flags,
            type_signature,
            type_parameters: Vec::new(),
            decorators: decorators.clone(),
            documentation,
            properties: Default::default(),
            branch: self.cfg.branch,
        });

        let (container_id, _) = self.current_container();
        self.edges.push(Edge {
            source_entity_id: container_id.to_string(),
            target_entity_id: id.clone(),
            edge_type: EdgeType::Contains,
            source_file_path: self.file_path.clone(),
            source_file_hash: self.source_hash.clone(),
            source_line: line,
            source_column: span.start,
            properties: Default::default(),
            branch: self.cfg.branch,
        });

        for decorator_name in decorators {
            let normalized = decorator_name.trim_end_matches("Attribute").to_string();
            let decorator_scoped = format!("@{normalized}");
            let decorator_id = entity_id(
                &self.cfg.repo_name,
                &self.cfg.package_path,
                NodeKind::Decorator,
                &self.file_path,
                &decorator_scoped,
            );
            if !self.nodes.iter().any(|n| n.entity_id == decorator_id) {
                self.nodes.push(Node {
                    entity_id: decorator_id.clone(),
                    name: normalized.clone(),
                    qualified_name: decorator_scoped,
                    kind: NodeKind::Decorator,
                    file_path: self.file_path.clone(),
                    source_file_hash: self.source_hash.clone(),
                    start_line: line,
                    end_line: line,
                    start_column: span.start,
                    end_column: span.end,
                    visibility: Visibility::Public,
                    flags: NodeFlags::default(),
                    type_signature: None,
                    type_parameters: Vec::new(),
                    decorators: Vec::new(),
                    documentation: None,
                    properties: Default::default(),
                    branch: self.cfg.branch,
                });
            }
            self.edges.push(Edge {
                source_entity_id: decorator_id,
                target_entity_id: id.clone(),
                edge_type: EdgeType::Decorates,
                source_file_path: self.file_path.clone(),
                source_file_hash: self.source_hash.clone(),
                source_line: line,
                source_column: span.start,
                properties: Default::default(),
                branch: self.cfg.branch,
            });
        }

        id
    }

    fn push_parameters(&mut self, owner_id: &str, params: &FormalParameters<'_>, span: Span) {
        let line = self.get_line(span);
        for (idx, param) in params.items.iter().enumerate() {
            let name = binding_pattern_name(&param.pattern).unwrap_or_else(|| format!("arg{idx}"));
            let type_signature = param
                .pattern
                .type_annotation
                .as_ref()
                .map(|ann| ts_type_to_string(&ann.type_annotation));
            let shape = SymbolShape {
                name: name.clone(),
                kind: NodeKind::Parameter,
                is_top_level: false,
                parent_name: Some(owner_id.to_string()),
                ..Default::default()
            };
            let scoped = scoped_name(&shape, &mut self.scope_ctx);
            let param_id = entity_id(&self.cfg.repo_name, &self.cfg.package_path, NodeKind::Parameter, &self.file_path, &format!("{owner_id}::{scoped}"));
            self.nodes.push(Node {
                entity_id: param_id.clone(),
                name,
                qualified_name: scoped,
                kind: NodeKind::Parameter,
                file_path: self.file_path.clone(),
                source_file_hash: self.source_hash.clone(),
                start_line: line,
                end_line: line,
                start_column: span.start,
                end_column: span.end,
                visibility: Visibility::Public,
                flags: NodeFlags::default(),
                type_signature,
                type_parameters: Vec::new(),
                decorators: Vec::new(),
                documentation: None,
                properties: Default::default(),
                branch: self.cfg.branch,
            });
            self.edges.push(Edge {
                source_entity_id: param_id,
                target_entity_id: owner_id.to_string(),
                edge_type: EdgeType::ParameterOf,
                source_file_path: self.file_path.clone(),
                source_file_hash: self.source_hash.clone(),
                source_line: line,
                source_column: span.start,
                properties: Default::default(),
                branch: self.cfg.branch,
            });
        }
    }

    fn record_call(&mut self, callee_text: &str, is_constructor: bool, is_method: bool, argument_count: u32, span: Span) {
        let (container_id, _) = self.current_container();
        let container_id = container_id.to_string();
        let line = self.get_line(span);
        let target = Edge::unresolved_target(callee_text);

        let mut props = std::collections::BTreeMap::new();
        if is_constructor {
            props.insert("isConstructor".to_string(), serde_json::Value::Bool(true));
        }
        props.insert("argumentCount".to_string(), serde_json::json!(argument_count));

        self.edges.push(Edge {
            source_entity_id: container_id.clone(),
            target_entity_id: target,
            edge_type: EdgeType::Calls,
            source_file_path: self.file_path.clone(),
            source_file_hash: self.source_hash.clone(),
            source_line: line,
            source_column: span.start,
            properties: props,
            branch: self.cfg.branch,
        });

        let base_ident = callee_text.split('.').next().unwrap_or(callee_text);
        let (is_external, external_module) = match self.imported_externals.get(base_ident) {
            Some((module, true)) => (true, Some(module.clone())),
            _ => (false, None),
        };

        self.effects.push(Effect {
            source_entity_id: container_id,
            source_file_path: self.file_path.clone(),
            source_line: line,
            source_column: span.start,
            branch: self.cfg.branch,
            data: EffectData::FunctionCall(FunctionCallEffectData {
                callee_name: callee_text.to_string(),
                callee_qualified_name: None,
                is_method,
                is_async: false,
                is_constructor,
                argument_count,
                is_external,
                external_module,
            }),
        });
    }
}

fn binding_pattern_name(pattern: &BindingPattern<'_>) -> Option<String> {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => Some(id.name.to_string()),
        BindingPatternKind::AssignmentPattern(assign) => binding_pattern_name(&assign.left),
        _ => None,
    }
}

fn ts_type_to_string(ty: &TSType<'_>) -> String {
    match ty {
        TSType::TSTypeReference(r) => ts_type_name_to_string(&r.type_name),
        TSType::TSStringKeyword(_) => "string".to_string(),
        TSType::TSNumberKeyword(_) => "number".to_string(),
        TSType::TSBooleanKeyword(_) => "boolean".to_string(),
        TSType::TSVoidKeyword(_) => "void".to_string(),
        TSType::TSAnyKeyword(_) => "any".to_string(),
        _ => "unknown".to_string(),
    }
}

fn ts_type_name_to_string(name: &TSTypeName<'_>) -> String {
    match name {
        TSTypeName::IdentifierReference(id) => id.name.to_string(),
        TSTypeName::QualifiedName(q) => format!("{}.{}", ts_type_name_to_string(&q.left), q.right.name),
        TSTypeName::ThisExpression(_) => "this".to_string(),
    }
}

fn callee_text(expr: &Expression<'_>) -> Option<String> {
    match expr {
        Expression::Identifier(id) => Some(id.name.to_string()),
        Expression::StaticMemberExpression(member) => {
            let object = callee_text(&member.object)?;
            Some(format!("{object}.{}", member.property.name))
        }
        Expression::ThisExpression(_) => Some("this".to_string()),
        Expression::Super(_) => Some("base".to_string()),
        // A decorator is written as a call (`@Controller('users')`); its
        // identity for name-matching purposes is the callee it invokes.
        Expression::CallExpression(call) => callee_text(&call.callee),
        _ => None,
    }
}

/// First string-literal argument of a decorator call expression
/// (`@Controller("users")` -> `Some("users")`); `None` for a bare
/// `@Injectable()` or a decorator that isn't a call at all.
fn decorator_string_arg(expr: &Expression<'_>) -> Option<String> {
    match expr {
        Expression::CallExpression(call) => call
            .arguments
            .first()
            .and_then(|arg| arg.as_expression())
            .and_then(|e| match e {
                Expression::StringLiteral(lit) => Some(lit.value.to_string()),
                _ => None,
            }),
        _ => None,
    }
}

/// Joins a class-level route prefix with a method-level route path
/// (`spec.md` §4.B rule 9, "the concatenated route"), trimming the
/// boundary slash each side might carry so the join never doubles up.
fn join_route(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => String::new(),
        (true, false) => path.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix.trim_end_matches('/'), path.trim_start_matches('/')),
    }
}

/// Interface-vs-class convention for `EXTENDS`/`IMPLEMENTS` (`spec.md` §4.B
/// rule 3 / §9 Open Question): a name whose first two characters are `I`
/// followed by an uppercase letter is treated as an interface reference.
/// Applied consistently wherever a base/implements list is classified.
fn looks_like_interface_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!((chars.next(), chars.next()), (Some('I'), Some(c)) if c.is_uppercase())
}

impl<'a, 'cfg> Visit<'a> for TsJsVisitor<'cfg> {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        let source = decl.source.value.to_string();
        let is_type_only = matches!(decl.import_kind, ImportOrExportKind::Type);
        let is_external = !is_path_like_specifier(&source) && !is_builtin_specifier(&source);

        match &decl.specifiers {
            None => {
                self.external_refs.push(ExternalRef {
                    source_entity_id: self.module_entity_id.clone(),
                    module_specifier: source,
                    imported_symbol: "*".to_string(),
                    local_alias: None,
                    import_style: ImportStyle::SideEffect,
                    is_type_only,
                    is_reexport: false,
                    export_alias: None,
                });
            }
            Some(specifiers) => {
                for spec in specifiers {
                    let (imported_symbol, local_alias, style) = match spec {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            (s.local.name.to_string(), Some(s.local.name.to_string()), ImportStyle::Default)
                        }
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            let name = match &s.imported {
                                ModuleExportName::IdentifierName(id) => id.name.to_string(),
                                ModuleExportName::IdentifierReference(id) => id.name.to_string(),
                                ModuleExportName::StringLiteral(str) => str.value.to_string(),
                            };
                            let alias = if s.local.name != name {
                                Some(s.local.name.to_string())
                            } else {
                                None
                            };
                            (name, alias, ImportStyle::Named)
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            ("*".to_string(), Some(s.local.name.to_string()), ImportStyle::Namespace)
                        }
                    };
                    if let Some(local) = &local_alias {
                        self.imported_externals.insert(local.clone(), (source.clone(), is_external));
                    } else {
                        self.imported_externals.insert(imported_symbol.clone(), (source.clone(), is_external));
                    }
                    self.external_refs.push(ExternalRef {
                        source_entity_id: self.module_entity_id.clone(),
                        module_specifier: source.clone(),
                        imported_symbol,
                        local_alias,
                        import_style: style,
                        is_type_only,
                        is_reexport: false,
                        export_alias: None,
                    });
                }
            }
        }
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            for spec in &decl.specifiers {
                let local = match &spec.local {
                    ModuleExportName::IdentifierName(id) => id.name.to_string(),
                    ModuleExportName::IdentifierReference(id) => id.name.to_string(),
                    ModuleExportName::StringLiteral(str) => str.value.to_string(),
                };
                let exported = match &spec.exported {
                    ModuleExportName::IdentifierName(id) => id.name.to_string(),
                    ModuleExportName::IdentifierReference(id) => id.name.to_string(),
                    ModuleExportName::StringLiteral(str) => str.value.to_string(),
                };
                self.external_refs.push(ExternalRef {
                    source_entity_id: ExternalRef::reexport_source_id(&self.file_path, &exported),
                    module_specifier: source.value.to_string(),
                    imported_symbol: local,
                    local_alias: None,
                    import_style: ImportStyle::Named,
                    is_type_only: matches!(decl.export_kind, ImportOrExportKind::Type),
                    is_reexport: true,
                    export_alias: Some(exported),
                });
            }
        } else {
            for spec in &decl.specifiers {
                let exported = match &spec.exported {
                    ModuleExportName::IdentifierName(id) => id.name.to_string(),
                    ModuleExportName::IdentifierReference(id) => id.name.to_string(),
                    ModuleExportName::StringLiteral(str) => str.value.to_string(),
                };
                self.exported_names.insert(exported);
            }
        }
        if let Some(decl_node) = &decl.declaration {
            self.visit_declaration(decl_node);
        }
    }

    fn visit_export_default_declaration(&mut self, decl: &ExportDefaultDeclaration<'a>) {
        match &decl.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    self.default_export_name = Some(id.name.to_string());
                    self.exported_names.insert(id.name.to_string());
                }
                self.visit_function(func, None);
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    self.default_export_name = Some(id.name.to_string());
                    self.exported_names.insert(id.name.to_string());
                }
                self.visit_class(class);
            }
            _ => {}
        }
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        self.external_refs.push(ExternalRef {
            source_entity_id: ExternalRef::reexport_source_id(&self.file_path, "*"),
            module_specifier: decl.source.value.to_string(),
            imported_symbol: "*".to_string(),
            local_alias: None,
            import_style: ImportStyle::Namespace,
            is_type_only: matches!(decl.export_kind, ImportOrExportKind::Type),
            is_reexport: true,
            export_alias: decl.exported.as_ref().map(|n| match n {
                ModuleExportName::IdentifierName(id) => id.name.to_string(),
                ModuleExportName::IdentifierReference(id) => id.name.to_string(),
                ModuleExportName::StringLiteral(s) => s.value.to_string(),
            }),
        });
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: Option<oxc_semantic::ScopeFlags>) {
        let name = func.id.as_ref().map(|id| id.name.to_string()).unwrap_or_default();
        let is_top_level = self.containers.len() == 1;
        let (_, parent_name) = self.current_container();
        let shape = SymbolShape {
            name: name.clone(),
            kind: NodeKind::Function,
            is_top_level,
            parent_name: if is_top_level { None } else { Some(parent_name.to_string()) },
            is_iife: false,
            ..Default::default()
        };
        let doc = self.documentation_for(self.get_line(func.span));
        let mut node_flags = NodeFlags {
            is_async: func.r#async,
            is_generator: func.generator,
            ..Default::default()
        };
        if self.exported_names.contains(&name) {
            node_flags.is_exported = true;
        }
        let id = self.push_node(&shape, func.span, node_flags, Vec::new(), None, Visibility::Public, doc);
        self.push_parameters(&id, &func.params, func.span);

        self.containers.push(ContainerFrame { entity_id: id, name });
        walk_function(self, func, flags);
        self.containers.pop();
    }

    fn visit_class(&mut self, class: &Class<'a>) {
        let name = class.id.as_ref().map(|id| id.name.to_string()).unwrap_or_default();
        let is_top_level = self.containers.len() == 1;
        let (_, parent_name) = self.current_container();
        let shape = SymbolShape {
            name: name.clone(),
            kind: NodeKind::Class,
            is_top_level,
            parent_name: if is_top_level { None } else { Some(parent_name.to_string()) },
            ..Default::default()
        };
        let decorators: Vec<String> = class
            .decorators
            .iter()
            .filter_map(|d| callee_text(&d.expression))
            .collect();
        let mut route_prefixes_pushed = 0usize;
        for decorator in &class.decorators {
            let Some(decorator_name) = callee_text(&decorator.expression) else { continue };
            if ROUTE_PREFIX_DECORATORS.iter().any(|p| decorator_name.starts_with(p)) {
                self.route_prefix_stack.push(decorator_string_arg(&decorator.expression).unwrap_or_default());
                route_prefixes_pushed += 1;
            }
        }
        let doc = self.documentation_for(self.get_line(class.span));
        let node_flags = NodeFlags {
            is_abstract: class.r#abstract,
            is_exported: self.exported_names.contains(&name),
            ..Default::default()
        };
        let id = self.push_node(&shape, class.span, node_flags, decorators, None, Visibility::Public, doc);

        if let Some(super_class) = &class.super_class {
            if let Some(base_name) = callee_text(super_class) {
                let edge_type = if looks_like_interface_name(&base_name) {
                    crate::model::EdgeType::Implements
                } else {
                    crate::model::EdgeType::Extends
                };
                self.edges.push(Edge {
                    source_entity_id: id.clone(),
                    target_entity_id: Edge::unresolved_target(&base_name),
                    edge_type,
                    source_file_path: self.file_path.clone(),
                    source_file_hash: self.source_hash.clone(),
                    source_line: self.get_line(class.span),
                    source_column: class.span.start,
                    properties: Default::default(),
                    branch: self.cfg.branch,
                });
            }
        }
        for implemented in &class.implements {
            let base_name = ts_type_name_to_string(&implemented.expression);
            self.edges.push(Edge {
                source_entity_id: id.clone(),
                target_entity_id: Edge::unresolved_target(&base_name),
                edge_type: crate::model::EdgeType::Implements,
                source_file_path: self.file_path.clone(),
                source_file_hash: self.source_hash.clone(),
                source_line: self.get_line(class.span),
                source_column: class.span.start,
                properties: Default::default(),
                branch: self.cfg.branch,
            });
        }

        self.containers.push(ContainerFrame { entity_id: id, name });
        walk_class(self, class);
        self.containers.pop();
        for _ in 0..route_prefixes_pushed {
            self.route_prefix_stack.pop();
        }
    }

    fn visit_method_definition(&mut self, method: &MethodDefinition<'a>) {
        let name = method_key_name(&method.key).unwrap_or_default();
        let (_, parent_name) = self.current_container();
        let shape = SymbolShape {
            name: name.clone(),
            kind: NodeKind::Method,
            is_class_member: true,
            parent_name: Some(parent_name.to_string()),
            computed_key: if method.computed { Some(name.clone()) } else { None },
            ..Default::default()
        };
        let decorators: Vec<String> = method
            .decorators
            .iter()
            .filter_map(|d| callee_text(&d.expression))
            .collect();
        let route_method = method.decorators.iter().find_map(|d| {
            let decorator_name = callee_text(&d.expression)?;
            ROUTE_METHOD_DECORATORS
                .iter()
                .find(|(dec, _)| *dec == decorator_name)
                .map(|(_, verb)| (*verb, decorator_string_arg(&d.expression).unwrap_or_default()))
        });
        let doc = self.documentation_for(self.get_line(method.span));
        let node_flags = NodeFlags {
            is_static: method.r#static,
            is_abstract: method.r#type == MethodDefinitionType::TSAbstractMethodDefinition,
            is_async: method.value.r#async,
            is_generator: method.value.generator,
            ..Default::default()
        };
        let visibility = match method.accessibility {
            Some(TSAccessibility::Private) => Visibility::Private,
            Some(TSAccessibility::Protected) => Visibility::Protected,
            _ => Visibility::Public,
        };
        let id = self.push_node(&shape, method.span, node_flags, decorators, None, visibility, doc);
        self.push_parameters(&id, &method.value.params, method.span);

        if let Some((verb, method_path)) = route_method {
            let prefix = self.route_prefix_stack.last().cloned().unwrap_or_default();
            self.effects.push(Effect {
                source_entity_id: id.clone(),
                source_file_path: self.file_path.clone(),
                source_line: self.get_line(method.span),
                source_column: method.span.start,
                branch: self.cfg.branch,
                data: EffectData::Request(RequestEffectData {
                    http_method: verb.to_string(),
                    route_pattern: join_route(&prefix, &method_path),
                    framework: "decorator".to_string(),
                }),
            });
        }

        self.containers.push(ContainerFrame { entity_id: id, name });
        walk_function(self, &method.value, None);
        self.containers.pop();
    }

    fn visit_property_definition(&mut self, prop: &PropertyDefinition<'a>) {
        let name = method_key_name(&prop.key).unwrap_or_default();
        let (_, parent_name) = self.current_container();
        let shape = SymbolShape {
            name: name.clone(),
            kind: NodeKind::Property,
            is_class_member: true,
            parent_name: Some(parent_name.to_string()),
            ..Default::default()
        };
        let type_signature = prop.type_annotation.as_ref().map(|ann| ts_type_to_string(&ann.type_annotation));
        let node_flags = NodeFlags {
            is_static: prop.r#static,
            ..Default::default()
        };
        let visibility = match prop.accessibility {
            Some(TSAccessibility::Private) => Visibility::Private,
            Some(TSAccessibility::Protected) => Visibility::Protected,
            _ => Visibility::Public,
        };
        self.push_node(&shape, prop.span, node_flags, Vec::new(), type_signature, visibility, None);
    }

    fn visit_ts_interface_declaration(&mut self, decl: &TSInterfaceDeclaration<'a>) {
        let name = decl.id.name.to_string();
        let shape = SymbolShape {
            name: name.clone(),
            kind: NodeKind::Interface,
            is_top_level: self.containers.len() == 1,
            ..Default::default()
        };
        let doc = self.documentation_for(self.get_line(decl.span));
        let node_flags = NodeFlags {
            is_exported: self.exported_names.contains(&name),
            ..Default::default()
        };
        let id = self.push_node(&shape, decl.span, node_flags, Vec::new(), None, Visibility::Public, doc);
        for base in &decl.extends {
            let base_name = ts_type_name_to_string(&base.expression);
            self.edges.push(Edge {
                source_entity_id: id.clone(),
                target_entity_id: Edge::unresolved_target(&base_name),
                edge_type: crate::model::EdgeType::Extends,
                source_file_path: self.file_path.clone(),
                source_file_hash: self.source_hash.clone(),
                source_line: self.get_line(decl.span),
                source_column: decl.span.start,
                properties: Default::default(),
                branch: self.cfg.branch,
            });
        }
        walk_ts_interface_declaration(self, decl);
    }

    fn visit_ts_type_alias_declaration(&mut self, decl: &TSTypeAliasDeclaration<'a>) {
        let name = decl.id.name.to_string();
        let shape = SymbolShape {
            name: name.clone(),
            kind: NodeKind::Type,
            is_top_level: self.containers.len() == 1,
            ..Default::default()
        };
        let node_flags = NodeFlags {
            is_exported: self.exported_names.contains(&name),
            ..Default::default()
        };
        self.push_node(&shape, decl.span, node_flags, Vec::new(), Some(ts_type_to_string(&decl.type_annotation)), Visibility::Public, None);
    }

    fn visit_ts_enum_declaration(&mut self, decl: &TSEnumDeclaration<'a>) {
        let name = decl.id.name.to_string();
        let shape = SymbolShape {
            name: name.clone(),
            kind: NodeKind::Enum,
            is_top_level: self.containers.len() == 1,
            ..Default::default()
        };
        let node_flags = NodeFlags {
            is_exported: self.exported_names.contains(&name),
            ..Default::default()
        };
        let id = self.push_node(&shape, decl.span, node_flags, Vec::new(), None, Visibility::Public, None);
        for member in &decl.members {
            let member_name = match &member.id {
                TSEnumMemberName::Identifier(id) => id.name.to_string(),
                TSEnumMemberName::String(s) => s.value.to_string(),
                _ => continue,
            };
            let member_shape = SymbolShape {
                name: member_name,
                kind: NodeKind::EnumMember,
                is_class_member: true,
                parent_name: Some(name.clone()),
                ..Default::default()
            };
            self.push_node(&member_shape, member.span, NodeFlags::default(), Vec::new(), None, Visibility::Public, None);
        }
        let _ = id;
    }

    fn visit_variable_declarator(&mut self, decl: &VariableDeclarator<'a>) {
        let var_name = binding_pattern_name(&decl.id);
        if let (Some(var_name), Some(init)) = (&var_name, &decl.init) {
            match init {
                Expression::ArrowFunctionExpression(arrow) => {
                    let shape = SymbolShape {
                        kind: NodeKind::Function,
                        is_top_level: false,
                        variable_name: Some(var_name.clone()),
                        ..Default::default()
                    };
                    let node_flags = NodeFlags {
                        is_async: arrow.r#async,
                        is_exported: self.exported_names.contains(var_name),
                        ..Default::default()
                    };
                    let doc = self.documentation_for(self.get_line(decl.span));
                    let id = self.push_node(&shape, decl.span, node_flags, Vec::new(), None, Visibility::Public, doc);
                    self.push_parameters(&id, &arrow.params, decl.span);
                    self.containers.push(ContainerFrame { entity_id: id, name: var_name.clone() });
                    self.visit_function_body(&arrow.body);
                    self.containers.pop();
                    return;
                }
                Expression::FunctionExpression(func) => {
                    let is_iife = false;
                    let shape = SymbolShape {
                        kind: NodeKind::Function,
                        variable_name: Some(var_name.clone()),
                        is_iife,
                        ..Default::default()
                    };
                    let node_flags = NodeFlags {
                        is_async: func.r#async,
                        is_exported: self.exported_names.contains(var_name),
                        ..Default::default()
                    };
                    let id = self.push_node(&shape, decl.span, node_flags, Vec::new(), None, Visibility::Public, None);
                    self.push_parameters(&id, &func.params, decl.span);
                    self.containers.push(ContainerFrame { entity_id: id, name: var_name.clone() });
                    if let Some(body) = &func.body {
                        self.visit_function_body(body);
                    }
                    self.containers.pop();
                    return;
                }
                _ => {}
            }
        }
        if let Some(init) = &decl.init {
            self.visit_expression(init);
        }
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        self.visit_arguments(&call.arguments);
        self.visit_expression(&call.callee);

        if let Some(text) = callee_text(&call.callee) {
            let is_method = text.contains('.');
            self.record_call(&text, false, is_method, call.arguments.len() as u32, call.span);

            let base_ident = text.split('.').next().unwrap_or(&text);
            let method_name = text.rsplit('.').next().unwrap_or(&text);
            if let Some((module, true)) = self.imported_externals.get(base_ident).cloned() {
                if HTTP_CLIENT_METHODS.iter().any(|(m, _)| *m == method_name.to_ascii_lowercase()) {
                    let url_parts = call
                        .arguments
                        .first()
                        .and_then(|arg| arg.as_expression())
                        .and_then(url_parts_from_expression);
                    if let Some(parts) = url_parts {
                        let pattern = reconstruct_url_pattern(&parts);
                        let (kind, service) = classify_send_target(&pattern);
                        self.effects.push(Effect {
                            source_entity_id: self.current_container().0.to_string(),
                            source_file_path: self.file_path.clone(),
                            source_line: self.get_line(call.span),
                            source_column: call.span.start,
                            branch: self.cfg.branch,
                            data: EffectData::Send(SendEffectData {
                                kind,
                                http_method: Some(method_name.to_uppercase()),
                                url_pattern: pattern,
                                is_third_party: true,
                                target_service: service.or_else(|| Some(module.clone())),
                            }),
                        });
                    }
                }
            } else if base_ident == "fetch" {
                let url_parts = call
                    .arguments
                    .first()
                    .and_then(|arg| arg.as_expression())
                    .and_then(url_parts_from_expression);
                if let Some(parts) = url_parts {
                    let pattern = reconstruct_url_pattern(&parts);
                    let (kind, service) = classify_send_target(&pattern);
                    self.effects.push(Effect {
                        source_entity_id: self.current_container().0.to_string(),
                        source_file_path: self.file_path.clone(),
                        source_line: self.get_line(call.span),
                        source_column: call.span.start,
                        branch: self.cfg.branch,
                        data: EffectData::Send(SendEffectData {
                            kind,
                            http_method: None,
                            url_pattern: pattern,
                            is_third_party: true,
                            target_service: service,
                        }),
                    });
                }
            }
        }
    }

    fn visit_new_expression(&mut self, new_expr: &NewExpression<'a>) {
        self.visit_arguments(&new_expr.arguments);
        self.visit_expression(&new_expr.callee);
        if let Some(text) = callee_text(&new_expr.callee) {
            self.record_call(&text, true, false, new_expr.arguments.len() as u32, new_expr.span);
        }
    }

    fn visit_expression(&mut self, expr: &Expression<'a>) {
        walk_expression(self, expr);
    }
}

fn method_key_name(key: &PropertyKey<'_>) -> Option<String> {
    match key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
        PropertyKey::PrivateIdentifier(id) => Some(id.name.to_string()),
        PropertyKey::StringLiteral(lit) => Some(lit.value.to_string()),
        _ => None,
    }
}

/// Builds `UrlPart`s out of a string-literal or template-literal
/// expression, substituting each interpolation hole with a named
/// placeholder (`spec.md` §4.B rule 8). `None` for any other expression
/// shape (a variable, a concatenation expression, ...).
fn url_parts_from_expression(expr: &Expression<'_>) -> Option<Vec<UrlPart>> {
    match expr {
        Expression::StringLiteral(lit) => Some(vec![UrlPart::Literal(lit.value.to_string())]),
        Expression::TemplateLiteral(tpl) => {
            let mut parts = Vec::new();
            for (idx, quasi) in tpl.quasis.iter().enumerate() {
                if let Some(cooked) = quasi.value.cooked.as_ref() {
                    if !cooked.is_empty() {
                        parts.push(UrlPart::Literal(cooked.to_string()));
                    }
                }
                if let Some(hole) = tpl.expressions.get(idx) {
                    let name = callee_text(hole).unwrap_or_else(|| format!("arg{idx}"));
                    parts.push(UrlPart::Interpolation(name));
                }
            }
            Some(parts)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserConfig;
    use std::path::Path;

    fn parse(src: &str) -> ParseResult {
        let backend = TsJsBackend;
        backend.parse_content(src.as_bytes(), Path::new("src/app.ts"), &ParserConfig::default())
    }

    #[test]
    fn emits_one_module_node_for_empty_file() {
        let result = parse("");
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].kind, NodeKind::Module);
        assert!(result.edges.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn top_level_function_becomes_node_with_contains_edge() {
        let result = parse("export function handleRequest() {}");
        let func = result
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Function)
            .expect("function node");
        assert_eq!(func.name, "handleRequest");
        assert!(func.flags.is_exported);
        assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Contains && e.target_entity_id == func.entity_id));
    }

    #[test]
    fn import_produces_external_ref() {
        let result = parse("import { S3Client } from '@aws-sdk/client-s3';");
        let ext_ref = &result.external_refs[0];
        assert_eq!(ext_ref.module_specifier, "@aws-sdk/client-s3");
        assert_eq!(ext_ref.imported_symbol, "S3Client");
        assert_eq!(ext_ref.import_style, ImportStyle::Named);
    }

    #[test]
    fn new_expression_marks_constructor_call_and_external_effect() {
        let src = r#"
            import S3Client from "@aws-sdk/client-s3";
            function run() {
                new S3Client({}).send(cmd);
            }
        "#;
        let result = parse(src);
        let ctor_edge = result
            .edges
            .iter()
            .find(|e| e.edge_type == EdgeType::Calls && e.properties.contains_key("isConstructor"))
            .expect("constructor call edge");
        assert_eq!(ctor_edge.properties["isConstructor"], serde_json::json!(true));

        let effect = result
            .effects
            .iter()
            .find_map(|e| match &e.data {
                EffectData::FunctionCall(data) if data.is_constructor => Some(data),
                _ => None,
            })
            .expect("constructor function-call effect");
        assert!(effect.is_external);
        assert_eq!(effect.external_module.as_deref(), Some("@aws-sdk/client-s3"));
    }

    #[test]
    fn class_extends_base_with_edge() {
        let result = parse("class Dog extends Animal {}");
        let dog = result.nodes.iter().find(|n| n.name == "Dog").unwrap();
        assert!(result
            .edges
            .iter()
            .any(|e| e.source_entity_id == dog.entity_id && e.edge_type == EdgeType::Extends));
    }

    #[test]
    fn class_implements_interface_by_naming_convention() {
        let result = parse("class Service implements IRunnable {}");
        let svc = result.nodes.iter().find(|n| n.name == "Service").unwrap();
        assert!(result
            .edges
            .iter()
            .any(|e| e.source_entity_id == svc.entity_id && e.edge_type == EdgeType::Implements));
    }

    #[test]
    fn method_parameters_emit_parameter_of_edges() {
        let result = parse("class Widget { render(count) {} }");
        let method = result.nodes.iter().find(|n| n.kind == NodeKind::Method).unwrap();
        let param = result.nodes.iter().find(|n| n.kind == NodeKind::Parameter).unwrap();
        assert!(result
            .edges
            .iter()
            .any(|e| e.edge_type == EdgeType::ParameterOf && e.source_entity_id == param.entity_id && e.target_entity_id == method.entity_id));
    }

    #[test]
    fn call_form_decorators_emit_decorator_nodes_and_decorates_edges() {
        let src = r#"
            @Controller('users')
            class UserController {
                @Get(':id')
                getUser(id) {}
            }
        "#;
        let result = parse(src);
        let class = result.nodes.iter().find(|n| n.name == "UserController").unwrap();
        let method = result.nodes.iter().find(|n| n.kind == NodeKind::Method).unwrap();

        let controller_decorator = result
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Decorator && n.name == "Controller")
            .expect("Controller decorator node");
        let get_decorator = result
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Decorator && n.name == "Get")
            .expect("Get decorator node");

        assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Decorates
            && e.source_entity_id == controller_decorator.entity_id
            && e.target_entity_id == class.entity_id));
        assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Decorates
            && e.source_entity_id == get_decorator.entity_id
            && e.target_entity_id == method.entity_id));
    }

    #[test]
    fn nestjs_route_decorators_concatenate_class_prefix_and_method_path() {
        let src = r#"
            @Controller('users')
            class UserController {
                @Get(':id')
                getUser(id) {}
            }
        "#;
        let result = parse(src);
        let request = result
            .effects
            .iter()
            .find_map(|e| match &e.data {
                EffectData::Request(data) => Some(data),
                _ => None,
            })
            .expect("request effect");
        assert_eq!(request.http_method, "GET");
        assert_eq!(request.route_pattern, "users/:id");
        assert_eq!(request.framework, "decorator");
    }

    #[test]
    fn fetch_with_template_literal_url_substitutes_interpolation() {
        let src = r#"
            function loadUser(id) {
                fetch(`/users/${id}`);
            }
        "#;
        let result = parse(src);
        let send = result
            .effects
            .iter()
            .find_map(|e| match &e.data {
                EffectData::Send(data) => Some(data),
                _ => None,
            })
            .expect("send effect");
        assert_eq!(send.url_pattern, "/users/:id");
    }

    #[test]
    fn axios_get_with_interpolated_external_url_produces_send_effect() {
        let src = r#"
            import axios from "axios";
            function loadUser(userId) {
                axios.get(`https://api.example.com/u/${userId}`);
            }
        "#;
        let result = parse(src);
        let send = result
            .effects
            .iter()
            .find_map(|e| match &e.data {
                EffectData::Send(data) => Some(data),
                _ => None,
            })
            .expect("send effect");
        assert_eq!(send.http_method.as_deref(), Some("GET"));
        assert_eq!(send.url_pattern, "https://api.example.com/u/:userId");
        assert!(send.is_third_party);
    }
}
