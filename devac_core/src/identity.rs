//! Identity & Naming (`spec.md` §4.A): deterministic, position-independent
//! scoped names and entity IDs.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::model::NodeKind;

/// The symbol-shape facts the scoped-name rules dispatch on. Constructed by
/// each language parser from whatever AST node it's currently visiting.
#[derive(Debug, Clone, Default)]
pub struct SymbolShape {
    pub name: String,
    pub kind: NodeKind,
    pub is_top_level: bool,
    pub parent_name: Option<String>,
    pub is_class_member: bool,
    pub call_expression: Option<String>,
    pub argument_index: Option<usize>,
    pub array_name: Option<String>,
    pub array_index: Option<usize>,
    pub computed_key: Option<String>,
    pub variable_name: Option<String>,
    pub is_iife: bool,
}

/// Per-file scope state. Counters live here rather than on the symbol shape
/// because they accumulate across the whole file, not per-symbol
/// (`spec.md` §9: "arena for scope contexts").
#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
    /// `<call-site key> -> count of callback arguments already named`.
    callback_counters: HashMap<String, u32>,
    /// `<name> -> number of prior occurrences`, drives the reassignment rule.
    reassignment_counters: HashMap<String, u32>,
    iife_counter: u32,
    anonymous_counters: HashMap<String, u32>,
    /// The enclosing named-scope path, joined with `.` for rule 8.
    scope_stack: Vec<String>,
}

impl ScopeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self, name: impl Into<String>) {
        self.scope_stack.push(name.into());
    }

    pub fn pop_scope(&mut self) {
        self.scope_stack.pop();
    }

    fn next_iife(&mut self) -> u32 {
        self.iife_counter += 1;
        self.iife_counter
    }

    fn next_anonymous(&mut self, kind: &str) -> u32 {
        let counter = self.anonymous_counters.entry(kind.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn next_callback_index(&mut self, call_expr: &str) -> u32 {
        let counter = self
            .callback_counters
            .entry(call_expr.to_string())
            .or_insert(0);
        *counter += 1;
        *counter
    }

    /// Rule: first occurrence of `name` returns `name`; subsequent
    /// occurrences return `name$<count>` (`spec.md` §4.A, "Reassignment handler").
    fn reassignment(&mut self, name: &str) -> String {
        let counter = self
            .reassignment_counters
            .entry(name.to_string())
            .or_insert(0);
        let result = if *counter == 0 {
            name.to_string()
        } else {
            format!("{name}${}", *counter)
        };
        *counter += 1;
        result
    }
}

/// Builds a scoped name from a symbol shape and the file's running scope
/// context, applying the ten rules of `spec.md` §4.A in order. First match wins.
pub fn scoped_name(shape: &SymbolShape, ctx: &mut ScopeContext) -> String {
    // 1. IIFE.
    if shape.is_iife {
        return format!("$iife_{}", ctx.next_iife());
    }

    // 2. Named top-level.
    if shape.is_top_level && !shape.name.is_empty() {
        return ctx.reassignment(&shape.name);
    }

    // 3. Class member.
    if shape.is_class_member {
        if let Some(parent) = &shape.parent_name {
            return match &shape.computed_key {
                Some(key) => format!("{parent}.[{key}]"),
                None => format!("{parent}.{}", shape.name),
            };
        }
    }

    // 4. Nested named function.
    if matches!(shape.kind, NodeKind::Function) && !shape.name.is_empty() {
        if let Some(parent) = &shape.parent_name {
            return format!("{parent}.{}", shape.name);
        }
    }

    // 5. Arrow/function expression bound to a variable.
    if let Some(var_name) = &shape.variable_name {
        return ctx.reassignment(var_name);
    }

    // 6. Callback argument to a call.
    if let (Some(call_expr), Some(idx)) = (&shape.call_expression, shape.argument_index) {
        let site_key = format!("{call_expr}#{idx}");
        let occurrence = ctx.next_callback_index(&site_key);
        return format!("{call_expr}.$arg{idx}_{occurrence}");
    }

    // 7. Array literal element.
    if let (Some(array_name), Some(idx)) = (&shape.array_name, shape.array_index) {
        return format!("{array_name}.${idx}");
    }

    // 8/9. Named symbol with or without a scope stack.
    if !shape.name.is_empty() {
        if ctx.scope_stack.is_empty() {
            return ctx.reassignment(&shape.name);
        }
        let joined = ctx.scope_stack.join(".");
        return ctx.reassignment(&format!("{joined}.{}", shape.name));
    }

    // 10. Otherwise: anonymous.
    format!("$anon_{}_{}", shape.kind.as_str(), ctx.next_anonymous(shape.kind.as_str()))
}

/// Stable entity ID derived from `(repo, package_path, kind, file_path,
/// scoped_name)` — a short cryptographic hash of the tuple, per `spec.md`
/// §4.A. The tuple is joined with a separator unlikely to collide with any
/// of its components (`\u{1f}`, ASCII unit separator).
pub fn entity_id(repo: &str, package_path: &str, kind: NodeKind, file_path: &str, scoped_name: &str) -> String {
    const SEP: char = '\u{1f}';
    let mut hasher = Sha256::new();
    hasher.update(repo.as_bytes());
    hasher.update(SEP.to_string().as_bytes());
    hasher.update(package_path.as_bytes());
    hasher.update(SEP.to_string().as_bytes());
    hasher.update(kind.as_str().as_bytes());
    hasher.update(SEP.to_string().as_bytes());
    hasher.update(file_path.as_bytes());
    hasher.update(SEP.to_string().as_bytes());
    hasher.update(scoped_name.as_bytes());
    let digest = hasher.finalize();
    format!("e_{:x}", digest)[..18].to_string()
}

/// Sentinel target for a call that couldn't be resolved to a concrete entity.
pub fn unresolved_entity_id(textual_callee: &str) -> String {
    format!("unresolved:{textual_callee}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(name: &str, kind: NodeKind) -> SymbolShape {
        SymbolShape {
            name: name.to_string(),
            kind,
            ..Default::default()
        }
    }

    #[test]
    fn entity_id_is_stable_for_same_inputs() {
        let a = entity_id("acme/api", "packages/core", NodeKind::Function, "src/lib.ts", "handleRequest");
        let b = entity_id("acme/api", "packages/core", NodeKind::Function, "src/lib.ts", "handleRequest");
        assert_eq!(a, b);
    }

    #[test]
    fn entity_id_is_independent_of_surrounding_lines() {
        // The ID function never sees line numbers, so moving a symbol up or
        // down in its file can't change its output — this is the invariant
        // from `spec.md` §8 stated as a type-level fact rather than a test
        // that has to move lines around.
        let a = entity_id("r", "pkg", NodeKind::Function, "a.ts", "foo");
        let b = entity_id("r", "pkg", NodeKind::Function, "a.ts", "foo");
        assert_eq!(a, b);
    }

    #[test]
    fn entity_id_differs_across_kind() {
        let f = entity_id("r", "pkg", NodeKind::Function, "a.ts", "foo");
        let c = entity_id("r", "pkg", NodeKind::Class, "a.ts", "foo");
        assert_ne!(f, c);
    }

    #[test]
    fn top_level_name_passes_through_reassignment() {
        let mut ctx = ScopeContext::new();
        let first = shape("foo", NodeKind::Function);
        let mut s1 = first.clone();
        s1.is_top_level = true;
        assert_eq!(scoped_name(&s1, &mut ctx), "foo");

        let mut s2 = first;
        s2.is_top_level = true;
        assert_eq!(scoped_name(&s2, &mut ctx), "foo$1");
    }

    #[test]
    fn iife_uses_per_file_counter() {
        let mut ctx = ScopeContext::new();
        let mut s = shape("", NodeKind::Function);
        s.is_iife = true;
        assert_eq!(scoped_name(&s, &mut ctx), "$iife_1");
        assert_eq!(scoped_name(&s, &mut ctx), "$iife_2");
    }

    #[test]
    fn class_member_qualifies_with_parent() {
        let mut ctx = ScopeContext::new();
        let mut s = shape("render", NodeKind::Method);
        s.is_class_member = true;
        s.parent_name = Some("Widget".to_string());
        assert_eq!(scoped_name(&s, &mut ctx), "Widget.render");
    }

    #[test]
    fn class_member_with_computed_key() {
        let mut ctx = ScopeContext::new();
        let mut s = shape("", NodeKind::Property);
        s.is_class_member = true;
        s.parent_name = Some("Widget".to_string());
        s.computed_key = Some("Symbol.iterator".to_string());
        assert_eq!(scoped_name(&s, &mut ctx), "Widget.[Symbol.iterator]");
    }

    #[test]
    fn callback_argument_gets_per_call_site_counter() {
        let mut ctx = ScopeContext::new();
        let mut s = shape("", NodeKind::Function);
        s.call_expression = Some("array.map".to_string());
        s.argument_index = Some(0);
        assert_eq!(scoped_name(&s, &mut ctx), "array.map.$arg0_1");

        let mut s2 = s.clone();
        s2.argument_index = Some(0);
        assert_eq!(scoped_name(&s2, &mut ctx), "array.map.$arg0_2");
    }

    #[test]
    fn array_element_uses_index() {
        let mut ctx = ScopeContext::new();
        let mut s = shape("", NodeKind::Function);
        s.array_name = Some("handlers".to_string());
        s.array_index = Some(2);
        assert_eq!(scoped_name(&s, &mut ctx), "handlers.$2");
    }

    #[test]
    fn named_symbol_joins_scope_stack() {
        let mut ctx = ScopeContext::new();
        ctx.push_scope("outer");
        ctx.push_scope("inner");
        let s = shape("helper", NodeKind::Variable);
        assert_eq!(scoped_name(&s, &mut ctx), "outer.inner.helper");
    }

    #[test]
    fn named_symbol_without_scope_stack_uses_bare_name() {
        let mut ctx = ScopeContext::new();
        let s = shape("helper", NodeKind::Variable);
        assert_eq!(scoped_name(&s, &mut ctx), "helper");
    }

    #[test]
    fn anonymous_symbol_falls_through_to_anon_counter() {
        let mut ctx = ScopeContext::new();
        let s = shape("", NodeKind::Function);
        assert_eq!(scoped_name(&s, &mut ctx), "$anon_function_1");
        assert_eq!(scoped_name(&s, &mut ctx), "$anon_function_2");
    }

    #[test]
    fn unresolved_id_carries_sentinel_prefix() {
        assert_eq!(unresolved_entity_id("fetch"), "unresolved:fetch");
    }
}
