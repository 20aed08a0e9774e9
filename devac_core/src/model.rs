//! The structural graph's data model: `Node`, `Edge`, `ExternalRef`, `Effect`.
//!
//! Field shapes mirror `spec.md` §3 exactly; these are the row types the
//! seed store persists and the federated query engine reads back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which overlay layer a row belongs to (`spec.md` §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Base,
    Overlay,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Base => "base",
            Branch::Overlay => "branch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Namespace,
    Class,
    Interface,
    Struct,
    Record,
    Enum,
    EnumMember,
    Function,
    Method,
    Property,
    Parameter,
    Variable,
    Type,
    Decorator,
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Variable
    }
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Module => "module",
            NodeKind::Namespace => "namespace",
            NodeKind::Class => "class",
            NodeKind::Interface => "interface",
            NodeKind::Struct => "struct",
            NodeKind::Record => "record",
            NodeKind::Enum => "enum",
            NodeKind::EnumMember => "enum_member",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Property => "property",
            NodeKind::Parameter => "parameter",
            NodeKind::Variable => "variable",
            NodeKind::Type => "type",
            NodeKind::Decorator => "decorator",
        }
    }

    /// Class-member kinds per the scoped-name rule in `spec.md` §4.A #3.
    pub fn is_class_member(&self) -> bool {
        matches!(self, NodeKind::Method | NodeKind::Property)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    Protected,
    Internal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeFlags {
    pub is_exported: bool,
    pub is_default_export: bool,
    pub is_abstract: bool,
    pub is_static: bool,
    pub is_async: bool,
    pub is_generator: bool,
}

/// A symbol the graph reasons about (`spec.md` §3, "Node").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub entity_id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: NodeKind,
    pub file_path: String,
    pub source_file_hash: String,
    pub start_line: u32,
    pub end_line: u32,
    pub start_column: u32,
    pub end_column: u32,
    pub visibility: Visibility,
    pub flags: NodeFlags,
    pub type_signature: Option<String>,
    pub type_parameters: Vec<String>,
    pub decorators: Vec<String>,
    pub documentation: Option<String>,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub branch: Branch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Contains,
    Calls,
    Extends,
    Implements,
    ParameterOf,
    Decorates,
}

/// A directed relationship between two entity IDs (`spec.md` §3, "Edge").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub edge_type: EdgeType,
    pub source_file_path: String,
    pub source_file_hash: String,
    pub source_line: u32,
    pub source_column: u32,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub branch: Branch,
}

impl Edge {
    /// `unresolved:<textual_callee>` sentinel target for edges whose
    /// destination couldn't be tied to a concrete entity (`spec.md` §4.A).
    pub fn unresolved_target(textual_callee: &str) -> String {
        format!("unresolved:{textual_callee}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStyle {
    Named,
    Default,
    Namespace,
    Dynamic,
    SideEffect,
}

/// An unresolved symbol reference crossing the package boundary
/// (`spec.md` §3, "ExternalRef").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRef {
    pub source_entity_id: String,
    pub module_specifier: String,
    pub imported_symbol: String,
    pub local_alias: Option<String>,
    pub import_style: ImportStyle,
    pub is_type_only: bool,
    pub is_reexport: bool,
    pub export_alias: Option<String>,
}

impl ExternalRef {
    /// Synthetic source ID for re-export rows per `spec.md` §4.B rule 10.
    pub fn reexport_source_id(file_path: &str, name: &str) -> String {
        format!("reexport:{file_path}:{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    FunctionCall,
    Request,
    Send,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallEffectData {
    pub callee_name: String,
    pub callee_qualified_name: Option<String>,
    pub is_method: bool,
    pub is_async: bool,
    pub is_constructor: bool,
    pub argument_count: u32,
    pub is_external: bool,
    pub external_module: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEffectData {
    pub http_method: String,
    pub route_pattern: String,
    pub framework: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendKind {
    Http,
    M2m,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEffectData {
    pub kind: SendKind,
    pub http_method: Option<String>,
    pub url_pattern: String,
    pub is_third_party: bool,
    pub target_service: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "effect_type", rename_all = "snake_case")]
pub enum EffectData {
    FunctionCall(FunctionCallEffectData),
    Request(RequestEffectData),
    Send(SendEffectData),
}

impl EffectData {
    pub fn effect_type(&self) -> EffectType {
        match self {
            EffectData::FunctionCall(_) => EffectType::FunctionCall,
            EffectData::Request(_) => EffectType::Request,
            EffectData::Send(_) => EffectType::Send,
        }
    }
}

/// A secondary record capturing observed behavior (`spec.md` §3, "Effect").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Effect {
    pub source_entity_id: String,
    pub source_file_path: String,
    pub source_line: u32,
    pub source_column: u32,
    pub branch: Branch,
    #[serde(flatten)]
    pub data: EffectData,
}

impl Effect {
    pub fn effect_type(&self) -> EffectType {
        self.data.effect_type()
    }
}

/// Output of parsing one file (`spec.md` §4.B, `ParseResult`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub external_refs: Vec<ExternalRef>,
    pub effects: Vec<Effect>,
    pub source_file_hash: String,
    pub file_path: String,
    pub parse_time_ms: f64,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_target_uses_sentinel_prefix() {
        assert_eq!(Edge::unresolved_target("doStuff"), "unresolved:doStuff");
    }

    #[test]
    fn reexport_source_id_embeds_file_and_name() {
        assert_eq!(
            ExternalRef::reexport_source_id("src/index.ts", "widget"),
            "reexport:src/index.ts:widget"
        );
    }

    #[test]
    fn class_member_kinds_are_method_and_property_only() {
        assert!(NodeKind::Method.is_class_member());
        assert!(NodeKind::Property.is_class_member());
        assert!(!NodeKind::Function.is_class_member());
        assert!(!NodeKind::Class.is_class_member());
    }

    #[test]
    fn node_kind_as_str_uses_snake_case_labels() {
        assert_eq!(NodeKind::EnumMember.as_str(), "enum_member");
        assert_eq!(NodeKind::Module.as_str(), "module");
    }
}
