//! C4 model generation (`spec.md` §4.G, "C4 generation"): turns
//! `DomainEffect` rows into one of four level models. The domain-boundary
//! discovery heuristic and textual diagram rendering are explicitly
//! out-of-scope (`spec.md` §4.G, "external collaborators") — this module
//! groups what the rules engine already classified, it does not infer new
//! boundaries or draw anything.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::rules::DomainEffect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C4Level {
    Context,
    Containers,
    Domains,
    Externals,
}

#[derive(Debug, Clone, Default)]
pub struct C4Options {
    pub level: Option<C4Level>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct C4Node {
    pub id: String,
    pub label: String,
    pub effect_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct C4Edge {
    pub from: String,
    pub to: String,
    pub action: String,
}

#[derive(Debug, Clone, Default)]
pub struct C4Model {
    pub nodes: Vec<C4Node>,
    pub edges: Vec<C4Edge>,
}

/// Builds the requested level's model from already-classified effects.
/// Defaults to `domains`, the coarsest grouping that needs no further
/// boundary inference.
pub fn generate_c4(domain_effects: &[DomainEffect], options: &C4Options) -> C4Model {
    match options.level.unwrap_or(C4Level::Domains) {
        C4Level::Domains => domains_model(domain_effects),
        C4Level::Context => context_model(domain_effects),
        C4Level::Containers => containers_model(domain_effects),
        C4Level::Externals => externals_model(domain_effects),
    }
}

/// One node per domain, sized by how many effects landed in it.
fn domains_model(domain_effects: &[DomainEffect]) -> C4Model {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for e in domain_effects {
        *counts.entry(e.domain.as_str()).or_insert(0) += 1;
    }
    C4Model {
        nodes: counts.into_iter().map(|(domain, count)| C4Node { id: domain.to_string(), label: domain.to_string(), effect_count: count }).collect(),
        edges: Vec::new(),
    }
}

/// A single "this system" node plus one node per domain it talks to, with
/// an edge per domain carrying its most common action as a representative label.
fn context_model(domain_effects: &[DomainEffect]) -> C4Model {
    let mut nodes = vec![C4Node { id: "system".to_string(), label: "this system".to_string(), effect_count: domain_effects.len() }];
    let mut by_domain: BTreeMap<&str, Vec<&DomainEffect>> = BTreeMap::new();
    for e in domain_effects {
        by_domain.entry(e.domain.as_str()).or_default().push(e);
    }
    let mut edges = Vec::new();
    for (domain, effects) in by_domain {
        nodes.push(C4Node { id: domain.to_string(), label: domain.to_string(), effect_count: effects.len() });
        let action = effects.first().map(|e| e.action.clone()).unwrap_or_default();
        edges.push(C4Edge { from: "system".to_string(), to: domain.to_string(), action });
    }
    C4Model { nodes, edges }
}

/// Nodes keyed by source file (the closest container-level grouping the
/// effect rows carry); edges to the domain each file's effects were
/// classified into.
fn containers_model(domain_effects: &[DomainEffect]) -> C4Model {
    let mut file_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut edges: Vec<C4Edge> = Vec::new();
    let mut seen_edges = std::collections::BTreeSet::new();
    for e in domain_effects {
        *file_counts.entry(e.source_file_path.as_str()).or_insert(0) += 1;
        let key = (e.source_file_path.clone(), e.domain.clone());
        if seen_edges.insert(key.clone()) {
            edges.push(C4Edge { from: key.0, to: key.1, action: e.action.clone() });
        }
    }
    let nodes = file_counts.into_iter().map(|(file, count)| C4Node { id: file.to_string(), label: file.to_string(), effect_count: count }).collect();
    C4Model { nodes, edges }
}

/// One node per distinct action target string (the part of `action` after
/// its `kind:` prefix), representing the external collaborators this
/// system's domain effects reach.
fn externals_model(domain_effects: &[DomainEffect]) -> C4Model {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for e in domain_effects {
        let target = e.action.split_once(':').map(|(_, rest)| rest.to_string()).unwrap_or_else(|| e.action.clone());
        *counts.entry(target).or_insert(0) += 1;
    }
    C4Model {
        nodes: counts.into_iter().map(|(target, count)| C4Node { id: target.clone(), label: target, effect_count: count }).collect(),
        edges: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(domain: &str, action: &str, file: &str) -> DomainEffect {
        DomainEffect {
            rule_id: "r".to_string(),
            domain: domain.to_string(),
            action: action.to_string(),
            confidence: 0.9,
            source_entity_id: "e1".to_string(),
            source_file_path: file.to_string(),
        }
    }

    #[test]
    fn domains_level_groups_and_counts() {
        let effects = vec![effect("api", "handle:GET /x", "src/a.ts"), effect("api", "handle:GET /y", "src/b.ts"), effect("integration", "send:stripe", "src/c.ts")];
        let model = generate_c4(&effects, &C4Options { level: Some(C4Level::Domains) });
        assert_eq!(model.nodes.len(), 2);
        let api = model.nodes.iter().find(|n| n.id == "api").unwrap();
        assert_eq!(api.effect_count, 2);
    }

    #[test]
    fn context_level_has_one_system_node_plus_domains() {
        let effects = vec![effect("api", "handle:GET /x", "src/a.ts"), effect("integration", "send:stripe", "src/c.ts")];
        let model = generate_c4(&effects, &C4Options { level: Some(C4Level::Context) });
        assert_eq!(model.nodes.iter().filter(|n| n.id == "system").count(), 1);
        assert_eq!(model.edges.len(), 2);
    }

    #[test]
    fn externals_level_extracts_action_targets() {
        let effects = vec![effect("integration", "send:stripe", "src/c.ts"), effect("integration", "send:stripe", "src/d.ts")];
        let model = generate_c4(&effects, &C4Options { level: Some(C4Level::Externals) });
        assert_eq!(model.nodes.len(), 1);
        assert_eq!(model.nodes[0].id, "stripe");
        assert_eq!(model.nodes[0].effect_count, 2);
    }

    #[test]
    fn defaults_to_domains_level() {
        let effects = vec![effect("api", "handle:GET /x", "src/a.ts")];
        let model = generate_c4(&effects, &C4Options::default());
        assert_eq!(model.nodes, vec![C4Node { id: "api".to_string(), label: "api".to_string(), effect_count: 1 }]);
    }
}
