//! Rules engine (`spec.md` §4.G, "Rules engine"): a fixed pipeline that
//! consumes `Effect` rows and emits `DomainEffect` rows, each via a
//! built-in rule's predicate-plus-mapper pair.

use std::collections::BTreeMap;

use devac_core::model::{Effect, EffectData};
use serde::Serialize;

/// One built-in classification rule: a predicate over an effect plus a
/// mapper from a matching effect to a `(domain, action, confidence)` triple.
pub struct Rule {
    pub id: &'static str,
    pub domain: &'static str,
    matches: fn(&Effect) -> bool,
    map: fn(&Effect) -> (String, String, f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEffect {
    pub rule_id: String,
    pub domain: String,
    pub action: String,
    pub confidence: f64,
    pub source_entity_id: String,
    pub source_file_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunRulesOptions {
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunRulesOutcome {
    pub domain_effects: Vec<DomainEffect>,
    pub matched_count: usize,
    pub unmatched_count: usize,
    pub rule_stats: BTreeMap<String, usize>,
}

/// The fixed rule set. New rules are added here, not computed at runtime.
pub fn built_in_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "external_send_is_integration",
            domain: "integration",
            matches: |e| matches!(&e.data, EffectData::Send(s) if s.is_third_party),
            map: |e| {
                let EffectData::Send(s) = &e.data else { unreachable!() };
                (
                    "integration".to_string(),
                    format!("send:{}", s.target_service.clone().unwrap_or_else(|| s.url_pattern.clone())),
                    0.9,
                )
            },
        },
        Rule {
            id: "http_request_handler_is_api_surface",
            domain: "api",
            matches: |e| matches!(&e.data, EffectData::Request(_)),
            map: |e| {
                let EffectData::Request(r) = &e.data else { unreachable!() };
                ("api".to_string(), format!("handle:{} {}", r.http_method, r.route_pattern), 0.95)
            },
        },
        Rule {
            id: "external_function_call_is_dependency",
            domain: "dependency",
            matches: |e| matches!(&e.data, EffectData::FunctionCall(f) if f.is_external),
            map: |e| {
                let EffectData::FunctionCall(f) = &e.data else { unreachable!() };
                ("dependency".to_string(), format!("call:{}", f.external_module.clone().unwrap_or_else(|| f.callee_name.clone())), 0.75)
            },
        },
    ]
}

/// Runs every built-in rule over `effects`, in order, taking the first
/// match per effect (rules are disjoint in practice; first-match keeps the
/// semantics simple and deterministic if they ever overlap).
pub fn run_rules(effects: &[Effect], options: &RunRulesOptions) -> RunRulesOutcome {
    let rules = built_in_rules();
    let mut outcome = RunRulesOutcome::default();
    for rule in &rules {
        outcome.rule_stats.insert(rule.id.to_string(), 0);
    }

    for effect in effects {
        let matched_rule = rules.iter().find(|r| (r.matches)(effect));
        match matched_rule {
            Some(rule) => {
                let (domain, action, confidence) = (rule.map)(effect);
                *outcome.rule_stats.entry(rule.id.to_string()).or_insert(0) += 1;
                outcome.matched_count += 1;
                if options.domain.as_deref().map(|f| f == domain).unwrap_or(true) {
                    outcome.domain_effects.push(DomainEffect {
                        rule_id: rule.id.to_string(),
                        domain,
                        action,
                        confidence,
                        source_entity_id: effect.source_entity_id.clone(),
                        source_file_path: effect.source_file_path.clone(),
                    });
                }
            }
            None => outcome.unmatched_count += 1,
        }
    }
    outcome
}

/// Rule metadata for `list_rules(filter)`; `filter` narrows by domain.
pub fn list_rules(domain_filter: Option<&str>) -> Vec<(&'static str, &'static str)> {
    built_in_rules()
        .into_iter()
        .map(|r| (r.id, r.domain))
        .filter(|(_, domain)| domain_filter.map(|f| f == *domain).unwrap_or(true))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use devac_core::model::{Branch, FunctionCallEffectData, RequestEffectData, SendEffectData, SendKind};

    fn effect(data: EffectData) -> Effect {
        Effect { source_entity_id: "e1".to_string(), source_file_path: "src/a.ts".to_string(), source_line: 1, source_column: 0, branch: Branch::Base, data }
    }

    #[test]
    fn third_party_send_maps_to_integration_domain() {
        let effects = vec![effect(EffectData::Send(SendEffectData {
            kind: SendKind::Http,
            http_method: Some("POST".to_string()),
            url_pattern: "https://api.stripe.com/v1/charges".to_string(),
            is_third_party: true,
            target_service: Some("stripe".to_string()),
        }))];

        let outcome = run_rules(&effects, &RunRulesOptions::default());
        assert_eq!(outcome.matched_count, 1);
        assert_eq!(outcome.unmatched_count, 0);
        assert_eq!(outcome.domain_effects[0].domain, "integration");
        assert_eq!(outcome.rule_stats.get("external_send_is_integration"), Some(&1));
    }

    #[test]
    fn request_handler_maps_to_api_domain() {
        let effects = vec![effect(EffectData::Request(RequestEffectData {
            http_method: "GET".to_string(),
            route_pattern: "/users/:id".to_string(),
            framework: "express".to_string(),
        }))];

        let outcome = run_rules(&effects, &RunRulesOptions::default());
        assert_eq!(outcome.domain_effects[0].domain, "api");
        assert_eq!(outcome.domain_effects[0].action, "handle:GET /users/:id");
    }

    #[test]
    fn non_external_function_call_is_unmatched() {
        let effects = vec![effect(EffectData::FunctionCall(FunctionCallEffectData {
            callee_name: "localHelper".to_string(),
            callee_qualified_name: None,
            is_method: false,
            is_async: false,
            is_constructor: false,
            argument_count: 0,
            is_external: false,
            external_module: None,
        }))];

        let outcome = run_rules(&effects, &RunRulesOptions::default());
        assert_eq!(outcome.matched_count, 0);
        assert_eq!(outcome.unmatched_count, 1);
        assert!(outcome.domain_effects.is_empty());
    }

    #[test]
    fn domain_filter_narrows_output_but_not_matched_count() {
        let effects = vec![
            effect(EffectData::Request(RequestEffectData { http_method: "GET".to_string(), route_pattern: "/x".to_string(), framework: "express".to_string() })),
            effect(EffectData::Send(SendEffectData { kind: SendKind::Http, http_method: None, url_pattern: "https://x".to_string(), is_third_party: true, target_service: None })),
        ];
        let outcome = run_rules(&effects, &RunRulesOptions { domain: Some("api".to_string()) });
        assert_eq!(outcome.matched_count, 2);
        assert_eq!(outcome.domain_effects.len(), 1);
        assert_eq!(outcome.domain_effects[0].domain, "api");
    }

    #[test]
    fn list_rules_filters_by_domain() {
        let integration_rules = list_rules(Some("integration"));
        assert_eq!(integration_rules, vec![("external_send_is_integration", "integration")]);
        assert_eq!(list_rules(None).len(), built_in_rules().len());
    }
}
