use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use tree_sitter::Node;

use crate::config::LintConfig;
use crate::rules::{
    Diagnostic, DiagnosticKind, FileContext, NodeKind, RuleDescriptor, default_rules, identifier,
};

/// Dispatch table from node kind to the rules interested in it.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: Vec<RuleDescriptor>,
    by_kind: HashMap<NodeKind, Vec<usize>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default rule set minus the rules the configuration disables.
    pub fn with_rules(config: &LintConfig) -> Self {
        let mut engine = Self::new();
        for rule in default_rules() {
            if config.rules.is_enabled(&rule.id) {
                engine.register(rule);
            } else {
                tracing::debug!(rule = %rule.id, "rule disabled by configuration");
            }
        }
        engine
    }

    pub fn register(&mut self, rule: RuleDescriptor) {
        self.by_kind
            .entry(rule.node_kind)
            .or_default()
            .push(self.rules.len());
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[RuleDescriptor] {
        &self.rules
    }

    /// Walks the file once in pre-order and runs every matching rule on
    /// every node, in registration order.
    pub fn visit(&self, ctx: &FileContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut cursor = ctx.file.root().walk();

        loop {
            let node = cursor.node();
            if let Some(indices) = NodeKind::of(node).and_then(|k| self.by_kind.get(&k)) {
                for &index in indices {
                    self.run(&self.rules[index], node, ctx, &mut diagnostics);
                }
            }

            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return diagnostics;
                }
            }
        }
    }

    fn run(&self, rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>, out: &mut Vec<Diagnostic>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (rule.evaluate)(rule, node, ctx)));
        let fault = match outcome {
            Ok(Ok(found)) => {
                out.extend(found);
                return;
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string()),
        };
        let location = ctx.location(node);
        tracing::warn!(
            rule = %rule.id,
            file = %location.file,
            line = location.line,
            "rule failed: {fault}"
        );
        out.push(Diagnostic {
            rule_id: identifier::build_identifier(env!("CARGO_CRATE_NAME"), "InternalRuleFault"),
            message: format!("Rule {} failed on this node: {fault}", rule.id),
            location,
            kind: DiagnosticKind::InternalFault,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleError, RuleResult, RequiredFieldCache};
    use crate::syntax::{ClassIndex, DeclaredTypes, test_support::parse_php};

    fn report_every_class(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
        Ok(vec![rule.report(ctx, node, "class seen")])
    }

    fn report_every_method(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
        Ok(vec![rule.report(ctx, node, "method seen")])
    }

    fn always_fails(_: &RuleDescriptor, node: Node<'_>, _: &FileContext<'_>) -> RuleResult {
        Err(RuleError::MissingField {
            kind: node.kind(),
            field: "body",
        })
    }

    fn always_panics(_: &RuleDescriptor, _: Node<'_>, _: &FileContext<'_>) -> RuleResult {
        panic!("unexpected shape")
    }

    const SOURCE: &str = r#"<?php
class A { public function one() {} public function two() {} }
class B { public function three() {} }
"#;

    fn visit(engine: &RuleEngine) -> Vec<Diagnostic> {
        let file = parse_php("/m/src/backend/Tools/A.php", SOURCE);
        let classes = ClassIndex::new();
        let cache = RequiredFieldCache::new();
        let config = LintConfig::default();
        let ctx = FileContext::new(&file, &classes, &DeclaredTypes, &cache, &config);
        engine.visit(&ctx)
    }

    #[test]
    fn test_visits_every_matching_node_once_in_order() {
        let mut engine = RuleEngine::new();
        engine.register(RuleDescriptor::new("t::rules::test", "Classes", NodeKind::Class, "", report_every_class));
        engine.register(RuleDescriptor::new("t::rules::test", "Methods", NodeKind::Method, "", report_every_method));

        let diagnostics = visit(&engine);
        let lines: Vec<(usize, &str)> = diagnostics
            .iter()
            .map(|d| (d.location.line, d.message.as_str()))
            .collect();
        assert_eq!(
            lines,
            vec![
                (2, "class seen"),
                (2, "method seen"),
                (2, "method seen"),
                (3, "class seen"),
                (3, "method seen"),
            ]
        );
    }

    #[test]
    fn test_failing_rules_are_isolated() {
        let mut engine = RuleEngine::new();
        engine.register(RuleDescriptor::new("t::rules::test", "Fails", NodeKind::Class, "", always_fails));
        engine.register(RuleDescriptor::new("t::rules::test", "Panics", NodeKind::Class, "", always_panics));
        engine.register(RuleDescriptor::new("t::rules::test", "Classes", NodeKind::Class, "", report_every_class));

        let diagnostics = visit(&engine);
        let faults = diagnostics.iter().filter(|d| !d.is_violation()).count();
        let findings = diagnostics.iter().filter(|d| d.is_violation()).count();
        assert_eq!(faults, 4, "two failing rules on two classes: {:?}", diagnostics);
        assert_eq!(findings, 2, "the healthy rule still runs on both classes");
        assert!(diagnostics
            .iter()
            .filter(|d| !d.is_violation())
            .all(|d| d.rule_id == "espocrm.core.internalRuleFault"));
    }

    #[test]
    fn test_disabled_rules_are_not_registered() {
        let mut config = LintConfig::default();
        config.rules.disabled = vec!["noSameEntitySaveRule".to_string()];
        let engine = RuleEngine::with_rules(&config);
        assert_eq!(engine.rules().len(), default_rules().len() - 1);
        assert!(engine.rules().iter().all(|r| r.id != "espocrm.hooks.noSameEntitySaveRule"));
    }
}
