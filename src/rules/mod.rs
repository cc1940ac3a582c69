pub mod controllers;
pub mod engine;
pub mod entities;
pub mod hooks;
pub mod identifier;
pub mod services;

pub use engine::RuleEngine;
pub use hooks::required_fields::RequiredFieldCache;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tree_sitter::Node;

use crate::config::LintConfig;
use crate::layers::{self, Layer};
use crate::syntax::{ClassIndex, PhpFile, TypeOracle};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Violation,
    /// A rule failed on this node; not a finding about the analysed code.
    InternalFault,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub rule_id: String,
    pub message: String,
    pub location: SourceLocation,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn is_violation(&self) -> bool {
        self.kind == DiagnosticKind::Violation
    }
}

/// Declaration kinds rules can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Class,
    Method,
}

impl NodeKind {
    pub fn of(node: Node<'_>) -> Option<Self> {
        match node.kind() {
            "class_declaration" => Some(NodeKind::Class),
            "method_declaration" => Some(NodeKind::Method),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("`{kind}` node has no `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

pub type RuleResult = Result<Vec<Diagnostic>, RuleError>;

pub type Evaluate = fn(&RuleDescriptor, Node<'_>, &FileContext<'_>) -> RuleResult;

/// One registered rule: the node kind it reacts to and the check itself.
#[derive(Clone)]
pub struct RuleDescriptor {
    pub id: String,
    pub name: &'static str,
    pub node_kind: NodeKind,
    pub description: &'static str,
    pub evaluate: Evaluate,
}

impl RuleDescriptor {
    /// `module` is the `module_path!()` of the rule; its segment after `rules`
    /// becomes the identifier group.
    pub fn new(
        module: &str,
        name: &'static str,
        node_kind: NodeKind,
        description: &'static str,
        evaluate: Evaluate,
    ) -> Self {
        Self {
            id: identifier::build_identifier(module, name),
            name,
            node_kind,
            description,
            evaluate,
        }
    }

    pub fn report(&self, ctx: &FileContext<'_>, node: Node<'_>, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            rule_id: self.id.clone(),
            message: message.into(),
            location: ctx.location(node),
            kind: DiagnosticKind::Violation,
        }
    }
}

impl std::fmt::Debug for RuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleDescriptor")
            .field("id", &self.id)
            .field("node_kind", &self.node_kind)
            .finish()
    }
}

/// Everything a rule may look at while evaluating one file.
pub struct FileContext<'a> {
    pub file: &'a PhpFile,
    pub classes: &'a ClassIndex,
    pub types: &'a dyn TypeOracle,
    pub required_fields: &'a RequiredFieldCache,
    pub config: &'a LintConfig,
    layer: Option<Layer>,
}

impl<'a> FileContext<'a> {
    pub fn new(
        file: &'a PhpFile,
        classes: &'a ClassIndex,
        types: &'a dyn TypeOracle,
        required_fields: &'a RequiredFieldCache,
        config: &'a LintConfig,
    ) -> Self {
        let layer = layers::classify(file.display_path(), &config.backend_root);
        Self {
            file,
            classes,
            types,
            required_fields,
            config,
            layer,
        }
    }

    pub fn in_layer(&self, layer: Layer) -> bool {
        self.layer == Some(layer)
    }

    pub fn in_backend(&self) -> bool {
        self.layer.is_some()
    }

    pub fn source(&self) -> &'a [u8] {
        self.file.source().as_bytes()
    }

    pub fn text(&self, node: Node<'_>) -> &'a str {
        crate::syntax::node_text(node, self.source())
    }

    pub fn location(&self, node: Node<'_>) -> SourceLocation {
        let start = node.start_position();
        SourceLocation {
            file: self.file.display_path().to_string(),
            line: start.row + 1,
            column: start.column + 1,
        }
    }
}

pub(crate) fn field<'t>(node: Node<'t>, field: &'static str) -> Result<Node<'t>, RuleError> {
    node.child_by_field_name(field).ok_or(RuleError::MissingField {
        kind: node.kind(),
        field,
    })
}

/// Every rule shipped with the crate, in dispatch order.
pub fn default_rules() -> Vec<RuleDescriptor> {
    vec![
        controllers::only_override_parent_methods(),
        entities::define_entity_type_constant(),
        entities::define_template_type_constant(),
        entities::no_entity_manager_in_entity(),
        hooks::order::require_order_property(),
        hooks::same_entity_save::no_same_entity_save(),
        hooks::restricted_fields::save_restricted_entity_fields(),
        services::call_parent_constructor(),
        services::dependency_visibility_or_final(),
        services::service_must_extend_record(),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::syntax::{DeclaredTypes, test_support::parse_php};

    /// Runs one rule over `source` as if it lived at `path`.
    pub fn run_rule(rule: RuleDescriptor, path: &str, source: &str) -> Vec<Diagnostic> {
        run_rule_with(rule, path, source, &LintConfig::default(), &ClassIndex::new())
    }

    pub fn run_rule_with(
        rule: RuleDescriptor,
        path: &str,
        source: &str,
        config: &LintConfig,
        classes: &ClassIndex,
    ) -> Vec<Diagnostic> {
        let file = parse_php(path, source);
        let cache = RequiredFieldCache::new();
        let ctx = FileContext::new(&file, classes, &DeclaredTypes, &cache, config);
        let mut engine = RuleEngine::new();
        engine.register(rule);
        engine.visit(&ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_ids_are_unique_and_grouped() {
        let rules = default_rules();
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), 10);
        let unique: std::collections::HashSet<&&str> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len(), "rule ids must be unique: {:?}", ids);
        assert!(ids.contains(&"espocrm.controllers.onlyOverrideParentMethodsRule"));
        assert!(ids.contains(&"espocrm.entities.defineEntityTypeConstantRule"));
        assert!(ids.contains(&"espocrm.hooks.noSameEntitySaveRule"));
        assert!(ids.contains(&"espocrm.hooks.saveRestrictedEntityFieldsRule"));
        assert!(ids.contains(&"espocrm.services.serviceMustExtendRecordRule"));
    }
}
