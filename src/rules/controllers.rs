use tree_sitter::Node;

use crate::layers::Layer;
use crate::rules::{FileContext, NodeKind, RuleDescriptor, RuleResult, field};
use crate::syntax::{base_class_name, enclosing_class};

pub fn only_override_parent_methods() -> RuleDescriptor {
    RuleDescriptor::new(
        module_path!(),
        "OnlyOverrideParentMethodsRule",
        NodeKind::Method,
        "Controllers may only override methods declared by an ancestor",
        check_only_overrides,
    )
}

fn check_only_overrides(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
    if !ctx.in_layer(Layer::Controllers) {
        return Ok(vec![]);
    }
    let Some(class) = enclosing_class(node) else {
        return Ok(vec![]);
    };
    let Some(parent) = base_class_name(class, ctx.source()) else {
        return Ok(vec![]);
    };
    let parent = ctx.file.names().resolve_class(parent);
    let method = ctx.text(field(node, "name")?);

    // an ancestor chain that leaves the index gives no opinion
    if ctx.classes.ancestor_declares(&parent, method) != Some(false) {
        return Ok(vec![]);
    }

    Ok(vec![rule.report(
        ctx,
        node,
        format!(
            "Controllers should not declare new methods, only override methods defined by the parent; `{method}` is not declared by `{parent}` or its ancestors. For new endpoints, implement API actions under src/backend/Api/ instead."
        ),
    )])
}
