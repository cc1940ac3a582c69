use tree_sitter::Node;

use crate::layers::Layer;
use crate::rules::{FileContext, NodeKind, RuleDescriptor, RuleResult};
use crate::syntax::{class_members, declared_name, find_first, is_public, is_static, named_children, variable_name};

pub fn require_order_property() -> RuleDescriptor {
    RuleDescriptor::new(
        module_path!(),
        "RequireOrderPropertyRule",
        NodeKind::Class,
        "Hooks declare their execution order with public static int $order",
        check_order_property,
    )
}

fn check_order_property(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
    if !ctx.in_layer(Layer::Hooks) || declared_name(node, ctx.source()).is_none() {
        return Ok(vec![]);
    }
    let source = ctx.source();
    let declared = class_members(node).into_iter().any(|member| {
        member.kind() == "property_declaration"
            && is_public(member, source)
            && is_static(member)
            && is_int_typed(member, ctx)
            && declares_property(member, source, "order")
    });
    if declared {
        return Ok(vec![]);
    }
    Ok(vec![rule.report(
        ctx,
        node,
        "Hook classes must define public static int $order.",
    )])
}

fn is_int_typed(property: Node<'_>, ctx: &FileContext<'_>) -> bool {
    let ty = property.child_by_field_name("type").or_else(|| {
        named_children(property)
            .into_iter()
            .find(|c| c.kind() == "primitive_type")
    });
    ty.is_some_and(|t| ctx.text(t).eq_ignore_ascii_case("int"))
}

fn declares_property(property: Node<'_>, source: &[u8], name: &str) -> bool {
    named_children(property)
        .into_iter()
        .filter(|c| c.kind() == "property_element")
        .any(|element| {
            find_first(element, |n| n.kind() == "variable_name")
                .and_then(|v| variable_name(v, source))
                == Some(name)
        })
}
