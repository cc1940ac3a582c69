use tree_sitter::Node;

use crate::layers::Layer;
use crate::rules::{FileContext, NodeKind, RuleDescriptor, RuleResult};
use crate::syntax::{
    class_members, declared_name, find_first, is_member_access, is_member_call, is_public,
    method_body, named_children, string_literal,
};

const TYPE_KINDS: &[&str] = &[
    "primitive_type",
    "named_type",
    "optional_type",
    "union_type",
    "intersection_type",
    "disjunctive_normal_form_type",
];

/// One `NAME = value` element of a public class constant declaration.
struct PublicConstant<'t> {
    declared_type: Option<Node<'t>>,
    name: &'t str,
    value: Option<Node<'t>>,
}

fn public_constants<'t>(class: Node<'t>, source: &'t [u8]) -> Vec<PublicConstant<'t>> {
    let mut constants = Vec::new();
    for decl in class_members(class) {
        if decl.kind() != "const_declaration" || !is_public(decl, source) {
            continue;
        }
        let declared_type = decl.child_by_field_name("type").or_else(|| {
            named_children(decl)
                .into_iter()
                .find(|c| TYPE_KINDS.contains(&c.kind()))
        });
        for element in named_children(decl)
            .into_iter()
            .filter(|c| c.kind() == "const_element")
        {
            let parts = named_children(element);
            let Some(name) = parts.first() else { continue };
            let value = element
                .child_by_field_name("value")
                .or_else(|| parts.get(1).copied());
            constants.push(PublicConstant {
                declared_type,
                name: crate::syntax::node_text(*name, source),
                value,
            });
        }
    }
    constants
}

pub fn define_entity_type_constant() -> RuleDescriptor {
    RuleDescriptor::new(
        module_path!(),
        "DefineEntityTypeConstantRule",
        NodeKind::Class,
        "Entities define public const string ENTITY_TYPE equal to the class name",
        check_entity_type_constant,
    )
}

fn check_entity_type_constant(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
    if !ctx.in_layer(Layer::Entities) {
        return Ok(vec![]);
    }
    let source = ctx.source();
    let Some(class_name) = declared_name(node, source) else {
        return Ok(vec![]);
    };
    let require_typed = ctx.config.entities.require_typed_constants;

    let declared = public_constants(node, source).into_iter().find(|c| {
        if c.name != "ENTITY_TYPE" {
            return false;
        }
        match c.declared_type {
            Some(ty) => ctx.text(ty).eq_ignore_ascii_case("string"),
            None => !require_typed && c.value.and_then(|v| string_literal(v, source)).is_some(),
        }
    });

    let Some(constant) = declared else {
        return Ok(vec![rule.report(
            ctx,
            node,
            "Entity must define public const string ENTITY_TYPE.",
        )]);
    };

    let value = constant.value.and_then(|v| string_literal(v, source));
    if value.as_deref() == Some(class_name) {
        return Ok(vec![]);
    }
    let found = value.map_or_else(|| "a non-literal value".to_string(), |v| format!("'{v}'"));
    Ok(vec![rule.report(
        ctx,
        constant.value.unwrap_or(node),
        format!("Entity ENTITY_TYPE must equal the class name '{class_name}', found {found}."),
    )])
}

pub fn define_template_type_constant() -> RuleDescriptor {
    RuleDescriptor::new(
        module_path!(),
        "DefineTemplateTypeConstantRule",
        NodeKind::Class,
        "Entities define public const TEMPLATE_TYPE with a known template",
        check_template_type_constant,
    )
}

fn check_template_type_constant(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
    if !ctx.in_layer(Layer::Entities) {
        return Ok(vec![]);
    }
    let source = ctx.source();
    if declared_name(node, source).is_none() {
        return Ok(vec![]);
    }
    let allowed = &ctx.config.entities.template_types;
    let expected = allowed
        .iter()
        .map(|t| format!("'{t}'"))
        .collect::<Vec<_>>()
        .join(", ");

    let templates: Vec<PublicConstant<'_>> = public_constants(node, source)
        .into_iter()
        .filter(|c| c.name == "TEMPLATE_TYPE")
        .collect();
    if templates.is_empty() {
        return Ok(vec![rule.report(
            ctx,
            node,
            format!("Entity must define public const string TEMPLATE_TYPE with one of {expected}."),
        )]);
    }

    let valid = templates.iter().any(|c| {
        c.value
            .and_then(|v| string_literal(v, source))
            .is_some_and(|v| allowed.contains(&v))
    });
    if valid {
        return Ok(vec![]);
    }
    Ok(vec![rule.report(
        ctx,
        templates[0].value.unwrap_or(node),
        format!("Entity TEMPLATE_TYPE must be one of {expected}."),
    )])
}

pub fn no_entity_manager_in_entity() -> RuleDescriptor {
    RuleDescriptor::new(
        module_path!(),
        "NoEntityManagerInEntityRule",
        NodeKind::Method,
        "Entity methods do not reach for the EntityManager",
        check_no_entity_manager,
    )
}

fn check_no_entity_manager(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
    if !ctx.in_layer(Layer::Entities) {
        return Ok(vec![]);
    }
    let Some(body) = method_body(node) else {
        return Ok(vec![]);
    };

    // $this->entityManager->... or $this->getEntityManager()->...
    let usage = find_first(body, |n| {
        let wanted = if is_member_access(n) {
            "entityManager"
        } else if is_member_call(n) {
            "getEntityManager"
        } else {
            return false;
        };
        n.child_by_field_name("name")
            .is_some_and(|name| ctx.text(name) == wanted)
    });

    Ok(usage
        .map(|n| {
            rule.report(
                ctx,
                n,
                "Entities must not use EntityManager, move business logic to the corresponding Service class.",
            )
        })
        .into_iter()
        .collect())
}
