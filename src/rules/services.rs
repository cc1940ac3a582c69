use tree_sitter::Node;

use crate::layers::Layer;
use crate::rules::{FileContext, NodeKind, RuleDescriptor, RuleResult, field};
use crate::syntax::{
    Visibility, base_class_name, class_methods, declared_name, enclosing_class, find_first,
    is_final, method_body, method_params, visibility,
};

const CONSTRUCTOR: &str = "__construct";

pub fn call_parent_constructor() -> RuleDescriptor {
    RuleDescriptor::new(
        module_path!(),
        "CallParentConstructorRule",
        NodeKind::Method,
        "Service constructors call parent::__construct()",
        check_parent_constructor_call,
    )
}

fn check_parent_constructor_call(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
    if !ctx.in_layer(Layer::Services) {
        return Ok(vec![]);
    }
    if !ctx.text(field(node, "name")?).eq_ignore_ascii_case(CONSTRUCTOR) {
        return Ok(vec![]);
    }
    let has_parent = enclosing_class(node).is_some_and(|c| base_class_name(c, ctx.source()).is_some());
    // abstract constructors have no body to check
    let Some(body) = method_body(node).filter(|_| has_parent) else {
        return Ok(vec![]);
    };

    let calls_parent = find_first(body, |n| {
        n.kind() == "scoped_call_expression"
            && n.child_by_field_name("scope")
                .is_some_and(|s| ctx.text(s).eq_ignore_ascii_case("parent"))
            && n.child_by_field_name("name")
                .is_some_and(|m| ctx.text(m).eq_ignore_ascii_case(CONSTRUCTOR))
    })
    .is_some();
    if calls_parent {
        return Ok(vec![]);
    }
    Ok(vec![rule.report(
        ctx,
        node,
        "Service constructors must call parent::__construct().",
    )])
}

pub fn dependency_visibility_or_final() -> RuleDescriptor {
    RuleDescriptor::new(
        module_path!(),
        "DependencyVisibilityOrFinalRule",
        NodeKind::Class,
        "Non-final services keep promoted dependencies protected",
        check_dependency_visibility,
    )
}

fn check_dependency_visibility(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
    if !ctx.in_layer(Layer::Services) || is_final(node) {
        return Ok(vec![]);
    }
    let source = ctx.source();
    let Some(class_name) = declared_name(node, source) else {
        return Ok(vec![]);
    };
    let Some(constructor) = class_methods(node)
        .into_iter()
        .find(|m| declared_name(*m, source).is_some_and(|n| n.eq_ignore_ascii_case(CONSTRUCTOR)))
    else {
        return Ok(vec![]);
    };

    let private_dependency = method_params(constructor).into_iter().find(|p| {
        p.kind() == "property_promotion_parameter" && visibility(*p, source) == Some(Visibility::Private)
    });
    let Some(param) = private_dependency else {
        return Ok(vec![]);
    };
    let binding = crate::syntax::param_binding(param, source).unwrap_or("dependency");
    Ok(vec![rule.report(
        ctx,
        param,
        format!(
            "Service {class_name} is not final, so the promoted dependency ${binding} must be protected to stay available to subclasses. Declare it protected or mark the class final."
        ),
    )])
}

pub fn service_must_extend_record() -> RuleDescriptor {
    RuleDescriptor::new(
        module_path!(),
        "ServiceMustExtendRecordRule",
        NodeKind::Class,
        "Services extend the record service base class",
        check_extends_record,
    )
}

fn check_extends_record(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
    if !ctx.in_layer(Layer::Services) {
        return Ok(vec![]);
    }
    let source = ctx.source();
    if declared_name(node, source).is_none() {
        return Ok(vec![]);
    }
    let expected = ctx.config.services.record_base.trim_start_matches('\\');
    let extends_record = base_class_name(node, source)
        .map(|parent| ctx.file.names().resolve_class(parent))
        .is_some_and(|parent| parent.trim_start_matches('\\').eq_ignore_ascii_case(expected));
    if extends_record {
        return Ok(vec![]);
    }
    Ok(vec![rule.report(
        ctx,
        node,
        format!(
            "Services under src/backend/Services/ must extend {expected}. Place non-entity utilities under src/backend/Tools/."
        ),
    )])
}
