//! Saves of entities loaded with a restricted `select()` whose hooks read
//! fields the projection left out.
//!
//! The analysis is bounded to one method body and is sequential: the
//! assignment that counts for a save is the latest one to the same variable
//! that ends before the call, whatever branch it sits in.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use super::PERSIST_CALLS;
use crate::layers;
use crate::rules::{FileContext, NodeKind, RuleDescriptor, RuleResult};
use crate::syntax::{
    MemberCall, array_items, class_constant_access, find_all, is_member_call, method_body,
    string_literal, variable_name,
};

static ENTITY_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\\)Entities\\([A-Za-z0-9_]+)$").unwrap());

const REPOSITORY_LOOKUPS: &[&str] = &["getRDBRepositoryByClass", "getRDBRepository", "getRepository"];

const MAX_LISTED: usize = 5;

pub fn save_restricted_entity_fields() -> RuleDescriptor {
    RuleDescriptor::new(
        module_path!(),
        "SaveRestrictedEntityFieldsRule",
        NodeKind::Method,
        "Entities loaded with select() keep the fields their save hooks read",
        check_restricted_saves,
    )
}

/// Fields selected for one assignment and the entity type its chain names.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Projection {
    fields: Vec<String>,
    chain_entity: Option<String>,
}

/// One assignment to a variable, in document order.
struct Assignment {
    end_byte: usize,
    projection: Option<Projection>,
}

/// Assignments per variable name within one method body.
#[derive(Default)]
struct BindingProjections {
    by_binding: HashMap<String, Vec<Assignment>>,
}

impl BindingProjections {
    fn scan(body: Node<'_>, ctx: &FileContext<'_>) -> Self {
        let source = ctx.source();
        let mut projections = Self::default();
        for node in find_all(body, |n| n.kind() == "assignment_expression") {
            let Some(binding) = node
                .child_by_field_name("left")
                .and_then(|l| variable_name(l, source))
            else {
                continue;
            };
            let projection = node
                .child_by_field_name("right")
                .and_then(|r| projection_of_chain(r, ctx));
            projections
                .by_binding
                .entry(binding.to_string())
                .or_default()
                .push(Assignment {
                    end_byte: node.end_byte(),
                    projection,
                });
        }
        projections
    }

    /// The projection live in `binding` right before `offset`, if the most
    /// recent assignment made one.
    fn live_at(&self, binding: &str, offset: usize) -> Option<&Projection> {
        self.by_binding
            .get(binding)?
            .iter()
            .rev()
            .find(|a| a.end_byte <= offset)?
            .projection
            .as_ref()
    }
}

/// Walks a call chain from the outermost call inward. The innermost `select`
/// gives the fields, the outermost repository lookup gives the entity type.
fn projection_of_chain(expr: Node<'_>, ctx: &FileContext<'_>) -> Option<Projection> {
    let source = ctx.source();
    let mut fields = None;
    let mut chain_entity = None;
    let mut current = MemberCall::parse(expr, source);

    while let Some(call) = current {
        if call.is_named(&["select"]) {
            fields = selected_fields(&call.args, source);
        } else if chain_entity.is_none() && call.is_named(REPOSITORY_LOOKUPS) {
            chain_entity = call.args.first().and_then(|a| entity_of_argument(*a, ctx));
        }
        current = call.receiver_call(source);
    }

    fields.map(|fields| Projection { fields, chain_entity })
}

/// Literal field names passed to `select()`. Dynamic items are skipped; a
/// call with no literal left gives no projection.
fn selected_fields(args: &[Node<'_>], source: &[u8]) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    for arg in args {
        match array_items(*arg) {
            Some(items) => fields.extend(items.iter().filter_map(|i| string_literal(i.value, source))),
            None => fields.extend(string_literal(*arg, source)),
        }
    }
    (!fields.is_empty()).then_some(fields)
}

/// `Order::class` naming a class in an `Entities` namespace, or `'Order'`.
fn entity_of_argument(arg: Node<'_>, ctx: &FileContext<'_>) -> Option<String> {
    if let Some(name) = string_literal(arg, ctx.source()) {
        return (!name.is_empty()).then_some(name);
    }
    let (class, constant) = class_constant_access(arg, ctx.source())?;
    if !constant.eq_ignore_ascii_case("class") {
        return None;
    }
    entity_of_class(&ctx.file.names().resolve_class(class))
}

fn entity_of_class(fqn: &str) -> Option<String> {
    ENTITY_CLASS_RE
        .captures(fqn)
        .map(|caps| caps[1].to_string())
}

fn check_restricted_saves(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
    if !ctx.in_backend() {
        return Ok(vec![]);
    }
    let Some(body) = method_body(node) else {
        return Ok(vec![]);
    };
    let source = ctx.source();
    let projections = BindingProjections::scan(body, ctx);
    if projections.by_binding.is_empty() {
        return Ok(vec![]);
    }

    let mut diagnostics = Vec::new();
    for call in find_all(body, is_member_call)
        .into_iter()
        .filter_map(|n| MemberCall::parse(n, source))
    {
        // an options argument is taken to guard the save already
        if !call.is_named(PERSIST_CALLS) || call.args.len() != 1 {
            continue;
        }
        let Some(binding) = variable_name(call.args[0], source) else {
            continue;
        };
        let Some(projection) = projections.live_at(binding, call.node.start_byte()) else {
            continue;
        };
        let Some(entity_type) = entity_type(ctx, node, binding, projection) else {
            tracing::debug!(binding, file = %ctx.file.display_path(), "entity type unknown, save skipped");
            continue;
        };
        let Some(dir) = layers::hooks_dir(ctx.file.display_path(), &ctx.config.backend_root, &entity_type)
        else {
            continue;
        };

        let required = ctx.required_fields.required_fields(&dir);
        let missing: Vec<&str> = required
            .iter()
            .map(String::as_str)
            .filter(|f| *f != "id" && !projection.fields.iter().any(|s| s.as_str() == *f))
            .collect();
        if missing.is_empty() {
            continue;
        }
        diagnostics.push(rule.report(ctx, call.node, missing_fields_message(&entity_type, &missing)));
    }
    Ok(diagnostics)
}

/// Declared types take precedence over what the query chain names.
fn entity_type(ctx: &FileContext<'_>, method: Node<'_>, binding: &str, projection: &Projection) -> Option<String> {
    ctx.types
        .binding_classes(ctx.file, method, binding)
        .iter()
        .find_map(|fqn| entity_of_class(fqn))
        .or_else(|| projection.chain_entity.clone())
}

fn missing_fields_message(entity_type: &str, missing: &[&str]) -> String {
    let mut listed = missing
        .iter()
        .take(MAX_LISTED)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if missing.len() > MAX_LISTED {
        listed.push_str(", …");
    }
    format!(
        "Saving partially-loaded {entity_type} without skipHooks/silent may break hooks; missing fields: {listed}. Add fields to select() or pass SaveOptions with skipHooks=true or silent=true."
    )
}
