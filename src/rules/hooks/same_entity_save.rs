use tree_sitter::Node;

use super::{PERSIST_CALLS, SAVE_HOOKS};
use crate::layers::Layer;
use crate::rules::{FileContext, NodeKind, RuleDescriptor, RuleResult, field};
use crate::syntax::{
    MemberCall, array_items, class_constant_access, find_all, is_falsy_literal, is_member_call,
    method_body, method_params, param_binding, string_literal, variable_name,
};

pub fn no_same_entity_save() -> RuleDescriptor {
    RuleDescriptor::new(
        module_path!(),
        "NoSameEntitySaveRule",
        NodeKind::Method,
        "Save hooks do not save their own entity without suppressing hooks",
        check_same_entity_save,
    )
}

fn check_same_entity_save(rule: &RuleDescriptor, node: Node<'_>, ctx: &FileContext<'_>) -> RuleResult {
    if !ctx.in_layer(Layer::Hooks) {
        return Ok(vec![]);
    }
    let hook = ctx.text(field(node, "name")?);
    if !SAVE_HOOKS.contains(&hook) {
        return Ok(vec![]);
    }
    let source = ctx.source();
    let Some(entity) = method_params(node)
        .first()
        .and_then(|p| param_binding(*p, source))
    else {
        return Ok(vec![]);
    };
    let Some(body) = method_body(node) else {
        return Ok(vec![]);
    };

    let offending = find_all(body, is_member_call)
        .into_iter()
        .filter_map(|n| MemberCall::parse(n, source))
        .find(|call| {
            call.is_named(PERSIST_CALLS)
                && call
                    .args
                    .first()
                    .and_then(|a| variable_name(*a, source))
                    .is_some_and(|v| v == entity)
                && !call.args.get(1).is_some_and(|opts| suppresses_hooks(*opts, source))
        });

    let Some(call) = offending else {
        return Ok(vec![]);
    };
    let message = if hook == "afterSave" {
        "Saving the same entity inside afterSave re-triggers the save hooks and can loop forever. Pass SaveOption::SKIP_HOOKS or 'silent' => true, or move the change to beforeSave."
    } else {
        "Saving the same entity inside beforeSave starts a nested save before the current one finishes. Set the values on the entity instead; they are stored by the save in progress."
    };
    Ok(vec![rule.report(ctx, call.node, message)])
}

/// An options array literal with a truthy `skip*` or `silent` key.
fn suppresses_hooks(options: Node<'_>, source: &[u8]) -> bool {
    let Some(items) = array_items(options) else {
        return false;
    };
    items.iter().any(|item| {
        item.key.is_some_and(|key| is_suppression_key(key, source))
            && !is_falsy_literal(item.value, source)
    })
}

fn is_suppression_key(key: Node<'_>, source: &[u8]) -> bool {
    if let Some(name) = string_literal(key, source) {
        return name.starts_with("skip") || name == "silent";
    }
    class_constant_access(key, source).is_some_and(|(class, constant)| {
        class.contains("SaveOption") && (constant.starts_with("SKIP_") || constant == "SILENT")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::run_rule;

    const PATH: &str = "/m/src/backend/Hooks/Order/Recalculate.php";

    fn hook(method: &str, body: &str) -> String {
        format!(
            r#"<?php
namespace Espo\Modules\Sales\Hooks\Order;

use Espo\ORM\Repository\Option\SaveOption;

class Recalculate
{{
    public static int $order = 1;

    public function {method}($entity, array $options): void
    {{
        {body}
    }}
}}
"#
        )
    }

    fn findings(method: &str, body: &str) -> usize {
        run_rule(no_same_entity_save(), PATH, &hook(method, body)).len()
    }

    #[test]
    fn test_bare_save_of_hook_entity_is_flagged() {
        let diagnostics = run_rule(
            no_same_entity_save(),
            PATH,
            &hook("beforeSave", "$this->entityManager->saveEntity($entity);"),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("beforeSave"));
        assert_eq!(diagnostics[0].location.line, 12);
    }

    #[test]
    fn test_suppression_options_make_save_safe() {
        for body in [
            "$this->entityManager->saveEntity($entity, ['skipHooks' => true]);",
            "$this->entityManager->saveEntity($entity, [SaveOption::SKIP_HOOKS => true]);",
            "$this->entityManager->saveEntity($entity, [SaveOption::SILENT => 1]);",
            "$this->repository->save($entity, ['silent' => $options['silent'] ?? true]);",
        ] {
            for method in SAVE_HOOKS {
                assert_eq!(findings(method, body), 0, "`{body}` in {method} suppresses hooks");
            }
        }
    }

    #[test]
    fn test_falsy_or_unrecognised_options_do_not_suppress() {
        for body in [
            "$this->entityManager->saveEntity($entity, ['silent' => false]);",
            "$this->entityManager->saveEntity($entity, ['skipHooks' => null]);",
            "$this->entityManager->saveEntity($entity, ['modifiedById' => 'system']);",
            "$this->entityManager->saveEntity($entity, $options);",
        ] {
            for method in SAVE_HOOKS {
                assert_eq!(findings(method, body), 1, "`{body}` in {method} does not suppress hooks");
            }
        }
    }

    #[test]
    fn test_after_save_message_differs_from_before_save() {
        let body = "$this->entityManager->saveEntity($entity);";
        let after = run_rule(no_same_entity_save(), PATH, &hook("afterSave", body));
        let before = run_rule(no_same_entity_save(), PATH, &hook("beforeSave", body));
        assert!(after[0].message.contains("afterSave"));
        assert_ne!(after[0].message, before[0].message);
    }

    #[test]
    fn test_other_entities_and_methods_are_ignored() {
        assert_eq!(
            findings("afterSave", "$this->entityManager->saveEntity($account);"),
            0
        );
        assert_eq!(
            findings("afterRemove", "$this->entityManager->saveEntity($entity);"),
            0
        );
    }
}
