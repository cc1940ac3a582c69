/// Prefix shared by every rule identifier.
pub const NAMESPACE: &str = "espocrm";

/// Stable identifier `espocrm.<group>.<ruleName>`.
///
/// The group is the lower-cased path segment following `rules` in
/// `qualified_path` (a `module_path!()` or a `\`-separated class name), `core`
/// when there is none. The rule name gets its first letter lower-cased.
pub fn build_identifier(qualified_path: &str, rule_name: &str) -> String {
    let segments: Vec<&str> = qualified_path
        .split(['\\', ':'])
        .filter(|s| !s.is_empty())
        .collect();
    let group = segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case("rules"))
        .and_then(|i| segments.get(i + 1))
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "core".to_string());
    format!("{NAMESPACE}.{group}.{}", lcfirst(rule_name))
}

fn lcfirst(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_comes_from_segment_after_rules() {
        assert_eq!(
            build_identifier("espolint::rules::hooks::same_entity_save", "NoSameEntitySaveRule"),
            "espocrm.hooks.noSameEntitySaveRule"
        );
        assert_eq!(
            build_identifier("Vendor\\PHPStan\\Rules\\Services", "CallParentConstructorRule"),
            "espocrm.services.callParentConstructorRule"
        );
    }

    #[test]
    fn test_defaults_to_core_group() {
        assert_eq!(
            build_identifier("espolint::rules", "InternalRuleFault"),
            "espocrm.core.internalRuleFault"
        );
        assert_eq!(build_identifier("", "X"), "espocrm.core.x");
    }
}
