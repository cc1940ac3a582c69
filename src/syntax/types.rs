use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use super::{PhpFile, find_all, method_params, param_binding};

static VAR_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@var\s+([\\\w|?]+)\s+\$(\w+)").unwrap());

/// Source of static type information for local bindings.
///
/// Implementations return the fully-qualified class names a binding may hold
/// inside `method`, or nothing when they have no opinion.
pub trait TypeOracle: Send + Sync {
    fn binding_classes(&self, file: &PhpFile, method: Node<'_>, binding: &str) -> Vec<String>;
}

/// Types written in the source: parameter type declarations and `@var`
/// docblock tags inside the method.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredTypes;

impl TypeOracle for DeclaredTypes {
    fn binding_classes(&self, file: &PhpFile, method: Node<'_>, binding: &str) -> Vec<String> {
        let source = file.source().as_bytes();
        let mut classes = Vec::new();

        for param in method_params(method) {
            if param_binding(param, source) != Some(binding) {
                continue;
            }
            if let Some(ty) = param.child_by_field_name("type") {
                for written in named_types(ty, file) {
                    classes.push(file.names().resolve_class(written));
                }
            }
        }

        for comment in find_all(method, |n| n.kind() == "comment") {
            for caps in VAR_TAG_RE.captures_iter(file.text(comment)) {
                if &caps[2] != binding {
                    continue;
                }
                for part in caps[1].split('|') {
                    let part = part.trim_start_matches('?');
                    if is_class_like(part) {
                        classes.push(file.names().resolve_class(part));
                    }
                }
            }
        }

        classes
    }
}

fn named_types<'a>(ty: Node<'_>, file: &'a PhpFile) -> Vec<&'a str> {
    if matches!(ty.kind(), "name" | "qualified_name") {
        return vec![file.text(ty)];
    }
    find_all(ty, |n| n.kind() == "named_type")
        .into_iter()
        .map(|n| file.text(n))
        .collect()
}

fn is_class_like(written: &str) -> bool {
    const PSEUDO: &[&str] = &[
        "int", "integer", "float", "bool", "boolean", "string", "array", "iterable", "mixed",
        "null", "void", "callable", "object", "false", "true", "never", "self", "static",
    ];
    !written.is_empty() && !PSEUDO.iter().any(|p| written.eq_ignore_ascii_case(p))
}
