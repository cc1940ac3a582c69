use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use super::{find_all, find_first, node_text};

static USE_ALIAS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\\?([\w\\]+?)(?:\s+as\s+(\w+))?$").unwrap());

/// Namespace and class imports of a file, used to turn written class names
/// into fully-qualified ones.
#[derive(Debug, Clone, Default)]
pub struct NameContext {
    namespace: Option<String>,
    // keyed by lowercase alias
    imports: HashMap<String, String>,
}

impl NameContext {
    pub fn from_root(root: Node<'_>, source: &[u8]) -> Self {
        let namespace = find_first(root, |n| n.kind() == "namespace_definition")
            .and_then(|ns| ns.child_by_field_name("name"))
            .map(|name| node_text(name, source).trim_start_matches('\\').to_string());

        let mut imports = HashMap::new();
        for decl in find_all(root, |n| n.kind() == "namespace_use_declaration") {
            for (alias, fqn) in parse_use_declaration(node_text(decl, source)) {
                imports.insert(alias.to_ascii_lowercase(), fqn);
            }
        }
        Self { namespace, imports }
    }

    /// Fully-qualified name (no leading backslash) for a class name as written.
    /// `self`, `static` and `parent` are returned unchanged.
    pub fn resolve_class(&self, written: &str) -> String {
        let written = written.trim();
        if let Some(absolute) = written.strip_prefix('\\') {
            return absolute.to_string();
        }
        if ["self", "static", "parent"]
            .iter()
            .any(|k| written.eq_ignore_ascii_case(k))
        {
            return written.to_string();
        }
        let (head, rest) = match written.split_once('\\') {
            Some((head, rest)) => (head, Some(rest)),
            None => (written, None),
        };
        if let Some(imported) = self.imports.get(&head.to_ascii_lowercase()) {
            return match rest {
                Some(rest) => format!("{imported}\\{rest}"),
                None => imported.clone(),
            };
        }
        match &self.namespace {
            Some(ns) => format!("{ns}\\{written}"),
            None => written.to_string(),
        }
    }

    /// Fully-qualified name of a class declared in this file.
    pub fn qualify_declared(&self, short_name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}\\{short_name}"),
            None => short_name.to_string(),
        }
    }
}

/// `(alias, fqn)` pairs of one `use ...;` statement. Function and constant
/// imports are skipped.
fn parse_use_declaration(text: &str) -> Vec<(String, String)> {
    let body = text.trim().trim_end_matches(';').trim();
    let Some(body) = strip_keyword(body, "use") else {
        return Vec::new();
    };
    if strip_keyword(body, "function").is_some() || strip_keyword(body, "const").is_some() {
        return Vec::new();
    }

    let (prefix, clauses) = match (body.find('{'), body.rfind('}')) {
        (Some(open), Some(close)) if open < close => {
            let prefix = body[..open].trim().trim_end_matches('\\').trim_start_matches('\\');
            (Some(prefix), &body[open + 1..close])
        }
        _ => (None, body),
    };

    clauses
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .filter(|c| strip_keyword(c, "function").is_none() && strip_keyword(c, "const").is_none())
        .filter_map(|clause| {
            let caps = USE_ALIAS_RE.captures(clause)?;
            let name = caps.get(1)?.as_str();
            let fqn = match prefix {
                Some(prefix) if !prefix.is_empty() => format!("{prefix}\\{name}"),
                _ => name.to_string(),
            };
            let alias = caps
                .get(2)
                .map(|a| a.as_str().to_string())
                .unwrap_or_else(|| fqn.rsplit('\\').next().unwrap_or(&fqn).to_string());
            Some((alias, fqn))
        })
        .collect()
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    let rest = &text[keyword.len()..];
    (head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace))
        .then(|| rest.trim_start())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::test_support::parse_php;

    #[test]
    fn test_resolves_imports_aliases_and_namespace() {
        let file = parse_php(
            "/m/src/backend/Services/Order.php",
            r#"<?php
namespace Espo\Modules\Sales\Services;

use Espo\Services\Record;
use Espo\Modules\Sales\Entities\Order as OrderEntity;
use Espo\Core\{Container, Utils\Util};
use function strlen;

class Order extends Record {}
"#,
        );
        let names = file.names();
        assert_eq!(names.resolve_class("Record"), "Espo\\Services\\Record");
        assert_eq!(
            names.resolve_class("OrderEntity"),
            "Espo\\Modules\\Sales\\Entities\\Order"
        );
        assert_eq!(names.resolve_class("Util"), "Espo\\Core\\Utils\\Util");
        assert_eq!(names.resolve_class("Container"), "Espo\\Core\\Container");
        assert_eq!(names.resolve_class("\\Absolute\\Name"), "Absolute\\Name");
        assert_eq!(
            names.resolve_class("Helper"),
            "Espo\\Modules\\Sales\\Services\\Helper"
        );
        assert_eq!(names.resolve_class("parent"), "parent");
    }

    #[test]
    fn test_use_function_is_not_a_class_import() {
        assert!(parse_use_declaration("use function strlen;").is_empty());
        assert_eq!(
            parse_use_declaration("use A\\B, C\\D as E;"),
            vec![
                ("B".to_string(), "A\\B".to_string()),
                ("E".to_string(), "C\\D".to_string())
            ]
        );
    }
}
