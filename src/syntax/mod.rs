//! PHP syntax model built on tree-sitter.
//!
//! Rules never talk to tree-sitter directly for the common shapes (member
//! calls, arguments, array literals, string literals, modifiers); they go
//! through the helpers in this module so every rule reads the grammar the same
//! way.

pub mod hierarchy;
pub mod names;
pub mod types;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tree_sitter::{Language, Node, Parser, Tree};

pub use hierarchy::{ClassIndex, ClassInfo};
pub use names::NameContext;
pub use types::{DeclaredTypes, TypeOracle};

#[derive(Debug, Error)]
pub enum SyntaxError {
    #[error("failed to load the PHP grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    #[error("tree-sitter produced no tree for {0}")]
    NoTree(PathBuf),
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn php_language() -> Language {
    tree_sitter_php::LANGUAGE_PHP.into()
}

pub fn php_parser() -> Result<Parser, SyntaxError> {
    let mut parser = Parser::new();
    parser.set_language(&php_language())?;
    Ok(parser)
}

/// A parsed PHP source file together with its resolved namespace imports.
pub struct PhpFile {
    path: PathBuf,
    display_path: String,
    source: String,
    tree: Tree,
    names: NameContext,
}

impl PhpFile {
    pub fn parse(
        parser: &mut Parser,
        path: impl Into<PathBuf>,
        source: String,
    ) -> Result<Self, SyntaxError> {
        let path = path.into();
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| SyntaxError::NoTree(path.clone()))?;
        let names = NameContext::from_root(tree.root_node(), source.as_bytes());
        let display_path = path.to_string_lossy().replace('\\', "/");
        Ok(Self {
            path,
            display_path,
            source,
            tree,
            names,
        })
    }

    pub fn read(parser: &mut Parser, path: &Path) -> Result<Self, SyntaxError> {
        let source = fs::read_to_string(path).map_err(|source| SyntaxError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(parser, path, source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path with forward slashes, used for layer matching and reporting.
    pub fn display_path(&self) -> &str {
        &self.display_path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn names(&self) -> &NameContext {
        &self.names
    }

    pub fn text(&self, node: Node<'_>) -> &str {
        node_text(node, self.source.as_bytes())
    }

    pub fn has_syntax_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }
}

/// Text content of a node.
pub fn node_text<'a>(node: Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// Pre-order walk with a cursor, so nesting depth never grows the call stack.
fn push_matches<'t, F>(root: Node<'t>, predicate: &mut F, out: &mut Vec<Node<'t>>, first_only: bool)
where
    F: FnMut(Node<'t>) -> bool,
{
    let mut cursor = root.walk();
    let mut depth = 0usize;
    loop {
        let node = cursor.node();
        if predicate(node) {
            out.push(node);
            if first_only {
                return;
            }
        }

        if cursor.goto_first_child() {
            depth += 1;
            continue;
        }
        loop {
            if depth == 0 {
                return;
            }
            if cursor.goto_next_sibling() {
                break;
            }
            cursor.goto_parent();
            depth -= 1;
        }
    }
}

/// Every node under `root` (inclusive) accepted by `predicate`, in pre-order.
pub fn find_all<'t, F>(root: Node<'t>, mut predicate: F) -> Vec<Node<'t>>
where
    F: FnMut(Node<'t>) -> bool,
{
    let mut out = Vec::new();
    push_matches(root, &mut predicate, &mut out, false);
    out
}

pub fn find_first<'t, F>(root: Node<'t>, mut predicate: F) -> Option<Node<'t>>
where
    F: FnMut(Node<'t>) -> bool,
{
    let mut out = Vec::new();
    push_matches(root, &mut predicate, &mut out, true);
    out.into_iter().next()
}

pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn has_child_kind(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == kind)
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

/// Declared visibility of a member or promoted parameter, if any is written.
pub fn visibility(node: Node<'_>, source: &[u8]) -> Option<Visibility> {
    let modifier = named_children(node)
        .into_iter()
        .find(|c| c.kind() == "visibility_modifier")?;
    let text = node_text(modifier, source).to_ascii_lowercase();
    if text.starts_with("private") {
        Some(Visibility::Private)
    } else if text.starts_with("protected") {
        Some(Visibility::Protected)
    } else {
        Some(Visibility::Public)
    }
}

/// Members without a visibility modifier are public.
pub fn is_public(node: Node<'_>, source: &[u8]) -> bool {
    visibility(node, source).is_none_or(|v| v == Visibility::Public)
}

pub fn is_static(node: Node<'_>) -> bool {
    has_child_kind(node, "static_modifier")
}

pub fn is_final(class: Node<'_>) -> bool {
    has_child_kind(class, "final_modifier") || has_child_kind(class, "final")
}

pub fn declared_name<'a>(node: Node<'_>, source: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name("name")
        .map(|n| node_text(n, source))
}

/// Members of a class-like body (`declaration_list`).
pub fn class_members(class: Node<'_>) -> Vec<Node<'_>> {
    class
        .child_by_field_name("body")
        .map(named_children)
        .unwrap_or_default()
}

pub fn class_methods(class: Node<'_>) -> Vec<Node<'_>> {
    class_members(class)
        .into_iter()
        .filter(|m| m.kind() == "method_declaration")
        .collect()
}

/// The class declaration directly enclosing `node`, if any.
pub fn enclosing_class(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node.parent();
    while let Some(n) = current {
        match n.kind() {
            "class_declaration" => return Some(n),
            "trait_declaration" | "interface_declaration" | "enum_declaration"
            | "anonymous_class" | "object_creation_expression" => return None,
            _ => current = n.parent(),
        }
    }
    None
}

/// Raw text of the class named in `extends`.
pub fn base_class_name<'a>(class: Node<'_>, source: &'a [u8]) -> Option<&'a str> {
    let clause = named_children(class)
        .into_iter()
        .find(|c| c.kind() == "base_clause")?;
    named_children(clause)
        .into_iter()
        .find(|c| matches!(c.kind(), "name" | "qualified_name"))
        .map(|n| node_text(n, source))
}

pub fn method_body(method: Node<'_>) -> Option<Node<'_>> {
    method
        .child_by_field_name("body")
        .filter(|b| b.kind() == "compound_statement")
}

pub fn method_params(method: Node<'_>) -> Vec<Node<'_>> {
    method
        .child_by_field_name("parameters")
        .map(named_children)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| {
            matches!(
                p.kind(),
                "simple_parameter" | "variadic_parameter" | "property_promotion_parameter"
            )
        })
        .collect()
}

/// Binding name of a parameter, without the leading `$`.
pub fn param_binding<'a>(param: Node<'_>, source: &'a [u8]) -> Option<&'a str> {
    let name = param.child_by_field_name("name").or_else(|| {
        named_children(param)
            .into_iter()
            .find(|c| c.kind() == "variable_name")
    })?;
    variable_name(name, source)
}

/// Name of a `$variable` node, without the leading `$`.
pub fn variable_name<'a>(node: Node<'_>, source: &'a [u8]) -> Option<&'a str> {
    if node.kind() != "variable_name" {
        return None;
    }
    let name = node_text(node, source).trim_start_matches('$');
    (!name.is_empty()).then_some(name)
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

pub fn is_member_call(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "member_call_expression" | "nullsafe_member_call_expression"
    )
}

pub fn is_member_access(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "member_access_expression" | "nullsafe_member_access_expression"
    )
}

/// `$object->name(args...)` with the argument expressions in positional order.
#[derive(Debug, Clone)]
pub struct MemberCall<'t> {
    pub node: Node<'t>,
    pub object: Option<Node<'t>>,
    pub name: Option<&'t str>,
    pub args: Vec<Node<'t>>,
}

impl<'t> MemberCall<'t> {
    pub fn parse(node: Node<'t>, source: &'t [u8]) -> Option<Self> {
        if !is_member_call(node) {
            return None;
        }
        let name = node
            .child_by_field_name("name")
            .filter(|n| n.kind() == "name")
            .map(|n| node_text(n, source));
        Some(Self {
            node,
            object: node.child_by_field_name("object"),
            name,
            args: call_arguments(node),
        })
    }

    pub fn is_named(&self, candidates: &[&str]) -> bool {
        self.name.is_some_and(|n| candidates.contains(&n))
    }

    /// The call this one is chained on, e.g. `a()` in `$x->a()->b()`.
    pub fn receiver_call(&self, source: &'t [u8]) -> Option<MemberCall<'t>> {
        self.object.and_then(|o| MemberCall::parse(o, source))
    }
}

/// Argument expressions of a call, in positional order.
pub fn call_arguments(call: Node<'_>) -> Vec<Node<'_>> {
    let Some(arguments) = call.child_by_field_name("arguments") else {
        return Vec::new();
    };
    named_children(arguments)
        .into_iter()
        .filter_map(|arg| match arg.kind() {
            "argument" => named_children(arg).into_iter().last(),
            "variadic_placeholder" | "comment" => None,
            _ => Some(arg),
        })
        .collect()
}

/// Value of a string literal with no interpolation.
pub fn string_literal(node: Node<'_>, source: &[u8]) -> Option<String> {
    let double = match node.kind() {
        "string" => false,
        "encapsed_string" => true,
        _ => return None,
    };
    let interpolated = named_children(node)
        .iter()
        .any(|c| !matches!(c.kind(), "string_content" | "string_value" | "escape_sequence"));
    if interpolated {
        return None;
    }
    let raw = node_text(node, source);
    let raw = raw.strip_prefix(['b', 'B']).unwrap_or(raw);
    let quote = if double { '"' } else { '\'' };
    let inner = raw.strip_prefix(quote)?.strip_suffix(quote)?;
    Some(unescape(inner, double))
}

fn unescape(inner: &str, double: bool) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match (chars.next(), double) {
            (Some('\\'), _) => out.push('\\'),
            (Some('\''), false) => out.push('\''),
            (Some('"'), true) => out.push('"'),
            (Some('$'), true) => out.push('$'),
            (Some('n'), true) => out.push('\n'),
            (Some('t'), true) => out.push('\t'),
            (Some(other), _) => {
                out.push('\\');
                out.push(other);
            }
            (None, _) => out.push('\\'),
        }
    }
    out
}

/// `Class::CONSTANT` as raw `(class, constant)` texts.
pub fn class_constant_access<'a>(node: Node<'_>, source: &'a [u8]) -> Option<(&'a str, &'a str)> {
    if node.kind() != "class_constant_access_expression" {
        return None;
    }
    let parts = named_children(node);
    let class = parts.first()?;
    let constant = parts.last().filter(|c| c.id() != class.id())?;
    Some((node_text(*class, source), node_text(*constant, source)))
}

/// Only `false` and `null` are treated as falsy; any other expression is assumed truthy.
pub fn is_falsy_literal(node: Node<'_>, source: &[u8]) -> bool {
    let text = node_text(node, source).trim().trim_start_matches('\\');
    text.eq_ignore_ascii_case("false") || text.eq_ignore_ascii_case("null")
}

pub struct ArrayItem<'t> {
    pub key: Option<Node<'t>>,
    pub value: Node<'t>,
}

/// Items of an array literal (`[...]` or `array(...)`).
pub fn array_items(node: Node<'_>) -> Option<Vec<ArrayItem<'_>>> {
    if node.kind() != "array_creation_expression" {
        return None;
    }
    let items = named_children(node)
        .into_iter()
        .filter(|c| c.kind() == "array_element_initializer")
        .filter_map(|element| {
            let parts = named_children(element);
            let value = *parts.last()?;
            let key = if has_child_kind(element, "=>") {
                parts.first().copied().filter(|k| k.id() != value.id())
            } else {
                None
            };
            Some(ArrayItem { key, value })
        })
        .collect();
    Some(items)
}
