use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use tree_sitter::Parser;

use super::SAVE_HOOKS;
use crate::syntax::{
    MemberCall, PhpFile, declared_name, find_all, method_body, method_params, param_binding,
    php_parser, string_literal, variable_name,
};

const FIELD_READS: &[&str] = &["get", "getValue", "has"];

type FieldSet = Arc<[String]>;

/// Fields read by the save hooks of each hooks directory, computed once per
/// directory and shared by every worker of an analysis run.
#[derive(Debug, Default)]
pub struct RequiredFieldCache {
    cells: Mutex<HashMap<PathBuf, Arc<OnceCell<FieldSet>>>>,
}

impl RequiredFieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required_fields(&self, hooks_dir: &Path) -> FieldSet {
        let cell = {
            let mut cells = match self.cells.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(cells.entry(hooks_dir.to_path_buf()).or_default())
        };
        Arc::clone(cell.get_or_init(|| collect_hook_reads(hooks_dir).into()))
    }
}

/// Field names the `beforeSave`/`afterSave` methods of every `*.php` file in
/// `dir` read from their entity parameter, in first-seen order.
pub fn collect_hook_reads(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "php"))
        .collect();
    if files.is_empty() {
        return Vec::new();
    }
    files.sort();

    let mut parser = match php_parser() {
        Ok(parser) => parser,
        Err(err) => {
            tracing::debug!(dir = %dir.display(), "cannot scan hooks: {err}");
            return Vec::new();
        }
    };

    let mut fields: Vec<String> = Vec::new();
    for path in files {
        for field in hook_reads_in_file(&mut parser, &path) {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
    }
    tracing::debug!(dir = %dir.display(), fields = ?fields, "collected hook field reads");
    fields
}

fn hook_reads_in_file(parser: &mut Parser, path: &Path) -> Vec<String> {
    let file = match PhpFile::read(parser, path) {
        Ok(file) => file,
        Err(err) => {
            tracing::debug!("skipping hook file: {err}");
            return Vec::new();
        }
    };
    if file.has_syntax_errors() {
        tracing::debug!(file = %file.display_path(), "skipping hook file with syntax errors");
        return Vec::new();
    }

    let source = file.source().as_bytes();
    let mut reads = Vec::new();
    let hooks = find_all(file.root(), |n| {
        n.kind() == "method_declaration"
            && declared_name(n, source).is_some_and(|name| SAVE_HOOKS.contains(&name))
    });
    for method in hooks {
        let Some(entity) = method_params(method)
            .first()
            .and_then(|p| param_binding(*p, source))
        else {
            continue;
        };
        let Some(body) = method_body(method) else {
            continue;
        };
        for node in find_all(body, crate::syntax::is_member_call) {
            let Some(call) = MemberCall::parse(node, source) else {
                continue;
            };
            let on_entity = call
                .object
                .and_then(|o| variable_name(o, source))
                .is_some_and(|v| v == entity);
            if !on_entity || !call.is_named(FIELD_READS) {
                continue;
            }
            if let Some(field) = call.args.first().and_then(|a| string_literal(*a, source)) {
                reads.push(field);
            }
        }
    }
    reads
}
