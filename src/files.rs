//! Discovery of the PHP sources to analyse.

use std::path::{Path, PathBuf};

use crate::config::LintConfig;

/// Source files under `target`, sorted. A file target is returned as is when
/// its extension is configured; directories are walked honouring `.gitignore`
/// and the configured ignore patterns.
pub fn discover(target: &Path, config: &LintConfig) -> Vec<PathBuf> {
    if target.is_file() {
        let wanted = target
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| config.file_extensions.iter().any(|allowed| allowed == ext));
        return if wanted { vec![target.to_path_buf()] } else { Vec::new() };
    }

    let walker = ignore::WalkBuilder::new(target)
        .hidden(false)
        .git_ignore(true)
        .build();

    let mut files: Vec<PathBuf> = walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!("skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| !config.should_ignore(relative_to(path, target)))
        .collect();
    files.sort();
    files
}

/// Files of every configured class path that exists, resolved against `project_root`.
pub fn discover_class_paths(project_root: &Path, config: &LintConfig) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for class_path in &config.class_paths {
        let dir = project_root.join(class_path);
        if !dir.exists() {
            tracing::warn!(path = %dir.display(), "configured class path does not exist");
            continue;
        }
        files.extend(discover(&dir, config));
    }
    files
}

fn relative_to<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
