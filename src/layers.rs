//! Architectural layer of a file, derived from its path inside the backend
//! root of a module (`<module>/src/backend/<Layer>/...`).

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Controllers,
    Entities,
    Hooks,
    Services,
    /// Under the backend root but in none of the layers above.
    Other,
}

impl Layer {
    pub const ALL: [Layer; 4] = [Layer::Controllers, Layer::Entities, Layer::Hooks, Layer::Services];

    pub fn dir_name(self) -> &'static str {
        match self {
            Layer::Controllers => "Controllers",
            Layer::Entities => "Entities",
            Layer::Hooks => "Hooks",
            Layer::Services => "Services",
            Layer::Other => "",
        }
    }
}

/// Splits `path` at the backend root: `(module root, path below the root)`.
/// The module root is empty for paths that start with the backend root.
pub fn split_backend<'a>(path: &'a str, backend_root: &str) -> Option<(&'a str, &'a str)> {
    let root = backend_root.trim_matches('/');
    let lead = format!("{root}/");
    if let Some(rest) = path.strip_prefix(&lead) {
        return Some(("", rest));
    }
    let needle = format!("/{root}/");
    let pos = path.find(&needle)?;
    Some((&path[..pos], &path[pos + needle.len()..]))
}

/// Layer of a file, `None` when it is outside the backend root.
pub fn classify(path: &str, backend_root: &str) -> Option<Layer> {
    let (_, rest) = split_backend(path, backend_root)?;
    let first = rest.split('/').next().unwrap_or("");
    // a file directly in the backend root is not inside any layer directory
    if !rest.contains('/') {
        return Some(Layer::Other);
    }
    let layer = Layer::ALL
        .into_iter()
        .find(|l| l.dir_name() == first)
        .unwrap_or(Layer::Other);
    Some(layer)
}

/// Directory holding the hooks of `entity_type` for the module `path` belongs to.
pub fn hooks_dir(path: &str, backend_root: &str, entity_type: &str) -> Option<PathBuf> {
    let (module_root, _) = split_backend(path, backend_root)?;
    let base = if module_root.is_empty() {
        PathBuf::from(backend_root.trim_matches('/'))
    } else {
        PathBuf::from(module_root).join(backend_root.trim_matches('/'))
    };
    Some(base.join(Layer::Hooks.dir_name()).join(entity_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_path_segment() {
        let root = "src/backend";
        assert_eq!(
            classify("/work/mod/src/backend/Hooks/Order/Audit.php", root),
            Some(Layer::Hooks)
        );
        assert_eq!(
            classify("src/backend/Services/Order.php", root),
            Some(Layer::Services)
        );
        assert_eq!(
            classify("/work/mod/src/backend/Tools/Helper.php", root),
            Some(Layer::Other)
        );
        assert_eq!(classify("/work/mod/src/backend/Hooks.php", root), Some(Layer::Other));
        assert_eq!(classify("/work/mod/app/Hooks/Order.php", root), None);
    }

    #[test]
    fn test_hooks_dir_is_relative_to_module_root() {
        assert_eq!(
            hooks_dir("/work/mod/src/backend/Services/Order.php", "src/backend", "Order"),
            Some(PathBuf::from("/work/mod/src/backend/Hooks/Order"))
        );
        assert_eq!(
            hooks_dir("src/backend/Tools/X.php", "src/backend", "Order"),
            Some(PathBuf::from("src/backend/Hooks/Order"))
        );
        assert_eq!(hooks_dir("/elsewhere/X.php", "src/backend", "Order"), None);
    }
}
