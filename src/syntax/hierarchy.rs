use std::collections::{HashMap, HashSet};

use super::{PhpFile, base_class_name, class_members, declared_name, find_all, named_children};

/// What the index knows about one class or trait. Method names are stored
/// lowercase since PHP method lookup is case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassInfo {
    pub parent: Option<String>,
    pub methods: HashSet<String>,
    pub traits: Vec<String>,
}

impl ClassInfo {
    pub fn with_methods<I, S>(parent: Option<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            parent,
            methods: methods
                .into_iter()
                .map(|m| m.as_ref().to_ascii_lowercase())
                .collect(),
            traits: Vec::new(),
        }
    }
}

/// Fully-qualified class name to declaration summary, built from the analysed
/// sources plus whatever the configuration declares for classes that live
/// outside the project.
#[derive(Debug, Default)]
pub struct ClassIndex {
    classes: HashMap<String, ClassInfo>,
}

impl ClassIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn insert(&mut self, fqn: &str, info: ClassInfo) {
        self.classes.insert(key(fqn), info);
    }

    pub fn get(&self, fqn: &str) -> Option<&ClassInfo> {
        self.classes.get(&key(fqn))
    }

    /// Registers every class and trait declared in `file`.
    pub fn add_file(&mut self, file: &PhpFile) {
        let source = file.source().as_bytes();
        let declarations = find_all(file.root(), |n| {
            matches!(n.kind(), "class_declaration" | "trait_declaration")
        });
        for decl in declarations {
            let Some(short_name) = declared_name(decl, source) else {
                continue;
            };
            let mut info = ClassInfo {
                parent: base_class_name(decl, source).map(|p| file.names().resolve_class(p)),
                ..ClassInfo::default()
            };
            for member in class_members(decl) {
                match member.kind() {
                    "method_declaration" => {
                        if let Some(name) = declared_name(member, source) {
                            info.methods.insert(name.to_ascii_lowercase());
                        }
                    }
                    "use_declaration" => {
                        info.traits.extend(
                            named_children(member)
                                .into_iter()
                                .filter(|n| matches!(n.kind(), "name" | "qualified_name"))
                                .map(|n| file.names().resolve_class(file.text(n))),
                        );
                    }
                    _ => {}
                }
            }
            self.insert(&file.names().qualify_declared(short_name), info);
        }
    }

    /// Whether `method` is declared by `class` or any of its ancestors (and
    /// the traits they use). `None` when part of the chain is not indexed and
    /// the method was not found in the indexed part.
    pub fn ancestor_declares(&self, class: &str, method: &str) -> Option<bool> {
        let method = method.to_ascii_lowercase();
        let mut visited = HashSet::new();
        let mut incomplete = false;
        let mut current = Some(class.to_string());

        while let Some(name) = current.take() {
            if !visited.insert(key(&name)) {
                break;
            }
            let Some(info) = self.get(&name) else {
                incomplete = true;
                break;
            };
            if info.methods.contains(&method) {
                return Some(true);
            }
            for used in &info.traits {
                match self.trait_declares(used, &method, &mut HashSet::new()) {
                    Some(true) => return Some(true),
                    Some(false) => {}
                    None => incomplete = true,
                }
            }
            current = info.parent.clone();
        }

        (!incomplete).then_some(false)
    }

    fn trait_declares(&self, name: &str, method: &str, visited: &mut HashSet<String>) -> Option<bool> {
        if !visited.insert(key(name)) {
            return Some(false);
        }
        let info = self.get(name)?;
        if info.methods.contains(method) {
            return Some(true);
        }
        let mut incomplete = false;
        for used in &info.traits {
            match self.trait_declares(used, method, visited) {
                Some(true) => return Some(true),
                Some(false) => {}
                None => incomplete = true,
            }
        }
        (!incomplete).then_some(false)
    }
}

fn key(fqn: &str) -> String {
    fqn.trim_start_matches('\\').to_ascii_lowercase()
}
