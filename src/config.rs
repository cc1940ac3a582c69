use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::syntax::{ClassIndex, ClassInfo};

/// Configuration file looked up from the working directory upwards.
pub const CONFIG_FILE: &str = ".espolint.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// A class that lives outside the analysed sources (framework or vendor code)
/// declared so ancestor lookups can see it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KnownClass {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub methods: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServiceRules {
    /// Required direct parent of every service class.
    pub record_base: String,
}

impl Default for ServiceRules {
    fn default() -> Self {
        Self {
            record_base: "Espo\\Services\\Record".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EntityRules {
    pub template_types: Vec<String>,
    /// When false, an untyped `ENTITY_TYPE` constant with a string literal value is accepted.
    pub require_typed_constants: bool,
}

impl Default for EntityRules {
    fn default() -> Self {
        Self {
            template_types: vec!["Base".to_string(), "BasePlus".to_string(), "Event".to_string()],
            require_typed_constants: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RuleToggles {
    /// Rule identifiers (`espocrm.hooks.noSameEntitySaveRule`) or bare rule
    /// names (`noSameEntitySaveRule`) to skip.
    pub disabled: Vec<String>,
}

impl RuleToggles {
    pub fn is_enabled(&self, rule_id: &str) -> bool {
        let short = rule_id.rsplit('.').next().unwrap_or(rule_id);
        !self
            .disabled
            .iter()
            .any(|d| d == rule_id || d.eq_ignore_ascii_case(short))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LintConfig {
    /// Path of the backend sources inside a module.
    pub backend_root: String,
    pub file_extensions: Vec<String>,
    pub ignore_patterns: Vec<String>,
    /// Extra source directories indexed for class lookups but not analysed.
    pub class_paths: Vec<PathBuf>,
    pub known_classes: Vec<KnownClass>,
    /// Worker threads for batch analysis; defaults to available parallelism.
    pub jobs: Option<usize>,
    pub services: ServiceRules,
    pub entities: EntityRules,
    pub rules: RuleToggles,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            backend_root: "src/backend".to_string(),
            file_extensions: vec!["php".to_string()],
            ignore_patterns: vec![
                "vendor".to_string(),
                "node_modules".to_string(),
                ".git".to_string(),
                "build".to_string(),
            ],
            class_paths: Vec::new(),
            known_classes: Vec::new(),
            jobs: None,
            services: ServiceRules::default(),
            entities: EntityRules::default(),
            rules: RuleToggles::default(),
        }
    }
}

impl LintConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Loads `<project_root>/.espolint.toml`, or the defaults when it does not exist.
    pub fn load_or_default(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Closest ancestor of the working directory that holds a configuration file.
    pub fn find_project_root() -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        Self::find_project_root_from(&cwd)
    }

    pub fn find_project_root_from(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(CONFIG_FILE).is_file())
            .map(Path::to_path_buf)
    }

    pub fn should_ignore(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();

        let has_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.file_extensions.iter().any(|allowed| allowed == ext));
        if !has_extension {
            return true;
        }

        self.ignore_patterns.iter().any(|pattern| {
            path_str
                .split(['/', '\\'])
                .any(|segment| segment == pattern.as_str())
        })
    }

    /// Registers `known_classes` into the index.
    pub fn seed_class_index(&self, index: &mut ClassIndex) {
        for class in &self.known_classes {
            let parent = class
                .parent
                .as_deref()
                .map(|p| p.trim_start_matches('\\').to_string());
            index.insert(&class.name, ClassInfo::with_methods(parent, &class.methods));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_to_missing_sections() {
        let config = LintConfig::from_toml("backend_root = \"app/backend\"\n").unwrap();
        assert_eq!(config.backend_root, "app/backend");
        assert_eq!(config.file_extensions, vec!["php"]);
        assert_eq!(config.services.record_base, "Espo\\Services\\Record");
        assert_eq!(config.entities.template_types, vec!["Base", "BasePlus", "Event"]);
        assert!(config.entities.require_typed_constants);
    }

    #[test]
    fn test_full_configuration_parses() {
        let config = LintConfig::from_toml(
            r#"
jobs = 2
class_paths = ["vendor/espocrm/application"]

[[known_classes]]
name = 'Espo\Core\Controllers\Record'
methods = ["getActionRead", "postActionCreate"]

[services]
record_base = 'Espo\Core\Record\Service'

[rules]
disabled = ["requireOrderPropertyRule"]
"#,
        )
        .unwrap();
        assert_eq!(config.jobs, Some(2));
        assert_eq!(config.known_classes.len(), 1);
        assert_eq!(config.known_classes[0].methods.len(), 2);
        assert_eq!(config.services.record_base, "Espo\\Core\\Record\\Service");
        assert!(!config.rules.is_enabled("espocrm.hooks.requireOrderPropertyRule"));
        assert!(config.rules.is_enabled("espocrm.hooks.noSameEntitySaveRule"));
    }

    #[test]
    fn test_should_ignore_by_extension_and_segment() {
        let config = LintConfig::default();
        assert!(!config.should_ignore(Path::new("/p/src/backend/Hooks/Order/A.php")));
        assert!(config.should_ignore(Path::new("/p/src/backend/Hooks/Order/A.js")));
        assert!(config.should_ignore(Path::new("/p/vendor/lib/src/A.php")));
        assert!(!config.should_ignore(Path::new("/p/src/backend/vendorish/A.php")));
    }

    #[test]
    fn test_find_project_root_walks_up() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "").unwrap();
        let nested = tmp.path().join("src/backend/Hooks");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(
            LintConfig::find_project_root_from(&nested).as_deref(),
            Some(tmp.path())
        );
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, "jobs = \"many\"").unwrap();
        let err = LintConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
    }
}
