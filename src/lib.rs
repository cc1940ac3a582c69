//! # espolint
//!
//! Architectural convention linter for EspoCRM backend modules. Files are
//! parsed with tree-sitter-php, classified by layer from their path, and run
//! through a dispatch table of rules keyed by declaration kind.

pub mod analysis;
pub mod commands;
pub mod config;
pub mod files;
pub mod layers;
pub mod rules;
pub mod syntax;

pub use analysis::{AnalysisReport, Analyzer};
pub use config::LintConfig;
pub use rules::{Diagnostic, FileContext, RequiredFieldCache, RuleDescriptor, RuleEngine};
pub use syntax::{ClassIndex, PhpFile, TypeOracle};
