use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::config::{CONFIG_FILE, LintConfig};
use crate::rules::default_rules;

/// One line per registered rule: on/off state, identifier, description.
pub fn rule_lines(config: &LintConfig) -> Vec<(bool, String, &'static str)> {
    default_rules()
        .into_iter()
        .map(|r| (config.rules.is_enabled(&r.id), r.id, r.description))
        .collect()
}

pub fn handle_rules_command(project_root: &Path, explicit: Option<PathBuf>) -> u8 {
    let config_path = explicit.unwrap_or_else(|| project_root.join(CONFIG_FILE));
    let found = config_path.is_file();
    let config = if found {
        match LintConfig::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{} {}", "error:".red().bold(), err);
                return super::check::EXIT_USAGE;
            }
        }
    } else {
        LintConfig::default()
    };

    println!("\n{}", "Registered rules:".bold());
    for (enabled, id, description) in rule_lines(&config) {
        let status = if enabled { "[ON] ".green() } else { "[OFF]".red() };
        println!("  {} {:<52} {}", status, id.yellow(), description);
    }

    println!();
    if found {
        println!("   Info: To disable a rule, add its id or name to [rules] disabled in {}:", config_path.display());
    } else {
        println!("   Info: No {CONFIG_FILE} found. Using defaults; to disable a rule add:");
    }
    println!("   [rules]");
    println!("   disabled = [\"noSameEntitySaveRule\"]");
    super::check::EXIT_CLEAN
}
