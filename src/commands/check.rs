use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;

use super::render::{SarifIssue, render_sarif};
use super::{OutputFormat, OutputMode};
use crate::analysis::{AnalysisReport, Analyzer};
use crate::config::LintConfig;
use crate::rules::{Diagnostic, DiagnosticKind};

pub const EXIT_CLEAN: u8 = 0;
pub const EXIT_VIOLATIONS: u8 = 1;
pub const EXIT_USAGE: u8 = 2;

#[derive(Serialize)]
struct JsonIssue {
    file: String,
    rule: String,
    kind: DiagnosticKind,
    message: String,
    line: usize,
    column: usize,
}

#[derive(Serialize)]
struct JsonSkipped {
    file: String,
    reason: String,
}

#[derive(Serialize)]
struct JsonOutput {
    checked: usize,
    violations: usize,
    faults: usize,
    skipped: Vec<JsonSkipped>,
    issues: Vec<JsonIssue>,
}

pub struct CheckOptions {
    pub target: PathBuf,
    pub format: OutputFormat,
    pub jobs: Option<usize>,
    pub config: Option<PathBuf>,
    pub output_mode: OutputMode,
}

/// Runs the check and returns the process exit code.
pub fn handle_check(options: CheckOptions) -> u8 {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let target = if options.target.is_absolute() {
        options.target.clone()
    } else {
        cwd.join(&options.target)
    };

    if !target.exists() {
        report_usage_error(
            options.format,
            &format!("target '{}' does not exist", options.target.display()),
        );
        return EXIT_USAGE;
    }

    let (project_root, mut config) = match resolve_config(&cwd, &target, options.config.as_deref()) {
        Ok(resolved) => resolved,
        Err(err) => {
            report_usage_error(options.format, &format!("{err:#}"));
            return EXIT_USAGE;
        }
    };
    if options.jobs.is_some() {
        config.jobs = options.jobs;
    }

    let analyzer = Analyzer::new(config);
    let report = match analyzer.analyze_target(&project_root, &target) {
        Ok(report) => report,
        Err(err) => {
            report_usage_error(options.format, &format!("{err:#}"));
            return EXIT_USAGE;
        }
    };

    match options.format {
        OutputFormat::Json => println!("{}", render_json(&report, &project_root)),
        OutputFormat::Sarif => {
            let issues: Vec<SarifIssue> = report
                .diagnostics()
                .map(|d| SarifIssue::from_diagnostic(d, relative(&d.location.file, &project_root)))
                .collect();
            println!("{}", render_sarif(&issues, analyzer.engine().rules()));
        }
        OutputFormat::Text => print_text(&report, &project_root, options.output_mode),
    }

    exit_code(&report)
}

/// 1 when any violation was found; internal faults alone do not fail the run.
pub fn exit_code(report: &AnalysisReport) -> u8 {
    if report.has_violations() { EXIT_VIOLATIONS } else { EXIT_CLEAN }
}

fn resolve_config(cwd: &Path, target: &Path, explicit: Option<&Path>) -> Result<(PathBuf, LintConfig)> {
    if let Some(path) = explicit {
        let path = if path.is_absolute() { path.to_path_buf() } else { cwd.join(path) };
        let config = LintConfig::load(&path).context("invalid configuration")?;
        let root = path.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());
        return Ok((root, config));
    }

    let start = if target.is_dir() { target } else { target.parent().unwrap_or(cwd) };
    let root = LintConfig::find_project_root_from(start).unwrap_or_else(|| cwd.to_path_buf());
    let config = LintConfig::load_or_default(&root).context("invalid configuration")?;
    tracing::debug!(root = %root.display(), "project root resolved");
    Ok((root, config))
}

fn report_usage_error(format: OutputFormat, message: &str) {
    let (stdout, stderr) = usage_error_output(format, message);
    if let Some(document) = stdout {
        println!("{document}");
    }
    if let Some(line) = stderr {
        eprintln!("{line}");
    }
}

/// Machine formats keep stdout parseable; SARIF has no error slot, so the
/// message goes to stderr next to the empty document.
fn usage_error_output(format: OutputFormat, message: &str) -> (Option<String>, Option<String>) {
    let line = format!("{} {}", "error:".red().bold(), message);
    match format {
        OutputFormat::Json => (Some(serde_json::json!({ "error": message }).to_string()), None),
        OutputFormat::Sarif => (Some(render_sarif(&[], &[])), Some(line)),
        OutputFormat::Text => (None, Some(line)),
    }
}

fn relative(file: &str, root: &Path) -> String {
    let root = root.to_string_lossy().replace('\\', "/");
    let root = root.trim_end_matches('/');
    file.strip_prefix(root)
        .filter(|rest| rest.starts_with('/'))
        .map(|rest| rest.trim_start_matches('/').to_string())
        .unwrap_or_else(|| file.to_string())
}

fn render_json(report: &AnalysisReport, root: &Path) -> String {
    let out = JsonOutput {
        checked: report.checked,
        violations: report.violation_count(),
        faults: report.fault_count(),
        skipped: report
            .skipped
            .iter()
            .map(|(path, reason)| JsonSkipped {
                file: relative(&path.to_string_lossy().replace('\\', "/"), root),
                reason: reason.clone(),
            })
            .collect(),
        issues: report
            .diagnostics()
            .map(|d| JsonIssue {
                file: relative(&d.location.file, root),
                rule: d.rule_id.clone(),
                kind: d.kind,
                message: d.message.clone(),
                line: d.location.line,
                column: d.location.column,
            })
            .collect(),
    };
    serde_json::to_string_pretty(&out).unwrap_or_default()
}

fn print_text(report: &AnalysisReport, root: &Path, mode: OutputMode) {
    if mode == OutputMode::Verbose {
        println!("\n{} {} file(s) analysed:", "⚡".cyan(), report.checked);
        for file in &report.files {
            println!("   {}", relative(&file.path.to_string_lossy().replace('\\', "/"), root));
        }
    }

    for file in report.files.iter().filter(|f| !f.diagnostics.is_empty()) {
        let display = file
            .diagnostics
            .first()
            .map(|d| relative(&d.location.file, root))
            .unwrap_or_default();
        println!("\n📄 {}", display.bold().cyan());
        for diagnostic in &file.diagnostics {
            print_diagnostic(diagnostic);
        }
    }

    if mode == OutputMode::Quiet {
        return;
    }
    for (path, reason) in &report.skipped {
        println!("{} skipped {}: {}", "⚠️".yellow(), path.display(), reason);
    }

    let violations = report.violation_count();
    let faults = report.fault_count();
    if violations == 0 && faults == 0 {
        println!("\n✅ No violations in {} file(s).", report.checked);
    } else {
        println!(
            "\n🚩 {} violation(s) in {} file(s)  {} internal fault(s)",
            violations.to_string().red().bold(),
            report.checked,
            faults.to_string().yellow()
        );
    }
}

fn print_diagnostic(diagnostic: &Diagnostic) {
    let location = format!("{}:{}", diagnostic.location.line, diagnostic.location.column);
    match diagnostic.kind {
        DiagnosticKind::Violation => println!(
            "   {} [{} {}]: {}",
            "❌".red(),
            diagnostic.rule_id.yellow(),
            location.dimmed(),
            diagnostic.message
        ),
        DiagnosticKind::InternalFault => println!(
            "   {} [{} {}]: {}",
            "⚙️".blue(),
            diagnostic.rule_id.dimmed(),
            location.dimmed(),
            diagnostic.message.dimmed()
        ),
    }
}
