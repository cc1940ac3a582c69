//! Batch driver: parses a set of files, indexes their classes and runs the
//! rule engine over each of them on a pool of scoped worker threads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use anyhow::{Context, Result};

use crate::config::LintConfig;
use crate::files;
use crate::rules::{Diagnostic, FileContext, RequiredFieldCache, RuleEngine};
use crate::syntax::{ClassIndex, DeclaredTypes, PhpFile, php_parser};

const MAX_JOBS: usize = 32;

#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Default)]
pub struct AnalysisReport {
    pub checked: usize,
    /// Per analysed file, sorted by path. Files without findings are kept.
    pub files: Vec<FileReport>,
    /// Files that could not be read or parsed, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

impl AnalysisReport {
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.files.iter().flat_map(|f| f.diagnostics.iter())
    }

    pub fn violation_count(&self) -> usize {
        self.diagnostics().filter(|d| d.is_violation()).count()
    }

    pub fn fault_count(&self) -> usize {
        self.diagnostics().filter(|d| !d.is_violation()).count()
    }

    pub fn has_violations(&self) -> bool {
        self.violation_count() > 0
    }
}

pub struct Analyzer {
    config: LintConfig,
    engine: RuleEngine,
    jobs: usize,
}

impl Analyzer {
    pub fn new(config: LintConfig) -> Self {
        let jobs = config.jobs.unwrap_or_else(default_jobs);
        let engine = RuleEngine::with_rules(&config);
        Self {
            config,
            engine,
            jobs: jobs.clamp(1, MAX_JOBS),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.clamp(1, MAX_JOBS);
        self
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Discovers and analyses every source file under `target`.
    pub fn analyze_target(&self, project_root: &Path, target: &Path) -> Result<AnalysisReport> {
        let sources = files::discover(target, &self.config);
        let class_sources = files::discover_class_paths(project_root, &self.config);
        tracing::info!(
            files = sources.len(),
            class_files = class_sources.len(),
            jobs = self.jobs,
            "starting analysis"
        );
        self.analyze_files(&sources, &class_sources)
    }

    /// Analyses `sources`; `class_sources` only feed the class index.
    pub fn analyze_files(&self, sources: &[PathBuf], class_sources: &[PathBuf]) -> Result<AnalysisReport> {
        // fail early when the grammar itself cannot be loaded
        php_parser().context("cannot initialise the PHP parser")?;

        let mut report = AnalysisReport::default();
        let parsed = self.parse_all(sources);

        let mut classes = ClassIndex::new();
        self.config.seed_class_index(&mut classes);
        for (path, outcome) in class_sources.iter().zip(self.parse_all(class_sources)) {
            match outcome {
                Ok(file) => classes.add_file(&file),
                Err(reason) => tracing::debug!(path = %path.display(), "class path file skipped: {reason}"),
            }
        }

        let mut files = Vec::with_capacity(parsed.len());
        for (path, outcome) in sources.iter().zip(parsed) {
            match outcome {
                Ok(file) => {
                    if file.has_syntax_errors() {
                        tracing::debug!(path = %path.display(), "analysing file with syntax errors");
                    }
                    classes.add_file(&file);
                    files.push(file);
                }
                Err(reason) => {
                    tracing::warn!(path = %path.display(), "skipping file: {reason}");
                    report.skipped.push((path.clone(), reason));
                }
            }
        }
        tracing::debug!(classes = classes.len(), "class index built");

        let cache = RequiredFieldCache::new();
        let types = DeclaredTypes;
        let mut reports = parallel_map(&files, self.jobs, || (), |_, file| {
            let ctx = FileContext::new(file, &classes, &types, &cache, &self.config);
            FileReport {
                path: file.path().to_path_buf(),
                diagnostics: self.engine.visit(&ctx),
            }
        });
        reports.sort_by(|a, b| a.path.cmp(&b.path));

        report.checked = reports.len();
        report.files = reports;
        Ok(report)
    }

    fn parse_all(&self, paths: &[PathBuf]) -> Vec<Result<PhpFile, String>> {
        parallel_map(
            paths,
            self.jobs,
            || php_parser().ok(),
            |parser, path| match parser {
                Some(parser) => PhpFile::read(parser, path).map_err(|e| e.to_string()),
                None => Err("PHP parser unavailable".to_string()),
            },
        )
    }
}

fn default_jobs() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Maps `items` on up to `jobs` scoped threads pulling indices from a shared
/// counter. Each worker builds its own state with `init`. Output keeps the
/// input order.
fn parallel_map<T, S, R, I, F>(items: &[T], jobs: usize, init: I, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    I: Fn() -> S + Sync,
    F: Fn(&mut S, &T) -> R + Sync,
{
    let next = AtomicUsize::new(0);
    let workers = jobs.clamp(1, items.len().max(1));

    let mut indexed: Vec<(usize, R)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut state = init();
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(item) = items.get(index) else {
                            break;
                        };
                        done.push((index, f(&mut state, item)));
                    }
                    done
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(done) => done,
                Err(_) => {
                    tracing::warn!("analysis worker panicked, its results are lost");
                    Vec::new()
                }
            })
            .collect()
    });

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    const FRAMEWORK_RECORD: &str = r#"<?php
namespace Espo\Core\Controllers;

class Record
{
    public function getActionRead($params) {}
}
"#;

    const CONTROLLER: &str = r#"<?php
namespace Espo\Modules\Sales\Controllers;

use Espo\Core\Controllers\Record;

class Order extends Record
{
    public function getActionRead($params) {}

    public function postActionShip($params) {}
}
"#;

    const ORDER_SERVICE: &str = r#"<?php
namespace Espo\Modules\Sales\Services;

use Espo\Modules\Sales\Entities\Order;

class OrderService extends \Espo\Services\Record
{
    public function close(string $id): void
    {
        $o = $this->entityManager->getRDBRepositoryByClass(Order::class)->select(['id', 'status'])->findOne();
        $this->entityManager->saveEntity($o);
    }
}
"#;

    const ORDER_HOOK: &str = r#"<?php
namespace Espo\Modules\Sales\Hooks\Order;

class Totals
{
    public static int $order = 1;

    public function afterSave($entity, array $options): void
    {
        $this->notify($entity->get('total'));
    }
}
"#;

    fn module() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "framework/Core/Controllers/Record.php", FRAMEWORK_RECORD);
        write(dir.path(), "mod/src/backend/Controllers/Order.php", CONTROLLER);
        write(dir.path(), "mod/src/backend/Services/OrderService.php", ORDER_SERVICE);
        write(dir.path(), "mod/src/backend/Hooks/Order/Totals.php", ORDER_HOOK);
        dir
    }

    fn config() -> LintConfig {
        LintConfig {
            class_paths: vec![PathBuf::from("framework")],
            ..LintConfig::default()
        }
    }

    #[test]
    fn test_analyze_target_runs_rules_across_layers() {
        let dir = module();
        let analyzer = Analyzer::new(config()).with_jobs(4);
        let report = analyzer
            .analyze_target(dir.path(), &dir.path().join("mod"))
            .unwrap();

        assert_eq!(report.checked, 3);
        assert!(report.skipped.is_empty());
        let ids: Vec<&str> = report.diagnostics().map(|d| d.rule_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "espocrm.controllers.onlyOverrideParentMethodsRule",
                "espocrm.hooks.saveRestrictedEntityFieldsRule",
            ],
            "controller action missing from Record and the partial save; got {:?}",
            ids
        );
        assert_eq!(report.violation_count(), 2);
        assert_eq!(report.fault_count(), 0);
    }

    #[test]
    fn test_results_do_not_depend_on_worker_count() {
        let dir = module();
        let target = dir.path().join("mod");
        let single = Analyzer::new(config()).with_jobs(1).analyze_target(dir.path(), &target).unwrap();
        let many = Analyzer::new(config()).with_jobs(8).analyze_target(dir.path(), &target).unwrap();
        let single: Vec<&Diagnostic> = single.diagnostics().collect();
        let many: Vec<&Diagnostic> = many.diagnostics().collect();
        assert_eq!(single, many);
    }

    #[test]
    fn test_unreadable_file_is_skipped_not_fatal() {
        let dir = module();
        let missing = dir.path().join("mod/src/backend/Services/Gone.php");
        let present = dir.path().join("mod/src/backend/Services/OrderService.php");
        let report = Analyzer::new(LintConfig::default())
            .analyze_files(&[missing.clone(), present], &[])
            .unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, missing);
    }

    #[test]
    fn test_parallel_map_keeps_input_order() {
        let items: Vec<usize> = (0..100).collect();
        let doubled = parallel_map(&items, 7, || 0usize, |calls, n| {
            *calls += 1;
            n * 2
        });
        assert_eq!(doubled, items.iter().map(|n| n * 2).collect::<Vec<_>>());
        assert!(parallel_map(&Vec::<usize>::new(), 4, || (), |_, n| *n).is_empty());
    }
}
