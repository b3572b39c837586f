//! Repair orchestration.
//!
//! A run of one document goes:
//! 1. Run the whole suite of the file
//! 2. Group failing tests by the function they annotate
//! 3. Locate each function and enumerate its mutations
//! 4. Validate every variant concurrently, registering the ones that pass
//!
//! Parsing and planning happen synchronously up front; only plain data
//! (paths, texts, replacements) crosses into the variant tasks.

pub mod validator;

pub use validator::{VariantValidator, Verdict};

use crate::config::VariantsConfig;
use crate::mutation::variant::scratch_path;
use crate::mutation::{
    materialize, CodeAllocator, MutationGenerator, Replacement, ScratchFile, StatementSwap,
    VariantKind,
};
use crate::registry::{RegistryError, RegistryStore, RunId, SharedRegistry};
use crate::runner::{TestCase, TestIdentifier, TestRunner};
use crate::syntax::SourceFile;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// What one run of a document found.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    /// RFC 3339 timestamp of when the run began.
    pub started_at: String,
    /// Tests executed by the initial run.
    pub tests: usize,
    pub failing_tests: usize,
    /// Distinct functions the failing tests point at.
    pub families: usize,
    /// Families whose function could not be located.
    pub skipped_families: usize,
    pub variants: usize,
    pub valid: usize,
    pub errored: usize,
}

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No run in progress
    Idle,
    /// At least one document is being repaired
    Running,
}

/// Mutations of one function, without running anything.
#[derive(Debug, Clone)]
pub struct FunctionMutations {
    pub kind: &'static str,
    /// One-based line of the function's declaration.
    pub line: usize,
    pub replacements: Vec<Replacement>,
    pub swaps: Vec<StatementSwap>,
}

/// A variant ready to be written and validated.
#[derive(Debug)]
struct PlannedVariant {
    path: PathBuf,
    contents: String,
    narrowing: String,
    replacements: Vec<Replacement>,
}

#[derive(Debug, Default)]
struct Plan {
    variants: Vec<PlannedVariant>,
    skipped_families: usize,
}

/// Counts a run as in progress until dropped.
#[derive(Debug)]
struct ActiveRun(Arc<AtomicUsize>);

impl ActiveRun {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A run registered with the store and waiting to be executed.
///
/// The session reports itself as running for as long as this exists.
#[derive(Debug)]
pub struct PendingRun {
    id: RunId,
    /// Live text of the document when the run began.
    baseline: String,
    started_at: String,
    _active: ActiveRun,
}

impl PendingRun {
    pub fn id(&self) -> RunId {
        self.id
    }
}

/// Drives test runs and variant validation for documents.
pub struct RepairSession<R> {
    runner: Arc<R>,
    registry: SharedRegistry,
    generator: MutationGenerator,
    options: VariantsConfig,
    active_runs: Arc<AtomicUsize>,
}

impl<R: TestRunner> RepairSession<R> {
    pub fn new(runner: Arc<R>, registry: SharedRegistry, options: VariantsConfig) -> Self {
        Self {
            runner,
            registry,
            generator: MutationGenerator::new(CodeAllocator::new()),
            options,
            active_runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn status(&self) -> SessionStatus {
        if self.active_runs.load(Ordering::SeqCst) == 0 {
            SessionStatus::Idle
        } else {
            SessionStatus::Running
        }
    }

    /// Start a run of `uri` over its live text.
    ///
    /// Takes the already locked store so a caller can open the document and
    /// begin the run before any edit gets in between. Edits arriving later
    /// are journaled against the run.
    pub fn begin_run(
        &self,
        registry: &mut RegistryStore,
        uri: &str,
    ) -> Result<PendingRun, RegistryError> {
        let id = registry.begin_run(uri)?;
        let baseline = registry.text(uri).unwrap_or_default().to_string();

        Ok(PendingRun {
            id,
            baseline,
            started_at: chrono::Utc::now().to_rfc3339(),
            _active: ActiveRun::new(&self.active_runs),
        })
    }

    /// Read `path`, track it as `uri` and run it to completion.
    ///
    /// Suggestions from earlier runs of `uri` are cleared first.
    pub async fn run_document(&self, uri: &str, path: &Path) -> Result<RunSummary> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let pending = {
            let mut registry = self.registry.write().await;
            registry.open(uri, text);
            self.begin_run(&mut registry, uri)?
        };
        self.execute(uri, path, pending).await
    }

    /// Run the suite in `path` and look for fixes of every failing function,
    /// mutating the text `pending` began over. Returns once every variant has
    /// been validated.
    pub async fn execute(&self, uri: &str, path: &Path, pending: PendingRun) -> Result<RunSummary> {
        let run = pending.id;
        let result = self.execute_inner(uri, path, &pending).await;
        self.registry.write().await.finish_run(uri, run);
        result
    }

    async fn execute_inner(&self, uri: &str, path: &Path, pending: &PendingRun) -> Result<RunSummary> {
        let run = pending.id;
        let text = pending.baseline.as_str();
        tracing::info!("Run {} started for {}", run, path.display());

        let report = self
            .runner
            .run(path, None)
            .await
            .with_context(|| format!("Failed to run tests in {}", path.display()))?;
        let families = report.failures_by_function();

        let mut summary = RunSummary {
            run_id: run,
            started_at: pending.started_at.clone(),
            tests: report.executed(),
            failing_tests: report.failed.len(),
            families: families.len(),
            skipped_families: 0,
            variants: 0,
            valid: 0,
            errored: 0,
        };

        if families.is_empty() {
            tracing::info!(
                "Run {}: {} tests, nothing to repair in {}",
                run,
                summary.tests,
                path.display()
            );
            return Ok(summary);
        }

        let plan = self.plan_variants(path, text, run, &families)?;
        summary.skipped_families = plan.skipped_families;
        summary.variants = plan.variants.len();
        tracing::info!(
            "Run {}: {} failing tests in {} function(s), validating {} variants",
            run,
            summary.failing_tests,
            summary.families - summary.skipped_families,
            summary.variants
        );

        let validator = VariantValidator::new(Arc::clone(&self.runner), Arc::clone(&self.registry));
        let permits = Arc::new(Semaphore::new(self.options.max_concurrent.max(1)));
        let mut tasks = JoinSet::new();

        for variant in plan.variants {
            let validator = validator.clone();
            let permits = Arc::clone(&permits);
            let uri = uri.to_string();

            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| anyhow::anyhow!("Variant semaphore closed: {}", e))?;

                let scratch = match ScratchFile::create(variant.path.clone(), &variant.contents).await {
                    Ok(scratch) => scratch,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to write scratch file {}: {}",
                            variant.path.display(),
                            e
                        );
                        return Ok(Verdict::Errored {
                            reason: e.to_string(),
                        });
                    }
                };

                Ok::<_, anyhow::Error>(
                    validator
                        .validate(scratch, &variant.narrowing, &uri, run, &variant.replacements)
                        .await,
                )
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Verdict::Valid)) => summary.valid += 1,
                Ok(Ok(Verdict::Invalid { .. })) => {}
                Ok(Ok(Verdict::Errored { .. })) => summary.errored += 1,
                Ok(Err(e)) => {
                    tracing::warn!("Variant task failed: {}", e);
                    summary.errored += 1;
                }
                Err(e) => {
                    tracing::warn!("Variant task panicked: {}", e);
                    summary.errored += 1;
                }
            }
        }

        tracing::info!(
            "Run {} finished: {} of {} variants are fixes ({} errored)",
            run,
            summary.valid,
            summary.variants,
            summary.errored
        );

        Ok(summary)
    }

    /// Materialize every variant of every failing function in memory.
    fn plan_variants(
        &self,
        path: &Path,
        text: &str,
        run: RunId,
        families: &BTreeMap<TestIdentifier, Vec<TestCase>>,
    ) -> Result<Plan> {
        let source = SourceFile::parse_path(path, text.to_string())
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::debug!("Parsed {} as {}", path.display(), source.language());
        let mut plan = Plan::default();

        for (family, (id, tests)) in families.iter().enumerate() {
            let Some(function) = source.find_function(id) else {
                tracing::warn!(
                    "No function found for {{{}}} ({} failing tests), skipping",
                    id,
                    tests.len()
                );
                plan.skipped_families += 1;
                continue;
            };
            match function.owner_class_name(source.text()) {
                Some(owner) => tracing::debug!("{{{}}} is a {} of {}", id, function.kind_name(), owner),
                None => tracing::debug!("{{{}}} is a {}", id, function.kind_name()),
            }

            let stem = id.file_stem();
            let mut replacements = self.generator.generate(&function, source.text());
            if self.options.max_per_function > 0 {
                replacements.truncate(self.options.max_per_function);
            }

            for (index, replacement) in replacements.into_iter().enumerate() {
                let contents = match materialize(text, &replacement) {
                    Ok(contents) => contents,
                    Err(e) => {
                        tracing::warn!("Skipping mutation {}: {}", replacement.code(), e);
                        continue;
                    }
                };
                plan.variants.push(PlannedVariant {
                    path: scratch_path(path, &stem, family, VariantKind::Expression, index, run),
                    contents,
                    narrowing: id.function_name.clone(),
                    replacements: vec![replacement],
                });
            }

            if self.options.statement_swaps {
                let swaps = self.generator.statement_swaps(&function, source.text());
                for (index, swap) in swaps.into_iter().enumerate() {
                    plan.variants.push(PlannedVariant {
                        path: scratch_path(path, &stem, family, VariantKind::StatementSwap, index, run),
                        contents: swap.variant_text,
                        narrowing: id.function_name.clone(),
                        replacements: vec![swap.replacement],
                    });
                }
            }
        }

        Ok(plan)
    }
}

/// Enumerate the mutations of the function `id` names in `path`.
///
/// Returns `None` when the file has no such function.
pub fn mutations_for(
    path: &Path,
    text: String,
    id: &TestIdentifier,
) -> Result<Option<FunctionMutations>> {
    let source = SourceFile::parse_path(path, text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let Some(function) = source.find_function(id) else {
        return Ok(None);
    };

    let generator = MutationGenerator::new(CodeAllocator::new());
    Ok(Some(FunctionMutations {
        kind: function.kind_name(),
        line: function.declaration().start_position().row + 1,
        replacements: generator.generate(&function, source.text()),
        swaps: generator.statement_swaps(&function, source.text()),
    }))
}
