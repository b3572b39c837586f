//! Deciding whether a variant is a fix.

use crate::mutation::{Replacement, ScratchFile};
use crate::registry::{RunId, SharedRegistry};
use crate::runner::{RunnerError, TestCase, TestRunReport, TestRunner};
use std::sync::Arc;

/// Outcome of running the narrowed suite against one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every selected test passed.
    Valid,
    /// Some selected test failed, or nothing was selected at all.
    Invalid { failures: Vec<TestCase> },
    /// The runner could not produce a report (the variant did not load, the
    /// run timed out, ...).
    Errored { reason: String },
}

impl Verdict {
    pub fn from_result(result: Result<TestRunReport, RunnerError>) -> Self {
        match result {
            Err(e) => Verdict::Errored {
                reason: e.to_string(),
            },
            // A filter that matched nothing proves nothing
            Ok(report) if report.executed() == 0 => Verdict::Invalid {
                failures: Vec::new(),
            },
            Ok(report) if report.failed.is_empty() => Verdict::Valid,
            Ok(report) => Verdict::Invalid {
                failures: report.failed,
            },
        }
    }
}

pub struct VariantValidator<R> {
    runner: Arc<R>,
    registry: SharedRegistry,
}

impl<R> Clone for VariantValidator<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<R: TestRunner> VariantValidator<R> {
    pub fn new(runner: Arc<R>, registry: SharedRegistry) -> Self {
        Self { runner, registry }
    }

    /// Run the tests matching `narrowing` against `scratch`.
    ///
    /// A valid variant's replacements are registered for `uri` under `run`.
    /// The scratch file is removed whatever the outcome.
    pub async fn validate(
        &self,
        scratch: ScratchFile,
        narrowing: &str,
        uri: &str,
        run: RunId,
        replacements: &[Replacement],
    ) -> Verdict {
        let result = self.runner.run(scratch.path(), Some(narrowing)).await;

        let path = scratch.path().to_path_buf();
        if let Err(e) = scratch.remove().await {
            tracing::warn!("Failed to remove scratch file {}: {}", path.display(), e);
        }

        let verdict = Verdict::from_result(result);
        match &verdict {
            Verdict::Valid => {
                let added = self.registry.write().await.register(uri, run, replacements);
                tracing::debug!(
                    "Variant {} is a fix ({} suggestion(s) registered)",
                    path.display(),
                    added
                );
            }
            Verdict::Invalid { failures } => {
                tracing::debug!(
                    "Variant {} rejected with {} failing test(s)",
                    path.display(),
                    failures.len()
                );
            }
            Verdict::Errored { reason } => {
                tracing::debug!("Variant {} errored: {}", path.display(), reason);
            }
        }

        verdict
    }
}
