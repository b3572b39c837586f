//! Test execution adapter.
//!
//! The repair engine never talks to a test framework directly. It asks a
//! [`TestRunner`] to execute one file (optionally narrowed to tests whose title
//! contains a substring) and receives a complete [`TestRunReport`] back. All
//! process spawning and output collection lives behind that seam.

pub mod identifier;
pub mod mocha;

pub use identifier::TestIdentifier;
pub use mocha::MochaRunner;

use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use thiserror::Error;

/// A single executed test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    /// The test's own title (the string passed to `it`).
    pub title: String,
    /// Title including the enclosing suites.
    pub full_title: String,
}

impl TestCase {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            full_title: title.clone(),
            title,
        }
    }
}

/// Outcome of running one test file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestRunReport {
    pub passed: Vec<TestCase>,
    pub failed: Vec<TestCase>,
    /// Tests that were skipped or left pending.
    pub pending: usize,
    pub duration_ms: u64,
}

impl TestRunReport {
    /// Number of tests that actually executed.
    pub fn executed(&self) -> usize {
        self.passed.len() + self.failed.len()
    }

    /// Group failing tests by the function their title annotates.
    ///
    /// Tests without an annotation are left out entirely.
    pub fn failures_by_function(&self) -> BTreeMap<TestIdentifier, Vec<TestCase>> {
        let mut families: BTreeMap<TestIdentifier, Vec<TestCase>> = BTreeMap::new();

        for test in &self.failed {
            match TestIdentifier::parse(&test.title) {
                Some(id) => families.entry(id).or_default().push(test.clone()),
                None => tracing::debug!("Failing test has no function annotation: {}", test.title),
            }
        }

        families
    }
}

/// Errors raised while executing a test file.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn test runner `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("test run timed out after {0} seconds")]
    Timeout(u64),

    #[error("test file could not be loaded: {output}")]
    Load { output: String },

    #[error("malformed test report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Executes the test suite contained in a single file.
///
/// Implementations must re-read the file on every call: the same path (or a
/// sibling scratch file with the same module identity) is executed many times
/// with different contents.
pub trait TestRunner: Send + Sync + 'static {
    fn run(
        &self,
        path: &Path,
        filter: Option<&str>,
    ) -> impl Future<Output = Result<TestRunReport, RunnerError>> + Send;
}
