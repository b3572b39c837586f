//! Mocha-backed test runner.
//!
//! Every invocation spawns a fresh `mocha` process with the JSON reporter, so
//! no module cache survives between a file and its variants.

use super::{RunnerError, TestCase, TestRunReport, TestRunner};
use crate::config::RunnerConfig;
use crate::repo_config::{project_root, RepoConfig};
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Maximum amount of stderr kept when a file fails to load.
const MAX_LOAD_OUTPUT_BYTES: usize = 4_000;

/// Runs test files through mocha (by default `npx mocha`).
#[derive(Debug, Clone)]
pub struct MochaRunner {
    defaults: RunnerConfig,
}

impl MochaRunner {
    pub fn new(defaults: RunnerConfig) -> Self {
        Self { defaults }
    }

    /// Resolve the command for `path`, honouring `.paprika.toml` rules.
    fn command_for(&self, path: &Path, root: &Path) -> RunnerConfig {
        let Some(repo_config) = RepoConfig::load(root) else {
            return self.defaults.clone();
        };

        let relative = path.strip_prefix(root).unwrap_or(path);
        match repo_config.runner.find_rule(&relative.to_string_lossy()) {
            Some(rule) => {
                tracing::debug!("Using runner rule '{}' for {}", rule.glob, path.display());
                RunnerConfig {
                    program: rule.program.clone(),
                    args: rule.args.clone(),
                    timeout_seconds: rule.timeout_seconds,
                }
            }
            None => self.defaults.clone(),
        }
    }
}

impl TestRunner for MochaRunner {
    async fn run(&self, path: &Path, filter: Option<&str>) -> Result<TestRunReport, RunnerError> {
        let start = Instant::now();
        let root = project_root(path);
        let command = self.command_for(path, &root);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).arg("--reporter").arg("json");
        if let Some(filter) = filter {
            cmd.arg("--fgrep").arg(filter);
        }
        cmd.arg(path)
            .current_dir(&root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let timeout = Duration::from_secs(command.timeout_seconds);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(RunnerError::Spawn {
                    program: command.program,
                    source,
                })
            }
            Err(_) => {
                tracing::debug!("Test run of {} timed out after {:?}", path.display(), timeout);
                return Err(RunnerError::Timeout(command.timeout_seconds));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(json) = extract_report_json(&stdout) else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RunnerError::Load {
                output: truncate_output(&format!("{}\n{}", stderr, stdout), MAX_LOAD_OUTPUT_BYTES),
            });
        };

        let mut report = parse_report(json)?;
        if report.duration_ms == 0 {
            report.duration_ms = start.elapsed().as_millis() as u64;
        }
        Ok(report)
    }
}

#[derive(Debug, Deserialize)]
struct MochaReport {
    #[serde(default)]
    stats: MochaStats,
    #[serde(default)]
    passes: Vec<MochaTest>,
    #[serde(default)]
    failures: Vec<MochaTest>,
    #[serde(default)]
    pending: Vec<MochaTest>,
}

#[derive(Debug, Default, Deserialize)]
struct MochaStats {
    #[serde(default)]
    duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MochaTest {
    title: String,
    #[serde(default)]
    full_title: Option<String>,
}

impl From<MochaTest> for TestCase {
    fn from(test: MochaTest) -> Self {
        TestCase {
            full_title: test.full_title.unwrap_or_else(|| test.title.clone()),
            title: test.title,
        }
    }
}

/// Parse a mocha JSON reporter document.
fn parse_report(json: &str) -> Result<TestRunReport, RunnerError> {
    let raw: MochaReport = serde_json::from_str(json)?;

    Ok(TestRunReport {
        passed: raw.passes.into_iter().map(TestCase::from).collect(),
        failed: raw.failures.into_iter().map(TestCase::from).collect(),
        pending: raw.pending.len(),
        duration_ms: raw.stats.duration.unwrap_or(0),
    })
}

/// Locate the JSON report in mocha's stdout.
///
/// Tests may print to stdout before the reporter emits its document, so the
/// report is found by its leading `"stats"` key rather than assumed to be the
/// whole stream.
fn extract_report_json(stdout: &str) -> Option<&str> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed);
    }

    stdout
        .match_indices('{')
        .map(|(idx, _)| idx)
        .find(|&idx| stdout[idx + 1..].trim_start().starts_with("\"stats\""))
        .map(|idx| stdout[idx..].trim())
}

/// Truncate output to a maximum length.
fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut cut = max_bytes;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...(truncated)", &output[..cut])
}
