//! Project-level configuration.
//!
//! Handles locating the project root of a test file and loading the optional
//! `.paprika.toml` found there. The file controls which command executes the
//! project's tests and which test files a directory scan leaves alone.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the per-project configuration file.
pub const REPO_CONFIG_FILE: &str = ".paprika.toml";

/// Project-level configuration loaded from `.paprika.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoConfig {
    /// Test runner overrides.
    #[serde(default)]
    pub runner: RunnerRepoConfig,

    /// Globs (relative to the project root) of test files that directory scans skip.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Test runner configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerRepoConfig {
    /// Rules for matching test files to runner commands.
    /// Rules are evaluated in order; the first matching glob wins.
    #[serde(default)]
    pub rules: Vec<RunnerRule>,
}

/// A single rule mapping a glob pattern to a runner command.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerRule {
    /// Glob pattern to match file paths (e.g., `"test/**/*.js"`, `"src/**/*.spec.ts"`).
    pub glob: String,
    /// Program to execute (e.g., `npx`).
    pub program: String,
    /// Arguments placed before the reporter flags and the file path.
    #[serde(default)]
    pub args: Vec<String>,
    /// Timeout in seconds for one test run (defaults to 60).
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    60
}

impl RepoConfig {
    /// Check if `.paprika.toml` exists in the project.
    pub fn exists(root: &Path) -> bool {
        root.join(REPO_CONFIG_FILE).exists()
    }

    /// Load configuration from `.paprika.toml`.
    ///
    /// Returns `None` if the file doesn't exist or cannot be parsed, and
    /// `Some(default)` if it is empty or contains only whitespace.
    pub fn load(root: &Path) -> Option<Self> {
        let config_path = root.join(REPO_CONFIG_FILE);
        if !config_path.exists() {
            return None;
        }
        let content = std::fs::read_to_string(&config_path).ok()?;
        if content.trim().is_empty() {
            return Some(Self::default());
        }
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Ignoring invalid {}: {}", config_path.display(), e);
                None
            }
        }
    }

    /// Whether a path (relative to the project root) is excluded from scans.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.exclude
            .iter()
            .any(|glob| glob_match::glob_match(glob, relative_path))
    }
}

impl RunnerRepoConfig {
    /// Find the first rule matching the given file path.
    ///
    /// Returns `None` if no rule matches, meaning the global runner applies.
    pub fn find_rule(&self, file_path: &str) -> Option<&RunnerRule> {
        self.rules
            .iter()
            .find(|rule| glob_match::glob_match(&rule.glob, file_path))
    }
}

/// Find the project root for a test file.
///
/// The root is the nearest ancestor directory containing a `package.json`,
/// which is where mocha must run for `node_modules` and `.mocharc` to resolve.
/// Falls back to the file's own directory.
pub fn project_root(file: &Path) -> PathBuf {
    let dir = file.parent().unwrap_or_else(|| Path::new("."));

    dir.ancestors()
        .find(|candidate| candidate.join("package.json").is_file())
        .unwrap_or(dir)
        .to_path_buf()
}
