mod config;
mod language;
mod mutation;
mod registry;
mod repair;
mod repo_config;
mod runner;
mod syntax;
mod web;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::language::find_test_files;
use crate::registry::position::LineIndex;
use crate::registry::{RegistryStore, Suggestion};
use crate::repair::{mutations_for, RepairSession, RunSummary};
use crate::repo_config::{project_root, RepoConfig, REPO_CONFIG_FILE};
use crate::runner::{MochaRunner, TestIdentifier, TestRunner};
use crate::web::start_server;

#[derive(Parser)]
#[command(name = "paprika")]
#[command(version)]
#[command(about = "Finds one-edit fixes for functions with failing mocha tests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a test file (or every test file under a directory) and print fixes
    Run {
        path: PathBuf,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the mutations generated for one function, without running tests
    Mutate {
        file: PathBuf,

        /// Function annotation, e.g. `mySubstring` or `Calculator.tallyScore`
        annotation: String,
    },
    /// Start the HTTP API
    Serve,
}

/// Shared application state
pub struct AppState<R = MochaRunner> {
    pub session: Arc<RepairSession<R>>,
    pub config: Arc<RwLock<Config>>,
    pub config_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct FileReport {
    path: PathBuf,
    summary: RunSummary,
    suggestions: Vec<Suggestion>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().or_else(Config::default_config_path);
    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.general.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        "Config path: {}",
        config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none, using defaults)".to_string())
    );

    match cli.command {
        Commands::Run { path, json } => run(&config, &path, json).await,
        Commands::Mutate { file, annotation } => mutate(&file, &annotation),
        Commands::Serve => {
            let runner = Arc::new(MochaRunner::new(config.runner.clone()));
            let session = RepairSession::new(runner, RegistryStore::shared(), config.variants.clone());
            let (host, port) = (config.server.host.clone(), config.server.port);

            let state = Arc::new(AppState {
                session: Arc::new(session),
                config: Arc::new(RwLock::new(config)),
                config_path: cli.config,
            });

            tracing::info!("Starting paprika API...");
            start_server(state, &host, port).await
        }
    }
}

async fn run(config: &Config, path: &Path, json: bool) -> anyhow::Result<()> {
    let path = std::fs::canonicalize(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;

    let files = if path.is_dir() {
        find_test_files(&path)?
            .into_iter()
            .filter(|file| !is_excluded(file))
            .collect()
    } else {
        vec![path.clone()]
    };

    if files.is_empty() {
        bail!("No test files found under {}", path.display());
    }

    let runner = Arc::new(MochaRunner::new(config.runner.clone()));
    let session = RepairSession::new(runner, RegistryStore::shared(), config.variants.clone());

    let mut reports = Vec::new();
    for file in files {
        match repair_file(&session, &file).await {
            Ok(report) => reports.push(report),
            Err(e) => tracing::warn!("Skipping {}: {:#}", file.display(), e),
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        println!(
            "{}: {} tests, {} failing, {} fix(es) from {} variants",
            report.path.display(),
            report.summary.tests,
            report.summary.failing_tests,
            report.suggestions.len(),
            report.summary.variants
        );
        for suggestion in &report.suggestions {
            println!(
                "  {}:{} [{}] {}",
                suggestion.range.start.line + 1,
                suggestion.range.start.character + 1,
                suggestion.code,
                suggestion.message
            );
        }
    }

    Ok(())
}

async fn repair_file<R: TestRunner>(
    session: &RepairSession<R>,
    file: &Path,
) -> anyhow::Result<FileReport> {
    let uri = format!("file://{}", file.display());
    let summary = session.run_document(&uri, file).await?;

    let mut registry = session.registry().write().await;
    let suggestions = registry.list_suggestions(&uri);
    registry.close(&uri);

    Ok(FileReport {
        path: file.to_path_buf(),
        summary,
        suggestions,
    })
}

/// Whether the project's `.paprika.toml` excludes `file` from directory runs.
fn is_excluded(file: &Path) -> bool {
    let root = project_root(file);
    if !RepoConfig::exists(&root) {
        return false;
    }

    let Some(repo_config) = RepoConfig::load(&root) else {
        return false;
    };
    let relative = file.strip_prefix(&root).unwrap_or(file);
    let excluded = repo_config.is_excluded(&relative.to_string_lossy());
    if excluded {
        tracing::debug!("{} excluded by {}", file.display(), REPO_CONFIG_FILE);
    }
    excluded
}

fn mutate(file: &Path, annotation: &str) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let title = if annotation.starts_with('{') {
        annotation.to_string()
    } else {
        format!("{{{}}}", annotation)
    };
    let Some(id) = TestIdentifier::parse(&title) else {
        bail!("Invalid function annotation: {}", annotation);
    };

    let index = LineIndex::new(&text);
    let Some(found) = mutations_for(file, text.clone(), &id)? else {
        bail!("No function {} in {}", id, file.display());
    };

    println!(
        "{} ({}, line {}): {} mutations, {} line swaps",
        id,
        found.kind,
        found.line,
        found.replacements.len(),
        found.swaps.len()
    );
    for replacement in &found.replacements {
        let at = index.position_of(replacement.start());
        println!(
            "  [{}] {}:{} {}",
            replacement.code(),
            at.line + 1,
            at.character + 1,
            replacement.description()
        );
    }
    for swap in &found.swaps {
        let at = index.position_of(swap.replacement.start());
        println!(
            "  [{}] {}:{} swap with next line",
            swap.replacement.code(),
            at.line + 1,
            at.character + 1
        );
    }

    Ok(())
}
