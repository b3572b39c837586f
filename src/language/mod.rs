//! Language detection and test-file discovery for JavaScript and TypeScript.
//!
//! The repair engine only ever parses one file at a time; this module maps a
//! path to the tree-sitter grammar that parses it and finds candidate test
//! files when a whole directory is handed to the CLI.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Supported source languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    TypeScript,
    /// TypeScript with JSX.
    Tsx,
}

/// Directories never descended into when scanning for test files.
const SKIP_DIRECTORIES: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "coverage",
    ".next",
    ".turbo",
    ".cache",
];

impl Language {
    pub const ALL: [Language; 3] = [Language::JavaScript, Language::TypeScript, Language::Tsx];

    /// Detect the language of a file from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        Self::from_extension(ext)
    }

    /// Detect the language from a bare extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.file_extensions().contains(&ext))
    }

    /// Human-readable name for the language.
    pub fn name(&self) -> &'static str {
        match self {
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Tsx => "TSX",
        }
    }

    /// File extensions for this language.
    pub fn file_extensions(&self) -> &'static [&'static str] {
        match self {
            Language::JavaScript => &["js", "mjs", "cjs", "jsx"],
            Language::TypeScript => &["ts", "mts", "cts"],
            Language::Tsx => &["tsx"],
        }
    }

    /// The tree-sitter grammar for this language.
    pub fn grammar(&self) -> tree_sitter::Language {
        match self {
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Whether a file name looks like a variant written by a previous run.
///
/// Scratch files follow `tmp<stem>-<family>-<index>_<run>.<ext>`; they are never test
/// suites in their own right.
pub fn is_scratch_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| {
            stem.starts_with("tmp")
                && stem
                    .rsplit_once('_')
                    .is_some_and(|(_, run)| !run.is_empty() && run.bytes().all(|b| b.is_ascii_digit()))
        })
        .unwrap_or(false)
}

/// Find test files below `dir`.
///
/// A test file is any supported source file whose contents declare a mocha
/// suite or test (`describe(` / `it(`). Scratch files and dependency
/// directories are skipped.
pub fn find_test_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if !dir.is_dir() {
        return Ok(files);
    }

    let root_dir = dir.to_path_buf();

    for entry in walkdir::WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            // Don't filter the root directory itself (may be a temp dir starting with .)
            if e.path() == root_dir {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIP_DIRECTORIES.contains(&name.as_ref())
        })
    {
        let entry = entry?;
        let path = entry.path();

        if !path.is_file() || Language::from_path(path).is_none() || is_scratch_file(path) {
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!("Skipping unreadable file {}: {}", path.display(), e);
                continue;
            }
        };

        if content.contains("describe(") || content.contains("it(") {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}
