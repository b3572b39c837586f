//! Mechanical mutation of a failing function.
//!
//! This module provides functionality for:
//! - Enumerating candidate edits of a function from a fixed rule catalogue
//! - Swapping adjacent lines of a function to catch ordering bugs
//! - Materializing an edit as a patched copy of the source file

pub mod generator;
pub mod rules;
pub mod variant;

pub use generator::{MutationGenerator, StatementSwap};
pub use variant::{materialize, ScratchFile, VariantKind};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An edit of the original file text.
///
/// `start..end` is a half-open byte range into the text the replacement was
/// generated from. `code` identifies the replacement once it has been turned
/// into a suggestion, even after the document has been edited and the range
/// has moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replacement {
    start: usize,
    end: usize,
    old_text: String,
    new_text: String,
    code: String,
}

impl Replacement {
    /// Replace `start..end` (currently `old_text`) with `new_text`.
    pub fn replace(
        start: usize,
        end: usize,
        old_text: impl Into<String>,
        new_text: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        debug_assert!(start <= end, "replacement range is inverted");
        Self {
            start,
            end,
            old_text: old_text.into(),
            new_text: new_text.into(),
            code: code.into(),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn old_text(&self) -> &str {
        &self.old_text
    }

    pub fn new_text(&self) -> &str {
        &self.new_text
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// The edit that undoes this one once it has been applied.
    pub fn inverse(&self) -> Self {
        Self {
            start: self.start,
            end: self.start + self.new_text.len(),
            old_text: self.new_text.clone(),
            new_text: self.old_text.clone(),
            code: self.code.clone(),
        }
    }

    /// Whether `text` still holds `old_text` at this replacement's range.
    pub fn applies_to(&self, text: &str) -> bool {
        text.get(self.start..self.end) == Some(self.old_text.as_str())
    }

    /// Human-readable description, whitespace collapsed.
    pub fn description(&self) -> String {
        format!(
            "Replace: {} ==> {}",
            collapse_whitespace(&self.old_text),
            collapse_whitespace(&self.new_text)
        )
    }
}

/// Collapse every run of whitespace into a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hands out replacement codes, unique for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct CodeAllocator {
    next: Arc<AtomicU64>,
}

impl CodeAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_code(&self) -> String {
        (self.next.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}
