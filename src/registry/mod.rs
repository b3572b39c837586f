//! Per-document store of validated fixes.
//!
//! Each open document keeps its live text, the suggestions produced by the
//! current run and the [`Replacement`] behind each suggestion, keyed by code.
//! Suggestion ranges are re-anchored on every edit of the live text so they
//! either keep pointing at the text they were generated for or disappear.

pub mod position;

pub use position::{Position, Range, TextChange, TextEdit};

use crate::mutation::Replacement;
use position::{apply_change, reanchor, LineIndex};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Tag carried by every suggestion.
pub const SUGGESTION_SOURCE: &str = "paprika";

/// Registry shared between the session, its variant tasks and the API.
pub type SharedRegistry = Arc<RwLock<RegistryStore>>;

/// Identifies one suite run of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
}

/// A validated fix as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub range: Range,
    pub message: String,
    pub code: String,
    pub source: &'static str,
    pub severity: Severity,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("document is not open: {0}")]
    NotOpen(String),

    #[error("no fix with code {0}")]
    NotFound(String),

    #[error("invalid range: start {start:?} is after end {end:?}")]
    InvalidRange { start: Position, end: Position },

    #[error("fix {code} is stale: expected `{expected}` but the document has `{found}`")]
    Stale {
        code: String,
        expected: String,
        found: String,
    },
}

/// The run whose results a document currently accepts.
#[derive(Debug)]
struct RunState {
    id: RunId,
    /// Text the run's replacements were generated from.
    baseline: String,
    /// Edits applied to the live text since the run began.
    journal: Vec<TextChange>,
}

#[derive(Debug, Default)]
struct DocumentEntry {
    text: String,
    run: Option<RunState>,
    /// Newest first.
    suggestions: Vec<Suggestion>,
    fixes: HashMap<String, Replacement>,
}

impl DocumentEntry {
    fn clear(&mut self) {
        self.run = None;
        self.suggestions.clear();
        self.fixes.clear();
    }

    /// Forget fixes whose suggestion no longer exists.
    fn prune_fixes(&mut self) {
        let live: std::collections::HashSet<&str> =
            self.suggestions.iter().map(|s| s.code.as_str()).collect();
        self.fixes.retain(|code, _| live.contains(code.as_str()));
    }
}

#[derive(Debug, Default)]
pub struct RegistryStore {
    documents: HashMap<String, DocumentEntry>,
    next_run: u64,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Start tracking a document, or refresh the text of one already open.
    pub fn open(&mut self, uri: &str, text: impl Into<String>) {
        let entry = self.documents.entry(uri.to_string()).or_default();
        entry.text = text.into();
    }

    /// Stop tracking a document. Late results for it are dropped.
    pub fn close(&mut self, uri: &str) -> bool {
        self.documents.remove(uri).is_some()
    }

    pub fn text(&self, uri: &str) -> Option<&str> {
        self.documents.get(uri).map(|d| d.text.as_str())
    }

    /// Clear the document's suggestions and start accepting results for a
    /// new run over its live text. Results still arriving for an earlier run
    /// are discarded.
    pub fn begin_run(&mut self, uri: &str) -> Result<RunId, RegistryError> {
        let entry = self
            .documents
            .get_mut(uri)
            .ok_or_else(|| RegistryError::NotOpen(uri.to_string()))?;

        self.next_run += 1;
        let id = RunId(self.next_run);
        entry.clear();
        entry.run = Some(RunState {
            id,
            baseline: entry.text.clone(),
            journal: Vec::new(),
        });

        Ok(id)
    }

    /// Stop journaling edits for `run` once every result it will produce has
    /// been registered. Its suggestions stay.
    pub fn finish_run(&mut self, uri: &str, run: RunId) {
        if let Some(entry) = self.documents.get_mut(uri) {
            if entry.run.as_ref().is_some_and(|state| state.id == run) {
                entry.run = None;
            }
        }
    }

    /// Drop every suggestion and the active run. Unknown documents are fine.
    pub fn reset(&mut self, uri: &str) {
        if let Some(entry) = self.documents.get_mut(uri) {
            entry.clear();
        }
    }

    /// Record validated replacements produced by `run`.
    ///
    /// Offsets are converted against the text the run started from, then
    /// carried across every edit made since, so the suggestion lands where
    /// the text now lives. Returns how many suggestions were added; zero when
    /// the run is no longer current.
    pub fn register(&mut self, uri: &str, run: RunId, replacements: &[Replacement]) -> usize {
        let Some(entry) = self.documents.get_mut(uri) else {
            tracing::debug!("Discarding fixes for closed document {}", uri);
            return 0;
        };
        let Some(state) = entry.run.as_ref().filter(|state| state.id == run) else {
            tracing::debug!("Discarding fixes from superseded run {} of {}", run, uri);
            return 0;
        };

        let baseline = LineIndex::new(&state.baseline);
        let mut added = Vec::with_capacity(replacements.len());

        for replacement in replacements {
            let mut range = Some(baseline.range_of(replacement.start(), replacement.end()));
            for change in &state.journal {
                range = range.and_then(|r| reanchor(r, change));
            }

            let Some(range) = range else {
                tracing::debug!(
                    "Fix {} was overwritten while its run was in flight",
                    replacement.code()
                );
                continue;
            };

            added.push(Suggestion {
                range,
                message: replacement.description(),
                code: replacement.code().to_string(),
                source: SUGGESTION_SOURCE,
                severity: Severity::Error,
            });
            entry
                .fixes
                .insert(replacement.code().to_string(), replacement.clone());
        }

        let count = added.len();
        entry.suggestions.splice(0..0, added);
        count
    }

    /// Apply an edit of the live text and re-anchor every suggestion.
    pub fn apply_text_change(&mut self, uri: &str, change: TextChange) -> Result<(), RegistryError> {
        let entry = self
            .documents
            .get_mut(uri)
            .ok_or_else(|| RegistryError::NotOpen(uri.to_string()))?;
        if let Some(range) = change.range {
            if range.start > range.end {
                return Err(RegistryError::InvalidRange {
                    start: range.start,
                    end: range.end,
                });
            }
        }

        apply_change(&mut entry.text, &change);

        let before = entry.suggestions.len();
        entry.suggestions = std::mem::take(&mut entry.suggestions)
            .into_iter()
            .filter_map(|mut suggestion| {
                suggestion.range = reanchor(suggestion.range, &change)?;
                Some(suggestion)
            })
            .collect();
        if entry.suggestions.len() != before {
            tracing::debug!(
                "Edit of {} invalidated {} suggestion(s)",
                uri,
                before - entry.suggestions.len()
            );
            entry.prune_fixes();
        }

        if let Some(state) = entry.run.as_mut() {
            state.journal.push(change);
        }

        Ok(())
    }

    pub fn list_suggestions(&self, uri: &str) -> Vec<Suggestion> {
        self.documents
            .get(uri)
            .map(|d| d.suggestions.clone())
            .unwrap_or_default()
    }

    /// The replacement a suggestion was built from.
    pub fn resolve_fix(&self, uri: &str, code: &str) -> Option<&Replacement> {
        self.documents.get(uri)?.fixes.get(code)
    }

    /// The edit that applies fix `code` to the live text.
    ///
    /// Fails as stale when the text under the suggestion no longer matches
    /// what the fix replaces, ignoring whitespace.
    pub fn fix_edit(&self, uri: &str, code: &str) -> Result<TextEdit, RegistryError> {
        let entry = self
            .documents
            .get(uri)
            .ok_or_else(|| RegistryError::NotOpen(uri.to_string()))?;
        let not_found = || RegistryError::NotFound(code.to_string());

        let suggestion = entry
            .suggestions
            .iter()
            .find(|s| s.code == code)
            .ok_or_else(not_found)?;
        let replacement = self.resolve_fix(uri, code).ok_or_else(not_found)?;

        let found = LineIndex::new(&entry.text).slice(suggestion.range);
        if strip_whitespace(found) != strip_whitespace(replacement.old_text()) {
            return Err(RegistryError::Stale {
                code: code.to_string(),
                expected: replacement.old_text().to_string(),
                found: found.to_string(),
            });
        }

        Ok(TextEdit {
            range: suggestion.range,
            new_text: replacement.new_text().to_string(),
        })
    }

    /// Apply fix `code` to the live text, consuming its suggestion.
    ///
    /// Alternatives overlapping the fixed range are invalidated by the edit.
    pub fn apply_fix(&mut self, uri: &str, code: &str) -> Result<TextEdit, RegistryError> {
        let edit = self.fix_edit(uri, code)?;

        if let Some(entry) = self.documents.get_mut(uri) {
            entry.suggestions.retain(|s| s.code != code);
            entry.fixes.remove(code);
        }

        self.apply_text_change(
            uri,
            TextChange {
                range: Some(edit.range),
                text: edit.new_text.clone(),
            },
        )?;

        Ok(edit)
    }
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "file:///work/substring.test.js";
    const SOURCE: &str = "function f(i1, i2) {\n  return s.substring(i1 + 1, i2)\n}\n";

    fn plus() -> usize {
        SOURCE.find('+').unwrap()
    }

    fn fix(code: &str, new_text: &str) -> Replacement {
        Replacement::replace(plus(), plus() + 1, "+", new_text, code)
    }

    fn store_with_run() -> (RegistryStore, RunId) {
        let mut store = RegistryStore::new();
        store.open(URI, SOURCE);
        let run = store.begin_run(URI).unwrap();
        (store, run)
    }

    #[test]
    fn test_register_builds_suggestions() {
        let (mut store, run) = store_with_run();
        assert_eq!(store.register(URI, run, &[fix("1", "*")]), 1);

        let suggestions = store.list_suggestions(URI);
        assert_eq!(suggestions.len(), 1);
        let suggestion = &suggestions[0];
        assert_eq!(suggestion.code, "1");
        assert_eq!(suggestion.message, "Replace: + ==> *");
        assert_eq!(suggestion.source, "paprika");
        assert_eq!(suggestion.range, Range::new(Position::new(1, 24), Position::new(1, 25)));
    }

    #[test]
    fn test_register_prepends_and_accumulates() {
        let (mut store, run) = store_with_run();
        store.register(URI, run, &[fix("1", "*")]);
        store.register(URI, run, &[fix("2", "/"), fix("3", "-")]);

        let codes: Vec<String> = store.list_suggestions(URI).into_iter().map(|s| s.code).collect();
        assert_eq!(codes, vec!["2", "3", "1"]);
    }

    #[test]
    fn test_register_from_superseded_run_is_discarded() {
        let (mut store, old_run) = store_with_run();
        let new_run = store.begin_run(URI).unwrap();
        assert_ne!(old_run, new_run);

        assert_eq!(store.register(URI, old_run, &[fix("1", "*")]), 0);
        assert!(store.list_suggestions(URI).is_empty());
        assert_eq!(store.register(URI, new_run, &[fix("2", "*")]), 1);
    }

    #[test]
    fn test_register_after_close_is_discarded() {
        let (mut store, run) = store_with_run();
        assert!(store.close(URI));
        assert_eq!(store.register(URI, run, &[fix("1", "*")]), 0);
        assert_eq!(store.text(URI), None);
    }

    #[test]
    fn test_register_replays_edits_made_during_run() {
        let (mut store, run) = store_with_run();
        store
            .apply_text_change(
                URI,
                TextChange {
                    range: Some(Range::new(Position::new(0, 0), Position::new(0, 0))),
                    text: "'use strict'\n".to_string(),
                },
            )
            .unwrap();

        store.register(URI, run, &[fix("1", "*")]);
        let suggestion = &store.list_suggestions(URI)[0];
        assert_eq!(suggestion.range.start, Position::new(2, 24));

        let edit = store.fix_edit(URI, "1").unwrap();
        assert_eq!(edit.new_text, "*");
    }

    #[test]
    fn test_register_drops_fix_overwritten_during_run() {
        let (mut store, run) = store_with_run();
        store
            .apply_text_change(
                URI,
                TextChange {
                    range: Some(Range::new(Position::new(1, 0), Position::new(2, 0))),
                    text: String::new(),
                },
            )
            .unwrap();

        assert_eq!(store.register(URI, run, &[fix("1", "*")]), 0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (mut store, run) = store_with_run();
        store.register(URI, run, &[fix("1", "*")]);

        store.reset(URI);
        assert!(store.list_suggestions(URI).is_empty());
        store.reset(URI);
        assert!(store.list_suggestions(URI).is_empty());
        // The run was cleared with the suggestions
        assert_eq!(store.register(URI, run, &[fix("2", "*")]), 0);

        store.reset("file:///never/opened.js");
    }

    #[test]
    fn test_edit_invalidates_overlapping_suggestion() {
        let (mut store, run) = store_with_run();
        store.register(URI, run, &[fix("1", "*")]);

        store
            .apply_text_change(
                URI,
                TextChange {
                    range: Some(Range::new(Position::new(1, 20), Position::new(1, 28))),
                    text: "i1".to_string(),
                },
            )
            .unwrap();

        assert!(store.list_suggestions(URI).is_empty());
        assert!(store.resolve_fix(URI, "1").is_none());
    }

    #[test]
    fn test_change_to_unknown_document_errors() {
        let mut store = RegistryStore::new();
        let result = store.apply_text_change(
            "file:///nope.js",
            TextChange {
                range: None,
                text: String::new(),
            },
        );
        assert_eq!(result, Err(RegistryError::NotOpen("file:///nope.js".to_string())));
    }

    #[test]
    fn test_resolve_fix() {
        let (mut store, run) = store_with_run();
        store.register(URI, run, &[fix("4", "-")]);

        let replacement = store.resolve_fix(URI, "4").unwrap();
        assert_eq!(replacement.new_text(), "-");
        assert!(store.resolve_fix(URI, "5").is_none());
    }

    #[test]
    fn test_fix_edit_detects_stale_text() {
        let (mut store, run) = store_with_run();
        let swap = Replacement::replace(plus() - 3, plus() + 3, "i1 + 1", "1 + i1", "9");
        store.register(URI, run, &[swap]);
        assert!(store.fix_edit(URI, "9").is_ok());

        // Overwrite the live text under the range without re-anchoring
        let entry = store.documents.get_mut(URI).unwrap();
        entry.text = entry.text.replace("i1 + 1", "i1 - 1");
        assert!(matches!(
            store.fix_edit(URI, "9"),
            Err(RegistryError::Stale { .. })
        ));
    }

    #[test]
    fn test_fix_edit_ignores_whitespace() {
        let (mut store, run) = store_with_run();
        let swap = Replacement::replace(plus() - 3, plus() + 3, "i1 + 1", "1 + i1", "9");
        store.register(URI, run, &[swap]);

        let entry = store.documents.get_mut(URI).unwrap();
        entry.text = entry.text.replace("i1 + 1", "i1+ 1 ");
        assert!(store.fix_edit(URI, "9").is_ok());
    }

    #[test]
    fn test_apply_fix_consumes_and_invalidates_alternatives() {
        let (mut store, run) = store_with_run();
        let other = Replacement::replace(
            SOURCE.rfind("i2)").unwrap(),
            SOURCE.rfind("i2)").unwrap() + 2,
            "i2",
            "(i2 + 1)",
            "3",
        );
        store.register(URI, run, &[fix("1", "*"), fix("2", "-"), other]);

        let edit = store.apply_fix(URI, "1").unwrap();
        assert_eq!(edit.new_text, "*");
        assert!(store.text(URI).unwrap().contains("substring(i1 * 1, i2)"));

        // "2" covered the same operator and is gone; "3" moved with the text
        let remaining = store.list_suggestions(URI);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].code, "3");
        assert_eq!(store.fix_edit(URI, "3").unwrap().new_text, "(i2 + 1)");

        assert_eq!(
            store.apply_fix(URI, "1"),
            Err(RegistryError::NotFound("1".to_string()))
        );
    }

    #[test]
    fn test_begin_run_requires_open_document() {
        let mut store = RegistryStore::new();
        assert_eq!(
            store.begin_run(URI),
            Err(RegistryError::NotOpen(URI.to_string()))
        );
    }

    #[test]
    fn test_begin_run_keeps_live_text() {
        let mut store = RegistryStore::new();
        store.open(URI, SOURCE);
        store
            .apply_text_change(
                URI,
                TextChange {
                    range: Some(Range::new(Position::new(0, 0), Position::new(0, 0))),
                    text: "// note\n".to_string(),
                },
            )
            .unwrap();

        let run = store.begin_run(URI).unwrap();
        let live = store.text(URI).unwrap().to_string();
        assert!(live.starts_with("// note\n"));

        // Offsets are relative to the text the run started from
        let plus = live.find('+').unwrap();
        store.register(URI, run, &[Replacement::replace(plus, plus + 1, "+", "*", "1")]);
        assert_eq!(store.list_suggestions(URI)[0].range.start, Position::new(2, 24));
        assert_eq!(store.fix_edit(URI, "1").unwrap().new_text, "*");
    }

    #[test]
    fn test_finish_run_stops_journaling() {
        let (mut store, run) = store_with_run();
        store.register(URI, run, &[fix("1", "*")]);

        let insert_line = TextChange {
            range: Some(Range::new(Position::new(0, 0), Position::new(0, 0))),
            text: "\n".to_string(),
        };
        store.apply_text_change(URI, insert_line.clone()).unwrap();
        assert_eq!(store.documents[URI].run.as_ref().unwrap().journal.len(), 1);

        store.finish_run(URI, run);
        assert!(store.documents[URI].run.is_none());
        for _ in 0..100 {
            store.apply_text_change(URI, insert_line.clone()).unwrap();
        }
        assert!(store.documents[URI].run.is_none());

        // Suggestions of the finished run keep following the text
        assert_eq!(store.list_suggestions(URI)[0].range.start, Position::new(102, 24));
        // Nothing more is accepted from it
        assert_eq!(store.register(URI, run, &[fix("2", "-")]), 0);
    }

    #[test]
    fn test_finish_run_ignores_other_runs() {
        let (mut store, old_run) = store_with_run();
        let new_run = store.begin_run(URI).unwrap();

        store.finish_run(URI, old_run);
        assert_eq!(store.register(URI, new_run, &[fix("1", "*")]), 1);
        store.finish_run("file:///never/opened.js", new_run);
    }

    #[test]
    fn test_reversed_change_range_is_rejected() {
        let (mut store, run) = store_with_run();
        store.register(URI, run, &[fix("1", "*")]);

        let reversed = Range::new(Position::new(1, 0), Position::new(0, 0));
        let result = store.apply_text_change(
            URI,
            TextChange {
                range: Some(reversed),
                text: "x".to_string(),
            },
        );

        assert_eq!(
            result,
            Err(RegistryError::InvalidRange {
                start: reversed.start,
                end: reversed.end,
            })
        );
        assert_eq!(store.text(URI), Some(SOURCE));
        assert_eq!(store.list_suggestions(URI).len(), 1);
    }
}
