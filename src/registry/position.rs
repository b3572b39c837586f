//! Line/character positions and the range arithmetic behind re-anchoring.
//!
//! Characters are counted in Unicode scalar values, lines are split on `\n`.

use serde::{Deserialize, Serialize};

/// Zero-based position in a document.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Half-open range `start..end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// An edit of the live document. Without a range the whole text is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChange {
    #[serde(default)]
    pub range: Option<Range>,
    pub text: String,
}

/// A fix ready to be applied by an editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

/// Byte offset <-> position conversion for one text.
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(idx, _)| idx + 1));
        Self { text, line_starts }
    }

    fn line_text(&self, line: usize) -> &'a str {
        let start = self.line_starts[line];
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        &self.text[start..end]
    }

    /// Position of a byte offset. Offsets past the end clamp to the end, and
    /// offsets inside a multi-byte character round down to it.
    pub fn position_of(&self, offset: usize) -> Position {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }

        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let character = self.text[self.line_starts[line]..offset].chars().count();
        Position::new(line as u32, character as u32)
    }

    /// Byte offset of a position, clamped to the end of its line (or of the
    /// text when the line does not exist).
    pub fn offset_of(&self, position: Position) -> usize {
        let line = position.line as usize;
        if line >= self.line_starts.len() {
            return self.text.len();
        }

        let text = self.line_text(line);
        let within = text
            .char_indices()
            .nth(position.character as usize)
            .map(|(idx, _)| idx)
            .unwrap_or(text.len());
        self.line_starts[line] + within
    }

    pub fn range_of(&self, start: usize, end: usize) -> Range {
        Range::new(self.position_of(start), self.position_of(end))
    }

    /// Text covered by `range`.
    pub fn slice(&self, range: Range) -> &'a str {
        let start = self.offset_of(range.start);
        let end = self.offset_of(range.end).max(start);
        &self.text[start..end]
    }
}

/// Apply `change` to `text` in place.
pub fn apply_change(text: &mut String, change: &TextChange) {
    match change.range {
        None => *text = change.text.clone(),
        Some(range) => {
            let index = LineIndex::new(text);
            let start = index.offset_of(range.start);
            let end = index.offset_of(range.end).max(start);
            text.replace_range(start..end, &change.text);
        }
    }
}

/// Where `range` lands after `change`.
///
/// Ranges entirely after the edit shift by the lines and characters the edit
/// removed and inserted; ranges entirely before it are untouched. A range the
/// edit overlaps, or any range when the whole document is replaced, no longer
/// exists and yields `None`.
pub fn reanchor(range: Range, change: &TextChange) -> Option<Range> {
    let edited = change.range?;

    if edited.end <= range.start {
        Some(Range::new(
            shift(range.start, edited, &change.text),
            shift(range.end, edited, &change.text),
        ))
    } else if edited.start >= range.end {
        Some(range)
    } else {
        None
    }
}

/// Move `pos`, which lies at or after `edited.end`, across the edit.
fn shift(pos: Position, edited: Range, inserted: &str) -> Position {
    let new_lines = inserted.matches('\n').count() as u32;
    let last_line_len = inserted
        .rsplit('\n')
        .next()
        .map(|tail| tail.chars().count())
        .unwrap_or(0) as u32;

    if pos.line == edited.end.line {
        let base = if new_lines == 0 {
            edited.start.character + last_line_len
        } else {
            last_line_len
        };
        Position::new(
            edited.start.line + new_lines,
            base + pos.character.saturating_sub(edited.end.character),
        )
    } else {
        Position::new(
            pos.line - (edited.end.line - edited.start.line) + new_lines,
            pos.character,
        )
    }
}
