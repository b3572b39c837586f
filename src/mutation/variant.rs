//! Materializing a mutation as a scratch copy of the source file.
//!
//! Variants are written next to the original so relative imports in the
//! tested file keep resolving.

use crate::mutation::Replacement;
use crate::registry::RunId;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VariantError {
    #[error("replacement {start}..{end} is outside the source ({len} bytes)")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("replacement {start}..{end} does not fall on character boundaries")]
    NotCharBoundary { start: usize, end: usize },
}

/// Splice `replacement` into `original`.
pub fn materialize(original: &str, replacement: &Replacement) -> Result<String, VariantError> {
    let (start, end) = (replacement.start(), replacement.end());
    if start > end || end > original.len() {
        return Err(VariantError::OutOfBounds {
            start,
            end,
            len: original.len(),
        });
    }
    if !original.is_char_boundary(start) || !original.is_char_boundary(end) {
        return Err(VariantError::NotCharBoundary { start, end });
    }

    let mut variant =
        String::with_capacity(original.len() - (end - start) + replacement.new_text().len());
    variant.push_str(&original[..start]);
    variant.push_str(replacement.new_text());
    variant.push_str(&original[end..]);
    Ok(variant)
}

/// Which mutation family a scratch file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Expression,
    StatementSwap,
}

/// Scratch path for variant `index` of family `family` (annotation `stem`),
/// colocated with `original`.
///
/// Names carry the run id so a new run never collides with files a previous
/// run of the same document still has in flight. `stem` never contains `-`,
/// so the family index keeps annotations that render to the same stem apart.
pub fn scratch_path(
    original: &Path,
    stem: &str,
    family: usize,
    kind: VariantKind,
    index: usize,
    run: RunId,
) -> PathBuf {
    let extension = original
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("js");
    let tag = match kind {
        VariantKind::Expression => "",
        VariantKind::StatementSwap => "switch",
    };
    let name = format!("tmp{}-{}-{}{}_{}.{}", stem, family, tag, index, run, extension);

    match original.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Owns a scratch file on disk.
///
/// Call [`ScratchFile::remove`] once the variant has been validated. If the
/// guard is dropped first (a panic, an aborted task), the file is removed
/// synchronously instead.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    removed: bool,
}

impl ScratchFile {
    pub async fn create(path: PathBuf, contents: &str) -> std::io::Result<Self> {
        tokio::fs::write(&path, contents).await?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn remove(mut self) -> std::io::Result<()> {
        self.removed = true;
        tokio::fs::remove_file(&self.path).await
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove scratch file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::is_scratch_file;
    use tempfile::TempDir;

    #[test]
    fn test_materialize_splices() {
        let original = "return str.substring(i1 + 1, i2)";
        let replacement = Replacement::replace(24, 25, "+", "*", "1");
        assert_eq!(
            materialize(original, &replacement).unwrap(),
            "return str.substring(i1 * 1, i2)"
        );
    }

    #[test]
    fn test_materialize_round_trip() {
        let original = "let total = start + offset;\nreturn total;\n";
        let cases = [
            Replacement::replace(12, 17, "start", "(start - 1)", "1"),
            Replacement::replace(18, 19, "+", "", "2"),
            Replacement::replace(0, 0, "", "// note\n", "3"),
            Replacement::replace(12, 26, "start + offset", "offset + start", "4"),
        ];

        for replacement in cases {
            assert!(replacement.applies_to(original));
            let variant = materialize(original, &replacement).unwrap();
            let restored = materialize(&variant, &replacement.inverse()).unwrap();
            assert_eq!(restored, original);
        }
    }

    #[test]
    fn test_materialize_rejects_out_of_bounds() {
        let replacement = Replacement::replace(3, 10, "", "x", "1");
        assert_eq!(
            materialize("abc", &replacement),
            Err(VariantError::OutOfBounds {
                start: 3,
                end: 10,
                len: 3
            })
        );
    }

    #[test]
    fn test_materialize_rejects_split_character() {
        let replacement = Replacement::replace(1, 2, "", "x", "1");
        assert_eq!(
            materialize("é", &replacement),
            Err(VariantError::NotCharBoundary { start: 1, end: 2 })
        );
    }

    #[test]
    fn test_scratch_path_names() {
        let original = Path::new("/work/test/substring.test.js");

        let expression =
            scratch_path(original, "mySubstring", 0, VariantKind::Expression, 3, RunId(7));
        assert_eq!(expression, Path::new("/work/test/tmpmySubstring-0-3_7.js"));

        let swap = scratch_path(
            original,
            "Calculator_tallyScore",
            1,
            VariantKind::StatementSwap,
            0,
            RunId(2),
        );
        assert_eq!(swap, Path::new("/work/test/tmpCalculator_tallyScore-1-switch0_2.js"));

        assert!(is_scratch_file(&expression));
        assert!(is_scratch_file(&swap));
    }

    #[test]
    fn test_scratch_path_keeps_families_with_equal_stems_apart() {
        // `{A.b}` and `{A_b}` both render as `A_b`
        let original = Path::new("/work/a.test.js");
        let first = scratch_path(original, "A_b", 0, VariantKind::Expression, 10, RunId(1));
        let second = scratch_path(original, "A_b", 1, VariantKind::Expression, 10, RunId(1));
        assert_ne!(first, second);

        // Family and index digits never run together
        let eleventh = scratch_path(original, "f", 11, VariantKind::Expression, 0, RunId(1));
        let first_tenth = scratch_path(original, "f", 1, VariantKind::Expression, 10, RunId(1));
        assert_ne!(eleventh, first_tenth);
    }

    #[test]
    fn test_scratch_path_defaults_to_js() {
        let path = scratch_path(Path::new("dir/noext"), "f", 0, VariantKind::Expression, 1, RunId(1));
        assert_eq!(path, Path::new("dir/tmpf-0-1_1.js"));
    }

    #[tokio::test]
    async fn test_scratch_file_remove() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tmpf0_1.js");

        let scratch = ScratchFile::create(path.clone(), "1 + 1").await.unwrap();
        assert_eq!(std::fs::read_to_string(scratch.path()).unwrap(), "1 + 1");

        scratch.remove().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_scratch_file_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tmpf1_1.js");

        {
            let _scratch = ScratchFile::create(path.clone(), "x").await.unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
