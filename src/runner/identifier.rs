//! Resolving a test title to the function it exercises.
//!
//! Test authors annotate each test with the function under test, either as a
//! free function `{mySubstring}` or as a class member `{Calculator.tallyScore}`.
//! The annotation is the last unescaped `{...}` group in the title, so titles
//! like `"should work #fix {unfactorial} (1)"` still resolve.

use serde::Serialize;

/// Structured reference to the function a test targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TestIdentifier {
    /// The raw annotation text, e.g. `Calculator.tallyScore`.
    pub test_code: String,
    pub function_name: String,
    /// Empty when the test targets a free function.
    pub class_name: String,
}

impl TestIdentifier {
    /// Parse the annotation out of a test title.
    ///
    /// Returns `None` when the title carries no `{...}` annotation (or an
    /// empty one); such tests are not attributed to any function.
    pub fn parse(title: &str) -> Option<Self> {
        let open = last_unescaped_brace(title)?;
        let rest = &title[open + 1..];
        let close = rest.find('}')?;
        let code = rest[..close].trim();

        if code.is_empty() {
            return None;
        }

        let (class_name, function_name) = match code.split_once('.') {
            Some((class, function)) => (class.trim(), function.trim()),
            None => ("", code),
        };

        if function_name.is_empty() {
            return None;
        }

        Some(Self {
            test_code: code.to_string(),
            function_name: function_name.to_string(),
            class_name: class_name.to_string(),
        })
    }

    /// Whether the annotation names a class member.
    pub fn is_member(&self) -> bool {
        !self.class_name.is_empty()
    }

    /// File-name safe rendering of the annotation, used in scratch file names.
    pub fn file_stem(&self) -> String {
        self.test_code
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '$' { c } else { '_' })
            .collect()
    }
}

impl std::fmt::Display for TestIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.test_code)
    }
}

/// Byte index of the last `{` not preceded by a backslash.
fn last_unescaped_brace(title: &str) -> Option<usize> {
    let bytes = title.as_bytes();
    title
        .match_indices('{')
        .map(|(idx, _)| idx)
        .filter(|&idx| idx == 0 || bytes[idx - 1] != b'\\')
        .last()
}
