//! Syntax index: parse a source file and locate the function under test.
//!
//! Files are re-parsed on every run since they may have changed on disk
//! between runs; nothing here is cached.

mod function;

pub use function::FunctionNode;

use crate::language::Language;
use crate::runner::TestIdentifier;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

#[derive(Debug, Error)]
pub enum SyntaxError {
    #[error("unsupported source file: {0}")]
    UnsupportedFile(PathBuf),

    #[error("failed to load {language} grammar: {source}")]
    Grammar {
        language: Language,
        #[source]
        source: tree_sitter::LanguageError,
    },

    #[error("tree-sitter failed to parse the file")]
    ParseFailed,
}

/// A parsed source file.
pub struct SourceFile {
    text: String,
    tree: Tree,
    language: Language,
}

impl SourceFile {
    /// Parse `text` as the language implied by `path`.
    pub fn parse_path(path: &Path, text: String) -> Result<Self, SyntaxError> {
        let language =
            Language::from_path(path).ok_or_else(|| SyntaxError::UnsupportedFile(path.to_path_buf()))?;
        Self::parse(text, language)
    }

    pub fn parse(text: String, language: Language) -> Result<Self, SyntaxError> {
        let mut parser = Parser::new();
        parser
            .set_language(&language.grammar())
            .map_err(|source| SyntaxError::Grammar { language, source })?;
        let tree = parser.parse(&text, None).ok_or(SyntaxError::ParseFailed)?;

        if tree.root_node().has_error() {
            tracing::warn!("{} source contains syntax errors; continuing with a partial tree", language);
        }

        Ok(Self {
            text,
            tree,
            language,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text covered by `node`.
    pub fn node_text(&self, node: Node<'_>) -> &str {
        self.text.get(node.byte_range()).unwrap_or("")
    }

    /// Locate the function-like declaration a test identifier refers to.
    ///
    /// Free functions resolve to a top-level function declaration, then to an
    /// arrow function bound to a top-level variable. Class members resolve to a
    /// method, then to an arrow-valued property of the named class; if the
    /// class or member is missing, the free-function lookups are tried as a
    /// fallback. Returns `None` when nothing matches.
    pub fn find_function(&self, id: &TestIdentifier) -> Option<FunctionNode<'_>> {
        if id.is_member() {
            if let Some(found) = self.find_member(&id.class_name, &id.function_name) {
                return Some(found);
            }
        }

        self.find_declaration(&id.function_name)
            .or_else(|| self.find_arrow_binding(&id.function_name))
    }

    /// Top-level statements, looking through `export` wrappers.
    fn top_level(&self) -> Vec<Node<'_>> {
        let root = self.root();
        let mut cursor = root.walk();
        root.named_children(&mut cursor)
            .map(|node| {
                if node.kind() == "export_statement" {
                    node.child_by_field_name("declaration").unwrap_or(node)
                } else {
                    node
                }
            })
            .collect()
    }

    fn find_declaration(&self, name: &str) -> Option<FunctionNode<'_>> {
        self.top_level()
            .into_iter()
            .filter(|node| node.kind() == "function_declaration")
            .find(|node| {
                node.child_by_field_name("name")
                    .is_some_and(|n| self.node_text(n) == name)
            })
            .map(FunctionNode::Declaration)
    }

    fn find_arrow_binding(&self, name: &str) -> Option<FunctionNode<'_>> {
        for statement in self.top_level() {
            if !matches!(statement.kind(), "lexical_declaration" | "variable_declaration") {
                continue;
            }

            let mut cursor = statement.walk();
            for declarator in statement.named_children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let named = declarator
                    .child_by_field_name("name")
                    .is_some_and(|n| self.node_text(n) == name);
                let arrow = declarator
                    .child_by_field_name("value")
                    .filter(|v| v.kind() == "arrow_function");

                if let (true, Some(function)) = (named, arrow) {
                    return Some(FunctionNode::ArrowBinding {
                        binding: declarator,
                        function,
                    });
                }
            }
        }
        None
    }

    fn find_member(&self, class_name: &str, member: &str) -> Option<FunctionNode<'_>> {
        let owner = self.top_level().into_iter().find(|node| {
            matches!(node.kind(), "class_declaration" | "abstract_class_declaration")
                && node
                    .child_by_field_name("name")
                    .is_some_and(|n| self.node_text(n) == class_name)
        })?;
        let body = owner.child_by_field_name("body")?;

        let mut cursor = body.walk();
        let members: Vec<Node<'_>> = body.named_children(&mut cursor).collect();

        let method = members.iter().copied().find(|node| {
            node.kind() == "method_definition"
                && node
                    .child_by_field_name("name")
                    .is_some_and(|n| self.member_name(n) == member)
        });
        if let Some(function) = method {
            return Some(FunctionNode::Method { function, owner });
        }

        members.into_iter().find_map(|property| {
            let name_field = match property.kind() {
                "field_definition" => "property",
                "public_field_definition" => "name",
                _ => return None,
            };
            let named = property
                .child_by_field_name(name_field)
                .is_some_and(|n| self.member_name(n) == member);
            let function = property
                .child_by_field_name("value")
                .filter(|v| v.kind() == "arrow_function")?;

            named.then_some(FunctionNode::PropertyArrow {
                property,
                function,
                owner,
            })
        })
    }

    /// Comparable text of a member name: identifiers as written, string and
    /// computed names by their literal contents.
    fn member_name<'a>(&'a self, node: Node<'a>) -> &'a str {
        match node.kind() {
            "string" => strip_quotes(self.node_text(node)),
            "computed_property_name" => {
                let inner = node.named_child(0);
                match inner {
                    Some(inner) if matches!(inner.kind(), "string" | "template_string") => {
                        strip_quotes(self.node_text(inner))
                    }
                    Some(inner) => self.node_text(inner),
                    None => self.node_text(node),
                }
            }
            _ => self.node_text(node),
        }
    }
}

fn strip_quotes(text: &str) -> &str {
    let trimmed = text.trim();
    for quote in ['"', '\'', '`'] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    trimmed
}
