use std::ops::Range;
use tree_sitter::Node;

/// A function-like declaration under test.
///
/// Every variant exposes the same surface (`node`, `range`, `body`,
/// `owner_class_name`) so callers never switch on node kinds themselves.
#[derive(Debug, Clone, Copy)]
pub enum FunctionNode<'t> {
    /// `function name(...) { ... }`
    Declaration(Node<'t>),
    /// `const name = (...) => ...`
    ArrowBinding {
        binding: Node<'t>,
        function: Node<'t>,
    },
    /// `class Owner { name(...) { ... } }`
    Method { function: Node<'t>, owner: Node<'t> },
    /// `class Owner { name = (...) => ... }`
    PropertyArrow {
        property: Node<'t>,
        function: Node<'t>,
        owner: Node<'t>,
    },
}

impl<'t> FunctionNode<'t> {
    /// The function-like node itself; mutation walks its descendants.
    pub fn node(&self) -> Node<'t> {
        match self {
            FunctionNode::Declaration(node) => *node,
            FunctionNode::ArrowBinding { function, .. }
            | FunctionNode::Method { function, .. }
            | FunctionNode::PropertyArrow { function, .. } => *function,
        }
    }

    /// Byte range of the function in the source text.
    pub fn range(&self) -> Range<usize> {
        self.node().byte_range()
    }

    /// Name of the enclosing class for members, `None` for free functions.
    pub fn owner_class_name<'s>(&self, source: &'s str) -> Option<&'s str> {
        match self {
            FunctionNode::Method { owner, .. } | FunctionNode::PropertyArrow { owner, .. } => {
                let name = owner.child_by_field_name("name")?;
                source.get(name.byte_range())
            }
            FunctionNode::Declaration(_) | FunctionNode::ArrowBinding { .. } => None,
        }
    }

    /// The node carrying the declared name (the declaration, binding or property).
    pub fn declaration(&self) -> Node<'t> {
        match self {
            FunctionNode::Declaration(node) => *node,
            FunctionNode::ArrowBinding { binding, .. } => *binding,
            FunctionNode::Method { function, .. } => *function,
            FunctionNode::PropertyArrow { property, .. } => *property,
        }
    }

    /// Source text of the function.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.range()).unwrap_or("")
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            FunctionNode::Declaration(_) => "function declaration",
            FunctionNode::ArrowBinding { .. } => "arrow function binding",
            FunctionNode::Method { .. } => "method",
            FunctionNode::PropertyArrow { .. } => "arrow function property",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::language::Language;
    use crate::runner::TestIdentifier;
    use crate::syntax::SourceFile;

    #[test]
    fn test_declaration_spans_name() {
        let source = "const total = (a, b) => a + b\n";
        let file = SourceFile::parse(source.to_string(), Language::JavaScript).unwrap();
        let id = TestIdentifier::parse("{total}").unwrap();
        let found = file.find_function(&id).unwrap();

        assert_eq!(file.node_text(found.declaration()), "total = (a, b) => a + b");
        assert_eq!(found.text(source), "(a, b) => a + b");
        assert_eq!(found.kind_name(), "arrow function binding");
        assert_eq!(file.node_text(found.node()), "(a, b) => a + b");
    }

    #[test]
    fn test_range_matches_text() {
        let source = "function f(x) {\n  return x\n}\n";
        let file = SourceFile::parse(source.to_string(), Language::JavaScript).unwrap();
        let found = file
            .find_function(&TestIdentifier::parse("{f}").unwrap())
            .unwrap();

        assert_eq!(found.range(), 0..source.trim_end().len());
        assert_eq!(found.kind_name(), "function declaration");
    }
}
