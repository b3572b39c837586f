//! The mutation rule catalogue.
//!
//! Nodes are first classified into a typed [`Site`] (a binary expression with
//! its `left`, `operator` and `right` spans, a declarator with its value, ...).
//! Rules then operate on those typed fields only, so a node that lacks an
//! expected child is reported once, as a [`ShapeError`], instead of every
//! rule guessing at child positions.

use thiserror::Error;
use tree_sitter::Node;

pub const MATH_OPERATORS: &[&str] = &["/", "*", "-", "+", "%"];
pub const COMPARISON_OPERATORS: &[&str] = &["<", "<=", "==", "===", "!=", "!==", ">=", ">"];
pub const LOGICAL_OPERATORS: &[&str] = &["&&", "||"];

/// Prefix operators whose removal still leaves a valid expression.
const REMOVABLE_PREFIXES: &[&str] = &["!", "-", "+", "~"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("{kind} at byte {at} has no `{field}` child")]
    MissingField {
        kind: &'static str,
        field: &'static str,
        at: usize,
    },

    #[error("{kind} at byte {at} does not cover valid source text")]
    OutOfSource { kind: &'static str, at: usize },
}

/// A stretch of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'s> {
    pub start: usize,
    pub end: usize,
    pub text: &'s str,
}

impl<'s> Span<'s> {
    fn of(node: Node<'_>, source: &'s str) -> Result<Self, ShapeError> {
        let range = node.byte_range();
        let text = source.get(range.clone()).ok_or(ShapeError::OutOfSource {
            kind: node.kind(),
            at: range.start,
        })?;
        Ok(Self {
            start: range.start,
            end: range.end,
            text,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryExpr<'s> {
    pub left: Span<'s>,
    pub operator: Span<'s>,
    pub right: Span<'s>,
}

/// A node shape some rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site<'s> {
    Binary(BinaryExpr<'s>),
    Identifier(Span<'s>),
    Declarator { value: Span<'s> },
    ElementAccess { index: Span<'s> },
    Boolean { literal: Span<'s>, value: bool },
    PrefixUnary { operator: Span<'s>, argument: Span<'s> },
}

/// Mutation rule families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    OperatorSubstitution,
    OperandSwap,
    Parenthesize,
    OffByOne,
    Negation,
    PrefixRemoval,
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::OperatorSubstitution => "operator substitution",
            Rule::OperandSwap => "operand swap",
            Rule::Parenthesize => "parenthesization",
            Rule::OffByOne => "off-by-one",
            Rule::Negation => "negation",
            Rule::PrefixRemoval => "prefix removal",
        }
    }
}

/// An edit proposed by a rule, before it is given a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub start: usize,
    pub end: usize,
    pub old_text: String,
    pub new_text: String,
}

impl Candidate {
    fn over(span: Span<'_>, new_text: String) -> Self {
        Self {
            start: span.start,
            end: span.end,
            old_text: span.text.to_string(),
            new_text,
        }
    }
}

fn field<'t>(node: Node<'t>, name: &'static str) -> Result<Node<'t>, ShapeError> {
    node.child_by_field_name(name)
        .ok_or(ShapeError::MissingField {
            kind: node.kind(),
            field: name,
            at: node.start_byte(),
        })
}

/// Classify a node into the site it represents, if any.
pub fn classify<'s>(node: Node<'_>, source: &'s str) -> Result<Option<Site<'s>>, ShapeError> {
    let site = match node.kind() {
        "binary_expression" => Site::Binary(BinaryExpr {
            left: Span::of(field(node, "left")?, source)?,
            operator: Span::of(field(node, "operator")?, source)?,
            right: Span::of(field(node, "right")?, source)?,
        }),
        "identifier" => Site::Identifier(Span::of(node, source)?),
        "variable_declarator" => match node.child_by_field_name("value") {
            Some(value) => Site::Declarator {
                value: Span::of(value, source)?,
            },
            // `let x;` has nothing to adjust
            None => return Ok(None),
        },
        "subscript_expression" => Site::ElementAccess {
            index: Span::of(field(node, "index")?, source)?,
        },
        "true" | "false" => Site::Boolean {
            literal: Span::of(node, source)?,
            value: node.kind() == "true",
        },
        "unary_expression" => {
            let operator = Span::of(field(node, "operator")?, source)?;
            if !REMOVABLE_PREFIXES.contains(&operator.text) {
                return Ok(None);
            }
            Site::PrefixUnary {
                operator,
                argument: Span::of(field(node, "argument")?, source)?,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(site))
}

impl Site<'_> {
    /// Rules that apply to this site, in the order they are tried.
    pub fn rules(&self) -> &'static [Rule] {
        match self {
            Site::Binary(_) => &[
                Rule::OperatorSubstitution,
                Rule::OperandSwap,
                Rule::Parenthesize,
                Rule::OffByOne,
            ],
            Site::Identifier(_) | Site::Declarator { .. } | Site::ElementAccess { .. } => {
                &[Rule::OffByOne]
            }
            Site::Boolean { .. } => &[Rule::Negation],
            Site::PrefixUnary { .. } => &[Rule::PrefixRemoval],
        }
    }

    /// Apply one rule to this site.
    pub fn apply(&self, rule: Rule, source: &str) -> Result<Vec<Candidate>, ShapeError> {
        match (rule, self) {
            (Rule::OperatorSubstitution, Site::Binary(expr)) => Ok(substitute_operator(expr)),
            (Rule::OperandSwap, Site::Binary(expr)) => swap_operands(expr, source).map(|c| vec![c]),
            (Rule::Parenthesize, Site::Binary(expr)) => Ok(vec![
                Candidate::over(expr.left, format!("({})", expr.left.text)),
                Candidate::over(expr.right, format!("({})", expr.right.text)),
            ]),
            (Rule::OffByOne, _) => Ok(self.off_by_one_target().map(off_by_one).unwrap_or_default()),
            (Rule::Negation, Site::Boolean { literal, value }) => {
                let flipped = if *value { "false" } else { "true" };
                Ok(vec![Candidate::over(*literal, flipped.to_string())])
            }
            (Rule::PrefixRemoval, Site::PrefixUnary { operator, .. }) => {
                Ok(vec![Candidate::over(*operator, String::new())])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn off_by_one_target(&self) -> Option<Span<'_>> {
        match self {
            Site::Binary(expr) => Some(expr.right),
            Site::Identifier(span) => Some(*span),
            Site::Declarator { value } => Some(*value),
            Site::ElementAccess { index } => Some(*index),
            Site::Boolean { .. } | Site::PrefixUnary { .. } => None,
        }
    }
}

/// The operator class an operator belongs to.
pub fn operator_class(operator: &str) -> Option<&'static [&'static str]> {
    [MATH_OPERATORS, COMPARISON_OPERATORS, LOGICAL_OPERATORS]
        .into_iter()
        .find(|class| class.contains(&operator))
}

fn substitute_operator(expr: &BinaryExpr<'_>) -> Vec<Candidate> {
    let Some(class) = operator_class(expr.operator.text) else {
        return Vec::new();
    };

    class
        .iter()
        .filter(|op| **op != expr.operator.text)
        .map(|op| Candidate::over(expr.operator, op.to_string()))
        .collect()
}

/// `a + b` becomes `b + a`, keeping the spacing around the operator.
fn swap_operands(expr: &BinaryExpr<'_>, source: &str) -> Result<Candidate, ShapeError> {
    let between = source
        .get(expr.left.end..expr.right.start)
        .ok_or(ShapeError::OutOfSource {
            kind: "binary_expression",
            at: expr.left.start,
        })?;
    let whole = source
        .get(expr.left.start..expr.right.end)
        .ok_or(ShapeError::OutOfSource {
            kind: "binary_expression",
            at: expr.left.start,
        })?;

    Ok(Candidate {
        start: expr.left.start,
        end: expr.right.end,
        old_text: whole.to_string(),
        new_text: format!("{}{}{}", expr.right.text, between, expr.left.text),
    })
}

fn off_by_one(target: Span<'_>) -> Vec<Candidate> {
    vec![
        Candidate::over(target, format!("({} + 1)", target.text)),
        Candidate::over(target, format!("({} - 1)", target.text)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::syntax::SourceFile;

    fn parse(source: &str) -> SourceFile {
        SourceFile::parse(source.to_string(), Language::JavaScript).unwrap()
    }

    /// First node of `kind` in pre-order.
    fn node_of<'a>(file: &'a SourceFile, kind: &str) -> Option<Node<'a>> {
        let mut stack = vec![file.root()];
        while let Some(node) = stack.pop() {
            if node.kind() == kind {
                return Some(node);
            }
            let mut cursor = node.walk();
            let children: Vec<_> = node.named_children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
        None
    }

    /// Classify the first node of `kind` found in `source`.
    fn classify_first(source: &str, kind: &str) -> Vec<Candidate> {
        let file = parse(source);
        let node = node_of(&file, kind).expect("node kind not found");
        let site = classify(node, file.text()).unwrap().unwrap();
        site.rules()
            .iter()
            .flat_map(|rule| site.apply(*rule, file.text()).unwrap())
            .collect()
    }

    fn new_texts(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.new_text.as_str()).collect()
    }

    #[test]
    fn test_math_operator_substitution_is_complete() {
        for op in MATH_OPERATORS {
            let source = format!("x = a {} b", op);
            let candidates = classify_first(&source, "binary_expression");
            let operators: Vec<&str> = candidates
                .iter()
                .filter(|c| c.old_text == *op)
                .map(|c| c.new_text.as_str())
                .collect();

            let mut expected: Vec<&str> = MATH_OPERATORS.iter().copied().filter(|o| o != op).collect();
            let mut actual = operators.clone();
            expected.sort();
            actual.sort();
            assert_eq!(actual, expected, "operator {}", op);
        }
    }

    #[test]
    fn test_comparison_substitution_has_no_duplicates() {
        let candidates = classify_first("x = a < b", "binary_expression");
        let operators: Vec<&str> = candidates
            .iter()
            .filter(|c| c.old_text == "<")
            .map(|c| c.new_text.as_str())
            .collect();

        assert_eq!(operators.len(), COMPARISON_OPERATORS.len() - 1);
        assert!(!operators.contains(&"<"));
    }

    #[test]
    fn test_logical_substitution() {
        let candidates = classify_first("x = a && b", "binary_expression");
        let substituted: Vec<&str> = candidates
            .iter()
            .filter(|c| c.old_text == "&&")
            .map(|c| c.new_text.as_str())
            .collect();
        assert_eq!(substituted, vec!["||"]);
    }

    #[test]
    fn test_binary_expression_candidates_in_rule_order() {
        let candidates = classify_first("x = len - i", "binary_expression");
        let texts = new_texts(&candidates);

        assert_eq!(
            texts,
            vec![
                "/",
                "*",
                "+",
                "%",
                "i - len",
                "(len)",
                "(i)",
                "(i + 1)",
                "(i - 1)",
            ]
        );
    }

    #[test]
    fn test_off_by_one_on_right_operand_is_exactly_two() {
        let candidates = classify_first("y = str.length > idx * 2", "binary_expression");
        let rhs = "idx * 2";
        let off_by_one: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.old_text == rhs && c.new_text.ends_with(" 1)"))
            .collect();

        assert_eq!(off_by_one.len(), 2);
        assert_eq!(off_by_one[0].new_text, "(idx * 2 + 1)");
        assert_eq!(off_by_one[1].new_text, "(idx * 2 - 1)");
    }

    #[test]
    fn test_operator_outside_catalogue_still_swaps() {
        let candidates = classify_first("x = a ?? b", "binary_expression");
        let texts = new_texts(&candidates);
        assert!(texts.contains(&"b ?? a"));
        assert!(!candidates.iter().any(|c| c.old_text == "??"));
    }

    #[test]
    fn test_identifier_off_by_one() {
        let candidates = classify_first("count", "identifier");
        assert_eq!(new_texts(&candidates), vec!["(count + 1)", "(count - 1)"]);
    }

    #[test]
    fn test_declarator_off_by_one() {
        let candidates = classify_first("let total = start", "variable_declarator");
        assert_eq!(new_texts(&candidates), vec!["(start + 1)", "(start - 1)"]);
    }

    #[test]
    fn test_declarator_without_value_is_skipped() {
        let file = parse("let total");
        let node = node_of(&file, "variable_declarator").unwrap();
        assert_eq!(classify(node, file.text()).unwrap(), None);
    }

    #[test]
    fn test_element_access_off_by_one() {
        let candidates = classify_first("v = matrix[len - i]", "subscript_expression");
        assert_eq!(new_texts(&candidates), vec!["(len - i + 1)", "(len - i - 1)"]);
    }

    #[test]
    fn test_boolean_negation() {
        assert_eq!(new_texts(&classify_first("done = true", "true")), vec!["false"]);
        assert_eq!(new_texts(&classify_first("done = false", "false")), vec!["true"]);
    }

    #[test]
    fn test_prefix_removal() {
        let candidates = classify_first("ok = !valid", "unary_expression");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].old_text, "!");
        assert_eq!(candidates[0].new_text, "");
    }

    #[test]
    fn test_typeof_is_not_removed() {
        let file = parse("t = typeof x");
        let node = node_of(&file, "unary_expression").unwrap();
        assert_eq!(classify(node, file.text()).unwrap(), None);
    }

    #[test]
    fn test_operator_class() {
        assert_eq!(operator_class("%"), Some(MATH_OPERATORS));
        assert_eq!(operator_class("!=="), Some(COMPARISON_OPERATORS));
        assert_eq!(operator_class("||"), Some(LOGICAL_OPERATORS));
        assert_eq!(operator_class("instanceof"), None);
    }

    #[test]
    fn test_shape_error_display() {
        let err = ShapeError::MissingField {
            kind: "binary_expression",
            field: "right",
            at: 12,
        };
        assert_eq!(
            err.to_string(),
            "binary_expression at byte 12 has no `right` child"
        );
    }
}
