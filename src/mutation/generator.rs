//! Candidate generation for a single function.

use crate::mutation::rules::{classify, Rule};
use crate::mutation::variant::materialize;
use crate::mutation::{CodeAllocator, Replacement};
use crate::syntax::FunctionNode;
use tree_sitter::Node;

/// A variant produced by swapping two adjacent lines of a function.
#[derive(Debug, Clone)]
pub struct StatementSwap {
    /// Full file text with the two lines swapped.
    pub variant_text: String,
    /// The two-line edit that produces `variant_text`.
    pub replacement: Replacement,
}

/// Enumerates mutations of a function, handing out codes as it goes.
#[derive(Debug, Clone)]
pub struct MutationGenerator {
    codes: CodeAllocator,
}

impl MutationGenerator {
    pub fn new(codes: CodeAllocator) -> Self {
        Self { codes }
    }

    /// Apply every rule of the catalogue to every node of `function`.
    ///
    /// Nodes are visited depth first in pre-order; within a node, rules run in
    /// catalogue order. A node that does not have the shape its kind promises
    /// is logged and skipped, keeping everything collected so far.
    pub fn generate(&self, function: &FunctionNode<'_>, source: &str) -> Vec<Replacement> {
        let mut replacements = Vec::new();

        for node in preorder(function.node()) {
            let site = match classify(node, source) {
                Ok(Some(site)) => site,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Skipping malformed node: {}", e);
                    continue;
                }
            };

            for rule in site.rules() {
                match site.apply(*rule, source) {
                    Ok(candidates) => {
                        replacements.extend(candidates.into_iter().map(|c| {
                            Replacement::replace(
                                c.start,
                                c.end,
                                c.old_text,
                                c.new_text,
                                self.codes.next_code(),
                            )
                        }));
                    }
                    Err(e) => warn_rule_failure(*rule, &e),
                }
            }
        }

        tracing::debug!(
            "Generated {} mutations for {} at bytes {:?}",
            replacements.len(),
            function.kind_name(),
            function.range()
        );

        replacements
    }

    /// Swap every pair of adjacent lines of `function`.
    ///
    /// Pairs of identical lines are skipped since swapping them changes nothing.
    pub fn statement_swaps(&self, function: &FunctionNode<'_>, source: &str) -> Vec<StatementSwap> {
        let range = function.range();
        let Some(text) = source.get(range.clone()) else {
            tracing::warn!("Function range {:?} is outside the source", range);
            return Vec::new();
        };

        let mut lines = Vec::new();
        let mut offset = range.start;
        for line in text.split('\n') {
            lines.push((offset, line));
            offset += line.len() + 1;
        }

        let mut swaps = Vec::new();
        for pair in lines.windows(2) {
            let (start, first) = pair[0];
            let (second_start, second) = pair[1];
            if first == second {
                continue;
            }

            let end = second_start + second.len();
            let replacement = Replacement::replace(
                start,
                end,
                format!("{}\n{}", first, second),
                format!("{}\n{}", second, first),
                self.codes.next_code(),
            );

            match materialize(source, &replacement) {
                Ok(variant_text) => swaps.push(StatementSwap {
                    variant_text,
                    replacement,
                }),
                Err(e) => tracing::warn!("Skipping line swap at byte {}: {}", start, e),
            }
        }

        swaps
    }
}

fn warn_rule_failure(rule: Rule, error: &crate::mutation::rules::ShapeError) {
    tracing::warn!("{} failed: {}", rule.name(), error);
}

/// Named nodes under `root` (inclusive), depth first, pre-order.
fn preorder(root: Node<'_>) -> Vec<Node<'_>> {
    let mut ordered = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if node.is_missing() {
            continue;
        }
        ordered.push(node);

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    ordered
}
