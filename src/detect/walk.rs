//! Shared traversal: one depth-first walk, candidate extraction, span emission.
//!
//! The collector and every classifier pass go through [`walk_tree`], so they
//! always agree on which nodes exist and in which order they are seen.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use tree_sitter::Node;

use super::types::PromiseSpan;
use crate::source::{first_named_child, is_class_like, is_field, is_function_like};
use crate::PromiseError;

// ─── Cancellation ───────────────────────────────────────────────────

/// Caller-owned cancellation flag, polled between completed subtrees.
#[derive(Clone, Copy, Default)]
pub(crate) struct Cancellation<'a>(Option<&'a AtomicBool>);

impl<'a> Cancellation<'a> {
    pub(crate) fn new(flag: Option<&'a AtomicBool>) -> Self {
        Self(flag)
    }

    pub(crate) fn check(&self) -> Result<(), PromiseError> {
        match self.0 {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(PromiseError::Cancelled),
            _ => Ok(()),
        }
    }
}

// ─── Traversal ──────────────────────────────────────────────────────

/// Pre-order walk over every node under `root`.
///
/// Cancellation is checked before each top-level statement and once at the end;
/// a subtree that has started is always finished.
pub(crate) fn walk_tree<'t>(
    root: Node<'t>,
    cancel: &Cancellation<'_>,
    mut visit: impl FnMut(Node<'t>),
) -> Result<(), PromiseError> {
    visit(root);
    let mut cursor = root.walk();
    for top in root.children(&mut cursor) {
        cancel.check()?;
        walk_subtree(top, &mut visit);
    }
    cancel.check()
}

fn walk_subtree<'t>(node: Node<'t>, visit: &mut impl FnMut(Node<'t>)) {
    // Cursor rooted at `node` never climbs above it
    let mut cursor = node.walk();
    loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

/// Nodes that open a new `return` scope (or hold methods that do).
fn is_return_boundary(node: Node) -> bool {
    is_function_like(node) || is_class_like(node)
}

/// Values of the `return` statements that belong to `function` itself.
///
/// Nested functions, arrows, methods and classes are skipped entirely. A
/// concise arrow body counts as one implicit return.
pub(crate) fn own_return_values(function: Node) -> Vec<Node> {
    let Some(body) = function.child_by_field_name("body") else {
        return Vec::new();
    };
    if body.kind() != "statement_block" {
        return vec![body];
    }
    let mut values = Vec::new();
    collect_returns(body, &mut values);
    values
}

fn collect_returns<'t>(node: Node<'t>, values: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if is_return_boundary(child) {
            continue;
        }
        if child.kind() == "return_statement" {
            if let Some(value) = first_named_child(child) {
                values.push(value);
            }
            continue;
        }
        collect_returns(child, values);
    }
}

// ─── Candidates ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CandidateKind {
    Function,
    Call,
}

/// A definition or call node together with the identifier to report.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'t> {
    pub kind: CandidateKind,
    pub node: Node<'t>,
    pub name: Node<'t>,
}

impl Candidate<'_> {
    pub(crate) fn span(&self) -> PromiseSpan {
        PromiseSpan::of(self.name)
    }
}

/// Classify `node` as a candidate, if it is one and has a reportable name.
pub(crate) fn candidate_at(node: Node) -> Option<Candidate> {
    if node.kind() == "call_expression" {
        return call_name(node).map(|name| Candidate {
            kind: CandidateKind::Call,
            node,
            name,
        });
    }
    if is_function_like(node) {
        return function_name(node).map(|name| Candidate {
            kind: CandidateKind::Function,
            node,
            name,
        });
    }
    None
}

/// Callee identifier, or the accessed property of a member callee.
pub(crate) fn call_name(call: Node) -> Option<Node> {
    let callee = call.child_by_field_name("function")?;
    match callee.kind() {
        "identifier" => Some(callee),
        "member_expression" => callee
            .child_by_field_name("property")
            .filter(|p| matches!(p.kind(), "property_identifier" | "private_property_identifier")),
        _ => None,
    }
}

/// The identifier a function-like node is known by.
pub(crate) fn function_name(function: Node) -> Option<Node> {
    match function.kind() {
        "function_declaration" | "generator_function_declaration" => {
            function.child_by_field_name("name")
        }
        "method_definition" => function
            .child_by_field_name("name")
            .filter(|n| n.kind() != "computed_property_name"),
        _ => binding_site(function)
            .and_then(|site| site.name)
            .or_else(|| function.child_by_field_name("name")),
    }
}

/// Where a function/arrow expression's value ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingKind {
    /// `const f = …` or `f = …`
    Variable,
    /// `{ key: … }`
    Property,
    /// `class C { field = … }`
    ClassField,
    /// `obj.member = …`
    MemberAssignment,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BindingSite<'t> {
    pub kind: BindingKind,
    /// The declarator / pair / field / assignment node.
    pub site: Node<'t>,
    pub name: Option<Node<'t>>,
}

/// Find the declaration that binds a function/arrow expression to a name.
pub(crate) fn binding_site(expr: Node) -> Option<BindingSite> {
    let mut child = expr;
    let mut parent = expr.parent()?;
    while matches!(
        parent.kind(),
        "parenthesized_expression" | "as_expression" | "satisfies_expression" | "non_null_expression"
    ) {
        child = parent;
        parent = parent.parent()?;
    }
    match parent.kind() {
        "variable_declarator" if is_field(parent, "value", child) => Some(BindingSite {
            kind: BindingKind::Variable,
            site: parent,
            name: parent
                .child_by_field_name("name")
                .filter(|n| n.kind() == "identifier"),
        }),
        "pair" if is_field(parent, "value", child) => Some(BindingSite {
            kind: BindingKind::Property,
            site: parent,
            name: parent
                .child_by_field_name("key")
                .filter(|k| k.kind() != "computed_property_name"),
        }),
        "public_field_definition" | "field_definition" if is_field(parent, "value", child) => {
            Some(BindingSite {
                kind: BindingKind::ClassField,
                site: parent,
                name: parent
                    .child_by_field_name("name")
                    .or_else(|| parent.child_by_field_name("property"))
                    .filter(|n| n.kind() != "computed_property_name"),
            })
        }
        "assignment_expression" if is_field(parent, "right", child) => {
            let left = parent.child_by_field_name("left")?;
            match left.kind() {
                "identifier" => Some(BindingSite {
                    kind: BindingKind::Variable,
                    site: parent,
                    name: Some(left),
                }),
                "member_expression" => Some(BindingSite {
                    kind: BindingKind::MemberAssignment,
                    site: parent,
                    name: left.child_by_field_name("property"),
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

// ─── Classification strategy ────────────────────────────────────────

/// Judges a single candidate node. Heuristic and semantic tiers implement this;
/// hybrid mode composes two instances through [`emit_spans`].
pub(crate) trait Classifier<'t> {
    fn is_promise_function(&self, function: Node<'t>) -> bool;

    fn is_promise_call(&self, call: Node<'t>) -> bool;

    fn classify(&self, candidate: &Candidate<'t>) -> bool {
        match candidate.kind {
            CandidateKind::Function => self.is_promise_function(candidate.node),
            CandidateKind::Call => self.is_promise_call(candidate.node),
        }
    }
}

/// Walk the tree and add the span of every positive candidate to `found`.
///
/// Candidates whose span is already in `claimed` (or in `found`) are not
/// judged again, so a span is reported at most once.
pub(crate) fn emit_spans<'t>(
    root: Node<'t>,
    classifier: &dyn Classifier<'t>,
    claimed: &BTreeSet<PromiseSpan>,
    cancel: &Cancellation<'_>,
    found: &mut BTreeSet<PromiseSpan>,
) -> Result<(), PromiseError> {
    walk_tree(root, cancel, |node| {
        let Some(candidate) = candidate_at(node) else {
            return;
        };
        let span = candidate.span();
        if claimed.contains(&span) || found.contains(&span) {
            return;
        }
        if classifier.classify(&candidate) {
            found.insert(span);
        }
    })
}
