//! Heuristic tier: syntax-only promise rules over the symbol registries.
//!
//! Everything here is keyed off return-statement values and call callees.
//! String contents, comments and unrelated bindings never contribute.

use tree_sitter::Node;

use super::types::SymbolTable;
use super::walk::{own_return_values, Classifier};
use crate::source::{
    class_name, enclosing_class, first_named_child, has_async_marker, node_text, unwrap_expression,
};

/// Name of the promise type and its constructor.
pub(crate) const PROMISE: &str = "Promise";

/// Built-in network fetch, promise-producing by definition.
pub(crate) const FETCH: &str = "fetch";

/// Heuristic strategy bound to one unit's text and registries.
pub(crate) struct HeuristicClassifier<'a> {
    source: &'a str,
    symbols: &'a SymbolTable,
}

impl<'a> HeuristicClassifier<'a> {
    pub(crate) fn new(source: &'a str, symbols: &'a SymbolTable) -> Self {
        Self { source, symbols }
    }
}

impl<'t> Classifier<'t> for HeuristicClassifier<'_> {
    fn is_promise_function(&self, function: Node<'t>) -> bool {
        judge_function(function, self.source, self.symbols)
    }

    fn is_promise_call(&self, call: Node<'t>) -> bool {
        judge_call(call, self.source, self.symbols)
    }
}

// ─── Function-level rule ────────────────────────────────────────────

/// First match wins: `async` marker, declared `Promise` return type, then a
/// promise-producing `return` in the function's own body.
pub(crate) fn judge_function(function: Node, source: &str, symbols: &SymbolTable) -> bool {
    has_async_marker(function)
        || declares_promise_return(function, source)
        || own_return_values(function)
            .into_iter()
            .any(|value| is_promise_expression(value, source, symbols))
}

/// `: Promise` or `: Promise<…>` as the declared return type.
pub(crate) fn declares_promise_return(function: Node, source: &str) -> bool {
    let Some(annotation) = function.child_by_field_name("return_type") else {
        return false;
    };
    let Some(ty) = first_named_child(annotation) else {
        return false;
    };
    match ty.kind() {
        "type_identifier" => node_text(ty, source) == PROMISE,
        "generic_type" => ty
            .child_by_field_name("name")
            .is_some_and(|name| node_text(name, source) == PROMISE),
        _ => false,
    }
}

/// A returned value that is a promise by construction.
fn is_promise_expression(value: Node, source: &str, symbols: &SymbolTable) -> bool {
    let value = unwrap_expression(value);
    match value.kind() {
        "await_expression" => true,
        "new_expression" => value
            .child_by_field_name("constructor")
            .is_some_and(|ctor| ctor.kind() == "identifier" && node_text(ctor, source) == PROMISE),
        "call_expression" => judge_call(value, source, symbols),
        _ => false,
    }
}

// ─── Call-level rule ────────────────────────────────────────────────

pub(crate) fn judge_call(call: Node, source: &str, symbols: &SymbolTable) -> bool {
    let Some(callee) = call.child_by_field_name("function") else {
        return false;
    };
    match callee.kind() {
        "identifier" => {
            let name = node_text(callee, source);
            name == FETCH || symbols.is_promise_function(name)
        }
        "member_expression" => {
            let (Some(receiver), Some(property)) = (
                callee.child_by_field_name("object"),
                callee.child_by_field_name("property"),
            ) else {
                return false;
            };
            let member = node_text(property, source);
            match receiver.kind() {
                "identifier" => {
                    let receiver = node_text(receiver, source);
                    receiver == PROMISE
                        || symbols
                            .receiver_class(receiver)
                            .is_some_and(|class| symbols.is_promise_method(class, member))
                        || symbols.is_promise_member(receiver, member)
                }
                "this" => enclosing_class(call)
                    .and_then(|class| class_name(class, source))
                    .is_some_and(|class| symbols.is_promise_method(class, member)),
                _ => false,
            }
        }
        _ => false,
    }
}

#[cfg(test)]
#[path = "heuristic_tests.rs"]
mod tests;
