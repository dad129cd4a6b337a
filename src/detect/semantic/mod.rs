//! Semantic tier: promise detection backed by type inference.
//!
//! Module layout:
//! - `types`: type model and resolution errors
//! - `context`: the analyzed unit plus reachable relative imports, scope lookup
//! - `infer`: demand-driven inference over the context

pub(crate) mod context;
pub(crate) mod infer;
pub(crate) mod types;

use tracing::trace;
use tree_sitter::Node;

use self::context::TypeContext;
use self::infer::Inference;
use self::types::{Located, Resolved, ROOT_MODULE};
use super::walk::Classifier;
use crate::source::has_async_marker;

/// Semantic strategy over one type context. Every candidate it is asked about
/// belongs to the root module of that context.
pub(crate) struct SemanticClassifier<'c> {
    inference: Inference<'c>,
}

impl<'c> SemanticClassifier<'c> {
    pub(crate) fn new(ctx: &'c TypeContext<'c>) -> Self {
        Self {
            inference: Inference::new(ctx),
        }
    }

    /// Resolution failures are a negative verdict for this node only.
    fn judge(&self, node: Node<'c>, verdict: Resolved<bool>) -> bool {
        match verdict {
            Ok(positive) => positive,
            Err(e) => {
                trace!(
                    kind = node.kind(),
                    offset = node.start_byte(),
                    reason = %e,
                    "Semantic resolution failed"
                );
                false
            }
        }
    }
}

impl<'c> Classifier<'c> for SemanticClassifier<'c> {
    fn is_promise_function(&self, function: Node<'c>) -> bool {
        if has_async_marker(function) {
            return true;
        }
        let verdict = self
            .inference
            .returns_promise(Located::new(function, ROOT_MODULE));
        self.judge(function, verdict)
    }

    fn is_promise_call(&self, call: Node<'c>) -> bool {
        let verdict = self
            .inference
            .call_yields_promise(Located::new(call, ROOT_MODULE));
        self.judge(call, verdict)
    }
}

#[cfg(test)]
#[path = "semantic_tests.rs"]
mod tests;
