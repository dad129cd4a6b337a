//! Promise detection engine.
//!
//! Module layout:
//! - `types`: request/mode/span types and the call-scoped symbol registries
//! - `walk`: shared traversal, candidate extraction, span emission
//! - `collector`: fills the registries (one walk plus a worklist)
//! - `heuristic`: syntax-only classifier
//! - `semantic/`: type-inference classifier and its type context
//!
//! Every call to [`analyze`] builds its registries, claimed set and type
//! context from scratch and drops them on return, so concurrent calls on
//! different threads never share state.

pub(crate) mod collector;
pub(crate) mod heuristic;
pub(crate) mod semantic;
pub mod types;
pub(crate) mod walk;

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use tracing::debug;

use crate::source::{parse_unit, ParsedUnit};
use crate::PromiseError;
use self::collector::collect_symbols;
use self::heuristic::HeuristicClassifier;
use self::semantic::context::TypeContext;
use self::semantic::types::ROOT_MODULE;
use self::semantic::SemanticClassifier;
use self::walk::{emit_spans, Cancellation};

pub use types::{AnalysisMode, AnalysisRequest, PromiseSpan, SymbolTable, PROMISE_TOKEN_TYPE};

/// Analyze one unit of source text and return its promise spans, sorted by
/// start offset.
///
/// Only environmental failures (grammar loading) and cancellation are errors.
/// A semantic tier that cannot build its type context yields the heuristic
/// results in hybrid mode and no spans in semantic mode.
pub fn analyze(request: &AnalysisRequest<'_>) -> Result<Vec<PromiseSpan>, PromiseError> {
    let start = Instant::now();
    let unit = parse_unit(request.text, request.path)?;
    let spans = analyze_parsed(&unit, request.mode, request.cancel)?;
    debug!(
        path = %unit.display_path(),
        mode = %request.mode,
        spans = spans.len(),
        elapsed_ms = format_args!("{:.2}", start.elapsed().as_secs_f64() * 1000.0),
        "Analysis complete"
    );
    Ok(spans)
}

/// Same as [`analyze`], for a unit that is already parsed.
pub fn analyze_parsed(
    unit: &ParsedUnit,
    mode: AnalysisMode,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<PromiseSpan>, PromiseError> {
    let cancel = Cancellation::new(cancel);
    let mut found = BTreeSet::new();
    match mode {
        AnalysisMode::Heuristic => run_heuristic(unit, &cancel, &mut found)?,
        AnalysisMode::Semantic => run_semantic(unit, &BTreeSet::new(), &cancel, &mut found)?,
        AnalysisMode::Hybrid => {
            let mut claimed = BTreeSet::new();
            run_heuristic(unit, &cancel, &mut claimed)?;
            run_semantic(unit, &claimed, &cancel, &mut found)?;
            found.extend(claimed);
        }
    }
    Ok(found.into_iter().collect())
}

/// Collect the registries, then emit every heuristic positive.
fn run_heuristic(
    unit: &ParsedUnit,
    cancel: &Cancellation<'_>,
    found: &mut BTreeSet<PromiseSpan>,
) -> Result<(), PromiseError> {
    let root = unit.root();
    let symbols = collect_symbols(root, &unit.source, cancel)?;
    let classifier = HeuristicClassifier::new(&unit.source, &symbols);
    emit_spans(root, &classifier, &BTreeSet::new(), cancel, found)
}

/// Judge every candidate outside `claimed` semantically. Adds nothing when no
/// type context can be built for the unit.
fn run_semantic(
    unit: &ParsedUnit,
    claimed: &BTreeSet<PromiseSpan>,
    cancel: &Cancellation<'_>,
    found: &mut BTreeSet<PromiseSpan>,
) -> Result<(), PromiseError> {
    let ctx = match TypeContext::build(unit) {
        Ok(ctx) => ctx,
        Err(e) => {
            debug!(path = %unit.display_path(), error = %e, "Semantic tier unavailable");
            return Ok(());
        }
    };
    let classifier = SemanticClassifier::new(&ctx);
    emit_spans(ctx.program(ROOT_MODULE), &classifier, claimed, cancel, found)
}

#[cfg(test)]
#[path = "detect_tests.rs"]
mod tests;
