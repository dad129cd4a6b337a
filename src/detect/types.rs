//! Core data types for promise detection.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

/// The single classification label attached to every reported span.
pub const PROMISE_TOKEN_TYPE: &str = "promise";

// ─── Analysis Mode ───────────────────────────────────────────────────

/// Strategy selector supplied by the caller.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Syntax-only rules, no type inference.
    Heuristic,
    /// Type inference only.
    Semantic,
    /// Heuristic first, type inference for whatever it left unclaimed.
    #[default]
    Hybrid,
}

impl AnalysisMode {
    pub const ALL: [AnalysisMode; 3] = [Self::Heuristic, Self::Semantic, Self::Hybrid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heuristic" | "heuristics" | "syntax" => Ok(Self::Heuristic),
            "semantic" | "typed" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!(
                "Unknown analysis mode: '{}' (expected heuristic, semantic or hybrid)",
                other
            )),
        }
    }
}

// ─── Spans ───────────────────────────────────────────────────────────

/// Half-open `[start, end)` byte range of a promise-producing identifier.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseSpan {
    pub start: usize,
    pub end: usize,
}

impl PromiseSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub(crate) fn of(node: Node) -> Self {
        Self::new(node.start_byte(), node.end_byte())
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// The identifier text this span covers.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }

    /// 1-based line and character column of the span start.
    pub fn position(&self, source: &str) -> (usize, usize) {
        let prefix = source.get(..self.start).unwrap_or(source);
        let line = prefix.matches('\n').count() + 1;
        let line_start = prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = prefix[line_start..].chars().count() + 1;
        (line, column)
    }
}

// ─── Request ─────────────────────────────────────────────────────────

/// Inbound contract of the core: text, identity and mode.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub text: &'a str,
    /// File identity; only used to pick a grammar and resolve imports.
    pub path: Option<&'a Path>,
    pub mode: AnalysisMode,
    /// Raised by the caller to abandon the analysis at the next safe point.
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> AnalysisRequest<'a> {
    pub fn new(text: &'a str, mode: AnalysisMode) -> Self {
        Self {
            text,
            path: None,
            mode,
            cancel: None,
        }
    }

    pub fn with_path(mut self, path: &'a Path) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_cancellation(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }
}

// ─── Symbol registries ───────────────────────────────────────────────

/// Call-scoped registries built by the symbol collector.
///
/// Fully populated before any span is emitted, then only read.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SymbolTable {
    /// Bare names of promise-returning functions.
    pub functions: HashSet<String>,
    /// Class name → promise-returning method names.
    pub methods: HashMap<String, HashSet<String>>,
    /// Variable → class it was constructed from (`v = new C()`).
    pub instances: HashMap<String, String>,
    /// Object-literal variable → promise-returning member names.
    pub object_literals: HashMap<String, HashSet<String>>,
}

impl SymbolTable {
    pub fn is_promise_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    pub fn is_promise_method(&self, class: &str, method: &str) -> bool {
        self.methods.get(class).is_some_and(|m| m.contains(method))
    }

    pub fn instance_class(&self, variable: &str) -> Option<&str> {
        self.instances.get(variable).map(String::as_str)
    }

    pub fn is_promise_member(&self, object: &str, member: &str) -> bool {
        self.object_literals.get(object).is_some_and(|m| m.contains(member))
    }

    /// Resolve a receiver to a class in the method registry: the receiver is the
    /// class itself (static call) or an instance bound through `new`.
    pub fn receiver_class<'a>(&'a self, receiver: &'a str) -> Option<&'a str> {
        if self.methods.contains_key(receiver) {
            return Some(receiver);
        }
        self.instance_class(receiver)
    }

    pub(crate) fn add_function(&mut self, name: &str) -> bool {
        !self.functions.contains(name) && self.functions.insert(name.to_string())
    }

    pub(crate) fn add_method(&mut self, class: &str, method: &str) -> bool {
        if self.is_promise_method(class, method) {
            return false;
        }
        self.methods
            .entry(class.to_string())
            .or_default()
            .insert(method.to_string())
    }

    /// Later bindings of the same variable replace earlier ones.
    pub(crate) fn bind_instance(&mut self, variable: &str, class: &str) {
        self.instances.insert(variable.to_string(), class.to_string());
    }

    pub(crate) fn add_object_member(&mut self, object: &str, member: &str) -> bool {
        if self.is_promise_member(object, member) {
            return false;
        }
        self.object_literals
            .entry(object.to_string())
            .or_default()
            .insert(member.to_string())
    }

    /// Total number of registered entries across all registries.
    pub fn len(&self) -> usize {
        self.functions.len()
            + self.methods.values().map(HashSet::len).sum::<usize>()
            + self.instances.len()
            + self.object_literals.values().map(HashSet::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
