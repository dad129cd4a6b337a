//! Type model for the semantic tier.
//!
//! Types borrow syntax nodes from the type context (`'c`) so that named
//! references and function signatures can be resolved lazily, in the scope
//! where they were written.

use thiserror::Error;
use tree_sitter::Node;

/// Index of a module inside a [`super::context::TypeContext`].
pub(crate) type ModuleId = usize;

/// The analyzed unit is always module 0; imports follow in load order.
pub(crate) const ROOT_MODULE: ModuleId = 0;

/// Upper bound on nested inference steps for a single judgement.
pub(crate) const MAX_DEPTH: u32 = 32;

/// A syntax node together with the module it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Located<'c> {
    pub node: Node<'c>,
    pub module: ModuleId,
}

impl<'c> Located<'c> {
    pub(crate) fn new(node: Node<'c>, module: ModuleId) -> Self {
        Self { node, module }
    }

    /// Same module, different node.
    pub(crate) fn with(self, node: Node<'c>) -> Self {
        Self { node, module: self.module }
    }

    pub(crate) fn key(&self) -> (ModuleId, usize) {
        (self.module, self.node.id())
    }
}

// ─── Types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) enum TsType<'c> {
    /// `any`, `unknown`, or anything inference does not model.
    Unknown,
    Primitive(&'static str),
    /// `Promise<T>` / `PromiseLike<T>`.
    Promise(Box<TsType<'c>>),
    /// A type name, resolved on demand in the scope of `at`.
    Named { name: String, at: Located<'c> },
    /// Union; intersections are folded in member-wise.
    Union(Vec<TsType<'c>>),
    Object(Vec<Member<'c>>),
    Function(Signature<'c>),
    /// The static side of a class.
    ClassValue(Located<'c>),
    /// An instance of a class.
    Instance(Located<'c>),
    /// `import * as ns from './module'`
    Namespace(ModuleId),
    Builtin(Builtin),
}

#[derive(Debug, Clone)]
pub(crate) struct Member<'c> {
    pub name: String,
    pub ty: TsType<'c>,
}

impl<'c> Member<'c> {
    pub(crate) fn new(name: impl Into<String>, ty: TsType<'c>) -> Self {
        Self { name: name.into(), ty }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Signature<'c> {
    /// Return type known up front (annotations, built-ins).
    Declared(Box<TsType<'c>>),
    /// Return type inferred from a function-like node when first asked for.
    Inferred(Located<'c>),
}

/// The slice of the standard library the inference engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    /// The global `Promise` value.
    PromiseConstructor,
    /// The global `fetch` function.
    Fetch,
    /// `Response`, as resolved by `fetch`.
    Response,
}

impl Builtin {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::PromiseConstructor => "PromiseConstructor",
            Self::Fetch => "fetch",
            Self::Response => "Response",
        }
    }
}

impl<'c> TsType<'c> {
    pub(crate) fn promise_of(inner: TsType<'c>) -> Self {
        TsType::Promise(Box::new(inner))
    }

    pub(crate) fn returning(ty: TsType<'c>) -> Self {
        TsType::Function(Signature::Declared(Box::new(ty)))
    }

    /// Collapse a list of alternatives: none is `void`, one is itself.
    pub(crate) fn union_of(mut members: Vec<TsType<'c>>) -> Self {
        match members.len() {
            0 => TsType::Primitive("void"),
            1 => members.remove(0),
            _ => TsType::Union(members),
        }
    }

    /// Short name for diagnostics.
    pub(crate) fn describe(&self) -> String {
        match self {
            TsType::Unknown => "unknown".to_string(),
            TsType::Primitive(p) => p.to_string(),
            TsType::Promise(_) => "Promise".to_string(),
            TsType::Named { name, .. } => name.clone(),
            TsType::Union(_) => "union".to_string(),
            TsType::Object(_) => "object".to_string(),
            TsType::Function(_) => "function".to_string(),
            TsType::ClassValue(_) => "class".to_string(),
            TsType::Instance(_) => "instance".to_string(),
            TsType::Namespace(_) => "namespace".to_string(),
            TsType::Builtin(b) => b.name().to_string(),
        }
    }
}

// ─── Resolution errors ───────────────────────────────────────────────

/// Why inference gave up on a node. Always absorbed as a negative verdict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResolveError {
    #[error("unresolved symbol '{0}'")]
    UnresolvedSymbol(String),

    #[error("unresolved type '{0}'")]
    UnresolvedType(String),

    #[error("unresolved import '{0}'")]
    UnresolvedImport(String),

    #[error("no property '{member}' on {owner}")]
    MissingProperty { owner: String, member: String },

    #[error("{0} is not callable")]
    NotCallable(String),

    #[error("type of '{0}' is unknown")]
    UnknownType(String),

    #[error("inference depth limit reached")]
    DepthExceeded,

    #[error("circular inference")]
    Cycle,
}

pub(crate) type Resolved<T> = Result<T, ResolveError>;

/// Step one level deeper, failing once [`MAX_DEPTH`] is reached.
pub(crate) fn deeper(depth: u32) -> Resolved<u32> {
    if depth >= MAX_DEPTH {
        Err(ResolveError::DepthExceeded)
    } else {
        Ok(depth + 1)
    }
}
