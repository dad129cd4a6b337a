//! Type inference over a [`TypeContext`].
//!
//! Inference is demand-driven: nothing is computed until a classifier asks
//! about a node. Function return types are memoised per session; a function
//! whose return type is requested while it is being inferred is a cycle.
//! A result that leaned on a cycle through a function still in progress is
//! not memoised, so verdicts never depend on which function was asked first.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use tree_sitter::Node;

use super::context::{ImportBinding, TypeContext, TypeDecl, ValueDecl};
use super::types::*;
use crate::detect::walk::own_return_values;
use crate::source::{
    class_name, enclosing_class, find_child_by_kind, first_named_child, has_async_marker, is_function_like,
    node_text, property_key,
};

/// Promise instance methods: each returns a new promise.
const PROMISE_METHODS: [&str; 3] = ["then", "catch", "finally"];

/// `Promise.*` statics that return a promise.
const PROMISE_STATICS: [&str; 6] = ["resolve", "reject", "all", "allSettled", "race", "any"];

/// `Response` body readers.
const RESPONSE_READERS: [&str; 6] = ["json", "text", "blob", "arrayBuffer", "formData", "bytes"];

#[derive(Debug, Clone)]
enum Memo<'c> {
    /// Being inferred at this nesting level.
    InProgress(usize),
    Done(TsType<'c>),
}

pub(crate) struct Inference<'c> {
    ctx: &'c TypeContext<'c>,
    returns: RefCell<HashMap<(ModuleId, usize), Memo<'c>>>,
    /// Number of function return types currently being inferred.
    active: Cell<usize>,
    /// Lowest nesting level a cycle has reached since the current frame began.
    cycle_floor: Cell<usize>,
}

impl<'c> Inference<'c> {
    pub(crate) fn new(ctx: &'c TypeContext<'c>) -> Self {
        Self {
            ctx,
            returns: RefCell::new(HashMap::new()),
            active: Cell::new(0),
            cycle_floor: Cell::new(usize::MAX),
        }
    }

    // ─── Verdicts ───────────────────────────────────────────────────

    /// Does calling `function` produce a promise or thenable?
    pub(crate) fn returns_promise(&self, function: Located<'c>) -> Resolved<bool> {
        let ty = self.function_return_type(function, 0)?;
        Ok(self.is_promise_like(&ty, 0))
    }

    /// Does evaluating `call` produce a promise or thenable?
    pub(crate) fn call_yields_promise(&self, call: Located<'c>) -> Resolved<bool> {
        let ty = self.call_return_type(call, 0)?;
        Ok(self.is_promise_like(&ty, 0))
    }

    /// `Promise`/`PromiseLike`, or anything exposing a callable `then`.
    pub(crate) fn is_promise_like(&self, ty: &TsType<'c>, depth: u32) -> bool {
        let Ok(depth) = deeper(depth) else {
            return false;
        };
        match ty {
            TsType::Promise(_) => true,
            TsType::Union(members) => members.iter().any(|m| self.is_promise_like(m, depth)),
            TsType::Named { .. } => self
                .expand(ty.clone(), depth)
                .is_ok_and(|t| self.is_promise_like(&t, depth)),
            TsType::Object(_) | TsType::Instance(_) => self
                .member_type(ty, "then", depth)
                .is_ok_and(|then| self.is_callable(&then, depth)),
            _ => false,
        }
    }

    fn is_callable(&self, ty: &TsType<'c>, depth: u32) -> bool {
        let Ok(depth) = deeper(depth) else {
            return false;
        };
        match ty {
            TsType::Function(_) | TsType::Builtin(Builtin::Fetch) => true,
            TsType::Union(members) => members.iter().any(|m| self.is_callable(m, depth)),
            TsType::Named { .. } => self
                .expand(ty.clone(), depth)
                .is_ok_and(|t| self.is_callable(&t, depth)),
            _ => false,
        }
    }

    // ─── Type syntax ────────────────────────────────────────────────

    /// Turn a type node into a [`TsType`]. Names stay unresolved.
    pub(crate) fn lower_type(&self, at: Located<'c>) -> TsType<'c> {
        let node = at.node;
        let text = || self.ctx.text(at);
        match node.kind() {
            "type_annotation" | "parenthesized_type" | "readonly_type" => match first_named_child(node) {
                Some(inner) => self.lower_type(at.with(inner)),
                None => TsType::Unknown,
            },
            "predefined_type" => primitive(text()).map_or(TsType::Unknown, TsType::Primitive),
            "type_identifier" => match text() {
                "Promise" | "PromiseLike" => TsType::promise_of(TsType::Unknown),
                name => TsType::Named {
                    name: name.to_string(),
                    at,
                },
            },
            "nested_type_identifier" => TsType::Named {
                name: text().to_string(),
                at,
            },
            "generic_type" => {
                let Some(name) = node.child_by_field_name("name") else {
                    return TsType::Unknown;
                };
                match self.ctx.text(at.with(name)) {
                    "Promise" | "PromiseLike" => {
                        let inner = node
                            .child_by_field_name("type_arguments")
                            .and_then(first_named_child)
                            .map_or(TsType::Unknown, |arg| self.lower_type(at.with(arg)));
                        TsType::promise_of(inner)
                    }
                    _ => self.lower_type(at.with(name)),
                }
            }
            "union_type" | "intersection_type" => {
                let mut members = Vec::new();
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    match self.lower_type(at.with(child)) {
                        TsType::Union(inner) => members.extend(inner),
                        ty => members.push(ty),
                    }
                }
                TsType::union_of(members)
            }
            "object_type" | "interface_body" => TsType::Object(self.signature_members(at)),
            "function_type" => {
                let ret = node
                    .child_by_field_name("return_type")
                    .map_or(TsType::Unknown, |r| self.lower_type(at.with(r)));
                TsType::returning(ret)
            }
            "literal_type" => TsType::Primitive("literal"),
            "array_type" | "tuple_type" => TsType::Primitive("array"),
            _ => TsType::Unknown,
        }
    }

    /// Members declared in an object type or interface body.
    fn signature_members(&self, body: Located<'c>) -> Vec<Member<'c>> {
        let mut members = Vec::new();
        let source = self.ctx.source(body.module);
        let mut cursor = body.node.walk();
        for child in body.node.named_children(&mut cursor) {
            let Some(name) = child
                .child_by_field_name("name")
                .and_then(|n| property_key(n, source))
            else {
                continue;
            };
            let ty = match child.kind() {
                "property_signature" => child
                    .child_by_field_name("type")
                    .map_or(TsType::Unknown, |t| self.lower_type(body.with(t))),
                "method_signature" => TsType::returning(
                    child
                        .child_by_field_name("return_type")
                        .map_or(TsType::Unknown, |t| self.lower_type(body.with(t))),
                ),
                _ => continue,
            };
            members.push(Member::new(name, ty));
        }
        members
    }

    // ─── Named types ────────────────────────────────────────────────

    /// Resolve `Named` types until something structural remains.
    fn expand(&self, mut ty: TsType<'c>, mut depth: u32) -> Resolved<TsType<'c>> {
        loop {
            match ty {
                TsType::Named { name, at } => {
                    depth = deeper(depth)?;
                    ty = self.resolve_named(&name, at, depth)?;
                }
                other => return Ok(other),
            }
        }
    }

    fn resolve_named(&self, name: &str, at: Located<'c>, depth: u32) -> Resolved<TsType<'c>> {
        // ns.Type through a namespace import
        if let Some((namespace, rest)) = name.split_once('.') {
            return match self.ctx.lookup_value(namespace, at)? {
                ValueDecl::Import {
                    module: Some(module),
                    binding: ImportBinding::Namespace,
                    ..
                } => {
                    let decl = self.ctx.export_type(module, rest)?;
                    self.type_of_decl(decl, rest, depth)
                }
                _ => Err(ResolveError::UnresolvedType(name.to_string())),
            };
        }
        let decl = self.ctx.lookup_type(name, at)?;
        self.type_of_decl(decl, name, depth)
    }

    fn type_of_decl(&self, decl: TypeDecl<'c>, name: &str, depth: u32) -> Resolved<TsType<'c>> {
        let depth = deeper(depth)?;
        match decl {
            TypeDecl::Interface(iface) => Ok(TsType::Object(self.interface_members(iface, depth)?)),
            TypeDecl::Alias(alias) => match alias.node.child_by_field_name("value") {
                Some(value) => Ok(self.lower_type(alias.with(value))),
                None => Err(ResolveError::UnresolvedType(name.to_string())),
            },
            TypeDecl::Class(class) => Ok(TsType::Instance(class)),
            TypeDecl::TypeParameter => Ok(TsType::Unknown),
            TypeDecl::Import {
                module,
                specifier,
                binding,
            } => {
                let module = module.ok_or(ResolveError::UnresolvedImport(specifier))?;
                match binding {
                    ImportBinding::Named(exported) => {
                        let decl = self.ctx.export_type(module, &exported)?;
                        self.type_of_decl(decl, &exported, depth)
                    }
                    ImportBinding::Default => {
                        let decl = self.ctx.export_type(module, "default")?;
                        self.type_of_decl(decl, name, depth)
                    }
                    ImportBinding::Namespace => Ok(TsType::Namespace(module)),
                }
            }
            TypeDecl::Builtin(builtin) => Ok(TsType::Builtin(builtin)),
        }
    }

    /// Own members first, then anything inherited through `extends`.
    fn interface_members(&self, iface: Located<'c>, depth: u32) -> Resolved<Vec<Member<'c>>> {
        let depth = deeper(depth)?;
        let mut members = match iface.node.child_by_field_name("body") {
            Some(body) => self.signature_members(iface.with(body)),
            None => Vec::new(),
        };
        let Some(extends) = find_child_by_kind(iface.node, "extends_type_clause") else {
            return Ok(members);
        };
        let mut cursor = extends.walk();
        for parent in extends.named_children(&mut cursor) {
            let Ok(TsType::Object(inherited)) = self.expand(self.lower_type(iface.with(parent)), depth)
            else {
                continue;
            };
            for member in inherited {
                if !members.iter().any(|m| m.name == member.name) {
                    members.push(member);
                }
            }
        }
        Ok(members)
    }

    // ─── Members ────────────────────────────────────────────────────

    pub(crate) fn member_type(&self, owner: &TsType<'c>, name: &str, depth: u32) -> Resolved<TsType<'c>> {
        let depth = deeper(depth)?;
        let missing = || ResolveError::MissingProperty {
            owner: owner.describe(),
            member: name.to_string(),
        };
        match owner {
            TsType::Promise(inner) => match name {
                "finally" => Ok(TsType::returning(TsType::Promise(inner.clone()))),
                _ if PROMISE_METHODS.contains(&name) => Ok(TsType::returning(TsType::promise_of(TsType::Unknown))),
                _ => Err(missing()),
            },
            TsType::Builtin(Builtin::PromiseConstructor) => match name {
                "withResolvers" => Ok(TsType::returning(TsType::Object(vec![
                    Member::new("promise", TsType::promise_of(TsType::Unknown)),
                    Member::new("resolve", TsType::returning(TsType::Primitive("void"))),
                    Member::new("reject", TsType::returning(TsType::Primitive("void"))),
                ]))),
                _ if PROMISE_STATICS.contains(&name) => Ok(TsType::returning(TsType::promise_of(TsType::Unknown))),
                _ => Err(missing()),
            },
            TsType::Builtin(Builtin::Response) => match name {
                "clone" => Ok(TsType::returning(TsType::Builtin(Builtin::Response))),
                "ok" | "redirected" | "bodyUsed" => Ok(TsType::Primitive("boolean")),
                "status" => Ok(TsType::Primitive("number")),
                "statusText" | "url" => Ok(TsType::Primitive("string")),
                "headers" | "body" => Ok(TsType::Unknown),
                _ if RESPONSE_READERS.contains(&name) => Ok(TsType::returning(TsType::promise_of(TsType::Unknown))),
                _ => Err(missing()),
            },
            TsType::Object(members) => members
                .iter()
                .find(|m| m.name == name)
                .map(|m| m.ty.clone())
                .ok_or_else(missing),
            TsType::Union(alternatives) => {
                let found: Vec<TsType<'c>> = alternatives
                    .iter()
                    .filter_map(|alt| self.member_type(alt, name, depth).ok())
                    .collect();
                if found.is_empty() {
                    Err(missing())
                } else {
                    Ok(TsType::union_of(found))
                }
            }
            TsType::Instance(class) => self.class_member(*class, name, false, depth),
            TsType::ClassValue(class) => self.class_member(*class, name, true, depth),
            TsType::Namespace(module) => {
                let decl = self.ctx.export_value(*module, name)?;
                self.value_decl_type(decl, depth)
            }
            TsType::Named { .. } => {
                let expanded = self.expand(owner.clone(), depth)?;
                self.member_type(&expanded, name, depth)
            }
            TsType::Unknown => Err(ResolveError::UnknownType(name.to_string())),
            _ => Err(missing()),
        }
    }

    /// Look `name` up on a class, then on its superclass chain.
    fn class_member(&self, class: Located<'c>, name: &str, is_static: bool, depth: u32) -> Resolved<TsType<'c>> {
        let depth = deeper(depth)?;
        let source = self.ctx.source(class.module);
        if let Some(body) = class.node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                let member_name = member
                    .child_by_field_name("name")
                    .and_then(|n| property_key(n, source));
                if !is_static && member.kind() == "method_definition" && member_name == Some("constructor") {
                    if let Some(ty) = self.parameter_property(class.with(member), name) {
                        return Ok(ty);
                    }
                    continue;
                }
                if member_name != Some(name) || find_child_by_kind(member, "static").is_some() != is_static {
                    continue;
                }
                let at = class.with(member);
                return match member.kind() {
                    "method_definition" if find_child_by_kind(member, "get").is_some() => {
                        self.function_return_type(at, depth)
                    }
                    "method_definition" => Ok(TsType::Function(Signature::Inferred(at))),
                    "method_signature" | "abstract_method_signature" => Ok(TsType::returning(
                        member
                            .child_by_field_name("return_type")
                            .map_or(TsType::Unknown, |t| self.lower_type(at.with(t))),
                    )),
                    "public_field_definition" | "field_definition" => {
                        if let Some(annotation) = member.child_by_field_name("type") {
                            Ok(self.lower_type(at.with(annotation)))
                        } else if let Some(value) = member.child_by_field_name("value") {
                            self.expression_type(at.with(value), depth)
                        } else {
                            Ok(TsType::Unknown)
                        }
                    }
                    _ => continue,
                };
            }
        }
        match self.superclass(class, depth)? {
            Some(parent) => self.class_member(parent, name, is_static, depth),
            None => Err(ResolveError::MissingProperty {
                owner: class_name(class.node, source).unwrap_or("class").to_string(),
                member: name.to_string(),
            }),
        }
    }

    /// `constructor(private api: Api)` declares an instance member.
    fn parameter_property(&self, constructor: Located<'c>, name: &str) -> Option<TsType<'c>> {
        let params = constructor.node.child_by_field_name("parameters")?;
        let mut cursor = params.walk();
        let param = params.named_children(&mut cursor).find(|p| {
            let promoted = find_child_by_kind(*p, "accessibility_modifier").is_some()
                || find_child_by_kind(*p, "readonly").is_some();
            promoted
                && p.child_by_field_name("pattern")
                    .is_some_and(|pat| self.ctx.text(constructor.with(pat)) == name)
        })?;
        Some(
            param
                .child_by_field_name("type")
                .map_or(TsType::Unknown, |t| self.lower_type(constructor.with(t))),
        )
    }

    fn superclass(&self, class: Located<'c>, depth: u32) -> Resolved<Option<Located<'c>>> {
        let Some(heritage) = find_child_by_kind(class.node, "class_heritage") else {
            return Ok(None);
        };
        let Some(value) = find_child_by_kind(heritage, "extends_clause").and_then(|e| e.child_by_field_name("value"))
        else {
            return Ok(None);
        };
        match self.expression_type(class.with(value), depth)? {
            TsType::ClassValue(parent) => Ok(Some(parent)),
            _ => Ok(None),
        }
    }

    // ─── Values ─────────────────────────────────────────────────────

    fn value_decl_type(&self, decl: ValueDecl<'c>, depth: u32) -> Resolved<TsType<'c>> {
        let depth = deeper(depth)?;
        match decl {
            ValueDecl::Function(function) if function.node.kind() == "function_signature" => {
                Ok(TsType::returning(
                    function
                        .node
                        .child_by_field_name("return_type")
                        .map_or(TsType::Unknown, |t| self.lower_type(function.with(t))),
                ))
            }
            ValueDecl::Function(function) => Ok(TsType::Function(Signature::Inferred(function))),
            ValueDecl::Class(class) => Ok(TsType::ClassValue(class)),
            ValueDecl::Variable(declarator) => {
                if let Some(annotation) = declarator.node.child_by_field_name("type") {
                    Ok(self.lower_type(declarator.with(annotation)))
                } else if let Some(value) = declarator.node.child_by_field_name("value") {
                    self.expression_type(declarator.with(value), depth)
                } else {
                    Ok(TsType::Unknown)
                }
            }
            ValueDecl::Parameter(param) => Ok(param
                .node
                .child_by_field_name("type")
                .map_or(TsType::Unknown, |t| self.lower_type(param.with(t)))),
            ValueDecl::Expression(expr) => self.expression_type(expr, depth),
            ValueDecl::Import {
                module,
                specifier,
                binding,
            } => {
                let module = module.ok_or(ResolveError::UnresolvedImport(specifier))?;
                let exported = match binding {
                    ImportBinding::Named(exported) => exported,
                    ImportBinding::Default => "default".to_string(),
                    ImportBinding::Namespace => return Ok(TsType::Namespace(module)),
                };
                let decl = self.ctx.export_value(module, &exported)?;
                self.value_decl_type(decl, depth)
            }
            ValueDecl::Builtin(builtin) => Ok(TsType::Builtin(builtin)),
        }
    }

    pub(crate) fn expression_type(&self, expr: Located<'c>, depth: u32) -> Resolved<TsType<'c>> {
        let depth = deeper(depth)?;
        let node = expr.node;
        let child = |field: &str| node.child_by_field_name(field).map(|n| expr.with(n));
        let infer_or_unknown = |at: Option<Located<'c>>| {
            at.and_then(|at| self.expression_type(at, depth).ok())
                .unwrap_or(TsType::Unknown)
        };
        match node.kind() {
            "parenthesized_expression" | "non_null_expression" | "sequence_expression" => {
                let mut cursor = node.walk();
                let last = node.named_children(&mut cursor).filter(|c| c.kind() != "comment").last();
                match last {
                    Some(inner) => self.expression_type(expr.with(inner), depth),
                    None => Ok(TsType::Unknown),
                }
            }
            "as_expression" => {
                let ty = node.named_child(node.named_child_count().saturating_sub(1));
                Ok(ty.map_or(TsType::Unknown, |t| self.lower_type(expr.with(t))))
            }
            "satisfies_expression" => match first_named_child(node) {
                Some(inner) => self.expression_type(expr.with(inner), depth),
                None => Ok(TsType::Unknown),
            },
            "type_assertion" => Ok(find_child_by_kind(node, "type_arguments")
                .and_then(first_named_child)
                .map_or(TsType::Unknown, |t| self.lower_type(expr.with(t)))),
            "identifier" => {
                let name = self.ctx.text(expr);
                if name == "undefined" {
                    return Ok(TsType::Primitive("undefined"));
                }
                let decl = self.ctx.lookup_value(name, expr)?;
                self.value_decl_type(decl, depth)
            }
            "this" => Ok(enclosing_class(node).map_or(TsType::Unknown, |class| TsType::Instance(expr.with(class)))),
            "new_expression" => {
                let ctor = child("constructor").ok_or(ResolveError::NotCallable("new".to_string()))?;
                match self.expression_type(ctor, depth)? {
                    TsType::ClassValue(class) => Ok(TsType::Instance(class)),
                    TsType::Builtin(Builtin::PromiseConstructor) => Ok(TsType::promise_of(TsType::Unknown)),
                    _ => Ok(TsType::Unknown),
                }
            }
            "call_expression" => self.call_return_type(expr, depth),
            "await_expression" => {
                let inner = first_named_child(node).map(|n| expr.with(n));
                Ok(self.awaited(infer_or_unknown(inner), depth))
            }
            "member_expression" => {
                let object = child("object").ok_or(ResolveError::UnknownType("member".to_string()))?;
                let property = child("property").ok_or(ResolveError::UnknownType("member".to_string()))?;
                let owner = self.expression_type(object, depth)?;
                self.member_type(&owner, self.ctx.text(property), depth)
            }
            "object" => Ok(TsType::Object(self.object_members(expr, depth))),
            "class" => Ok(TsType::ClassValue(expr)),
            _ if is_function_like(node) => Ok(TsType::Function(Signature::Inferred(expr))),
            "ternary_expression" => Ok(TsType::union_of(vec![
                infer_or_unknown(child("consequence")),
                infer_or_unknown(child("alternative")),
            ])),
            "binary_expression" => {
                let operator = node.child_by_field_name("operator").map(|op| op.kind());
                match operator {
                    Some("&&" | "||" | "??") => Ok(TsType::union_of(vec![
                        infer_or_unknown(child("left")),
                        infer_or_unknown(child("right")),
                    ])),
                    _ => Ok(TsType::Primitive("primitive")),
                }
            }
            "assignment_expression" => match child("right") {
                Some(right) => self.expression_type(right, depth),
                None => Ok(TsType::Unknown),
            },
            "string" | "template_string" => Ok(TsType::Primitive("string")),
            "number" => Ok(TsType::Primitive("number")),
            "true" | "false" => Ok(TsType::Primitive("boolean")),
            "null" => Ok(TsType::Primitive("null")),
            "array" => Ok(TsType::Primitive("array")),
            _ => Ok(TsType::Unknown),
        }
    }

    /// Shape of an object literal. Members whose type cannot be inferred
    /// are kept as unknown so the key itself still exists.
    fn object_members(&self, object: Located<'c>, depth: u32) -> Vec<Member<'c>> {
        let source = self.ctx.source(object.module);
        let mut members = Vec::new();
        let mut cursor = object.node.walk();
        for child in object.node.named_children(&mut cursor) {
            let at = object.with(child);
            match child.kind() {
                "pair" => {
                    let (Some(key), Some(value)) = (
                        child.child_by_field_name("key").and_then(|k| property_key(k, source)),
                        child.child_by_field_name("value"),
                    ) else {
                        continue;
                    };
                    let ty = self.expression_type(at.with(value), depth).unwrap_or(TsType::Unknown);
                    members.push(Member::new(key, ty));
                }
                "shorthand_property_identifier" => {
                    let name = node_text(child, source);
                    let ty = self
                        .ctx
                        .lookup_value(name, at)
                        .and_then(|decl| self.value_decl_type(decl, depth))
                        .unwrap_or(TsType::Unknown);
                    members.push(Member::new(name, ty));
                }
                "method_definition" => {
                    let Some(key) = child.child_by_field_name("name").and_then(|n| property_key(n, source)) else {
                        continue;
                    };
                    let ty = if find_child_by_kind(child, "get").is_some() {
                        self.function_return_type(at, depth).unwrap_or(TsType::Unknown)
                    } else {
                        TsType::Function(Signature::Inferred(at))
                    };
                    members.push(Member::new(key, ty));
                }
                "spread_element" => {
                    let spread = first_named_child(child)
                        .and_then(|inner| self.expression_type(at.with(inner), depth).ok())
                        .and_then(|ty| self.expand(ty, depth).ok());
                    if let Some(TsType::Object(inner)) = spread {
                        members.extend(inner);
                    }
                }
                _ => {}
            }
        }
        members
    }

    /// What `await` yields for a value of type `ty`.
    fn awaited(&self, ty: TsType<'c>, depth: u32) -> TsType<'c> {
        match ty {
            TsType::Promise(inner) => *inner,
            TsType::Union(members) => {
                TsType::union_of(members.into_iter().map(|m| self.awaited(m, depth)).collect())
            }
            TsType::Named { name, at } => match self.expand(TsType::Named { name, at }, depth) {
                Ok(expanded) => self.awaited(expanded, depth),
                Err(_) => TsType::Unknown,
            },
            other if self.is_promise_like(&other, depth) => TsType::Unknown,
            other => other,
        }
    }

    // ─── Calls and signatures ───────────────────────────────────────

    pub(crate) fn call_return_type(&self, call: Located<'c>, depth: u32) -> Resolved<TsType<'c>> {
        let callee = call
            .node
            .child_by_field_name("function")
            .ok_or(ResolveError::NotCallable("call".to_string()))?;
        // import('./module')
        if callee.kind() == "import" {
            return Ok(TsType::promise_of(TsType::Unknown));
        }
        let callee_ty = self.expression_type(call.with(callee), depth)?;
        self.signature_return(&callee_ty, depth)
    }

    fn signature_return(&self, callee: &TsType<'c>, depth: u32) -> Resolved<TsType<'c>> {
        let depth = deeper(depth)?;
        match callee {
            TsType::Function(Signature::Declared(ret)) => Ok((**ret).clone()),
            TsType::Function(Signature::Inferred(function)) => self.function_return_type(*function, depth),
            TsType::Builtin(Builtin::Fetch) => Ok(TsType::promise_of(TsType::Builtin(Builtin::Response))),
            TsType::Named { .. } => {
                let expanded = self.expand(callee.clone(), depth)?;
                self.signature_return(&expanded, depth)
            }
            TsType::Union(members) => {
                let returns: Vec<TsType<'c>> = members
                    .iter()
                    .filter_map(|m| self.signature_return(m, depth).ok())
                    .collect();
                if returns.is_empty() {
                    Err(ResolveError::NotCallable(callee.describe()))
                } else {
                    Ok(TsType::union_of(returns))
                }
            }
            TsType::Unknown => Err(ResolveError::UnknownType("callee".to_string())),
            other => Err(ResolveError::NotCallable(other.describe())),
        }
    }

    /// Return type of a function-like node, memoised for the session.
    ///
    /// A result that hit a cycle through an enclosing in-progress function is
    /// returned but not memoised; the outermost function of the cycle is.
    pub(crate) fn function_return_type(&self, function: Located<'c>, depth: u32) -> Resolved<TsType<'c>> {
        let key = function.key();
        match self.returns.borrow().get(&key) {
            Some(Memo::Done(ty)) => return Ok(ty.clone()),
            Some(Memo::InProgress(level)) => {
                self.cycle_floor.set(self.cycle_floor.get().min(*level));
                return Err(ResolveError::Cycle);
            }
            None => {}
        }

        let level = self.active.get();
        self.active.set(level + 1);
        let outer_floor = self.cycle_floor.replace(usize::MAX);
        self.returns.borrow_mut().insert(key, Memo::InProgress(level));

        let result = self.compute_return_type(function, depth);

        self.active.set(level);
        let floor = self.cycle_floor.get();
        let tainted = floor < level;
        self.cycle_floor
            .set(if tainted { outer_floor.min(floor) } else { outer_floor });

        let mut memo = self.returns.borrow_mut();
        match &result {
            Ok(ty) if !tainted => {
                memo.insert(key, Memo::Done(ty.clone()));
            }
            _ => {
                memo.remove(&key);
            }
        }
        result
    }

    fn compute_return_type(&self, function: Located<'c>, depth: u32) -> Resolved<TsType<'c>> {
        let depth = deeper(depth)?;
        let node = function.node;
        if let Some(annotation) = node.child_by_field_name("return_type") {
            return Ok(self.lower_type(function.with(annotation)));
        }
        let is_async = has_async_marker(node);
        if is_generator(node) {
            return Ok(TsType::Primitive(if is_async { "async generator" } else { "generator" }));
        }
        let returned: Vec<TsType<'c>> = own_return_values(node)
            .into_iter()
            .map(|value| {
                self.expression_type(function.with(value), depth)
                    .unwrap_or(TsType::Unknown)
            })
            .collect();
        let ty = TsType::union_of(returned);
        Ok(if is_async {
            TsType::promise_of(self.awaited(ty, depth))
        } else {
            ty
        })
    }
}

fn is_generator(function: Node) -> bool {
    matches!(function.kind(), "generator_function_declaration" | "generator_function")
        || find_child_by_kind(function, "*").is_some()
}

fn primitive(text: &str) -> Option<&'static str> {
    Some(match text {
        "string" => "string",
        "number" => "number",
        "boolean" => "boolean",
        "bigint" => "bigint",
        "symbol" => "symbol",
        "void" => "void",
        "undefined" => "undefined",
        "null" => "null",
        "never" => "never",
        "object" => "object",
        _ => return None,
    })
}
