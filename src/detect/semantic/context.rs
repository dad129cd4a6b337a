//! Type-checking context: the analyzed unit, its reachable relative imports,
//! and lexical lookup of value and type declarations across them.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::debug;
use tree_sitter::Node;

use super::types::*;
use crate::source::{
    find_child_by_kind, first_named_child, is_function_like, node_text, parse_unit, string_value,
    Dialect, ParsedUnit,
};
use crate::{read_file_lossy, PromiseError};

/// Upper bound on loaded modules, the analyzed unit included.
const MAX_MODULES: usize = 64;

/// Extensions probed when an import specifier has none.
const PROBE_EXTENSIONS: [&str; 9] = ["ts", "tsx", "d.ts", "js", "jsx", "mts", "mjs", "cts", "cjs"];

const INDEX_FILES: [&str; 4] = ["index.ts", "index.tsx", "index.js", "index.jsx"];

/// Bound on `export … from` hops when following re-exports.
const MAX_REEXPORT_HOPS: u32 = 8;

// ─── Declarations ───────────────────────────────────────────────────

/// What a value name refers to.
#[derive(Debug, Clone)]
pub(crate) enum ValueDecl<'c> {
    /// Function declaration, signature or a named function expression.
    Function(Located<'c>),
    Class(Located<'c>),
    /// A `variable_declarator`.
    Variable(Located<'c>),
    /// A formal parameter (or an arrow's single bare parameter).
    Parameter(Located<'c>),
    /// An `export default <expression>`.
    Expression(Located<'c>),
    Import {
        module: Option<ModuleId>,
        specifier: String,
        binding: ImportBinding,
    },
    Builtin(Builtin),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ImportBinding {
    Named(String),
    Default,
    Namespace,
}

/// What a type name refers to.
#[derive(Debug, Clone)]
pub(crate) enum TypeDecl<'c> {
    Interface(Located<'c>),
    Alias(Located<'c>),
    Class(Located<'c>),
    TypeParameter,
    Import {
        module: Option<ModuleId>,
        specifier: String,
        binding: ImportBinding,
    },
    Builtin(Builtin),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Space {
    Value,
    Type,
}

/// Declaration found in either space, before being narrowed.
enum Found<'c> {
    Value(ValueDecl<'c>),
    Type(TypeDecl<'c>),
}

// ─── Context ────────────────────────────────────────────────────────

/// Everything the semantic tier may look at for one analysis call.
pub(crate) struct TypeContext<'u> {
    root: &'u ParsedUnit,
    imports: Vec<ParsedUnit>,
    /// (importing module, specifier) → loaded module
    links: HashMap<(ModuleId, String), ModuleId>,
}

impl<'u> TypeContext<'u> {
    /// Build the context for `root`, loading relative imports breadth-first.
    ///
    /// Fails when the unit has no file identity or is not a JS/TS file.
    /// Imports that cannot be found or read are skipped, not fatal.
    pub(crate) fn build(root: &'u ParsedUnit) -> Result<Self, PromiseError> {
        let Some(path) = root.path.as_deref() else {
            return Err(PromiseError::SemanticContext {
                path: root.display_path(),
                reason: "source has no file identity".to_string(),
            });
        };
        if Dialect::from_path(path).is_none() {
            return Err(PromiseError::SemanticContext {
                path: root.display_path(),
                reason: "not a JavaScript or TypeScript file".to_string(),
            });
        }

        let mut ctx = TypeContext {
            root,
            imports: Vec::new(),
            links: HashMap::new(),
        };
        let mut loaded: HashMap<PathBuf, ModuleId> = HashMap::new();
        loaded.insert(normalize(path), ROOT_MODULE);
        let mut queue = VecDeque::from([ROOT_MODULE]);

        while let Some(module) = queue.pop_front() {
            let unit = ctx.unit(module);
            let specifiers = import_specifiers(unit);
            let Some(dir) = unit.path.as_deref().and_then(Path::parent).map(Path::to_path_buf) else {
                continue;
            };
            for specifier in specifiers {
                let Some(target) = resolve_specifier(&dir, &specifier) else {
                    debug!(specifier = %specifier, "Import not resolvable, skipping");
                    continue;
                };
                if let Some(&id) = loaded.get(&target) {
                    ctx.links.insert((module, specifier), id);
                    continue;
                }
                if ctx.module_count() >= MAX_MODULES {
                    debug!(specifier = %specifier, limit = MAX_MODULES, "Module limit reached, skipping import");
                    continue;
                }
                let text = match read_file_lossy(&target) {
                    Ok((text, _)) => text,
                    Err(e) => {
                        debug!(path = %target.display(), error = %e, "Failed to read import, skipping");
                        continue;
                    }
                };
                let parsed = parse_unit(&text, Some(target.as_path()))?;
                ctx.imports.push(parsed);
                let id = ctx.imports.len();
                loaded.insert(target, id);
                ctx.links.insert((module, specifier), id);
                queue.push_back(id);
            }
        }

        debug!(
            path = %root.display_path(),
            modules = ctx.module_count(),
            "Type context ready"
        );
        Ok(ctx)
    }

    pub(crate) fn module_count(&self) -> usize {
        self.imports.len() + 1
    }

    pub(crate) fn unit(&self, module: ModuleId) -> &ParsedUnit {
        if module == ROOT_MODULE {
            self.root
        } else {
            &self.imports[module - 1]
        }
    }

    pub(crate) fn source(&self, module: ModuleId) -> &str {
        &self.unit(module).source
    }

    pub(crate) fn program(&self, module: ModuleId) -> Node<'_> {
        self.unit(module).root()
    }

    /// Text of a located node.
    pub(crate) fn text<'c>(&'c self, at: Located<'c>) -> &'c str {
        node_text(at.node, self.source(at.module))
    }

    fn linked(&self, module: ModuleId, specifier: &str) -> Option<ModuleId> {
        self.links.get(&(module, specifier.to_string())).copied()
    }

    // ─── Lexical lookup ─────────────────────────────────────────────

    /// Resolve a value name visible at `at`, innermost scope first.
    pub(crate) fn lookup_value<'c>(&'c self, name: &str, at: Located<'c>) -> Resolved<ValueDecl<'c>> {
        if let Some(Found::Value(decl)) = self.lookup(name, at, Space::Value) {
            return Ok(decl);
        }
        match name {
            "Promise" => Ok(ValueDecl::Builtin(Builtin::PromiseConstructor)),
            "fetch" => Ok(ValueDecl::Builtin(Builtin::Fetch)),
            _ => Err(ResolveError::UnresolvedSymbol(name.to_string())),
        }
    }

    /// Resolve a type name visible at `at`, innermost scope first.
    pub(crate) fn lookup_type<'c>(&'c self, name: &str, at: Located<'c>) -> Resolved<TypeDecl<'c>> {
        if let Some(Found::Type(decl)) = self.lookup(name, at, Space::Type) {
            return Ok(decl);
        }
        match name {
            "Response" => Ok(TypeDecl::Builtin(Builtin::Response)),
            _ => Err(ResolveError::UnresolvedType(name.to_string())),
        }
    }

    fn lookup<'c>(&'c self, name: &str, at: Located<'c>, space: Space) -> Option<Found<'c>> {
        let mut current = Some(at.node);
        while let Some(scope) = current {
            if let Some(found) = self.declared_in(scope, name, at.module, space) {
                return Some(found);
            }
            current = scope.parent();
        }
        None
    }

    /// Declarations `scope` itself introduces: parameters and type parameters
    /// of functions, statements of blocks and programs.
    fn declared_in<'c>(
        &'c self,
        scope: Node<'c>,
        name: &str,
        module: ModuleId,
        space: Space,
    ) -> Option<Found<'c>> {
        let source = self.source(module);
        if let Some(params) = scope.child_by_field_name("type_parameters") {
            if space == Space::Type {
                let mut cursor = params.walk();
                let declares = params.named_children(&mut cursor).any(|p| {
                    p.child_by_field_name("name")
                        .is_some_and(|n| node_text(n, source) == name)
                });
                if declares {
                    return Some(Found::Type(TypeDecl::TypeParameter));
                }
            }
        }
        if is_function_like(scope) {
            if space != Space::Value {
                return None;
            }
            if let Some(param) = parameter_named(scope, name, source) {
                return Some(Found::Value(ValueDecl::Parameter(Located::new(param, module))));
            }
            // A named function expression sees its own name
            if scope.kind() != "function_declaration" && scope.kind() != "method_definition" {
                if let Some(own) = scope.child_by_field_name("name") {
                    if node_text(own, source) == name {
                        return Some(Found::Value(ValueDecl::Function(Located::new(scope, module))));
                    }
                }
            }
            return None;
        }
        if !matches!(scope.kind(), "program" | "statement_block" | "switch_case" | "switch_default") {
            return None;
        }
        let mut cursor = scope.walk();
        for statement in scope.named_children(&mut cursor) {
            if let Some(found) = self.statement_declares(statement, name, module, space) {
                return Some(found);
            }
        }
        None
    }

    /// Does a single statement declare `name` in `space`?
    fn statement_declares<'c>(
        &'c self,
        statement: Node<'c>,
        name: &str,
        module: ModuleId,
        space: Space,
    ) -> Option<Found<'c>> {
        let source = self.source(module);
        let here = |node| Located::new(node, module);
        let named = |node: Node| {
            node.child_by_field_name("name")
                .is_some_and(|n| node_text(n, source) == name)
        };
        match (statement.kind(), space) {
            ("export_statement", _) => {
                let declaration = statement.child_by_field_name("declaration")?;
                self.statement_declares(declaration, name, module, space)
            }
            ("ambient_declaration", _) => {
                let mut cursor = statement.walk();
                let children: Vec<Node<'c>> = statement.named_children(&mut cursor).collect();
                children
                    .into_iter()
                    .find_map(|child| self.statement_declares(child, name, module, space))
            }
            (
                "function_declaration" | "generator_function_declaration" | "function_signature",
                Space::Value,
            ) if named(statement) => Some(Found::Value(ValueDecl::Function(here(statement)))),
            ("class_declaration" | "abstract_class_declaration", Space::Value) if named(statement) => {
                Some(Found::Value(ValueDecl::Class(here(statement))))
            }
            ("class_declaration" | "abstract_class_declaration", Space::Type) if named(statement) => {
                Some(Found::Type(TypeDecl::Class(here(statement))))
            }
            ("lexical_declaration" | "variable_declaration", Space::Value) => {
                let mut cursor = statement.walk();
                let declarator = statement.named_children(&mut cursor).find(|d| {
                    d.kind() == "variable_declarator"
                        && d.child_by_field_name("name")
                            .is_some_and(|n| n.kind() == "identifier" && node_text(n, source) == name)
                });
                declarator.map(|d| Found::Value(ValueDecl::Variable(here(d))))
            }
            ("interface_declaration", Space::Type) if named(statement) => {
                Some(Found::Type(TypeDecl::Interface(here(statement))))
            }
            ("type_alias_declaration", Space::Type) if named(statement) => {
                Some(Found::Type(TypeDecl::Alias(here(statement))))
            }
            ("import_statement", _) => self.import_declares(statement, name, module, space),
            _ => None,
        }
    }

    fn import_declares<'c>(
        &'c self,
        import: Node<'c>,
        name: &str,
        module: ModuleId,
        space: Space,
    ) -> Option<Found<'c>> {
        let source = self.source(module);
        let specifier = string_value(import.child_by_field_name("source")?, source).to_string();
        let clause = find_child_by_kind(import, "import_clause")?;
        let mut binding = None;
        let mut cursor = clause.walk();
        for part in clause.named_children(&mut cursor) {
            match part.kind() {
                "identifier" if node_text(part, source) == name => {
                    binding = Some(ImportBinding::Default);
                }
                "namespace_import" => {
                    if find_child_by_kind(part, "identifier").is_some_and(|id| node_text(id, source) == name) {
                        binding = Some(ImportBinding::Namespace);
                    }
                }
                "named_imports" => {
                    let mut inner = part.walk();
                    for spec in part.named_children(&mut inner) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(imported) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let local = spec.child_by_field_name("alias").unwrap_or(imported);
                        if node_text(local, source) == name {
                            binding = Some(ImportBinding::Named(string_or_text(imported, source)));
                        }
                    }
                }
                _ => {}
            }
        }
        let binding = binding?;
        let target = self.linked(module, &specifier);
        Some(match space {
            Space::Value => Found::Value(ValueDecl::Import {
                module: target,
                specifier,
                binding,
            }),
            Space::Type => Found::Type(TypeDecl::Import {
                module: target,
                specifier,
                binding,
            }),
        })
    }

    // ─── Exports ────────────────────────────────────────────────────

    pub(crate) fn export_value<'c>(&'c self, module: ModuleId, name: &str) -> Resolved<ValueDecl<'c>> {
        match self.lookup_export(module, name, Space::Value, 0) {
            Some(Found::Value(decl)) => Ok(decl),
            _ => Err(ResolveError::UnresolvedSymbol(name.to_string())),
        }
    }

    pub(crate) fn export_type<'c>(&'c self, module: ModuleId, name: &str) -> Resolved<TypeDecl<'c>> {
        match self.lookup_export(module, name, Space::Type, 0) {
            Some(Found::Type(decl)) => Ok(decl),
            _ => Err(ResolveError::UnresolvedType(name.to_string())),
        }
    }

    fn lookup_export<'c>(&'c self, module: ModuleId, name: &str, space: Space, hops: u32) -> Option<Found<'c>> {
        if hops > MAX_REEXPORT_HOPS {
            return None;
        }
        let program = self.program(module);
        let source = self.source(module);
        let mut star_sources = Vec::new();
        let mut cursor = program.walk();
        for statement in program.named_children(&mut cursor) {
            if statement.kind() != "export_statement" {
                continue;
            }
            let is_default = find_child_by_kind(statement, "default").is_some();
            let from = statement
                .child_by_field_name("source")
                .map(|s| string_value(s, source).to_string());

            if let Some(declaration) = statement.child_by_field_name("declaration") {
                if is_default && name == "default" {
                    return Some(self.declaration_itself(declaration, module, space));
                }
                if let Some(found) = self.statement_declares(declaration, name, module, space) {
                    return Some(found);
                }
                continue;
            }
            if is_default && name == "default" && space == Space::Value {
                if let Some(value) = statement.child_by_field_name("value") {
                    return Some(Found::Value(ValueDecl::Expression(Located::new(value, module))));
                }
            }
            // export * as ns from './x'
            if let Some(namespace) = find_child_by_kind(statement, "namespace_export") {
                let exported = first_named_child(namespace).map(|n| string_or_text(n, source));
                if let (Some(specifier), Some(exported)) = (&from, exported)
                    && exported == name
                {
                    let target = self.linked(module, specifier);
                    let specifier = specifier.clone();
                    return Some(match space {
                        Space::Value => Found::Value(ValueDecl::Import {
                            module: target,
                            specifier,
                            binding: ImportBinding::Namespace,
                        }),
                        Space::Type => Found::Type(TypeDecl::Import {
                            module: target,
                            specifier,
                            binding: ImportBinding::Namespace,
                        }),
                    });
                }
                continue;
            }
            match find_child_by_kind(statement, "export_clause") {
                Some(clause) => {
                    let mut inner = clause.walk();
                    for spec in clause.named_children(&mut inner) {
                        if spec.kind() != "export_specifier" {
                            continue;
                        }
                        let Some(local) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let exported = spec.child_by_field_name("alias").unwrap_or(local);
                        if string_or_text(exported, source) != name {
                            continue;
                        }
                        let local_name = string_or_text(local, source);
                        return match &from {
                            Some(specifier) => {
                                let target = self.linked(module, specifier)?;
                                self.lookup_export(target, &local_name, space, hops + 1)
                            }
                            None => self.lookup(&local_name, Located::new(program, module), space),
                        };
                    }
                }
                // export * from './x'
                None => star_sources.extend(from),
            }
        }
        star_sources.into_iter().find_map(|specifier| {
            let target = self.linked(module, &specifier)?;
            self.lookup_export(target, name, space, hops + 1)
        })
    }

    /// `export default function () {}` / `export default class {}` may be unnamed.
    fn declaration_itself<'c>(&'c self, declaration: Node<'c>, module: ModuleId, space: Space) -> Found<'c> {
        let here = Located::new(declaration, module);
        match (declaration.kind(), space) {
            ("class_declaration" | "abstract_class_declaration" | "class", Space::Type) => {
                Found::Type(TypeDecl::Class(here))
            }
            ("class_declaration" | "abstract_class_declaration" | "class", Space::Value) => {
                Found::Value(ValueDecl::Class(here))
            }
            (_, Space::Value) if is_function_like(declaration) || declaration.kind() == "function_signature" => {
                Found::Value(ValueDecl::Function(here))
            }
            (_, Space::Value) => Found::Value(ValueDecl::Expression(here)),
            (_, Space::Type) => Found::Type(TypeDecl::Alias(here)),
        }
    }
}

// ─── Module resolution ──────────────────────────────────────────────

/// Parameter of `function` called `name`, if any.
fn parameter_named<'c>(function: Node<'c>, name: &str, source: &str) -> Option<Node<'c>> {
    // `x => …` binds a bare identifier
    if let Some(param) = function.child_by_field_name("parameter") {
        return (node_text(param, source) == name).then_some(param);
    }
    let params = function.child_by_field_name("parameters")?;
    let mut cursor = params.walk();
    let found = params.named_children(&mut cursor).find(|p| {
        let pattern = p.child_by_field_name("pattern").unwrap_or(*p);
        pattern.kind() == "identifier" && node_text(pattern, source) == name
    });
    found
}

fn string_or_text(node: Node, source: &str) -> String {
    if node.kind() == "string" {
        string_value(node, source).to_string()
    } else {
        node_text(node, source).to_string()
    }
}

/// Relative specifiers of every `import … from` and `export … from`.
fn import_specifiers(unit: &ParsedUnit) -> Vec<String> {
    let program = unit.root();
    let mut specifiers = Vec::new();
    let mut cursor = program.walk();
    for statement in program.named_children(&mut cursor) {
        if !matches!(statement.kind(), "import_statement" | "export_statement") {
            continue;
        }
        if let Some(source) = statement.child_by_field_name("source") {
            let specifier = string_value(source, &unit.source);
            if (specifier.starts_with("./") || specifier.starts_with("../"))
                && !specifiers.iter().any(|s| s == specifier)
            {
                specifiers.push(specifier.to_string());
            }
        }
    }
    specifiers
}

/// Map a relative specifier to an existing file under `dir`.
pub(crate) fn resolve_specifier(dir: &Path, specifier: &str) -> Option<PathBuf> {
    let base = dir.join(specifier);
    let mut candidates = Vec::new();
    if Dialect::from_path(&base).is_some() {
        candidates.push(base.clone());
        // ESM-style TypeScript imports name the emitted `.js` file
        let ts_twins: &[&str] = match base.extension().and_then(|e| e.to_str()) {
            Some("js") | Some("jsx") => &["ts", "tsx"],
            Some("mjs") => &["mts"],
            Some("cjs") => &["cts"],
            _ => &[],
        };
        candidates.extend(ts_twins.iter().map(|ext| base.with_extension(ext)));
    }
    let base_str = base.to_string_lossy();
    candidates.extend(
        PROBE_EXTENSIONS
            .iter()
            .map(|ext| PathBuf::from(format!("{}.{}", base_str, ext))),
    );
    candidates.extend(INDEX_FILES.iter().map(|index| base.join(index)));
    candidates
        .into_iter()
        .find(|candidate| candidate.is_file())
        .map(|found| normalize(&found))
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
