//! Source model: dialect selection and tree-sitter parsing of one unit.
//!
//! A [`ParsedUnit`] owns its text and tree. Parsers are created per call since
//! `tree_sitter::Parser` carries mutable state and is not shared.

use std::path::{Path, PathBuf};

use tree_sitter::{Node, Parser, Tree};

use crate::PromiseError;

// ─── Dialects ───────────────────────────────────────────────────────

/// Grammar used to parse a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Plain TypeScript (`<T>expr` assertions, no JSX).
    TypeScript,
    /// TSX grammar, also used for JavaScript since it accepts JSX.
    Tsx,
}

impl Dialect {
    /// Dialect for a recognized JS/TS file extension, `None` otherwise.
    pub fn from_path(path: &Path) -> Option<Dialect> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "ts" | "mts" | "cts" => Some(Dialect::TypeScript),
            "tsx" | "js" | "jsx" | "mjs" | "cjs" => Some(Dialect::Tsx),
            _ => None,
        }
    }

    /// Dialect for a unit that may have no identity or an unusual extension.
    pub fn for_unit(path: Option<&Path>) -> Dialect {
        path.and_then(Dialect::from_path).unwrap_or(Dialect::TypeScript)
    }

    fn language(self) -> tree_sitter::Language {
        match self {
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

// ─── Parsed unit ────────────────────────────────────────────────────

/// One parsed source file: text, tree and (optional) file identity.
pub struct ParsedUnit {
    pub source: String,
    pub tree: Tree,
    pub path: Option<PathBuf>,
    pub dialect: Dialect,
}

impl ParsedUnit {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Display name used in logs and errors.
    pub fn display_path(&self) -> String {
        self.path
            .as_deref()
            .map(|p| crate::clean_path(&p.to_string_lossy()))
            .unwrap_or_else(|| "<untitled>".to_string())
    }
}

/// Parse `text` with the grammar matching `path`.
///
/// Syntax errors do not fail the parse: tree-sitter recovers with ERROR nodes
/// and the rest of the tree stays classifiable.
pub fn parse_unit(text: &str, path: Option<&Path>) -> Result<ParsedUnit, PromiseError> {
    let dialect = Dialect::for_unit(path);
    let mut parser = Parser::new();
    parser.set_language(&dialect.language())?;
    let tree = parser.parse(text, None).ok_or_else(|| PromiseError::Parse {
        path: path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<untitled>".to_string()),
    })?;
    Ok(ParsedUnit {
        source: text.to_string(),
        tree,
        path: path.map(Path::to_path_buf),
        dialect,
    })
}

// ─── Node helpers ───────────────────────────────────────────────────

pub(crate) fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

pub(crate) fn find_child_by_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == kind)
}

/// First named child that is not a comment.
pub(crate) fn first_named_child(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).find(|c| c.kind() != "comment")
}

/// Is `child` the node stored under `field` of `parent`?
pub(crate) fn is_field(parent: Node, field: &str, child: Node) -> bool {
    parent.child_by_field_name(field) == Some(child)
}

/// Function-like nodes: every node whose body is its own `return` scope.
pub(crate) fn is_function_like(node: Node) -> bool {
    match node.kind() {
        "function_declaration"
        | "generator_function_declaration"
        | "function_expression"
        | "generator_function"
        | "arrow_function"
        | "method_definition" => true,
        // Older grammars name function expressions `function`; the keyword token shares the name
        "function" => node.is_named(),
        _ => false,
    }
}

/// Nodes whose `this` binding differs from the enclosing one.
fn rebinds_this(node: Node) -> bool {
    is_function_like(node) && node.kind() != "arrow_function" && node.kind() != "method_definition"
}

pub(crate) fn is_class_like(node: Node) -> bool {
    matches!(node.kind(), "class_declaration" | "abstract_class_declaration" | "class")
}

/// Strip wrappers that do not change the value of an expression.
pub(crate) fn unwrap_expression(mut node: Node) -> Node {
    loop {
        match node.kind() {
            "parenthesized_expression" | "non_null_expression" => match first_named_child(node) {
                Some(inner) => node = inner,
                None => return node,
            },
            _ => return node,
        }
    }
}

/// Check for the `async` modifier token on a function-like node.
pub(crate) fn has_async_marker(node: Node) -> bool {
    find_child_by_kind(node, "async").is_some()
}

/// Name of a class declaration, or the variable a class expression is bound to.
pub(crate) fn class_name<'a>(class: Node, source: &'a str) -> Option<&'a str> {
    if let Some(name) = class.child_by_field_name("name") {
        return Some(node_text(name, source));
    }
    let parent = class.parent()?;
    if parent.kind() == "variable_declarator" && is_field(parent, "value", class) {
        let name = parent.child_by_field_name("name")?;
        if name.kind() == "identifier" {
            return Some(node_text(name, source));
        }
    }
    None
}

/// The class whose instance `this` refers to at `node`, if any.
pub(crate) fn enclosing_class(node: Node) -> Option<Node> {
    let mut current = node.parent();
    while let Some(n) = current {
        if is_class_like(n) {
            return Some(n);
        }
        if rebinds_this(n) {
            return None;
        }
        current = n.parent();
    }
    None
}

/// Value of a string literal node without quotes.
pub(crate) fn string_value<'a>(node: Node, source: &'a str) -> &'a str {
    match find_child_by_kind(node, "string_fragment") {
        Some(fragment) => node_text(fragment, source),
        None => node_text(node, source).trim_matches(|c| c == '"' || c == '\'' || c == '`'),
    }
}

/// Textual name of an object/class property key (quotes stripped).
pub(crate) fn property_key<'a>(key: Node, source: &'a str) -> Option<&'a str> {
    match key.kind() {
        "property_identifier" | "private_property_identifier" | "identifier" | "number" => {
            Some(node_text(key, source))
        }
        "string" => Some(string_value(key, source)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_path() {
        assert_eq!(Dialect::from_path(Path::new("a/b.ts")), Some(Dialect::TypeScript));
        assert_eq!(Dialect::from_path(Path::new("a/b.d.ts")), Some(Dialect::TypeScript));
        assert_eq!(Dialect::from_path(Path::new("a/b.TSX")), Some(Dialect::Tsx));
        assert_eq!(Dialect::from_path(Path::new("a/b.mjs")), Some(Dialect::Tsx));
        assert_eq!(Dialect::from_path(Path::new("a/b.json")), None);
        assert_eq!(Dialect::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_dialect_for_unit_defaults_to_typescript() {
        assert_eq!(Dialect::for_unit(None), Dialect::TypeScript);
        assert_eq!(Dialect::for_unit(Some(Path::new("x.vue"))), Dialect::TypeScript);
        assert_eq!(Dialect::for_unit(Some(Path::new("x.jsx"))), Dialect::Tsx);
    }

    #[test]
    fn test_parse_unit_keeps_text_and_path() {
        let unit = parse_unit("const x = 1;", Some(Path::new("src/x.ts"))).unwrap();
        assert_eq!(unit.source, "const x = 1;");
        assert_eq!(unit.root().kind(), "program");
        assert_eq!(unit.display_path(), "src/x.ts");
    }

    #[test]
    fn test_parse_unit_recovers_from_syntax_errors() {
        let unit = parse_unit("function ok() { return 1 }\nfunction broken( {", None).unwrap();
        assert!(unit.root().has_error());
        assert_eq!(unit.display_path(), "<untitled>");
    }

    #[test]
    fn test_jsx_parses_with_tsx_grammar() {
        let unit = parse_unit("const el = <div>{load()}</div>;", Some(Path::new("view.jsx"))).unwrap();
        assert!(!unit.root().has_error());
    }

    #[test]
    fn test_enclosing_class_stops_at_function_expression() {
        let src = "class A { m() { const f = function () { this.x(); }; const g = () => this.y(); } }";
        let unit = parse_unit(src, None).unwrap();
        let root = unit.root();
        let x = root.descendant_for_byte_range(src.find("this.x").unwrap(), src.find("this.x").unwrap() + 4).unwrap();
        let y = root.descendant_for_byte_range(src.find("this.y").unwrap(), src.find("this.y").unwrap() + 4).unwrap();
        assert!(enclosing_class(x).is_none());
        let class = enclosing_class(y).unwrap();
        assert_eq!(class_name(class, src), Some("A"));
    }
}
