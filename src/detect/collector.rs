//! Symbol collector: builds the call-scoped registries the heuristic tier reads.

use std::collections::{HashMap, VecDeque};

use tree_sitter::Node;

use super::heuristic::judge_function;
use super::types::SymbolTable;
use super::walk::{binding_site, own_return_values, walk_tree, BindingKind, Cancellation};
use crate::source::{
    class_name, enclosing_class, is_function_like, node_text, property_key, unwrap_expression,
};
use crate::PromiseError;

/// Populate every registry for the unit rooted at `root`.
///
/// Instance bindings are syntactic and gathered in one pass. A second pass
/// records every definition that could enter a registry together with the
/// registry entries its `return` calls read. Each definition is judged once,
/// then again only when one of those entries is registered, so collection is
/// linear in the unit and independent of lexical order.
pub(crate) fn collect_symbols<'t>(
    root: Node<'t>,
    source: &str,
    cancel: &Cancellation<'_>,
) -> Result<SymbolTable, PromiseError> {
    let mut table = SymbolTable::default();

    walk_tree(root, cancel, |node| bind_instance(node, source, &mut table))?;

    let mut definitions = Vec::new();
    walk_tree(root, cancel, |node| definitions_at(node, source, &mut definitions))?;

    let mut waiting: HashMap<Entry, Vec<usize>> = HashMap::new();
    for (index, definition) in definitions.iter().enumerate() {
        for entry in definition.triggers(source, &table) {
            waiting.entry(entry).or_default().push(index);
        }
    }

    let mut queue = VecDeque::new();
    for definition in &definitions {
        if definition.judge(source, &table) && table.register(&definition.target) {
            queue.push_back(definition.target.clone());
        }
    }

    let mut rejudged = 0usize;
    while let Some(entry) = queue.pop_front() {
        let Some(dependents) = waiting.remove(&entry) else {
            continue;
        };
        for index in dependents {
            let definition = &definitions[index];
            if table.contains(&definition.target) {
                continue;
            }
            rejudged += 1;
            if definition.judge(source, &table) && table.register(&definition.target) {
                queue.push_back(definition.target.clone());
            }
        }
    }

    tracing::trace!(
        definitions = definitions.len(),
        rejudged,
        entries = table.len(),
        "Symbol collection complete"
    );
    Ok(table)
}

// ─── Instance bindings ──────────────────────────────────────────────

/// `v = new ClassName(...)`, as a declarator or a plain assignment.
fn bind_instance(node: Node, source: &str, table: &mut SymbolTable) {
    let Some((target, value)) = assigned_value(node) else {
        return;
    };
    let value = unwrap_expression(value);
    if value.kind() != "new_expression" {
        return;
    }
    if let Some(ctor) = value.child_by_field_name("constructor") {
        if ctor.kind() == "identifier" {
            table.bind_instance(node_text(target, source), node_text(ctor, source));
        }
    }
}

/// `(identifier, value)` for `const x = value` and `x = value`.
fn assigned_value(node: Node) -> Option<(Node, Node)> {
    let (target, value) = match node.kind() {
        "variable_declarator" => (
            node.child_by_field_name("name")?,
            node.child_by_field_name("value")?,
        ),
        "assignment_expression" => (
            node.child_by_field_name("left")?,
            node.child_by_field_name("right")?,
        ),
        _ => return None,
    };
    (target.kind() == "identifier").then_some((target, value))
}

// ─── Registry entries and definitions ───────────────────────────────

/// One entry in a classification-dependent registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Entry {
    Function(String),
    Method { class: String, method: String },
    Member { object: String, member: String },
}

impl SymbolTable {
    fn contains(&self, entry: &Entry) -> bool {
        match entry {
            Entry::Function(name) => self.is_promise_function(name),
            Entry::Method { class, method } => self.is_promise_method(class, method),
            Entry::Member { object, member } => self.is_promise_member(object, member),
        }
    }

    /// Returns true if `entry` was not registered before.
    fn register(&mut self, entry: &Entry) -> bool {
        match entry {
            Entry::Function(name) => self.add_function(name),
            Entry::Method { class, method } => self.add_method(class, method),
            Entry::Member { object, member } => self.add_object_member(object, member),
        }
    }
}

/// What decides whether a definition is promise-producing.
enum Verdict<'t> {
    /// The function-level rule applied to this node.
    Function(Node<'t>),
    /// `{ load: fetchUser }` or `{ fetchUser }`: positive iff the alias is.
    Alias(String),
}

/// A definition that enters the registry as `target` when judged positive.
struct Definition<'t> {
    target: Entry,
    verdict: Verdict<'t>,
}

impl<'t> Definition<'t> {
    fn judge(&self, source: &str, table: &SymbolTable) -> bool {
        match &self.verdict {
            Verdict::Function(function) => judge_function(*function, source, table),
            Verdict::Alias(name) => table.is_promise_function(name),
        }
    }

    /// Registry entries whose registration can flip this definition positive.
    fn triggers(&self, source: &str, table: &SymbolTable) -> Vec<Entry> {
        match &self.verdict {
            Verdict::Function(function) => own_return_values(*function)
                .into_iter()
                .map(unwrap_expression)
                .filter(|value| value.kind() == "call_expression")
                .flat_map(|call| call_triggers(call, source, table))
                .collect(),
            Verdict::Alias(name) => vec![Entry::Function(name.clone())],
        }
    }
}

/// Entries the call-level rule consults for `call`.
fn call_triggers(call: Node, source: &str, table: &SymbolTable) -> Vec<Entry> {
    let Some(callee) = call.child_by_field_name("function") else {
        return Vec::new();
    };
    match callee.kind() {
        "identifier" => vec![Entry::Function(node_text(callee, source).to_string())],
        "member_expression" => {
            let (Some(receiver), Some(property)) = (
                callee.child_by_field_name("object"),
                callee.child_by_field_name("property"),
            ) else {
                return Vec::new();
            };
            let member = node_text(property, source).to_string();
            match receiver.kind() {
                "identifier" => {
                    let receiver = node_text(receiver, source);
                    let mut entries = vec![
                        Entry::Method { class: receiver.to_string(), method: member.clone() },
                        Entry::Member { object: receiver.to_string(), member: member.clone() },
                    ];
                    if let Some(class) = table.instance_class(receiver) {
                        entries.push(Entry::Method { class: class.to_string(), method: member });
                    }
                    entries
                }
                "this" => enclosing_class(call)
                    .and_then(|class| class_name(class, source))
                    .map(|class| vec![Entry::Method { class: class.to_string(), method: member }])
                    .unwrap_or_default(),
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

/// Record whatever registry entries `node` may contribute.
fn definitions_at<'t>(node: Node<'t>, source: &str, out: &mut Vec<Definition<'t>>) {
    if is_function_like(node) {
        if let Some(target) = function_entry(node, source) {
            out.push(Definition { target, verdict: Verdict::Function(node) });
        }
        return;
    }
    let Some((target, value)) = assigned_value(node) else {
        return;
    };
    let value = unwrap_expression(value);
    if value.kind() == "object" {
        object_definitions(node_text(target, source), value, source, out);
    }
}

/// Registry entry a function-like node would be registered under.
fn function_entry(function: Node, source: &str) -> Option<Entry> {
    match function.kind() {
        "function_declaration" | "generator_function_declaration" => function
            .child_by_field_name("name")
            .map(|name| Entry::Function(node_text(name, source).to_string())),
        "method_definition" => {
            // Object-literal methods are registered through their object
            let class = owning_class(function, source)?;
            let method = function
                .child_by_field_name("name")
                .and_then(|n| property_key(n, source))?;
            Some(Entry::Method { class: class.to_string(), method: method.to_string() })
        }
        _ => {
            let site = binding_site(function)?;
            let name = site.name?;
            match site.kind {
                BindingKind::Variable => Some(Entry::Function(node_text(name, source).to_string())),
                BindingKind::ClassField => {
                    let class = owning_class(site.site, source)?;
                    let field = property_key(name, source)?;
                    Some(Entry::Method { class: class.to_string(), method: field.to_string() })
                }
                BindingKind::Property | BindingKind::MemberAssignment => None,
            }
        }
    }
}

/// Name of the class whose body directly contains `member`.
fn owning_class<'a>(member: Node, source: &'a str) -> Option<&'a str> {
    let body = member.parent()?;
    if body.kind() != "class_body" {
        return None;
    }
    enclosing_class(member).and_then(|class| class_name(class, source))
}

/// One definition per member of an object literal that may produce promises.
fn object_definitions<'t>(object: &str, literal: Node<'t>, source: &str, out: &mut Vec<Definition<'t>>) {
    let member_entry = |member: &str| Entry::Member {
        object: object.to_string(),
        member: member.to_string(),
    };
    let mut cursor = literal.walk();
    for child in literal.named_children(&mut cursor) {
        match child.kind() {
            // { fetchUser }
            "shorthand_property_identifier" => {
                let name = node_text(child, source);
                out.push(Definition {
                    target: member_entry(name),
                    verdict: Verdict::Alias(name.to_string()),
                });
            }
            // { load: fetchUser } or { load: async () => … }
            "pair" => {
                let (Some(key), Some(value)) = (
                    child.child_by_field_name("key"),
                    child.child_by_field_name("value"),
                ) else {
                    continue;
                };
                let Some(key) = property_key(key, source) else {
                    continue;
                };
                let value = unwrap_expression(value);
                let verdict = match value.kind() {
                    "identifier" => Verdict::Alias(node_text(value, source).to_string()),
                    _ if is_function_like(value) => Verdict::Function(value),
                    _ => continue,
                };
                out.push(Definition { target: member_entry(key), verdict });
            }
            // { async save() { … } }
            "method_definition" => {
                if let Some(name) = child
                    .child_by_field_name("name")
                    .and_then(|n| property_key(n, source))
                {
                    out.push(Definition {
                        target: member_entry(name),
                        verdict: Verdict::Function(child),
                    });
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::parse_unit;

    fn collect(source: &str) -> SymbolTable {
        let unit = parse_unit(source, None).unwrap();
        collect_symbols(unit.root(), &unit.source, &Cancellation::default()).unwrap()
    }

    #[test]
    fn test_collects_async_function_declaration() {
        let table = collect("async function load() {}\nfunction plain() { return 1 }");
        assert!(table.is_promise_function("load"));
        assert!(!table.is_promise_function("plain"));
    }

    #[test]
    fn test_collects_bound_arrow_and_function_expression() {
        let table = collect(
            "const a = async () => 1;\nlet b = function () { return fetch('/x') };\nvar c;\nc = () => new Promise(r => r());",
        );
        assert!(table.is_promise_function("a"));
        assert!(table.is_promise_function("b"));
        assert!(table.is_promise_function("c"));
    }

    #[test]
    fn test_forward_reference_resolves_through_worklist() {
        // `outer` is defined before the function it returns
        let table = collect("function outer() { return inner() }\nasync function inner() {}");
        assert!(table.is_promise_function("inner"));
        assert!(table.is_promise_function("outer"));
    }

    #[test]
    fn test_chain_of_forward_references() {
        let table = collect(
            "function a() { return b() }\nfunction b() { return c() }\nfunction c() { return d() }\nasync function d() {}",
        );
        for name in ["a", "b", "c", "d"] {
            assert!(table.is_promise_function(name), "{} should be registered", name);
        }
    }

    #[test]
    fn test_long_reverse_chain_of_forward_references() {
        let links = 3000;
        let mut source = String::new();
        for i in 0..links {
            source.push_str(&format!("function f{}() {{ return f{}() }}\n", i, i + 1));
        }
        source.push_str(&format!("async function f{}() {{}}\n", links));

        let table = collect(&source);
        assert_eq!(table.functions.len(), links + 1);
        assert!(table.is_promise_function("f0"));
    }

    #[test]
    fn test_forward_references_through_methods_and_members() {
        let table = collect(
            "function viaThis() { return repo.find() }\nfunction viaMember() { return api.load() }\nconst repo = new Repo();\nconst api = { load: later };\nclass Repo { find() { return this.fetchAll() }\n  async fetchAll() {} }\nasync function later() {}",
        );
        assert!(table.is_promise_method("Repo", "find"));
        assert!(table.is_promise_member("api", "load"));
        assert!(table.is_promise_function("viaThis"));
        assert!(table.is_promise_function("viaMember"));
    }

    #[test]
    fn test_collects_class_methods_and_fields() {
        let table = collect(
            "class Repo {\n  async find() {}\n  sync() { return 1 }\n  save = async () => {};\n  static load(): Promise<void> { return null as any }\n}",
        );
        assert!(table.is_promise_method("Repo", "find"));
        assert!(table.is_promise_method("Repo", "save"));
        assert!(table.is_promise_method("Repo", "load"));
        assert!(!table.is_promise_method("Repo", "sync"));
    }

    #[test]
    fn test_collects_class_expression_methods_under_bound_name() {
        let table = collect("const Store = class { async get() {} };");
        assert!(table.is_promise_method("Store", "get"));
    }

    #[test]
    fn test_collects_instances() {
        let table = collect("const repo = new Repo();\nlet other;\nother = new Other(1, 2);");
        assert_eq!(table.instance_class("repo"), Some("Repo"));
        assert_eq!(table.instance_class("other"), Some("Other"));
    }

    #[test]
    fn test_instance_rebinding_keeps_last_class_and_terminates() {
        let table = collect("let v = new A();\nv = new B();");
        assert_eq!(table.instance_class("v"), Some("B"));
    }

    #[test]
    fn test_collects_object_literal_members() {
        let table = collect(
            "async function fetchUser() {}\nconst api = {\n  fetchUser,\n  load: fetchUser,\n  async save() {},\n  remove: () => fetch('/x'),\n  count: 3,\n  name() { return 'api' },\n};",
        );
        let members = &table.object_literals["api"];
        for m in ["fetchUser", "load", "save", "remove"] {
            assert!(members.contains(m), "{} should be a promise member", m);
        }
        assert!(!members.contains("count"));
        assert!(!members.contains("name"));
    }

    #[test]
    fn test_object_literal_sees_functions_declared_later() {
        let table = collect("const api = { load };\nasync function load() {}");
        assert!(table.is_promise_member("api", "load"));
    }

    #[test]
    fn test_object_literal_methods_are_not_registered_as_class_methods() {
        let table = collect("const api = { async get() {} };");
        assert!(table.methods.is_empty());
        assert!(!table.is_promise_function("get"));
    }

    #[test]
    fn test_collection_is_cancellable() {
        let unit = parse_unit("async function a() {}\nasync function b() {}", None).unwrap();
        let flag = std::sync::atomic::AtomicBool::new(true);
        let result = collect_symbols(unit.root(), &unit.source, &Cancellation::new(Some(&flag)));
        assert!(matches!(result, Err(PromiseError::Cancelled)));
    }
}
