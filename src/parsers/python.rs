//! Python parser: extracts files, classes, functions, methods, imports and
//! module-level variables with tree-sitter.

use tree_sitter::Node;

use super::{LanguageParser, ParseBuilder, first_line};
use crate::{NodeKind, ParseResult, ParsedNode, RelKind};

pub struct PythonParser {
    parser: tree_sitter::Parser,
}

impl PythonParser {
    pub fn new() -> Self {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .expect("Error loading Python grammar");
        PythonParser { parser }
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for PythonParser {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi", "pyw"]
    }

    fn parse(&mut self, path: &str, content: &str) -> ParseResult {
        let tree = match self.parser.parse(content, None) {
            Some(t) => t,
            None => return ParseResult::failed(path, "python", "tree-sitter parse failed".into()),
        };

        let mut b = ParseBuilder::new(path, "python");
        let root = tree.root_node();
        walk(root, content, path, &mut b, &Scope { parent: 0, owner: 0, class_name: None });

        let result = b.finish();
        if root.has_error() && result.nodes.len() == 1 {
            return ParseResult::failed(path, "python", "file contains only syntax errors".into());
        }
        result
    }
}

/// Walk context: `parent` contains emitted nodes, `owner` attributes calls,
/// `class_name` qualifies methods.
struct Scope<'a> {
    parent: u32,
    owner: u32,
    class_name: Option<&'a str>,
}

fn walk(node: Node, source: &str, path: &str, b: &mut ParseBuilder, scope: &Scope) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "import_statement" => extract_import(child, source, path, b, scope.parent),
            "import_from_statement" => extract_from_import(child, source, path, b, scope.parent),
            "class_definition" => extract_class(child, source, path, b, scope),
            "function_definition" => extract_function(child, source, path, b, scope),
            "decorated_definition" => {
                // Recurse so the wrapped definition is extracted; decorators
                // themselves are recorded in usage_stats by the extractors.
                walk(child, source, path, b, scope);
            }
            "expression_statement" => {
                if scope.class_name.is_none() && scope.owner == 0 {
                    extract_global_assignment(child, source, path, b, scope.parent);
                }
                collect_calls(child, source, b, scope.owner);
            }
            _ => {
                collect_calls(child, source, b, scope.owner);
            }
        }
    }
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn line_of(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn column_of(node: Node) -> u32 {
    node.start_position().column as u32
}

fn extract_import(node: Node, source: &str, path: &str, b: &mut ParseBuilder, parent: u32) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let module = match child.kind() {
            "dotted_name" => node_text(child, source).to_string(),
            "aliased_import" => child
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string())
                .unwrap_or_default(),
            _ => continue,
        };
        if module.is_empty() {
            continue;
        }
        b.add_node(
            parent,
            ParsedNode {
                kind: NodeKind::Import,
                name: module,
                path: path.to_string(),
                language: Some("python".into()),
                line: Some(line_of(child)),
                column: Some(column_of(child)),
                summary: Some(first_line(node_text(node, source))),
                usage_stats: None,
            },
        );
    }
}

fn extract_from_import(node: Node, source: &str, path: &str, b: &mut ParseBuilder, parent: u32) {
    let Some(module_node) = node.child_by_field_name("module_name") else { return };
    let module = node_text(module_node, source).to_string();
    if module.is_empty() {
        return;
    }
    b.add_node(
        parent,
        ParsedNode {
            kind: NodeKind::Import,
            name: module,
            path: path.to_string(),
            language: Some("python".into()),
            line: Some(line_of(node)),
            column: Some(column_of(node)),
            summary: Some(first_line(node_text(node, source))),
            usage_stats: None,
        },
    );
}

fn extract_class(node: Node, source: &str, path: &str, b: &mut ParseBuilder, scope: &Scope) {
    let Some(name_node) = node.child_by_field_name("name") else { return };
    let name = node_text(name_node, source).to_string();

    let class_id = b.add_node(
        scope.parent,
        ParsedNode {
            kind: NodeKind::Class,
            name: name.clone(),
            path: path.to_string(),
            language: Some("python".into()),
            line: Some(line_of(node)),
            column: Some(column_of(node)),
            summary: Some(first_line(node_text(node, source))),
            usage_stats: decorators_blob(node, source),
        },
    );

    // Base classes -> inherits references, resolved by the assembler.
    if let Some(supers) = node.child_by_field_name("superclasses") {
        let mut cursor = supers.walk();
        for base in supers.children(&mut cursor) {
            if base.kind() == "identifier" || base.kind() == "attribute" {
                let base_name = node_text(base, source);
                let unqualified = base_name.rsplit('.').next().unwrap_or(base_name);
                b.name_ref(class_id, unqualified, RelKind::Inherits);
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        walk(
            body,
            source,
            path,
            b,
            &Scope { parent: class_id, owner: class_id, class_name: Some(&name) },
        );
    }
}

fn extract_function(node: Node, source: &str, path: &str, b: &mut ParseBuilder, scope: &Scope) {
    let Some(name_node) = node.child_by_field_name("name") else { return };
    let bare = node_text(name_node, source).to_string();

    let (kind, name) = match scope.class_name {
        Some(class) => (NodeKind::Method, format!("{}.{}", class, bare)),
        None => (NodeKind::Function, bare),
    };

    let fn_id = b.add_node(
        scope.parent,
        ParsedNode {
            kind,
            name,
            path: path.to_string(),
            language: Some("python".into()),
            line: Some(line_of(node)),
            column: Some(column_of(node)),
            summary: Some(signature_line(node, source)),
            usage_stats: decorators_blob(node, source),
        },
    );

    if let Some(body) = node.child_by_field_name("body") {
        // Nested defs belong to this function; calls inside attribute to it.
        walk(body, source, path, b, &Scope { parent: fn_id, owner: fn_id, class_name: None });
    }
}

fn extract_global_assignment(stmt: Node, source: &str, path: &str, b: &mut ParseBuilder, parent: u32) {
    let Some(expr) = stmt.child(0) else { return };
    if expr.kind() != "assignment" {
        return;
    }
    let Some(left) = expr.child_by_field_name("left") else { return };
    if left.kind() != "identifier" {
        return;
    }
    let name = node_text(left, source).to_string();
    b.add_node(
        parent,
        ParsedNode {
            kind: NodeKind::Variable,
            name,
            path: path.to_string(),
            language: Some("python".into()),
            line: Some(line_of(stmt)),
            column: Some(column_of(stmt)),
            summary: None,
            usage_stats: Some(r#"{"scope":"global"}"#.into()),
        },
    );
}

/// Record every call inside `node` against `owner` (0 = module level).
fn collect_calls(node: Node, source: &str, b: &mut ParseBuilder, owner: u32) {
    if node.kind() == "call" {
        if let Some(function) = node.child_by_field_name("function") {
            let callee = match function.kind() {
                "identifier" => Some(node_text(function, source).to_string()),
                "attribute" => function
                    .child_by_field_name("attribute")
                    .map(|a| node_text(a, source).to_string()),
                _ => None,
            };
            if let Some(callee) = callee {
                if !callee.is_empty() {
                    b.name_ref(owner, &callee, RelKind::Calls);
                }
            }
        }
    }
    // Do not descend into nested definitions here; walk() owns those.
    if matches!(node.kind(), "function_definition" | "class_definition") {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_calls(child, source, b, owner);
    }
}

fn decorators_blob(definition: Node, source: &str) -> Option<String> {
    let parent = definition.parent()?;
    if parent.kind() != "decorated_definition" {
        return None;
    }
    let mut names = Vec::new();
    let mut cursor = parent.walk();
    for child in parent.children(&mut cursor) {
        if child.kind() == "decorator" {
            names.push(node_text(child, source).trim_start_matches('@').to_string());
        }
    }
    if names.is_empty() {
        None
    } else {
        serde_json::to_string(&serde_json::json!({ "decorators": names })).ok()
    }
}

fn signature_line(node: Node, source: &str) -> String {
    first_line(node_text(node, source))
}
