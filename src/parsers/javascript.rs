//! JavaScript / TypeScript parser: classes, functions, methods, interfaces,
//! imports and top-level variables via tree-sitter. One grammar instance per
//! dialect, lazily initialized.

use std::path::Path;

use tree_sitter::Node;

use super::{LanguageParser, ParseBuilder, first_line};
use crate::{NodeKind, ParseResult, ParsedNode, RelKind};

#[derive(Clone, Copy, PartialEq)]
enum Dialect {
    Js,
    Ts,
    Tsx,
}

pub struct JsTsParser {
    js: Option<tree_sitter::Parser>,
    ts: Option<tree_sitter::Parser>,
    tsx: Option<tree_sitter::Parser>,
}

impl JsTsParser {
    pub fn new() -> Self {
        JsTsParser { js: None, ts: None, tsx: None }
    }

    fn parser_for(&mut self, dialect: Dialect) -> &mut tree_sitter::Parser {
        match dialect {
            Dialect::Js => self.js.get_or_insert_with(|| {
                let mut p = tree_sitter::Parser::new();
                p.set_language(&tree_sitter_javascript::LANGUAGE.into())
                    .expect("Error loading JavaScript grammar");
                p
            }),
            Dialect::Ts => self.ts.get_or_insert_with(|| {
                let mut p = tree_sitter::Parser::new();
                p.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
                    .expect("Error loading TypeScript grammar");
                p
            }),
            Dialect::Tsx => self.tsx.get_or_insert_with(|| {
                let mut p = tree_sitter::Parser::new();
                p.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())
                    .expect("Error loading TSX grammar");
                p
            }),
        }
    }
}

impl Default for JsTsParser {
    fn default() -> Self {
        Self::new()
    }
}

fn dialect_of(path: &str) -> Dialect {
    match Path::new(path).extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()) {
        Some(e) if e == "ts" => Dialect::Ts,
        Some(e) if e == "tsx" => Dialect::Tsx,
        _ => Dialect::Js,
    }
}

impl LanguageParser for JsTsParser {
    fn language(&self) -> &'static str {
        "javascript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "mjs", "cjs", "ts", "tsx"]
    }

    fn parse(&mut self, path: &str, content: &str) -> ParseResult {
        let dialect = dialect_of(path);
        let language: &'static str =
            if dialect == Dialect::Js { "javascript" } else { "typescript" };

        let tree = match self.parser_for(dialect).parse(content, None) {
            Some(t) => t,
            None => return ParseResult::failed(path, language, "tree-sitter parse failed".into()),
        };

        let mut b = ParseBuilder::new(path, language);
        let root = tree.root_node();
        walk(root, content, path, language, &mut b, &Scope { parent: 0, owner: 0, class_name: None });

        let result = b.finish();
        if root.has_error() && result.nodes.len() == 1 {
            return ParseResult::failed(path, language, "file contains only syntax errors".into());
        }
        result
    }
}

struct Scope<'a> {
    parent: u32,
    owner: u32,
    class_name: Option<&'a str>,
}

fn walk(node: Node, source: &str, path: &str, lang: &str, b: &mut ParseBuilder, scope: &Scope) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "import_statement" => extract_import(child, source, path, lang, b, scope.parent),
            "class_declaration" | "abstract_class_declaration" => {
                extract_class(child, source, path, lang, b, scope)
            }
            "interface_declaration" => extract_interface(child, source, path, lang, b, scope),
            "function_declaration" | "generator_function_declaration" => {
                extract_function(child, source, path, lang, b, scope)
            }
            "method_definition" => extract_method(child, source, path, lang, b, scope),
            "lexical_declaration" | "variable_declaration" => {
                extract_declaration(child, source, path, lang, b, scope)
            }
            "export_statement" => {
                // Unwrap `export ...` so the inner declaration is extracted.
                walk(child, source, path, lang, b, scope);
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

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

fn extract_import(node: Node, source: &str, path: &str, lang: &str, b: &mut ParseBuilder, parent: u32) {
    let Some(source_node) = node.child_by_field_name("source") else { return };
    let module = strip_quotes(node_text(source_node, source)).to_string();
    if module.is_empty() {
        return;
    }
    b.add_node(
        parent,
        ParsedNode {
            kind: NodeKind::Import,
            name: module,
            path: path.to_string(),
            language: Some(lang.to_string()),
            line: Some(line_of(node)),
            column: Some(column_of(node)),
            summary: Some(first_line(node_text(node, source))),
            usage_stats: None,
        },
    );
}

fn extract_class(node: Node, source: &str, path: &str, lang: &str, b: &mut ParseBuilder, scope: &Scope) {
    let Some(name_node) = node.child_by_field_name("name") else { return };
    let name = node_text(name_node, source).to_string();

    let class_id = b.add_node(
        scope.parent,
        ParsedNode {
            kind: NodeKind::Class,
            name: name.clone(),
            path: path.to_string(),
            language: Some(lang.to_string()),
            line: Some(line_of(node)),
            column: Some(column_of(node)),
            summary: Some(first_line(node_text(node, source))),
            usage_stats: None,
        },
    );

    // extends / implements live under class_heritage.
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "class_heritage" {
            continue;
        }
        let mut hc = child.walk();
        for clause in child.children(&mut hc) {
            match clause.kind() {
                "extends_clause" => {
                    for base in named_identifiers(clause, source) {
                        b.name_ref(class_id, &base, RelKind::Inherits);
                    }
                }
                "implements_clause" => {
                    for iface in named_identifiers(clause, source) {
                        b.name_ref(class_id, &iface, RelKind::Implements);
                    }
                }
                // JS grammar: class_heritage is `extends <expression>` directly.
                "identifier" => {
                    b.name_ref(class_id, node_text(clause, source), RelKind::Inherits);
                }
                _ => {}
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        walk(
            body,
            source,
            path,
            lang,
            b,
            &Scope { parent: class_id, owner: class_id, class_name: Some(&name) },
        );
    }
}

fn named_identifiers(node: Node, source: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "identifier" | "type_identifier" => out.push(node_text(child, source).to_string()),
            "generic_type" | "nested_type_identifier" | "member_expression" => {
                let text = node_text(child, source);
                let base = text.split(['<', '.']).next().unwrap_or(text);
                out.push(base.trim().to_string());
            }
            _ => {}
        }
    }
    out
}

fn extract_interface(node: Node, source: &str, path: &str, lang: &str, b: &mut ParseBuilder, scope: &Scope) {
    let Some(name_node) = node.child_by_field_name("name") else { return };
    let iface_id = b.add_node(
        scope.parent,
        ParsedNode {
            kind: NodeKind::Interface,
            name: node_text(name_node, source).to_string(),
            path: path.to_string(),
            language: Some(lang.to_string()),
            line: Some(line_of(node)),
            column: Some(column_of(node)),
            summary: Some(first_line(node_text(node, source))),
            usage_stats: None,
        },
    );
    // `interface A extends B`: extends_clause sits directly under the decl.
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "extends_clause" || child.kind() == "extends_type_clause" {
            for base in named_identifiers(child, source) {
                b.name_ref(iface_id, &base, RelKind::Inherits);
            }
        }
    }
}

fn extract_function(node: Node, source: &str, path: &str, lang: &str, b: &mut ParseBuilder, scope: &Scope) {
    let Some(name_node) = node.child_by_field_name("name") else { return };
    let fn_id = b.add_node(
        scope.parent,
        ParsedNode {
            kind: NodeKind::Function,
            name: node_text(name_node, source).to_string(),
            path: path.to_string(),
            language: Some(lang.to_string()),
            line: Some(line_of(node)),
            column: Some(column_of(node)),
            summary: Some(first_line(node_text(node, source))),
            usage_stats: None,
        },
    );
    if let Some(body) = node.child_by_field_name("body") {
        collect_calls(body, source, b, fn_id);
    }
}

fn extract_method(node: Node, source: &str, path: &str, lang: &str, b: &mut ParseBuilder, scope: &Scope) {
    let Some(name_node) = node.child_by_field_name("name") else { return };
    let bare = node_text(name_node, source).to_string();
    let name = match scope.class_name {
        Some(class) => format!("{}.{}", class, bare),
        None => bare,
    };
    let m_id = b.add_node(
        scope.parent,
        ParsedNode {
            kind: NodeKind::Method,
            name,
            path: path.to_string(),
            language: Some(lang.to_string()),
            line: Some(line_of(node)),
            column: Some(column_of(node)),
            summary: Some(first_line(node_text(node, source))),
            usage_stats: None,
        },
    );
    if let Some(body) = node.child_by_field_name("body") {
        collect_calls(body, source, b, m_id);
    }
}

fn extract_declaration(node: Node, source: &str, path: &str, lang: &str, b: &mut ParseBuilder, scope: &Scope) {
    let mut cursor = node.walk();
    for declarator in node.children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = declarator.child_by_field_name("name") else { continue };
        if name_node.kind() != "identifier" {
            continue;
        }
        let name = node_text(name_node, source).to_string();
        let value = declarator.child_by_field_name("value");

        // `const f = () => ...` and `const f = function ...` count as functions.
        let is_function = value
            .map(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function"))
            .unwrap_or(false);

        // `const x = require('mod')` counts as an import.
        let required = value.and_then(|v| require_target(v, source));

        if let Some(module) = required {
            b.add_node(
                scope.parent,
                ParsedNode {
                    kind: NodeKind::Import,
                    name: module,
                    path: path.to_string(),
                    language: Some(lang.to_string()),
                    line: Some(line_of(declarator)),
                    column: Some(column_of(declarator)),
                    summary: Some(first_line(node_text(node, source))),
                    usage_stats: None,
                },
            );
        } else if is_function {
            let fn_id = b.add_node(
                scope.parent,
                ParsedNode {
                    kind: NodeKind::Function,
                    name,
                    path: path.to_string(),
                    language: Some(lang.to_string()),
                    line: Some(line_of(declarator)),
                    column: Some(column_of(declarator)),
                    summary: Some(first_line(node_text(node, source))),
                    usage_stats: None,
                },
            );
            if let Some(v) = value {
                if let Some(body) = v.child_by_field_name("body") {
                    collect_calls(body, source, b, fn_id);
                }
            }
        } else if scope.owner == 0 && scope.class_name.is_none() {
            b.add_node(
                scope.parent,
                ParsedNode {
                    kind: NodeKind::Variable,
                    name,
                    path: path.to_string(),
                    language: Some(lang.to_string()),
                    line: Some(line_of(declarator)),
                    column: Some(column_of(declarator)),
                    summary: None,
                    usage_stats: Some(r#"{"scope":"global"}"#.into()),
                },
            );
        }
    }
}

fn require_target(value: Node, source: &str) -> Option<String> {
    if value.kind() != "call_expression" {
        return None;
    }
    let function = value.child_by_field_name("function")?;
    if node_text(function, source) != "require" {
        return None;
    }
    let args = value.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    for arg in args.children(&mut cursor) {
        if arg.kind() == "string" {
            return Some(strip_quotes(node_text(arg, source)).to_string());
        }
    }
    None
}

fn collect_calls(node: Node, source: &str, b: &mut ParseBuilder, owner: u32) {
    if node.kind() == "call_expression" {
        if let Some(function) = node.child_by_field_name("function") {
            let callee = match function.kind() {
                "identifier" => Some(node_text(function, source).to_string()),
                "member_expression" => function
                    .child_by_field_name("property")
                    .map(|p| node_text(p, source).to_string()),
                _ => None,
            };
            if let Some(callee) = callee {
                if !callee.is_empty() && callee != "require" {
                    b.name_ref(owner, &callee, RelKind::Calls);
                }
            }
        }
    }
    if matches!(
        node.kind(),
        "function_declaration" | "method_definition" | "class_declaration" | "arrow_function"
    ) {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_calls(child, source, b, owner);
    }
}
