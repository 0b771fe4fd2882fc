//! C parser: functions, structs, includes and globals via tree-sitter-c.

use tree_sitter::Node;

use super::{LanguageParser, ParseBuilder, first_line};
use crate::{NodeKind, ParseResult, ParsedNode, RelKind};

pub struct CParser {
    parser: tree_sitter::Parser,
}

impl CParser {
    pub fn new() -> Self {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&tree_sitter_c::LANGUAGE.into()).expect("Error loading C grammar");
        CParser { parser }
    }
}

impl Default for CParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for CParser {
    fn language(&self) -> &'static str {
        "c"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["c", "h"]
    }

    fn parse(&mut self, path: &str, content: &str) -> ParseResult {
        let tree = match self.parser.parse(content, None) {
            Some(t) => t,
            None => return ParseResult::failed(path, "c", "tree-sitter parse failed".into()),
        };

        let mut b = ParseBuilder::new(path, "c");
        let root = tree.root_node();
        walk(root, content, path, &mut b);

        let result = b.finish();
        if root.has_error() && result.nodes.len() == 1 {
            return ParseResult::failed(path, "c", "file contains only syntax errors".into());
        }
        result
    }
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn line_of(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn walk(root: Node, source: &str, path: &str, b: &mut ParseBuilder) {
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        match child.kind() {
            "preproc_include" => extract_include(child, source, path, b),
            "function_definition" => extract_function(child, source, path, b),
            "struct_specifier" => extract_struct(child, source, path, b),
            "type_definition" => {
                // typedef struct { ... } Name; extract the inner struct.
                let mut tc = child.walk();
                for inner in child.children(&mut tc) {
                    if inner.kind() == "struct_specifier" {
                        extract_struct(inner, source, path, b);
                    }
                }
            }
            "declaration" => {
                // A bare `struct point { ... };` arrives as a declaration
                // whose type is the struct specifier.
                if let Some(ty) = child.child_by_field_name("type") {
                    if ty.kind() == "struct_specifier" {
                        extract_struct(ty, source, path, b);
                    }
                }
                extract_global(child, source, path, b);
            }
            _ => {}
        }
    }
}

fn extract_include(node: Node, source: &str, path: &str, b: &mut ParseBuilder) {
    let Some(target) = node.child_by_field_name("path") else { return };
    let name = node_text(target, source).trim_matches(|c| c == '"' || c == '<' || c == '>').to_string();
    if name.is_empty() {
        return;
    }
    b.add_node(
        0,
        ParsedNode {
            kind: NodeKind::Import,
            name,
            path: path.to_string(),
            language: Some("c".into()),
            line: Some(line_of(node)),
            column: None,
            summary: Some(first_line(node_text(node, source))),
            usage_stats: None,
        },
    );
}

fn extract_function(node: Node, source: &str, path: &str, b: &mut ParseBuilder) {
    let Some(name) = declarator_name(node, source) else { return };
    let fn_id = b.add_node(
        0,
        ParsedNode {
            kind: NodeKind::Function,
            name,
            path: path.to_string(),
            language: Some("c".into()),
            line: Some(line_of(node)),
            column: None,
            summary: Some(first_line(node_text(node, source))),
            usage_stats: None,
        },
    );
    if let Some(body) = node.child_by_field_name("body") {
        collect_calls(body, source, b, fn_id);
    }
}

/// Unwrap pointer/function declarators down to the identifier.
fn declarator_name(node: Node, source: &str) -> Option<String> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "identifier" => return Some(node_text(current, source).to_string()),
            "function_declarator" | "pointer_declarator" | "parenthesized_declarator" => {
                current = current.child_by_field_name("declarator").or_else(|| current.child(0))?;
            }
            _ => return None,
        }
    }
}

fn extract_struct(node: Node, source: &str, path: &str, b: &mut ParseBuilder) {
    let Some(name_node) = node.child_by_field_name("name") else { return };
    // Forward declarations have no body; skip them so (kind, name, path)
    // stays unique when the definition follows.
    if node.child_by_field_name("body").is_none() {
        return;
    }
    b.add_node(
        0,
        ParsedNode {
            kind: NodeKind::Class,
            name: node_text(name_node, source).to_string(),
            path: path.to_string(),
            language: Some("c".into()),
            line: Some(line_of(node)),
            column: None,
            summary: Some(first_line(node_text(node, source))),
            usage_stats: None,
        },
    );
}

fn extract_global(node: Node, source: &str, path: &str, b: &mut ParseBuilder) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let declarator = match child.kind() {
            "init_declarator" => child.child_by_field_name("declarator"),
            "identifier" => Some(child),
            _ => None,
        };
        let Some(d) = declarator else { continue };
        if d.kind() != "identifier" {
            continue;
        }
        b.add_node(
            0,
            ParsedNode {
                kind: NodeKind::Variable,
                name: node_text(d, source).to_string(),
                path: path.to_string(),
                language: Some("c".into()),
                line: Some(line_of(node)),
                column: None,
                summary: None,
                usage_stats: Some(r#"{"scope":"global"}"#.into()),
            },
        );
    }
}

fn collect_calls(node: Node, source: &str, b: &mut ParseBuilder, owner: u32) {
    if node.kind() == "call_expression" {
        if let Some(function) = node.child_by_field_name("function") {
            if function.kind() == "identifier" {
                b.name_ref(owner, node_text(function, source), RelKind::Calls);
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_calls(child, source, b, owner);
    }
}
