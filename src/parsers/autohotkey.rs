//! AutoHotkey parser, the "odd grammar" path. No maintained tree-sitter
//! grammar exists, so this is a deterministic line-oriented scanner that
//! recognizes functions, classes, hotkeys, GUI controls, COM objects,
//! includes and global assignments.

use regex::Regex;

use super::{LanguageParser, ParseBuilder, first_line};
use crate::{NodeKind, ParseResult, ParsedNode, RelKind};

pub struct AutoHotkeyParser {
    re_include: Regex,
    re_class: Regex,
    re_func: Regex,
    re_hotkey: Regex,
    re_gui_add: Regex,
    re_com_create: Regex,
    re_assign: Regex,
    re_call: Regex,
}

impl AutoHotkeyParser {
    pub fn new() -> Self {
        AutoHotkeyParser {
            re_include: Regex::new(r"(?i)^\s*#Include(?:Again)?[\s,]+\*?i?\s*(.+?)\s*$").unwrap(),
            re_class: Regex::new(r"^\s*class\s+(\w+)(?:\s+extends\s+(\w+))?").unwrap(),
            re_func: Regex::new(r"^\s*([A-Za-z_]\w*)\s*\(([^)]*)\)\s*\{?\s*$").unwrap(),
            re_hotkey: Regex::new(r"^\s*([^\s:;]+)::").unwrap(),
            re_gui_add: Regex::new(r"(?i)Gui\s*,?\s*(?:\w+\s*:\s*)?Add\s*,\s*(\w+)").unwrap(),
            re_com_create: Regex::new(r#"(?i)ComObj(?:Create|Active)\(\s*"([^"]+)""#).unwrap(),
            re_assign: Regex::new(r"^([A-Za-z_]\w*)\s*:=").unwrap(),
            re_call: Regex::new(r"([A-Za-z_]\w*)\s*\(").unwrap(),
        }
    }
}

impl Default for AutoHotkeyParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Control-flow words that look like `name(...)` but are not definitions or calls.
const KEYWORDS: &[&str] = &["if", "else", "while", "loop", "for", "return", "switch", "catch", "try"];

impl LanguageParser for AutoHotkeyParser {
    fn language(&self) -> &'static str {
        "autohotkey"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ahk", "ahk2", "au3"]
    }

    fn parse(&mut self, path: &str, content: &str) -> ParseResult {
        let mut b = ParseBuilder::new(path, "autohotkey");

        // (container local id, class name if class, depth at which it opened)
        let mut stack: Vec<(u32, Option<String>, i32)> = Vec::new();
        let mut depth: i32 = 0;

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx as u32 + 1;
            let line = strip_comment(raw);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let opens = trimmed.matches('{').count() as i32;
            let closes = trimmed.matches('}').count() as i32;

            let (container, class_name) = match stack.last() {
                Some((id, class, _)) => (*id, class.clone()),
                None => (0, None),
            };

            if let Some(caps) = self.re_include.captures(trimmed) {
                let target = caps[1].trim().to_string();
                b.add_node(
                    0,
                    ParsedNode {
                        kind: NodeKind::Import,
                        name: target,
                        path: path.to_string(),
                        language: Some("autohotkey".into()),
                        line: Some(line_no),
                        column: None,
                        summary: Some(first_line(trimmed)),
                        usage_stats: None,
                    },
                );
            } else if let Some(caps) = self.re_class.captures(trimmed) {
                let name = caps[1].to_string();
                let class_id = b.add_node(
                    container,
                    ParsedNode {
                        kind: NodeKind::Class,
                        name: name.clone(),
                        path: path.to_string(),
                        language: Some("autohotkey".into()),
                        line: Some(line_no),
                        column: None,
                        summary: Some(first_line(trimmed)),
                        usage_stats: None,
                    },
                );
                if let Some(base) = caps.get(2) {
                    b.name_ref(class_id, base.as_str(), RelKind::Inherits);
                }
                stack.push((class_id, Some(name), depth));
            } else if let Some(caps) = self.re_hotkey.captures(trimmed) {
                b.add_node(
                    container,
                    ParsedNode {
                        kind: NodeKind::Hotkey,
                        name: caps[1].to_string(),
                        path: path.to_string(),
                        language: Some("autohotkey".into()),
                        line: Some(line_no),
                        column: None,
                        summary: Some(first_line(trimmed)),
                        usage_stats: None,
                    },
                );
            } else if let Some(caps) = self.re_func.captures(trimmed) {
                let bare = caps[1].to_string();
                if !KEYWORDS.contains(&bare.to_lowercase().as_str()) {
                    let (kind, name) = match &class_name {
                        Some(class) => (NodeKind::Method, format!("{}.{}", class, bare)),
                        None => (NodeKind::Function, bare),
                    };
                    let fn_id = b.add_node(
                        container,
                        ParsedNode {
                            kind,
                            name,
                            path: path.to_string(),
                            language: Some("autohotkey".into()),
                            line: Some(line_no),
                            column: None,
                            summary: Some(first_line(trimmed)),
                            usage_stats: None,
                        },
                    );
                    stack.push((fn_id, None, depth));
                }
            } else {
                // Inside or outside a body: controls, COM objects, globals, calls.
                if let Some(caps) = self.re_gui_add.captures(trimmed) {
                    b.add_node(
                        container,
                        ParsedNode {
                            kind: NodeKind::GuiControl,
                            name: caps[1].to_string(),
                            path: path.to_string(),
                            language: Some("autohotkey".into()),
                            line: Some(line_no),
                            column: None,
                            summary: Some(first_line(trimmed)),
                            usage_stats: None,
                        },
                    );
                }
                if let Some(caps) = self.re_com_create.captures(trimmed) {
                    b.add_node(
                        container,
                        ParsedNode {
                            kind: NodeKind::ComObject,
                            name: caps[1].to_string(),
                            path: path.to_string(),
                            language: Some("autohotkey".into()),
                            line: Some(line_no),
                            column: None,
                            summary: Some(first_line(trimmed)),
                            usage_stats: None,
                        },
                    );
                }
                if stack.is_empty() {
                    if let Some(caps) = self.re_assign.captures(trimmed) {
                        b.add_node(
                            0,
                            ParsedNode {
                                kind: NodeKind::Variable,
                                name: caps[1].to_string(),
                                path: path.to_string(),
                                language: Some("autohotkey".into()),
                                line: Some(line_no),
                                column: None,
                                summary: None,
                                usage_stats: Some(r#"{"scope":"global"}"#.into()),
                            },
                        );
                    }
                }
                for caps in self.re_call.captures_iter(trimmed) {
                    let callee = &caps[1];
                    if !KEYWORDS.contains(&callee.to_lowercase().as_str())
                        && !callee.eq_ignore_ascii_case("ComObjCreate")
                        && !callee.eq_ignore_ascii_case("ComObjActive")
                    {
                        b.name_ref(container, callee, RelKind::Calls);
                    }
                }
            }

            // Close containers whose brace depth has unwound.
            depth = (depth + opens - closes).max(0);
            if closes > 0 {
                while let Some((_, _, open_depth)) = stack.last() {
                    if depth <= *open_depth {
                        stack.pop();
                    } else {
                        break;
                    }
                }
            }
        }

        b.finish()
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    }
}
