//! Language parsers: explicit registry, extension dispatch, content sniffing.
//!
//! Each parser is a deterministic function over one file's contents producing
//! a [`ParseResult`]. Registration is explicit at construction; no runtime
//! discovery. Workers each build their own registry so tree-sitter parser
//! state is never shared across threads.

mod autohotkey;
mod c_lang;
pub mod detectors;
mod javascript;
mod python;

pub use autohotkey::AutoHotkeyParser;
pub use c_lang::CParser;
pub use javascript::JsTsParser;
pub use python::PythonParser;

use std::path::Path;

use crate::ParseResult;

use detectors::Detectors;

/// Extensions the default registry claims (kept in sync with the parsers;
/// see `supported_extensions`). Used by the orchestrator's file selector.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "ahk", "ahk2", "au3", "c", "cjs", "h", "js", "jsx", "mjs", "py", "pyi", "pyw", "ts", "tsx",
];

/// One language parser behind the registry.
///
/// Contract: output contains exactly one file node at local id 0, every other
/// node reachable from it via `contains` edges; unparseable input yields
/// `success=false` with the file node only; identical bytes give identical
/// output.
pub trait LanguageParser {
    fn language(&self) -> &'static str;

    fn extensions(&self) -> &'static [&'static str];

    fn can_parse(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| {
                let lower = e.to_lowercase();
                self.extensions().iter().any(|x| *x == lower)
            })
    }

    fn parse(&mut self, path: &str, content: &str) -> ParseResult;
}

/// Parser registry for one worker thread. Dispatches by extension, falling
/// back to content sniffing for extension-less files, then runs the pattern
/// and infrastructure detectors over the result.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn LanguageParser>>,
    detectors: Detectors,
}

impl ParserRegistry {
    pub fn new() -> Self {
        let parsers: Vec<Box<dyn LanguageParser>> = vec![
            Box::new(PythonParser::new()),
            Box::new(JsTsParser::new()),
            Box::new(CParser::new()),
            Box::new(AutoHotkeyParser::new()),
        ];
        ParserRegistry { parsers, detectors: Detectors::new() }
    }

    /// Extensions with a registered parser (without the leading dot).
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut exts: Vec<&'static str> =
            self.parsers.iter().flat_map(|p| p.extensions().iter().copied()).collect();
        exts.sort_unstable();
        exts.dedup();
        exts
    }

    /// Parse one file, returning `None` when no parser claims it.
    /// Detector output is attached to the returned result.
    pub fn parse_file(&mut self, path: &str, content: &str) -> Option<ParseResult> {
        let p = Path::new(path);
        let idx = self
            .parsers
            .iter()
            .position(|parser| parser.can_parse(p))
            .or_else(|| {
                // Extension-less files go through content sniffing.
                if p.extension().is_some() {
                    return None;
                }
                let language = sniff_language(content)?;
                self.parsers.iter().position(|parser| parser.language() == language)
            })?;

        let mut result = self.parsers[idx].parse(path, content);
        if result.success {
            self.detectors.run(path, content, &mut result);
        }
        Some(result)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Shared parse-result assembly ────────────────────────────────────

use std::collections::BTreeMap;

use crate::{NameRef, ParsedNode, RelKind, file_node};

/// Accumulates one file's nodes and edges during an AST walk.
/// Local id 0 is the file node; `add_node` wires the `contains` edge.
pub(crate) struct ParseBuilder {
    language: &'static str,
    nodes: BTreeMap<u32, ParsedNode>,
    relationships: Vec<(u32, u32, RelKind)>,
    name_refs: Vec<NameRef>,
    next_id: u32,
}

impl ParseBuilder {
    pub(crate) fn new(path: &str, language: &'static str) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(0, file_node(path, language));
        ParseBuilder {
            language,
            nodes,
            relationships: Vec::new(),
            name_refs: Vec::new(),
            next_id: 1,
        }
    }

    /// Add a node contained by `parent`, returning its local id.
    pub(crate) fn add_node(&mut self, parent: u32, node: ParsedNode) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, node);
        self.relationships.push((parent, id, RelKind::Contains));
        id
    }

    pub(crate) fn name_ref(&mut self, src: u32, name: &str, kind: RelKind) {
        self.name_refs.push(NameRef { src, name: name.to_string(), kind });
    }

    pub(crate) fn finish(self) -> ParseResult {
        ParseResult {
            success: true,
            language: self.language.to_string(),
            nodes: self.nodes,
            relationships: self.relationships,
            name_refs: self.name_refs,
            patterns: Vec::new(),
            libraries: Vec::new(),
            infrastructure: Vec::new(),
            error: None,
        }
    }
}

/// First line of a snippet, trimmed and capped, used as a node summary.
pub(crate) fn first_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() > 120 {
        let head: String = line.chars().take(117).collect();
        format!("{}...", head)
    } else {
        line.to_string()
    }
}

// ─── Content sniffing ────────────────────────────────────────────────

/// Keyword tables for extension-less files: (language, keywords).
const SNIFF_KEYWORDS: &[(&str, &[&str])] = &[
    ("python", &["def ", "class ", "import ", "from ", "elif ", "self"]),
    ("javascript", &["function ", "const ", "let ", "var ", "=>", "require("]),
    ("c", &["#include", "int main", "void ", "struct ", "typedef "]),
    ("autohotkey", &["#include", "msgbox", "send,", "::", "gui,"]),
];

/// Detect a language from content alone: shebang first, then keyword
/// frequency over the first 1,000 bytes. Returns `None` when nothing scores.
pub fn sniff_language(content: &str) -> Option<&'static str> {
    let head: &str = {
        let end = content
            .char_indices()
            .take_while(|(i, _)| *i < 1_000)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        &content[..end]
    };

    if let Some(first_line) = head.lines().next() {
        if first_line.starts_with("#!") {
            if first_line.contains("python") {
                return Some("python");
            }
            if first_line.contains("node") {
                return Some("javascript");
            }
        }
    }

    let lower = head.to_lowercase();
    let mut best: Option<(&'static str, usize)> = None;
    for (language, keywords) in SNIFF_KEYWORDS {
        let score: usize = keywords.iter().map(|kw| lower.matches(kw).count()).sum();
        if score > 0 && best.is_none_or(|(_, s)| score > s) {
            best = Some((language, score));
        }
    }
    best.map(|(language, _)| language)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "parsers_tests.rs"]
mod tests;
