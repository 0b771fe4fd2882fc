//! # codegraph: Persistent Code Graph Indexer
//!
//! Indexes source code as a queryable graph: content-addressed parsing,
//! SQLite-backed storage with full-text search, and importance-ranked retrieval.
//!
//! ## Library usage
//!
//! This crate is primarily a CLI tool, but the whole engine is exposed as a
//! library so an external tool host can call `Indexer::index` and the query
//! surface in-process without shelling out.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod cache;
pub mod error;
pub mod graph;
pub mod ignore_rules;
pub mod indexer;
pub mod parsers;
pub mod projects;
pub mod query;
pub mod storage;

pub use error::IndexError;

// ─── Node / relationship model ───────────────────────────────────────

/// What kind of code entity a node represents.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Class,
    Function,
    Method,
    Import,
    Variable,
    Interface,
    GuiControl,
    ComObject,
    Hotkey,
    Project,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::Import => "import",
            Self::Variable => "variable",
            Self::Interface => "interface",
            Self::GuiControl => "gui_control",
            Self::ComObject => "com_object",
            Self::Hotkey => "hotkey",
            Self::Project => "project",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "class" => Ok(Self::Class),
            "function" => Ok(Self::Function),
            "method" => Ok(Self::Method),
            "import" => Ok(Self::Import),
            "variable" => Ok(Self::Variable),
            "interface" => Ok(Self::Interface),
            "gui_control" => Ok(Self::GuiControl),
            "com_object" => Ok(Self::ComObject),
            "hotkey" => Ok(Self::Hotkey),
            "project" => Ok(Self::Project),
            other => Err(format!("Unknown node kind: '{}'", other)),
        }
    }
}

/// What kind of relationship a directed edge represents.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RelKind {
    Contains,
    Imports,
    Calls,
    Inherits,
    Implements,
    References,
}

impl RelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Imports => "imports",
            Self::Calls => "calls",
            Self::Inherits => "inherits",
            Self::Implements => "implements",
            Self::References => "references",
        }
    }
}

impl std::fmt::Display for RelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(Self::Contains),
            "imports" => Ok(Self::Imports),
            "calls" => Ok(Self::Calls),
            "inherits" => Ok(Self::Inherits),
            "implements" => Ok(Self::Implements),
            "references" => Ok(Self::References),
            other => Err(format!("Unknown relationship kind: '{}'", other)),
        }
    }
}

/// One code entity with a database-global id.
///
/// `(kind, name, path)` is unique per database. Method names are qualified as
/// `"ClassName.methodName"`; file nodes carry the indexed file's path.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CodeNode {
    pub id: i64,
    pub kind: NodeKind,
    pub name: String,
    pub path: String,
    pub language: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub summary: Option<String>,
    /// Structural importance in [0, 1], assigned by the ranker.
    pub importance_score: f64,
    /// Ordered, deduplicated tags like "structural" or "highly-used".
    pub relevance_tags: Vec<String>,
    pub weight: f64,
    pub frequency_score: f64,
    /// Opaque JSON blob (e.g. variable scope, decorator list).
    pub usage_stats: Option<String>,
    /// Unix seconds.
    pub created_at: i64,
}

/// A directed typed edge between two nodes of the same database.
///
/// `(source, target, kind)` is unique. Weight below 1.0 marks best-effort
/// links (cross-file call resolution by unqualified name).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Relationship {
    pub source: i64,
    pub target: i64,
    pub kind: RelKind,
    pub weight: f64,
    pub created_at: i64,
}

// ─── Parse output ────────────────────────────────────────────────────

/// A node as emitted by a parser, before global id assignment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParsedNode {
    pub kind: NodeKind,
    pub name: String,
    pub path: String,
    pub language: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub summary: Option<String>,
    pub usage_stats: Option<String>,
}

/// A by-name reference emitted by a parser, resolved by the graph assembler.
///
/// Same-file matches resolve at weight 1.0; cross-file matches are
/// best-effort at reduced weight.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NameRef {
    /// Local id of the referencing node.
    pub src: u32,
    /// Unqualified name of the referenced entity.
    pub name: String,
    pub kind: RelKind,
}

/// A design pattern recognized in one file. Confidence is reported, never asserted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DetectedPattern {
    pub pattern: String,
    pub confidence: f64,
    pub description: String,
    pub file_path: String,
    pub nodes: Vec<String>,
}

/// A third-party library referenced by one file's imports.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DetectedLibrary {
    pub name: String,
    pub category: String,
    pub import_statement: String,
    pub file_path: String,
}

/// Infrastructure usage (database, queue, cloud, ...) recognized in one file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DetectedInfra {
    pub kind: String,
    pub name: String,
    pub confidence: f64,
    pub file_path: String,
}

/// One parser's complete output for one file.
///
/// Local node ids are file-scoped; id 0 is always the file node. All other
/// nodes reach the file node through `contains` edges in `relationships`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParseResult {
    pub success: bool,
    pub language: String,
    /// local id -> node. BTreeMap keeps emission order stable for serialization.
    pub nodes: BTreeMap<u32, ParsedNode>,
    /// (local source, local target, kind): containment and other local edges.
    pub relationships: Vec<(u32, u32, RelKind)>,
    /// By-name references (calls, inherits, implements) for the assembler.
    pub name_refs: Vec<NameRef>,
    pub patterns: Vec<DetectedPattern>,
    pub libraries: Vec<DetectedLibrary>,
    pub infrastructure: Vec<DetectedInfra>,
    pub error: Option<String>,
}

impl ParseResult {
    /// A failed result carrying only the file node, so the file still shows
    /// up in the graph and the failure is recorded as a soft error.
    pub fn failed(path: &str, language: &str, error: String) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(0, file_node(path, language));
        ParseResult {
            success: false,
            language: language.to_string(),
            nodes,
            relationships: Vec::new(),
            name_refs: Vec::new(),
            patterns: Vec::new(),
            libraries: Vec::new(),
            infrastructure: Vec::new(),
            error: Some(error),
        }
    }
}

/// The file node every parser emits at local id 0.
pub fn file_node(path: &str, language: &str) -> ParsedNode {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    ParsedNode {
        kind: NodeKind::File,
        name,
        path: path.to_string(),
        language: Some(language.to_string()),
        line: Some(1),
        column: None,
        summary: None,
        usage_stats: None,
    }
}

// ─── Pure helpers ────────────────────────────────────────────────────

/// SHA-256 of a byte slice as lowercase hex. Stable across platforms and runs;
/// used to key the parse cache and detect file changes.
///
/// # Examples
///
/// ```
/// use codegraph::content_hash;
///
/// let h = content_hash(b"def f(): pass\n");
/// assert_eq!(h.len(), 64);
/// assert_eq!(h, content_hash(b"def f(): pass\n"));
/// ```
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Strip the `\\?\` extended-length path prefix that Windows canonicalize adds.
pub fn clean_path(p: &str) -> String {
    p.strip_prefix(r"\\?\").unwrap_or(p).to_string()
}

/// Read a file as UTF-8, falling back to lossy conversion for invalid bytes.
/// Returns `(content, was_lossy)`.
pub fn read_file_lossy(path: &Path) -> std::io::Result<(String, bool)> {
    let mut file = std::fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok((s, false)),
        Err(e) => {
            let s = String::from_utf8_lossy(e.as_bytes()).to_string();
            Ok((s, true))
        }
    }
}

/// Unix seconds now.
pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(std::time::Duration::ZERO)
        .as_secs() as i64
}

/// File mtime in Unix seconds, 0 when unavailable.
pub fn file_mtime(path: &Path) -> i64 {
    std::fs::metadata(path)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ─── Tests ───────────────────────────────────────────────────────────


// ─── Property-based tests (proptest) ─────────────────────────────────
