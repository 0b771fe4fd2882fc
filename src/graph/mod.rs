//! Graph assembler: merges per-file parse results into one global node/edge
//! set with stable run-scoped ids, deduplicates on (kind, name, path), and
//! resolves name-based cross-file links (imports, calls, inheritance).

pub mod rank;

use std::collections::{HashMap, HashSet};

use crate::{CodeNode, NodeKind, ParseResult, RelKind, Relationship, now_secs};

/// Weight for best-effort cross-file call edges resolved by unqualified name.
pub const CROSS_FILE_CALL_WEIGHT: f64 = 0.5;

struct PendingRef {
    src: i64,
    name: String,
    kind: RelKind,
    src_path: String,
}

pub struct GraphAssembler {
    next_id: i64,
    created_at: i64,
    project_id: i64,
    nodes: Vec<CodeNode>,
    edges: Vec<Relationship>,
    edge_keys: HashSet<(i64, i64, RelKind)>,
    by_key: HashMap<(NodeKind, String, String), i64>,
    /// file path -> file node id
    file_ids: HashMap<String, i64>,
    /// unqualified callable/type name -> global ids, per file
    defined_per_file: HashMap<String, HashMap<String, i64>>,
    /// unqualified name -> (path, id) candidates across all files
    defined_global: HashMap<String, Vec<(String, i64)>>,
    /// (importing file id, module name)
    pending_imports: Vec<(i64, String)>,
    pending_refs: Vec<PendingRef>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IntegrationCounts {
    pub nodes: usize,
    pub edges: usize,
}

impl GraphAssembler {
    /// `first_id` seeds the monotonic id counter (persisted across runs by
    /// the storage layer so ids are never reused within a database).
    pub fn new(project_name: &str, project_root: &str, first_id: i64) -> Self {
        let created_at = now_secs();
        let project_id = first_id;
        let project = CodeNode {
            id: project_id,
            kind: NodeKind::Project,
            name: project_name.to_string(),
            path: project_root.to_string(),
            language: None,
            line: None,
            column: None,
            summary: Some(format!("project root: {}", project_root)),
            importance_score: 0.0,
            relevance_tags: Vec::new(),
            weight: 1.0,
            frequency_score: 0.0,
            usage_stats: None,
            created_at,
        };
        let mut by_key = HashMap::new();
        by_key.insert(
            (NodeKind::Project, project_name.to_string(), project_root.to_string()),
            project_id,
        );
        GraphAssembler {
            next_id: first_id + 1,
            created_at,
            project_id,
            nodes: vec![project],
            edges: Vec::new(),
            edge_keys: HashSet::new(),
            by_key,
            file_ids: HashMap::new(),
            defined_per_file: HashMap::new(),
            defined_global: HashMap::new(),
            pending_imports: Vec::new(),
            pending_refs: Vec::new(),
        }
    }

    /// Integrate one file's parse result. Emission order within the file is
    /// preserved; a second node with an identical (kind, name, path) reuses
    /// the existing id.
    pub fn integrate(&mut self, path: &str, result: &ParseResult) -> IntegrationCounts {
        let mut counts = IntegrationCounts::default();
        let mut local_to_global: HashMap<u32, i64> = HashMap::new();

        // BTreeMap iteration is local-id order, which is emission order.
        for (&local_id, parsed) in &result.nodes {
            let key = (parsed.kind, parsed.name.clone(), parsed.path.clone());
            let global_id = match self.by_key.get(&key) {
                Some(&existing) => existing,
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.by_key.insert(key, id);
                    self.nodes.push(CodeNode {
                        id,
                        kind: parsed.kind,
                        name: parsed.name.clone(),
                        path: parsed.path.clone(),
                        language: parsed.language.clone(),
                        line: parsed.line,
                        column: parsed.column,
                        summary: parsed.summary.clone(),
                        importance_score: 0.0,
                        relevance_tags: Vec::new(),
                        weight: 1.0,
                        frequency_score: 0.0,
                        usage_stats: parsed.usage_stats.clone(),
                        created_at: self.created_at,
                    });
                    counts.nodes += 1;
                    id
                }
            };
            local_to_global.insert(local_id, global_id);

            match parsed.kind {
                NodeKind::File => {
                    self.file_ids.insert(parsed.path.clone(), global_id);
                }
                NodeKind::Import => {
                    if let Some(&file_id) = local_to_global.get(&0) {
                        self.pending_imports.push((file_id, parsed.name.clone()));
                    }
                }
                NodeKind::Function | NodeKind::Method | NodeKind::Class | NodeKind::Interface => {
                    let unqualified =
                        parsed.name.rsplit('.').next().unwrap_or(&parsed.name).to_string();
                    self.defined_per_file
                        .entry(parsed.path.clone())
                        .or_default()
                        .entry(unqualified.clone())
                        .or_insert(global_id);
                    self.defined_global
                        .entry(unqualified)
                        .or_default()
                        .push((parsed.path.clone(), global_id));
                }
                _ => {}
            }
        }

        for &(local_src, local_dst, kind) in &result.relationships {
            let (Some(&src), Some(&dst)) =
                (local_to_global.get(&local_src), local_to_global.get(&local_dst))
            else {
                continue;
            };
            if self.push_edge(src, dst, kind, 1.0) {
                counts.edges += 1;
            }
        }

        for name_ref in &result.name_refs {
            if let Some(&src) = local_to_global.get(&name_ref.src) {
                self.pending_refs.push(PendingRef {
                    src,
                    name: name_ref.name.clone(),
                    kind: name_ref.kind,
                    src_path: path.to_string(),
                });
            }
        }

        counts
    }

    /// Resolve cross-file links and produce the final (nodes, edges) set.
    pub fn finish(mut self) -> (Vec<CodeNode>, Vec<Relationship>) {
        // Project node contains every file.
        let mut file_ids: Vec<i64> = self.file_ids.values().copied().collect();
        file_ids.sort_unstable();
        for file_id in file_ids {
            self.push_edge(self.project_id, file_id, RelKind::Contains, 1.0);
        }

        // Module-name lookup for import resolution.
        let module_index = self.build_module_index();
        let imports = std::mem::take(&mut self.pending_imports);
        for (file_id, module) in imports {
            if let Some(target) = resolve_module(&module_index, &module) {
                if target != file_id {
                    self.push_edge(file_id, target, RelKind::Imports, 1.0);
                }
            }
        }

        // Name refs: same-file resolution wins at full weight; cross-file
        // call resolution is best-effort by unqualified name at reduced
        // weight, picking the first candidate in path order.
        let refs = std::mem::take(&mut self.pending_refs);
        for r in refs {
            let same_file = self
                .defined_per_file
                .get(&r.src_path)
                .and_then(|names| names.get(&r.name))
                .copied();

            let (target, weight) = match same_file {
                Some(id) => (Some(id), 1.0),
                None => {
                    let candidate = self.defined_global.get(&r.name).and_then(|candidates| {
                        candidates
                            .iter()
                            .filter(|(path, _)| path != &r.src_path)
                            .min_by(|a, b| a.0.cmp(&b.0))
                            .map(|(_, id)| *id)
                    });
                    let weight = match r.kind {
                        RelKind::Calls => CROSS_FILE_CALL_WEIGHT,
                        _ => 1.0,
                    };
                    (candidate, weight)
                }
            };

            if let Some(target) = target {
                if target != r.src {
                    self.push_edge(r.src, target, r.kind, weight);
                }
            }
        }

        (self.nodes, self.edges)
    }

    fn push_edge(&mut self, src: i64, dst: i64, kind: RelKind, weight: f64) -> bool {
        if !self.edge_keys.insert((src, dst, kind)) {
            return false;
        }
        self.edges.push(Relationship {
            source: src,
            target: dst,
            kind,
            weight,
            created_at: self.created_at,
        });
        true
    }

    /// Map module-ish names (file stem, file name, normalized path) to file
    /// ids. First registration in path order wins on collisions.
    fn build_module_index(&self) -> HashMap<String, i64> {
        let mut paths: Vec<(&String, &i64)> = self.file_ids.iter().collect();
        paths.sort();

        let mut index: HashMap<String, i64> = HashMap::new();
        for (path, &id) in paths {
            let normalized = path.replace('\\', "/");
            index.entry(normalized.clone()).or_insert(id);
            if let Some(file_name) = normalized.rsplit('/').next() {
                index.entry(file_name.to_string()).or_insert(id);
                if let Some(stem) = file_name.rsplit_once('.').map(|(s, _)| s) {
                    index.entry(stem.to_string()).or_insert(id);
                }
            }
        }
        index
    }
}

/// Normalize an import target and look it up: exact path, then file name,
/// then stem of the last segment.
fn resolve_module(index: &HashMap<String, i64>, module: &str) -> Option<i64> {
    let cleaned = module
        .trim()
        .trim_start_matches("./")
        .trim_start_matches("../")
        .replace('\\', "/");
    if let Some(&id) = index.get(&cleaned) {
        return Some(id);
    }
    // Last path segment as a file name ("lib/utils.ahk" -> "utils.ahk").
    let file_name = cleaned.rsplit('/').next().unwrap_or(&cleaned);
    if let Some(&id) = index.get(file_name) {
        return Some(id);
    }
    // Its stem ("utils.ahk" -> "utils").
    if let Some((stem, _)) = file_name.rsplit_once('.') {
        if let Some(&id) = index.get(stem) {
            return Some(id);
        }
    }
    // Dotted module path: final segment of "pkg.mod".
    let dotted_last = file_name.rsplit('.').next().unwrap_or(file_name);
    index.get(dotted_last).copied()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
