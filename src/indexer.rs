//! Indexer orchestrator: walk → hash → cache consult → bounded parse
//! pipeline → graph integration → rank → one write transaction.
//!
//! Parse workers are OS threads, each with its own parser registry; results
//! flow to the integrator over a bounded channel so in-flight memory stays
//! bounded. Cancellation is cooperative and checked at dispatch, before each
//! parse, before each integration, and before commit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::cache::CacheLayer;
use crate::error::IndexError;
use crate::graph::{GraphAssembler, rank};
use crate::ignore_rules::{IgnoreRules, validate_pattern};
use crate::parsers::{DEFAULT_EXTENSIONS, ParserRegistry};
use crate::projects;
use crate::storage::StorageEngine;
use crate::{ParseResult, clean_path, content_hash, file_mtime};

/// Per-file wall-clock soft cap; slower parses are recorded as soft failures.
const PARSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Channel capacity multiplier (bounds in-flight work per worker).
const QUEUE_FACTOR: usize = 4;

#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// File-selection globs; defaults to the registered parser extensions.
    pub patterns: Option<Vec<String>>,
    /// Extra ignore globs layered over the defaults.
    pub custom_ignore: Vec<String>,
    /// Re-parse everything, ignoring cache hits (cache is still written).
    pub force: bool,
    /// Bypass the cache entirely (no reads, no writes).
    pub no_cache: bool,
    /// Worker count; 0 = available CPU parallelism.
    pub workers: usize,
    /// Run storage maintenance (PRAGMA optimize) after the commit.
    pub optimize: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            patterns: None,
            custom_ignore: Vec::new(),
            force: false,
            no_cache: false,
            workers: 0,
            optimize: true,
        }
    }
}

/// One soft failure recorded in the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct RunError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct IndexSummary {
    pub root: String,
    pub files_total: usize,
    pub files_parsed: usize,
    pub files_cached: usize,
    pub files_skipped: usize,
    pub nodes: usize,
    pub edges: usize,
    pub elapsed: Duration,
    pub errors: Vec<RunError>,
    pub canceled: bool,
}

/// Progress events emitted while a run is in flight.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Queued { total: usize },
    CacheHit { path: String },
    Parsed { path: String },
    Failed { path: String },
    Persisting,
    Done,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Discards all events.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

enum Outcome {
    Cached(Box<ParseResult>),
    Parsed(Box<ParseResult>),
    Unclaimed,
    ReadFailed(String),
}

struct WorkerMsg {
    path: String,
    outcome: Outcome,
}

pub struct Indexer<'a> {
    storage: &'a StorageEngine,
    cache: &'a CacheLayer,
    cancel: Arc<AtomicBool>,
}

impl<'a> Indexer<'a> {
    pub fn new(storage: &'a StorageEngine, cache: &'a CacheLayer) -> Self {
        Indexer { storage, cache, cancel: Arc::new(AtomicBool::new(false)) }
    }

    /// Flag a caller (e.g. a Ctrl-C handler) can set to cancel the run.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn canceled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Index `root` end to end and return the run summary.
    pub fn index(
        &self,
        root: &Path,
        options: &IndexOptions,
        sink: &dyn ProgressSink,
    ) -> Result<IndexSummary, IndexError> {
        let start = Instant::now();
        let root = validate_root(root)?;
        let root_str = clean_path(&root.to_string_lossy());

        // Eager TTL sweep; expired entries are also dropped lazily on access.
        self.cache.memory().cleanup_expired();

        let mut ignore_patterns = options.custom_ignore.clone();
        ignore_patterns.extend(projects::marker_ignore_patterns(&root));
        let rules = IgnoreRules::new(&ignore_patterns)?;
        let selector = FileSelector::new(options.patterns.as_deref())?;

        let candidates = collect_candidates(&root, &rules, &selector);
        sink.event(ProgressEvent::Queued { total: candidates.len() });
        info!(root = %root_str, files = candidates.len(), "index run starting");

        let mut summary = IndexSummary {
            root: root_str.clone(),
            files_total: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() {
            // Nothing to parse; still refresh metadata and clear stale rows.
            let writer = self.storage.begin_run()?;
            for stale in writer.existing_paths()? {
                writer.delete_file_entities(&stale)?;
            }
            writer.set_metadata("last_indexed_at", &crate::now_secs().to_string())?;
            writer.commit()?;
            summary.elapsed = start.elapsed();
            sink.event(ProgressEvent::Done);
            return Ok(summary);
        }

        let project_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root_str.clone());
        let first_id = self.peek_next_node_id()?;
        let mut assembler = GraphAssembler::new(&project_name, &root_str, first_id);

        let workers = if options.workers > 0 {
            options.workers
        } else {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        };
        let queue_cap = workers * QUEUE_FACTOR;

        // path -> full parse result, kept for per-file annotation persistence.
        let mut integrated: Vec<(String, ParseResult)> = Vec::new();

        let (work_tx, work_rx) = crossbeam_channel::bounded::<String>(queue_cap);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<WorkerMsg>(queue_cap);

        std::thread::scope(|scope| {
            let cancel = &self.cancel;
            let cache = self.cache;

            // Producer: feeds the bounded work queue; blocks when it is full.
            let producer_paths = candidates.clone();
            scope.spawn(move || {
                for path in producer_paths {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    if work_tx.send(path).is_err() {
                        break;
                    }
                }
                // work_tx dropped here; workers drain and exit.
            });

            // Workers: read, hash, consult cache, parse, write back.
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let force = options.force;
                let no_cache = options.no_cache;
                scope.spawn(move || {
                    let mut registry = ParserRegistry::new();
                    for path in work_rx.iter() {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let msg = process_file(&mut registry, cache, &path, force, no_cache);
                        if result_tx.send(msg).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(work_rx);
            drop(result_tx);

            // Integrator: owns the assembler, runs on this thread.
            for msg in result_rx.iter() {
                if self.canceled() {
                    continue; // drain without integrating
                }
                match msg.outcome {
                    Outcome::Cached(result) => {
                        summary.files_cached += 1;
                        if let Some(error) = &result.error {
                            summary
                                .errors
                                .push(RunError { path: msg.path.clone(), message: error.clone() });
                        }
                        sink.event(ProgressEvent::CacheHit { path: msg.path.clone() });
                        assembler.integrate(&msg.path, &result);
                        integrated.push((msg.path, *result));
                    }
                    Outcome::Parsed(result) => {
                        summary.files_parsed += 1;
                        if let Some(error) = &result.error {
                            summary
                                .errors
                                .push(RunError { path: msg.path.clone(), message: error.clone() });
                            sink.event(ProgressEvent::Failed { path: msg.path.clone() });
                        } else {
                            sink.event(ProgressEvent::Parsed { path: msg.path.clone() });
                        }
                        assembler.integrate(&msg.path, &result);
                        integrated.push((msg.path, *result));
                    }
                    Outcome::Unclaimed => {
                        summary.files_skipped += 1;
                        debug!(path = %msg.path, "no parser claimed file, skipping");
                    }
                    Outcome::ReadFailed(message) => {
                        summary.errors.push(RunError { path: msg.path.clone(), message });
                        sink.event(ProgressEvent::Failed { path: msg.path });
                    }
                }
            }
        });

        if self.canceled() {
            summary.canceled = true;
            summary.elapsed = start.elapsed();
            info!("index run canceled before persistence");
            return Ok(summary);
        }

        // Rank over the full assembled graph, then persist atomically.
        let (mut nodes, edges) = assembler.finish();
        rank::rank(&mut nodes, &edges);

        sink.event(ProgressEvent::Persisting);
        let writer = self.storage.begin_run()?;

        let keep: std::collections::HashSet<&str> =
            integrated.iter().map(|(path, _)| path.as_str()).collect();
        for stale in writer.existing_paths()? {
            if stale != root_str && !keep.contains(stale.as_str()) {
                writer.delete_file_entities(&stale)?;
            }
        }
        for (path, _) in &integrated {
            writer.delete_file_entities(path)?;
        }
        writer.delete_file_entities(&root_str)?;

        writer.insert_nodes(&nodes)?;
        writer.insert_relationships(&edges)?;
        for (_, result) in &integrated {
            writer.insert_file_annotations(
                &result.patterns,
                &result.libraries,
                &result.infrastructure,
            )?;
        }

        let next_id = nodes.iter().map(|n| n.id).max().unwrap_or(0) + 1;
        writer.set_metadata("next_node_id", &next_id.to_string())?;
        writer.set_metadata("last_indexed_at", &crate::now_secs().to_string())?;
        writer.set_metadata("total_nodes", &nodes.len().to_string())?;
        writer.set_metadata("total_relationships", &edges.len().to_string())?;

        if self.canceled() {
            writer.rollback()?;
            summary.canceled = true;
            summary.elapsed = start.elapsed();
            return Ok(summary);
        }
        writer.commit()?;

        if options.optimize {
            if let Ok(conn) = self.storage.pool().acquire() {
                let _ = conn.execute_batch("PRAGMA optimize");
            }
        }

        summary.nodes = nodes.len();
        summary.edges = edges.len();
        summary.elapsed = start.elapsed();
        sink.event(ProgressEvent::Done);
        info!(
            nodes = summary.nodes,
            edges = summary.edges,
            cached = summary.files_cached,
            parsed = summary.files_parsed,
            errors = summary.errors.len(),
            "index run complete"
        );
        Ok(summary)
    }

    /// The id the next run's assembler should start from, read outside the
    /// write transaction.
    fn peek_next_node_id(&self) -> Result<i64, IndexError> {
        if let Some(v) = self.storage.get_metadata("next_node_id")? {
            if let Ok(id) = v.parse::<i64>() {
                return Ok(id);
            }
        }
        let writer = self.storage.begin_run()?;
        let id = writer.next_node_id()?;
        writer.rollback()?;
        Ok(id)
    }
}

/// Read, hash, consult the cache, parse (with the soft timeout), write back.
fn process_file(
    registry: &mut ParserRegistry,
    cache: &CacheLayer,
    path: &str,
    force: bool,
    no_cache: bool,
) -> WorkerMsg {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            return WorkerMsg { path: path.to_string(), outcome: Outcome::ReadFailed(e.to_string()) };
        }
    };
    let hash = content_hash(&bytes);

    if !force && !no_cache {
        if let Some(result) = cache.get_parse(path, &hash) {
            return WorkerMsg { path: path.to_string(), outcome: Outcome::Cached(Box::new(result)) };
        }
    }

    let content = String::from_utf8_lossy(&bytes);
    let started = Instant::now();
    let result = match registry.parse_file(path, &content) {
        Some(r) => r,
        None => return WorkerMsg { path: path.to_string(), outcome: Outcome::Unclaimed },
    };
    let result = if started.elapsed() > PARSE_TIMEOUT {
        warn!(path, "parser exceeded soft timeout, recording as failure");
        ParseResult::failed(
            path,
            &result.language,
            format!("parser exceeded {}s soft timeout", PARSE_TIMEOUT.as_secs()),
        )
    } else {
        result
    };

    if !no_cache {
        cache.put_parse(path, &hash, file_mtime(Path::new(path)), &result);
    }
    WorkerMsg { path: path.to_string(), outcome: Outcome::Parsed(Box::new(result)) }
}

fn validate_root(root: &Path) -> Result<PathBuf, IndexError> {
    let raw = root.to_string_lossy();
    if raw.is_empty() || raw.contains('\0') {
        return Err(IndexError::InvalidPath {
            path: raw.replace('\0', "\\0"),
            reason: "empty or contains null bytes".into(),
        });
    }
    let canonical = std::fs::canonicalize(root).map_err(|_| IndexError::InvalidPath {
        path: raw.to_string(),
        reason: "does not exist".into(),
    })?;
    if !canonical.is_dir() {
        return Err(IndexError::InvalidPath {
            path: raw.to_string(),
            reason: "not a directory".into(),
        });
    }
    Ok(canonical)
}

/// File-selection filter: explicit globs, or the default parser extensions
/// (plus extension-less files, which go through content sniffing).
struct FileSelector {
    globs: Option<globset::GlobSet>,
}

impl FileSelector {
    fn new(patterns: Option<&[String]>) -> Result<Self, IndexError> {
        let Some(patterns) = patterns else { return Ok(FileSelector { globs: None }) };
        let mut builder = globset::GlobSetBuilder::new();
        for pattern in patterns {
            validate_pattern(pattern)?;
            let glob = globset::Glob::new(pattern).map_err(|e| IndexError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| IndexError::InvalidPattern {
            pattern: String::new(),
            reason: e.to_string(),
        })?;
        Ok(FileSelector { globs: Some(set) })
    }

    fn matches(&self, relative: &Path) -> bool {
        match &self.globs {
            Some(set) => set.is_match(relative),
            None => match relative.extension().and_then(|e| e.to_str()) {
                Some(ext) => {
                    let lower = ext.to_lowercase();
                    DEFAULT_EXTENSIONS.contains(&lower.as_str())
                }
                None => true, // sniffed at parse time
            },
        }
    }
}

/// Walk the tree (gitignore-aware), apply the ignore rules and the file
/// selector, and return candidate paths in walk order.
fn collect_candidates(root: &Path, rules: &IgnoreRules, selector: &FileSelector) -> Vec<String> {
    let mut out = Vec::new();
    for entry in WalkBuilder::new(root).build().flatten() {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if rules.should_skip(relative) || !selector.matches(relative) {
            continue;
        }
        out.push(clean_path(&path.to_string_lossy()));
    }
    out.sort();
    out
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "indexer_tests.rs"]
mod tests;
