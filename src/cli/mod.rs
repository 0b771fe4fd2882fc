//! CLI layer: argument parsing, command dispatch, and subcommand
//! implementations. The library does the work; this shim renders results and
//! maps errors to exit codes (0 success, 1 user error, 2 fatal internal).

pub mod args;

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use args::*;
use codegraph::cache::{CacheLayer, DiskCache, MemoryCacheConfig};
use codegraph::indexer::{IndexOptions, Indexer, NullSink, ProgressEvent, ProgressSink};
use codegraph::projects::{self, ProjectsRegistry};
use codegraph::query::QueryEngine;
use codegraph::storage::{SearchMode, StorageEngine};
use codegraph::{IndexError, NodeKind};

/// Persistent code graph indexer: content-addressed parsing, SQLite-backed
/// storage with FTS, and importance-ranked retrieval
#[derive(Parser, Debug)]
#[command(name = "codegraph", version, about, after_help = "\
Run 'codegraph <COMMAND> --help' for detailed options and examples.\n\
Env: CODEGRAPH_DATA_DIR, CODEGRAPH_CACHE_DIR, CODEGRAPH_LOG, CODEGRAPH_TOOL_HOST")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Write the project marker file (codegraph.toml)
    Init(InitArgs),

    /// Index a directory into its project database
    Index(IndexCmdArgs),

    /// Structural lookup ranked by importance
    Query(QueryArgs),

    /// Full-text (or LIKE) search over indexed entities
    Search(SearchArgs),

    /// Show totals and cache counters
    Stats(StatsArgs),

    /// Show or prune the disk parse cache
    Cache(CacheArgs),

    /// List known indexed projects
    Projects,

    /// Remove a project's indexed data (asks for confirmation)
    Remove(RemoveArgs),

    /// Remove orphaned project databases
    Clean,
}

// ─── Main entry point ───────────────────────────────────────────────

pub fn run() -> i32 {
    let cli = Cli::parse();
    init_tracing(matches!(&cli.command, Commands::Index(a) if a.verbose));

    let result = match cli.command {
        Commands::Init(args) => cmd_init(args),
        Commands::Index(args) => cmd_index(args),
        Commands::Query(args) => cmd_query(args),
        Commands::Search(args) => cmd_search(args),
        Commands::Stats(args) => cmd_stats(args),
        Commands::Cache(args) => cmd_cache(args),
        Commands::Projects => cmd_projects(),
        Commands::Remove(args) => cmd_remove(args),
        Commands::Clean => cmd_clean(),
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e.hint() {
                eprintln!("  hint: {}", hint);
            }
            e.exit_code()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = std::env::var("CODEGRAPH_LOG").unwrap_or_else(|_| default.to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .try_init();
}

// ─── Shared helpers ─────────────────────────────────────────────────

/// Resolve the database for `--project` (name or path) or the current dir.
fn resolve_db(project: Option<&str>) -> Result<PathBuf, IndexError> {
    let base = projects::data_dir();
    if let Some(target) = project {
        let registry = ProjectsRegistry::load(&base)?;
        if let Some(entry) = registry.find(target) {
            return Ok(PathBuf::from(&entry.db_file));
        }
        // Unknown name: treat as a path.
        return Ok(projects::db_path_for(Path::new(target), &base));
    }
    Ok(projects::db_path_for(Path::new("."), &base))
}

fn open_indexed(project: Option<&str>) -> Result<StorageEngine, IndexError> {
    let db = resolve_db(project)?;
    if !db.exists() {
        return Err(IndexError::InvalidPath {
            path: db.to_string_lossy().to_string(),
            reason: "no index found for this project; run 'codegraph index <path>' first".into(),
        });
    }
    StorageEngine::open(&db, &projects::backups_dir())
}

fn parse_kind(raw: Option<&str>) -> Result<Option<NodeKind>, IndexError> {
    match raw {
        None => Ok(None),
        Some(s) => s.parse::<NodeKind>().map(Some).map_err(IndexError::InvalidArgs),
    }
}

fn format_age(secs: Option<i64>) -> String {
    match secs {
        None => "never".to_string(),
        Some(ts) => {
            let age = (codegraph::now_secs() - ts).max(0);
            match age {
                0..=59 => format!("{}s ago", age),
                60..=3_599 => format!("{}m ago", age / 60),
                3_600..=86_399 => format!("{}h ago", age / 3_600),
                _ => format!("{}d ago", age / 86_400),
            }
        }
    }
}

/// Streams per-file progress to stderr (index --verbose).
struct StderrSink;

impl ProgressSink for StderrSink {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Queued { total } => eprintln!("[index] {} files queued", total),
            ProgressEvent::CacheHit { path } => eprintln!("[index] cached  {}", path),
            ProgressEvent::Parsed { path } => eprintln!("[index] parsed  {}", path),
            ProgressEvent::Failed { path } => eprintln!("[index] FAILED  {}", path),
            ProgressEvent::Persisting => eprintln!("[index] writing to database..."),
            ProgressEvent::Done => {}
        }
    }
}

// ─── Commands ───────────────────────────────────────────────────────

fn cmd_init(args: InitArgs) -> Result<(), IndexError> {
    let root = std::fs::canonicalize(&args.path).map_err(|_| IndexError::InvalidPath {
        path: args.path.clone(),
        reason: "does not exist".into(),
    })?;
    if projects::write_marker(&root, args.force)? {
        println!("Wrote {}", root.join(projects::MARKER_FILE).display());
    } else {
        println!(
            "{} already exists (use --force to overwrite)",
            root.join(projects::MARKER_FILE).display()
        );
    }
    Ok(())
}

fn cmd_index(args: IndexCmdArgs) -> Result<(), IndexError> {
    let root = Path::new(&args.path);
    let base = projects::data_dir();
    let db = projects::db_path_for(root, &base);

    let storage = StorageEngine::open(&db, &projects::backups_dir())?;
    let cache = if args.no_cache {
        CacheLayer::memory_only(MemoryCacheConfig::default())
    } else {
        CacheLayer::open(&projects::cache_db_path(), MemoryCacheConfig::default())
    };

    let indexer = Indexer::new(&storage, &cache);
    let cancel = indexer.cancel_flag();
    let _ = ctrlc::set_handler(move || {
        cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        eprintln!("\n[index] cancel requested, finishing in-flight work...");
    });

    let options = IndexOptions {
        patterns: args
            .patterns
            .map(|p| p.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()),
        custom_ignore: args.custom_ignore,
        force: args.force,
        no_cache: args.no_cache,
        workers: args.workers,
        optimize: !args.no_optimize,
    };

    let summary = if args.verbose {
        indexer.index(root, &options, &StderrSink)?
    } else {
        indexer.index(root, &options, &NullSink)?
    };

    if summary.canceled {
        println!("Index of {} canceled.", summary.root);
        return Ok(());
    }

    let mut registry = ProjectsRegistry::load(&base)?;
    let canonical = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    registry.touch(&canonical, &db)?;

    println!("Indexed {} in {:.2}s", summary.root, summary.elapsed.as_secs_f64());
    println!(
        "  files: {} total, {} parsed, {} cached, {} skipped",
        summary.files_total, summary.files_parsed, summary.files_cached, summary.files_skipped
    );
    println!("  graph: {} nodes, {} edges", summary.nodes, summary.edges);
    if !summary.errors.is_empty() {
        println!("  errors ({}):", summary.errors.len());
        for error in summary.errors.iter().take(10) {
            println!("    {}: {}", error.path, error.message);
        }
        if summary.errors.len() > 10 {
            println!("    ... and {} more (run with --verbose)", summary.errors.len() - 10);
        }
    }
    Ok(())
}

fn cmd_query(args: QueryArgs) -> Result<(), IndexError> {
    let storage = open_indexed(args.project.as_deref())?;
    let kind = parse_kind(args.node_type.as_deref())?;
    let nodes = storage.query_important(args.limit, args.min_score, kind, None)?;

    if nodes.is_empty() {
        println!("No nodes matched.");
        return Ok(());
    }
    println!("{:<6} {:>5}  {:<10} {:<32} {}", "id", "score", "kind", "name", "path");
    for node in nodes {
        println!(
            "{:<6} {:>5.2}  {:<10} {:<32} {}",
            node.id,
            node.importance_score,
            node.kind.as_str(),
            truncate(&node.name, 32),
            node.path
        );
    }
    Ok(())
}

fn cmd_search(args: SearchArgs) -> Result<(), IndexError> {
    let storage = open_indexed(args.project.as_deref())?;
    let kind = parse_kind(args.node_type.as_deref())?;
    let mode = match args.mode.to_lowercase().as_str() {
        "any" => SearchMode::Any,
        "all" => SearchMode::All,
        other => {
            return Err(IndexError::InvalidArgs(format!(
                "mode must be 'any' or 'all', got '{}'",
                other
            )));
        }
    };

    let memory = codegraph::cache::MemoryCache::with_defaults();
    let queries = QueryEngine::new(&storage, &memory);
    let hits = queries.search(&args.terms, mode, kind, args.limit, !args.no_fts)?;

    if hits.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for hit in hits {
        let line = hit.line.map(|l| format!(":{}", l)).unwrap_or_default();
        let tags =
            if hit.tags.is_empty() { String::new() } else { format!("  [{}]", hit.tags.join(",")) };
        println!(
            "{:>5.2}  {:<10} {:<32} {}{}{}",
            hit.score,
            hit.kind.as_str(),
            truncate(&hit.name, 32),
            hit.path,
            line,
            tags
        );
    }
    Ok(())
}

fn cmd_stats(args: StatsArgs) -> Result<(), IndexError> {
    let storage = open_indexed(args.project.as_deref())?;
    let stats = storage.stats()?;

    println!("Nodes: {} total", stats.total_nodes);
    for (kind, count) in &stats.nodes_by_kind {
        println!("  {:<12} {}", kind, count);
    }
    println!("Relationships: {} total", stats.total_relationships);
    for (kind, count) in &stats.relationships_by_kind {
        println!("  {:<12} {}", kind, count);
    }
    if !stats.nodes_by_language.is_empty() {
        println!("Languages:");
        for (language, count) in &stats.nodes_by_language {
            println!("  {:<12} {} files", language, count);
        }
    }
    println!("Last indexed: {}", format_age(stats.last_indexed_at));

    if args.cache {
        match DiskCache::open(&projects::cache_db_path()) {
            Ok(disk) => {
                let (entries, bytes) = disk.stats()?;
                println!(
                    "Disk cache: {} entries, {:.1} MB",
                    entries,
                    bytes as f64 / 1_048_576.0
                );
            }
            Err(e) => println!("Disk cache: unavailable ({})", e),
        }
    }
    Ok(())
}

fn cmd_cache(args: CacheArgs) -> Result<(), IndexError> {
    let disk = DiskCache::open(&projects::cache_db_path())?;
    if args.clear {
        let removed = disk.clear(args.days)?;
        match args.days {
            Some(days) => println!("Removed {} entries older than {} days.", removed, days),
            None => println!("Removed {} entries.", removed),
        }
    } else {
        let (entries, bytes) = disk.stats()?;
        println!("Disk cache at {}", projects::cache_db_path().display());
        println!("  {} entries, {:.1} MB", entries, bytes as f64 / 1_048_576.0);
    }
    Ok(())
}

fn cmd_projects() -> Result<(), IndexError> {
    let registry = ProjectsRegistry::load(&projects::data_dir())?;
    if registry.projects().is_empty() {
        println!("No indexed projects.");
        return Ok(());
    }
    println!("{:<24} {:<12} {:>10}  {}", "name", "indexed", "db size", "root");
    for project in registry.projects() {
        println!(
            "{:<24} {:<12} {:>9.1}M  {}",
            truncate(&project.name, 24),
            format_age(project.last_indexed),
            project.db_size as f64 / 1_048_576.0,
            project.root
        );
    }
    Ok(())
}

fn cmd_remove(args: RemoveArgs) -> Result<(), IndexError> {
    let base = projects::data_dir();
    let mut registry = ProjectsRegistry::load(&base)?;
    let Some(entry) = registry.find(&args.target).cloned() else {
        return Err(IndexError::InvalidPath {
            path: args.target,
            reason: "no such indexed project".into(),
        });
    };

    if !projects::tool_host_mode() && !confirm(&format!("Remove indexed data for '{}'?", entry.name))
    {
        println!("Aborted.");
        return Ok(());
    }

    registry.remove(&args.target)?;
    println!("Removed project '{}' ({}).", entry.name, entry.root);
    Ok(())
}

fn cmd_clean() -> Result<(), IndexError> {
    let base = projects::data_dir();
    let mut registry = ProjectsRegistry::load(&base)?;
    let removed = registry.clean_orphans(&base)?;
    if removed == 0 {
        println!("No orphaned databases found.");
    } else {
        println!("Removed {} orphaned database(s).", removed);
    }
    Ok(())
}

fn confirm(question: &str) -> bool {
    print!("{} [y/N] ", question);
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
