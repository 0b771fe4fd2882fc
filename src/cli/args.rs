//! CLI argument structs for all subcommands.

use clap::Parser;

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Project directory to initialize
    #[arg(default_value = ".")]
    pub path: String,

    /// Overwrite an existing marker file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(after_long_help = r#"WHAT IT DOES:
  Walks the project tree (gitignore-aware), parses every supported source
  file (Python, JavaScript/TypeScript, C, AutoHotkey), assembles a code
  graph with importance scores, and persists it to the project database.

  Unchanged files are served from a two-tier cache keyed by content hash,
  so re-indexing an unchanged tree is close to free.

EXAMPLES:
  Index the current directory:   codegraph index .
  Only Python files:             codegraph index . --patterns "*.py"
  Skip generated code:           codegraph index . --custom-ignore "gen/**"
  Full re-parse:                 codegraph index . --force
  Fixed worker count:            codegraph index . --workers 4
"#)]
pub struct IndexCmdArgs {
    /// Directory to index
    pub path: String,

    /// File-selection globs, comma-separated (default: supported extensions)
    #[arg(long)]
    pub patterns: Option<String>,

    /// Bypass the parse cache entirely (no reads, no writes)
    #[arg(long)]
    pub no_cache: bool,

    /// Re-parse everything, ignoring cache hits
    #[arg(long)]
    pub force: bool,

    /// Parse worker threads (0 = CPU count)
    #[arg(long, default_value = "0")]
    pub workers: usize,

    /// Extra ignore globs, repeatable
    #[arg(long, action = clap::ArgAction::Append)]
    pub custom_ignore: Vec<String>,

    /// Skip post-commit storage maintenance
    #[arg(long)]
    pub no_optimize: bool,

    /// Per-file progress on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// Rank by importance (default ordering)
    #[arg(long)]
    pub important: bool,

    /// Filter by node kind (file, class, function, method, ...)
    #[arg(long = "type")]
    pub node_type: Option<String>,

    /// Minimum importance score
    #[arg(long)]
    pub min_score: Option<f64>,

    /// Maximum rows
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Project name or path (default: current directory)
    #[arg(short, long)]
    pub project: Option<String>,
}

#[derive(Parser, Debug)]
#[command(after_long_help = r#"EXAMPLES:
  Any term:        codegraph search user database
  All terms:       codegraph search user database --mode all
  Classes only:    codegraph search service --type class
  LIKE fallback:   codegraph search service --no-fts
"#)]
pub struct SearchArgs {
    /// Search terms
    #[arg(required = true)]
    pub terms: Vec<String>,

    /// Match mode: any term or all terms
    #[arg(long, default_value = "any")]
    pub mode: String,

    /// Filter by node kind
    #[arg(long = "type")]
    pub node_type: Option<String>,

    /// Maximum rows
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Use LIKE matching instead of the FTS index
    #[arg(long)]
    pub no_fts: bool,

    /// Project name or path (default: current directory)
    #[arg(short, long)]
    pub project: Option<String>,
}

#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Project name or path (default: current directory)
    #[arg(short, long)]
    pub project: Option<String>,

    /// Include cache counters
    #[arg(long)]
    pub cache: bool,
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Remove cached parse results
    #[arg(long)]
    pub clear: bool,

    /// With --clear: only entries older than N days
    #[arg(long)]
    pub days: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct RemoveArgs {
    /// Project name or path
    pub target: String,
}
