//! CLI argument structs for all subcommands.

use clap::Parser;

use promise_lens::{AnalysisMode, DEFAULT_EXTENSIONS};

#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Source file to analyze
    pub file: String,

    /// Detection strategy: heuristic, semantic or hybrid
    #[arg(short, long, default_value = "hybrid")]
    pub mode: AnalysisMode,

    /// Print spans as JSON instead of `path:line:col  name`
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(after_long_help = r#"EXAMPLES:
  Whole repo:        promise-lens scan -d ./web
  TypeScript only:   promise-lens scan -d ./web -e ts,tsx
  Skip generated:    promise-lens scan -d . --exclude "(dist|\.d\.ts$)"
  Syntax-only pass:  promise-lens scan -d . --mode heuristic --json
"#)]
pub struct ScanArgs {
    /// Root directory to scan
    #[arg(short, long, default_value = ".")]
    pub dir: String,

    /// File extensions to analyze, comma-separated
    #[arg(short, long, default_value = DEFAULT_EXTENSIONS)]
    pub ext: String,

    /// Detection strategy: heuristic, semantic or hybrid
    #[arg(short, long, default_value = "hybrid")]
    pub mode: AnalysisMode,

    /// Number of parallel threads (0 = auto)
    #[arg(short, long, default_value = "0")]
    pub threads: usize,

    /// Skip files whose path matches this regular expression
    #[arg(long)]
    pub exclude: Option<String>,

    /// Include hidden files
    #[arg(long)]
    pub hidden: bool,

    /// Also scan .gitignore'd files
    #[arg(long)]
    pub no_ignore: bool,

    /// Print one JSON object per file instead of one line per span
    #[arg(long)]
    pub json: bool,

    /// Print only per-file span counts
    #[arg(short = 'c', long)]
    pub count: bool,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Directory to watch
    #[arg(short, long, default_value = ".")]
    pub dir: String,

    /// File extensions to analyze, comma-separated
    #[arg(short, long, default_value = DEFAULT_EXTENSIONS)]
    pub ext: String,

    /// Detection strategy: heuristic, semantic or hybrid
    #[arg(short, long, default_value = "hybrid")]
    pub mode: AnalysisMode,

    /// Debounce delay in ms before re-analyzing changed files
    #[arg(long, default_value = "300")]
    pub debounce_ms: u64,
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Default detection strategy when a request does not name one
    #[arg(short, long, default_value = "hybrid")]
    pub mode: AnalysisMode,

    /// Display color advertised to clients for promise tokens
    #[arg(long, default_value = "#c586c0")]
    pub color: String,
}
