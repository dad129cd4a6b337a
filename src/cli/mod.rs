//! CLI layer: argument parsing, command dispatch, and subcommand implementations.

pub mod args;
mod scan;
mod serve;
mod watch;

pub use args::*;

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use promise_lens::{analyze, read_file_lossy, AnalysisMode, AnalysisRequest, PromiseError, PromiseSpan};

// ─── CLI ─────────────────────────────────────────────────────────────

/// Detects promise-producing functions and calls in JavaScript/TypeScript sources
#[derive(Parser, Debug)]
#[command(
    name = "promise-lens",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_DATETIME"), ")"),
    about,
    after_help = "\
Run 'promise-lens <COMMAND> --help' for detailed options and examples.\n\
Common options: -d <DIR> (directory), -e <EXT> (extension filter), -m <MODE> (heuristic|semantic|hybrid)"
)]
pub(crate) struct Cli {
    /// Log level: error, warn, info, debug, trace (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Emit log events as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Analyze a single file and print its promise spans
    Analyze(AnalyzeArgs),

    /// Analyze every matching file under a directory (parallel, gitignore-aware)
    Scan(ScanArgs),

    /// Re-analyze files as they change on disk
    Watch(WatchArgs),

    /// Start the JSON-RPC analysis service over stdio
    Serve(ServeArgs),
}

// ─── Main entry point ───────────────────────────────────────────────

pub fn run() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json);

    let result = match cli.command {
        Commands::Analyze(args) => cmd_analyze(args),
        Commands::Scan(args) => scan::cmd_scan(args),
        Commands::Watch(args) => watch::cmd_watch(args),
        Commands::Serve(args) => serve::cmd_serve(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the stderr subscriber. `RUST_LOG`, when set, wins over `--log-level`.
fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ─── Shared output ──────────────────────────────────────────────────

/// One span in CLI JSON output.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub(crate) struct SpanRecord {
    pub line: usize,
    pub column: usize,
    pub start: usize,
    pub end: usize,
    pub name: String,
}

/// All spans found in one file, as printed by `--json`.
#[derive(Serialize, Debug)]
pub(crate) struct FileReport {
    pub path: String,
    pub mode: AnalysisMode,
    pub spans: Vec<SpanRecord>,
}

impl FileReport {
    pub fn new(path: &str, mode: AnalysisMode, spans: &[PromiseSpan], text: &str) -> Self {
        let spans = spans
            .iter()
            .map(|span| {
                let (line, column) = span.position(text);
                SpanRecord {
                    line,
                    column,
                    start: span.start,
                    end: span.end,
                    name: span.text(text).to_string(),
                }
            })
            .collect();
        Self { path: path.to_string(), mode, spans }
    }

    /// `path:line:col  name`, one line per span.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            out.push_str(&format!("{}:{}:{}  {}\n", self.path, span.line, span.column, span.name));
        }
        out
    }

    pub fn render_json(&self) -> Result<String, PromiseError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Read and analyze one file from disk. Raising `cancel` aborts the analysis
/// with [`PromiseError::Cancelled`].
pub(crate) fn analyze_file(
    path: &Path,
    mode: AnalysisMode,
    cancel: Option<&AtomicBool>,
) -> Result<FileReport, PromiseError> {
    let (text, lossy) = read_file_lossy(path)?;
    if lossy {
        tracing::warn!(path = %path.display(), "File is not valid UTF-8, analyzing lossy conversion");
    }
    let mut request = AnalysisRequest::new(&text, mode).with_path(path);
    if let Some(flag) = cancel {
        request = request.with_cancellation(flag);
    }
    let spans = analyze(&request)?;
    let display = promise_lens::clean_path(&path.to_string_lossy());
    Ok(FileReport::new(&display, mode, &spans, &text))
}

// ─── cmd_analyze ────────────────────────────────────────────────────

fn cmd_analyze(args: AnalyzeArgs) -> Result<(), PromiseError> {
    let path = Path::new(&args.file);
    if !path.is_file() {
        return Err(PromiseError::FileNotFound(args.file.clone()));
    }

    let start = Instant::now();
    let report = analyze_file(path, args.mode, None)?;

    if args.json {
        println!("{}", report.render_json()?);
    } else {
        print!("{}", report.render_text());
    }

    eprintln!(
        "\n{} promise spans in {:.3}s (mode: {})",
        report.spans.len(),
        start.elapsed().as_secs_f64(),
        args.mode
    );
    Ok(())
}
