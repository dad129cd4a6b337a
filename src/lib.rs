//! # promise-lens: Promise Detection for JavaScript/TypeScript
//!
//! Decides, for every function definition and call expression in a unit of
//! JS/TS source, whether it produces a promise, and reports the identifier
//! spans of the positives (token type [`PROMISE_TOKEN_TYPE`]).
//!
//! Three strategies are available through [`AnalysisMode`]:
//! - **heuristic**: syntax-only rules over call-scoped symbol registries
//! - **semantic**: type inference over the unit and its relative imports
//! - **hybrid** (default): heuristic first, semantic on unclaimed candidates
//!
//! ## Library usage
//!
//! ```
//! use promise_lens::{analyze, AnalysisMode, AnalysisRequest};
//!
//! let src = "async function load() {}\nload();";
//! let spans = analyze(&AnalysisRequest::new(src, AnalysisMode::Heuristic)).unwrap();
//! assert_eq!(spans.len(), 2);
//! assert_eq!(spans[0].text(src), "load");
//! ```

pub mod detect;
pub mod error;
pub mod source;

pub use detect::{
    analyze, analyze_parsed, AnalysisMode, AnalysisRequest, PromiseSpan, SymbolTable,
    PROMISE_TOKEN_TYPE,
};
pub use error::PromiseError;
pub use source::{parse_unit, Dialect, ParsedUnit};

/// File extensions the CLI scans by default.
pub const DEFAULT_EXTENSIONS: &str = "ts,tsx,js,jsx,mts,cts,mjs,cjs";

// ─── Paths and files ─────────────────────────────────────────────────

/// Strip the `\\?\` extended-length path prefix that Windows canonicalize adds.
#[must_use]
pub fn clean_path(p: &str) -> String {
    p.strip_prefix(r"\\?\").unwrap_or(p).to_string()
}

/// Read a file as a String, using lossy UTF-8 conversion for non-UTF8 files.
/// Returns `(content, was_lossy)` where `was_lossy` is true if replacement characters
/// were inserted.
pub fn read_file_lossy(path: &std::path::Path) -> std::io::Result<(String, bool)> {
    let raw = std::fs::read(path)?;
    match String::from_utf8(raw) {
        Ok(s) => Ok((s, false)),
        Err(e) => Ok((String::from_utf8_lossy(e.as_bytes()).into_owned(), true)),
    }
}

/// Split a comma-separated extension list (`"ts, .tsx,JS"`) into lowercase
/// extensions without leading dots.
#[must_use]
pub fn parse_extensions(list: &str) -> Vec<String> {
    list.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
