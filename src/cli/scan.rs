//! `scan`: analyze every matching file under a directory in parallel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use ignore::WalkBuilder;
use regex::Regex;
use tracing::{debug, info, warn};

use promise_lens::{clean_path, parse_extensions, AnalysisMode, PromiseError};

use super::args::ScanArgs;
use super::{analyze_file, FileReport};

/// Walk options resolved from the command line.
pub(crate) struct ScanOptions {
    pub extensions: Vec<String>,
    pub exclude: Option<Regex>,
    pub hidden: bool,
    pub no_ignore: bool,
    pub threads: usize,
    pub mode: AnalysisMode,
}

/// Outcome of a scan: reports sorted by path plus files that failed to analyze.
#[derive(Debug, Default)]
pub(crate) struct ScanOutcome {
    pub reports: Vec<FileReport>,
    pub failed: usize,
    pub cancelled: bool,
}

pub fn cmd_scan(args: ScanArgs) -> Result<(), PromiseError> {
    let root = Path::new(&args.dir);
    if !root.is_dir() {
        return Err(PromiseError::FileNotFound(args.dir.clone()));
    }

    let exclude = match args.exclude.as_deref() {
        Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
            PromiseError::InvalidArgs(format!("Invalid --exclude regex '{}': {}", pattern, e))
        })?),
        None => None,
    };
    let options = ScanOptions {
        extensions: parse_extensions(&args.ext),
        exclude,
        hidden: args.hidden,
        no_ignore: args.no_ignore,
        threads: args.threads,
        mode: args.mode,
    };
    if options.extensions.is_empty() {
        return Err(PromiseError::InvalidArgs("--ext must name at least one extension".to_string()));
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed)) {
            warn!(error = %e, "Failed to install Ctrl-C handler");
        }
    }

    let start = Instant::now();
    let outcome = scan_dir(root, &options, &cancel);

    let mut total_spans = 0usize;
    for report in &outcome.reports {
        total_spans += report.spans.len();
        if args.count {
            if !report.spans.is_empty() {
                println!("{:>6}  {}", report.spans.len(), report.path);
            }
        } else if args.json {
            println!("{}", report.render_json()?);
        } else {
            print!("{}", report.render_text());
        }
    }

    eprintln!(
        "\n{} promise spans in {} files ({} failed) in {:.3}s (mode: {})",
        total_spans,
        outcome.reports.len(),
        outcome.failed,
        start.elapsed().as_secs_f64(),
        options.mode
    );

    if outcome.cancelled {
        return Err(PromiseError::Cancelled);
    }
    Ok(())
}

/// Collect candidate files under `root`, honoring ignore files and the exclude pattern.
pub(crate) fn collect_files(root: &Path, options: &ScanOptions) -> Vec<PathBuf> {
    let mut walker = WalkBuilder::new(root);
    walker.hidden(!options.hidden);
    walker.git_ignore(!options.no_ignore);
    walker.git_global(!options.no_ignore);
    walker.git_exclude(!options.no_ignore);
    if options.threads > 0 {
        walker.threads(options.threads);
    }

    let all_files: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

    walker.build_parallel().run(|| {
        Box::new(|entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => return ignore::WalkState::Continue,
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                return ignore::WalkState::Continue;
            }
            let path = entry.path();
            let ext_match = path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| options.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)));
            if !ext_match {
                return ignore::WalkState::Continue;
            }
            if let Some(re) = &options.exclude
                && re.is_match(&clean_path(&path.to_string_lossy()))
            {
                return ignore::WalkState::Continue;
            }
            all_files.lock().unwrap_or_else(|e| e.into_inner()).push(path.to_path_buf());
            ignore::WalkState::Continue
        })
    });

    let mut files = all_files.into_inner().unwrap_or_else(|e| e.into_inner());
    files.sort();
    files
}

/// Analyze every collected file on a scoped worker pool. Raising `cancel`
/// stops workers between files and aborts the file each one is analyzing.
pub(crate) fn scan_dir(root: &Path, options: &ScanOptions, cancel: &AtomicBool) -> ScanOutcome {
    let files = collect_files(root, options);
    let total_files = files.len();
    info!(root = %root.display(), files = total_files, "Found files to analyze");
    if files.is_empty() {
        return ScanOutcome::default();
    }

    let num_threads = if options.threads > 0 {
        options.threads
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    };
    let chunk_size = total_files.div_ceil(num_threads).max(1);
    debug!(threads = num_threads, chunk_size, "Analyzing in parallel");

    let mode = options.mode;
    let thread_results: Vec<(Vec<FileReport>, usize)> = std::thread::scope(|s| {
        let handles: Vec<_> = files.chunks(chunk_size).map(|chunk| {
            s.spawn(move || {
                let mut reports = Vec::new();
                let mut failed = 0usize;
                for path in chunk {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    match analyze_file(path, mode, Some(cancel)) {
                        Ok(report) => reports.push(report),
                        Err(PromiseError::Cancelled) => break,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Failed to analyze file");
                            failed += 1;
                        }
                    }
                }
                (reports, failed)
            })
        }).collect();

        handles.into_iter().map(|h| h.join().unwrap_or_else(|_| {
            warn!("Worker thread panicked during scan");
            (Vec::new(), 0)
        })).collect()
    });

    let mut outcome = ScanOutcome {
        cancelled: cancel.load(Ordering::Relaxed),
        ..ScanOutcome::default()
    };
    for (reports, failed) in thread_results {
        outcome.reports.extend(reports);
        outcome.failed += failed;
    }
    outcome.reports.sort_by(|a, b| a.path.cmp(&b.path));
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn options(mode: AnalysisMode) -> ScanOptions {
        ScanOptions {
            extensions: parse_extensions("ts,js"),
            exclude: None,
            hidden: false,
            no_ignore: false,
            threads: 2,
            mode,
        }
    }

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::create_dir_all(tmp.path().join("dist")).unwrap();
        fs::write(tmp.path().join("src/a.ts"), "async function a() {}\na();\n").unwrap();
        fs::write(tmp.path().join("src/b.js"), "function b() { return 1 }\nb();\n").unwrap();
        fs::write(tmp.path().join("src/notes.md"), "async function c() {}\n").unwrap();
        fs::write(tmp.path().join("dist/out.js"), "async function d() {}\n").unwrap();
        tmp
    }

    fn names(report: &FileReport) -> Vec<&str> {
        report.spans.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_collect_files_filters_by_extension() {
        let tmp = fixture();
        let files = collect_files(tmp.path(), &options(AnalysisMode::Hybrid));
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.js", "a.ts", "b.js"]);
    }

    #[test]
    fn test_collect_files_honors_exclude() {
        let tmp = fixture();
        let mut opts = options(AnalysisMode::Hybrid);
        opts.exclude = Some(Regex::new("dist").unwrap());
        let files = collect_files(tmp.path(), &opts);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| !p.to_string_lossy().contains("dist")));
    }

    #[test]
    fn test_scan_dir_reports_each_file() {
        let tmp = fixture();
        let cancel = AtomicBool::new(false);
        let outcome = scan_dir(tmp.path(), &options(AnalysisMode::Heuristic), &cancel);
        assert_eq!(outcome.reports.len(), 3);
        assert_eq!(outcome.failed, 0);
        assert!(!outcome.cancelled);

        let a = outcome.reports.iter().find(|r| r.path.ends_with("a.ts")).unwrap();
        assert_eq!(names(a), vec!["a", "a"]);
        let b = outcome.reports.iter().find(|r| r.path.ends_with("b.js")).unwrap();
        assert!(b.spans.is_empty());
    }

    #[test]
    fn test_scan_dir_semantic_follows_imports() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("api.ts"), "export async function load() {}\n").unwrap();
        fs::write(tmp.path().join("main.ts"), "import { load } from './api';\nload();\n").unwrap();
        let cancel = AtomicBool::new(false);
        let outcome = scan_dir(tmp.path(), &options(AnalysisMode::Semantic), &cancel);
        let main = outcome.reports.iter().find(|r| r.path.ends_with("main.ts")).unwrap();
        assert_eq!(names(main), vec!["load"]);
    }

    #[test]
    fn test_scan_dir_cancelled_up_front() {
        let tmp = fixture();
        let cancel = AtomicBool::new(true);
        let outcome = scan_dir(tmp.path(), &options(AnalysisMode::Hybrid), &cancel);
        assert!(outcome.cancelled);
        assert!(outcome.reports.is_empty());
    }

    #[test]
    fn test_scan_dir_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let outcome = scan_dir(tmp.path(), &options(AnalysisMode::Hybrid), &cancel);
        assert!(outcome.reports.is_empty());
        assert!(!outcome.cancelled);
    }

    #[test]
    fn test_cmd_scan_rejects_bad_regex() {
        let tmp = tempfile::tempdir().unwrap();
        let args = ScanArgs {
            dir: tmp.path().to_string_lossy().into_owned(),
            ext: "ts".to_string(),
            mode: AnalysisMode::Hybrid,
            threads: 0,
            exclude: Some("(unclosed".to_string()),
            hidden: false,
            no_ignore: false,
            json: false,
            count: false,
        };
        assert!(matches!(cmd_scan(args), Err(PromiseError::InvalidArgs(_))));
    }
}
