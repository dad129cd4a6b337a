//! `watch`: re-analyze files from scratch as they change on disk.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use promise_lens::{clean_path, parse_extensions, PromiseError};

use super::analyze_file;
use super::args::WatchArgs;

/// Paths touched during one debounce window.
#[derive(Debug, Default)]
pub(crate) struct ChangeBatch {
    pub dirty: BTreeSet<PathBuf>,
    pub removed: BTreeSet<PathBuf>,
}

impl ChangeBatch {
    /// Fold one watcher event into the batch. The latest event for a path wins.
    pub fn record(&mut self, event: &Event, extensions: &[String]) {
        for path in &event.paths {
            if !matches_extensions(path, extensions) {
                continue;
            }
            match event.kind {
                EventKind::Create(_) | EventKind::Modify(_) => {
                    self.removed.remove(path);
                    self.dirty.insert(path.clone());
                }
                EventKind::Remove(_) => {
                    self.dirty.remove(path);
                    self.removed.insert(path.clone());
                }
                _ => {}
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty() && self.removed.is_empty()
    }

    pub fn take(&mut self) -> ChangeBatch {
        std::mem::take(self)
    }
}

pub fn cmd_watch(args: WatchArgs) -> Result<(), PromiseError> {
    let dir = std::fs::canonicalize(&args.dir)
        .map_err(|_| PromiseError::FileNotFound(args.dir.clone()))?;
    let extensions = parse_extensions(&args.ext);
    if extensions.is_empty() {
        return Err(PromiseError::InvalidArgs("--ext must name at least one extension".to_string()));
    }

    let (tx, rx) = std::sync::mpsc::channel::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(tx, Config::default())
        .map_err(|e| PromiseError::InvalidArgs(format!("Cannot start watcher: {}", e)))?;
    watcher
        .watch(&dir, RecursiveMode::Recursive)
        .map_err(|e| PromiseError::InvalidArgs(format!("Cannot watch '{}': {}", args.dir, e)))?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            warn!(error = %e, "Failed to install Ctrl-C handler");
        }
    }

    let dir_str = clean_path(&dir.to_string_lossy());
    info!(dir = %dir_str, debounce_ms = args.debounce_ms, mode = %args.mode, "File watcher started");
    eprintln!("Watching {} (Ctrl-C to stop)", dir_str);

    let mut batch = ChangeBatch::default();
    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(Duration::from_millis(args.debounce_ms)) {
            Ok(Ok(event)) => batch.record(&event, &extensions),
            Ok(Err(e)) => warn!(error = %e, "File watcher error"),
            Err(RecvTimeoutError::Timeout) => {
                if batch.is_empty() {
                    continue;
                }
                // TODO: also re-analyze files that import a changed module
                let changes = batch.take();
                for path in &changes.removed {
                    println!("{}: removed", clean_path(&path.to_string_lossy()));
                }
                for path in &changes.dirty {
                    match analyze_file(path, args.mode, Some(stop.as_ref())) {
                        Ok(report) => {
                            println!("{}: {} promise spans", report.path, report.spans.len());
                            print!("{}", report.render_text());
                        }
                        Err(PromiseError::Cancelled) => break,
                        Err(e) => warn!(path = %path.display(), error = %e, "Failed to analyze changed file"),
                    }
                }
                info!(updated = changes.dirty.len(), removed = changes.removed.len(), "Re-analysis complete");
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("Watcher channel disconnected, stopping");
                break;
            }
        }
    }
    Ok(())
}

fn matches_extensions(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn exts() -> Vec<String> {
        parse_extensions("ts,tsx")
    }

    #[test]
    fn test_matches_extensions() {
        assert!(matches_extensions(Path::new("src/app.ts"), &exts()));
        assert!(matches_extensions(Path::new("src/View.TSX"), &exts()));
        assert!(!matches_extensions(Path::new("src/app.js"), &exts()));
        assert!(!matches_extensions(Path::new("Makefile"), &exts()));
    }

    #[test]
    fn test_batch_collects_dirty_and_removed() {
        let mut batch = ChangeBatch::default();
        batch.record(&Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("a.ts")), &exts());
        batch.record(&Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("b.ts")), &exts());
        batch.record(&Event::new(EventKind::Remove(RemoveKind::File)).add_path(PathBuf::from("c.ts")), &exts());
        batch.record(&Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("d.md")), &exts());

        assert_eq!(batch.dirty.iter().collect::<Vec<_>>(), vec![Path::new("a.ts"), Path::new("b.ts")]);
        assert_eq!(batch.removed.iter().collect::<Vec<_>>(), vec![Path::new("c.ts")]);
    }

    #[test]
    fn test_batch_latest_event_wins() {
        let mut batch = ChangeBatch::default();
        let path = PathBuf::from("a.ts");
        batch.record(&Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone()), &exts());
        batch.record(&Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone()), &exts());
        assert!(batch.removed.is_empty());
        assert!(batch.dirty.contains(&path));

        batch.record(&Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone()), &exts());
        assert!(batch.dirty.is_empty());
        assert!(batch.removed.contains(&path));
    }

    #[test]
    fn test_batch_take_resets() {
        let mut batch = ChangeBatch::default();
        batch.record(&Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("a.ts")), &exts());
        let taken = batch.take();
        assert!(batch.is_empty());
        assert_eq!(taken.dirty.len(), 1);
    }

    #[test]
    fn test_batch_ignores_access_events() {
        let mut batch = ChangeBatch::default();
        batch.record(&Event::new(EventKind::Access(notify::event::AccessKind::Any)).add_path(PathBuf::from("a.ts")), &exts());
        assert!(batch.is_empty());
    }
}
