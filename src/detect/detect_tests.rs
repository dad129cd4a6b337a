//! End-to-end tests for `analyze` across all three modes.

use super::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

fn names(text: &str, path: Option<&Path>, mode: AnalysisMode) -> Vec<String> {
    let mut request = AnalysisRequest::new(text, mode);
    if let Some(path) = path {
        request = request.with_path(path);
    }
    analyze(&request)
        .unwrap()
        .iter()
        .map(|s| s.text(text).to_string())
        .collect()
}

/// Analyze `text` as `main.ts` inside a fresh temp dir.
fn names_in_file(text: &str, mode: AnalysisMode) -> Vec<String> {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("main.ts");
    fs::write(&path, text).unwrap();
    names(text, Some(&path), mode)
}

// ─── Scenarios ──────────────────────────────────────────────────────

#[test]
fn test_async_function_all_modes() {
    let src = "async function f(){return 1} f()";
    for mode in AnalysisMode::ALL {
        assert_eq!(names_in_file(src, mode), vec!["f", "f"], "mode {}", mode);
    }
}

#[test]
fn test_plain_function_all_modes() {
    let src = "function g(){return 1} g()";
    for mode in AnalysisMode::ALL {
        assert!(names_in_file(src, mode).is_empty(), "mode {}", mode);
    }
}

#[test]
fn test_instance_method_all_modes() {
    let src = "class C { async m(){} } const c = new C(); c.m()";
    for mode in AnalysisMode::ALL {
        assert_eq!(names_in_file(src, mode), vec!["m", "m"], "mode {}", mode);
    }
}

#[test]
fn test_then_string_all_modes() {
    let src = "const s = \"then\"; console.log(s)";
    for mode in AnalysisMode::ALL {
        assert!(names_in_file(src, mode).is_empty(), "mode {}", mode);
    }
}

// ─── Merge behavior ─────────────────────────────────────────────────

#[test]
fn test_hybrid_adds_semantic_findings() {
    let src = "async function load() {\n  const res = await fetch('/x');\n  return res.json();\n}";
    let heuristic = names_in_file(src, AnalysisMode::Heuristic);
    let hybrid = names_in_file(src, AnalysisMode::Hybrid);
    assert_eq!(heuristic, vec!["load", "fetch"]);
    assert_eq!(hybrid, vec!["load", "fetch", "json"]);
}

#[test]
fn test_hybrid_reports_each_span_once() {
    let src = "async function f() {}\nf();\nf();";
    let spans = analyze(&AnalysisRequest::new(src, AnalysisMode::Hybrid)).unwrap();
    let mut deduped = spans.clone();
    deduped.dedup();
    assert_eq!(spans, deduped);
    assert_eq!(spans.len(), 3);
}

#[test]
fn test_hybrid_without_path_equals_heuristic() {
    let src = "async function f() {}\nconst r = await fetch('/a');\nr.json();\nf();";
    let heuristic = names(src, None, AnalysisMode::Heuristic);
    let hybrid = names(src, None, AnalysisMode::Hybrid);
    assert_eq!(heuristic, hybrid);
}

#[test]
fn test_hybrid_with_unsupported_extension_equals_heuristic() {
    let src = "async function f() {}\nf();";
    let path = Path::new("notes/snippet.md");
    assert_eq!(
        names(src, Some(path), AnalysisMode::Hybrid),
        names(src, Some(path), AnalysisMode::Heuristic)
    );
}

#[test]
fn test_semantic_without_path_is_empty() {
    let src = "async function f() {}\nf();";
    assert!(names(src, None, AnalysisMode::Semantic).is_empty());
}

#[test]
fn test_spans_are_sorted_and_positioned() {
    let src = "f();\nasync function f() {}\n";
    let spans = analyze(&AnalysisRequest::new(src, AnalysisMode::Heuristic)).unwrap();
    assert_eq!(spans.len(), 2);
    assert!(spans[0].start < spans[1].start);
    assert_eq!(spans[0].position(src), (1, 1));
    assert_eq!(spans[1].position(src), (2, 16));
}

#[test]
fn test_inverted_span_has_zero_length() {
    let span = PromiseSpan::new(9, 4);
    assert_eq!(span.len(), 0);
    assert!(span.is_empty());
    assert_eq!(PromiseSpan::new(4, 9).len(), 5);
}

#[test]
fn test_partial_parse_still_reports() {
    let src = "async function ok() {}\nfunction broken( {\nok();";
    let found = names(src, None, AnalysisMode::Heuristic);
    assert!(found.contains(&"ok".to_string()));
}

#[test]
fn test_javascript_file_with_jsx() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("view.jsx");
    let src = "async function load() {}\nconst View = () => <div onClick={() => load()}>x</div>;";
    fs::write(&path, src).unwrap();
    for mode in AnalysisMode::ALL {
        let found = names(src, Some(&path), mode);
        assert_eq!(found, vec!["load", "load"], "mode {}", mode);
    }
}

// ─── Cancellation / concurrency ─────────────────────────────────────

#[test]
fn test_cancelled_request_returns_error() {
    let flag = AtomicBool::new(true);
    let request = AnalysisRequest::new("async function f() {}", AnalysisMode::Hybrid).with_cancellation(&flag);
    assert!(matches!(analyze(&request), Err(PromiseError::Cancelled)));
}

#[test]
fn test_unraised_flag_does_not_cancel() {
    let flag = AtomicBool::new(false);
    let request = AnalysisRequest::new("async function f() {}", AnalysisMode::Heuristic).with_cancellation(&flag);
    assert_eq!(analyze(&request).unwrap().len(), 1);
    flag.store(true, Ordering::Relaxed);
    assert!(analyze(&request).is_err());
}

#[test]
fn test_concurrent_analyses_are_independent() {
    let sources = [
        "async function a() {}\na();",
        "function b() { return 1 }\nb();",
        "class C { async m() {} }\nconst c = new C();\nc.m();",
        "const s = 'then';",
    ];
    let expected: Vec<Vec<String>> = sources
        .iter()
        .map(|s| names(s, None, AnalysisMode::Hybrid))
        .collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let src = sources[i % sources.len()];
                scope.spawn(move || names(src, None, AnalysisMode::Hybrid))
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), expected[i % sources.len()]);
        }
    });
}

// ─── Properties ─────────────────────────────────────────────────────

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    /// Small programs assembled from statements the tiers disagree on.
    fn program() -> impl Strategy<Value = String> {
        let statement = prop_oneof![
            Just("async function f() { return 1 }"),
            Just("function g() { return f() }"),
            Just("function h(): Promise<void> { return null as any }"),
            Just("const k = () => fetch('/x');"),
            Just("class C { async m() {} n() { return this.m() } }"),
            Just("const c = new C();"),
            Just("c.m(); c.n();"),
            Just("const api = { g, h };"),
            Just("api.g(); api.h();"),
            Just("f(); g(); h(); k();"),
            Just("const r = Promise.resolve(1); r.then(x => x);"),
            Just("let s = 'Promise.then';"),
            Just("function broken( {"),
        ];
        proptest::collection::vec(statement, 0..10).prop_map(|parts| parts.join("\n"))
    }

    proptest! {
        /// Hybrid never drops a heuristic finding.
        #[test]
        fn hybrid_contains_heuristic(src in program()) {
            let tmp = tempfile::tempdir().unwrap();
            let path = tmp.path().join("prop.ts");
            std::fs::write(&path, &src).unwrap();
            let heuristic = analyze(&AnalysisRequest::new(&src, AnalysisMode::Heuristic).with_path(&path)).unwrap();
            let hybrid = analyze(&AnalysisRequest::new(&src, AnalysisMode::Hybrid).with_path(&path)).unwrap();
            for span in &heuristic {
                prop_assert!(hybrid.contains(span), "missing {:?} in hybrid", span);
            }
        }

        /// Re-analyzing the same text gives the same spans in every mode.
        #[test]
        fn analysis_is_idempotent(src in program()) {
            for mode in AnalysisMode::ALL {
                let first = analyze(&AnalysisRequest::new(&src, mode)).unwrap();
                let second = analyze(&AnalysisRequest::new(&src, mode)).unwrap();
                prop_assert_eq!(first, second);
            }
        }

        /// Output is strictly increasing by start offset and spans never overlap.
        #[test]
        fn spans_sorted_and_disjoint(src in program()) {
            let spans = analyze(&AnalysisRequest::new(&src, AnalysisMode::Hybrid)).unwrap();
            for pair in spans.windows(2) {
                prop_assert!(pair[0].end <= pair[1].start);
            }
        }
    }
}
