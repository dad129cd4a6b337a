//! Criterion benchmarks for promise detection.
//!
//! Run with: `cargo bench`
//!
//! Sources are synthetic so numbers are comparable across machines. The
//! semantic and hybrid groups write their fixture to a temp dir because the
//! type context needs a file identity.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::Path;

use promise_lens::{analyze, analyze_parsed, parse_unit, AnalysisMode, AnalysisRequest};

// ─── Helpers ─────────────────────────────────────────────────────────

/// A module with `n` services, each mixing async methods, promise-annotated
/// functions, plain helpers and call sites across them.
fn synthetic_module(n: usize) -> String {
    let mut src = String::new();
    src.push_str("interface Thenable<T> { then(cb: (v: T) => void): void }\n");
    for i in 0..n {
        src.push_str(&format!(
            r#"
class Service{i} {{
  private cache: Map<string, number> = new Map();
  async load(id: string) {{
    const res = await fetch(`/api/{i}/${{id}}`);
    return res.json();
  }}
  count(): number {{ return this.cache.size; }}
  refresh(): Promise<void> {{ return this.load("x").then(() => undefined); }}
}}
function helper{i}(x: number) {{ return x * 2; }}
function wrap{i}(): Thenable<number> {{ return null as any; }}
const service{i} = new Service{i}();
service{i}.load("a");
service{i}.count();
service{i}.refresh();
helper{i}(1);
wrap{i}();
"#
        ));
    }
    src
}

// ─── Parse ───────────────────────────────────────────────────────────

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for &n in &[10, 100] {
        let src = synthetic_module(n);
        group.bench_with_input(BenchmarkId::new("typescript", n), &src, |b, src| {
            b.iter(|| parse_unit(black_box(src), Some(Path::new("bench.ts"))))
        });
    }
    group.finish();
}

// ─── Modes ───────────────────────────────────────────────────────────

fn bench_modes(c: &mut Criterion) {
    let tmp = match tempfile::tempdir() {
        Ok(t) => t,
        Err(e) => panic!("cannot create bench dir: {}", e),
    };

    for &n in &[10, 100] {
        let src = synthetic_module(n);
        let path = tmp.path().join(format!("bench_{}.ts", n));
        if let Err(e) = std::fs::write(&path, &src) {
            panic!("cannot write bench fixture: {}", e);
        }

        let mut group = c.benchmark_group(format!("analyze_{}_services", n));
        for mode in AnalysisMode::ALL {
            group.bench_with_input(BenchmarkId::new("end_to_end", mode), &mode, |b, &mode| {
                b.iter(|| analyze(&AnalysisRequest::new(black_box(&src), mode).with_path(&path)))
            });
        }

        // Classification only, parse cost excluded
        let unit = match parse_unit(&src, Some(&path)) {
            Ok(u) => u,
            Err(e) => panic!("bench fixture failed to parse: {}", e),
        };
        for mode in AnalysisMode::ALL {
            group.bench_with_input(BenchmarkId::new("pre_parsed", mode), &mode, |b, &mode| {
                b.iter(|| analyze_parsed(black_box(&unit), mode, None))
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_parse, bench_modes);
criterion_main!(benches);
