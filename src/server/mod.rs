//! Line-delimited JSON-RPC 2.0 service over stdio.
//!
//! One request per line, one response per line. Each `promises/analyze` call
//! is an independent analysis; the server keeps no per-document state.

pub mod protocol;

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use promise_lens::{analyze, AnalysisMode, AnalysisRequest};

use self::protocol::*;

/// Settings fixed at server start.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub default_mode: AnalysisMode,
    pub color: String,
}

/// Run the event loop on stdin/stdout until EOF or `shutdown`.
pub fn run_server(ctx: &ServerContext) {
    let stdin = io::stdin();
    let stdout = io::stdout();

    info!(mode = %ctx.default_mode, "Server ready, waiting for JSON-RPC requests on stdin");

    if let Err(e) = serve(ctx, stdin.lock(), stdout.lock()) {
        error!(error = %e, "Server I/O failure");
    }

    info!("Shutting down");
}

/// The event loop, over any line reader and writer.
pub fn serve<R: BufRead, W: Write>(ctx: &ServerContext, reader: R, mut writer: W) -> io::Result<()> {
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        debug!(request = %line, "Incoming JSON-RPC");

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Failed to parse JSON-RPC request");
                let err = error_response(Value::Null, PARSE_ERROR, format!("Parse error: {}", e));
                write_message(&mut writer, &err)?;
                continue;
            }
        };

        // Notifications have no id, don't send a response
        let Some(id) = request.id else {
            debug!(method = %request.method, "Received notification");
            continue;
        };

        let response = handle_request(ctx, &request.method, &request.params, id);
        write_message(&mut writer, &response)?;

        if request.method == "shutdown" {
            break;
        }
    }
    Ok(())
}

fn write_message<W: Write>(writer: &mut W, message: &Value) -> io::Result<()> {
    debug!(response = %message, "Outgoing JSON-RPC");
    writeln!(writer, "{}", message)?;
    writer.flush()
}

fn handle_request(ctx: &ServerContext, method: &str, params: &Option<Value>, id: Value) -> Value {
    match method {
        "initialize" => success_response(id, &InitializeResult::new(ctx.default_mode, &ctx.color)),
        "promises/analyze" => match handle_analyze(ctx, params) {
            Ok(result) => success_response(id, &result),
            Err((code, message)) => error_response(id, code, message),
        },
        "ping" | "shutdown" => success_response(id, &json!({})),
        _ => error_response(id, METHOD_NOT_FOUND, format!("Method not found: {}", method)),
    }
}

fn handle_analyze(ctx: &ServerContext, params: &Option<Value>) -> Result<AnalyzeResult, (i64, String)> {
    let params = params
        .as_ref()
        .ok_or_else(|| (INVALID_PARAMS, "Missing params".to_string()))?;
    let params: AnalyzeParams = serde_json::from_value(params.clone())
        .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {}", e)))?;
    let mode = match params.mode.as_deref() {
        Some(mode) => mode.parse().map_err(|e: String| (INVALID_PARAMS, e))?,
        None => ctx.default_mode,
    };

    let mut request = AnalysisRequest::new(&params.text, mode);
    if let Some(path) = params.path.as_deref() {
        request = request.with_path(Path::new(path));
    }

    let start = Instant::now();
    let spans = analyze(&request).map_err(|e| (INTERNAL_ERROR, e.to_string()))?;
    info!(
        path = params.path.as_deref().unwrap_or("<untitled>"),
        mode = %mode,
        spans = spans.len(),
        elapsed_ms = format_args!("{:.1}", start.elapsed().as_secs_f64() * 1000.0),
        "promises/analyze"
    );

    Ok(AnalyzeResult {
        token_type: promise_lens::PROMISE_TOKEN_TYPE,
        mode,
        spans: spans
            .into_iter()
            .map(|span| SpanInfo::from_span(span, &params.text))
            .collect(),
    })
}

fn success_response<T: Serialize>(id: Value, result: &T) -> Value {
    match serde_json::to_value(result) {
        Ok(result) => serde_json::to_value(JsonRpcResponse::new(id, result)).unwrap_or_default(),
        Err(e) => error_response(id, INTERNAL_ERROR, format!("Failed to serialize result: {}", e)),
    }
}

fn error_response(id: Value, code: i64, message: String) -> Value {
    serde_json::to_value(JsonRpcErrorResponse::new(id, code, message)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_ctx() -> ServerContext {
        ServerContext {
            default_mode: AnalysisMode::Hybrid,
            color: "#c586c0".to_string(),
        }
    }

    /// Feed `input` through the loop and return each output line as JSON.
    fn run_lines(input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        serve(&make_ctx(), Cursor::new(input.to_string()), &mut output).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_handle_initialize() {
        let result = handle_request(&make_ctx(), "initialize", &None, json!(1));
        assert_eq!(result["jsonrpc"], "2.0");
        assert_eq!(result["id"], 1);
        assert_eq!(result["result"]["capabilities"]["defaultMode"], "hybrid");
        assert_eq!(result["result"]["color"], "#c586c0");
    }

    #[test]
    fn test_handle_analyze_default_mode() {
        let params = json!({ "text": "async function f() {}\nf();" });
        let result = handle_request(&make_ctx(), "promises/analyze", &Some(params), json!(2));
        assert_eq!(result["result"]["mode"], "hybrid");
        assert_eq!(result["result"]["tokenType"], "promise");
        let spans = result["result"]["spans"].as_array().unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0]["text"], "f");
        assert_eq!(spans[1]["line"], 2);
        assert_eq!(spans[1]["column"], 1);
    }

    #[test]
    fn test_handle_analyze_semantic_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.ts");
        let text = "async function load() {\n  const r = await fetch('/x');\n  return r.json();\n}";
        std::fs::write(&path, text).unwrap();
        let params = json!({ "text": text, "path": path.to_string_lossy(), "mode": "semantic" });
        let result = handle_request(&make_ctx(), "promises/analyze", &Some(params), json!(3));
        let texts: Vec<&str> = result["result"]["spans"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["text"].as_str().unwrap())
            .collect();
        assert_eq!(texts, vec!["load", "fetch", "json"]);
    }

    #[test]
    fn test_handle_analyze_missing_params() {
        let result = handle_request(&make_ctx(), "promises/analyze", &None, json!(4));
        assert_eq!(result["error"]["code"], INVALID_PARAMS);
    }

    #[test]
    fn test_handle_analyze_bad_mode() {
        let params = json!({ "text": "", "mode": "psychic" });
        let result = handle_request(&make_ctx(), "promises/analyze", &Some(params), json!(5));
        assert_eq!(result["error"]["code"], INVALID_PARAMS);
        assert!(result["error"]["message"].as_str().unwrap().contains("psychic"));
    }

    #[test]
    fn test_handle_analyze_missing_text() {
        let params = json!({ "path": "a.ts" });
        let result = handle_request(&make_ctx(), "promises/analyze", &Some(params), json!(6));
        assert_eq!(result["error"]["code"], INVALID_PARAMS);
    }

    #[test]
    fn test_handle_unknown_method() {
        let result = handle_request(&make_ctx(), "unknown/method", &None, json!(99));
        assert_eq!(result["id"], 99);
        assert_eq!(result["error"]["code"], -32601);
        assert!(result["error"]["message"].as_str().unwrap().contains("Method not found"));
    }

    #[test]
    fn test_serve_skips_notifications_and_blank_lines() {
        let input = "\n{\"jsonrpc\":\"2.0\",\"method\":\"initialized\"}\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
        let out = run_lines(input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], 1);
        assert!(out[0]["result"].is_object());
    }

    #[test]
    fn test_serve_reports_parse_error_and_continues() {
        let input = "{not json\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n";
        let out = run_lines(input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["error"]["code"], -32700);
        assert!(out[0]["id"].is_null());
        assert_eq!(out[1]["id"], 2);
    }

    #[test]
    fn test_serve_stops_after_shutdown() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"shutdown\"}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n";
        let out = run_lines(input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], 1);
    }
}
