use serde::{Deserialize, Serialize};
use serde_json::Value;

use promise_lens::{AnalysisMode, PromiseSpan, PROMISE_TOKEN_TYPE};

// ─── JSON-RPC 2.0 base types ────────────────────────────────────────

/// Incoming JSON-RPC request (may be a notification if id is None)
#[derive(Deserialize, Debug)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Outgoing JSON-RPC response
#[derive(Serialize, Debug)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    pub result: Value,
}

/// Outgoing JSON-RPC error response
#[derive(Serialize, Debug)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: String,
    pub id: Value,
    pub error: JsonRpcError,
}

#[derive(Serialize, Debug)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

// ─── Initialize ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct InitializeResult {
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    pub capabilities: ServerCapabilities,
    /// Display color the client should use for promise tokens.
    pub color: String,
}

#[derive(Serialize, Debug)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Serialize, Debug)]
pub struct ServerCapabilities {
    pub legend: TokenLegend,
    pub modes: Vec<AnalysisMode>,
    #[serde(rename = "defaultMode")]
    pub default_mode: AnalysisMode,
}

/// Semantic-token legend: one token type, no modifiers.
#[derive(Serialize, Debug)]
pub struct TokenLegend {
    #[serde(rename = "tokenTypes")]
    pub token_types: Vec<String>,
    #[serde(rename = "tokenModifiers")]
    pub token_modifiers: Vec<String>,
}

impl InitializeResult {
    pub fn new(default_mode: AnalysisMode, color: &str) -> Self {
        Self {
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                legend: TokenLegend {
                    token_types: vec![PROMISE_TOKEN_TYPE.to_string()],
                    token_modifiers: Vec::new(),
                },
                modes: AnalysisMode::ALL.to_vec(),
                default_mode,
            },
            color: color.to_string(),
        }
    }
}

// ─── promises/analyze ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
pub struct AnalyzeParams {
    pub text: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct AnalyzeResult {
    #[serde(rename = "tokenType")]
    pub token_type: &'static str,
    pub mode: AnalysisMode,
    pub spans: Vec<SpanInfo>,
}

/// A span with its position resolved against the analyzed text.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct SpanInfo {
    pub start: usize,
    pub end: usize,
    /// 1-based
    pub line: usize,
    /// 1-based, in characters
    pub column: usize,
    pub text: String,
}

impl SpanInfo {
    pub fn from_span(span: PromiseSpan, source: &str) -> Self {
        let (line, column) = span.position(source);
        Self {
            start: span.start,
            end: span.end,
            line,
            column,
            text: span.text(source).to_string(),
        }
    }
}

// ─── Helper constructors ────────────────────────────────────────────

impl JsonRpcResponse {
    pub fn new(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result,
        }
    }
}

impl JsonRpcErrorResponse {
    pub fn new(id: Value, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            error: JsonRpcError { code, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze_request() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"promises/analyze","params":{"text":"fetch()","path":"a.ts","mode":"semantic"}}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "promises/analyze");
        let params: AnalyzeParams = serde_json::from_value(req.params.unwrap()).unwrap();
        assert_eq!(params.text, "fetch()");
        assert_eq!(params.path.as_deref(), Some("a.ts"));
        assert_eq!(params.mode.as_deref(), Some("semantic"));
    }

    #[test]
    fn test_analyze_params_optional_fields() {
        let params: AnalyzeParams = serde_json::from_str(r#"{"text":""}"#).unwrap();
        assert!(params.path.is_none());
        assert!(params.mode.is_none());
    }

    #[test]
    fn test_parse_notification() {
        let json = r#"{"jsonrpc":"2.0","method":"initialized"}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert!(req.id.is_none());
    }

    #[test]
    fn test_initialize_result_format() {
        let json = serde_json::to_value(InitializeResult::new(AnalysisMode::Hybrid, "#ff00ff")).unwrap();
        assert_eq!(json["serverInfo"]["name"], "promise-lens");
        assert_eq!(json["capabilities"]["legend"]["tokenTypes"][0], "promise");
        assert_eq!(json["capabilities"]["modes"], serde_json::json!(["heuristic", "semantic", "hybrid"]));
        assert_eq!(json["capabilities"]["defaultMode"], "hybrid");
        assert_eq!(json["color"], "#ff00ff");
    }

    #[test]
    fn test_span_info_positions() {
        let src = "x;\n  fetch()";
        let info = SpanInfo::from_span(PromiseSpan::new(5, 10), src);
        assert_eq!(info.line, 2);
        assert_eq!(info.column, 3);
        assert_eq!(info.text, "fetch");
    }

    #[test]
    fn test_jsonrpc_error_response() {
        let resp = JsonRpcErrorResponse::new(serde_json::json!(5), METHOD_NOT_FOUND, "Method not found".to_string());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 5);
        assert_eq!(json["error"]["code"], -32601);
    }
}
