//! Unified error type for promise detection.

use thiserror::Error;

/// All errors that can cross the crate boundary.
///
/// Classification itself never fails: per-node resolution problems are absorbed
/// inside the semantic tier, and a failed type context degrades to heuristic
/// results. What remains here is environmental (I/O, grammar loading) or
/// caller-driven (cancellation, bad arguments).
#[derive(Error, Debug)]
pub enum PromiseError {
    /// I/O error (file read, directory access, stdio)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The tree-sitter grammar could not be loaded into a parser
    #[error("Failed to load grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    /// The parser produced no tree
    #[error("Failed to parse {path}")]
    Parse { path: String },

    /// The type-checking context for the semantic tier could not be built
    #[error("Cannot build type context for '{path}': {reason}")]
    SemanticContext { path: String, reason: String },

    /// The caller raised the cancellation flag
    #[error("Analysis cancelled")]
    Cancelled,

    /// File does not exist
    #[error("File does not exist: {0}")]
    FileNotFound(String),

    /// Argument validation error
    #[error("{0}")]
    InvalidArgs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = PromiseError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_semantic_context_display() {
        let err = PromiseError::SemanticContext {
            path: "<untitled>".to_string(),
            reason: "source has no file identity".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("<untitled>"));
        assert!(msg.contains("no file identity"));
    }

    #[test]
    fn test_file_not_found_display() {
        let err = PromiseError::FileNotFound("/nonexistent.ts".to_string());
        assert!(err.to_string().contains("/nonexistent.ts"));
    }

    #[test]
    fn test_cancelled_display() {
        assert_eq!(PromiseError::Cancelled.to_string(), "Analysis cancelled");
    }

    #[test]
    fn test_json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: PromiseError = json_err.into();
        assert!(matches!(err, PromiseError::Json(_)));
    }

    #[test]
    fn test_io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: PromiseError = io_err.into();
        assert!(matches!(err, PromiseError::Io(_)));
    }
}
