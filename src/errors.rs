use thiserror::Error;

/// Errors that can occur while building or querying the knowledge graph.
#[derive(Error, Debug)]
pub enum CkgError {
    #[error("unsupported language: {language} (path: {path})")]
    UnsupportedLanguage { path: String, language: String },

    #[error("parse error: {message} (path: {path})")]
    Parse { message: String, path: String },

    #[error("parse timed out after {after_ms}ms (path: {path})")]
    Timeout { path: String, after_ms: u64 },

    #[error("database error: {message} (operation: {operation})")]
    Database { message: String, operation: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for results using `CkgError`.
pub type Result<T> = std::result::Result<T, CkgError>;
