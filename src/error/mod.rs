use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Diagnosis error: {0}")]
    Diagnosis(#[from] DiagnosisError),

    #[error("Matcher error: {0}")]
    Matcher(#[from] MatcherError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Knowledge graph store errors
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Graph inconsistency: {message}")]
    Inconsistency { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Session and turn errors surfaced to callers
#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("No semantic matcher configured")]
    MatcherUnavailable,
}

/// Semantic matcher errors
#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("Matcher unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

impl From<DiagnosisError> for McpError {
    fn from(err: DiagnosisError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for graph store operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for session operations
pub type DiagnosisResult<T> = Result<T, DiagnosisError>;

/// Result type alias for matcher operations
pub type MatcherResult<T> = Result<T, MatcherError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
