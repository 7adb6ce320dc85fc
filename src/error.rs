//! Error types for OpenAgent

use thiserror::Error;

/// Result type alias using OpenAgent's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for OpenAgent
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sandbox execution error
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unauthorized access
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Requested tool is not registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool exists but is disabled by policy
    #[error("Tool disabled: {0}")]
    ToolDisabled(String),

    /// Tool arguments failed schema/sandbox validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A destructive tool call was blocked (missing confirm, batch limit, ...)
    #[error("Destructive action blocked: {0}")]
    DestructiveBlocked(String),

    /// A call was suppressed as a duplicate of an already-attempted action
    #[error("Duplicate action blocked: {0}")]
    DuplicateBlocked(String),

    /// Path or argument fell outside the sandbox root
    #[error("Path outside sandbox: {0}")]
    PathOutsideSandbox(String),

    /// Access denied by sandbox or policy
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Tool or batch execution failed
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Batch failed pre-validation
    #[error("Batch validation error: {0}")]
    BatchValidationError(String),

    /// Batch execution failed as a whole
    #[error("Batch error: {0}")]
    BatchError(String),

    /// Structured text (JSON) could not be parsed or repaired
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    /// Network-level failure talking to a model endpoint or outbound tool
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Declarative config file (e.g. tools policy) failed to parse as YAML
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::RateLimit(_)
                | Error::Timeout(_)
                | Error::NetworkError(_)
                | Error::ExecutionError(_)
        )
    }

    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_)
                | Error::NotFound(_)
                | Error::Unauthorized(_)
                | Error::UnknownTool(_)
                | Error::ToolDisabled(_)
                | Error::ValidationError(_)
                | Error::DestructiveBlocked(_)
                | Error::DuplicateBlocked(_)
                | Error::PathOutsideSandbox(_)
                | Error::AccessDenied(_)
                | Error::BatchValidationError(_)
                | Error::JsonParseError(_)
        )
    }
}
