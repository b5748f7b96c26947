//! Error types for the server.

use swagger_docs_http_tools::runtime::HttpToolsError;
use swagger_docs_openapi_tools::error::OpenApiToolsError;
use thiserror::Error;

/// Main error type for the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration errors (invalid file, bad flag values, failed validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup errors (bind failure, logging setup)
    #[error("Startup error: {0}")]
    Startup(String),

    /// Lookup of a tool that is not registered.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Document pipeline errors
    #[error(transparent)]
    Tools(#[from] OpenApiToolsError),

    /// Outbound call errors
    #[error(transparent)]
    Http(#[from] HttpToolsError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
