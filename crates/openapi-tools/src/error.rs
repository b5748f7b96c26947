//! Error types for `swagger-docs-openapi-tools`.

use thiserror::Error;

/// Main error type for document discovery, parsing and registration.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Configuration errors (invalid options).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A path or URL could not be discovered. Collected by the scanner, never fatal to a scan.
    #[error("Discovery error: failed to scan '{source_path}': {message}")]
    Discovery {
        source_path: String,
        message: String,
    },

    /// Content could not be decoded as JSON or YAML.
    #[error("Parse error: failed to parse document from '{location}': {message}")]
    Parse { location: String, message: String },

    /// Document is missing required fields.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Registration rejected because the name is taken.
    #[error("Conflict error: '{name}' from {new_source} is already registered by {existing_source}")]
    Conflict {
        name: String,
        new_source: String,
        existing_source: String,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML errors.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl OpenApiToolsError {
    pub(crate) fn discovery(source_path: impl Into<String>, message: impl ToString) -> Self {
        Self::Discovery {
            source_path: source_path.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
