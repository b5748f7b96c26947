use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "swagger-docs-mcp/1.0.0";

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpClientConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub retries: u32,
    pub user_agent: String,
    /// Overrides the base URL declared by each document.
    pub base_url: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            base_url: None,
        }
    }
}

impl HttpClientConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// How the configured API key is attached to outbound calls.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`.
    #[default]
    Bearer,
    /// `X-API-Key: <key>`.
    #[serde(alias = "api_key", alias = "api-key")]
    ApiKey,
}

impl AuthScheme {
    pub const API_KEY_HEADER: &'static str = "X-API-Key";
}

/// Static credential attached to every outbound call.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    pub api_key: Option<String>,
    pub default_scheme: AuthScheme,
}

impl AuthConfig {
    /// A copy of this config with the key replaced (per-call override).
    #[must_use]
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            default_scheme: self.default_scheme,
        }
    }

    #[must_use]
    pub fn has_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Parameter location.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParamLocation {
    /// Parse an `in` value. Unknown locations yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

/// A parameter binding for one outbound operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationParam {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
}

/// Everything the client needs to issue a call for one tool.
#[derive(Debug, Clone)]
pub struct HttpOperation {
    /// Upper-case HTTP method.
    pub method: String,
    /// Path template with `{name}` placeholders.
    pub path: String,
    /// Base URL declared by the source document, if any.
    pub base_url: Option<String>,
    pub params: Vec<OperationParam>,
    pub body_required: bool,
}
