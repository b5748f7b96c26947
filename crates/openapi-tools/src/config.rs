use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Filesystem/URL discovery options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanOptions {
    /// Descend into subdirectories.
    pub include_subdirectories: bool,
    /// Accepted file extensions, with the leading dot.
    pub file_extensions: Vec<String>,
    /// Directory depth limit; the root directory is depth 0.
    pub max_depth: usize,
    /// Timeout for each remote fetch, in seconds.
    pub fetch_timeout_secs: u64,
    /// Nesting limit for documents that are themselves URL lists.
    pub max_url_list_depth: usize,
    pub user_agent: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_subdirectories: true,
            file_extensions: vec![".json".into(), ".yaml".into(), ".yml".into()],
            max_depth: 3,
            fetch_timeout_secs: 30,
            max_url_list_depth: 5,
            user_agent: swagger_docs_http_tools::config::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ScanOptions {
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Whether `ext` (without the dot) is one of the accepted extensions.
    #[must_use]
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.file_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

/// Tool generation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolGenerationConfig {
    pub include_deprecated: bool,
    /// Cap applied to the description of endpoint prompts and resource summaries.
    pub max_description_length: usize,
    /// Prefer `operationId` over the synthesized path name.
    pub use_operation_id: bool,
    /// Keep only this format when an endpoint is offered in several.
    pub prefer_format: Option<String>,
    /// Endpoints in these formats are dropped entirely.
    pub ignore_formats: Vec<String>,
}

impl Default for ToolGenerationConfig {
    fn default() -> Self {
        Self {
            include_deprecated: false,
            max_description_length: 500,
            use_operation_id: true,
            prefer_format: None,
            ignore_formats: Vec::new(),
        }
    }
}

impl ToolGenerationConfig {
    #[must_use]
    pub fn preferred_format(&self) -> Option<String> {
        self.prefer_format
            .as_deref()
            .map(|f| f.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|f| !f.is_empty())
    }

    #[must_use]
    pub fn is_ignored_format(&self, format: &str) -> bool {
        self.ignore_formats
            .iter()
            .any(|f| f.trim().trim_start_matches('.').eq_ignore_ascii_case(format))
    }
}

/// Classification-tag filters (`x-twc-*` extension families).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TwcFilters {
    pub portfolios: Vec<String>,
    pub domains: Vec<String>,
    pub usage_classifications: Vec<String>,
    pub geographies: Vec<String>,
}

impl TwcFilters {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.portfolios.is_empty()
            && self.domains.is_empty()
            && self.usage_classifications.is_empty()
            && self.geographies.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptsConfig {
    pub enabled: bool,
    pub include_examples: bool,
    pub generate_from_endpoints: bool,
    /// Allowed categories for endpoint prompts. Empty = all.
    pub categories: Vec<String>,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_examples: true,
            generate_from_endpoints: true,
            categories: [
                "current-conditions",
                "forecast",
                "alerts",
                "historical",
                "marine",
                "aviation",
                "lifestyle",
                "analysis",
                "comparison",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourcesConfig {
    pub enabled: bool,
    pub expose_swagger_docs: bool,
    pub allow_endpoint_discovery: bool,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expose_swagger_docs: true,
            allow_endpoint_discovery: true,
        }
    }
}
