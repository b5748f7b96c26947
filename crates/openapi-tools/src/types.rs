//! Core data model shared by the scanner, parser, generators and registries.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use swagger_docs_http_tools::config::{HttpOperation, OperationParam, ParamLocation};

/// Classification tags read from the `x-package-ids` / `x-twc-*` extensions.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationTags {
    pub package_ids: Vec<String>,
    pub portfolios: Vec<String>,
    pub domains: Vec<String>,
    pub usage_classifications: Vec<String>,
    pub geographies: Vec<String>,
}

impl ClassificationTags {
    pub const PACKAGE_IDS: &'static str = "x-package-ids";
    pub const PORTFOLIO: &'static str = "x-twc-domain-portfolio";
    pub const DOMAIN: &'static str = "x-twc-domain";
    pub const USAGE_CLASSIFICATION: &'static str = "x-twc-usage-classification";
    pub const GEOGRAPHY: &'static str = "x-twc-geography";

    /// Read the extension fields from a document root. Each field may be a string or an array
    /// of strings; empty strings are dropped.
    #[must_use]
    pub fn from_document(root: &Value) -> Self {
        Self {
            package_ids: string_list(root.get(Self::PACKAGE_IDS)),
            portfolios: string_list(root.get(Self::PORTFOLIO)),
            domains: string_list(root.get(Self::DOMAIN)),
            usage_classifications: string_list(root.get(Self::USAGE_CLASSIFICATION)),
            geographies: string_list(root.get(Self::GEOGRAPHY)),
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// One discovered description source. Immutable once the scanner hands it out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    /// File path or URL.
    pub location: String,
    pub version: String,
    pub title: String,
    pub is_remote: bool,
    pub tags: ClassificationTags,
    /// Fetched bytes for remote documents, so they are only downloaded once.
    #[serde(skip)]
    pub content: Option<Arc<[u8]>>,
}

impl DocumentInfo {
    /// File stem (local) or last path segment without extension (remote); used in resource URIs.
    #[must_use]
    pub fn short_name(&self) -> String {
        let last = self
            .location
            .trim_end_matches('/')
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.location.as_str());
        let last = last.split(['?', '#']).next().unwrap_or(last);
        let stem = match last.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => last,
        };
        if stem.is_empty() {
            "document".to_string()
        } else {
            stem.to_string()
        }
    }
}

/// One parameter of an endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointParameter {
    pub name: String,
    pub location: ParamLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

/// JSON request body declared by an operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    pub required: bool,
    pub content_type: String,
    pub schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One HTTP operation extracted from a document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub path: String,
    /// Upper-case HTTP method.
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub deprecated: bool,
    pub tags: Vec<String>,
    pub parameters: Vec<EndpointParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    pub responses: Map<String, Value>,
    pub security: Vec<Value>,
    /// `x-mcp-tool-name` override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name_override: Option<String>,
}

impl Endpoint {
    /// Declared response content types, across all responses.
    #[must_use]
    pub fn response_content_types(&self) -> Vec<String> {
        let mut out = Vec::new();
        for response in self.responses.values() {
            if let Some(content) = response.get("content").and_then(Value::as_object) {
                out.extend(content.keys().cloned());
            }
        }
        out
    }

    /// Text used for keyword classification (path, summary, description; lower-cased).
    #[must_use]
    pub fn classification_text(&self) -> String {
        format!(
            "{} {} {}",
            self.path,
            self.summary.as_deref().unwrap_or_default(),
            self.description.as_deref().unwrap_or_default()
        )
        .to_lowercase()
    }
}

/// A callable unit generated from one endpoint.
#[derive(Debug, Clone)]
pub struct GeneratedTool {
    /// Unique, `[a-z0-9_]+`, at most 64 characters (overrides excepted).
    pub name: String,
    pub description: String,
    /// JSON Schema object with `properties` and `required`.
    pub input_schema: Value,
    pub endpoint: Arc<Endpoint>,
    pub document: Arc<DocumentInfo>,
    /// Server URL declared by the source document.
    pub base_url: Option<String>,
}

impl GeneratedTool {
    /// The outbound call description for this tool.
    #[must_use]
    pub fn operation(&self) -> HttpOperation {
        HttpOperation {
            method: self.endpoint.method.clone(),
            path: self.endpoint.path.clone(),
            base_url: self.base_url.clone(),
            params: self
                .endpoint
                .parameters
                .iter()
                .map(|p| OperationParam {
                    name: p.name.clone(),
                    location: p.location,
                    required: p.required,
                })
                .collect(),
            body_required: self
                .endpoint
                .request_body
                .as_ref()
                .is_some_and(|b| b.required),
        }
    }

    /// `"GET /path from Title"`, used when reporting conflicts.
    #[must_use]
    pub fn source_label(&self) -> String {
        format!(
            "{} {} from {}",
            self.endpoint.method, self.endpoint.path, self.document.title
        )
    }

    /// Wire shape used by both transports.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classification_tags_accept_strings_and_arrays() {
        let root = json!({
            "x-package-ids": ["a", "", "b"],
            "x-twc-domain": "forecast",
            "x-twc-geography": "",
            "x-twc-domain-portfolio": 7
        });
        let tags = ClassificationTags::from_document(&root);
        assert_eq!(tags.package_ids, vec!["a", "b"]);
        assert_eq!(tags.domains, vec!["forecast"]);
        assert!(tags.geographies.is_empty());
        assert!(tags.portfolios.is_empty());
    }

    #[test]
    fn short_name_strips_directories_and_extension() {
        let mut doc = DocumentInfo {
            location: "/specs/v3/weather-data.yaml".to_string(),
            version: "3".to_string(),
            title: "weather-data".to_string(),
            is_remote: false,
            tags: ClassificationTags::default(),
            content: None,
        };
        assert_eq!(doc.short_name(), "weather-data");

        doc.location = "https://api.example.com/specs/alerts.json?x=1".to_string();
        assert_eq!(doc.short_name(), "alerts");
    }
}
