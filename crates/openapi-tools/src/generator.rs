//! Endpoint → tool conversion.

use crate::config::ToolGenerationConfig;
use crate::error::{OpenApiToolsError, Result};
use crate::naming::{self, NameContext};
use crate::parser::{ParsedDocument, extract_endpoints};
use crate::types::{DocumentInfo, Endpoint, EndpointParameter, GeneratedTool};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use swagger_docs_http_tools::runtime::REQUEST_BODY_ARG;

const MAX_DESCRIPTION_LEN: usize = 200;
const FORMAT_EXTENSIONS: [&str; 4] = [".json", ".xml", ".yaml", ".yml"];

/// Schema keywords copied from a parameter's schema into its tool property.
const COPIED_SCHEMA_KEYS: [&str; 8] = [
    "type", "format", "enum", "minimum", "maximum", "pattern", "items", "default",
];

/// Response format of an endpoint: path suffix, then path substring, then declared response
/// content types; `json` when nothing matches.
#[must_use]
pub fn endpoint_format(endpoint: &Endpoint) -> &'static str {
    let path = endpoint.path.to_ascii_lowercase();

    if path.ends_with(".json") {
        return "json";
    }
    if path.ends_with(".xml") {
        return "xml";
    }
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        return "yaml";
    }

    if let Some(format) = format_in(&path) {
        return format;
    }

    endpoint
        .response_content_types()
        .iter()
        .find_map(|ct| format_in(&ct.to_ascii_lowercase()))
        .unwrap_or("json")
}

fn format_in(text: &str) -> Option<&'static str> {
    if text.contains("json") {
        Some("json")
    } else if text.contains("xml") {
        Some("xml")
    } else if text.contains("yaml") || text.contains("yml") {
        Some("yaml")
    } else {
        None
    }
}

/// Path with any trailing format extension removed.
#[must_use]
pub fn path_without_format(path: &str) -> &str {
    FORMAT_EXTENSIONS
        .iter()
        .fold(path, |p, ext| p.strip_suffix(ext).unwrap_or(p))
}

/// Logical endpoint key: the same operation offered in several formats shares it.
fn logical_key(endpoint: &Endpoint) -> (String, String) {
    (
        endpoint.method.clone(),
        path_without_format(&endpoint.path).to_string(),
    )
}

/// Converts the endpoints of one parsed document into tools.
#[derive(Debug, Clone, Default)]
pub struct ToolGenerator {
    config: ToolGenerationConfig,
}

impl ToolGenerator {
    #[must_use]
    pub fn new(config: ToolGenerationConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ToolGenerationConfig {
        &self.config
    }

    /// Generate every tool the document yields. A malformed endpoint is logged and skipped.
    #[must_use]
    pub fn generate(&self, doc: &ParsedDocument, info: &Arc<DocumentInfo>) -> Vec<GeneratedTool> {
        let endpoints = self.select_endpoints(extract_endpoints(doc));

        let mut tools = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            match self.generate_tool(endpoint, &endpoints, doc, info) {
                Ok(tool) => tools.push(tool),
                Err(err) => tracing::warn!(
                    document = %info.location,
                    method = %endpoint.method,
                    path = %endpoint.path,
                    error = %err,
                    "failed to generate tool; skipping endpoint"
                ),
            }
        }

        tracing::debug!(document = %info.title, tools = tools.len(), "generated tools");
        tools
    }

    /// Apply the deprecation, ignored-format and preferred-format rules.
    fn select_endpoints(&self, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        let kept: Vec<Endpoint> = endpoints
            .into_iter()
            .filter(|ep| {
                if ep.deprecated && !self.config.include_deprecated {
                    tracing::debug!(method = %ep.method, path = %ep.path, "skipping deprecated endpoint");
                    return false;
                }
                let format = endpoint_format(ep);
                if self.config.is_ignored_format(format) {
                    tracing::debug!(method = %ep.method, path = %ep.path, format, "skipping ignored format");
                    return false;
                }
                true
            })
            .collect();

        let Some(preferred) = self.config.preferred_format() else {
            return kept;
        };

        let covered: HashSet<(String, String)> = kept
            .iter()
            .filter(|ep| endpoint_format(ep) == preferred)
            .map(logical_key)
            .collect();

        let (mut selected, rest): (Vec<_>, Vec<_>) = kept
            .into_iter()
            .partition(|ep| endpoint_format(ep) == preferred);
        selected.extend(
            rest.into_iter()
                .filter(|ep| !covered.contains(&logical_key(ep))),
        );
        selected
    }

    /// `Some(format)` when siblings of `endpoint` exist in other formats and the endpoint is not
    /// in the preferred format.
    fn format_suffix(&self, endpoint: &Endpoint, siblings: &[Endpoint]) -> Option<&'static str> {
        let format = endpoint_format(endpoint);
        if self.config.preferred_format().as_deref() == Some(format) {
            return None;
        }

        let key = logical_key(endpoint);
        let formats: BTreeSet<&str> = siblings
            .iter()
            .filter(|ep| logical_key(ep) == key)
            .map(endpoint_format)
            .collect();

        (formats.len() > 1).then_some(format)
    }

    fn generate_tool(
        &self,
        endpoint: &Endpoint,
        siblings: &[Endpoint],
        doc: &ParsedDocument,
        info: &Arc<DocumentInfo>,
    ) -> Result<GeneratedTool> {
        if !endpoint.path.starts_with('/') {
            return Err(OpenApiToolsError::Validation(format!(
                "path '{}' must start with '/'",
                endpoint.path
            )));
        }

        let name = naming::tool_name(
            endpoint,
            &NameContext {
                version: &info.version,
                format_suffix: self.format_suffix(endpoint, siblings),
                use_operation_id: self.config.use_operation_id,
            },
        );

        Ok(GeneratedTool {
            name,
            description: describe(endpoint, &info.version),
            input_schema: input_schema(endpoint)?,
            endpoint: Arc::new(endpoint.clone()),
            document: Arc::clone(info),
            base_url: doc.base_url.clone(),
        })
    }
}

/// Summary, else description, else `"<METHOD> <path>"`; version prefix; tag suffix.
#[must_use]
pub fn describe(endpoint: &Endpoint, version: &str) -> String {
    let mut text = endpoint
        .summary
        .clone()
        .or_else(|| endpoint.description.clone())
        .unwrap_or_else(|| format!("{} {}", endpoint.method, endpoint.path));

    if !version.is_empty() {
        text = format!("[v{version}] {text}");
    }
    if !endpoint.tags.is_empty() {
        text = format!("{text} (Tags: {})", endpoint.tags.join(", "));
    }

    if text.chars().count() > MAX_DESCRIPTION_LEN {
        let mut cut: String = text.chars().take(MAX_DESCRIPTION_LEN - 3).collect();
        cut.push_str("...");
        text = cut;
    }
    text
}

/// JSON Schema for the tool arguments. `required` is always present, possibly empty.
///
/// # Errors
///
/// Returns a `Validation` error if two parameters share a property name.
pub fn input_schema(endpoint: &Endpoint) -> Result<Value> {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &endpoint.parameters {
        if properties.contains_key(&param.name) {
            // Same name in two locations (e.g. path and query) cannot share one argument map.
            return Err(OpenApiToolsError::Validation(format!(
                "parameter '{}' is declared more than once",
                param.name
            )));
        }
        properties.insert(param.name.clone(), parameter_schema(param));
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    if let Some(body) = &endpoint.request_body {
        let mut schema = body.schema.clone();
        if let (Some(description), Some(obj)) = (&body.description, schema.as_object_mut()) {
            obj.entry("description")
                .or_insert_with(|| Value::String(description.clone()));
        }
        properties.insert(REQUEST_BODY_ARG.to_string(), schema);
        if body.required {
            required.push(Value::String(REQUEST_BODY_ARG.to_string()));
        }
    }

    Ok(json!({
        "type": "object",
        "properties": properties,
        "required": required,
    }))
}

fn parameter_schema(param: &EndpointParameter) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("string".into()));

    if let Some(description) = &param.description {
        schema.insert("description".into(), Value::String(description.clone()));
    }
    if let Some(source) = param.schema.as_ref().and_then(Value::as_object) {
        for key in COPIED_SCHEMA_KEYS {
            if let Some(v) = source.get(key) {
                schema.insert(key.to_string(), v.clone());
            }
        }
    }
    if let Some(example) = &param.example {
        schema.insert("example".into(), example.clone());
    }
    schema.insert(
        "x-parameter-in".into(),
        Value::String(param.location.as_str().to_string()),
    );

    Value::Object(schema)
}

/// Names listed in a schema's `required` array.
#[must_use]
pub fn required_names(schema: &Value) -> BTreeSet<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Aggregate counts over a set of tools.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolStatistics {
    pub total_tools: usize,
    pub tools_by_method: BTreeMap<String, usize>,
    pub tools_by_version: BTreeMap<String, usize>,
    pub tools_by_tag: BTreeMap<String, usize>,
}

#[must_use]
pub fn statistics<'a>(tools: impl IntoIterator<Item = &'a GeneratedTool>) -> ToolStatistics {
    let mut stats = ToolStatistics::default();
    for tool in tools {
        stats.total_tools += 1;
        *stats
            .tools_by_method
            .entry(tool.endpoint.method.clone())
            .or_default() += 1;
        *stats
            .tools_by_version
            .entry(tool.document.version.clone())
            .or_default() += 1;
        for tag in &tool.endpoint.tags {
            *stats.tools_by_tag.entry(tag.clone()).or_default() += 1;
        }
    }
    stats
}
