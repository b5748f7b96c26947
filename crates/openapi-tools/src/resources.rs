//! Read-only documents derived from each description document, addressed by
//! `swagger://<document>/<resource>` URIs.
//!
//! Content is rendered once at generation time; reads never touch the source again.

use crate::config::ResourcesConfig;
use crate::parser::ParsedDocument;
use crate::prompts::{PromptCategory, categorize};
use crate::types::{DocumentInfo, Endpoint};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

pub const URI_SCHEME: &str = "swagger://";
const GENERAL_CATEGORY: &str = "general";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Documentation,
    Schema,
    Example,
    Endpoint,
}

#[derive(Debug, Clone)]
pub struct GeneratedResource {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
    pub category: ResourceCategory,
    pub tags: Vec<String>,
    pub metadata: Value,
    pub content: String,
    pub source: Arc<DocumentInfo>,
}

impl GeneratedResource {
    /// Listing shape.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "uri": self.uri,
            "name": self.name,
            "description": self.description,
            "mimeType": self.mime_type,
        })
    }

    /// `resources/read` result.
    #[must_use]
    pub fn read_json(&self) -> Value {
        json!({
            "contents": [{
                "uri": self.uri,
                "mimeType": self.mime_type,
                "text": self.content,
            }]
        })
    }
}

/// Resource-side category label: `current`, `forecast`, ... or `general`.
fn category_label(endpoint: &Endpoint) -> &'static str {
    match categorize(endpoint) {
        Some(PromptCategory::CurrentConditions) => "current",
        Some(other) => other.as_str(),
        None => GENERAL_CATEGORY,
    }
}

fn group_by_category(endpoints: &[Endpoint]) -> BTreeMap<&'static str, Vec<&Endpoint>> {
    let mut groups: BTreeMap<&'static str, Vec<&Endpoint>> = BTreeMap::new();
    for endpoint in endpoints {
        groups.entry(category_label(endpoint)).or_default().push(endpoint);
    }
    groups
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn endpoint_summary(endpoint: &Endpoint) -> Value {
    json!({
        "method": endpoint.method,
        "path": endpoint.path,
        "summary": endpoint.summary.as_deref().unwrap_or_default(),
        "description": endpoint.description.as_deref().unwrap_or_default(),
        "parameters": endpoint.parameters.len(),
        "responses": endpoint.responses.len(),
        "security": !endpoint.security.is_empty(),
    })
}

/// `GET /v1/alerts/{id}` → `get-v1-alerts-id`.
#[must_use]
pub fn endpoint_identifier(endpoint: &Endpoint) -> String {
    let path = endpoint.path.replace('/', "-").replace(['{', '}'], "");
    format!(
        "{}-{}",
        endpoint.method.to_ascii_lowercase(),
        path.trim_matches('-')
    )
}

#[derive(Debug, Clone, Default)]
pub struct ResourceGenerator {
    config: ResourcesConfig,
}

impl ResourceGenerator {
    #[must_use]
    pub fn new(config: ResourcesConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn generate(
        &self,
        doc: &ParsedDocument,
        endpoints: &[Endpoint],
        info: &Arc<DocumentInfo>,
    ) -> Vec<GeneratedResource> {
        if !self.config.enabled {
            return Vec::new();
        }

        let ctx = Ctx {
            doc,
            endpoints,
            info,
            short: info.short_name(),
        };

        let mut out = Vec::new();
        if self.config.expose_swagger_docs {
            out.push(ctx.swagger_resource());
            out.push(ctx.overview_resource());
        }
        out.extend(ctx.schema_resources());
        out.extend(ctx.example_resources());
        if self.config.allow_endpoint_discovery {
            out.extend(ctx.endpoint_resources());
        }

        tracing::debug!(document = %info.location, resources = out.len(), "generated resources");
        out
    }
}

struct Ctx<'a> {
    doc: &'a ParsedDocument,
    endpoints: &'a [Endpoint],
    info: &'a Arc<DocumentInfo>,
    short: String,
}

impl Ctx<'_> {
    fn uri(&self, resource: &str, ext: &str) -> String {
        format!("{URI_SCHEME}{}/{resource}.{ext}", self.short)
    }

    #[allow(clippy::too_many_arguments)]
    fn resource(
        &self,
        uri: String,
        name: String,
        description: String,
        mime_type: &str,
        category: ResourceCategory,
        tags: &[&str],
        metadata: Value,
        content: String,
    ) -> GeneratedResource {
        GeneratedResource {
            uri,
            name,
            description,
            mime_type: mime_type.to_string(),
            category,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            metadata,
            content,
            source: Arc::clone(self.info),
        }
    }

    fn title(&self) -> &str {
        &self.doc.title
    }

    fn schemas(&self) -> Option<&Map<String, Value>> {
        self.doc.schemas().filter(|s| !s.is_empty())
    }

    fn swagger_resource(&self) -> GeneratedResource {
        self.resource(
            self.uri("swagger", "json"),
            format!("{} Swagger Document", self.title()),
            format!("Complete Swagger/OpenAPI specification for {}", self.title()),
            "application/json",
            ResourceCategory::Documentation,
            &["swagger", "openapi", "specification"],
            json!({
                "version": self.info.version,
                "title": self.title(),
                "endpoints": self.endpoints.len(),
                "schemas": self.schemas().map_or(0, Map::len),
            }),
            pretty(&self.doc.root),
        )
    }

    fn overview_resource(&self) -> GeneratedResource {
        let groups = group_by_category(self.endpoints);

        let mut md = format!("# {} API Overview\n\n", self.title());
        if let Some(description) = &self.doc.description {
            let _ = write!(md, "{description}\n\n");
        }
        let _ = writeln!(md, "**Version:** {}", self.doc.api_version);
        let _ = write!(
            md,
            "**Base URL:** {}\n\n## Endpoints\n\n",
            self.doc.base_url.as_deref().unwrap_or("N/A")
        );
        for (category, endpoints) in &groups {
            let _ = write!(md, "### {}\n\n", title_case(category));
            for ep in endpoints {
                let _ = writeln!(
                    md,
                    "- **{}** `{}` - {}",
                    ep.method,
                    ep.path,
                    ep.summary.as_deref().unwrap_or_default()
                );
            }
            md.push('\n');
        }
        if let Some(schemas) = self.schemas() {
            md.push_str("## Data Models\n\n");
            for name in schemas.keys() {
                let _ = writeln!(md, "- `{name}`");
            }
            md.push('\n');
        }

        self.resource(
            self.uri("overview", "md"),
            format!("{} API Overview", self.title()),
            format!("Human-readable overview of the {} API", self.title()),
            "text/markdown",
            ResourceCategory::Documentation,
            &["overview", "documentation", "summary"],
            json!({
                "endpoints": self.endpoints.len(),
                "categories": groups.keys().collect::<Vec<_>>(),
            }),
            md,
        )
    }

    fn schema_resources(&self) -> Vec<GeneratedResource> {
        let Some(schemas) = self.schemas() else {
            return Vec::new();
        };

        let mut out: Vec<GeneratedResource> = schemas
            .iter()
            .map(|(name, schema)| {
                self.resource(
                    self.uri(&format!("schema-{name}"), "json"),
                    format!("{name} Schema"),
                    format!("JSON schema definition for {name}"),
                    "application/json",
                    ResourceCategory::Schema,
                    &["schema", "json-schema", name.as_str()],
                    json!({
                        "schemaName": name,
                        "type": schema.get("type").and_then(Value::as_str).unwrap_or("unknown"),
                    }),
                    pretty(schema),
                )
            })
            .collect();

        out.push(self.resource(
            self.uri("schemas", "json"),
            format!("{} All Schemas", self.title()),
            format!("All JSON schema definitions for {}", self.title()),
            "application/json",
            ResourceCategory::Schema,
            &["schemas", "json-schema", "all"],
            json!({
                "schemaCount": schemas.len(),
                "schemas": schemas.keys().collect::<Vec<_>>(),
            }),
            pretty(&Value::Object(schemas.clone())),
        ));
        out
    }

    fn example_resources(&self) -> Vec<GeneratedResource> {
        self.endpoints
            .iter()
            .filter(|ep| ep.parameters.iter().any(|p| p.example.is_some()) || !ep.responses.is_empty())
            .map(|ep| {
                let arguments: Map<String, Value> = ep
                    .parameters
                    .iter()
                    .filter_map(|p| p.example.clone().map(|e| (p.name.clone(), e)))
                    .collect();
                let content = json!({
                    "method": ep.method,
                    "path": ep.path,
                    "summary": ep.summary.as_deref().unwrap_or_default(),
                    "request": {
                        "arguments": arguments,
                        "requiredParameters": ep.parameters.iter()
                            .filter(|p| p.required)
                            .map(|p| p.name.as_str())
                            .collect::<Vec<_>>(),
                        "body": ep.request_body.as_ref().map(|b| &b.schema),
                    },
                    "responses": ep.responses.keys().collect::<Vec<_>>(),
                });

                self.resource(
                    format!(
                        "{URI_SCHEME}{}/endpoints/{}/example.json",
                        self.short,
                        endpoint_identifier(ep)
                    ),
                    format!("{} {} Example", ep.method, ep.path),
                    format!("Example request and response for {} {}", ep.method, ep.path),
                    "application/json",
                    ResourceCategory::Example,
                    &["example", "request", "response", ep.method.as_str()],
                    json!({
                        "method": ep.method,
                        "path": ep.path,
                        "summary": ep.summary.as_deref().unwrap_or_default(),
                        "hasAuth": !ep.security.is_empty(),
                    }),
                    pretty(&content),
                )
            })
            .collect()
    }

    fn endpoint_resources(&self) -> Vec<GeneratedResource> {
        let groups = group_by_category(self.endpoints);
        let methods: BTreeSet<&str> = self.endpoints.iter().map(|e| e.method.as_str()).collect();

        let mut out = vec![self.resource(
            self.uri("endpoints", "json"),
            format!("{} Endpoints Catalog", self.title()),
            format!("Complete catalog of all endpoints in {}", self.title()),
            "application/json",
            ResourceCategory::Endpoint,
            &["endpoints", "catalog", "discovery"],
            json!({
                "endpointCount": self.endpoints.len(),
                "methods": methods,
                "categories": groups.keys().collect::<Vec<_>>(),
            }),
            pretty(&Value::Array(self.endpoints.iter().map(endpoint_summary).collect())),
        )];

        for (category, endpoints) in groups {
            out.push(self.resource(
                self.uri(&format!("endpoints-{category}"), "json"),
                format!("{} Endpoints", title_case(category)),
                format!("Endpoints related to {category} functionality"),
                "application/json",
                ResourceCategory::Endpoint,
                &["endpoints", category, "filtered"],
                json!({
                    "category": category,
                    "endpointCount": endpoints.len(),
                }),
                pretty(&Value::Array(
                    endpoints.iter().map(|e| endpoint_summary(e)).collect(),
                )),
            ));
        }
        out
    }
}
