//! Document decoding, validation and endpoint extraction.
//!
//! Documents are kept as generic JSON values rather than typed `OpenAPI` structs so that both
//! `OpenAPI` 3.x and legacy Swagger 2.0 inputs go through one code path.

use crate::error::{OpenApiToolsError, Result};
use crate::types::{DocumentInfo, Endpoint, EndpointParameter, RequestBody};
use serde_json::{Map, Value};
use swagger_docs_http_tools::config::ParamLocation;
use url::Url;

/// HTTP verbs recognised as operation keys under a path item.
pub const HTTP_METHODS: [&str; 8] = [
    "get", "post", "put", "delete", "patch", "head", "options", "trace",
];

/// Extension key carrying an explicit tool name.
pub const TOOL_NAME_EXTENSION: &str = "x-mcp-tool-name";

const MAX_REF_HOPS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

/// Extension first (`.json`, `.yaml`, `.yml`), then content sniffing: a leading `{` or `[`
/// means JSON, anything else is treated as YAML.
#[must_use]
pub fn detect_format(location: &str, content: &[u8]) -> DocumentFormat {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".json") {
        return DocumentFormat::Json;
    }
    if lower.ends_with(".yaml") || lower.ends_with(".yml") {
        return DocumentFormat::Yaml;
    }

    match content.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{' | b'[') => DocumentFormat::Json,
        _ => DocumentFormat::Yaml,
    }
}

/// Decode JSON or YAML bytes into a generic value.
///
/// # Errors
///
/// Returns a `Parse` error if the bytes are not valid in the detected format.
pub fn decode(content: &[u8], format: DocumentFormat, location: &str) -> Result<Value> {
    let parse_err = |message: String| OpenApiToolsError::Parse {
        location: location.to_string(),
        message,
    };

    match format {
        DocumentFormat::Json => serde_json::from_slice(content).map_err(|e| parse_err(e.to_string())),
        DocumentFormat::Yaml => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_slice(content).map_err(|e| parse_err(e.to_string()))?;
            Ok(yaml_to_json(yaml))
        }
    }
}

/// YAML allows non-string keys (e.g. `200:` under `responses`); they become strings here.
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = Map::new();
            for (k, v) in mapping {
                let key = match yaml_to_json(k) {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                out.insert(key, yaml_to_json(v));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

/// A validated description document.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub root: Value,
    /// Value of the `openapi` or `swagger` field.
    pub spec_version: String,
    pub is_swagger2: bool,
    pub title: String,
    /// `info.version`.
    pub api_version: String,
    pub description: Option<String>,
    /// Absolute server URL, when the document declares one.
    pub base_url: Option<String>,
}

impl ParsedDocument {
    /// `components.schemas` (OpenAPI 3) or `definitions` (Swagger 2).
    #[must_use]
    pub fn schemas(&self) -> Option<&Map<String, Value>> {
        self.root
            .pointer("/components/schemas")
            .or_else(|| self.root.get("definitions"))
            .and_then(Value::as_object)
    }

    #[must_use]
    pub fn path_count(&self) -> usize {
        self.root
            .get("paths")
            .and_then(Value::as_object)
            .map_or(0, Map::len)
    }
}

/// Decode and validate one document.
///
/// # Errors
///
/// - `Parse` if the content is not JSON/YAML
/// - `Validation` if the version field or the `info.title`/`info.version` fields are missing
pub fn parse_document(content: &[u8], location: &str) -> Result<ParsedDocument> {
    let format = detect_format(location, content);
    let root = decode(content, format, location)?;
    validate(root, location)
}

/// Parse the document behind `info`, using cached bytes for remote sources.
///
/// # Errors
///
/// Returns an IO error if a local file cannot be read, or any [`parse_document`] error.
pub async fn load_document(info: &DocumentInfo) -> Result<ParsedDocument> {
    match &info.content {
        Some(bytes) => parse_document(bytes, &info.location),
        None => {
            let bytes = tokio::fs::read(&info.location).await?;
            parse_document(&bytes, &info.location)
        }
    }
}

fn validate(root: Value, location: &str) -> Result<ParsedDocument> {
    let Some(obj) = root.as_object() else {
        return Err(OpenApiToolsError::Validation(format!(
            "{location}: document root must be an object"
        )));
    };

    let (spec_version, is_swagger2) = match (
        obj.get("openapi").map(scalar_string),
        obj.get("swagger").map(scalar_string),
    ) {
        (Some(v), _) if !v.is_empty() => (v, false),
        (_, Some(v)) if !v.is_empty() => (v, true),
        _ => {
            return Err(OpenApiToolsError::Validation(format!(
                "{location}: missing required version field (openapi or swagger)"
            )));
        }
    };

    let Some(info) = obj.get("info").and_then(Value::as_object) else {
        return Err(OpenApiToolsError::Validation(format!(
            "{location}: missing required info object"
        )));
    };

    let title = info.get("title").map(scalar_string).unwrap_or_default();
    if title.trim().is_empty() {
        return Err(OpenApiToolsError::Validation(format!(
            "{location}: missing required info.title"
        )));
    }

    let api_version = info.get("version").map(scalar_string).unwrap_or_default();
    if api_version.trim().is_empty() {
        return Err(OpenApiToolsError::Validation(format!(
            "{location}: missing required info.version"
        )));
    }

    match obj.get("paths").and_then(Value::as_object) {
        Some(paths) if !paths.is_empty() => {}
        _ => tracing::warn!(document = %location, "document has no paths"),
    }

    let description = info
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    let base_url = if is_swagger2 {
        swagger2_base_url(obj, location)
    } else {
        openapi3_base_url(obj, location)
    };

    Ok(ParsedDocument {
        spec_version,
        is_swagger2,
        title,
        api_version,
        description,
        base_url,
        root,
    })
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn openapi3_base_url(obj: &Map<String, Value>, location: &str) -> Option<String> {
    let server = obj.get("servers")?.as_array()?.first()?;
    let mut url = server.get("url")?.as_str()?.to_string();

    if let Some(vars) = server.get("variables").and_then(Value::as_object) {
        for (name, var) in vars {
            if let Some(default) = var.get("default").map(scalar_string) {
                url = url.replace(&format!("{{{name}}}"), &default);
            }
        }
    }

    absolutize(&url, location)
}

fn swagger2_base_url(obj: &Map<String, Value>, location: &str) -> Option<String> {
    let base_path = obj.get("basePath").and_then(Value::as_str).unwrap_or("");
    match obj.get("host").and_then(Value::as_str) {
        Some(host) if !host.is_empty() => {
            let scheme = obj
                .get("schemes")
                .and_then(Value::as_array)
                .and_then(|s| s.first())
                .and_then(Value::as_str)
                .unwrap_or("https");
            Some(format!("{scheme}://{host}{base_path}"))
        }
        _ => absolutize(if base_path.is_empty() { "/" } else { base_path }, location),
    }
}

/// Relative server URLs are resolved against the document URL when it was fetched remotely.
fn absolutize(url: &str, location: &str) -> Option<String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Some(url.trim_end_matches('/').to_string());
    }
    let doc_url = Url::parse(location).ok()?;
    if doc_url.scheme() != "http" && doc_url.scheme() != "https" {
        return None;
    }
    let resolved = doc_url.join(url).ok()?;
    Some(resolved.as_str().trim_end_matches('/').to_string())
}

/// Follow local `$ref` pointers (`#/components/...`, `#/parameters/...`).
fn resolve_ref<'a>(root: &'a Value, mut value: &'a Value) -> &'a Value {
    for _ in 0..MAX_REF_HOPS {
        let Some(reference) = value.get("$ref").and_then(Value::as_str) else {
            return value;
        };
        let Some(pointer) = reference.strip_prefix('#') else {
            return value;
        };
        match root.pointer(pointer) {
            Some(target) => value = target,
            None => return value,
        }
    }
    value
}

/// Every operation of every path, with path-level parameters merged in.
#[must_use]
pub fn extract_endpoints(doc: &ParsedDocument) -> Vec<Endpoint> {
    let root = &doc.root;
    let Some(paths) = root.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut endpoints = Vec::new();
    for (path, item) in paths {
        let item = resolve_ref(root, item);
        let Some(item) = item.as_object() else {
            tracing::warn!(path = %path, "path item is not an object; skipping");
            continue;
        };

        let shared_params: Vec<&Value> = item
            .get("parameters")
            .and_then(Value::as_array)
            .map(|p| p.iter().collect())
            .unwrap_or_default();

        for (key, operation) in item {
            let method = key.to_ascii_lowercase();
            if !HTTP_METHODS.contains(&method.as_str()) {
                continue;
            }
            let Some(operation) = operation.as_object() else {
                tracing::warn!(path = %path, method = %key, "operation is not an object; skipping");
                continue;
            };
            endpoints.push(build_endpoint(
                doc,
                path,
                &method,
                operation,
                &shared_params,
            ));
        }
    }
    endpoints
}

fn build_endpoint(
    doc: &ParsedDocument,
    path: &str,
    method: &str,
    operation: &Map<String, Value>,
    shared_params: &[&Value],
) -> Endpoint {
    let root = &doc.root;
    let text = |key: &str| {
        operation
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut parameters: Vec<EndpointParameter> = Vec::new();
    let mut request_body = None;

    let own_params = operation
        .get("parameters")
        .and_then(Value::as_array)
        .map(|p| p.iter().collect::<Vec<_>>())
        .unwrap_or_default();

    // Operation-level parameters take precedence over path-level ones with the same (name, in).
    for raw in own_params.iter().chain(shared_params.iter()) {
        let raw = resolve_ref(root, raw);
        let location = raw.get("in").and_then(Value::as_str).unwrap_or_default();

        if location == "body" {
            if request_body.is_none() {
                request_body = swagger2_body(doc, operation, raw);
            }
            continue;
        }

        let Some(param) = convert_parameter(root, raw) else {
            continue;
        };
        if parameters
            .iter()
            .any(|p| p.name == param.name && p.location == param.location)
        {
            continue;
        }
        parameters.push(param);
    }

    if let Some(body) = operation.get("requestBody") {
        request_body = openapi3_body(root, resolve_ref(root, body));
    }

    let tags = operation
        .get("tags")
        .and_then(Value::as_array)
        .map(|t| {
            t.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let responses = operation
        .get("responses")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let security = operation
        .get("security")
        .or_else(|| root.get("security"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Endpoint {
        path: path.to_string(),
        method: method.to_ascii_uppercase(),
        operation_id: text("operationId"),
        summary: text("summary"),
        description: text("description"),
        deprecated: operation
            .get("deprecated")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        tags,
        parameters,
        request_body,
        responses,
        security,
        tool_name_override: text(TOOL_NAME_EXTENSION),
    }
}

fn convert_parameter(root: &Value, raw: &Value) -> Option<EndpointParameter> {
    let name = raw.get("name").and_then(Value::as_str)?.to_string();
    let location_raw = raw.get("in").and_then(Value::as_str).unwrap_or_default();
    let Some(location) = ParamLocation::parse(location_raw) else {
        tracing::debug!(parameter = %name, location = %location_raw, "unsupported parameter location; skipping");
        return None;
    };

    let required = raw.get("required").and_then(Value::as_bool).unwrap_or(false)
        || location == ParamLocation::Path;

    let schema = match raw.get("schema") {
        Some(schema) => Some(resolve_ref(root, schema).clone()),
        None => inline_schema(raw),
    };

    let example = raw
        .get("example")
        .or_else(|| schema.as_ref().and_then(|s| s.get("example")))
        .cloned();

    Some(EndpointParameter {
        name,
        location,
        description: raw
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        required,
        schema,
        example,
    })
}

/// Swagger 2 declares non-body parameter types inline on the parameter object.
fn inline_schema(raw: &Value) -> Option<Value> {
    const KEYS: [&str; 9] = [
        "type", "format", "enum", "items", "minimum", "maximum", "pattern", "default", "example",
    ];

    let mut schema = Map::new();
    for key in KEYS {
        if let Some(v) = raw.get(key) {
            schema.insert(key.to_string(), v.clone());
        }
    }
    (!schema.is_empty()).then_some(Value::Object(schema))
}

fn openapi3_body(root: &Value, body: &Value) -> Option<RequestBody> {
    let content = body.get("content")?.as_object()?;
    let (content_type, media) = content
        .get_key_value("application/json")
        .or_else(|| content.iter().find(|(ct, _)| ct.contains("json")))?;

    let schema = media
        .get("schema")
        .map(|s| resolve_ref(root, s).clone())
        .unwrap_or_else(|| serde_json::json!({ "type": "object" }));

    Some(RequestBody {
        required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
        content_type: content_type.clone(),
        schema,
        description: body
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn swagger2_body(
    doc: &ParsedDocument,
    operation: &Map<String, Value>,
    param: &Value,
) -> Option<RequestBody> {
    let consumes = operation
        .get("consumes")
        .or_else(|| doc.root.get("consumes"))
        .and_then(Value::as_array);
    let content_type = match consumes {
        Some(list) => list
            .iter()
            .filter_map(Value::as_str)
            .find(|ct| ct.contains("json"))?
            .to_string(),
        None => "application/json".to_string(),
    };

    Some(RequestBody {
        required: param.get("required").and_then(Value::as_bool).unwrap_or(false),
        content_type,
        schema: param
            .get("schema")
            .map(|s| resolve_ref(&doc.root, s).clone())
            .unwrap_or_else(|| serde_json::json!({ "type": "object" })),
        description: param
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PETSTORE_YAML: &str = r"
openapi: 3.0.3
info:
  title: Petstore
  version: 1.0.0
servers:
  - url: https://{region}.pets.example.com/v1
    variables:
      region:
        default: eu
components:
  parameters:
    Limit:
      name: limit
      in: query
      schema: { type: integer, minimum: 1, maximum: 100 }
  schemas:
    Pet:
      type: object
paths:
  /pets:
    parameters:
      - name: X-Request-Id
        in: header
        schema: { type: string }
      - name: limit
        in: query
        description: shared limit
    get:
      operationId: listPets
      tags: [pets]
      parameters:
        - $ref: '#/components/parameters/Limit'
      responses:
        200:
          description: ok
          content:
            application/json: {}
    POST:
      summary: Create a pet
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: '#/components/schemas/Pet'
      responses:
        '201': { description: created }
  /pets/{petId}:
    summary: not an operation
    get:
      deprecated: true
      x-mcp-tool-name: ' fetch_pet '
      parameters:
        - name: petId
          in: path
          schema: { type: string }
        - name: session
          in: cookie
      responses: {}
";

    #[test]
    fn detects_format_by_extension_then_content() {
        assert_eq!(detect_format("a/b.JSON", b"x: 1"), DocumentFormat::Json);
        assert_eq!(detect_format("a/b.yml", b"{}"), DocumentFormat::Yaml);
        assert_eq!(
            detect_format("https://x/spec?format=raw", b"  \n{\"a\":1}"),
            DocumentFormat::Json
        );
        assert_eq!(detect_format("https://x/spec", b"[1]"), DocumentFormat::Json);
        assert_eq!(detect_format("spec", b"openapi: 3.0.0"), DocumentFormat::Yaml);
    }

    #[test]
    fn parses_openapi3_yaml_and_counts_endpoints() {
        let doc = parse_document(PETSTORE_YAML.as_bytes(), "petstore.yaml").expect("parse");
        assert_eq!(doc.spec_version, "3.0.3");
        assert!(!doc.is_swagger2);
        assert_eq!(doc.title, "Petstore");
        assert_eq!(doc.api_version, "1.0.0");
        assert_eq!(
            doc.base_url.as_deref(),
            Some("https://eu.pets.example.com/v1")
        );
        assert!(doc.schemas().is_some_and(|s| s.contains_key("Pet")));

        let endpoints = extract_endpoints(&doc);
        assert_eq!(endpoints.len(), 3);
    }

    #[test]
    fn merges_path_level_parameters_with_operation_precedence() {
        let doc = parse_document(PETSTORE_YAML.as_bytes(), "petstore.yaml").expect("parse");
        let endpoints = extract_endpoints(&doc);
        let list = endpoints
            .iter()
            .find(|e| e.operation_id.as_deref() == Some("listPets"))
            .expect("listPets");

        assert_eq!(list.method, "GET");
        assert_eq!(list.tags, vec!["pets"]);
        let names: Vec<_> = list.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["limit", "X-Request-Id"]);
        // The operation's $ref'd parameter wins over the path-level `limit`.
        let limit = &list.parameters[0];
        assert_eq!(limit.schema.as_ref().and_then(|s| s.get("maximum")), Some(&serde_json::json!(100)));
        assert!(limit.description.is_none());
        assert!(list.response_content_types().contains(&"application/json".to_string()));
    }

    #[test]
    fn extracts_request_body_override_and_forces_path_params_required() {
        let doc = parse_document(PETSTORE_YAML.as_bytes(), "petstore.yaml").expect("parse");
        let endpoints = extract_endpoints(&doc);

        let create = endpoints.iter().find(|e| e.method == "POST").expect("post");
        let body = create.request_body.as_ref().expect("body");
        assert!(body.required);
        assert_eq!(body.content_type, "application/json");
        assert_eq!(body.schema["type"], "object");

        let get = endpoints
            .iter()
            .find(|e| e.path == "/pets/{petId}")
            .expect("get pet");
        assert!(get.deprecated);
        assert_eq!(get.tool_name_override.as_deref(), Some("fetch_pet"));
        let pet_id = &get.parameters[0];
        assert_eq!(pet_id.location, ParamLocation::Path);
        assert!(pet_id.required);
        assert_eq!(get.parameters[1].location, ParamLocation::Cookie);
    }

    #[test]
    fn parses_swagger2_with_inline_types_and_body() {
        let json = serde_json::json!({
            "swagger": "2.0",
            "info": { "title": "Legacy", "version": 2 },
            "host": "legacy.example.com",
            "basePath": "/api",
            "schemes": ["http"],
            "paths": {
                "/items": {
                    "post": {
                        "parameters": [
                            { "name": "q", "in": "query", "type": "string", "enum": ["a", "b"] },
                            { "name": "payload", "in": "body", "required": true,
                              "schema": { "type": "object" } },
                            { "name": "file", "in": "formData", "type": "file" }
                        ],
                        "responses": { "200": { "description": "ok" } }
                    }
                }
            }
        });
        let doc = parse_document(json.to_string().as_bytes(), "legacy.json").expect("parse");
        assert!(doc.is_swagger2);
        assert_eq!(doc.api_version, "2");
        assert_eq!(doc.base_url.as_deref(), Some("http://legacy.example.com/api"));

        let endpoints = extract_endpoints(&doc);
        assert_eq!(endpoints.len(), 1);
        let ep = &endpoints[0];
        assert_eq!(ep.parameters.len(), 1);
        assert_eq!(ep.parameters[0].schema.as_ref().expect("schema")["enum"], serde_json::json!(["a", "b"]));
        assert!(ep.request_body.as_ref().is_some_and(|b| b.required));
    }

    #[test]
    fn rejects_documents_missing_required_fields() {
        let cases = [
            (r#"{"info": {"title": "t", "version": "1"}}"#, "missing required version field"),
            (r#"{"openapi": "3.0.0"}"#, "missing required info object"),
            (r#"{"openapi": "3.0.0", "info": {"version": "1"}}"#, "missing required info.title"),
            (r#"{"openapi": "3.0.0", "info": {"title": "t"}}"#, "missing required info.version"),
            (r#"[1, 2]"#, "document root must be an object"),
        ];

        for (content, expected) in cases {
            let err = parse_document(content.as_bytes(), "doc.json").unwrap_err();
            assert!(matches!(err, OpenApiToolsError::Validation(_)), "{content}");
            assert!(err.to_string().contains(expected), "{content}: {err}");
        }
    }

    #[test]
    fn accepts_document_without_paths() {
        let doc = parse_document(
            br#"{"openapi": "3.1.0", "info": {"title": "Empty", "version": "1"}}"#,
            "empty.json",
        )
        .expect("parse");
        assert_eq!(doc.path_count(), 0);
        assert!(extract_endpoints(&doc).is_empty());
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = parse_document(b"{not json", "bad.json").unwrap_err();
        assert!(matches!(err, OpenApiToolsError::Parse { .. }));
    }

    #[test]
    fn relative_server_url_resolves_against_remote_document() {
        let doc = parse_document(
            br#"{"openapi": "3.0.0", "info": {"title": "R", "version": "1"},
                 "servers": [{"url": "/api/v3"}], "paths": {}}"#,
            "https://specs.example.com/docs/r.json",
        )
        .expect("parse");
        assert_eq!(doc.base_url.as_deref(), Some("https://specs.example.com/api/v3"));

        let local = parse_document(
            br#"{"openapi": "3.0.0", "info": {"title": "R", "version": "1"},
                 "servers": [{"url": "/api/v3"}], "paths": {}}"#,
            "/tmp/r.json",
        )
        .expect("parse");
        assert!(local.base_url.is_none());
    }
}
