//! Runtime for executing generated tools against the real API.
//!
//! One [`ApiClient`] is shared by every transport. A call binds the tool arguments onto the
//! operation's path/query/header parameters, attaches the static credential and retries
//! transient failures with quadratic backoff.

use crate::config::{AuthConfig, AuthScheme, HttpClientConfig, HttpOperation, ParamLocation};
use crate::safety::{parse_http_url, redact_url, sanitize_reqwest_error};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Used when neither the config nor the document names a server.
pub const FALLBACK_BASE_URL: &str = "https://api.weather.com";

/// Argument key carrying the JSON request body.
pub const REQUEST_BODY_ARG: &str = "requestBody";

const ACCEPT_VALUE: &str = "application/json, */*";

#[derive(Debug, Error)]
pub enum HttpToolsError {
    #[error("config error: {0}")]
    Config(String),
    /// Bad input detected before any request was sent.
    #[error("validation error: {0}")]
    Validation(String),
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("request failed after {attempts} attempts (URL: {url}, last error: {message})")]
    Execution {
        attempts: u32,
        url: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

impl From<reqwest::Error> for HttpToolsError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(sanitize_reqwest_error(&value))
    }
}

/// Raw result of an outbound call. Any HTTP status is a "successful" call.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

#[derive(Debug)]
struct RequestParts {
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Option<Value>,
}

/// Shared outbound client.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    config: HttpClientConfig,
    auth: AuthConfig,
    backoff_unit: Duration,
}

impl ApiClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns a config error if the underlying HTTP client cannot be constructed.
    pub fn new(config: HttpClientConfig, auth: AuthConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HttpToolsError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                auth,
                backoff_unit: Duration::from_secs(1),
            }),
        })
    }

    /// Scale the retry delay (`unit * attempt²`). Defaults to one second.
    #[must_use]
    pub fn with_backoff_unit(self, unit: Duration) -> Self {
        let inner = Inner {
            client: self.inner.client.clone(),
            config: self.inner.config.clone(),
            auth: self.inner.auth.clone(),
            backoff_unit: unit,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HttpClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn auth(&self) -> &AuthConfig {
        &self.inner.auth
    }

    /// Execute `operation` with the configured credential.
    ///
    /// # Errors
    ///
    /// See [`Self::execute_with_auth`].
    pub async fn execute(
        &self,
        operation: &HttpOperation,
        arguments: &Map<String, Value>,
    ) -> Result<ApiResponse> {
        self.execute_with_auth(operation, arguments, &self.inner.auth)
            .await
    }

    /// Execute `operation` with an explicit credential.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `Validation` if a required parameter is missing or the target URL is invalid
    ///   (nothing is sent in that case)
    /// - `Execution` once every attempt failed with a transport error or a retryable status
    pub async fn execute_with_auth(
        &self,
        operation: &HttpOperation,
        arguments: &Map<String, Value>,
        auth: &AuthConfig,
    ) -> Result<ApiResponse> {
        let parts = build_request_parts(operation, arguments)?;
        let base_url = self
            .inner
            .config
            .base_url
            .as_deref()
            .or(operation.base_url.as_deref())
            .unwrap_or(FALLBACK_BASE_URL);
        let url = build_url(base_url, &parts.path, &parts.query)?;
        let method = Method::from_bytes(operation.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| {
                HttpToolsError::Validation(format!(
                    "invalid HTTP method '{}': {e}",
                    operation.method
                ))
            })?;

        self.send_with_retries(&method, &url, &parts, auth).await
    }

    async fn send_with_retries(
        &self,
        method: &Method,
        url: &Url,
        parts: &RequestParts,
        auth: &AuthConfig,
    ) -> Result<ApiResponse> {
        let retries = self.inner.config.retries;
        let redacted = redact_url(url);
        let mut last_error = String::from("no attempt made");

        for attempt in 0..=retries {
            if attempt > 0 {
                let delay = self.inner.backoff_unit * (attempt * attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, url = %redacted, "retrying request");
                tokio::time::sleep(delay).await;
            }

            // Rebuilt per attempt so the body is replayed from the parsed parts.
            let request = self.build_request(method, url, parts, auth);

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if is_retryable_status(status) {
                        last_error = format!("HTTP {status}");
                        warn!(
                            attempt = attempt + 1,
                            status = status.as_u16(),
                            url = %redacted,
                            "retryable response status"
                        );
                        continue;
                    }
                    match read_response(resp).await {
                        Ok(response) => return Ok(response),
                        Err(e) => {
                            last_error = e.to_string();
                            warn!(attempt = attempt + 1, url = %redacted, error = %last_error, "failed to read response body");
                        }
                    }
                }
                Err(e) => {
                    last_error = sanitize_reqwest_error(&e);
                    warn!(attempt = attempt + 1, url = %redacted, error = %last_error, "request failed");
                }
            }
        }

        Err(HttpToolsError::Execution {
            attempts: retries + 1,
            url: redacted,
            message: last_error,
        })
    }

    fn build_request(
        &self,
        method: &Method,
        url: &Url,
        parts: &RequestParts,
        auth: &AuthConfig,
    ) -> reqwest::RequestBuilder {
        let mut request = self
            .inner
            .client
            .request(method.clone(), url.clone())
            .header(reqwest::header::ACCEPT, ACCEPT_VALUE)
            .timeout(self.inner.config.timeout());

        request = apply_auth(request, auth);
        for (name, value) in &parts.headers {
            request = request.header(name.clone(), value.clone());
        }
        if let Some(body) = &parts.body {
            request = request.json(body);
        }
        request
    }
}

fn apply_auth(request: reqwest::RequestBuilder, auth: &AuthConfig) -> reqwest::RequestBuilder {
    match auth.api_key.as_deref() {
        Some(key) if !key.is_empty() => match auth.default_scheme {
            AuthScheme::Bearer => request.bearer_auth(key),
            AuthScheme::ApiKey => request.header(AuthScheme::API_KEY_HEADER, key),
        },
        _ => request,
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

async fn read_response(resp: reqwest::Response) -> Result<ApiResponse> {
    let status = resp.status().as_u16();
    let headers = resp
        .headers()
        .iter()
        .filter_map(|(k, v)| {
            v.to_str()
                .ok()
                .map(|v| (k.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = resp.text().await?;
    Ok(ApiResponse {
        status,
        headers,
        body,
    })
}

fn build_request_parts(
    operation: &HttpOperation,
    arguments: &Map<String, Value>,
) -> Result<RequestParts> {
    let mut path = operation.path.clone();
    let mut query = Vec::new();
    let mut headers = Vec::new();

    for param in &operation.params {
        let value = arguments.get(&param.name).filter(|v| !v.is_null());

        let Some(value) = value else {
            if param.required {
                return Err(HttpToolsError::Validation(format!(
                    "missing required parameter: {}",
                    param.name
                )));
            }
            continue;
        };

        let rendered = value_to_string(value);
        match param.location {
            ParamLocation::Path => {
                path = path.replace(
                    &format!("{{{}}}", param.name),
                    &encode_path_segment(&rendered),
                );
            }
            ParamLocation::Query => query.push((param.name.clone(), rendered)),
            ParamLocation::Header => headers.push(header_pair(&param.name, &rendered)?),
            ParamLocation::Cookie => {
                warn!(parameter = %param.name, "cookie parameters are not supported; skipping");
            }
        }
    }

    let body = arguments
        .get(REQUEST_BODY_ARG)
        .filter(|v| !v.is_null())
        .cloned();
    if operation.body_required && body.is_none() {
        return Err(HttpToolsError::Validation(format!(
            "missing required parameter: {REQUEST_BODY_ARG}"
        )));
    }

    if !path.starts_with('/') {
        path = format!("/{path}");
    }

    Ok(RequestParts {
        path,
        query,
        headers,
        body,
    })
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
        HttpToolsError::Validation(format!("invalid header parameter name: {name}"))
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|_| {
        HttpToolsError::Validation(format!("invalid value for header parameter: {name}"))
    })?;
    Ok((header_name, header_value))
}

fn build_url(base_url: &str, path: &str, query: &[(String, String)]) -> Result<Url> {
    let joined = format!("{}{}", base_url.trim_end_matches('/'), path);
    let mut url = parse_http_url(&joined)?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

fn encode_path_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b',' | b':') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Best-effort MIME essence of a `Content-Type` value (`application/json; charset=utf-8` →
/// `application/json`).
#[must_use]
pub fn mime_essence(content_type: &str) -> String {
    content_type
        .parse::<mime::Mime>()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|_| content_type.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationParam;
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method as AxumMethod, StatusCode as AxumStatus, Uri};
    use axum::routing::any;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use swagger_docs_test_support::serve_router;

    async fn echo_handler(
        method: AxumMethod,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> axum::Json<Value> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        axum::Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query().unwrap_or(""),
            "authorization": header("authorization"),
            "x_api_key": header("x-api-key"),
            "x_trace": header("x-trace"),
            "accept": header("accept"),
            "user_agent": header("user-agent"),
            "content_type": header("content-type"),
            "body": String::from_utf8_lossy(&body),
        }))
    }

    fn forecast_operation(base_url: &str) -> HttpOperation {
        HttpOperation {
            method: "GET".to_string(),
            path: "/v3/forecast/{days}".to_string(),
            base_url: Some(base_url.to_string()),
            params: vec![
                OperationParam {
                    name: "days".to_string(),
                    location: ParamLocation::Path,
                    required: true,
                },
                OperationParam {
                    name: "geocode".to_string(),
                    location: ParamLocation::Query,
                    required: true,
                },
                OperationParam {
                    name: "x-trace".to_string(),
                    location: ParamLocation::Header,
                    required: false,
                },
                OperationParam {
                    name: "session".to_string(),
                    location: ParamLocation::Cookie,
                    required: false,
                },
            ],
            body_required: false,
        }
    }

    fn client(retries: u32, auth: AuthConfig) -> ApiClient {
        let config = HttpClientConfig {
            retries,
            ..HttpClientConfig::default()
        };
        ApiClient::new(config, auth)
            .expect("client")
            .with_backoff_unit(Duration::from_millis(5))
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn binds_path_query_header_and_bearer_auth() {
        let server = serve_router(Router::new().route("/{*path}", any(echo_handler)))
            .await
            .expect("server");

        let client = client(
            0,
            AuthConfig {
                api_key: Some("k-123".to_string()),
                default_scheme: AuthScheme::Bearer,
            },
        );
        let resp = client
            .execute(
                &forecast_operation(&server.base_url),
                &args(json!({
                    "days": 5,
                    "geocode": "33.74,-84.39",
                    "x-trace": "t1",
                    "session": "ignored"
                })),
            )
            .await
            .expect("call");

        assert_eq!(resp.status, 200);
        assert!(!resp.is_error());
        assert_eq!(
            resp.content_type().map(mime_essence).as_deref(),
            Some("application/json")
        );
        let echoed: Value = serde_json::from_str(&resp.body).expect("json body");
        assert_eq!(echoed["method"], "GET");
        assert_eq!(echoed["path"], "/v3/forecast/5");
        assert_eq!(echoed["query"], "geocode=33.74%2C-84.39");
        assert_eq!(echoed["authorization"], "Bearer k-123");
        assert_eq!(echoed["x_trace"], "t1");
        assert_eq!(echoed["accept"], "application/json, */*");
        assert_eq!(echoed["user_agent"], "swagger-docs-mcp/1.0.0");
    }

    #[tokio::test]
    async fn apikey_scheme_uses_named_header_and_body_is_json() {
        let server = serve_router(Router::new().route("/{*path}", any(echo_handler)))
            .await
            .expect("server");

        let op = HttpOperation {
            method: "post".to_string(),
            path: "/v2/observations".to_string(),
            base_url: Some(server.base_url.clone()),
            params: Vec::new(),
            body_required: true,
        };
        let client = client(
            0,
            AuthConfig {
                api_key: Some("secret".to_string()),
                default_scheme: AuthScheme::ApiKey,
            },
        );
        let resp = client
            .execute(&op, &args(json!({ "requestBody": { "temp": 21 } })))
            .await
            .expect("call");

        let echoed: Value = serde_json::from_str(&resp.body).expect("json body");
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["x_api_key"], "secret");
        assert_eq!(echoed["authorization"], Value::Null);
        assert_eq!(echoed["content_type"], "application/json");
        assert_eq!(echoed["body"], r#"{"temp":21}"#);
    }

    #[tokio::test]
    async fn missing_required_parameter_fails_before_any_request() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/{*path}",
            any(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    "ok"
                }
            }),
        );
        let server = serve_router(app).await.expect("server");

        let err = client(3, AuthConfig::default())
            .execute(
                &forecast_operation(&server.base_url),
                &args(json!({ "days": 3 })),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, HttpToolsError::Validation(_)));
        assert!(err.to_string().contains("missing required parameter: geocode"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn always_503_makes_one_plus_retries_attempts() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/{*path}",
            any(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (AxumStatus::SERVICE_UNAVAILABLE, "busy")
                }
            }),
        );
        let server = serve_router(app).await.expect("server");

        let err = client(2, AuthConfig::default())
            .execute(
                &forecast_operation(&server.base_url),
                &args(json!({ "days": 3, "geocode": "1,2" })),
            )
            .await
            .unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        match &err {
            HttpToolsError::Execution { attempts, url, .. } => {
                assert_eq!(*attempts, 3);
                assert!(url.ends_with("/v3/forecast/3"), "url: {url}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("request failed after 3 attempts"));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn invalid_header_value_fails_before_any_request() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/{*path}",
            any(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    "ok"
                }
            }),
        );
        let server = serve_router(app).await.expect("server");

        let err = client(2, AuthConfig::default())
            .execute(
                &forecast_operation(&server.base_url),
                &args(json!({ "days": 3, "geocode": "1,2", "x-trace": "a\nb" })),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, HttpToolsError::Validation(_)), "{err:?}");
        assert!(err.to_string().contains("x-trace"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/{*path}",
            any(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        (AxumStatus::TOO_MANY_REQUESTS, "slow down".to_string())
                    } else {
                        (AxumStatus::OK, "fine".to_string())
                    }
                }
            }),
        );
        let server = serve_router(app).await.expect("server");

        let resp = client(3, AuthConfig::default())
            .execute(
                &forecast_operation(&server.base_url),
                &args(json!({ "days": 3, "geocode": "1,2" })),
            )
            .await
            .expect("eventually ok");

        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "fine");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_returned_without_retry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/{*path}",
            any(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (AxumStatus::NOT_FOUND, "nope")
                }
            }),
        );
        let server = serve_router(app).await.expect("server");

        let resp = client(3, AuthConfig::default())
            .execute(
                &forecast_operation(&server.base_url),
                &args(json!({ "days": 3, "geocode": "1,2" })),
            )
            .await
            .expect("404 is a response");

        assert_eq!(resp.status, 404);
        assert!(resp.is_error());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failures_exhaust_retries() {
        let port = swagger_docs_test_support::pick_unused_port().expect("port");
        let op = forecast_operation(&format!("http://127.0.0.1:{port}"));

        let err = client(1, AuthConfig::default())
            .execute(&op, &args(json!({ "days": 1, "geocode": "1,2" })))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpToolsError::Execution { attempts: 2, .. }));
    }

    #[test]
    fn config_base_url_overrides_document_base_url() {
        let op = forecast_operation("http://doc.example.com");
        let parts = build_request_parts(&op, &args(json!({ "days": "a b/c", "geocode": "x" })))
            .expect("parts");
        assert_eq!(parts.path, "/v3/forecast/a%20b%2Fc");

        let url = build_url("https://override.example.com/", &parts.path, &parts.query)
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://override.example.com/v3/forecast/a%20b%2Fc?geocode=x"
        );
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let err = build_url("/api", "/x", &[]).unwrap_err();
        assert!(matches!(err, HttpToolsError::Validation(_)));
    }

    #[test]
    fn value_to_string_joins_arrays() {
        assert_eq!(value_to_string(&json!(["a", 1, true])), "a,1,true");
        assert_eq!(value_to_string(&json!(2.5)), "2.5");
        assert_eq!(value_to_string(&json!("s")), "s");
    }
}
