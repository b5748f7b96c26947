//! HTTP surface: catalog, execution, health and the `/events` push stream.

use crate::catalog::Catalog;
use crate::config::RegistrationMode;
use crate::error::{Result, ServerError};
use crate::events::{ClientHub, EventKind, HEARTBEAT_INTERVAL, IDLE_TIMEOUT, SWEEP_INTERVAL, ServerEvent};
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Path, Query},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::Utc;
use futures::{Stream, StreamExt as _};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use swagger_docs_openapi_tools::config::TwcFilters;
use swagger_docs_openapi_tools::filter::{ToolFilter, split_list};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub hub: Arc<ClientHub>,
}

impl AppState {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            hub: Arc::new(ClientHub::new()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready))
        .route("/readyz", get(ready))
        .route("/events", get(events))
        .route("/tools", get(list_tools))
        .route("/tools/{name}/execute", post(execute_tool))
        .route("/prompts", get(list_prompts))
        .route("/prompts/{name}", get(get_prompt).post(render_prompt))
        .route("/resources", get(list_resources))
        .route("/resources/read", post(read_resource))
        .route("/config", get(config_snapshot))
        .route("/version", get(version))
        .route("/", get(server_info))
        .route("/mcp", get(server_info))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "error": message.into(), "code": status.as_u16() })),
    )
        .into_response()
}

fn tool_list(catalog: &Catalog) -> Vec<Value> {
    catalog.tools().get_all().iter().map(|t| t.to_json()).collect()
}

async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "version": state.catalog.config().version,
        "tools": state.catalog.tools().count(),
        "clients": state.hub.client_count(),
    }))
}

async fn ready(Extension(state): Extension<Arc<AppState>>) -> Response {
    let tools = state.catalog.registered_count();
    if state.catalog.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready", "tools": tools }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing", "tools": tools })),
        )
            .into_response()
    }
}

fn to_sse(event: &ServerEvent) -> std::result::Result<Event, axum::Error> {
    Event::default()
        .id(&event.id)
        .event(event.kind.as_str())
        .json_data(&event.data)
}

async fn events(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let conn = state.hub.connect();
    let config = state.catalog.config();

    state.hub.send_to(
        conn.id(),
        ServerEvent::new(
            EventKind::Connected,
            json!({
                "clientId": conn.id(),
                "serverInfo": { "name": config.name, "version": config.version },
            }),
        ),
    );
    state.hub.send_to(
        conn.id(),
        ServerEvent::new(EventKind::Tools, json!({ "tools": tool_list(&state.catalog) })),
    );

    let stream = conn
        .into_stream(HEARTBEAT_INTERVAL)
        .map(|event| to_sse(&event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Default, Deserialize)]
struct ToolQuery {
    #[serde(rename = "package-ids")]
    package_ids: Option<String>,
    #[serde(rename = "twc-portfolios")]
    twc_portfolios: Option<String>,
    #[serde(rename = "twc-domains")]
    twc_domains: Option<String>,
    #[serde(rename = "twc-usages")]
    twc_usages: Option<String>,
    #[serde(rename = "twc-geographies")]
    twc_geographies: Option<String>,
    #[serde(rename = "filter-custom")]
    custom: Option<String>,
}

impl ToolQuery {
    fn filter(&self) -> ToolFilter {
        ToolFilter {
            package_ids: split_list(self.package_ids.as_deref()),
            twc: TwcFilters {
                portfolios: split_list(self.twc_portfolios.as_deref()),
                domains: split_list(self.twc_domains.as_deref()),
                usage_classifications: split_list(self.twc_usages.as_deref()),
                geographies: split_list(self.twc_geographies.as_deref()),
            },
            custom: split_list(self.custom.as_deref()),
        }
    }
}

async fn list_tools(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ToolQuery>,
) -> Json<Value> {
    let filter = query.filter();
    let all = state.catalog.tools().get_all();
    let tools: Vec<Value> = if filter.is_empty() {
        all.iter().map(|t| t.to_json()).collect()
    } else {
        let kept: Vec<Value> = all
            .iter()
            .filter(|t| filter.matches(t))
            .map(|t| t.to_json())
            .collect();
        debug!(original = all.len(), filtered = kept.len(), "applied request filters");
        kept
    };
    Json(json!({ "count": tools.len(), "tools": tools }))
}

#[derive(Debug, Deserialize)]
struct ArgumentsBody {
    #[serde(default)]
    arguments: Map<String, Value>,
}

/// A non-empty string `apiKey` argument is a per-call credential, not an API parameter.
fn take_api_key(arguments: &mut Map<String, Value>) -> Option<String> {
    match arguments.get("apiKey") {
        Some(Value::String(key)) if !key.is_empty() => {}
        _ => return None,
    }
    match arguments.remove("apiKey") {
        Some(Value::String(key)) => Some(key),
        _ => None,
    }
}

async fn execute_tool(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    if !state.catalog.tools().has(&name) {
        return error_response(StatusCode::NOT_FOUND, "Tool not found");
    }
    let mut arguments = match serde_json::from_slice::<ArgumentsBody>(&body) {
        Ok(body) => body.arguments,
        Err(e) => {
            warn!(tool = %name, error = %e, "failed to decode request body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };
    let api_key = take_api_key(&mut arguments);
    if api_key.is_some() {
        debug!(tool = %name, "using API key from request arguments");
    }

    let timeout = state.catalog.config().server_timeout();
    let call = state.catalog.call_tool(&name, &arguments, api_key.as_deref());
    let result = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(ServerError::ToolNotFound(_))) => {
            return error_response(StatusCode::NOT_FOUND, "Tool not found");
        }
        Ok(Err(e)) => {
            error!(tool = %name, error = %e, "tool execution failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error executing tool: {e}"),
            );
        }
        Err(_) => {
            error!(tool = %name, timeout_secs = timeout.as_secs(), "tool execution timed out");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error executing tool: timed out after {}s", timeout.as_secs()),
            );
        }
    };

    state.hub.broadcast(&ServerEvent::new(
        EventKind::ToolExecution,
        json!({
            "toolName": name,
            "arguments": arguments,
            "result": result,
            "executedAt": Utc::now(),
        }),
    ));
    (StatusCode::OK, Json(result)).into_response()
}

async fn list_prompts(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let prompts: Vec<Value> = state
        .catalog
        .prompts()
        .get_all()
        .iter()
        .map(|p| p.to_json())
        .collect();
    Json(json!({ "count": prompts.len(), "prompts": prompts }))
}

async fn get_prompt(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.catalog.prompts().get(&name) {
        Some(prompt) => Json(prompt.to_detail_json()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Prompt not found"),
    }
}

async fn render_prompt(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let Some(prompt) = state.catalog.prompts().get(&name) else {
        return error_response(StatusCode::NOT_FOUND, "Prompt not found");
    };
    let arguments = if body.is_empty() {
        Map::new()
    } else {
        match serde_json::from_slice::<ArgumentsBody>(&body) {
            Ok(body) => body.arguments,
            Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid request body"),
        }
    };
    match prompt.to_messages(&arguments) {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn list_resources(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let resources: Vec<Value> = state
        .catalog
        .resources()
        .get_all()
        .iter()
        .map(|r| r.to_json())
        .collect();
    Json(json!({ "count": resources.len(), "resources": resources }))
}

#[derive(Debug, Deserialize)]
struct ReadResourceBody {
    uri: String,
}

async fn read_resource(Extension(state): Extension<Arc<AppState>>, body: Bytes) -> Response {
    let Ok(request) = serde_json::from_slice::<ReadResourceBody>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
    };
    match state.catalog.resources().get_by_uri(&request.uri) {
        Some(resource) => Json(resource.read_json()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Resource not found"),
    }
}

/// Resolved configuration without credentials.
async fn config_snapshot(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let config = state.catalog.config();
    Json(json!({
        "name": config.name,
        "version": config.version,
        "debug": config.debug,
        "toolCount": state.catalog.tools().count(),
        "clientCount": state.hub.client_count(),
        "swaggerPaths": config.swagger_paths,
        "swaggerUrls": config.swagger_urls,
        "server": {
            "port": config.server.port,
            "timeout": format!("{}s", config.server.timeout_secs),
            "maxTools": config.server.max_tools,
        },
        "http": {
            "timeout": format!("{}s", config.http.timeout_secs),
            "retries": config.http.retries,
            "userAgent": config.http.user_agent,
        },
    }))
}

async fn version(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let config = state.catalog.config();
    Json(json!({ "name": config.name, "version": config.version }))
}

async fn server_info(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let config = state.catalog.config();
    Json(json!({
        "name": config.name,
        "version": config.version,
        "transport": "sse",
        "tools": state.catalog.tools().count(),
        "endpoints": {
            "health": "/health",
            "ready": "/ready",
            "events": "/events",
            "tools": "/tools",
            "execute": "/tools/{name}/execute",
            "prompts": "/prompts",
            "resources": "/resources",
            "readResource": "/resources/read",
            "config": "/config",
            "version": "/version",
        },
    }))
}

/// Serve on `listener` until `shutdown` fires. Event streams are closed first so graceful
/// shutdown does not wait on them.
///
/// # Errors
///
/// Returns `Io` if the server fails.
pub async fn serve(
    state: Arc<AppState>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    let sweeper = state.hub.spawn_sweeper(SWEEP_INTERVAL, IDLE_TIMEOUT);
    let hub = Arc::clone(&state.hub);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            hub.shutdown();
        })
        .await?;
    join_sweeper(sweeper).await;
    info!("SSE server stopped");
    Ok(())
}

async fn join_sweeper(sweeper: JoinHandle<()>) {
    if let Err(e) = sweeper.await {
        warn!(error = %e, "idle-client sweeper ended abnormally");
    }
}

/// Bind `server.host:server.port`, register the catalog and serve until Ctrl-C or SIGTERM.
///
/// With sync registration nothing is accepted until registration finishes; connections made
/// meanwhile wait in the listen backlog. Only async registration exposes `/ready` as 503.
///
/// # Errors
///
/// Returns `Startup` if the address cannot be bound.
pub async fn run(catalog: Arc<Catalog>, registration: RegistrationMode) -> Result<()> {
    let addr = {
        let server = &catalog.config().server;
        format!("{}:{}", server.host, server.port)
    };
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Startup(format!("failed to bind {addr}: {e}")))?;
    info!(address = %addr, registration = ?registration, "SSE server listening");

    match registration {
        RegistrationMode::Sync => {
            catalog.initialize().await;
        }
        RegistrationMode::Async => {
            catalog.spawn_initialization();
        }
    }

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        crate::shutdown_signal().await;
        trigger.cancel();
    });

    serve(Arc::new(AppState::new(catalog)), listener, shutdown).await
}
