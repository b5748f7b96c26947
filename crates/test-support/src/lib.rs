use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};
use axum::routing::any;
use serde_json::{Value, json};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
    }
}

/// Pick an unused TCP port on localhost.
///
/// Note: this does not reserve the port; it's still possible for another process to bind it
/// before you do.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails or if the bound socket's
/// local address cannot be read.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// Poll an HTTP URL until it returns a success status (2xx/3xx).
///
/// # Errors
///
/// Returns an error if the timeout elapses before the endpoint returns a success status.
pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout_dur {
            anyhow::bail!("timed out waiting for {url}");
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}

/// An axum app served on an ephemeral localhost port; shut down on drop.
pub struct TestServer {
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Serve `app` on `127.0.0.1:0`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn serve_router(app: Router) -> anyhow::Result<TestServer> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind test server")?;
    let addr = listener.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    Ok(TestServer {
        base_url: format!("http://{addr}"),
        shutdown: Some(shutdown_tx),
    })
}

/// Write `contents` to `dir/relative`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file or its parents cannot be created.
pub fn write_file(dir: &Path, relative: &str, contents: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// A small OpenAPI 3 document pointing at `base_url`.
///
/// Operations: `GET /v3/wx/forecast/daily/{days}` (path + required query `geocode`, header
/// `x-trace`), `GET /v1/alerts` (deprecated), `POST /v2/observations` (required JSON body).
#[must_use]
pub fn weather_spec_json(base_url: &str) -> String {
    serde_json::json!({
        "openapi": "3.0.1",
        "info": { "title": "Weather Data", "version": "3.0" },
        "servers": [{ "url": base_url }],
        "x-package-ids": ["pkg-weather", ""],
        "x-twc-domain": "forecast",
        "x-twc-geography": ["us", "eu"],
        "paths": {
            "/v3/wx/forecast/daily/{days}": {
                "parameters": [
                    { "name": "x-trace", "in": "header", "schema": { "type": "string" } }
                ],
                "get": {
                    "operationId": "getDailyForecast",
                    "summary": "Daily forecast",
                    "tags": ["forecast"],
                    "parameters": [
                        { "name": "days", "in": "path", "required": true,
                          "schema": { "type": "integer", "enum": [3, 5, 7] } },
                        { "name": "geocode", "in": "query", "required": true,
                          "description": "lat,lon", "schema": { "type": "string" },
                          "example": "33.74,-84.39" }
                    ],
                    "responses": { "200": { "description": "ok" } }
                }
            },
            "/v1/alerts": {
                "get": {
                    "operationId": "getAlerts",
                    "deprecated": true,
                    "responses": { "200": { "description": "ok" } }
                }
            },
            "/v2/observations": {
                "post": {
                    "summary": "Submit observations",
                    "requestBody": {
                        "required": true,
                        "content": { "application/json": { "schema": { "type": "object" } } }
                    },
                    "responses": { "201": { "description": "created" } }
                }
            }
        }
    })
    .to_string()
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> axum::Json<Value> {
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
        "content_type": header("content-type"),
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Answers every request with a JSON description of what it received.
pub fn echo_router() -> Router {
    Router::new().route("/{*path}", any(echo))
}
