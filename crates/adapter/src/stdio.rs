//! Line-delimited JSON-RPC over stdin/stdout.
//!
//! One request per line, one response per line. Notifications get no response. Registration of
//! the catalog is triggered by the client's `initialized` notification; in async mode it runs in
//! the background and early `tools/list` calls may see a partial catalog.

use crate::catalog::{Catalog, ToolCallResult};
use crate::config::RegistrationMode;
use crate::error::{Result, ServerError};
use crate::logging::{LogHandle, mcp_level};
use rmcp::ErrorData as McpError;
use rmcp::model::{ErrorCode, ProtocolVersion};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use swagger_docs_http_tools::runtime::HttpToolsError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _, BufReader};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method<'a> {
    Initialize,
    Initialized,
    Ping,
    ListTools,
    CallTool,
    ListPrompts,
    GetPrompt,
    ListResources,
    ReadResource,
    SetLogLevel,
    Other(&'a str),
}

impl<'a> Method<'a> {
    fn parse(name: &'a str) -> Self {
        match name {
            "initialize" => Self::Initialize,
            "initialized" | "notifications/initialized" => Self::Initialized,
            "ping" => Self::Ping,
            "tools/list" => Self::ListTools,
            "tools/call" => Self::CallTool,
            "prompts/list" => Self::ListPrompts,
            "prompts/get" => Self::GetPrompt,
            "resources/list" => Self::ListResources,
            "resources/read" => Self::ReadResource,
            "logging/setLevel" => Self::SetLogLevel,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct GetPromptParams {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ReadResourceParams {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct SetLevelParams {
    level: String,
}

pub struct StdioServer {
    catalog: Arc<Catalog>,
    registration: RegistrationMode,
    log_handle: Option<LogHandle>,
    initialized: AtomicBool,
}

impl StdioServer {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, registration: RegistrationMode) -> Self {
        Self {
            catalog,
            registration,
            log_handle: None,
            initialized: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_log_handle(mut self, handle: Option<LogHandle>) -> Self {
        self.log_handle = handle;
        self
    }

    /// Whether the client has sent `initialized`.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Answer requests from `reader` until it is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `Io` if reading or writing fails.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let mut payload = serde_json::to_vec(&response)?;
            payload.push(b'\n');
            writer.write_all(&payload).await?;
            writer.flush().await?;
        }
        debug!("input closed");
        Ok(())
    }

    /// Process one raw message; `None` when no response is due.
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "failed to parse JSON-RPC message");
                return Some(failure(
                    salvage_id(line).unwrap_or(Value::Null),
                    McpError::parse_error("Parse error", None),
                ));
            }
        };

        let id = message.get("id").filter(|id| !id.is_null()).cloned();
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            return Some(failure(
                id.unwrap_or(Value::Null),
                McpError::invalid_request("Invalid Request", None),
            ));
        };
        let method = Method::parse(method);
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let Some(id) = id else {
            self.handle_notification(method).await;
            return None;
        };

        debug!(method = ?method, "handling request");
        let outcome = match method {
            Method::Initialize => Ok(self.initialize_result()),
            Method::Initialized => {
                self.on_initialized().await;
                Ok(json!({}))
            }
            Method::Ping => Ok(json!({})),
            Method::ListTools => Ok(self.list_tools()),
            Method::CallTool => self.call_tool(params).await,
            Method::ListPrompts => Ok(self.list_prompts()),
            Method::GetPrompt => self.get_prompt(params),
            Method::ListResources => Ok(self.list_resources()),
            Method::ReadResource => self.read_resource(params),
            Method::SetLogLevel => self.set_log_level(params),
            Method::Other(name) => {
                debug!(method = %name, "unknown method");
                Err(McpError::new(ErrorCode::METHOD_NOT_FOUND, "Method not found", None))
            }
        };

        Some(match outcome {
            Ok(result) => success(id, result),
            Err(error) => failure(id, error),
        })
    }

    async fn handle_notification(&self, method: Method<'_>) {
        match method {
            Method::Initialized => self.on_initialized().await,
            other => debug!(method = ?other, "ignoring notification"),
        }
    }

    async fn on_initialized(&self) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.registration {
            RegistrationMode::Sync => {
                self.catalog.initialize().await;
            }
            RegistrationMode::Async => {
                self.catalog.spawn_initialization();
            }
        }
    }

    fn initialize_result(&self) -> Value {
        let config = self.catalog.config();
        let mut capabilities = json!({
            "tools": { "listChanged": true },
            "logging": {},
        });
        if config.prompts.enabled {
            capabilities["prompts"] = json!({ "listChanged": true });
        }
        if config.resources.enabled {
            capabilities["resources"] = json!({ "subscribe": false, "listChanged": true });
        }
        json!({
            "protocolVersion": ProtocolVersion::V_2024_11_05,
            "capabilities": capabilities,
            "serverInfo": { "name": config.name, "version": config.version },
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .catalog
            .tools()
            .get_all()
            .iter()
            .map(|t| t.to_json())
            .collect();
        debug!(count = tools.len(), "returning tools");
        json!({ "tools": tools })
    }

    async fn call_tool(&self, params: Value) -> std::result::Result<Value, McpError> {
        let params: CallToolParams = parse_params(params)?;
        let arguments = params.arguments.unwrap_or_default();
        match self.catalog.call_tool(&params.name, &arguments, None).await {
            Ok(result) => to_value(&result),
            Err(ServerError::ToolNotFound(name)) => Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Tool not found: {name}"),
                None,
            )),
            Err(ServerError::Http(HttpToolsError::Validation(message))) => {
                Err(McpError::invalid_params(message, None))
            }
            Err(e) => {
                error!(tool = %params.name, error = %e, "tool execution failed");
                to_value(&ToolCallResult::execution_error(&e))
            }
        }
    }

    fn list_prompts(&self) -> Value {
        let prompts: Vec<Value> = self
            .catalog
            .prompts()
            .get_all()
            .iter()
            .map(|p| p.to_json())
            .collect();
        json!({ "prompts": prompts })
    }

    fn get_prompt(&self, params: Value) -> std::result::Result<Value, McpError> {
        let params: GetPromptParams = parse_params(params)?;
        let prompt = self.catalog.prompts().get(&params.name).ok_or_else(|| {
            McpError::invalid_params(format!("Prompt not found: {}", params.name), None)
        })?;
        prompt
            .to_messages(&params.arguments.unwrap_or_default())
            .map_err(|e| McpError::invalid_params(e.to_string(), None))
    }

    fn list_resources(&self) -> Value {
        let resources: Vec<Value> = self
            .catalog
            .resources()
            .get_all()
            .iter()
            .map(|r| r.to_json())
            .collect();
        json!({ "resources": resources })
    }

    fn read_resource(&self, params: Value) -> std::result::Result<Value, McpError> {
        let params: ReadResourceParams = parse_params(params)?;
        self.catalog
            .resources()
            .get_by_uri(&params.uri)
            .map(|r| r.read_json())
            .ok_or_else(|| McpError::invalid_params(format!("Resource not found: {}", params.uri), None))
    }

    fn set_log_level(&self, params: Value) -> std::result::Result<Value, McpError> {
        let params: SetLevelParams = parse_params(params)?;
        let directive = mcp_level(&params.level).ok_or_else(|| {
            McpError::invalid_params(format!("unknown log level: {}", params.level), None)
        })?;
        if let Some(handle) = &self.log_handle {
            handle
                .set_level(directive)
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        }
        info!(level = %params.level, "log level changed");
        Ok(json!({}))
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> std::result::Result<T, McpError> {
    serde_json::from_value(params)
        .map_err(|e| McpError::invalid_params(format!("Invalid params: {e}"), None))
}

fn to_value<T: serde::Serialize>(value: &T) -> std::result::Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::internal_error(e.to_string(), None))
}

/// Best-effort `id` recovery from a line that is not valid JSON, e.g. a truncated request.
fn salvage_id(line: &str) -> Option<Value> {
    let (_, rest) = line.split_once(r#""id""#)?;
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();
    let id = serde_json::Deserializer::from_str(rest)
        .into_iter::<Value>()
        .next()?
        .ok()?;
    (id.is_number() || id.is_string()).then_some(id)
}

fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn failure(id: Value, error: McpError) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

/// Serve stdin/stdout until input closes or a shutdown signal arrives.
///
/// # Errors
///
/// Returns `Io` if stdin or stdout fail.
pub async fn run(
    catalog: Arc<Catalog>,
    registration: RegistrationMode,
    log_handle: Option<LogHandle>,
) -> Result<()> {
    info!(registration = ?registration, "starting stdio server");
    let server = StdioServer::new(catalog, registration).with_log_handle(log_handle);
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = server.serve(stdin, stdout) => result,
        () = crate::shutdown_signal() => Ok(()),
    }
}
