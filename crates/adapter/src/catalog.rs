//! The process-wide catalog: registries, the outbound client and the one-time
//! scan-and-register pass that fills them.

use crate::config::AppConfig;
use crate::error::{Result, ServerError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use swagger_docs_http_tools::runtime::{ApiClient, ApiResponse};
use swagger_docs_openapi_tools::filter::{filter_by_package_ids, filter_by_twc};
use swagger_docs_openapi_tools::generator::ToolGenerator;
use swagger_docs_openapi_tools::parser::{extract_endpoints, load_document};
use swagger_docs_openapi_tools::prompts::PromptGenerator;
use swagger_docs_openapi_tools::registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
use swagger_docs_openapi_tools::resources::ResourceGenerator;
use swagger_docs_openapi_tools::scanner::DocumentScanner;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One `content` item of a tool result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Tool result shared by both transports.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl ToolCallResult {
    /// Body as text; flagged as an error for HTTP status >= 400.
    #[must_use]
    pub fn from_response(response: &ApiResponse) -> Self {
        Self {
            content: vec![ToolContent {
                kind: "text".to_string(),
                text: response.body.clone(),
                mime_type: response
                    .content_type()
                    .filter(|ct| !ct.is_empty())
                    .map(str::to_string),
            }],
            is_error: response.is_error(),
        }
    }

    /// Error-flagged result for a call that never produced a response.
    #[must_use]
    pub fn execution_error(message: impl std::fmt::Display) -> Self {
        Self {
            content: vec![ToolContent {
                kind: "text".to_string(),
                text: format!("Error executing tool: {message}"),
                mime_type: None,
            }],
            is_error: true,
        }
    }
}

/// Counts from one initialization pass.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InitReport {
    pub documents_discovered: usize,
    pub discovery_errors: usize,
    pub documents_selected: usize,
    pub documents_failed: usize,
    pub tools_registered: usize,
    pub tool_conflicts: usize,
    pub prompts_registered: usize,
    pub resources_registered: usize,
    pub tool_limit_reached: bool,
}

pub struct Catalog {
    config: Arc<AppConfig>,
    tools: ToolRegistry,
    prompts: PromptRegistry,
    resources: ResourceRegistry,
    client: ApiClient,
    started: AtomicBool,
    registered: AtomicUsize,
    ready: watch::Sender<bool>,
}

impl Catalog {
    /// # Errors
    ///
    /// Returns `Http` if the outbound client cannot be built.
    pub fn new(config: AppConfig) -> Result<Self> {
        let client = ApiClient::new(config.http.clone(), config.auth.clone())?;
        Ok(Self::with_client(config, client))
    }

    #[must_use]
    pub fn with_client(config: AppConfig, client: ApiClient) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            tools: ToolRegistry::new(),
            prompts: PromptRegistry::new(),
            resources: ResourceRegistry::new(),
            client,
            started: AtomicBool::new(false),
            registered: AtomicUsize::new(0),
            ready,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    #[must_use]
    pub fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Whether the initialization pass has finished.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Tools registered so far; grows while the pass runs.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.registered.load(Ordering::Acquire)
    }

    /// Wait for the initialization pass to finish. Returns `false` on timeout.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.ready.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|ready| *ready))
            .await
            .is_ok_and(|r| r.is_ok())
    }

    /// Run the initialization pass in the background.
    pub fn spawn_initialization(self: &Arc<Self>) -> JoinHandle<Option<InitReport>> {
        let catalog = Arc::clone(self);
        tokio::spawn(async move { catalog.initialize().await })
    }

    /// Scan, filter, parse, generate and register. Runs once; later calls return `None`
    /// immediately.
    ///
    /// Every per-document failure is logged and skipped. The catalog is marked ready when the
    /// pass ends, whatever it found.
    pub async fn initialize(&self) -> Option<InitReport> {
        if self.started.swap(true, Ordering::AcqRel) {
            return None;
        }
        let report = self.run_initialization().await;
        self.ready.send_replace(true);
        info!(
            tools = report.tools_registered,
            conflicts = report.tool_conflicts,
            prompts = report.prompts_registered,
            resources = report.resources_registered,
            failed_documents = report.documents_failed,
            "catalog initialization complete"
        );
        Some(report)
    }

    async fn run_initialization(&self) -> InitReport {
        let config = &self.config;
        let mut report = InitReport::default();

        let scanner = match DocumentScanner::new(config.scan.clone()) {
            Ok(scanner) => scanner,
            Err(e) => {
                error!(error = %e, "failed to build document scanner");
                return report;
            }
        };
        let scan = scanner.scan(&config.swagger_paths, &config.swagger_urls).await;
        for e in &scan.errors {
            warn!(error = %e, "discovery error");
        }
        report.documents_discovered = scan.documents.len();
        report.discovery_errors = scan.errors.len();

        let documents = filter_by_package_ids(scan.documents, &config.package_ids);
        let documents = filter_by_twc(documents, &config.twc_filters);
        report.documents_selected = documents.len();
        debug!(
            discovered = report.documents_discovered,
            selected = report.documents_selected,
            "applied document filters"
        );

        let tool_generator = ToolGenerator::new(config.tool_generation.clone());
        let prompt_generator = PromptGenerator::new(
            config.prompts.clone(),
            config.tool_generation.max_description_length,
        );
        let resource_generator = ResourceGenerator::new(config.resources.clone());
        let max_tools = config.server.max_tools;

        'documents: for document in documents {
            let info = Arc::new(document);
            let parsed = match load_document(&info).await {
                Ok(parsed) => parsed,
                Err(e) => {
                    error!(location = %info.location, title = %info.title, error = %e, "failed to parse document");
                    report.documents_failed += 1;
                    continue;
                }
            };

            let endpoints = extract_endpoints(&parsed);

            for prompt in prompt_generator.generate(&endpoints, &info) {
                match self.prompts.register(prompt) {
                    Ok(()) => report.prompts_registered += 1,
                    Err(e) => debug!(error = %e, "prompt not registered"),
                }
            }
            for resource in resource_generator.generate(&parsed, &endpoints, &info) {
                match self.resources.register(resource) {
                    Ok(()) => report.resources_registered += 1,
                    Err(e) => debug!(error = %e, "resource not registered"),
                }
            }

            for tool in tool_generator.generate(&parsed, &info) {
                if report.tools_registered >= max_tools {
                    warn!(max_tools, "reached maximum tool limit, stopping tool generation");
                    report.tool_limit_reached = true;
                    break 'documents;
                }
                let name = tool.name.clone();
                match self.tools.register(tool) {
                    Ok(tool) => {
                        report.tools_registered += 1;
                        self.registered.fetch_add(1, Ordering::AcqRel);
                        debug!(tool = %name, method = %tool.endpoint.method, path = %tool.endpoint.path, "registered tool");
                    }
                    Err(e) => {
                        report.tool_conflicts += 1;
                        warn!(tool = %name, error = %e, "tool registration conflict");
                    }
                }
            }
        }

        report
    }

    /// Execute a registered tool. `api_key` replaces the configured key for this call only.
    ///
    /// # Errors
    ///
    /// Returns `ToolNotFound` for an unknown name and `Http` when the call could not be made or
    /// every attempt failed.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        api_key: Option<&str>,
    ) -> Result<ToolCallResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ServerError::ToolNotFound(name.to_string()))?;
        let operation = tool.operation();

        debug!(tool = %name, method = %operation.method, path = %operation.path, "executing tool");
        let response = match api_key {
            Some(key) => {
                let auth = self.client.auth().with_api_key(key);
                self.client
                    .execute_with_auth(&operation, arguments, &auth)
                    .await?
            }
            None => self.client.execute(&operation, arguments).await?,
        };
        Ok(ToolCallResult::from_response(&response))
    }
}
