//! Resolved server configuration.
//!
//! Precedence, lowest first: built-in defaults, the config file (explicit `--config`, else the
//! first well-known file name found in the working directory), then CLI flags and their
//! `WX_MCP_*` environment variables.

use crate::error::{Result, ServerError};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use swagger_docs_http_tools::config::{AuthConfig, AuthScheme, HttpClientConfig};
use swagger_docs_http_tools::safety::parse_http_url;
use swagger_docs_openapi_tools::config::{
    PromptsConfig, ResourcesConfig, ScanOptions, ToolGenerationConfig, TwcFilters,
};

/// Searched in order when no `--config` is given.
pub const CONFIG_FILE_NAMES: [&str; 6] = [
    "swagger-mcp.config.json",
    "swagger-mcp.config.yaml",
    "swagger-mcp.config.yml",
    ".swagger-mcp.json",
    ".swagger-mcp.yaml",
    ".swagger-mcp.yml",
];

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Line-delimited JSON-RPC over stdin/stdout.
    #[default]
    Stdio,
    /// HTTP catalog plus server-sent events.
    Sse,
}

/// When the scan-and-register pass runs relative to serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationMode {
    /// Finish registration before the next request is handled.
    Sync,
    /// Register in the background; early requests may see a partial catalog.
    Async,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
    pub max_tools: usize,
    /// Unset: `async` for stdio, `sync` for SSE.
    pub registration: Option<RegistrationMode>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            timeout_secs: 30,
            max_tools: 1000,
            registration: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub swagger_paths: Vec<String>,
    pub swagger_urls: Vec<String>,
    pub package_ids: Vec<String>,
    pub twc_filters: TwcFilters,
    pub server: ServerSettings,
    pub http: HttpClientConfig,
    pub auth: AuthConfig,
    pub debug: bool,
    pub logging: LoggingSettings,
    pub scan: ScanOptions,
    pub tool_generation: ToolGenerationConfig,
    pub prompts: PromptsConfig,
    pub resources: ResourcesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            swagger_paths: Vec::new(),
            swagger_urls: Vec::new(),
            package_ids: Vec::new(),
            twc_filters: TwcFilters::default(),
            server: ServerSettings::default(),
            http: HttpClientConfig::default(),
            auth: AuthConfig::default(),
            debug: false,
            logging: LoggingSettings::default(),
            scan: ScanOptions::default(),
            tool_generation: ToolGenerationConfig::default(),
            prompts: PromptsConfig::default(),
            resources: ResourcesConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolve defaults, config file and CLI/env overrides, then validate.
    ///
    /// # Errors
    ///
    /// Returns `Config` if an explicit config file is missing or unreadable, if a file fails to
    /// parse, or if the merged result fails [`AppConfig::validate`].
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let mut config = match find_config_file(cli.config.as_deref(), &cwd)? {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        cli.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file. `.json` goes through `serde_json`, anything else through
    /// `serde_yaml` (which also accepts JSON).
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the file when it cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&text).map_err(|e| e.to_string())
        };
        parsed.map_err(|e| {
            ServerError::Config(format!("failed to parse config file {}: {e}", path.display()))
        })
    }

    /// Check the merged configuration, reporting every problem at once.
    ///
    /// # Errors
    ///
    /// Returns `Config` listing each failed check, separated by `; `.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("name must be a non-empty string".to_string());
        }
        if self.version.trim().is_empty() {
            problems.push("version must be a non-empty string".to_string());
        }
        if self.swagger_paths.is_empty() && self.swagger_urls.is_empty() {
            problems.push(
                "at least one of swaggerPaths or swaggerUrls must be provided".to_string(),
            );
        }
        if let Some(bad) = self
            .swagger_urls
            .iter()
            .find(|u| parse_http_url(u).is_err())
        {
            problems.push(format!("invalid URL in swaggerUrls: {bad}"));
        }
        if let Some(base) = &self.http.base_url
            && parse_http_url(base).is_err()
        {
            problems.push(format!("invalid http.baseUrl: {base}"));
        }
        if self.server.timeout_secs == 0 {
            problems.push("server.timeoutSecs must be positive".to_string());
        }
        if self.server.max_tools == 0 {
            problems.push("server.maxTools must be positive".to_string());
        }
        if self.http.timeout_secs == 0 {
            problems.push("http.timeoutSecs must be positive".to_string());
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            problems.push(format!(
                "logging.level must be one of: {}",
                LOG_LEVELS.join(", ")
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ServerError::Config(format!(
                "configuration validation failed: {}",
                problems.join("; ")
            )))
        }
    }

    #[must_use]
    pub fn registration_mode(&self, mode: Mode) -> RegistrationMode {
        self.server.registration.unwrap_or(match mode {
            Mode::Stdio => RegistrationMode::Async,
            Mode::Sse => RegistrationMode::Sync,
        })
    }

    #[must_use]
    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    /// Effective tracing level: `debug` overrides the configured level.
    #[must_use]
    pub fn log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.logging.level
        }
    }
}

/// The explicit path when given (it must exist), else the first well-known file in `dir`.
///
/// # Errors
///
/// Returns `Config` when an explicit path does not exist.
pub fn find_config_file(explicit: Option<&Path>, dir: &Path) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ServerError::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    }
    Ok(CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file()))
}

fn parse_auth_scheme(raw: &str) -> std::result::Result<AuthScheme, String> {
    match raw.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
        "bearer" => Ok(AuthScheme::Bearer),
        "apikey" => Ok(AuthScheme::ApiKey),
        other => Err(format!("unknown auth scheme '{other}' (expected bearer or apikey)")),
    }
}

/// Expose Swagger/OpenAPI documents as MCP tools over stdio or SSE/HTTP.
#[derive(Parser, Debug, Default)]
#[command(name = "swagger-docs-mcp", version, about, long_about = None)]
pub struct Cli {
    /// Config file (JSON or YAML)
    #[arg(short, long, env = "WX_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Transport to serve
    #[arg(long, value_enum, env = "WX_MCP_MODE", default_value_t = Mode::Stdio)]
    pub mode: Mode,

    /// Bind address for SSE mode
    #[arg(long, env = "WX_MCP_HOST")]
    pub host: Option<String>,

    /// Port for SSE mode
    #[arg(short, long, env = "WX_MCP_PORT")]
    pub port: Option<u16>,

    /// Swagger document path or directory (repeatable)
    #[arg(short = 's', long = "swagger-path")]
    pub swagger_path: Vec<String>,

    /// Comma-separated swagger document paths
    #[arg(long = "swagger-paths", env = "WX_MCP_PATHS", value_delimiter = ',')]
    pub swagger_paths: Vec<String>,

    /// Swagger document URL (repeatable)
    #[arg(short = 'u', long = "swagger-url")]
    pub swagger_url: Vec<String>,

    /// Comma-separated swagger document URLs
    #[arg(long = "swagger-urls", env = "WX_MCP_URLS", value_delimiter = ',')]
    pub swagger_urls: Vec<String>,

    /// Keep only documents with one of these package ids
    #[arg(short = 'P', long = "package-ids", env = "WX_MCP_PACKAGE_ID", value_delimiter = ',')]
    pub package_ids: Vec<String>,

    #[arg(short = 'T', long = "twc-portfolios", env = "WX_MCP_TWC_PORTFOLIO", value_delimiter = ',')]
    pub twc_portfolios: Vec<String>,

    #[arg(short = 'D', long = "twc-domains", env = "WX_MCP_TWC_DOMAIN", value_delimiter = ',')]
    pub twc_domains: Vec<String>,

    #[arg(short = 'U', long = "twc-usages", env = "WX_MCP_TWC_USAGE", value_delimiter = ',')]
    pub twc_usages: Vec<String>,

    #[arg(short = 'G', long = "twc-geographies", env = "WX_MCP_TWC_GEOGRAPHY", value_delimiter = ',')]
    pub twc_geographies: Vec<String>,

    /// API key attached to outbound calls
    #[arg(short = 'k', long, env = "WX_MCP_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// How the API key is sent: bearer or apikey
    #[arg(long, env = "WX_MCP_AUTH_SCHEME", value_parser = parse_auth_scheme)]
    pub auth_scheme: Option<AuthScheme>,

    /// Base URL for outbound calls, overriding each document's servers
    #[arg(long, env = "WX_MCP_BASE_URL")]
    pub base_url: Option<String>,

    /// Enable debug logging
    #[arg(short = 'v', long, env = "WX_MCP_DEBUG")]
    pub debug: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, env = "WX_MCP_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, value_enum, env = "WX_MCP_LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Server timeout in seconds
    #[arg(short = 't', long, env = "WX_MCP_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Outbound request timeout in seconds
    #[arg(long, env = "WX_MCP_HTTP_TIMEOUT")]
    pub http_timeout: Option<u64>,

    /// Outbound retries after the first attempt
    #[arg(short = 'r', long, env = "WX_MCP_RETRIES")]
    pub retries: Option<u32>,

    #[arg(short = 'a', long, env = "WX_MCP_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Maximum number of tools to register
    #[arg(short = 'm', long, env = "WX_MCP_MAX_TOOLS")]
    pub max_tools: Option<usize>,

    /// Preferred format when an endpoint exists in several (e.g. json)
    #[arg(long, env = "WX_MCP_PREFER_FORMAT")]
    pub prefer_format: Option<String>,

    /// Comma-separated formats to drop (e.g. xml,yaml)
    #[arg(long, env = "WX_MCP_IGNORE_FORMATS", value_delimiter = ',')]
    pub ignore_formats: Vec<String>,

    /// Generate tools for deprecated endpoints too
    #[arg(long, env = "WX_MCP_INCLUDE_DEPRECATED")]
    pub include_deprecated: bool,

    /// Run registration before (sync) or alongside (async) serving
    #[arg(long, value_enum, env = "WX_MCP_REGISTRATION")]
    pub registration: Option<RegistrationMode>,
}

fn non_blank(values: impl IntoIterator<Item = String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn replace_if_any(target: &mut Vec<String>, values: &[String]) {
    let values = non_blank(values.iter().cloned());
    if !values.is_empty() {
        *target = values;
    }
}

impl Cli {
    /// Overlay flags and environment values onto `config`. List flags replace rather than
    /// extend the file's lists.
    ///
    /// # Errors
    ///
    /// Returns `Config` for values that parse but are meaningless (an unknown log level).
    pub fn apply(&self, config: &mut AppConfig) -> Result<()> {
        let paths: Vec<String> = self
            .swagger_path
            .iter()
            .chain(&self.swagger_paths)
            .cloned()
            .collect();
        replace_if_any(&mut config.swagger_paths, &paths);

        let urls: Vec<String> = self
            .swagger_url
            .iter()
            .chain(&self.swagger_urls)
            .cloned()
            .collect();
        replace_if_any(&mut config.swagger_urls, &urls);

        replace_if_any(&mut config.package_ids, &self.package_ids);
        replace_if_any(&mut config.twc_filters.portfolios, &self.twc_portfolios);
        replace_if_any(&mut config.twc_filters.domains, &self.twc_domains);
        replace_if_any(
            &mut config.twc_filters.usage_classifications,
            &self.twc_usages,
        );
        replace_if_any(&mut config.twc_filters.geographies, &self.twc_geographies);
        replace_if_any(&mut config.tool_generation.ignore_formats, &self.ignore_formats);

        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            config.auth.api_key = Some(key.to_string());
        }
        if let Some(scheme) = self.auth_scheme {
            config.auth.default_scheme = scheme;
        }
        if let Some(base) = &self.base_url {
            config.http.base_url = Some(base.clone());
        }
        if self.debug {
            config.debug = true;
        }
        if let Some(level) = &self.log_level {
            let level = level.trim().to_ascii_lowercase();
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(ServerError::Config(format!(
                    "invalid --log-level '{level}' (expected one of: {})",
                    LOG_LEVELS.join(", ")
                )));
            }
            config.logging.level = level;
        }
        if let Some(timeout) = self.timeout {
            config.server.timeout_secs = timeout;
        }
        if let Some(timeout) = self.http_timeout {
            config.http.timeout_secs = timeout;
        }
        if let Some(retries) = self.retries {
            config.http.retries = retries;
        }
        if let Some(ua) = &self.user_agent {
            config.http.user_agent.clone_from(ua);
            config.scan.user_agent.clone_from(ua);
        }
        if let Some(max) = self.max_tools {
            config.server.max_tools = max;
        }
        if let Some(format) = &self.prefer_format {
            config.tool_generation.prefer_format = Some(format.clone());
        }
        if self.include_deprecated {
            config.tool_generation.include_deprecated = true;
        }
        if let Some(mode) = self.registration {
            config.server.registration = Some(mode);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swagger_docs_test_support::write_file;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["swagger-docs-mcp"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse cli")
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.name, "swagger-docs-mcp");
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_tools, 1000);
        assert_eq!(config.http.timeout_secs, 10);
        assert_eq!(config.http.retries, 3);
        assert_eq!(config.http.user_agent, "swagger-docs-mcp/1.0.0");
        assert!(config.tool_generation.use_operation_id);
        assert_eq!(config.registration_mode(Mode::Stdio), RegistrationMode::Async);
        assert_eq!(config.registration_mode(Mode::Sse), RegistrationMode::Sync);
    }

    #[test]
    fn file_then_flags_precedence() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_file(
            dir.path(),
            ".swagger-mcp.yaml",
            r"
name: weather-tools
swaggerPaths: [./specs]
packageIds: [pkg-a]
http:
  retries: 1
server:
  port: 9000
toolGeneration:
  preferFormat: xml
",
        )?;

        let path = find_config_file(None, dir.path())?.expect("discovered");
        assert!(path.ends_with(".swagger-mcp.yaml"));

        let mut config = AppConfig::from_file(&path)?;
        assert_eq!(config.name, "weather-tools");
        assert_eq!(config.http.retries, 1);
        assert_eq!(config.http.timeout_secs, 10);
        assert_eq!(config.server.port, 9000);

        cli(&[
            "--swagger-urls",
            "https://a.example/spec.json, https://b.example/spec.json",
            "--retries",
            "5",
            "--prefer-format",
            "json",
            "--registration",
            "sync",
        ])
        .apply(&mut config)?;

        assert_eq!(config.swagger_paths, vec!["./specs"]);
        assert_eq!(
            config.swagger_urls,
            vec!["https://a.example/spec.json", "https://b.example/spec.json"]
        );
        assert_eq!(config.package_ids, vec!["pkg-a"]);
        assert_eq!(config.http.retries, 5);
        assert_eq!(config.tool_generation.prefer_format.as_deref(), Some("json"));
        assert_eq!(config.registration_mode(Mode::Stdio), RegistrationMode::Sync);
        config.validate()?;
        Ok(())
    }

    #[test]
    fn json_file_is_preferred_in_search_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_file(dir.path(), ".swagger-mcp.yml", "name: second\n")?;
        write_file(dir.path(), "swagger-mcp.config.json", r#"{"name": "first"}"#)?;

        let path = find_config_file(None, dir.path())?.expect("discovered");
        assert_eq!(AppConfig::from_file(&path)?.name, "first");
        Ok(())
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = find_config_file(Some(Path::new("/nonexistent/config.yaml")), Path::new("."))
            .expect_err("missing");
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn validation_lists_every_problem() {
        let mut config = AppConfig {
            name: String::new(),
            ..AppConfig::default()
        };
        config.swagger_urls = vec!["ftp://example.com/spec.json".to_string()];
        config.server.max_tools = 0;
        config.logging.level = "loud".to_string();

        let message = config.validate().expect_err("invalid").to_string();
        assert!(message.contains("name must be a non-empty string"), "{message}");
        assert!(message.contains("invalid URL in swaggerUrls: ftp://example.com/spec.json"));
        assert!(message.contains("server.maxTools must be positive"));
        assert!(message.contains("logging.level must be one of"));
        assert!(!message.contains("swaggerPaths or swaggerUrls"));

        let empty = AppConfig::default().validate().expect_err("no sources").to_string();
        assert!(empty.contains("at least one of swaggerPaths or swaggerUrls"));
    }

    #[test]
    fn repeatable_and_list_flags_combine() -> anyhow::Result<()> {
        let parsed = cli(&[
            "-s",
            "a.json",
            "--swagger-path",
            "b.yaml",
            "--swagger-paths",
            "c.json,,d.json",
            "--twc-geographies",
            "us,eu",
            "--api-key",
            "secret",
            "--auth-scheme",
            "api-key",
            "--debug",
            "--mode",
            "sse",
        ]);
        assert_eq!(parsed.mode, Mode::Sse);

        let mut config = AppConfig::default();
        parsed.apply(&mut config)?;
        assert_eq!(config.swagger_paths, vec!["a.json", "b.yaml", "c.json", "d.json"]);
        assert_eq!(config.twc_filters.geographies, vec!["us", "eu"]);
        assert_eq!(config.auth.api_key.as_deref(), Some("secret"));
        assert_eq!(config.auth.default_scheme, AuthScheme::ApiKey);
        assert_eq!(config.log_level(), "debug");
        Ok(())
    }

    #[test]
    fn unknown_log_level_flag_is_rejected() {
        let mut config = AppConfig::default();
        let err = cli(&["--log-level", "chatty"])
            .apply(&mut config)
            .expect_err("bad level");
        assert!(err.to_string().contains("invalid --log-level"));
    }
}
