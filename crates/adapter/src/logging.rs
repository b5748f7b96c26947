//! Tracing subscriber setup. Logs always go to stderr; stdout carries the stdio protocol.

use crate::config::LogFormat;
use crate::error::{Result, ServerError};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, reload, util::SubscriberInitExt};

/// `RUST_LOG` wins when set; otherwise `level` applies to everything.
#[must_use]
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Maps an MCP `logging/setLevel` level onto a tracing directive.
#[must_use]
pub fn mcp_level(level: &str) -> Option<&'static str> {
    match level {
        "debug" => Some("debug"),
        "info" | "notice" => Some("info"),
        "warning" => Some("warn"),
        "error" | "critical" | "alert" | "emergency" => Some("error"),
        _ => None,
    }
}

/// Changes the active filter after startup.
#[derive(Clone)]
pub struct LogHandle(reload::Handle<EnvFilter, Registry>);

impl LogHandle {
    /// # Errors
    ///
    /// Returns `Config` if the subscriber that owns the filter is gone.
    pub fn set_level(&self, directive: &str) -> Result<()> {
        self.0
            .reload(EnvFilter::new(directive))
            .map_err(|e| ServerError::Config(format!("failed to change log level: {e}")))
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns `Startup` if a global subscriber is already installed.
pub fn init(level: &str, format: LogFormat) -> Result<LogHandle> {
    let (filter, handle) = reload::Layer::new(env_filter(level));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init(),
    };
    installed
        .map_err(|e| ServerError::Startup(format!("failed to install tracing subscriber: {e}")))?;
    Ok(LogHandle(handle))
}
