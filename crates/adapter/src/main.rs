//! `swagger-docs-mcp` entry point.
//!
//! ```bash
//! swagger-docs-mcp --swagger-path ./specs --api-key "$KEY"
//! swagger-docs-mcp --mode sse --port 8080 --swagger-urls https://example.com/specs.json
//! ```

use anyhow::{Context as _, Result};
use clap::Parser as _;
use std::sync::Arc;
use swagger_docs_mcp::catalog::Catalog;
use swagger_docs_mcp::config::{AppConfig, Cli, Mode};
use swagger_docs_mcp::{logging, sse, stdio};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli).context("load configuration")?;
    let log_handle = logging::init(config.log_level(), cli.log_format).context("initialize logging")?;

    tracing::info!(
        name = %config.name,
        version = %config.version,
        mode = ?cli.mode,
        paths = config.swagger_paths.len(),
        urls = config.swagger_urls.len(),
        "starting server"
    );

    let registration = config.registration_mode(cli.mode);
    let catalog = Arc::new(Catalog::new(config).context("build catalog")?);

    match cli.mode {
        Mode::Stdio => stdio::run(catalog, registration, Some(log_handle))
            .await
            .context("stdio server")?,
        Mode::Sse => sse::run(catalog, registration)
            .await
            .context("SSE server")?,
    }

    tracing::info!("server shutdown complete");
    Ok(())
}
