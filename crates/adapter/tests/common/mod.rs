#![allow(dead_code)]

use anyhow::Context as _;
use std::path::Path;
use std::process::{Child, Command};

pub use swagger_docs_test_support::{
    KillOnDrop, echo_router, pick_unused_port, serve_router, wait_http_ok, weather_spec_json,
    write_file,
};

/// The server binary, run from `dir` so no stray config file is picked up.
pub fn server_command(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_swagger-docs-mcp"));
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .arg("--log-level")
        .arg("warn")
        .arg("--retries")
        .arg("0");
    cmd
}

pub fn spawn_sse(spec_dir: &Path, port: u16) -> anyhow::Result<Child> {
    server_command(spec_dir)
        .arg("--swagger-path")
        .arg(spec_dir)
        .arg("--mode")
        .arg("sse")
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .spawn()
        .context("spawn SSE server")
}
