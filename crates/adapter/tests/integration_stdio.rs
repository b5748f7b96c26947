mod common;

use anyhow::Context as _;
use common::{echo_router, serve_router, server_command, weather_spec_json, write_file};
use serde_json::{Value, json};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt as _;

/// Feed `requests` to a stdio server started in `dir`, close stdin, and collect every response.
async fn run_session(dir: &Path, extra_args: &[&str], requests: &[Value]) -> anyhow::Result<Vec<Value>> {
    let mut cmd = server_command(dir);
    cmd.args(extra_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    let mut child = tokio::process::Command::from(cmd)
        .kill_on_drop(true)
        .spawn()
        .context("spawn stdio server")?;

    let mut input = String::new();
    for request in requests {
        input.push_str(&request.to_string());
        input.push('\n');
    }
    let mut stdin = child.stdin.take().context("stdin")?;
    stdin.write_all(input.as_bytes()).await?;
    drop(stdin);

    let output = tokio::time::timeout(Duration::from_secs(30), child.wait_with_output())
        .await
        .context("stdio server did not exit")??;
    assert!(output.status.success(), "exit status: {}", output.status);

    String::from_utf8(output.stdout)?
        .lines()
        .map(|line| serde_json::from_str(line).context("parse response line"))
        .collect()
}

fn handshake() -> Vec<Value> {
    vec![
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
            "protocolVersion": "2024-11-05", "capabilities": {}, "clientInfo": {"name": "test", "version": "0"}
        }}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    ]
}

#[tokio::test]
async fn stdio_session_lists_and_calls_tools() -> anyhow::Result<()> {
    let api = serve_router(echo_router()).await?;
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "specs/weather.json", &weather_spec_json(&api.base_url))?;

    let mut requests = handshake();
    requests.extend([
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {
            "name": "getdailyforecast_v3", "arguments": {"days": 5, "geocode": "33.7,-84.4"}
        }}),
        json!({"jsonrpc": "2.0", "id": 4, "method": "does/not/exist"}),
    ]);

    let responses = run_session(
        dir.path(),
        &["--swagger-path", "specs", "--registration", "sync", "--api-key", "secret"],
        &requests,
    )
    .await?;
    assert_eq!(responses.len(), 4);

    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "swagger-docs-mcp");

    let tools = responses[1]["result"]["tools"].as_array().context("tools")?;
    assert_eq!(tools.len(), 2);

    let call = &responses[2]["result"];
    assert_eq!(call["isError"], false);
    let echoed: Value = serde_json::from_str(call["content"][0]["text"].as_str().context("text")?)?;
    assert_eq!(echoed["path"], "/v3/wx/forecast/daily/5");
    assert_eq!(echoed["authorization"], "Bearer secret");

    assert_eq!(responses[3]["error"]["code"], -32601);
    Ok(())
}

#[tokio::test]
async fn config_file_in_working_directory_is_used() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "docs/weather.json", &weather_spec_json("http://127.0.0.1:9"))?;
    write_file(
        dir.path(),
        "swagger-mcp.config.yaml",
        "swaggerPaths:\n  - docs\nserver:\n  registration: sync\nprompts:\n  enabled: false\n",
    )?;

    let mut requests = handshake();
    requests.push(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}));
    requests.push(json!({"jsonrpc": "2.0", "id": 3, "method": "prompts/list"}));

    let responses = run_session(dir.path(), &[], &requests).await?;
    assert_eq!(responses.len(), 3);
    assert!(responses[0]["result"]["capabilities"].get("prompts").is_none());
    assert_eq!(responses[1]["result"]["tools"].as_array().map(Vec::len), Some(2));
    assert_eq!(responses[2]["result"]["prompts"], json!([]));
    Ok(())
}

#[tokio::test]
async fn startup_fails_on_invalid_configuration() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let output = server_command(dir.path()).output()?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("configuration validation failed"), "{stderr}");

    let output = server_command(dir.path())
        .arg("--config")
        .arg("missing.yaml")
        .output()?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config file not found"), "{stderr}");
    Ok(())
}
