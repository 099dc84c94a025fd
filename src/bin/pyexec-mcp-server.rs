use pyexec::{
    tools_list, CodeStore, EnvironmentKind, RpcError, ServerConfig, SharedEnvironment,
    ShellLauncher, ToolGateway,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries protocol frames, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "pyexec_mcp_server=info,pyexec=info".to_string()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cfg = ServerConfig::from_env_and_args()?;
    tracing::info!("Using environment type: {}", cfg.environment.kind);
    match cfg.environment.kind {
        EnvironmentKind::Conda => {
            tracing::info!(
                "Conda environment: {}",
                cfg.environment.conda_name.as_deref().unwrap_or_default()
            );
            if which::which("conda").is_err() {
                tracing::warn!("conda executable not found in PATH");
            }
        }
        EnvironmentKind::Venv => {
            tracing::info!("Virtualenv path: {:?}", cfg.environment.venv_path);
        }
        EnvironmentKind::UvVenv => {
            tracing::info!("uv virtualenv path: {:?}", cfg.environment.uv_venv_path);
        }
    }

    let store = CodeStore::open(&cfg.storage_dir).await?;
    let gateway = ToolGateway::new(
        store,
        SharedEnvironment::new(cfg.environment.clone()),
        Arc::new(ShellLauncher),
    );
    tracing::info!("pyexec-mcp-server ready on stdio");

    let stdin = BufReader::new(io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("invalid json-rpc line: {} | err={}", line, e);
                continue;
            }
        };

        let response = handle_message(&gateway, parsed).await;
        if let Some(resp) = response {
            let s = serde_json::to_string(&resp)?;
            stdout.write_all(s.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

async fn handle_message(gateway: &ToolGateway, msg: Value) -> Option<Value> {
    let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");
    let id = msg.get("id").cloned();
    let params = msg.get("params").cloned().unwrap_or_else(|| json!({}));

    // Notifications have no id: ignore most, but allow "exit" to terminate.
    if id.is_none() {
        if method == "exit" {
            std::process::exit(0);
        }
        return None;
    }

    let result = match method {
        "initialize" => Ok(json!({
            "protocolVersion": "2025-06-18",
            "serverInfo": {
                "name": "pyexec-mcp",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false },
                "prompts": { "listChanged": false }
            }
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tools_list() })),
        "tools/call" => call_tool(gateway, &params).await,
        "resources/list" => Ok(json!({ "resources": [] })),
        "prompts/list" => Ok(json!({ "prompts": [] })),
        "shutdown" => {
            std::process::exit(0);
        }
        _ => Err(RpcError::method_not_found(format!("Method not found: {}", method))),
    };

    Some(match result {
        Ok(v) => json!({ "jsonrpc": "2.0", "result": v, "id": id }),
        Err(err) => {
            tracing::warn!("request {} failed: {}", method, err);
            json!({ "jsonrpc": "2.0", "error": err.to_json(), "id": id })
        }
    })
}

async fn call_tool(gateway: &ToolGateway, params: &Value) -> Result<Value, RpcError> {
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("Missing tool name"))?;
    let args = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));
    gateway.call_tool(name, &args).await
}
