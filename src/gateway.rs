//! Tool surface exposed over the MCP `tools/*` methods.
//!
//! Missing required arguments and unknown tool names are protocol errors
//! ([`RpcError`]). Everything that goes wrong inside a tool comes back as a
//! normal result whose JSON body has `status: "error"`.

use crate::config::{EnvironmentConfig, EnvironmentKind, SharedEnvironment};
use crate::dependencies::DependencyManager;
use crate::launcher::ProcessLauncher;
use crate::runner::ExecutionRunner;
use crate::store::CodeStore;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const INVALID_PARAMS: i64 = -32602;
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error object for calls that never reach a tool
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "code": self.code, "message": self.message })
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

pub struct ToolGateway {
    store: CodeStore,
    environment: SharedEnvironment,
    runner: ExecutionRunner,
    dependencies: DependencyManager,
}

impl ToolGateway {
    pub fn new(
        store: CodeStore,
        environment: SharedEnvironment,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self::from_runner(ExecutionRunner::new(store, environment, launcher))
    }

    pub fn from_runner(runner: ExecutionRunner) -> Self {
        Self {
            store: runner.store().clone(),
            environment: runner.environment().clone(),
            dependencies: DependencyManager::new(runner.clone()),
            runner,
        }
    }

    /// Dispatch a `tools/call` request
    pub async fn call_tool(&self, name: &str, args: &Value) -> Result<Value, RpcError> {
        debug!("tool call: {}", name);
        let body = match normalize_tool_name(name).as_str() {
            "execute_code" => self.execute_code(args).await?,
            "initialize_code_file" => self.initialize_code_file(args).await?,
            "append_to_code_file" => self.append_to_code_file(args).await?,
            "execute_code_file" => self.execute_code_file(args).await?,
            "read_code_file" => self.read_code_file(args).await?,
            "install_dependencies" => self.install_dependencies(args).await?,
            "check_installed_packages" => self.check_installed_packages(args).await?,
            "configure_environment" => self.configure_environment(args).await?,
            "get_environment_config" => self.get_environment_config().await,
            other => return Err(RpcError::method_not_found(format!("Unknown tool: {}", other))),
        };
        Ok(envelope(body))
    }

    async fn execute_code(&self, args: &Value) -> Result<Value, RpcError> {
        let code = required_str(args, "code")?;
        let filename = optional_str(args, "filename");
        let result = self.runner.execute_inline(code, filename).await;
        Ok(to_body(&result))
    }

    async fn initialize_code_file(&self, args: &Value) -> Result<Value, RpcError> {
        let content = required_str(args, "content")?;
        let filename = optional_str(args, "filename");
        Ok(match self.store.initialize(content, filename).await {
            Ok(path) => json!({
                "status": "success",
                "message": "Code file initialized",
                "file_path": path.display().to_string(),
                "filename": path.file_name().map(|n| n.to_string_lossy().into_owned()),
            }),
            Err(e) => error_body(e, None),
        })
    }

    async fn append_to_code_file(&self, args: &Value) -> Result<Value, RpcError> {
        let path = PathBuf::from(required_str(args, "file_path")?);
        let content = required_str(args, "content")?;
        Ok(match self.store.append(&path, content).await {
            Ok(()) => json!({
                "status": "success",
                "message": "Content appended to code file",
                "file_path": path.display().to_string(),
            }),
            Err(e) => error_body(e, Some(&path)),
        })
    }

    async fn execute_code_file(&self, args: &Value) -> Result<Value, RpcError> {
        let path = PathBuf::from(required_str(args, "file_path")?);
        let result = self.runner.execute_file(&path).await;
        Ok(to_body(&result))
    }

    async fn read_code_file(&self, args: &Value) -> Result<Value, RpcError> {
        let path = PathBuf::from(required_str(args, "file_path")?);
        Ok(match self.store.read(&path).await {
            Ok(content) => json!({
                "status": "success",
                "content": content,
                "file_path": path.display().to_string(),
            }),
            Err(e) => error_body(e, Some(&path)),
        })
    }

    async fn install_dependencies(&self, args: &Value) -> Result<Value, RpcError> {
        let packages = required_string_list(args, "packages")?;
        let config = self.environment.snapshot().await;
        Ok(match self.dependencies.install(&config, &packages).await {
            Ok(result) => to_body(&result),
            Err(e) => {
                warn!("install of {:?} failed: {}", packages, e);
                json!({
                    "status": "error",
                    "env_type": config.kind,
                    "error": format!("Failed to install packages: {}", e),
                })
            }
        })
    }

    async fn check_installed_packages(&self, args: &Value) -> Result<Value, RpcError> {
        let packages = required_string_list(args, "packages")?;
        let config = self.environment.snapshot().await;
        Ok(match self.dependencies.check(&config, &packages).await {
            Ok(result) => to_body(&result),
            Err(e) => {
                warn!("package check failed: {}", e);
                json!({
                    "status": "error",
                    "env_type": config.kind,
                    "error": format!("Failed to check packages: {}", e),
                })
            }
        })
    }

    async fn configure_environment(&self, args: &Value) -> Result<Value, RpcError> {
        let raw_kind = required_str(args, "env_type")?;
        let Some(kind) = EnvironmentKind::parse(raw_kind) else {
            return Ok(json!({
                "status": "error",
                "error": format!(
                    "Invalid env_type '{}': expected conda, venv or venv-uv",
                    raw_kind
                ),
            }));
        };

        let config = EnvironmentConfig {
            kind,
            conda_name: optional_str(args, "conda_name").map(str::to_string),
            venv_path: optional_str(args, "venv_path").map(PathBuf::from),
            uv_venv_path: optional_str(args, "uv_venv_path").map(PathBuf::from),
        };

        Ok(match self.environment.replace(config.clone()).await {
            Ok(previous) => {
                info!("environment reconfigured: {} -> {}", previous.kind, config.kind);
                json!({
                    "status": "success",
                    "message": "Environment configuration updated",
                    "previous": previous,
                    "current": config,
                })
            }
            Err(e) => json!({
                "status": "error",
                "error": e.to_string(),
            }),
        })
    }

    async fn get_environment_config(&self) -> Value {
        let config = self.environment.snapshot().await;
        json!({
            "status": "success",
            "env_type": config.kind,
            "conda_name": config.conda_name,
            "venv_path": config.venv_path,
            "uv_venv_path": config.uv_venv_path,
            "storage_dir": self.store.root(),
        })
    }
}

/// Declared tools with their input schemas
pub fn tools_list() -> Vec<Value> {
    vec![
        json!({
            "name": "execute_code",
            "description": "Execute Python code in the configured environment. The code is saved to a new file in the storage directory first.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "code": { "type": "string", "description": "Python code to execute." },
                    "filename": { "type": "string", "description": "Optional base name for the saved file; a random suffix is always added." }
                },
                "required": ["code"]
            }
        }),
        json!({
            "name": "initialize_code_file",
            "description": "Create a new Python file with initial content. Use it to start longer scripts that are built up with append_to_code_file.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "Initial file content." },
                    "filename": { "type": "string", "description": "Optional base name for the file; a random suffix is always added." }
                },
                "required": ["content"]
            }
        }),
        json!({
            "name": "append_to_code_file",
            "description": "Append content to an existing Python file.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Full path of the file to extend." },
                    "content": { "type": "string", "description": "Content to append verbatim." }
                },
                "required": ["file_path", "content"]
            }
        }),
        json!({
            "name": "execute_code_file",
            "description": "Execute an existing Python file in the configured environment.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Full path of the file to run." }
                },
                "required": ["file_path"]
            }
        }),
        json!({
            "name": "read_code_file",
            "description": "Read the content of an existing Python file.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Full path of the file to read." }
                },
                "required": ["file_path"]
            }
        }),
        json!({
            "name": "install_dependencies",
            "description": "Install Python packages into the configured environment (conda, pip or uv pip).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "packages": { "type": "array", "items": { "type": "string" }, "description": "Package specifiers to install." }
                },
                "required": ["packages"]
            }
        }),
        json!({
            "name": "check_installed_packages",
            "description": "Check whether packages can be imported in the configured environment.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "packages": { "type": "array", "items": { "type": "string" }, "description": "Importable module names to check." }
                },
                "required": ["packages"]
            }
        }),
        json!({
            "name": "configure_environment",
            "description": "Switch the Python environment used for execution and installs.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "env_type": { "type": "string", "enum": ["conda", "venv", "venv-uv"], "description": "Kind of environment." },
                    "conda_name": { "type": "string", "description": "Conda environment name (env_type=conda)." },
                    "venv_path": { "type": "string", "description": "Virtualenv directory (env_type=venv)." },
                    "uv_venv_path": { "type": "string", "description": "uv virtualenv directory (env_type=venv-uv)." }
                },
                "required": ["env_type"]
            }
        }),
        json!({
            "name": "get_environment_config",
            "description": "Show the active environment configuration.",
            "inputSchema": {
                "type": "object",
                "properties": {}
            }
        }),
    ]
}

fn normalize_tool_name(name: &str) -> String {
    name.replace(['.', '/'], "_")
}

/// Wrap a tool body as MCP content: JSON text plus an error flag that
/// mirrors `status`.
fn envelope(body: Value) -> Value {
    let is_error = body.get("status").and_then(|s| s.as_str()) != Some("success");
    let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

fn to_body<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        json!({ "status": "error", "error": format!("failed to encode result: {}", e) })
    })
}

fn error_body(err: crate::errors::ToolError, path: Option<&Path>) -> Value {
    let mut body = json!({ "status": "error", "error": err.to_string() });
    if let Some(path) = path {
        body["file_path"] = json!(path.display().to_string());
    }
    body
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, RpcError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(format!("Missing required argument: {}", key)))
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

fn required_string_list(args: &Value, key: &str) -> Result<Vec<String>, RpcError> {
    let items = args
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| RpcError::invalid_params(format!("Missing required argument: {}", key)))?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                RpcError::invalid_params(format!("Argument {} must be a list of strings", key))
            })
        })
        .collect()
}
