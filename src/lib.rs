//! Python code execution, script assembly and dependency management for
//! conda, virtualenv and uv environments, exposed as MCP tools.

pub mod config;
pub mod dependencies;
pub mod environment;
pub mod errors;
pub mod gateway;
pub mod launcher;
pub mod runner;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::{EnvironmentConfig, EnvironmentKind, ServerConfig, SharedEnvironment};
pub use dependencies::{DependencyManager, InstallResult, PackageCheckResult, PackageStatus};
pub use environment::{resolve_command, Platform, ShellCommand};
pub use errors::{Result, ToolError};
pub use gateway::{tools_list, RpcError, ToolGateway};
pub use launcher::{ProcessLauncher, ProcessOutput, ShellLauncher};
pub use runner::{ExecutionResult, ExecutionRunner, Status};
pub use store::CodeStore;
