use crate::config::{EnvironmentConfig, SharedEnvironment};
use crate::environment::{resolve_command, Platform};
use crate::errors::Result;
use crate::launcher::{ProcessLauncher, ProcessOutput};
use crate::store::{ensure_exists, CodeStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome marker carried by every tool response
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Normalized result of running a script
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_filename: Option<String>,
}

impl ExecutionResult {
    /// Anything on stderr marks the run as failed, whatever the exit code.
    /// A silent non-zero exit is a failure too.
    pub fn from_output(output: ProcessOutput, file_path: &Path) -> Self {
        let file_path = file_path.display().to_string();
        if !output.stderr.is_empty() {
            return Self {
                status: Status::Error,
                output: Some(output.stderr),
                error: None,
                file_path,
                generated_filename: None,
            };
        }
        if !output.success() {
            let error = match output.exit_code {
                Some(code) => format!("process exited with code {}", code),
                None => "process terminated by signal".to_string(),
            };
            return Self {
                status: Status::Error,
                output: Some(output.stdout),
                error: Some(error),
                file_path,
                generated_filename: None,
            };
        }
        Self {
            status: Status::Success,
            output: Some(output.stdout),
            error: None,
            file_path,
            generated_filename: None,
        }
    }

    pub fn failed(message: impl Into<String>, file_path: &Path) -> Self {
        Self {
            status: Status::Error,
            output: None,
            error: Some(message.into()),
            file_path: file_path.display().to_string(),
            generated_filename: None,
        }
    }

    fn with_generated_filename(mut self, filename: String) -> Self {
        self.generated_filename = Some(filename);
        self
    }
}

/// Runs scripts from the code store inside the active environment
#[derive(Clone)]
pub struct ExecutionRunner {
    store: CodeStore,
    environment: SharedEnvironment,
    launcher: Arc<dyn ProcessLauncher>,
    platform: Platform,
}

impl ExecutionRunner {
    pub fn new(
        store: CodeStore,
        environment: SharedEnvironment,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self::with_platform(store, environment, launcher, Platform::current())
    }

    pub fn with_platform(
        store: CodeStore,
        environment: SharedEnvironment,
        launcher: Arc<dyn ProcessLauncher>,
        platform: Platform,
    ) -> Self {
        Self {
            store,
            environment,
            launcher,
            platform,
        }
    }

    /// Write `code` to a freshly named script and run it
    pub async fn execute_inline(&self, code: &str, filename: Option<&str>) -> ExecutionResult {
        let generated = CodeStore::generate_filename(filename);
        let path = self.store.path_for(&generated);

        if let Err(e) = tokio::fs::write(&path, code).await {
            warn!("failed to write script {}: {}", path.display(), e);
            return ExecutionResult::failed(e.to_string(), &path).with_generated_filename(generated);
        }

        self.run_classified(&path)
            .await
            .with_generated_filename(generated)
    }

    /// Run a script that already exists
    pub async fn execute_file(&self, path: &Path) -> ExecutionResult {
        if let Err(e) = ensure_exists(path).await {
            return ExecutionResult::failed(e.to_string(), path);
        }
        self.run_classified(path).await
    }

    async fn run_classified(&self, path: &Path) -> ExecutionResult {
        match self.run_script(path).await {
            Ok(output) => ExecutionResult::from_output(output, path),
            Err(e) => {
                warn!("execution of {} failed: {}", path.display(), e);
                ExecutionResult::failed(e.to_string(), path)
            }
        }
    }

    pub fn store(&self) -> &CodeStore {
        &self.store
    }

    pub fn environment(&self) -> &SharedEnvironment {
        &self.environment
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Run `path` with the interpreter of the active environment
    pub(crate) async fn run_script(&self, path: &Path) -> Result<ProcessOutput> {
        let config = self.environment.snapshot().await;
        let invocation = self.platform.python_invocation(path);
        self.run_in_environment(&config, &invocation).await
    }

    /// Resolve `invocation` against `config` and run it with the storage
    /// root as working directory.
    pub(crate) async fn run_in_environment(
        &self,
        config: &EnvironmentConfig,
        invocation: &str,
    ) -> Result<ProcessOutput> {
        let command = resolve_command(config, self.platform, invocation)?;
        debug!("running in {} environment: {}", config.kind, command);

        let mut env = HashMap::new();
        env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
        self.launcher.run(&command, self.store.root(), &env).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvironmentKind;
    use crate::testing::ScriptedLauncher;

    async fn runner(
        dir: &Path,
        config: EnvironmentConfig,
    ) -> (ExecutionRunner, Arc<ScriptedLauncher>) {
        let store = CodeStore::open(dir).await.unwrap();
        let launcher = Arc::new(ScriptedLauncher::new());
        let runner = ExecutionRunner::with_platform(
            store,
            SharedEnvironment::new(config),
            launcher.clone(),
            Platform::Posix,
        );
        (runner, launcher)
    }

    #[tokio::test]
    async fn test_stdout_only_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, launcher) = runner(dir.path(), EnvironmentConfig::conda("base")).await;
        launcher.push_output("hello\n", "", 0);

        let result = runner.execute_inline("print('hello')", Some("greet")).await;
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.output.as_deref(), Some("hello\n"));
        let generated = result.generated_filename.clone().unwrap();
        assert!(generated.starts_with("greet_"));

        let written = dir.path().join(&generated);
        assert_eq!(result.file_path, written.display().to_string());
        assert_eq!(std::fs::read_to_string(&written).unwrap(), "print('hello')");

        let calls = launcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].cwd, dir.path());
        assert_eq!(calls[0].env.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
        assert!(calls[0]
            .command
            .command
            .ends_with(&format!(
                "conda activate base && python3 -u \"{}\"",
                written.display()
            )));
    }

    #[tokio::test]
    async fn test_stderr_is_error_even_with_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, launcher) = runner(dir.path(), EnvironmentConfig::conda("base")).await;
        launcher.push_output("partial\n", "UserWarning: careful\n", 0);

        let result = runner.execute_inline("import warnings", None).await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.output.as_deref(), Some("UserWarning: careful\n"));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_silent_nonzero_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, launcher) = runner(dir.path(), EnvironmentConfig::conda("base")).await;
        launcher.push_output("before exit\n", "", 2);

        let result = runner.execute_inline("import sys; sys.exit(2)", None).await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.output.as_deref(), Some("before exit\n"));
        assert_eq!(result.error.as_deref(), Some("process exited with code 2"));
    }

    #[tokio::test]
    async fn test_launch_failure_becomes_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, launcher) = runner(dir.path(), EnvironmentConfig::conda("base")).await;
        launcher.push_spawn_failure("bash: not found");

        let result = runner.execute_inline("print(1)", None).await;
        assert_eq!(result.status, Status::Error);
        assert!(result.error.unwrap().contains("bash: not found"));
        assert!(result.generated_filename.is_some());
    }

    #[tokio::test]
    async fn test_misconfigured_environment_is_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let config = EnvironmentConfig {
            kind: EnvironmentKind::Venv,
            ..Default::default()
        };
        let (runner, launcher) = runner(dir.path(), config).await;

        let result = runner.execute_inline("print(1)", None).await;
        assert_eq!(result.status, Status::Error);
        assert!(result.error.unwrap().contains("venv_path"));
        assert!(launcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_execute_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, launcher) = runner(dir.path(), EnvironmentConfig::conda("base")).await;

        let missing = dir.path().join("nope.py");
        let result = runner.execute_file(&missing).await;
        assert_eq!(result.status, Status::Error);
        assert!(result.error.unwrap().starts_with("File not found"));
        assert!(result.generated_filename.is_none());
        assert!(launcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_execute_existing_file_does_not_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, launcher) = runner(dir.path(), EnvironmentConfig::venv("/opt/venv")).await;
        let script = dir.path().join("keep.py");
        std::fs::write(&script, "print('kept')\n").unwrap();
        launcher.push_output("kept\n", "", 0);

        let result = runner.execute_file(&script).await;
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.output.as_deref(), Some("kept\n"));
        assert_eq!(std::fs::read_to_string(&script).unwrap(), "print('kept')\n");
        assert_eq!(
            launcher.calls()[0].command.command,
            format!(
                "source /opt/venv/bin/activate && python3 -u \"{}\"",
                script.display()
            )
        );
    }

    #[tokio::test]
    async fn test_serialized_shape() {
        let result = ExecutionResult::from_output(
            ProcessOutput {
                stdout: "ok\n".into(),
                stderr: String::new(),
                exit_code: Some(0),
            },
            Path::new("/store/a_12345678.py"),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["output"], "ok\n");
        assert_eq!(value["file_path"], "/store/a_12345678.py");
        assert!(value.get("error").is_none());
        assert!(value.get("generated_filename").is_none());
    }

    /// Runs a real interpreter through a throwaway venv whose activate script
    /// is empty, so `python3` comes from PATH.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_python_roundtrip() {
        if which::which("python3").is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let venv = dir.path().join("venv");
        std::fs::create_dir_all(venv.join("bin")).unwrap();
        std::fs::write(venv.join("bin").join("activate"), "").unwrap();

        let store = CodeStore::open(dir.path().join("store")).await.unwrap();
        let runner = ExecutionRunner::with_platform(
            store,
            SharedEnvironment::new(EnvironmentConfig::venv(&venv)),
            Arc::new(crate::launcher::ShellLauncher),
            Platform::Posix,
        );

        let ok = runner.execute_inline("print('from python')", None).await;
        assert_eq!(ok.status, Status::Success);
        assert_eq!(ok.output.as_deref(), Some("from python\n"));

        let err = runner
            .execute_inline("import sys\nsys.stderr.write('oops')", None)
            .await;
        assert_eq!(err.status, Status::Error);
        assert_eq!(err.output.as_deref(), Some("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_python_with_space_in_storage_root() {
        if which::which("python3").is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let venv = dir.path().join("venv");
        std::fs::create_dir_all(venv.join("bin")).unwrap();
        std::fs::write(venv.join("bin").join("activate"), "").unwrap();

        let store = CodeStore::open(dir.path().join("my scripts")).await.unwrap();
        let runner = ExecutionRunner::with_platform(
            store,
            SharedEnvironment::new(EnvironmentConfig::venv(&venv)),
            Arc::new(crate::launcher::ShellLauncher),
            Platform::Posix,
        );

        let inline = runner.execute_inline("print('hi')", Some("spaced")).await;
        assert_eq!(inline.status, Status::Success);
        assert_eq!(inline.output.as_deref(), Some("hi\n"));

        let from_file = runner.execute_file(Path::new(&inline.file_path)).await;
        assert_eq!(from_file.status, Status::Success);
        assert_eq!(from_file.output.as_deref(), Some("hi\n"));
    }
}
