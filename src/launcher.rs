use crate::environment::ShellCommand;
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs resolved shell commands to completion
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Run `command` in `cwd` with `env` merged over the inherited
    /// environment, waiting until it exits.
    async fn run(
        &self,
        command: &ShellCommand,
        cwd: &Path,
        env: &HashMap<String, String>,
    ) -> Result<ProcessOutput>;
}

/// Launches commands through the platform shell
#[derive(Debug, Clone, Default)]
pub struct ShellLauncher;

#[async_trait]
impl ProcessLauncher for ShellLauncher {
    async fn run(
        &self,
        command: &ShellCommand,
        cwd: &Path,
        env: &HashMap<String, String>,
    ) -> Result<ProcessOutput> {
        let mut cmd = Command::new(&command.shell);
        cmd.args(&command.shell_args)
            .arg(&command.command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in env {
            cmd.env(key, value);
        }

        tracing::debug!("spawning: {}", command);
        let output = cmd.spawn()?.wait_with_output().await?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
