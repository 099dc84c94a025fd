//! Scripted launcher used by unit tests.

use crate::environment::ShellCommand;
use crate::errors::{Result, ToolError};
use crate::launcher::{ProcessLauncher, ProcessOutput};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub command: ShellCommand,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

/// Replays queued outcomes in order and records every call it receives.
/// An empty queue answers with a successful run and no output.
#[derive(Default)]
pub struct ScriptedLauncher {
    outcomes: Mutex<VecDeque<std::result::Result<ProcessOutput, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&self, stdout: &str, stderr: &str, exit_code: i32) {
        self.outcomes.lock().unwrap().push_back(Ok(ProcessOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(exit_code),
        }));
    }

    pub fn push_spawn_failure(&self, message: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn run(
        &self,
        command: &ShellCommand,
        cwd: &Path,
        env: &HashMap<String, String>,
    ) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(RecordedCall {
            command: command.clone(),
            cwd: cwd.to_path_buf(),
            env: env.clone(),
        });
        match self.outcomes.lock().unwrap().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(ToolError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                message,
            ))),
            None => Ok(ProcessOutput {
                exit_code: Some(0),
                ..Default::default()
            }),
        }
    }
}
