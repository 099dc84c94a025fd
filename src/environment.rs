//! Environment resolution: turns a Python invocation into the shell command
//! that runs it inside the configured conda env or virtualenv.
//!
//! Environment names and venv paths are interpolated into the command line
//! as-is, without quoting or escaping, so the configured values must be
//! trusted. Only the generated script path is quoted.

use crate::config::{EnvironmentConfig, EnvironmentKind};
use crate::errors::Result;
use std::path::Path;

/// Shell family the command line is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Posix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    /// Unbuffered interpreter invocation for a script, so output written
    /// before a crash still reaches the captured streams. The script path is
    /// double-quoted since the storage root may contain spaces.
    pub fn python_invocation(&self, script: &Path) -> String {
        match self {
            Platform::Posix => format!("python3 -u \"{}\"", script.display()),
            Platform::Windows => format!("python -u \"{}\"", script.display()),
        }
    }
}

/// A command line plus the shell that interprets it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub shell: String,
    pub shell_args: Vec<String>,
    pub command: String,
}

impl ShellCommand {
    fn new(platform: Platform, command: String) -> Self {
        match platform {
            Platform::Posix => Self {
                shell: "/bin/bash".to_string(),
                shell_args: vec!["-c".to_string()],
                command,
            },
            Platform::Windows => Self {
                shell: "cmd".to_string(),
                shell_args: vec!["/C".to_string()],
                command,
            },
        }
    }
}

impl std::fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.shell, self.shell_args.join(" "), self.command)
    }
}

/// Wrap `invocation` so it runs inside the environment described by `config`.
pub fn resolve_command(
    config: &EnvironmentConfig,
    platform: Platform,
    invocation: &str,
) -> Result<ShellCommand> {
    let location = config.required_location()?;

    let command = match (platform, config.kind) {
        (Platform::Windows, EnvironmentKind::Conda) => {
            format!("conda run -n {} {}", location, invocation)
        }
        (Platform::Windows, EnvironmentKind::Venv | EnvironmentKind::UvVenv) => {
            format!("{}\\Scripts\\activate.bat && {}", location, invocation)
        }
        (Platform::Posix, EnvironmentKind::Conda) => format!(
            "source $(conda info --base)/etc/profile.d/conda.sh && conda activate {} && {}",
            location, invocation
        ),
        (Platform::Posix, EnvironmentKind::Venv | EnvironmentKind::UvVenv) => {
            format!("source {}/bin/activate && {}", location, invocation)
        }
    };

    Ok(ShellCommand::new(platform, command))
}
