use crate::errors::{Result, ToolError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Which kind of Python environment executions and installs run inside
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EnvironmentKind {
    /// Named conda environment
    #[default]
    #[serde(rename = "conda")]
    Conda,
    /// Standard virtualenv directory
    #[serde(rename = "venv")]
    Venv,
    /// Virtualenv managed by uv
    #[serde(rename = "venv-uv")]
    UvVenv,
}

impl EnvironmentKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conda" => Some(Self::Conda),
            "venv" => Some(Self::Venv),
            "venv-uv" | "uv-venv" | "uv_venv" | "venv_uv" => Some(Self::UvVenv),
            _ => None,
        }
    }

    /// Wire name, as accepted by `ENV_TYPE` and `configure_environment`
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentKind::Conda => "conda",
            EnvironmentKind::Venv => "venv",
            EnvironmentKind::UvVenv => "venv-uv",
        }
    }

    /// Name of the location field this kind requires
    pub fn location_field(&self) -> &'static str {
        match self {
            EnvironmentKind::Conda => "conda_name",
            EnvironmentKind::Venv => "venv_path",
            EnvironmentKind::UvVenv => "uv_venv_path",
        }
    }
}

impl std::fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active environment selection.
///
/// Only the location field matching `kind` is consulted; the others are
/// carried along so `get_environment_config` can report them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EnvironmentConfig {
    #[serde(rename = "env_type")]
    pub kind: EnvironmentKind,
    pub conda_name: Option<String>,
    pub venv_path: Option<PathBuf>,
    pub uv_venv_path: Option<PathBuf>,
}

impl EnvironmentConfig {
    pub fn conda(name: impl Into<String>) -> Self {
        Self {
            kind: EnvironmentKind::Conda,
            conda_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn venv(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: EnvironmentKind::Venv,
            venv_path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn uv_venv(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: EnvironmentKind::UvVenv,
            uv_venv_path: Some(path.into()),
            ..Default::default()
        }
    }

    /// The location the active kind needs: conda env name or venv directory.
    pub fn required_location(&self) -> Result<String> {
        let value = match self.kind {
            EnvironmentKind::Conda => self.conda_name.clone(),
            EnvironmentKind::Venv => self
                .venv_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            EnvironmentKind::UvVenv => self
                .uv_venv_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        };
        value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                ToolError::Configuration(format!(
                    "{} is required when env_type is {}",
                    self.kind.location_field(),
                    self.kind
                ))
            })
    }

    pub fn validate(&self) -> Result<()> {
        self.required_location().map(|_| ())
    }
}

/// Process-wide environment selection, swapped wholesale on reconfiguration
#[derive(Debug, Clone)]
pub struct SharedEnvironment {
    inner: Arc<RwLock<EnvironmentConfig>>,
}

impl SharedEnvironment {
    pub fn new(config: EnvironmentConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current configuration, fixed for the duration of one call
    pub async fn snapshot(&self) -> EnvironmentConfig {
        self.inner.read().await.clone()
    }

    /// Validate `config` and install it, returning the configuration it replaced.
    /// On validation failure the active configuration is left untouched.
    pub async fn replace(&self, config: EnvironmentConfig) -> Result<EnvironmentConfig> {
        config.validate()?;
        let mut guard = self.inner.write().await;
        Ok(std::mem::replace(&mut *guard, config))
    }
}

/// Startup configuration for the server binary
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub storage_dir: PathBuf,
    pub environment: EnvironmentConfig,
}

impl ServerConfig {
    /// Read `CODE_STORAGE_DIR`, `ENV_TYPE`, `CONDA_ENV_NAME`, `VENV_PATH` and
    /// `UV_VENV_PATH`, then apply any command-line overrides.
    pub fn from_env_and_args() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(|key| std::env::var(key).ok(), &args)
    }

    pub fn from_sources<F>(lookup: F, args: &[String]) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut storage_dir = var("CODE_STORAGE_DIR");
        let mut env_type = var("ENV_TYPE");
        let mut conda_name = var("CONDA_ENV_NAME");
        let mut venv_path = var("VENV_PATH");
        let mut uv_venv_path = var("UV_VENV_PATH");

        let mut i = 1;
        while i < args.len() {
            let slot = match args[i].as_str() {
                "--storage-dir" => Some(&mut storage_dir),
                "--env-type" => Some(&mut env_type),
                "--conda-env" => Some(&mut conda_name),
                "--venv-path" => Some(&mut venv_path),
                "--uv-venv-path" => Some(&mut uv_venv_path),
                _ => None,
            };
            match slot {
                Some(slot) => {
                    if let Some(v) = args.get(i + 1) {
                        *slot = Some(v.clone());
                    }
                    i += 2;
                }
                None => i += 1,
            }
        }

        let storage_dir = storage_dir.ok_or_else(|| {
            ToolError::Configuration("CODE_STORAGE_DIR environment variable is required".into())
        })?;
        let storage_dir = std::path::absolute(Path::new(&storage_dir))?;

        let kind = match env_type {
            Some(raw) => EnvironmentKind::parse(&raw).ok_or_else(|| {
                ToolError::Configuration(format!(
                    "unsupported ENV_TYPE '{}': expected conda, venv or venv-uv",
                    raw
                ))
            })?,
            None => EnvironmentKind::default(),
        };

        let environment = EnvironmentConfig {
            kind,
            conda_name,
            venv_path: venv_path.map(PathBuf::from),
            uv_venv_path: uv_venv_path.map(PathBuf::from),
        };
        environment.validate().map_err(|_| {
            let var_name = match kind {
                EnvironmentKind::Conda => "CONDA_ENV_NAME",
                EnvironmentKind::Venv => "VENV_PATH",
                EnvironmentKind::UvVenv => "UV_VENV_PATH",
            };
            ToolError::Configuration(format!(
                "{} environment variable is required for ENV_TYPE={}",
                var_name, kind
            ))
        })?;

        Ok(Self {
            storage_dir,
            environment,
        })
    }
}
