use crate::config::{EnvironmentConfig, EnvironmentKind};
use crate::errors::{Result, ToolError};
use crate::runner::{ExecutionRunner, Status};
use crate::store::random_suffix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Successful install report. Installer stderr is kept as warnings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallResult {
    pub status: Status,
    pub env_type: EnvironmentKind,
    pub installed_packages: Vec<String>,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<String>,
}

/// Import check outcome for a single package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageStatus {
    pub installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageCheckResult {
    pub status: Status,
    pub env_type: EnvironmentKind,
    pub all_installed: bool,
    /// Missing packages in request order
    pub not_installed: Vec<String>,
    pub package_details: BTreeMap<String, PackageStatus>,
}

impl PackageCheckResult {
    fn from_details(
        env_type: EnvironmentKind,
        requested: &[String],
        package_details: BTreeMap<String, PackageStatus>,
    ) -> Self {
        let not_installed: Vec<String> = requested
            .iter()
            .filter(|name| {
                !package_details
                    .get(name.as_str())
                    .map(|s| s.installed)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        Self {
            status: Status::Success,
            env_type,
            all_installed: not_installed.is_empty(),
            not_installed,
            package_details,
        }
    }
}

/// Installs and checks packages in a Python environment
#[derive(Clone)]
pub struct DependencyManager {
    runner: ExecutionRunner,
}

impl DependencyManager {
    pub fn new(runner: ExecutionRunner) -> Self {
        Self { runner }
    }

    /// Install `packages` into the environment described by `config`
    pub async fn install(
        &self,
        config: &EnvironmentConfig,
        packages: &[String],
    ) -> Result<InstallResult> {
        validate_packages(packages)?;
        let command = install_command(config, packages)?;
        info!("installing {:?} into {} environment", packages, config.kind);

        let output = self.runner.run_in_environment(config, &command).await?;
        if !output.success() {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(ToolError::Execution(format!(
                "installer exited with code {}: {}",
                output
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                detail
            )));
        }

        Ok(InstallResult {
            status: Status::Success,
            env_type: config.kind,
            installed_packages: packages.to_vec(),
            output: output.stdout,
            warnings: Some(output.stderr).filter(|s| !s.is_empty()),
        })
    }

    pub async fn check(
        &self,
        config: &EnvironmentConfig,
        packages: &[String],
    ) -> Result<PackageCheckResult> {
        validate_packages(packages)?;

        let filename = format!("check_packages_{}.py", random_suffix());
        let path = self.runner.store().path_for(&filename);
        tokio::fs::write(&path, import_check_script(packages)?).await?;

        let invocation = self.runner.platform().python_invocation(&path);
        let outcome = self.runner.run_in_environment(config, &invocation).await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("failed to remove package check script {}: {}", path.display(), e);
        }

        let output = outcome?;
        if !output.stderr.is_empty() {
            return Err(ToolError::Execution(format!(
                "package check failed: {}",
                output.stderr.trim()
            )));
        }
        if !output.success() {
            return Err(ToolError::Execution(format!(
                "package check exited with code {:?}",
                output.exit_code
            )));
        }

        let details = parse_check_output(&output.stdout)?;
        debug!("package check reported {} packages", details.len());
        Ok(PackageCheckResult::from_details(config.kind, packages, details))
    }
}

fn validate_packages(packages: &[String]) -> Result<()> {
    if packages.is_empty() {
        return Err(ToolError::Validation(
            "at least one package name is required".into(),
        ));
    }
    if packages.iter().any(|p| p.trim().is_empty()) {
        return Err(ToolError::Validation("package names must not be empty".into()));
    }
    Ok(())
}

/// Installer invocation for the active environment kind
pub fn install_command(config: &EnvironmentConfig, packages: &[String]) -> Result<String> {
    let joined = packages.join(" ");
    Ok(match config.kind {
        EnvironmentKind::Conda => format!(
            "conda install -y -n {} {}",
            config.required_location()?,
            joined
        ),
        EnvironmentKind::Venv => format!("pip install {}", joined),
        EnvironmentKind::UvVenv => format!("uv pip install {}", joined),
    })
}

/// Python that reports, as one JSON line, whether each package imports
fn import_check_script(packages: &[String]) -> Result<String> {
    Ok(format!(
        r#"import importlib
import importlib.util
import json

PACKAGES = {packages}

results = {{}}
for name in PACKAGES:
    try:
        spec = importlib.util.find_spec(name)
        if spec is None:
            results[name] = {{"installed": False, "error": "Package not found"}}
            continue
        module = importlib.import_module(name)
        version = getattr(module, "__version__", None)
        location = getattr(module, "__file__", None)
        results[name] = {{
            "installed": True,
            "version": None if version is None else str(version),
            "location": location,
        }}
    except Exception as e:
        results[name] = {{"installed": False, "error": str(e)}}

print(json.dumps(results))
"#,
        packages = serde_json::to_string(packages)?
    ))
}

fn parse_check_output(stdout: &str) -> Result<BTreeMap<String, PackageStatus>> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| ToolError::Execution("package check produced no output".into()))?;
    serde_json::from_str(line.trim()).map_err(|e| {
        ToolError::Execution(format!("malformed package check output: {}", e))
    })
}
