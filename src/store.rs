use crate::errors::{Result, ToolError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

const DEFAULT_BASE_NAME: &str = "code";

/// Script files kept under a single storage root.
///
/// New files are always created directly under the root. Paths handed back
/// in by callers for append/read/execute are used as given and are not
/// checked for containment.
#[derive(Debug, Clone)]
pub struct CodeStore {
    root: PathBuf,
}

impl CodeStore {
    /// Open the store, creating the root directory if it does not exist
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!("Code storage directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fresh `<base>_<8 hex>.py` name for a script
    pub fn generate_filename(base_name: Option<&str>) -> String {
        let base = base_name
            .map(sanitize_base_name)
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_NAME.to_string());
        format!("{}_{}.py", base, random_suffix())
    }

    /// Path a generated filename resolves to inside the root
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Write `content` to a newly named file and return its path
    pub async fn initialize(&self, content: &str, base_name: Option<&str>) -> Result<PathBuf> {
        let path = self.path_for(&Self::generate_filename(base_name));
        fs::write(&path, content).await?;
        Ok(path)
    }

    /// Append `content` to an existing file. Never creates the file.
    pub async fn append(&self, path: &Path, content: &str) -> Result<()> {
        ensure_exists(path).await?;
        let mut file = fs::OpenOptions::new().append(true).open(path).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn read(&self, path: &Path) -> Result<String> {
        ensure_exists(path).await?;
        Ok(fs::read_to_string(path).await?)
    }
}

pub(crate) async fn ensure_exists(path: &Path) -> Result<()> {
    if fs::try_exists(path).await? {
        Ok(())
    } else {
        Err(ToolError::NotFound(path.display().to_string()))
    }
}

fn sanitize_base_name(raw: &str) -> String {
    let name = Path::new(raw.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let name = match name.len().checked_sub(3) {
        Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".py") => {
            &name[..cut]
        }
        _ => name,
    };
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// First 8 hex digits of a v4 UUID
pub(crate) fn random_suffix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
