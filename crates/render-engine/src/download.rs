//! Download sinks: where finished exports are handed to the user.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use keepsake_common::error::{KeepsakeError, KeepsakeResult};

/// Persists a finished blob under a file name.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Save `blob` as `file_name` and return where it landed.
    async fn save(&self, file_name: &str, blob: &[u8]) -> KeepsakeResult<PathBuf>;
}

/// Writes downloads into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn save(&self, file_name: &str, blob: &[u8]) -> KeepsakeResult<PathBuf> {
        let name = Path::new(file_name);
        if name.file_name().map(|n| n != name.as_os_str()).unwrap_or(true) {
            return Err(KeepsakeError::config(format!(
                "download name must be a bare file name: {file_name}"
            )));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        // Partial writes never carry the final name.
        let partial = self.dir.join(format!(".{file_name}.part"));
        tokio::fs::write(&partial, blob).await?;
        tokio::fs::rename(&partial, &path).await?;

        tracing::info!(path = %path.display(), bytes = blob.len(), "Download saved");
        Ok(path)
    }
}
