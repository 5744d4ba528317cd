use super::RecordingError;
use async_trait::async_trait;
use log::info;
use std::path::{Path, PathBuf};

/// Local persistence for finished recordings.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Save `data` under `name`, returning where it landed.
    async fn save(&self, name: &str, data: &[u8]) -> Result<PathBuf, RecordingError>;
}

/// Writes artifacts into one directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save(&self, name: &str, data: &[u8]) -> Result<PathBuf, RecordingError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, data).await?;
        info!("Saved recording ({} bytes) to {}", data.len(), path.display());
        Ok(path)
    }
}
