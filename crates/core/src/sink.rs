//! Where snapshots end up.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Persists captured snapshots.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Store `contents` under `file_name`, returning where it went.
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot cannot be written.
    async fn persist(&self, file_name: &str, contents: &str) -> Result<PathBuf>;
}

/// Writes each snapshot as its own file in one directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Use `root`, creating it (and its parents) if absent.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::directory_creation_failed(&root, e.to_string()))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SnapshotSink for DirectorySink {
    async fn persist(&self, file_name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.root.join(file_name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| Error::file_write_failed(&path, e.to_string()))?;
        Ok(path)
    }
}
