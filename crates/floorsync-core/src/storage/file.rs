//! Filesystem-backed key-value store.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::KeyValueStore;
use crate::{Error, Result};

/// Stores each key as `<data_dir>/<key>.json`.
///
/// Writes go to a sibling temp file that is renamed over the target, so a crash
/// mid-write leaves the previous blob intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `data_dir`. The directory is created on first save.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the full path for a key.
    pub fn path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.data_dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => {
                tracing::warn!("Failed to read {}: {}", path.display(), error);
                Err(error.into())
            }
        }
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, bytes).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        tracing::trace!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "storage key '{key}' must be non-empty and use only [A-Za-z0-9._-]"
        )))
    }
}
