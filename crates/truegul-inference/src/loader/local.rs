//! Loader for artifacts already present in a local directory

use super::{key_path, ModelLoader};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;
use truegul_core::Result;

/// Looks up keys under a local directory; never fetches anything
#[derive(Debug, Clone)]
pub struct LocalModelLoader {
    local_dir: PathBuf,
}

impl LocalModelLoader {
    pub fn new(local_dir: impl AsRef<Path>) -> Self {
        let local_dir = local_dir.as_ref().to_path_buf();
        info!("LocalModelLoader initialized with local_dir: {}", local_dir.display());
        Self { local_dir }
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }
}

#[async_trait]
impl ModelLoader for LocalModelLoader {
    fn name(&self) -> &str {
        "local"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn ensure_file(&self, key: &str) -> Result<Option<PathBuf>> {
        let local_path = key_path(&self.local_dir, key)?;

        match tokio::fs::metadata(&local_path).await {
            Ok(meta) if meta.is_file() => {
                info!("Model file found at {}", local_path.display());
                Ok(Some(local_path))
            }
            _ => {
                info!("Model file not found: {}", local_path.display());
                Ok(None)
            }
        }
    }

    async fn ensure_directory(&self, key: &str) -> Result<Option<PathBuf>> {
        let local_path = key_path(&self.local_dir, key)?;

        match tokio::fs::metadata(&local_path).await {
            Ok(meta) if meta.is_dir() => {
                info!("Model directory found at {}", local_path.display());
                Ok(Some(local_path))
            }
            _ => {
                info!("Model directory not found: {}", local_path.display());
                Ok(None)
            }
        }
    }
}
