//! Loader that fetches artifacts from a remote object store into a local cache

use super::{key_path, ModelLoader, S3ObjectSource};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use truegul_core::{Error, Result};

/// An object listed under a prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
}

/// Minimal object-store surface the remote loader needs
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Human readable location, e.g. `s3://bucket`
    fn describe(&self) -> String;

    /// Every object whose key starts with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// Write the object `key` to `dest`; the parent directory exists
    async fn download(&self, key: &str, dest: &Path) -> Result<()>;
}

/// Cache-first loader backed by an [`ObjectSource`].
///
/// Without a source it behaves like a local lookup that accepts files and
/// directories alike.
pub struct RemoteModelLoader {
    name: String,
    source: Option<Arc<dyn ObjectSource>>,
    local_dir: PathBuf,
}

impl RemoteModelLoader {
    /// Loader for an S3 bucket. An empty bucket, or a store that cannot be
    /// built from the environment, yields a disabled loader.
    pub fn s3(bucket: &str, local_dir: impl AsRef<Path>) -> Self {
        let local_dir = local_dir.as_ref().to_path_buf();

        if bucket.is_empty() {
            info!("S3ModelLoader initialized in local-only mode (no S3)");
            return Self::disabled("s3", local_dir);
        }

        match S3ObjectSource::new(bucket) {
            Ok(source) => {
                info!("S3ModelLoader initialized with bucket: {}", bucket);
                Self::with_source("s3", Arc::new(source), local_dir)
            }
            Err(e) => {
                warn!("S3ModelLoader disabled, could not build client for {}: {}", bucket, e);
                Self::disabled("s3", local_dir)
            }
        }
    }

    /// Loader over an arbitrary object source
    pub fn with_source(
        name: impl Into<String>,
        source: Arc<dyn ObjectSource>,
        local_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            name: name.into(),
            source: Some(source),
            local_dir: local_dir.as_ref().to_path_buf(),
        }
    }

    /// Loader that only ever consults its cache
    pub fn disabled(name: impl Into<String>, local_dir: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            source: None,
            local_dir: local_dir.as_ref().to_path_buf(),
        }
    }

    async fn download_file(&self, source: &dyn ObjectSource, key: &str, local_path: &Path) -> Result<()> {
        info!("Downloading {}/{} to {}", source.describe(), key, local_path.display());

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part_path = with_suffix(local_path, ".part");
        if let Err(e) = source.download(key, &part_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(e);
        }
        tokio::fs::rename(&part_path, local_path).await?;

        info!("Downloaded {} successfully", key);
        Ok(())
    }

    /// Fetch everything below `prefix`. Returns false when the prefix is empty.
    async fn download_directory(
        &self,
        source: &dyn ObjectSource,
        prefix: &str,
        local_path: &Path,
    ) -> Result<bool> {
        info!("Downloading {}/{}/ to {}", source.describe(), prefix, local_path.display());

        let objects = source.list(prefix).await?;
        let files: Vec<(&RemoteObject, &str)> = objects
            .iter()
            .filter(|object| !is_directory_marker(object, &objects))
            .filter_map(|object| relative_key(prefix, &object.key).map(|rel| (object, rel)))
            .collect();

        if files.is_empty() {
            warn!("No objects found under {}/{}/", source.describe(), prefix);
            return Ok(false);
        }

        let staging = staging_dir(local_path)?;
        if tokio::fs::try_exists(&staging).await? {
            tokio::fs::remove_dir_all(&staging).await?;
        }
        tokio::fs::create_dir_all(&staging).await?;

        for (object, relative) in files {
            let file_path = key_path(&staging, relative)?;
            if let Some(parent) = file_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            debug!("Downloading {} -> {}", object.key, file_path.display());
            if let Err(e) = source.download(&object.key, &file_path).await {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        }

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&staging, local_path).await?;

        info!("Downloaded {}/ successfully", prefix);
        Ok(true)
    }
}

#[async_trait]
impl ModelLoader for RemoteModelLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    async fn ensure_file(&self, key: &str) -> Result<Option<PathBuf>> {
        let local_path = key_path(&self.local_dir, key)?;

        if tokio::fs::try_exists(&local_path).await? {
            info!("Model file already exists at {}", local_path.display());
            return Ok(Some(local_path));
        }

        let Some(source) = &self.source else {
            info!("{} not enabled, file not found locally: {}", self.name, local_path.display());
            return Ok(None);
        };

        self.download_file(source.as_ref(), key.trim_matches('/'), &local_path)
            .await?;
        Ok(Some(local_path))
    }

    async fn ensure_directory(&self, key: &str) -> Result<Option<PathBuf>> {
        let local_path = key_path(&self.local_dir, key)?;

        if tokio::fs::try_exists(&local_path).await? {
            info!("Model directory already exists at {}", local_path.display());
            return Ok(Some(local_path));
        }

        let Some(source) = &self.source else {
            info!(
                "{} not enabled, directory not found locally: {}",
                self.name,
                local_path.display()
            );
            return Ok(None);
        };

        let fetched = self
            .download_directory(source.as_ref(), key.trim_matches('/'), &local_path)
            .await?;
        Ok(fetched.then_some(local_path))
    }
}

/// Trailing-slash keys, and empty objects standing in for a folder that has
/// other objects below it
fn is_directory_marker(object: &RemoteObject, all: &[RemoteObject]) -> bool {
    if object.key.ends_with('/') {
        return true;
    }

    if object.size == 0 {
        let as_dir = format!("{}/", object.key);
        return all.iter().any(|other| other.key.starts_with(&as_dir));
    }

    false
}

/// Path of `key` below `prefix`, `None` for the prefix itself or keys that
/// merely share its leading characters
fn relative_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    let relative = key.strip_prefix(prefix)?.strip_prefix('/')?;
    let relative = relative.trim_start_matches('/');
    (!relative.is_empty()).then_some(relative)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn staging_dir(local_path: &Path) -> Result<PathBuf> {
    let name = local_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::config(format!("invalid model path {}", local_path.display())))?;
    Ok(local_path.with_file_name(format!(".{}.partial", name)))
}
