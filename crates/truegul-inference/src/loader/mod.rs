//! Model resolution chain
//!
//! A [`ModelLoader`] turns a key such as `detector/chatgpt-detector-roberta`
//! into a path under its local directory. [`ModelLoaders`] asks the primary
//! loader first and the fallback only when the primary comes back empty.
//! Resolution is cache-first: once an artifact is on disk no loader touches the
//! network for it again.

mod local;
mod remote;
mod s3;

pub use local::LocalModelLoader;
pub use remote::{ObjectSource, RemoteModelLoader, RemoteObject};
pub use s3::S3ObjectSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::info;
use truegul_core::{Error, Result};

/// A source of model artifacts materialized on the local filesystem
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Loader name for logs
    fn name(&self) -> &str;

    /// Whether this loader can produce artifacts it does not already have on disk
    fn is_enabled(&self) -> bool;

    /// Local path of a single model file, `None` if it is not available
    async fn ensure_file(&self, key: &str) -> Result<Option<PathBuf>>;

    /// Local path of a model directory, `None` if it is not available
    async fn ensure_directory(&self, key: &str) -> Result<Option<PathBuf>>;
}

/// Supported loader kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelLoaderKind {
    /// Remote S3 bucket, cached under the local directory
    S3,
    /// Local directory only
    Local,
}

impl FromStr for ModelLoaderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "local" => Ok(Self::Local),
            other => Err(Error::config(format!("Unsupported model loader type: {}", other))),
        }
    }
}

/// Loader construction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLoaderConfig {
    /// `s3` or `local`
    #[serde(default = "default_loader_type")]
    pub loader_type: String,

    /// Bucket holding model artifacts; empty disables remote fetches
    #[serde(default)]
    pub bucket: String,

    /// Local cache / model directory
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
}

impl Default for ModelLoaderConfig {
    fn default() -> Self {
        Self {
            loader_type: default_loader_type(),
            bucket: String::new(),
            local_dir: default_local_dir(),
        }
    }
}

fn default_loader_type() -> String {
    "s3".to_string()
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("/app/models")
}

/// Primary loader plus optional fallback
pub struct ModelLoaders {
    primary: Box<dyn ModelLoader>,
    fallback: Option<Box<dyn ModelLoader>>,
}

impl ModelLoaders {
    /// Build a chain from explicit loaders
    pub fn new(primary: Box<dyn ModelLoader>, fallback: Option<Box<dyn ModelLoader>>) -> Self {
        Self { primary, fallback }
    }

    /// Build the chain described by configuration.
    ///
    /// Only an unknown loader kind fails; a remote loader that cannot reach its
    /// store is built disabled.
    pub fn from_config(config: &ModelLoaderConfig) -> Result<Self> {
        let kind: ModelLoaderKind = config.loader_type.parse()?;

        let loaders = match kind {
            ModelLoaderKind::S3 => Self::new(
                Box::new(RemoteModelLoader::s3(&config.bucket, &config.local_dir)),
                Some(Box::new(LocalModelLoader::new(&config.local_dir))),
            ),
            ModelLoaderKind::Local => {
                Self::new(Box::new(LocalModelLoader::new(&config.local_dir)), None)
            }
        };

        Ok(loaders)
    }

    pub fn primary(&self) -> &dyn ModelLoader {
        self.primary.as_ref()
    }

    pub fn fallback(&self) -> Option<&dyn ModelLoader> {
        self.fallback.as_deref()
    }

    /// Resolve a single file through the chain
    pub async fn ensure_file(&self, key: &str) -> Result<Option<PathBuf>> {
        if let Some(path) = self.primary.ensure_file(key).await? {
            return Ok(Some(path));
        }

        match &self.fallback {
            Some(fallback) => {
                info!(
                    "{} could not provide file {}, trying {}",
                    self.primary.name(),
                    key,
                    fallback.name()
                );
                fallback.ensure_file(key).await
            }
            None => Ok(None),
        }
    }

    /// Resolve a directory through the chain
    pub async fn ensure_directory(&self, key: &str) -> Result<Option<PathBuf>> {
        if let Some(path) = self.primary.ensure_directory(key).await? {
            return Ok(Some(path));
        }

        match &self.fallback {
            Some(fallback) => {
                info!(
                    "{} could not provide directory {}, trying {}",
                    self.primary.name(),
                    key,
                    fallback.name()
                );
                fallback.ensure_directory(key).await
            }
            None => Ok(None),
        }
    }
}

/// Join a model key below `root`, refusing keys that would escape it
pub(crate) fn key_path(root: &Path, key: &str) -> Result<PathBuf> {
    let relative = Path::new(key.trim_matches('/'));
    if relative.as_os_str().is_empty() {
        return Err(Error::config("model key is empty"));
    }

    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(Error::config(format!(
                    "model key {:?} must be a relative path without '..'",
                    key
                )))
            }
        }
    }

    Ok(root.join(relative))
}
