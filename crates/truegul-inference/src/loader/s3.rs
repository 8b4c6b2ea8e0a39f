//! S3 object source built on `object_store`

use super::{ObjectSource, RemoteObject};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use truegul_core::{Error, Result};

/// S3 bucket client. Credentials and region come from the usual `AWS_*`
/// environment variables. Built once and reused for every request.
pub struct S3ObjectSource {
    bucket: String,
    store: AmazonS3,
}

impl S3ObjectSource {
    pub fn new(bucket: &str) -> Result<Self> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| Error::store(format!("failed to build S3 client for {}: {}", bucket, e)))?;

        Ok(Self {
            bucket: bucket.to_string(),
            store,
        })
    }
}

#[async_trait]
impl ObjectSource for S3ObjectSource {
    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let prefix = ObjectPath::from(prefix);
        let metas: Vec<_> = self
            .store
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(|e| Error::store(format!("failed to list {}/{}: {}", self.describe(), prefix, e)))?;

        Ok(metas
            .into_iter()
            .map(|meta| RemoteObject {
                key: meta.location.to_string(),
                size: meta.size as u64,
            })
            .collect())
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        let location = ObjectPath::from(key);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| Error::store(format!("failed to fetch {}/{}: {}", self.describe(), key, e)))?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut chunks = result.into_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk
                .map_err(|e| Error::store(format!("failed to read {}/{}: {}", self.describe(), key, e)))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}
