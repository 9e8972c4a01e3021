//! `object_store` backed artifact storage.

use async_trait::async_trait;
use deployio_config::ObjectStoreConfig;
use deployio_core::Result;
use deployio_core::artifact::{ARTIFACT_CONTENT_TYPE, ArtifactStore};
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectMeta, ObjectStore, PutOptions, PutPayload};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{PublishError, PublishResult};

/// Artifact storage in a single bucket, keyed `{project}/{relative path}`.
pub struct ObjectArtifactStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectArtifactStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Connect to an S3-compatible bucket (AWS, MinIO, ...).
    pub fn s3(config: &ObjectStoreConfig) -> PublishResult<Self> {
        let store = AmazonS3Builder::new()
            .with_endpoint(config.endpoint.as_str().trim_end_matches('/'))
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region)
            .with_allow_http(config.allow_http)
            .build()?;
        info!(bucket = %config.bucket, endpoint = %config.endpoint, "Object store configured");
        Ok(Self::new(Arc::new(store)))
    }
}

fn parse_key(key: &str) -> PublishResult<ObjectPath> {
    ObjectPath::parse(key).map_err(|e| PublishError::InvalidKey {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl ArtifactStore for ObjectArtifactStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = parse_key(prefix)?;
        let objects: Vec<ObjectMeta> = self
            .store
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(PublishError::from)?;
        Ok(objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect())
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        debug!(key = %key, bytes = bytes.len(), "Uploading artifact");

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, ARTIFACT_CONTENT_TYPE.into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&ObjectPath::from(key), PutPayload::from(bytes), options)
            .await
            .map_err(PublishError::from)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store
            .delete(&parse_key(key)?)
            .await
            .map_err(PublishError::from)?;
        Ok(())
    }
}
