//! Object storage sink built on the Apache Arrow `object_store` crate

use async_trait::async_trait;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{ObjectStore, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{DeliveryError, DeliveryReceipt, DeliverySink, Destination};
use crate::archive::{ArchiveArtifact, sanitize};
use crate::config::{StorageConfig, StorageProvider};

/// Stores each artifact under `{destination}/{artifact name}`
#[derive(Clone)]
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreSink {
    /// Wrap any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// In-memory storage for tests and dry runs
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Files under `root`, which is created if missing
    pub fn local(root: &Path) -> Result<Self, DeliveryError> {
        std::fs::create_dir_all(root)
            .map_err(|e| DeliveryError::Rejected(format!("cannot create {}: {e}", root.display())))?;
        let store = LocalFileSystem::new_with_prefix(root).map_err(map_store_error)?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, DeliveryError> {
        match config.provider {
            StorageProvider::Local => Self::local(&config.root),
            StorageProvider::Memory => Ok(Self::in_memory()),
        }
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub fn key_for(artifact_name: &str, destination: &Destination) -> String {
        format!("{}/{}", sanitize(destination.as_str()), artifact_name)
    }
}

#[async_trait]
impl DeliverySink for ObjectStoreSink {
    async fn deliver(
        &self,
        artifact: &ArchiveArtifact,
        destination: &Destination,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let key = Self::key_for(artifact.name(), destination);
        let data = artifact
            .bytes()
            .await
            .map_err(|e| DeliveryError::Rejected(format!("cannot read artifact: {e}")))?;
        let size = data.len() as u64;

        self.store
            .put(&StoragePath::from(key.as_str()), data.into())
            .await
            .map_err(map_store_error)?;

        info!(key, size, "Uploaded to storage");

        Ok(DeliveryReceipt {
            key,
            size,
            attempts: 0,
        })
    }
}

/// Backend hiccups surface as `Generic`; everything else will not improve on retry
fn map_store_error(error: object_store::Error) -> DeliveryError {
    match error {
        object_store::Error::Generic { .. } => DeliveryError::Network(error.to_string()),
        other => DeliveryError::Rejected(other.to_string()),
    }
}
