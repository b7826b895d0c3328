//! Object storage for uploaded videos and generated thumbnails.
//!
//! The [`backend::ObjectStore`] trait abstracts over where bytes
//! physically live: process memory, local disk, or an S3-compatible
//! service such as MinIO.

pub mod backend;
pub mod local;
pub mod memory;
pub mod s3;

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;
use backend::ObjectStore;

/// Build the configured object store and make sure its bucket exists.
pub async fn build_object_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config.backend.as_str() {
        "s3" | "minio" => Arc::new(s3::S3ObjectStore::new(&config.s3).await?),
        "local" => {
            let root = &config.local.root_dir;
            let store = local::LocalObjectStore::new(root)?;
            info!("Local object store initialized at {}", root);
            Arc::new(store)
        }
        "memory" => {
            info!("In-memory object store initialized");
            Arc::new(memory::MemoryObjectStore::new())
        }
        other => anyhow::bail!("unknown storage.backend '{other}'"),
    };

    store.ensure_bucket(&config.bucket).await?;
    Ok(store)
}
