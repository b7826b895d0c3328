//! In-memory object store.
//!
//! Objects are held in a `tokio::sync::RwLock<HashMap<...>>` keyed by
//! `(bucket, key)`. Nothing survives a restart; this is the default for
//! single-host deployments and tests.

use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::RwLock;

use super::backend::{ObjectStore, PutObjectInfo, StoredObject};

type ObjectKey = (String, String);

/// In-memory object store.
#[derive(Default)]
pub struct MemoryObjectStore {
    buckets: RwLock<HashSet<String>>,
    objects: RwLock<HashMap<ObjectKey, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn ensure_bucket(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            self.buckets.write().await.insert(bucket);
            Ok(())
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<PutObjectInfo>> + Send + '_>> {
        let object_key = (bucket.to_string(), key.to_string());
        let content_type = content_type.to_string();
        Box::pin(async move {
            if !self.buckets.read().await.contains(&object_key.0) {
                anyhow::bail!("bucket does not exist: {}", object_key.0);
            }
            let size = data.len() as u64;
            self.objects
                .write()
                .await
                .insert(object_key, StoredObject { data, content_type });
            Ok(PutObjectInfo { size })
        })
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredObject>>> + Send + '_>> {
        let object_key = (bucket.to_string(), key.to_string());
        Box::pin(async move { Ok(self.objects.read().await.get(&object_key).cloned()) })
    }

    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let object_key = (bucket.to_string(), key.to_string());
        Box::pin(async move {
            self.objects.write().await.remove(&object_key);
            Ok(())
        })
    }
}
