//! Abstract object store trait.
//!
//! Every object store must implement [`ObjectStore`].  Video bytes and
//! generated thumbnails live here; the replica only keeps metadata.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// What the store reports back after a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutObjectInfo {
    /// Number of bytes stored.
    pub size: u64,
}

/// A stored object's data plus the content type it was written with.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Raw bytes of the object.
    pub data: Bytes,
    /// MIME type recorded at write time.
    pub content_type: String,
}

/// Async object storage contract.
pub trait ObjectStore: Send + Sync + 'static {
    /// Create `bucket` if it does not exist yet.
    fn ensure_bucket(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Write `data` to `bucket/key`, replacing any previous object.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<PutObjectInfo>> + Send + '_>>;

    /// Read the object at `bucket/key`, or `None` if there is none.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredObject>>> + Send + '_>>;

    /// Delete the object at `bucket/key`. Deleting a missing object is not an error.
    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}
