//! Local filesystem object store.
//!
//! Objects are stored as flat files under `{root}/{bucket}/{key}`, with
//! their content type in a sidecar under `{root}/.meta/{bucket}/{key}`.
//!
//! All writes follow crash-only design: write to temp file, fsync, rename.

use bytes::Bytes;
use std::future::Future;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use super::backend::{ObjectStore, PutObjectInfo, StoredObject};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Stores objects on the local filesystem.
pub struct LocalObjectStore {
    /// Root directory for all stored objects.
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a new `LocalObjectStore` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join(".tmp"))?;
        std::fs::create_dir_all(root.join(".meta"))?;
        Ok(Self { root })
    }

    /// Reject anything that could escape the root directory.
    fn check_relative(part: &str) -> anyhow::Result<()> {
        if part.is_empty() {
            anyhow::bail!("empty path component");
        }
        for component in Path::new(part).components() {
            match component {
                Component::Normal(_) => {}
                _ => anyhow::bail!("Path traversal detected in storage key: {}", part),
            }
        }
        Ok(())
    }

    fn object_path(&self, bucket: &str, key: &str) -> anyhow::Result<PathBuf> {
        Self::check_relative(bucket)?;
        Self::check_relative(key)?;
        if bucket.starts_with('.') {
            anyhow::bail!("invalid bucket name: {}", bucket);
        }
        Ok(self.root.join(bucket).join(key))
    }

    fn meta_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(".meta").join(bucket).join(key)
    }

    /// Generate a temp file path under .tmp/ for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(".tmp").join(format!("tmp-{}", id))
    }

    fn write_atomic(&self, final_path: &Path, data: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.temp_path();
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, final_path)?;
        Ok(())
    }
}

impl ObjectStore for LocalObjectStore {
    fn ensure_bucket(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            Self::check_relative(&bucket)?;
            std::fs::create_dir_all(self.root.join(&bucket))?;
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
        let bucket = bucket.to_string();
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            let final_path = self.object_path(&bucket, &key)?;
            if !self.root.join(&bucket).is_dir() {
                anyhow::bail!("bucket does not exist: {}", bucket);
            }
            self.write_atomic(&final_path, &data)?;
            self.write_atomic(&self.meta_path(&bucket, &key), content_type.as_bytes())?;
            Ok(PutObjectInfo {
                size: data.len() as u64,
            })
        })
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredObject>>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let path = self.object_path(&bucket, &key)?;
            if !path.is_file() {
                return Ok(None);
            }
            let data = Bytes::from(std::fs::read(&path)?);
            let content_type = std::fs::read_to_string(self.meta_path(&bucket, &key))
                .unwrap_or_else(|_| DEFAULT_CONTENT_TYPE.to_string());
            Ok(Some(StoredObject { data, content_type }))
        })
    }

    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let path = self.object_path(&bucket, &key)?;
            for p in [path, self.meta_path(&bucket, &key)] {
                match std::fs::remove_file(&p) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (tempfile::TempDir, LocalObjectStore) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = LocalObjectStore::new(dir.path()).expect("failed to create store");
        store.ensure_bucket("videos").await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let (_dir, store) = test_store().await;
        let data = Bytes::from("hello world");
        let info = store
            .put_object("videos", "clip.mp4", data.clone(), "video/mp4")
            .await
            .unwrap();
        assert_eq!(info.size, 11);

        let obj = store.get_object("videos", "clip.mp4").await.unwrap().unwrap();
        assert_eq!(obj.data, data);
        assert_eq!(obj.content_type, "video/mp4");
    }

    #[tokio::test]
    async fn test_nested_keys_create_parent_dirs() {
        let (dir, store) = test_store().await;
        store
            .put_object("videos", "thumbnails/clip.jpg", Bytes::from("jpg"), "image/jpeg")
            .await
            .unwrap();
        assert!(dir.path().join("videos/thumbnails/clip.jpg").is_file());
        let obj = store
            .get_object("videos", "thumbnails/clip.jpg")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(obj.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_missing_object_is_none() {
        let (_dir, store) = test_store().await;
        assert!(store.get_object("videos", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, store) = test_store().await;
        let result = store
            .put_object("videos", "../../etc/passwd", Bytes::from("x"), "text/plain")
            .await;
        assert!(result.is_err());
        assert!(store.get_object("..", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_existing_and_missing() {
        let (_dir, store) = test_store().await;
        store
            .put_object("videos", "a", Bytes::from("data"), "text/plain")
            .await
            .unwrap();
        store.delete_object("videos", "a").await.unwrap();
        assert!(store.get_object("videos", "a").await.unwrap().is_none());
        store.delete_object("videos", "a").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_into_unknown_bucket_fails() {
        let (_dir, store) = test_store().await;
        let result = store
            .put_object("other", "a", Bytes::from("x"), "text/plain")
            .await;
        assert!(result.is_err());
    }
}
