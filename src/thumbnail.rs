//! Thumbnail generation for uploaded videos.
//!
//! [`run_worker`] consumes `video_uploaded` messages, pulls the source video
//! from the object store, asks a [`ThumbnailGenerator`] for one frame and
//! stores it as `thumbnails/{stem}.jpg` in the same bucket.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::queue::{message_handler, MessageQueue, VIDEO_UPLOADED};
use crate::storage::backend::ObjectStore;

/// Extracts a still frame from a video.
pub trait ThumbnailGenerator: Send + Sync + 'static {
    /// Return a JPEG of the frame `at_second` seconds into `source`.
    fn extract_frame(
        &self,
        source: Bytes,
        at_second: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Bytes>> + Send + '_>>;
}

/// Runs the `ffmpeg` executable against a temporary copy of the video.
pub struct FfmpegThumbnailer {
    ffmpeg_path: PathBuf,
}

impl FfmpegThumbnailer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl ThumbnailGenerator for FfmpegThumbnailer {
    fn extract_frame(
        &self,
        source: Bytes,
        at_second: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Bytes>> + Send + '_>> {
        Box::pin(async move {
            // ffmpeg needs a seekable input for most containers.
            let dir = tempfile::tempdir()?;
            let input = dir.path().join("source");
            let output = dir.path().join("thumb.jpg");
            tokio::fs::write(&input, &source).await?;

            let offset = format_offset(at_second);
            let result = tokio::process::Command::new(&self.ffmpeg_path)
                .arg("-y")
                .args(["-loglevel", "error"])
                .arg("-ss")
                .arg(&offset)
                .arg("-i")
                .arg(&input)
                .args(["-frames:v", "1", "-q:v", "2"])
                .arg(&output)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| anyhow::anyhow!("ffmpeg: {e}"))?;

            if !result.status.success() {
                anyhow::bail!(
                    "ffmpeg: {} ({})",
                    result.status,
                    String::from_utf8_lossy(&result.stderr).trim()
                );
            }

            Ok(Bytes::from(tokio::fs::read(&output).await?))
        })
    }
}

/// `HH:MM:SS` for ffmpeg's `-ss`.
fn format_offset(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Body published on `video_uploaded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoUploaded {
    #[serde(default)]
    pub bucket: String,
    pub object: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: String,
}

/// File name of `object` without directories or its last extension.
pub fn object_stem(object: &str) -> String {
    let base = Path::new(object)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match base.rfind('.') {
        Some(idx) => base[..idx].to_string(),
        None => base,
    }
}

/// Object key of the thumbnail generated for `object`.
pub fn thumbnail_key(object: &str) -> String {
    format!("thumbnails/{}.jpg", object_stem(object))
}

/// Settings for [`run_worker`].
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Bucket used when a message does not name one.
    pub default_bucket: String,
    pub at_second: u32,
    /// Budget for one message, end to end.
    pub timeout: Duration,
}

/// Handle one `video_uploaded` message.
pub async fn process_upload(
    body: &[u8],
    store: &dyn ObjectStore,
    generator: &dyn ThumbnailGenerator,
    options: &WorkerOptions,
) -> anyhow::Result<String> {
    let msg: VideoUploaded = serde_json::from_slice(body)?;
    let bucket = if msg.bucket.is_empty() {
        options.default_bucket.clone()
    } else {
        msg.bucket
    };
    let thumb_key = thumbnail_key(&msg.object);

    info!(
        "creating thumbnail for s3://{}/{} -> {}",
        bucket, msg.object, thumb_key
    );

    let work = async {
        let source = store
            .get_object(&bucket, &msg.object)
            .await?
            .ok_or_else(|| anyhow::anyhow!("source object {} not found", msg.object))?;
        let frame = generator.extract_frame(source.data, options.at_second).await?;
        store
            .put_object(&bucket, &thumb_key, frame, "image/jpeg")
            .await?;
        anyhow::Ok(())
    };

    tokio::time::timeout(options.timeout, work)
        .await
        .map_err(|_| anyhow::anyhow!("thumbnail for {} timed out", msg.object))??;

    info!("thumbnail uploaded: s3://{}/{}", bucket, thumb_key);
    Ok(thumb_key)
}

/// Consume `video_uploaded` until `token` is cancelled.
pub fn run_worker(
    queue: &dyn MessageQueue,
    store: Arc<dyn ObjectStore>,
    generator: Arc<dyn ThumbnailGenerator>,
    options: WorkerOptions,
    token: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let options = Arc::new(options);
    let handler = message_handler(move |body| {
        let store = store.clone();
        let generator = generator.clone();
        let options = options.clone();
        async move {
            process_upload(&body, store.as_ref(), generator.as_ref(), &options)
                .await
                .map(|key| debug!("processed upload, thumbnail at {}", key))
        }
    });
    queue.consume(VIDEO_UPLOADED, handler, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InProcessQueue;
    use crate::storage::memory::MemoryObjectStore;

    /// Returns the first bytes of the source as the "frame".
    struct FakeGenerator;

    impl ThumbnailGenerator for FakeGenerator {
        fn extract_frame(
            &self,
            source: Bytes,
            at_second: u32,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Bytes>> + Send + '_>> {
            Box::pin(async move {
                let mut frame = format!("frame@{at_second}:").into_bytes();
                frame.extend_from_slice(&source[..source.len().min(4)]);
                Ok(Bytes::from(frame))
            })
        }
    }

    fn options() -> WorkerOptions {
        WorkerOptions {
            default_bucket: "videos".to_string(),
            at_second: 1,
            timeout: Duration::from_secs(5),
        }
    }

    async fn store_with_video() -> Arc<MemoryObjectStore> {
        let store = Arc::new(MemoryObjectStore::new());
        store.ensure_bucket("videos").await.unwrap();
        store
            .put_object(
                "videos",
                "1700000000_clip.mp4",
                Bytes::from_static(b"MP4DATA"),
                "video/mp4",
            )
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_object_stem_and_thumbnail_key() {
        assert_eq!(object_stem("1700000000_clip.mp4"), "1700000000_clip");
        assert_eq!(object_stem("dir/a.tar.gz"), "a.tar");
        assert_eq!(object_stem("noext"), "noext");
        assert_eq!(thumbnail_key("x/y/movie.mov"), "thumbnails/movie.jpg");
    }

    #[test]
    fn test_format_offset() {
        assert_eq!(format_offset(1), "00:00:01");
        assert_eq!(format_offset(3725), "01:02:05");
    }

    #[tokio::test]
    async fn test_process_upload_stores_thumbnail() {
        let store = store_with_video().await;
        let body = br#"{"bucket":"","object":"1700000000_clip.mp4"}"#;

        let key = process_upload(body, store.as_ref(), &FakeGenerator, &options())
            .await
            .unwrap();
        assert_eq!(key, "thumbnails/1700000000_clip.jpg");

        let thumb = store.get_object("videos", &key).await.unwrap().unwrap();
        assert_eq!(thumb.content_type, "image/jpeg");
        assert_eq!(thumb.data, Bytes::from_static(b"frame@1:MP4D"));
    }

    #[tokio::test]
    async fn test_process_upload_missing_source_fails() {
        let store = store_with_video().await;
        let body = br#"{"bucket":"videos","object":"gone.mp4"}"#;
        let err = process_upload(body, store.as_ref(), &FakeGenerator, &options())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gone.mp4"));
    }

    #[tokio::test]
    async fn test_worker_consumes_queue() {
        let store = store_with_video().await;
        let queue = InProcessQueue::new();
        let token = CancellationToken::new();
        let handle = run_worker(
            &queue,
            store.clone(),
            Arc::new(FakeGenerator),
            options(),
            token.clone(),
        )
        .unwrap();

        let msg = VideoUploaded {
            bucket: "videos".to_string(),
            object: "1700000000_clip.mp4".to_string(),
            size: 7,
            content_type: "video/mp4".to_string(),
        };
        queue
            .publish(VIDEO_UPLOADED, Bytes::from(serde_json::to_vec(&msg).unwrap()))
            .await
            .unwrap();

        let mut found = false;
        for _ in 0..200 {
            if store
                .get_object("videos", "thumbnails/1700000000_clip.jpg")
                .await
                .unwrap()
                .is_some()
            {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(found);

        token.cancel();
        handle.await.unwrap();
    }
}
