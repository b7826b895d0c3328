//! Video API handlers.
//!
//! Reads are served from the local catalogue on any replica. Writes go
//! through the leadership-gated mutations on [`ReplicaState`], so a
//! follower answers them with `503` and the client (normally the
//! gateway) is expected to retry against the leader.
//!
//! [`ReplicaState`]: crate::cluster::ReplicaState

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::Utc;
use garde::Validate;
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::cluster::VideoMetadata;
use crate::errors::ClusterError;
use crate::queue::VIDEO_UPLOADED;
use crate::thumbnail::{object_stem, thumbnail_key, VideoUploaded};
use crate::AppState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Partial update accepted by `PUT /videos/{id}`.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct VideoUpdate {
    #[garde(length(chars, min = 1, max = 256))]
    pub title: Option<String>,
    #[garde(skip)]
    pub resolutions: Option<Vec<String>>,
    #[garde(skip)]
    pub thumbnail_url: Option<String>,
}

impl VideoUpdate {
    fn apply(self, meta: &mut VideoMetadata) {
        if let Some(title) = self.title {
            meta.title = title;
        }
        if let Some(resolutions) = self.resolutions {
            meta.resolutions = resolutions;
        }
        if let Some(thumbnail_url) = self.thumbnail_url {
            meta.thumbnail_url = thumbnail_url;
        }
    }
}

/// The uploaded file as pulled out of the multipart form.
struct UploadedFile {
    file_name: String,
    content_type: String,
    data: Bytes,
}

async fn read_file_field(multipart: &mut Multipart) -> anyhow::Result<UploadedFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| anyhow::anyhow!("parse multipart form: {e}"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("read upload: {e}"))?;
        return Ok(UploadedFile {
            file_name,
            content_type,
            data,
        });
    }
    anyhow::bail!("missing form file 'file'")
}

/// Last path component of a client-supplied file name.
fn base_name(file_name: &str) -> String {
    FsPath::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "upload".to_string())
}

/// Strip a leading `<digits>_` timestamp prefix.
pub fn strip_timestamp_prefix(stem: &str) -> &str {
    match stem.split_once('_') {
        Some((prefix, rest)) if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) => {
            rest
        }
        _ => stem,
    }
}

// -- Handlers -----------------------------------------------------------------

/// `POST /upload` -- store a video and register its metadata.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "Videos",
    operation_id = "UploadVideo",
    responses(
        (status = 200, description = "Video stored", body = VideoMetadata),
        (status = 400, description = "Missing file or storage failure"),
        (status = 503, description = "Not the leader")
    )
)]
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<VideoMetadata>, ClusterError> {
    let upload = read_file_field(&mut multipart)
        .await
        .map_err(|e| ClusterError::InvalidRequest(format!("Upload failed: {e}")))?;

    let now = Utc::now();
    let bucket = state.bucket().to_string();
    let object = format!(
        "{}_{}",
        now.timestamp_nanos_opt().unwrap_or_default(),
        base_name(&upload.file_name)
    );

    let stored = state
        .store
        .put_object(&bucket, &object, upload.data, &upload.content_type)
        .await
        .map_err(|e| ClusterError::InvalidRequest(format!("Upload failed: put object: {e}")))?;

    let stem = object_stem(&object);
    let id = format!("{}_{}", now.timestamp(), stem);
    let meta = VideoMetadata {
        title: strip_timestamp_prefix(&stem).to_string(),
        thumbnail_url: format!("/videos/{id}/thumbnail"),
        id,
        bucket: bucket.clone(),
        object: object.clone(),
        size: stored.size,
        content_type: upload.content_type.clone(),
        uploaded_at: now,
        resolutions: vec!["original".to_string()],
    };

    if let Err(e) = state.replica.store_video_metadata(meta.clone()).await {
        if let Err(cleanup) = state.store.delete_object(&bucket, &object).await {
            warn!("Failed to remove orphaned upload {}: {:#}", object, cleanup);
        }
        return Err(e);
    }

    let event = VideoUploaded {
        bucket,
        object,
        size: stored.size,
        content_type: upload.content_type,
    };
    let body = serde_json::to_vec(&event)
        .map_err(|e| anyhow::anyhow!("Failed to encode message: {e}"))?;
    state
        .queue
        .publish(VIDEO_UPLOADED, Bytes::from(body))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to publish event: {e}"))?;

    info!("Uploaded video {} ({} bytes)", meta.id, meta.size);
    Ok(Json(meta))
}

/// `GET /videos` -- every record on this replica, unordered.
#[utoipa::path(
    get,
    path = "/videos",
    tag = "Videos",
    operation_id = "ListVideos",
    responses((status = 200, description = "All videos", body = Vec<VideoMetadata>))
)]
pub async fn list_videos(State(state): State<Arc<AppState>>) -> Json<Vec<VideoMetadata>> {
    Json(state.replica.list_videos().await)
}

/// `POST /videos` -- register a full metadata record.
#[utoipa::path(
    post,
    path = "/videos",
    tag = "Videos",
    operation_id = "CreateVideo",
    request_body = VideoMetadata,
    responses(
        (status = 201, description = "Stored", body = VideoMetadata),
        (status = 503, description = "Not the leader")
    )
)]
pub async fn create_video(
    State(state): State<Arc<AppState>>,
    Json(meta): Json<VideoMetadata>,
) -> Result<(StatusCode, Json<VideoMetadata>), ClusterError> {
    if meta.id.is_empty() {
        return Err(ClusterError::InvalidRequest("id must not be empty".to_string()));
    }
    state.replica.store_video_metadata(meta.clone()).await?;
    Ok((StatusCode::CREATED, Json(meta)))
}

/// `GET /videos/{id}`
#[utoipa::path(
    get,
    path = "/videos/{id}",
    tag = "Videos",
    operation_id = "GetVideo",
    params(("id" = String, Path, description = "Video id")),
    responses(
        (status = 200, description = "Video", body = VideoMetadata),
        (status = 404, description = "Unknown id")
    )
)]
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<VideoMetadata>, ClusterError> {
    Ok(Json(state.replica.get_video_metadata(&id).await?))
}

/// `PUT /videos/{id}` -- partial update.
#[utoipa::path(
    put,
    path = "/videos/{id}",
    tag = "Videos",
    operation_id = "UpdateVideo",
    params(("id" = String, Path, description = "Video id")),
    request_body = VideoUpdate,
    responses(
        (status = 200, description = "Updated", body = VideoMetadata),
        (status = 400, description = "Invalid update"),
        (status = 404, description = "Unknown id"),
        (status = 503, description = "Not the leader")
    )
)]
pub async fn update_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<VideoUpdate>,
) -> Result<Json<VideoMetadata>, ClusterError> {
    update
        .validate()
        .map_err(|report| ClusterError::InvalidRequest(report.to_string()))?;
    let meta = state
        .replica
        .update_video_metadata(&id, |meta| update.apply(meta))
        .await?;
    Ok(Json(meta))
}

/// `DELETE /videos/{id}` -- drop the record. The stored object is left
/// in place.
#[utoipa::path(
    delete,
    path = "/videos/{id}",
    tag = "Videos",
    operation_id = "DeleteVideo",
    params(("id" = String, Path, description = "Video id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown id"),
        (status = 503, description = "Not the leader")
    )
)]
pub async fn delete_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ClusterError> {
    state.replica.delete_video_metadata(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /videos/{id}/stream` -- the uploaded bytes.
#[utoipa::path(
    get,
    path = "/videos/{id}/stream",
    tag = "Videos",
    operation_id = "StreamVideo",
    params(("id" = String, Path, description = "Video id")),
    responses(
        (status = 200, description = "Video bytes"),
        (status = 404, description = "Unknown id or missing object")
    )
)]
pub async fn stream_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ClusterError> {
    let meta = state.replica.get_video_metadata(&id).await?;
    let object = state
        .store
        .get_object(&meta.bucket, &meta.object)
        .await?
        .ok_or(ClusterError::NotFound { id })?;
    Ok(([(header::CONTENT_TYPE, meta.content_type)], object.data).into_response())
}

/// `GET /videos/{id}/thumbnail` -- the generated JPEG, once the worker
/// has produced it.
#[utoipa::path(
    get,
    path = "/videos/{id}/thumbnail",
    tag = "Videos",
    operation_id = "GetThumbnail",
    params(("id" = String, Path, description = "Video id")),
    responses(
        (status = 200, description = "JPEG thumbnail"),
        (status = 404, description = "Unknown id or not generated yet")
    )
)]
pub async fn get_thumbnail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ClusterError> {
    let meta = state.replica.get_video_metadata(&id).await?;
    let thumb = state
        .store
        .get_object(&meta.bucket, &thumbnail_key(&meta.object))
        .await?
        .ok_or(ClusterError::NotFound { id })?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], thumb.data).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_timestamp_prefix() {
        assert_eq!(strip_timestamp_prefix("1700000000000000000_clip"), "clip");
        assert_eq!(strip_timestamp_prefix("1700_my_clip"), "my_clip");
        assert_eq!(strip_timestamp_prefix("my_clip"), "my_clip");
        assert_eq!(strip_timestamp_prefix("_clip"), "_clip");
        assert_eq!(strip_timestamp_prefix("clip"), "clip");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("clip.mp4"), "clip.mp4");
        assert_eq!(base_name("C/dir/clip.mp4"), "clip.mp4");
        assert_eq!(base_name(""), "upload");
    }

    #[test]
    fn test_update_validation() {
        let ok = VideoUpdate {
            title: Some("new".into()),
            ..VideoUpdate::default()
        };
        assert!(ok.validate().is_ok());

        let empty = VideoUpdate {
            title: Some(String::new()),
            ..VideoUpdate::default()
        };
        assert!(empty.validate().is_err());

        let long = VideoUpdate {
            title: Some("x".repeat(257)),
            ..VideoUpdate::default()
        };
        assert!(long.validate().is_err());

        assert!(VideoUpdate::default().validate().is_ok());
    }

    #[test]
    fn test_update_apply_only_touches_given_fields() {
        let mut meta = crate::cluster::replica::sample_video("v1");
        let before = meta.clone();
        VideoUpdate {
            resolutions: Some(vec!["original".into(), "720p".into()]),
            ..VideoUpdate::default()
        }
        .apply(&mut meta);
        assert_eq!(meta.title, before.title);
        assert_eq!(meta.resolutions, vec!["original", "720p"]);
    }
}
