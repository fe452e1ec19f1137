use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use axum_extra::{headers::Range, TypedHeader};
use axum_range::{KnownSize, Ranged};
use time::OffsetDateTime;
use tokio::fs::File;
use tracing::warn;

use crate::common::error::AppError;
use crate::infrastructure::storage::artifact_store::ArtifactId;
use crate::state::AppState;

const DOWNLOAD_DISPOSITION: &str = "attachment; filename=\"reversed_video.mp4\"";

#[derive(Clone, Copy)]
enum Disposition {
    Inline,
    Attachment,
}

/// Stream a reversed video
///
/// Honors `Range` so players can seek without fetching the whole file.
#[utoipa::path(
    get,
    path = "/api/video/{id}",
    params(
        ("id" = String, Path, description = "Artifact identifier")
    ),
    responses(
        (status = 200, description = "Full content"),
        (status = 206, description = "Partial content"),
        (status = 404, description = "Unknown or expired", body = crate::common::response::ErrorResponse),
        (status = 416, description = "Range not satisfiable")
    ),
    tag = "Video"
)]
pub async fn stream_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    range: Option<TypedHeader<Range>>,
) -> Result<Response, AppError> {
    serve_artifact(&state, &id, range, Disposition::Inline).await
}

/// Download a reversed video
///
/// Same bytes as the stream endpoint, with an attachment disposition so
/// browsers that cannot save blob URLs still offer a save dialog.
#[utoipa::path(
    get,
    path = "/api/video/{id}/download",
    params(
        ("id" = String, Path, description = "Artifact identifier")
    ),
    responses(
        (status = 200, description = "Full content as attachment"),
        (status = 206, description = "Partial content"),
        (status = 404, description = "Unknown or expired", body = crate::common::response::ErrorResponse)
    ),
    tag = "Video"
)]
pub async fn download_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    range: Option<TypedHeader<Range>>,
) -> Result<Response, AppError> {
    serve_artifact(&state, &id, range, Disposition::Attachment).await
}

async fn serve_artifact(
    state: &AppState,
    id: &str,
    range: Option<TypedHeader<Range>>,
    disposition: Disposition,
) -> Result<Response, AppError> {
    // Anything that is not a well-formed identifier cannot exist.
    let id: ArtifactId = id.parse().map_err(|_| AppError::NotFound)?;
    let artifact = state.store.get(&id).await.ok_or(AppError::NotFound)?;

    let file = match File::open(&artifact.path).await {
        Ok(f) => f,
        Err(e) => {
            warn!(artifact_id = %id, "Indexed artifact is unreadable: {}", e);
            return Err(AppError::NotFound);
        }
    };
    let body = KnownSize::file(file).await?;

    let mut response = Ranged::new(range.map(|TypedHeader(r)| r), body).into_response();

    let content_type = mime_guess::from_path(&artifact.path).first_or_octet_stream();
    let remaining = (artifact.expires_at(state.store.ttl()) - OffsetDateTime::now_utc())
        .whole_seconds()
        .max(0);

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content_type.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("private, max-age={remaining}")) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    headers.insert(
        header::CONTENT_DISPOSITION,
        match disposition {
            Disposition::Inline => HeaderValue::from_static("inline"),
            Disposition::Attachment => HeaderValue::from_static(DOWNLOAD_DISPOSITION),
        },
    );

    Ok(response)
}
