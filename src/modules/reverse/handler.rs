use axum::{
    extract::{Multipart, State},
    http::StatusCode,
};
use tracing::info;

use super::dto::ReverseResponse;
use super::job::Job;
use super::service::ReverseService;
use crate::common::error::AppError;
use crate::common::response::ApiSuccess;
use crate::common::upload::{multipart_error, stream_to_file};
use crate::state::AppState;

pub const VIDEO_FIELD: &str = "video";

/// Reverse an uploaded video
///
/// Accepts one `video` field, runs the transcoder and answers with the URLs
/// of the reversed artifact.
#[utoipa::path(
    post,
    path = "/api/reverse",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Video reversed", body = ReverseResponse),
        (status = 400, description = "Missing, invalid or oversized upload", body = crate::common::response::ErrorResponse),
        (status = 500, description = "Processing failed", body = crate::common::response::ErrorResponse),
        (status = 504, description = "Processing timed out", body = crate::common::response::ErrorResponse)
    ),
    tag = "Reverse"
)]
pub async fn reverse_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<ApiSuccess<ReverseResponse>, AppError> {
    let limit = state.config.max_upload_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let (job, outcome) = Job::new(&state.config.upload_dir);
        info!(job_id = %job.id, "Receiving upload");

        if let Err(e) = stream_to_file(field, &job.input, limit).await {
            job.cleanup().await;
            return Err(e);
        }

        let response = ReverseService::reverse(state, job, outcome).await?;
        return Ok(ApiSuccess(response, StatusCode::OK));
    }

    Err(AppError::InvalidInput("No video file was uploaded.".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        body_bytes, body_json, multipart_upload, video_upload, TestApp, COPY_SCRIPT,
    };

    #[tokio::test]
    async fn successful_job_returns_artifact_and_leaves_no_temp_files() {
        let app = TestApp::new(COPY_SCRIPT);
        let payload = b"pretend this is an mp4".to_vec();

        let response = app.send(video_upload(&payload)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let video_url = json["videoUrl"].as_str().unwrap().to_string();
        assert!(video_url.starts_with("/api/video/"));
        assert_eq!(json["downloadUrl"], format!("{video_url}/download"));
        assert!(json["message"].is_string());
        assert!(json["expiresAt"].is_string());

        assert!(app.upload_dir_is_empty());

        let fetched = app.get(&video_url).await;
        assert_eq!(fetched.status(), StatusCode::OK);
        assert_eq!(body_bytes(fetched).await, payload);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_without_running_the_transcoder() {
        let marker_body = "touch \"$(dirname \"$0\")/invoked\"\ncp \"$input\" \"$last\"";
        let app = TestApp::with_config(marker_body, |config| config.max_upload_bytes = 16);

        let response = app.send(video_upload(&[7u8; 64])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "invalid_input");

        assert!(!app.path("invoked").exists());
        assert!(app.upload_dir_is_empty());
    }

    #[tokio::test]
    async fn missing_video_field_is_invalid_input() {
        let app = TestApp::new(COPY_SCRIPT);

        let response = app
            .send(multipart_upload("attachment", "clip.mp4", "video/mp4", b"data"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "invalid_input");
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn non_video_upload_is_invalid_input() {
        let app = TestApp::new(COPY_SCRIPT);

        let response = app
            .send(multipart_upload("video", "notes.txt", "text/plain", b"hello"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.upload_dir_is_empty());
    }

    #[tokio::test]
    async fn empty_upload_is_invalid_input() {
        let app = TestApp::new(COPY_SCRIPT);

        let response = app.send(video_upload(b"")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.upload_dir_is_empty());
    }

    #[tokio::test]
    async fn transcoder_failure_is_generic_500_and_cleans_up() {
        let app = TestApp::new("echo '/secret/path: Invalid data found' >&2\nexit 1");

        let response = app.send(video_upload(b"garbage")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["code"], "process_failed");
        assert!(!json["error"].as_str().unwrap().contains("secret"));
        assert!(app.upload_dir_is_empty());
        assert_eq!(app.state.store.len().await, 0);
    }

    #[tokio::test]
    async fn zero_exit_without_output_is_500() {
        let app = TestApp::new("exit 0");

        let response = app.send(video_upload(b"frames")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["code"], "output_missing");
        assert!(app.upload_dir_is_empty());
    }

    #[tokio::test]
    async fn spawn_failure_is_its_own_500() {
        let app = TestApp::with_config(COPY_SCRIPT, |config| {
            config.transcoder.program = config.upload_dir.join("no-such-ffmpeg");
        });

        let response = app.send(video_upload(b"frames")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["code"], "process_spawn_failed");
        assert!(app.upload_dir_is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn hung_transcoder_yields_504_and_is_killed() {
        let body = "echo $$ > \"$(dirname \"$0\")/pid\"\nexec sleep 30";
        let app = TestApp::with_config(body, |config| {
            config.process_timeout_secs = 1;
            config.request_timeout_secs = 5;
        });

        let response = app.send(video_upload(b"frames")).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_json(response).await["code"], "timeout");
        assert!(app.upload_dir_is_empty());

        let pid = std::fs::read_to_string(app.path("pid")).unwrap();
        assert!(!crate::test_support::process_exists(&pid));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn request_deadline_before_process_deadline_still_reaps_the_child() {
        let body = "echo $$ > \"$(dirname \"$0\")/pid\"\nexec sleep 30";
        let app = TestApp::with_config(body, |config| {
            config.request_timeout_secs = 1;
            config.process_timeout_secs = 20;
        });

        let started = std::time::Instant::now();
        let response = app.send(video_upload(b"frames")).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_json(response).await["code"], "timeout");
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert!(app.upload_dir_is_empty());

        let pid = std::fs::read_to_string(app.path("pid")).unwrap();
        assert!(!crate::test_support::process_exists(&pid));
    }

    #[tokio::test]
    async fn concurrent_jobs_get_independent_artifacts() {
        let app = std::sync::Arc::new(TestApp::new(COPY_SCRIPT));

        let uploads = (0..10u8).map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let payload = vec![i; 1024 + i as usize];
                let response = app.send(video_upload(&payload)).await;
                assert_eq!(response.status(), StatusCode::OK);
                let url = body_json(response).await["videoUrl"]
                    .as_str()
                    .unwrap()
                    .to_string();
                (payload, url)
            })
        });

        let mut urls = std::collections::HashSet::new();
        for upload in uploads.collect::<Vec<_>>() {
            let (payload, url) = upload.await.unwrap();
            assert!(urls.insert(url.clone()), "duplicate artifact url {url}");
            let fetched = app.get(&url).await;
            assert_eq!(body_bytes(fetched).await, payload);
        }

        assert_eq!(app.state.store.len().await, 10);
        assert!(app.upload_dir_is_empty());
    }
}
