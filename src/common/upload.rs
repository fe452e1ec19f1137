use std::path::Path;

use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use crate::common::error::AppError;

const MIB: u64 = 1024 * 1024;

pub fn too_large(limit: u64) -> AppError {
    let readable = if limit >= MIB {
        format!("{} MB", limit / MIB)
    } else {
        format!("{limit} bytes")
    };
    AppError::InvalidInput(format!("File is too large. Upload at most {readable}."))
}

pub fn multipart_error(err: MultipartError, limit: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large(limit);
    }
    AppError::InvalidInput(format!("Malformed upload: {}", err.body_text()))
}

/// Accepts `video/*`, or a generic content type when the file name looks
/// like a video (some mobile browsers send `application/octet-stream`).
fn is_video(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    let declared = content_type.and_then(|ct| ct.parse::<mime::Mime>().ok());
    match declared {
        Some(m) if m.type_() == mime::VIDEO => true,
        Some(m) if m != mime::APPLICATION_OCTET_STREAM => false,
        _ => file_name
            .and_then(|name| mime_guess::from_path(name).first())
            .is_some_and(|m| m.type_() == mime::VIDEO),
    }
}

/// Streams one multipart field to `dest`, enforcing `limit` bytes.
/// A partially written file is left for the caller's cleanup.
pub async fn stream_to_file(mut field: Field<'_>, dest: &Path, limit: u64) -> Result<u64, AppError> {
    if !is_video(field.content_type(), field.file_name()) {
        return Err(AppError::InvalidInput(
            "Invalid file type: only video files are accepted.".to_string(),
        ));
    }

    let file_name = field.file_name().unwrap_or("video").to_string();
    let mut file = File::create(dest).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!("Stream error: {}", e);
                return Err(multipart_error(e, limit));
            }
        };

        written += chunk.len() as u64;
        if written > limit {
            return Err(too_large(limit));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;

    if written == 0 {
        return Err(AppError::InvalidInput("The uploaded file is empty.".to_string()));
    }

    info!("Received upload {} ({} bytes)", file_name, written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_declared_video_types() {
        assert!(is_video(Some("video/mp4"), None));
        assert!(is_video(Some("video/quicktime"), Some("IMG_0001.MOV")));
    }

    #[test]
    fn falls_back_to_file_name_for_generic_types() {
        assert!(is_video(Some("application/octet-stream"), Some("clip.mp4")));
        assert!(is_video(None, Some("clip.webm")));
        assert!(!is_video(None, Some("notes.txt")));
        assert!(!is_video(None, None));
    }

    #[test]
    fn rejects_other_declared_types() {
        assert!(!is_video(Some("image/png"), Some("clip.mp4")));
        assert!(!is_video(Some("text/plain"), None));
    }
}
