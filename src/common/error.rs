use std::io;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::common::response::ApiError;
use crate::workers::transcoder::TranscodeError;

/// Every way a request can fail. Internal detail stays in the variant for
/// logging; [`AppError::public_message`] is what the caller sees.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to start transcoder: {0}")]
    ProcessSpawn(#[source] io::Error),

    #[error("transcoder exited with status {exit_code:?}")]
    ProcessFailure {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("transcoder exited successfully but produced no output")]
    OutputMissing,

    #[error("processing exceeded {0:?}")]
    Timeout(Duration),

    #[error("artifact not found")]
    NotFound,

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ProcessSpawn(_)
            | AppError::ProcessFailure { .. }
            | AppError::OutputMissing
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::ProcessSpawn(_) => "process_spawn_failed",
            AppError::ProcessFailure { .. } => "process_failed",
            AppError::OutputMissing => "output_missing",
            AppError::Timeout(_) => "timeout",
            AppError::NotFound => "not_found",
            AppError::Io(_) | AppError::Internal(_) => "internal_error",
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidInput(reason) => reason.clone(),
            AppError::ProcessSpawn(_) => "The video processor could not be started.".to_string(),
            AppError::ProcessFailure { .. } => {
                "Video processing failed. Check the file format and size.".to_string()
            }
            AppError::OutputMissing => "Video processing produced no output file.".to_string(),
            AppError::Timeout(_) => {
                "Processing timed out. The video may be too long or too large.".to_string()
            }
            AppError::NotFound => "Video not found or expired.".to_string(),
            AppError::Io(_) | AppError::Internal(_) => "Internal server error.".to_string(),
        }
    }
}

impl From<TranscodeError> for AppError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::Spawn(e) => AppError::ProcessSpawn(e),
            TranscodeError::Wait(e) => AppError::Io(e),
            TranscodeError::Failed { exit_code, stderr } => {
                AppError::ProcessFailure { exit_code, stderr }
            }
            TranscodeError::OutputMissing => AppError::OutputMissing,
            TranscodeError::TimedOut(limit) => AppError::Timeout(limit),
            TranscodeError::Cancelled => AppError::Internal("transcoder cancelled".to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::ProcessFailure { exit_code, stderr } => {
                error!(?exit_code, %stderr, "Request failed: transcoder error");
            }
            e if status.is_server_error() => error!("Request failed: {}", e),
            e => warn!("Request rejected: {}", e),
        }
        ApiError(self.public_message(), self.code(), status).into_response()
    }
}
