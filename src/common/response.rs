use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

/// Body of every failed API call.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human readable explanation, safe to show to the user.
    pub error: String,
    /// Machine readable reason, e.g. `invalid_input` or `timeout`.
    pub code: String,
}

pub struct ApiSuccess<T>(pub T, pub StatusCode);

impl<T> IntoResponse for ApiSuccess<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let (body, status) = (self.0, self.1);
        (status, Json(body)).into_response()
    }
}

pub struct ApiError(pub String, pub &'static str, pub StatusCode);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (message, code, status) = (self.0, self.1, self.2);
        let response = ErrorResponse {
            error: message,
            code: code.to_string(),
        };
        (status, Json(response)).into_response()
    }
}
