use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::state::AppState;

pub mod dto;
pub mod handler;
pub mod job;
pub mod service;

// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub fn router(state: AppState) -> Router<AppState> {
    let body_limit = state
        .config
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD)
        .try_into()
        .unwrap_or(usize::MAX);

    Router::new().route(
        "/reverse",
        post(handler::reverse_video).layer(DefaultBodyLimit::max(body_limit)),
    )
}
