use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub mod stream_handler;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/video/{id}", get(stream_handler::stream_video))
        .route("/video/{id}/download", get(stream_handler::download_video))
}
