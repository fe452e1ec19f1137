use utoipa::OpenApi;

use crate::common::response::ErrorResponse;
use crate::modules::reverse::dto::ReverseResponse;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::reverse::handler::reverse_video,
        crate::modules::video::stream_handler::stream_video,
        crate::modules::video::stream_handler::download_video,
    ),
    components(
        schemas(ReverseResponse, ErrorResponse)
    ),
    tags(
        (name = "Reverse", description = "Upload a video and get it back reversed"),
        (name = "Video", description = "Playback and download of reversed videos")
    )
)]
pub struct ApiDoc;
