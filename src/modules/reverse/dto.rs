use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReverseResponse {
    /// Inline playback URL, supports `Range` requests.
    pub video_url: String,
    /// Same bytes served as an attachment.
    pub download_url: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}
