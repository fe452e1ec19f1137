//! Helpers shared by the in-crate tests: a throwaway workspace, scripted
//! stand-ins for ffmpeg and request builders for the router.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::app::create_app;
use crate::config::settings::{AppConfig, TranscoderSettings};
use crate::state::AppState;

const BOUNDARY: &str = "reverse-test-boundary";

/// Copies its input to its output, like a reversal that changes nothing.
pub const COPY_SCRIPT: &str = r#"cp "$input" "$last""#;

/// Writes an executable shell script that receives the transcoder argv.
/// `$input` holds the value after `-i` and `$last` the output path.
pub fn fake_transcoder(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\n\
         while [ $# -gt 0 ]; do\n\
         \x20 if [ \"$1\" = \"-i\" ]; then input=\"$2\"; fi\n\
         \x20 last=\"$1\"\n\
         \x20 shift\n\
         done\n\
         {body}\n"
    );
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

pub fn settings_for(program: &Path) -> TranscoderSettings {
    TranscoderSettings {
        program: program.to_path_buf(),
        ..TranscoderSettings::default()
    }
}

/// True while `pid` has an entry in the process table, zombies included.
#[cfg(target_os = "linux")]
pub fn process_exists(pid: &str) -> bool {
    Path::new(&format!("/proc/{}", pid.trim())).exists()
}

pub struct TestApp {
    pub root: TempDir,
    pub state: AppState,
    router: Router,
}

impl TestApp {
    pub fn new(transcoder_body: &str) -> Self {
        Self::with_config(transcoder_body, |_| {})
    }

    pub fn with_config(transcoder_body: &str, tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let upload_dir = root.path().join("uploads");
        let artifact_dir = root.path().join("artifacts");
        std::fs::create_dir_all(&upload_dir).unwrap();
        std::fs::create_dir_all(&artifact_dir).unwrap();

        let program = fake_transcoder(root.path(), "transcoder", transcoder_body);
        let mut config = AppConfig {
            upload_dir,
            artifact_dir,
            process_timeout_secs: 10,
            request_timeout_secs: 20,
            transcoder: settings_for(&program),
            ..AppConfig::default()
        };
        tweak(&mut config);

        let state = AppState::new(config);
        let router = create_app(state.clone());
        Self {
            root,
            state,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub fn upload_dir_is_empty(&self) -> bool {
        std::fs::read_dir(&self.state.config.upload_dir)
            .unwrap()
            .next()
            .is_none()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }
}

pub fn multipart_upload(field: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/api/reverse")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn video_upload(bytes: &[u8]) -> Request<Body> {
    multipart_upload("video", "clip.mp4", "video/mp4", bytes)
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
