use std::env;
use std::str::FromStr;
use tracing::warn;

pub enum EnvKey {
    ServerPort,
    LegacyPort,
    MaxUploadBytes,
    RequestTimeoutSecs,
    ProcessTimeoutSecs,
    ArtifactTtlSecs,
    SweepIntervalSecs,
    UploadDir,
    ArtifactDir,
    ArtifactRecovery,
    TranscoderBin,
    TranscoderThreads,
    TranscoderPreset,
    TranscoderCrf,
    TranscoderMaxDurationSecs,
    TranscoderMaxHeight,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::LegacyPort => "PORT",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::RequestTimeoutSecs => "REQUEST_TIMEOUT_SECS",
            EnvKey::ProcessTimeoutSecs => "PROCESS_TIMEOUT_SECS",
            EnvKey::ArtifactTtlSecs => "ARTIFACT_TTL_SECS",
            EnvKey::SweepIntervalSecs => "SWEEP_INTERVAL_SECS",
            EnvKey::UploadDir => "UPLOAD_DIR",
            EnvKey::ArtifactDir => "ARTIFACT_DIR",
            EnvKey::ArtifactRecovery => "ARTIFACT_RECOVERY",
            EnvKey::TranscoderBin => "TRANSCODER_BIN",
            EnvKey::TranscoderThreads => "TRANSCODER_THREADS",
            EnvKey::TranscoderPreset => "TRANSCODER_PRESET",
            EnvKey::TranscoderCrf => "TRANSCODER_CRF",
            EnvKey::TranscoderMaxDurationSecs => "TRANSCODER_MAX_DURATION_SECS",
            EnvKey::TranscoderMaxHeight => "TRANSCODER_MAX_HEIGHT",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    let name = key.as_str();
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or_else(|_| {
            warn!("Ignoring unparsable value {:?} for {}", val, name);
            default
        }),
        Err(_) => default,
    }
}
