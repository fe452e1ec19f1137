use std::borrow::Cow;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::config::env::{self, EnvKey};

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// What to do with artifact files found on disk at startup.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPolicy {
    /// Re-index surviving files, using their modification time as creation time.
    #[default]
    Rebuild,
    /// Delete every surviving file.
    Discard,
}

impl FromStr for RecoveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rebuild" => Ok(Self::Rebuild),
            "discard" => Ok(Self::Discard),
            other => Err(format!("unknown recovery policy: {other}")),
        }
    }
}

/// Resource caps handed to the transcoder on every invocation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct TranscoderSettings {
    pub program: PathBuf,
    #[validate(range(min = 1, max = 64))]
    pub threads: u32,
    #[validate(length(min = 1))]
    pub preset: String,
    #[validate(range(max = 51))]
    pub crf: u8,
    #[validate(range(min = 1))]
    pub max_duration_secs: u32,
    #[validate(range(min = 16))]
    pub max_height: u32,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            threads: 2,
            preset: "ultrafast".to_string(),
            crf: 28,
            max_duration_secs: 60,
            max_height: 720,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_deadlines"))]
pub struct AppConfig {
    pub server_port: u16,
    #[validate(range(min = 1))]
    pub max_upload_bytes: u64,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub process_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub artifact_ttl_secs: u64,
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,
    pub upload_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub recovery: RecoveryPolicy,
    #[validate(nested)]
    pub transcoder: TranscoderSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            request_timeout_secs: 300,
            process_timeout_secs: 290,
            artifact_ttl_secs: 3600,
            sweep_interval_secs: 300,
            upload_dir: PathBuf::from("uploads"),
            artifact_dir: PathBuf::from("artifacts"),
            recovery: RecoveryPolicy::Rebuild,
            transcoder: TranscoderSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let transcoder = TranscoderSettings {
            program: PathBuf::from(env::get_or(EnvKey::TranscoderBin, "ffmpeg")),
            threads: env::get_parsed(EnvKey::TranscoderThreads, defaults.transcoder.threads),
            preset: env::get_or(EnvKey::TranscoderPreset, &defaults.transcoder.preset),
            crf: env::get_parsed(EnvKey::TranscoderCrf, defaults.transcoder.crf),
            max_duration_secs: env::get_parsed(
                EnvKey::TranscoderMaxDurationSecs,
                defaults.transcoder.max_duration_secs,
            ),
            max_height: env::get_parsed(EnvKey::TranscoderMaxHeight, defaults.transcoder.max_height),
        };

        let config = Self {
            server_port: env::get_parsed(
                EnvKey::ServerPort,
                env::get_parsed(EnvKey::LegacyPort, defaults.server_port),
            ),
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, defaults.max_upload_bytes),
            request_timeout_secs: env::get_parsed(
                EnvKey::RequestTimeoutSecs,
                defaults.request_timeout_secs,
            ),
            process_timeout_secs: env::get_parsed(
                EnvKey::ProcessTimeoutSecs,
                defaults.process_timeout_secs,
            ),
            artifact_ttl_secs: env::get_parsed(EnvKey::ArtifactTtlSecs, defaults.artifact_ttl_secs),
            sweep_interval_secs: env::get_parsed(
                EnvKey::SweepIntervalSecs,
                defaults.sweep_interval_secs,
            ),
            upload_dir: PathBuf::from(env::get_or(EnvKey::UploadDir, "uploads")),
            artifact_dir: PathBuf::from(env::get_or(EnvKey::ArtifactDir, "artifacts")),
            recovery: env::get_parsed(EnvKey::ArtifactRecovery, defaults.recovery),
            transcoder,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// The transcoder must be killed before the caller's own deadline fires,
// otherwise the client sees a dropped connection instead of a 504.
fn validate_deadlines(config: &AppConfig) -> Result<(), ValidationError> {
    if config.process_timeout_secs >= config.request_timeout_secs {
        return Err(ValidationError::new("deadline_order").with_message(Cow::Owned(format!(
            "PROCESS_TIMEOUT_SECS ({}) must be shorter than REQUEST_TIMEOUT_SECS ({})",
            config.process_timeout_secs, config.request_timeout_secs
        ))));
    }
    Ok(())
}
