use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::settings::TranscoderSettings;

// Enough stderr to explain a failure without holding a whole ffmpeg log.
const STDERR_TAIL_LINES: usize = 40;

/// Terminal failure states of one transcoder run. Success is `Ok(())`.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("could not spawn transcoder: {0}")]
    Spawn(#[source] io::Error),

    #[error("lost track of transcoder process: {0}")]
    Wait(#[source] io::Error),

    #[error("transcoder exited with status {exit_code:?}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("transcoder exited cleanly but wrote no output")]
    OutputMissing,

    #[error("transcoder killed after {0:?}")]
    TimedOut(Duration),

    #[error("transcoder cancelled by its caller")]
    Cancelled,
}

/// The fixed argument set used for every reversal.
#[derive(Debug, Clone)]
pub struct ReverseProfile {
    threads: u32,
    preset: String,
    crf: u8,
    max_duration_secs: u32,
    max_height: u32,
}

impl ReverseProfile {
    pub fn from_settings(settings: &TranscoderSettings) -> Self {
        Self {
            threads: settings.threads,
            preset: settings.preset.clone(),
            crf: settings.crf,
            max_duration_secs: settings.max_duration_secs,
            max_height: settings.max_height,
        }
    }

    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            // The reverse filters buffer every frame, so cap how much is read.
            "-t".to_string(),
            self.max_duration_secs.to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vf".to_string(),
            format!("scale=-2:'min({},ih)',reverse", self.max_height),
            "-af".to_string(),
            "areverse".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-threads".to_string(),
            self.threads.to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

/// Supervises one transcoder child process per call.
#[derive(Clone)]
pub struct Transcoder {
    inner: Arc<TranscoderInner>,
}

struct TranscoderInner {
    program: PathBuf,
    profile: ReverseProfile,
    timeout: Duration,
}

impl Transcoder {
    pub fn new(settings: &TranscoderSettings, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(TranscoderInner {
                program: settings.program.clone(),
                profile: ReverseProfile::from_settings(settings),
                timeout,
            }),
        }
    }

    /// Runs the transcoder from `input` to `output` and reports exactly one
    /// terminal outcome. On deadline or `cancel` the child is killed and
    /// reaped before this returns; it is also killed if this future is dropped.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), TranscodeError> {
        let inner = &self.inner;
        let args = inner.profile.build_args(input, output);
        debug!("Spawning {} {}", inner.program.display(), args.join(" "));

        let mut child = Command::new(&inner.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("Failed to spawn {}: {}", inner.program.display(), e);
                TranscodeError::Spawn(e)
            })?;

        let pid = child.id();
        info!(?pid, input = %input.display(), "Transcoder running");

        let diagnostics = child.stderr.take().map(|stderr| tokio::spawn(collect_stderr(stderr)));

        let waited = tokio::select! {
            waited = tokio::time::timeout(inner.timeout, child.wait()) => Some(waited),
            _ = cancel.cancelled() => None,
        };

        let status = match waited {
            Some(Ok(status)) => status.map_err(TranscodeError::Wait)?,
            Some(Err(_)) => {
                warn!(?pid, "Transcoder exceeded {:?}, killing", inner.timeout);
                terminate(&mut child, pid, diagnostics).await;
                return Err(TranscodeError::TimedOut(inner.timeout));
            }
            None => {
                warn!(?pid, "Transcoder cancelled, killing");
                terminate(&mut child, pid, diagnostics).await;
                return Err(TranscodeError::Cancelled);
            }
        };

        let stderr = match diagnostics {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            warn!(?pid, exit_code = ?status.code(), "Transcoder failed:\n{}", stderr);
            return Err(TranscodeError::Failed {
                exit_code: status.code(),
                stderr,
            });
        }

        // A zero exit is not enough; the file has to be there too.
        if !fs::try_exists(output).await.unwrap_or(false) {
            warn!(?pid, output = %output.display(), "Transcoder exited 0 without output");
            return Err(TranscodeError::OutputMissing);
        }

        info!(?pid, "Transcoder finished");
        Ok(())
    }
}

// SIGKILL, then reap so the pid leaves the process table.
async fn terminate(child: &mut Child, pid: Option<u32>, diagnostics: Option<JoinHandle<String>>) {
    if let Err(e) = child.kill().await {
        error!(?pid, "Failed to kill transcoder: {}", e);
    }
    if let Some(task) = diagnostics {
        task.abort();
    }
}

async fn collect_stderr<R>(stderr: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "transcoder", "{}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}
