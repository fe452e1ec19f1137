use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::fs;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::workers::transcoder::TranscodeError;

/// The ways a job can come to an end. Whichever is reported first decides
/// the response.
#[derive(Debug)]
pub enum JobSignal {
    Exited(Result<(), TranscodeError>),
    DeadlineElapsed,
}

/// One upload-to-artifact attempt. Owns its temporary input and output
/// files until cleanup; both are removed at the latest when the last handle
/// to the job is dropped.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub input: PathBuf,
    pub output: PathBuf,
    // Taken by the first signal; `None` means a response is already decided.
    outcome: Mutex<Option<oneshot::Sender<JobSignal>>>,
}

impl Job {
    /// Allocates private paths under `upload_dir`. The receiver yields the
    /// first signal passed to [`Job::settle`].
    pub fn new(upload_dir: &Path) -> (Arc<Self>, oneshot::Receiver<JobSignal>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let job = Self {
            id,
            input: upload_dir.join(format!("{id}.upload")),
            output: upload_dir.join(format!("{id}_reversed.mp4")),
            outcome: Mutex::new(Some(tx)),
        };
        (Arc::new(job), rx)
    }

    /// Reports a terminal signal. Returns `true` if this signal decided the
    /// job. A winner nobody is waiting for cleans up; a losing signal leaves
    /// the files to whoever handles the winning one.
    pub async fn settle(&self, signal: JobSignal) -> bool {
        let sender = match self.outcome.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match sender {
            Some(tx) => {
                if let Err(signal) = tx.send(signal) {
                    debug!(job_id = %self.id, ?signal, "Caller went away, discarding result");
                    self.cleanup().await;
                }
                true
            }
            None => {
                debug!(job_id = %self.id, ?signal, "Job already settled, discarding signal");
                false
            }
        }
    }

    /// Removes the temporary input and output. Safe to call repeatedly.
    pub async fn cleanup(&self) {
        for path in [&self.input, &self.output] {
            match fs::remove_file(path).await {
                Ok(()) => debug!(job_id = %self.id, path = %path.display(), "Removed temp file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(job_id = %self.id, path = %path.display(), "Cleanup failed: {}", e),
            }
        }
    }
}

/// Creates the upload directory, deleting anything left in it. Jobs never
/// survive a restart, so every file found here is an orphan.
pub async fn purge_upload_dir(dir: &Path) -> io::Result<usize> {
    fs::create_dir_all(dir).await?;

    let mut purged = 0;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => purged += 1,
            Err(e) => warn!(path = %entry.path().display(), "Failed to purge stale upload: {}", e),
        }
    }
    Ok(purged)
}

impl Drop for Job {
    fn drop(&mut self) {
        for path in [&self.input, &self.output] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(job_id = %self.id, path = %path.display(), "Cleanup on drop failed: {}", e);
                }
            }
        }
    }
}
