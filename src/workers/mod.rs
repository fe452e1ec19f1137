use tokio::task::JoinHandle;
use tracing::error;

pub mod reclaimer;
pub mod transcoder;

/// Waits for a background worker to stop. Returns `false`, after logging,
/// if it panicked or was aborted instead of returning.
pub async fn join_worker(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!(worker = name, "Worker ended abnormally: {}", e);
            false
        }
    }
}
