use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::infrastructure::storage::artifact_store::ArtifactStore;

/// Periodically evicts expired artifacts until `shutdown` is cancelled.
pub async fn start_reclamation_worker(
    store: ArtifactStore,
    every: Duration,
    shutdown: CancellationToken,
) {
    info!("🧹 Starting reclamation worker (every {:?})", every);

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let report = store.sweep(OffsetDateTime::now_utc()).await;
                let remaining = store.len().await;
                if report.expired + report.orphans + report.failed > 0 {
                    info!(
                        expired = report.expired,
                        orphans = report.orphans,
                        failed = report.failed,
                        remaining,
                        "Sweep finished"
                    );
                } else {
                    debug!(remaining, "Sweep found nothing to reclaim");
                }
            }
        }
    }

    info!("🧹 Reclamation worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn worker_evicts_expired_artifacts_and_stops_on_shutdown() {
        let work = tempfile::tempdir().unwrap();
        let artifacts = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(artifacts.path(), Duration::from_secs(1));

        let produced = work.path().join("out.mp4");
        tokio::fs::write(&produced, b"reversed").await.unwrap();
        let artifact = store.put(&produced).await.unwrap();

        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(start_reclamation_worker(
            store.clone(),
            Duration::from_millis(200),
            shutdown.clone(),
        ));

        // Age must strictly exceed the one second TTL.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(store.get(&artifact.id).await.is_none());
        assert!(!artifact.path.exists());
        assert_eq!(store.len().await, 0);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
