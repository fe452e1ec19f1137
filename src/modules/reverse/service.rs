use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::dto::ReverseResponse;
use super::job::{Job, JobSignal};
use crate::common::error::AppError;
use crate::state::AppState;

pub struct ReverseService;

impl ReverseService {
    /// Drives one job from a fully received upload to its single terminal
    /// result. The request deadline starts here, so upload time never counts
    /// against it. Temp files are gone by the time this returns; if this
    /// future is dropped instead, the child is killed and the files go with
    /// the job's last handle.
    pub async fn reverse(
        state: AppState,
        job: Arc<Job>,
        outcome: oneshot::Receiver<JobSignal>,
    ) -> Result<ReverseResponse, AppError> {
        info!(job_id = %job.id, "Reversal started");

        let deadline = Instant::now() + state.config.request_timeout();
        let cancel = CancellationToken::new();
        let _abandon = cancel.clone().drop_guard();

        let supervisor = tokio::spawn({
            let job = job.clone();
            let transcoder = state.transcoder.clone();
            let cancel = cancel.clone();
            async move {
                let result = transcoder.run(&job.input, &job.output, &cancel).await;
                job.settle(JobSignal::Exited(result)).await;
            }
        });

        let watchdog = tokio::spawn({
            let job = job.clone();
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        job.settle(JobSignal::DeadlineElapsed).await;
                    }
                    _ = cancel.cancelled() => {}
                }
            }
        });

        let signal = outcome.await;
        watchdog.abort();

        let result = match signal {
            Ok(JobSignal::Exited(Ok(()))) => Self::publish(&state, &job).await,
            Ok(JobSignal::Exited(Err(e))) => Err(AppError::from(e)),
            Ok(JobSignal::DeadlineElapsed) => {
                // Kill and reap the child before answering.
                cancel.cancel();
                if let Err(e) = supervisor.await {
                    error!(job_id = %job.id, "Supervisor task failed: {}", e);
                }
                Err(AppError::Timeout(state.config.request_timeout()))
            }
            Err(_) => Err(AppError::Internal(
                "job ended without reporting an outcome".to_string(),
            )),
        };

        job.cleanup().await;

        match &result {
            Ok(response) => info!(job_id = %job.id, url = %response.video_url, "Reversal finished"),
            Err(e) => info!(job_id = %job.id, code = e.code(), "Reversal failed"),
        }
        result
    }

    async fn publish(state: &AppState, job: &Job) -> Result<ReverseResponse, AppError> {
        let artifact = state.store.put(&job.output).await?;
        let video_url = format!("/api/video/{}", artifact.id);

        Ok(ReverseResponse {
            download_url: format!("{video_url}/download"),
            video_url,
            message: "Video reversed successfully".to_string(),
            expires_at: artifact.expires_at(state.store.ttl()),
        })
    }
}
