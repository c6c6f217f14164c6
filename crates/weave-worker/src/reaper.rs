//! Stale job reaper.
//!
//! A worker that dies mid-render leaves its job `running` forever. The reaper
//! periodically fails HD jobs that have not been updated for longer than the
//! configured window. It only ever moves jobs into `failed`.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use weave_core::constants::STALE_JOB_ERROR;
use weave_core::AppError;
use weave_db::JobRepository;

/// Fail every running HD job not touched within `stale_after`.
pub async fn reap_stale_jobs(
    jobs: &dyn JobRepository,
    stale_after: Duration,
) -> Result<Vec<Uuid>, AppError> {
    let window = chrono::Duration::from_std(stale_after)
        .map_err(|e| AppError::Internal(format!("Invalid stale job window: {}", e)))?;
    let reaped = jobs
        .fail_stale_running(Utc::now() - window, STALE_JOB_ERROR)
        .await?;
    if !reaped.is_empty() {
        tracing::warn!(count = reaped.len(), job_ids = ?reaped, "Failed stale running jobs");
    }
    Ok(reaped)
}

pub fn spawn_stale_job_reaper(
    jobs: Arc<dyn JobRepository>,
    stale_after: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            stale_after_secs = stale_after.as_secs(),
            interval_secs = interval.as_secs(),
            "Stale job reaper started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = reap_stale_jobs(jobs.as_ref(), stale_after).await {
                        tracing::error!(error = %e, "Stale job reaper failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Stale job reaper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_core::models::{JobStatus, NewJob};
    use weave_db::MemoryJobRepository;

    #[tokio::test]
    async fn test_reaps_only_stale_running_jobs() {
        let repo = MemoryJobRepository::new();
        let job = repo
            .insert(NewJob::hd_render("p".into(), serde_json::json!({})))
            .await
            .unwrap();
        repo.mark_running(job.id, 10).await.unwrap();

        // Fresh job survives a long window.
        assert!(reap_stale_jobs(&repo, Duration::from_secs(3600))
            .await
            .unwrap()
            .is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let reaped = reap_stale_jobs(&repo, Duration::from_millis(5)).await.unwrap();
        assert_eq!(reaped, vec![job.id]);

        let job = repo.get(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(STALE_JOB_ERROR));
    }

    #[tokio::test]
    async fn test_background_reaper_stops_on_shutdown() {
        let repo = Arc::new(MemoryJobRepository::new());
        let (tx, rx) = watch::channel(false);
        let handle = spawn_stale_job_reaper(
            repo,
            Duration::from_secs(60),
            Duration::from_millis(5),
            rx,
        );
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
