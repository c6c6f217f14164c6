//! Jobs and their status machine.
//!
//! `queued -> running -> done | failed`, with `queued -> failed` allowed for
//! jobs the dispatcher gives up on before a worker starts them. Terminal
//! states never change again and progress never decreases. Every store
//! applies its mutations through [`Job::apply`] (or an equivalent guarded
//! SQL update) so the rules live in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::upload::StoredImage;
use crate::error::AppError;

/// Inputs looked up and validated.
pub const PROGRESS_INPUTS_VALIDATED: i32 = 10;
/// Inputs downloaded into the working directory.
pub const PROGRESS_INPUTS_FETCHED: i32 = 30;
/// Compositing finished, result not yet stored.
pub const PROGRESS_COMPUTED: i32 = 80;
pub const PROGRESS_COMPLETE: i32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Preview,
    HdRender,
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobType::Preview => write!(f, "preview"),
            JobType::HdRender => write!(f, "hd_render"),
        }
    }
}

impl FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preview" => Ok(JobType::Preview),
            "hd_render" => Ok(JobType::HdRender),
            _ => Err(anyhow::anyhow!("Invalid job type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Failed)
                | (Running, Running)
                | (Running, Done)
                | (Running, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// A single mutation requested by the worker or the reaper.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// Worker picked the job up.
    Start { progress: i32 },
    Progress(i32),
    Complete(StoredImage),
    Fail(String),
}

impl JobUpdate {
    fn target(&self) -> JobStatus {
        match self {
            JobUpdate::Start { .. } | JobUpdate::Progress(_) => JobStatus::Running,
            JobUpdate::Complete(_) => JobStatus::Done,
            JobUpdate::Fail(_) => JobStatus::Failed,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            JobUpdate::Start { .. } => "start",
            JobUpdate::Progress(_) => "report progress",
            JobUpdate::Complete(_) => "complete",
            JobUpdate::Fail(_) => "fail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job {job_id} cannot {attempted} while {status} (progress {progress})")]
pub struct TransitionRejected {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: i32,
    pub attempted: &'static str,
}

impl From<TransitionRejected> for AppError {
    fn from(err: TransitionRejected) -> Self {
        AppError::InvalidStateTransition(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Job {
    pub id: Uuid,
    pub project_id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: i32,
    /// Snapshot of the request that created the job.
    #[schema(value_type = Object)]
    pub params: serde_json::Value,
    pub result: Option<StoredImage>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Apply `update` if the status machine allows it.
    pub fn apply(
        &mut self,
        update: JobUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionRejected> {
        let rejected = |job: &Job, update: &JobUpdate| TransitionRejected {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            attempted: update.name(),
        };

        if !self.status.can_transition_to(update.target()) {
            return Err(rejected(self, &update));
        }
        // Progress updates only make sense once a worker owns the job.
        if matches!(update, JobUpdate::Progress(_)) && self.status != JobStatus::Running {
            return Err(rejected(self, &update));
        }
        // Completion requires the job to have been started.
        if matches!(update, JobUpdate::Complete(_)) && self.status != JobStatus::Running {
            return Err(rejected(self, &update));
        }

        match update {
            JobUpdate::Start { progress } => {
                self.status = JobStatus::Running;
                self.progress = self.progress.max(progress.clamp(0, PROGRESS_COMPLETE));
            }
            JobUpdate::Progress(progress) => {
                if !(0..=PROGRESS_COMPLETE).contains(&progress) || progress < self.progress {
                    return Err(rejected(self, &JobUpdate::Progress(progress)));
                }
                self.progress = progress;
            }
            JobUpdate::Complete(result) => {
                self.status = JobStatus::Done;
                self.progress = PROGRESS_COMPLETE;
                self.result = Some(result);
            }
            JobUpdate::Fail(error) => {
                self.status = JobStatus::Failed;
                self.error = Some(error);
            }
        }
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub project_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: i32,
    pub params: serde_json::Value,
    pub result: Option<StoredImage>,
}

impl NewJob {
    /// HD render waiting for a worker.
    pub fn hd_render(project_id: String, params: serde_json::Value) -> Self {
        Self {
            project_id,
            job_type: JobType::HdRender,
            status: JobStatus::Queued,
            progress: 0,
            params,
            result: None,
        }
    }

    /// Preview rendered synchronously; recorded already finished.
    pub fn finished_preview(
        project_id: String,
        params: serde_json::Value,
        result: StoredImage,
    ) -> Self {
        Self {
            project_id,
            job_type: JobType::Preview,
            status: JobStatus::Done,
            progress: PROGRESS_COMPLETE,
            params,
            result: Some(result),
        }
    }

    pub fn into_job(self, id: Uuid, now: DateTime<Utc>) -> Job {
        Job {
            id,
            project_id: self.project_id,
            job_type: self.job_type,
            status: self.status,
            progress: self.progress,
            params: self.params,
            result: self.result,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filters for `GET /jobs`; results are newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct JobListQuery {
    pub project_id: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: i64,
}

impl JobListQuery {
    pub fn matches(&self, job: &Job) -> bool {
        self.project_id
            .as_deref()
            .is_none_or(|p| p == job.project_id)
            && self.status.is_none_or(|s| s == job.status)
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Job {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let result = row
            .get::<Option<serde_json::Value>, _>("result")
            .map(serde_json::from_value::<StoredImage>)
            .transpose()
            .map_err(|e| sqlx::Error::Decode(format!("Failed to parse result: {}", e).into()))?;
        Ok(Job {
            id: row.get("id"),
            project_id: row.get("project_id"),
            job_type: row.get::<String, _>("job_type").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse job_type: {}", e).into())
            })?,
            status: row.get::<String, _>("status").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse status: {}", e).into())
            })?,
            progress: row.get("progress"),
            params: row.get("params"),
            result,
            error: row.get("error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_job() -> Job {
        NewJob::hd_render("proj".to_string(), serde_json::json!({}))
            .into_job(Uuid::new_v4(), Utc::now())
    }

    fn result() -> StoredImage {
        StoredImage {
            url: "http://localhost/r.png".to_string(),
            key: "styleweave/results/proj/r.png".to_string(),
            width: 8,
            height: 8,
        }
    }

    #[test]
    fn test_happy_path_reaches_done() {
        let mut job = queued_job();
        job.apply(JobUpdate::Start { progress: PROGRESS_INPUTS_VALIDATED }, Utc::now())
            .unwrap();
        job.apply(JobUpdate::Progress(PROGRESS_INPUTS_FETCHED), Utc::now())
            .unwrap();
        job.apply(JobUpdate::Progress(PROGRESS_COMPUTED), Utc::now())
            .unwrap();
        job.apply(JobUpdate::Complete(result()), Utc::now()).unwrap();

        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 100);
        assert!(job.result.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_done_cannot_skip_running() {
        let mut job = queued_job();
        let err = job.apply(JobUpdate::Complete(result()), Utc::now()).unwrap_err();
        assert_eq!(err.status, JobStatus::Queued);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.result.is_none());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut done = queued_job();
        done.apply(JobUpdate::Start { progress: 10 }, Utc::now()).unwrap();
        done.apply(JobUpdate::Complete(result()), Utc::now()).unwrap();
        assert!(done.apply(JobUpdate::Fail("late".to_string()), Utc::now()).is_err());
        assert!(done.apply(JobUpdate::Start { progress: 10 }, Utc::now()).is_err());
        assert!(done.apply(JobUpdate::Progress(100), Utc::now()).is_err());
        assert_eq!(done.status, JobStatus::Done);
        assert!(done.error.is_none());

        let mut failed = queued_job();
        failed.apply(JobUpdate::Fail("boom".to_string()), Utc::now()).unwrap();
        assert!(failed.apply(JobUpdate::Start { progress: 10 }, Utc::now()).is_err());
        assert!(failed.apply(JobUpdate::Complete(result()), Utc::now()).is_err());
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.result.is_none());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = queued_job();
        job.apply(JobUpdate::Start { progress: 30 }, Utc::now()).unwrap();
        assert!(job.apply(JobUpdate::Progress(10), Utc::now()).is_err());
        assert_eq!(job.progress, 30);

        // A restart keeps the higher checkpoint.
        job.apply(JobUpdate::Start { progress: 10 }, Utc::now()).unwrap();
        assert_eq!(job.progress, 30);

        assert!(job.apply(JobUpdate::Progress(101), Utc::now()).is_err());
    }

    #[test]
    fn test_progress_requires_running() {
        let mut job = queued_job();
        assert!(job.apply(JobUpdate::Progress(30), Utc::now()).is_err());
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_can_transition_to_table() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Failed));
        assert!(!Queued.can_transition_to(Done));
        assert!(Running.can_transition_to(Done));
        assert!(!Running.can_transition_to(Queued));
        for terminal in [Done, Failed] {
            for next in [Queued, Running, Done, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_list_query_matches_filters() {
        let job = queued_job();
        let all = JobListQuery {
            project_id: None,
            status: None,
            limit: 50,
        };
        assert!(all.matches(&job));
        let other_project = JobListQuery {
            project_id: Some("other".to_string()),
            ..all.clone()
        };
        assert!(!other_project.matches(&job));
        let done_only = JobListQuery {
            status: Some(JobStatus::Done),
            ..all
        };
        assert!(!done_only.matches(&job));
    }
}
