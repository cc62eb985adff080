//! Job submission and lifecycle actions

#![allow(clippy::uninlined_format_args)]

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::task_queue::{SCRAPE_TASK, TaskQueue};
use crate::domain::business::Attribution;
use crate::domain::errors::{JobError, JobResult};
use crate::domain::job::{Job, JobRequest, JobStatus};
use crate::domain::repositories::DiscoveryStore;

/// A job together with the attributions it produced
#[derive(Debug, Clone)]
pub struct JobResults {
    pub job: Job,
    pub attributions: Vec<Attribution>,
}

pub struct JobService {
    store: Arc<dyn DiscoveryStore>,
    queue: Arc<dyn TaskQueue>,
    queue_name: String,
}

impl JobService {
    pub fn new(store: Arc<dyn DiscoveryStore>, queue: Arc<dyn TaskQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            queue,
            queue_name: queue_name.into(),
        }
    }

    /// Validate, persist as PENDING and schedule a new job
    pub async fn submit(&self, request: JobRequest) -> JobResult<Job> {
        request.validate()?;
        let job = Job::from_request(request);
        self.store.create_job(&job).await?;
        self.schedule(job.clone()).await?;
        info!("Submitted job {} ('{}')", job.id, job.search_term());
        Ok(job)
    }

    pub async fn get(&self, job_id: Uuid) -> JobResult<Job> {
        self.store
            .find_job(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound { job_id: job_id.to_string() })
    }

    pub async fn list(&self, limit: u32) -> JobResult<Vec<Job>> {
        Ok(self.store.list_jobs(limit).await?)
    }

    /// Mark a job CANCELLED. A running crawl is not interrupted.
    pub async fn cancel(&self, job_id: Uuid) -> JobResult<Job> {
        let mut job = self.get(job_id).await?;
        job.transition_to(JobStatus::Cancelled)?;
        job.completed_at = Some(Utc::now());
        self.store.update_job(&job).await?;
        info!("Cancelled job {}", job.id);
        Ok(job)
    }

    /// Reset a FAILED or CANCELLED job to PENDING and schedule it again
    pub async fn restart(&self, job_id: Uuid) -> JobResult<Job> {
        let mut job = self.get(job_id).await?;
        job.restart()?;
        self.store.update_job(&job).await?;
        self.schedule(job.clone()).await?;
        info!("Restarted job {} (retry {})", job.id, job.retry_count);
        Ok(job)
    }

    pub async fn results(&self, job_id: Uuid) -> JobResult<JobResults> {
        let job = self.get(job_id).await?;
        let attributions = self.store.find_attributions_for_job(job_id).await?;
        Ok(JobResults { job, attributions })
    }

    /// Enqueue a stored PENDING job. If the queue refuses it, the job is
    /// marked FAILED so a later restart can pick it up again.
    async fn schedule(&self, mut job: Job) -> JobResult<()> {
        let Err(e) = self
            .queue
            .enqueue(SCRAPE_TASK, vec![job.id.to_string()], &self.queue_name)
            .await
        else {
            return Ok(());
        };

        let cause = JobError::Queue { message: e.to_string() };
        warn!("Could not schedule job {}: {}", job.id, cause);
        job.fail(cause.to_string())?;
        self.store.update_job(&job).await?;
        Err(cause)
    }
}
