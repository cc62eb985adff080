//! Executes one discovery job end to end
//!
//! PENDING -> RUNNING, crawl every source, then normalize, resolve and
//! attribute each listing in order. Success ends in COMPLETED with progress
//! 100; any unhandled failure ends in FAILED with the error text and the
//! progress left where it was. Committed records are never rolled back.

#![allow(clippy::uninlined_format_args)]

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::crawl_orchestrator::CrawlOrchestrator;
use crate::application::entity_resolver::EntityResolver;
use crate::application::normalizer;
use crate::application::progress::{ProgressSink, ProgressUpdate};
use crate::domain::business::Attribution;
use crate::domain::errors::{JobError, JobResult};
use crate::domain::job::{Job, JobStatus};
use crate::domain::listing::SearchQuery;
use crate::domain::repositories::DiscoveryStore;

/// Highest progress reported while listings are still being processed
pub const PROCESSING_PROGRESS_CAP: u8 = 90;

/// Progress after `processed` of `total` listings, capped below completion
pub fn processing_progress(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = processed.saturating_mul(usize::from(PROCESSING_PROGRESS_CAP)) / total;
    u8::try_from(percent.min(usize::from(PROCESSING_PROGRESS_CAP))).unwrap_or(PROCESSING_PROGRESS_CAP)
}

pub struct JobRunner {
    store: Arc<dyn DiscoveryStore>,
    orchestrator: Arc<CrawlOrchestrator>,
    resolver: EntityResolver,
    progress: Arc<dyn ProgressSink>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn DiscoveryStore>,
        orchestrator: Arc<CrawlOrchestrator>,
        resolver: EntityResolver,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            resolver,
            progress,
        }
    }

    /// Run the job to a terminal state and return it.
    ///
    /// A processing failure is recorded on the job and is not an `Err`;
    /// `Err` means the job could not be loaded or its state not persisted.
    pub async fn run(&self, job_id: Uuid) -> JobResult<Job> {
        let mut job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound { job_id: job_id.to_string() })?;

        if job.status == JobStatus::Cancelled {
            info!("Job {} was cancelled before it started, skipping", job.id);
            return Ok(job);
        }

        job.transition_to(JobStatus::Running)?;
        job.started_at = Some(Utc::now());
        self.store.update_job(&job).await?;
        self.report(&job, format!("Searching '{}'", job.search_term()));
        info!("Job {} started: '{}' on {:?}", job.id, job.search_term(), job.sources);

        match self.process(&mut job).await {
            Ok(results_count) => self.complete(job, results_count).await,
            Err(e) => self.fail(job, &e).await,
        }
    }

    async fn process(&self, job: &mut Job) -> JobResult<u32> {
        let query = SearchQuery::from_job(job);
        let batches = self.orchestrator.run(&job.sources, &query).await;

        let total: usize = batches.iter().map(|batch| batch.listings.len()).sum();
        let search_term = job.search_term();
        let min_rating = job.options.min_rating;
        let max_results = job.options.max_results;
        info!("Job {}: processing {} listings", job.id, total);

        let mut processed = 0usize;
        let mut attributed = 0u32;

        'batches: for batch in &batches {
            for raw in &batch.listings {
                if max_results.is_some_and(|max| attributed >= max) {
                    debug!("Job {}: max_results reached", job.id);
                    break 'batches;
                }
                processed += 1;

                let listing = normalizer::normalize(raw);
                let below_min = match (min_rating, listing.rating_value()) {
                    (Some(min), Some(rating)) => rating < min,
                    _ => false,
                };

                if below_min {
                    debug!(
                        "Skipping {} (rating {:?} below minimum)",
                        listing.name.as_deref().unwrap_or("unnamed"),
                        listing.rating
                    );
                } else {
                    let resolution = self.resolver.resolve(&listing).await?;
                    let attribution = Attribution::new(
                        job.id,
                        resolution.record.id,
                        batch.source,
                        resolution.confidence,
                        search_term.as_str(),
                        raw.position,
                    );
                    self.store.create_attribution(&attribution).await?;
                    attributed += 1;
                }

                self.advance_progress(job, processed, total).await?;
            }
        }

        Ok(attributed)
    }

    /// Persist and report progress when it moves forward
    async fn advance_progress(&self, job: &mut Job, processed: usize, total: usize) -> JobResult<()> {
        let progress = processing_progress(processed, total);
        if progress <= job.progress {
            return Ok(());
        }

        job.progress = progress;
        job.updated_at = Utc::now();
        self.store.update_job(job).await?;
        self.report(job, format!("Processed {}/{} listings", processed, total));
        Ok(())
    }

    async fn complete(&self, mut job: Job, results_count: u32) -> JobResult<Job> {
        job.transition_to(JobStatus::Completed)?;
        job.progress = 100;
        job.results_count = results_count;
        job.completed_at = Some(Utc::now());
        self.store.update_job(&job).await?;

        info!("Job {} completed with {} results", job.id, results_count);
        self.report(&job, format!("Completed with {} results", results_count));
        Ok(job)
    }

    async fn fail(&self, mut job: Job, cause: &JobError) -> JobResult<Job> {
        error!("Job {} failed: {}", job.id, cause);

        job.fail(cause.to_string())?;

        if let Err(e) = self.store.update_job(&job).await {
            warn!("Could not record failure of job {}: {}", job.id, e);
            return Err(e.into());
        }
        self.report(&job, format!("Failed: {}", cause));
        Ok(job)
    }

    fn report(&self, job: &Job, message: String) {
        self.progress
            .report(ProgressUpdate::new(job.id, job.status, job.progress, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 10, 0)]
    #[case(1, 10, 9)]
    #[case(5, 10, 45)]
    #[case(10, 10, 90)]
    #[case(1, 3, 30)]
    #[case(3, 0, 0)]
    fn test_processing_progress(#[case] processed: usize, #[case] total: usize, #[case] expected: u8) {
        assert_eq!(processing_progress(processed, total), expected);
    }

    #[test]
    fn test_processing_progress_is_monotonic_and_capped() {
        let total = 37;
        let mut last = 0;
        for processed in 0..=total {
            let progress = processing_progress(processed, total);
            assert!(progress >= last);
            assert!(progress <= PROCESSING_PROGRESS_CAP);
            last = progress;
        }
    }
}
