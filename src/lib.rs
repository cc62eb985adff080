//! BizScout - business discovery pipeline
//!
//! Crawls business directories through a real browser, normalizes what it
//! finds, deduplicates it into canonical business records and keeps an
//! attribution trail per job.

#![allow(clippy::uninlined_format_args)]

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{info, warn};

use crate::application::{
    BroadcastProgress, CrawlOrchestrator, EntityResolver, JobRunner, JobService, LocalTaskQueue,
};
use crate::domain::job::{Job, JobRequest, Source};
use crate::domain::repositories::DiscoveryStore;
use crate::infrastructure::{
    AdapterRegistry, ConfigManager, CrawlLimits, DatabaseConnection, SqliteDiscoveryStore, StealthPolicy,
    WebDriverLauncher, init_logging_with_config,
};

const USAGE: &str = "usage: bizscout <keyword> <location> [sources, e.g. maps,yellow_pages] [radius_miles]";

/// Fallback status poll while waiting on a job
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Build a job request from command line arguments
pub fn parse_request(args: &[String]) -> Result<JobRequest> {
    let (Some(keyword), Some(location)) = (args.first(), args.get(1)) else {
        bail!(USAGE);
    };

    let mut request = JobRequest::new(keyword.as_str(), location.as_str());

    if let Some(sources) = args.get(2) {
        request.sources = sources
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<Source>)
            .collect::<Result<Vec<_>, _>>()?;
    }
    if let Some(radius) = args.get(3) {
        request.radius_miles = radius
            .parse()
            .with_context(|| format!("radius_miles must be a number, got '{radius}'"))?;
    }

    request.validate()?;
    Ok(request)
}

/// Run one discovery job from the command line and wait for its outcome
pub async fn run(args: Vec<String>) -> Result<()> {
    let request = parse_request(&args)?;

    let config_manager = ConfigManager::new()?;
    let config = config_manager.initialize_on_first_run().await?;
    init_logging_with_config(config.logging.clone())?;
    info!("Configuration loaded from {}", config_manager.config_path().display());

    let db = DatabaseConnection::from_config(&config.database).await?;
    db.migrate().await?;
    let store: Arc<dyn DiscoveryStore> = Arc::new(SqliteDiscoveryStore::new(db.pool().clone()));

    let policy = Arc::new(StealthPolicy::new(config.browser.clone(), &config.crawler));
    let launcher = Arc::new(WebDriverLauncher::new(config.browser.webdriver_url.clone(), &policy));
    let orchestrator = Arc::new(CrawlOrchestrator::new(
        AdapterRegistry::with_defaults()?,
        launcher,
        policy,
        CrawlLimits::from(&config.crawler),
    ));
    let resolver = EntityResolver::new(store.clone(), config.resolver.clone());

    let progress = Arc::new(BroadcastProgress::default());
    let updates = BroadcastStream::new(progress.subscribe());
    let runner = Arc::new(JobRunner::new(store.clone(), orchestrator, resolver, progress));

    let queue = Arc::new(LocalTaskQueue::start(runner, &config.worker));
    let service = JobService::new(store, queue.clone(), queue.queue_name());

    let job = service.submit(request).await?;
    let job = wait_for_job(&service, job, updates).await?;

    let results = service.results(job.id).await?;
    println!(
        "Job {} {}: {} result(s){}",
        job.id,
        job.status,
        results.attributions.len(),
        job.error_message
            .as_deref()
            .map(|e| format!(" ({e})"))
            .unwrap_or_default()
    );
    for attribution in &results.attributions {
        println!(
            "  #{:<3} {:<13} business {} (confidence {:.2})",
            attribution.search_position,
            attribution.source.as_str(),
            attribution.business_id,
            attribution.confidence_score
        );
    }

    drop(service);
    match Arc::try_unwrap(queue) {
        Ok(queue) => queue.shutdown().await,
        Err(_) => warn!("Task queue still shared, skipping graceful shutdown"),
    }
    Ok(())
}

async fn wait_for_job(
    service: &JobService,
    job: Job,
    mut updates: BroadcastStream<application::ProgressUpdate>,
) -> Result<Job> {
    let mut poll = tokio::time::interval(STATUS_POLL_INTERVAL);

    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(Ok(update)) if update.job_id == job.id => {
                    info!("[{:>3}%] {}", update.progress, update.message);
                    if update.status.is_terminal() {
                        return Ok(service.get(job.id).await?);
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                    warn!("Missed {} progress updates", missed);
                }
                None => return Ok(service.get(job.id).await?),
            },
            _ = poll.tick() => {
                let current = service.get(job.id).await?;
                if current.status.is_terminal() {
                    return Ok(current);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling job {}", job.id);
                return Ok(service.cancel(job.id).await?);
            }
        }
    }
}
