//! Background task queue running jobs on a worker pool
//!
//! Jobs are scheduled with `enqueue("scrape_businesses", [job_id], "scraping")`.
//! Each worker takes one task at a time, so jobs run concurrently across
//! workers and sequentially within a job.

#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::application::job_runner::JobRunner;
use crate::infrastructure::config::WorkerConfig;

/// Task name of a discovery job run
pub const SCRAPE_TASK: &str = "scrape_businesses";
/// Default queue for discovery jobs
pub const SCRAPING_QUEUE: &str = "scraping";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    #[error("Unknown queue '{0}'")]
    UnknownQueue(String),

    #[error("Invalid task arguments: {0}")]
    InvalidArguments(String),

    #[error("Queue '{0}' is full")]
    Full(String),

    #[error("Queue '{0}' is shut down")]
    Closed(String),
}

/// Scheduler seam
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task_name: &str, args: Vec<String>, queue_name: &str) -> Result<(), QueueError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScrapeTask {
    job_id: Uuid,
}

/// In-process queue backed by a bounded channel and tokio worker tasks
pub struct LocalTaskQueue {
    queue_name: String,
    sender: mpsc::Sender<ScrapeTask>,
    workers: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl LocalTaskQueue {
    /// Spawn `config.workers` workers running jobs through `runner`
    pub fn start(runner: Arc<JobRunner>, config: &WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let shutdown = CancellationToken::new();

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    runner.clone(),
                    receiver.clone(),
                    shutdown.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(
            "Task queue '{}' started with {} worker(s)",
            config.queue_name,
            workers.len()
        );

        Self {
            queue_name: config.queue_name.clone(),
            sender,
            workers,
            shutdown,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Stop taking new tasks and wait for workers to finish their current job
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Worker terminated abnormally: {}", e);
            }
        }
        info!("Task queue '{}' stopped", self.queue_name);
    }
}

#[async_trait]
impl TaskQueue for LocalTaskQueue {
    async fn enqueue(&self, task_name: &str, args: Vec<String>, queue_name: &str) -> Result<(), QueueError> {
        if task_name != SCRAPE_TASK {
            return Err(QueueError::UnknownTask(task_name.to_string()));
        }
        if queue_name != self.queue_name {
            return Err(QueueError::UnknownQueue(queue_name.to_string()));
        }
        let task = parse_scrape_args(&args)?;

        self.sender.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full(self.queue_name.clone()),
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed(self.queue_name.clone()),
        })?;
        debug!("Enqueued {} for job {}", task_name, task.job_id);
        Ok(())
    }
}

fn parse_scrape_args(args: &[String]) -> Result<ScrapeTask, QueueError> {
    let [job_id] = args else {
        return Err(QueueError::InvalidArguments(format!(
            "expected [job_id], got {} argument(s)",
            args.len()
        )));
    };
    let job_id = Uuid::parse_str(job_id)
        .map_err(|e| QueueError::InvalidArguments(format!("bad job id '{job_id}': {e}")))?;
    Ok(ScrapeTask { job_id })
}

async fn worker_loop(
    worker_id: usize,
    runner: Arc<JobRunner>,
    receiver: Arc<Mutex<mpsc::Receiver<ScrapeTask>>>,
    shutdown: CancellationToken,
) {
    debug!("Worker {} started", worker_id);
    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => None,
            task = async { receiver.lock().await.recv().await } => task,
        };
        let Some(task) = next else {
            break;
        };

        info!("Worker {} picked up job {}", worker_id, task.job_id);
        match runner.run(task.job_id).await {
            Ok(job) => info!("Worker {} finished job {} ({})", worker_id, job.id, job.status),
            Err(e) => error!("Worker {} could not run job {}: {}", worker_id, task.job_id, e),
        }
    }
    debug!("Worker {} stopped", worker_id);
}
