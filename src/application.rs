//! Application layer - normalization, resolution and job execution
//!
//! Use cases that drive the domain through the infrastructure seams.

pub mod crawl_orchestrator;
pub mod entity_resolver;
pub mod job_runner;
pub mod job_service;
pub mod normalizer;
pub mod progress;
pub mod similarity;
pub mod task_queue;

pub use crawl_orchestrator::{CrawlOrchestrator, SourceBatch};
pub use entity_resolver::{EntityResolver, MatchKind, Resolution, ResolutionOutcome};
pub use job_runner::JobRunner;
pub use job_service::{JobResults, JobService};
pub use progress::{BroadcastProgress, NoopProgress, ProgressSink, ProgressUpdate};
pub use task_queue::{LocalTaskQueue, QueueError, SCRAPE_TASK, SCRAPING_QUEUE, TaskQueue};
