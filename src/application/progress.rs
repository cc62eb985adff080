//! Progress reporting for running jobs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::job::JobStatus;

/// One progress notification of a job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(job_id: Uuid, status: JobStatus, progress: u8, message: impl Into<String>) -> Self {
        Self {
            job_id,
            status,
            progress,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Receiver of job progress; must not block the runner
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Sink that drops every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Fan-out of updates to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastProgress {
    sender: broadcast::Sender<ProgressUpdate>,
}

impl BroadcastProgress {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastProgress {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ProgressSink for BroadcastProgress {
    fn report(&self, update: ProgressUpdate) {
        // No subscribers is fine
        let _ = self.sender.send(update);
    }
}
