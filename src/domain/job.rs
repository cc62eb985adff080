//! Discovery job model and its status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::errors::JobError;

pub const MAX_TEXT_FIELD_LEN: usize = 255;
pub const MIN_RADIUS_MILES: u32 = 1;
pub const MAX_RADIUS_MILES: u32 = 100;
pub const DEFAULT_RADIUS_MILES: u32 = 25;

/// External business directory a job can crawl
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Maps,
    Yelp,
    YellowPages,
    Facebook,
}

impl Source {
    pub const ALL: [Self; 4] = [Self::Maps, Self::Yelp, Self::YellowPages, Self::Facebook];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Maps => "maps",
            Self::Yelp => "yelp",
            Self::YellowPages => "yellow_pages",
            Self::Facebook => "facebook",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| JobError::invalid_request(format!("Unknown source '{s}'")))
    }
}

/// Job lifecycle status
///
/// `Paused` is part of the model but nothing in the processing path drives it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states end a run; only restart leaves `Failed`/`Cancelled`.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub const fn is_restartable(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    /// Allowed transitions of the job state machine.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
                | (Self::Running, Self::Paused)
                | (Self::Failed, Self::Pending)
                | (Self::Cancelled, Self::Pending)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("Invalid JobStatus: {other}")),
        }
    }
}

/// Per-job flags and limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JobOptions {
    pub include_emails: bool,
    pub include_social: bool,
    pub include_reviews: bool,
    /// Stop attributing once this many listings were processed
    pub max_results: Option<u32>,
    /// Skip listings whose normalized rating is below this value
    pub min_rating: Option<f64>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            include_emails: true,
            include_social: true,
            include_reviews: false,
            max_results: None,
            min_rating: None,
        }
    }
}

/// Discovery request as submitted by a caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRequest {
    pub keyword: String,
    pub location: String,
    #[serde(default = "default_radius")]
    pub radius_miles: u32,
    #[serde(default = "default_sources")]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub options: JobOptions,
}

const fn default_radius() -> u32 {
    DEFAULT_RADIUS_MILES
}

fn default_sources() -> Vec<Source> {
    vec![Source::Maps]
}

impl JobRequest {
    pub fn new(keyword: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            location: location.into(),
            radius_miles: DEFAULT_RADIUS_MILES,
            sources: default_sources(),
            options: JobOptions::default(),
        }
    }

    #[must_use]
    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> Result<(), JobError> {
        for (field, value) in [("keyword", &self.keyword), ("location", &self.location)] {
            let len = value.trim().chars().count();
            if len == 0 || len > MAX_TEXT_FIELD_LEN {
                return Err(JobError::invalid_request(format!(
                    "{field} must be between 1 and {MAX_TEXT_FIELD_LEN} characters"
                )));
            }
        }
        if !(MIN_RADIUS_MILES..=MAX_RADIUS_MILES).contains(&self.radius_miles) {
            return Err(JobError::invalid_request(format!(
                "radius_miles must be between {MIN_RADIUS_MILES} and {MAX_RADIUS_MILES}"
            )));
        }
        if self.sources.is_empty() {
            return Err(JobError::invalid_request("at least one source is required"));
        }
        if let Some(min_rating) = self.options.min_rating {
            if !(0.0..=5.0).contains(&min_rating) {
                return Err(JobError::invalid_request("min_rating must be within 0.0 and 5.0"));
            }
        }
        Ok(())
    }
}

/// One discovery request and its run-time state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub keyword: String,
    pub location: String,
    pub radius_miles: u32,
    pub sources: Vec<Source>,
    pub options: JobOptions,
    pub status: JobStatus,
    pub progress: u8,
    pub results_count: u32,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a pending job from a request. Duplicate sources keep their first position.
    pub fn from_request(request: JobRequest) -> Self {
        let now = Utc::now();
        let mut sources = Vec::with_capacity(request.sources.len());
        for source in request.sources {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }

        Self {
            id: Uuid::new_v4(),
            keyword: request.keyword.trim().to_string(),
            location: request.location.trim().to_string(),
            radius_miles: request.radius_miles,
            sources,
            options: request.options,
            status: JobStatus::Pending,
            progress: 0,
            results_count: 0,
            error_message: None,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Search term recorded on every attribution of this job
    pub fn search_term(&self) -> String {
        format!("{} near {}", self.keyword, self.location)
    }

    /// Apply a status change, rejecting transitions the state machine does not allow.
    pub fn transition_to(&mut self, next: JobStatus) -> Result<(), JobError> {
        if !self.status.can_transition_to(next) {
            return Err(JobError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Move to FAILED with `message`, stamping the completion time.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), JobError> {
        self.transition_to(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Reset a failed or cancelled job so it can be queued again.
    pub fn restart(&mut self) -> Result<(), JobError> {
        if !self.status.is_restartable() {
            return Err(JobError::IllegalTransition {
                from: self.status,
                to: JobStatus::Pending,
            });
        }
        self.transition_to(JobStatus::Pending)?;
        self.progress = 0;
        self.error_message = None;
        self.retry_count += 1;
        self.completed_at = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_names_round_trip() {
        for source in Source::ALL {
            assert_eq!(source.as_str().parse::<Source>().unwrap(), source);
        }
        assert!("myspace".parse::<Source>().is_err());
        assert_eq!(serde_json::to_string(&Source::YellowPages).unwrap(), "\"yellow_pages\"");
    }

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Paused));
        assert!(JobStatus::Failed.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_paused_has_no_way_out() {
        for next in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert!(!JobStatus::Paused.can_transition_to(next), "paused -> {next}");
        }
    }

    #[test]
    fn test_fail_records_error_and_allows_restart() {
        let mut job = Job::from_request(JobRequest::new("pizza", "Brooklyn"));
        job.fail("queue is full").unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("queue is full"));
        assert!(job.completed_at.is_some());
        job.restart().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_request_validation() {
        assert!(JobRequest::new("pizza", "Brooklyn, NY").validate().is_ok());
        assert!(JobRequest::new("  ", "Brooklyn").validate().is_err());
        assert!(JobRequest::new("pizza", "x".repeat(256)).validate().is_err());

        let mut request = JobRequest::new("pizza", "Brooklyn");
        request.radius_miles = 0;
        assert!(request.validate().is_err());
        request.radius_miles = 101;
        assert!(request.validate().is_err());

        let request = JobRequest::new("pizza", "Brooklyn").with_sources(vec![]);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: JobRequest =
            serde_json::from_str(r#"{"keyword":"plumber","location":"Austin"}"#).unwrap();
        assert_eq!(request.radius_miles, 25);
        assert_eq!(request.sources, vec![Source::Maps]);
        assert!(request.options.include_emails);
        assert!(!request.options.include_reviews);
    }

    #[test]
    fn test_restart_resets_run_state() {
        let mut job = Job::from_request(JobRequest::new("pizza", "Brooklyn"));
        assert!(job.restart().is_err());

        job.transition_to(JobStatus::Running).unwrap();
        job.progress = 45;
        job.transition_to(JobStatus::Failed).unwrap();
        job.error_message = Some("boom".into());
        job.completed_at = Some(Utc::now());

        job.restart().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.error_message, None);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.completed_at, None);
    }

    #[test]
    fn test_duplicate_sources_collapse() {
        let job = Job::from_request(
            JobRequest::new("pizza", "Brooklyn")
                .with_sources(vec![Source::Yelp, Source::Maps, Source::Yelp]),
        );
        assert_eq!(job.sources, vec![Source::Yelp, Source::Maps]);
        assert_eq!(job.search_term(), "pizza near Brooklyn");
    }
}
