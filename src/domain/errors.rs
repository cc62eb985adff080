//! Error kinds of the discovery pipeline
//!
//! Each kind maps to one handling policy:
//! - `ExtractionError`: a single listing or page failed to parse, skipped
//! - `SessionError`: browser lifecycle failure, aborts one source only
//! - `ValidationError`: a field failed normalization, the field is dropped
//! - `ResolutionError`: a matching query failed, treated as no-match
//! - `JobError`: terminal failure of a run, the job is marked FAILED

use thiserror::Error;

use crate::domain::job::{JobStatus, Source};

/// Failure extracting one listing (or one page) from source markup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Required field '{field}' missing from listing")]
    MissingField { field: String },

    #[error("Could not build search URL: {message}")]
    InvalidUrl { message: String },

    #[error("Page markup could not be extracted: {message}")]
    Markup { message: String },
}

impl ExtractionError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    pub fn invalid_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }
}

/// Browser session lifecycle failure
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No adapter available for source '{requested}'")]
    UnsupportedSource { requested: Source },

    #[error("Failed to launch browser session: {message}")]
    Launch { message: String },

    #[error("Anti-detection setup failed: {message}")]
    Stealth { message: String },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Browser command failed: {message}")]
    Driver { message: String },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl SessionError {
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver { message: message.into() }
    }

    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// A raw field value that could not be normalized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty value for '{field}'")]
    Empty { field: &'static str },

    #[error("Invalid {field} '{value}': {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl ValidationError {
    pub fn invalid(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of the persistence collaborator
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored JSON could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row in '{table}': {message}")]
    Corrupt { table: &'static str, message: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

impl StoreError {
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            message: message.into(),
        }
    }
}

/// A matching query against the canonical store failed
#[derive(Error, Debug)]
#[error("Entity resolution query '{query}' failed: {source}")]
pub struct ResolutionError {
    pub query: &'static str,
    #[source]
    pub source: StoreError,
}

/// Terminal failure of a job run or job action
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job {job_id} not found")]
    NotFound { job_id: String },

    #[error("Invalid job request: {message}")]
    InvalidRequest { message: String },

    #[error("Illegal status transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("Persistence failure: {0}")]
    Store(#[from] StoreError),

    #[error("Task queue failure: {message}")]
    Queue { message: String },

    #[error("Job processing failed: {message}")]
    Processing { message: String },
}

impl JobError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type SessionResult<T> = Result<T, SessionError>;
pub type JobResult<T> = Result<T, JobError>;
