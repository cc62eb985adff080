//! Domain module - jobs, canonical records and the contracts around them
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod business;
pub mod errors;
pub mod job;
pub mod listing;
pub mod repositories;

pub use business::{Attribution, BusinessRecord};
pub use errors::{
    ExtractionError, JobError, ResolutionError, SessionError, StoreError, ValidationError,
};
pub use job::{Job, JobOptions, JobRequest, JobStatus, Source};
pub use listing::{NormalizedListing, RawDetail, RawListing, SearchQuery};
pub use repositories::{AttributionRepository, BusinessRepository, DiscoveryStore, JobRepository};
