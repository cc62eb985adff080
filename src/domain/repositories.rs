//! Repository interfaces for the discovery pipeline
//!
//! The persistence collaborator stores jobs, canonical business records and
//! attributions. Per-record atomicity is delegated to the implementation.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::business::{Attribution, BusinessRecord};
use crate::domain::errors::StoreResult;
use crate::domain::job::Job;

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create_job(&self, job: &Job) -> StoreResult<()>;
    async fn find_job(&self, job_id: Uuid) -> StoreResult<Option<Job>>;
    async fn update_job(&self, job: &Job) -> StoreResult<()>;
    async fn list_jobs(&self, limit: u32) -> StoreResult<Vec<Job>>;
}

#[async_trait]
pub trait BusinessRepository: Send + Sync {
    /// Records whose stored phone equals `phone` exactly, oldest first
    async fn find_by_phone(&self, phone: &str) -> StoreResult<Vec<BusinessRecord>>;

    /// Records whose lower-cased name contains any of `terms`, oldest first
    async fn find_name_candidates(&self, terms: &[String]) -> StoreResult<Vec<BusinessRecord>>;

    async fn find_business(&self, business_id: Uuid) -> StoreResult<Option<BusinessRecord>>;
    async fn create_business(&self, record: &BusinessRecord) -> StoreResult<()>;
    async fn update_business(&self, record: &BusinessRecord) -> StoreResult<()>;
    async fn count_businesses(&self) -> StoreResult<u64>;
}

#[async_trait]
pub trait AttributionRepository: Send + Sync {
    async fn create_attribution(&self, attribution: &Attribution) -> StoreResult<()>;
    async fn find_attributions_for_job(&self, job_id: Uuid) -> StoreResult<Vec<Attribution>>;
    async fn find_attributions_for_business(&self, business_id: Uuid) -> StoreResult<Vec<Attribution>>;
}

/// Full persistence surface used by the job runner
pub trait DiscoveryStore: JobRepository + BusinessRepository + AttributionRepository {}

impl<T> DiscoveryStore for T where T: JobRepository + BusinessRepository + AttributionRepository {}
